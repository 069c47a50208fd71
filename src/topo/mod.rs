//! 拓扑构建
//!
//! `chain` 构建固定的三路由器链；`mesh` 按场景文件构建任意拓扑并执行步骤。

pub mod chain;
pub mod mesh;
