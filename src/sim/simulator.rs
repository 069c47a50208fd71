//! 仿真器
//!
//! 事件按 `(时间, 序号)` 执行。同一时刻的事件先进先出，所以同一连接上的帧按发送顺序到达，
//! 在当前时刻调度的连接丢失也排在已经在队列中的帧之后。

use super::event::{Event, World};
use super::time::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, info, trace};

struct Scheduled {
    at: SimTime,
    seq: u64,
    ev: Box<dyn Event>,
}

// BinaryHeap 是 max-heap：反向比较得到最早的事件
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq)).reverse()
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for Scheduled {}

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    executed: u64,
    q: BinaryHeap<Scheduled>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 队列中尚未执行的事件数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 自创建以来执行过的事件总数
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// 调度事件在指定时间执行
    #[tracing::instrument(level = "trace", skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(Scheduled {
            at: at.max(self.now),
            seq,
            ev: Box::new(ev),
        });
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while self.q.peek().is_some_and(|top| top.at <= until) {
            let Some(item) = self.q.pop() else {
                break;
            };
            self.step(item, world);
        }
        self.now = self.now.max(until);
    }

    /// 最多执行 `limit` 个事件，返回实际执行的数量。
    ///
    /// 用于检查控制面消息是否会无限扩散：队列在预算内清空即说明传播有界。
    pub fn run_bounded(&mut self, limit: u64, world: &mut dyn World) -> u64 {
        let mut count = 0;
        while count < limit {
            let Some(item) = self.q.pop() else {
                break;
            };
            self.step(item, world);
            count += 1;
        }
        count
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        debug!(now = ?self.now, queue_size = self.q.len(), "开始运行");

        let mut event_count = 0u64;
        while let Some(item) = self.q.pop() {
            event_count += 1;
            trace!(
                event_num = event_count,
                scheduled_at = ?item.at,
                seq = item.seq,
                remaining_queue = self.q.len(),
                "执行事件"
            );
            self.step(item, world);
        }

        info!(total_events = event_count, final_time = %self.now, "✅ 事件队列已清空");
    }

    fn step(&mut self, item: Scheduled, world: &mut dyn World) {
        self.now = item.at;
        self.executed = self.executed.wrapping_add(1);
        item.ev.execute(self, world);
    }
}
