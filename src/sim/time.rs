//! 仿真时间类型

use std::fmt;

/// 仿真时间（纳秒）。连接时延通常以微秒配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(1_000))
    }

    pub fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(1_000_000))
    }

    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// 当前时间加上一段时延（饱和加法）。
    pub fn after(self, delay: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(delay.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (us, ns) = (self.0 / 1_000, self.0 % 1_000);
        if ns == 0 {
            write!(f, "{us}µs")
        } else {
            write!(f, "{us}.{ns:03}µs")
        }
    }
}
