/// 一个 CPU 自启动以来的累计时间（微秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    /// 空闲时间，包含 iowait
    pub idle: u64,
    pub wall: u64,
    pub nice: u64,
    pub iowait: u64,
}

/// 负载计算开关，取自当前调优参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFlags {
    pub ignore_nice: bool,
    pub io_is_busy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSample {
    /// 墙钟没有前进，本周期不做决策
    NoData,
    Measured {
        /// 0..=100
        load: u32,
        /// load × 当前频率
        load_freq: u64,
        /// 空闲计数倒退，已按 0 处理
        wrapped: bool,
    },
}

fn counter_delta(now: u64, prev: u64) -> i64 {
    now.wrapping_sub(prev) as i64
}

/// 由两次快照计算忙碌百分比
pub fn compute_load(prev: &CpuTimes, now: &CpuTimes, flags: SampleFlags) -> Option<(u32, bool)> {
    let wall_delta = counter_delta(now.wall, prev.wall);
    let mut idle_delta = counter_delta(now.idle, prev.idle);

    if flags.ignore_nice {
        idle_delta += counter_delta(now.nice, prev.nice).max(0);
    }

    if flags.io_is_busy {
        let iowait_delta = counter_delta(now.iowait, prev.iowait).max(0);
        if idle_delta >= iowait_delta {
            idle_delta -= iowait_delta;
        }
    }

    let wrapped = idle_delta < 0;
    let idle_delta = idle_delta.max(0);

    if wall_delta <= 0 {
        return None;
    }

    Some((busy_percent(wall_delta, idle_delta), wrapped))
}

fn busy_percent(wall_delta: i64, idle_delta: i64) -> u32 {
    if idle_delta >= wall_delta {
        return 0;
    }
    let busy = (wall_delta - idle_delta) as i128;
    ((100 * busy) / wall_delta as i128).clamp(0, 100) as u32
}
