/// Governor 常量定义
pub const NOTES: &str = "On-demand CPU Frequency Governor";
pub const AUTHOR: &str = "Author: walika @CoolApk, Tools-cx-app @GitHub";
pub const VERSION: &str = "Version: v1.0.0";

/// 调度节拍长度（微秒），所有定时器延迟都以节拍为单位计算
pub const TICK_US: u64 = 1_000;

/// on-demand 调频策略常量
pub mod ondemand {
    pub const DEF_FREQUENCY_DOWN_DIFFERENTIAL: u32 = 10;
    pub const DEF_FREQUENCY_UP_THRESHOLD: u32 = 80;
    pub const DEF_SAMPLING_DOWN_FACTOR: u32 = 1;
    pub const MAX_SAMPLING_DOWN_FACTOR: u32 = 100_000;
    pub const MICRO_FREQUENCY_DOWN_DIFFERENTIAL: u32 = 3;
    pub const MICRO_FREQUENCY_UP_THRESHOLD: u32 = 95;
    pub const MICRO_FREQUENCY_MIN_SAMPLE_RATE: u64 = 10_000; // us
    pub const MIN_FREQUENCY_UP_THRESHOLD: u32 = 11;
    pub const MAX_FREQUENCY_UP_THRESHOLD: u32 = 100;

    /// 无精确空闲统计时，每次采样至少跨越的节拍数
    pub const MIN_SAMPLING_TICKS: u64 = 10;
    pub const MIN_SAMPLING_RATE_RATIO: u64 = 2;
    pub const LATENCY_MULTIPLIER: u64 = 1000;

    pub const POWERSAVE_BIAS_MAXLEVEL: i32 = 1000;
    pub const POWERSAVE_BIAS_MINLEVEL: i32 = -1000;
}
