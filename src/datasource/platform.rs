use std::collections::BTreeSet;

use anyhow::Result;

use crate::model::{
    frequency_table::Relation,
    load_sampler::CpuTimes,
    policy::{CpuId, PolicyHandle},
};

/// 调速器依赖的平台能力。实现需要可以被所有采样线程共享。
pub trait Platform: Send + Sync + 'static {
    /// 自启动以来的累计空闲/墙钟/nice/iowait 时间（微秒）
    fn read_idle_and_wall_time(&self, cpu: CpuId) -> Result<CpuTimes>;

    /// 阻塞直到频率切换完成
    fn apply_frequency(&self, policy: &PolicyHandle, freq: u32, relation: Relation) -> Result<()>;

    fn is_policy_at_max(&self, policy: &PolicyHandle) -> bool {
        policy.cur() == policy.max()
    }

    fn online_cpus(&self) -> BTreeSet<CpuId>;

    /// 重新读取外部设置的限频窗口（温控、用户改 scaling_max_freq 等）
    fn refresh_limits(&self, _policy: &PolicyHandle) {}

    /// 空闲统计是否精确到微秒（影响默认阈值和最小采样率）
    fn has_micro_idle_accounting(&self) -> bool {
        false
    }
}
