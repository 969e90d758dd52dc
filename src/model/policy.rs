use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use log::{info, warn};

use crate::model::{
    error::GovernorResult,
    frequency_table::{FrequencyTable, Relation},
};

pub type CpuId = u32;

/// 挂载一个 CPU 时由平台提供的初始信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub cpu: CpuId,
    /// 可用频率（KHz），顺序不限
    pub frequencies: Vec<u32>,
    pub cur_freq: u32,
    /// 为 None 时取频率表的最低/最高档
    pub min_freq: Option<u32>,
    pub max_freq: Option<u32>,
    pub transition_latency_us: u32,
}

impl PolicyConfig {
    pub fn new(cpu: CpuId, frequencies: Vec<u32>, cur_freq: u32) -> Self {
        Self {
            cpu,
            frequencies,
            cur_freq,
            min_freq: None,
            max_freq: None,
            transition_latency_us: 0,
        }
    }
}

/// 单个 CPU 的调频策略句柄。
///
/// 频率字段用原子量保存，其他 CPU 做协同判断时可以无锁读取；
/// `apply_lock` 只包住一次调频写入，保证同一 CPU 不会并发下发两个频率。
#[derive(Debug)]
pub struct PolicyHandle {
    cpu: CpuId,
    table: FrequencyTable,
    cur: AtomicU32,
    min: AtomicU32,
    max: AtomicU32,
    transition_latency_us: u32,
    apply_lock: Mutex<()>,
}

impl PolicyHandle {
    pub fn from_config(config: PolicyConfig) -> GovernorResult<Self> {
        let table = FrequencyTable::new(config.cpu, config.frequencies)?;
        let min = config.min_freq.unwrap_or_else(|| table.min());
        let max = config.max_freq.unwrap_or_else(|| table.max()).max(min);

        info!(
            "cpu{}: {} frequencies, limits {}-{}KHz, cur {}KHz",
            config.cpu,
            table.entries().len(),
            min,
            max,
            config.cur_freq
        );
        // 下一次调频会落到表内档位
        if !table.contains(config.cur_freq) {
            warn!(
                "cpu{}: current {}KHz is not in the frequency table",
                config.cpu, config.cur_freq
            );
        }

        Ok(Self {
            cpu: config.cpu,
            table,
            cur: AtomicU32::new(config.cur_freq),
            min: AtomicU32::new(min),
            max: AtomicU32::new(max),
            transition_latency_us: config.transition_latency_us,
            apply_lock: Mutex::new(()),
        })
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    pub fn cur(&self) -> u32 {
        self.cur.load(Ordering::Acquire)
    }

    pub fn min(&self) -> u32 {
        self.min.load(Ordering::Acquire)
    }

    pub fn max(&self) -> u32 {
        self.max.load(Ordering::Acquire)
    }

    pub fn transition_latency_us(&self) -> u32 {
        self.transition_latency_us
    }

    pub fn set_cur(&self, freq: u32) {
        self.cur.store(freq, Ordering::Release);
    }

    /// 平台侧限频变化（例如温控）时更新窗口
    pub fn set_limits(&self, min: u32, max: u32) {
        self.min.store(min, Ordering::Release);
        self.max.store(max.max(min), Ordering::Release);
    }

    pub fn view(&self) -> PolicyView<'_> {
        PolicyView {
            cur: self.cur(),
            min: self.min(),
            max: self.max(),
            table: &self.table,
        }
    }

    pub(crate) fn lock_apply(&self) -> MutexGuard<'_, ()> {
        self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 决策周期内使用的策略快照
#[derive(Debug, Clone, Copy)]
pub struct PolicyView<'a> {
    pub cur: u32,
    pub min: u32,
    pub max: u32,
    pub table: &'a FrequencyTable,
}

impl PolicyView<'_> {
    pub fn resolve(&self, target: u32, relation: Relation) -> u32 {
        self.table.select_within(target, relation, self.min, self.max)
    }
}
