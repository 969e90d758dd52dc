use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Result, bail};

use crate::{
    datasource::platform::Platform,
    model::{
        frequency_table::Relation,
        load_sampler::CpuTimes,
        policy::{CpuId, PolicyHandle},
    },
};

/// 每次读取前进的墙钟时间（微秒）
const STEP_US: u64 = 10_000;

#[derive(Debug, Default)]
struct MockCpu {
    busy: u32,
    times: CpuTimes,
    reads: usize,
    applied: Vec<(u32, Relation)>,
    limits: Option<(u32, u32)>,
}

/// 测试用平台：每次读取按设定的忙碌百分比推进计数器，并记录成功的调频
#[derive(Debug, Default)]
pub struct MockPlatform {
    online: Mutex<BTreeSet<CpuId>>,
    cpus: Mutex<BTreeMap<CpuId, MockCpu>>,
    fail_apply: AtomicBool,
}

impl MockPlatform {
    pub fn new(online: impl IntoIterator<Item = CpuId>) -> Self {
        Self {
            online: Mutex::new(online.into_iter().collect()),
            ..Self::default()
        }
    }

    fn cpus(&self) -> MutexGuard<'_, BTreeMap<CpuId, MockCpu>> {
        self.cpus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_busy(&self, cpu: CpuId, busy: u32) {
        self.cpus().entry(cpu).or_default().busy = busy.min(100);
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::Release);
    }

    pub fn set_online(&self, online: impl IntoIterator<Item = CpuId>) {
        *self.online.lock().unwrap_or_else(PoisonError::into_inner) = online.into_iter().collect();
    }

    /// 下一次刷新限频时生效
    pub fn set_limits(&self, cpu: CpuId, min: u32, max: u32) {
        self.cpus().entry(cpu).or_default().limits = Some((min, max));
    }

    pub fn read_count(&self, cpu: CpuId) -> usize {
        self.cpus().get(&cpu).map_or(0, |c| c.reads)
    }

    pub fn applied(&self, cpu: CpuId) -> Vec<(u32, Relation)> {
        self.cpus()
            .get(&cpu)
            .map(|c| c.applied.clone())
            .unwrap_or_default()
    }
}

impl Platform for MockPlatform {
    fn read_idle_and_wall_time(&self, cpu: CpuId) -> Result<CpuTimes> {
        let mut cpus = self.cpus();
        let entry = cpus.entry(cpu).or_default();
        entry.reads += 1;
        entry.times.wall += STEP_US;
        entry.times.idle += STEP_US * u64::from(100 - entry.busy) / 100;
        Ok(entry.times)
    }

    fn apply_frequency(&self, policy: &PolicyHandle, freq: u32, relation: Relation) -> Result<()> {
        if self.fail_apply.load(Ordering::Acquire) {
            bail!("cpu{}: mock apply failure", policy.cpu());
        }
        self.cpus()
            .entry(policy.cpu())
            .or_default()
            .applied
            .push((freq, relation));
        Ok(())
    }

    fn online_cpus(&self) -> BTreeSet<CpuId> {
        self.online
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn refresh_limits(&self, policy: &PolicyHandle) {
        let limits = self.cpus().get(&policy.cpu()).and_then(|c| c.limits);
        if let Some((min, max)) = limits {
            policy.set_limits(min, max);
        }
    }

    fn has_micro_idle_accounting(&self) -> bool {
        true
    }
}
