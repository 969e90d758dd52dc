use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
        atomic::{AtomicU32, Ordering},
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Sender, bounded, unbounded};
use log::{debug, info, warn};

use crate::{
    datasource::{file_path::SAMPLER_THREAD, platform::Platform},
    model::{
        error::{GovernorError, GovernorResult},
        load_sampler::CpuTimes,
        policy::{CpuId, PolicyConfig, PolicyHandle},
        sample_state::SampleState,
        scheduler::{Command, SamplingWorker},
        ticks::delay_for_sampling_rate,
        tunables::{TUNABLE_NAMES, TunableStore, Tunables},
    },
    utils::constants::ondemand::LATENCY_MULTIPLIER,
};

/// 一个已挂载 CPU 的共享部分
#[derive(Debug)]
pub(crate) struct CpuSlot {
    pub(crate) policy: Arc<PolicyHandle>,
    /// 最近一次负载，只由该 CPU 的采样线程写入
    pub(crate) max_load: AtomicU32,
    commands: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpuSlot {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("cpu{}: sampler already gone", self.policy.cpu());
        }
    }

    fn stop(&self) {
        self.send(Command::Stop);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("cpu{}: sampler thread panicked", self.policy.cpu());
        }
    }
}

/// 所有采样线程共享的状态
pub(crate) struct GovernorShared<P> {
    pub(crate) platform: P,
    pub(crate) tunables: TunableStore,
    cpus: RwLock<BTreeMap<CpuId, Arc<CpuSlot>>>,
}

impl<P> GovernorShared<P> {
    pub(crate) fn read_cpus(&self) -> RwLockReadGuard<'_, BTreeMap<CpuId, Arc<CpuSlot>>> {
        self.cpus.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, cpu: CpuId) -> GovernorResult<Arc<CpuSlot>> {
        self.read_cpus()
            .get(&cpu)
            .cloned()
            .ok_or(GovernorError::NotAttached { cpu })
    }
}

/// 已挂载 CPU 的只读句柄
#[derive(Debug, Clone)]
pub struct CpuHandle {
    slot: Arc<CpuSlot>,
}

impl CpuHandle {
    pub fn cpu(&self) -> CpuId {
        self.slot.policy.cpu()
    }

    pub fn max_load(&self) -> u32 {
        self.slot.max_load.load(Ordering::Acquire)
    }

    pub fn current_freq(&self) -> u32 {
        self.slot.policy.cur()
    }
}

/// on-demand 调速器：每个挂载的 CPU 一个采样线程，共享一份调优参数。
///
/// 配置写入及其对各 CPU 的副作用由 `writer` 串行化；
/// 采样周期本身不持有任何全局锁。
pub struct Governor<P: Platform> {
    shared: Arc<GovernorShared<P>>,
    writer: Mutex<()>,
}

impl<P: Platform> Governor<P> {
    pub fn new(platform: P) -> Self {
        let tunables = if platform.has_micro_idle_accounting() {
            Tunables::with_micro_accounting()
        } else {
            Tunables::new()
        };
        Self::with_tunables(platform, tunables)
    }

    pub fn with_tunables(platform: P, tunables: Tunables) -> Self {
        Self {
            shared: Arc::new(GovernorShared {
                platform,
                tunables: TunableStore::new(tunables),
                cpus: RwLock::new(BTreeMap::new()),
            }),
            writer: Mutex::new(()),
        }
    }

    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    pub fn tunables(&self) -> Arc<Tunables> {
        self.shared.tunables.snapshot()
    }

    pub fn attached_cpus(&self) -> Vec<CpuId> {
        self.shared.read_cpus().keys().copied().collect()
    }

    pub fn handle(&self, cpu: CpuId) -> Option<CpuHandle> {
        self.shared.slot(cpu).ok().map(|slot| CpuHandle { slot })
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 开始调度一个 CPU
    pub fn attach(&self, config: PolicyConfig) -> GovernorResult<CpuHandle> {
        let _writer = self.lock_writer();
        let cpu = config.cpu;

        if self.shared.read_cpus().contains_key(&cpu) {
            return Err(GovernorError::AlreadyAttached { cpu });
        }

        let policy = Arc::new(PolicyHandle::from_config(config)?);

        // 首次挂载时按切换延迟推导默认采样率
        if self.shared.tunables.snapshot().get_sampling_rate() == 0 {
            let latency_rate = u64::from(policy.transition_latency_us()) * LATENCY_MULTIPLIER;
            let (_, rate) = self
                .shared
                .tunables
                .update(|t| Ok(t.set_sampling_rate(latency_rate)))?;
            info!("Default sampling rate: {}us", rate);
        }

        let initial = self
            .shared
            .platform
            .read_idle_and_wall_time(cpu)
            .unwrap_or_else(|e| {
                warn!("cpu{cpu}: failed to read initial cpu times: {e:#}");
                CpuTimes::default()
            });

        let (tx, rx) = unbounded();
        let slot = Arc::new(CpuSlot {
            policy,
            max_load: AtomicU32::new(0),
            commands: tx,
            worker: Mutex::new(None),
        });

        let parked = self.shared.tunables.snapshot().bias_bypass();
        let worker = SamplingWorker::new(
            Arc::clone(&self.shared),
            Arc::clone(&slot),
            SampleState::new(initial),
        );
        let handle = thread::Builder::new()
            .name(format!("{SAMPLER_THREAD}{cpu}"))
            .spawn(move || worker.run(rx, parked))
            .map_err(|source| GovernorError::WorkerSpawn { cpu, source })?;
        *slot.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        self.shared
            .cpus
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cpu, Arc::clone(&slot));

        info!("cpu{cpu} attached");
        Ok(CpuHandle { slot })
    }

    /// 停止调度一个 CPU，返回时该 CPU 不会再有任何决策运行
    pub fn detach(&self, cpu: CpuId) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        let slot = self
            .shared
            .cpus
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&cpu)
            .ok_or(GovernorError::NotAttached { cpu })?;

        slot.stop();
        info!("cpu{cpu} detached");
        Ok(())
    }

    pub fn detach_all(&self) {
        let _writer = self.lock_writer();
        let slots = std::mem::take(
            &mut *self
                .shared
                .cpus
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );

        for (cpu, slot) in slots {
            slot.stop();
            info!("cpu{cpu} detached");
        }
    }

    /// 输入事件触发的立即升频。powersave bias 处于旁路档位时不做任何事。
    pub fn force_refresh(&self, cpu: CpuId) -> GovernorResult<()> {
        let slot = self.shared.slot(cpu)?;
        if self.shared.tunables.snapshot().bias_bypass().is_some() {
            debug!("cpu{cpu}: refresh ignored in powersave bias bypass");
            return Ok(());
        }

        let (ack_tx, ack_rx) = bounded(1);
        slot.send(Command::Refresh(ack_tx));
        // 采样线程已退出时发送端随命令一起被丢弃
        let _ = ack_rx.recv();
        Ok(())
    }

    fn broadcast(&self, command: Command) {
        for slot in self.shared.read_cpus().values() {
            slot.send(command.clone());
        }
    }

    fn update<R>(
        &self,
        f: impl FnOnce(&mut Tunables) -> GovernorResult<R>,
    ) -> GovernorResult<(Arc<Tunables>, R)> {
        self.shared.tunables.update(f)
    }

    /// 设置采样率（微秒），返回夹到下限后的实际值
    pub fn set_sampling_rate(&self, rate: u64) -> u64 {
        let _writer = self.lock_writer();
        let rate = match self.update(|t| Ok(t.set_sampling_rate(rate))) {
            Ok((_, rate)) => rate,
            Err(_) => return self.tunables().get_sampling_rate(),
        };
        let min = self.tunables().get_sampling_rate_min();
        self.broadcast(Command::Rearm(delay_for_sampling_rate(rate, min)));
        rate
    }

    pub fn set_up_threshold(&self, threshold: u32) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        self.update(|t| t.set_up_threshold(threshold)).map(drop)
    }

    pub fn set_up_threshold_multi_core(&self, threshold: u32) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        self.update(|t| t.set_up_threshold_multi_core(threshold)).map(drop)
    }

    pub fn set_up_threshold_any_cpu_load(&self, threshold: u32) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        self.update(|t| t.set_up_threshold_any_cpu_load(threshold)).map(drop)
    }

    pub fn set_down_differential_multi_core(&self, differential: u32) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        self.update(|t| t.set_down_differential_multi_core(differential)).map(drop)
    }

    pub fn set_sync_freq(&self, freq: u32) {
        let _writer = self.lock_writer();
        let _ = self.update(|t| {
            t.set_sync_freq(freq);
            Ok(())
        });
    }

    pub fn set_optimal_freq(&self, freq: u32) {
        let _writer = self.lock_writer();
        let _ = self.update(|t| {
            t.set_optimal_freq(freq);
            Ok(())
        });
    }

    /// 同时把所有 CPU 的采样倍率重置为 1
    pub fn set_sampling_down_factor(&self, factor: u32) -> GovernorResult<()> {
        let _writer = self.lock_writer();
        self.update(|t| t.set_sampling_down_factor(factor))?;
        self.broadcast(Command::ResetRateMultiplier);
        Ok(())
    }

    /// 值发生变化时所有 CPU 重新快照计数器
    pub fn set_ignore_nice_load(&self, ignore: bool) {
        let _writer = self.lock_writer();
        let Ok((previous, ())) = self.update(|t| {
            t.set_ignore_nice_load(ignore);
            Ok(())
        }) else {
            return;
        };
        if previous.is_ignore_nice_load() != ignore {
            self.broadcast(Command::Resnapshot);
        }
    }

    pub fn set_io_is_busy(&self, busy: bool) {
        let _writer = self.lock_writer();
        let _ = self.update(|t| {
            t.set_io_is_busy(busy);
            Ok(())
        });
    }

    /// 进入旁路档位时停靠所有采样线程并钉住频率，离开时恢复采样
    pub fn set_powersave_bias(&self, bias: i32) -> GovernorResult<i32> {
        let _writer = self.lock_writer();
        let (previous, bias) = self.update(|t| t.set_powersave_bias(bias))?;
        let before = previous.bias_bypass();
        let after = self.tunables().bias_bypass();

        match (before, after) {
            (_, Some(level)) if before != after => self.broadcast(Command::Park(level)),
            (Some(_), None) => self.broadcast(Command::Resume),
            _ => {}
        }
        Ok(bias)
    }

    /// sysfs 风格读取
    pub fn show(&self, name: &str) -> GovernorResult<String> {
        self.tunables().show(name)
    }

    /// sysfs 风格写入，字符串按目标字段类型解析
    pub fn store(&self, name: &str, value: &str) -> GovernorResult<()> {
        let name = TUNABLE_NAMES
            .iter()
            .copied()
            .find(|known| *known == name)
            .ok_or_else(|| GovernorError::UnknownTunable(name.to_string()))?;

        match name {
            "sampling_rate" => {
                self.set_sampling_rate(parse(name, value)?);
            }
            "sampling_rate_min" => {
                return Err(GovernorError::invalid(name, value, "read-only"));
            }
            "up_threshold" => self.set_up_threshold(parse(name, value)?)?,
            "down_differential_multi_core" => {
                self.set_down_differential_multi_core(parse(name, value)?)?
            }
            "up_threshold_multi_core" => self.set_up_threshold_multi_core(parse(name, value)?)?,
            "up_threshold_any_cpu_load" => {
                self.set_up_threshold_any_cpu_load(parse(name, value)?)?
            }
            "sync_freq" => self.set_sync_freq(parse(name, value)?),
            "optimal_freq" => self.set_optimal_freq(parse(name, value)?),
            "sampling_down_factor" => self.set_sampling_down_factor(parse(name, value)?)?,
            "ignore_nice_load" => self.set_ignore_nice_load(parse_flag(name, value)?),
            "powersave_bias" => {
                self.set_powersave_bias(parse(name, value)?)?;
            }
            "io_is_busy" => self.set_io_is_busy(parse_flag(name, value)?),
            _ => return Err(GovernorError::UnknownTunable(name.to_string())),
        }
        Ok(())
    }
}

impl<P: Platform> Drop for Governor<P> {
    fn drop(&mut self) {
        self.detach_all();
    }
}

fn parse<T>(name: &'static str, value: &str) -> GovernorResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| GovernorError::invalid(name, value.trim(), e.to_string()))
}

/// 非零即真，与 sysfs 开关一致
fn parse_flag(name: &'static str, value: &str) -> GovernorResult<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => parse::<i64>(name, other).map(|v| v != 0),
    }
}
