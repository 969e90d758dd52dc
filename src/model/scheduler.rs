use std::{
    sync::{Arc, atomic::Ordering},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};

use crate::{
    datasource::platform::Platform,
    model::{
        decision_engine::{DecisionEngine, PeerLoad},
        error::GovernorError,
        frequency_table::Relation,
        governor::{CpuSlot, GovernorShared},
        load_sampler::LoadSample,
        policy::{CpuId, PolicyHandle},
        sample_state::{SampleState, SampleType},
        ticks::{deadline_after, delay_for_sampling_rate, ticks_to_duration},
        tunables::{BiasBypass, Tunables},
    },
};

/// 发给采样线程的控制命令
#[derive(Debug, Clone)]
pub(crate) enum Command {
    Stop,
    /// 采样率变小，新的截止时间更早时提前唤醒
    Rearm(Duration),
    ResetRateMultiplier,
    Resnapshot,
    /// 拉到最高频并重新快照，完成后回执
    Refresh(Sender<()>),
    Park(BiasBypass),
    Resume,
}

/// 下发一次频率，只在目标与当前不同时调用平台。返回是否发生了切换。
pub(crate) fn apply_frequency<P: Platform>(
    platform: &P,
    policy: &PolicyHandle,
    freq: u32,
    relation: Relation,
) -> bool {
    let _guard = policy.lock_apply();
    let target = policy.view().resolve(freq, relation);
    let cur = policy.cur();
    if target == cur {
        return false;
    }

    match platform.apply_frequency(policy, target, relation) {
        Ok(()) => {
            debug!("cpu{}: {}KHz -> {}KHz", policy.cpu(), cur, target);
            policy.set_cur(target);
            true
        }
        Err(e) => {
            let err = GovernorError::FrequencyApplyFailed {
                cpu: policy.cpu(),
                freq: target,
                source: e.into(),
            };
            warn!("{err}");
            false
        }
    }
}

/// 单个 CPU 的采样线程。`SampleState` 只在这里被修改。
pub(crate) struct SamplingWorker<P: Platform> {
    shared: Arc<GovernorShared<P>>,
    slot: Arc<CpuSlot>,
    state: SampleState,
    /// None 表示已停靠（powersave bias 旁路档位）
    deadline: Option<Instant>,
}

impl<P: Platform> SamplingWorker<P> {
    pub(crate) fn new(shared: Arc<GovernorShared<P>>, slot: Arc<CpuSlot>, state: SampleState) -> Self {
        Self {
            shared,
            slot,
            state,
            deadline: None,
        }
    }

    fn cpu(&self) -> CpuId {
        self.slot.policy.cpu()
    }

    pub(crate) fn run(mut self, commands: Receiver<Command>, parked: Option<BiasBypass>) {
        info!("cpu{} sampler started", self.cpu());

        match parked {
            Some(level) => self.park(level),
            None => self.arm_after(self.normal_delay(&self.shared.tunables.snapshot())),
        }

        loop {
            let received = match self.deadline {
                Some(deadline) => commands.recv_deadline(deadline),
                None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => self.od_dbs_timer(),
            }
        }

        info!("cpu{} sampler stopped", self.cpu());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Stop => {}
            Command::Rearm(delay) => {
                let next = deadline_after(delay);
                if self.deadline.is_some_and(|deadline| next < deadline) {
                    debug!("cpu{}: sampling rate shrunk, re-arming early", self.cpu());
                    self.deadline = Some(next);
                }
            }
            Command::ResetRateMultiplier => self.state.rate_multiplier = 1,
            Command::Resnapshot => self.resnapshot(),
            Command::Refresh(ack) => {
                if self.deadline.is_some() {
                    self.force_refresh();
                }
                let _ = ack.send(());
            }
            Command::Park(level) => self.park(level),
            Command::Resume => {
                if self.deadline.is_none() {
                    info!("cpu{}: leaving powersave bias bypass", self.cpu());
                    self.resnapshot();
                    self.state.clear_sub_sample();
                    self.arm_after(self.normal_delay(&self.shared.tunables.snapshot()));
                }
            }
        }
    }

    /// 一次定时唤醒：先执行本周期的调频，再计算下一次唤醒
    fn od_dbs_timer(&mut self) {
        let tunables = self.shared.tunables.snapshot();

        let delay = match self.state.sample_type {
            SampleType::SubSample => {
                self.state.sample_type = SampleType::Normal;
                self.apply(self.state.freq_lo, Relation::RoundDown);
                ticks_to_duration(self.state.freq_lo_ticks)
            }
            SampleType::Normal => {
                self.dbs_check_cpu(&tunables);
                if self.state.has_sub_sample() {
                    self.state.sample_type = SampleType::SubSample;
                    ticks_to_duration(self.state.freq_hi_ticks)
                } else {
                    self.normal_delay(&tunables)
                }
            }
        };

        self.arm_after(delay);
    }

    /// 限频窗口变化后当前频率可能落在窗口外，先拉回窗口边界
    fn refresh_limits(&self) {
        let policy = &self.slot.policy;
        self.shared.platform.refresh_limits(policy);
        let view = policy.view();
        if view.cur > view.max {
            self.apply(view.max, Relation::RoundUp);
        } else if view.cur < view.min {
            self.apply(view.min, Relation::RoundDown);
        }
    }

    fn dbs_check_cpu(&mut self, tunables: &Tunables) {
        let cpu = self.cpu();
        self.refresh_limits();
        let now = match self.shared.platform.read_idle_and_wall_time(cpu) {
            Ok(times) => times,
            Err(e) => {
                warn!("cpu{cpu}: failed to read cpu times: {e:#}");
                self.state.clear_sub_sample();
                return;
            }
        };

        let policy = Arc::clone(&self.slot.policy);
        let (load, load_freq) = match self.state.sample(now, policy.cur(), tunables.sample_flags()) {
            LoadSample::NoData => {
                self.state.clear_sub_sample();
                return;
            }
            LoadSample::Measured {
                load,
                load_freq,
                wrapped,
            } => {
                if wrapped {
                    warn!("{}", GovernorError::StaleCounterWrap { cpu, counter: "idle" });
                }
                (load, load_freq)
            }
        };
        self.slot.max_load.store(load, Ordering::Release);

        let online = self.shared.platform.online_cpus();
        let peers = self.peer_loads(online.iter().copied().filter(|&other| other != cpu));

        let decision = DecisionEngine::check_cpu(
            &mut self.state,
            load_freq,
            policy.view(),
            &peers,
            online.len(),
            tunables,
        );
        debug!("cpu{cpu}: load {load}% @ {}KHz -> {decision:?}", policy.cur());

        if let Some((freq, relation)) = decision.target() {
            self.apply(freq, relation);
        }
    }

    fn peer_loads(&self, others: impl Iterator<Item = CpuId>) -> Vec<PeerLoad> {
        let cpus = self.shared.read_cpus();
        others
            .filter_map(|cpu| {
                let slot = cpus.get(&cpu)?;
                Some(PeerLoad {
                    cpu,
                    load: slot.max_load.load(Ordering::Acquire),
                    at_max: self.shared.platform.is_policy_at_max(&slot.policy),
                })
            })
            .collect()
    }

    fn normal_delay(&self, tunables: &Tunables) -> Duration {
        let rate = tunables
            .get_sampling_rate()
            .saturating_mul(u64::from(self.state.rate_multiplier));
        delay_for_sampling_rate(rate, tunables.get_sampling_rate_min())
    }

    fn arm_after(&mut self, delay: Duration) {
        self.deadline = Some(deadline_after(delay));
    }

    fn apply(&self, freq: u32, relation: Relation) -> bool {
        apply_frequency(&self.shared.platform, &self.slot.policy, freq, relation)
    }

    fn resnapshot(&mut self) {
        let cpu = self.cpu();
        match self.shared.platform.read_idle_and_wall_time(cpu) {
            Ok(times) => self.state.snapshot(times),
            Err(e) => warn!("cpu{cpu}: failed to re-snapshot cpu times: {e:#}"),
        }
    }

    fn force_refresh(&mut self) {
        let policy = &self.slot.policy;
        if policy.cur() < policy.max() {
            debug!("cpu{}: refresh to max", self.cpu());
            self.apply(policy.max(), Relation::RoundUp);
            self.resnapshot();
        }
    }

    fn park(&mut self, level: BiasBypass) {
        let policy = &self.slot.policy;
        info!("cpu{}: powersave bias bypass {:?}", self.cpu(), level);
        match level {
            BiasBypass::PinMin => self.apply(policy.min(), Relation::RoundUp),
            BiasBypass::PinMax => self.apply(policy.max(), Relation::RoundDown),
        };
        self.state.clear_sub_sample();
        self.deadline = None;
    }
}
