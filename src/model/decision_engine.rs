use log::debug;

use crate::model::{
    frequency_table::Relation,
    policy::{CpuId, PolicyView},
    powersave_bias::{BiasTarget, powersave_bias_target},
    sample_state::SampleState,
    ticks::usecs_to_ticks,
    tunables::Tunables,
};

/// 其他在线 CPU 上一周期发布的负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLoad {
    pub cpu: CpuId,
    pub load: u32,
    /// 该 CPU 的策略当前运行在最高频
    pub at_max: bool,
}

/// 一个采样周期的调频决策，频率已按策略窗口吸附到频率表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Increase { freq: u32, relation: Relation },
    Decrease { freq: u32, relation: Relation },
}

impl Decision {
    pub fn target(&self) -> Option<(u32, Relation)> {
        match *self {
            Self::Hold => None,
            Self::Increase { freq, relation } | Self::Decrease { freq, relation } => {
                Some((freq, relation))
            }
        }
    }
}

/// on-demand 决策引擎，除 `SampleState` 外不持有任何状态
pub struct DecisionEngine;

impl DecisionEngine {
    /// 每个采样周期调用一次。`load_freq` 为负载百分比乘以当前频率，
    /// 所有阈值都以 `阈值 × cur` 的形式比较。
    pub fn check_cpu(
        state: &mut SampleState,
        load_freq: u64,
        policy: PolicyView<'_>,
        peers: &[PeerLoad],
        online_cpus: usize,
        tunables: &Tunables,
    ) -> Decision {
        let cur = u64::from(policy.cur);
        let max_load_other = Self::max_load_other(peers, policy.cur, tunables);

        state.clear_sub_sample();

        // 升频：直接拉到最高
        if load_freq > u64::from(tunables.get_up_threshold()) * cur {
            if policy.cur < policy.max {
                state.rate_multiplier = tunables.get_sampling_down_factor();
            }
            debug!(
                "load {} above up threshold {}%, going to max",
                load_freq,
                tunables.get_up_threshold()
            );
            return Self::freq_increase(state, &policy, policy.max, tunables);
        }

        let multi_core = online_cpus > 1;

        if multi_core {
            if max_load_other > tunables.get_up_threshold_any_cpu_load() {
                debug!("peer load {}% above any-cpu threshold, syncing", max_load_other);
                if policy.cur < tunables.get_sync_freq() {
                    return Self::freq_increase(state, &policy, tunables.get_sync_freq(), tunables);
                }
                return Decision::Hold;
            }

            if load_freq > u64::from(tunables.get_up_threshold_multi_core()) * cur {
                debug!("load {} above multi-core threshold", load_freq);
                if policy.cur < tunables.get_optimal_freq() {
                    return Self::freq_increase(
                        state,
                        &policy,
                        tunables.get_optimal_freq(),
                        tunables,
                    );
                }
                return Decision::Hold;
            }
        }

        // 已在最低频，无法再降
        if policy.cur == policy.min {
            return Decision::Hold;
        }

        let adjusted = tunables.get_adjusted_up_threshold().max(1);
        if load_freq >= u64::from(adjusted) * cur {
            return Decision::Hold;
        }

        // 能承载当前负载且不触发升频的最低频率
        let mut freq_next = u32::try_from(load_freq / u64::from(adjusted))
            .unwrap_or(u32::MAX)
            .max(policy.min);
        state.rate_multiplier = 1;

        if multi_core {
            let sync_margin = tunables
                .get_up_threshold_multi_core()
                .saturating_sub(tunables.get_down_differential());
            if max_load_other > sync_margin && freq_next < tunables.get_sync_freq() {
                freq_next = tunables.get_sync_freq();
            }

            let optimal_margin = tunables
                .get_up_threshold_multi_core()
                .saturating_sub(tunables.get_down_differential_multi_core());
            if freq_next < tunables.get_optimal_freq()
                && load_freq > u64::from(optimal_margin) * cur
            {
                freq_next = tunables.get_optimal_freq();
            }
        }

        let freq = match tunables.active_powersave_bias() {
            Some(bias) => {
                let blended = Self::blend(state, &policy, freq_next, bias, tunables);
                policy.resolve(blended, Relation::RoundDown)
            }
            None => policy.resolve(freq_next, Relation::RoundDown),
        };

        debug!("scale down: load {} -> {}KHz (cur {}KHz)", load_freq, freq, policy.cur);
        Decision::Decrease {
            freq,
            relation: Relation::RoundDown,
        }
    }

    /// 挂在最高频的对端至少按 `up_threshold_any_cpu_load` 计，避免频率失衡
    fn max_load_other(peers: &[PeerLoad], cur: u32, tunables: &Tunables) -> u32 {
        let pinned_counts = cur >= tunables.get_optimal_freq();
        peers
            .iter()
            .map(|peer| {
                if peer.at_max && pinned_counts {
                    peer.load.max(tunables.get_up_threshold_any_cpu_load())
                } else {
                    peer.load
                }
            })
            .max()
            .unwrap_or(0)
    }

    fn freq_increase(
        state: &mut SampleState,
        policy: &PolicyView<'_>,
        freq: u32,
        tunables: &Tunables,
    ) -> Decision {
        match tunables.active_powersave_bias() {
            Some(bias) => {
                let blended = Self::blend(state, policy, freq, bias, tunables);
                Decision::Increase {
                    freq: policy.resolve(blended, Relation::RoundUp),
                    relation: Relation::RoundUp,
                }
            }
            None if policy.cur == policy.max => Decision::Hold,
            None => Decision::Increase {
                freq: policy.resolve(freq, Relation::RoundDown),
                relation: Relation::RoundDown,
            },
        }
    }

    fn blend(
        state: &mut SampleState,
        policy: &PolicyView<'_>,
        freq: u32,
        bias: u32,
        tunables: &Tunables,
    ) -> u32 {
        let total_ticks = usecs_to_ticks(tunables.get_sampling_rate());
        let target = powersave_bias_target(policy, freq, Relation::RoundDown, bias, total_ticks);
        if let BiasTarget::Split {
            freq_lo,
            hi_ticks,
            lo_ticks,
            ..
        } = target
        {
            state.freq_lo = freq_lo;
            state.freq_lo_ticks = lo_ticks;
            state.freq_hi_ticks = hi_ticks;
        }
        target.freq_now()
    }
}
