use log::debug;

use crate::model::{frequency_table::Relation, policy::PolicyView};

/// 混频结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasTarget {
    /// 平均频率正好落在某一档，无需子步
    Exact(u32),
    /// 先在 `freq_hi` 停留 `hi_ticks`，再切到 `freq_lo` 停留 `lo_ticks`
    Split {
        freq_hi: u32,
        freq_lo: u32,
        hi_ticks: u64,
        lo_ticks: u64,
    },
}

impl BiasTarget {
    /// 立即下发的频率
    pub fn freq_now(&self) -> u32 {
        match *self {
            Self::Exact(freq) => freq,
            Self::Split { freq_hi, .. } => freq_hi,
        }
    }
}

/// 按千分比 `bias` 下调请求频率，用相邻两档的时间加权平均逼近结果。
pub fn powersave_bias_target(
    policy: &PolicyView<'_>,
    freq_next: u32,
    relation: Relation,
    bias: u32,
    total_ticks: u64,
) -> BiasTarget {
    let freq_req = policy.resolve(freq_next, relation);
    let freq_reduc = (u64::from(freq_req) * u64::from(bias) / 1000) as u32;
    let freq_avg = freq_req - freq_reduc.min(freq_req);

    let freq_lo = policy.resolve(freq_avg, Relation::RoundDown);
    let freq_hi = policy.resolve(freq_avg, Relation::RoundUp);

    if freq_hi == freq_lo {
        return BiasTarget::Exact(freq_lo);
    }

    // freq_avg 可能被策略窗口夹在两档之外
    let freq_avg = freq_avg.clamp(freq_lo.min(freq_hi), freq_hi.max(freq_lo));
    // 采样率可以配得很大，乘积放到 u128 中计算
    let span = u128::from(freq_hi.abs_diff(freq_lo));
    let above_lo = u128::from(freq_avg.saturating_sub(freq_lo));
    let hi_ticks = (above_lo * u128::from(total_ticks) + span / 2) / span;
    let hi_ticks = u64::try_from(hi_ticks).unwrap_or(u64::MAX).min(total_ticks);
    let lo_ticks = total_ticks - hi_ticks;

    debug!(
        "powersave bias {}: req {}KHz -> avg {}KHz, {}KHz x{} / {}KHz x{}",
        bias, freq_req, freq_avg, freq_hi, hi_ticks, freq_lo, lo_ticks
    );

    BiasTarget::Split {
        freq_hi,
        freq_lo,
        hi_ticks,
        lo_ticks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::frequency_table::FrequencyTable;
    use proptest::prelude::*;

    fn view(table: &FrequencyTable) -> PolicyView<'_> {
        PolicyView {
            cur: table.min(),
            min: table.min(),
            max: table.max(),
            table,
        }
    }

    #[test]
    fn splits_between_bracketing_steps() {
        let table = FrequencyTable::new(0, vec![200, 400, 600, 800]).unwrap();
        // 800 的 10% 是 720，介于 600 与 800 之间
        let target = powersave_bias_target(&view(&table), 800, Relation::RoundDown, 100, 10);
        assert_eq!(
            target,
            BiasTarget::Split {
                freq_hi: 800,
                freq_lo: 600,
                hi_ticks: 6,
                lo_ticks: 4
            }
        );
        assert_eq!(target.freq_now(), 800);
    }

    #[test]
    fn exact_step_needs_no_sub_sample() {
        let table = FrequencyTable::new(0, vec![200, 400, 600, 800]).unwrap();
        // 800 的 25% 是 600
        let target = powersave_bias_target(&view(&table), 800, Relation::RoundDown, 250, 10);
        assert_eq!(target, BiasTarget::Exact(600));
    }

    #[test]
    fn average_below_table_stays_at_min() {
        let table = FrequencyTable::new(0, vec![200, 400, 600, 800]).unwrap();
        let target = powersave_bias_target(&view(&table), 200, Relation::RoundUp, 1000, 10);
        assert_eq!(target, BiasTarget::Exact(200));
    }

    #[test]
    fn huge_sampling_interval_does_not_overflow() {
        let table = FrequencyTable::new(0, vec![300_000, 1_000_000, 2_000_000]).unwrap();
        let total = crate::model::ticks::usecs_to_ticks(100_000_000_000_000_000);

        let target =
            powersave_bias_target(&view(&table), 2_000_000, Relation::RoundDown, 100, total);
        assert_eq!(
            target,
            BiasTarget::Split {
                freq_hi: 2_000_000,
                freq_lo: 1_000_000,
                hi_ticks: total / 10 * 8,
                lo_ticks: total / 10 * 2,
            }
        );

        let target =
            powersave_bias_target(&view(&table), 2_000_000, Relation::RoundDown, 100, u64::MAX);
        if let BiasTarget::Split { hi_ticks, lo_ticks, .. } = target {
            assert_eq!(hi_ticks + lo_ticks, u64::MAX);
        } else {
            panic!("expected a split, got {target:?}");
        }
    }

    proptest! {
        #[test]
        fn sub_steps_cover_the_whole_interval(
            set in prop::collection::btree_set(1u32..3_000_000, 1..12),
            freq_next in 0u32..3_100_000,
            bias in 1u32..=1000,
            total in 1u64..1_000,
        ) {
            let table = FrequencyTable::new(0, set.into_iter().collect()).unwrap();
            let policy = view(&table);
            match powersave_bias_target(&policy, freq_next, Relation::RoundDown, bias, total) {
                BiasTarget::Exact(freq) => prop_assert!(table.contains(freq)),
                BiasTarget::Split { freq_hi, freq_lo, hi_ticks, lo_ticks } => {
                    prop_assert_eq!(hi_ticks + lo_ticks, total);
                    prop_assert!(freq_lo < freq_hi);
                    prop_assert!(table.contains(freq_hi) && table.contains(freq_lo));
                }
            }
        }
    }
}
