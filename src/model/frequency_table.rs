use log::debug;

use crate::model::{
    error::{GovernorError, GovernorResult},
    policy::CpuId,
};

/// 频率吸附方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// 不低于目标的最小频率
    RoundUp,
    /// 不高于目标的最大频率
    RoundDown,
}

/// 在升序频率表中选出目标频率，返回 (索引, 频率)。
///
/// 目标超出表的范围时分别落到最高或最低档；表为空时返回 `None`。
pub fn select_target(entries: &[u32], target: u32, relation: Relation) -> Option<(usize, u32)> {
    let last = entries.len().checked_sub(1)?;
    let idx = match relation {
        Relation::RoundUp => entries.partition_point(|&f| f < target).min(last),
        Relation::RoundDown => entries.partition_point(|&f| f <= target).saturating_sub(1),
    };
    Some((idx, entries[idx]))
}

/// 可用频率表（KHz，升序且不重复，至少一项）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<u32>,
}

impl FrequencyTable {
    pub fn new(cpu: CpuId, mut freqs: Vec<u32>) -> GovernorResult<Self> {
        freqs.retain(|&f| f > 0);
        freqs.sort_unstable();
        freqs.dedup();

        if freqs.is_empty() {
            return Err(GovernorError::EmptyFrequencyTable { cpu });
        }

        debug!("cpu{cpu} frequency table: {freqs:?}");
        Ok(Self { entries: freqs })
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn min(&self) -> u32 {
        self.entries.first().copied().unwrap_or(0)
    }

    pub fn max(&self) -> u32 {
        self.entries.last().copied().unwrap_or(0)
    }

    pub fn contains(&self, freq: u32) -> bool {
        self.entries.binary_search(&freq).is_ok()
    }

    pub fn select(&self, target: u32, relation: Relation) -> u32 {
        select_target(&self.entries, target, relation).map_or(0, |(_, f)| f)
    }

    /// 在策略限制 [min, max] 内选频：目标先夹到窗口内，只考虑窗口内的档位。
    /// 窗口内一个档位都没有时退回整张表。
    pub fn select_within(&self, target: u32, relation: Relation, min: u32, max: u32) -> u32 {
        let target = target.max(min).min(max);
        let lo = self.entries.partition_point(|&f| f < min);
        let hi = self.entries.partition_point(|&f| f <= max);

        let window = if lo < hi {
            &self.entries[lo..hi]
        } else {
            &self.entries[..]
        };

        select_target(window, target, relation).map_or(0, |(_, f)| f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> FrequencyTable {
        FrequencyTable::new(0, vec![800, 200, 600, 400, 400]).expect("non-empty table")
    }

    #[test]
    fn new_sorts_and_dedups() {
        assert_eq!(table().entries(), &[200, 400, 600, 800]);
        assert_eq!(table().min(), 200);
        assert_eq!(table().max(), 800);
    }

    #[test]
    fn empty_table_is_rejected() {
        let err = FrequencyTable::new(3, vec![0]).unwrap_err();
        assert!(matches!(err, GovernorError::EmptyFrequencyTable { cpu: 3 }));
        assert_eq!(select_target(&[], 100, Relation::RoundUp), None);
    }

    #[test]
    fn round_up_and_down_between_steps() {
        let t = table();
        assert_eq!(t.select(450, Relation::RoundUp), 600);
        assert_eq!(t.select(450, Relation::RoundDown), 400);
        assert_eq!(t.select(900, Relation::RoundUp), 800);
        assert_eq!(t.select(100, Relation::RoundDown), 200);
        assert_eq!(select_target(t.entries(), 601, Relation::RoundDown), Some((2, 600)));
    }

    #[test]
    fn select_within_honours_policy_window() {
        let t = table();
        assert_eq!(t.select_within(800, Relation::RoundUp, 200, 600), 600);
        assert_eq!(t.select_within(100, Relation::RoundDown, 400, 800), 400);
        assert_eq!(t.select_within(500, Relation::RoundUp, 400, 600), 600);
        // 窗口与表不相交时退回整张表
        assert_eq!(t.select_within(500, Relation::RoundDown, 610, 790), 600);
    }

    fn ascending_table() -> impl Strategy<Value = Vec<u32>> {
        prop::collection::btree_set(1u32..3_000_000, 1..16)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
    }

    proptest! {
        #[test]
        fn round_up_never_undershoots(entries in ascending_table(), target in 0u32..3_100_000) {
            let (idx, freq) = select_target(&entries, target, Relation::RoundUp).unwrap();
            prop_assert_eq!(entries[idx], freq);
            let max = *entries.last().unwrap();
            if target > max {
                prop_assert_eq!(freq, max);
            } else {
                prop_assert!(freq >= target);
                prop_assert!(entries[..idx].iter().all(|&f| f < target));
            }
        }

        #[test]
        fn round_down_never_overshoots(entries in ascending_table(), target in 0u32..3_100_000) {
            let (idx, freq) = select_target(&entries, target, Relation::RoundDown).unwrap();
            prop_assert_eq!(entries[idx], freq);
            let min = entries[0];
            if target < min {
                prop_assert_eq!(freq, min);
            } else {
                prop_assert!(freq <= target);
                prop_assert!(entries[idx + 1..].iter().all(|&f| f > target));
            }
        }

        #[test]
        fn members_select_themselves(entries in ascending_table(), pick in any::<prop::sample::Index>()) {
            let member = entries[pick.index(entries.len())];
            prop_assert_eq!(select_target(&entries, member, Relation::RoundUp).unwrap().1, member);
            prop_assert_eq!(select_target(&entries, member, Relation::RoundDown).unwrap().1, member);
        }
    }
}
