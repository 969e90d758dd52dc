use std::time::{Duration, Instant};

use crate::utils::constants::TICK_US;

/// 向上取整到节拍
pub fn usecs_to_ticks(us: u64) -> u64 {
    us.div_ceil(TICK_US)
}

pub fn ticks_to_usecs(ticks: u64) -> u64 {
    ticks.saturating_mul(TICK_US)
}

pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_micros(ticks_to_usecs(ticks))
}

/// 常规采样周期对应的延迟，至少一个节拍且不低于最小采样率
pub fn delay_for_sampling_rate(rate_us: u64, min_rate_us: u64) -> Duration {
    ticks_to_duration(usecs_to_ticks(rate_us.max(min_rate_us)).max(1))
}

/// 超出 `Instant` 表示范围时退回的最长等待
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 3600);

/// 从现在起 `delay` 之后的截止时间，溢出时截到 `MAX_WAIT`
pub fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay.min(MAX_WAIT)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_up() {
        assert_eq!(usecs_to_ticks(0), 0);
        assert_eq!(usecs_to_ticks(1), 1);
        assert_eq!(usecs_to_ticks(TICK_US), 1);
        assert_eq!(usecs_to_ticks(TICK_US + 1), 2);
        assert_eq!(ticks_to_duration(3), Duration::from_micros(3 * TICK_US));
    }

    #[test]
    fn sampling_delay_respects_floor() {
        assert_eq!(
            delay_for_sampling_rate(0, 10_000),
            Duration::from_micros(usecs_to_ticks(10_000) * TICK_US)
        );
        assert_eq!(delay_for_sampling_rate(0, 0), ticks_to_duration(1));
    }

    #[test]
    fn huge_delay_saturates_deadline() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline > before);
        assert!(deadline <= Instant::now() + MAX_WAIT);

        let delay = ticks_to_duration(usecs_to_ticks(u64::MAX));
        assert!(deadline_after(delay) > before);
    }
}
