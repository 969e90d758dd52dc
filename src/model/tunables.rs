use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

use crate::{
    model::{
        error::{GovernorError, GovernorResult},
        load_sampler::SampleFlags,
        ticks::ticks_to_usecs,
    },
    utils::constants::ondemand::*,
};

/// 可通过配置接口读写的参数名（与 sysfs 属性同名）
pub const TUNABLE_NAMES: &[&str] = &[
    "sampling_rate",
    "sampling_rate_min",
    "up_threshold",
    "down_differential_multi_core",
    "up_threshold_multi_core",
    "up_threshold_any_cpu_load",
    "sync_freq",
    "optimal_freq",
    "sampling_down_factor",
    "ignore_nice_load",
    "powersave_bias",
    "io_is_busy",
];

/// powersave bias 的旁路档位：不再采样，直接钉在某一端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasBypass {
    /// powersave_bias = 1000
    PinMin,
    /// powersave_bias = -1000
    PinMax,
}

/// on-demand 调优参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// 采样周期（微秒）
    sampling_rate: u64,
    sampling_rate_min: u64,
    /// 升频阈值及其滞后下沿，两者总在同一次写入中更新
    up_threshold: u32,
    adjusted_up_threshold: u32,
    /// 多核协同
    down_differential_multi_core: u32,
    up_threshold_multi_core: u32,
    up_threshold_any_cpu_load: u32,
    sync_freq: u32,
    optimal_freq: u32,
    sampling_down_factor: u32,
    ignore_nice_load: bool,
    powersave_bias: i32,
    io_is_busy: bool,
}

impl Tunables {
    pub fn new() -> Self {
        Self {
            sampling_rate: 0,
            sampling_rate_min: MIN_SAMPLING_RATE_RATIO * ticks_to_usecs(MIN_SAMPLING_TICKS),
            up_threshold: DEF_FREQUENCY_UP_THRESHOLD,
            adjusted_up_threshold: DEF_FREQUENCY_UP_THRESHOLD - DEF_FREQUENCY_DOWN_DIFFERENTIAL,
            down_differential_multi_core: MICRO_FREQUENCY_DOWN_DIFFERENTIAL,
            up_threshold_multi_core: DEF_FREQUENCY_UP_THRESHOLD,
            up_threshold_any_cpu_load: DEF_FREQUENCY_UP_THRESHOLD,
            sync_freq: 0,
            optimal_freq: 0,
            sampling_down_factor: DEF_SAMPLING_DOWN_FACTOR,
            ignore_nice_load: false,
            powersave_bias: 0,
            io_is_busy: false,
        }
    }

    /// 平台支持微秒级空闲统计时的预设：更高的阈值、更低的采样下限
    pub fn with_micro_accounting() -> Self {
        Self {
            sampling_rate_min: MICRO_FREQUENCY_MIN_SAMPLE_RATE,
            up_threshold: MICRO_FREQUENCY_UP_THRESHOLD,
            adjusted_up_threshold: MICRO_FREQUENCY_UP_THRESHOLD - MICRO_FREQUENCY_DOWN_DIFFERENTIAL,
            ..Self::new()
        }
    }

    // Getter方法
    pub fn get_sampling_rate(&self) -> u64 { self.sampling_rate }
    pub fn get_sampling_rate_min(&self) -> u64 { self.sampling_rate_min }
    pub fn get_up_threshold(&self) -> u32 { self.up_threshold }
    pub fn get_adjusted_up_threshold(&self) -> u32 { self.adjusted_up_threshold }
    pub fn get_down_differential(&self) -> u32 { self.up_threshold - self.adjusted_up_threshold }
    pub fn get_down_differential_multi_core(&self) -> u32 { self.down_differential_multi_core }
    pub fn get_up_threshold_multi_core(&self) -> u32 { self.up_threshold_multi_core }
    pub fn get_up_threshold_any_cpu_load(&self) -> u32 { self.up_threshold_any_cpu_load }
    pub fn get_sync_freq(&self) -> u32 { self.sync_freq }
    pub fn get_optimal_freq(&self) -> u32 { self.optimal_freq }
    pub fn get_sampling_down_factor(&self) -> u32 { self.sampling_down_factor }
    pub fn is_ignore_nice_load(&self) -> bool { self.ignore_nice_load }
    pub fn get_powersave_bias(&self) -> i32 { self.powersave_bias }
    pub fn is_io_busy(&self) -> bool { self.io_is_busy }

    pub fn sample_flags(&self) -> SampleFlags {
        SampleFlags {
            ignore_nice: self.ignore_nice_load,
            io_is_busy: self.io_is_busy,
        }
    }

    /// 参与混频计算的 bias（千分比），0 或负值时不生效
    pub fn active_powersave_bias(&self) -> Option<u32> {
        (self.powersave_bias > 0).then_some(self.powersave_bias.unsigned_abs())
    }

    pub fn bias_bypass(&self) -> Option<BiasBypass> {
        match self.powersave_bias {
            POWERSAVE_BIAS_MAXLEVEL => Some(BiasBypass::PinMin),
            POWERSAVE_BIAS_MINLEVEL => Some(BiasBypass::PinMax),
            _ => None,
        }
    }

    // Setter方法

    /// 低于下限时取下限，返回实际生效值
    pub fn set_sampling_rate(&mut self, rate: u64) -> u64 {
        self.sampling_rate = rate.max(self.sampling_rate_min);
        debug!("Set sampling rate to: {}us", self.sampling_rate);
        self.sampling_rate
    }

    pub fn set_up_threshold(&mut self, threshold: u32) -> GovernorResult<()> {
        check_threshold("up_threshold", threshold)?;
        // 保持原有的滞后差值
        let differential = self.get_down_differential();
        self.adjusted_up_threshold = threshold.saturating_sub(differential);
        self.up_threshold = threshold;
        debug!(
            "Set up threshold to: {}% (adjusted {}%)",
            threshold, self.adjusted_up_threshold
        );
        Ok(())
    }

    pub fn set_up_threshold_multi_core(&mut self, threshold: u32) -> GovernorResult<()> {
        check_threshold("up_threshold_multi_core", threshold)?;
        self.up_threshold_multi_core = threshold;
        debug!("Set multi-core up threshold to: {}%", threshold);
        Ok(())
    }

    pub fn set_up_threshold_any_cpu_load(&mut self, threshold: u32) -> GovernorResult<()> {
        check_threshold("up_threshold_any_cpu_load", threshold)?;
        self.up_threshold_any_cpu_load = threshold;
        debug!("Set any-cpu load threshold to: {}%", threshold);
        Ok(())
    }

    pub fn set_down_differential_multi_core(&mut self, differential: u32) -> GovernorResult<()> {
        if differential >= self.up_threshold_multi_core {
            return Err(GovernorError::invalid(
                "down_differential_multi_core",
                differential,
                format!("must be below up_threshold_multi_core ({})", self.up_threshold_multi_core),
            ));
        }
        self.down_differential_multi_core = differential;
        debug!("Set multi-core down differential to: {}%", differential);
        Ok(())
    }

    pub fn set_sync_freq(&mut self, freq: u32) {
        self.sync_freq = freq;
        debug!("Set sync freq to: {}KHz", freq);
    }

    pub fn set_optimal_freq(&mut self, freq: u32) {
        self.optimal_freq = freq;
        debug!("Set optimal freq to: {}KHz", freq);
    }

    pub fn set_sampling_down_factor(&mut self, factor: u32) -> GovernorResult<()> {
        if !(1..=MAX_SAMPLING_DOWN_FACTOR).contains(&factor) {
            return Err(GovernorError::invalid(
                "sampling_down_factor",
                factor,
                format!("expected 1..={MAX_SAMPLING_DOWN_FACTOR}"),
            ));
        }
        self.sampling_down_factor = factor;
        debug!("Set sampling down factor to: {}", factor);
        Ok(())
    }

    pub fn set_ignore_nice_load(&mut self, ignore: bool) {
        self.ignore_nice_load = ignore;
        debug!("Set ignore nice load: {}", if ignore { "enabled" } else { "disabled" });
    }

    pub fn set_io_is_busy(&mut self, busy: bool) {
        self.io_is_busy = busy;
        debug!("Set io is busy: {}", if busy { "enabled" } else { "disabled" });
    }

    /// ≥1000 钉最低频，≤-1000 钉最高频，(−1000, 0) 拒绝；返回实际生效值
    pub fn set_powersave_bias(&mut self, bias: i32) -> GovernorResult<i32> {
        let bias = if bias >= POWERSAVE_BIAS_MAXLEVEL {
            POWERSAVE_BIAS_MAXLEVEL
        } else if bias <= POWERSAVE_BIAS_MINLEVEL {
            POWERSAVE_BIAS_MINLEVEL
        } else if bias < 0 {
            return Err(GovernorError::invalid(
                "powersave_bias",
                bias,
                format!("expected 0..={POWERSAVE_BIAS_MAXLEVEL} or <= {POWERSAVE_BIAS_MINLEVEL}"),
            ));
        } else {
            bias
        };
        self.powersave_bias = bias;
        debug!("Set powersave bias to: {}", bias);
        Ok(bias)
    }

    /// sysfs 风格的读取
    pub fn show(&self, name: &str) -> GovernorResult<String> {
        let value = match name {
            "sampling_rate" => self.sampling_rate.to_string(),
            "sampling_rate_min" => self.sampling_rate_min.to_string(),
            "up_threshold" => self.up_threshold.to_string(),
            "down_differential_multi_core" => self.down_differential_multi_core.to_string(),
            "up_threshold_multi_core" => self.up_threshold_multi_core.to_string(),
            "up_threshold_any_cpu_load" => self.up_threshold_any_cpu_load.to_string(),
            "sync_freq" => self.sync_freq.to_string(),
            "optimal_freq" => self.optimal_freq.to_string(),
            "sampling_down_factor" => self.sampling_down_factor.to_string(),
            "ignore_nice_load" => u8::from(self.ignore_nice_load).to_string(),
            "powersave_bias" => self.powersave_bias.to_string(),
            "io_is_busy" => u8::from(self.io_is_busy).to_string(),
            _ => return Err(GovernorError::UnknownTunable(name.to_string())),
        };
        Ok(value)
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self::new()
    }
}

fn check_threshold(name: &'static str, threshold: u32) -> GovernorResult<()> {
    if !(MIN_FREQUENCY_UP_THRESHOLD..=MAX_FREQUENCY_UP_THRESHOLD).contains(&threshold) {
        return Err(GovernorError::invalid(
            name,
            threshold,
            format!("expected {MIN_FREQUENCY_UP_THRESHOLD}..={MAX_FREQUENCY_UP_THRESHOLD}"),
        ));
    }
    Ok(())
}

/// 全局参数的快照存储：写入在独占锁内拷贝、修改、整体替换，
/// 读者拿到的 `Arc<Tunables>` 总是某一次完整提交的结果。
#[derive(Debug)]
pub struct TunableStore {
    current: RwLock<Arc<Tunables>>,
}

impl TunableStore {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            current: RwLock::new(Arc::new(tunables)),
        }
    }

    pub fn snapshot(&self) -> Arc<Tunables> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 在副本上执行修改，成功才提交；返回 (提交前快照, 修改结果)
    pub fn update<R, F>(&self, f: F) -> GovernorResult<(Arc<Tunables>, R)>
    where
        F: FnOnce(&mut Tunables) -> GovernorResult<R>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Tunables::clone(&guard);
        let out = f(&mut next)?;
        let previous = std::mem::replace(&mut *guard, Arc::new(next));
        Ok((previous, out))
    }
}
