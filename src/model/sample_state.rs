use log::debug;

use crate::model::load_sampler::{CpuTimes, LoadSample, SampleFlags, compute_load};

/// 下一次唤醒的类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleType {
    #[default]
    Normal,
    /// powersave bias 的低频子步
    SubSample,
}

/// 每个 CPU 在两次采样之间保留的状态，只由该 CPU 自己的采样线程修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleState {
    pub prev: CpuTimes,
    pub rate_multiplier: u32,
    pub sample_type: SampleType,
    pub freq_lo: u32,
    pub freq_lo_ticks: u64,
    pub freq_hi_ticks: u64,
}

impl SampleState {
    pub fn new(initial: CpuTimes) -> Self {
        Self {
            prev: initial,
            rate_multiplier: 1,
            sample_type: SampleType::Normal,
            freq_lo: 0,
            freq_lo_ticks: 0,
            freq_hi_ticks: 0,
        }
    }

    pub fn snapshot(&mut self, now: CpuTimes) {
        self.prev = now;
    }

    /// 计算自上次快照以来的负载并刷新快照（无论是否有效）
    pub fn sample(&mut self, now: CpuTimes, cur_freq: u32, flags: SampleFlags) -> LoadSample {
        let result = compute_load(&self.prev, &now, flags);
        self.prev = now;

        match result {
            Some((load, wrapped)) => LoadSample::Measured {
                load,
                load_freq: u64::from(load) * u64::from(cur_freq),
                wrapped,
            },
            None => {
                debug!("Wall clock did not advance, skipping sample");
                LoadSample::NoData
            }
        }
    }

    pub fn clear_sub_sample(&mut self) {
        self.sample_type = SampleType::Normal;
        self.freq_lo = 0;
        self.freq_lo_ticks = 0;
        self.freq_hi_ticks = 0;
    }

    pub fn has_sub_sample(&self) -> bool {
        self.freq_lo != 0
    }
}
