use std::fs;

use anyhow::{Context, Result};
use log::{error, info};
use serde::Deserialize;

use crate::{
    datasource::platform::Platform,
    model::{error::GovernorResult, governor::Governor},
};

/// `[tunables]` 表，所有字段可选，缺省的字段保持当前值
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TunablesConfig {
    pub sampling_rate: Option<u64>,
    pub up_threshold: Option<u32>,
    pub down_differential_multi_core: Option<u32>,
    pub up_threshold_multi_core: Option<u32>,
    pub up_threshold_any_cpu_load: Option<u32>,
    pub sync_freq: Option<u32>,
    pub optimal_freq: Option<u32>,
    pub sampling_down_factor: Option<u32>,
    pub ignore_nice_load: Option<bool>,
    pub powersave_bias: Option<i32>,
    pub io_is_busy: Option<bool>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct GovernorConfig {
    #[serde(default)]
    pub tunables: TunablesConfig,
}

pub fn config_read(config_file: &str) -> Result<GovernorConfig> {
    let file = fs::read_to_string(config_file)
        .with_context(|| format!("Failed to open config file: {config_file}"))?;
    let config: GovernorConfig =
        toml::from_str(&file).with_context(|| format!("Failed to parse config file: {config_file}"))?;
    Ok(config)
}

fn log_result(name: &str, result: GovernorResult<()>) -> bool {
    match result {
        Ok(()) => {
            info!("{name} applied");
            true
        }
        Err(e) => {
            error!("{e}");
            false
        }
    }
}

/// 逐项写入配置，被拒绝的项记录错误并保留旧值。返回成功写入的项数。
pub fn apply_config<P: Platform>(governor: &Governor<P>, config: &GovernorConfig) -> usize {
    let t = &config.tunables;
    let mut applied = 0;

    let mut apply = |name: &str, result: GovernorResult<()>| {
        if log_result(name, result) {
            applied += 1;
        }
    };

    if let Some(rate) = t.sampling_rate {
        let rate = governor.set_sampling_rate(rate);
        apply("sampling_rate", Ok(()));
        info!("Sampling rate: {rate}us");
    }
    // 先放宽多核阈值，再校验依赖它的差值
    if let Some(v) = t.up_threshold_multi_core {
        apply("up_threshold_multi_core", governor.set_up_threshold_multi_core(v));
    }
    if let Some(v) = t.down_differential_multi_core {
        apply("down_differential_multi_core", governor.set_down_differential_multi_core(v));
    }
    if let Some(v) = t.up_threshold {
        apply("up_threshold", governor.set_up_threshold(v));
    }
    if let Some(v) = t.up_threshold_any_cpu_load {
        apply("up_threshold_any_cpu_load", governor.set_up_threshold_any_cpu_load(v));
    }
    if let Some(v) = t.sync_freq {
        governor.set_sync_freq(v);
        apply("sync_freq", Ok(()));
    }
    if let Some(v) = t.optimal_freq {
        governor.set_optimal_freq(v);
        apply("optimal_freq", Ok(()));
    }
    if let Some(v) = t.sampling_down_factor {
        apply("sampling_down_factor", governor.set_sampling_down_factor(v));
    }
    if let Some(v) = t.ignore_nice_load {
        governor.set_ignore_nice_load(v);
        apply("ignore_nice_load", Ok(()));
    }
    if let Some(v) = t.io_is_busy {
        governor.set_io_is_busy(v);
        apply("io_is_busy", Ok(()));
    }
    if let Some(v) = t.powersave_bias {
        apply("powersave_bias", governor.set_powersave_bias(v).map(drop));
    }

    info!("Load config succeed: {applied} tunables applied");
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock_platform::MockPlatform;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_table_gives_defaults() {
        let file = write_config("# nothing here\n");
        let config = config_read(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config, GovernorConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[tunables]\nup_threshold = \"high\"\n");
        assert!(config_read(file.path().to_str().unwrap()).is_err());
        assert!(config_read("/nonexistent/ondemand.toml").is_err());
    }

    #[test]
    fn applies_valid_fields_and_skips_rejected_ones() {
        let file = write_config(
            r#"
[tunables]
sampling_rate = 30000
up_threshold = 5
up_threshold_multi_core = 60
down_differential_multi_core = 50
sync_freq = 600
ignore_nice_load = true
powersave_bias = 200
"#,
        );
        let config = config_read(file.path().to_str().unwrap()).unwrap();
        let governor = Governor::new(MockPlatform::new([0]));

        assert_eq!(apply_config(&governor, &config), 6);

        let tunables = governor.tunables();
        assert_eq!(tunables.get_sampling_rate(), 30_000);
        // 越界的值被拒绝，保持默认
        assert_eq!(tunables.get_up_threshold(), 95);
        assert_eq!(tunables.get_up_threshold_multi_core(), 60);
        assert_eq!(tunables.get_down_differential_multi_core(), 50);
        assert_eq!(tunables.get_sync_freq(), 600);
        assert!(tunables.is_ignore_nice_load());
        assert_eq!(tunables.get_powersave_bias(), 200);
    }
}
