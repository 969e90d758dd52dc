use std::path::Path;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::{
    datasource::file_path::*,
    model::policy::{CpuId, PolicyConfig},
    utils::file_operate::{check_read_simple, read_file, read_value, write_file},
};

/// scaling_available_frequencies: 空格分隔的 KHz 列表
pub fn parse_available_frequencies(content: &str) -> Vec<u32> {
    content
        .split_whitespace()
        .filter_map(|v| v.parse().ok())
        .collect()
}

/// stats/time_in_state: 每行 "<freq> <time>"
pub fn parse_time_in_state(content: &str) -> Vec<u32> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().next()?.parse().ok())
        .collect()
}

fn read_frequencies(cpu_dir: &Path) -> Result<Vec<u32>> {
    let available = cpu_dir.join(SCALING_AVAILABLE_FREQS);
    if check_read_simple(&available) {
        let freqs = parse_available_frequencies(&read_file(&available, 1024)?);
        if !freqs.is_empty() {
            return Ok(freqs);
        }
    }

    let time_in_state = cpu_dir.join(TIME_IN_STATE);
    if check_read_simple(&time_in_state) {
        let freqs = parse_time_in_state(&read_file(&time_in_state, 4096)?);
        if !freqs.is_empty() {
            debug!("Frequencies taken from {}", time_in_state.display());
            return Ok(freqs);
        }
    }

    // 没有频率表时只能在硬件上下限之间切换
    warn!("No frequency table under {}, using cpuinfo limits", cpu_dir.display());
    let min: u32 = read_value(cpu_dir.join(CPUINFO_MIN_FREQ))?;
    let max: u32 = read_value(cpu_dir.join(CPUINFO_MAX_FREQ))?;
    Ok(vec![min, max])
}

/// cpuinfo_transition_latency 以纳秒给出，未知时为 CPUFREQ_ETERNAL
fn read_transition_latency_us(cpu_dir: &Path) -> u32 {
    match read_value::<u64, _>(cpu_dir.join(CPUINFO_TRANSITION_LATENCY)) {
        Ok(CPUFREQ_ETERNAL) | Err(_) => 0,
        Ok(ns) => u32::try_from(ns / 1000).unwrap_or(u32::MAX),
    }
}

/// 从 sysfs 读取一个 CPU 的调频策略
pub fn read_policy_config(cpu_dir: &Path, cpu: CpuId) -> Result<PolicyConfig> {
    if !cpu_dir.join("cpufreq").exists() {
        bail!("cpu{cpu} has no cpufreq policy");
    }

    let frequencies = read_frequencies(cpu_dir)
        .with_context(|| format!("Failed to read frequency table of cpu{cpu}"))?;
    let cur_freq: u32 = read_value(cpu_dir.join(SCALING_CUR_FREQ))?;

    let mut config = PolicyConfig::new(cpu, frequencies, cur_freq);
    config.min_freq = read_value(cpu_dir.join(SCALING_MIN_FREQ)).ok();
    config.max_freq = read_value(cpu_dir.join(SCALING_MAX_FREQ)).ok();
    config.transition_latency_us = read_transition_latency_us(cpu_dir);

    info!(
        "cpu{}: {} frequencies, transition latency {}us",
        cpu,
        config.frequencies.len(),
        config.transition_latency_us
    );
    Ok(config)
}

/// 切换到 userspace 调速器，此后 scaling_setspeed 才可写
pub fn switch_to_userspace(cpu_dir: &Path) -> Result<()> {
    let node = cpu_dir.join(SCALING_GOVERNOR);
    let current = read_file(&node, 64)?;
    if current.trim() == USERSPACE_GOVERNOR {
        return Ok(());
    }

    write_file(&node, USERSPACE_GOVERNOR)?;
    info!(
        "{}: {} -> {}",
        cpu_dir.display(),
        current.trim(),
        USERSPACE_GOVERNOR
    );
    Ok(())
}
