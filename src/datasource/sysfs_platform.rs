use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};

use crate::{
    datasource::{file_path::*, platform::Platform},
    model::{
        frequency_table::Relation,
        load_sampler::CpuTimes,
        policy::{CpuId, PolicyHandle},
    },
    utils::file_operate::{read_file, read_value, write_file},
};

/// 每个 USER_HZ 节拍对应的微秒数
fn usecs_per_user_tick() -> u64 {
    // SAFETY: sysconf 只读取一个系统常量
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz > 0 {
        1_000_000 / hz as u64
    } else {
        warn!("sysconf(_SC_CLK_TCK) failed, assuming 100Hz");
        10_000
    }
}

/// 解析 /proc/stat 中某个 CPU 的一行。
///
/// 字段顺序：user nice system idle iowait irq softirq steal ...（单位 USER_HZ）。
/// 返回的 idle 包含 iowait，wall 为前八项之和。
pub fn parse_proc_stat(content: &str, cpu: CpuId, usecs_per_tick: u64) -> Result<CpuTimes> {
    let label = format!("cpu{cpu}");
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some(label.as_str()))
        .ok_or_else(|| anyhow!("{label} not found in {PROC_STAT}"))?;

    let fields = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(|v| v.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Malformed {PROC_STAT} line: {line}"))?;

    if fields.len() < 5 {
        bail!("Too few fields in {PROC_STAT} line: {line}");
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    let (nice, idle, iowait) = (field(1), field(3), field(4));
    let wall: u64 = fields.iter().sum();

    Ok(CpuTimes {
        idle: (idle + iowait) * usecs_per_tick,
        wall: wall * usecs_per_tick,
        nice: nice * usecs_per_tick,
        iowait: iowait * usecs_per_tick,
    })
}

/// 解析内核 CPU 列表格式，例如 "0-3,5"
pub fn parse_cpu_list(list: &str) -> Result<BTreeSet<CpuId>> {
    let mut cpus = BTreeSet::new();
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: CpuId = start.trim().parse().with_context(|| format!("Bad cpu range: {part}"))?;
                let end: CpuId = end.trim().parse().with_context(|| format!("Bad cpu range: {part}"))?;
                if start > end {
                    bail!("Bad cpu range: {part}");
                }
                cpus.extend(start..=end);
            }
            None => {
                cpus.insert(part.trim().parse().with_context(|| format!("Bad cpu id: {part}"))?);
            }
        }
    }
    Ok(cpus)
}

/// 基于 procfs/sysfs 的平台实现，频率通过 userspace 调速器的 scaling_setspeed 下发
#[derive(Debug, Clone)]
pub struct SysfsPlatform {
    cpu_root: PathBuf,
    proc_stat: PathBuf,
    usecs_per_tick: u64,
}

impl SysfsPlatform {
    pub fn new() -> Self {
        Self::with_roots(CPU_SYSFS_ROOT, PROC_STAT)
    }

    pub fn with_roots<A: AsRef<Path>, B: AsRef<Path>>(cpu_root: A, proc_stat: B) -> Self {
        let usecs_per_tick = usecs_per_user_tick();
        info!("USER_HZ tick: {}us", usecs_per_tick);
        Self {
            cpu_root: cpu_root.as_ref().to_path_buf(),
            proc_stat: proc_stat.as_ref().to_path_buf(),
            usecs_per_tick,
        }
    }

    pub fn cpu_dir(&self, cpu: CpuId) -> PathBuf {
        self.cpu_root.join(format!("cpu{cpu}"))
    }
}

impl Default for SysfsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SysfsPlatform {
    fn read_idle_and_wall_time(&self, cpu: CpuId) -> Result<CpuTimes> {
        let content = read_file(&self.proc_stat, 4096)?;
        parse_proc_stat(&content, cpu, self.usecs_per_tick)
    }

    fn apply_frequency(&self, policy: &PolicyHandle, freq: u32, _relation: Relation) -> Result<()> {
        let node = self.cpu_dir(policy.cpu()).join(SCALING_SETSPEED);
        write_file(&node, freq.to_string())?;
        Ok(())
    }

    fn online_cpus(&self) -> BTreeSet<CpuId> {
        let node = self.cpu_root.join(CPU_ONLINE);
        match read_file(&node, 64).and_then(|list| parse_cpu_list(&list)) {
            Ok(cpus) => cpus,
            Err(e) => {
                warn!("Failed to read online cpus: {e:#}");
                BTreeSet::new()
            }
        }
    }

    fn refresh_limits(&self, policy: &PolicyHandle) {
        let cpu_dir = self.cpu_dir(policy.cpu());
        let read_limits = || -> Result<(u32, u32)> {
            Ok((
                read_value(cpu_dir.join(SCALING_MIN_FREQ))?,
                read_value(cpu_dir.join(SCALING_MAX_FREQ))?,
            ))
        };
        match read_limits() {
            Ok((min, max)) => {
                if (min, max) != (policy.min(), policy.max()) {
                    debug!("cpu{}: scaling limits {}-{}KHz", policy.cpu(), min, max);
                    policy.set_limits(min, max);
                }
            }
            Err(e) => warn!("cpu{}: failed to read scaling limits: {e:#}", policy.cpu()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const STAT: &str = "\
cpu  4705 356 584 3699 23 23 0 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0
cpu1 1335 12 300 5000 100 5 7 3 0 0
intr 1462898
";

    #[test]
    fn proc_stat_line_is_converted_to_usecs() {
        let times = parse_proc_stat(STAT, 1, 10_000).unwrap();
        assert_eq!(times.idle, 5_100 * 10_000);
        assert_eq!(times.iowait, 100 * 10_000);
        assert_eq!(times.nice, 12 * 10_000);
        assert_eq!(times.wall, (1335 + 12 + 300 + 5000 + 100 + 5 + 7 + 3) * 10_000);
    }

    #[test]
    fn aggregate_line_is_not_mistaken_for_a_cpu() {
        assert!(parse_proc_stat(STAT, 0, 1).is_ok());
        assert!(parse_proc_stat(STAT, 2, 1).is_err());
        assert!(parse_proc_stat("cpu0 1 x 3 4 5\n", 0, 1).is_err());
    }

    #[test]
    fn cpu_lists() {
        assert_eq!(parse_cpu_list("0-3,5\n").unwrap(), BTreeSet::from([0, 1, 2, 3, 5]));
        assert_eq!(parse_cpu_list("7").unwrap(), BTreeSet::from([7]));
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a").is_err());
    }

    #[test]
    fn reads_and_writes_through_the_given_roots() {
        let dir = tempdir().unwrap();
        let cpu_root = dir.path().join("cpu");
        fs::create_dir_all(cpu_root.join("cpu1/cpufreq")).unwrap();
        fs::write(cpu_root.join(CPU_ONLINE), "0-1\n").unwrap();
        fs::write(cpu_root.join("cpu1").join(SCALING_SETSPEED), "0\n").unwrap();
        let stat = dir.path().join("stat");
        fs::write(&stat, STAT).unwrap();

        let platform = SysfsPlatform::with_roots(&cpu_root, &stat);
        assert_eq!(platform.online_cpus(), BTreeSet::from([0, 1]));
        assert!(platform.read_idle_and_wall_time(1).unwrap().wall > 0);

        let policy = PolicyHandle::from_config(crate::model::policy::PolicyConfig::new(
            1,
            vec![300_000, 600_000],
            300_000,
        ))
        .unwrap();
        platform.apply_frequency(&policy, 600_000, Relation::RoundDown).unwrap();
        assert_eq!(
            fs::read_to_string(cpu_root.join("cpu1").join(SCALING_SETSPEED)).unwrap(),
            "600000"
        );
    }

    #[test]
    fn limits_follow_scaling_nodes() {
        let dir = tempdir().unwrap();
        let cpu_dir = dir.path().join("cpu0");
        fs::create_dir_all(cpu_dir.join("cpufreq")).unwrap();
        let platform = SysfsPlatform::with_roots(dir.path(), dir.path().join("stat"));
        let policy = PolicyHandle::from_config(crate::model::policy::PolicyConfig::new(
            0,
            vec![300_000, 600_000, 900_000],
            900_000,
        ))
        .unwrap();

        // 节点缺失时保留原窗口
        platform.refresh_limits(&policy);
        assert_eq!((policy.min(), policy.max()), (300_000, 900_000));

        fs::write(cpu_dir.join(SCALING_MIN_FREQ), "300000\n").unwrap();
        fs::write(cpu_dir.join(SCALING_MAX_FREQ), "600000\n").unwrap();
        platform.refresh_limits(&policy);
        assert_eq!((policy.min(), policy.max()), (300_000, 600_000));
        assert_eq!(policy.view().resolve(900_000, Relation::RoundUp), 600_000);
    }
}
