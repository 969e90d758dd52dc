// Thread names
pub const MAIN_THREAD: &str = "OndemandMain";
pub const CONF_THREAD: &str = "ConfigWatcher";
pub const LOG_THREAD: &str = "LogLevelMonitor";
pub const SAMPLER_THREAD: &str = "od-sampler";

// File paths
pub const PROC_STAT: &str = "/proc/stat";
pub const CPU_SYSFS_ROOT: &str = "/sys/devices/system/cpu";
pub const CONFIG_FILE: &str = "/data/adb/cpu_ondemand/ondemand.toml";
pub const LOG_LEVEL_PATH: &str = "/data/adb/cpu_ondemand/log/log_level";

// Nodes below CPU_SYSFS_ROOT
pub const CPU_ONLINE: &str = "online";
pub const SCALING_AVAILABLE_FREQS: &str = "cpufreq/scaling_available_frequencies";
pub const TIME_IN_STATE: &str = "cpufreq/stats/time_in_state";
pub const CPUINFO_MIN_FREQ: &str = "cpufreq/cpuinfo_min_freq";
pub const CPUINFO_MAX_FREQ: &str = "cpufreq/cpuinfo_max_freq";
pub const CPUINFO_TRANSITION_LATENCY: &str = "cpufreq/cpuinfo_transition_latency";
pub const SCALING_MIN_FREQ: &str = "cpufreq/scaling_min_freq";
pub const SCALING_MAX_FREQ: &str = "cpufreq/scaling_max_freq";
pub const SCALING_CUR_FREQ: &str = "cpufreq/scaling_cur_freq";
pub const SCALING_GOVERNOR: &str = "cpufreq/scaling_governor";
pub const SCALING_SETSPEED: &str = "cpufreq/scaling_setspeed";

pub const USERSPACE_GOVERNOR: &str = "userspace";

// cpuinfo_transition_latency 为 CPUFREQ_ETERNAL 时表示未知
pub const CPUFREQ_ETERNAL: u64 = u32::MAX as u64;
