use std::{env, sync::Arc, thread};

use anyhow::{Context, Result, bail};
use log::{error, info, warn};

use ondemand_governor::{
    datasource::{
        config_parser::{apply_config, config_read},
        file_path::*,
        freq_table::{read_policy_config, switch_to_userspace},
        node_monitor::monitor_config,
        sysfs_platform::SysfsPlatform,
    },
    model::governor::Governor,
    utils::{
        constants::{AUTHOR, NOTES, VERSION},
        file_operate::check_read_simple,
        log_monitor::monitor_log_level,
        logger::init_logger,
    },
    Platform,
};

fn print_help() {
    println!("{NOTES}");
    println!("{AUTHOR}");
    println!("Usage:");
    println!("\t-c <file> use config file (default {CONFIG_FILE})");
    println!("\t-v show version");
    println!("\t-h show help");
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_file = CONFIG_FILE.to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" => {
                print_help();
                return Ok(());
            }
            "-v" => {
                println!("{NOTES}");
                println!("{AUTHOR}");
                println!("{VERSION}");
                return Ok(());
            }
            "-c" => {
                i += 1;
                config_file = args.get(i).cloned().context("-c requires a file path")?;
            }
            other => {
                println!("Unknown argument: {other}");
                println!("Use -h for help");
                return Ok(());
            }
        }
        i += 1;
    }

    init_logger(LOG_LEVEL_PATH)?;

    info!("{NOTES}");
    info!("{AUTHOR}");
    info!("{VERSION}");

    let platform = SysfsPlatform::new();
    let online = platform.online_cpus();
    if online.is_empty() {
        bail!("No online cpus found under {CPU_SYSFS_ROOT}");
    }
    info!("Online cpus: {online:?}");

    let governor = Arc::new(Governor::new(platform));

    // 先加载配置，首个 CPU 挂载时才会推导默认采样率
    if check_read_simple(&config_file) {
        info!("Reading config file: {config_file}");
        match config_read(&config_file) {
            Ok(config) => {
                apply_config(&governor, &config);
            }
            Err(e) => error!("Failed to read config file: {e:#}"),
        }
    } else {
        warn!("Config file not found: {config_file}, using defaults");
    }

    for cpu in online {
        let cpu_dir = governor.platform().cpu_dir(cpu);
        let config = match read_policy_config(&cpu_dir, cpu) {
            Ok(config) => config,
            Err(e) => {
                warn!("Skipping cpu{cpu}: {e:#}");
                continue;
            }
        };
        if let Err(e) = switch_to_userspace(&cpu_dir) {
            warn!("Skipping cpu{cpu}: {e:#}");
            continue;
        }
        if let Err(e) = governor.attach(config) {
            error!("Failed to attach cpu{cpu}: {e}");
        }
    }

    if governor.attached_cpus().is_empty() {
        bail!("No cpu could be attached");
    }

    let config_governor = Arc::clone(&governor);
    thread::Builder::new()
        .name(CONF_THREAD.to_string())
        .spawn(move || {
            if let Err(e) = monitor_config(config_file, config_governor) {
                error!("Config monitor error: {e:#}");
            }
        })?;

    thread::Builder::new()
        .name(LOG_THREAD.to_string())
        .spawn(move || {
            if let Err(e) = monitor_log_level(LOG_LEVEL_PATH) {
                error!("Log level monitor error: {e:#}");
            }
        })?;

    info!("{MAIN_THREAD} Start");
    info!("Attached cpus: {:?}", governor.attached_cpus());
    info!("Sampling rate: {}us", governor.tunables().get_sampling_rate());

    loop {
        thread::park();
    }
}
