use std::sync::Arc;

use anyhow::Result;
use inotify::WatchMask;
use log::{error, info, warn};

use crate::{
    datasource::{
        config_parser::{apply_config, config_read},
        file_path::*,
        platform::Platform,
    },
    model::governor::Governor,
    utils::{file_operate::check_read_simple, inotify::InotifyWatcher},
};

fn reload<P: Platform>(config_file: &str, governor: &Governor<P>) {
    match config_read(config_file) {
        Ok(config) => {
            apply_config(governor, &config);
        }
        Err(e) => error!("Reload config FAILED: {e:#}"),
    }
}

/// 监听配置文件，每次写入后重新应用其中的调优参数
pub fn monitor_config<P: Platform>(config_file: String, governor: Arc<Governor<P>>) -> Result<()> {
    info!("{CONF_THREAD} Start");

    if !check_read_simple(&config_file) {
        warn!("Config not found: {config_file}, keeping built-in tunables");
        return Ok(());
    }

    info!("Using Config: {config_file}");

    let mut inotify = InotifyWatcher::new()?;
    inotify.add(&config_file, WatchMask::CLOSE_WRITE | WatchMask::MODIFY)?;

    loop {
        inotify.wait_and_handle()?;
        info!("Config changed, reloading");
        reload(&config_file, &governor);
    }
}
