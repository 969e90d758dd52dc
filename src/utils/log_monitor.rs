use std::path::Path;

use anyhow::Result;
use inotify::WatchMask;
use log::{debug, info};

use crate::{
    datasource::file_path::LOG_THREAD,
    utils::{
        file_operate::check_read_simple,
        inotify::InotifyWatcher,
        logger::{apply_log_level, read_log_level_config},
    },
};

/// 日志等级文件被改写后切换全局等级。启动时文件不存在则直接退出。
pub fn monitor_log_level<P: AsRef<Path>>(level_file: P) -> Result<()> {
    let level_file = level_file.as_ref();
    info!("{LOG_THREAD} Start");

    if !check_read_simple(level_file) {
        info!(
            "No log level file at {}, staying at {}",
            level_file.display(),
            log::max_level()
        );
        return Ok(());
    }

    let mut watcher = InotifyWatcher::new()?;
    watcher.add(level_file, WatchMask::CLOSE_WRITE | WatchMask::MODIFY)?;

    let mut current = log::max_level();
    loop {
        let events = watcher.wait_and_handle()?;
        let level = read_log_level_config(level_file);
        if level == current {
            debug!("{events} events on {}, level unchanged", level_file.display());
            continue;
        }
        apply_log_level(level);
        current = level;
    }
}
