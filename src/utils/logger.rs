use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use log::{LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;

// 控制台日志，过滤交给 log::set_max_level
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let now = Local::now();
        let timestamp = now.format("%Y-%m-%d %H:%M:%S%.3f");
        println!("[{}][{}]: {}", timestamp, record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: Lazy<ConsoleLogger> = Lazy::new(|| ConsoleLogger);

pub fn init_logger<P: AsRef<Path>>(level_file: P) -> Result<()> {
    let log_level = read_log_level_config(&level_file);

    log::set_logger(&*LOGGER)
        .map(|()| log::set_max_level(log_level))
        .with_context(|| "Failed to set logger")?;

    log::info!("Logger initialized with level: {}", log_level);
    log::info!("Log level config path: {}", level_file.as_ref().display());
    log::debug!("Per-cycle sampling decisions are only shown at debug level");

    Ok(())
}

/// 读取日志等级配置文件，缺失或无法识别时回退到 Info
pub fn read_log_level_config<P: AsRef<Path>>(path: P) -> LevelFilter {
    let default_level = LevelFilter::Info;

    let content = match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => content,
        Err(_) => return default_level,
    };

    match content.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => default_level,
    }
}

pub fn apply_log_level(level: LevelFilter) {
    log::set_max_level(level);
    log::info!("Log level updated to: {}", level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_file_is_case_insensitive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("log_level");

        std::fs::write(&path, "DEBUG\n").expect("write level");
        assert_eq!(read_log_level_config(&path), LevelFilter::Debug);

        std::fs::write(&path, "verbose").expect("write level");
        assert_eq!(read_log_level_config(&path), LevelFilter::Info);
    }

    #[test]
    fn missing_log_level_file_defaults_to_info() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            read_log_level_config(dir.path().join("absent")),
            LevelFilter::Info
        );
    }
}
