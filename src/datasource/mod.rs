pub mod config_parser;
pub mod file_path;
pub mod freq_table;
#[cfg(test)]
pub mod mock_platform;
pub mod node_monitor;
pub mod platform;
pub mod sysfs_platform;
