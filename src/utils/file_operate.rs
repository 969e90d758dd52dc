use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};
use log::debug;

pub fn check_read_simple<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists() && path.as_ref().is_file()
}

pub fn read_file<P: AsRef<Path>>(path: P, max_len: usize) -> Result<String> {
    let path_ref = path.as_ref();
    let mut file = File::open(path_ref)
        .with_context(|| format!("Failed to open file for reading: {}", path_ref.display()))?;

    let mut content = String::with_capacity(max_len);
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read from file: {}", path_ref.display()))?;

    Ok(content)
}

/// 读取单值节点（例如 scaling_cur_freq）并解析
pub fn read_value<T, P>(path: P) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    P: AsRef<Path>,
{
    let path_ref = path.as_ref();
    let buf = read_file(path_ref, 32)?;
    buf.trim()
        .parse::<T>()
        .with_context(|| format!("Failed to parse value from {}", path_ref.display()))
}

pub fn write_file<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, content: C) -> Result<usize> {
    let path_ref = path.as_ref();

    // sysfs 节点不能 create，只做覆盖写
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path_ref)
        .with_context(|| format!("Failed to open file for writing: {}", path_ref.display()))?;

    let bytes_written = file
        .write(content.as_ref())
        .with_context(|| format!("Failed to write to file: {}", path_ref.display()))?;

    debug!("Wrote {} bytes to {}", bytes_written, path_ref.display());
    Ok(bytes_written)
}
