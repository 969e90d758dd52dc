use thiserror::Error;

use crate::model::policy::CpuId;

pub type GovernorResult<T> = std::result::Result<T, GovernorError>;

/// 调速器核心错误。除 `EmptyFrequencyTable` 拒绝挂载外，其余都只影响当前一次操作，
/// 采样循环在下一周期按当时状态重新决策。
#[derive(Debug, Error)]
pub enum GovernorError {
    /// 配置写入越界，旧值保持不变
    #[error("invalid value {value} for {name}: {reason}")]
    InvalidConfigValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown tunable: {0}")]
    UnknownTunable(String),

    #[error("cpu{cpu}: frequency table is empty, governor cannot attach")]
    EmptyFrequencyTable { cpu: CpuId },

    #[error("cpu{cpu}: failed to apply {freq}KHz: {source}")]
    FrequencyApplyFailed {
        cpu: CpuId,
        freq: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cpu{cpu}: {counter} counter went backwards, clamped to zero")]
    StaleCounterWrap { cpu: CpuId, counter: &'static str },

    #[error("cpu{cpu} is not attached")]
    NotAttached { cpu: CpuId },

    #[error("cpu{cpu} is already attached")]
    AlreadyAttached { cpu: CpuId },

    #[error("cpu{cpu}: failed to start sampling worker: {source}")]
    WorkerSpawn {
        cpu: CpuId,
        #[source]
        source: std::io::Error,
    },
}

impl GovernorError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfigValue {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
