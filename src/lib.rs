//! Userspace on-demand CPU frequency governor.
//!
//! `model` holds the sampling and decision core, `datasource` the platform
//! seam with its sysfs backend and config loading, `utils` logging and file helpers.

pub mod datasource;
pub mod model;
pub mod utils;

pub use datasource::platform::Platform;
pub use model::{
    error::{GovernorError, GovernorResult},
    governor::{CpuHandle, Governor},
    policy::{CpuId, PolicyConfig},
    tunables::Tunables,
};
