//! Machine collector runtime configuration.
//!
//! This crate provides:
//! - The flat acquisition config file (parse, validate, render)
//! - Polling config providers consulted by the acquisition loop every tick
//! - The operator capture flag
//! - Working directory layout resolution (CLI → env → defaults)

pub mod acquisition;
pub mod capture;
pub mod provider;
pub mod resolve;
pub mod validate;

pub use acquisition::AcquisitionConfig;
pub use capture::{CaptureFlagSource, FileCaptureFlag, FixedCaptureFlag};
pub use provider::{ConfigProvider, FileConfigProvider, Reload, StaticConfigProvider};
pub use resolve::{LayoutOverrides, WorkLayout};
pub use validate::{ConfigError, ConfigResult};
