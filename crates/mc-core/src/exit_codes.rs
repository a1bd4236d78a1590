//! Process exit codes for `mc-collector`.
//!
//! Supervisors (systemd `RestartPreventExitStatus=`, shell wrappers) key off
//! these values, so they are a stable contract.
//!
//! Ranges:
//! - 0: graceful stop
//! - 2: command-line usage error (emitted by clap)
//! - 10-19: environment errors the operator can fix
//! - 20-29: internal errors

use mc_common::ErrorClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Stopped by signal, or a one-shot command succeeded.
    Clean = 0,

    /// Invalid command-line arguments.
    UsageError = 2,

    /// Config file missing or invalid at startup.
    ConfigError = 10,

    /// Sample source unreachable or unsupported at startup.
    SourceError = 11,

    /// Config file became unreadable while running.
    ConfigReloadError = 12,

    /// The first low-rate log file could not be created.
    StorageError = 13,

    /// Internal error (bug).
    InternalError = 20,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Short machine-readable name.
    pub fn code_name(self) -> &'static str {
        match self {
            ExitCode::Clean => "clean",
            ExitCode::UsageError => "usage_error",
            ExitCode::ConfigError => "config_error",
            ExitCode::SourceError => "source_error",
            ExitCode::ConfigReloadError => "config_reload_error",
            ExitCode::StorageError => "storage_error",
            ExitCode::InternalError => "internal_error",
        }
    }

    /// Exit code for a fatal error that escaped the loop.
    pub fn for_runtime_class(class: ErrorClass) -> ExitCode {
        match class {
            ErrorClass::FatalAtRuntime => ExitCode::ConfigReloadError,
            ErrorClass::FatalAtStartup => ExitCode::ConfigError,
            ErrorClass::Recoverable | ErrorClass::Degraded => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
