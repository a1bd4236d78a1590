//! Error taxonomy for the acquisition pipeline.
//!
//! Every error raised in the workspace falls into one of four classes which
//! decide what the acquisition loop does with it:
//!
//! | class            | effect                                               |
//! |------------------|------------------------------------------------------|
//! | `FatalAtStartup` | process exits before the loop starts                 |
//! | `FatalAtRuntime` | loop terminates, process exits non-zero              |
//! | `Recoverable`    | logged, the affected sub-operation is skipped        |
//! | `Degraded`       | replaced with an explicit sentinel value or message  |

use serde::{Deserialize, Serialize};

/// How an error affects the running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad config, unreachable sample source, or no initial log file.
    FatalAtStartup,
    /// Config became unreadable after having been valid.
    FatalAtRuntime,
    /// Sample read, flag read, writer open, rotation or status write failure.
    Recoverable,
    /// Missing optional input or zero-valued denominators.
    Degraded,
}

impl ErrorClass {
    /// Whether the error stops the process.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::FatalAtStartup | ErrorClass::FatalAtRuntime)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::FatalAtStartup => write!(f, "fatal_at_startup"),
            ErrorClass::FatalAtRuntime => write!(f, "fatal_at_runtime"),
            ErrorClass::Recoverable => write!(f, "recoverable"),
            ErrorClass::Degraded => write!(f, "degraded"),
        }
    }
}

/// Errors that know their place in the taxonomy.
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classes() {
        assert!(ErrorClass::FatalAtStartup.is_fatal());
        assert!(ErrorClass::FatalAtRuntime.is_fatal());
        assert!(!ErrorClass::Recoverable.is_fatal());
        assert!(!ErrorClass::Degraded.is_fatal());
    }

    #[test]
    fn test_class_serialization() {
        let json = serde_json::to_string(&ErrorClass::FatalAtRuntime).unwrap();
        assert_eq!(json, "\"fatal_at_runtime\"");
        assert_eq!(ErrorClass::Recoverable.to_string(), "recoverable");
    }
}
