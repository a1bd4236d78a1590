//! Sample sources.
//!
//! The acquisition loop only sees [`SampleSource`]. Concrete sources are
//! selected by endpoint string:
//!
//! | endpoint          | source                                        |
//! |-------------------|-----------------------------------------------|
//! | `sim://`          | injection-moulding simulator, entropy-seeded  |
//! | `sim://<seed>`    | same, deterministic                           |
//! | `replay:<path>`   | recorded CSV log, looped                      |
//! | `opc.tcp://...`   | recognised, not supported in-process          |

pub mod replay;
pub mod simulated;

use std::path::PathBuf;
use std::str::FromStr;

use mc_common::{Classify, ErrorClass, Sample};
use thiserror::Error;

pub use replay::ReplaySource;
pub use simulated::{MachineStage, MouldingSimulator};

/// Errors from connecting to or reading a sample source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("unsupported protocol for endpoint {0}")]
    UnsupportedProtocol(String),

    #[error("failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sample read failed: {0}")]
    Read(String),
}

impl Classify for SourceError {
    fn class(&self) -> ErrorClass {
        match self {
            SourceError::Read(_) => ErrorClass::Recoverable,
            SourceError::InvalidEndpoint(_)
            | SourceError::UnsupportedProtocol(_)
            | SourceError::Connect { .. }
            | SourceError::Io { .. } => ErrorClass::FatalAtStartup,
        }
    }
}

/// Something that yields one sample per call.
///
/// A failed read is reported, never retried by the caller within the same
/// tick.
pub trait SampleSource {
    fn read_sample(&mut self) -> Result<Sample, SourceError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_sample(&mut self) -> Result<Sample, SourceError> {
        (**self).read_sample()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Parsed sample source endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Simulated { seed: Option<u64> },
    Replay { path: PathBuf },
    OpcUa { url: String },
}

impl FromStr for Endpoint {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "sim" {
            return Ok(Endpoint::Simulated { seed: None });
        }
        if let Some(rest) = s.strip_prefix("sim://") {
            if rest.is_empty() {
                return Ok(Endpoint::Simulated { seed: None });
            }
            let seed = rest
                .parse()
                .map_err(|_| SourceError::InvalidEndpoint(s.to_string()))?;
            return Ok(Endpoint::Simulated { seed: Some(seed) });
        }
        if let Some(path) = s.strip_prefix("replay:") {
            if path.is_empty() {
                return Err(SourceError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Replay {
                path: PathBuf::from(path),
            });
        }
        if s.starts_with("opc.tcp://") {
            return Ok(Endpoint::OpcUa { url: s.to_string() });
        }
        Err(SourceError::InvalidEndpoint(s.to_string()))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Simulated { seed: None } => write!(f, "sim://"),
            Endpoint::Simulated { seed: Some(seed) } => write!(f, "sim://{}", seed),
            Endpoint::Replay { path } => write!(f, "replay:{}", path.display()),
            Endpoint::OpcUa { url } => write!(f, "{}", url),
        }
    }
}

/// Establish a source for `endpoint`.
pub fn connect(endpoint: &Endpoint) -> Result<Box<dyn SampleSource>, SourceError> {
    match endpoint {
        Endpoint::Simulated { seed } => {
            let sim = match seed {
                Some(seed) => MouldingSimulator::seeded(*seed),
                None => MouldingSimulator::from_entropy(),
            };
            Ok(Box::new(sim))
        }
        Endpoint::Replay { path } => Ok(Box::new(ReplaySource::open(path)?)),
        Endpoint::OpcUa { url } => Err(SourceError::UnsupportedProtocol(url.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sim_endpoints() {
        assert_eq!(
            "sim".parse::<Endpoint>().unwrap(),
            Endpoint::Simulated { seed: None }
        );
        assert_eq!(
            "sim://".parse::<Endpoint>().unwrap(),
            Endpoint::Simulated { seed: None }
        );
        assert_eq!(
            "sim://42".parse::<Endpoint>().unwrap(),
            Endpoint::Simulated { seed: Some(42) }
        );
        assert!("sim://abc".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_parse_replay_and_opc() {
        assert_eq!(
            "replay:/data/log_1.csv".parse::<Endpoint>().unwrap(),
            Endpoint::Replay {
                path: PathBuf::from("/data/log_1.csv")
            }
        );
        assert!("replay:".parse::<Endpoint>().is_err());
        assert!(matches!(
            "opc.tcp://10.0.0.5:4840/server".parse::<Endpoint>().unwrap(),
            Endpoint::OpcUa { .. }
        ));
        assert!(matches!(
            "http://x".parse::<Endpoint>(),
            Err(SourceError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["sim://", "sim://7", "replay:/tmp/a.csv", "opc.tcp://host:4840"] {
            let endpoint: Endpoint = raw.parse().unwrap();
            assert_eq!(endpoint.to_string(), raw);
        }
    }

    #[test]
    fn test_connect_opc_is_unsupported() {
        let endpoint: Endpoint = "opc.tcp://host:4840".parse().unwrap();
        let err = connect(&endpoint).err().expect("unsupported");
        assert!(matches!(err, SourceError::UnsupportedProtocol(_)));
        assert_eq!(err.class(), ErrorClass::FatalAtStartup);
    }

    #[test]
    fn test_connect_sim_reads() {
        let mut source = connect(&Endpoint::Simulated { seed: Some(1) }).unwrap();
        let sample = source.read_sample().unwrap();
        assert!(!sample.stage.is_empty());
        assert!(source.describe().starts_with("sim"));
    }

    #[test]
    fn test_read_error_is_recoverable() {
        assert_eq!(
            SourceError::Read("timeout".into()).class(),
            ErrorClass::Recoverable
        );
    }
}
