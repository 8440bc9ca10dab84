//! rollcall-engine — The long-lived attendance service.
//!
//! [`Engine`] owns the one face pipeline used for both enrollment and
//! recognition, loaded on first use, plus the enrollment store and the
//! attendance ledger behind mutexes so concurrent callers in one process
//! never interleave read-modify-write cycles.

pub mod config;
pub mod engine;

pub use config::{Config, ConfigError, ConfigFile};
pub use engine::{AttendanceReport, EnrollmentReport, Engine, EngineError};
