//! # Quizkit Common
//!
//! Logging configuration shared by the Quizkit crates.
//!
//! The offline cache controller and the stats handlers only ever emit
//! `tracing` events; binaries and tests pick the subscriber through
//! [`init_logging`] or [`init_test_logging`].

pub mod logging;

pub use logging::{init_logging, init_test_logging, LogConfig, LogFormat};
