//! # dstpool-core
//!
//! Dependency-light types shared by the `dstpool` ordered job-dispatch
//! engine: the serial-number type, the error taxonomy, environment-variable
//! configuration helpers, and kernel-style leveled logging macros.
//!
//! This crate has no knowledge of threads, mutexes, or queues — that's
//! `dstpool`. It only defines the vocabulary.
//!
//! ## Modules
//!
//! - `serial` - monotonic per-queue serial number
//! - `error` - `DispatchError` taxonomy and `DispatchResult`
//! - `env` - `env_get`-style environment variable parsing
//! - `kprint` - leveled, context-tagged debug logging macros

pub mod env;
pub mod error;
pub mod kprint;
pub mod serial;

pub use error::{DispatchError, DispatchResult};
pub use serial::Serial;
