//! Environment variable utilities
//!
//! Generic `env_get<T>` function for parsing environment variables with
//! defaults. Used by `dstpool::DispatchConfig::from_env()` to apply
//! `DSTPOOL_*` overrides on top of compile-time defaults.
//!
//! # Usage
//!
//! ```ignore
//! use dstpool_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("DSTPOOL_NUM_WORKERS", 4);
//! let debug: bool = env_get_bool("DSTPOOL_DEBUG", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts `"1"`, `"true"`, `"yes"`, `"on"` (case-insensitive) as true.
/// Everything else (including unset) returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_get_default_when_unset() {
        let val: usize = env_get("__DSTPOOL_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn env_get_parses_set_value() {
        std::env::set_var("__DSTPOOL_TEST_NUM__", "7");
        let val: usize = env_get("__DSTPOOL_TEST_NUM__", 0);
        assert_eq!(val, 7);
        std::env::remove_var("__DSTPOOL_TEST_NUM__");
    }

    #[test]
    fn env_get_falls_back_on_bad_parse() {
        std::env::set_var("__DSTPOOL_TEST_BAD__", "not_a_number");
        let val: usize = env_get("__DSTPOOL_TEST_BAD__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__DSTPOOL_TEST_BAD__");
    }

    #[test]
    fn env_get_bool_variants() {
        for truthy in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var("__DSTPOOL_TEST_BOOL__", truthy);
            assert!(env_get_bool("__DSTPOOL_TEST_BOOL__", false), "{truthy}");
        }
        std::env::set_var("__DSTPOOL_TEST_BOOL__", "0");
        assert!(!env_get_bool("__DSTPOOL_TEST_BOOL__", true));
        std::env::remove_var("__DSTPOOL_TEST_BOOL__");
    }
}
