//! Ambient, env-var-driven configuration.
//!
//! There is no JSON config loader in this workspace (it is an external
//! collaborator the core does not own). Process-local tunables — handoff
//! ring capacity, log level, whether to huge-page a LogAlloc region — are
//! read through these helpers instead, the way the teacher's own crates
//! read their tunables.

use std::str::FromStr;

/// Read `key` from the environment and parse it as `T`, falling back to
/// `default` if the variable is unset or fails to parse.
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read `key` as an optional `T`; `None` if unset or unparseable.
pub fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Read `key` as a raw string, falling back to `default`.
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read `key` as a boolean. Accepts "1"/"true"/"yes"/"on" (case-insensitive)
/// as true; anything else (including unset) is `default`.
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// True if `key` is set at all, regardless of value.
pub fn env_is_set(key: &str) -> bool {
    std::env::var(key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_on_missing_var() {
        assert_eq!(env_get::<u32>("DATAPLANE_CORE_TEST_UNSET_VAR", 42), 42);
        assert!(!env_get_bool("DATAPLANE_CORE_TEST_UNSET_VAR", false));
    }

    #[test]
    fn parses_bool_variants() {
        std::env::set_var("DATAPLANE_CORE_TEST_BOOL", "YES");
        assert!(env_get_bool("DATAPLANE_CORE_TEST_BOOL", false));
        std::env::remove_var("DATAPLANE_CORE_TEST_BOOL");
    }
}
