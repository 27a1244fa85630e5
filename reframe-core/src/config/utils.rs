//! Configuration utility functions
//!
//! Helpers for reading typed values from environment variables. The
//! `get_var_*` forms take a lookup function so overrides can be applied from
//! any key/value source; `env_lookup` reads the process environment.
//! Unparseable values fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;

fn parse_or_default<T: FromStr>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Ignoring invalid value '{}' for {}", raw, key);
            default
        }
    }
}

/// Get a string value from `lookup` or use the default
pub fn get_var_string<L>(lookup: &L, key: &str, default: String) -> String
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or(default)
}

/// Get a path value from `lookup` or use the default
pub fn get_var_path<L>(lookup: &L, key: &str, default: PathBuf) -> PathBuf
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key).map(PathBuf::from).unwrap_or(default)
}

/// Get a boolean value from `lookup` or use the default.
/// Accepts `true`/`1`/`yes` and `false`/`0`/`no`.
pub fn get_var_bool<L>(lookup: &L, key: &str, default: bool) -> bool
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => {
                log::warn!("Ignoring invalid value '{}' for {}", val, key);
                default
            }
        },
        None => default,
    }
}

/// Get a parsed value from `lookup` or use the default
pub fn get_var_parsed<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(val) => parse_or_default(key, &val, default),
        None => default,
    }
}

/// Get an optional parsed value; empty strings clear the default.
pub fn get_var_optional<L, T>(lookup: &L, key: &str, default: Option<T>) -> Option<T>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(val) if val.trim().is_empty() => None,
        Some(val) => match val.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid value '{}' for {}", val, key);
                default
            }
        },
        None => default,
    }
}

/// Reads `key` from the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parsed_values_and_fallbacks() {
        let lookup = lookup_from(&[("JOBS", "8"), ("CRF", "abc")]);
        assert_eq!(get_var_parsed(&lookup, "JOBS", 2usize), 8);
        assert_eq!(get_var_parsed(&lookup, "CRF", 23u8), 23);
        assert_eq!(get_var_parsed(&lookup, "MISSING", 1.5f64), 1.5);
    }

    #[test]
    fn test_bool_values() {
        let lookup = lookup_from(&[("A", "YES"), ("B", "0"), ("C", "maybe")]);
        assert!(get_var_bool(&lookup, "A", false));
        assert!(!get_var_bool(&lookup, "B", true));
        assert!(get_var_bool(&lookup, "C", true));
        assert!(!get_var_bool(&lookup, "D", false));
    }

    #[test]
    fn test_optional_values() {
        let lookup = lookup_from(&[("TTL", "300"), ("EMPTY", " ")]);
        assert_eq!(get_var_optional(&lookup, "TTL", None::<u64>), Some(300));
        assert_eq!(get_var_optional(&lookup, "EMPTY", Some(5u64)), None);
        assert_eq!(get_var_optional(&lookup, "MISSING", Some(5u64)), Some(5));
    }

    #[test]
    fn test_env_lookup_defaults_when_unset() {
        assert_eq!(get_var_parsed(&env_lookup, "REFRAME_TEST_SURELY_UNSET_VAR", 7usize), 7);
        assert_eq!(
            get_var_path(&env_lookup, "REFRAME_TEST_SURELY_UNSET_VAR", PathBuf::from("ffmpeg")),
            PathBuf::from("ffmpeg")
        );
    }
}
