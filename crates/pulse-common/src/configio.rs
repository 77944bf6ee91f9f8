//! Field parsing shared by both binaries' layered configuration loaders.

use serde::Deserialize;
use std::time::Duration;

/// Interval fields in JSON config files accept a plain number of seconds or
/// a duration string such as `"300s"`, `"5m"`, `"2h"`, `"1500ms"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IntervalValue {
    Seconds(u64),
    Text(String),
}

impl IntervalValue {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            IntervalValue::Seconds(s) => Some(Duration::from_secs(*s)),
            IntervalValue::Text(s) => parse_duration(s),
        }
    }
}

/// Parses `"300"`, `"300s"`, `"1500ms"`, `"5m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let (number, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit())?);
    let n: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n * 60)),
        "h" => Some(Duration::from_secs(n * 3600)),
        _ => None,
    }
}

/// Treats the empty string as "unset", so `-f ""` or an empty environment
/// variable disables the corresponding feature.
pub fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}
