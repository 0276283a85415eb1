//! Vendor CLI output parsers.
//!
//! Every parser consumes raw interactive-transport text and yields
//! structured records. Firmware lines vary: each record type has a tabular
//! dialect and a labeled-block dialect, and parsers try the table first
//! then fall back to blocks. Fields that cannot be extracted stay absent
//! rather than zero-filled.

pub mod alarm;
pub mod onu;
pub mod port;
pub mod service_port;
pub mod status;

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use ponpulse_common::{AgentError, Result};
use regex::Regex;
use std::collections::HashMap;

/// Parse a PON port written as `slot/port` (V-SOL) or `frame/slot/port`
/// (Huawei). The frame segment is ignored.
pub fn parse_pon_port(raw: &str) -> Result<(u32, u32)> {
    let segments: Vec<&str> = raw.trim().split('/').collect();
    let parse = |s: &str| -> Result<u32> {
        s.trim().parse().map_err(|_| AgentError::Parse {
            what: "pon port".into(),
            hint: format!("'{raw}' has a non-numeric segment"),
        })
    };
    match segments.as_slice() {
        [slot, port] => Ok((parse(slot)?, parse(port)?)),
        [_frame, slot, port] => Ok((parse(slot)?, parse(port)?)),
        _ => Err(AgentError::Parse {
            what: "pon port".into(),
            hint: format!("'{raw}' is not slot/port or frame/slot/port"),
        }),
    }
}

pub fn format_pon_port(slot: u32, port: u32) -> String {
    format!("{slot}/{port}")
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Normalize a device timestamp to RFC 3339. Zone-less inputs are assumed
/// UTC. Already-RFC3339 input passes through unchanged in value, so the
/// normalization is idempotent.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).to_rfc3339());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().to_rfc3339());
        }
    }
    None
}

/// Header, separator, and decoration lines that every table parser skips.
pub fn is_noise_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed
            .chars()
            .all(|c| matches!(c, '-' | '=' | '+' | '*' | '_' | ' '))
}

static LABELED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 ()/%._-]*?)\s*:\s*(.*?)\s*$").expect("labeled line regex")
});

/// Collapse a label like `Rx-power(dBm)` or `Serial Number` onto a bare
/// lowercase key (`rxpowerdbm`, `serialnumber`) so block dialects from
/// different firmware map onto the same fields.
pub fn canonical_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Extract `label : value` pairs from one labeled block.
pub fn labeled_pairs(block: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for line in block.lines() {
        if is_noise_line(line) {
            continue;
        }
        if let Some(caps) = LABELED_LINE.captures(line) {
            let value = caps[2].trim();
            if !value.is_empty() && value != "-" {
                pairs.insert(canonical_label(&caps[1]), value.to_string());
            }
        }
    }
    pairs
}

/// Split output into labeled blocks separated by dash/blank runs.
pub fn split_blocks(output: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in output.lines() {
        if is_noise_line(line) {
            if !current.trim().is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Pull the first value matching any of the synonym keys.
pub fn pick<'a>(pairs: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| pairs.get(*k))
        .map(|s| s.as_str())
}

/// Parse a numeric value, tolerating trailing units (`-19.20 dBm`, `38 C`).
pub fn leading_f64(raw: &str) -> Option<f64> {
    let token = raw.trim().split_whitespace().next()?;
    let token = token.trim_end_matches(|c: char| !c.is_ascii_digit());
    token.parse().ok()
}

pub fn leading_u32(raw: &str) -> Option<u32> {
    let token = raw.trim().split_whitespace().next()?;
    token.parse().ok()
}
