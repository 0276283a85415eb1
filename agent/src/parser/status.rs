// OLT health snapshot extraction
use super::{labeled_pairs, leading_f64, pick};
use once_cell::sync::Lazy;
use ponpulse_common::OltStatus;
use regex::Regex;

// Compact tabular dialect used by older firmware:
//   CPU(%)  Memory(%)  Temp(C)  Uptime
//   23      41         38       35d04h22m
static STATUS_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\S+)\s*$")
        .expect("status row regex")
});

/// Parse `display device status` / `show system status` output. Tabular
/// dialect first, labeled-block fallback.
pub fn parse_olt_status(output: &str) -> OltStatus {
    if let Some(caps) = STATUS_ROW.captures(output) {
        return OltStatus {
            cpu_percent: caps[1].parse().ok(),
            memory_percent: caps[2].parse().ok(),
            temperature_c: caps[3].parse().ok(),
            uptime: Some(caps[4].to_string()),
            version: None,
        };
    }

    let pairs = labeled_pairs(output);
    OltStatus {
        uptime: pick(&pairs, &["uptime", "runtime", "systemuptime"]).map(str::to_string),
        cpu_percent: pick(&pairs, &["cpuoccupancy", "cpuusage", "cpu"]).and_then(leading_f64),
        memory_percent: pick(&pairs, &["memoryoccupancy", "memoryusage", "memory"])
            .and_then(leading_f64),
        temperature_c: pick(&pairs, &["temperaturec", "temperature"]).and_then(leading_f64),
        version: pick(&pairs, &["version", "softwareversion", "firmwareversion"])
            .map(str::to_string),
    }
}
