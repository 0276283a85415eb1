// Active-alarm extraction with severity and timestamp normalization
use super::{labeled_pairs, normalize_timestamp, pick, split_blocks};
use once_cell::sync::Lazy;
use ponpulse_common::{AlarmSeverity, OltAlarm};
use regex::Regex;
use tracing::debug;

// Tabular dialect:
//   1001  MAJOR  LOS  0/0/1  2024-01-15 10:22:01  Loss of signal
static ALARM_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(\d+)\s+([A-Za-z]+)\s+(\S+)\s+(\S+)\s+(\d{2,4}[-/]\d{2}[-/]\d{2,4} \d{2}:\d{2}:\d{2})\s*(.*)$",
    )
    .expect("alarm row regex")
});

/// Parse `display alarm active` / `show alarm active` output. The tabular
/// dialect is tried first; zero matches means a labeled-block firmware, so
/// fall back to block extraction.
pub fn parse_alarms(output: &str) -> Vec<OltAlarm> {
    let rows: Vec<OltAlarm> = ALARM_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            let timestamp = normalize_timestamp(&caps[5])?;
            let message = caps[6].trim();
            Some(OltAlarm {
                id: caps[1].to_string(),
                severity: AlarmSeverity::normalize(&caps[2]),
                alarm_type: caps[3].to_string(),
                source: caps[4].to_string(),
                timestamp,
                message: (!message.is_empty()).then(|| message.to_string()),
            })
        })
        .collect();
    if !rows.is_empty() {
        return rows;
    }

    debug!("alarm table regex matched nothing, trying labeled blocks");
    split_blocks(output)
        .iter()
        .filter_map(|block| parse_alarm_block(block))
        .collect()
}

fn parse_alarm_block(block: &str) -> Option<OltAlarm> {
    let pairs = labeled_pairs(block);
    let id = pick(&pairs, &["alarmid", "id"])?;
    let raw_time = pick(&pairs, &["time", "timestamp", "raisedat", "occurtime"])?;
    Some(OltAlarm {
        id: id.to_string(),
        severity: AlarmSeverity::normalize(
            pick(&pairs, &["severity", "level"]).unwrap_or("info"),
        ),
        alarm_type: pick(&pairs, &["type", "alarmtype", "name"])
            .unwrap_or("unknown")
            .to_string(),
        source: pick(&pairs, &["source", "location", "fsp"])
            .unwrap_or("")
            .to_string(),
        timestamp: normalize_timestamp(raw_time)?,
        message: pick(&pairs, &["message", "description", "detail"]).map(str::to_string),
    })
}
