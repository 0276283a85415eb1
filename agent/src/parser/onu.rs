// ONU list / info extraction for both vendor CLI dialects
use super::{labeled_pairs, leading_f64, leading_u32, pick, split_blocks};
use once_cell::sync::Lazy;
use ponpulse_common::{OnuRecord, Vendor};
use regex::Regex;

// Huawei `display ont info summary` row:
//   1   HWTC11112222  active  online  enabled  1234  -18.52/2.01
static HUAWEI_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(\d+)\s+([A-Z0-9]{8,20})\s+(?:active|deactive|deactivated)\s+(\S+)\s+(\S+)\s+(\d+|-)\s+(-?\d+(?:\.\d+)?|-)/(-?\d+(?:\.\d+)?|-)\s*$",
    )
    .expect("huawei onu row regex")
});

// V-SOL `show onu info` row:
//   1   VSOL00000001  enabled  online  -19.20  800
static VSOL_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^\s*(\d+)\s+([A-Z0-9]{8,20})\s+(\S+)\s+(\S+)\s+(-?\d+(?:\.\d+)?|-)\s+(\d+|-)\s*$",
    )
    .expect("vsol onu row regex")
});

/// Parse an ONU listing. Tabular dialect first; labeled-block fallback for
/// firmware that prints one block per ONU.
pub fn parse_onu_list(output: &str, vendor: Vendor, pon_port: &str) -> Vec<OnuRecord> {
    let rows = match vendor {
        Vendor::Huawei => parse_huawei_rows(output, pon_port),
        Vendor::Vsol => parse_vsol_rows(output, pon_port),
    };
    if !rows.is_empty() {
        return rows;
    }
    split_blocks(output)
        .iter()
        .filter_map(|block| parse_onu_block(block, pon_port))
        .collect()
}

/// Parse a single-ONU detail view (labeled block, with a one-row table
/// fallback for firmware that answers detail queries tabularly).
pub fn parse_onu_info(output: &str, vendor: Vendor, pon_port: &str, onu_id: u32) -> Option<OnuRecord> {
    if let Some(record) = split_blocks(output)
        .iter()
        .filter_map(|block| parse_onu_block(block, pon_port))
        .find(|r| r.onu_id == onu_id)
    {
        return Some(record);
    }
    parse_onu_list(output, vendor, pon_port)
        .into_iter()
        .find(|r| r.onu_id == onu_id)
}

fn parse_huawei_rows(output: &str, pon_port: &str) -> Vec<OnuRecord> {
    HUAWEI_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            let onu_id: u32 = caps[1].parse().ok()?;
            Some(OnuRecord {
                pon_port: pon_port.to_string(),
                onu_id,
                serial: Some(caps[2].to_string()),
                status: Some(caps[3].to_ascii_lowercase()),
                admin_state: Some(caps[4].to_ascii_lowercase()),
                distance_m: caps[5].parse().ok(),
                rx_power_dbm: caps[6].parse().ok(),
                tx_power_dbm: caps[7].parse().ok(),
                ..Default::default()
            })
        })
        .collect()
}

fn parse_vsol_rows(output: &str, pon_port: &str) -> Vec<OnuRecord> {
    VSOL_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            let onu_id: u32 = caps[1].parse().ok()?;
            Some(OnuRecord {
                pon_port: pon_port.to_string(),
                onu_id,
                serial: Some(caps[2].to_string()),
                admin_state: Some(caps[3].to_ascii_lowercase()),
                status: Some(caps[4].to_ascii_lowercase()),
                rx_power_dbm: caps[5].parse().ok(),
                distance_m: caps[6].parse().ok(),
                ..Default::default()
            })
        })
        .collect()
}

fn parse_onu_block(block: &str, pon_port: &str) -> Option<OnuRecord> {
    let pairs = labeled_pairs(block);
    let onu_id = pick(&pairs, &["ontid", "onuid", "onuindex", "id"])
        .and_then(leading_u32)?;
    Some(OnuRecord {
        pon_port: pick(&pairs, &["fsp", "ponport", "port"])
            .map(str::to_string)
            .unwrap_or_else(|| pon_port.to_string()),
        onu_id,
        serial: pick(&pairs, &["serialno", "serialnumber", "sn"]).map(str::to_string),
        admin_state: pick(&pairs, &["adminstate", "adminstatus"])
            .map(|s| s.to_ascii_lowercase()),
        status: pick(&pairs, &["runstate", "operstate", "operstatus", "state", "status"])
            .map(|s| s.to_ascii_lowercase()),
        rx_power_dbm: pick(&pairs, &["rxpowerdbm", "rxpower"]).and_then(leading_f64),
        tx_power_dbm: pick(&pairs, &["txpowerdbm", "txpower"]).and_then(leading_f64),
        temperature_c: pick(&pairs, &["temperaturec", "temperature"]).and_then(leading_f64),
        voltage_v: pick(&pairs, &["voltagev", "voltage"]).and_then(leading_f64),
        distance_m: pick(&pairs, &["distancem", "distance"]).and_then(leading_u32),
        vendor: pick(&pairs, &["vendorid", "vendor"]).map(str::to_string),
        model: pick(&pairs, &["model", "onttype", "equipmentid"]).map(str::to_string),
    })
}
