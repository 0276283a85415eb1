// PON port list / info extraction
use super::{labeled_pairs, leading_f64, leading_u32, parse_pon_port, pick, split_blocks};
use once_cell::sync::Lazy;
use ponpulse_common::{PonPortInfo, Vendor};
use regex::Regex;

// Huawei `display port state all` row:
//   0/0/1    GPON    Online    12
static HUAWEI_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d+/\d+/\d+)\s+(\S+)\s+(\S+)\s+(\d+)\s*$").expect("huawei port row")
});

// V-SOL `show pon port` row:
//   0/1    enable    12    3.50
static VSOL_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d+/\d+)\s+(\S+)\s+(\d+)\s+(-?\d+(?:\.\d+)?|-)\s*$")
        .expect("vsol port row")
});

pub fn parse_port_list(output: &str, vendor: Vendor) -> Vec<PonPortInfo> {
    let rows: Vec<PonPortInfo> = match vendor {
        Vendor::Huawei => HUAWEI_ROW
            .captures_iter(output)
            .filter_map(|caps| {
                let (slot, port) = parse_pon_port(&caps[1]).ok()?;
                Some(PonPortInfo {
                    slot,
                    port,
                    name: Some(format!("{}:{}", &caps[2], &caps[1])),
                    status: Some(caps[3].to_ascii_lowercase()),
                    onu_count: caps[4].parse().ok(),
                    tx_power_dbm: None,
                })
            })
            .collect(),
        Vendor::Vsol => VSOL_ROW
            .captures_iter(output)
            .filter_map(|caps| {
                let (slot, port) = parse_pon_port(&caps[1]).ok()?;
                Some(PonPortInfo {
                    slot,
                    port,
                    name: None,
                    status: Some(caps[2].to_ascii_lowercase()),
                    onu_count: caps[3].parse().ok(),
                    tx_power_dbm: caps[4].parse().ok(),
                })
            })
            .collect(),
    };
    if !rows.is_empty() {
        return rows;
    }
    split_blocks(output)
        .iter()
        .filter_map(|block| parse_port_block(block))
        .collect()
}

pub fn parse_port_info(output: &str, vendor: Vendor, slot: u32, port: u32) -> Option<PonPortInfo> {
    parse_port_list(output, vendor)
        .into_iter()
        .find(|p| p.slot == slot && p.port == port)
}

fn parse_port_block(block: &str) -> Option<PonPortInfo> {
    let pairs = labeled_pairs(block);
    let raw_port = pick(&pairs, &["port", "ponport", "fsp", "interface"])?;
    let (slot, port) = parse_pon_port(raw_port).ok()?;
    Some(PonPortInfo {
        slot,
        port,
        name: pick(&pairs, &["name", "description"]).map(str::to_string),
        status: pick(&pairs, &["status", "state", "opticalstate"]).map(|s| s.to_ascii_lowercase()),
        onu_count: pick(&pairs, &["onucount", "ontcount", "onus"]).and_then(leading_u32),
        tx_power_dbm: pick(&pairs, &["txpowerdbm", "txpower"]).and_then(leading_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUAWEI_TABLE: &str = "\
  F/S/P    Port-type  Optical-state  ONT-count
  -------  ---------  -------------  ---------
  0/0/1    GPON       Online         12
  0/1/2    GPON       Offline        0
";

    const VSOL_TABLE: &str = "\
  PON    Status   ONUs   TxPower(dBm)
  ----   ------   ----   ------------
  0/1    enable   12     3.50
  0/2    disable  0      -
";

    const BLOCK: &str = "\
  Port        : 0/1
  Status      : enable
  Onu Count   : 7
  Tx Power    : 3.50 dBm
";

    #[test]
    fn huawei_ports_parse_ignoring_frame() {
        let ports = parse_port_list(HUAWEI_TABLE, Vendor::Huawei);
        assert_eq!(ports.len(), 2);
        assert_eq!((ports[0].slot, ports[0].port), (0, 1));
        assert_eq!((ports[1].slot, ports[1].port), (1, 2));
        assert_eq!(ports[0].onu_count, Some(12));
        assert_eq!(ports[0].status.as_deref(), Some("online"));
    }

    #[test]
    fn vsol_ports_parse() {
        let ports = parse_port_list(VSOL_TABLE, Vendor::Vsol);
        assert_eq!(ports.len(), 2);
        assert_eq!((ports[0].slot, ports[0].port), (0, 1));
        assert_eq!(ports[0].tx_power_dbm, Some(3.50));
        assert_eq!(ports[1].tx_power_dbm, None);
    }

    #[test]
    fn block_fallback_and_info_lookup() {
        let info = parse_port_info(BLOCK, Vendor::Vsol, 0, 1).unwrap();
        assert_eq!(info.onu_count, Some(7));
        assert_eq!(info.tx_power_dbm, Some(3.50));
        assert!(parse_port_info(BLOCK, Vendor::Vsol, 0, 9).is_none());
    }
}
