// VLAN table and service-port table extraction
use super::{labeled_pairs, leading_u32, pick, split_blocks};
use once_cell::sync::Lazy;
use ponpulse_common::{ServicePortRecord, VlanRecord};
use regex::Regex;

// VLAN row, both vendors:
//   100   smart   cust-vlan        (huawei: id type name)
//   100   cust-vlan   common       (vsol:   id name type)
static VLAN_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d{1,4})\s+(\S+)(?:\s+(\S+))?\s*$").expect("vlan row"));

// Service-port row:
//   1   100   0/0/1   5   1   100
static SERVICE_PORT_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(\d+)\s+(\d{1,4})\s+(\d+(?:/\d+){1,2})\s+(\d+)\s+(\d+)\s+(\d{1,4}|-)\s*$")
        .expect("service port row")
});

pub fn parse_vlan_list(output: &str) -> Vec<VlanRecord> {
    let rows: Vec<VlanRecord> = VLAN_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            let vlan_id: u16 = caps[1].parse().ok()?;
            let second = caps[2].to_string();
            let third = caps.get(3).map(|m| m.as_str().to_string());
            // Heuristic over the two column orders: the type column is one
            // of a small closed set, the name column is free-form.
            let (kind, name) = if is_vlan_kind(&second) {
                (Some(second), third)
            } else {
                (third, Some(second))
            };
            Some(VlanRecord {
                vlan_id,
                name,
                kind,
            })
        })
        .collect();
    if !rows.is_empty() {
        return rows;
    }
    split_blocks(output)
        .iter()
        .filter_map(|block| {
            let pairs = labeled_pairs(block);
            let vlan_id = pick(&pairs, &["vlanid", "vlan", "id"]).and_then(leading_u32)?;
            Some(VlanRecord {
                vlan_id: u16::try_from(vlan_id).ok()?,
                name: pick(&pairs, &["name", "description"]).map(str::to_string),
                kind: pick(&pairs, &["type", "kind", "attribute"]).map(str::to_string),
            })
        })
        .collect()
}

fn is_vlan_kind(token: &str) -> bool {
    matches!(
        token.to_ascii_lowercase().as_str(),
        "smart" | "standard" | "mux" | "super" | "common"
    )
}

pub fn parse_service_ports(output: &str) -> Vec<ServicePortRecord> {
    let rows: Vec<ServicePortRecord> = SERVICE_PORT_ROW
        .captures_iter(output)
        .filter_map(|caps| {
            Some(ServicePortRecord {
                index: caps[1].parse().ok(),
                vlan_id: caps[2].parse().ok()?,
                pon_port: caps[3].to_string(),
                onu_id: caps[4].parse().ok()?,
                gem_port: caps[5].parse().ok(),
                user_vlan: caps[6].parse().ok(),
            })
        })
        .collect();
    if !rows.is_empty() {
        return rows;
    }
    split_blocks(output)
        .iter()
        .filter_map(|block| {
            let pairs = labeled_pairs(block);
            Some(ServicePortRecord {
                index: pick(&pairs, &["index", "spindex"]).and_then(leading_u32),
                vlan_id: u16::try_from(pick(&pairs, &["vlanid", "vlan"]).and_then(leading_u32)?)
                    .ok()?,
                pon_port: pick(&pairs, &["port", "ponport", "fsp"])?.to_string(),
                onu_id: pick(&pairs, &["ontid", "onuid", "ont", "onu"]).and_then(leading_u32)?,
                gem_port: pick(&pairs, &["gemport", "gem"]).and_then(leading_u32),
                user_vlan: pick(&pairs, &["uservlan"])
                    .and_then(leading_u32)
                    .and_then(|v| u16::try_from(v).ok()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUAWEI_VLANS: &str = "\
  VLAN-ID  Type    Description
  -------  ------  -----------
  100      smart   cust-vlan
  200      smart   mgmt
";

    const VSOL_VLANS: &str = "\
  VLAN  Name        Type
  ----  ----------  ------
  100   cust-vlan   common
";

    const SERVICE_PORTS: &str = "\
  INDEX  VLAN  F/S/P    ONT  GEM  USER-VLAN
  -----  ----  -------  ---  ---  ---------
  1      100   0/0/1    5    1    100
  2      200   0/0/1    6    2    -
";

    #[test]
    fn vlan_rows_parse_both_column_orders() {
        let huawei = parse_vlan_list(HUAWEI_VLANS);
        assert_eq!(huawei.len(), 2);
        assert_eq!(huawei[0].vlan_id, 100);
        assert_eq!(huawei[0].kind.as_deref(), Some("smart"));
        assert_eq!(huawei[0].name.as_deref(), Some("cust-vlan"));

        let vsol = parse_vlan_list(VSOL_VLANS);
        assert_eq!(vsol[0].name.as_deref(), Some("cust-vlan"));
        assert_eq!(vsol[0].kind.as_deref(), Some("common"));
    }

    #[test]
    fn service_port_rows_parse() {
        let records = parse_service_ports(SERVICE_PORTS);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].vlan_id, 100);
        assert_eq!(records[0].pon_port, "0/0/1");
        assert_eq!(records[0].onu_id, 5);
        assert_eq!(records[0].user_vlan, Some(100));
        assert_eq!(records[1].user_vlan, None);
    }
}
