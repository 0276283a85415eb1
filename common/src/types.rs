// Core domain types - JSON-serializable and compatible with the control-plane schemas
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// EQUIPMENT
// ============================================================================

/// OLT vendor tag. Closed set; extend here when a new driver lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Huawei,
    Vsol,
}

impl Vendor {
    /// Whether this vendor's firmware family exposes the management
    /// datagram poll surface. Huawei units here are CLI-only.
    pub fn supports_datagram(&self) -> bool {
        matches!(self, Vendor::Vsol)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Huawei => "huawei",
            Vendor::Vsol => "vsol",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "huawei" => Ok(Vendor::Huawei),
            "vsol" | "v-sol" => Ok(Vendor::Vsol),
            other => Err(format!("unknown vendor '{other}'")),
        }
    }
}

/// Interactive (CLI) transport block of an equipment config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliTransportConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Datagram (management poll) transport block of an equipment config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatagramTransportConfig {
    pub community: String,
    #[serde(default = "default_datagram_version")]
    pub version: u8,
    pub port: u16,
    #[serde(default)]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_datagram_version() -> u8 {
    2
}

/// Immutable per-reload description of one managed OLT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub vendor: Vendor,
    pub cli: CliTransportConfig,
    pub datagram: DatagramTransportConfig,
}

impl EquipmentConfig {
    /// At least one transport must be enabled or the OLT is unreachable.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.cli.enabled && !self.datagram.enabled {
            return Err(format!("equipment {}: no transport enabled", self.id));
        }
        Ok(())
    }

    pub fn datagram_enabled(&self) -> bool {
        self.datagram.enabled && self.vendor.supports_datagram()
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Every command kind the control plane may hand to an agent.
///
/// Unknown wire tags deserialize to `Unsupported` so a newer control plane
/// gets a typed error result instead of a panicking agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    OnuList,
    OnuGet,
    OnuDiagnostics,
    OnuDiscover,
    PortList,
    OltStatus,
    VlanList,
    VlanGet,
    OnuSuspend,
    OnuResume,
    OnuReboot,
    OnuProvision,
    OnuDelete,
    OnuUpdate,
    OnuBulkProvision,
    VlanCreate,
    VlanDelete,
    ServicePortAdd,
    PortEnable,
    PortDisable,
    PortPower,
    Unsupported(String),
}

impl CommandKind {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "onu_list" => CommandKind::OnuList,
            "onu_get" => CommandKind::OnuGet,
            "onu_diagnostics" => CommandKind::OnuDiagnostics,
            "onu_discover" => CommandKind::OnuDiscover,
            "port_list" => CommandKind::PortList,
            "olt_status" => CommandKind::OltStatus,
            "vlan_list" => CommandKind::VlanList,
            "vlan_get" => CommandKind::VlanGet,
            "onu_suspend" => CommandKind::OnuSuspend,
            "onu_resume" => CommandKind::OnuResume,
            "onu_reboot" => CommandKind::OnuReboot,
            "onu_provision" => CommandKind::OnuProvision,
            "onu_delete" => CommandKind::OnuDelete,
            "onu_update" => CommandKind::OnuUpdate,
            "onu_bulk_provision" => CommandKind::OnuBulkProvision,
            "vlan_create" => CommandKind::VlanCreate,
            "vlan_delete" => CommandKind::VlanDelete,
            "service_port_add" => CommandKind::ServicePortAdd,
            "port_enable" => CommandKind::PortEnable,
            "port_disable" => CommandKind::PortDisable,
            "port_power" => CommandKind::PortPower,
            other => CommandKind::Unsupported(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            CommandKind::OnuList => "onu_list",
            CommandKind::OnuGet => "onu_get",
            CommandKind::OnuDiagnostics => "onu_diagnostics",
            CommandKind::OnuDiscover => "onu_discover",
            CommandKind::PortList => "port_list",
            CommandKind::OltStatus => "olt_status",
            CommandKind::VlanList => "vlan_list",
            CommandKind::VlanGet => "vlan_get",
            CommandKind::OnuSuspend => "onu_suspend",
            CommandKind::OnuResume => "onu_resume",
            CommandKind::OnuReboot => "onu_reboot",
            CommandKind::OnuProvision => "onu_provision",
            CommandKind::OnuDelete => "onu_delete",
            CommandKind::OnuUpdate => "onu_update",
            CommandKind::OnuBulkProvision => "onu_bulk_provision",
            CommandKind::VlanCreate => "vlan_create",
            CommandKind::VlanDelete => "vlan_delete",
            CommandKind::ServicePortAdd => "service_port_add",
            CommandKind::PortEnable => "port_enable",
            CommandKind::PortDisable => "port_disable",
            CommandKind::PortPower => "port_power",
            CommandKind::Unsupported(s) => s.as_str(),
        }
    }

    /// Read kinds prefer the datagram transport when available. Discovery
    /// is included because only the poll surface exposes the autofind
    /// table.
    pub fn is_datagram_read(&self) -> bool {
        matches!(
            self,
            CommandKind::OnuList
                | CommandKind::PortList
                | CommandKind::OltStatus
                | CommandKind::OnuDiscover
        )
    }

    /// Write-verify kinds get a CLI transport for execution plus a
    /// best-effort datagram transport for verification.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            CommandKind::OnuSuspend
                | CommandKind::OnuResume
                | CommandKind::OnuProvision
                | CommandKind::OnuDelete
                | CommandKind::OnuUpdate
                | CommandKind::OnuReboot
                | CommandKind::OnuBulkProvision
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for CommandKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for CommandKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(CommandKind::from_wire(&s))
    }
}

/// A command fetched from the control plane, consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCommand {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub equipment_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PendingCommand {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(|v| v.as_u64())
    }

    pub fn param_bool(&self, key: &str) -> bool {
        self.payload
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Outcome of one command, pushed back to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(payload),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }

    /// Partial failure for bulk kinds: error set, per-item payload attached.
    pub fn fail_with(error: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            success: false,
            result: Some(payload),
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

// ============================================================================
// ONU / OLT RECORDS
// ============================================================================

/// One subscriber-side unit as observed on the OLT. The agent never stores
/// these; every field is whatever the last device read yielded. Fields the
/// parser could not extract stay `None` rather than zero-filled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnuRecord {
    pub pon_port: String,
    pub onu_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_power_dbm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_power_dbm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage_v: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl OnuRecord {
    /// Case-insensitive status match against an acceptable set.
    pub fn status_in(&self, acceptable: &[&str]) -> bool {
        match &self.status {
            Some(s) => {
                let lowered = s.to_ascii_lowercase();
                acceptable.iter().any(|a| a.eq_ignore_ascii_case(&lowered))
            }
            None => false,
        }
    }

    pub fn serial_matches(&self, expected: &str) -> bool {
        self.serial
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }
}

/// Head-end health snapshot parsed from `display`/`show` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OltStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Normalized alarm severity. Wire form is always the lowercase tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSeverity {
    Critical,
    Major,
    Minor,
    Warning,
    Info,
}

impl AlarmSeverity {
    /// Collapse vendor synonyms onto the closed set. Idempotent on its own
    /// output. Unrecognized strings land on `Info`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "crit" => AlarmSeverity::Critical,
            "major" | "maj" => AlarmSeverity::Major,
            "minor" | "min" => AlarmSeverity::Minor,
            "warning" | "warn" => AlarmSeverity::Warning,
            _ => AlarmSeverity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmSeverity::Critical => "critical",
            AlarmSeverity::Major => "major",
            AlarmSeverity::Minor => "minor",
            AlarmSeverity::Warning => "warning",
            AlarmSeverity::Info => "info",
        }
    }
}

impl fmt::Display for AlarmSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active alarm row. Timestamp is RFC 3339.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OltAlarm {
    pub id: String,
    pub severity: AlarmSeverity,
    #[serde(rename = "type")]
    pub alarm_type: String,
    pub source: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One optical interface on the OLT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PonPortInfo {
    pub slot: u32,
    pub port: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_power_dbm: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VlanRecord {
    pub vlan_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// OLT-local binding of a VLAN to an ONU + GEM-port tuple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicePortRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub vlan_id: u16,
    pub pon_port: String,
    pub onu_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gem_port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_vlan: Option<u16>,
}

/// Immediate ONU update pushed after a verified mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnuStatusUpdate {
    pub serial: String,
    pub pon_port: String,
    pub onu_id: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rx_power: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============================================================================
// BULK PROVISION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkProvisionOp {
    pub serial: String,
    pub pon_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onu_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_up_kbps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_down_kbps: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub serial: String,
    pub pon_port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onu_id: Option<u32>,
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_id: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkProvisionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

// ============================================================================
// METRICS
// ============================================================================

/// One telemetry observation bound for `/api/v1/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub equipment_id: String,
    pub name: String,
    pub value: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub type MetricsBatch = Vec<MetricPoint>;

// ============================================================================
// AGENT CONFIGURATION
// ============================================================================

/// Process-level agent configuration, read from the environment at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub control_plane_url: String,
    pub node_id: String,
    pub api_token: Option<String>,
    pub org_id: Option<String>,
    pub enroll_key: Option<String>,
    pub equipment_file: String,
    pub poll_interval_secs: u64,
    pub telemetry_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "http://localhost:8080".to_string(),
            node_id: "node-local".to_string(),
            api_token: None,
            org_id: None,
            enroll_key: None,
            equipment_file: "equipment.json".to_string(),
            poll_interval_secs: 10,
            telemetry_interval_secs: 60,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            control_plane_url: std::env::var("PONPULSE_CONTROL_PLANE_URL")
                .unwrap_or(defaults.control_plane_url),
            node_id: std::env::var("PONPULSE_NODE_ID").unwrap_or(defaults.node_id),
            api_token: std::env::var("PONPULSE_API_TOKEN").ok(),
            org_id: std::env::var("PONPULSE_ORG_ID").ok(),
            enroll_key: std::env::var("PONPULSE_ENROLL_KEY").ok(),
            equipment_file: std::env::var("PONPULSE_EQUIPMENT_FILE")
                .unwrap_or(defaults.equipment_file),
            poll_interval_secs: std::env::var("PONPULSE_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval_secs),
            telemetry_interval_secs: std::env::var("PONPULSE_TELEMETRY_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.telemetry_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kind_wire_roundtrip() {
        for tag in [
            "onu_list",
            "onu_suspend",
            "onu_bulk_provision",
            "vlan_delete",
            "port_power",
        ] {
            assert_eq!(CommandKind::from_wire(tag).as_wire(), tag);
        }
    }

    #[test]
    fn unknown_command_kind_is_typed_not_panic() {
        let cmd: PendingCommand = serde_json::from_value(serde_json::json!({
            "id": "c9",
            "type": "olt_selfdestruct",
            "equipment_id": "olt-1",
            "payload": {}
        }))
        .unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Unsupported("olt_selfdestruct".to_string())
        );
    }

    #[test]
    fn severity_normalization_is_idempotent() {
        for raw in ["CRIT", "crit", "MAJ", "WARN", "information", "Minor", "bogus"] {
            let once = AlarmSeverity::normalize(raw);
            let twice = AlarmSeverity::normalize(once.as_str());
            assert_eq!(once, twice, "normalize not idempotent for {raw}");
        }
        assert_eq!(AlarmSeverity::normalize("CRIT"), AlarmSeverity::Critical);
        assert_eq!(AlarmSeverity::normalize("MAJ"), AlarmSeverity::Major);
        assert_eq!(AlarmSeverity::normalize("WARN"), AlarmSeverity::Warning);
        assert_eq!(AlarmSeverity::normalize("information"), AlarmSeverity::Info);
    }

    #[test]
    fn equipment_requires_one_enabled_transport() {
        let mut cfg: EquipmentConfig = serde_json::from_value(serde_json::json!({
            "id": "olt-1",
            "address": "10.0.0.2",
            "vendor": "vsol",
            "cli": {"host": "10.0.0.2", "port": 2323, "username": "admin", "password": "admin"},
            "datagram": {"community": "public", "port": 1661, "enabled": true}
        }))
        .unwrap();
        assert!(cfg.validate().is_ok());
        cfg.cli.enabled = false;
        cfg.datagram.enabled = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn onu_status_match_is_case_insensitive() {
        let onu = OnuRecord {
            pon_port: "0/1".into(),
            onu_id: 5,
            status: Some("ONLINE".into()),
            ..Default::default()
        };
        assert!(onu.status_in(&["online", "active"]));
        assert!(!onu.status_in(&["offline"]));
    }
}
