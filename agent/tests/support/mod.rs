// Scripted doubles for the southbound drivers and the control plane,
// shared by the integration tests. No device or HTTP server on the wire.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use ponpulse_agent::client::ControlPlane;
use ponpulse_agent::driver::{
    DatagramOlt, DriverFactory, OltDriver, OnuProvisionRequest, ServicePortRequest,
};
use ponpulse_common::{
    AgentError, BulkProvisionOp, BulkProvisionSummary, CommandResult, EquipmentConfig, OltAlarm,
    OltStatus, OnuRecord, OnuStatusUpdate, PonPortInfo, Result, ServicePortRecord, Vendor,
    VlanRecord,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn onu(pon_port: &str, onu_id: u32, serial: &str, admin: &str, status: &str) -> OnuRecord {
    OnuRecord {
        pon_port: pon_port.to_string(),
        onu_id,
        serial: Some(serial.to_string()),
        admin_state: Some(admin.to_string()),
        status: Some(status.to_string()),
        ..Default::default()
    }
}

pub fn equipment(id: &str, vendor: Vendor, datagram_enabled: bool) -> EquipmentConfig {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("{id} test olt"),
        "address": "192.0.2.10",
        "vendor": vendor.as_str(),
        "cli": {"host": "192.0.2.10", "port": 2323, "username": "admin", "password": "admin"},
        "datagram": {"community": "public", "port": 1661, "enabled": datagram_enabled}
    }))
    .expect("equipment fixture")
}

// ============================================================================
// CLI DRIVER DOUBLE
// ============================================================================

#[derive(Default)]
pub struct MockDeviceState {
    /// pon_port -> provisioned ONUs, the mock's authoritative table.
    pub onus: HashMap<String, Vec<OnuRecord>>,
    pub ports: Vec<PonPortInfo>,
    pub vlans: Vec<VlanRecord>,
    pub service_ports: Vec<ServicePortRecord>,
    pub status: OltStatus,
    pub alarms: Vec<OltAlarm>,
    /// When non-empty, `get_onu_info` answers from this script instead of
    /// the table. Lets tests fake slow reboots and flapping reads.
    pub info_script: VecDeque<Result<Option<OnuRecord>>>,
    /// Every typed operation the driver executed, in order.
    pub op_log: Vec<String>,
    pub fail_writes: bool,
}

pub struct MockDriver {
    vendor: Vendor,
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDriver {
    fn log(&self, entry: String) {
        self.state.lock().op_log.push(entry);
    }

    fn write_guard(&self, op: &str) -> Result<()> {
        if self.state.lock().fail_writes {
            return Err(AgentError::Execute {
                command: op.to_string(),
                output: "Failure: make failed".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OltDriver for MockDriver {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn connect(&mut self, _cancel: &CancellationToken) -> Result<()> {
        self.log("connect".into());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log("close".into());
        Ok(())
    }

    async fn execute(&mut self, _cancel: &CancellationToken, command: &str) -> Result<String> {
        self.log(format!("execute {command}"));
        Ok(String::new())
    }

    async fn list_pon_ports(&mut self, _cancel: &CancellationToken) -> Result<Vec<PonPortInfo>> {
        Ok(self.state.lock().ports.clone())
    }

    async fn get_pon_port(
        &mut self,
        _cancel: &CancellationToken,
        slot: u32,
        port: u32,
    ) -> Result<PonPortInfo> {
        self.state
            .lock()
            .ports
            .iter()
            .find(|p| p.slot == slot && p.port == port)
            .cloned()
            .ok_or_else(|| AgentError::Execute {
                command: format!("get port {slot}/{port}"),
                output: "port not found".into(),
            })
    }

    async fn list_onus(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
    ) -> Result<Vec<OnuRecord>> {
        Ok(self
            .state
            .lock()
            .onus
            .get(pon_port)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_onu_info(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<Option<OnuRecord>> {
        let mut state = self.state.lock();
        if let Some(step) = state.info_script.pop_front() {
            return step;
        }
        Ok(state
            .onus
            .get(pon_port)
            .and_then(|onus| onus.iter().find(|o| o.onu_id == onu_id))
            .cloned())
    }

    async fn get_onu_diagnostics(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<OnuRecord> {
        self.get_onu_info(cancel, pon_port, onu_id)
            .await?
            .ok_or_else(|| AgentError::Execute {
                command: format!("diagnostics {pon_port}:{onu_id}"),
                output: "onu not found".into(),
            })
    }

    async fn add_onu(
        &mut self,
        _cancel: &CancellationToken,
        request: &OnuProvisionRequest,
    ) -> Result<()> {
        self.write_guard("add_onu")?;
        self.log(format!(
            "add_onu {}:{} sn {}",
            request.pon_port, request.onu_id, request.serial
        ));
        let mut state = self.state.lock();
        state
            .onus
            .entry(request.pon_port.clone())
            .or_default()
            .push(OnuRecord {
                pon_port: request.pon_port.clone(),
                onu_id: request.onu_id,
                serial: Some(request.serial.clone()),
                admin_state: Some("enabled".into()),
                status: Some("offline".into()),
                ..Default::default()
            });
        Ok(())
    }

    async fn delete_onu(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        self.write_guard("delete_onu")?;
        self.log(format!("delete_onu {pon_port}:{onu_id}"));
        if let Some(onus) = self.state.lock().onus.get_mut(pon_port) {
            onus.retain(|o| o.onu_id != onu_id);
        }
        Ok(())
    }

    async fn reboot_onu(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        self.write_guard("reboot_onu")?;
        self.log(format!("reboot_onu {pon_port}:{onu_id}"));
        Ok(())
    }

    async fn suspend_onu(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        self.write_guard("suspend_onu")?;
        self.log(format!("suspend_onu {pon_port}:{onu_id}"));
        Ok(())
    }

    async fn resume_onu(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        self.write_guard("resume_onu")?;
        self.log(format!("resume_onu {pon_port}:{onu_id}"));
        Ok(())
    }

    async fn set_onu_vlan(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        vlan: u16,
    ) -> Result<()> {
        self.write_guard("set_onu_vlan")?;
        self.log(format!("set_onu_vlan {pon_port}:{onu_id} vlan {vlan}"));
        Ok(())
    }

    async fn assign_traffic_profile(
        &mut self,
        _cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        profile: &str,
    ) -> Result<()> {
        self.write_guard("assign_traffic_profile")?;
        self.log(format!("assign_traffic_profile {pon_port}:{onu_id} {profile}"));
        Ok(())
    }

    async fn list_vlans(&mut self, _cancel: &CancellationToken) -> Result<Vec<VlanRecord>> {
        Ok(self.state.lock().vlans.clone())
    }

    async fn create_vlan(
        &mut self,
        _cancel: &CancellationToken,
        vlan_id: u16,
        name: Option<&str>,
    ) -> Result<()> {
        self.write_guard("create_vlan")?;
        self.log(format!("create_vlan {vlan_id}"));
        self.state.lock().vlans.push(VlanRecord {
            vlan_id,
            name: name.map(str::to_string),
            kind: Some("smart".into()),
        });
        Ok(())
    }

    async fn delete_vlan(
        &mut self,
        _cancel: &CancellationToken,
        vlan_id: u16,
        _force: bool,
    ) -> Result<()> {
        self.write_guard("delete_vlan")?;
        self.log(format!("delete_vlan {vlan_id}"));
        self.state.lock().vlans.retain(|v| v.vlan_id != vlan_id);
        Ok(())
    }

    async fn add_service_port(
        &mut self,
        _cancel: &CancellationToken,
        request: &ServicePortRequest,
    ) -> Result<()> {
        self.write_guard("add_service_port")?;
        self.log(format!(
            "add_service_port vlan {} {}:{}",
            request.vlan_id, request.pon_port, request.onu_id
        ));
        self.state.lock().service_ports.push(ServicePortRecord {
            index: None,
            vlan_id: request.vlan_id,
            pon_port: request.pon_port.clone(),
            onu_id: request.onu_id,
            gem_port: Some(request.gem_port),
            user_vlan: request.user_vlan,
        });
        Ok(())
    }

    async fn list_service_ports(
        &mut self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ServicePortRecord>> {
        Ok(self.state.lock().service_ports.clone())
    }

    async fn set_pon_port_enabled(
        &mut self,
        _cancel: &CancellationToken,
        slot: u32,
        port: u32,
        enabled: bool,
    ) -> Result<()> {
        self.write_guard("set_pon_port_enabled")?;
        self.log(format!("set_pon_port_enabled {slot}/{port} {enabled}"));
        let mut state = self.state.lock();
        if let Some(p) = state
            .ports
            .iter_mut()
            .find(|p| p.slot == slot && p.port == port)
        {
            p.status = Some(if enabled { "online" } else { "shutdown" }.into());
        }
        Ok(())
    }

    async fn get_olt_status(&mut self, _cancel: &CancellationToken) -> Result<OltStatus> {
        Ok(self.state.lock().status.clone())
    }

    async fn get_alarms(&mut self, _cancel: &CancellationToken) -> Result<Vec<OltAlarm>> {
        Ok(self.state.lock().alarms.clone())
    }
}

// ============================================================================
// DATAGRAM DOUBLE
// ============================================================================

#[derive(Default)]
pub struct MockDatagram {
    /// Successive answers for `list_onus`; the final entry repeats.
    pub list_script: Mutex<VecDeque<Vec<OnuRecord>>>,
    pub status: Mutex<OltStatus>,
    pub ports: Mutex<Vec<PonPortInfo>>,
    pub alarms: Mutex<Vec<OltAlarm>>,
    pub bulk_result: Mutex<Option<BulkProvisionSummary>>,
    pub list_calls: Mutex<u32>,
    pub fail_status: Mutex<bool>,
}

impl MockDatagram {
    pub fn with_list_script(steps: Vec<Vec<OnuRecord>>) -> Arc<Self> {
        let datagram = Self::default();
        *datagram.list_script.lock() = steps.into();
        Arc::new(datagram)
    }

    fn next_list(&self) -> Vec<OnuRecord> {
        *self.list_calls.lock() += 1;
        let mut script = self.list_script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or_default()
        } else {
            script.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl DatagramOlt for MockDatagram {
    async fn list_onus(
        &self,
        _cancel: &CancellationToken,
        filter: Option<&str>,
    ) -> Result<Vec<OnuRecord>> {
        let mut records = self.next_list();
        if let Some(filter) = filter {
            records.retain(|r| r.pon_port.contains(filter));
        }
        Ok(records)
    }

    async fn get_onu_by_serial(
        &self,
        _cancel: &CancellationToken,
        serial: &str,
    ) -> Result<Option<OnuRecord>> {
        Ok(self
            .next_list()
            .into_iter()
            .find(|r| r.serial.as_deref() == Some(serial)))
    }

    async fn olt_status(&self, _cancel: &CancellationToken) -> Result<OltStatus> {
        if *self.fail_status.lock() {
            return Err(AgentError::Execute {
                command: "datagram olt.status".into(),
                output: "agent process not running".into(),
            });
        }
        Ok(self.status.lock().clone())
    }

    async fn list_ports(&self, _cancel: &CancellationToken) -> Result<Vec<PonPortInfo>> {
        Ok(self.ports.lock().clone())
    }

    async fn alarms(&self, _cancel: &CancellationToken) -> Result<Vec<OltAlarm>> {
        Ok(self.alarms.lock().clone())
    }

    async fn bulk_provision(
        &self,
        _cancel: &CancellationToken,
        _operations: &[BulkProvisionOp],
    ) -> Result<BulkProvisionSummary> {
        match self.bulk_result.lock().clone() {
            Some(summary) => Ok(summary),
            None => Err(AgentError::Unsupported("bulk not scripted".into())),
        }
    }

    async fn discover_unprovisioned(&self, _cancel: &CancellationToken) -> Result<Vec<OnuRecord>> {
        Ok(self.next_list())
    }
}

// ============================================================================
// CONTROL-PLANE DOUBLE
// ============================================================================

#[derive(Default)]
pub struct MockControlPlane {
    pub acks: Mutex<Vec<String>>,
    pub results: Mutex<Vec<(String, CommandResult)>>,
    pub updates: Mutex<Vec<(String, OnuStatusUpdate)>>,
    pub fail_updates: Mutex<bool>,
}

impl MockControlPlane {
    pub fn result_for(&self, command_id: &str) -> Option<CommandResult> {
        self.results
            .lock()
            .iter()
            .find(|(id, _)| id == command_id)
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn ack_command(&self, _cancel: &CancellationToken, command_id: &str) -> Result<()> {
        self.acks.lock().push(command_id.to_string());
        Ok(())
    }

    async fn push_result(
        &self,
        _cancel: &CancellationToken,
        command_id: &str,
        result: &CommandResult,
    ) -> Result<()> {
        self.results
            .lock()
            .push((command_id.to_string(), result.clone()));
        Ok(())
    }

    async fn push_onu_update(
        &self,
        _cancel: &CancellationToken,
        equipment_id: &str,
        update: &OnuStatusUpdate,
    ) -> Result<()> {
        if *self.fail_updates.lock() {
            return Err(AgentError::Transport {
                equipment: equipment_id.to_string(),
                detail: "update endpoint down".into(),
            });
        }
        self.updates
            .lock()
            .push((equipment_id.to_string(), update.clone()));
        Ok(())
    }
}

// ============================================================================
// FACTORY DOUBLE
// ============================================================================

pub struct MockFactory {
    pub vendor: Vendor,
    pub device: Arc<Mutex<MockDeviceState>>,
    pub datagram: Option<Arc<MockDatagram>>,
    pub cli_unreachable: bool,
}

impl MockFactory {
    pub fn cli_only(vendor: Vendor, device: Arc<Mutex<MockDeviceState>>) -> Self {
        Self {
            vendor,
            device,
            datagram: None,
            cli_unreachable: false,
        }
    }

    pub fn with_datagram(
        vendor: Vendor,
        device: Arc<Mutex<MockDeviceState>>,
        datagram: Arc<MockDatagram>,
    ) -> Self {
        Self {
            vendor,
            device,
            datagram: Some(datagram),
            cli_unreachable: false,
        }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn cli(
        &self,
        _cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Box<dyn OltDriver>> {
        if self.cli_unreachable {
            return Err(AgentError::Transport {
                equipment: config.id.clone(),
                detail: "connection refused".into(),
            });
        }
        Ok(Box::new(MockDriver {
            vendor: self.vendor,
            state: Arc::clone(&self.device),
        }))
    }

    async fn datagram(
        &self,
        _cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Arc<dyn DatagramOlt>> {
        match &self.datagram {
            Some(datagram) if config.datagram_enabled() => {
                Ok(Arc::clone(datagram) as Arc<dyn DatagramOlt>)
            }
            _ => Err(AgentError::Unsupported(format!(
                "no datagram surface for {}",
                config.id
            ))),
        }
    }
}
