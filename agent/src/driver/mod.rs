//! Southbound driver abstraction.
//!
//! Two independent capability surfaces per OLT: the interactive CLI surface
//! every vendor has (`OltDriver`), and the management datagram poll surface
//! only some firmware families expose (`DatagramOlt`). The dispatcher
//! queries presence at runtime and takes different paths rather than
//! forcing a single union type.

pub mod datagram;
pub mod huawei;
pub mod session;
pub mod vsol;

use async_trait::async_trait;
use ponpulse_common::{
    AgentError, BulkProvisionOp, BulkProvisionSummary, EquipmentConfig, OltAlarm, OltStatus,
    OnuRecord, PonPortInfo, Result, ServicePortRecord, Vendor, VlanRecord,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use datagram::DatagramPoller;
pub use huawei::HuaweiDriver;
pub use session::{LineSession, TcpLineSession};
pub use vsol::VsolDriver;

/// Parameters for provisioning one ONU over the interactive surface.
#[derive(Debug, Clone, Default)]
pub struct OnuProvisionRequest {
    pub pon_port: String,
    pub onu_id: u32,
    pub serial: String,
    pub line_profile: String,
    pub service_profile: String,
    pub vlan: Option<u16>,
    pub description: Option<String>,
}

/// Parameters for binding a VLAN to an ONU + GEM-port tuple.
#[derive(Debug, Clone)]
pub struct ServicePortRequest {
    pub vlan_id: u16,
    pub pon_port: String,
    pub onu_id: u32,
    pub gem_port: u32,
    pub user_vlan: Option<u16>,
}

/// Interactive capability surface. Sessions are stateful and not safe for
/// concurrent use; each command owns its driver instance.
#[async_trait]
pub trait OltDriver: Send {
    fn vendor(&self) -> Vendor;

    async fn connect(&mut self, cancel: &CancellationToken) -> Result<()>;
    async fn close(&mut self) -> Result<()>;

    /// Raw escape hatch: send vendor CLI text, get device output.
    async fn execute(&mut self, cancel: &CancellationToken, command: &str) -> Result<String>;

    async fn list_pon_ports(&mut self, cancel: &CancellationToken) -> Result<Vec<PonPortInfo>>;
    async fn get_pon_port(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
    ) -> Result<PonPortInfo>;

    async fn list_onus(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
    ) -> Result<Vec<OnuRecord>>;
    async fn get_onu_info(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<Option<OnuRecord>>;
    async fn get_onu_diagnostics(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<OnuRecord>;

    async fn add_onu(
        &mut self,
        cancel: &CancellationToken,
        request: &OnuProvisionRequest,
    ) -> Result<()>;
    async fn delete_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()>;
    async fn reboot_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()>;
    async fn suspend_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()>;
    async fn resume_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()>;
    async fn set_onu_vlan(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        vlan: u16,
    ) -> Result<()>;
    async fn assign_traffic_profile(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        profile: &str,
    ) -> Result<()>;

    async fn list_vlans(&mut self, cancel: &CancellationToken) -> Result<Vec<VlanRecord>>;
    async fn create_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        name: Option<&str>,
    ) -> Result<()>;
    async fn delete_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        force: bool,
    ) -> Result<()>;

    async fn add_service_port(
        &mut self,
        cancel: &CancellationToken,
        request: &ServicePortRequest,
    ) -> Result<()>;
    async fn list_service_ports(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServicePortRecord>>;

    async fn set_pon_port_enabled(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
        enabled: bool,
    ) -> Result<()>;

    async fn get_olt_status(&mut self, cancel: &CancellationToken) -> Result<OltStatus>;
    async fn get_alarms(&mut self, cancel: &CancellationToken) -> Result<Vec<OltAlarm>>;
}

/// Management datagram poll surface. Read-biased and structured; queries the
/// OLT's authoritative state table rather than a `show` view.
#[async_trait]
pub trait DatagramOlt: Send + Sync {
    /// List ONUs, optionally restricted to PON ports containing `filter`.
    async fn list_onus(
        &self,
        cancel: &CancellationToken,
        filter: Option<&str>,
    ) -> Result<Vec<OnuRecord>>;
    async fn get_onu_by_serial(
        &self,
        cancel: &CancellationToken,
        serial: &str,
    ) -> Result<Option<OnuRecord>>;
    async fn olt_status(&self, cancel: &CancellationToken) -> Result<OltStatus>;
    async fn list_ports(&self, cancel: &CancellationToken) -> Result<Vec<PonPortInfo>>;
    async fn alarms(&self, cancel: &CancellationToken) -> Result<Vec<OltAlarm>>;
    async fn bulk_provision(
        &self,
        cancel: &CancellationToken,
        operations: &[BulkProvisionOp],
    ) -> Result<BulkProvisionSummary>;
    async fn discover_unprovisioned(&self, cancel: &CancellationToken) -> Result<Vec<OnuRecord>>;
}

/// Builds transports for the dispatcher. A trait so tests can substitute
/// scripted drivers without a device on the wire.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Build and connect the interactive driver for this OLT.
    async fn cli(
        &self,
        cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Box<dyn OltDriver>>;

    /// Build the datagram poller, probing reachability. Errors here mean
    /// "surface unavailable right now"; vendor/config gating happens first.
    async fn datagram(
        &self,
        cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Arc<dyn DatagramOlt>>;
}

/// Production factory: TCP line sessions for the CLI surface, UDP pollers
/// for the datagram surface.
#[derive(Debug, Default)]
pub struct NetworkDriverFactory;

#[async_trait]
impl DriverFactory for NetworkDriverFactory {
    async fn cli(
        &self,
        cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Box<dyn OltDriver>> {
        if !config.cli.enabled {
            return Err(AgentError::Transport {
                equipment: config.id.clone(),
                detail: "interactive transport disabled".into(),
            });
        }
        let session = Box::new(TcpLineSession::new(config.id.clone(), config.cli.clone()));
        let mut driver: Box<dyn OltDriver> = match config.vendor {
            Vendor::Huawei => Box::new(HuaweiDriver::new(config.id.clone(), session)),
            Vendor::Vsol => Box::new(VsolDriver::new(config.id.clone(), session)),
        };
        driver.connect(cancel).await?;
        Ok(driver)
    }

    async fn datagram(
        &self,
        cancel: &CancellationToken,
        config: &EquipmentConfig,
    ) -> Result<Arc<dyn DatagramOlt>> {
        if !config.datagram_enabled() {
            return Err(AgentError::Unsupported(format!(
                "equipment {} ({}) has no datagram surface",
                config.id, config.vendor
            )));
        }
        let poller = DatagramPoller::open(cancel, config).await?;
        Ok(Arc::new(poller))
    }
}
