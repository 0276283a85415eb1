// V-SOL V1600-family interactive driver
//
// Same capability surface as the Huawei driver with V-SOL's own command
// grammar. V-SOL addresses PON interfaces as slot/port directly.
use super::session::LineSession;
use super::{OltDriver, OnuProvisionRequest, ServicePortRequest};
use crate::parser;
use async_trait::async_trait;
use ponpulse_common::{
    AgentError, OltAlarm, OltStatus, OnuRecord, PonPortInfo, Result, ServicePortRecord, Vendor,
    VlanRecord,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct VsolDriver {
    equipment_id: String,
    session: Box<dyn LineSession>,
}

impl VsolDriver {
    pub fn new(equipment_id: impl Into<String>, session: Box<dyn LineSession>) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            session,
        }
    }

    fn check_output(command: &str, output: &str) -> Result<()> {
        let lowered = output.to_ascii_lowercase();
        if lowered.contains("error:")
            || lowered.contains("% invalid input")
            || lowered.contains("unknown command")
        {
            return Err(AgentError::Execute {
                command: command.to_string(),
                output: output.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn run(&mut self, cancel: &CancellationToken, command: &str) -> Result<String> {
        let output = self.session.execute(cancel, command).await?;
        Self::check_output(command, &output)?;
        Ok(output)
    }

    /// Writes happen inside `interface pon <slot>/<port>`; leave with
    /// `exit` even when a line fails.
    async fn run_in_interface(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
        lines: &[String],
    ) -> Result<()> {
        self.run(cancel, &format!("interface pon {slot}/{port}")).await?;
        for line in lines {
            if let Err(e) = self.run(cancel, line).await {
                let _ = self.session.execute(cancel, "exit").await;
                return Err(e);
            }
        }
        self.run(cancel, "exit").await?;
        Ok(())
    }
}

#[async_trait]
impl OltDriver for VsolDriver {
    fn vendor(&self) -> Vendor {
        Vendor::Vsol
    }

    async fn connect(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.session.connect(cancel).await?;
        let _ = self.session.execute(cancel, "terminal length 0").await;
        debug!(equipment = %self.equipment_id, "vsol driver connected");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session.close().await
    }

    async fn execute(&mut self, cancel: &CancellationToken, command: &str) -> Result<String> {
        self.run(cancel, command).await
    }

    async fn list_pon_ports(&mut self, cancel: &CancellationToken) -> Result<Vec<PonPortInfo>> {
        let output = self.run(cancel, "show pon port").await?;
        Ok(parser::port::parse_port_list(&output, Vendor::Vsol))
    }

    async fn get_pon_port(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
    ) -> Result<PonPortInfo> {
        let command = format!("show pon port {slot}/{port}");
        let output = self.run(cancel, &command).await?;
        parser::port::parse_port_info(&output, Vendor::Vsol, slot, port).ok_or_else(|| {
            AgentError::Execute {
                command,
                output: "no parseable port state in device output".into(),
            }
        })
    }

    async fn list_onus(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
    ) -> Result<Vec<OnuRecord>> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        let output = self
            .run(cancel, &format!("show onu info {slot}/{port}"))
            .await?;
        Ok(parser::onu::parse_onu_list(
            &output,
            Vendor::Vsol,
            &parser::format_pon_port(slot, port),
        ))
    }

    async fn get_onu_info(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<Option<OnuRecord>> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        let command = format!("show onu detail-info {slot}/{port} {onu_id}");
        match self.run(cancel, &command).await {
            Ok(output) => Ok(parser::onu::parse_onu_info(
                &output,
                Vendor::Vsol,
                &parser::format_pon_port(slot, port),
                onu_id,
            )),
            Err(AgentError::Execute { output, .. })
                if output.to_ascii_lowercase().contains("not exist")
                    || output.to_ascii_lowercase().contains("not found") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_onu_diagnostics(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<OnuRecord> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        let command = format!("show onu optical-info {slot}/{port} {onu_id}");
        let output = self.run(cancel, &command).await?;
        parser::onu::parse_onu_info(
            &output,
            Vendor::Vsol,
            &parser::format_pon_port(slot, port),
            onu_id,
        )
        .ok_or_else(|| AgentError::Execute {
            command,
            output: "no parseable optical diagnostics in device output".into(),
        })
    }

    async fn add_onu(
        &mut self,
        cancel: &CancellationToken,
        request: &OnuProvisionRequest,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(&request.pon_port)?;
        let mut lines = vec![format!(
            "onu add {} sn {} line-profile {} service-profile {}",
            request.onu_id, request.serial, request.line_profile, request.service_profile
        )];
        if let Some(vlan) = request.vlan {
            lines.push(format!("onu port vlan {} eth 1 vlan {vlan}", request.onu_id));
        }
        if let Some(desc) = &request.description {
            lines.push(format!("onu description {} {desc}", request.onu_id));
        }
        self.run_in_interface(cancel, slot, port, &lines).await
    }

    async fn delete_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(cancel, slot, port, &[format!("no onu {onu_id}")])
            .await
    }

    async fn reboot_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(cancel, slot, port, &[format!("onu reboot {onu_id}")])
            .await
    }

    async fn suspend_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(cancel, slot, port, &[format!("onu deactivate {onu_id}")])
            .await
    }

    async fn resume_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(cancel, slot, port, &[format!("onu activate {onu_id}")])
            .await
    }

    async fn set_onu_vlan(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        vlan: u16,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(
            cancel,
            slot,
            port,
            &[format!("onu port vlan {onu_id} eth 1 vlan {vlan}")],
        )
        .await
    }

    async fn assign_traffic_profile(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        profile: &str,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(pon_port)?;
        self.run_in_interface(
            cancel,
            slot,
            port,
            &[format!("onu traffic-profile {onu_id} {profile}")],
        )
        .await
    }

    async fn list_vlans(&mut self, cancel: &CancellationToken) -> Result<Vec<VlanRecord>> {
        let output = self.run(cancel, "show vlan").await?;
        Ok(parser::service_port::parse_vlan_list(&output))
    }

    async fn create_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        name: Option<&str>,
    ) -> Result<()> {
        self.run(cancel, &format!("vlan {vlan_id}")).await?;
        if let Some(name) = name {
            self.run(cancel, &format!("vlan name {vlan_id} {name}")).await?;
        }
        Ok(())
    }

    async fn delete_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        _force: bool,
    ) -> Result<()> {
        self.run(cancel, &format!("no vlan {vlan_id}")).await?;
        Ok(())
    }

    async fn add_service_port(
        &mut self,
        cancel: &CancellationToken,
        request: &ServicePortRequest,
    ) -> Result<()> {
        let (slot, port) = parser::parse_pon_port(&request.pon_port)?;
        let user_vlan = request.user_vlan.unwrap_or(request.vlan_id);
        self.run(
            cancel,
            &format!(
                "service-port {} pon {slot}/{port} onu {} gem {} user-vlan {user_vlan}",
                request.vlan_id, request.onu_id, request.gem_port
            ),
        )
        .await?;
        Ok(())
    }

    async fn list_service_ports(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServicePortRecord>> {
        let output = self.run(cancel, "show service-port all").await?;
        Ok(parser::service_port::parse_service_ports(&output))
    }

    async fn set_pon_port_enabled(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
        enabled: bool,
    ) -> Result<()> {
        let line = if enabled { "no shutdown" } else { "shutdown" };
        self.run_in_interface(cancel, slot, port, &[line.to_string()])
            .await
    }

    async fn get_olt_status(&mut self, cancel: &CancellationToken) -> Result<OltStatus> {
        let command = "show system status";
        let output = self.run(cancel, command).await?;
        let status = parser::status::parse_olt_status(&output);
        if status.cpu_percent.is_none() && status.uptime.is_none() && status.version.is_none() {
            return Err(AgentError::Execute {
                command: command.to_string(),
                output: "system status output matched no known dialect".into(),
            });
        }
        Ok(status)
    }

    async fn get_alarms(&mut self, cancel: &CancellationToken) -> Result<Vec<OltAlarm>> {
        let output = self.run(cancel, "show alarm active").await?;
        Ok(parser::alarm::parse_alarms(&output))
    }
}
