// Huawei SmartAX interactive driver
//
// Synthesizes MA56xx-style CLI text from parsed (slot, port) coordinates
// and feeds the output through the shared parsers. Huawei addresses PON
// interfaces as frame/slot/port with frame 0 on these shelves.
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

pub struct HuaweiDriver {
    equipment_id: String,
    session: Box<dyn LineSession>,
}

impl HuaweiDriver {
    pub fn new(equipment_id: impl Into<String>, session: Box<dyn LineSession>) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            session,
        }
    }

    /// Device-reported failures come back inline, not as transport errors.
    fn check_output(command: &str, output: &str) -> Result<()> {
        let lowered = output.to_ascii_lowercase();
        if lowered.contains("failure:")
            || lowered.contains("% unknown command")
            || lowered.contains("parameter error")
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

    /// Issue an interface-scoped write: enter the GPON interface, run the
    /// lines, leave. Any line failing aborts the sequence.
    async fn run_in_interface(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        lines: &[String],
    ) -> Result<()> {
        self.run(cancel, &format!("interface gpon 0/{slot}")).await?;
        for line in lines {
            if let Err(e) = self.run(cancel, line).await {
                let _ = self.session.execute(cancel, "quit").await;
                return Err(e);
            }
        }
        self.run(cancel, "quit").await?;
        Ok(())
    }

    fn port_coords(&self, pon_port: &str) -> Result<(u32, u32)> {
        parser::parse_pon_port(pon_port)
    }
}

#[async_trait]
impl OltDriver for HuaweiDriver {
    fn vendor(&self) -> Vendor {
        Vendor::Huawei
    }

    async fn connect(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.session.connect(cancel).await?;
        // Disable paging so long tables arrive in one read.
        let _ = self.session.execute(cancel, "scroll 512").await;
        debug!(equipment = %self.equipment_id, "huawei driver connected");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.session.close().await
    }

    async fn execute(&mut self, cancel: &CancellationToken, command: &str) -> Result<String> {
        self.run(cancel, command).await
    }

    async fn list_pon_ports(&mut self, cancel: &CancellationToken) -> Result<Vec<PonPortInfo>> {
        let output = self.run(cancel, "display port state all").await?;
        Ok(parser::port::parse_port_list(&output, Vendor::Huawei))
    }

    async fn get_pon_port(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
    ) -> Result<PonPortInfo> {
        let command = format!("display port state 0/{slot}/{port}");
        let output = self.run(cancel, &command).await?;
        parser::port::parse_port_info(&output, Vendor::Huawei, slot, port).ok_or_else(|| {
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
        let (slot, port) = self.port_coords(pon_port)?;
        let output = self
            .run(cancel, &format!("display ont info summary 0/{slot}/{port}"))
            .await?;
        Ok(parser::onu::parse_onu_list(
            &output,
            Vendor::Huawei,
            &parser::format_pon_port(slot, port),
        ))
    }

    async fn get_onu_info(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<Option<OnuRecord>> {
        let (slot, port) = self.port_coords(pon_port)?;
        let command = format!("display ont info 0 {slot} {port} {onu_id}");
        match self.run(cancel, &command).await {
            Ok(output) => Ok(parser::onu::parse_onu_info(
                &output,
                Vendor::Huawei,
                &parser::format_pon_port(slot, port),
                onu_id,
            )),
            Err(AgentError::Execute { output, .. })
                if output.to_ascii_lowercase().contains("does not exist") =>
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
        let (slot, port) = self.port_coords(pon_port)?;
        let command = format!("display ont optical-info 0/{slot}/{port} {onu_id}");
        let output = self.run(cancel, &command).await?;
        parser::onu::parse_onu_info(
            &output,
            Vendor::Huawei,
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
        let (slot, port) = self.port_coords(&request.pon_port)?;
        let mut add = format!(
            "ont add {port} {} sn-auth {} omci ont-lineprofile-name {} ont-srvprofile-name {}",
            request.onu_id, request.serial, request.line_profile, request.service_profile
        );
        if let Some(desc) = &request.description {
            add.push_str(&format!(" desc {desc}"));
        }
        let mut lines = vec![add];
        if let Some(vlan) = request.vlan {
            lines.push(format!(
                "ont port native-vlan {port} {} eth 1 vlan {vlan}",
                request.onu_id
            ));
        }
        self.run_in_interface(cancel, slot, &lines).await
    }

    async fn delete_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(cancel, slot, &[format!("ont delete {port} {onu_id}")])
            .await
    }

    async fn reboot_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(cancel, slot, &[format!("ont reboot {port} {onu_id}")])
            .await
    }

    async fn suspend_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(cancel, slot, &[format!("ont deactivate {port} {onu_id}")])
            .await
    }

    async fn resume_onu(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(cancel, slot, &[format!("ont activate {port} {onu_id}")])
            .await
    }

    async fn set_onu_vlan(
        &mut self,
        cancel: &CancellationToken,
        pon_port: &str,
        onu_id: u32,
        vlan: u16,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(
            cancel,
            slot,
            &[format!("ont port native-vlan {port} {onu_id} eth 1 vlan {vlan}")],
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
        let (slot, port) = self.port_coords(pon_port)?;
        self.run_in_interface(
            cancel,
            slot,
            &[format!("ont traffic-profile {port} {onu_id} profile-name {profile}")],
        )
        .await
    }

    async fn list_vlans(&mut self, cancel: &CancellationToken) -> Result<Vec<VlanRecord>> {
        let output = self.run(cancel, "display vlan all").await?;
        Ok(parser::service_port::parse_vlan_list(&output))
    }

    async fn create_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        name: Option<&str>,
    ) -> Result<()> {
        self.run(cancel, &format!("vlan {vlan_id} smart")).await?;
        if let Some(name) = name {
            self.run(cancel, &format!("vlan desc {vlan_id} description {name}"))
                .await?;
        }
        Ok(())
    }

    async fn delete_vlan(
        &mut self,
        cancel: &CancellationToken,
        vlan_id: u16,
        _force: bool,
    ) -> Result<()> {
        self.run(cancel, &format!("undo vlan {vlan_id}")).await?;
        Ok(())
    }

    async fn add_service_port(
        &mut self,
        cancel: &CancellationToken,
        request: &ServicePortRequest,
    ) -> Result<()> {
        let (slot, port) = self.port_coords(&request.pon_port)?;
        let user_vlan = request.user_vlan.unwrap_or(request.vlan_id);
        self.run(
            cancel,
            &format!(
                "service-port vlan {} gpon 0/{slot}/{port} ont {} gemport {} multi-service user-vlan {user_vlan}",
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
        let output = self.run(cancel, "display service-port all").await?;
        Ok(parser::service_port::parse_service_ports(&output))
    }

    async fn set_pon_port_enabled(
        &mut self,
        cancel: &CancellationToken,
        slot: u32,
        port: u32,
        enabled: bool,
    ) -> Result<()> {
        let line = if enabled {
            format!("undo shutdown {port}")
        } else {
            format!("shutdown {port}")
        };
        self.run_in_interface(cancel, slot, &[line]).await
    }

    async fn get_olt_status(&mut self, cancel: &CancellationToken) -> Result<OltStatus> {
        let command = "display device status";
        let output = self.run(cancel, command).await?;
        let status = parser::status::parse_olt_status(&output);
        if status.cpu_percent.is_none() && status.uptime.is_none() && status.version.is_none() {
            return Err(AgentError::Execute {
                command: command.to_string(),
                output: "device status output matched no known dialect".into(),
            });
        }
        Ok(status)
    }

    async fn get_alarms(&mut self, cancel: &CancellationToken) -> Result<Vec<OltAlarm>> {
        let output = self.run(cancel, "display alarm active all").await?;
        Ok(parser::alarm::parse_alarms(&output))
    }
}
