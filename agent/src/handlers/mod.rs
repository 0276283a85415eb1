//! Command handlers.
//!
//! One handler per command kind. Read handlers answer from the datagram
//! surface when the dispatcher could establish it, otherwise they scrape
//! the CLI. Mutating handlers follow a fixed four-phase protocol:
//! capture pre-state (best effort), execute the vendor write, verify the
//! post-state on the device, push an immediate ONU update (best effort).
//! A write that cannot be verified is reported as a command failure.

pub mod bulk;
pub mod mutate;
pub mod port;
pub mod read;
pub mod vlan;

use crate::client::ControlPlane;
use crate::driver::{DatagramOlt, OltDriver};
use ponpulse_common::{
    AgentError, CommandKind, CommandResult, EquipmentConfig, OnuRecord, OnuStatusUpdate,
    PendingCommand, Result,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct HandlerContext<'a> {
    pub cancel: &'a CancellationToken,
    pub equipment: &'a EquipmentConfig,
    pub driver: Option<&'a mut dyn OltDriver>,
    pub datagram: Option<&'a dyn DatagramOlt>,
    pub control: &'a dyn ControlPlane,
}

impl<'a> HandlerContext<'a> {
    /// The interactive driver, or a transport error when the dispatcher
    /// did not (or could not) establish one for this command.
    pub fn cli(&mut self) -> Result<&mut dyn OltDriver> {
        match self.driver.as_deref_mut() {
            Some(driver) => Ok(driver),
            None => Err(AgentError::Transport {
                equipment: self.equipment.id.clone(),
                detail: "no interactive transport for this command".into(),
            }),
        }
    }
}

/// Route one command to its handler and fold the outcome into a result.
/// Hard errors become failed results; handlers that produced partial
/// payloads (bulk, failed verification) return them directly.
pub async fn handle_command(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> CommandResult {
    let outcome = match &cmd.kind {
        CommandKind::OnuList => read::onu_list(ctx, cmd).await,
        CommandKind::OnuGet => read::onu_get(ctx, cmd).await,
        CommandKind::OnuDiagnostics => read::onu_diagnostics(ctx, cmd).await,
        CommandKind::OnuDiscover => read::onu_discover(ctx, cmd).await,
        CommandKind::PortList => read::port_list(ctx).await,
        CommandKind::OltStatus => read::olt_status(ctx).await,
        CommandKind::VlanList => read::vlan_list(ctx).await,
        CommandKind::VlanGet => read::vlan_get(ctx, cmd).await,
        CommandKind::OnuSuspend => mutate::onu_suspend(ctx, cmd).await,
        CommandKind::OnuResume => mutate::onu_resume(ctx, cmd).await,
        CommandKind::OnuReboot => mutate::onu_reboot(ctx, cmd).await,
        CommandKind::OnuProvision => mutate::onu_provision(ctx, cmd).await,
        CommandKind::OnuDelete => mutate::onu_delete(ctx, cmd).await,
        CommandKind::OnuUpdate => mutate::onu_update(ctx, cmd).await,
        CommandKind::OnuBulkProvision => bulk::onu_bulk_provision(ctx, cmd).await,
        CommandKind::VlanCreate => vlan::vlan_create(ctx, cmd).await,
        CommandKind::VlanDelete => vlan::vlan_delete(ctx, cmd).await,
        CommandKind::ServicePortAdd => vlan::service_port_add(ctx, cmd).await,
        CommandKind::PortEnable => port::set_port_state(ctx, cmd, true).await,
        CommandKind::PortDisable => port::set_port_state(ctx, cmd, false).await,
        CommandKind::PortPower => port::port_power(ctx, cmd).await,
        CommandKind::Unsupported(kind) => {
            Err(AgentError::Unsupported(format!("command kind '{kind}'")))
        }
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            debug!(command = %cmd.kind, "handler failed: {e}");
            CommandResult::fail(e.to_string())
        }
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub(crate) fn require_str<'c>(cmd: &'c PendingCommand, key: &str) -> Result<&'c str> {
    cmd.param_str(key).ok_or_else(|| {
        AgentError::InvalidCommand(format!("{} requires payload key '{key}'", cmd.kind))
    })
}

pub(crate) fn require_u32(cmd: &PendingCommand, key: &str) -> Result<u32> {
    cmd.param_u64(key)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            AgentError::InvalidCommand(format!(
                "{} requires numeric payload key '{key}'",
                cmd.kind
            ))
        })
}

pub(crate) fn require_u16(cmd: &PendingCommand, key: &str) -> Result<u16> {
    cmd.param_u64(key)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| {
            AgentError::InvalidCommand(format!(
                "{} requires numeric payload key '{key}'",
                cmd.kind
            ))
        })
}

/// Best-effort read of the ONU's current record, datagram first. Never
/// fails the command; pre-state is advisory.
pub(crate) async fn capture_pre_state(
    ctx: &mut HandlerContext<'_>,
    pon_port: &str,
    onu_id: u32,
) -> Option<OnuRecord> {
    if let Some(datagram) = ctx.datagram {
        match datagram.list_onus(ctx.cancel, Some(pon_port)).await {
            Ok(records) => {
                if let Some(record) = records.into_iter().find(|r| r.onu_id == onu_id) {
                    return Some(record);
                }
            }
            Err(e) => debug!(pon_port, onu_id, "datagram pre-state read failed: {e}"),
        }
    }
    let cancel = ctx.cancel;
    if let Some(driver) = ctx.driver.as_deref_mut() {
        match driver.get_onu_info(cancel, pon_port, onu_id).await {
            Ok(record) => return record,
            Err(e) => debug!(pon_port, onu_id, "cli pre-state read failed: {e}"),
        }
    }
    None
}

/// The `preState` audit shape: whatever was known before the write.
pub(crate) fn pre_state_json(record: &Option<OnuRecord>) -> Value {
    match record {
        Some(r) => json!({
            "serial": r.serial,
            "status": r.status,
            "adminState": r.admin_state,
        }),
        None => Value::Null,
    }
}

/// Push the immediate ONU update after a verified mutation. A push failure
/// is logged and reflected in `immediateUpdate: false`, never in the
/// command verdict.
pub(crate) async fn push_immediate_update(
    ctx: &mut HandlerContext<'_>,
    pon_port: &str,
    onu_id: u32,
    status: &str,
    record: Option<&OnuRecord>,
) -> bool {
    let serial = record
        .and_then(|r| r.serial.clone())
        .unwrap_or_default();
    if serial.is_empty() {
        debug!(pon_port, onu_id, "skipping immediate update, serial unknown");
        return false;
    }
    let update = OnuStatusUpdate {
        serial,
        pon_port: pon_port.to_string(),
        onu_id,
        status: status.to_string(),
        rx_power: record.and_then(|r| r.rx_power_dbm),
        distance: record.and_then(|r| r.distance_m),
        model: record.and_then(|r| r.model.clone()),
    };
    match ctx
        .control
        .push_onu_update(ctx.cancel, &ctx.equipment.id, &update)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(pon_port, onu_id, "immediate ONU update push failed: {e}");
            false
        }
    }
}
