// Read handlers: answer from the datagram poll surface when present,
// otherwise scrape and parse the CLI
use super::{require_str, require_u16, require_u32, HandlerContext};
use ponpulse_common::{AgentError, CommandResult, OnuRecord, PendingCommand, Result};
use serde_json::json;
use tracing::debug;

fn strip_optical(mut record: OnuRecord) -> OnuRecord {
    record.rx_power_dbm = None;
    record.tx_power_dbm = None;
    record.temperature_c = None;
    record.voltage_v = None;
    record
}

/// `onu_list`: optional `ponPort` substring filter, `detailed` flag for
/// optical readings.
pub async fn onu_list(ctx: &mut HandlerContext<'_>, cmd: &PendingCommand) -> Result<CommandResult> {
    let filter = cmd.param_str("ponPort").map(str::to_string);
    let detailed = cmd.param_bool("detailed");

    let onus = if let Some(datagram) = ctx.datagram {
        let records = datagram.list_onus(ctx.cancel, filter.as_deref()).await?;
        if detailed {
            records
        } else {
            records.into_iter().map(strip_optical).collect()
        }
    } else {
        let cancel = ctx.cancel;
        let driver = ctx.cli()?;
        let ports = driver.list_pon_ports(cancel).await?;
        let mut records = Vec::new();
        for port in &ports {
            let port_name = crate::parser::format_pon_port(port.slot, port.port);
            if let Some(filter) = &filter {
                if !port_name.contains(filter.as_str()) {
                    continue;
                }
            }
            records.extend(driver.list_onus(cancel, &port_name).await?);
        }
        if detailed {
            let mut detailed_records = Vec::with_capacity(records.len());
            for record in records {
                match driver
                    .get_onu_diagnostics(cancel, &record.pon_port, record.onu_id)
                    .await
                {
                    Ok(diag) => detailed_records.push(OnuRecord {
                        rx_power_dbm: diag.rx_power_dbm,
                        tx_power_dbm: diag.tx_power_dbm,
                        temperature_c: diag.temperature_c,
                        voltage_v: diag.voltage_v,
                        ..record
                    }),
                    Err(e) => {
                        debug!(
                            pon_port = %record.pon_port,
                            onu_id = record.onu_id,
                            "diagnostics unavailable: {e}"
                        );
                        detailed_records.push(record);
                    }
                }
            }
            detailed_records
        } else {
            records
        }
    };

    Ok(CommandResult::ok(json!({
        "onus": onus,
        "count": onus.len(),
    })))
}

pub async fn onu_get(ctx: &mut HandlerContext<'_>, cmd: &PendingCommand) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?;
    let onu_id = require_u32(cmd, "onuId")?;

    let record = if let Some(datagram) = ctx.datagram {
        datagram
            .list_onus(ctx.cancel, Some(pon_port))
            .await?
            .into_iter()
            .find(|r| r.onu_id == onu_id)
    } else {
        let cancel = ctx.cancel;
        ctx.cli()?.get_onu_info(cancel, pon_port, onu_id).await?
    };

    match record {
        Some(onu) => Ok(CommandResult::ok(json!({ "onu": onu }))),
        None => Ok(CommandResult::fail(format!(
            "ONU {pon_port}:{onu_id} not found"
        ))),
    }
}

pub async fn onu_diagnostics(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?;
    let onu_id = require_u32(cmd, "onuId")?;
    let cancel = ctx.cancel;
    let diagnostics = ctx
        .cli()?
        .get_onu_diagnostics(cancel, pon_port, onu_id)
        .await?;
    Ok(CommandResult::ok(json!({ "diagnostics": diagnostics })))
}

/// `onu_discover`: unprovisioned ONUs seen by the OLT. Datagram-only; the
/// interactive surface does not expose an autofind table on both vendors.
pub async fn onu_discover(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let datagram = ctx.datagram.ok_or_else(|| {
        AgentError::Unsupported(format!(
            "onu_discover needs the datagram surface, unavailable on {} ({})",
            ctx.equipment.id, ctx.equipment.vendor
        ))
    })?;
    let filter = cmd.param_str("ponPort");
    let mut onus = datagram.discover_unprovisioned(ctx.cancel).await?;
    if let Some(filter) = filter {
        onus.retain(|r| r.pon_port.contains(filter));
    }
    Ok(CommandResult::ok(json!({
        "onus": onus,
        "count": onus.len(),
    })))
}

pub async fn port_list(ctx: &mut HandlerContext<'_>) -> Result<CommandResult> {
    let ports = if let Some(datagram) = ctx.datagram {
        datagram.list_ports(ctx.cancel).await?
    } else {
        let cancel = ctx.cancel;
        ctx.cli()?.list_pon_ports(cancel).await?
    };
    Ok(CommandResult::ok(json!({
        "ports": ports,
        "count": ports.len(),
    })))
}

pub async fn olt_status(ctx: &mut HandlerContext<'_>) -> Result<CommandResult> {
    let status = if let Some(datagram) = ctx.datagram {
        datagram.olt_status(ctx.cancel).await?
    } else {
        let cancel = ctx.cancel;
        ctx.cli()?.get_olt_status(cancel).await?
    };
    Ok(CommandResult::ok(json!({ "status": status })))
}

pub async fn vlan_list(ctx: &mut HandlerContext<'_>) -> Result<CommandResult> {
    let cancel = ctx.cancel;
    let vlans = ctx.cli()?.list_vlans(cancel).await?;
    Ok(CommandResult::ok(json!({
        "vlans": vlans,
        "count": vlans.len(),
    })))
}

pub async fn vlan_get(ctx: &mut HandlerContext<'_>, cmd: &PendingCommand) -> Result<CommandResult> {
    let vlan_id = require_u16(cmd, "vlanId")?;
    let cancel = ctx.cancel;
    let vlans = ctx.cli()?.list_vlans(cancel).await?;
    match vlans.into_iter().find(|v| v.vlan_id == vlan_id) {
        Some(vlan) => Ok(CommandResult::ok(json!({ "vlan": vlan }))),
        None => Ok(CommandResult::fail(format!("VLAN {vlan_id} not found"))),
    }
}
