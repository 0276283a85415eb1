// VLAN and service-port handlers, four-phase like the ONU mutations
use super::{require_str, require_u16, require_u32, HandlerContext};
use crate::driver::ServicePortRequest;
use crate::parser::parse_pon_port;
use crate::verify::{FAST_VERIFY_DELAY, FAST_VERIFY_RETRIES};
use ponpulse_common::{AgentError, CommandResult, PendingCommand, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;

async fn pause(cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(FAST_VERIFY_DELAY) => Ok(()),
    }
}

pub async fn vlan_create(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let vlan_id = require_u16(cmd, "vlanId")?;
    let name = cmd.param_str("name").map(str::to_string);
    let cancel = ctx.cancel;
    let driver = ctx.cli()?;

    let pre_present = driver
        .list_vlans(cancel)
        .await
        .map(|vlans| vlans.iter().any(|v| v.vlan_id == vlan_id))
        .unwrap_or(false);

    driver.create_vlan(cancel, vlan_id, name.as_deref()).await?;

    // VLAN creation is near-instant but the table read can lag a tick.
    let mut verified = false;
    for attempt in 0..=FAST_VERIFY_RETRIES {
        if driver
            .list_vlans(cancel)
            .await
            .map(|vlans| vlans.iter().any(|v| v.vlan_id == vlan_id))
            .unwrap_or(false)
        {
            verified = true;
            break;
        }
        if attempt < FAST_VERIFY_RETRIES {
            pause(cancel).await?;
        }
    }

    let payload = json!({
        "vlanId": vlan_id,
        "verified": verified,
        "preState": { "present": pre_present },
        "postState": { "present": verified },
    });
    if !verified {
        return Ok(CommandResult::fail_with(
            format!("VLAN {vlan_id} not visible after create"),
            payload,
        ));
    }
    Ok(CommandResult::ok(payload))
}

pub async fn vlan_delete(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let vlan_id = require_u16(cmd, "vlanId")?;
    let force = cmd.param_bool("force");
    let cancel = ctx.cancel;
    let driver = ctx.cli()?;

    let pre_present = driver
        .list_vlans(cancel)
        .await
        .map(|vlans| vlans.iter().any(|v| v.vlan_id == vlan_id))
        .unwrap_or(false);
    if !pre_present && !force {
        return Ok(CommandResult::fail(format!("VLAN {vlan_id} not found")));
    }

    driver.delete_vlan(cancel, vlan_id, force).await?;

    // Verified deleted once the id is absent from the list.
    let mut verified = false;
    for attempt in 0..=FAST_VERIFY_RETRIES {
        match driver.list_vlans(cancel).await {
            Ok(vlans) if !vlans.iter().any(|v| v.vlan_id == vlan_id) => {
                verified = true;
                break;
            }
            Ok(_) => {}
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(_) => {}
        }
        if attempt < FAST_VERIFY_RETRIES {
            pause(cancel).await?;
        }
    }

    let payload = json!({
        "vlanId": vlan_id,
        "verified": verified,
        "preState": { "present": pre_present },
        "postState": { "present": !verified },
    });
    if !verified {
        return Ok(CommandResult::fail_with(
            format!("VLAN {vlan_id} still present after delete"),
            payload,
        ));
    }
    Ok(CommandResult::ok(payload))
}

pub async fn service_port_add(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let vlan_id = require_u16(cmd, "vlanId")?;
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;
    let gem_port = cmd.param_u64("gemPort").map(|v| v as u32).unwrap_or(1);
    let user_vlan = cmd.param_u64("userVlan").and_then(|v| u16::try_from(v).ok());
    let coords = parse_pon_port(&pon_port)?;

    let request = ServicePortRequest {
        vlan_id,
        pon_port: pon_port.clone(),
        onu_id,
        gem_port,
        user_vlan,
    };
    let cancel = ctx.cancel;
    let driver = ctx.cli()?;
    driver.add_service_port(cancel, &request).await?;

    let mut verified = false;
    for attempt in 0..=FAST_VERIFY_RETRIES {
        match driver.list_service_ports(cancel).await {
            Ok(records) => {
                if records.iter().any(|r| {
                    r.vlan_id == vlan_id
                        && r.onu_id == onu_id
                        && parse_pon_port(&r.pon_port).map(|c| c == coords).unwrap_or(false)
                }) {
                    verified = true;
                    break;
                }
            }
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(_) => {}
        }
        if attempt < FAST_VERIFY_RETRIES {
            pause(cancel).await?;
        }
    }

    let payload = json!({
        "vlanId": vlan_id,
        "ponPort": pon_port,
        "onuId": onu_id,
        "gemPort": gem_port,
        "verified": verified,
    });
    if !verified {
        return Ok(CommandResult::fail_with(
            format!("service port vlan {vlan_id} on {pon_port}:{onu_id} not visible after add"),
            payload,
        ));
    }
    Ok(CommandResult::ok(payload))
}
