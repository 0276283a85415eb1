// Mutating ONU handlers: capture pre-state, execute, verify, push update
use super::{
    capture_pre_state, pre_state_json, push_immediate_update, require_str, require_u32,
    HandlerContext,
};
use crate::driver::OnuProvisionRequest;
use crate::verify::{
    self, VerifyOutcome, DATAGRAM_VERIFY_DELAY, DATAGRAM_VERIFY_RETRIES, FAST_VERIFY_DELAY,
    FAST_VERIFY_RETRIES, REBOOT_SETTLE, REBOOT_VERIFY_DELAY, REBOOT_VERIFY_RETRIES,
};
use ponpulse_common::{AgentError, CommandResult, OnuRecord, PendingCommand, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Acceptable terminal states per mutation kind.
const SUSPEND_STATES: &[&str] = &["offline", "deactivated", "down", "suspended", "disabled"];
const RESUME_STATES: &[&str] = &["online", "active", "up", "enabled"];
const REBOOT_STATES: &[&str] = &["online", "active"];
const UPDATE_STATES: &[&str] = &["online", "active"];

/// Verify through the strongest available helper: datagram when the
/// dispatcher established it, CLI polling otherwise.
async fn verify_post_state(
    ctx: &mut HandlerContext<'_>,
    pon_port: &str,
    onu_id: u32,
    acceptable: &[&str],
    cli_retries: u32,
    cli_delay: Duration,
) -> Result<VerifyOutcome> {
    if let Some(datagram) = ctx.datagram {
        return verify::verify_onu_state_datagram(
            datagram,
            ctx.cancel,
            pon_port,
            onu_id,
            acceptable,
            DATAGRAM_VERIFY_RETRIES,
            DATAGRAM_VERIFY_DELAY,
        )
        .await;
    }
    let cancel = ctx.cancel;
    verify::verify_onu_state(
        ctx.cli()?,
        cancel,
        pon_port,
        onu_id,
        acceptable,
        cli_retries,
        cli_delay,
    )
    .await
}

fn post_state_json(outcome: &VerifyOutcome) -> Value {
    match &outcome.record {
        Some(r) => json!({
            "serial": r.serial,
            "status": r.status,
            "verified": outcome.verified,
        }),
        None => json!({ "verified": outcome.verified }),
    }
}

/// Fold the four phases into the command result. An unverified write is a
/// failure carrying the audit payload; a verified one pushes the immediate
/// update and reports whether the push landed.
async fn finish_mutation(
    ctx: &mut HandlerContext<'_>,
    pon_port: &str,
    onu_id: u32,
    pre: Option<OnuRecord>,
    outcome: VerifyOutcome,
    update_status: &str,
    message: Option<String>,
) -> Result<CommandResult> {
    let mut payload = json!({
        "verified": outcome.verified,
        "preState": pre_state_json(&pre),
        "postState": post_state_json(&outcome),
        "immediateUpdate": false,
    });
    if let Some(message) = &message {
        payload["message"] = json!(message);
    }

    if !outcome.verified {
        let observed = outcome
            .record
            .as_ref()
            .and_then(|r| r.status.clone())
            .unwrap_or_else(|| "unknown".into());
        let error = AgentError::Verification {
            target: format!("ONU {pon_port}:{onu_id}"),
            expected: update_status.to_string(),
            observed,
        };
        return Ok(CommandResult::fail_with(error.to_string(), payload));
    }

    let record = outcome.record.as_ref().or(pre.as_ref());
    let pushed = push_immediate_update(ctx, pon_port, onu_id, update_status, record).await;
    payload["immediateUpdate"] = json!(pushed);
    Ok(CommandResult::ok(payload))
}

pub async fn onu_suspend(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    ctx.cli()?.suspend_onu(cancel, &pon_port, onu_id).await?;
    let outcome = verify_post_state(
        ctx,
        &pon_port,
        onu_id,
        SUSPEND_STATES,
        FAST_VERIFY_RETRIES,
        FAST_VERIFY_DELAY,
    )
    .await?;
    finish_mutation(ctx, &pon_port, onu_id, pre, outcome, "suspended", None).await
}

pub async fn onu_resume(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    ctx.cli()?.resume_onu(cancel, &pon_port, onu_id).await?;
    let outcome = verify_post_state(
        ctx,
        &pon_port,
        onu_id,
        RESUME_STATES,
        FAST_VERIFY_RETRIES,
        FAST_VERIFY_DELAY,
    )
    .await?;
    finish_mutation(ctx, &pon_port, onu_id, pre, outcome, "online", None).await
}

pub async fn onu_reboot(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    ctx.cli()?.reboot_onu(cancel, &pon_port, onu_id).await?;

    // Let the ONU actually drop before polling for it to come back.
    settle(cancel, REBOOT_SETTLE).await?;
    let outcome = verify_post_state(
        ctx,
        &pon_port,
        onu_id,
        REBOOT_STATES,
        REBOOT_VERIFY_RETRIES,
        REBOOT_VERIFY_DELAY,
    )
    .await?;
    let message = format!("ONU {pon_port}:{onu_id} reboot initiated");
    finish_mutation(ctx, &pon_port, onu_id, pre, outcome, "online", Some(message)).await
}

pub async fn onu_provision(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;
    let serial = require_str(cmd, "serial")?.to_string();
    let request = OnuProvisionRequest {
        pon_port: pon_port.clone(),
        onu_id,
        serial: serial.clone(),
        line_profile: require_str(cmd, "lineProfile")?.to_string(),
        service_profile: require_str(cmd, "serviceProfile")?.to_string(),
        vlan: cmd.param_u64("vlan").and_then(|v| u16::try_from(v).ok()),
        description: cmd.param_str("description").map(str::to_string),
    };

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    ctx.cli()?.add_onu(cancel, &request).await?;

    let outcome = if let Some(datagram) = ctx.datagram {
        verify_serial_datagram(datagram, cancel, &serial).await?
    } else {
        verify::verify_onu_serial(
            ctx.cli()?,
            cancel,
            &pon_port,
            onu_id,
            &serial,
            FAST_VERIFY_RETRIES,
            FAST_VERIFY_DELAY,
        )
        .await?
    };

    let status = outcome
        .record
        .as_ref()
        .and_then(|r| r.status.clone())
        .unwrap_or_else(|| "discovered".into());
    finish_mutation(ctx, &pon_port, onu_id, pre, outcome, &status, None).await
}

pub async fn onu_delete(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    ctx.cli()?.delete_onu(cancel, &pon_port, onu_id).await?;

    let outcome = if let Some(datagram) = ctx.datagram {
        verify_deleted_datagram(datagram, cancel, &pon_port, onu_id).await?
    } else {
        verify::verify_onu_deleted(
            ctx.cli()?,
            cancel,
            &pon_port,
            onu_id,
            FAST_VERIFY_RETRIES,
            FAST_VERIFY_DELAY,
        )
        .await?
    };

    // Deletion leaves nothing to read back; the update carries the serial
    // we knew beforehand so the control plane can retire the record.
    let mut payload = json!({
        "verified": outcome.verified,
        "preState": pre_state_json(&pre),
        "postState": json!({ "present": outcome.record.is_some(), "verified": outcome.verified }),
        "immediateUpdate": false,
    });
    if !outcome.verified {
        let error = AgentError::Verification {
            target: format!("ONU {pon_port}:{onu_id}"),
            expected: "record absent".into(),
            observed: "record still present".into(),
        };
        return Ok(CommandResult::fail_with(error.to_string(), payload));
    }
    let pushed = push_immediate_update(ctx, &pon_port, onu_id, "deleted", pre.as_ref()).await;
    payload["immediateUpdate"] = json!(pushed);
    Ok(CommandResult::ok(payload))
}

pub async fn onu_update(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let pon_port = require_str(cmd, "ponPort")?.to_string();
    let onu_id = require_u32(cmd, "onuId")?;
    let vlan = cmd.param_u64("vlan").and_then(|v| u16::try_from(v).ok());
    let traffic_profile = cmd.param_str("trafficProfile").map(str::to_string);
    let description = cmd.param_str("description").map(str::to_string);

    if vlan.is_none() && traffic_profile.is_none() && description.is_none() {
        return Err(AgentError::InvalidCommand(
            "onu_update requires at least one of vlan, trafficProfile, description".into(),
        ));
    }

    let pre = capture_pre_state(ctx, &pon_port, onu_id).await;
    let cancel = ctx.cancel;
    let mut applied = Vec::new();
    {
        let driver = ctx.cli()?;
        if let Some(vlan) = vlan {
            driver.set_onu_vlan(cancel, &pon_port, onu_id, vlan).await?;
            applied.push("vlan");
        }
        if let Some(profile) = &traffic_profile {
            driver
                .assign_traffic_profile(cancel, &pon_port, onu_id, profile)
                .await?;
            applied.push("trafficProfile");
        }
        if description.is_some() {
            // Descriptions ride along with provisioning on both vendors;
            // there is no standalone rewrite, so record it as unapplied.
            applied.push("description(skipped)");
        }
    }

    let outcome = verify_post_state(
        ctx,
        &pon_port,
        onu_id,
        UPDATE_STATES,
        FAST_VERIFY_RETRIES,
        FAST_VERIFY_DELAY,
    )
    .await?;
    let mut result = finish_mutation(ctx, &pon_port, onu_id, pre, outcome, "online", None).await?;
    if let Some(payload) = result.result.as_mut() {
        payload["applied"] = json!(applied);
    }
    Ok(result)
}

async fn settle(cancel: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Datagram variant of the provision check: the serial is the business
/// key, so poll the authoritative table for it directly.
async fn verify_serial_datagram(
    datagram: &dyn crate::driver::DatagramOlt,
    cancel: &CancellationToken,
    serial: &str,
) -> Result<VerifyOutcome> {
    let total = 1 + DATAGRAM_VERIFY_RETRIES;
    for attempt in 1..=total {
        match datagram.get_onu_by_serial(cancel, serial).await {
            Ok(Some(record)) => {
                return Ok(VerifyOutcome {
                    verified: true,
                    record: Some(record),
                    attempts: attempt,
                })
            }
            Ok(None) => {}
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(_) => {}
        }
        if attempt < total {
            settle(cancel, DATAGRAM_VERIFY_DELAY).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: None,
        attempts: total,
    })
}

async fn verify_deleted_datagram(
    datagram: &dyn crate::driver::DatagramOlt,
    cancel: &CancellationToken,
    pon_port: &str,
    onu_id: u32,
) -> Result<VerifyOutcome> {
    let total = 1 + DATAGRAM_VERIFY_RETRIES;
    let mut last_record = None;
    for attempt in 1..=total {
        match datagram.list_onus(cancel, Some(pon_port)).await {
            Ok(records) => match records.into_iter().find(|r| r.onu_id == onu_id) {
                Some(record) => last_record = Some(record),
                None => {
                    return Ok(VerifyOutcome {
                        verified: true,
                        record: None,
                        attempts: attempt,
                    })
                }
            },
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(_) => {
                return Ok(VerifyOutcome {
                    verified: true,
                    record: None,
                    attempts: attempt,
                })
            }
        }
        if attempt < total {
            settle(cancel, DATAGRAM_VERIFY_DELAY).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: last_record,
        attempts: total,
    })
}
