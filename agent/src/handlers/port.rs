// PON port handlers: enable/disable with verification, optical power read
use super::{require_str, HandlerContext};
use crate::parser::parse_pon_port;
use crate::verify::{FAST_VERIFY_DELAY, FAST_VERIFY_RETRIES};
use ponpulse_common::{AgentError, CommandResult, PendingCommand, Result};
use serde_json::json;

const PORT_UP_STATES: &[&str] = &["online", "up", "enable", "enabled"];
const PORT_DOWN_STATES: &[&str] = &["offline", "down", "disable", "disabled", "shutdown"];

fn status_matches(status: Option<&str>, acceptable: &[&str]) -> bool {
    match status {
        Some(s) => acceptable.iter().any(|a| a.eq_ignore_ascii_case(s)),
        None => false,
    }
}

pub async fn set_port_state(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
    enabled: bool,
) -> Result<CommandResult> {
    let raw_port = require_str(cmd, "port")?.to_string();
    let (slot, port) = parse_pon_port(&raw_port)?;
    let acceptable = if enabled { PORT_UP_STATES } else { PORT_DOWN_STATES };

    let cancel = ctx.cancel;
    let driver = ctx.cli()?;
    let pre_status = driver
        .get_pon_port(cancel, slot, port)
        .await
        .ok()
        .and_then(|p| p.status);

    driver.set_pon_port_enabled(cancel, slot, port, enabled).await?;

    let mut verified = false;
    let mut post_status = None;
    for attempt in 0..=FAST_VERIFY_RETRIES {
        match driver.get_pon_port(cancel, slot, port).await {
            Ok(info) => {
                let matched = status_matches(info.status.as_deref(), acceptable);
                post_status = info.status;
                if matched {
                    verified = true;
                    break;
                }
            }
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(_) => {}
        }
        if attempt < FAST_VERIFY_RETRIES {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                _ = tokio::time::sleep(FAST_VERIFY_DELAY) => {}
            }
        }
    }

    let payload = json!({
        "port": raw_port,
        "enabled": enabled,
        "verified": verified,
        "preState": { "status": pre_status },
        "postState": { "status": post_status },
    });
    if !verified {
        let error = AgentError::Verification {
            target: format!("PON port {raw_port}"),
            expected: acceptable.join(", "),
            observed: payload["postState"]["status"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
        };
        return Ok(CommandResult::fail_with(error.to_string(), payload));
    }
    Ok(CommandResult::ok(payload))
}

/// `port_power`: read the port's optical numbers and occupancy.
pub async fn port_power(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let raw_port = require_str(cmd, "port")?.to_string();
    let (slot, port) = parse_pon_port(&raw_port)?;
    let cancel = ctx.cancel;
    let info = ctx.cli()?.get_pon_port(cancel, slot, port).await?;
    Ok(CommandResult::ok(json!({ "port": info })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_status_vocabulary() {
        assert!(status_matches(Some("Online"), PORT_UP_STATES));
        assert!(status_matches(Some("shutdown"), PORT_DOWN_STATES));
        assert!(!status_matches(Some("online"), PORT_DOWN_STATES));
        assert!(!status_matches(None, PORT_UP_STATES));
    }
}
