//! Post-write verification loops.
//!
//! OLT hardware is slow: a deactivated ONU can take seconds to drop off the
//! state table. Every mutating handler polls the device until the expected
//! post-state shows up or the retry budget runs out. An unverified write is
//! reported as a failure so operators see physical drift.

use crate::driver::{DatagramOlt, OltDriver};
use ponpulse_common::{AgentError, OnuRecord, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Budgets for fast transitions: enable/disable/provision/delete/update.
pub const FAST_VERIFY_RETRIES: u32 = 3;
pub const FAST_VERIFY_DELAY: Duration = Duration::from_millis(500);

/// Reboots take longer; poll slower, and let the ONU settle first.
pub const REBOOT_VERIFY_RETRIES: u32 = 5;
pub const REBOOT_VERIFY_DELAY: Duration = Duration::from_secs(2);
pub const REBOOT_SETTLE: Duration = Duration::from_secs(2);

/// Datagram polls are cheap; more of them, quickly.
pub const DATAGRAM_VERIFY_RETRIES: u32 = 5;
pub const DATAGRAM_VERIFY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub record: Option<OnuRecord>,
    pub attempts: u32,
}

async fn pause(cancel: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Poll `get ONU info` until the observed status lands in `acceptable`
/// (case-insensitive). Read errors count as attempts, not verdicts; the
/// last successfully observed record is returned either way.
pub async fn verify_onu_state(
    driver: &mut dyn OltDriver,
    cancel: &CancellationToken,
    pon_port: &str,
    onu_id: u32,
    acceptable: &[&str],
    max_retries: u32,
    delay: Duration,
) -> Result<VerifyOutcome> {
    let mut last_record = None;
    let total = 1 + max_retries;
    for attempt in 1..=total {
        match driver.get_onu_info(cancel, pon_port, onu_id).await {
            Ok(Some(record)) => {
                if record.status_in(acceptable) {
                    debug!(pon_port, onu_id, attempt, "state verified");
                    return Ok(VerifyOutcome {
                        verified: true,
                        record: Some(record),
                        attempts: attempt,
                    });
                }
                last_record = Some(record);
            }
            Ok(None) => {}
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                debug!(pon_port, onu_id, attempt, "verify read failed: {e}");
            }
        }
        if attempt < total {
            pause(cancel, delay).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: last_record,
        attempts: total,
    })
}

/// Poll until the ONU record is gone. Any read error or nil record counts
/// as confirmation of deletion.
pub async fn verify_onu_deleted(
    driver: &mut dyn OltDriver,
    cancel: &CancellationToken,
    pon_port: &str,
    onu_id: u32,
    max_retries: u32,
    delay: Duration,
) -> Result<VerifyOutcome> {
    let mut last_record = None;
    let total = 1 + max_retries;
    for attempt in 1..=total {
        match driver.get_onu_info(cancel, pon_port, onu_id).await {
            Ok(Some(record)) => last_record = Some(record),
            Ok(None) => {
                return Ok(VerifyOutcome {
                    verified: true,
                    record: None,
                    attempts: attempt,
                })
            }
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
            pause(cancel, delay).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: last_record,
        attempts: total,
    })
}

/// Poll until a record with the expected serial number shows up on the
/// port. Used after provisioning.
pub async fn verify_onu_serial(
    driver: &mut dyn OltDriver,
    cancel: &CancellationToken,
    pon_port: &str,
    onu_id: u32,
    serial: &str,
    max_retries: u32,
    delay: Duration,
) -> Result<VerifyOutcome> {
    let mut last_record = None;
    let total = 1 + max_retries;
    for attempt in 1..=total {
        match driver.get_onu_info(cancel, pon_port, onu_id).await {
            Ok(Some(record)) => {
                if record.serial_matches(serial) {
                    return Ok(VerifyOutcome {
                        verified: true,
                        record: Some(record),
                        attempts: attempt,
                    });
                }
                last_record = Some(record);
            }
            Ok(None) => {}
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                debug!(pon_port, onu_id, attempt, "serial verify read failed: {e}");
            }
        }
        if attempt < total {
            pause(cancel, delay).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: last_record,
        attempts: total,
    })
}

/// Whether a datagram record satisfies the acceptable set: the admin
/// state matches, the operational status matches, or the computed mapping
/// applies (admin `disabled` reads as operational `suspended`).
fn datagram_state_matches(record: &OnuRecord, acceptable: &[&str]) -> bool {
    let admin = record.admin_state.as_deref().unwrap_or("");
    if acceptable.iter().any(|a| a.eq_ignore_ascii_case(admin)) {
        return true;
    }
    if record.status_in(acceptable) {
        return true;
    }
    admin.eq_ignore_ascii_case("disabled")
        && acceptable.iter().any(|a| a.eq_ignore_ascii_case("suspended"))
}

/// Datagram variant of [`verify_onu_state`]. Preferred when the surface is
/// reachable: it queries the OLT's authoritative state table instead of a
/// possibly stale `show` view.
pub async fn verify_onu_state_datagram(
    datagram: &dyn DatagramOlt,
    cancel: &CancellationToken,
    pon_port: &str,
    onu_id: u32,
    acceptable: &[&str],
    max_retries: u32,
    delay: Duration,
) -> Result<VerifyOutcome> {
    let mut last_record = None;
    let total = 1 + max_retries;
    for attempt in 1..=total {
        match datagram.list_onus(cancel, Some(pon_port)).await {
            Ok(records) => {
                if let Some(record) = records.into_iter().find(|r| r.onu_id == onu_id) {
                    if datagram_state_matches(&record, acceptable) {
                        debug!(pon_port, onu_id, attempt, "state verified via datagram");
                        return Ok(VerifyOutcome {
                            verified: true,
                            record: Some(record),
                            attempts: attempt,
                        });
                    }
                    last_record = Some(record);
                }
            }
            Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
            Err(e) => {
                debug!(pon_port, onu_id, attempt, "datagram verify failed: {e}");
            }
        }
        if attempt < total {
            pause(cancel, delay).await?;
        }
    }
    Ok(VerifyOutcome {
        verified: false,
        record: last_record,
        attempts: total,
    })
}
