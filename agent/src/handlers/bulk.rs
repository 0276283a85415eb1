// Bulk ONU provisioning: native datagram path with a sequential CLI fallback
use super::{push_immediate_update, HandlerContext};
use crate::driver::OnuProvisionRequest;
use ponpulse_common::{
    AgentError, BulkItemResult, BulkProvisionOp, BulkProvisionSummary, CommandResult,
    PendingCommand, Result,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const MAX_ONU_ID: u32 = 128;
const CODE_ALREADY_EXISTS: &str = "ALREADY_EXISTS";

/// Lowest unused ONU id in [1, 128], or None when the port is full.
fn lowest_free_id(used: &HashSet<u32>) -> Option<u32> {
    (1..=MAX_ONU_ID).find(|id| !used.contains(id))
}

/// Serial comparison is case-insensitive on-device; responses keep the
/// caller's original spelling.
fn serial_key(serial: &str) -> String {
    serial.to_ascii_uppercase()
}

pub async fn onu_bulk_provision(
    ctx: &mut HandlerContext<'_>,
    cmd: &PendingCommand,
) -> Result<CommandResult> {
    let operations: Vec<BulkProvisionOp> = match cmd.payload.get("operations") {
        Some(raw) => serde_json::from_value(raw.clone())?,
        None => Vec::new(),
    };
    if operations.is_empty() {
        return Ok(CommandResult::fail("no operations provided"));
    }

    // Preferred path: one native bulk call, a single session amortizes
    // the per-ONU setup cost.
    if let Some(datagram) = ctx.datagram {
        match datagram.bulk_provision(ctx.cancel, &operations).await {
            Ok(summary) => {
                for item in summary.results.iter().filter(|i| i.success) {
                    if let Some(onu_id) = item.onu_id {
                        push_immediate_update(ctx, &item.pon_port, onu_id, "provisioned", None)
                            .await;
                    }
                }
                return Ok(summarize(summary));
            }
            Err(e) => {
                debug!("native bulk provision failed, falling back to sequential: {e}");
            }
        }
    }

    sequential_provision(ctx, operations).await
}

/// Fallback: provision one at a time over the CLI, tracking used ids and
/// serials per port so items within the batch do not collide.
async fn sequential_provision(
    ctx: &mut HandlerContext<'_>,
    operations: Vec<BulkProvisionOp>,
) -> Result<CommandResult> {
    let cancel = ctx.cancel;

    // Index the target ports up front: used ONU ids plus serial -> id.
    let mut used_ids: HashMap<String, HashSet<u32>> = HashMap::new();
    let mut serial_index: HashMap<String, HashMap<String, u32>> = HashMap::new();
    let ports: HashSet<String> = operations.iter().map(|op| op.pon_port.clone()).collect();
    {
        let driver = ctx.cli()?;
        for port in &ports {
            let onus = driver.list_onus(cancel, port).await?;
            let ids = used_ids.entry(port.clone()).or_default();
            let serials = serial_index.entry(port.clone()).or_default();
            for onu in onus {
                ids.insert(onu.onu_id);
                if let Some(serial) = &onu.serial {
                    serials.insert(serial_key(serial), onu.onu_id);
                }
            }
        }
    }

    let total = operations.len();
    let mut results = Vec::with_capacity(total);
    let mut succeeded = 0usize;

    for op in operations {
        let item = provision_one(ctx, &mut used_ids, &mut serial_index, op).await;
        if item.success {
            succeeded += 1;
        }
        results.push(item);
    }

    let failed = total - succeeded;
    info!(total, succeeded, failed, "bulk provision finished");
    Ok(summarize(BulkProvisionSummary {
        total,
        succeeded,
        failed,
        results,
    }))
}

async fn provision_one(
    ctx: &mut HandlerContext<'_>,
    used_ids: &mut HashMap<String, HashSet<u32>>,
    serial_index: &mut HashMap<String, HashMap<String, u32>>,
    op: BulkProvisionOp,
) -> BulkItemResult {
    let mut item = BulkItemResult {
        serial: op.serial.clone(),
        pon_port: op.pon_port.clone(),
        ..Default::default()
    };

    let key = serial_key(&op.serial);
    if let Some(existing_id) = serial_index
        .get(&op.pon_port)
        .and_then(|serials| serials.get(&key))
    {
        item.skipped = true;
        item.error_code = Some(CODE_ALREADY_EXISTS.to_string());
        item.existing_id = Some(*existing_id);
        item.error = Some(format!(
            "serial {} already provisioned on {} as ONU {existing_id}",
            op.serial, op.pon_port
        ));
        return item;
    }

    let used = used_ids.entry(op.pon_port.clone()).or_default();
    let onu_id = match op.onu_id.filter(|&id| id != 0) {
        Some(requested) => {
            if used.contains(&requested) {
                item.error = Some(format!(
                    "ONU ID {requested} already in use on {}",
                    op.pon_port
                ));
                return item;
            }
            requested
        }
        None => match lowest_free_id(used) {
            Some(id) => id,
            None => {
                item.error = Some(AgentError::NoFreeOnuId(op.pon_port.clone()).to_string());
                return item;
            }
        },
    };
    item.onu_id = Some(onu_id);

    let request = OnuProvisionRequest {
        pon_port: op.pon_port.clone(),
        onu_id,
        serial: op.serial.clone(),
        line_profile: op.line_profile.clone().unwrap_or_else(|| "default".into()),
        service_profile: op
            .service_profile
            .clone()
            .unwrap_or_else(|| "default".into()),
        vlan: op.vlan,
        description: None,
    };

    let cancel = ctx.cancel;
    let executed = match ctx.cli() {
        Ok(driver) => driver.add_onu(cancel, &request).await,
        Err(e) => Err(e),
    };
    match executed {
        Ok(()) => {
            used.insert(onu_id);
            serial_index
                .entry(op.pon_port.clone())
                .or_default()
                .insert(key, onu_id);
            item.success = true;
            push_immediate_update(ctx, &op.pon_port, onu_id, "provisioned", None).await;
        }
        Err(e) => {
            item.error = Some(e.to_string());
        }
    }
    item
}

/// Any failed item marks the whole command failed so the UI surfaces it,
/// with the per-item payload attached either way.
fn summarize(summary: BulkProvisionSummary) -> CommandResult {
    if summary.failed > 0 {
        let error = format!("{} of {} provisions failed", summary.failed, summary.total);
        CommandResult::fail_with(error, json!(summary))
    } else {
        CommandResult::ok(json!(summary))
    }
}
