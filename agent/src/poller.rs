// Periodic OLT telemetry sweep feeding the resilient pusher
use crate::driver::DriverFactory;
use chrono::Utc;
use ponpulse_common::{
    EquipmentConfig, EquipmentRegistry, MetricPoint, MetricsBatch, MetricsPusher, OltStatus,
    ResilientPusher, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls every registered OLT for its health snapshot and active-alarm
/// counts, handing batches to the resilient pusher. The pusher owns
/// delivery; a control-plane outage costs nothing here.
pub struct TelemetryPoller<P: MetricsPusher> {
    registry: Arc<EquipmentRegistry>,
    factory: Arc<dyn DriverFactory>,
    pusher: Arc<ResilientPusher<P>>,
    interval: Duration,
}

impl<P: MetricsPusher> TelemetryPoller<P> {
    pub fn new(
        registry: Arc<EquipmentRegistry>,
        factory: Arc<dyn DriverFactory>,
        pusher: Arc<ResilientPusher<P>>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            pusher,
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tick.tick().await;
        info!(interval = ?self.interval, "telemetry poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("telemetry poller stopping");
                    return;
                }
                _ = tick.tick() => {}
            }

            for equipment in self.registry.all() {
                if cancel.is_cancelled() {
                    return;
                }
                match self.collect_one(&cancel, &equipment).await {
                    Ok(batch) if batch.is_empty() => {}
                    Ok(batch) => {
                        if let Err(e) = self.pusher.push(batch).await {
                            // Already buffered by the pusher; just trace it.
                            debug!(equipment = %equipment.id, "telemetry push deferred: {e}");
                        }
                    }
                    Err(e) => {
                        warn!(equipment = %equipment.id, "telemetry sweep failed: {e}");
                    }
                }
            }
        }
    }

    /// One OLT's sweep: status plus alarm count, datagram first, CLI
    /// session as the fallback.
    async fn collect_one(
        &self,
        cancel: &CancellationToken,
        equipment: &EquipmentConfig,
    ) -> Result<MetricsBatch> {
        let (status, alarm_count) = match self.factory.datagram(cancel, equipment).await {
            Ok(datagram) => {
                let status = datagram.olt_status(cancel).await?;
                let alarms = datagram.alarms(cancel).await.unwrap_or_default();
                (status, alarms.len())
            }
            Err(_) => {
                let mut driver = self.factory.cli(cancel, equipment).await?;
                let status = driver.get_olt_status(cancel).await;
                let alarms = driver.get_alarms(cancel).await.unwrap_or_default();
                let _ = driver.close().await;
                (status?, alarms.len())
            }
        };
        Ok(status_metrics(&equipment.id, &status, alarm_count))
    }
}

fn status_metrics(equipment_id: &str, status: &OltStatus, alarm_count: usize) -> MetricsBatch {
    let now = Utc::now();
    let mut batch = Vec::new();
    let mut push = |name: &str, value: f64| {
        batch.push(MetricPoint {
            equipment_id: equipment_id.to_string(),
            name: name.to_string(),
            value,
            timestamp: now,
        });
    };
    if let Some(cpu) = status.cpu_percent {
        push("olt_cpu_percent", cpu);
    }
    if let Some(memory) = status.memory_percent {
        push("olt_memory_percent", memory);
    }
    if let Some(temperature) = status.temperature_c {
        push("olt_temperature_c", temperature);
    }
    push("olt_active_alarms", alarm_count as f64);
    batch
}
