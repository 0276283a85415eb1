// Command lifecycle: ack, resolve, route to a transport, execute, push result
use crate::client::ControlPlane;
use crate::driver::{DatagramOlt, DriverFactory};
use crate::handlers::{self, HandlerContext};
use ponpulse_common::{
    AgentError, CommandResult, EquipmentConfig, EquipmentRegistry, PendingCommand,
};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    registry: Arc<EquipmentRegistry>,
    control: Arc<dyn ControlPlane>,
    factory: Arc<dyn DriverFactory>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EquipmentRegistry>,
        control: Arc<dyn ControlPlane>,
        factory: Arc<dyn DriverFactory>,
    ) -> Self {
        Self {
            registry,
            control,
            factory,
        }
    }

    /// Process one fetched batch in received order. A failing command never
    /// suppresses the ones after it.
    pub async fn run_batch(&self, cancel: &CancellationToken, commands: Vec<PendingCommand>) {
        for command in commands {
            if cancel.is_cancelled() {
                debug!("cancellation observed, leaving remaining commands for the next poll");
                break;
            }
            self.dispatch(cancel, &command).await;
        }
    }

    /// Drive one command through ack -> execute -> push-result. Exactly one
    /// result is pushed per command id, success or error.
    pub async fn dispatch(&self, cancel: &CancellationToken, command: &PendingCommand) {
        let started = Instant::now();
        info!(id = %command.id, kind = %command.kind, equipment = %command.equipment_id, "dispatching command");

        if let Err(e) = self.control.ack_command(cancel, &command.id).await {
            warn!(id = %command.id, "command ack failed: {e}");
        }

        let mut result = self.run(cancel, command).await;
        result.duration_ms = started.elapsed().as_millis() as u64;

        if result.success {
            info!(id = %command.id, duration_ms = result.duration_ms, "command succeeded");
        } else {
            warn!(
                id = %command.id,
                duration_ms = result.duration_ms,
                error = result.error.as_deref().unwrap_or("unknown"),
                "command failed"
            );
        }

        if let Err(e) = self.control.push_result(cancel, &command.id, &result).await {
            warn!(id = %command.id, "result push failed: {e}");
        }
    }

    async fn run(&self, cancel: &CancellationToken, command: &PendingCommand) -> CommandResult {
        let equipment = match self.registry.get(&command.equipment_id) {
            Some(equipment) => equipment,
            None => {
                return CommandResult::fail(
                    AgentError::ConfigMissing(command.equipment_id.clone()).to_string(),
                )
            }
        };

        if command.kind.is_datagram_read() {
            // Datagram preferred for reads; CLI on setup or handler failure.
            match self.factory.datagram(cancel, &equipment).await {
                Ok(datagram) => {
                    let mut ctx = HandlerContext {
                        cancel,
                        equipment: equipment.as_ref(),
                        driver: None,
                        datagram: Some(datagram.as_ref()),
                        control: self.control.as_ref(),
                    };
                    let result = handlers::handle_command(&mut ctx, command).await;
                    if result.success {
                        return result;
                    }
                    debug!(
                        id = %command.id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "datagram read failed, falling back to CLI"
                    );
                }
                Err(e) => {
                    debug!(id = %command.id, "datagram transport unavailable, using CLI: {e}");
                }
            }
            return self.run_cli(cancel, command, &equipment, None).await;
        }

        if command.kind.is_provisioning() {
            // CLI executes the write; the datagram surface, when it comes
            // up, gives verification the authoritative state table.
            let datagram = match self.factory.datagram(cancel, &equipment).await {
                Ok(datagram) => Some(datagram),
                Err(e) => {
                    debug!(id = %command.id, "verification datagram unavailable: {e}");
                    None
                }
            };
            return self.run_cli(cancel, command, &equipment, datagram).await;
        }

        self.run_cli(cancel, command, &equipment, None).await
    }

    async fn run_cli(
        &self,
        cancel: &CancellationToken,
        command: &PendingCommand,
        equipment: &EquipmentConfig,
        datagram: Option<Arc<dyn DatagramOlt>>,
    ) -> CommandResult {
        let mut driver = match self.factory.cli(cancel, equipment).await {
            Ok(driver) => driver,
            Err(e) => return CommandResult::fail(e.to_string()),
        };

        let result = {
            let mut ctx = HandlerContext {
                cancel,
                equipment,
                driver: Some(driver.as_mut()),
                datagram: datagram.as_deref(),
                control: self.control.as_ref(),
            };
            handlers::handle_command(&mut ctx, command).await
        };

        if let Err(e) = driver.close().await {
            debug!(equipment = %equipment.id, "driver close failed: {e}");
        }
        result
    }
}
