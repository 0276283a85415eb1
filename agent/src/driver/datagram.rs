// Management datagram poller
//
// Request/response polling over UDP with a compact JSON codec. The poll
// surface reads the OLT's authoritative state table, so verification
// prefers it over scraping `show` output. One in-flight exchange at a
// time; responses carry `{ok, error?, data}`.
use super::DatagramOlt;
use async_trait::async_trait;
use ponpulse_common::{
    AgentError, BulkProvisionOp, BulkProvisionSummary, EquipmentConfig, OltAlarm, OltStatus,
    OnuRecord, PonPortInfo, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
const PROBE_ATTEMPTS: u32 = 2;
const MAX_DATAGRAM: usize = 65_507;

#[derive(Debug, Serialize)]
struct DatagramRequest<'a> {
    community: &'a str,
    version: u8,
    op: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct DatagramResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Value,
}

pub struct DatagramPoller {
    equipment_id: String,
    community: String,
    version: u8,
    socket: Mutex<UdpSocket>,
    timeout: Duration,
}

impl DatagramPoller {
    /// Bind, connect, and probe the poll endpoint. A probe timeout means
    /// the surface is unreachable and the caller should fall back to CLI.
    pub async fn open(cancel: &CancellationToken, config: &EquipmentConfig) -> Result<Self> {
        let target = format!("{}:{}", config.address, config.datagram.port);
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| AgentError::Transport {
                equipment: config.id.clone(),
                detail: format!("udp bind failed: {e}"),
            })?;
        socket
            .connect(&target)
            .await
            .map_err(|e| AgentError::Transport {
                equipment: config.id.clone(),
                detail: format!("udp connect to {target} failed: {e}"),
            })?;

        let poller = Self {
            equipment_id: config.id.clone(),
            community: config.datagram.community.clone(),
            version: config.datagram.version,
            socket: Mutex::new(socket),
            timeout: REQUEST_TIMEOUT,
        };

        let mut last_err = None;
        for attempt in 1..=PROBE_ATTEMPTS {
            match poller.request(cancel, "ping", Value::Null).await {
                Ok(_) => {
                    debug!(equipment = %poller.equipment_id, %target, "datagram surface reachable");
                    return Ok(poller);
                }
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    trace!(equipment = %poller.equipment_id, attempt, "datagram probe failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AgentError::Transport {
            equipment: config.id.clone(),
            detail: "datagram probe failed".into(),
        }))
    }

    async fn request(&self, cancel: &CancellationToken, op: &str, params: Value) -> Result<Value> {
        let request = DatagramRequest {
            community: &self.community,
            version: self.version,
            op,
            params,
        };
        let encoded = serde_json::to_vec(&request)?;

        let socket = self.socket.lock().await;
        socket
            .send(&encoded)
            .await
            .map_err(|e| AgentError::Transport {
                equipment: self.equipment_id.clone(),
                detail: format!("datagram send failed: {e}"),
            })?;

        let mut buffer = vec![0u8; MAX_DATAGRAM];
        let received = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            received = tokio::time::timeout(self.timeout, socket.recv(&mut buffer)) => match received {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(AgentError::Transport {
                        equipment: self.equipment_id.clone(),
                        detail: format!("datagram recv failed: {e}"),
                    })
                }
                Err(_) => {
                    return Err(AgentError::Transport {
                        equipment: self.equipment_id.clone(),
                        detail: format!("datagram '{op}' timed out after {:?}", self.timeout),
                    })
                }
            },
        };

        let response: DatagramResponse = serde_json::from_slice(&buffer[..received])?;
        if !response.ok {
            return Err(AgentError::Execute {
                command: format!("datagram {op}"),
                output: response.error.unwrap_or_else(|| "unspecified device error".into()),
            });
        }
        Ok(response.data)
    }

    fn rows<T: serde::de::DeserializeOwned>(data: Value, key: &str) -> Result<Vec<T>> {
        let rows = data.get(key).cloned().unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(rows)?)
    }
}

#[async_trait]
impl DatagramOlt for DatagramPoller {
    async fn list_onus(
        &self,
        cancel: &CancellationToken,
        filter: Option<&str>,
    ) -> Result<Vec<OnuRecord>> {
        let params = match filter {
            Some(f) => json!({ "pon_port": f }),
            None => Value::Null,
        };
        let data = self.request(cancel, "onu.list", params).await?;
        Self::rows(data, "onus")
    }

    async fn get_onu_by_serial(
        &self,
        cancel: &CancellationToken,
        serial: &str,
    ) -> Result<Option<OnuRecord>> {
        let data = self
            .request(cancel, "onu.get_by_serial", json!({ "serial": serial }))
            .await?;
        match data.get("onu") {
            None | Some(Value::Null) => Ok(None),
            Some(onu) => Ok(Some(serde_json::from_value(onu.clone())?)),
        }
    }

    async fn olt_status(&self, cancel: &CancellationToken) -> Result<OltStatus> {
        let data = self.request(cancel, "olt.status", Value::Null).await?;
        let status = data.get("status").cloned().unwrap_or(data);
        Ok(serde_json::from_value(status)?)
    }

    async fn list_ports(&self, cancel: &CancellationToken) -> Result<Vec<PonPortInfo>> {
        let data = self.request(cancel, "port.list", Value::Null).await?;
        Self::rows(data, "ports")
    }

    async fn alarms(&self, cancel: &CancellationToken) -> Result<Vec<OltAlarm>> {
        let data = self.request(cancel, "alarm.list", Value::Null).await?;
        Self::rows(data, "alarms")
    }

    async fn bulk_provision(
        &self,
        cancel: &CancellationToken,
        operations: &[BulkProvisionOp],
    ) -> Result<BulkProvisionSummary> {
        let data = self
            .request(
                cancel,
                "onu.bulk_provision",
                json!({ "operations": operations }),
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }

    async fn discover_unprovisioned(&self, cancel: &CancellationToken) -> Result<Vec<OnuRecord>> {
        let data = self.request(cancel, "onu.discover", Value::Null).await?;
        Self::rows(data, "onus")
    }
}
