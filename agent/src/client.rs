// Control-plane HTTP/JSON client
//
// Shared, stateless between calls aside from the auth header. Every call
// races against the cancellation token since reqwest futures do not carry
// one themselves.
use async_trait::async_trait;
use ponpulse_common::{
    AgentError, CommandResult, MetricsBatch, MetricsPusher, OnuStatusUpdate, PendingCommand,
    PushResponse, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The slice of the control-plane surface the dispatcher and handlers
/// need. A trait so tests can capture pushes without an HTTP server.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn ack_command(&self, cancel: &CancellationToken, command_id: &str) -> Result<()>;
    async fn push_result(
        &self,
        cancel: &CancellationToken,
        command_id: &str,
        result: &CommandResult,
    ) -> Result<()>;
    async fn push_onu_update(
        &self,
        cancel: &CancellationToken,
        equipment_id: &str,
        update: &OnuStatusUpdate,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollResponse {
    pub node_id: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct EnrollRequest<'a> {
    node_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enroll_key: Option<&'a str>,
}

pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    node_id: String,
    api_token: parking_lot::RwLock<Option<String>>,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>, node_id: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            node_id: node_id.into(),
            api_token: parking_lot::RwLock::new(api_token),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            response = self.authorize(request).send() => response?,
        };
        Ok(response.error_for_status()?)
    }

    /// Fetch the pending command batch for this node.
    pub async fn fetch_commands(&self, cancel: &CancellationToken) -> Result<Vec<PendingCommand>> {
        let url = self.url(&format!("/api/v1/nodes/{}/commands", self.node_id));
        let response = self.send(cancel, self.http.get(&url)).await?;
        let commands: Vec<PendingCommand> = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            body = response.json() => body?,
        };
        if !commands.is_empty() {
            debug!(count = commands.len(), "fetched pending commands");
        }
        Ok(commands)
    }

    pub async fn push_metrics(
        &self,
        cancel: &CancellationToken,
        batch: &MetricsBatch,
    ) -> Result<PushResponse> {
        let url = self.url("/api/v1/metrics");
        let body = serde_json::json!({ "metrics": batch });
        let response = self.send(cancel, self.http.post(&url).json(&body)).await?;
        let parsed: PushResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            body = response.json() => body?,
        };
        Ok(parsed)
    }

    /// Token-based enrollment against the flat agents endpoint.
    pub async fn enroll(&self, cancel: &CancellationToken, token: &str) -> Result<EnrollResponse> {
        let url = self.url("/api/v1/agents/enroll");
        let body = EnrollRequest {
            node_id: &self.node_id,
            token: Some(token),
            enroll_key: None,
        };
        let response = self.send(cancel, self.http.post(&url).json(&body)).await?;
        let enrolled: EnrollResponse = response.json().await?;
        self.adopt_token(&enrolled);
        info!(node_id = %enrolled.node_id, "enrolled with control plane");
        Ok(enrolled)
    }

    /// Organization-scoped v2 enrollment. Distinct operation from
    /// [`ControlPlaneClient::enroll`]; callers pick one, they are not
    /// chained.
    pub async fn enroll_org(
        &self,
        cancel: &CancellationToken,
        org_id: &str,
        enroll_key: &str,
    ) -> Result<EnrollResponse> {
        let url = self.url(&format!("/api/v1/orgs/{org_id}/agents/enroll"));
        let body = EnrollRequest {
            node_id: &self.node_id,
            token: None,
            enroll_key: Some(enroll_key),
        };
        let response = self.send(cancel, self.http.post(&url).json(&body)).await?;
        let enrolled: EnrollResponse = response.json().await?;
        self.adopt_token(&enrolled);
        info!(node_id = %enrolled.node_id, org_id, "enrolled with control plane (org-scoped)");
        Ok(enrolled)
    }

    fn adopt_token(&self, enrolled: &EnrollResponse) {
        if let Some(token) = &enrolled.api_token {
            *self.api_token.write() = Some(token.clone());
        }
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    async fn ack_command(&self, cancel: &CancellationToken, command_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/v1/commands/{command_id}/ack"));
        self.send(cancel, self.http.post(&url)).await?;
        Ok(())
    }

    async fn push_result(
        &self,
        cancel: &CancellationToken,
        command_id: &str,
        result: &CommandResult,
    ) -> Result<()> {
        let url = self.url(&format!("/api/v1/commands/{command_id}/result"));
        self.send(cancel, self.http.post(&url).json(result)).await?;
        Ok(())
    }

    async fn push_onu_update(
        &self,
        cancel: &CancellationToken,
        equipment_id: &str,
        update: &OnuStatusUpdate,
    ) -> Result<()> {
        let url = self.url(&format!("/api/v1/equipment/{equipment_id}/onus"));
        self.send(cancel, self.http.post(&url).json(update)).await?;
        Ok(())
    }
}

/// Newtype over the shared client so `MetricsPusher` (defined in
/// `ponpulse-common`) can be implemented for it; the orphan rules forbid
/// implementing a foreign trait directly for `Arc<ControlPlaneClient>`.
#[derive(Clone)]
pub struct SharedControlPlaneClient(pub std::sync::Arc<ControlPlaneClient>);

#[async_trait]
impl MetricsPusher for SharedControlPlaneClient {
    async fn push(&self, cancel: &CancellationToken, batch: &MetricsBatch) -> Result<PushResponse> {
        self.0.push_metrics(cancel, batch).await
    }
}
