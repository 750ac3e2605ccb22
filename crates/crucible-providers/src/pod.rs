//! Ephemeral GPU pod backend.
//!
//! Provisions a fresh pod through the vendor's REST API, injects the
//! rendered bootstrap script as the container command, and maps pod
//! lifecycle states onto the canonical vocabulary. Pods are cattle: the
//! provider never reconnects to a pod it did not just create during this
//! process lifetime; the orchestrator record carries the pod id instead.

use std::time::Duration;

use async_trait::async_trait;
use crucible_abstraction::{
    DeployError, DeployResult, DeploymentProvider, DeploymentRequest, DeploymentState,
    DeploymentStatus,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::script::render_bootstrap_script;

const PROVIDER_NAME: &str = "cloud-pod";

/// Pod provisioning is slow compared to agent calls.
pub const DEFAULT_POD_TIMEOUT: Duration = Duration::from_secs(30);

/// Vendor GPU used when the request names no GPU or an unknown key.
pub const DEFAULT_POD_GPU: &str = "NVIDIA RTX A5000";

const DEFAULT_IMAGE: &str = "crucible/trainer:latest";
const DEFAULT_VOLUME_GB: u32 = 50;

/// Internal GPU key to vendor type-id translation. Keys match the
/// benchmark table in the training crate.
const GPU_TYPE_MAP: &[(&str, &str)] = &[
    ("t4", "NVIDIA Tesla T4"),
    ("l4", "NVIDIA L4"),
    ("rtx-3090", "NVIDIA GeForce RTX 3090"),
    ("rtx-4090", "NVIDIA GeForce RTX 4090"),
    ("rtx-a5000", "NVIDIA RTX A5000"),
    ("a40", "NVIDIA A40"),
    ("a100-40gb", "NVIDIA A100 40GB PCIe"),
    ("a100-80gb", "NVIDIA A100 80GB PCIe"),
    ("h100-80gb", "NVIDIA H100 80GB HBM3"),
];

/// Resolves an internal GPU key to the vendor's type id, falling back to
/// [`DEFAULT_POD_GPU`] for unknown keys.
#[must_use]
pub fn vendor_gpu_name(key: &str) -> &'static str {
    let needle = key.trim().to_lowercase();
    GPU_TYPE_MAP
        .iter()
        .find(|(k, _)| *k == needle)
        .map_or(DEFAULT_POD_GPU, |(_, vendor)| vendor)
}

#[derive(Debug, Serialize)]
struct CreatePodRequest {
    name: String,
    image_name: String,
    gpu_type_id: String,
    gpu_count: u32,
    volume_in_gb: u32,
    docker_args: String,
    env: Vec<EnvVar>,
}

#[derive(Debug, Serialize)]
struct EnvVar {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CreatePodResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PodStatusResponse {
    #[serde(default)]
    desired_status: Option<String>,
    #[serde(default)]
    uptime_seconds: Option<u64>,
    #[serde(default)]
    cost_per_hr: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Translates a vendor pod state into the canonical vocabulary. Unknown
/// states degrade to `creating` so polling keeps watching rather than
/// declaring a verdict.
fn map_pod_state(raw: &str) -> DeploymentState {
    match raw.to_uppercase().as_str() {
        "CREATED" => DeploymentState::Creating,
        "STARTING" | "PENDING" | "RESTARTING" => DeploymentState::Starting,
        "RUNNING" => DeploymentState::Training,
        "EXITED" | "TERMINATED" | "STOPPED" => DeploymentState::Stopped,
        "FAILED" | "DEAD" => DeploymentState::Failed,
        other => {
            warn!(state = %other, "unrecognized pod state, treating as creating");
            DeploymentState::Creating
        }
    }
}

/// Whether a provisioning failure body signals GPU stock exhaustion
/// rather than a malformed request.
fn is_capacity_exhaustion(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["no instances", "capacity", "unavailable", "stock"].iter().any(|n| lower.contains(n))
}

/// Raw HTTP client for the pod vendor API.
#[derive(Debug, Clone)]
pub struct PodApiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
    timeout: Duration,
}

impl PodApiClient {
    /// Creates a client for the vendor API at `base_url`. The key is
    /// optional so the provider can be constructed unconfigured and fail
    /// with a clear error at deploy time.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_timeout(base_url, api_key, DEFAULT_POD_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    #[must_use]
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, api_key, client: Client::new(), timeout }
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Provisions a pod and returns the vendor pod id.
    async fn create_pod(&self, body: &CreatePodRequest) -> DeployResult<String> {
        let url = format!("{}/pods", self.base_url);
        debug!(name = %body.name, gpu = %body.gpu_type_id, "provisioning pod");

        let response = self
            .authorize(self.client.post(&url))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if is_capacity_exhaustion(&text) {
                return Err(DeployError::capacity(
                    PROVIDER_NAME,
                    format!(
                        "no {} capacity is available right now; try a different gpu_type, \
                         reduce gpu_count, or retry in a few minutes",
                        body.gpu_type_id
                    ),
                ));
            }
            return Err(status_error(status, text));
        }

        let parsed: CreatePodResponse = response
            .json()
            .await
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        Ok(parsed.id)
    }

    /// Fetches the pod's current state, uptime, and accrued cost.
    async fn pod_status(&self, pod_id: &str) -> DeployResult<DeploymentStatus> {
        let url = format!("{}/pods/{pod_id}", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_response(response).await?;
        let parsed: PodStatusResponse = response
            .json()
            .await
            .map_err(|e| DeployError::Serialization(e.to_string()))?;

        let state = parsed
            .desired_status
            .as_deref()
            .map_or(DeploymentState::Creating, map_pod_state);
        let cost_usd = match (parsed.uptime_seconds, parsed.cost_per_hr) {
            (Some(uptime), Some(rate)) => Some(uptime as f64 / 3600.0 * rate),
            _ => None,
        };

        Ok(DeploymentStatus {
            state,
            metrics: None,
            error: parsed.error,
            uptime_seconds: parsed.uptime_seconds,
            cost_usd,
        })
    }

    /// Terminates the pod. A 404 means the pod is already gone, which is
    /// the outcome termination wants.
    async fn terminate_pod(&self, pod_id: &str) -> DeployResult<()> {
        let url = format!("{}/pods/{pod_id}", self.base_url);
        let response = self
            .authorize(self.client.delete(&url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(pod_id = %pod_id, "pod already gone, treating as terminated");
            return Ok(());
        }
        check_response(response).await?;
        Ok(())
    }
}

/// Deployment backend that runs each job on a freshly provisioned GPU pod.
#[derive(Debug, Clone)]
pub struct CloudPodProvider {
    api: PodApiClient,
    default_image: String,
    default_volume_gb: u32,
}

impl CloudPodProvider {
    /// Creates a provider over the given vendor API client.
    #[must_use]
    pub fn new(api: PodApiClient) -> Self {
        Self {
            api,
            default_image: DEFAULT_IMAGE.to_string(),
            default_volume_gb: DEFAULT_VOLUME_GB,
        }
    }

    /// Overrides the container image used when the request names none.
    #[must_use]
    pub fn with_default_image(mut self, image: impl Into<String>) -> Self {
        self.default_image = image.into();
        self
    }

    /// Overrides the volume size used when the request names none.
    #[must_use]
    pub const fn with_default_volume_gb(mut self, gb: u32) -> Self {
        self.default_volume_gb = gb;
        self
    }

    fn build_create_request(&self, request: &DeploymentRequest) -> DeployResult<CreatePodRequest> {
        let script = render_bootstrap_script(request)?;
        let gpu_type_id = request
            .options
            .gpu_type
            .as_deref()
            .map_or(DEFAULT_POD_GPU, vendor_gpu_name)
            .to_string();

        let mut env: Vec<EnvVar> = request
            .options
            .env
            .iter()
            .map(|(key, value)| EnvVar { key: key.clone(), value: value.clone() })
            .collect();
        env.push(EnvVar { key: "CRUCIBLE_JOB_ID".to_string(), value: request.job_id.clone() });
        if let Some(token) = &request.auth_token {
            env.push(EnvVar { key: "CRUCIBLE_AUTH_TOKEN".to_string(), value: token.clone() });
        }

        Ok(CreatePodRequest {
            name: format!("crucible-{}", request.job_id),
            image_name: request
                .options
                .docker_image
                .clone()
                .unwrap_or_else(|| self.default_image.clone()),
            gpu_type_id,
            gpu_count: request.options.gpu_count.unwrap_or(1),
            volume_in_gb: request.options.volume_gb.unwrap_or(self.default_volume_gb),
            docker_args: script,
            env,
        })
    }
}

#[async_trait]
impl DeploymentProvider for CloudPodProvider {
    fn id(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn deploy(&self, request: &DeploymentRequest) -> DeployResult<String> {
        if !self.api.has_api_key() {
            return Err(DeployError::backend(
                PROVIDER_NAME,
                "pod API key is not configured; set CRUCIBLE_POD_API_KEY",
            ));
        }
        let body = self.build_create_request(request)?;
        let pod_id = self.api.create_pod(&body).await?;
        info!(job_id = %request.job_id, pod_id = %pod_id, gpu = %body.gpu_type_id, "pod provisioned");
        Ok(pod_id)
    }

    async fn status(&self, job_id: &str) -> DeployResult<DeploymentStatus> {
        self.api.pod_status(job_id).await
    }

    async fn cancel(&self, job_id: &str) -> DeployResult<()> {
        self.api.terminate_pod(job_id).await
    }

    async fn logs(&self, job_id: &str) -> DeployResult<Vec<String>> {
        // The vendor API exposes no log streaming endpoint. Training logs
        // land on the pod volume at /workspace/logs/train.log.
        Ok(vec![format!(
            "log streaming is not available for pod {job_id}; \
             logs are written to /workspace/logs/train.log on the pod volume"
        )])
    }
}

fn transport_error(error: reqwest::Error) -> DeployError {
    DeployError::transient(PROVIDER_NAME, error.to_string())
}

fn status_error(status: StatusCode, body: String) -> DeployError {
    let message = if body.is_empty() { status.to_string() } else { body };
    match status {
        StatusCode::NOT_FOUND => DeployError::State(format!("vendor has no such pod: {message}")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DeployError::backend(PROVIDER_NAME, format!("pod API rejected credentials: {message}"))
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            DeployError::Validation(message)
        }
        StatusCode::TOO_MANY_REQUESTS => DeployError::transient(PROVIDER_NAME, message),
        s if s.is_server_error() => DeployError::transient(PROVIDER_NAME, message),
        _ => DeployError::backend(PROVIDER_NAME, message),
    }
}

async fn check_response(response: Response) -> DeployResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_abstraction::{DatasetRef, DeployOptions, ProviderTarget};
    use crucible_training::{normalize, TrainingConfig};

    fn request() -> DeploymentRequest {
        let payload = normalize(&TrainingConfig::new("llama-2-7b"));
        DeploymentRequest::new("job-9", payload, DatasetRef::Path("/d.jsonl".to_string()))
            .with_auth_token("tok-pod")
            .with_options(DeployOptions {
                target: ProviderTarget::CloudPod,
                gpu_type: Some("a100-80gb".to_string()),
                ..DeployOptions::default()
            })
    }

    fn provider(server: &mockito::Server) -> CloudPodProvider {
        CloudPodProvider::new(PodApiClient::new(server.url(), Some("key-123".to_string())))
    }

    #[test]
    fn test_vendor_gpu_name_lookup() {
        assert_eq!(vendor_gpu_name("a100-80gb"), "NVIDIA A100 80GB PCIe");
        assert_eq!(vendor_gpu_name("  RTX-4090 "), "NVIDIA GeForce RTX 4090");
        assert_eq!(vendor_gpu_name("warp-drive"), DEFAULT_POD_GPU);
    }

    #[test]
    fn test_pod_state_mapping() {
        assert_eq!(map_pod_state("RUNNING"), DeploymentState::Training);
        assert_eq!(map_pod_state("created"), DeploymentState::Creating);
        assert_eq!(map_pod_state("PENDING"), DeploymentState::Starting);
        assert_eq!(map_pod_state("TERMINATED"), DeploymentState::Stopped);
        assert_eq!(map_pod_state("DEAD"), DeploymentState::Failed);
        assert_eq!(map_pod_state("GLITCHED"), DeploymentState::Creating);
    }

    #[tokio::test]
    async fn test_deploy_provisions_pod() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/pods")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "name": "crucible-job-9",
                "gpu_type_id": "NVIDIA A100 80GB PCIe",
                "gpu_count": 1
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "pod-abc"}"#)
            .create();

        let id = provider(&server).deploy(&request()).await.unwrap();
        assert_eq!(id, "pod-abc");
        mock.assert();
    }

    #[tokio::test]
    async fn test_deploy_without_api_key_is_backend_error() {
        let provider = CloudPodProvider::new(PodApiClient::new("http://127.0.0.1:1", None));
        let err = provider.deploy(&request()).await.unwrap_err();
        assert_eq!(err.code(), "backend");
        assert!(err.to_string().contains("CRUCIBLE_POD_API_KEY"));
    }

    #[tokio::test]
    async fn test_capacity_exhaustion_is_rewritten() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/pods")
            .with_status(500)
            .with_body("There are no instances available with the requested specs")
            .create();

        let err = provider(&server).deploy(&request()).await.unwrap_err();
        assert_eq!(err.code(), "capacity");
        assert!(err.to_string().contains("different gpu_type"));
    }

    #[tokio::test]
    async fn test_status_reports_cost_from_uptime_and_rate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pods/pod-abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"desired_status": "RUNNING", "uptime_seconds": 7200, "cost_per_hr": 1.5}"#)
            .create();

        let status = provider(&server).status("pod-abc").await.unwrap();
        assert_eq!(status.state, DeploymentState::Training);
        assert_eq!(status.uptime_seconds, Some(7200));
        let cost = status.cost_usd.unwrap();
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_terminates_pod_and_tolerates_missing() {
        let mut server = mockito::Server::new_async().await;
        let deleted = server.mock("DELETE", "/pods/pod-abc").with_status(200).create();
        let _gone = server.mock("DELETE", "/pods/pod-gone").with_status(404).create();

        let provider = provider(&server);
        provider.cancel("pod-abc").await.unwrap();
        provider.cancel("pod-gone").await.unwrap();
        deleted.assert();
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pods/pod-abc")
            .with_status(429)
            .with_body("slow down")
            .create();

        let err = provider(&server).status("pod-abc").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_logs_explain_capability_gap() {
        let provider = CloudPodProvider::new(PodApiClient::new("http://127.0.0.1:1", None));
        let lines = provider.logs("pod-abc").await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("/workspace/logs/train.log"));
    }
}
