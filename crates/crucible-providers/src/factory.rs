//! Provider construction and backend selection.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crucible_abstraction::{DeploymentProvider, ProviderTarget};

use crate::agent::AgentClient;
use crate::local::{LocalAgentProvider, DEFAULT_GRACEFUL_TIMEOUT};
use crate::pod::{CloudPodProvider, PodApiClient, DEFAULT_POD_TIMEOUT};

/// Agent endpoint assumed when the configuration names none.
pub const DEFAULT_AGENT_ENDPOINT: &str = "http://127.0.0.1:8090";

/// Pod vendor API root assumed when the configuration names none.
pub const DEFAULT_POD_API_URL: &str = "https://api.runpod.io/v1";

/// Whether an endpoint refers to this host.
///
/// Missing or empty endpoints count as local, and so does anything whose
/// host part cannot be picked apart; a deploy that guesses local degrades
/// to poll pickup at worst, while guessing remote would silently skip
/// dispatch.
#[must_use]
pub fn is_local_endpoint(endpoint: Option<&str>) -> bool {
    let Some(raw) = endpoint else { return true };
    let raw = raw.trim();
    if raw.is_empty() {
        return true;
    }
    let without_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let host_port = without_scheme.split(['/', '?']).next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default();
    host.is_empty() || host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

/// Everything needed to build both backends, resolved from configuration
/// before the factory exists.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Local trainer agent endpoint.
    pub agent_endpoint: String,
    /// When set, local jobs run this command as a subprocess instead of
    /// going through the agent.
    pub trainer_command: Option<Vec<String>>,
    /// Staging directory for co-located job files.
    pub workdir: PathBuf,
    /// Grace window before a cancelled subprocess is killed.
    pub graceful_kill_timeout: Duration,
    /// Pod vendor API root.
    pub pod_api_url: String,
    /// Pod vendor API key; pod deploys fail without one.
    pub pod_api_key: Option<String>,
    /// Request timeout for pod vendor calls.
    pub pod_timeout: Duration,
    /// Container image for pods when the request names none.
    pub default_docker_image: Option<String>,
    /// Volume size for pods when the request names none.
    pub default_volume_gb: Option<u32>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            agent_endpoint: DEFAULT_AGENT_ENDPOINT.to_string(),
            trainer_command: None,
            workdir: std::env::temp_dir().join("crucible-jobs"),
            graceful_kill_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            pod_api_url: DEFAULT_POD_API_URL.to_string(),
            pod_api_key: None,
            pod_timeout: DEFAULT_POD_TIMEOUT,
            default_docker_image: None,
            default_volume_gb: None,
        }
    }
}

/// Owns one instance of each backend and hands out the right one per
/// request target.
pub struct ProviderFactory {
    local: Arc<LocalAgentProvider>,
    pod: Arc<CloudPodProvider>,
}

impl ProviderFactory {
    /// Builds both backends from resolved settings.
    #[must_use]
    pub fn new(settings: ProviderSettings) -> Self {
        let agent = AgentClient::new(&settings.agent_endpoint);
        let mut local = LocalAgentProvider::new(agent, settings.workdir)
            .with_graceful_timeout(settings.graceful_kill_timeout);
        if let Some(command) = settings.trainer_command {
            local = local.with_trainer_command(command);
        }

        let api = PodApiClient::with_timeout(
            settings.pod_api_url,
            settings.pod_api_key,
            settings.pod_timeout,
        );
        let mut pod = CloudPodProvider::new(api);
        if let Some(image) = settings.default_docker_image {
            pod = pod.with_default_image(image);
        }
        if let Some(gb) = settings.default_volume_gb {
            pod = pod.with_default_volume_gb(gb);
        }

        Self { local: Arc::new(local), pod: Arc::new(pod) }
    }

    /// The provider handling the given backend family.
    #[must_use]
    pub fn for_target(&self, target: ProviderTarget) -> Arc<dyn DeploymentProvider> {
        match target {
            ProviderTarget::Local => self.local.clone(),
            ProviderTarget::CloudPod => self.pod.clone(),
        }
    }

    /// Direct access to the local backend for the lifecycle operations
    /// only it supports (pause, resume, force-start).
    #[must_use]
    pub fn local(&self) -> &LocalAgentProvider {
        &self.local
    }
}
