//! Deployment requests and provider-specific options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::payload::NormalizedPayload;

/// Reference to the training dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetRef {
    /// A path the backend can read directly.
    Path(String),
    /// Inline dataset content carried in the request body.
    Inline(String),
}

impl DatasetRef {
    /// Whether the dataset travels inline with the request.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self, Self::Inline(_))
    }

    /// Short description for logs, without leaking inline content.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => format!("path:{path}"),
            Self::Inline(content) => format!("inline:{}B", content.len()),
        }
    }
}

/// Which backend family should run the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTarget {
    /// Local trainer agent (HTTP) or co-located subprocess.
    #[default]
    Local,
    /// Ephemeral GPU pod provisioned through the cloud vendor API.
    CloudPod,
}

/// Provider-specific knobs attached to a deployment request.
///
/// All fields are optional; the orchestrator config supplies defaults for
/// whichever backend ends up selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployOptions {
    /// Backend family to dispatch to.
    #[serde(default)]
    pub target: ProviderTarget,
    /// Explicit agent endpoint. A non-loopback value switches the local
    /// backend into its poll-registration path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Internal GPU key, e.g. `"a100-80gb"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    /// Persistent volume size for pod backends, in GB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_gb: Option<u32>,
    /// Hard ceiling on spend for this job, in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
    /// Extra environment variables for the trainer process. Ordered so
    /// rendered bootstrap scripts are deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Everything a provider needs to launch one training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Orchestrator-side execution identifier.
    pub job_id: String,
    /// Backend-ready configuration.
    pub payload: NormalizedPayload,
    /// Dataset to train on.
    pub dataset: DatasetRef,
    /// Per-job token the trainer uses to authenticate metric callbacks.
    /// Generated by the lifecycle manager at dispatch time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Provider-specific options.
    #[serde(default)]
    pub options: DeployOptions,
}

impl DeploymentRequest {
    /// Creates a request with default options and no auth token.
    #[must_use]
    pub fn new(job_id: impl Into<String>, payload: NormalizedPayload, dataset: DatasetRef) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
            dataset,
            auth_token: None,
            options: DeployOptions::default(),
        }
    }

    /// Attaches the metric-callback auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Replaces the provider options.
    #[must_use]
    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    /// The model name this request trains.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.payload.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{DataSection, ModelSection, TrainingSection};

    fn payload() -> NormalizedPayload {
        NormalizedPayload {
            model: ModelSection::new("llama-3b"),
            tokenizer: None,
            data: DataSection::default(),
            training: TrainingSection {
                method: "sft".to_string(),
                num_epochs: 1,
                batch_size: 2,
                learning_rate: 1e-4,
                scheduler: None,
                gradient_accumulation_steps: None,
                max_seq_length: None,
                gradient_checkpointing: None,
                warmup_ratio: None,
            },
            lora: None,
            quantization: None,
            tracking: None,
            tools: None,
            evaluation: None,
            telemetry: None,
            seed: None,
        }
    }

    #[test]
    fn test_dataset_describe_hides_inline_content() {
        let inline = DatasetRef::Inline("secret training rows".to_string());
        assert!(!inline.describe().contains("secret"));
        assert!(inline.is_inline());

        let path = DatasetRef::Path("/data/train.jsonl".to_string());
        assert_eq!(path.describe(), "path:/data/train.jsonl");
    }

    #[test]
    fn test_request_builders() {
        let request =
            DeploymentRequest::new("job-1", payload(), DatasetRef::Path("/d.jsonl".to_string()))
                .with_auth_token("tok-abc")
                .with_options(DeployOptions {
                    target: ProviderTarget::CloudPod,
                    gpu_type: Some("a100-80gb".to_string()),
                    ..DeployOptions::default()
                });
        assert_eq!(request.model_name(), "llama-3b");
        assert_eq!(request.auth_token.as_deref(), Some("tok-abc"));
        assert_eq!(request.options.target, ProviderTarget::CloudPod);
    }

    #[test]
    fn test_default_target_is_local() {
        let options: DeployOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.target, ProviderTarget::Local);
    }
}
