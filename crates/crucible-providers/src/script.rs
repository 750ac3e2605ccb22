//! Bootstrap script rendering for cloud pods.
//!
//! The script is a generated text artifact: the pod boots, installs the
//! trainer, materializes the dataset and the normalized config, runs the
//! trainer, then idles for a grace window so artifacts can be pulled
//! before the instance shuts itself down.

use std::fmt::Write;

use crucible_abstraction::{DatasetRef, DeployError, DeployResult, DeploymentRequest};

/// Seconds the pod stays alive after training for artifact retrieval.
pub const ARTIFACT_GRACE_SECONDS: u32 = 300;

const WORKSPACE: &str = "/workspace";

/// Renders the complete bootstrap script for one deployment request.
///
/// # Errors
///
/// Returns a serialization error when the normalized payload cannot be
/// encoded as JSON (practically impossible for well-formed payloads).
pub fn render_bootstrap_script(request: &DeploymentRequest) -> DeployResult<String> {
    let config_json = serde_json::to_string_pretty(&request.payload)
        .map_err(|e| DeployError::Serialization(e.to_string()))?;

    let mut script = String::new();
    let _ = writeln!(script, "#!/bin/bash");
    let _ = writeln!(script, "set -euo pipefail");
    let _ = writeln!(script);
    let _ = writeln!(script, "mkdir -p {WORKSPACE}/data {WORKSPACE}/output {WORKSPACE}/logs");
    let _ = writeln!(script);
    let _ = writeln!(script, "# Runtime dependencies");
    let _ = writeln!(
        script,
        "pip install --quiet --upgrade torch transformers peft datasets accelerate bitsandbytes"
    );
    let _ = writeln!(script);

    let _ = writeln!(script, "# Dataset");
    let dataset_path = format!("{WORKSPACE}/data/dataset.jsonl");
    match &request.dataset {
        DatasetRef::Path(source) => {
            let _ = writeln!(script, "curl -fsSL '{source}' -o {dataset_path}");
        }
        DatasetRef::Inline(content) => {
            let _ = writeln!(script, "cat <<'CRUCIBLE_DATASET_EOF' > {dataset_path}");
            let _ = writeln!(script, "{content}");
            let _ = writeln!(script, "CRUCIBLE_DATASET_EOF");
        }
    }
    let _ = writeln!(script);

    let _ = writeln!(script, "# Normalized training config");
    let _ = writeln!(script, "cat <<'CRUCIBLE_CONFIG_EOF' > {WORKSPACE}/config.json");
    let _ = writeln!(script, "{config_json}");
    let _ = writeln!(script, "CRUCIBLE_CONFIG_EOF");
    let _ = writeln!(script);

    let _ = writeln!(script, "export CRUCIBLE_JOB_ID='{}'", request.job_id);
    if let Some(token) = &request.auth_token {
        let _ = writeln!(script, "export CRUCIBLE_AUTH_TOKEN='{token}'");
    }
    let _ = writeln!(script);

    let _ = writeln!(script, "python -m crucible_trainer \\");
    let _ = writeln!(script, "  --config {WORKSPACE}/config.json \\");
    let _ = writeln!(script, "  --dataset {dataset_path} \\");
    let _ = writeln!(script, "  --output {WORKSPACE}/output \\");
    let _ = writeln!(script, "  --job-id '{}' 2>&1 | tee {WORKSPACE}/logs/train.log", request.job_id);
    let _ = writeln!(script);

    let _ = writeln!(script, "# Grace window for artifact retrieval, then self-terminate");
    let _ = writeln!(script, "sleep {ARTIFACT_GRACE_SECONDS}");
    let _ = writeln!(script, "shutdown -h now");

    Ok(script)
}
