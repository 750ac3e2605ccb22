//! Submit command implementation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use crucible_abstraction::{DatasetRef, DeployOptions, ProviderTarget};
use crucible_core::{JobSubmission, OrchestratorConfig};
use crucible_training::{BudgetLimits, TrainingConfig};
use serde_json::json;

use super::{open_manager, paint_state};

/// Arguments for the submit command.
#[derive(Debug)]
pub struct SubmitArgs {
    pub config_file: PathBuf,
    pub dataset: Option<PathBuf>,
    pub inline_dataset: Option<String>,
    pub target: String,
    pub endpoint: Option<String>,
    pub gpu: Option<String>,
    pub gpu_count: Option<u32>,
    pub docker_image: Option<String>,
    pub volume_gb: Option<u32>,
    pub max_cost: Option<f64>,
    pub max_hours: Option<f64>,
    pub env: Vec<String>,
    pub queue: bool,
    pub dataset_size: Option<usize>,
    pub json: bool,
}

pub async fn execute(config: &OrchestratorConfig, args: SubmitArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.config_file).with_context(|| {
        format!("Failed to read training config: {}", args.config_file.display())
    })?;
    let training: TrainingConfig = toml::from_str(&contents).with_context(|| {
        format!("Failed to parse training config: {}", args.config_file.display())
    })?;

    let dataset = dataset_ref(args.dataset.as_deref(), args.inline_dataset)?;
    let options = DeployOptions {
        target: parse_target(&args.target)?,
        endpoint: args.endpoint,
        gpu_type: args.gpu,
        gpu_count: args.gpu_count,
        docker_image: args.docker_image,
        volume_gb: args.volume_gb,
        max_cost_usd: args.max_cost,
        env: parse_env(&args.env)?,
    };

    let mut submission = JobSubmission::new(training, dataset);
    submission.options = options;
    submission.dataset_size = args.dataset_size;
    submission.queue_only = args.queue;
    if args.max_hours.is_some() || args.max_cost.is_some() {
        submission.budget = Some(BudgetLimits {
            max_hours: args.max_hours,
            max_cost_usd: args.max_cost,
            ..BudgetLimits::default()
        });
    }

    let manager = open_manager(config).await?;
    let outcome = manager.submit(submission).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "job_id": outcome.job_id,
            "state": outcome.state.as_str(),
            "queue_position": outcome.queue_position,
            "estimate": outcome.estimate,
            "budget": outcome.budget,
        }))?);
        return Ok(());
    }

    println!();
    println!("{}", "Job submitted".bold().green());
    println!("  Job: {}", outcome.job_id.cyan());
    println!("  State: {}", paint_state(outcome.state));
    if let Some(position) = outcome.queue_position {
        println!("  Queue position: {position}");
    }
    print!(
        "  Estimated: {}",
        format!("{}h {:02}m", outcome.estimate.hours, outcome.estimate.minutes).bold()
    );
    if let Some(cost) = outcome.estimate.estimated_cost_usd {
        print!(" / {}", format!("${cost:.2}").bold());
    }
    println!(" on {}", outcome.estimate.gpu);
    if let Some(report) = &outcome.budget {
        for message in &report.messages {
            println!("  {} {}", "!".yellow().bold(), message.yellow());
        }
    }
    for warning in &outcome.estimate.warnings {
        println!("  {} {}", "!".yellow().bold(), warning.yellow());
    }
    println!();
    println!("  Watch it: {}", format!("crucible status {}", outcome.job_id).dimmed());
    println!();
    Ok(())
}

fn parse_target(target: &str) -> Result<ProviderTarget> {
    match target {
        "local" => Ok(ProviderTarget::Local),
        "pod" => Ok(ProviderTarget::CloudPod),
        other => anyhow::bail!("Unknown target '{other}'. Supported: local, pod"),
    }
}

fn parse_env(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            anyhow::bail!("Invalid --env '{pair}': expected KEY=VALUE");
        };
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

fn dataset_ref(dataset: Option<&std::path::Path>, inline: Option<String>) -> Result<DatasetRef> {
    if let Some(path) = dataset {
        return Ok(DatasetRef::Path(path.display().to_string()));
    }
    if let Some(content) = inline {
        return Ok(DatasetRef::Inline(content));
    }
    anyhow::bail!("Provide --dataset <path> or --inline-dataset <jsonl>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_parse_target_known_values() {
        assert_eq!(parse_target("local").unwrap(), ProviderTarget::Local);
        assert_eq!(parse_target("pod").unwrap(), ProviderTarget::CloudPod);
        assert!(parse_target("kubernetes").is_err());
    }

    #[test]
    fn test_parse_env_pairs() {
        let env = parse_env(&["A=1".to_string(), "B=two=parts".to_string()]).unwrap();
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        // only the first '=' splits
        assert_eq!(env.get("B").map(String::as_str), Some("two=parts"));
        assert!(parse_env(&["NOVALUE".to_string()]).is_err());
    }

    #[test]
    fn test_dataset_ref_prefers_path() {
        let dataset = dataset_ref(Some(Path::new("/data/t.jsonl")), None).unwrap();
        assert_eq!(dataset, DatasetRef::Path("/data/t.jsonl".to_string()));

        let inline = dataset_ref(None, Some("{\"text\":\"hi\"}".to_string())).unwrap();
        assert!(inline.is_inline());

        assert!(dataset_ref(None, None).is_err());
    }
}
