//! Estimate command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use crucible_core::OrchestratorConfig;
use crucible_training::{
    check_budget, estimate, BudgetLimits, BudgetReport, BudgetVerdict, TimeEstimation,
    TrainingConfig,
};
use serde_json::json;

/// Arguments for the estimate command.
#[derive(Debug)]
pub struct EstimateArgs {
    pub config_file: Option<PathBuf>,
    pub model: Option<String>,
    pub gpu: Option<String>,
    pub dataset_size: Option<usize>,
    pub max_hours: Option<f64>,
    pub max_cost: Option<f64>,
    pub json: bool,
}

pub async fn execute(config: &OrchestratorConfig, args: EstimateArgs) -> Result<()> {
    let training = load_training_config(args.config_file.as_deref(), args.model.as_deref())?;
    training.validate().context("Invalid training configuration")?;

    let gpu_key = args.gpu.as_deref().unwrap_or(&config.default_gpu);
    let est = estimate(&training, gpu_key, args.dataset_size);

    let budget = budget_limits(args.max_hours, args.max_cost).map(|limits| check_budget(&est, &limits));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "estimate": est,
            "budget": budget,
        }))?);
        return Ok(());
    }

    print_estimate(&training.model.name, &est);
    if let Some(report) = &budget {
        print_budget(report);
    }
    println!();
    Ok(())
}

fn load_training_config(
    config_file: Option<&Path>,
    model: Option<&str>,
) -> Result<TrainingConfig> {
    if let Some(path) = config_file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config: {}", path.display()))?;
        return toml::from_str(&contents)
            .with_context(|| format!("Failed to parse training config: {}", path.display()));
    }
    if let Some(model) = model {
        return Ok(TrainingConfig::new(model));
    }
    anyhow::bail!("Provide a training config file or --model <name>")
}

fn budget_limits(max_hours: Option<f64>, max_cost: Option<f64>) -> Option<BudgetLimits> {
    if max_hours.is_none() && max_cost.is_none() {
        return None;
    }
    Some(BudgetLimits { max_hours, max_cost_usd: max_cost, ..BudgetLimits::default() })
}

fn print_estimate(model_name: &str, est: &TimeEstimation) {
    println!();
    println!("{}", "Training Estimate".bold().cyan());
    println!();
    println!("  Model: {} ({} tier)", model_name.cyan(), est.model_tier);
    println!("  GPU: {}", est.gpu.cyan());
    println!(
        "  Tokens: {} across {} steps (effective batch size {})",
        est.total_tokens, est.total_steps, est.effective_batch_size
    );
    println!("  Duration: {}", format!("{}h {:02}m", est.hours, est.minutes).bold());
    match est.estimated_cost_usd {
        Some(cost) => println!("  Cost: {}", format!("${cost:.2}").bold()),
        None => println!("  Cost: {}", "no hourly rate for this GPU".dimmed()),
    }
    println!("  GPU utilization: {}%", est.gpu_utilization_percent);
    println!(
        "  VRAM: {:.1} GB required, {:.1} GB usable",
        est.required_vram_gb, est.usable_vram_gb
    );

    if est.feasible {
        println!("  Feasibility: {}", "fits".green());
    } else {
        println!("  Feasibility: {}", "will not fit on this GPU".red().bold());
    }

    for warning in &est.warnings {
        println!("  {} {}", "!".yellow().bold(), warning.yellow());
    }
    for recommendation in &est.recommendations {
        println!("  {} {}", "-".dimmed(), recommendation.dimmed());
    }
    if let Some(patch) = &est.recommended_settings {
        println!();
        println!("  {}", "Suggested settings (not applied):".bold());
        if let Some(batch_size) = patch.batch_size {
            println!("    batch_size = {batch_size}");
        }
        if let Some(steps) = patch.gradient_accumulation_steps {
            println!("    gradient_accumulation_steps = {steps}");
        }
        if let Some(use_lora) = patch.use_lora {
            println!("    use_lora = {use_lora}");
        }
    }
}

fn print_budget(report: &BudgetReport) {
    println!();
    match report.verdict {
        BudgetVerdict::Clear => println!("  Budget: {}", "within limits".green()),
        BudgetVerdict::Warned => println!("  Budget: {}", "close to limits".yellow().bold()),
        BudgetVerdict::Exceeded => println!("  Budget: {}", "exceeded".red().bold()),
    }
    for message in &report.messages {
        println!("    {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_training_config_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[model]\nname = \"mistral-7b\"\n\n[training]\nnum_epochs = 5\nbatch_size = 2"
        )
        .unwrap();

        let config = load_training_config(Some(file.path()), None).unwrap();
        assert_eq!(config.model.name, "mistral-7b");
        assert_eq!(config.training.num_epochs, 5);
        assert_eq!(config.training.batch_size, 2);
    }

    #[test]
    fn test_model_flag_builds_default_config() {
        let config = load_training_config(None, Some("llama-3b")).unwrap();
        assert_eq!(config.model.name, "llama-3b");
        assert_eq!(config.training.num_epochs, 3);
    }

    #[test]
    fn test_missing_both_sources_is_an_error() {
        assert!(load_training_config(None, None).is_err());
    }

    #[test]
    fn test_budget_limits_built_only_when_a_ceiling_is_set() {
        assert!(budget_limits(None, None).is_none());
        let limits = budget_limits(Some(4.0), None).unwrap();
        assert_eq!(limits.max_hours, Some(4.0));
        assert!(limits.max_cost_usd.is_none());
    }
}
