//! Status command implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use crucible_core::{JobRecord, OrchestratorConfig};
use serde_json::json;

use super::{open_manager, paint_state};

pub async fn execute(config: &OrchestratorConfig, job_id: &str, json_output: bool) -> Result<()> {
    let manager = open_manager(config).await?;
    let report = manager.status(job_id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&json!({
            "job": job_json(&report.record),
            "queue_position": report.queue_position,
            "live": report.live,
        }))?);
        return Ok(());
    }

    let record = &report.record;
    println!();
    println!("{}", format!("Job {}", record.id).bold().cyan());
    println!();
    println!("  Model: {}", record.model_name.cyan());
    println!("  Status: {}", paint_state(record.status));
    if let Some(position) = report.queue_position {
        println!("  Queue position: {position}");
    }
    if let Some(provider) = &record.provider {
        match &record.provider_job_id {
            Some(backend_id) => {
                println!("  Provider: {} ({})", provider, backend_id.dimmed());
            }
            None => println!("  Provider: {provider}"),
        }
    }
    println!("  Created: {}", stamp(record.created_at));
    if let Some(started) = record.started_at {
        println!("  Started: {}", stamp(started));
    }
    if let Some(completed) = record.completed_at {
        println!("  Finished: {}", stamp(completed));
    }
    println!("  Attempts: {}", record.attempts);

    if let Some(metrics) = &record.metrics {
        println!();
        println!("  {}", "Progress:".bold());
        if let Some(percent) = metrics.progress_percent {
            println!("    {percent:.1}% complete");
        }
        if let (Some(epoch), Some(step)) = (metrics.epoch, metrics.step) {
            println!("    Epoch {epoch}, step {step}");
        } else if let Some(step) = metrics.step {
            println!("    Step {step}");
        }
        if let Some(loss) = metrics.loss {
            println!("    Loss: {loss:.4}");
        }
        if let Some(lr) = metrics.learning_rate {
            println!("    Learning rate: {lr:.2e}");
        }
        if let Some(throughput) = metrics.throughput {
            println!("    Throughput: {throughput:.0} tok/s");
        }
    }

    if let Some(live) = &report.live {
        println!();
        println!("  {}", "Backend:".bold());
        println!("    State: {}", live.state);
        if let Some(uptime) = live.uptime_seconds {
            println!("    Uptime: {}m {}s", uptime / 60, uptime % 60);
        }
        if let Some(cost) = live.cost_usd {
            println!("    Cost so far: ${cost:.2}");
        }
    }

    if let Some(error) = &record.error {
        println!();
        println!("  Error: {}", error.red());
    }
    if let Some(path) = &record.checkpoint_path {
        println!("  Checkpoint: {}", path.dimmed());
    }
    println!();
    Ok(())
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub(crate) fn job_json(record: &JobRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "model": record.model_name,
        "status": record.status.as_str(),
        "provider": record.provider,
        "provider_job_id": record.provider_job_id,
        "queue_position": record.queue_position,
        "metrics": record.metrics,
        "error": record.error,
        "checkpoint_path": record.checkpoint_path,
        "attempts": record.attempts,
        "created_at": record.created_at.to_rfc3339(),
        "updated_at": record.updated_at.to_rfc3339(),
        "started_at": record.started_at.map(|at| at.to_rfc3339()),
        "completed_at": record.completed_at.map(|at| at.to_rfc3339()),
    })
}
