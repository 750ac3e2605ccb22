//! Time, cost, and VRAM-feasibility estimation.

use serde::Serialize;

use crate::benchmarks::{classify_model, lookup_benchmark, GpuBenchmark};
use crate::config::TrainingConfig;

/// Multiplier applied to raw compute time to cover I/O, logging, and
/// checkpoint writes.
pub const OVERHEAD_MULTIPLIER: f64 = 1.3;

/// Samples assumed when neither the caller nor the config caps the
/// dataset.
pub const DEFAULT_SAMPLE_COUNT: usize = 1_000;

/// Fraction of VRAM treated as usable; the rest is the safety margin.
pub const VRAM_SAFETY_MARGIN: f64 = 0.9;

/// Sequence length assumed when the config does not set one.
const DEFAULT_MAX_SEQ_LENGTH: u32 = 2048;

/// Full fine-tuning footprint per billion parameters (weights, gradients,
/// optimizer state), in GB.
const FULL_FINETUNE_GB_PER_BILLION: f64 = 8.0;

/// Adapter training needs roughly a quarter of the full footprint.
const LORA_FOOTPRINT_FACTOR: f64 = 0.25;

/// Activation memory per sample in the batch, in GB.
const ACTIVATION_GB_PER_SAMPLE: f64 = 0.5;

/// Advisory settings patch emitted alongside an infeasible estimate.
///
/// Never applied automatically; callers decide whether to adopt it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendedSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_accumulation_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_lora: Option<bool>,
}

impl RecommendedSettings {
    const fn is_empty(&self) -> bool {
        self.batch_size.is_none()
            && self.gradient_accumulation_steps.is_none()
            && self.use_lora.is_none()
    }
}

/// The estimation report for one configuration on one GPU.
///
/// Purely computed; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEstimation {
    /// Human-readable GPU name the estimate was computed against.
    pub gpu: String,
    /// Model size tier label, e.g. `"3-7B"`.
    pub model_tier: String,
    pub total_tokens: u64,
    pub effective_batch_size: u32,
    pub total_steps: u64,
    /// Compute seconds before overhead.
    pub raw_seconds: f64,
    /// Wall-clock seconds including the overhead multiplier.
    pub estimated_seconds: f64,
    /// Whole hours of the wall-clock estimate.
    pub hours: u64,
    /// Remaining minutes of the wall-clock estimate.
    pub minutes: u64,
    /// Rental cost over the estimated duration, when the GPU has a rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
    pub gpu_utilization_percent: u8,
    /// Whether the job fits in VRAM with the safety margin applied.
    pub feasible: bool,
    pub required_vram_gb: f64,
    /// VRAM usable after the safety margin.
    pub usable_vram_gb: f64,
    pub warnings: Vec<String>,
    /// Ordered remediation suggestions when the job does not fit.
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_settings: Option<RecommendedSettings>,
}

impl TimeEstimation {
    /// Wall-clock estimate in fractional hours.
    #[must_use]
    pub fn fractional_hours(&self) -> f64 {
        self.estimated_seconds / 3600.0
    }
}

/// Estimates time, cost, and feasibility for a configuration on the GPU
/// named by `gpu_key` (unknown keys fall back to the default benchmark).
#[must_use]
pub fn estimate(
    config: &TrainingConfig,
    gpu_key: &str,
    dataset_size: Option<usize>,
) -> TimeEstimation {
    estimate_with_benchmark(config, lookup_benchmark(gpu_key), dataset_size)
}

/// Estimates against an explicit benchmark entry.
#[must_use]
pub fn estimate_with_benchmark(
    config: &TrainingConfig,
    gpu: &GpuBenchmark,
    dataset_size: Option<usize>,
) -> TimeEstimation {
    let tier = classify_model(&config.model.name);
    let tokens_per_sec = tier.throughput_on(gpu);

    let samples = dataset_size.or(config.data.max_samples).unwrap_or(DEFAULT_SAMPLE_COUNT);
    let seq_length = config.training.max_seq_length.unwrap_or(DEFAULT_MAX_SEQ_LENGTH);
    let epochs = config.training.num_epochs;
    let batch_size = config.training.batch_size;
    let effective_batch = config.effective_batch_size().max(1);

    let total_tokens = samples as u64 * u64::from(seq_length) * u64::from(epochs);
    let total_steps = (samples as u64).div_ceil(u64::from(effective_batch)) * u64::from(epochs);

    let mut warnings = Vec::new();

    let (raw_seconds, estimated_seconds) = if tokens_per_sec > 0.0 {
        let raw = total_tokens as f64 / tokens_per_sec;
        (raw, raw * OVERHEAD_MULTIPLIER)
    } else {
        warnings.push(format!(
            "{} cannot fine-tune {} models at usable speed; pick a larger GPU",
            gpu.name,
            tier.describe()
        ));
        (0.0, 0.0)
    };

    let hours = (estimated_seconds / 3600.0) as u64;
    let minutes = ((estimated_seconds - hours as f64 * 3600.0) / 60.0) as u64;

    let use_lora = config.lora_enabled();
    let params_billions = tier.param_estimate_billions();
    let required_vram_gb = required_vram(params_billions, use_lora, batch_size);
    let usable_vram_gb = gpu.vram_gb * VRAM_SAFETY_MARGIN;
    let feasible = required_vram_gb <= usable_vram_gb;

    let mut recommendations = Vec::new();
    let mut recommended_settings = RecommendedSettings::default();
    if !feasible {
        warnings.push(format!(
            "estimated {required_vram_gb:.1}GB VRAM needed but only {usable_vram_gb:.1}GB usable on {}",
            gpu.name
        ));
        if !use_lora {
            recommendations
                .push("enable LoRA adapters to cut memory to roughly a quarter".to_string());
            recommended_settings.use_lora = Some(true);
        }
        if batch_size > 1 {
            recommendations.push(format!(
                "halve batch_size to {} and double gradient accumulation to keep the effective batch",
                batch_size / 2
            ));
            recommended_settings.batch_size = Some(batch_size / 2);
            recommended_settings.gradient_accumulation_steps =
                Some(config.training.gradient_accumulation_steps.unwrap_or(1) * 2);
        }
        if config.training.gradient_checkpointing != Some(true) {
            recommendations.push("enable gradient checkpointing".to_string());
        }
        recommendations.push("use a smaller model or a GPU with more VRAM".to_string());
    }

    let mut utilization: i32 = 85;
    if batch_size == 1 {
        utilization -= 20;
        warnings.push(
            "batch_size 1 underutilizes the GPU; raise it or add gradient accumulation"
                .to_string(),
        );
    }
    if config.training.gradient_accumulation_steps.unwrap_or(1) > 1 {
        utilization += 5;
    }

    let estimated_cost_usd = gpu.hourly_usd.map(|rate| rate * estimated_seconds / 3600.0);

    TimeEstimation {
        gpu: gpu.name.to_string(),
        model_tier: tier.describe().to_string(),
        total_tokens,
        effective_batch_size: effective_batch,
        total_steps,
        raw_seconds,
        estimated_seconds,
        hours,
        minutes,
        estimated_cost_usd,
        gpu_utilization_percent: utilization.clamp(0, 100) as u8,
        feasible,
        required_vram_gb,
        usable_vram_gb,
        warnings,
        recommendations,
        recommended_settings: if recommended_settings.is_empty() {
            None
        } else {
            Some(recommended_settings)
        },
    }
}

/// Memory needed to fine-tune `params_billions` at the given batch size.
fn required_vram(params_billions: f64, use_lora: bool, batch_size: u32) -> f64 {
    let weights = params_billions * FULL_FINETUNE_GB_PER_BILLION;
    let footprint = if use_lora { weights * LORA_FOOTPRINT_FACTOR } else { weights };
    footprint + f64::from(batch_size) * ACTIVATION_GB_PER_SAMPLE
}
