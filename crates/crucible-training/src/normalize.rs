//! Config translation into the backend-ready payload.

use crucible_abstraction::{
    LoraSection, NormalizedPayload, TrainingSection, DEFAULT_LORA_DROPOUT,
    DEFAULT_TRAINING_METHOD,
};

use crate::config::{TrainingBlock, TrainingConfig};

/// Translates a caller configuration into the normalized payload providers
/// consume.
///
/// Pure function, no I/O; the input is never mutated. Rules, in order:
///
/// 1. `training.method` defaults to `"sft"` when absent.
/// 2. Legacy flat adapter fields are promoted into a structured `lora`
///    block, but only when both rank and alpha resolve to nonzero values;
///    dropout falls back to 0.05. A structured block already present on
///    the input wins over the legacy fields. The legacy keys themselves do
///    not exist on [`NormalizedPayload`], so they are gone either way.
/// 3. Optional top-level blocks (tokenizer, quantization, tracking, tools,
///    evaluation, telemetry, seed) pass through only when present;
///    omission is preserved.
///
/// Normalization is idempotent: re-normalizing an already-normalized
/// configuration produces an identical payload.
#[must_use]
pub fn normalize(config: &TrainingConfig) -> NormalizedPayload {
    let training = &config.training;

    let method =
        training.method.clone().unwrap_or_else(|| DEFAULT_TRAINING_METHOD.to_string());

    let lora = config.lora.clone().or_else(|| promote_legacy_lora(training));

    NormalizedPayload {
        model: config.model.clone(),
        tokenizer: config.tokenizer.clone(),
        data: config.data.clone(),
        training: TrainingSection {
            method,
            num_epochs: training.num_epochs,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            scheduler: training.scheduler.clone(),
            gradient_accumulation_steps: training.gradient_accumulation_steps,
            max_seq_length: training.max_seq_length,
            gradient_checkpointing: training.gradient_checkpointing,
            warmup_ratio: training.warmup_ratio,
        },
        lora,
        quantization: config.quantization.clone(),
        tracking: config.tracking.clone(),
        tools: config.tools.clone(),
        evaluation: config.evaluation.clone(),
        telemetry: config.telemetry.clone(),
        seed: config.seed,
    }
}

/// Builds a structured adapter block from the legacy flat fields, if both
/// rank and alpha are present and nonzero.
fn promote_legacy_lora(training: &TrainingBlock) -> Option<LoraSection> {
    if !training.has_legacy_lora_fields() {
        return None;
    }
    match (training.lora_r, training.lora_alpha) {
        (Some(r), Some(alpha)) if r > 0 && alpha > 0.0 => Some(LoraSection {
            r,
            alpha,
            dropout: training.lora_dropout.unwrap_or(DEFAULT_LORA_DROPOUT),
            target_modules: None,
            bias: None,
        }),
        _ => None,
    }
}

/// Lossless embedding of a normalized payload back into the configuration
/// schema. The result carries no legacy fields, so normalizing it again
/// reproduces the payload exactly.
impl From<NormalizedPayload> for TrainingConfig {
    fn from(payload: NormalizedPayload) -> Self {
        let training = payload.training;
        Self {
            model: payload.model,
            tokenizer: payload.tokenizer,
            data: payload.data,
            training: TrainingBlock {
                method: Some(training.method),
                num_epochs: training.num_epochs,
                batch_size: training.batch_size,
                learning_rate: training.learning_rate,
                scheduler: training.scheduler,
                gradient_accumulation_steps: training.gradient_accumulation_steps,
                max_seq_length: training.max_seq_length,
                gradient_checkpointing: training.gradient_checkpointing,
                warmup_ratio: training.warmup_ratio,
                use_lora: None,
                lora_r: None,
                lora_alpha: None,
                lora_dropout: None,
            },
            lora: payload.lora,
            quantization: payload.quantization,
            tracking: payload.tracking,
            tools: payload.tools,
            evaluation: payload.evaluation,
            telemetry: payload.telemetry,
            seed: payload.seed,
        }
    }
}
