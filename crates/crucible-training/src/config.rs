//! The provider-agnostic training configuration.

use crucible_abstraction::{
    DataSection, LoraSection, ModelSection, QuantizationSection, TokenizerSection,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TrainingError, TrainingResult};

/// Hyperparameters as callers write them.
///
/// Unlike the normalized [`TrainingSection`](crucible_abstraction::TrainingSection),
/// this block still accepts the legacy flat adapter fields (`use_lora`,
/// `lora_r`, `lora_alpha`, `lora_dropout`); [`normalize`](crate::normalize)
/// promotes them into the structured `lora` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBlock {
    /// Training method; defaults to `"sft"` during normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_accumulation_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seq_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_checkpointing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_ratio: Option<f64>,
    /// Legacy flat adapter toggle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_lora: Option<bool>,
    /// Legacy flat adapter rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_r: Option<u32>,
    /// Legacy flat adapter scaling factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_alpha: Option<f64>,
    /// Legacy flat adapter dropout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_dropout: Option<f64>,
}

fn default_num_epochs() -> u32 {
    3
}

fn default_batch_size() -> u32 {
    4
}

fn default_learning_rate() -> f64 {
    2e-4
}

impl Default for TrainingBlock {
    fn default() -> Self {
        Self {
            method: None,
            num_epochs: default_num_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            scheduler: None,
            gradient_accumulation_steps: None,
            max_seq_length: None,
            gradient_checkpointing: None,
            warmup_ratio: None,
            use_lora: None,
            lora_r: None,
            lora_alpha: None,
            lora_dropout: None,
        }
    }
}

impl TrainingBlock {
    /// Whether any of the legacy flat adapter fields is set.
    #[must_use]
    pub const fn has_legacy_lora_fields(&self) -> bool {
        self.use_lora.is_some()
            || self.lora_r.is_some()
            || self.lora_alpha.is_some()
            || self.lora_dropout.is_some()
    }
}

/// A complete training request as submitted by a caller.
///
/// Immutable once submitted: normalization and estimation take `&self` and
/// build new values, the original is never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model: ModelSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerSection>,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub training: TrainingBlock,
    /// Structured adapter block; wins over the legacy flat fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora: Option<LoraSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl TrainingConfig {
    /// Creates a configuration for the given model with default
    /// hyperparameters.
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model: ModelSection::new(model_name),
            tokenizer: None,
            data: DataSection::default(),
            training: TrainingBlock::default(),
            lora: None,
            quantization: None,
            tracking: None,
            tools: None,
            evaluation: None,
            telemetry: None,
            seed: None,
        }
    }

    /// Batch size actually seen by the optimizer: per-device batch size
    /// times gradient accumulation steps (accumulation defaults to 1).
    #[must_use]
    pub fn effective_batch_size(&self) -> u32 {
        let accumulation = self.training.gradient_accumulation_steps.unwrap_or(1).max(1);
        self.training.batch_size * accumulation
    }

    /// Whether this configuration trains adapters, via either the
    /// structured block or the legacy toggle.
    #[must_use]
    pub fn lora_enabled(&self) -> bool {
        self.lora.is_some() || self.training.use_lora == Some(true)
    }

    /// Validates the configuration before submission.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] when a hyperparameter is
    /// out of range or an enabled adapter block is missing its rank or
    /// scaling factor.
    pub fn validate(&self) -> TrainingResult<()> {
        if self.model.name.trim().is_empty() {
            return Err(TrainingError::InvalidConfig("model.name must not be empty".to_string()));
        }
        if self.training.batch_size < 1 {
            return Err(TrainingError::InvalidConfig("batch_size must be >= 1".to_string()));
        }
        if self.training.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidConfig("learning_rate must be > 0".to_string()));
        }
        if self.training.num_epochs < 1 {
            return Err(TrainingError::InvalidConfig("num_epochs must be >= 1".to_string()));
        }
        if let Some(split) = self.data.train_split {
            if !(0.0..=1.0).contains(&split) || split == 0.0 {
                return Err(TrainingError::InvalidConfig(
                    "data.train_split must be in (0, 1]".to_string(),
                ));
            }
        }
        if let Some(lora) = &self.lora {
            if lora.r < 1 {
                return Err(TrainingError::InvalidConfig("lora.r must be >= 1".to_string()));
            }
            if lora.alpha <= 0.0 {
                return Err(TrainingError::InvalidConfig("lora.alpha must be > 0".to_string()));
            }
        } else if self.training.use_lora == Some(true) {
            let r = self.training.lora_r;
            let alpha = self.training.lora_alpha;
            if r.is_none() || alpha.is_none() {
                return Err(TrainingError::InvalidConfig(
                    "adapter training requires lora_r and lora_alpha".to_string(),
                ));
            }
        }
        Ok(())
    }
}
