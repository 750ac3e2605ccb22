//! Backend-ready training payload.
//!
//! [`NormalizedPayload`] is the wire form every provider consumes. It is
//! produced by the config translator in `crucible-training`; the flat
//! legacy adapter fields accepted on input (`use_lora`, `lora_r`, ...) are
//! not representable here, so a payload can never carry both a structured
//! `lora` block and their legacy equivalents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Training method used when a configuration does not name one.
pub const DEFAULT_TRAINING_METHOD: &str = "sft";

/// Adapter dropout applied when legacy fields omit it.
pub const DEFAULT_LORA_DROPOUT: f64 = 0.05;

/// Identity of the base model to fine-tune.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Model name, e.g. `"mistral-7b-instruct"`. Also drives the
    /// parameter-count heuristics in the estimation engine.
    pub name: String,
    /// Optional upstream base model when `name` refers to a derivative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
}

impl ModelSection {
    /// Creates a model section for the given model name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), base_model: None }
    }
}

/// Tokenizer overrides. Every field is optional; an absent section means
/// the backend derives tokenizer settings from the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenizerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_side: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_eos_token: Option<bool>,
}

/// Hyperparameters in their normalized form.
///
/// `method` is always present here (the translator defaults it), and the
/// legacy flat adapter fields have already been promoted into
/// [`LoraSection`] or dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSection {
    /// Training method, e.g. `"sft"` or `"dpo"`.
    pub method: String,
    pub num_epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_accumulation_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_seq_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradient_checkpointing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_ratio: Option<f64>,
}

/// Structured low-rank-adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSection {
    /// Adapter rank.
    pub r: u32,
    /// Scaling factor.
    pub alpha: f64,
    /// Dropout probability applied to adapter layers.
    #[serde(default = "default_lora_dropout")]
    pub dropout: f64,
    /// Module names to attach adapters to; backend default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_modules: Option<Vec<String>>,
    /// Bias training policy (`"none"`, `"all"`, `"lora_only"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bias: Option<String>,
}

fn default_lora_dropout() -> f64 {
    DEFAULT_LORA_DROPOUT
}

impl LoraSection {
    /// Creates an adapter block with the default dropout and no module or
    /// bias overrides.
    #[must_use]
    pub fn new(r: u32, alpha: f64) -> Self {
        Self { r, alpha, dropout: DEFAULT_LORA_DROPOUT, target_modules: None, bias: None }
    }
}

/// Weight-quantization settings for loading the base model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantizationSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_in_4bit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_in_8bit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute_dtype: Option<String>,
}

/// Dataset handling settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSection {
    /// Dataset format tag, e.g. `"alpaca"` or `"sharegpt"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Fraction of samples used for training (rest held out).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_split: Option<f64>,
    /// Cap on the number of samples drawn from the dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_samples: Option<usize>,
}

/// The complete backend-ready payload handed to a deployment provider.
///
/// Optional blocks that were absent on the input configuration stay absent
/// here: omission is meaningful to backends and is never defaulted to an
/// empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPayload {
    pub model: ModelSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerSection>,
    pub data: DataSection,
    pub training: TrainingSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora: Option<LoraSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantization: Option<QuantizationSection>,
    /// Prediction-tracking settings, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Value>,
    /// Tool definitions, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    /// Evaluation settings, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Value>,
    /// Telemetry settings, passed through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
    /// Random seed for reproducible runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl NormalizedPayload {
    /// Whether this payload trains adapters rather than all weights.
    #[must_use]
    pub const fn uses_lora(&self) -> bool {
        self.lora.is_some()
    }

    /// The model name this payload targets.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_payload() -> NormalizedPayload {
        NormalizedPayload {
            model: ModelSection::new("mistral-7b"),
            tokenizer: None,
            data: DataSection::default(),
            training: TrainingSection {
                method: DEFAULT_TRAINING_METHOD.to_string(),
                num_epochs: 3,
                batch_size: 4,
                learning_rate: 2e-4,
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
    fn test_absent_blocks_are_omitted_from_json() {
        let payload = minimal_payload();
        let json = serde_json::to_value(&payload).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("lora"));
        assert!(!obj.contains_key("tokenizer"));
        assert!(!obj.contains_key("tracking"));
        assert!(!obj.contains_key("seed"));
    }

    #[test]
    fn test_lora_dropout_defaults_on_deserialize() {
        let lora: LoraSection = serde_json::from_str(r#"{"r": 16, "alpha": 32.0}"#).unwrap();
        assert_eq!(lora.r, 16);
        assert!((lora.dropout - DEFAULT_LORA_DROPOUT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_payload_round_trips_through_json() {
        let mut payload = minimal_payload();
        payload.lora = Some(LoraSection::new(16, 32.0));
        payload.seed = Some(42);
        let json = serde_json::to_string(&payload).unwrap();
        let back: NormalizedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
        assert!(back.uses_lora());
    }
}
