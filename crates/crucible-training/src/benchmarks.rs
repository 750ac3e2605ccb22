//! Static GPU benchmark tables and model-size classification.

use once_cell::sync::Lazy;
use regex::Regex;

/// GPU key used when a caller names no GPU or names an unknown one.
pub const DEFAULT_GPU_KEY: &str = "rtx-4090";

/// Reference throughput and memory figures for one GPU model.
///
/// Throughput is given at three model-size buckets; a zero figure means
/// models of that bucket are not trainable at usable speed on this card.
/// Consumer cards carry no hourly rate.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuBenchmark {
    /// Internal key, e.g. `"a100-80gb"`.
    pub key: &'static str,
    /// Human-readable name for reports.
    pub name: &'static str,
    /// Tokens/second fine-tuning models up to ~3B parameters.
    pub tokens_per_sec_small: f64,
    /// Tokens/second fine-tuning 3–7B models.
    pub tokens_per_sec_medium: f64,
    /// Tokens/second fine-tuning models above 7B.
    pub tokens_per_sec_large: f64,
    /// Memory capacity in GB.
    pub vram_gb: f64,
    /// Hourly rental rate in USD, when the GPU is a datacenter card.
    pub hourly_usd: Option<f64>,
}

/// Reference benchmark table, ordered roughly by capability.
pub static GPU_BENCHMARKS: &[GpuBenchmark] = &[
    GpuBenchmark {
        key: "t4",
        name: "NVIDIA T4",
        tokens_per_sec_small: 900.0,
        tokens_per_sec_medium: 350.0,
        tokens_per_sec_large: 0.0,
        vram_gb: 16.0,
        hourly_usd: Some(0.35),
    },
    GpuBenchmark {
        key: "l4",
        name: "NVIDIA L4",
        tokens_per_sec_small: 2400.0,
        tokens_per_sec_medium: 950.0,
        tokens_per_sec_large: 0.0,
        vram_gb: 24.0,
        hourly_usd: Some(0.70),
    },
    GpuBenchmark {
        key: "rtx-3090",
        name: "NVIDIA GeForce RTX 3090",
        tokens_per_sec_small: 3400.0,
        tokens_per_sec_medium: 1500.0,
        tokens_per_sec_large: 280.0,
        vram_gb: 24.0,
        hourly_usd: None,
    },
    GpuBenchmark {
        key: "rtx-4090",
        name: "NVIDIA GeForce RTX 4090",
        tokens_per_sec_small: 5200.0,
        tokens_per_sec_medium: 2300.0,
        tokens_per_sec_large: 420.0,
        vram_gb: 24.0,
        hourly_usd: None,
    },
    GpuBenchmark {
        key: "rtx-a5000",
        name: "NVIDIA RTX A5000",
        tokens_per_sec_small: 3000.0,
        tokens_per_sec_medium: 1300.0,
        tokens_per_sec_large: 260.0,
        vram_gb: 24.0,
        hourly_usd: Some(0.44),
    },
    GpuBenchmark {
        key: "a40",
        name: "NVIDIA A40",
        tokens_per_sec_small: 3800.0,
        tokens_per_sec_medium: 1700.0,
        tokens_per_sec_large: 480.0,
        vram_gb: 48.0,
        hourly_usd: Some(0.79),
    },
    GpuBenchmark {
        key: "a100-40gb",
        name: "NVIDIA A100 40GB PCIe",
        tokens_per_sec_small: 6500.0,
        tokens_per_sec_medium: 3000.0,
        tokens_per_sec_large: 820.0,
        vram_gb: 40.0,
        hourly_usd: Some(1.89),
    },
    GpuBenchmark {
        key: "a100-80gb",
        name: "NVIDIA A100 80GB PCIe",
        tokens_per_sec_small: 7000.0,
        tokens_per_sec_medium: 3200.0,
        tokens_per_sec_large: 900.0,
        vram_gb: 80.0,
        hourly_usd: Some(2.49),
    },
    GpuBenchmark {
        key: "h100-80gb",
        name: "NVIDIA H100 80GB PCIe",
        tokens_per_sec_small: 12000.0,
        tokens_per_sec_medium: 5600.0,
        tokens_per_sec_large: 1650.0,
        vram_gb: 80.0,
        hourly_usd: Some(3.99),
    },
];

/// Looks up a benchmark by key, falling back to [`DEFAULT_GPU_KEY`] when
/// the key is unknown. Never fails: estimation must always produce a
/// report.
#[must_use]
pub fn lookup_benchmark(key: &str) -> &'static GpuBenchmark {
    let wanted = key.trim().to_lowercase();
    GPU_BENCHMARKS
        .iter()
        .find(|b| b.key == wanted)
        .or_else(|| GPU_BENCHMARKS.iter().find(|b| b.key == DEFAULT_GPU_KEY))
        .unwrap_or(&GPU_BENCHMARKS[0])
}

/// Model size classes derived from the parameter count in a model name.
///
/// Tiers above [`Medium`](Self::Medium) all draw from the large throughput
/// bucket; the spread still matters for the VRAM estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelSizeTier {
    /// Under 1B parameters.
    SubBillion,
    /// 1–3B.
    Small,
    /// 3–7B. The default tier when a name carries no size.
    Medium,
    /// 7–13B.
    Large,
    /// 13–34B.
    XLarge,
    /// 34–70B.
    XxLarge,
    /// Above 70B.
    Frontier,
}

impl ModelSizeTier {
    /// Classifies a parameter count in billions.
    #[must_use]
    pub fn from_billions(billions: f64) -> Self {
        if billions < 1.0 {
            Self::SubBillion
        } else if billions <= 3.0 {
            Self::Small
        } else if billions <= 7.0 {
            Self::Medium
        } else if billions <= 13.0 {
            Self::Large
        } else if billions <= 34.0 {
            Self::XLarge
        } else if billions <= 70.0 {
            Self::XxLarge
        } else {
            Self::Frontier
        }
    }

    /// Conservative parameter estimate (upper bound of the tier) used for
    /// memory math, in billions.
    #[must_use]
    pub const fn param_estimate_billions(self) -> f64 {
        match self {
            Self::SubBillion => 0.5,
            Self::Small => 3.0,
            Self::Medium => 7.0,
            Self::Large => 13.0,
            Self::XLarge => 34.0,
            Self::XxLarge => 70.0,
            Self::Frontier => 175.0,
        }
    }

    /// Picks this tier's throughput figure from a benchmark entry.
    #[must_use]
    pub const fn throughput_on(self, gpu: &GpuBenchmark) -> f64 {
        match self {
            Self::SubBillion | Self::Small => gpu.tokens_per_sec_small,
            Self::Medium => gpu.tokens_per_sec_medium,
            Self::Large | Self::XLarge | Self::XxLarge | Self::Frontier => {
                gpu.tokens_per_sec_large
            }
        }
    }

    /// Short label for warnings and reports.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::SubBillion => "<1B",
            Self::Small => "1-3B",
            Self::Medium => "3-7B",
            Self::Large => "7-13B",
            Self::XLarge => "13-34B",
            Self::XxLarge => "34-70B",
            Self::Frontier => "70B+",
        }
    }
}

static MODEL_SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*[bB]\b").expect("valid size regex"));

/// Extracts the parameter count, in billions, from a model name like
/// `"llama-2-7b-chat"`. Returns `None` when the name carries no size.
#[must_use]
pub fn parse_model_size(name: &str) -> Option<f64> {
    MODEL_SIZE_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Classifies a model name into a size tier, defaulting to the 3–7B tier
/// when the name carries no recognizable parameter count.
#[must_use]
pub fn classify_model(name: &str) -> ModelSizeTier {
    parse_model_size(name).map_or(ModelSizeTier::Medium, ModelSizeTier::from_billions)
}
