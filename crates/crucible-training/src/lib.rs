//! Training configuration and estimation for Crucible.
//!
//! Everything that happens *before* a job touches a backend lives here:
//!
//! - [`TrainingConfig`]: the provider-agnostic configuration callers
//!   submit, with pre-dispatch validation.
//! - [`normalize`]: the config translator that turns a `TrainingConfig`
//!   into the backend-ready [`NormalizedPayload`](crucible_abstraction::NormalizedPayload),
//!   promoting legacy flat adapter fields into the structured block.
//! - [`estimate`]: the time/cost/feasibility engine built on static GPU
//!   benchmark tables.
//! - [`check_budget`]: hour/cost ceilings evaluated against an estimate.
//!
//! All of it is pure computation; no I/O, no async.

pub mod benchmarks;
pub mod budget;
pub mod config;
pub mod error;
pub mod estimate;
pub mod normalize;

pub use benchmarks::{
    classify_model, lookup_benchmark, parse_model_size, GpuBenchmark, ModelSizeTier,
    DEFAULT_GPU_KEY,
};
pub use budget::{check_budget, BudgetLimits, BudgetReport, BudgetVerdict, DEFAULT_WARN_AT_PERCENT};
pub use config::{TrainingBlock, TrainingConfig};
pub use error::{TrainingError, TrainingResult};
pub use estimate::{
    estimate, estimate_with_benchmark, RecommendedSettings, TimeEstimation, DEFAULT_SAMPLE_COUNT,
    OVERHEAD_MULTIPLIER,
};
pub use normalize::normalize;
