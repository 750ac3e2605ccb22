//! Deployment abstraction layer for Crucible.
//!
//! This crate defines the contract between the job orchestrator and the
//! execution backends that actually run fine-tuning jobs: the
//! [`DeploymentProvider`] trait, the wire types it consumes and produces,
//! and the error taxonomy shared by every backend.
//!
//! # Backends
//!
//! - **Local agent**: a long-lived trainer agent reached over HTTP, or the
//!   trainer process spawned directly when co-located.
//! - **Cloud pod**: an ephemeral GPU instance provisioned through a vendor
//!   API and bootstrapped with a rendered startup script.
//!
//! Concrete implementations live in `crucible-providers`; this crate stays
//! dependency-light so every other crate can speak its vocabulary.

pub mod error;
pub mod payload;
pub mod provider;
pub mod request;
pub mod status;

pub use error::{DeployError, DeployResult};
pub use payload::{
    DataSection, LoraSection, ModelSection, NormalizedPayload, QuantizationSection,
    TokenizerSection, TrainingSection, DEFAULT_LORA_DROPOUT, DEFAULT_TRAINING_METHOD,
};
pub use provider::DeploymentProvider;
pub use request::{DatasetRef, DeployOptions, DeploymentRequest, ProviderTarget};
pub use status::{DeploymentState, DeploymentStatus, TrainingMetrics};
