//! High-level SDK for PermaPass product passports.
//!
//! Ties the content store, the identity registries and the chip protocol
//! together into the two things applications do: create a passport and
//! read one back from its data carrier.
//!
//! # Key Types
//!
//! - [`PermaPass`]: facade over one store and the registries of every
//!   configured network
//! - [`CreationOrchestrator`]: the creation workflow, an explicit
//!   [`CreationState`] advanced by [`transition`]
//! - [`ConfirmationGate`]: suspension point before each fee-bearing write
//! - [`PassportReader`]: deep link or chip tap to [`PassportHistory`]
//! - [`PassportConfig`]: TOML configuration

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod reader;
pub mod workflow;

pub use client::PermaPass;
pub use config::{NetworkConfig, PassportConfig};
pub use error::{SdkError, SdkResult};
pub use orchestrator::{corrective_action, CreationOrchestrator, CreationOutcome, CreationPlan};
pub use reader::{PassportHistory, PassportReader, PassportVersion};
pub use workflow::{
    transition, AutoApprove, AutoReject, ChannelGate, ConfirmationGate, ConfirmationRequest,
    CreatedPassport, CreationState, DataCarrier, Decision, FailureReason, PendingConfirmation,
    Step, StepEvent,
};

// Re-export key types
pub use pp_types::{
    ContentLocator, DataCarrierLink, IdentityKind, IdentityMetadata, PassportPayload,
    VersionEntry,
};
