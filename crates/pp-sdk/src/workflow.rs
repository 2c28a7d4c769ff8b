//! Passport creation as explicit state.
//!
//! ```text
//! Started -> DataUploaded -> IdentityCreated -> CarrierBound -> Done
//!    \____________\_______________\________________\______> Failed(reason)
//! ```
//!
//! States advance only through [`transition`], a pure function of the
//! current state and the outcome of the step just performed. `Failed` and
//! `Done` absorb every further event.

use std::fmt;

use async_trait::async_trait;
use pp_types::{ContentLocator, DataCarrierLink, IdentityKind, IdentityMetadata};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Where the deep link to the passport is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCarrier {
    /// Printed QR code; binding is pure and costs nothing.
    Qr,
    /// NFC chip; the link target is written to the chip metadata registry.
    Nfc,
}

/// The steps that perform side effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    Requirements,
    Upload,
    IdentityCreation,
    CarrierBinding,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Requirements => "requirements",
            Step::Upload => "upload",
            Step::IdentityCreation => "identity creation",
            Step::CarrierBinding => "carrier binding",
        };
        f.write_str(s)
    }
}

/// Why a creation attempt stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureReason {
    /// The user declined a fee-bearing step; nothing was submitted for it.
    UserRejected { step: Step },
    /// A precondition for starting was not met.
    RequirementNotMet { message: String },
    /// A step's side effect failed. `message` is the one corrective action
    /// shown to the user; `detail` is the underlying error.
    StepFailed {
        step: Step,
        message: String,
        detail: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UserRejected { .. } => f.write_str("UserRejected"),
            FailureReason::RequirementNotMet { message } => {
                write!(f, "RequirementNotMet: {message}")
            }
            FailureReason::StepFailed { step, message, .. } => write!(f, "{step} failed: {message}"),
        }
    }
}

/// A completed passport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPassport {
    pub payload: ContentLocator,
    pub identity: IdentityMetadata,
    /// Locator of the stored identity metadata document.
    pub metadata: ContentLocator,
    pub carrier: DataCarrier,
    pub link: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CreationState {
    Started,
    DataUploaded {
        payload: ContentLocator,
    },
    IdentityCreated {
        payload: ContentLocator,
        identity: IdentityMetadata,
        metadata: ContentLocator,
    },
    CarrierBound {
        passport: CreatedPassport,
    },
    Done {
        passport: CreatedPassport,
    },
    Failed {
        reason: FailureReason,
    },
}

impl CreationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CreationState::Done { .. } | CreationState::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreationState::Started => "Started",
            CreationState::DataUploaded { .. } => "DataUploaded",
            CreationState::IdentityCreated { .. } => "IdentityCreated",
            CreationState::CarrierBound { .. } => "CarrierBound",
            CreationState::Done { .. } => "Done",
            CreationState::Failed { .. } => "Failed",
        }
    }
}

/// Outcome of one step, fed to [`transition`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepEvent {
    Uploaded(ContentLocator),
    IdentityCreated {
        identity: IdentityMetadata,
        metadata: ContentLocator,
    },
    CarrierBound {
        carrier: DataCarrier,
        link: DataCarrierLink,
    },
    Finished,
    Failed(FailureReason),
}

/// Next state after `event`. Events that do not fit the current state
/// fail the attempt rather than skipping ahead.
pub fn transition(state: CreationState, event: StepEvent) -> CreationState {
    use CreationState as S;
    match (state, event) {
        (terminal, _) if terminal.is_terminal() => terminal,
        (_, StepEvent::Failed(reason)) => S::Failed { reason },
        (S::Started, StepEvent::Uploaded(payload)) => S::DataUploaded { payload },
        (S::DataUploaded { payload }, StepEvent::IdentityCreated { identity, metadata }) => {
            S::IdentityCreated {
                payload,
                identity,
                metadata,
            }
        }
        (
            S::IdentityCreated {
                payload,
                identity,
                metadata,
            },
            StepEvent::CarrierBound { carrier, link },
        ) => S::CarrierBound {
            passport: CreatedPassport {
                payload,
                identity,
                metadata,
                carrier,
                link: link.encode(),
            },
        },
        (S::CarrierBound { passport }, StepEvent::Finished) => S::Done { passport },
        (state, event) => S::Failed {
            reason: FailureReason::RequirementNotMet {
                message: format!("{event:?} is not valid in state {}", state.name()),
            },
        },
    }
}

/// A fee-bearing step awaiting the user's decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub step: Step,
    pub kind: IdentityKind,
    pub chain_id: u64,
    pub carrier: DataCarrier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Suspension point before each fee-bearing write.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> Decision;
}

/// Approves everything. For scripted runs.
pub struct AutoApprove;

#[async_trait]
impl ConfirmationGate for AutoApprove {
    async fn confirm(&self, _request: &ConfirmationRequest) -> Decision {
        Decision::Approve
    }
}

/// Rejects everything.
pub struct AutoReject;

#[async_trait]
impl ConfirmationGate for AutoReject {
    async fn confirm(&self, _request: &ConfirmationRequest) -> Decision {
        Decision::Reject
    }
}

/// A request handed to the UI, answered exactly once.
pub struct PendingConfirmation {
    pub request: ConfirmationRequest,
    reply: oneshot::Sender<Decision>,
}

impl PendingConfirmation {
    pub fn approve(self) {
        let _ = self.reply.send(Decision::Approve);
    }

    pub fn reject(self) {
        let _ = self.reply.send(Decision::Reject);
    }
}

/// Forwards each request over a channel and waits for the answer. A request
/// dropped without an answer counts as a rejection.
pub struct ChannelGate {
    tx: mpsc::Sender<PendingConfirmation>,
}

impl ChannelGate {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PendingConfirmation>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConfirmationGate for ChannelGate {
    async fn confirm(&self, request: &ConfirmationRequest) -> Decision {
        let (reply, answer) = oneshot::channel();
        let pending = PendingConfirmation {
            request: request.clone(),
            reply,
        };
        if self.tx.send(pending).await.is_err() {
            return Decision::Reject;
        }
        answer.await.unwrap_or(Decision::Reject)
    }
}
