use std::sync::Arc;

use pp_chip::{ChipBinder, ChipError};
use pp_registry::{
    ChipCarrierBinder, CreateRequest, IdentityRegistry, RegistryError, RegistrySet,
};
use pp_store::{ContentStore, ContentStoreExt};
use pp_types::{DataCarrierLink, IdentityKind, PassportPayload, DEFAULT_APP_SCHEME};
use uuid::Uuid;

use crate::error::{SdkError, SdkResult};
use crate::workflow::{
    transition, ConfirmationGate, ConfirmationRequest, CreationState, DataCarrier, Decision,
    FailureReason, Step, StepEvent,
};

/// What to create.
#[derive(Clone, Debug)]
pub struct CreationPlan {
    pub payload: PassportPayload,
    pub kind: IdentityKind,
    pub chain_id: u64,
    pub carrier: DataCarrier,
}

/// Final state of one attempt and the states it passed through.
#[derive(Clone, Debug)]
pub struct CreationOutcome {
    pub attempt: Uuid,
    pub state: CreationState,
    pub trail: Vec<&'static str>,
}

impl CreationOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self.state, CreationState::Done { .. })
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.state {
            CreationState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Drives one passport through upload, identity creation and carrier
/// binding, stopping at the first failure.
///
/// State lives only in the returned [`CreationOutcome`]; an interrupted
/// attempt restarts from `Started`.
pub struct CreationOrchestrator {
    store: Arc<dyn ContentStore>,
    registries: Arc<RegistrySet>,
    gate: Arc<dyn ConfirmationGate>,
    chip: Option<Arc<ChipBinder>>,
    app_scheme: String,
}

struct Attempt {
    id: Uuid,
    state: CreationState,
    trail: Vec<&'static str>,
}

impl Attempt {
    fn advance(&mut self, event: StepEvent) {
        let from = self.state.name();
        let state = std::mem::replace(&mut self.state, CreationState::Started);
        self.state = transition(state, event);
        let to = self.state.name();
        self.trail.push(to);
        match &self.state {
            CreationState::Failed { reason } => {
                tracing::warn!(attempt = %self.id, from, %reason, "passport creation failed");
            }
            _ => tracing::info!(attempt = %self.id, from, to, "workflow transition"),
        }
    }

    fn finish(self) -> CreationOutcome {
        CreationOutcome {
            attempt: self.id,
            state: self.state,
            trail: self.trail,
        }
    }
}

impl CreationOrchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        registries: Arc<RegistrySet>,
        gate: Arc<dyn ConfirmationGate>,
    ) -> Self {
        Self {
            store,
            registries,
            gate,
            chip: None,
            app_scheme: DEFAULT_APP_SCHEME.to_string(),
        }
    }

    /// Chip used for physical-token identities and NFC carriers.
    pub fn with_chip(mut self, chip: Arc<ChipBinder>) -> Self {
        self.chip = Some(chip);
        self
    }

    pub fn with_app_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.app_scheme = scheme.into();
        self
    }

    pub async fn run(&self, plan: CreationPlan) -> CreationOutcome {
        let mut attempt = Attempt {
            id: Uuid::now_v7(),
            state: CreationState::Started,
            trail: vec![CreationState::Started.name()],
        };
        tracing::info!(
            attempt = %attempt.id,
            kind = %plan.kind,
            chain_id = plan.chain_id,
            carrier = ?plan.carrier,
            "starting passport creation"
        );

        if let Err(reason) = self.check_requirements(&plan) {
            attempt.advance(StepEvent::Failed(reason));
            return attempt.finish();
        }

        let steps = [Step::Upload, Step::IdentityCreation, Step::CarrierBinding];
        for step in steps {
            let event = match self.perform(step, &plan, &attempt.state).await {
                Ok(event) => event,
                Err(err) => StepEvent::Failed(step_failure(step, &err)),
            };
            attempt.advance(event);
            if attempt.state.is_terminal() {
                return attempt.finish();
            }
        }
        attempt.advance(StepEvent::Finished);
        attempt.finish()
    }

    fn check_requirements(&self, plan: &CreationPlan) -> Result<(), FailureReason> {
        if plan.payload.is_empty() {
            return Err(FailureReason::RequirementNotMet {
                message: "passport data is empty".to_string(),
            });
        }
        let needs_chip =
            plan.kind == IdentityKind::PhysicalToken || plan.carrier == DataCarrier::Nfc;
        if needs_chip && self.chip.is_none() {
            return Err(FailureReason::RequirementNotMet {
                message: "connect an NFC chip reader".to_string(),
            });
        }
        if let Err(err) = self.registries.deployment(plan.chain_id) {
            return Err(step_failure(Step::Requirements, &SdkError::from(err)));
        }
        Ok(())
    }

    async fn perform(
        &self,
        step: Step,
        plan: &CreationPlan,
        state: &CreationState,
    ) -> SdkResult<StepEvent> {
        match (step, state) {
            (Step::Upload, _) => {
                let locator = self.store.upload_json(&plan.payload).await?;
                Ok(StepEvent::Uploaded(locator))
            }
            (Step::IdentityCreation, CreationState::DataUploaded { payload }) => {
                if !self.confirm(step, plan).await {
                    return Ok(StepEvent::Failed(FailureReason::UserRejected { step }));
                }
                let mut request = CreateRequest::new(payload.clone());
                if plan.kind == IdentityKind::PhysicalToken {
                    request = request.with_attestation(self.attest(plan.chain_id).await?);
                }
                let registry = self.registries.for_kind(plan.kind, plan.chain_id)?;
                let identity = registry.create(&request).await?;
                let metadata = self.store.upload_json(&identity).await?;
                tracing::info!(%metadata, kind = %plan.kind, "identity metadata stored");
                Ok(StepEvent::IdentityCreated { identity, metadata })
            }
            (Step::CarrierBinding, CreationState::IdentityCreated { metadata, .. }) => {
                let link = DataCarrierLink::new(self.app_scheme.clone(), metadata.clone());
                if plan.carrier == DataCarrier::Nfc {
                    if !self.confirm(step, plan).await {
                        return Ok(StepEvent::Failed(FailureReason::UserRejected { step }));
                    }
                    let attestation = self.attest(plan.chain_id).await?;
                    let program = self
                        .registries
                        .deployment(plan.chain_id)?
                        .registries
                        .chip_metadata;
                    let carrier =
                        ChipCarrierBinder::new(self.registries.context(plan.chain_id)?, program);
                    carrier.bind(&attestation, metadata).await?;
                }
                Ok(StepEvent::CarrierBound {
                    carrier: plan.carrier,
                    link,
                })
            }
            (step, state) => Err(SdkError::Config(format!(
                "{step} cannot run in state {}",
                state.name()
            ))),
        }
    }

    async fn confirm(&self, step: Step, plan: &CreationPlan) -> bool {
        let request = ConfirmationRequest {
            step,
            kind: plan.kind,
            chain_id: plan.chain_id,
            carrier: plan.carrier,
        };
        let decision = self.gate.confirm(&request).await;
        tracing::debug!(%step, ?decision, "confirmation answered");
        decision == Decision::Approve
    }

    async fn attest(&self, chain_id: u64) -> SdkResult<pp_types::ChipAttestation> {
        let chip = self.chip.as_ref().ok_or_else(|| {
            SdkError::Config("no chip reader configured".to_string())
        })?;
        let ledger = self.registries.ledger(chain_id)?;
        Ok(chip
            .attest(ledger.as_ref(), self.registries.account())
            .await?)
    }
}

fn step_failure(step: Step, err: &SdkError) -> FailureReason {
    FailureReason::StepFailed {
        step,
        message: corrective_action(err).to_string(),
        detail: err.to_string(),
    }
}

/// The one action offered to the user for a failed step.
pub fn corrective_action(err: &SdkError) -> &'static str {
    match err {
        SdkError::Registry(RegistryError::UnsupportedNetwork(_)) => "switch network",
        SdkError::Registry(RegistryError::NotOwner) => "reconnect wallet",
        SdkError::Registry(RegistryError::AlreadySet) => "chip already bound",
        SdkError::Registry(
            RegistryError::BlockNumberTooOld
            | RegistryError::InvalidBlockNumber
            | RegistryError::InvalidSignature,
        ) => "tap chip again",
        SdkError::Registry(
            RegistryError::MintEventTimeout { .. }
            | RegistryError::AmbiguousMintEvent { .. }
            | RegistryError::ConfirmationTimeout { .. },
        ) => "check the ledger before retrying",
        SdkError::Chip(ChipError::ChipBusy) => "finish the other chip scan first",
        SdkError::Chip(_) => "tap chip again",
        SdkError::Store(_) => "check the storage connection",
        _ => "try again",
    }
}
