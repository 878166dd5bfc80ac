//! One customization round: edit a selection, submit it, review the variants
//! and confirm one for a container.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::allocator::RatioAllocator;
use crate::catalog::ContainerKind;
use crate::error::FeedbackError;
use crate::history::{ConfirmedRecord, ConfirmedSaveRequest, FeedbackSaveRequest, FeedbackStore};
use crate::identity::IdentityProvider;
use crate::recipe::{BaseRecipe, RecipeRequestBuilder, RecipeVariant, VariantKind, VariantPair};
use crate::volume::{compute_amounts, ComponentAmount};

use super::state::{ConfirmOutcome, SessionState, SubmitOutcome, SubmitTicket};

/// Lets another task abandon a session that is waiting for sign-in.
#[derive(Clone)]
pub struct AbandonHandle(Arc<watch::Sender<bool>>);

impl AbandonHandle {
    pub fn abandon(&self) {
        self.0.send_replace(true);
    }
}

pub struct FeedbackSession {
    base: BaseRecipe,
    /// Id of the recommendation result this feedback is about, if any
    result_id: Option<String>,
    allocator: RatioAllocator,
    state: SessionState,
    epoch: u64,
    /// Variants from the last successful submission. Only replaced by a later success.
    committed: Option<VariantPair>,
    selected_variant: Option<usize>,
    container: Option<ContainerKind>,
    pending: Option<ConfirmedRecord>,
    feedback_id: Option<String>,
    warnings: Vec<String>,
    abandoned: Arc<watch::Sender<bool>>,
}

impl FeedbackSession {
    pub fn new(base: BaseRecipe, result_id: Option<String>) -> Self {
        let allocator = RatioAllocator::for_base(base.id.clone(), base.name.clone());
        let (abandoned, _) = watch::channel(false);
        Self {
            base,
            result_id,
            allocator,
            state: SessionState::Editing,
            epoch: 0,
            committed: None,
            selected_variant: None,
            container: None,
            pending: None,
            feedback_id: None,
            warnings: Vec::new(),
            abandoned: Arc::new(abandoned),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn base_recipe(&self) -> &BaseRecipe {
        &self.base
    }

    pub fn allocator(&self) -> &RatioAllocator {
        &self.allocator
    }

    /// Mutable access to the selection. Only while editing.
    pub fn allocator_mut(&mut self) -> Result<&mut RatioAllocator, FeedbackError> {
        self.expect_state("edit the blend", |s| matches!(s, SessionState::Editing))?;
        Ok(&mut self.allocator)
    }

    pub fn variants(&self) -> Option<&VariantPair> {
        self.committed.as_ref()
    }

    pub fn selected_variant(&self) -> Option<&RecipeVariant> {
        let index = self.selected_variant?;
        self.committed.as_ref()?.get(index)
    }

    pub fn container(&self) -> Option<ContainerKind> {
        self.container
    }

    /// Record held while waiting for an identity.
    pub fn pending_record(&self) -> Option<&ConfirmedRecord> {
        self.pending.as_ref()
    }

    pub fn feedback_id(&self) -> Option<&str> {
        self.feedback_id.as_deref()
    }

    /// Non-blocking problems, such as a failed feedback save.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn abandon_handle(&self) -> AbandonHandle {
        AbandonHandle(self.abandoned.clone())
    }

    fn expect_state(
        &self,
        action: &'static str,
        allowed: impl Fn(&SessionState) -> bool,
    ) -> Result<(), FeedbackError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(FeedbackError::InvalidTransition {
                action,
                state: self.state.name(),
            })
        }
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Editing -> Submitted. Blocked unless the selection totals 100 and passes every edit rule.
    pub fn begin_submit(&mut self) -> Result<SubmitTicket, FeedbackError> {
        self.expect_state("submit", |s| matches!(s, SessionState::Editing))?;
        self.allocator.validate()?;

        self.epoch += 1;
        self.state = SessionState::Submitted { epoch: self.epoch };
        debug!("Submitted selection for '{}' (epoch {})", self.base.name, self.epoch);

        Ok(SubmitTicket {
            epoch: self.epoch,
            selection: self.allocator.selection().clone(),
        })
    }

    /// Apply the result of a submission started with `begin_submit`.
    ///
    /// A result for a stale ticket is dropped without touching the session.
    /// A failure returns to editing and leaves earlier variants in place. A
    /// degraded pair never displaces a generated recipe from an earlier round.
    pub fn complete_submit(
        &mut self,
        ticket: SubmitTicket,
        result: Result<VariantPair, FeedbackError>,
    ) -> Result<SubmitOutcome, FeedbackError> {
        if self.state != (SessionState::Submitted { epoch: ticket.epoch }) {
            info!(
                "Discarding submission result for epoch {} (session is {})",
                ticket.epoch,
                self.state.name()
            );
            return Ok(SubmitOutcome::Discarded);
        }

        match result {
            Ok(mut pair) => {
                if pair.degraded {
                    let earlier = self
                        .committed
                        .as_ref()
                        .and_then(|p| p.iter().find(|v| v.kind == VariantKind::Generated))
                        .cloned();
                    match earlier {
                        Some(generated) => {
                            pair.slots[1] = generated;
                            self.warnings.push(
                                "Recipe generation failed; keeping the earlier generated recipe"
                                    .to_string(),
                            );
                        }
                        None => self
                            .warnings
                            .push("Recipe generation failed; showing the direct recipe only".to_string()),
                    }
                }
                self.committed = Some(pair);
                self.selected_variant = None;
                self.state = SessionState::Reviewing;
                info!("Reviewing variants for '{}'", self.base.name);
                Ok(SubmitOutcome::Applied)
            }
            Err(e) => {
                warn!("Submission for '{}' failed: {}", self.base.name, e);
                self.state = SessionState::Editing;
                Err(e)
            }
        }
    }

    /// Submit, generate and store the feedback record in one step.
    pub async fn submit(
        &mut self,
        builder: &RecipeRequestBuilder,
        store: &dyn FeedbackStore,
        identity: &dyn IdentityProvider,
    ) -> Result<&VariantPair, FeedbackError> {
        let ticket = self.begin_submit()?;
        let result = builder.build(&ticket.selection, &self.base).await;
        if self.complete_submit(ticket, result)? == SubmitOutcome::Applied {
            self.save_feedback(store, identity).await;
        }
        self.committed.as_ref().ok_or(FeedbackError::InvalidTransition {
            action: "review",
            state: self.state.name(),
        })
    }

    /// Store the submission with its generated recipe.
    ///
    /// Only runs after a real generation in the latest round; a failure is kept as a warning.
    pub async fn save_feedback(&mut self, store: &dyn FeedbackStore, identity: &dyn IdentityProvider) {
        let Some(pair) = self.committed.as_ref().filter(|p| !p.degraded) else {
            debug!("Generation failed this round, no feedback to record for '{}'", self.base.name);
            return;
        };
        let Some(generated) = pair.iter().find(|v| v.kind == VariantKind::Generated) else {
            debug!("No generated recipe to record for '{}'", self.base.name);
            return;
        };

        let request = FeedbackSaveRequest::new(
            self.allocator.selection(),
            &generated.recipe,
            self.result_id.clone(),
            identity.fingerprint(),
        );
        match store.save_feedback(&request).await {
            Ok(id) => {
                info!("Saved feedback {} for '{}'", id, self.base.name);
                self.feedback_id = Some(id);
            }
            Err(e) => {
                warn!("Failed to save feedback for '{}': {}", self.base.name, e);
                self.warnings.push(format!("Feedback was not saved: {}", e));
            }
        }
    }

    // =========================================================================
    // REVIEW
    // =========================================================================

    pub fn select_variant(&mut self, index: usize) -> Result<&RecipeVariant, FeedbackError> {
        self.expect_state("select a variant", |s| matches!(s, SessionState::Reviewing))?;
        let pair = self
            .committed
            .as_ref()
            .ok_or(FeedbackError::NoVariantSelected)?;
        let variant = pair.get(index).ok_or(FeedbackError::VariantOutOfRange(index))?;
        self.selected_variant = Some(index);
        Ok(variant)
    }

    pub fn select_container(&mut self, kind: ContainerKind) -> Result<(), FeedbackError> {
        self.expect_state("choose a container", |s| matches!(s, SessionState::Reviewing))?;
        self.container = Some(kind);
        Ok(())
    }

    /// Measured amounts for the selected variant in the selected container,
    /// recomputed on every call.
    pub fn amounts(&self) -> Option<Vec<ComponentAmount>> {
        let variant = self.selected_variant()?;
        let container = self.container?;
        Some(compute_amounts(&variant.recipe, container.spec()))
    }

    /// Reviewing -> Editing, keeping the selection and the offered variants.
    pub fn revise(&mut self) -> Result<(), FeedbackError> {
        self.expect_state("revise", |s| matches!(s, SessionState::Reviewing))?;
        self.state = SessionState::Editing;
        Ok(())
    }

    /// Discard the selection and every variant and start editing afresh.
    pub fn start_over(&mut self) -> Result<(), FeedbackError> {
        self.expect_state("start over", |s| !matches!(s, SessionState::Abandoned))?;
        self.allocator = RatioAllocator::for_base(self.base.id.clone(), self.base.name.clone());
        self.committed = None;
        self.selected_variant = None;
        self.container = None;
        self.pending = None;
        self.feedback_id = None;
        self.warnings.clear();
        self.epoch += 1;
        self.state = SessionState::Editing;
        info!("Started over on '{}'", self.base.name);
        Ok(())
    }

    /// Leave the session. A held record is dropped and any in-flight result is ignored.
    pub fn abandon(&mut self) {
        if self.pending.take().is_some() {
            info!("Dropped unsaved recipe for '{}'", self.base.name);
        }
        self.epoch += 1;
        self.state = SessionState::Abandoned;
        self.abandoned.send_replace(true);
    }

    // =========================================================================
    // CONFIRMATION
    // =========================================================================

    /// Reviewing -> Confirmed, or AwaitingIdentity when nobody is signed in.
    pub async fn confirm(
        &mut self,
        store: &dyn FeedbackStore,
        identity: &dyn IdentityProvider,
    ) -> Result<ConfirmOutcome, FeedbackError> {
        self.expect_state("confirm", |s| matches!(s, SessionState::Reviewing))?;
        let variant = self
            .selected_variant()
            .ok_or(FeedbackError::NoVariantSelected)?;
        let container = self.container.ok_or(FeedbackError::NoContainerSelected)?;

        let record = ConfirmedRecord {
            recipe: variant.recipe.clone(),
            base_recipe_name: self.base.name.clone(),
            container_type: container,
            origin: variant.kind,
        };

        if identity.current().is_none() {
            info!("No identity yet; holding confirmed recipe for '{}'", self.base.name);
            self.pending = Some(record);
            self.state = SessionState::AwaitingIdentity;
            return Ok(ConfirmOutcome::Deferred);
        }

        self.pending = Some(record);
        self.persist_pending(store, identity).await
    }

    /// Retry a deferred confirmation now that an identity may exist.
    pub async fn identity_available(
        &mut self,
        store: &dyn FeedbackStore,
        identity: &dyn IdentityProvider,
    ) -> Result<ConfirmOutcome, FeedbackError> {
        self.expect_state("save the held recipe", |s| {
            matches!(s, SessionState::AwaitingIdentity)
        })?;
        if identity.current().is_none() {
            return Ok(ConfirmOutcome::Deferred);
        }
        self.persist_pending(store, identity).await
    }

    /// Wait for sign-in, then save the held record.
    ///
    /// Returns `Abandoned` if an [`AbandonHandle`] fires first, and `Deferred`
    /// if the identity source goes away. Dropping the future leaves the record held.
    pub async fn save_on_sign_in(
        &mut self,
        store: &dyn FeedbackStore,
        identity: &dyn IdentityProvider,
    ) -> Result<ConfirmOutcome, FeedbackError> {
        self.expect_state("save the held recipe", |s| {
            matches!(s, SessionState::AwaitingIdentity)
        })?;
        let mut signed_in = identity.subscribe();
        let mut abandoned = self.abandoned.subscribe();

        // None when abandoned, Some(false) when the identity source closed.
        let identity_ready = tokio::select! {
            who = signed_in.wait_for(|who| who.is_some()) => Some(who.is_ok()),
            _ = abandoned.wait_for(|gone| *gone) => None,
        };
        match identity_ready {
            None => {
                self.abandon();
                return Ok(ConfirmOutcome::Abandoned);
            }
            Some(false) => {
                debug!("Identity source closed before sign-in for '{}'", self.base.name);
                return Ok(ConfirmOutcome::Deferred);
            }
            Some(true) => {}
        }
        info!("Signed in; saving held recipe for '{}'", self.base.name);
        self.persist_pending(store, identity).await
    }

    /// Save the held record. On failure it stays held and the state is unchanged.
    async fn persist_pending(
        &mut self,
        store: &dyn FeedbackStore,
        identity: &dyn IdentityProvider,
    ) -> Result<ConfirmOutcome, FeedbackError> {
        let (Some(record), Some(who)) = (self.pending.clone(), identity.current()) else {
            return Ok(ConfirmOutcome::Deferred);
        };

        let request = ConfirmedSaveRequest {
            record,
            result_id: self.result_id.clone(),
        };
        match store.save_confirmed(&request, &who).await {
            Ok(id) => {
                info!(
                    "Confirmed recipe {} for '{}' ({})",
                    id, self.base.name, request.record.container_type
                );
                self.pending = None;
                self.state = SessionState::Confirmed {
                    record_id: id.clone(),
                };
                Ok(ConfirmOutcome::Saved { id })
            }
            Err(e) => {
                warn!("Failed to save confirmed recipe for '{}': {}", self.base.name, e);
                if self.state == SessionState::Reviewing {
                    self.pending = None;
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::ScentCandidate;
    use crate::catalog::default_catalog;
    use crate::error::{GenerationError, PersistenceError, ValidationError};
    use crate::identity::{Identity, SharedIdentity};
    use crate::recipe::{
        BaseComponent, Component, GeneratedRecipe, GenerationRequest, GenerationResponse,
        RecipeGenerator, Strength,
    };
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plays back scripted results in order.
    struct ScriptedGenerator {
        script: Mutex<VecDeque<Result<GenerationResponse, GenerationError>>>,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<GenerationResponse, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl RecipeGenerator for ScriptedGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, GenerationError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Transport("script exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        feedback: Mutex<Vec<FeedbackSaveRequest>>,
        confirmed: Mutex<Vec<(ConfirmedSaveRequest, Identity)>>,
        fail_feedback: AtomicBool,
        fail_confirmed: AtomicBool,
    }

    #[async_trait]
    impl FeedbackStore for MemoryStore {
        async fn save_feedback(&self, request: &FeedbackSaveRequest) -> Result<String, PersistenceError> {
            if self.fail_feedback.load(Ordering::SeqCst) {
                return Err(PersistenceError::Storage("disk full".to_string()));
            }
            let mut feedback = self.feedback.lock().unwrap();
            feedback.push(request.clone());
            Ok(format!("fb-{}", feedback.len()))
        }

        async fn save_confirmed(
            &self,
            request: &ConfirmedSaveRequest,
            identity: &Identity,
        ) -> Result<String, PersistenceError> {
            if self.fail_confirmed.load(Ordering::SeqCst) {
                return Err(PersistenceError::Rejected("offline".to_string()));
            }
            let mut confirmed = self.confirmed.lock().unwrap();
            confirmed.push((request.clone(), identity.clone()));
            Ok(format!("cr-{}", confirmed.len()))
        }
    }

    fn base() -> BaseRecipe {
        BaseRecipe {
            id: "rec-1".to_string(),
            name: "Morning Citrus".to_string(),
            category_scores: BTreeMap::from([("citrus".to_string(), 8), ("woody".to_string(), 2)]),
            primary_category: "citrus".to_string(),
            components: vec![BaseComponent {
                id: "lemon".to_string(),
                name: "Lemon".to_string(),
                ratio: 100.0,
            }],
        }
    }

    fn generated(summary: &str) -> Result<GenerationResponse, GenerationError> {
        Ok(GenerationResponse {
            success: true,
            recipe: Some(GeneratedRecipe {
                components: vec![
                    Component {
                        id: "lemon".to_string(),
                        name: "Lemon".to_string(),
                        ratio: 70.0,
                        units: 70,
                        rationale: String::new(),
                    },
                    Component {
                        id: "cedarwood".to_string(),
                        name: "Cedarwood".to_string(),
                        ratio: 30.0,
                        units: 30,
                        rationale: String::new(),
                    },
                ],
                total_units: 100,
                estimated_strength: Strength::Medium,
                summary: summary.to_string(),
                category_changes: vec![],
                testing_steps: vec![],
                closing_message: String::new(),
            }),
            error: None,
        })
    }

    fn builder(script: Vec<Result<GenerationResponse, GenerationError>>, fallback: bool) -> RecipeRequestBuilder {
        RecipeRequestBuilder::new(ScriptedGenerator::new(script), Arc::new(default_catalog()))
            .with_fallback(fallback)
    }

    /// Session with retention 70 and cedarwood 30.
    fn ready_session() -> FeedbackSession {
        let mut session = FeedbackSession::new(base(), Some("result-1".to_string()));
        let allocator = session.allocator_mut().unwrap();
        allocator.set_retention(70);
        allocator
            .add_scent(ScentCandidate::new("cedarwood", "Cedarwood"))
            .unwrap();
        allocator.update_scent_ratio("cedarwood", 30).unwrap();
        session
    }

    #[test]
    fn test_incomplete_selection_cannot_submit() {
        let mut session = FeedbackSession::new(base(), None);
        let allocator = session.allocator_mut().unwrap();
        allocator.set_retention(60);
        allocator
            .add_scent(ScentCandidate::new("vetiver", "Vetiver"))
            .unwrap();
        allocator.update_scent_ratio("vetiver", 25).unwrap();

        let err = session.begin_submit().unwrap_err();
        assert!(matches!(
            err,
            FeedbackError::Validation(ValidationError::RatioSumMismatch { delta: 15, .. })
        ));
        assert_eq!(session.state(), &SessionState::Editing);
    }

    #[tokio::test]
    async fn test_full_flow_saves_feedback_and_confirms() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::signed_in("fp-1", "user-1");
        let mut session = ready_session();

        let pair = session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        assert!(!pair.degraded);
        assert_eq!(session.state(), &SessionState::Reviewing);
        assert_eq!(session.feedback_id(), Some("fb-1"));

        {
            let feedback = store.feedback.lock().unwrap();
            assert_eq!(feedback[0].result_id.as_deref(), Some("result-1"));
            assert_eq!(feedback[0].identity_fingerprint, "fp-1");
            assert_eq!(feedback[0].retention_percentage, 70);
            assert_eq!(feedback[0].generated_recipe.summary, "v1");
        }

        session.select_variant(1).unwrap();
        session.select_container(ContainerKind::FullPerfume).unwrap();
        let amounts = session.amounts().unwrap();
        assert_eq!(amounts[0].amount_ml, 7.0);
        assert_eq!(amounts[1].amount_ml, 3.0);

        let outcome = session.confirm(&store, &identity).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Saved { id: "cr-1".to_string() });
        assert_eq!(
            session.state(),
            &SessionState::Confirmed {
                record_id: "cr-1".to_string()
            }
        );

        let confirmed = store.confirmed.lock().unwrap();
        let (request, who) = &confirmed[0];
        assert_eq!(who.user_id, "user-1");
        assert_eq!(request.record.origin, VariantKind::Generated);
        assert_eq!(request.record.container_type, ContainerKind::FullPerfume);
        assert_eq!(request.record.base_recipe_name, "Morning Citrus");
    }

    #[tokio::test]
    async fn test_confirm_requires_variant_and_container() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::signed_in("fp", "user");
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();

        let err = session.confirm(&store, &identity).await.unwrap_err();
        assert!(matches!(err, FeedbackError::NoVariantSelected));

        session.select_variant(0).unwrap();
        let err = session.confirm(&store, &identity).await.unwrap_err();
        assert!(matches!(err, FeedbackError::NoContainerSelected));

        assert!(matches!(
            session.select_variant(2),
            Err(FeedbackError::VariantOutOfRange(2))
        ));
        assert_eq!(session.state(), &SessionState::Reviewing);
        assert!(store.confirmed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deferred_confirmation_saves_after_sign_in() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp-2");
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        session.select_variant(0).unwrap();
        session.select_container(ContainerKind::Diffuser).unwrap();

        let outcome = session.confirm(&store, &identity).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Deferred);
        assert_eq!(session.state(), &SessionState::AwaitingIdentity);
        assert_eq!(session.pending_record().unwrap().origin, VariantKind::Direct);

        // still nobody signed in
        let outcome = session.identity_available(&store, &identity).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Deferred);

        identity.sign_in("user-2");
        let outcome = session.identity_available(&store, &identity).await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Saved { id: "cr-1".to_string() });
        assert!(session.pending_record().is_none());
        assert_eq!(store.confirmed.lock().unwrap()[0].1.user_id, "user-2");
    }

    #[tokio::test]
    async fn test_deferred_retry_failure_keeps_record() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        session.select_variant(1).unwrap();
        session.select_container(ContainerKind::SmallPerfume).unwrap();
        session.confirm(&store, &identity).await.unwrap();

        identity.sign_in("user");
        store.fail_confirmed.store(true, Ordering::SeqCst);
        let err = session.identity_available(&store, &identity).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Persistence(_)));
        assert_eq!(session.state(), &SessionState::AwaitingIdentity);
        assert!(session.pending_record().is_some());

        store.fail_confirmed.store(false, Ordering::SeqCst);
        let outcome = session.identity_available(&store, &identity).await.unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Saved { .. }));
    }

    /// Session confirmed without an identity, holding a Diffuser record.
    async fn held_session(store: &MemoryStore, identity: &SharedIdentity) -> FeedbackSession {
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), store, identity)
            .await
            .unwrap();
        session.select_variant(1).unwrap();
        session.select_container(ContainerKind::Diffuser).unwrap();
        assert_eq!(
            session.confirm(store, identity).await.unwrap(),
            ConfirmOutcome::Deferred
        );
        session
    }

    #[tokio::test]
    async fn test_held_record_saves_when_sign_in_arrives() {
        let store = MemoryStore::default();
        let identity = Arc::new(SharedIdentity::anonymous("fp-3"));
        let mut session = held_session(&store, &identity).await;

        let signer = identity.clone();
        let sign_in = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signer.sign_in("user-3");
        });

        let outcome = session.save_on_sign_in(&store, identity.as_ref()).await.unwrap();
        sign_in.await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Saved { id: "cr-1".to_string() });
        assert!(matches!(session.state(), SessionState::Confirmed { .. }));
        assert!(session.pending_record().is_none());

        let confirmed = store.confirmed.lock().unwrap();
        assert_eq!(confirmed[0].1.user_id, "user-3");
        assert_eq!(confirmed[0].0.record.container_type, ContainerKind::Diffuser);
    }

    #[tokio::test]
    async fn test_abandon_while_waiting_for_sign_in() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let mut session = held_session(&store, &identity).await;

        let handle = session.abandon_handle();
        let leave = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.abandon();
        });

        let outcome = session.save_on_sign_in(&store, &identity).await.unwrap();
        leave.await.unwrap();
        assert_eq!(outcome, ConfirmOutcome::Abandoned);
        assert_eq!(session.state(), &SessionState::Abandoned);
        assert!(session.pending_record().is_none());

        identity.sign_in("late");
        assert!(session.save_on_sign_in(&store, &identity).await.is_err());
        assert!(store.confirmed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abandon_drops_held_record() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        session.select_variant(0).unwrap();
        session.select_container(ContainerKind::Diffuser).unwrap();
        session.confirm(&store, &identity).await.unwrap();

        session.abandon();
        assert_eq!(session.state(), &SessionState::Abandoned);
        assert!(session.pending_record().is_none());

        identity.sign_in("late");
        assert!(session.identity_available(&store, &identity).await.is_err());
        assert!(store.confirmed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_after_abandon_is_discarded() {
        let mut session = ready_session();
        let ticket = session.begin_submit().unwrap();
        session.abandon();

        let pair = builder(vec![generated("late")], true)
            .build(&ticket.selection, &base())
            .await;
        let outcome = session.complete_submit(ticket, pair).unwrap();
        assert_eq!(outcome, SubmitOutcome::Discarded);
        assert!(session.variants().is_none());
        assert_eq!(session.state(), &SessionState::Abandoned);
    }

    #[tokio::test]
    async fn test_failed_resubmission_keeps_earlier_variants() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let recipe_builder = builder(
            vec![
                generated("first round"),
                Err(GenerationError::Transport("timeout".to_string())),
            ],
            false,
        );
        let mut session = ready_session();
        session.submit(&recipe_builder, &store, &identity).await.unwrap();
        let before = session.variants().cloned().unwrap();

        session.revise().unwrap();
        session.allocator_mut().unwrap().set_retention(75);
        session
            .allocator_mut()
            .unwrap()
            .update_scent_ratio("cedarwood", 25)
            .unwrap();

        let err = session.submit(&recipe_builder, &store, &identity).await.unwrap_err();
        assert!(matches!(err, FeedbackError::Generation(_)));
        assert_eq!(session.state(), &SessionState::Editing);
        assert_eq!(session.variants(), Some(&before));
        assert_eq!(before.slots[1].recipe.summary, "first round");
        // only the first round was persisted
        assert_eq!(store.feedback.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_round_keeps_earlier_generated_recipe() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let recipe_builder = RecipeRequestBuilder::new(
            ScriptedGenerator::new(vec![
                generated("first round"),
                Err(GenerationError::Transport("timeout".to_string())),
            ]),
            Arc::new(default_catalog()),
        );
        let mut session = ready_session();
        session.submit(&recipe_builder, &store, &identity).await.unwrap();
        let before = session.variants().cloned().unwrap();

        session.revise().unwrap();
        session.allocator_mut().unwrap().set_retention(75);
        session
            .allocator_mut()
            .unwrap()
            .update_scent_ratio("cedarwood", 25)
            .unwrap();

        let after = session
            .submit(&recipe_builder, &store, &identity)
            .await
            .unwrap()
            .clone();
        assert!(after.degraded);
        assert_eq!(after.slots[1], before.slots[1]);
        assert_eq!(after.slots[1].kind, VariantKind::Generated);
        assert_eq!(after.slots[1].recipe.summary, "first round");
        // the direct slot follows the new selection
        assert_eq!(after.slots[0].kind, VariantKind::Direct);
        assert_eq!(after.slots[0].recipe.components[0].units, 75);
        assert!(session.warnings()[0].contains("earlier generated recipe"));
        // the earlier recipe is not stored again under the new selection
        assert_eq!(store.feedback.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_submission_skips_feedback_save() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let mut session = ready_session();

        let pair = session
            .submit(
                &builder(vec![Err(GenerationError::Transport("down".to_string()))], true),
                &store,
                &identity,
            )
            .await
            .unwrap();
        assert!(pair.degraded);
        assert!(store.feedback.lock().unwrap().is_empty());
        assert_eq!(session.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_save_failure_is_only_a_warning() {
        let store = MemoryStore::default();
        store.fail_feedback.store(true, Ordering::SeqCst);
        let identity = SharedIdentity::signed_in("fp", "user");
        let mut session = ready_session();

        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        assert_eq!(session.state(), &SessionState::Reviewing);
        assert!(session.feedback_id().is_none());
        assert!(session.warnings()[0].contains("disk full"));

        session.select_variant(1).unwrap();
        session.select_container(ContainerKind::SmallPerfume).unwrap();
        assert!(session.confirm(&store, &identity).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_over_discards_everything() {
        let store = MemoryStore::default();
        let identity = SharedIdentity::anonymous("fp");
        let mut session = ready_session();
        session
            .submit(&builder(vec![generated("v1")], true), &store, &identity)
            .await
            .unwrap();
        session.select_variant(1).unwrap();

        session.start_over().unwrap();
        assert_eq!(session.state(), &SessionState::Editing);
        assert!(session.variants().is_none());
        assert!(session.selected_variant().is_none());
        assert_eq!(session.allocator().selection().retention_percentage, 100);
        assert!(session.allocator().selection().extra_scents.is_empty());
    }

    #[test]
    fn test_editing_locked_outside_editing() {
        let mut session = ready_session();
        session.begin_submit().unwrap();
        assert!(matches!(
            session.allocator_mut(),
            Err(FeedbackError::InvalidTransition { state: "submitted", .. })
        ));
        assert!(session.revise().is_err());
    }
}
