//! Backend-agnostic reconciliation pass
//!
//! One pass refreshes the observed remote state, asks the drift detector for
//! the next corrective action, checks it against the precondition table and
//! dispatches at most one remote call. Long remote operations are never
//! awaited: the pass records what it sent and returns a requeue delay, and a
//! later pass observes the outcome.
//!
//! Remote failures never escape a pass as `Err`. They are converted into
//! status and a requeue decision. Only local store failures (for example a
//! status write that lost an optimistic-concurrency race) are returned.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::actuator::{
    ActuatorError, ActuatorResult, ErrorClass, ProvisionRequest, RemoteActuator, RemoteSnapshot,
};
use crate::config::OperatorConfig;
use crate::controller::deletion::{DeletionPolicy, DeletionStep, next_step};
use crate::controller::drift::{self, CorrectiveAction, is_create_signature};
use crate::controller::error::{BackoffConfig, Result};
use crate::controller::lifecycle::{ActionKind, LifecycleTable, PreconditionCheck};
use crate::controller::resource::ManagedResource;
use crate::controller::retry::{self, RetryPolicy, StateRule, WaitDecision};
use crate::controller::status::{StatusManager, reasons};
use crate::controller::store::ResourceStore;
use crate::controller::wallet::{self, WalletOutcome};
use crate::crd::{LifecycleState, ManagedStatus, PdbAction, PendingAction, ResourcePhase};

/// Timing knobs for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub resync_interval: Duration,
    pub conflict_requeue: Duration,
    pub call_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&OperatorConfig::default())
    }
}

impl From<&OperatorConfig> for EngineSettings {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
            resync_interval: config.resync_interval,
            conflict_requeue: config.conflict_requeue,
            call_timeout: config.remote_call_timeout,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Result of one pass
#[derive(Debug, Clone)]
pub struct PassOutcome {
    /// When to look again; `None` once the resource has been released
    pub requeue: Option<Duration>,
    /// The action sent to the remote in this pass, if any
    pub dispatched: Option<ActionKind>,
    /// Status as left by this pass
    pub status: ManagedStatus,
    /// The finalizer was removed and the resource may disappear
    pub finalized: bool,
}

/// Credentials resolved from Secrets just before a dispatch
#[derive(Debug, Default)]
struct Credentials {
    admin_name: Option<String>,
    admin_password: Option<String>,
}

/// Working state of one pass
struct Pass<'a> {
    resource: &'a ManagedResource,
    actuator: &'a dyn RemoteActuator,
    store: &'a dyn ResourceStore,
    now: DateTime<Utc>,
    status: ManagedStatus,
    /// Last status known to be persisted
    persisted: ManagedStatus,
    dispatched: Option<ActionKind>,
}

impl Pass<'_> {
    fn manager(&mut self) -> StatusManager<'_> {
        StatusManager::new(&mut self.status, self.resource.generation, self.now)
    }

    fn identity(&self) -> Option<String> {
        self.status.identity.clone()
    }

    fn observed_label(&self) -> String {
        self.status
            .lifecycle_state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn pending(&self, signature: String) -> PendingAction {
        PendingAction {
            signature,
            since: self.now.to_rfc3339(),
        }
    }
}

/// Control flow between the stages of a pass
enum Step {
    Continue,
    Done(Duration),
}

pub struct Reconciler {
    settings: EngineSettings,
    table: LifecycleTable,
}

impl Reconciler {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            table: LifecycleTable::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn reconcile(
        &self,
        resource: &ManagedResource,
        actuator: &dyn RemoteActuator,
        store: &dyn ResourceStore,
    ) -> Result<PassOutcome> {
        self.reconcile_at(resource, actuator, store, Utc::now())
            .await
    }

    /// Run one pass with an explicit clock
    pub async fn reconcile_at(
        &self,
        resource: &ManagedResource,
        actuator: &dyn RemoteActuator,
        store: &dyn ResourceStore,
        now: DateTime<Utc>,
    ) -> Result<PassOutcome> {
        let mut pass = Pass {
            resource,
            actuator,
            store,
            now,
            status: resource.status.clone(),
            persisted: resource.status.clone(),
            dispatched: None,
        };
        pass.status.observed_generation = resource.generation;

        if resource.deletion_requested {
            return self.handle_deletion(pass).await;
        }

        let refreshed = if pass.status.identity.is_none() {
            self.recover_pending_create(&mut pass).await
        } else {
            self.refresh(&mut pass).await
        };
        if let Step::Done(requeue) = refreshed {
            return self.finish(pass, requeue).await;
        }

        let action = drift::detect(resource, &pass.status);

        if let Step::Done(requeue) = self.track_in_flight(&mut pass, action.as_ref()) {
            return self.finish(pass, requeue).await;
        }

        let Some(action) = action else {
            let requeue = self.converged(&mut pass).await;
            return self.finish(pass, requeue).await;
        };

        let signature = action.signature();
        if pass.status.failed_action.as_deref() == Some(signature.as_str()) {
            debug!(
                name = %resource.name,
                action = %action.kind(),
                "Action failed permanently before; not retrying"
            );
            pass.status.phase = ResourcePhase::Failed;
            return self.finish(pass, self.settings.resync_interval).await;
        }
        if pass.status.failed_action.take().is_some() {
            pass.manager().clear_failed();
        }

        let identity = pass.identity();
        match self.table.check(
            &action.kind(),
            identity.as_deref(),
            pass.status.lifecycle_state.as_ref(),
        ) {
            PreconditionCheck::Met => {}
            PreconditionCheck::Unmet { expected } => {
                let requeue = self.wait_for_precondition(&mut pass, &action, expected);
                return self.finish(pass, requeue).await;
            }
            PreconditionCheck::NoRule => {
                let message = format!("{} is not an action this controller can send", action.kind());
                error!(name = %resource.name, action = %action.kind(), "Illegal corrective action");
                pass.status.failed_action = Some(signature);
                pass.manager().set_failed(reasons::ILLEGAL_ACTION, &message);
                return self.finish(pass, self.settings.resync_interval).await;
            }
        }
        pass.status.waiting = None;

        let requeue = self.dispatch(&mut pass, action).await?;
        self.finish(pass, requeue).await
    }

    /// Bound a remote call by the configured timeout
    async fn call<T>(&self, fut: impl Future<Output = ActuatorResult<T>>) -> ActuatorResult<T> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ActuatorError::Transient(format!(
                "remote call timed out after {}s",
                self.settings.call_timeout.as_secs()
            ))),
        }
    }

    fn backoff(&self, status: &ManagedStatus) -> Duration {
        self.settings
            .backoff
            .delay_for_failures(status.consecutive_failures)
    }

    /// Persist status if the pass changed it
    async fn finish(&self, pass: Pass<'_>, requeue: Duration) -> Result<PassOutcome> {
        if pass.status != pass.persisted {
            pass.store.save_status(&pass.status).await?;
        }
        Ok(PassOutcome {
            requeue: Some(requeue),
            dispatched: pass.dispatched,
            status: pass.status,
            finalized: false,
        })
    }

    async fn release(&self, pass: Pass<'_>) -> Result<PassOutcome> {
        pass.store.release_finalizer().await?;
        info!(
            name = %pass.resource.name,
            namespace = %pass.resource.namespace,
            "Finalizer released"
        );
        Ok(PassOutcome {
            requeue: None,
            dispatched: pass.dispatched,
            status: pass.status,
            finalized: true,
        })
    }

    fn observe(&self, pass: &mut Pass<'_>, snapshot: RemoteSnapshot) {
        if pass.status.identity.is_none() {
            pass.status.identity = Some(snapshot.id);
        }
        pass.status.lifecycle_state = Some(snapshot.lifecycle_state);
        if !snapshot.attributes.is_empty() {
            pass.status.snapshot = Some(snapshot.attributes);
        }
    }

    /// Look the object up in the list index, which may be fresher than a direct read
    async fn find_listed(&self, pass: &Pass<'_>, id: &str) -> Option<RemoteSnapshot> {
        match self.call(pass.actuator.list(&pass.resource.list_filter)).await {
            Ok(items) => items.into_iter().find(|s| s.id == id),
            Err(e) => {
                debug!(name = %pass.resource.name, error = %e, "List lookup failed");
                None
            }
        }
    }

    /// Convert a failed read into status and a requeue
    fn on_remote_error(&self, pass: &mut Pass<'_>, err: &ActuatorError) -> Step {
        let message = err.to_string();
        match err.classify() {
            ErrorClass::Transient => {
                pass.status.consecutive_failures += 1;
                warn!(name = %pass.resource.name, error = %message, "Transient remote failure");
                pass.manager()
                    .set_retrying(reasons::TRANSIENT_FAILURE, &message);
                Step::Done(self.backoff(&pass.status))
            }
            ErrorClass::Conflict => {
                pass.status.consecutive_failures += 1;
                warn!(name = %pass.resource.name, error = %message, "Remote object busy");
                pass.manager().set_retrying(reasons::REMOTE_CONFLICT, &message);
                Step::Done(self.settings.conflict_requeue)
            }
            ErrorClass::Permanent => {
                pass.status.consecutive_failures += 1;
                error!(name = %pass.resource.name, error = %message, "Remote read rejected");
                pass.manager().set_failed(reasons::ACTION_FAILED, &message);
                Step::Done(self.settings.backoff.max_delay)
            }
        }
    }

    /// Refresh the observed state of an identified object.
    ///
    /// A direct read may be stale right after a write, so the list index is
    /// consulted whenever an action is outstanding or the direct read came
    /// back empty, and the list wins when the two disagree.
    async fn refresh(&self, pass: &mut Pass<'_>) -> Step {
        let Some(id) = pass.identity() else {
            return Step::Continue;
        };

        let direct = self.call(pass.actuator.get(&id)).await;
        let consult_list = matches!(&direct, Err(e) if e.is_not_found())
            || pass.status.in_flight.is_some()
            || pass.status.consistency_retries > 0;
        let listed = if consult_list {
            self.find_listed(pass, &id).await
        } else {
            None
        };

        match (direct, listed) {
            (Ok(direct), Some(listed)) if direct.lifecycle_state != listed.lifecycle_state => {
                self.on_mismatch(pass, Some(direct.lifecycle_state), listed)
            }
            (Ok(direct), listed) => {
                pass.status.consistency_retries = 0;
                // the list index carries the fresher attributes when both agree on state
                let fresher = match listed {
                    Some(listed) if !listed.attributes.is_empty() => listed,
                    _ => direct,
                };
                self.observe(pass, fresher);
                Step::Continue
            }
            (Err(e), Some(listed)) if e.is_not_found() => self.on_mismatch(pass, None, listed),
            (Err(e), Some(listed)) => {
                debug!(name = %pass.resource.name, error = %e, "Direct read failed; using list");
                self.observe(pass, listed);
                Step::Continue
            }
            (Err(e), None) if e.is_not_found() => self.on_missing(pass),
            (Err(e), None) => self.on_remote_error(pass, &e),
        }
    }

    fn on_mismatch(
        &self,
        pass: &mut Pass<'_>,
        direct: Option<LifecycleState>,
        listed: RemoteSnapshot,
    ) -> Step {
        let direct = direct
            .map(|s| s.to_string())
            .unwrap_or_else(|| "not found".to_string());
        let message = format!(
            "direct read reports {}, list reports {}",
            direct, listed.lifecycle_state
        );
        self.observe(pass, listed);
        pass.status.consistency_retries += 1;

        if pass.status.consistency_retries <= 1 {
            debug!(name = %pass.resource.name, %message, "Read disagreement; re-checking");
            return Step::Done(self.settings.conflict_requeue);
        }

        pass.status.consecutive_failures += 1;
        warn!(name = %pass.resource.name, %message, "Persistent read disagreement");
        pass.manager()
            .set_retrying(reasons::CONSISTENCY_MISMATCH, &message);
        Step::Done(self.backoff(&pass.status))
    }

    /// The remote no longer knows the identified object
    fn on_missing(&self, pass: &mut Pass<'_>) -> Step {
        let in_flight = pass.status.in_flight.clone();

        // a fresh object may not be readable yet
        if let Some(pending) = &in_flight {
            let young = retry::age(&pending.since, pass.now) < self.settings.max_wait;
            if young && (is_create_signature(&pending.signature) || pending.signature.starts_with("Bind:")) {
                pass.manager().set_progressing(
                    ResourcePhase::Provisioning,
                    reasons::AWAITING_CONFIRMATION,
                    "remote object is not readable yet",
                );
                return Step::Done(self.settings.poll_interval);
            }
        }

        let last = pass
            .status
            .last_completed_action
            .clone()
            .or(in_flight.map(|p| p.signature))
            .unwrap_or_default();
        if last.starts_with("Unplug:") {
            pass.status.lifecycle_state = Some(LifecycleState::Unplugged);
            return Step::Continue;
        }
        if last.starts_with("Delete:") {
            pass.status.lifecycle_state = Some(LifecycleState::Terminated);
            return Step::Continue;
        }

        let message = format!(
            "remote object {} no longer exists",
            pass.status.identity.as_deref().unwrap_or_default()
        );
        error!(name = %pass.resource.name, %message, "Remote object missing");
        pass.status.lifecycle_state = Some(LifecycleState::Terminated);
        pass.status.in_flight = None;
        pass.manager()
            .set_failed(reasons::REMOTE_OBJECT_MISSING, &message);
        Step::Done(self.settings.resync_interval)
    }

    /// Identity is unknown but a create may have landed remotely.
    ///
    /// A create whose response was lost is found again by name instead of
    /// being sent twice. Until `max_wait` passes the controller waits for it.
    /// Without a display name the list cannot tell this controller's object
    /// from any other in the compartment, so nothing is adopted: the create
    /// is sent again under the same retry token, which the remote treats as
    /// a repeat of the first.
    async fn recover_pending_create(&self, pass: &mut Pass<'_>) -> Step {
        let Some(pending) = pass.status.in_flight.clone() else {
            return Step::Continue;
        };
        if !is_create_signature(&pending.signature) {
            pass.status.in_flight = None;
            return Step::Continue;
        }

        if pass.resource.list_filter.display_name.is_some() {
            if let Some(found) = self.find_created(pass).await {
                info!(
                    name = %pass.resource.name,
                    identity = %found.id,
                    "Adopted remote object from an earlier create"
                );
                self.observe(pass, found);
                return Step::Continue;
            }
        } else if pass.resource.retry_token().is_some() {
            debug!(
                name = %pass.resource.name,
                action = %pending.signature,
                "No display name to look up; repeating create under its retry token"
            );
            pass.status.in_flight = None;
            return Step::Continue;
        }

        let age = retry::age(&pending.since, pass.now);
        if age < self.settings.max_wait {
            pass.manager().set_progressing(
                ResourcePhase::Provisioning,
                reasons::AWAITING_CONFIRMATION,
                &format!("{} sent, waiting for the remote object to appear", pending.signature),
            );
            return Step::Done(self.settings.poll_interval.min(self.settings.max_wait - age));
        }

        warn!(
            name = %pass.resource.name,
            action = %pending.signature,
            "Create never surfaced remotely; allowing a new attempt"
        );
        pass.status.in_flight = None;
        Step::Continue
    }

    /// The single live object listed under this resource's display name
    async fn find_created(&self, pass: &Pass<'_>) -> Option<RemoteSnapshot> {
        pass.resource.list_filter.display_name.as_ref()?;
        let items = match self.call(pass.actuator.list(&pass.resource.list_filter)).await {
            Ok(items) => items,
            Err(e) => {
                debug!(name = %pass.resource.name, error = %e, "List lookup failed");
                return None;
            }
        };

        let mut candidates: Vec<RemoteSnapshot> = items
            .into_iter()
            .filter(|s| !s.lifecycle_state.is_torn_down())
            .collect();
        if candidates.len() > 1 {
            warn!(
                name = %pass.resource.name,
                count = candidates.len(),
                "Several remote objects match; not adopting any"
            );
            return None;
        }
        candidates.pop()
    }

    /// Hold back re-sending an action the remote has not confirmed yet
    fn track_in_flight(&self, pass: &mut Pass<'_>, action: Option<&CorrectiveAction>) -> Step {
        let Some(pending) = pass.status.in_flight.clone() else {
            return Step::Continue;
        };

        let same = action.is_some_and(|a| a.signature() == pending.signature);
        if same {
            let age = retry::age(&pending.since, pass.now);
            if age < self.settings.max_wait {
                let phase = action.map(phase_for).unwrap_or(ResourcePhase::Updating);
                let message = format!(
                    "{} sent, remote reports {}",
                    pending.signature,
                    pass.observed_label()
                );
                pass.manager()
                    .set_progressing(phase, reasons::AWAITING_CONFIRMATION, &message);
                return Step::Done(self.settings.poll_interval.min(self.settings.max_wait - age));
            }
            warn!(
                name = %pass.resource.name,
                action = %pending.signature,
                "Action not confirmed in time; it may be sent again"
            );
            pass.status.in_flight = None;
            return Step::Continue;
        }

        // the remote is still working on what was sent
        let transitional = pass
            .status
            .lifecycle_state
            .as_ref()
            .is_some_and(LifecycleState::is_transitional);
        if !transitional {
            pass.status.in_flight = None;
        }
        Step::Continue
    }

    fn wait_for_precondition(
        &self,
        pass: &mut Pass<'_>,
        action: &CorrectiveAction,
        expected: StateRule,
    ) -> Duration {
        let signature = action.signature();
        let kind = action.kind();
        let since = match &pass.status.waiting {
            Some(waiting) if waiting.signature == signature => {
                retry::parse_since(&waiting.since, pass.now)
            }
            _ => {
                pass.status.waiting = Some(pass.pending(signature.clone()));
                pass.now
            }
        };

        let policy = self
            .table
            .policy_for(&kind, self.settings.max_wait, self.settings.poll_interval)
            .unwrap_or_else(|| {
                RetryPolicy::new(
                    expected.clone(),
                    self.settings.max_wait,
                    self.settings.poll_interval,
                )
            });

        let message = format!(
            "{} waits for {}, remote reports {}",
            kind,
            expected,
            pass.observed_label()
        );
        match policy.evaluate(since, pass.now) {
            WaitDecision::Poll(delay) => {
                debug!(name = %pass.resource.name, %message, "Precondition not met");
                pass.manager()
                    .set_waiting(reasons::WAITING_FOR_PRECONDITION, &message);
                delay
            }
            WaitDecision::Expired => {
                warn!(name = %pass.resource.name, %message, "Precondition wait expired");
                pass.status.waiting = Some(pass.pending(signature));
                pass.status.consecutive_failures += 1;
                pass.manager()
                    .set_waiting(reasons::PRECONDITION_TIMEOUT, &message);
                self.backoff(&pass.status)
            }
        }
    }

    async fn resolve_credentials(
        &self,
        pass: &Pass<'_>,
        action: &CorrectiveAction,
    ) -> Result<Credentials> {
        let needs = matches!(action, CorrectiveAction::Provision)
            || matches!(action, CorrectiveAction::Pdb(req) if matches!(
                req.action,
                PdbAction::Create | PdbAction::Clone | PdbAction::Plug
            ));
        if !needs {
            return Ok(Credentials::default());
        }

        let mut credentials = Credentials::default();
        if let Some(r) = &pass.resource.admin_name {
            credentials.admin_name = Some(pass.store.read_secret(&r.name, &r.key).await?);
        }
        if let Some(r) = &pass.resource.admin_password {
            credentials.admin_password = Some(pass.store.read_secret(&r.name, &r.key).await?);
        }
        Ok(credentials)
    }

    async fn execute(
        &self,
        pass: &Pass<'_>,
        action: &CorrectiveAction,
        credentials: Credentials,
    ) -> ActuatorResult<Option<RemoteSnapshot>> {
        let actuator = pass.actuator;
        let resource = pass.resource;
        let identity = || {
            pass.status
                .identity
                .clone()
                .ok_or_else(|| ActuatorError::Permanent("no remote identity recorded".to_string()))
        };

        match action {
            CorrectiveAction::Provision => {
                let request = ProvisionRequest {
                    attributes: resource.provisioning_attributes.clone(),
                    admin_password: credentials.admin_password,
                    retry_token: resource.retry_token(),
                };
                let created = match &resource.clone_source {
                    Some(source) => self.call(actuator.clone_database(source, &request)).await?,
                    None => self.call(actuator.create(&request)).await?,
                };
                Ok(Some(created))
            }
            CorrectiveAction::Bind { identity } => {
                let found = self.call(actuator.get(identity)).await?;
                Ok(Some(RemoteSnapshot {
                    id: identity.clone(),
                    ..found
                }))
            }
            CorrectiveAction::UpdateAttributes(changes) => {
                let id = identity()?;
                Ok(Some(self.call(actuator.update(&id, changes)).await?))
            }
            CorrectiveAction::ChangeState(target) => {
                let id = identity()?;
                Ok(Some(
                    self.call(actuator.change_lifecycle_state(&id, target))
                        .await?,
                ))
            }
            CorrectiveAction::Delete { .. } => {
                let id = identity()?;
                self.call(actuator.delete(&id)).await?;
                Ok(None)
            }
            CorrectiveAction::Pdb(request) => {
                let mut request = request.clone();
                request.admin_name = credentials.admin_name;
                request.admin_password = credentials.admin_password;
                match request.action {
                    PdbAction::Create => Ok(Some(self.call(actuator.create_pdb(&request)).await?)),
                    PdbAction::Clone => Ok(Some(self.call(actuator.clone_pdb(&request)).await?)),
                    PdbAction::Plug => Ok(Some(self.call(actuator.plug_pdb(&request)).await?)),
                    PdbAction::Map => Ok(Some(self.call(actuator.map_pdb(&request)).await?)),
                    PdbAction::Modify => Ok(Some(self.call(actuator.modify_pdb(&request)).await?)),
                    PdbAction::Unplug => {
                        self.call(actuator.unplug_pdb(&request)).await?;
                        Ok(None)
                    }
                    PdbAction::Delete => {
                        self.call(actuator.delete_pdb(&request)).await?;
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Send exactly one action
    async fn dispatch(&self, pass: &mut Pass<'_>, action: CorrectiveAction) -> Result<Duration> {
        let kind = action.kind();
        let signature = action.signature();

        let credentials = match self.resolve_credentials(pass, &action).await {
            Ok(credentials) => credentials,
            Err(e) => {
                let message = format!("credentials for {} unavailable: {}", kind, e);
                warn!(name = %pass.resource.name, %message, "Cannot dispatch yet");
                pass.status.consecutive_failures += 1;
                pass.manager()
                    .set_retrying(reasons::CREDENTIALS_UNAVAILABLE, &message);
                return Ok(self.backoff(&pass.status));
            }
        };

        // recorded before the call so a concurrent or repeated pass sees it
        pass.status.in_flight = Some(pass.pending(signature.clone()));
        pass.manager().set_progressing(
            phase_for(&action),
            reasons::ACTION_DISPATCHED,
            &format!("{} sent", kind),
        );
        pass.store.save_status(&pass.status).await?;
        pass.persisted = pass.status.clone();

        info!(
            name = %pass.resource.name,
            namespace = %pass.resource.namespace,
            action = %kind,
            identity = pass.status.identity.as_deref().unwrap_or("-"),
            "Dispatching corrective action"
        );
        pass.dispatched = Some(kind.clone());

        let result = self.execute(pass, &action, credentials).await;
        match result {
            Ok(snapshot) => Ok(self.on_dispatch_success(pass, &action, snapshot)),
            Err(e) => Ok(self.on_dispatch_failure(pass, &action, &e)),
        }
    }

    fn on_dispatch_success(
        &self,
        pass: &mut Pass<'_>,
        action: &CorrectiveAction,
        snapshot: Option<RemoteSnapshot>,
    ) -> Duration {
        pass.status.consecutive_failures = 0;
        if let Some(snapshot) = snapshot {
            self.observe(pass, snapshot);
        }

        match action {
            CorrectiveAction::Pdb(request) => {
                pass.status.last_completed_action = Some(request.signature());
                pass.status.in_flight = None;
                match request.action {
                    PdbAction::Unplug => {
                        pass.status.lifecycle_state = Some(LifecycleState::Unplugged)
                    }
                    PdbAction::Delete => {
                        pass.status.lifecycle_state = Some(LifecycleState::Terminated)
                    }
                    _ => {}
                }
            }
            CorrectiveAction::Bind { .. } => pass.status.in_flight = None,
            _ => {}
        }

        info!(
            name = %pass.resource.name,
            action = %action.kind(),
            identity = pass.status.identity.as_deref().unwrap_or("-"),
            state = %pass.observed_label(),
            "Remote accepted corrective action"
        );
        let message = format!(
            "{} accepted, remote reports {}",
            action.kind(),
            pass.observed_label()
        );
        pass.manager()
            .set_progressing(phase_for(action), reasons::ACTION_DISPATCHED, &message);
        self.settings.poll_interval
    }

    fn on_dispatch_failure(
        &self,
        pass: &mut Pass<'_>,
        action: &CorrectiveAction,
        err: &ActuatorError,
    ) -> Duration {
        let class = err.classify();
        // a create that may have landed keeps its marker so it is not sent twice
        if !(action.creates_object() && class == ErrorClass::Transient) {
            pass.status.in_flight = None;
        }
        pass.status.consecutive_failures += 1;

        let message = format!("{} failed: {}", action.kind(), err);
        match class {
            ErrorClass::Transient => {
                warn!(name = %pass.resource.name, %message, "Transient failure; will retry");
                pass.manager()
                    .set_retrying(reasons::TRANSIENT_FAILURE, &message);
                self.backoff(&pass.status)
            }
            ErrorClass::Conflict => {
                warn!(name = %pass.resource.name, %message, "Remote object busy; re-observing");
                pass.manager().set_retrying(reasons::REMOTE_CONFLICT, &message);
                self.settings.conflict_requeue
            }
            ErrorClass::Permanent => {
                error!(name = %pass.resource.name, %message, "Permanent failure; not retrying");
                pass.status.failed_action = Some(action.signature());
                pass.manager().set_failed(reasons::ACTION_FAILED, &message);
                self.settings.resync_interval
            }
        }
    }

    /// No corrective action is needed: report the observed state
    async fn converged(&self, pass: &mut Pass<'_>) -> Duration {
        pass.status.waiting = None;
        if pass.status.failed_action.take().is_some() {
            pass.manager().clear_failed();
        }

        // a create confirmed through observation completes the one-shot action
        let resource = pass.resource;
        if let Some(request) = resource.pdb_request.as_ref().filter(|_| pass.status.identity.is_some()) {
            if request.action.is_provisioning() || request.action == PdbAction::Map {
                let signature = request.signature();
                if pass.status.last_completed_action.as_deref() != Some(signature.as_str()) {
                    pass.status.last_completed_action = Some(signature);
                    pass.status.in_flight = None;
                }
            }
        }

        let Some(state) = pass.status.lifecycle_state.clone() else {
            pass.manager().set_progressing(
                ResourcePhase::Pending,
                reasons::AWAITING_CONFIRMATION,
                "no remote object yet",
            );
            return self.settings.resync_interval;
        };

        match &state {
            LifecycleState::Failed => {
                pass.manager()
                    .set_failed(reasons::REMOTE_FAILED, "remote reports FAILED");
                return self.settings.resync_interval;
            }
            LifecycleState::Terminated if !teardown_expected(&pass.status) => {
                pass.manager().set_failed(
                    reasons::REMOTE_OBJECT_MISSING,
                    "remote object was terminated outside this controller",
                );
                return self.settings.resync_interval;
            }
            LifecycleState::Unknown(raw) => {
                let message = format!("remote reports unrecognised state {}", raw);
                pass.manager().set_progressing(
                    ResourcePhase::Updating,
                    reasons::REMOTE_TRANSITION,
                    &message,
                );
                return self.settings.poll_interval;
            }
            s if s.is_torn_down() && teardown_expected(&pass.status) => {
                pass.status.consecutive_failures = 0;
                pass.manager()
                    .set_terminated(&format!("remote reports {}", s));
                return self.settings.resync_interval;
            }
            s if s.is_transitional() => {
                let phase = if *s == LifecycleState::Provisioning {
                    ResourcePhase::Provisioning
                } else {
                    ResourcePhase::Updating
                };
                let message = format!("remote reports {}", s);
                pass.manager()
                    .set_progressing(phase, reasons::REMOTE_TRANSITION, &message);
                return self.settings.poll_interval;
            }
            _ => {}
        }

        if state.is_ready() {
            if let Some(delay) = self.materialize_wallet(pass).await {
                return delay;
            }
        }

        pass.status.consecutive_failures = 0;
        pass.manager()
            .set_ready(&format!("remote reports {}", state));
        self.settings.resync_interval
    }

    /// Returns a requeue delay when the wallet still needs work
    async fn materialize_wallet(&self, pass: &mut Pass<'_>) -> Option<Duration> {
        let target = pass.resource.wallet.clone()?;
        let identity = pass.identity()?;

        match wallet::materialize(
            &target,
            &identity,
            pass.actuator,
            pass.store,
            self.settings.call_timeout,
        )
        .await
        {
            Ok(WalletOutcome::Written) | Ok(WalletOutcome::AlreadyPresent) => {
                pass.status.wallet_secret = Some(target.secret_name);
                None
            }
            Err(e) => {
                let message = format!("wallet not materialized: {}", e);
                warn!(name = %pass.resource.name, %message, "Wallet pending");
                pass.status.consecutive_failures += 1;
                pass.manager().set_retrying(reasons::WALLET_PENDING, &message);
                Some(self.backoff(&pass.status))
            }
        }
    }

    /// Deletion preempts every other action
    async fn handle_deletion(&self, mut pass: Pass<'_>) -> Result<PassOutcome> {
        let policy = DeletionPolicy::from_hard_link(pass.resource.hard_link);
        if policy == DeletionPolicy::Detach {
            info!(name = %pass.resource.name, "Detaching; remote object is retained");
            return self.release(pass).await;
        }

        pass.manager().set_deleting("terminating remote object");

        if pass.status.identity.is_none() {
            if let Step::Done(requeue) = self.recover_pending_create(&mut pass).await {
                pass.manager()
                    .set_deleting("waiting for an earlier create before terminating");
                return self.finish(pass, requeue).await;
            }
        }
        let Some(id) = pass.identity() else {
            return self.release(pass).await;
        };

        let observed = match self.call(pass.actuator.get(&id)).await {
            Ok(snapshot) => {
                self.observe(&mut pass, snapshot);
                pass.status.lifecycle_state.clone()
            }
            Err(e) if e.is_not_found() => match self.find_listed(&pass, &id).await {
                Some(listed) => {
                    self.observe(&mut pass, listed);
                    pass.status.lifecycle_state.clone()
                }
                None => None,
            },
            Err(e) => {
                let Step::Done(requeue) = self.on_remote_error(&mut pass, &e) else {
                    return self.finish(pass, self.settings.poll_interval).await;
                };
                return self.finish(pass, requeue).await;
            }
        };

        let signature = CorrectiveAction::Delete { hard: true }.signature();
        let pending_age = pass
            .status
            .in_flight
            .as_ref()
            .filter(|p| p.signature == signature)
            .map(|p| retry::age(&p.since, pass.now));

        match next_step(
            policy,
            Some(&id),
            observed.as_ref(),
            pending_age,
            self.settings.max_wait,
            self.settings.poll_interval,
        ) {
            DeletionStep::Release => self.release(pass).await,
            DeletionStep::AwaitTeardown(delay) => {
                pass.manager()
                    .set_deleting("waiting for the remote object to terminate");
                self.finish(pass, delay).await
            }
            DeletionStep::Dispatch => {
                pass.status.in_flight = Some(pass.pending(signature));
                pass.store.save_status(&pass.status).await?;
                pass.persisted = pass.status.clone();
                pass.dispatched = Some(ActionKind::Delete);
                info!(name = %pass.resource.name, identity = %id, "Terminating remote object");

                match self.call(pass.actuator.delete(&id)).await {
                    Ok(()) => {
                        pass.status.consecutive_failures = 0;
                        self.finish(pass, self.settings.poll_interval).await
                    }
                    Err(e) if e.is_not_found() => self.release(pass).await,
                    Err(e) => {
                        pass.status.in_flight = None;
                        pass.status.consecutive_failures += 1;
                        let message = format!("delete failed: {}", e);
                        let requeue = match e.classify() {
                            ErrorClass::Transient => {
                                warn!(name = %pass.resource.name, %message, "Transient failure; will retry");
                                pass.manager()
                                    .set_retrying(reasons::TRANSIENT_FAILURE, &message);
                                self.backoff(&pass.status)
                            }
                            ErrorClass::Conflict => {
                                pass.manager().set_retrying(reasons::REMOTE_CONFLICT, &message);
                                self.settings.conflict_requeue
                            }
                            ErrorClass::Permanent => {
                                error!(name = %pass.resource.name, %message, "Delete rejected; keeping finalizer");
                                pass.manager().set_failed(reasons::ACTION_FAILED, &message);
                                self.settings.backoff.max_delay
                            }
                        };
                        self.finish(pass, requeue).await
                    }
                }
            }
        }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

fn phase_for(action: &CorrectiveAction) -> ResourcePhase {
    match action {
        CorrectiveAction::Provision | CorrectiveAction::Bind { .. } => ResourcePhase::Provisioning,
        CorrectiveAction::Pdb(request)
            if request.action.is_provisioning() || request.action == PdbAction::Map =>
        {
            ResourcePhase::Provisioning
        }
        CorrectiveAction::Delete { .. } => ResourcePhase::Deleting,
        _ => ResourcePhase::Updating,
    }
}

/// A terminated remote object is expected after this controller deleted or unplugged it
fn teardown_expected(status: &ManagedStatus) -> bool {
    status
        .last_completed_action
        .as_deref()
        .is_some_and(|s| s.starts_with("Delete:") || s.starts_with("Unplug:"))
}
