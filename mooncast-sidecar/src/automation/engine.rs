//! Connection state machine
//!
//! A single tokio task owns the session and processes commands one at a time:
//! start/stop requests, foreground change notifications and timers posted by
//! the scheduler. Handlers never run concurrently and every failure ends in a
//! retry or in `Completed`.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::error::AutomationError;
use super::events::{EngineEvent, EngineStatus, EventSink};
use super::executor::ClickExecutor;
use super::locator::{
    affirmative_candidates, desktop_candidates, dialog_present, host_candidates,
    locate_add_button, locate_address_field, locate_confirm_button, locate_dialog_button,
};
use super::scheduler::{RetryDecision, RetryPolicy, Scheduler, TimerKind};
use super::state::{ConnectionState, SessionContext};
use super::tuning::{ms, AutomationTuning};
use super::validator::{validate_host_list, validate_in_target, ScreenCheck};
use crate::device::platform::{AccessibilityProvider, AppLauncher};
use crate::device::serializer::format_options;
use crate::device::types::{ForegroundEvent, NodeAction, NodeId, UiSnapshot};
use crate::hosts::HostRegistry;

const COMMAND_BUFFER: usize = 64;

/// Work item processed by the engine loop
pub enum EngineCommand {
    Start {
        address: String,
        host_name: Option<String>,
        reply: oneshot::Sender<Uuid>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    ForegroundChanged(ForegroundEvent),
    Timer {
        session_id: Uuid,
        kind: TimerKind,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Package of the streaming client being driven
    pub target_package: String,
    /// Package brought back to the foreground on stop
    pub controller_package: Option<String>,
    pub tuning: AutomationTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_package: "com.limelight".to_string(),
            controller_package: None,
            tuning: AutomationTuning::default(),
        }
    }
}

/// What a handler wants to happen next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Move to `to`, optionally scheduling the next evaluation
    Advance {
        to: ConnectionState,
        next: Option<(TimerKind, Duration)>,
    },
    /// Nothing to do until the next UI event
    Wait,
    /// Stay in the current state and run `TimerKind` later
    Schedule(TimerKind, Duration),
    /// Screen not ready; counts against the state's retry bound
    Retry {
        reason: String,
        delay: Option<Duration>,
    },
    /// End the session in `Completed`
    Finish,
}

type StepResult = std::result::Result<StepOutcome, AutomationError>;

/// Cloneable front end of the engine loop
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    sink: Arc<EventSink>,
}

impl EngineHandle {
    /// Begin a new session, replacing any active one
    pub async fn start(&self, address: &str, host_name: Option<&str>) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Start {
                address: address.to_string(),
                host_name: host_name.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| anyhow!("Automation engine is not running"))?;
        rx.await
            .map_err(|_| anyhow!("Automation engine dropped the start request"))
    }

    /// Force the session to `Completed`
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Stop { reply })
            .await
            .map_err(|_| anyhow!("Automation engine is not running"))?;
        rx.await
            .map_err(|_| anyhow!("Automation engine dropped the stop request"))
    }

    /// Notify the engine that the foreground UI changed.
    ///
    /// Notifications are dropped when the loop is busy; the next one carries
    /// the same information.
    pub fn on_foreground_changed(&self, event: ForegroundEvent) {
        if let Err(e) = self.tx.try_send(EngineCommand::ForegroundChanged(event)) {
            tracing::trace!("Dropped foreground event: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sink.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        self.sink.watch_status().borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<EngineStatus> {
        self.sink.watch_status()
    }
}

/// Loop-owned engine state
pub struct AutomationEngine {
    config: EngineConfig,
    provider: Arc<dyn AccessibilityProvider>,
    launcher: Arc<dyn AppLauncher>,
    registry: Arc<dyn HostRegistry>,
    executor: ClickExecutor,
    scheduler: Scheduler,
    sink: Arc<EventSink>,
    session: Option<SessionContext>,
}

impl AutomationEngine {
    /// Spawn the engine loop. It ends once every handle is dropped.
    pub fn spawn(
        config: EngineConfig,
        provider: Arc<dyn AccessibilityProvider>,
        launcher: Arc<dyn AppLauncher>,
        registry: Arc<dyn HostRegistry>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let sink = Arc::new(EventSink::new());
        let executor = ClickExecutor::new(provider.clone(), ms(config.tuning.focus_settle_ms));

        let engine = AutomationEngine {
            scheduler: Scheduler::new(&tx),
            config,
            provider,
            launcher,
            registry,
            executor,
            sink: sink.clone(),
            session: None,
        };

        let task = tokio::spawn(engine.run(rx));
        (EngineHandle { tx, sink }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EngineCommand>) {
        tracing::info!(
            "Automation engine started for {}",
            self.config.target_package
        );
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("Automation engine stopped");
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start {
                address,
                host_name,
                reply,
            } => {
                let session_id = self.start(address, host_name);
                let _ = reply.send(session_id);
                self.run_step(session_id, TimerKind::Reevaluate).await;
            }
            EngineCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            EngineCommand::ForegroundChanged(event) => self.on_foreground_changed(event).await,
            EngineCommand::Timer { session_id, kind } => {
                self.scheduler.fired(session_id, kind);
                self.run_step(session_id, kind).await;
            }
        }
    }

    fn start(&mut self, address: String, host_name: Option<String>) -> Uuid {
        self.scheduler.cancel_all();
        if let Some(previous) = self.session.as_ref().filter(|s| !s.is_completed()) {
            tracing::info!(
                "Replacing session {} in {}",
                previous.session_id,
                previous.current_state
            );
        }

        if let Some(host) = host_name.as_deref().filter(|h| !h.trim().is_empty()) {
            if let Err(e) = self.registry.put(&address, host) {
                tracing::warn!("Failed to store host name for {}: {}", address, e);
            }
        }

        let ctx = SessionContext::new(address, host_name);
        let session_id = ctx.session_id;
        tracing::info!(
            "Starting session {} for {} ({})",
            session_id,
            ctx.target_address,
            ctx.target_host_name.as_deref().unwrap_or("host name unknown")
        );

        self.sink.emit(EngineEvent::SessionStarted {
            session_id,
            address: ctx.target_address.clone(),
            host_name: ctx.target_host_name.clone(),
        });
        self.sink.publish_status(&ctx);
        self.session = Some(ctx);
        session_id
    }

    async fn stop(&mut self) {
        if let Some(ctx) = self.session.as_mut() {
            if let Some(from) = ctx.complete() {
                tracing::info!("Stopped session {} in {}", ctx.session_id, from);
                self.sink.emit(EngineEvent::StateChanged {
                    session_id: ctx.session_id,
                    from,
                    to: ConnectionState::Completed,
                });
                self.sink.emit(EngineEvent::Stopped {
                    session_id: ctx.session_id,
                });
                self.sink.publish_status(ctx);
            }
        }

        if let Some(controller) = &self.config.controller_package {
            match self.launcher.launch(controller).await {
                Ok(true) => tracing::debug!("Returned focus to {}", controller),
                Ok(false) => tracing::warn!("Controller app {} is not installed", controller),
                Err(e) => tracing::warn!("Failed to return focus to {}: {}", controller, e),
            }
        }
    }

    async fn on_foreground_changed(&mut self, event: ForegroundEvent) {
        if event.package != self.config.target_package {
            return;
        }
        let Some(ctx) = self.session.as_ref() else {
            return;
        };
        if ctx.is_completed() || ctx.dialog_check_in_flight || ctx.confirm_pending {
            return;
        }
        let session_id = ctx.session_id;
        if self.scheduler.has_pending(session_id) {
            tracing::trace!("Timer pending, ignoring {:?} event", event.kind);
            return;
        }

        self.run_step(session_id, TimerKind::Reevaluate).await;
    }

    /// Run one handler against the live session and apply its outcome
    async fn run_step(&mut self, session_id: Uuid, kind: TimerKind) {
        let Some(mut ctx) = self.session.take() else {
            return;
        };

        if ctx.session_id != session_id {
            tracing::debug!("Dropping {:?} of stale session {}", kind, session_id);
        } else if !ctx.is_completed() {
            let result = self.step(&mut ctx, kind).await;
            self.apply(&mut ctx, result);
        }

        self.session = Some(ctx);
    }

    async fn step(&self, ctx: &mut SessionContext, kind: TimerKind) -> StepResult {
        match kind {
            TimerKind::Reevaluate => match ctx.current_state {
                ConnectionState::LaunchApp => self.launch_app().await,
                ConnectionState::FindAddButton => self.find_add_button(ctx).await,
                ConnectionState::EnterAddress => self.enter_address(ctx).await,
                ConnectionState::FindHostButton => self.find_host_button(ctx).await,
                ConnectionState::SelectDesktop => self.select_desktop(ctx).await,
                ConnectionState::Completed => Ok(StepOutcome::Wait),
            },
            TimerKind::RetrySetText => {
                let result = self.retype_address(ctx).await;
                if result.is_err() {
                    ctx.confirm_pending = false;
                }
                result
            }
            TimerKind::ConfirmAddress => {
                let result = self.confirm_address(ctx).await;
                if result.is_err() {
                    ctx.confirm_pending = false;
                }
                result
            }
            TimerKind::DialogCheck { attempt } => self.check_dialog(ctx, attempt).await,
            TimerKind::DialogVerify { attempt } => self.verify_dialog(ctx, attempt).await,
        }
    }

    fn apply(&mut self, ctx: &mut SessionContext, result: StepResult) {
        match result {
            Ok(StepOutcome::Advance { to, next }) => self.advance(ctx, to, next),
            Ok(StepOutcome::Wait) => {}
            Ok(StepOutcome::Schedule(kind, delay)) => {
                self.scheduler.schedule(ctx.session_id, kind, delay);
            }
            Ok(StepOutcome::Retry { reason, delay }) => self.retry(ctx, reason, delay),
            Ok(StepOutcome::Finish) => {
                tracing::info!("Connection sequence finished for {}", ctx.target_address);
                self.advance(ctx, ConnectionState::Completed, None);
            }
            Err(e) if e.is_retryable() => self.retry(ctx, e.to_string(), None),
            Err(e) => {
                tracing::error!("Session {} failed: {}", ctx.session_id, e);
                self.give_up(ctx, e.to_string());
            }
        }
        self.sink.publish_status(ctx);
    }

    fn advance(
        &mut self,
        ctx: &mut SessionContext,
        to: ConnectionState,
        next: Option<(TimerKind, Duration)>,
    ) {
        match ctx.advance_to(to) {
            Ok(from) => {
                tracing::info!("Session {}: {} -> {}", ctx.session_id, from, to);
                self.sink.emit(EngineEvent::StateChanged {
                    session_id: ctx.session_id,
                    from,
                    to,
                });
                if let Some((kind, delay)) = next.filter(|_| !to.is_terminal()) {
                    self.scheduler.schedule(ctx.session_id, kind, delay);
                }
            }
            Err(e) => tracing::warn!("Session {}: {}", ctx.session_id, e),
        }
    }

    fn retry(&mut self, ctx: &mut SessionContext, reason: String, delay: Option<Duration>) {
        let state = ctx.current_state;
        let policy = RetryPolicy::for_state(state, &self.config.tuning);

        match policy.decide(ctx.step_retry_count) {
            RetryDecision::WaitForEvent => {
                tracing::debug!("{} waiting for the next UI event: {}", state, reason);
            }
            RetryDecision::Retry {
                attempt,
                delay: default_delay,
            } => {
                let delay = delay.unwrap_or(default_delay);
                ctx.record_retry();
                tracing::warn!(
                    "{} retry {} in {}ms: {}",
                    state,
                    attempt,
                    delay.as_millis(),
                    reason
                );
                self.sink.emit(EngineEvent::RetryScheduled {
                    session_id: ctx.session_id,
                    state,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason,
                });
                self.scheduler
                    .schedule(ctx.session_id, TimerKind::Reevaluate, delay);
            }
            RetryDecision::GiveUp { retries } => {
                let exhausted = AutomationError::StepExhaustion { state, retries };
                self.give_up(ctx, format!("{} ({})", exhausted, reason));
            }
        }
    }

    fn give_up(&mut self, ctx: &mut SessionContext, reason: String) {
        let state = ctx.current_state;
        tracing::info!("Giving up session {} in {}: {}", ctx.session_id, state, reason);
        self.sink.emit(EngineEvent::GaveUp {
            session_id: ctx.session_id,
            state,
            reason,
        });
        if let Some(from) = ctx.complete() {
            self.sink.emit(EngineEvent::StateChanged {
                session_id: ctx.session_id,
                from,
                to: ConnectionState::Completed,
            });
        }
        self.scheduler.cancel_all();
    }

    async fn snapshot(&self) -> std::result::Result<Option<UiSnapshot>, AutomationError> {
        self.provider
            .current_foreground_tree()
            .await
            .map_err(|e| AutomationError::transient(format!("Snapshot failed: {}", e)))
    }

    /// Snapshot of the target app's window, or a transient error
    async fn target_snapshot(&self) -> std::result::Result<UiSnapshot, AutomationError> {
        match self.snapshot().await? {
            Some(snapshot) if snapshot.package() == Some(self.config.target_package.as_str()) => {
                Ok(snapshot)
            }
            Some(snapshot) => Err(AutomationError::transient(format!(
                "foreground is {}",
                snapshot.package().unwrap_or("unknown")
            ))),
            None => Err(AutomationError::transient("no active window")),
        }
    }

    async fn activate(
        &self,
        ctx: &SessionContext,
        snapshot: &UiSnapshot,
        node: NodeId,
        what: &str,
    ) -> bool {
        let report = self.executor.activate(snapshot, node).await;
        for attempt in &report.attempts {
            self.sink.emit(EngineEvent::ActivationAttempt {
                session_id: ctx.session_id,
                strategy: attempt.strategy,
                outcome: attempt.outcome.clone(),
            });
        }

        match report.winning_strategy() {
            Some(strategy) => {
                tracing::debug!("Activated {} via {}", what, strategy);
                true
            }
            None => {
                tracing::warn!("No click strategy activated {}", what);
                false
            }
        }
    }

    async fn perform(&self, snapshot: &UiSnapshot, node: NodeId, action: NodeAction) -> bool {
        let name = action.to_string();
        match self.provider.perform_action(snapshot, node, action).await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("{} on node {} failed: {}", name, node.0, e);
                false
            }
        }
    }

    async fn launch_app(&self) -> StepResult {
        let package = &self.config.target_package;
        match self.launcher.launch(package).await {
            Ok(true) => Ok(StepOutcome::Advance {
                to: ConnectionState::FindAddButton,
                next: Some((
                    TimerKind::Reevaluate,
                    ms(self.config.tuning.launch_settle_ms),
                )),
            }),
            Ok(false) => Err(AutomationError::Environment(format!(
                "{} is not installed",
                package
            ))),
            Err(e) => Err(AutomationError::Environment(format!(
                "Failed to launch {}: {}",
                package, e
            ))),
        }
    }

    async fn find_add_button(&self, ctx: &SessionContext) -> StepResult {
        let snapshot = self.target_snapshot().await?;
        let tuning = &self.config.tuning;

        let Some(button) = locate_add_button(&snapshot, tuning) else {
            return Err(AutomationError::transient(format!(
                "{} clickable elements, add control expected at {}",
                snapshot.clickable_nodes().len(),
                tuning.add_button_position
            )));
        };

        if self
            .activate(ctx, &snapshot, button.node.id(), "add host control")
            .await
        {
            Ok(StepOutcome::Advance {
                to: ConnectionState::EnterAddress,
                next: Some((TimerKind::Reevaluate, ms(tuning.step_delay_ms))),
            })
        } else {
            Err(AutomationError::activation("add host control"))
        }
    }

    async fn enter_address(&self, ctx: &mut SessionContext) -> StepResult {
        if ctx.confirm_pending {
            return Ok(StepOutcome::Wait);
        }
        let snapshot = self.target_snapshot().await?;
        let tuning = &self.config.tuning;

        let Some(field) = locate_address_field(&snapshot) else {
            tracing::debug!("{}", format_options(&snapshot));
            return Err(AutomationError::transient("no editable address field"));
        };
        let field_id = field.node.id();
        let confirm = (TimerKind::ConfirmAddress, ms(tuning.confirm_delay_ms));

        if field.node.text.as_deref().map(str::trim) == Some(ctx.target_address.as_str()) {
            tracing::debug!("Address already entered");
            ctx.confirm_pending = true;
            return Ok(StepOutcome::Schedule(confirm.0, confirm.1));
        }

        if !self.perform(&snapshot, field_id, NodeAction::Focus).await {
            tracing::debug!("Address field refused focus");
        }

        let text = NodeAction::SetText(ctx.target_address.clone());
        if self.perform(&snapshot, field_id, text).await {
            ctx.confirm_pending = true;
            return Ok(StepOutcome::Schedule(confirm.0, confirm.1));
        }

        tracing::warn!("Set text refused, selecting all before retrying");
        self.perform(&snapshot, field_id, NodeAction::SelectAll)
            .await;
        ctx.confirm_pending = true;
        Ok(StepOutcome::Schedule(
            TimerKind::RetrySetText,
            ms(tuning.set_text_retry_ms),
        ))
    }

    async fn retype_address(&self, ctx: &SessionContext) -> StepResult {
        if ctx.current_state != ConnectionState::EnterAddress {
            return Ok(StepOutcome::Wait);
        }
        let snapshot = self.target_snapshot().await?;
        let Some(field) = locate_address_field(&snapshot) else {
            return Err(AutomationError::transient("address field disappeared"));
        };

        let text = NodeAction::SetText(ctx.target_address.clone());
        if self.perform(&snapshot, field.node.id(), text).await {
            Ok(StepOutcome::Schedule(
                TimerKind::ConfirmAddress,
                ms(self.config.tuning.confirm_delay_ms),
            ))
        } else {
            Err(AutomationError::transient("address field rejected the text twice"))
        }
    }

    async fn confirm_address(&self, ctx: &SessionContext) -> StepResult {
        if ctx.current_state != ConnectionState::EnterAddress {
            return Ok(StepOutcome::Wait);
        }
        let snapshot = self.target_snapshot().await?;

        let Some(button) = locate_confirm_button(&snapshot) else {
            tracing::debug!("{}", format_options(&snapshot));
            return Err(AutomationError::transient("no confirm control"));
        };

        if self
            .activate(ctx, &snapshot, button.node.id(), "confirm control")
            .await
        {
            Ok(StepOutcome::Advance {
                to: ConnectionState::FindHostButton,
                next: Some((
                    TimerKind::Reevaluate,
                    ms(self.config.tuning.host_list_delay_ms),
                )),
            })
        } else {
            Err(AutomationError::activation("confirm control"))
        }
    }

    /// Host name from the session, else from the registry
    fn resolve_host_name(&self, ctx: &mut SessionContext) -> Option<String> {
        if ctx.target_host_name.is_none() {
            match self.registry.get(&ctx.target_address) {
                Ok(Some(name)) => {
                    tracing::debug!("Host name for {} from registry: {}", ctx.target_address, name);
                    ctx.target_host_name = Some(name);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Host registry lookup failed: {}", e),
            }
        }
        ctx.target_host_name.clone()
    }

    async fn find_host_button(&self, ctx: &mut SessionContext) -> StepResult {
        let host = self.resolve_host_name(ctx);
        let tuning = &self.config.tuning;
        let snapshot = self.snapshot().await?;

        let check = validate_host_list(
            snapshot.as_ref(),
            &self.config.target_package,
            host.as_deref(),
            tuning,
        );
        if !check.is_ready() {
            return Ok(StepOutcome::Retry {
                reason: check.describe(),
                delay: check.recheck_delay(tuning),
            });
        }
        let Some(snapshot) = snapshot else {
            return Err(AutomationError::transient("no active window"));
        };

        if let (ScreenCheck::Ready { host_visible: false }, Some(host)) = (&check, &host) {
            tracing::info!("{} not on screen, using structural fallbacks", host);
        }

        let candidates = host_candidates(&snapshot, host.as_deref(), tuning);
        if candidates.is_empty() {
            tracing::debug!("{}", format_options(&snapshot));
            return Err(AutomationError::transient("no host candidates"));
        }

        for candidate in candidates {
            tracing::debug!("Trying host candidate {:?}", candidate.method);
            if self
                .activate(ctx, &snapshot, candidate.node.id(), "host tile")
                .await
            {
                return Ok(StepOutcome::Advance {
                    to: ConnectionState::SelectDesktop,
                    next: Some((TimerKind::Reevaluate, ms(tuning.step_delay_ms))),
                });
            }
        }

        Err(AutomationError::activation(
            host.unwrap_or_else(|| "host tile".to_string()),
        ))
    }

    async fn select_desktop(&self, ctx: &mut SessionContext) -> StepResult {
        let tuning = &self.config.tuning;
        let snapshot = self.snapshot().await?;

        let check = validate_in_target(snapshot.as_ref(), &self.config.target_package, tuning);
        if !check.is_ready() {
            return Err(AutomationError::transient(check.describe()));
        }
        let Some(snapshot) = snapshot else {
            return Err(AutomationError::transient("no active window"));
        };

        let candidates = desktop_candidates(&snapshot, tuning);
        if candidates.is_empty() {
            tracing::debug!("{}", format_options(&snapshot));
            return Err(AutomationError::transient("no Desktop control"));
        }

        for candidate in candidates {
            tracing::debug!("Trying Desktop candidate {:?}", candidate.method);
            if self
                .activate(ctx, &snapshot, candidate.node.id(), "Desktop")
                .await
            {
                ctx.dialog_check_in_flight = true;
                return Ok(StepOutcome::Schedule(
                    TimerKind::DialogCheck { attempt: 0 },
                    tuning.dialog_delay(0),
                ));
            }
        }

        Err(AutomationError::activation("Desktop"))
    }

    /// Target-app snapshot for the dialog steps; `None` means the client left
    /// the foreground
    async fn dialog_snapshot(&self) -> std::result::Result<Option<UiSnapshot>, AutomationError> {
        Ok(self
            .snapshot()
            .await?
            .filter(|s| s.package() == Some(self.config.target_package.as_str())))
    }

    async fn check_dialog(&self, ctx: &mut SessionContext, attempt: u32) -> StepResult {
        if !ctx.dialog_check_in_flight {
            return Ok(StepOutcome::Wait);
        }

        let snapshot = match self.dialog_snapshot().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("Client left the foreground, streaming started");
                return Ok(StepOutcome::Finish);
            }
            Err(e) => {
                tracing::warn!("Session dialog check {} failed: {}", attempt, e);
                return Ok(self.next_dialog_attempt(ctx, attempt, None).await);
            }
        };

        match locate_dialog_button(&snapshot) {
            Some(button) => {
                if self
                    .activate(ctx, &snapshot, button.node.id(), "session dialog")
                    .await
                {
                    return Ok(StepOutcome::Schedule(
                        TimerKind::DialogVerify { attempt },
                        ms(self.config.tuning.dialog_verify_ms),
                    ));
                }
            }
            None => tracing::debug!("No session dialog on attempt {}", attempt),
        }

        Ok(self.next_dialog_attempt(ctx, attempt, Some(&snapshot)).await)
    }

    async fn verify_dialog(&self, ctx: &mut SessionContext, attempt: u32) -> StepResult {
        if !ctx.dialog_check_in_flight {
            return Ok(StepOutcome::Wait);
        }

        match self.dialog_snapshot().await {
            Ok(Some(snapshot)) if dialog_present(&snapshot) => {
                tracing::warn!("Session dialog still showing after attempt {}", attempt);
                Ok(self.next_dialog_attempt(ctx, attempt, Some(&snapshot)).await)
            }
            Ok(_) => {
                tracing::info!("Session dialog resolved");
                Ok(StepOutcome::Finish)
            }
            Err(e) => {
                tracing::warn!("Session dialog verification failed: {}", e);
                Ok(self.next_dialog_attempt(ctx, attempt, None).await)
            }
        }
    }

    async fn next_dialog_attempt(
        &self,
        ctx: &SessionContext,
        attempt: u32,
        snapshot: Option<&UiSnapshot>,
    ) -> StepOutcome {
        let next = attempt + 1;
        if next < self.config.tuning.dialog_attempts {
            return StepOutcome::Schedule(
                TimerKind::DialogCheck { attempt: next },
                self.config.tuning.dialog_delay(next),
            );
        }

        if let Some(snapshot) = snapshot.filter(|s| dialog_present(s)) {
            self.dialog_fallback(ctx, snapshot).await;
        }
        StepOutcome::Finish
    }

    /// Last resort once the dialog attempts are used up
    async fn dialog_fallback(&self, ctx: &SessionContext, snapshot: &UiSnapshot) {
        let tuning = &self.config.tuning;
        tracing::info!("Session dialog unresolved, trying affirmative controls");

        for candidate in affirmative_candidates(snapshot, tuning) {
            if self
                .activate(ctx, snapshot, candidate.node.id(), "affirmative control")
                .await
            {
                return;
            }
        }

        tracing::debug!("{}", format_options(snapshot));
        for node in snapshot
            .clickable_nodes()
            .into_iter()
            .take(tuning.blind_click_count)
        {
            if self.executor.click(snapshot, node.id()).await {
                tracing::info!("Blind click on {:?} accepted", node);
                return;
            }
        }

        tracing::warn!("Nothing resolved the session dialog, completing anyway");
    }
}
