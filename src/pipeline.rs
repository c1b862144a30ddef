//! Debounced, staleness-aware background checking.
//!
//! The pipeline runs as one task that owns the session of the active
//! surface. Hosts talk to it through a [`PipelineHandle`]; results go out
//! through [`UiSurface::on_result`]. In-flight requests are never cancelled;
//! a response is applied only if its surface is still active and its markup
//! list still equals the surface's current one.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::{next_request_id, CheckRequest, MetaData, RemoteChecker};
use crate::config::Config;
use crate::dedup::{compute_active, SuppressionPolicy};
use crate::error::TransportError;
use crate::markup::MarkupList;
use crate::matches::CheckResponse;
use crate::session::{CheckResult, CheckState, SurfaceId};
use crate::settings::{SettingsStore, UserSettings};
use crate::telemetry::Telemetry;
use crate::ui::UiSurface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub debounce: Duration,
    /// Content shorter than this (UTF-16 units) is not checked in the background.
    pub min_check_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1500),
            min_check_len: 2,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce(),
            min_check_len: config.min_check_len,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Focus moved to a surface; its content is evaluated right away.
    Focus {
        surface: SurfaceId,
        markup: MarkupList,
        meta: MetaData,
    },
    ContentChanged {
        surface: SurfaceId,
        markup: MarkupList,
        meta: MetaData,
    },
    /// Check immediately, regardless of debounce and auto-check settings.
    CheckNow {
        surface: SurfaceId,
        markup: MarkupList,
        meta: MetaData,
    },
    Blur {
        surface: SurfaceId,
    },
    SetAutoCheck(bool),
    Disable,
    Enable,
}

#[derive(Debug, Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl PipelineHandle {
    pub fn send(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("check pipeline has stopped, dropping event");
        }
    }

    pub fn focus(&self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        self.send(PipelineEvent::Focus {
            surface,
            markup,
            meta,
        });
    }

    pub fn content_changed(&self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        self.send(PipelineEvent::ContentChanged {
            surface,
            markup,
            meta,
        });
    }

    pub fn check_now(&self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        self.send(PipelineEvent::CheckNow {
            surface,
            markup,
            meta,
        });
    }

    pub fn blur(&self, surface: SurfaceId) {
        self.send(PipelineEvent::Blur { surface });
    }

    pub fn set_auto_check(&self, enabled: bool) {
        self.send(PipelineEvent::SetAutoCheck(enabled));
    }

    pub fn disable(&self) {
        self.send(PipelineEvent::Disable);
    }

    pub fn enable(&self) {
        self.send(PipelineEvent::Enable);
    }

    /// A handle whose events are read back by the caller instead of a task.
    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Strip everything up to and including the last `Error:` marker.
pub fn clean_error_message(message: &str) -> &str {
    match message.rfind("Error:") {
        Some(pos) => message[pos + "Error:".len()..].trim_start(),
        None => message,
    }
}

/// Start the pipeline task. It runs until every handle is dropped.
pub fn spawn_check_pipeline<C>(
    checker: Arc<C>,
    settings: Arc<dyn SettingsStore>,
    telemetry: Arc<dyn Telemetry>,
    ui: Arc<dyn UiSurface>,
    config: PipelineConfig,
) -> (PipelineHandle, JoinHandle<()>)
where
    C: RemoteChecker + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pipeline = Pipeline {
        checker,
        settings,
        telemetry,
        ui,
        config,
        events: rx,
        in_flight: FuturesUnordered::new(),
        session: None,
        auto_check_override: None,
        disabled: false,
    };
    let task = tokio::spawn(pipeline.run());
    (PipelineHandle { tx }, task)
}

/// Identifies what a response answers.
struct Ticket {
    request_id: u64,
    surface: SurfaceId,
    markup: MarkupList,
    page_url: String,
}

type Pending = BoxFuture<'static, (Ticket, Result<CheckResponse, TransportError>)>;

struct Session {
    surface: SurfaceId,
    current: MarkupList,
    meta: MetaData,
    deadline: Option<Instant>,
    last_dispatched: Option<MarkupList>,
    /// Result for `last_dispatched`, once it arrived.
    cached: Option<CheckState>,
}

impl Session {
    fn new(surface: SurfaceId, markup: MarkupList, meta: MetaData) -> Self {
        Self {
            surface,
            current: markup,
            meta,
            deadline: None,
            last_dispatched: None,
            cached: None,
        }
    }
}

struct Pipeline<C> {
    checker: Arc<C>,
    settings: Arc<dyn SettingsStore>,
    telemetry: Arc<dyn Telemetry>,
    ui: Arc<dyn UiSurface>,
    config: PipelineConfig,
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    in_flight: FuturesUnordered<Pending>,
    session: Option<Session>,
    auto_check_override: Option<bool>,
    disabled: bool,
}

impl<C> Pipeline<C>
where
    C: RemoteChecker + Send + Sync + 'static,
{
    async fn run(mut self) {
        tracing::debug!("check pipeline started");
        loop {
            let deadline = self.session.as_ref().and_then(|s| s.deadline);
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                Some((ticket, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_response(ticket, result);
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_debounce_elapsed();
                }
            }
        }
        tracing::debug!("check pipeline exiting");
    }

    fn handle(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::SetAutoCheck(enabled) => self.auto_check_override = Some(enabled),
            PipelineEvent::Disable => {
                self.disabled = true;
                if let Some(session) = self.session.take() {
                    self.emit_for(&session, CheckState::Idle);
                }
            }
            PipelineEvent::Enable => self.disabled = false,
            _ if self.disabled => tracing::debug!("checking disabled on this page, ignoring event"),
            PipelineEvent::Focus {
                surface,
                markup,
                meta,
            } => self.on_focus(surface, markup, meta),
            PipelineEvent::ContentChanged {
                surface,
                markup,
                meta,
            } => self.on_content_changed(surface, markup, meta),
            PipelineEvent::CheckNow {
                surface,
                markup,
                meta,
            } => self.on_check_now(surface, markup, meta),
            PipelineEvent::Blur { surface } => {
                if self.session.as_ref().is_some_and(|s| s.surface == surface) {
                    if let Some(session) = self.session.take() {
                        tracing::debug!(%surface, "surface blurred, session dropped");
                        self.emit_for(&session, CheckState::Idle);
                    }
                }
            }
        }
    }

    fn on_focus(&mut self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        match self.session.as_mut() {
            Some(session) if session.surface == surface => {
                session.current = markup;
                session.meta = meta;
                session.deadline = None;
            }
            _ => self.session = Some(Session::new(surface, markup, meta)),
        }
        if self.short_circuit() || self.emit_cached() {
            return;
        }
        if self.auto_check_enabled() {
            self.dispatch();
        } else {
            self.emit(CheckState::Idle);
        }
    }

    fn on_content_changed(&mut self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        match self.session.as_mut() {
            Some(session) if session.surface == surface => {
                if session.current == markup {
                    return;
                }
                session.current = markup;
                session.meta = meta;
            }
            _ => self.session = Some(Session::new(surface, markup, meta)),
        }
        if self.short_circuit() {
            return;
        }
        let deadline = Instant::now() + self.config.debounce;
        if let Some(session) = self.session.as_mut() {
            session.deadline = Some(deadline);
        }
        self.emit(CheckState::Debouncing);
    }

    fn on_check_now(&mut self, surface: SurfaceId, markup: MarkupList, meta: MetaData) {
        match self.session.as_mut() {
            Some(session) if session.surface == surface => {
                session.current = markup;
                session.meta = meta;
                session.deadline = None;
            }
            _ => self.session = Some(Session::new(surface, markup, meta)),
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.current.is_blank() {
            self.emit_empty();
        } else if !self.emit_cached() {
            self.dispatch();
        }
    }

    /// Handle blank and too-short content without a request. Returns true
    /// when nothing more should happen for this content.
    fn short_circuit(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        if session.current.is_blank() {
            session.deadline = None;
            self.emit_empty();
            return true;
        }
        if session.current.flat_len() < self.config.min_check_len {
            session.deadline = None;
            self.emit(CheckState::Idle);
            return true;
        }
        false
    }

    fn on_debounce_elapsed(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.deadline = None;
        if self.emit_cached() {
            return;
        }
        if !self.auto_check_enabled() {
            tracing::debug!("auto-check is off for this page");
            self.emit(CheckState::Idle);
            return;
        }
        self.dispatch();
    }

    /// Re-emit the result for identical content. Returns true if the content
    /// was already dispatched.
    fn emit_cached(&mut self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.last_dispatched.as_ref() != Some(&session.current) {
            return false;
        }
        let state = session.cached.clone().unwrap_or(CheckState::InFlight);
        tracing::debug!(surface = %session.surface, "content unchanged since last check");
        self.emit(state);
        true
    }

    fn dispatch(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let ticket = Ticket {
            request_id: next_request_id(),
            surface: session.surface,
            markup: session.current.clone(),
            page_url: session.meta.page_url.clone(),
        };
        session.last_dispatched = Some(session.current.clone());
        session.cached = None;
        tracing::debug!(
            request_id = ticket.request_id,
            surface = %ticket.surface,
            text_len = ticket.markup.flat_len(),
            "dispatching check"
        );

        let request = CheckRequest {
            markup_list: session.current.clone(),
            meta_data: session.meta.clone(),
        };
        let checker = self.checker.clone();
        self.in_flight.push(
            async move {
                let result = checker.check(request).await;
                (ticket, result)
            }
            .boxed(),
        );
        self.emit(CheckState::InFlight);
    }

    fn on_response(&mut self, ticket: Ticket, result: Result<CheckResponse, TransportError>) {
        let settings = self.settings_snapshot();
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(request_id = ticket.request_id, "discarding response, no active surface");
            return;
        };
        if session.surface != ticket.surface {
            tracing::debug!(request_id = ticket.request_id, "discarding response for inactive surface");
            return;
        }
        if session.current != ticket.markup {
            tracing::debug!(request_id = ticket.request_id, "discarding stale response");
            return;
        }

        let state = match result {
            Ok(response) => {
                let text = ticket.markup.flat_text();
                let policy = SuppressionPolicy::from_settings(
                    &settings,
                    response.language.short_code(),
                    Some(text.as_str()),
                );
                let matches = compute_active(&response.matches, &policy);
                tracing::debug!(
                    request_id = ticket.request_id,
                    total = response.matches.len(),
                    active = matches.active_count,
                    "check succeeded"
                );
                let state = CheckState::Succeeded {
                    language: response.language,
                    matches,
                };
                session.cached = Some(state.clone());
                state
            }
            Err(e) => {
                let raw = e.to_string();
                let message = clean_error_message(&raw).to_string();
                tracing::warn!(request_id = ticket.request_id, "check failed: {}", raw);
                self.telemetry
                    .track(&ticket.page_url, &format!("error on check: {}", raw));
                // Not cached, so the next cycle asks again.
                session.last_dispatched = None;
                CheckState::Failed { message }
            }
        };
        self.emit(state);
    }

    fn auto_check_enabled(&self) -> bool {
        if let Some(enabled) = self.auto_check_override {
            return enabled;
        }
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        self.settings_snapshot()
            .domain_policy(&session.meta.page_url)
            .auto_check
    }

    fn settings_snapshot(&self) -> UserSettings {
        self.settings.get().unwrap_or_else(|e| {
            tracing::warn!("failed to read settings, using defaults: {}", e);
            UserSettings::default()
        })
    }

    fn emit_empty(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.last_dispatched = None;
            session.cached = None;
        }
        self.emit(CheckState::empty());
    }

    fn emit(&self, state: CheckState) {
        if let Some(session) = self.session.as_ref() {
            self.emit_for(session, state);
        }
    }

    fn emit_for(&self, session: &Session, state: CheckState) {
        self.ui.on_result(&CheckResult {
            surface: session.surface,
            markup_list: session.current.clone(),
            state,
        });
    }
}
