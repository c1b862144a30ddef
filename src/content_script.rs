//! Per-page glue between the host (popup, toolbar, background script) and
//! the locator, pipeline and applier.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::api::{MetaData, RemoteChecker};
use crate::apply::{Applied, Correction, CorrectionApplier, DelaySettle, SettleSignal};
use crate::dedup::{compute_active, SuppressionPolicy};
use crate::dom::SharedDocument;
use crate::error::ApplyError;
use crate::markup::{utf16_len, MarkupList};
use crate::matches::CheckResponse;
use crate::config::Config;
use crate::pipeline::{spawn_check_pipeline, PipelineConfig, PipelineHandle};
use crate::session::{CheckResult, CheckState};
use crate::settings::{hostname, SettingsPatch, SettingsStore, UserSettings};
use crate::surface::{CheckText, Surface, SurfaceLocator};
use crate::telemetry::Telemetry;
use crate::ui::UiSurface;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageSettings {
    #[serde(default)]
    pub init_language: String,
    #[serde(default)]
    pub manually_selected_language: String,
}

fn editable_by_default() -> bool {
    true
}

/// Messages the host sends to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostRequest {
    #[serde(rename_all = "camelCase")]
    CheckText { page_url: String },
    GetCurrentText,
    #[serde(rename_all = "camelCase")]
    ApplyCorrection {
        markup_list: MarkupList,
        error_offset: usize,
        error_text: String,
        replacement: String,
        page_url: String,
        /// Echo of `isEditableText` from the `checkText` answer.
        #[serde(default = "editable_by_default")]
        is_editable_text: bool,
    },
    /// Drop the host's auto-check opt-in for this page session. The global
    /// auto-check setting keeps applying unless the host is ignored.
    TurnOffAutoCheck,
    ReactivateIcon,
    ShowErrorNumberOnMarker {
        #[serde(default)]
        data: Option<CheckResponse>,
    },
    SaveLanguagesSettings { data: LanguageSettings },
    GetLanguagesSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HostResponse {
    CheckText(CheckText),
    MarkupList(MarkupList),
    Languages(LanguageSettings),
    #[serde(rename_all = "camelCase")]
    ErrorCount { total_errors: usize },
    Error { message: String },
}

/// Shared services a page needs.
pub struct Services {
    pub pipeline: PipelineHandle,
    pub settings: Arc<dyn SettingsStore>,
    pub telemetry: Arc<dyn Telemetry>,
    pub ui: Arc<dyn UiSurface>,
}

pub struct ContentScript<S = DelaySettle> {
    locator: SurfaceLocator,
    page_url: String,
    email: Option<String>,
    pipeline: PipelineHandle,
    applier: CorrectionApplier<S>,
    settings: Arc<dyn SettingsStore>,
    telemetry: Arc<dyn Telemetry>,
    ui: Arc<dyn UiSurface>,
    focus_settle: Duration,
    disabled_on_domain: bool,
    languages: LanguageSettings,
}

impl ContentScript<DelaySettle> {
    /// Spawn a pipeline for `checker` and attach a page to it, with every
    /// delay taken from `config`.
    pub fn start<C>(
        document: SharedDocument,
        page_url: impl Into<String>,
        checker: Arc<C>,
        settings: Arc<dyn SettingsStore>,
        telemetry: Arc<dyn Telemetry>,
        ui: Arc<dyn UiSurface>,
        config: &Config,
    ) -> (Self, JoinHandle<()>)
    where
        C: RemoteChecker + Send + Sync + 'static,
    {
        let (pipeline, task) = spawn_check_pipeline(
            checker,
            settings.clone(),
            telemetry.clone(),
            ui.clone(),
            PipelineConfig::from(config),
        );
        let script = Self::new(
            document,
            page_url,
            Services {
                pipeline,
                settings,
                telemetry,
                ui,
            },
            CorrectionApplier::new(DelaySettle(config.settle_delay())),
            config.focus_settle_delay(),
        );
        (script, task)
    }
}

impl<S: SettleSignal> ContentScript<S> {
    pub fn new(
        document: SharedDocument,
        page_url: impl Into<String>,
        services: Services,
        applier: CorrectionApplier<S>,
        focus_settle: Duration,
    ) -> Self {
        let page_url = page_url.into();
        let mut locator =
            SurfaceLocator::new(document, page_url.clone(), services.telemetry.clone());

        let blur = services.pipeline.clone();
        locator.subscribe(Box::new(move |change| {
            if let Some(previous) = change.previous {
                blur.blur(previous);
            }
        }));

        let mut script = Self {
            locator,
            page_url,
            email: None,
            pipeline: services.pipeline,
            applier,
            settings: services.settings,
            telemetry: services.telemetry,
            ui: services.ui,
            focus_settle,
            disabled_on_domain: false,
            languages: LanguageSettings::default(),
        };
        if script.load_settings().domain_policy(&script.page_url).disabled {
            tracing::info!(page_url = %script.page_url, "checking is disabled on this domain");
            script.disabled_on_domain = true;
            script.pipeline.disable();
        }
        script
    }

    /// Address of the signed-in user, if the page exposes one. Only its local
    /// part is ever sent.
    pub fn set_email(&mut self, email: Option<String>) {
        self.email = email;
    }

    pub fn locator(&self) -> &SurfaceLocator {
        &self.locator
    }

    pub fn is_disabled_on_domain(&self) -> bool {
        self.disabled_on_domain
    }

    fn meta(&self, page_url: &str) -> MetaData {
        MetaData::new(page_url, self.email.as_deref())
    }

    fn load_settings(&self) -> UserSettings {
        self.settings.get().unwrap_or_else(|e| {
            tracing::warn!("failed to read settings, using defaults: {}", e);
            UserSettings::default()
        })
    }

    /// Handle a raw JSON message. Unknown actions are reported to the user.
    pub async fn handle_message(&mut self, message: &str) -> Option<HostResponse> {
        match serde_json::from_str::<HostRequest>(message) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let action = serde_json::from_str::<serde_json::Value>(message)
                    .ok()
                    .and_then(|v| v.get("action").and_then(|a| a.as_str()).map(str::to_string))
                    .unwrap_or_default();
                tracing::warn!(action = %action, "unhandled host message: {}", e);
                let text = format!("Unknown action: {}", action);
                self.ui.alert(&text);
                self.telemetry.track("internal", &text);
                None
            }
        }
    }

    pub async fn handle(&mut self, request: HostRequest) -> Option<HostResponse> {
        match request {
            HostRequest::CheckText { page_url } => {
                let meta = self.meta(&page_url);
                Some(match self.locator.check_text(meta) {
                    Ok(text) => HostResponse::CheckText(text),
                    Err(e) => HostResponse::Error {
                        message: e.to_string(),
                    },
                })
            }
            HostRequest::GetCurrentText => Some(match self.locator.current_markup_list() {
                Ok(list) => HostResponse::MarkupList(list),
                Err(e) => HostResponse::Error {
                    message: e.to_string(),
                },
            }),
            HostRequest::ApplyCorrection {
                markup_list,
                error_offset,
                error_text,
                replacement,
                page_url,
                is_editable_text,
            } => {
                let correction = Correction {
                    markup_list,
                    offset: error_offset,
                    length: utf16_len(&error_text),
                    replacement,
                    editable: is_editable_text,
                };
                // Failures were already shown to the user and tracked.
                if let Ok(applied) = self.apply(&correction, &page_url).await {
                    tracing::info!(?applied, "correction applied on host request");
                }
                None
            }
            HostRequest::TurnOffAutoCheck => {
                // Only this host's opt-in is dropped; the global switch still applies.
                let global = self.load_settings().global_auto_check(&self.page_url);
                self.pipeline.set_auto_check(global);
                None
            }
            HostRequest::ReactivateIcon => {
                self.disabled_on_domain = false;
                self.pipeline.enable();
                None
            }
            HostRequest::ShowErrorNumberOnMarker { data } => {
                let total_errors = self.show_error_number(data.unwrap_or_default());
                Some(HostResponse::ErrorCount { total_errors })
            }
            HostRequest::SaveLanguagesSettings { data } => {
                self.languages = data;
                None
            }
            HostRequest::GetLanguagesSettings => {
                Some(HostResponse::Languages(self.languages.clone()))
            }
        }
    }

    /// Called after the page's focus moved. Waits for the focus to settle,
    /// then hands the new surface's content to the pipeline.
    pub async fn on_focus_change(&mut self) -> Option<Surface> {
        if !self.focus_settle.is_zero() {
            tokio::time::sleep(self.focus_settle).await;
        }
        let active = self.locator.document().borrow().active_element();
        let surface = self.locator.on_focus_change(active)?;
        if self.disabled_on_domain {
            return Some(surface);
        }
        match self.locator.current_markup_list() {
            Ok(list) => self
                .pipeline
                .focus(surface.id, list, self.meta(&self.page_url)),
            Err(e) => tracing::debug!("focused surface has no readable content: {}", e),
        }
        Some(surface)
    }

    /// Called on every input event of the page.
    pub fn on_input(&self) {
        if self.disabled_on_domain {
            return;
        }
        let Some(surface) = self.locator.surface() else {
            return;
        };
        match self.locator.current_markup_list() {
            Ok(list) => self
                .pipeline
                .content_changed(surface.id, list, self.meta(&self.page_url)),
            Err(e) => tracing::debug!("input on unreadable surface: {}", e),
        }
    }

    /// The user asked for a check of the focused surface (marker click).
    pub fn check_now(&self) {
        let Some(surface) = self.locator.surface() else {
            return;
        };
        match self.locator.current_markup_list() {
            Ok(list) => self
                .pipeline
                .check_now(surface.id, list, self.meta(&self.page_url)),
            Err(e) if e.is_benign() => self
                .telemetry
                .track(&self.page_url, &format!("error on check - surface: {}", e)),
            Err(e) => self.ui.alert(&e.to_string()),
        }
    }

    /// Apply an accepted suggestion to the focused surface. Failures are
    /// reported to the user and to telemetry.
    pub async fn apply(
        &self,
        correction: &Correction,
        page_url: &str,
    ) -> Result<Applied, ApplyError> {
        let document = self.locator.document().clone();
        let target = self
            .locator
            .surface()
            .map(|s| s.element)
            .or_else(|| document.borrow().active_element());

        let result = match target {
            Some(target) => self.applier.apply(&document, target, correction).await,
            None => Err(ApplyError::NoSurface),
        };
        match &result {
            Ok(applied) => {
                tracing::debug!(?applied, "correction applied");
                self.on_input();
            }
            Err(e) => {
                tracing::warn!("correction failed: {}", e);
                self.ui.alert(e.user_message());
                self.telemetry
                    .track(page_url, &format!("Problem in applyCorrection: {}", e));
            }
        }
        result
    }

    /// Re-evaluate a pushed check response against the user's settings and
    /// show its error count.
    pub fn show_error_number(&self, response: CheckResponse) -> usize {
        let settings = self.load_settings();
        let text = self
            .locator
            .current_markup_list()
            .ok()
            .map(|list| list.flat_text());
        let policy = SuppressionPolicy::from_settings(
            &settings,
            response.language.short_code(),
            text.as_deref(),
        );
        let matches = compute_active(&response.matches, &policy);
        let total = matches.active_count;

        if let Some(surface) = self.locator.surface() {
            self.ui.on_result(&CheckResult {
                surface: surface.id,
                markup_list: self.locator.current_markup_list().unwrap_or_default(),
                state: CheckState::Succeeded {
                    language: response.language,
                    matches,
                },
            });
        }
        total
    }

    /// Stop checking on this host, now and in future sessions.
    pub fn disable_on_domain(&mut self) {
        self.disabled_on_domain = true;
        self.pipeline.disable();
        let Some(host) = hostname(&self.page_url) else {
            return;
        };
        let mut domains = self.load_settings().disabled_domains;
        if !domains.contains(&host) {
            domains.push(host.clone());
        }
        self.store(SettingsPatch {
            disabled_domains: Some(domains),
            ..Default::default()
        });
        self.telemetry.track(&host, "checking disabled on domain");
    }

    /// Flip auto-check for this host and persist the choice.
    pub fn toggle_auto_check_on_domain(&mut self) -> bool {
        let Some(host) = hostname(&self.page_url) else {
            return false;
        };
        let mut domains = self.load_settings().auto_check_on_domains;
        let enabled = !domains.contains(&host);
        if enabled {
            domains.push(host.clone());
        } else {
            domains.retain(|d| *d != host);
        }
        self.store(SettingsPatch {
            auto_check_on_domains: Some(domains),
            ..Default::default()
        });
        self.pipeline
            .set_auto_check(enabled || self.load_settings().global_auto_check(&self.page_url));
        self.telemetry.track(
            &host,
            if enabled {
                "auto-check activated"
            } else {
                "auto-check deactivated"
            },
        );
        if enabled {
            self.check_now();
        }
        enabled
    }

    fn store(&self, patch: SettingsPatch) {
        if let Err(e) = self.settings.set(patch) {
            tracing::warn!("failed to save settings: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use tokio::sync::mpsc;

    use super::*;
    use crate::dom::{Document, EventKind};
    use crate::error::ExtractionError;
    use crate::matches::{Language, Match, MatchContext, Rule};
    use crate::pipeline::PipelineEvent;
    use crate::settings::MemoryStore;
    use crate::telemetry::MemoryTelemetry;
    use crate::ui::RecordingUi;

    struct Immediate;

    impl SettleSignal for Immediate {
        fn settle(&self) -> impl Future<Output = ()> {
            std::future::ready(())
        }
    }

    struct Page {
        script: ContentScript<Immediate>,
        document: SharedDocument,
        events: mpsc::UnboundedReceiver<PipelineEvent>,
        settings: Arc<MemoryStore>,
        telemetry: Arc<MemoryTelemetry>,
        ui: Arc<RecordingUi>,
    }

    impl Page {
        fn drain(&mut self) -> Vec<PipelineEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn page(html: &str, settings: UserSettings) -> Page {
        let document = Document::from_body_html(html).into_shared();
        let (pipeline, events) = PipelineHandle::channel();
        let settings = Arc::new(MemoryStore::new(settings));
        let telemetry = Arc::new(MemoryTelemetry::default());
        let ui = Arc::new(RecordingUi::default());
        let script = ContentScript::new(
            document.clone(),
            "https://mail.example.com/compose",
            Services {
                pipeline,
                settings: settings.clone(),
                telemetry: telemetry.clone(),
                ui: ui.clone(),
            },
            CorrectionApplier::new(Immediate),
            Duration::ZERO,
        );
        Page {
            script,
            document,
            events,
            settings,
            telemetry,
            ui,
        }
    }

    fn focus_first(page: &Page) {
        let mut doc = page.document.borrow_mut();
        let el = doc.element_children(doc.body())[0];
        doc.focus(el).unwrap();
    }

    #[tokio::test]
    async fn check_text_reads_the_focused_field() {
        let mut page = page("<textarea>Ths is a tset.</textarea>", UserSettings::default());
        focus_first(&page);
        page.script.set_email(Some("jane@example.org".into()));

        let response = page
            .script
            .handle_message(r#"{"action":"checkText","pageUrl":"https://mail.example.com/compose"}"#)
            .await;
        let Some(HostResponse::CheckText(text)) = response else {
            panic!("unexpected response {:?}", response);
        };
        assert!(text.is_editable_text);
        assert_eq!(text.markup_list, MarkupList::from_plain("Ths is a tset."));
        assert_eq!(text.meta_data.email.as_deref(), Some("jane@replaced.domain"));
    }

    struct NoIssues;

    impl RemoteChecker for NoIssues {
        fn check(
            &self,
            _request: crate::api::CheckRequest,
        ) -> impl Future<Output = Result<CheckResponse, crate::error::TransportError>> + Send
        {
            std::future::ready(Ok(CheckResponse::default()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn started_page_checks_after_the_configured_delays() {
        let document = Document::from_body_html("<textarea>Ths is a tset.</textarea>").into_shared();
        let ui = Arc::new(RecordingUi::default());
        let config = Config {
            debounce_ms: 200,
            focus_settle_ms: 50,
            ..Default::default()
        };
        let (mut script, _task) = ContentScript::start(
            document.clone(),
            "https://mail.example.com/",
            Arc::new(NoIssues),
            Arc::new(MemoryStore::new(UserSettings {
                auto_check: true,
                ..Default::default()
            })),
            Arc::new(MemoryTelemetry::default()),
            ui.clone(),
            &config,
        );
        let textarea = {
            let mut doc = document.borrow_mut();
            let textarea = doc.element_children(doc.body())[0];
            doc.focus(textarea).unwrap();
            textarea
        };

        let started = tokio::time::Instant::now();
        assert!(script.on_focus_change().await.is_some());
        assert_eq!(started.elapsed(), Duration::from_millis(50));

        document.borrow_mut().set_value(textarea, "This is a tset.").unwrap();
        script.on_input();
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ui.last().map(|r| r.state), Some(CheckState::Debouncing));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ui.last().and_then(|r| r.total_errors()), Some(0));
    }

    #[tokio::test]
    async fn check_text_without_focus_is_an_error_message() {
        let mut page = page("<p>static</p>", UserSettings::default());
        let response = page
            .script
            .handle(HostRequest::CheckText {
                page_url: "https://mail.example.com/".into(),
            })
            .await;
        assert!(matches!(response, Some(HostResponse::Error { .. })));
    }

    #[tokio::test]
    async fn unknown_action_alerts_and_tracks() {
        let mut page = page("", UserSettings::default());
        let response = page.script.handle_message(r#"{"action":"closePopup"}"#).await;
        assert_eq!(response, None);
        assert_eq!(page.ui.alerts(), vec!["Unknown action: closePopup".to_string()]);
        assert_eq!(
            page.telemetry.events(),
            vec![("internal".to_string(), "Unknown action: closePopup".to_string())]
        );
    }

    #[tokio::test]
    async fn focus_and_input_feed_the_pipeline() {
        let mut page = page(
            "<textarea>first</textarea><div contenteditable>second</div>",
            UserSettings::default(),
        );
        focus_first(&page);
        let first = page.script.on_focus_change().await.unwrap();

        {
            let mut doc = page.document.borrow_mut();
            let textarea = doc.element_children(doc.body())[0];
            doc.set_value(textarea, "first!").unwrap();
        }
        page.script.on_input();

        {
            let mut doc = page.document.borrow_mut();
            let div = doc.element_children(doc.body())[1];
            doc.focus(div).unwrap();
        }
        let second = page.script.on_focus_change().await.unwrap();
        assert_ne!(first.id, second.id);

        let events = page.drain();
        assert!(matches!(&events[0], PipelineEvent::Focus { surface, .. } if *surface == first.id));
        assert!(matches!(
            &events[1],
            PipelineEvent::ContentChanged { surface, markup, .. }
                if *surface == first.id && *markup == MarkupList::from_plain("first!")
        ));
        assert!(matches!(&events[2], PipelineEvent::Blur { surface } if *surface == first.id));
        assert!(matches!(&events[3], PipelineEvent::Focus { surface, .. } if *surface == second.id));
    }

    #[tokio::test]
    async fn apply_correction_message_fixes_the_page() {
        let mut page = page("<div contenteditable>Ths is a tset.</div>", UserSettings::default());
        focus_first(&page);
        page.script.on_focus_change().await.unwrap();
        let list = page.script.locator().current_markup_list().unwrap();
        page.drain();

        let request = serde_json::json!({
            "action": "applyCorrection",
            "markupList": list,
            "errorOffset": 9,
            "errorText": "tset",
            "replacement": "test",
            "pageUrl": "https://mail.example.com/compose",
        });
        let response = page.script.handle_message(&request.to_string()).await;
        assert_eq!(response, None);

        let doc = page.document.borrow();
        let div = doc.element_children(doc.body())[0];
        assert_eq!(doc.text_content(div), "Ths is a test.");
        assert!(doc.events().iter().any(|e| e.kind == EventKind::Input));
        drop(doc);

        assert!(page.ui.alerts().is_empty());
        let events = page.drain();
        assert!(matches!(
            &events[..],
            [PipelineEvent::ContentChanged { markup, .. }]
                if *markup == MarkupList::from_plain("Ths is a test.")
        ));
    }

    #[tokio::test]
    async fn failed_correction_alerts_the_user() {
        let page = page("<textarea>Ths is a tset.</textarea>", UserSettings::default());
        focus_first(&page);
        let correction = Correction {
            markup_list: MarkupList::from_plain("Something else entirely"),
            offset: 0,
            length: 9,
            replacement: "Nothing".into(),
            editable: true,
        };

        let result = page.script.apply(&correction, "https://mail.example.com/").await;
        assert!(matches!(result, Err(ApplyError::StaleNode { .. })));
        assert_eq!(
            page.ui.alerts(),
            vec!["No replacement possible. The text may have changed in the meantime.".to_string()]
        );
        let events = page.telemetry.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].1.starts_with("Problem in applyCorrection:"));
    }

    #[tokio::test]
    async fn check_now_alerts_only_for_real_problems() {
        let mut page = page("<iframe></iframe>", UserSettings::default());
        {
            let mut doc = page.document.borrow_mut();
            let iframe = doc.element_children(doc.body())[0];
            let frame = doc
                .attach_frame(iframe, Document::from_body_html("<p>hello</p>"), true)
                .unwrap();
            let p = frame.borrow().element_children(frame.borrow().body())[0];
            frame.borrow_mut().focus(p).unwrap();
            doc.focus(iframe).unwrap();
        }
        page.script.on_focus_change().await.unwrap();
        page.drain();

        {
            let doc = page.document.borrow();
            let iframe = doc.element_children(doc.body())[0];
            doc.frame_document(iframe).unwrap().borrow_mut().blur();
        }
        page.script.check_now();
        assert_eq!(page.ui.alerts(), vec![ExtractionError::PlaceCursor1.to_string()]);

        {
            let mut doc = page.document.borrow_mut();
            let iframe = doc.element_children(doc.body())[0];
            doc.attach_frame(iframe, Document::new(), false).unwrap();
        }
        page.script.check_now();
        assert_eq!(page.ui.alerts().len(), 1);
        assert!(page
            .telemetry
            .events()
            .iter()
            .any(|(_, e)| e.contains("cross-origin")));
        assert!(page.drain().is_empty());
    }

    #[tokio::test]
    async fn disabled_domain_stays_quiet_until_reactivated() {
        let settings = UserSettings {
            disabled_domains: vec!["mail.example.com".into()],
            ..Default::default()
        };
        let mut page = page("<textarea>Ths is a tset.</textarea>", settings);
        assert!(page.script.is_disabled_on_domain());
        focus_first(&page);
        page.script.on_focus_change().await;
        page.script.on_input();
        assert!(matches!(&page.drain()[..], [PipelineEvent::Disable]));

        page.script.handle(HostRequest::ReactivateIcon).await;
        assert!(!page.script.is_disabled_on_domain());
        page.script.on_input();
        let events = page.drain();
        assert!(matches!(&events[0], PipelineEvent::Enable));
        assert!(matches!(&events[1], PipelineEvent::ContentChanged { .. }));
    }

    #[tokio::test]
    async fn turn_off_auto_check_reaches_the_pipeline() {
        let mut page = page("", UserSettings::default());
        page.script
            .handle_message(r#"{"action":"turnOffAutoCheck"}"#)
            .await;
        assert!(matches!(&page.drain()[..], [PipelineEvent::SetAutoCheck(false)]));
    }

    #[tokio::test]
    async fn turn_off_auto_check_falls_back_to_the_global_switch() {
        let settings = UserSettings {
            auto_check: true,
            auto_check_on_domains: vec!["mail.example.com".into()],
            ..Default::default()
        };
        let mut opted_in = page("", settings.clone());
        opted_in.script.handle(HostRequest::TurnOffAutoCheck).await;
        assert!(matches!(&opted_in.drain()[..], [PipelineEvent::SetAutoCheck(true)]));

        let ignored = UserSettings {
            ignore_check_on_domains: vec!["mail.example.com".into()],
            ..settings
        };
        let mut ignored_host = page("", ignored);
        ignored_host.script.handle(HostRequest::TurnOffAutoCheck).await;
        assert!(matches!(&ignored_host.drain()[..], [PipelineEvent::SetAutoCheck(false)]));
    }

    #[tokio::test]
    async fn language_settings_are_remembered() {
        let mut page = page("", UserSettings::default());
        page.script
            .handle_message(
                r#"{"action":"saveLanguagesSettings","data":{"initLanguage":"de","manuallySelectedLanguage":"de-AT"}}"#,
            )
            .await;
        let response = page
            .script
            .handle_message(r#"{"action":"getLanguagesSettings"}"#)
            .await;
        assert_eq!(
            response,
            Some(HostResponse::Languages(LanguageSettings {
                init_language: "de".into(),
                manually_selected_language: "de-AT".into(),
            }))
        );
    }

    #[tokio::test]
    async fn pushed_results_are_filtered_by_settings() {
        let settings = UserSettings {
            dictionary: vec!["tolkin".into()],
            ..Default::default()
        };
        let mut page = page("<textarea>Tolkin is grate</textarea>", settings);
        focus_first(&page);
        page.script.on_focus_change().await.unwrap();

        let spelling = |offset: usize, length: usize| Match {
            message: "Possible spelling mistake".into(),
            short_message: String::new(),
            offset,
            length,
            replacements: vec![],
            context: MatchContext {
                text: "Tolkin is grate".into(),
                offset,
                length,
            },
            rule: Rule {
                id: "MORFOLOGIK_RULE_EN_US".into(),
                description: String::new(),
                issue_type: Some("misspelling".into()),
                category: None,
            },
        };
        let response = CheckResponse {
            language: Language {
                name: "English (US)".into(),
                code: "en-US".into(),
            },
            matches: vec![spelling(0, 6), spelling(10, 5)],
        };

        let answer = page
            .script
            .handle(HostRequest::ShowErrorNumberOnMarker {
                data: Some(response),
            })
            .await;
        assert_eq!(answer, Some(HostResponse::ErrorCount { total_errors: 1 }));
        assert_eq!(page.ui.last().and_then(|r| r.total_errors()), Some(1));
    }

    #[tokio::test]
    async fn domain_choices_are_persisted() {
        let mut page = page("<textarea>text</textarea>", UserSettings::default());
        focus_first(&page);
        page.script.on_focus_change().await.unwrap();

        assert!(page.script.toggle_auto_check_on_domain());
        let stored = page.settings.get().unwrap();
        assert_eq!(stored.auto_check_on_domains, vec!["mail.example.com".to_string()]);
        assert!(stored.domain_policy("https://mail.example.com/x").auto_check);

        assert!(!page.script.toggle_auto_check_on_domain());
        assert!(page.settings.get().unwrap().auto_check_on_domains.is_empty());

        page.script.disable_on_domain();
        assert_eq!(
            page.settings.get().unwrap().disabled_domains,
            vec!["mail.example.com".to_string()]
        );
        assert_eq!(
            page.telemetry
                .events()
                .into_iter()
                .map(|(_, e)| e)
                .collect::<Vec<_>>(),
            vec![
                "auto-check activated",
                "auto-check deactivated",
                "checking disabled on domain"
            ]
        );
    }
}
