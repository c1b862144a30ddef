use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::error::TransportError;
use crate::markup::{MarkupList, MarkupSegment};
use crate::matches::CheckResponse;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

static EMAIL_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@[0-9a-zA-Z.-]+").expect("EMAIL_DOMAIN_RE: hardcoded regex is valid")
});

pub fn next_request_id() -> u64 {
    REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Page context sent along with a check. Not interpreted locally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub page_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl MetaData {
    pub fn new(page_url: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            page_url: page_url.into(),
            email: email.map(clean_email),
        }
    }
}

/// Drop the domain part of an address before it leaves the page.
pub fn clean_email(email: &str) -> String {
    EMAIL_DOMAIN_RE
        .replace(email, "@replaced.domain")
        .into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub markup_list: MarkupList,
    pub meta_data: MetaData,
}

/// The remote checking service. Exactly one response per request; responses
/// may arrive in any order.
pub trait RemoteChecker {
    fn check(
        &self,
        request: CheckRequest,
    ) -> impl Future<Output = Result<CheckResponse, TransportError>> + Send;
}

/// Client for a LanguageTool-compatible `/v2/check` endpoint.
#[derive(Debug, Clone)]
pub struct LanguageToolClient {
    http: reqwest::Client,
    base_url: String,
    language: String,
}

impl LanguageToolClient {
    pub fn new(
        base_url: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            language: language.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        Self::new(
            config.server_url.clone(),
            config.language.clone(),
            config.request_timeout(),
        )
    }

    async fn send(&self, request: CheckRequest) -> Result<CheckResponse, TransportError> {
        let request_id = next_request_id();
        let start = Instant::now();
        let url = format!("{}/v2/check", self.base_url.trim_end_matches('/'));
        let data = annotation(&request.markup_list);
        tracing::debug!(
            request_id,
            url = %url,
            segments = request.markup_list.len(),
            text_len = request.markup_list.flat_len(),
            "sending check"
        );

        let response = self
            .http
            .post(&url)
            .form(&[("data", data.as_str()), ("language", self.language.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(request_id, elapsed = ?start.elapsed(), "network error: {}", e);
                TransportError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .trim()
                .to_string();
            tracing::warn!(request_id, %status, "server error: {}", message);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let parsed: CheckResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::warn!(request_id, "failed to parse response: {}", e);
            TransportError::Decode(e.to_string())
        })?;

        tracing::debug!(
            request_id,
            elapsed = ?start.elapsed(),
            matches = parsed.matches.len(),
            "check completed"
        );
        Ok(parsed)
    }
}

impl RemoteChecker for LanguageToolClient {
    fn check(
        &self,
        request: CheckRequest,
    ) -> impl Future<Output = Result<CheckResponse, TransportError>> + Send {
        self.send(request)
    }
}

/// The `data` form field: segments without their source references.
fn annotation(list: &MarkupList) -> String {
    let annotation: Vec<serde_json::Value> = list
        .iter()
        .map(|segment| match segment {
            MarkupSegment::Text { text, .. } => json!({ "text": text }),
            MarkupSegment::Markup {
                markup,
                interpret_as,
            } if interpret_as.is_empty() => json!({ "markup": markup }),
            MarkupSegment::Markup {
                markup,
                interpret_as,
            } => json!({ "markup": markup, "interpretAs": interpret_as }),
        })
        .collect();
    json!({ "annotation": annotation }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::extract;

    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, Request, Respond, ResponseTemplate,
    };

    struct BodyContains(&'static str);

    impl wiremock::Match for BodyContains {
        fn matches(&self, request: &Request) -> bool {
            let body = String::from_utf8_lossy(&request.body);
            body.contains(self.0)
        }
    }

    struct BodyDoesNotContain(&'static str);

    impl wiremock::Match for BodyDoesNotContain {
        fn matches(&self, request: &Request) -> bool {
            let body = String::from_utf8_lossy(&request.body);
            !body.contains(self.0)
        }
    }

    struct JsonResponder {
        body: serde_json::Value,
        status: u16,
    }

    impl Respond for JsonResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            ResponseTemplate::new(self.status).set_body_json(self.body.clone())
        }
    }

    fn client(server: &MockServer) -> LanguageToolClient {
        LanguageToolClient::new(server.uri(), "en-US", Duration::from_secs(5)).expect("client")
    }

    fn request(list: MarkupList) -> CheckRequest {
        CheckRequest {
            markup_list: list,
            meta_data: MetaData::new("https://example.com/", None),
        }
    }

    #[test]
    fn annotation_keeps_markup_and_drops_sources() {
        let data = annotation(&extract("<p>Hi <b>there</b></p>"));
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        let items = value["annotation"].as_array().unwrap();
        assert_eq!(items[0], json!({ "markup": "<p>" }));
        assert_eq!(items[1], json!({ "text": "Hi " }));
        assert_eq!(items.last().unwrap(), &json!({ "markup": "</p>", "interpretAs": "\n\n" }));
        assert!(!data.contains("sourceRef"));
    }

    #[test]
    fn email_domain_is_replaced() {
        assert_eq!(clean_email("jane.doe@mail.example.org"), "jane.doe@replaced.domain");
        let meta = MetaData::new("https://x.test/", Some("a@b.c"));
        assert_eq!(meta.email.as_deref(), Some("a@replaced.domain"));
    }

    #[tokio::test]
    async fn posts_form_and_parses_matches() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/check"))
            .and(BodyContains("language=en-US"))
            .and(BodyContains("annotation"))
            .and(BodyDoesNotContain("sourceRef"))
            .respond_with(JsonResponder {
                status: 200,
                body: json!({
                    "language": {"name": "English (US)", "code": "en-US"},
                    "matches": [{
                        "message": "Possible typo",
                        "offset": 0,
                        "length": 3,
                        "replacements": [{"value": "This"}],
                        "context": {"text": "Ths is a tset.", "offset": 0, "length": 3},
                        "rule": {"id": "MORFOLOGIK_RULE_EN_US", "description": "Spelling"}
                    }]
                }),
            })
            .mount(&server)
            .await;

        let response = client(&server)
            .check(request(extract("<p>Ths is a tset.</p>")))
            .await
            .expect("check ok");
        assert_eq!(response.language.code, "en-US");
        assert_eq!(response.matches.len(), 1);
        assert_eq!(response.matches[0].replacements[0].value, "This");
    }

    #[tokio::test]
    async fn non_success_status_keeps_server_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/check"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("Error: Missing 'text' or 'data' parameter"),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .check(request(MarkupList::from_plain("Hello")))
            .await
            .expect_err("should error");
        assert_eq!(
            err,
            TransportError::Status {
                status: 400,
                message: "Error: Missing 'text' or 'data' parameter".into()
            }
        );
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/check"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .check(request(MarkupList::from_plain("Hello")))
            .await
            .expect_err("should error");
        assert!(matches!(err, TransportError::Decode(_)));
    }
}
