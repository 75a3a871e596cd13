use std::time::Duration;

use async_trait::async_trait;
use capebot_core::config::{AnswerThreshold, CapeConfig};
use capebot_core::{Answer, AnswerBackend, BackendError, SavedReplyReceipt};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const ANSWER_METHOD: &str = "answer";
const ADD_SAVED_REPLY_METHOD: &str = "saved-replies/add-saved-reply";

#[derive(Clone, Debug)]
pub struct CapeClientSettings {
    pub base_url: String,
    pub admin_token: SecretString,
    pub threshold: AnswerThreshold,
    pub number_of_items: u32,
    pub timeout: Duration,
}

impl From<&CapeConfig> for CapeClientSettings {
    fn from(config: &CapeConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            admin_token: config.admin_token.clone(),
            threshold: config.threshold,
            number_of_items: config.number_of_items,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

pub struct CapeClient {
    http: Client,
    settings: CapeClientSettings,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    success: bool,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct AnswerResult {
    items: Vec<Answer>,
}

impl CapeClient {
    pub fn new(settings: CapeClientSettings) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|error| BackendError::Transport(error.to_string()))?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.settings.base_url.trim_end_matches('/'))
    }

    async fn call<T>(
        &self,
        method: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
    {
        // Calls made on behalf of a user carry their token; everything else
        // is authorised as the admin.
        if !params.iter().any(|(key, _)| *key == "token") {
            params.push(("adminToken", self.settings.admin_token.expose_secret().to_owned()));
        }

        debug!(event_name = "egress.cape.request", method, "calling cape backend");

        let response = self
            .http
            .post(self.endpoint(method))
            .form(&params)
            .send()
            .await
            .map_err(|error| BackendError::Transport(format!("{method}: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| BackendError::Transport(format!("{method}: {error}")))?;

        let envelope: ResponseEnvelope = serde_json::from_str(&body).map_err(|error| {
            BackendError::UnexpectedResponse(format!(
                "{method} returned HTTP {status} with an undecodable body: {error}"
            ))
        })?;

        if status.is_success() && envelope.success {
            return serde_json::from_value(envelope.result).map_err(|error| {
                BackendError::UnexpectedResponse(format!("{method} result: {error}"))
            });
        }

        match envelope.result.get("message").and_then(Value::as_str) {
            Some(message) => {
                warn!(
                    event_name = "egress.cape.rejected",
                    method,
                    status = status.as_u16(),
                    "cape backend rejected request"
                );
                Err(BackendError::Rejected(message.to_owned()))
            }
            None => Err(BackendError::UnexpectedResponse(format!(
                "{method} failed with HTTP {status} and no error message"
            ))),
        }
    }
}

#[async_trait]
impl AnswerBackend for CapeClient {
    async fn answer(
        &self,
        question: &str,
        token: &SecretString,
    ) -> Result<Vec<Answer>, BackendError> {
        let params = vec![
            ("token", token.expose_secret().to_owned()),
            ("question", question.to_owned()),
            ("threshold", self.settings.threshold.as_str().to_owned()),
            ("sourceType", "all".to_owned()),
            ("speedOrAccuracy", "balanced".to_owned()),
            ("numberOfItems", self.settings.number_of_items.to_string()),
            ("offset", "0".to_owned()),
        ];

        let result: AnswerResult = self.call(ANSWER_METHOD, params).await?;
        Ok(result.items)
    }

    async fn add_saved_reply(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<SavedReplyReceipt, BackendError> {
        let params = vec![("question", question.to_owned()), ("answer", answer.to_owned())];
        self.call(ADD_SAVED_REPLY_METHOD, params).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use capebot_core::config::AnswerThreshold;
    use capebot_core::{AnswerBackend, BackendError, SavedReplyReceipt};
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    use super::{CapeClient, CapeClientSettings};

    /// Matches form bodies that do not carry `field` at all.
    struct WithoutFormField(&'static str);

    impl Match for WithoutFormField {
        fn matches(&self, request: &Request) -> bool {
            let body = String::from_utf8_lossy(&request.body);
            body.split('&').all(|pair| pair.split('=').next() != Some(self.0))
        }
    }

    fn client_for(server: &MockServer) -> CapeClient {
        CapeClient::new(CapeClientSettings {
            base_url: format!("{}/api/0.1/", server.uri()),
            admin_token: SecretString::from("admin-token"),
            threshold: AnswerThreshold::Low,
            number_of_items: 2,
            timeout: Duration::from_secs(5),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn answer_posts_user_token_and_returns_ranked_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/answer"))
            .and(body_string_contains("token=user-token"))
            .and(body_string_contains("question=capital+of+France%3F"))
            .and(body_string_contains("threshold=low"))
            .and(body_string_contains("numberOfItems=2"))
            .and(WithoutFormField("adminToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {
                    "items": [
                        {"answerText": "Paris", "confidence": 0.9},
                        {"answerText": "France", "confidence": 0.4}
                    ],
                    "totalItems": 2
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answers = client_for(&server)
            .answer("capital of France?", &SecretString::from("user-token"))
            .await
            .expect("answers");

        let texts: Vec<&str> = answers.iter().map(|answer| answer.answer_text.as_str()).collect();
        assert_eq!(texts, vec!["Paris", "France"]);
    }

    #[tokio::test]
    async fn answer_never_sends_the_admin_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/answer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"items": []}
            })))
            .mount(&server)
            .await;

        client_for(&server)
            .answer("who am I?", &SecretString::from("user-token"))
            .await
            .expect("answers");

        let requests = server.received_requests().await.expect("request recording is enabled");
        assert_eq!(requests.len(), 1);
        assert!(WithoutFormField("adminToken").matches(&requests[0]));
        assert!(!String::from_utf8_lossy(&requests[0].body).contains("admin-token"));
    }

    #[tokio::test]
    async fn answer_with_no_items_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/answer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"items": [], "totalItems": 0}
            })))
            .mount(&server)
            .await;

        let answers = client_for(&server)
            .answer("unknown?", &SecretString::from("user-token"))
            .await
            .expect("answers");

        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn add_saved_reply_authenticates_as_admin() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/saved-replies/add-saved-reply"))
            .and(body_string_contains("adminToken=admin-token"))
            .and(body_string_contains("question=What+is+Cape%3F"))
            .and(body_string_contains("answer=It%27s+a+QA+tool"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "result": {"replyId": "reply-1", "answerId": "answer-1"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = client_for(&server)
            .add_saved_reply("What is Cape?", "It's a QA tool")
            .await
            .expect("saved reply");

        assert_eq!(
            receipt,
            SavedReplyReceipt { reply_id: "reply-1".to_owned(), answer_id: "answer-1".to_owned() }
        );
        let requests = server.received_requests().await.expect("request recording is enabled");
        assert!(!WithoutFormField("adminToken").matches(&requests[0]));
    }

    #[tokio::test]
    async fn backend_failure_message_becomes_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/saved-replies/add-saved-reply"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "success": false,
                "result": {"message": "Saved reply already exists"}
            })))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .add_saved_reply("dup", "dup")
            .await
            .expect_err("rejected");

        assert_eq!(error, BackendError::Rejected("Saved reply already exists".to_owned()));
        assert_eq!(error.to_string(), "Saved reply already exists");
    }

    #[tokio::test]
    async fn non_json_body_is_an_unexpected_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/0.1/answer"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .answer("anything", &SecretString::from("user-token"))
            .await
            .expect_err("undecodable");

        assert!(matches!(error, BackendError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let client = CapeClient::new(CapeClientSettings {
            base_url: "http://127.0.0.1:1/api/0.1".to_owned(),
            admin_token: SecretString::from("admin-token"),
            threshold: AnswerThreshold::VeryLow,
            number_of_items: 1,
            timeout: Duration::from_secs(2),
        })
        .expect("client builds");

        let error = client
            .answer("anything", &SecretString::from("user-token"))
            .await
            .expect_err("connection refused");

        assert!(matches!(error, BackendError::Transport(_)));
    }
}
