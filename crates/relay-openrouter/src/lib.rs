//! OpenRouter adapter (chat completions + generation stats).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use relay_core::{
    config::Config,
    errors::Error,
    llm::{
        client::{CompletionClient, GenerationStatsSource},
        types::{CompletionRequest, CompletionResponse, GenerationStats, StatsResponse},
    },
    Result,
};

const REFERER: &str = "https://github.com/telegram-llm-relay";
const TITLE: &str = "Telegram LLM Bot";

#[derive(Clone, Debug)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl OpenRouterConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_key: cfg.openrouter_api_key.clone(),
            base_url: cfg.openrouter_base_url.clone(),
            timeout: cfg.request_timeout,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenRouterClient {
    cfg: OpenRouterConfig,
    http: reqwest::Client,
}

// `/generation` answers `{"data": {...}}`; older deployments return the stats bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum StatsBody {
    Wrapped { data: GenerationStats },
    Bare(GenerationStats),
}

impl OpenRouterClient {
    pub fn new(cfg: OpenRouterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    fn with_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.bearer_auth(&self.cfg.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(&self, mut req: CompletionRequest) -> Result<CompletionResponse> {
        req.temperature.get_or_insert(self.cfg.temperature);
        req.max_tokens.get_or_insert(self.cfg.max_tokens);

        tracing::debug!(model = %req.model, "openrouter completion request");
        let resp = self
            .with_headers(self.http.post(self.url("chat/completions")))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("openrouter request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("openrouter read error: {e}")))?;

        let parsed = serde_json::from_str::<CompletionResponse>(&body);
        if let Ok(CompletionResponse {
            error: Some(api), ..
        }) = &parsed
        {
            return Err(Error::Provider(format!("OpenRouter API error: {}", api.message)));
        }
        if status != reqwest::StatusCode::OK {
            return Err(Error::Provider(format!(
                "HTTP error {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        let completion =
            parsed.map_err(|e| Error::Parse(format!("openrouter response: {e}")))?;
        tracing::debug!(
            model = %completion.model,
            tokens = completion.usage.total_tokens,
            "openrouter completion response"
        );
        Ok(completion)
    }
}

#[async_trait]
impl GenerationStatsSource for OpenRouterClient {
    async fn fetch(&self, generation_id: &str) -> Result<StatsResponse> {
        let resp = self
            .with_headers(self.http.get(self.url("generation")))
            .query(&[("id", generation_id)])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("openrouter stats request error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(StatsResponse::Pending);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("openrouter stats read error: {e}")))?;

        if !status.is_success() {
            return Ok(StatsResponse::Failed {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<StatsBody>(&body) {
            Ok(StatsBody::Wrapped { data }) => Ok(StatsResponse::Ready(data)),
            Ok(StatsBody::Bare(data)) if !data.id.is_empty() => Ok(StatsResponse::Ready(data)),
            Ok(StatsBody::Bare(_)) => Ok(StatsResponse::Failed {
                status: status.as_u16(),
                body,
            }),
            Err(e) => {
                tracing::warn!(generation_id, error = %e, "unparsable generation stats");
                Ok(StatsResponse::Failed {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{llm::types::ChatMessage, storage::Role};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn client(base_url: &str) -> OpenRouterClient {
        OpenRouterClient::new(OpenRouterConfig {
            api_key: "sk-or-test".to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            temperature: 0.7,
            max_tokens: 200_000,
        })
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("openai/gpt-4", vec![ChatMessage::new(Role::User, "hi")])
    }

    #[tokio::test]
    async fn completion_sends_headers_and_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-or-test"))
            .and(header("x-title", "Telegram LLM Bot"))
            .and(body_partial_json(json!({
                "model": "openai/gpt-4",
                "temperature": 0.7,
                "max_tokens": 200000,
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-123",
                "object": "chat.completion",
                "model": "openai/gpt-4",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "hello"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = client(&server.uri()).complete(request()).await.unwrap();
        assert_eq!(resp.id.as_deref(), Some("gen-123"));
        assert_eq!(resp.first_text(), Some("hello"));
        assert_eq!(resp.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn api_error_object_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "model not found", "code": 404}
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri()).complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ref m) if m.contains("model not found")));
    }

    #[tokio::test]
    async fn non_200_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server.uri()).complete(request()).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ref m) if m.contains("HTTP error 502")));
    }

    #[tokio::test]
    async fn stats_map_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generation"))
            .and(query_param("id", "pending"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generation"))
            .and(query_param("id", "ready"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": "ready",
                    "model": "openai/gpt-4",
                    "native_tokens_prompt": 12,
                    "native_tokens_completion": 34,
                    "provider_name": "OpenAI",
                    "total_cost": 0.0042,
                    "cancelled": false,
                    "finish": true
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/generation"))
            .and(query_param("id", "missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        assert_eq!(c.fetch("pending").await.unwrap(), StatsResponse::Pending);

        match c.fetch("ready").await.unwrap() {
            StatsResponse::Ready(stats) => {
                assert_eq!(stats.native_tokens_prompt, Some(12));
                assert_eq!(stats.native_tokens_completion, Some(34));
                assert_eq!(stats.total_cost, 0.0042);
                assert!(stats.finish);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            c.fetch("missing").await.unwrap(),
            StatsResponse::Failed {
                status: 404,
                body: "not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn stats_accept_bare_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "g",
                "model": "m",
                "total_cost": 0.5
            })))
            .mount(&server)
            .await;

        match client(&server.uri()).fetch("g").await.unwrap() {
            StatsResponse::Ready(stats) => assert_eq!(stats.total_cost, 0.5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let err = client("http://127.0.0.1:1").fetch("g").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
