use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use super::{Renderer, Sleeper};
use crate::config::RenderConfig;
use crate::error::PipelineError;

/// Attempt budget and pause between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(60),
        }
    }
}

/// Result of a single POST to the endpoint.
enum Attempt {
    Success(String),
    Retrying { status: String, headers: String },
    Fatal(anyhow::Error),
}

/// Renders through an HTTP Markdown endpoint such as `POST https://api.github.com/markdown`.
///
/// Sends `{"mode": "markdown", "text": <body>}` and takes a 200 response
/// body as the HTML. Plain `markdown` mode leaves `#13`-style text alone,
/// where `gfm` would turn it into issue links.
pub struct RemoteRenderer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RemoteRenderer {
    /// Create a renderer from configuration, reading the bearer token from
    /// the environment variable named by `render.token_env`.
    pub fn new(config: &RenderConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("til-index/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token(),
            policy: RetryPolicy {
                max_attempts: config.max_attempts,
                backoff: Duration::from_secs(config.backoff_secs),
            },
            sleeper,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn attempt(&self, body: &str) -> Attempt {
        let payload = serde_json::json!({
            "mode": "markdown",
            "text": body,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retrying {
                    status: format!("network error: {}", e),
                    headers: String::new(),
                }
            }
        };

        match response.status() {
            StatusCode::OK => match response.text().await {
                Ok(html) => Attempt::Success(html),
                Err(e) => Attempt::Retrying {
                    status: format!("error reading body: {}", e),
                    headers: String::new(),
                },
            },
            StatusCode::UNAUTHORIZED => Attempt::Fatal(PipelineError::RenderAuth.into()),
            status => Attempt::Retrying {
                status: status.to_string(),
                headers: format!("{:?}", response.headers()),
            },
        }
    }
}

#[async_trait]
impl Renderer for RemoteRenderer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn render(&self, body: &str) -> Result<String> {
        let mut last = (String::new(), String::new());

        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(body).await {
                Attempt::Success(html) => return Ok(html),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retrying { status, headers } => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        %status,
                        %headers,
                        "markdown render failed"
                    );
                    last = (status, headers);
                    if attempt < self.policy.max_attempts {
                        tracing::warn!(secs = self.policy.backoff.as_secs(), "sleeping before retry");
                        self.sleeper.sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        Err(PipelineError::RenderRetriesExhausted {
            attempts: self.policy.max_attempts,
            status: last.0,
            headers: last.1,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct CountingSleeper {
        sleeps: AtomicUsize,
        durations: Mutex<Vec<Duration>>,
    }

    impl CountingSleeper {
        fn durations(&self) -> Vec<Duration> {
            self.durations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
            self.durations.lock().unwrap().push(duration);
        }
    }

    fn renderer(server: &MockServer, sleeper: Arc<CountingSleeper>) -> RemoteRenderer {
        let config = RenderConfig {
            endpoint: format!("{}/markdown", server.uri()),
            token_env: "TIL_INDEX_TEST_TOKEN_UNSET".into(),
            ..RenderConfig::default()
        };
        RemoteRenderer::new(&config, sleeper).unwrap().with_token(None)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/markdown"))
            .and(body_json(serde_json::json!({"mode": "markdown", "text": "Hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Hi</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let html = renderer(&server, sleeper.clone()).render("Hi").await.unwrap();
        assert_eq!(html, "<p>Hi</p>");
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_two_server_errors_then_success_sleeps_twice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let html = renderer(&server, sleeper.clone()).render("x").await.unwrap();
        assert_eq!(html, "<p>ok</p>");
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_unauthorized_fails_without_sleeping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let err = renderer(&server, sleeper.clone()).render("x").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::RenderAuth)
        ));
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_last_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let err = renderer(&server, sleeper.clone()).render("x").await.unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::RenderRetriesExhausted {
                attempts,
                status,
                headers,
            }) => {
                assert_eq!(*attempts, 3);
                assert!(status.contains("403"));
                assert!(headers.contains("x-ratelimit-remaining"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(60); 2]);
    }

    #[tokio::test]
    async fn test_bearer_header_only_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>auth</p>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>anon</p>"))
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let anon = renderer(&server, sleeper.clone());
        assert_eq!(anon.render("x").await.unwrap(), "<p>anon</p>");

        let authed = renderer(&server, sleeper).with_token(Some("sekrit".into()));
        assert_eq!(authed.render("x").await.unwrap(), "<p>auth</p>");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
        assert!(requests[1].headers.get("authorization").is_some());
    }

    #[tokio::test]
    async fn test_configured_backoff_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let config = RenderConfig {
            endpoint: format!("{}/markdown", server.uri()),
            max_attempts: 2,
            backoff_secs: 5,
            ..RenderConfig::default()
        };
        let sleeper = Arc::new(CountingSleeper::default());
        let err = RemoteRenderer::new(&config, sleeper.clone())
            .unwrap()
            .with_token(None)
            .render("x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 2 attempts"));
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_policy_override() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(CountingSleeper::default());
        let err = renderer(&server, sleeper.clone())
            .with_policy(RetryPolicy {
                max_attempts: 1,
                backoff: Duration::ZERO,
            })
            .render("x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 1 attempts"));
        assert_eq!(sleeper.sleeps.load(Ordering::SeqCst), 0);
    }
}
