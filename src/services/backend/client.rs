use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::plugins::history::HistoryEntry;
use crate::services::config::ClientConfig;
use crate::services::retry::RetryConfig;

use super::retry_policy::AttemptError;
use super::{Backend, ChatRequest, ChatResponse, ClientError, HistoryRecord, StatusResponse};

#[derive(Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    status_timeout: Duration,
    chat_timeout: Duration,
    history_timeout: Duration,
    history_retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            status_timeout: config.status_timeout,
            chat_timeout: config.chat_timeout,
            history_timeout: config.history_timeout,
            history_retry: config.history_retry,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn history_url(&self, id: &str) -> Result<String, ClientError> {
        let id = id.trim();
        if id.is_empty() || id.contains('/') || id.contains('?') || id.contains('#') {
            return Err(ClientError::backend(format!("Invalid history id: {:?}", id)));
        }
        Ok(self.url(&format!("/api/history/{}", id)))
    }

    /// Fire a lifecycle request; the body is ignored and so is a failing status.
    async fn post_lifecycle(&self, path: &str) -> Result<(), ClientError> {
        let response = self
            .http_client
            .post(self.url(path))
            .timeout(self.status_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            log::warn!("{} answered HTTP {}", path, response.status());
        }
        Ok(())
    }

    async fn with_retry<T, Fut, F>(&self, what: &str, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let retry = self.history_retry;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    if attempt >= retry.max_attempts || !err.retryable {
                        return Err(err.error);
                    }
                    log::warn!(
                        "{}: retry attempt {}/{} after error: {}",
                        what,
                        attempt + 1,
                        retry.max_attempts,
                        err.error
                    );
                    tokio::time::sleep(retry.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AttemptError> {
        let response = self
            .http_client
            .get(url)
            .timeout(self.history_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::status(status));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AttemptError::fatal(e.into()))
    }

    async fn send_no_body(&self, request: reqwest::RequestBuilder) -> Result<(), AttemptError> {
        let response = request.timeout(self.history_timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::status(status));
        }
        Ok(())
    }
}

impl Backend for HttpBackend {
    async fn model_status(&self) -> Result<StatusResponse, ClientError> {
        let response = self
            .http_client
            .get(self.url("/api/model/status"))
            .timeout(self.status_timeout)
            .send()
            .await?;
        Ok(response.json::<StatusResponse>().await?)
    }

    async fn start_model(&self) -> Result<(), ClientError> {
        self.post_lifecycle("/api/model/start").await
    }

    async fn stop_model(&self) -> Result<(), ClientError> {
        self.post_lifecycle("/api/model/stop").await
    }

    async fn chat(&self, message: &str) -> Result<ChatResponse, ClientError> {
        // The body is decoded whatever the status: a failing backend still
        // reports its reason in `error`.
        let response = self
            .http_client
            .post(self.url("/api/chat"))
            .timeout(self.chat_timeout)
            .json(&ChatRequest { message })
            .send()
            .await?;
        let status = response.status();
        match response.json::<ChatResponse>().await {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => {
                Err(ClientError::transport(format!("HTTP {}", status)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let url = self.url("/api/history");
        self.with_retry("list history", || self.get_json::<Vec<HistoryEntry>>(&url))
            .await
    }

    async fn get_history(&self, id: &str) -> Result<HistoryEntry, ClientError> {
        let url = self.history_url(id)?;
        self.with_retry("load history", || self.get_json::<HistoryEntry>(&url))
            .await
    }

    async fn save_history(&self, record: &HistoryRecord) -> Result<(), ClientError> {
        let url = self.url("/api/history");
        self.with_retry("save history", || {
            self.send_no_body(self.http_client.post(&url).json(record))
        })
        .await
    }

    async fn delete_history(&self, id: &str) -> Result<(), ClientError> {
        let url = self.history_url(id)?;
        self.with_retry("delete history", || {
            self.send_no_body(self.http_client.delete(&url))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::services::events::ChannelSink;
    use crate::services::session::{SessionController, SubmitOutcome};

    const SERVER_ERROR: &str = "HTTP/1.1 500 Internal Server Error\r\n\
        Content-Type: text/html\r\n\
        Content-Length: 21\r\n\
        Connection: close\r\n\
        \r\n\
        <h1>Server Error</h1>";

    /// Local server that answers every request with `reply`, or holds the
    /// connection open without answering when `reply` is `None`.
    async fn local_server(reply: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = stream.read(&mut buf).await;
                    match reply {
                        Some(reply) => {
                            let _ = stream.write_all(reply.as_bytes()).await;
                            let _ = stream.shutdown().await;
                        }
                        None => tokio::time::sleep(Duration::from_secs(60)).await,
                    }
                });
            }
        });
        format!("http://{}", addr)
    }

    fn local_backend(base_url: String) -> HttpBackend {
        HttpBackend::new(&ClientConfig {
            base_url,
            chat_timeout: Duration::from_millis(300),
            history_retry: RetryConfig::none(),
            ..ClientConfig::default()
        })
    }

    fn backend() -> HttpBackend {
        let config = ClientConfig {
            base_url: "http://sage.local:8000/".to_string(),
            ..ClientConfig::default()
        };
        HttpBackend::new(&config)
    }

    #[test]
    fn test_urls() {
        let backend = backend();
        assert_eq!(
            backend.url("/api/model/status"),
            "http://sage.local:8000/api/model/status"
        );
        assert_eq!(
            backend.history_url("k3j9x0a1b").unwrap(),
            "http://sage.local:8000/api/history/k3j9x0a1b"
        );
    }

    #[test]
    fn test_history_url_rejects_path_injection() {
        let backend = backend();
        assert!(backend.history_url("").is_err());
        assert!(backend.history_url("../admin").is_err());
        assert!(backend.history_url("a?b=1").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let config = ClientConfig {
            // Port 9 (discard) on loopback is closed on test hosts.
            base_url: "http://127.0.0.1:9".to_string(),
            history_retry: RetryConfig::none(),
            ..ClientConfig::default()
        };
        let backend = HttpBackend::new(&config);
        let err = backend.model_status().await.unwrap_err();
        assert!(err.is_transport());
        let err = backend.list_history().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_chat_without_reply_times_out_as_transport_error() {
        let backend = local_backend(local_server(None).await);
        let err = backend.chat("Hello").await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.message().contains("timed out"));
    }

    #[tokio::test]
    async fn test_chat_server_error_with_html_body_is_transport_error() {
        let backend = local_backend(local_server(Some(SERVER_ERROR)).await);
        let err = backend.chat("Hello").await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.message().contains("500"));
    }

    #[tokio::test]
    async fn test_session_over_http_clears_flag_on_chat_failure() {
        for reply in [None, Some(SERVER_ERROR)] {
            let backend = Arc::new(local_backend(local_server(reply).await));
            let (sink, _rx) = ChannelSink::new();
            let session = SessionController::new(backend, Arc::new(sink));

            let outcome = session.submit("Hello").await;
            assert!(matches!(outcome, SubmitOutcome::TransportError(_)));
            let snapshot = session.snapshot();
            assert!(!snapshot.in_flight);
            assert_eq!(snapshot.messages.len(), 2);
            assert!(snapshot.messages[1].content.starts_with("Connection failure"));
        }
    }
}
