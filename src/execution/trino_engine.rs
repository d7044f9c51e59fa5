//! Trino Execution Engine
//!
//! Executes queries against a Trino (or Athena-compatible) coordinator over
//! its REST protocol: POST /v1/statement, then follow nextUri until done.

use crate::error::{AttemptFailure, FailureKind, Result, SqlAiError};
use crate::execution::engine::QueryExecutor;
use crate::execution::result::ResultSet;
use crate::execution_loop::error_classifier::ErrorClassifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_POLLS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct TrinoSettings {
    pub coordinator_url: String,
    pub catalog: String,
    pub schema: String,
    pub user: String,
    pub poll_interval: Duration,
}

impl Default for TrinoSettings {
    fn default() -> Self {
        Self {
            coordinator_url: "http://localhost:8080".to_string(),
            catalog: crate::schema::DEFAULT_CATALOG.to_string(),
            schema: crate::schema::DEFAULT_DATABASE.to_string(),
            user: "sql-ai".to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Trino execution engine
pub struct TrinoEngine {
    settings: TrinoSettings,
    client: Client,
    classifier: ErrorClassifier,
}

#[derive(Debug, Deserialize)]
struct TrinoResponse {
    id: String,
    #[serde(rename = "nextUri")]
    next_uri: Option<String>,
    columns: Option<Vec<TrinoColumn>>,
    data: Option<Vec<Vec<serde_json::Value>>>,
    error: Option<TrinoError>,
}

#[derive(Debug, Deserialize)]
struct TrinoColumn {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrinoError {
    message: String,
    #[serde(rename = "errorName")]
    error_name: Option<String>,
    #[serde(rename = "errorType")]
    error_type: Option<String>,
}

impl TrinoError {
    /// Trino reports a structured error name/type; prefer it over message sniffing.
    fn kind(&self, classifier: &ErrorClassifier) -> FailureKind {
        match self.error_name.as_deref() {
            Some("PERMISSION_DENIED") => return FailureKind::PermissionDenied,
            Some("EXCEEDED_TIME_LIMIT") | Some("EXCEEDED_CPU_LIMIT") => return FailureKind::Timeout,
            Some("SERVER_SHUTTING_DOWN") | Some("SERVER_STARTING_UP") | Some("NO_NODES_AVAILABLE") => {
                return FailureKind::EngineUnavailable
            }
            _ => {}
        }
        match self.error_type.as_deref() {
            Some("USER_ERROR") => FailureKind::SyntaxError,
            Some("INSUFFICIENT_RESOURCES") => FailureKind::EngineUnavailable,
            _ => classifier.classify(&self.message),
        }
    }
}

/// Cancels a running query on the coordinator unless disarmed.
///
/// Dropping it before the last page arrived (timeout, cancelled question or
/// failed poll) sends a best-effort `DELETE` to the last `nextUri`.
struct RunningQuery {
    client: Client,
    user: String,
    uri: Option<String>,
}

impl RunningQuery {
    fn track(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn disarm(&mut self) {
        self.uri = None;
    }

    async fn cancel(mut self) {
        if let Some(uri) = self.uri.take() {
            send_delete(&self.client, &self.user, &uri).await;
        }
    }
}

impl Drop for RunningQuery {
    fn drop(&mut self) {
        let Some(uri) = self.uri.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let user = self.user.clone();
                handle.spawn(async move { send_delete(&client, &user, &uri).await });
            }
            Err(_) => warn!("No runtime to cancel abandoned Trino query {}", uri),
        }
    }
}

async fn send_delete(client: &Client, user: &str, uri: &str) {
    info!("🛑 Cancelling Trino query: {}", uri);
    if let Err(e) = client.delete(uri).header("X-Trino-User", user).send().await {
        warn!("Failed to cancel Trino query {}: {}", uri, e);
    }
}

impl TrinoEngine {
    pub fn new(settings: TrinoSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| SqlAiError::Execution(format!("Failed to create HTTP client for Trino: {}", e)))?;

        let mut settings = settings;
        settings.coordinator_url = settings.coordinator_url.trim_end_matches('/').to_string();

        Ok(Self {
            settings,
            client,
            classifier: ErrorClassifier::new(),
        })
    }

    fn transport_failure(&self, e: reqwest::Error) -> AttemptFailure {
        if e.is_timeout() {
            AttemptFailure::new(FailureKind::Timeout, format!("Trino request timed out: {}", e))
        } else if e.is_connect() || e.is_request() {
            AttemptFailure::new(FailureKind::EngineUnavailable, format!("Trino unreachable: {}", e))
        } else {
            self.classifier.failure(format!("Trino request failed: {}", e))
        }
    }

    async fn read_response(
        &self,
        response: reqwest::Response,
    ) -> std::result::Result<TrinoResponse, AttemptFailure> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let kind = match status.as_u16() {
                401 | 403 => FailureKind::PermissionDenied,
                408 | 504 => FailureKind::Timeout,
                s if s >= 500 => FailureKind::EngineUnavailable,
                _ => self.classifier.classify(&text),
            };
            return Err(AttemptFailure::new(
                kind,
                format!("Trino returned status {}: {}", status, text),
            ));
        }

        let body: TrinoResponse = response.json().await.map_err(|e| {
            AttemptFailure::new(
                FailureKind::EngineUnavailable,
                format!("Failed to parse Trino response: {}", e),
            )
        })?;

        if let Some(error) = &body.error {
            return Err(AttemptFailure::new(error.kind(&self.classifier), error.message.clone()));
        }

        Ok(body)
    }

    async fn submit(&self, sql: &str) -> std::result::Result<TrinoResponse, AttemptFailure> {
        let url = format!("{}/v1/statement", self.settings.coordinator_url);
        let response = self
            .client
            .post(&url)
            .header("X-Trino-User", &self.settings.user)
            .header("X-Trino-Catalog", &self.settings.catalog)
            .header("X-Trino-Schema", &self.settings.schema)
            .header("Content-Type", "text/plain")
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        self.read_response(response).await
    }

    fn absolute(&self, uri: &str) -> String {
        if uri.starts_with("http") {
            uri.to_string()
        } else {
            format!("{}{}", self.settings.coordinator_url, uri)
        }
    }

    async fn fetch(&self, url: &str) -> std::result::Result<TrinoResponse, AttemptFailure> {
        let response = self
            .client
            .get(url)
            .header("X-Trino-User", &self.settings.user)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        self.read_response(response).await
    }
}

#[async_trait]
impl QueryExecutor for TrinoEngine {
    fn name(&self) -> &'static str {
        "trino"
    }

    async fn execute(&self, sql: &str) -> std::result::Result<ResultSet, AttemptFailure> {
        let start_time = std::time::Instant::now();
        info!("Executing query with Trino: {}", sql);

        let first = self.submit(sql).await?;
        info!("Trino query submitted: {}", first.id);

        let mut running = RunningQuery {
            client: self.client.clone(),
            user: self.settings.user.clone(),
            uri: None,
        };
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut page = first;
        let mut polls = 0;

        loop {
            if columns.is_none() {
                if let Some(cols) = &page.columns {
                    columns = Some(cols.iter().map(|c| c.name.clone()).collect());
                }
            }
            if let Some(data) = page.data.take() {
                rows.extend(data);
            }

            let Some(next_uri) = page.next_uri.take() else {
                break;
            };
            let next_uri = self.absolute(&next_uri);
            running.track(&next_uri);

            polls += 1;
            if polls > MAX_POLLS {
                warn!("Trino query {} exceeded {} polls", page.id, MAX_POLLS);
                running.cancel().await;
                return Err(AttemptFailure::new(
                    FailureKind::Timeout,
                    format!("Trino query exceeded max polls ({})", MAX_POLLS),
                ));
            }

            tokio::time::sleep(self.settings.poll_interval).await;
            debug!("Polling Trino: {}", next_uri);
            page = self.fetch(&next_uri).await?;
        }
        running.disarm();

        let result = ResultSet::new(columns.unwrap_or_default(), rows);
        info!(
            "✅ Trino returned {} rows in {}ms",
            result.row_count(),
            start_time.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/info", self.settings.coordinator_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Trino health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Minimal coordinator: every statement keeps running until `finish_after`
    /// polls (never, when `None`). Records `METHOD path` for each request.
    async fn mock_coordinator(finish_after: Option<usize>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        let uri_base = base.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = Arc::clone(&seen);
                let uri_base = uri_base.clone();
                tokio::spawn(async move {
                    handle(stream, &uri_base, finish_after, seen).await;
                });
            }
        });
        (base, requests)
    }

    async fn handle(
        mut stream: TcpStream,
        base: &str,
        finish_after: Option<usize>,
        seen: Arc<Mutex<Vec<String>>>,
    ) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let Ok(n) = stream.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let Ok(n) = stream.read(&mut chunk).await else {
                return;
            };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut parts = head.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        seen.lock().unwrap().push(format!("{} {}", method, path));

        let (status, body) = match method.as_str() {
            "POST" => (
                "200 OK",
                format!(r#"{{"id": "q1", "nextUri": "{}/v1/statement/executing/q1/1"}}"#, base),
            ),
            "GET" => {
                let token: usize = path.rsplit('/').next().and_then(|t| t.parse().ok()).unwrap_or(1);
                if finish_after.map_or(false, |n| token >= n) {
                    (
                        "200 OK",
                        r#"{"id": "q1", "columns": [{"name": "total"}], "data": [[27]]}"#.to_string(),
                    )
                } else {
                    (
                        "200 OK",
                        format!(
                            r#"{{"id": "q1", "nextUri": "{}/v1/statement/executing/q1/{}"}}"#,
                            base,
                            token + 1
                        ),
                    )
                }
            }
            _ => ("204 No Content", String::new()),
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    fn engine(base: String) -> TrinoEngine {
        TrinoEngine::new(TrinoSettings {
            coordinator_url: base,
            poll_interval: Duration::from_millis(10),
            ..TrinoSettings::default()
        })
        .unwrap()
    }

    fn deletes(requests: &Mutex<Vec<String>>) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.starts_with("DELETE"))
            .cloned()
            .collect()
    }

    #[tokio::test]
    async fn test_finished_query_is_not_cancelled() {
        let (base, requests) = mock_coordinator(Some(2)).await;
        let result = engine(base).execute("SELECT COUNT(*) AS total FROM films").await.unwrap();

        assert_eq!(result.columns, vec!["total"]);
        assert_eq!(result.rows, vec![vec![serde_json::json!(27)]]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(deletes(&requests).is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_query_is_deleted_on_coordinator() {
        let (base, requests) = mock_coordinator(None).await;
        let engine = engine(base);

        let outcome = tokio::time::timeout(Duration::from_millis(150), engine.execute("SELECT * FROM films")).await;
        assert!(outcome.is_err());

        let mut cancelled = Vec::new();
        for _ in 0..100 {
            cancelled = deletes(&requests);
            if !cancelled.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(cancelled.len(), 1);
        assert!(cancelled[0].starts_with("DELETE /v1/statement/executing/q1/"));
    }

    fn error(name: Option<&str>, error_type: Option<&str>, message: &str) -> TrinoError {
        TrinoError {
            message: message.to_string(),
            error_name: name.map(str::to_string),
            error_type: error_type.map(str::to_string),
        }
    }

    #[test]
    fn test_error_name_takes_precedence() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            error(Some("PERMISSION_DENIED"), Some("USER_ERROR"), "Access Denied").kind(&classifier),
            FailureKind::PermissionDenied
        );
        assert_eq!(
            error(Some("EXCEEDED_TIME_LIMIT"), Some("INSUFFICIENT_RESOURCES"), "too slow").kind(&classifier),
            FailureKind::Timeout
        );
    }

    #[test]
    fn test_user_errors_are_syntax_errors() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            error(Some("COLUMN_NOT_FOUND"), Some("USER_ERROR"), "Column 'title' cannot be resolved")
                .kind(&classifier),
            FailureKind::SyntaxError
        );
    }

    #[test]
    fn test_response_deserializes_error_payload() {
        let body: TrinoResponse = serde_json::from_str(
            r#"{"id": "q1", "error": {"message": "line 1:8: Column 'title' cannot be resolved",
                "errorName": "COLUMN_NOT_FOUND", "errorType": "USER_ERROR", "errorCode": 47}}"#,
        )
        .unwrap();
        let err = body.error.unwrap();
        assert_eq!(err.kind(&ErrorClassifier::new()), FailureKind::SyntaxError);
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let mut settings = TrinoSettings::default();
        settings.coordinator_url = "http://trino:8080/".to_string();
        let engine = TrinoEngine::new(settings).unwrap();
        assert_eq!(engine.settings.coordinator_url, "http://trino:8080");
    }
}
