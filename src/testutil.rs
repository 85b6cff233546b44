#![cfg(test)]

use crate::core::traits::{CommandRunner, CommandSpec, DeliveryReport, ExecResult, Notifier};
use crate::security::CommandError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Scripted [`CommandRunner`]: records every call and answers by command prefix
///
/// A prefix is matched against the displayed command (`npm view pkg@1.0.0 ...`).
/// Queued answers are consumed in order; the last one repeats. Unmatched
/// commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<Vec<(String, VecDeque<ExecResult>)>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, prefix: &str, result: ExecResult) -> Self {
        {
            let mut responses = self.responses.lock().unwrap();
            match responses.iter_mut().find(|(p, _)| p == prefix) {
                Some((_, queue)) => queue.push_back(result),
                None => responses.push((prefix.to_string(), VecDeque::from([result]))),
            }
        }
        self
    }

    pub fn ok(stdout: &str) -> ExecResult {
        ExecResult::Success {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn fail(stderr: &str) -> ExecResult {
        ExecResult::Failure {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
            log_contents: None,
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Displayed form of every recorded call
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.commands().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ExecResult, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        let shown = spec.to_string();

        let mut responses = self.responses.lock().unwrap();
        let answer = responses
            .iter_mut()
            .find(|(prefix, _)| shown.starts_with(prefix.as_str()))
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });

        Ok(answer.unwrap_or_else(|| FakeRunner::ok("")))
    }
}

/// [`Notifier`] that keeps every message
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> DeliveryReport {
        self.messages.lock().unwrap().push(message.to_string());
        DeliveryReport::Sent
    }
}

/// One request seen by [`MockServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Minimal HTTP/1.1 server answering every request with one canned response
pub struct MockServer {
    pub url: String,
    requests: std::sync::Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    pub async fn start(status: u16, body: &str) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = std::sync::Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();
        let body = body.to_string();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 8192];
                let header_end = loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break None;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                };
                let Some(header_end) = header_end else {
                    continue;
                };

                let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
                let mut lines = head.lines();
                let path = lines
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let headers: Vec<(String, String)> = lines
                    .filter_map(|l| l.split_once(':'))
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .collect();
                let length = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                while buffer.len() < header_end + length {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }
                let request_body = String::from_utf8_lossy(&buffer[header_end..]).to_string();
                recorded.lock().unwrap().push(RecordedRequest {
                    path,
                    headers,
                    body: request_body,
                });

                let reason = match status {
                    200..=299 => "OK",
                    401 => "Unauthorized",
                    404 => "Not Found",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}
