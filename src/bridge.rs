//! JSON-lines command bridge for a desktop UI.
//!
//! One request per stdin line (`{"id": .., "command": "connect", ..}`), one
//! response or event per stdout line. Requests run concurrently, so a
//! `pauseJob` is never stuck behind a slow `connect`.

use herald_campaign::{JobProcessor, SessionManager};
use herald_core::{
    event::{Event, SessionStatus},
    job::{JobRequest, Pacing},
    phone::PhoneNormalizer,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands accepted on the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    Connect,
    Disconnect,
    Status,
    SendMessage(SendMessageRequest),
    ProcessJob(JobRequest),
    PauseJob(JobRef),
    ResumeJob(JobRef),
    StopJob(JobRef),
}

/// One-off message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub to: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: String,
}

/// Everything a command needs, built once at startup.
pub struct Bridge {
    pub session: Arc<SessionManager>,
    pub processor: Arc<JobProcessor>,
    pub normalizer: PhoneNormalizer,
    pub default_pacing: Pacing,
}

fn failure(error: impl std::fmt::Display) -> Value {
    json!({"success": false, "error": error.to_string()})
}

impl Bridge {
    /// Run one command and build its response body.
    pub async fn dispatch(&self, command: Command) -> Value {
        match command {
            Command::Connect => match self.session.connect().await {
                Ok(status) => json!({
                    "success": true,
                    "connected": status == SessionStatus::Ready,
                    "status": status,
                }),
                Err(e) => failure(e),
            },
            Command::Disconnect => {
                self.session.disconnect().await;
                json!({"success": true})
            }
            Command::Status => json!({
                "success": true,
                "status": self.session.status(),
                "lastError": self.session.last_error(),
                "pendingChallenge": self.session.pending_challenge(),
                "job": self.processor.snapshot(),
            }),
            Command::SendMessage(request) => self.send_message(request).await,
            Command::ProcessJob(request) => {
                match self.processor.start(request.into_job(self.default_pacing)) {
                    Ok(job_id) => json!({"success": true, "jobId": job_id}),
                    Err(e) => failure(e),
                }
            }
            Command::PauseJob(job) => self.control(&job.job_id, "paused", JobProcessor::pause),
            Command::ResumeJob(job) => self.control(&job.job_id, "resumed", JobProcessor::resume),
            Command::StopJob(job) => self.control(&job.job_id, "stopped", JobProcessor::stop),
        }
    }

    async fn send_message(&self, request: SendMessageRequest) -> Value {
        let address = match self.normalizer.normalize(&request.to) {
            Ok(address) => address,
            Err(e) => return failure(e),
        };
        let result = match request.attachments.first() {
            Some(source) => {
                self.session
                    .send_media(&address, &request.content, source)
                    .await
            }
            None => self.session.send_text(&address, &request.content).await,
        };
        match result {
            Ok(()) => json!({"success": true}),
            Err(e) => failure(e),
        }
    }

    fn control(&self, job_id: &str, verb: &str, op: fn(&JobProcessor) -> bool) -> Value {
        if self.processor.active_job_id().as_deref() != Some(job_id) {
            return json!({"success": false, "message": format!("job '{job_id}' is not active")});
        }
        if op(&self.processor) {
            json!({"success": true, "message": format!("job '{job_id}' {verb}")})
        } else {
            json!({"success": false, "message": format!("job '{job_id}' cannot be {verb} now")})
        }
    }

    /// Parse one request line and produce the full response line.
    pub async fn handle_line(&self, line: &str) -> Value {
        let (id, mut body) = match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<Command>(value) {
                    Ok(command) => {
                        debug!("bridge: {command:?}");
                        (id, self.dispatch(command).await)
                    }
                    Err(e) => (id, failure(format!("invalid request: {e}"))),
                }
            }
            Err(e) => (Value::Null, failure(format!("invalid JSON: {e}"))),
        };
        body["type"] = json!("response");
        body["id"] = id;
        body
    }

    /// Stop any running job and drop the session.
    pub async fn shutdown(&self) {
        if self.processor.stop() {
            info!("bridge: stopped active job on shutdown");
        }
        self.session.disconnect().await;
    }
}

/// Render an event as an output line.
pub fn event_line(event: &Event) -> Value {
    match serde_json::to_value(event) {
        Ok(mut value) => {
            value["type"] = json!("event");
            value
        }
        Err(e) => {
            warn!("bridge: cannot serialize {}: {e}", event.name());
            json!({"type": "event", "event": event.name(), "data": null})
        }
    }
}

/// Serve the bridge on stdin/stdout until stdin closes.
pub async fn serve(bridge: Arc<Bridge>, mut events: mpsc::Receiver<Event>) -> anyhow::Result<()> {
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(256);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(value) = out_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("bridge: stdout write failed: {e}");
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let event_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event_out.send(event_line(&event)).await.is_err() {
                break;
            }
        }
    });

    info!("bridge: ready for commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let bridge = bridge.clone();
        let out = out_tx.clone();
        tokio::spawn(async move {
            let response = bridge.handle_line(&line).await;
            let _ = out.send(response).await;
        });
    }

    info!("bridge: stdin closed, shutting down");
    bridge.shutdown().await;
    forwarder.abort();
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}
