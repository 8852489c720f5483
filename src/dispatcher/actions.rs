//! Executes a single `ActionSpec` against an event. Both branches are
//! fire-and-forget: failures are logged, never propagated (spec.md §4.5).

use std::process::Stdio;
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::model::{ActionSpec, EventEntry};

/// Runs `spec` against `event`; returns whether it completed without error,
/// used only for observability counters (spec.md §4.5 dispatch stays
/// fire-and-forget regardless of the result).
pub async fn execute(client: &Client, spec: &ActionSpec, event: &EventEntry, timeout: Duration) -> bool {
    match spec {
        ActionSpec::Webhook { url, headers } => execute_webhook(client, url, headers, event, timeout).await,
        ActionSpec::Script { command, args } => execute_script(command, args, event).await,
    }
}

async fn execute_webhook(
    client: &Client,
    url: &str,
    headers: &std::collections::HashMap<String, String>,
    event: &EventEntry,
    timeout: Duration,
) -> bool {
    let mut request = client.post(url).timeout(timeout).json(event);
    for (key, value) in headers {
        request = request.header(key.as_str(), value.as_str());
    }

    match request.send().await {
        Ok(response) if !response.status().is_success() => {
            tracing::warn!(url, status = %response.status(), "webhook action returned non-success status");
            false
        }
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(url, error = %err, "webhook action failed");
            false
        }
    }
}

async fn execute_script(command: &str, args: &[String], event: &EventEntry) -> bool {
    let payload = match serde_json::to_vec(event) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize event for script action");
            return false;
        }
    };

    let mut child = match Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(command, error = %err, "failed to spawn script action");
            return false;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(&payload).await {
            tracing::warn!(command, error = %err, "failed to write event to script stdin");
        }
    }

    match child.wait().await {
        Ok(status) => status.success(),
        Err(err) => {
            tracing::warn!(command, error = %err, "script action process failed");
            false
        }
    }
}
