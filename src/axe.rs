//! Client for the axe accessibility tool server.
//!
//! The server is a long-lived child process speaking JSON-RPC 2.0 over
//! stdio, one JSON object per line. The handle is acquired once per run and
//! must be released with [`AxeServer::shutdown`] on every exit path.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: String,
    id: Option<u64>,
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Owned handle over the axe server subprocess.
pub struct AxeServer {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl AxeServer {
    /// Spawn the server with piped stdio. Stderr is inherited so server
    /// diagnostics land in the terminal.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        debug!(command, ?args, "starting axe server");
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start axe server: {}", command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("axe server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("axe server stdout unavailable"))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        })
    }

    /// Send one request and read lines until the reply with a matching id.
    ///
    /// Malformed lines and replies to other ids are skipped with a warning.
    /// EOF before the reply arrives is an error.
    pub async fn call(&mut self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send {} request to axe server", method))?;
        self.stdin.flush().await?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let read = self
                .stdout
                .read_line(&mut buf)
                .await
                .context("failed to read from axe server")?;
            if read == 0 {
                return Err(anyhow!(
                    "axe server closed its output while awaiting reply to {}",
                    method
                ));
            }

            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response: RpcResponse = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!("skipping unparseable axe server line: {}", e);
                    continue;
                }
            };
            if response.id != Some(id) {
                warn!(got = ?response.id, expected = id, "skipping reply for another request");
                continue;
            }

            if let Some(err) = response.error {
                return Err(anyhow!("axe server error {}: {}", err.code, err.message));
            }
            return response
                .result
                .ok_or_else(|| anyhow!("axe server reply to {} carried no result", method));
        }
    }

    /// Graceful shutdown: close stdin, wait briefly, kill if unresponsive.
    pub async fn shutdown(self) {
        let AxeServer {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        match timeout(Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => debug!("axe server exited: {}", status),
            Ok(Err(e)) => warn!("failed to reap axe server: {}", e),
            Err(_) => {
                warn!("axe server did not exit after stdin close, killing it");
                let _ = child.kill().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // `cat` echoes our request lines back, which doubles as a JSON-RPC
    // server that replies with the request itself. The request has no
    // `result` field, so `call` must report a malformed reply rather than
    // hang or panic.
    #[tokio::test]
    async fn test_call_rejects_reply_without_result() {
        let mut server = AxeServer::spawn("cat", &[]).await.expect("spawn cat");
        let err = server
            .call("get_rules", json!({"tags": ["wcag2aa"]}))
            .await
            .expect_err("echoed request is not a valid reply");
        assert!(err.to_string().contains("no result"), "{err}");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_surfaces_dead_server() {
        // `true` exits immediately; depending on timing the failure is a
        // broken pipe on write or EOF on read, but it is always an Err.
        let mut server = AxeServer::spawn("true", &[]).await.expect("spawn true");
        let result = server.call("get_rules", json!({})).await;
        assert!(result.is_err());
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result = AxeServer::spawn("definitely-not-a-real-binary-a11yfix", &[]).await;
        assert!(result.is_err());
    }
}
