use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use common::{Error, Result};

use crate::{ContainerRuntime, ContainerSpec, ContainerStatus, ContainerSummary};

/// Client for the Docker Engine HTTP API, reached over TCP at the
/// configured host URI.
pub struct DockerRuntime {
    host: String,
    http: Client,
}

impl DockerRuntime {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Docker(format!("HTTP {status}: {body}")));
        }
        Ok(resp)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.host);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        self.check(resp).await
    }

    async fn post(&self, path: &str, body: Option<serde_json::Value>) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.host);
        let mut req = self.http.post(&url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;
        self.check(resp).await
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_labeled(&self, label: &str) -> Result<Vec<ContainerSummary>> {
        let filters = json!({ "label": [label] }).to_string();
        let path = format!(
            "/containers/json?all=true&filters={}",
            urlencode(&filters)
        );
        let resp = self.get(&path).await?;
        let containers: Vec<ContainerListEntry> =
            resp.json().await.map_err(|e| Error::Docker(e.to_string()))?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id,
                status: c.state,
            })
            .collect())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let body = json!({
            "Image": spec.image,
            "Cmd": spec.cmd,
            "Labels": spec.labels,
            "HostConfig": { "Binds": spec.binds },
        });
        let path = format!("/containers/create?name={}", urlencode(&spec.name));
        let resp = self.post(&path, Some(body)).await?;
        let created: ContainerCreated =
            resp.json().await.map_err(|e| Error::Docker(e.to_string()))?;
        Ok(created.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.post(&format!("/containers/{id}/start"), None).await?;
        Ok(())
    }

    async fn stop(&self, id: &str, grace_secs: u32) -> Result<()> {
        self.post(&format!("/containers/{id}/stop?t={grace_secs}"), None)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let url = format!("{}/containers/{id}?force=true", self.host);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        self.check(resp).await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerStatus> {
        let resp = self.get(&format!("/containers/{id}/json")).await?;
        let inspected: ContainerInspected =
            resp.json().await.map_err(|e| Error::Docker(e.to_string()))?;
        Ok(ContainerStatus {
            status: inspected.state.status,
            running: inspected.state.running,
            exit_code: inspected.state.exit_code,
        })
    }

    async fn tail_logs(&self, id: &str, lines: usize) -> Result<String> {
        let path = format!(
            "/containers/{id}/logs?stdout=true&stderr=true&timestamps=true&tail={lines}"
        );
        let resp = self.get(&path).await?;
        let bytes = resp.bytes().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(demux_log_stream(&bytes))
    }
}

/// Decode the engine's multiplexed log stream: 8-byte frame headers
/// (stream type, three zero bytes, big-endian payload length) interleave
/// stdout and stderr when the container has no TTY. Raw text from TTY
/// containers is passed through unchanged.
fn demux_log_stream(bytes: &[u8]) -> String {
    match bytes.first() {
        Some(0..=2) => {}
        _ => return String::from_utf8_lossy(bytes).into_owned(),
    }

    let mut out = String::new();
    let mut offset = 0;
    while offset + 8 <= bytes.len() {
        let header = &bytes[offset..offset + 8];
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        offset += 8;
        let end = (offset + len).min(bytes.len());
        out.push_str(&String::from_utf8_lossy(&bytes[offset..end]));
        offset = end;
    }
    out
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ContainerListEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Deserialize)]
struct ContainerCreated {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Deserialize)]
struct ContainerInspected {
    #[serde(rename = "State")]
    state: InspectedState,
}

#[derive(Deserialize)]
struct InspectedState {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "ExitCode", default)]
    exit_code: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demux_reassembles_framed_payloads() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 5]);
        stream.extend_from_slice(b"hello");
        stream.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 6]);
        stream.extend_from_slice(b" world");
        assert_eq!(demux_log_stream(&stream), "hello world");
    }

    #[test]
    fn demux_passes_tty_output_through() {
        assert_eq!(demux_log_stream(b"plain tty output"), "plain tty output");
    }

    #[test]
    fn demux_tolerates_truncated_final_frame() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 99]);
        stream.extend_from_slice(b"short");
        assert_eq!(demux_log_stream(&stream), "short");
    }

    #[test]
    fn label_filter_is_percent_encoded() {
        let filters = serde_json::json!({ "label": ["backtestd"] }).to_string();
        let encoded = urlencode(&filters);
        assert!(!encoded.contains('{'));
        assert!(!encoded.contains('"'));
        assert!(encoded.contains("backtestd"));
    }

    #[test]
    fn inspect_state_parses_engine_shape() {
        let body = r#"{"State": {"Status": "exited", "Running": false, "ExitCode": 0}}"#;
        let inspected: ContainerInspected = serde_json::from_str(body).unwrap();
        assert_eq!(inspected.state.status, "exited");
        assert!(!inspected.state.running);
        assert_eq!(inspected.state.exit_code, Some(0));
    }
}
