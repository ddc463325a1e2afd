//! Hosted code-interpreter sandbox client (control plane, notebook execution, filesystem).

use std::{pin::Pin, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{ErrorInfo, ExecutionOutcome, RenderFormat, ResultEntry, Sandbox, SandboxProvider};
use crate::config::Config;

const JUPYTER_PORT: u16 = 49999;
const ENVD_PORT: u16 = 49983;
const SANDBOX_USER: &str = "user";

#[derive(Debug, Clone)]
struct Endpoints {
    api_url: String,
    api_key: Option<String>,
    domain: String,
    /// Routes every sandbox port to one base URL instead of `{port}-{id}.{domain}`.
    sandbox_url: Option<String>,
}

/// Opens sandboxes through the control-plane API.
#[derive(Debug, Clone)]
pub struct E2bProvider {
    http: Client,
    endpoints: Endpoints,
}

impl E2bProvider {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let timeout_secs = cfg.get_u64("REQUEST_TIMEOUT").unwrap_or(300);
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        let endpoints = Endpoints {
            api_url: cfg.e2b_api_url().trim_end_matches('/').to_string(),
            api_key: cfg.get("E2B_API_KEY").filter(|s| !s.trim().is_empty()),
            domain: cfg.get("E2B_DOMAIN").unwrap_or_else(|| "e2b.app".into()),
            sandbox_url: cfg
                .get("E2B_SANDBOX_URL")
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim_end_matches('/').to_string()),
        };

        Ok(Self { http, endpoints })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSandbox {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
    #[serde(default)]
    envd_access_token: Option<String>,
}

#[async_trait]
impl SandboxProvider for E2bProvider {
    async fn open(&self, template: &str) -> Result<Box<dyn Sandbox>> {
        let url = format!("{}/sandboxes", self.endpoints.api_url);
        let mut req = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "templateID": template }));
        if let Some(key) = &self.endpoints.api_key {
            req = req.header("X-API-KEY", key);
        }

        let resp = req.send().await.context("failed to create sandbox")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("sandbox creation failed: {} - {}", status, text);
        }
        let created: CreatedSandbox = resp.json().await.context("invalid sandbox creation response")?;

        Ok(Box::new(E2bSandbox {
            http: self.http.clone(),
            endpoints: self.endpoints.clone(),
            id: created.sandbox_id,
            access_token: created.envd_access_token,
        }))
    }
}

#[derive(Debug)]
pub struct E2bSandbox {
    http: Client,
    endpoints: Endpoints,
    id: String,
    access_token: Option<String>,
}

impl E2bSandbox {
    fn host(&self, port: u16) -> String {
        match &self.endpoints.sandbox_url {
            Some(url) => url.clone(),
            None => format!("https://{}-{}.{}", port, self.id, self.endpoints.domain),
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.header("X-Access-Token", token),
            None => req,
        }
    }

    fn events(&self, code: &str) -> Pin<Box<dyn Stream<Item = Result<ExecEvent>> + Send>> {
        let req = self.authorize(
            self.http
                .post(format!("{}/execute", self.host(JUPYTER_PORT)))
                .json(&serde_json::json!({ "code": code })),
        );

        Box::pin(try_stream! {
            let resp = req.send().await.context("failed to submit code")?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                Err::<(), _>(anyhow!("execution request failed: {} - {}", status, text))?;
                return;
            }

            let mut lines = LineBuffer::default();
            let mut stream = resp.bytes_stream();
            use futures_util::StreamExt as _;

            while let Some(chunk) = stream.next().await {
                let bytes = chunk.context("execution stream error")?;
                lines.push(&bytes);
                while let Some(line) = lines.next_line() {
                    if let Some(event) = parse_event(&line) {
                        yield event;
                    }
                }
            }
            if let Some(event) = parse_event(&lines.finish()) {
                yield event;
            }
        })
    }
}

/// Splits a byte stream on `\n`. Bytes are kept raw until a line is complete,
/// so multi-byte characters split across chunks survive.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        Some(line)
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn parse_event(line: &[u8]) -> Option<ExecEvent> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<ExecEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("skipping malformed execution line: {e}");
            None
        }
    }
}

#[async_trait]
impl Sandbox for E2bSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute_cell(&self, code: &str) -> Result<ExecutionOutcome> {
        use futures_util::StreamExt as _;

        let mut outcome = ExecutionOutcome::default();
        let mut events = self.events(code);
        while let Some(event) = events.next().await {
            match event? {
                ExecEvent::Result(wire) => outcome.results.push(wire.into_entry()),
                ExecEvent::Stdout { text } => outcome.logs.stdout.push(text),
                ExecEvent::Stderr { text } => outcome.logs.stderr.push(text),
                ExecEvent::Error { name, value, traceback } => {
                    outcome.error = Some(ErrorInfo { name, value, traceback })
                }
                ExecEvent::Other => {}
            }
        }
        Ok(outcome)
    }

    async fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(data.to_vec()).file_name(file_name));
        let req = self.authorize(
            self.http
                .post(format!("{}/files", self.host(ENVD_PORT)))
                .query(&[("path", path), ("username", SANDBOX_USER)])
                .multipart(form),
        );

        let resp = req.send().await.context("failed to upload file")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("upload of {} failed: {} - {}", path, status, text);
        }
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        let req = self.authorize(
            self.http
                .get(format!("{}/files", self.host(ENVD_PORT)))
                .query(&[("path", path), ("username", SANDBOX_USER)]),
        );

        let resp = req.send().await.context("failed to download file")?;
        match resp.status() {
            StatusCode::OK => Ok(resp.bytes().await?.to_vec()),
            status => {
                let text = resp.text().await.unwrap_or_default();
                bail!("download of {} failed: {} - {}", path, status, text)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let url = format!("{}/sandboxes/{}", self.endpoints.api_url, self.id);
        let mut req = self.http.delete(&url);
        if let Some(key) = &self.endpoints.api_key {
            req = req.header("X-API-KEY", key);
        }
        let resp = req.send().await.context("failed to kill sandbox")?;
        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            status => bail!("killing sandbox {} failed: {}", self.id, status),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ExecEvent {
    Result(WireResult),
    Stdout {
        #[serde(default)]
        text: String,
    },
    Stderr {
        #[serde(default)]
        text: String,
    },
    Error {
        #[serde(default)]
        name: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        traceback: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireResult {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    is_main_result: bool,
    #[serde(flatten)]
    fields: serde_json::Map<String, Value>,
}

impl WireResult {
    fn into_entry(mut self) -> ResultEntry {
        let mut entry = ResultEntry::new(self.is_main_result, self.text.take().unwrap_or_default());
        for format in RenderFormat::PRIORITY {
            let payload = match self.fields.remove(format.as_str()) {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
            };
            entry.formats.insert(format, payload);
        }
        entry
    }
}
