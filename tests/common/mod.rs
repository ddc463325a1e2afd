#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use opus_interpreter::{
    error::ArtifactError,
    llm::{MessageRequest, MessageResponse, ModelClient},
    printer::Reporter,
    sandbox::{ExecutionOutcome, Sandbox, SandboxProvider},
};

#[derive(Debug, Default)]
pub struct SandboxState {
    pub outcome: ExecutionOutcome,
    pub executed: Vec<String>,
    pub writes: Vec<(String, Vec<u8>)>,
    pub downloads: Vec<String>,
    pub files: HashMap<String, Vec<u8>>,
    pub fail_writes: bool,
    pub fail_downloads_of: Option<String>,
    pub fail_execution: bool,
    pub opened: Vec<String>,
    pub closed: usize,
}

/// In-memory sandbox sharing state with the test body.
#[derive(Debug, Clone, Default)]
pub struct FakeSandbox {
    pub state: Arc<Mutex<SandboxState>>,
}

impl FakeSandbox {
    pub fn with_outcome(outcome: ExecutionOutcome) -> Self {
        let sandbox = Self::default();
        sandbox.state.lock().unwrap().outcome = outcome;
        sandbox
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SandboxState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn id(&self) -> &str {
        "fake"
    }

    async fn execute_cell(&self, code: &str) -> Result<ExecutionOutcome> {
        let mut state = self.state.lock().unwrap();
        if state.fail_execution {
            bail!("kernel unreachable");
        }
        state.executed.push(code.to_string());
        Ok(state.outcome.clone())
    }

    async fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            bail!("disk full");
        }
        state.writes.push((path.to_string(), data.to_vec()));
        state.files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.downloads.push(path.to_string());
        if state.fail_downloads_of.as_deref() == Some(path) {
            bail!("connection reset");
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", path))
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// Hands out sandboxes that all share one state.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    pub sandbox: FakeSandbox,
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn open(&self, template: &str) -> Result<Box<dyn Sandbox>> {
        self.sandbox.state().opened.push(template.to_string());
        Ok(Box::new(self.sandbox.clone()))
    }
}

/// Replays canned responses and records every request.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    pub responses: Arc<Mutex<VecDeque<Result<MessageResponse, String>>>>,
    pub requests: Arc<Mutex<Vec<MessageRequest>>>,
}

impl ScriptedModel {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<MessageResponse, String>>,
    {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            requests: Arc::default(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => bail!("no scripted response left"),
        }
    }
}

/// Never answers, like a model request stuck on the network.
#[derive(Debug, Clone, Default)]
pub struct HangingModel;

#[async_trait]
impl ModelClient for HangingModel {
    async fn create_message(&self, _request: &MessageRequest) -> Result<MessageResponse> {
        std::future::pending().await
    }
}

pub fn response(value: serde_json::Value) -> MessageResponse {
    serde_json::from_value(value).expect("valid message response")
}

pub fn tool_call(code: &str) -> MessageResponse {
    response(serde_json::json!({
        "content": [
            {"type": "text", "text": "Running it."},
            {"type": "tool_use", "id": "toolu_1", "name": "execute_python", "input": {"code": code}}
        ],
        "stop_reason": "tool_use"
    }))
}

pub fn plain_answer(text: &str) -> MessageResponse {
    response(serde_json::json!({
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn"
    }))
}

/// Captures saved paths and artifact failures.
#[derive(Debug, Default)]
pub struct Recorder {
    pub saved: Mutex<Vec<PathBuf>>,
    pub failures: Mutex<Vec<String>>,
}

impl Reporter for Recorder {
    fn saved(&self, path: &Path) {
        self.saved.lock().unwrap().push(path.to_path_buf());
    }

    fn artifact_failed(&self, remote_path: &str, error: &ArtifactError) {
        self.failures
            .lock()
            .unwrap()
            .push(format!("{}: {}", remote_path, error));
    }
}
