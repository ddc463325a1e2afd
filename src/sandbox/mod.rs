//! Remote notebook sandbox: execution data model, service traits and scoped acquisition.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod e2b;

/// Rendering formats a result entry may carry, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Png,
    Jpeg,
    Svg,
    Pdf,
    Html,
    Json,
    Javascript,
    Markdown,
    Latex,
}

impl RenderFormat {
    pub const PRIORITY: [RenderFormat; 9] = [
        RenderFormat::Png,
        RenderFormat::Jpeg,
        RenderFormat::Svg,
        RenderFormat::Pdf,
        RenderFormat::Html,
        RenderFormat::Json,
        RenderFormat::Javascript,
        RenderFormat::Markdown,
        RenderFormat::Latex,
    ];

    /// Field name on the wire, also used as the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            RenderFormat::Png => "png",
            RenderFormat::Jpeg => "jpeg",
            RenderFormat::Svg => "svg",
            RenderFormat::Pdf => "pdf",
            RenderFormat::Html => "html",
            RenderFormat::Json => "json",
            RenderFormat::Javascript => "javascript",
            RenderFormat::Markdown => "markdown",
            RenderFormat::Latex => "latex",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Binary formats arrive base64-encoded; the rest are plain text.
    pub fn is_binary(self) -> bool {
        matches!(self, RenderFormat::Png | RenderFormat::Jpeg | RenderFormat::Pdf)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|f| f.as_str() == name)
    }
}

/// One value produced during execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultEntry {
    pub is_main_result: bool,
    pub text: String,
    pub formats: BTreeMap<RenderFormat, String>,
}

impl ResultEntry {
    pub fn new(is_main_result: bool, text: impl Into<String>) -> Self {
        Self { is_main_result, text: text.into(), formats: BTreeMap::new() }
    }

    pub fn with_format(mut self, format: RenderFormat, payload: impl Into<String>) -> Self {
        self.formats.insert(format, payload.into());
        self
    }

    /// Payloads present on this entry, in priority order. Empty payloads count as absent.
    pub fn renderings(&self) -> impl Iterator<Item = (RenderFormat, &str)> + '_ {
        RenderFormat::PRIORITY.into_iter().filter_map(move |f| {
            self.formats
                .get(&f)
                .map(String::as_str)
                .filter(|p| !p.is_empty())
                .map(|p| (f, p))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Logs {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl Logs {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    pub name: String,
    pub value: String,
    pub traceback: String,
}

/// Everything the sandbox reports for one code submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub results: Vec<ResultEntry>,
    pub logs: Logs,
    pub error: Option<ErrorInfo>,
}

/// Operations consumed from an open sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;

    async fn execute_cell(&self, code: &str) -> Result<ExecutionOutcome>;

    async fn write_bytes(&self, path: &str, data: &[u8]) -> Result<()>;

    async fn download_file(&self, path: &str) -> Result<Vec<u8>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn open(&self, template: &str) -> Result<Box<dyn Sandbox>>;
}

/// An open sandbox that is closed on every exit path.
///
/// `release` closes it and reports the outcome. If the scope is dropped
/// without being released (early return, panic), the close is spawned on the
/// current runtime and any failure is logged. That spawned close is best
/// effort: a runtime that is already shutting down may drop it before the
/// request is sent, so callers on a normal or interrupted exit path should
/// `release` explicitly.
pub struct ScopedSandbox {
    inner: Option<Box<dyn Sandbox>>,
}

impl ScopedSandbox {
    pub async fn open<P>(provider: &P, template: &str) -> Result<Self>
    where
        P: SandboxProvider + ?Sized,
    {
        let sandbox = provider.open(template).await?;
        tracing::debug!(id = sandbox.id(), template, "sandbox opened");
        Ok(Self { inner: Some(sandbox) })
    }

    pub fn sandbox(&self) -> &dyn Sandbox {
        match &self.inner {
            Some(sandbox) => sandbox.as_ref(),
            None => unreachable!("sandbox accessed after release"),
        }
    }

    pub async fn release(mut self) -> Result<()> {
        match self.inner.take() {
            Some(sandbox) => {
                tracing::debug!(id = sandbox.id(), "closing sandbox");
                sandbox.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScopedSandbox {
    fn drop(&mut self) {
        let Some(sandbox) = self.inner.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sandbox.close().await {
                        tracing::error!(id = sandbox.id(), "failed to close sandbox: {e:#}");
                    }
                });
            }
            Err(_) => tracing::error!(id = sandbox.id(), "sandbox dropped outside a runtime; not closed"),
        }
    }
}
