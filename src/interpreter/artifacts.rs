//! Materializes rendered payloads of a result entry as local files.

use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::{
    config::Config,
    error::ArtifactError,
    printer::Reporter,
    sandbox::{RenderFormat, ResultEntry, Sandbox},
};

/// Where artifacts land: a directory in the sandbox and one on the local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    pub remote_dir: String,
    pub local_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(remote_dir: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self { remote_dir: remote_dir.into(), local_dir: local_dir.into() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.remote_output_dir(), cfg.output_dir())
    }

    pub fn remote_path(&self, index: usize, format: RenderFormat) -> String {
        format!("{}/{}", self.remote_dir.trim_end_matches('/'), file_name(index, format))
    }

    pub fn local_path(&self, index: usize, format: RenderFormat) -> PathBuf {
        let name = file_name(index, format);
        if self.local_dir.as_os_str().is_empty() || self.local_dir == Path::new(".") {
            PathBuf::from(name)
        } else {
            self.local_dir.join(name)
        }
    }

    /// Saves the highest-priority rendering of `entry` and returns the local path.
    ///
    /// Only one sandbox write happens per entry. Failures are reported and
    /// yield an empty list; they never abort the caller.
    pub async fn materialize(
        &self,
        sandbox: &dyn Sandbox,
        reporter: &dyn Reporter,
        entry: &ResultEntry,
        index: usize,
    ) -> Vec<PathBuf> {
        let Some((format, payload)) = entry.renderings().next() else {
            return Vec::new();
        };
        let remote = self.remote_path(index, format);

        match self.persist(sandbox, format, payload, &remote, index).await {
            Ok(local) => {
                tracing::debug!(remote = %remote, local = %local.display(), "artifact saved");
                reporter.saved(&local);
                vec![local]
            }
            Err(e) => {
                tracing::warn!(remote = %remote, "artifact skipped: {e}");
                reporter.artifact_failed(&remote, &e);
                Vec::new()
            }
        }
    }

    async fn persist(
        &self,
        sandbox: &dyn Sandbox,
        format: RenderFormat,
        payload: &str,
        remote: &str,
        index: usize,
    ) -> Result<PathBuf, ArtifactError> {
        let bytes = decode_payload(format, payload).map_err(|source| ArtifactError::Decode {
            path: remote.to_string(),
            source,
        })?;

        sandbox
            .write_bytes(remote, &bytes)
            .await
            .map_err(|e| ArtifactError::RemoteWrite { path: remote.to_string(), message: format!("{e:#}") })?;

        let downloaded = sandbox
            .download_file(remote)
            .await
            .map_err(|e| ArtifactError::Download { path: remote.to_string(), message: format!("{e:#}") })?;

        let local = self.local_path(index, format);
        let local_write = |source: std::io::Error| ArtifactError::LocalWrite { path: local.display().to_string(), source };
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(local_write)?;
        }
        tokio::fs::write(&local, &downloaded).await.map_err(local_write)?;
        Ok(local)
    }
}

fn file_name(index: usize, format: RenderFormat) -> String {
    format!("output_file_{}.{}", index, format.extension())
}

fn decode_payload(format: RenderFormat, payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if format.is_binary() {
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        base64::engine::general_purpose::STANDARD.decode(compact)
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}
