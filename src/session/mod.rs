//! Interactive read-eval-print loop: one fresh sandbox per message.

use std::{future::Future, io::Write};

use anyhow::{anyhow, Context, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    agent::Dispatcher,
    config::Config,
    interpreter::{ArtifactStore, Interpretation, Interpreter},
    printer::Reporter,
    sandbox::{SandboxProvider, ScopedSandbox},
};

pub const PROMPT: &str = "Enter your message (or 'quit' to exit): ";
pub const EXIT_KEYWORD: &str = "quit";

type Shutdown = Shared<BoxFuture<'static, ()>>;

pub fn is_exit(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(EXIT_KEYWORD)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    /// Template for the sandbox held for the whole session.
    pub session: String,
    /// Template for the sandbox opened for each message.
    pub turn: String,
}

impl Templates {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            session: cfg.get("SESSION_SANDBOX_TEMPLATE").unwrap_or_else(|| "base".into()),
            turn: cfg
                .get("SANDBOX_TEMPLATE")
                .unwrap_or_else(|| "code-interpreter-v1".into()),
        }
    }
}

pub struct Session {
    provider: Box<dyn SandboxProvider>,
    dispatcher: Dispatcher,
    store: ArtifactStore,
    reporter: Box<dyn Reporter>,
    templates: Templates,
}

impl Session {
    pub fn new(
        provider: Box<dyn SandboxProvider>,
        dispatcher: Dispatcher,
        store: ArtifactStore,
        reporter: Box<dyn Reporter>,
        templates: Templates,
    ) -> Self {
        Self { provider, dispatcher, store, reporter, templates }
    }

    /// Holds the session sandbox open while reading messages from `input`
    /// until `quit`, end of input or Ctrl-C; the session sandbox is closed on
    /// every path.
    pub async fn run<R, W>(&self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.run_until(input, out, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Like [`Session::run`], but stops when `shutdown` completes. A turn in
    /// flight is abandoned and its sandbox released before the session one.
    pub async fn run_until<R, W, F>(&self, input: R, out: &mut W, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = shutdown.boxed().shared();
        let session_sandbox = ScopedSandbox::open(self.provider.as_ref(), &self.templates.session)
            .await
            .context("opening session sandbox")?;

        let result = self.repl(input, out, shutdown).await;

        session_sandbox.release().await.context("closing session sandbox")?;
        result
    }

    async fn repl<R, W>(&self, input: R, out: &mut W, shutdown: Shutdown) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        loop {
            if shutdown.peek().is_some() {
                writeln!(out)?;
                break;
            }
            write!(out, "{}", PROMPT)?;
            out.flush()?;

            let line = tokio::select! {
                biased;
                _ = shutdown.clone() => {
                    tracing::info!("interrupted, shutting down");
                    writeln!(out)?;
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                writeln!(out)?;
                break;
            };
            if is_exit(&line) {
                break;
            }

            match self.turn(&line, shutdown.clone()).await {
                Ok(interpretation) => print_turn(out, &interpretation)?,
                Err(e) => {
                    tracing::debug!("turn failed: {e:?}");
                    writeln!(out, "Error while handling message: {e:#}")?;
                }
            }
        }
        Ok(())
    }

    /// Dispatches one message inside its own sandbox.
    async fn turn(&self, message: &str, shutdown: Shutdown) -> Result<Interpretation> {
        let scope = ScopedSandbox::open(self.provider.as_ref(), &self.templates.turn)
            .await
            .context("opening sandbox for message")?;

        let interpreter = Interpreter::new(scope.sandbox(), &self.store, self.reporter.as_ref());
        let result = tokio::select! {
            biased;
            _ = shutdown => Err(anyhow!("interrupted")),
            result = self.dispatcher.dispatch(&interpreter, message) => result,
        };

        if let Err(e) = scope.release().await {
            tracing::error!("failed to close message sandbox: {e:#}");
        }
        result
    }
}

fn print_turn<W: Write>(out: &mut W, interpretation: &Interpretation) -> Result<()> {
    writeln!(out, "{}", interpretation.summary)?;
    if !interpretation.saved_files.is_empty() {
        writeln!(out, "Saved files:")?;
        for file in &interpretation.saved_files {
            writeln!(out, "- {}", file.display())?;
        }
    }
    Ok(())
}
