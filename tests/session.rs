mod common;

use anyhow::Result;
use std::time::Duration;

use common::{plain_answer, tool_call, FakeProvider, HangingModel, ScriptedModel};
use opus_interpreter::{
    agent::{DispatchOptions, Dispatcher},
    config::Config,
    interpreter::ArtifactStore,
    llm::ModelClient,
    printer::Quiet,
    sandbox::{ExecutionOutcome, RenderFormat, ResultEntry},
    session::{Session, Templates, PROMPT},
};

fn templates() -> Templates {
    Templates { session: "base".into(), turn: "code-interpreter-v1".into() }
}

fn session(provider: &FakeProvider, model: &ScriptedModel, dir: &tempfile::TempDir) -> Session {
    session_with(provider, Box::new(model.clone()), dir)
}

fn session_with(
    provider: &FakeProvider,
    model: Box<dyn ModelClient>,
    dir: &tempfile::TempDir,
) -> Session {
    let cfg = Config::from_pairs(Vec::<(String, String)>::new());
    Session::new(
        Box::new(provider.clone()),
        Dispatcher::new(model, DispatchOptions::from_config(&cfg)),
        ArtifactStore::new("/home/user", dir.path()),
        Box::new(Quiet),
        templates(),
    )
}

async fn drive(session: &Session, input: &str) -> Result<String> {
    let mut out = Vec::new();
    session.run(input.as_bytes(), &mut out).await?;
    Ok(String::from_utf8(out)?)
}

#[tokio::test]
async fn quit_in_any_case_ends_without_dispatch() -> Result<()> {
    for word in ["quit", "QUIT", "Quit"] {
        let dir = tempfile::tempdir()?;
        let provider = FakeProvider::default();
        let model = ScriptedModel::default();

        let out = drive(&session(&provider, &model, &dir), &format!("{}\n", word)).await?;

        assert_eq!(out, PROMPT);
        assert_eq!(model.request_count(), 0);
        let state = provider.sandbox.state();
        assert_eq!(state.opened, vec!["base"]);
        assert_eq!(state.closed, 1);
    }
    Ok(())
}

#[tokio::test]
async fn each_message_gets_its_own_sandbox() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();
    provider.sandbox.state().outcome = ExecutionOutcome {
        results: vec![ResultEntry::new(false, "<Figure>").with_format(RenderFormat::Png, "aGVsbG8=")],
        ..ExecutionOutcome::default()
    };
    let model = ScriptedModel::new([Ok(tool_call("plot()")), Ok(plain_answer("done"))]);

    let out = drive(&session(&provider, &model, &dir), "draw a plot\nthanks\nquit\n").await?;

    let saved = dir.path().join("output_file_1.png");
    let expected = format!(
        "{p}Result 1:\n[Display data]: <Figure>\n\nSaved files:\n- {}\n{p}No code execution requested.\n{p}",
        saved.display(),
        p = PROMPT
    );
    assert_eq!(out, expected);
    assert_eq!(std::fs::read(&saved)?, b"hello");

    let state = provider.sandbox.state();
    assert_eq!(state.opened, vec!["base", "code-interpreter-v1", "code-interpreter-v1"]);
    assert_eq!(state.closed, 3);
    assert_eq!(state.executed, vec!["plot()"]);
    Ok(())
}

#[tokio::test]
async fn failed_turn_is_reported_and_loop_continues() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();
    let model = ScriptedModel::new([
        Err("LLM error: 500 Internal Server Error".to_string()),
        Ok(plain_answer("hello again")),
    ]);

    let out = drive(&session(&provider, &model, &dir), "first\nsecond\nquit\n").await?;

    assert!(out.contains("Error while handling message: model request failed: LLM error: 500 Internal Server Error\n"));
    assert!(out.contains("No code execution requested."));
    assert_eq!(model.request_count(), 2);
    // session sandbox plus one per message, all released
    assert_eq!(provider.sandbox.state().closed, 3);
    Ok(())
}

#[tokio::test]
async fn end_of_input_terminates_like_quit() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();
    let model = ScriptedModel::new([Ok(plain_answer("ok"))]);

    let out = drive(&session(&provider, &model, &dir), "only message").await?;

    assert_eq!(out, format!("{p}No code execution requested.\n{p}\n", p = PROMPT));
    assert_eq!(model.request_count(), 1);
    assert_eq!(provider.sandbox.state().closed, 2);
    Ok(())
}

#[tokio::test]
async fn execution_error_becomes_the_summary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();
    provider.sandbox.state().outcome = ExecutionOutcome {
        error: Some(opus_interpreter::sandbox::ErrorInfo {
            name: "NameError".into(),
            value: "name 'x' is not defined".into(),
            traceback: "---> x".into(),
        }),
        ..ExecutionOutcome::default()
    };
    let model = ScriptedModel::new([Ok(tool_call("x"))]);

    let out = drive(&session(&provider, &model, &dir), "show x\nquit\n").await?;

    assert!(out.contains(
        "There was an error during execution: NameError: name 'x' is not defined.\n---> x\n"
    ));
    assert!(!out.contains("Saved files:"));
    Ok(())
}

#[tokio::test]
async fn interrupt_at_the_prompt_releases_session_sandbox() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();
    let model = ScriptedModel::default();
    // keep the writer alive so the read never sees end of input
    let (_keyboard, input) = tokio::io::duplex(64);

    let mut out = Vec::new();
    session(&provider, &model, &dir)
        .run_until(tokio::io::BufReader::new(input), &mut out, async {})
        .await?;

    assert_eq!(String::from_utf8(out)?, format!("{}\n", PROMPT));
    assert_eq!(model.request_count(), 0);
    let state = provider.sandbox.state();
    assert_eq!(state.opened, vec!["base"]);
    assert_eq!(state.closed, 1);
    Ok(())
}

#[tokio::test]
async fn interrupt_during_a_turn_releases_both_sandboxes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = FakeProvider::default();

    let mut out = Vec::new();
    session_with(&provider, Box::new(HangingModel), &dir)
        .run_until("draw a plot\n".as_bytes(), &mut out, tokio::time::sleep(Duration::from_millis(50)))
        .await?;

    assert_eq!(
        String::from_utf8(out)?,
        format!("{p}Error while handling message: interrupted\n\n", p = PROMPT)
    );
    let state = provider.sandbox.state();
    assert_eq!(state.opened, vec!["base", "code-interpreter-v1"]);
    assert_eq!(state.closed, 2);
    Ok(())
}
