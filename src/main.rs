use anyhow::Result;
use is_terminal::IsTerminal;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use opus_interpreter::{
    agent::{DispatchOptions, Dispatcher},
    cli::Cli,
    config::Config,
    interpreter::ArtifactStore,
    llm::LlmClient,
    printer::Console,
    sandbox::e2b::E2bProvider,
    session::{Session, Templates},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    let mut cfg = Config::load();
    args.apply(&mut cfg);

    let client = LlmClient::from_config(&cfg)?;
    let dispatcher = Dispatcher::new(Box::new(client), DispatchOptions::from_config(&cfg));
    let provider = E2bProvider::from_config(&cfg)?;
    let console = Console::new(cfg.get_bool("PRETTIFY_MARKDOWN"), std::io::stdout().is_terminal());

    let session = Session::new(
        Box::new(provider),
        dispatcher,
        ArtifactStore::from_config(&cfg),
        Box::new(console),
        Templates::from_config(&cfg),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let code = match session.run(stdin, &mut stdout).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:?}");
            1
        }
    };
    // a pending stdin read lives on a blocking thread that runtime shutdown would wait for
    std::process::exit(code);
}
