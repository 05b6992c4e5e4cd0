use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod configuration;
mod error;
mod map;
mod prompt;
mod session;

use configuration::Settings;
use locintel::agent::Agent;
use locintel::providers::openai::OpenAiProvider;
use locintel::session::Session;
use locintel::systems::geocode::{GeocodeSystem, NominatimGateway};
use map::TerminalMap;
use prompt::cliclack::CliclackPrompt;
use session::ChatSession;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (defaults to locintel/config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model to use, overriding the configured one
    #[arg(short, long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the rendered reply
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::new(cli.config.as_deref())?;

    let mut provider_config = settings.provider_config();
    if let Some(model) = cli.model {
        provider_config.model = model;
    }
    let provider = OpenAiProvider::new(provider_config)?;
    let gateway = NominatimGateway::new(settings.gateway_config())?;

    let mut agent = Agent::new(Box::new(provider)).with_max_steps(settings.agent.max_steps);
    agent.add_system(Box::new(GeocodeSystem::new(Box::new(gateway))));

    let session =
        Session::new(settings.overlay_config()).with_surface(Box::new(TerminalMap::stdout()));

    let mut chat = ChatSession::new(agent, session, Box::new(CliclackPrompt::new()));
    chat.start().await?;

    tracing::debug!(
        turns = chat.session().conversation().len(),
        "session ended"
    );
    Ok(())
}
