use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Instrument, info_span};

use chatline::app::App;
use chatline::{BackendKind, Config, ConversationController, logging, tui};

#[derive(Parser)]
#[command(name = "chatline")]
#[command(version)]
#[command(about = "Chat with a small local or remote language model", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.chatline/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to talk to
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendKind>,

    /// Remote chat endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Local model identifier
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Ask { message: String },
    /// Print the resolved configuration
    Config {
        /// Also write it back to the config file
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        config.apply_overrides(self.backend, self.endpoint.clone(), self.model.clone());
        Ok(config)
    }
}

async fn ask(config: &Config, message: &str) -> Result<()> {
    let mut controller = ConversationController::new(config.build_backend());
    let span = info_span!("session", id = %controller.session_id());

    async {
        controller.initialize().await;
        if !controller.is_backend_ready() {
            bail!("{} could not be initialized", controller.describe_backend());
        }

        match controller.send(message).await {
            Some(reply) => println!("{}", reply.text),
            None => bail!("Nothing to send"),
        }
        controller.shutdown();
        Ok(())
    }
    .instrument(span)
    .await
}

async fn interactive(config: &Config) -> Result<()> {
    logging::init_file(&Config::home_dir()?.join("chatline.log"))?;

    let controller = ConversationController::new(config.build_backend());
    let span = info_span!("session", id = %controller.session_id());
    let app = App::new(controller);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = app
        .run(&mut terminal, config.tick_rate())
        .instrument(span)
        .await;
    tui::restore()?;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match &cli.command {
        None => interactive(&config).await,
        Some(Commands::Ask { message }) => {
            logging::init_stderr()?;
            ask(&config, message).await
        }
        Some(Commands::Config { save }) => {
            logging::init_stderr()?;
            print!("{}", config.to_toml()?);
            if *save {
                match &cli.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
            }
            Ok(())
        }
    }
}
