use clap::{Parser, Subcommand};
use pageviewsync::cli::Overrides;
use pageviewsync::config::resolve_config_path;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pageviewsync")]
#[command(about = "Incrementally copy Canvas page views into DuckDB", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.overrides.verbose {
        EnvFilter::new("pageviewsync=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "pageviewsync=info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Run) | None => {
            // Default behavior is to run
            let config_path = resolve_config_path(cli.config.as_deref());
            let config = pageviewsync::cli::run::load_settings(config_path.as_deref(), &cli.overrides)?;

            // Worker threads come from config, so the runtime is built here
            let mut runtime = tokio::runtime::Builder::new_multi_thread();
            runtime.enable_all();
            if let Some(threads) = config.sync.worker_threads {
                runtime.worker_threads(threads);
            }
            runtime.build()?.block_on(pageviewsync::cli::run::run(config))?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => {
                pageviewsync::cli::config::init(stdout)?;
            }
        },
    }

    Ok(())
}
