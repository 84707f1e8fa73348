use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use anypod_pipeline::AppSettings;

mod commands;

#[derive(Parser)]
#[command(name = "anypod")]
#[command(about = "Convert web video/audio sources into podcast RSS feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version information
    Version,

    /// Run the daemon: reconcile, schedule, and serve (default)
    Serve,

    /// Developer aids that exercise single components
    Debug {
        #[command(subcommand)]
        command: DebugCommands,
    },
}

#[derive(Subcommand)]
enum DebugCommands {
    /// Dump discovery and per-item metadata for a URL
    Ytdlp {
        /// Source URL to inspect
        url: String,
    },
}

fn init_tracing(settings: &AppSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.clone()));

    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(settings.log_include_stacktrace)
        .with_line_number(settings.log_include_stacktrace);

    if settings.log_format == "human" {
        base.init();
    } else {
        base.json().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("anypod {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Debug { command }) => {
            let settings = AppSettings::load()?;
            init_tracing(&settings);
            match command {
                DebugCommands::Ytdlp { url } => commands::debug_ytdlp::run(&settings, &url).await?,
            }
        }
        Some(Commands::Serve) | None => {
            let settings = AppSettings::load()?;
            init_tracing(&settings);
            commands::serve::run(settings).await?;
        }
    }

    Ok(())
}
