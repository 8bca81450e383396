use clap::{Parser, Subcommand};
use emolt_clim::config::Config;
use emolt_clim::fetcher::Fetcher;
use emolt_clim::output;
use emolt_clim::runner::Runner;
use emolt_clim::sites::SiteDirectory;
use emolt_clim::survey;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "emolt-clim")]
#[command(about = "Build eMOLT temperature climatologies from ERDDAP", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate daily, monthly, annual and climatology tables for the configured sites
    Run,
    /// Count points and years of record for every site in the lookup table
    Survey {
        /// Override the survey output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,emolt_clim=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. {} exists\n\
             2. All referenced environment variables are set (check .env.example)",
            e,
            cli.config.display()
        )
    })?;
    info!("Configuration loaded from {}", cli.config.display());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let runner = Runner::new(config)?;
            let summary = runner.run().await;
            for (site, reason) in &summary.skipped {
                info!("Skipped {}: {}", site, reason);
            }
        }
        Commands::Survey { output: path } => {
            let directory = SiteDirectory::load(&config.site_lookup)?;
            let fetcher = Fetcher::new(
                &config.source.base_url,
                &config.source.dataset,
                Duration::from_secs(config.source.timeout_seconds),
            )?;

            let records = survey::survey_sites(&fetcher, &directory).await;
            let path = path.unwrap_or(config.output.survey_file);
            output::write_survey(&path, &records)?;
        }
    }

    Ok(())
}
