mod config;
mod link_cmd;
mod plan_cmd;
mod serve_cmd;
#[cfg(test)]
mod test_util;

use clap::{Parser, Subcommand};

use mealprep_core::weekday;

use config::{MealprepConfig, Overrides};

#[derive(Parser)]
#[command(name = "mealprep", about = "Weekly meal plans with verified recipe links")]
struct Cli {
    /// IANA time zone (overrides MEALPREP_TIME_ZONE / TIME_ZONE env vars)
    #[arg(long, global = true)]
    time_zone: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a mealprep config file
    Init {
        /// Gemini API key to store in the config file
        #[arg(long)]
        api_key: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Serve the agent over HTTP
    Serve {
        /// Address to bind (overrides MEALPREP_BIND)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Talk to the agent from the terminal; each message is one turn
    Plan {
        /// Messages to send, in order
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Check recipe URLs the way the planner does
    CheckLink {
        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
        /// Per-request timeout in seconds (overrides planner.validation_timeout_secs)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the current day of the week in the configured time zone
    Weekday,
}

/// Execute the `mealprep init` command: write config file.
fn cmd_init(time_zone: Option<&str>, api_key: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let mut cfg = config::ConfigFile::default();
    if let Some(tz) = time_zone {
        mealprep_core::config::parse_time_zone(Some(tz))?;
        cfg.planner.time_zone = Some(tz.to_string());
    }
    cfg.gemini.api_key = api_key;

    config::save_config_to(&cfg, &path)?;

    println!("Config written to {}", path.display());
    match &cfg.planner.time_zone {
        Some(tz) => println!("  planner.time_zone = {tz}"),
        None => println!("  planner.time_zone is unset; set MEALPREP_TIME_ZONE or edit the file"),
    }
    if cfg.gemini.api_key.is_none() {
        println!("  gemini.api_key is unset; set GEMINI_API_KEY or edit the file");
    }
    println!();
    println!("Next: run `mealprep serve` or `mealprep plan \"<message>\"`.");

    Ok(())
}

/// Execute the `mealprep weekday` command.
fn cmd_weekday(time_zone: Option<&str>) -> anyhow::Result<()> {
    let file = config::load_config()?;
    let tz_id = config::resolve_time_zone_id(time_zone, &file);
    let tz = mealprep_core::config::parse_time_zone(tz_id.as_deref())?;
    let now = chrono::Utc::now();
    let day = weekday::weekday_at(tz, now);
    println!("{}", weekday::describe(day));
    println!("  ({} in {tz})", now.with_timezone(&tz).format("%Y-%m-%d %H:%M"));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { api_key, force } => {
            cmd_init(cli.time_zone.as_deref(), api_key, force)?;
        }
        Commands::Serve { bind, port } => {
            let resolved = MealprepConfig::resolve(&Overrides {
                time_zone: cli.time_zone,
                bind,
                port,
            })?;
            let runner = plan_cmd::build_runner(&resolved)?;
            serve_cmd::run_serve(
                runner,
                &resolved.server.bind,
                resolved.server.port,
                &resolved.server.allowed_origins,
            )
            .await?;
        }
        Commands::Plan { messages } => {
            let resolved = MealprepConfig::resolve(&Overrides {
                time_zone: cli.time_zone,
                ..Overrides::default()
            })?;
            plan_cmd::run_plan(&resolved, &messages).await?;
        }
        Commands::CheckLink { urls, timeout } => {
            let file = config::load_config()?;
            let mut validator = file.planner.validator_config();
            if let Some(secs) = timeout {
                validator.timeout = std::time::Duration::from_secs(secs);
            }
            link_cmd::run_check_links(&validator, &urls, file.planner.validation_concurrency)
                .await?;
        }
        Commands::Weekday => {
            cmd_weekday(cli.time_zone.as_deref())?;
        }
    }

    Ok(())
}
