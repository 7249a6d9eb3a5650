use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use travel_planner::chat;
use travel_planner::constants;
use travel_planner::llm_interaction::LlmClient;
use travel_planner::settings::{self, Settings};
use travel_planner::weather::WeatherClient;
use travel_planner::web_server::{self, ServerConfig};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web UI.
    Serve {
        #[arg(long, env = "TRAVEL_HOST", default_value = constants::DEFAULT_HOST, help = "Address to bind.")]
        host: String,
        #[arg(long, env = "TRAVEL_PORT", default_value_t = constants::DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, help = "Directory for exported conversations (defaults to TRAVEL_EXPORT_DIR or ./exports).")]
        export_dir: Option<PathBuf>,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long = "static", default_value = "static", help = "Directory holding static assets.")]
        static_dir: PathBuf,
    },
    /// Chat with the travel assistant in the terminal.
    Chat {
        #[arg(long, default_value = settings::DEFAULT_MODEL, help = "Model used for answers.")]
        model: String,
        #[arg(long, default_value_t = settings::DEFAULT_TEMPERATURE, help = "Creativity (0.0 - 1.0).")]
        temperature: f32,
        #[arg(long, default_value_t = settings::DEFAULT_MAX_TOKENS, help = "Maximum answer length in tokens.")]
        max_tokens: u32,
        #[arg(long, help = "Directory for /export (defaults to TRAVEL_EXPORT_DIR or ./exports).")]
        export_dir: Option<PathBuf>,
    },
    /// Print the forecast for a city.
    Weather {
        city: String,
        #[arg(long, help = "Date as YYYY-MM-DD (defaults to today).")]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "12시")]
        hour: String,
        #[arg(long, default_value = "오후")]
        ampm: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,travel_planner=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!("Travel planner starting with command: {:?}", cli.command);

    let llm = LlmClient::new(constants::OPENAI_BASE_URL.as_str(), constants::OPENAI_API_KEY.as_str());
    let weather = WeatherClient::new(constants::OPENWEATHER_BASE_URL.as_str(), constants::OPENWEATHER_API_KEY.as_str())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            export_dir,
            templates,
            static_dir,
        } => {
            let defaults = ServerConfig::default();
            let config = ServerConfig {
                templates_dir: templates,
                static_dir,
                export_dir: export_dir.unwrap_or(defaults.export_dir),
            };

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(&host, port, config, llm, weather).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat {
            model,
            temperature,
            max_tokens,
            export_dir,
        } => {
            let settings = Settings::new(&model, temperature, max_tokens)?;
            let export_dir = export_dir.unwrap_or_else(|| PathBuf::from(constants::EXPORT_DIR.as_str()));
            chat::run_terminal_chat(llm, settings, export_dir)
                .await
                .context("Chat session failed")?;
        }
        Commands::Weather { city, date, hour, ampm } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let report = weather.check_weather(&city, Some(date), &hour, &ampm).await;
            println!("{}", report);
        }
    }

    Ok(())
}
