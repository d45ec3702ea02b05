use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::signal;

use life_scheduler::api;
use life_scheduler::calendar::{HolidayCalendar, TomlHolidays};
use life_scheduler::clock::{Clock, SystemClock};
use life_scheduler::commands::{self, LifeService};
use life_scheduler::config;
use life_scheduler::context::{Collaborators, ContextAssembler};
use life_scheduler::generator::{Generator, GeneratorClient, LlmGenerator};
use life_scheduler::guard::GenerationGuard;
use life_scheduler::llm;
use life_scheduler::persona::{FilePersona, PersonaSource};
use life_scheduler::pipeline::SchedulePipeline;
use life_scheduler::scheduler::Scheduler;
use life_scheduler::session::{ConversationSource, SessionStore};
use life_scheduler::settings::SettingsHandle;
use life_scheduler::store::{DayKey, SharedStore};

#[derive(Parser)]
#[command(
    name = "life-scheduler",
    version,
    about = "Generates a daily life schedule for your AI persona"
)]
struct Cli {
    #[arg(short, long, default_value = "~/.life-scheduler/config.toml")]
    config: String,
    /// API server URL (for show / regenerate / time)
    #[arg(long, global = true, default_value = "http://127.0.0.1:3100")]
    url: String,
    /// Auth token (or LIFE_SCHEDULER_TOKEN env)
    #[arg(long, global = true, env = "LIFE_SCHEDULER_TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and HTTP API
    Run,
    /// Create ~/.life-scheduler with a starter config
    Init,
    /// Print today's stored schedule and the trigger time
    Status,
    /// Show today's schedule, generating it if needed
    Show,
    /// Generate today's schedule again
    Regenerate,
    /// Set the daily generation time
    Time {
        /// HH:MM, 24-hour
        time: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            let base = config::init_config_dir().await?;
            tracing::info!("Initialized {}", base.display());
        }
        Commands::Run => run(&cli.config).await?,
        Commands::Status => status(&cli.config).await?,
        Commands::Show => {
            let text = send_command(&cli.url, cli.token.as_deref(), "show", None).await?;
            println!("{text}");
        }
        Commands::Regenerate => {
            let text = send_command(&cli.url, cli.token.as_deref(), "regenerate", None).await?;
            println!("{text}");
        }
        Commands::Time { time } => {
            let text = send_command(&cli.url, cli.token.as_deref(), "time", Some(&time)).await?;
            println!("{text}");
        }
    }
    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let storage = &cfg.storage;
    tokio::fs::create_dir_all(&storage.base_dir).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(cfg.clock.timezone));
    let store = Arc::new(SharedStore::load(storage.data_path()));
    let settings = Arc::new(SettingsHandle::load(storage.settings_path()));
    let sessions = Arc::new(SessionStore::new(storage.base_dir.clone())?);

    let generator: Option<Arc<dyn Generator>> = match &cfg.llm {
        Some(llm_cfg) => {
            let llm = llm::create_client(llm_cfg)?;
            Some(Arc::new(LlmGenerator::new(llm, sessions.clone())) as Arc<dyn Generator>)
        }
        None => {
            tracing::warn!("No [llm] section configured; schedule generation will fail");
            None
        }
    };

    let calendar: Option<Arc<dyn HolidayCalendar>> =
        match TomlHolidays::load(&storage.holidays_path()) {
            Ok(c) => Some(Arc::new(c) as Arc<dyn HolidayCalendar>),
            Err(e) => {
                tracing::error!("Holiday calendar disabled: {e:#}");
                None
            }
        };
    let collab = Collaborators {
        conversations: Some(sessions.clone() as Arc<dyn ConversationSource>),
        persona: Some(Arc::new(FilePersona::new(storage.persona_path())) as Arc<dyn PersonaSource>),
        calendar,
    };

    let pipeline = SchedulePipeline::new(
        ContextAssembler::new(store.clone(), collab),
        GeneratorClient::new(generator),
    );
    let guard = Arc::new(GenerationGuard::new(
        store,
        settings.clone(),
        pipeline,
        clock.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        guard.clone(),
        clock.clone(),
        settings.schedule_time().await,
    ));
    scheduler.start();

    let service = Arc::new(LifeService::new(guard, settings, scheduler.clone(), clock));

    if cfg.api.api_key.is_none() {
        if is_localhost(&cfg.api.bind) {
            tracing::warn!("API authentication disabled (localhost-only)");
        } else {
            anyhow::bail!(
                "API authentication required for non-localhost binding '{}'. Set [api] api_key.",
                cfg.api.bind
            );
        }
    }

    let state = api::AppState {
        service,
        sessions,
        api_key: cfg.api.api_key.clone(),
    };
    let listener = tokio::net::TcpListener::bind(&cfg.api.bind).await?;
    tracing::info!("life-scheduler listening on {}", cfg.api.bind);

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        })
        .await?;

    scheduler.stop();
    Ok(())
}

async fn status(config_path: &str) -> Result<()> {
    let cfg = config::load(config_path)?;
    let clock = SystemClock::new(cfg.clock.timezone);
    let today = clock.now().date_naive();
    let store = SharedStore::load(cfg.storage.data_path());
    let settings = SettingsHandle::load(cfg.storage.settings_path());

    println!("Daily generation time: {}", settings.schedule_time().await);
    match store.get(&today).await {
        Some(rec) => println!("{}", commands::format_record(&today.day_key(), &rec)),
        None => println!("No schedule for {} yet", today.day_key()),
    }
    Ok(())
}

async fn send_command(
    url: &str,
    token: Option<&str>,
    action: &str,
    param: Option<&str>,
) -> Result<String> {
    let client = reqwest::Client::new();
    let mut req = client
        .post(format!("{}/life", url.trim_end_matches('/')))
        .json(&serde_json::json!({"action": action, "param": param}));
    if let Some(t) = token {
        req = req.header("Authorization", format!("Bearer {t}"));
    }
    let resp = req.send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("API error: {} {}", resp.status(), resp.text().await?);
    }
    let body: Value = resp.json().await?;
    Ok(body["text"]
        .as_str()
        .unwrap_or("(no response)")
        .to_string())
}

fn is_localhost(bind: &str) -> bool {
    use std::net::IpAddr;

    let host = if let Some(inner) = bind.strip_prefix('[')
        && let Some(bracket_end) = inner.find(']')
    {
        &inner[..bracket_end]
    } else if let Some(colon) = bind.rfind(':') {
        &bind[..colon]
    } else {
        bind
    };

    if host == "localhost" {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_localhost_loopback() {
        assert!(is_localhost("127.0.0.1:3100"));
        assert!(is_localhost("localhost:3100"));
        assert!(is_localhost("[::1]:3100"));
    }

    #[test]
    fn test_is_localhost_rejects_non_local() {
        assert!(!is_localhost("0.0.0.0:3100"));
        assert!(!is_localhost("192.168.1.1:3100"));
        assert!(!is_localhost("localhost.evil.com:3100"));
        assert!(!is_localhost("127.0.0.1.1:3100"));
    }

    #[test]
    fn test_is_localhost_malformed_no_panic() {
        assert!(!is_localhost("]"));
        assert!(!is_localhost("[]"));
        assert!(!is_localhost(""));
        assert!(!is_localhost("[]:3100"));
    }

    #[test]
    fn test_cli_parses_time_subcommand() {
        let cli = Cli::try_parse_from(["life-scheduler", "time", "07:30", "--url", "http://h:1"]).unwrap();
        assert_eq!(cli.url, "http://h:1");
        assert!(matches!(cli.command, Some(Commands::Time { ref time }) if time == "07:30"));
    }
}
