use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duet::config::Config;
use duet::conversation::{Slot, StreamState, SubmitRejected};
use duet::llm::ProviderPair;
use duet::server::{self, AppState, Labels};
use duet::session::{Persistence, SessionHandle};
use duet::store::FileStore;

#[derive(Parser)]
#[command(name = "duet", version, about = "Ask two AI models at once")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "duet.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal (default)
    Chat,
    /// Serve the HTTP API
    Serve,
    /// Print the prompt log
    Prompts,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("duet=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let store = FileStore::open(&config.storage.path).with_context(|| {
        format!(
            "failed to open store at {}",
            config.storage.path.display()
        )
    })?;
    let persistence = Persistence::new(Arc::new(store));

    match cli.command.unwrap_or(Command::Chat) {
        Command::Prompts => {
            let (_, prompt_log) = persistence.load();
            print_prompt_log(&prompt_log);
            Ok(())
        }
        Command::Chat => {
            let providers = ProviderPair::from_config(&config.providers);
            let labels = Labels::from(&providers);
            chat(SessionHandle::spawn(providers, persistence), labels).await
        }
        Command::Serve => {
            let providers = ProviderPair::from_config(&config.providers);
            let state = AppState {
                labels: Labels::from(&providers),
                session: SessionHandle::spawn(providers, persistence),
                keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
            };
            serve(state, &config).await
        }
    }
}

async fn serve(state: AppState, config: &Config) -> Result<()> {
    let app = server::build_app(state, config.server.request_timeout_seconds);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}

// ============================================================================
// Terminal chat
// ============================================================================

async fn chat(session: SessionHandle, labels: Labels) -> Result<()> {
    println!(
        "Asking {} and {}. Commands: /new, /prompts, /replay <n>, /quit",
        labels.a, labels.b
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "/quit" => break,
            "/new" => {
                session.start_new_chat().await?;
                println!("Started a new chat.");
            }
            "/prompts" => print_prompt_log(&session.snapshot().prompt_log),
            _ if line.starts_with("/replay") => {
                let index = line["/replay".len()..]
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1));
                let Some(index) = index else {
                    println!("Usage: /replay <n>, with n from /prompts");
                    continue;
                };
                let outcome = session.replay(index).await?;
                if outcome.is_ok() {
                    println!("> {}", session.snapshot().recent_prompt);
                }
                print_outcome(&session, &labels, outcome).await?;
            }
            _ => {
                let outcome = session.submit(Some(line.to_string())).await?;
                print_outcome(&session, &labels, outcome).await?;
            }
        }
    }
    Ok(())
}

/// Print each provider's column as soon as it settles.
async fn print_outcome(
    session: &SessionHandle,
    labels: &Labels,
    outcome: Result<u64, SubmitRejected>,
) -> Result<()> {
    if let Err(rejected) = outcome {
        if rejected != SubmitRejected::EmptyPrompt {
            println!("(ignored: {rejected})");
        }
        return Ok(());
    }

    let mut state = session.subscribe();
    let mut printed = [false; 2];
    loop {
        let snapshot = state.borrow_and_update().clone();
        for (i, slot) in Slot::ALL.into_iter().enumerate() {
            let stream = snapshot.stream(slot);
            if !printed[i] && !stream.loading {
                printed[i] = true;
                print_column(label(labels, slot), stream);
            }
        }
        if printed.iter().all(|p| *p) {
            return Ok(());
        }
        state.changed().await?;
    }
}

fn print_column(label: &str, stream: &StreamState) {
    println!("\n=== {label} ===");
    match &stream.error {
        Some(error) => println!("[error] {error}"),
        None => println!("{}", stream.text),
    }
}

fn print_prompt_log(prompt_log: &[String]) {
    if prompt_log.is_empty() {
        println!("No prompts yet.");
    }
    for (i, prompt) in prompt_log.iter().enumerate() {
        println!("{:>3}. {prompt}", i + 1);
    }
}

fn label(labels: &Labels, slot: Slot) -> &str {
    match slot {
        Slot::A => &labels.a,
        Slot::B => &labels.b,
    }
}
