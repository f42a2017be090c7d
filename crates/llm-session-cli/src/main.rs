mod logging;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use llm_session::{
    ChatSession, SessionConfig, SessionEvent, SessionOptions, SessionRegistry,
};
use llm_session_engine::ReplayEngineFactory;
use llm_session_metrics::GenerationMetrics;

#[derive(Parser)]
#[command(name = "llm-session-cli")]
#[command(about = "Drive text and image generation sessions from the terminal")]
#[command(version)]
struct Cli {
    /// Model directory (must contain a replay.json script)
    #[arg(long, short)]
    model_dir: PathBuf,

    /// Config file (JSON or TOML); defaults to ~/.llm-session/config.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not provision a temp directory next to the model
    #[arg(long, default_value = "false")]
    no_tmp_path: bool,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat {
        /// Drop the conversation before every message
        #[arg(long, default_value = "false")]
        forget: bool,
    },
    /// Send a single message
    Send {
        /// Message content
        message: String,

        /// Prior messages, alternating user and assistant
        #[arg(long = "history")]
        history: Vec<String>,

        /// Print metrics as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
    /// Generate an image
    Image {
        /// Prompt text
        prompt: String,

        /// Output file
        #[arg(long, short, default_value = "output.png")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let config = match &cli.config {
        Some(path) => {
            let mut config = SessionConfig::from_path(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => SessionConfig::load(),
    };

    if cli.debug {
        eprintln!(
            "{}",
            format!("[DEBUG] Model directory: {}", cli.model_dir.display()).dimmed()
        );
        eprintln!(
            "{}",
            format!("[DEBUG] Config: {}", serde_json::to_string(&config)?).dimmed()
        );
    }

    let use_tmp_path = config.use_tmp_path && !cli.no_tmp_path;
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(ReplayEngineFactory::new()),
        config,
    ));

    match cli.command {
        Commands::Chat { forget } => {
            let options = SessionOptions::text(&cli.model_dir).with_tmp_path(use_tmp_path);
            let session = ChatSession::open(registry.clone(), options)?;
            session.set_keep_history(!forget);
            let result = run_interactive_chat(&session, cli.debug).await;
            session.release()?;
            print_summary(&registry);
            result
        }
        Commands::Send {
            message,
            history,
            json,
        } => {
            let options = SessionOptions::text(&cli.model_dir)
                .with_tmp_path(use_tmp_path)
                .with_history(history);
            let session = ChatSession::open(registry, options)?;
            let result = stream_message(&session, &message, cli.debug).await;
            session.release()?;
            let metrics = result?;
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics.to_map())?);
            }
            Ok(())
        }
        Commands::Image { prompt, output } => {
            let session = ChatSession::open(registry, SessionOptions::image(&cli.model_dir))?;
            let result = generate_image(&session, &prompt, output).await;
            session.release()?;
            result
        }
    }
}

/// Streams one submission to stdout. Ctrl-C stops generation after the
/// current token.
async fn stream_message(
    session: &ChatSession,
    message: &str,
    debug: bool,
) -> anyhow::Result<GenerationMetrics> {
    let (mut rx, task) = session.submit_streaming(message);
    let mut event_count = 0;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                event_count += 1;
                match event {
                    SessionEvent::Token { content } => {
                        print!("{}", content.green());
                        io::stdout().flush()?;
                    }
                    SessionEvent::EndOfTurn => println!(),
                    SessionEvent::Complete { metrics } => print_metrics(&metrics),
                    SessionEvent::Error { message } => {
                        println!();
                        println!("{}", format!("❌ Error: {}", message).red());
                    }
                    SessionEvent::Progress { .. } | SessionEvent::ImageComplete { .. } => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "⏹ Stopping generation".yellow());
                session.stop()?;
            }
        }
    }

    if debug {
        eprintln!(
            "{}",
            format!("[DEBUG] Stream completed: {} events", event_count).dimmed()
        );
    }

    Ok(task.await??)
}

async fn run_interactive_chat(session: &ChatSession, debug: bool) -> anyhow::Result<()> {
    println!("{}", "🤖 Interactive Chat".cyan().bold());
    println!("{}", format!("Session ID: {}", session.id()).dimmed());
    println!(
        "{}",
        "Type 'exit' or 'quit' to leave, '/reset' to clear, '/history' to show the ledger".dimmed()
    );
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }
        if input.is_empty() {
            continue;
        }
        if input == "/reset" {
            session.reset()?;
            println!("{}", "🧹 Conversation cleared".dimmed());
            continue;
        }
        if input == "/history" {
            for turn in session.ledger()?.turns() {
                println!(
                    "{}",
                    format!("[{}] {}", turn.role.as_str(), turn.content).dimmed()
                );
            }
            continue;
        }

        println!("{}", "Assistant:".green().bold());
        if let Err(e) = stream_message(session, input, debug).await {
            if debug {
                eprintln!("{}", format!("[DEBUG] Error: {:?}", e).dimmed());
            }
            println!("{}", format!("❌ Error: {}", e).red());
        }
        println!();
    }

    Ok(())
}

async fn generate_image(
    session: &ChatSession,
    prompt: &str,
    output: PathBuf,
) -> anyhow::Result<()> {
    println!("{}", format!("🎨 Generating: {}", prompt).cyan());
    let (mut rx, task) = session.generate_image_streaming(prompt, output.clone());

    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Progress { percent } => {
                print!("\r{}", format!("   {:>3}%", percent).yellow());
                io::stdout().flush()?;
            }
            SessionEvent::ImageComplete { metrics } => {
                println!();
                println!(
                    "{}",
                    format!(
                        "✅ Saved {} in {:.2}s",
                        output.display(),
                        metrics.total_timeus as f64 / 1_000_000.0
                    )
                    .green()
                );
            }
            SessionEvent::Error { message } => {
                println!();
                println!("{}", format!("❌ Error: {}", message).red());
            }
            _ => {}
        }
    }

    task.await??;
    Ok(())
}

fn print_metrics(metrics: &GenerationMetrics) {
    let speed = |value: Option<f64>| {
        value
            .map(|tokens_per_second| format!("{:.1} tok/s", tokens_per_second))
            .unwrap_or_else(|| "-".to_string())
    };
    println!(
        "{}",
        format!(
            "📊 Tokens: prompt={}, decode={} | prefill {} | decode {}",
            metrics.prompt_len,
            metrics.decode_len,
            speed(metrics.prefill_speed()),
            speed(metrics.decode_speed())
        )
        .dimmed()
    );
}

fn print_summary(registry: &SessionRegistry) {
    let summary = registry.metrics().summary();
    if summary.total_submissions == 0 {
        return;
    }
    println!(
        "{}",
        format!(
            "📈 {} submissions ({} completed, {} cancelled, {} token-limited, {} failed), {} tokens decoded",
            summary.total_submissions,
            summary.completed,
            summary.cancelled,
            summary.token_limited,
            summary.errored,
            summary.total_decode_tokens
        )
        .dimmed()
    );
}
