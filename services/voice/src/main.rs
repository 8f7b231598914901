use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::time::ChronoLocal;
use voice_core::{
    CaptureSource, ConnectionConfig, Phase, SessionController, SynthesisSink, Voice,
};
use voice_service::capture::{CommandCapture, ConsoleCapture, ConsoleInput};
use voice_service::config::Config;
use voice_service::gateway_adapter::WsGateway;
use voice_service::repl::{Flow, HELP, Repl, parse_line, render_changes};
use voice_service::settings::SettingsStore;
use voice_service::speech::{CommandSpeech, PacedSpeech};

#[derive(Parser)]
#[command(version, about = "Talk to a gateway assistant from the terminal")]
struct Cli {
    /// Gateway WebSocket address, e.g. ws://127.0.0.1:8787/ws
    #[arg(long)]
    url: Option<String>,
    /// Gateway access token
    #[arg(long)]
    token: Option<String>,
    /// Settings file location
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    // stderr keeps log lines apart from the conversation on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Configuration loaded successfully. Starting voice service...");

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Load Gateway Settings ---
    // Precedence: command line, then environment, then the settings file.
    let store = SettingsStore::open(args.settings.or(config.settings_path.clone()))?;
    let mut settings = store.load();
    if let Some(url) = args.url.or(config.gateway_url.clone()) {
        settings.gateway_url = Some(url);
    }
    if let Some(token) = args.token.or(config.gateway_token.clone()) {
        settings.gateway_token = Some(token);
    }
    let connection = ConnectionConfig::new(
        settings.gateway_url.as_deref().unwrap_or_default(),
        settings.gateway_token.as_deref(),
    );
    if connection.has_address() {
        tracing::info!("Using gateway at {}", connection.address());
    } else {
        tracing::warn!("No gateway address configured; set one with /url <address>");
    }

    // --- 5. Speech Engines ---
    let voice = Voice::default();
    let (capture, spoken): (Box<dyn CaptureSource>, Option<ConsoleInput>) =
        match &config.capture_command {
            Some(command) => {
                let capture = CommandCapture::new(command)
                    .context("Speech recognition is not available")?;
                (Box::new(capture) as Box<dyn CaptureSource>, None)
            }
            None => {
                let (capture, spoken) = ConsoleCapture::new(config.no_speech_timeout);
                (Box::new(capture) as Box<dyn CaptureSource>, Some(spoken))
            }
        };
    let synthesis: Box<dyn SynthesisSink> = match &config.speech_command {
        Some(command) => Box::new(
            CommandSpeech::new(command, voice).context("Speech synthesis is not available")?,
        ),
        None => Box::new(PacedSpeech::new(voice)),
    };

    // --- 6. Session Controller ---
    let (controller, handle) =
        SessionController::new(capture, synthesis, Arc::new(WsGateway::new()), connection);
    let controller = controller.with_open_timeout(config.connect_timeout);
    let controller_task = tokio::spawn(controller.run());

    // Prints status changes as they are published.
    let mut status_rx = handle.status();
    let printer = tokio::spawn(async move {
        let mut prev = status_rx.borrow_and_update().clone();
        while status_rx.changed().await.is_ok() {
            let next = status_rx.borrow_and_update().clone();
            for line in render_changes(&prev, &next) {
                println!("{}", line);
            }
            prev = next;
        }
    });

    println!("{}", HELP);
    println!("[{}]", Phase::Idle.label());

    // --- 7. Read Commands ---
    let mut repl = Repl::new(handle.clone(), spoken, store, settings);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Failed to read input: {}", e);
                        break;
                    }
                };
                match repl.apply(parse_line(&line)).await {
                    Ok((output, flow)) => {
                        for line in output {
                            println!("{}", line);
                        }
                        if flow == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("{:#}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    if let Err(e) = handle.shutdown().await {
        tracing::debug!("{}", e);
    }
    controller_task.await?;
    printer.abort();
    Ok(())
}
