use std::io::IsTerminal;
use std::sync::Arc;

use chain_participant::api::{ExperimentClient, MemoryExperiment};
use chain_participant::cli::Args;
use chain_participant::controller::{
    InputSource, ParticipantInput, SessionController, SessionEnd, SessionOptions,
};
use chain_participant::questionnaire::Questionnaire;
use chain_participant::screen::{self, Screen};
use chain_participant::{ChainError, ExperimentApi, LocalStore, ParticipantConfig};
use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Words the dry-run experiment hands out.
const DRY_RUN_WORDS: [&str; 6] = ["river", "candle", "orbit", "velvet", "harbor", "lantern"];

/// Typed on its own line to press the "leave chat" button.
const LEAVE_COMMAND: &str = "/leave";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "session failed");
            eprintln!("{} {}", "error:".red().bold(), e);
            1
        }
    };
    // The stdin reader sits in a blocking read that cannot be cancelled, so
    // exit here instead of waiting for runtime shutdown.
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32, ChainError> {
    let mut config = ParticipantConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let ids = args.session_ids()?;
    let store = LocalStore::open(&config.store_path)?;
    let options = SessionOptions {
        base_url: config.server.base_url.clone(),
        entry: Some(ids),
        consent: args.consent(),
        timing: config.timing.clone(),
        questionnaire: Questionnaire::new(config.questionnaire.clone()),
        input: if std::io::stdin().is_terminal() {
            InputSource::Interactive
        } else {
            InputSource::Scripted
        },
    };

    if args.dry_run {
        let api = MemoryExperiment::new(1).with_word_list(DRY_RUN_WORDS);
        drive(Arc::new(api), store, options).await
    } else {
        let api = ExperimentClient::builder(config.server.base_url.as_str())
            .connect_timeout(config.server.connect_timeout())
            .request_timeout(config.server.request_timeout())
            .build();
        drive(Arc::new(api), store, options).await
    }
}

async fn drive<A: ExperimentApi>(
    api: Arc<A>,
    store: LocalStore,
    options: SessionOptions,
) -> Result<i32, ChainError> {
    let (screen, mut events) = Screen::channel();
    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = screen::render(&event) {
                println!("{line}");
            }
        }
    });

    let (input_tx, input_rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let input = if line.trim() == LEAVE_COMMAND {
                ParticipantInput::Leave
            } else {
                ParticipantInput::Word(line)
            };
            if input_tx.send(input).await.is_err() {
                break;
            }
        }
    });

    let controller = SessionController::new(api, store, screen, input_rx, options);
    let guard = controller.exit_guard();
    let mut session = tokio::spawn(controller.run());

    let report = loop {
        tokio::select! {
            joined = &mut session => {
                break joined.map_err(|e| ChainError::Config(format!("session task failed: {e}")))??;
            }
            _ = tokio::signal::ctrl_c() => {
                if guard.is_armed() {
                    warn!("leaving now will forfeit the experiment; press Ctrl-C again to quit");
                    guard.disarm();
                } else {
                    session.abort();
                    eprintln!("{}", "session abandoned".yellow());
                    return Ok(130);
                }
            }
        }
    };

    // The controller and every page task hold screen senders; once they are
    // gone the renderer drains and exits.
    let _ = renderer.await;

    match report.end {
        SessionEnd::Completed => {
            println!(
                "{} {} replies, participant {}",
                "session complete:".green().bold(),
                report.replies.len(),
                report
                    .participant_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string())
            );
            Ok(0)
        }
        SessionEnd::Declined => {
            println!("{}", "consent declined, nothing recorded".yellow());
            Ok(0)
        }
        SessionEnd::ServerPage(_) => Ok(2),
    }
}
