//! Academia Live - terminal host for the voice session
//!
//! Each line typed on stdin stands in for one recognized utterance. Replies are
//! spoken through the platform TTS command (or silently timed when
//! `ACADEMIA_SILENT` is set) and echoed to the terminal.

use academia_voice::{
    Capabilities, CommandSynthesizer, ConversationLog, LineTranscriber, OpenRouterReasoning,
    PlaceholderReasoning, PlaceholderSynthesizer, ReasoningService, SledConversationLog,
    SpeechSynthesizer, UserScope, VoiceConfig, VoiceSessionController, VoiceStatus,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[academia-live] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = VoiceConfig::load().context("load voice config")?;

    let reasoning: Arc<dyn ReasoningService> = match OpenRouterReasoning::from_env() {
        Ok(r) => Arc::new(r),
        Err(e) => {
            tracing::warn!(error = %e, "reasoning API not configured; using placeholder answers");
            Arc::new(PlaceholderReasoning::new())
        }
    };

    let synthesizer: Arc<dyn SpeechSynthesizer> = if std::env::var("ACADEMIA_SILENT").is_ok() {
        Arc::new(PlaceholderSynthesizer::default())
    } else {
        Arc::new(CommandSynthesizer::from_env())
    };

    let transcriber = Arc::new(LineTranscriber::new(BufReader::new(tokio::io::stdin())));
    let mut capabilities = Capabilities::new(transcriber, reasoning, synthesizer);

    if let UserScope::User(user_id) = config.user_scope() {
        let store = SledConversationLog::open_path(&config.log_path)
            .with_context(|| format!("open conversation log at {}", config.log_path))?;
        if let Some(log) = ConversationLog::spawn(UserScope::User(user_id), Arc::new(store)) {
            tracing::info!(user_id = log.user_id(), path = %config.log_path, "persisting turns");
            capabilities = capabilities.with_log(log);
        }
    }

    let controller = Arc::new(VoiceSessionController::spawn(config, capabilities));
    let printer = tokio::spawn(print_status(Arc::clone(&controller)));

    controller.activate().await.context("start voice session")?;
    println!("Listening. Type a question and press enter (Ctrl-C to stop).");

    let mut status = controller.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; ending voice session");
        }
        _ = status.wait_for(|s| *s == VoiceStatus::Idle) => {
            tracing::info!("voice session ended");
        }
    }

    controller.deactivate().await;
    printer.abort();
    Ok(())
}

/// Echo status changes and each spoken reply.
async fn print_status(controller: Arc<VoiceSessionController>) {
    let mut status = controller.subscribe();
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        println!("[{}]", current);
        if current == VoiceStatus::Speaking {
            if let Some(reply) = controller.history().last().filter(|t| !t.is_user) {
                println!("> {}", reply.text);
            }
        }
    }
}
