//! Talking Avatar Entry Point
//!
//! Reads user lines from stdin, streams replies into the avatar session and
//! prints each sentence when its audio starts.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use avatar_agent::{build_chat_source, AgentError, Conversation};
use avatar_config::{load_settings, OutputKind, Settings};
use avatar_core::{AudioOutput, MouthShape};
use avatar_pipeline::{
    AvatarEvent, AvatarSession, ClockOutput, CommandSynthesizer, RhubarbExtractor, SessionConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("AVATAR_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    init_tracing(&settings);
    tracing::info!("Starting talking avatar v{}", env!("CARGO_PKG_VERSION"));
    settings.validate()?;

    let synthesizer = Arc::new(CommandSynthesizer::from_config(&settings.synthesis));
    let extractor = Arc::new(RhubarbExtractor::from_config(&settings.extraction));
    let avatar = Arc::new(AvatarSession::new(
        SessionConfig::from(&settings),
        synthesizer,
        extractor,
        build_output(settings.playback.output),
    )?);

    let chat = build_chat_source(&settings.chat)?;
    let conversation = Arc::new(Conversation::new(
        chat,
        avatar.clone(),
        settings.chat.system_prompt.clone(),
    ));
    tracing::info!(conversation = conversation.id(), "Ready");

    let presenter = tokio::spawn(present(avatar.subscribe()));

    let mut turn: Option<JoinHandle<()>> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Input::Quit = handle_line(&line, &conversation, &mut turn).await? {
            break;
        }
    }

    // Let the last reply finish streaming and speaking
    if let Some(turn) = turn {
        if let Err(e) = turn.await {
            tracing::warn!("Reply task ended abnormally: {}", e);
        }
    }
    avatar.wait_idle().await?;
    avatar.shutdown().await;
    presenter.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

enum Input {
    Continue,
    Quit,
}

/// Turns run off the input loop so `/clear` can interrupt a streaming reply
async fn handle_line(
    line: &str,
    conversation: &Arc<Conversation>,
    turn: &mut Option<JoinHandle<()>>,
) -> Result<Input, AgentError> {
    match line.trim() {
        "" => {}
        "/quit" => return Ok(Input::Quit),
        "/clear" => conversation.clear().await?,
        _ if turn.as_ref().is_some_and(|turn| !turn.is_finished()) => {
            tracing::warn!("Still replying; /clear to interrupt");
        }
        text => *turn = Some(tokio::spawn(run_turn(conversation.clone(), text.to_string()))),
    }
    Ok(Input::Continue)
}

async fn run_turn(conversation: Arc<Conversation>, text: String) {
    match conversation.send(&text).await {
        Ok(_) | Err(AgentError::Interrupted) => {}
        Err(e) => tracing::error!("Reply failed: {}", e),
    }
}

fn build_output(kind: OutputKind) -> Arc<dyn AudioOutput> {
    match kind {
        OutputKind::Clock => Arc::new(ClockOutput::new()),
        #[cfg(feature = "audio-device")]
        OutputKind::Device => Arc::new(avatar_pipeline::DeviceOutput::new()),
        #[cfg(not(feature = "audio-device"))]
        OutputKind::Device => {
            tracing::warn!("Built without audio-device support, playing silently");
            Arc::new(ClockOutput::new())
        }
    }
}

/// Print sentences as they are heard; log mouth shape changes
async fn present(mut events: broadcast::Receiver<AvatarEvent>) {
    let mut shape = MouthShape::NEUTRAL;
    loop {
        match events.recv().await {
            Ok(AvatarEvent::SentenceReady { target, text, .. }) => {
                println!("[{}] {}", target.reply_id, text);
            }
            Ok(AvatarEvent::Mouth { seq, shape: next, .. }) if next != shape => {
                tracing::debug!(seq = %seq, shape = %next, "Mouth");
                shape = next;
            }
            Ok(AvatarEvent::SentenceFailed { seq, text, error, .. }) => {
                tracing::warn!(seq = %seq, text = %text, "Sentence failed: {}", error);
            }
            Ok(AvatarEvent::Idle) => {
                shape = MouthShape::NEUTRAL;
                tracing::debug!("Avatar idle");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Presenter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("avatar={level},avatar_agent={level},avatar_pipeline={level},avatar_llm={level},avatar_config={level}")
            .into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
