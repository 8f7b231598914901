//! Speech synthesis engines.

use crate::process::ExternalCommand;
use anyhow::Result;
use std::process::Stdio;
use std::time::Duration;
use tokio::task::JoinHandle;
use voice_core::{SynthesisSink, TurnEvent, TurnEvents, Utterance, Voice};

/// Milliseconds a speaker at rate 1.0 needs per word (150 words per minute).
const WORD_MILLIS: f32 = 400.0;

/// Silent synthesis that takes as long as speaking the text would.
pub struct PacedSpeech {
    word_duration: Duration,
    task: Option<JoinHandle<()>>,
}

impl PacedSpeech {
    pub fn new(voice: Voice) -> Self {
        let millis = (WORD_MILLIS / voice.rate.max(0.1)).round() as u64;
        Self::with_word_duration(Duration::from_millis(millis))
    }

    pub fn with_word_duration(word_duration: Duration) -> Self {
        Self {
            word_duration,
            task: None,
        }
    }

    pub fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as u32;
        self.word_duration * words
    }
}

impl SynthesisSink for PacedSpeech {
    fn speak(&mut self, utterance: Utterance, events: TurnEvents) {
        self.cancel();
        let duration = self.speaking_time(&utterance.text);
        tracing::debug!("Speaking utterance {} for {:?}", utterance.id, duration);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            events.emit(TurnEvent::SynthesisFinished {
                utterance: utterance.id,
            });
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Runs an external text-to-speech program once per utterance.
///
/// The text is passed as the last argument and the fixed voice settings as
/// `VOICE_RATE`, `VOICE_PITCH` and `VOICE_VOLUME`.
pub struct CommandSpeech {
    command: ExternalCommand,
    voice: Voice,
    task: Option<JoinHandle<()>>,
}

impl CommandSpeech {
    pub fn new(command_line: &str, voice: Voice) -> Result<Self> {
        let command = ExternalCommand::parse(command_line)?;
        tracing::info!("Using speech program {}", command.program().display());
        Ok(Self {
            command,
            voice,
            task: None,
        })
    }
}

impl SynthesisSink for CommandSpeech {
    fn speak(&mut self, utterance: Utterance, events: TurnEvents) {
        self.cancel();

        let mut cmd = self.command.command();
        cmd.arg(&utterance.text)
            .env("VOICE_RATE", self.voice.rate.to_string())
            .env("VOICE_PITCH", self.voice.pitch.to_string())
            .env("VOICE_VOLUME", self.voice.volume.to_string())
            .stdout(Stdio::null());

        let finished = TurnEvent::SynthesisFinished {
            utterance: utterance.id,
        };
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                // Report completion anyway so the turn does not wait forever.
                tracing::error!("Failed to start speech program: {}", e);
                events.emit(finished);
                return;
            }
        };

        // Aborting the task drops the child, which kills it.
        self.task = Some(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!("Speech program exited with {}", status);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to wait for speech program: {}", e),
            }
            events.emit(finished);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
