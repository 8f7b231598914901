use crate::events::TurnEvents;
#[cfg(test)]
use mockall::automock;

/// Fixed voice settings. Not user-tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// One piece of text to speak, numbered within its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
}

/// A text-to-speech engine.
///
/// `speak` returns immediately; when playback of the utterance finishes the
/// sink emits `TurnEvent::SynthesisFinished` with the utterance id.
#[cfg_attr(test, automock)]
pub trait SynthesisSink: Send {
    fn speak(&mut self, utterance: Utterance, events: TurnEvents);

    /// Silence whatever is playing. No completion is reported for it.
    fn cancel(&mut self);
}
