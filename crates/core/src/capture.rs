use crate::events::TurnEvents;
#[cfg(test)]
use mockall::automock;

/// Why a capture session failed.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureErrorKind {
    #[error("No speech detected. Please try again.")]
    NoSpeech,
    #[error("Microphone not accessible.")]
    DeviceUnavailable,
    #[error("Microphone permission denied.")]
    PermissionDenied,
    #[error("Network error occurred.")]
    Network,
    #[error("Error: {0}")]
    Other(String),
}

impl CaptureErrorKind {
    /// Maps the error codes used by browser-style recognizers
    /// (`no-speech`, `audio-capture`, `not-allowed`, `network`).
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::DeviceUnavailable,
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Everything a capture session reports back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    /// Interim hypothesis; only updates the displayed transcript.
    Partial(String),
    /// The final segments of one recognition result.
    Final(Vec<String>),
    Error(CaptureErrorKind),
    /// Fires exactly once per session, after errors too.
    Ended,
}

/// A speech-to-text engine.
///
/// Support for the engine is checked when it is constructed; `start` only
/// fails for per-session reasons (device busy, permission revoked, ...).
/// Events for the session go through the `TurnEvents` handed to `start`.
#[cfg_attr(test, automock)]
pub trait CaptureSource: Send {
    fn start(&mut self, events: TurnEvents) -> Result<(), CaptureErrorKind>;

    /// Stop the current session. Harmless when nothing is running.
    fn stop(&mut self);
}

/// Concatenates final segments with a space separator and trims the result.
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let mut joined = String::new();
    for segment in segments {
        joined.push_str(segment.as_ref());
        joined.push(' ');
    }
    joined.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_space_joined_and_trimmed() {
        assert_eq!(join_segments(&[" turn on", "the lights "]), "turn on the lights");
        assert_eq!(join_segments(&["hello"]), "hello");
        assert_eq!(join_segments::<&str>(&[]), "");
        assert_eq!(join_segments(&["  ", ""]), "");
    }

    #[test]
    fn browser_error_codes_map_to_kinds() {
        assert_eq!(CaptureErrorKind::from_code("no-speech"), CaptureErrorKind::NoSpeech);
        assert_eq!(
            CaptureErrorKind::from_code("audio-capture"),
            CaptureErrorKind::DeviceUnavailable
        );
        assert_eq!(
            CaptureErrorKind::from_code("not-allowed"),
            CaptureErrorKind::PermissionDenied
        );
        assert_eq!(CaptureErrorKind::from_code("network"), CaptureErrorKind::Network);
        assert_eq!(
            CaptureErrorKind::from_code("aborted").to_string(),
            "Error: aborted"
        );
    }
}
