/// `kind` tag of every outbound frame.
pub const MESSAGE_KIND: &str = "message";

/// Fixed tag identifying the UI surface that produced the message.
pub const VOICE_UI_CHANNEL: &str = "voice-ui";

/// Frame sent to the gateway carrying one final transcript.
///
/// Serializes as `{"kind":"message","text":...,"channel":"voice-ui"}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutboundFrame {
    kind: String,
    text: String,
    channel: String,
}

impl OutboundFrame {
    pub fn message(text: &str) -> Self {
        Self {
            kind: MESSAGE_KIND.to_string(),
            text: text.to_string(),
            channel: VOICE_UI_CHANNEL.to_string(),
        }
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
