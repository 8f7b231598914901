use serde::Serialize;

/// Where the session is in the voice interaction cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Ready to listen",
            Phase::Listening => "Listening...",
            Phase::Thinking => "Thinking...",
            Phase::Speaking => "Speaking...",
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == Phase::Idle
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What the presentation layer shows. Published by the controller, never
/// read back by it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Status {
    pub phase: Phase,
    pub transcript: String,
    pub response: String,
    pub error: Option<String>,
}
