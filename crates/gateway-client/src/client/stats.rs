#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    frames_sent: u64,
    frames_received: u64,
    malformed_frames: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub(crate) fn record_received(&mut self) {
        self.frames_received += 1;
    }

    pub(crate) fn record_malformed(&mut self) {
        self.malformed_frames += 1;
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }
}
