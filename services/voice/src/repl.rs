//! Terminal presentation: parses typed lines into commands and renders
//! status changes as lines of text.

use crate::capture::ConsoleInput;
use crate::settings::{Settings, SettingsStore};
use anyhow::Result;
use voice_core::{ConnectionConfig, Phase, SessionHandle, Status};

pub const HELP: &str = "\
Commands:
  <enter>          start or stop listening
  <text>           say something (console recognizer only)
  /listen          start listening
  /stop            stop listening or cancel the current reply
  /url <address>   set the gateway address
  /token [value]   set the gateway token, or clear it
  /status          show the current status
  /help            show this help
  /quit            exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Toggle,
    Listen,
    Stop,
    SetUrl(String),
    SetToken(Option<String>),
    Status,
    Help,
    Quit,
    Speech(String),
    Invalid(String),
}

pub fn parse_line(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Toggle;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplInput::Speech(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "listen" => ReplInput::Listen,
        "stop" => ReplInput::Stop,
        "url" if arg.is_empty() => ReplInput::Invalid("Usage: /url <address>".to_string()),
        "url" => ReplInput::SetUrl(arg.to_string()),
        "token" if arg.is_empty() => ReplInput::SetToken(None),
        "token" => ReplInput::SetToken(Some(arg.to_string())),
        "status" => ReplInput::Status,
        "help" => ReplInput::Help,
        "quit" | "exit" => ReplInput::Quit,
        other => ReplInput::Invalid(format!("Unknown command: /{}", other)),
    }
}

/// Lines describing what changed between two published statuses.
pub fn render_changes(prev: &Status, next: &Status) -> Vec<String> {
    let mut lines = Vec::new();
    if next.transcript != prev.transcript && !next.transcript.is_empty() {
        lines.push(format!("You: {}", next.transcript));
    }
    if next.response != prev.response && !next.response.is_empty() {
        lines.push(format!("Assistant: {}", next.response));
    }
    if next.error != prev.error {
        if let Some(error) = &next.error {
            lines.push(format!("Error: {}", error));
        }
    }
    if next.phase != prev.phase {
        lines.push(format!("[{}]", next.phase.label()));
    }
    lines
}

pub fn render_status(status: &Status, settings: &Settings) -> Vec<String> {
    let mut lines = vec![format!("[{}]", status.phase.label())];
    if !status.transcript.is_empty() {
        lines.push(format!("You: {}", status.transcript));
    }
    if !status.response.is_empty() {
        lines.push(format!("Assistant: {}", status.response));
    }
    if let Some(error) = &status.error {
        lines.push(format!("Error: {}", error));
    }
    lines.push(format!(
        "Gateway: {}",
        settings.gateway_url.as_deref().unwrap_or("(not set)")
    ));
    lines.push(format!(
        "Token: {}",
        if settings.gateway_token.is_some() { "set" } else { "not set" }
    ));
    lines
}

/// Whether the REPL keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Applies REPL input to the session and the persisted settings.
pub struct Repl {
    handle: SessionHandle,
    /// Feeds the console recognizer; `None` when another engine is used.
    spoken: Option<ConsoleInput>,
    store: SettingsStore,
    settings: Settings,
}

impl Repl {
    pub fn new(
        handle: SessionHandle,
        spoken: Option<ConsoleInput>,
        store: SettingsStore,
        settings: Settings,
    ) -> Self {
        Self {
            handle,
            spoken,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the lines to print and whether to keep going.
    pub async fn apply(&mut self, input: ReplInput) -> Result<(Vec<String>, Flow)> {
        let mut out = Vec::new();
        match input {
            ReplInput::Toggle => self.handle.toggle().await?,
            ReplInput::Listen => self.handle.start().await?,
            ReplInput::Stop => self.handle.stop().await?,
            ReplInput::SetUrl(url) => {
                self.settings.gateway_url = Some(url.clone());
                self.persist().await?;
                out.push(format!("Gateway set to {}", url));
            }
            ReplInput::SetToken(token) => {
                let cleared = token.is_none();
                self.settings.gateway_token = token;
                self.persist().await?;
                out.push(if cleared { "Token cleared" } else { "Token saved" }.to_string());
            }
            ReplInput::Status => {
                out.extend(render_status(&self.handle.status().borrow(), &self.settings));
            }
            ReplInput::Help => out.push(HELP.to_string()),
            ReplInput::Quit => return Ok((out, Flow::Quit)),
            ReplInput::Speech(text) => self.speak(text, &mut out).await?,
            ReplInput::Invalid(message) => out.push(message),
        }
        Ok((out, Flow::Continue))
    }

    async fn speak(&mut self, text: String, out: &mut Vec<String>) -> Result<()> {
        let Some(spoken) = &self.spoken else {
            out.push("Typed input only works with the console recognizer".to_string());
            return Ok(());
        };
        match self.handle.phase() {
            Phase::Idle => {
                spoken.queue(text).await?;
                self.handle.start().await?;
            }
            Phase::Listening => {
                if !spoken.offer(text).await? {
                    out.push("Not listening any more; press enter to start again".to_string());
                }
            }
            Phase::Thinking | Phase::Speaking => {
                out.push("Still answering; wait or use /stop".to_string());
            }
        }
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        self.store.save(&self.settings)?;
        let config = ConnectionConfig::new(
            self.settings.gateway_url.as_deref().unwrap_or_default(),
            self.settings.gateway_token.as_deref(),
        );
        self.handle.set_config(config).await
    }
}
