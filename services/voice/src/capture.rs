//! Speech capture engines.
//!
//! [`ConsoleCapture`] treats each typed line as one recognized utterance.
//! [`CommandCapture`] runs an external recognizer per session and reads its
//! line protocol from stdout.

use crate::process::ExternalCommand;
use anyhow::Result;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc, oneshot};
use voice_core::{
    CaptureErrorKind, CaptureEvent, CaptureSource, SessionError, TurnEvents, join_segments,
};

// A typed line, tagged with the capture session it was meant for. Untagged
// lines wait for the next session.
#[derive(Debug)]
struct TypedLine {
    session: Option<u64>,
    text: String,
}

/// Sending half of a [`ConsoleCapture`], held by the REPL.
#[derive(Debug, Clone)]
pub struct ConsoleInput {
    tx: mpsc::Sender<TypedLine>,
    live: Arc<AtomicU64>,
}

impl ConsoleInput {
    /// Queues a line for the next capture session.
    pub async fn queue(&self, text: String) -> Result<()> {
        self.send(None, text).await
    }

    /// Hands a line to the capture session that is listening right now.
    /// Returns false, dropping the line, when none is.
    pub async fn offer(&self, text: String) -> Result<bool> {
        match self.live.load(Ordering::SeqCst) {
            0 => Ok(false),
            session => {
                self.send(Some(session), text).await?;
                Ok(true)
            }
        }
    }

    async fn send(&self, session: Option<u64>, text: String) -> Result<()> {
        self.tx
            .send(TypedLine { session, text })
            .await
            .map_err(|_| anyhow::anyhow!("console capture has gone away"))
    }
}

pub struct ConsoleCapture {
    lines: Arc<Mutex<mpsc::Receiver<TypedLine>>>,
    live: Arc<AtomicU64>,
    sessions: u64,
    no_speech_timeout: Duration,
    stop: Option<oneshot::Sender<()>>,
}

impl ConsoleCapture {
    /// Returns the capture and the input the REPL feeds typed lines into.
    pub fn new(no_speech_timeout: Duration) -> (Self, ConsoleInput) {
        let (tx, rx) = mpsc::channel(16);
        let live = Arc::new(AtomicU64::new(0));
        let capture = Self {
            lines: Arc::new(Mutex::new(rx)),
            live: live.clone(),
            sessions: 0,
            no_speech_timeout,
            stop: None,
        };
        (capture, ConsoleInput { tx, live })
    }
}

impl CaptureSource for ConsoleCapture {
    fn start(&mut self, events: TurnEvents) -> Result<(), CaptureErrorKind> {
        self.stop();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);

        self.sessions += 1;
        let session = self.sessions;
        self.live.store(session, Ordering::SeqCst);

        let lines = self.lines.clone();
        let live = self.live.clone();
        let no_speech_timeout = self.no_speech_timeout;
        tokio::spawn(async move {
            events.emit(CaptureEvent::Started);
            let mut lines = lines.lock().await;
            let silence = tokio::time::sleep(no_speech_timeout);
            tokio::pin!(silence);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        tracing::debug!("Console capture stopped");
                        break;
                    }
                    line = lines.recv() => match line {
                        Some(TypedLine { session: Some(meant_for), text }) if meant_for != session => {
                            tracing::debug!("Dropping line typed for capture {}: {:?}", meant_for, text);
                        }
                        Some(TypedLine { text, .. }) => {
                            events.emit(CaptureEvent::Partial(text.clone()));
                            events.emit(CaptureEvent::Final(vec![text]));
                            break;
                        }
                        None => {
                            events.emit(CaptureEvent::Error(CaptureErrorKind::DeviceUnavailable));
                            break;
                        }
                    },
                    _ = &mut silence => {
                        events.emit(CaptureEvent::Error(CaptureErrorKind::NoSpeech));
                        break;
                    }
                }
            }
            // A newer session may already be live.
            let _ = live.compare_exchange(session, 0, Ordering::SeqCst, Ordering::SeqCst);
            events.emit(CaptureEvent::Ended);
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// One line of recognizer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerLine {
    Partial(String),
    Final(String),
    Error(CaptureErrorKind),
}

/// Parses `partial: <text>`, `final: <text>` and `error: <code>`.
pub fn parse_recognizer_line(line: &str) -> Option<RecognizerLine> {
    let (tag, value) = line.split_once(':')?;
    let value = value.trim();
    match tag.trim().to_ascii_lowercase().as_str() {
        "partial" => Some(RecognizerLine::Partial(value.to_string())),
        "final" => Some(RecognizerLine::Final(value.to_string())),
        "error" => Some(RecognizerLine::Error(CaptureErrorKind::from_code(value))),
        _ => None,
    }
}

pub struct CommandCapture {
    command: ExternalCommand,
    stop: Option<oneshot::Sender<()>>,
}

impl CommandCapture {
    pub fn new(command_line: &str) -> Result<Self, SessionError> {
        let command = ExternalCommand::parse(command_line)
            .map_err(|e| SessionError::CaptureUnavailable(format!("{:#}", e)))?;
        tracing::info!("Using recognizer {}", command.program().display());
        Ok(Self {
            command,
            stop: None,
        })
    }
}

impl CaptureSource for CommandCapture {
    fn start(&mut self, events: TurnEvents) -> Result<(), CaptureErrorKind> {
        self.stop();

        let mut cmd = self.command.command();
        cmd.stdout(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!("Failed to start recognizer: {}", e);
            CaptureErrorKind::DeviceUnavailable
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(CaptureErrorKind::DeviceUnavailable)?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);

        tokio::spawn(async move {
            events.emit(CaptureEvent::Started);
            let mut lines = BufReader::new(stdout).lines();
            let mut segments: Vec<String> = Vec::new();
            let mut failed = false;
            let mut stopped = false;

            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match parse_recognizer_line(&line) {
                            Some(RecognizerLine::Partial(text)) => {
                                let mut shown = segments.clone();
                                shown.push(text);
                                events.emit(CaptureEvent::Partial(join_segments(&shown)));
                            }
                            Some(RecognizerLine::Final(text)) => segments.push(text),
                            Some(RecognizerLine::Error(kind)) => {
                                failed = true;
                                events.emit(CaptureEvent::Error(kind));
                            }
                            None => tracing::debug!("Ignoring recognizer output: {:?}", line),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("Failed to read recognizer output: {}", e);
                            failed = true;
                            events.emit(CaptureEvent::Error(CaptureErrorKind::Other(e.to_string())));
                            break;
                        }
                    },
                    _ = &mut stop_rx => {
                        stopped = true;
                        break;
                    }
                }
            }

            if stopped {
                if let Err(e) = child.kill().await {
                    tracing::debug!("Recognizer already exited: {}", e);
                }
            } else {
                match child.wait().await {
                    Ok(status) if !status.success() => {
                        tracing::warn!("Recognizer exited with {}", status);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to wait for recognizer: {}", e),
                }
                if !failed && !segments.is_empty() {
                    events.emit(CaptureEvent::Final(segments));
                }
            }
            events.emit(CaptureEvent::Ended);
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use voice_core::{SessionEvent, TurnEvent};

    fn turn_events() -> (TurnEvents, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(32);
        (TurnEvents::new(7, tx), rx)
    }

    // Collects capture events up to and including `Ended`.
    async fn collect(rx: &mut mpsc::Receiver<SessionEvent>) -> Vec<CaptureEvent> {
        let mut seen = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("capture did not end")
                .expect("queue closed");
            match event {
                SessionEvent::Turn {
                    turn: 7,
                    event: TurnEvent::Capture(event),
                } => {
                    let ended = event == CaptureEvent::Ended;
                    seen.push(event);
                    if ended {
                        return seen;
                    }
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn recognizer_lines_are_parsed() {
        assert_eq!(
            parse_recognizer_line("partial: hel"),
            Some(RecognizerLine::Partial("hel".to_string()))
        );
        assert_eq!(
            parse_recognizer_line("FINAL:  hello world "),
            Some(RecognizerLine::Final("hello world".to_string()))
        );
        assert_eq!(
            parse_recognizer_line("error: not-allowed"),
            Some(RecognizerLine::Error(CaptureErrorKind::PermissionDenied))
        );
        assert_eq!(
            parse_recognizer_line("error: aborted"),
            Some(RecognizerLine::Error(CaptureErrorKind::Other("aborted".to_string())))
        );
        assert_eq!(parse_recognizer_line("loading model..."), None);
        assert_eq!(parse_recognizer_line("debug: ready"), None);
    }

    #[tokio::test]
    async fn console_line_becomes_a_final_result() {
        let (mut capture, lines) = ConsoleCapture::new(Duration::from_secs(5));
        let (events, mut rx) = turn_events();

        lines.queue("hello".to_string()).await.unwrap();
        capture.start(events).unwrap();

        assert_eq!(
            collect(&mut rx).await,
            vec![
                CaptureEvent::Started,
                CaptureEvent::Partial("hello".to_string()),
                CaptureEvent::Final(vec!["hello".to_string()]),
                CaptureEvent::Ended,
            ]
        );
    }

    #[tokio::test]
    async fn console_silence_reports_no_speech() {
        let (mut capture, _lines) = ConsoleCapture::new(Duration::from_millis(20));
        let (events, mut rx) = turn_events();

        capture.start(events).unwrap();

        assert_eq!(
            collect(&mut rx).await,
            vec![
                CaptureEvent::Started,
                CaptureEvent::Error(CaptureErrorKind::NoSpeech),
                CaptureEvent::Ended,
            ]
        );
    }

    #[tokio::test]
    async fn stopped_console_capture_only_ends() {
        let (mut capture, _lines) = ConsoleCapture::new(Duration::from_secs(5));
        let (events, mut rx) = turn_events();

        capture.start(events).unwrap();
        capture.stop();
        capture.stop();

        assert_eq!(
            collect(&mut rx).await,
            vec![CaptureEvent::Started, CaptureEvent::Ended]
        );
    }

    #[tokio::test]
    async fn line_typed_after_silence_does_not_start_the_next_capture() {
        let (mut capture, lines) = ConsoleCapture::new(Duration::from_millis(20));
        let (events, mut rx) = turn_events();

        capture.start(events).unwrap();
        collect(&mut rx).await;
        assert!(!lines.offer("after the end".to_string()).await.unwrap());
        // Offered while the first capture looked live, delivered after it ended.
        lines.send(Some(1), "too late".to_string()).await.unwrap();

        let (events, mut rx) = turn_events();
        capture.start(events).unwrap();
        lines.offer("fresh".to_string()).await.unwrap();

        assert_eq!(
            collect(&mut rx).await,
            vec![
                CaptureEvent::Started,
                CaptureEvent::Partial("fresh".to_string()),
                CaptureEvent::Final(vec!["fresh".to_string()]),
                CaptureEvent::Ended,
            ]
        );
    }

    #[test]
    fn missing_recognizer_is_unavailable() {
        let result = CommandCapture::new("no-such-recognizer-9c1e --lang en");
        assert!(matches!(result, Err(SessionError::CaptureUnavailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognizer_finals_are_handed_over_on_exit() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let script = dir.path().join("recognizer.sh");
        std::fs::write(
            &script,
            "echo 'partial: turn'\necho 'final: turn on'\necho 'noise'\necho 'final: the lights'\n",
        )?;
        let mut capture = CommandCapture::new(&format!("sh {}", script.display()))?;
        let (events, mut rx) = turn_events();

        capture.start(events).unwrap();

        assert_eq!(
            collect(&mut rx).await,
            vec![
                CaptureEvent::Started,
                CaptureEvent::Partial("turn".to_string()),
                CaptureEvent::Final(vec!["turn on".to_string(), "the lights".to_string()]),
                CaptureEvent::Ended,
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn recognizer_error_suppresses_the_final_result() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let script = dir.path().join("recognizer.sh");
        std::fs::write(&script, "echo 'final: half'\necho 'error: network'\n")?;
        let mut capture = CommandCapture::new(&format!("sh {}", script.display()))?;
        let (events, mut rx) = turn_events();

        capture.start(events).unwrap();

        assert_eq!(
            collect(&mut rx).await,
            vec![
                CaptureEvent::Started,
                CaptureEvent::Error(CaptureErrorKind::Network),
                CaptureEvent::Ended,
            ]
        );
        Ok(())
    }
}
