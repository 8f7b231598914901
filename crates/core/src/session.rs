use crate::capture::{CaptureEvent, CaptureSource, join_segments};
use crate::error::{ConnectionError, SessionError};
use crate::events::{SessionEvent, TurnEvent, TurnEvents, TurnId, UserCommand};
use crate::gateway::{ChannelEvent, ConnectionConfig, GatewayChannel, GatewayConnector};
use crate::status::{Phase, Status};
use crate::synthesis::{SynthesisSink, Utterance};
use anyhow::Result;
use gateway_types::{InboundFrame, OutboundFrame};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// How long a channel has to confirm it is open.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_QUEUE_CAPACITY: usize = 256;

/// One voice interaction cycle.
pub struct Turn {
    id: TurnId,
    utterance: Option<String>,
    response: String,
    channel: Option<Box<dyn GatewayChannel>>,
    last_utterance: u64,
    speaking: Option<u64>,
}

impl Turn {
    fn new(id: TurnId) -> Self {
        Self {
            id,
            utterance: None,
            response: String::new(),
            channel: None,
            last_utterance: 0,
            speaking: None,
        }
    }

    pub fn id(&self) -> TurnId {
        self.id
    }

    /// The final transcript, set once when listening ends.
    pub fn utterance(&self) -> Option<&str> {
        self.utterance.as_deref()
    }

    /// The latest response fragment. Each fragment replaces the previous one.
    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }
}

/// Cloneable front door for the presentation layer.
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
    status: watch::Receiver<Status>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<()> {
        self.send(SessionEvent::Command(UserCommand::Start)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SessionEvent::Command(UserCommand::Stop)).await
    }

    pub async fn toggle(&self) -> Result<()> {
        self.send(SessionEvent::Command(UserCommand::Toggle)).await
    }

    /// Takes effect for the next channel that is opened.
    pub async fn set_config(&self, config: ConnectionConfig) -> Result<()> {
        self.send(SessionEvent::ConfigChanged(config)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown).await
    }

    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase
    }

    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("session controller has stopped"))
    }
}

/// Owns the active turn and every resource attached to it.
///
/// All inputs arrive as [`SessionEvent`]s and are handled one at a time, so
/// the only interleaving is between whole transitions. Each handler checks
/// the current phase first and drops events that make no sense there.
pub struct SessionController {
    phase: Phase,
    turn: Option<Turn>,
    last_turn: TurnId,
    config: ConnectionConfig,
    open_timeout: Duration,
    capture: Box<dyn CaptureSource>,
    synthesis: Box<dyn SynthesisSink>,
    connector: Arc<dyn GatewayConnector>,
    status: Status,
    status_tx: watch::Sender<Status>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    // Events that arrived while a channel was opening.
    deferred: VecDeque<SessionEvent>,
}

impl SessionController {
    pub fn new(
        capture: Box<dyn CaptureSource>,
        synthesis: Box<dyn SynthesisSink>,
        connector: Arc<dyn GatewayConnector>,
        config: ConnectionConfig,
    ) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (status_tx, status_rx) = watch::channel(Status::default());

        let handle = SessionHandle {
            events: events_tx.clone(),
            status: status_rx,
        };
        let controller = Self {
            phase: Phase::Idle,
            turn: None,
            last_turn: 0,
            config,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            capture,
            synthesis,
            connector,
            status: Status::default(),
            status_tx,
            events_tx,
            events_rx,
            deferred: VecDeque::new(),
        };
        (controller, handle)
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn current_turn(&self) -> Option<TurnId> {
        self.turn.as_ref().map(|t| t.id)
    }

    pub fn turn(&self) -> Option<&Turn> {
        self.turn.as_ref()
    }

    /// Process events until a shutdown request arrives.
    pub async fn run(mut self) {
        tracing::info!("Session controller started");
        loop {
            let event = match self.deferred.pop_front() {
                Some(event) => event,
                None => match self.events_rx.recv().await {
                    Some(event) => event,
                    None => break,
                },
            };
            let shutdown = matches!(event, SessionEvent::Shutdown);
            self.handle(event).await;
            if shutdown {
                break;
            }
        }
        tracing::info!("Session controller stopped");
    }

    /// Apply one event.
    pub async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command(command) => self.on_command(command).await,
            SessionEvent::ConfigChanged(config) => {
                tracing::info!("Gateway address set to {:?}", config.address());
                self.config = config;
            }
            SessionEvent::Turn { turn, event } => {
                if self.current_turn() != Some(turn) {
                    tracing::debug!("Discarding event for finished turn {}: {:?}", turn, event);
                    return;
                }
                match event {
                    TurnEvent::Capture(event) => self.on_capture(event).await,
                    TurnEvent::Channel(event) => self.on_channel(event).await,
                    TurnEvent::SynthesisFinished { utterance } => {
                        self.on_synthesis_finished(utterance)
                    }
                }
            }
            SessionEvent::Shutdown => self.shutdown().await,
        }
    }

    async fn on_command(&mut self, command: UserCommand) {
        match (command, self.phase) {
            (UserCommand::Start | UserCommand::Toggle, Phase::Idle) => self.start_listening(),
            (UserCommand::Start, phase) => {
                tracing::warn!("A turn is already active ({:?}); ignoring start", phase);
            }
            (_, Phase::Idle) => tracing::debug!("Nothing to stop"),
            (_, Phase::Listening) => {
                tracing::info!("Listening stopped by user");
                self.capture.stop();
                self.end_turn().await;
            }
            (_, Phase::Thinking | Phase::Speaking) => self.cancel_turn().await,
        }
    }

    fn start_listening(&mut self) {
        // Leftover speech from the previous turn would overlap the new one.
        self.synthesis.cancel();

        self.last_turn += 1;
        let id = self.last_turn;
        self.turn = Some(Turn::new(id));
        self.status.transcript.clear();
        self.status.response.clear();
        self.status.error = None;

        match self.capture.start(self.turn_events(id)) {
            Ok(()) => {
                tracing::info!("Turn {} listening", id);
                self.phase = Phase::Listening;
                self.publish();
            }
            Err(kind) => {
                let error = SessionError::Capture(kind);
                tracing::error!("Failed to start capture: {}", error);
                self.status.error = Some(error.to_string());
                self.turn = None;
                self.phase = Phase::Idle;
                self.publish();
            }
        }
    }

    async fn on_capture(&mut self, event: CaptureEvent) {
        if self.phase != Phase::Listening {
            tracing::debug!("Ignoring capture event while {:?}: {:?}", self.phase, event);
            return;
        }
        match event {
            CaptureEvent::Started => tracing::debug!("Capture started"),
            CaptureEvent::Partial(text) => {
                self.status.transcript = text;
                self.publish();
            }
            CaptureEvent::Final(segments) => {
                let text = join_segments(&segments);
                if text.is_empty() {
                    tracing::debug!("Final result was blank; still listening");
                    return;
                }
                self.capture.stop();
                self.begin_thinking(text).await;
            }
            CaptureEvent::Error(kind) => {
                self.capture.stop();
                self.fail(SessionError::Capture(kind)).await;
            }
            CaptureEvent::Ended => {
                tracing::info!("Capture ended without a transcript");
                self.end_turn().await;
            }
        }
    }

    async fn begin_thinking(&mut self, text: String) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        let id = turn.id;
        turn.utterance = Some(text.clone());
        self.status.transcript = text.clone();
        self.phase = Phase::Thinking;
        self.publish();
        tracing::info!("Turn {} heard: {:?}", id, text);

        let config = self.config.clone();
        if !config.has_address() {
            self.fail(SessionError::Config).await;
            return;
        }

        // The timer lives inside this one future: whichever of open and
        // timeout loses is dropped here, so it can never fire later.
        let connector = Arc::clone(&self.connector);
        let open = tokio::time::timeout(
            self.open_timeout,
            connector.open(&config, self.turn_events(id)),
        );
        tokio::pin!(open);

        // Keep taking events while the open is pending. A stop abandons the
        // open before anything is sent; the rest wait in `deferred` until
        // this transition is over.
        let opened = loop {
            tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => match event {
                    SessionEvent::Command(UserCommand::Stop | UserCommand::Toggle) => break None,
                    SessionEvent::Shutdown => {
                        self.deferred.push_back(SessionEvent::Shutdown);
                        break None;
                    }
                    event => self.deferred.push_back(event),
                },
                opened = &mut open => break Some(opened),
            }
        };

        let mut channel = match opened {
            None => {
                tracing::info!("Turn {} cancelled while the channel was opening", id);
                self.cancel_turn().await;
                return;
            }
            Some(Ok(Ok(channel))) => channel,
            Some(Ok(Err(e))) => {
                self.fail(ConnectionError::Failed(format!("{:#}", e)).into())
                    .await;
                return;
            }
            Some(Err(_)) => {
                self.fail(ConnectionError::Timeout.into()).await;
                return;
            }
        };

        if let Err(e) = channel.send(&OutboundFrame::message(&text)).await {
            channel.close().await;
            self.fail(ConnectionError::Failed(format!("{:#}", e)).into())
                .await;
            return;
        }
        tracing::debug!("Turn {} message sent to {}", id, config.address());

        if let Some(turn) = self.turn.as_mut() {
            turn.channel = Some(channel);
        }
    }

    async fn on_channel(&mut self, event: ChannelEvent) {
        if !matches!(self.phase, Phase::Thinking | Phase::Speaking) {
            tracing::debug!("Ignoring channel event while {:?}: {:?}", self.phase, event);
            return;
        }
        match event {
            ChannelEvent::Frame(frame) => self.on_frame(frame).await,
            ChannelEvent::Malformed(reason) => {
                tracing::warn!("{}", SessionError::Protocol(reason));
            }
            ChannelEvent::Error(message) => {
                self.fail(ConnectionError::Failed(message).into()).await;
            }
            ChannelEvent::Closed => self.fail(ConnectionError::Closed.into()).await,
        }
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        if frame.is_inert() {
            tracing::debug!("Ignoring frame without text: kind={:?}", frame.kind());
            return;
        }
        if let Some(text) = frame.response_text() {
            self.respond(text.to_string());
        }
        if frame.is_done() {
            tracing::info!("Gateway completed turn {:?}", self.current_turn());
            self.end_turn().await;
        }
    }

    // Replaces the current response and speaks it.
    fn respond(&mut self, text: String) {
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        turn.last_utterance += 1;
        turn.speaking = Some(turn.last_utterance);
        turn.response = text.clone();
        let utterance = Utterance {
            id: turn.last_utterance,
            text: text.clone(),
        };
        let events = TurnEvents::new(turn.id, self.events_tx.clone());

        self.status.response = text;
        self.phase = Phase::Speaking;
        self.synthesis.speak(utterance, events);
        self.publish();
    }

    fn on_synthesis_finished(&mut self, utterance: u64) {
        if self.phase != Phase::Speaking {
            tracing::debug!("Ignoring synthesis completion while {:?}", self.phase);
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        if turn.speaking != Some(utterance) {
            tracing::debug!("Utterance {} was superseded", utterance);
            return;
        }
        // A completed turn is already Idle, so the gateway still owes us
        // more frames.
        turn.speaking = None;
        self.phase = Phase::Thinking;
        self.publish();
    }

    async fn cancel_turn(&mut self) {
        tracing::info!("Turn {:?} cancelled by user", self.current_turn());
        self.synthesis.cancel();
        self.status.response.clear();
        self.end_turn().await;
    }

    async fn fail(&mut self, error: SessionError) {
        tracing::error!("Turn {:?} failed: {}", self.current_turn(), error);
        self.status.error = Some(error.to_string());
        self.end_turn().await;
    }

    async fn end_turn(&mut self) {
        if let Some(mut turn) = self.turn.take() {
            if let Some(mut channel) = turn.channel.take() {
                channel.close().await;
            }
            tracing::debug!("Turn {} finished", turn.id);
        }
        self.phase = Phase::Idle;
        self.publish();
    }

    async fn shutdown(&mut self) {
        if self.phase == Phase::Listening {
            self.capture.stop();
        }
        self.synthesis.cancel();
        self.end_turn().await;
    }

    fn turn_events(&self, turn: TurnId) -> TurnEvents {
        TurnEvents::new(turn, self.events_tx.clone())
    }

    fn publish(&mut self) {
        self.status.phase = self.phase;
        self.status_tx.send_replace(self.status.clone());
    }
}
