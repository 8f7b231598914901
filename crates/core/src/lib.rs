//! Single-flight voice session core.
//!
//! The [`SessionController`] owns at most one turn at a time and drives it
//! through `Idle -> Listening -> Thinking -> Speaking -> Idle`. Speech capture,
//! the gateway channel and speech synthesis are pluggable leaves behind the
//! traits in [`capture`], [`gateway`] and [`synthesis`]; they report back by
//! posting events into the controller's queue.
pub mod capture;
pub mod error;
pub mod events;
pub mod gateway;
pub mod session;
pub mod status;
pub mod synthesis;

pub use capture::{CaptureErrorKind, CaptureEvent, CaptureSource, join_segments};
pub use error::{ConnectionError, SessionError};
pub use events::{SessionEvent, TurnEvent, TurnEvents, TurnId, UserCommand};
pub use gateway::{ChannelEvent, ConnectionConfig, GatewayChannel, GatewayConnector};
pub use gateway_types::{InboundFrame, OutboundFrame};
pub use session::{DEFAULT_OPEN_TIMEOUT, SessionController, SessionHandle, Turn};
pub use status::{Phase, Status};
pub use synthesis::{SynthesisSink, Utterance, Voice};
