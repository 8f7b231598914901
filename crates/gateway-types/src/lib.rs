//! Wire frames exchanged with the assistant gateway.
pub mod events;

//re-export the frames for easier access
pub use events::client::{MESSAGE_KIND, OutboundFrame, VOICE_UI_CHANNEL};
pub use events::server::{COMPLETE_KIND, InboundFrame};
