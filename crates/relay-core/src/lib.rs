//! relay-core: shared protocol library for the presence relay.
//!
//! Provides envelope type tags, routing-header decoding, JSON framing,
//! identity normalization, and the common error type.

pub mod codec;
pub mod error;
pub mod identity;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode_binary, decode_header, frame_encode, pong_frame};
pub use error::{RelayError, RelayResult};
pub use identity::{normalize, short_identity};
pub use messages::{EnvelopeHeader, MsgType, RelayForward};
