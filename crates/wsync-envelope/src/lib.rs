//! wsync Envelope - the wire format
//!
//! Provides:
//! - `{type, id, ts, v, payload}` envelopes with a typed message per type
//! - Schema-validated decode with `ERR_ENVELOPE_SCHEMA` / `ERR_<TYPE>_PAYLOAD` /
//!   `ERR_INVALID_JSON` classification
//! - Error codes and their UI policies
//! - The command catalog with sanitization
//! - Session key helpers
//!
//! # Example
//!
//! ```rust
//! use wsync_envelope::{decode, encode, Envelope, Message};
//!
//! let ping = Envelope::ping("abc");
//! let text = encode(&ping).unwrap();
//! let decoded = decode(&text).unwrap();
//! assert!(matches!(decoded.message, Message::Ping(ref p) if p.nonce == "abc"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod codec;
pub mod command;
pub mod envelope;
pub mod error;
pub mod error_code;
pub mod message;
pub mod schema;
pub mod session_key;

pub use codec::{classify, decode, decode_value, encode, to_value};
pub use command::{
    validate_and_sanitize, CommandData, CommandName, PauseScope, RerunMode, SanitizedCommand,
};
pub use envelope::{new_envelope_id, now_ms, Envelope, PROTOCOL_VERSION};
pub use error::{CodecError, CommandValidationError, ErrorClass, SessionKeyError};
pub use error_code::{ErrorCode, ErrorPolicy, UiState};
pub use message::{
    AckPayload, AgentGoal, AgentGoalPayload, Channels, ChatPayload, ClientIdentity,
    CommandPayload, ErrorPayload, EventPayload, FallbackReason, HelloAckPayload, HelloPayload,
    HelloResume, Message, MessageType, NoncePayload, ResumeDecision, ResumeStatus,
    SubscribePayload,
};
pub use session_key::{build_session_key, is_session_key, parse_session_key, SessionKey};
