//! tinyirc-proto - protocol support for the tinyircd IRC server.
//!
//! Line framing with the classic 512-byte limit, the numeric replies the
//! server emits, nickname and channel name validation, and message
//! prefixes. Bytes are treated as opaque beyond the ASCII delimiters.

pub mod chan;
pub mod line;
pub mod nick;
pub mod prefix;
pub mod response;

pub use chan::ChannelExt;
pub use line::{LineBuffer, LineError, MAX_LINE_LEN};
pub use nick::NickExt;
pub use prefix::Prefix;
pub use response::Response;
