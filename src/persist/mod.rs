//! Persistence sinks.
//!
//! Two single-consumer writer tasks: the transcript writer appends chat
//! logs per room, the state keeper stores room metadata atomically. Both
//! run as draining dummies when their directory is not configured, so
//! producers never need to care.

mod state;
mod transcript;

pub use state::{RoomState, StateEvent, load_rooms, spawn_state_keeper};
pub use transcript::{LogEvent, LogKind, spawn_transcript_writer};
