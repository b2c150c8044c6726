//! API handlers.

pub mod events;
pub mod misc;
pub mod sessions;

pub use events::{ingest_event, poll_events, respond_approval, stream_events};
pub use misc::health;
pub use sessions::{
    bind_bridge, create_session, delete_session, get_session, list_sessions, rename_session,
    send_input, start_turn, stop_session, unbind_bridge,
};
