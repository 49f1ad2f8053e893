//! IPC module for daemon/front-end communication

mod bridge;
mod protocol;
mod server;

pub use bridge::{command_channel, front_end_collaborators};
pub use protocol::Notification;
pub use server::{Server, SessionLinks};
