//! Unix-socket control channel: one JSON line per request.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{follow, send_command};
pub use protocol::{Command, Response, StatusReport};
pub use server::{CommandHandler, IpcServer};
