//! The room: one actor task per room plus per-connection plumbing.

mod actor;
mod client;
mod handle;

pub use actor::RoomActor;
pub use client::{inbound_pump, outbound_pump, Client, Frame, PumpConfig};
pub use handle::RoomHandle;
