//! A single-room chat hub over WebSockets.
//!
//! One actor task owns the member map and serializes every mutation
//! through its mailboxes; per-connection pump tasks bridge sockets to
//! the room through bounded queues. Fan-out never blocks on a slow
//! consumer: a member whose outbound queue overflows is evicted.
//!
//! Module map:
//! - [`identity`] / [`participant`]: who is connected and with what role
//! - [`protocol`]: the JSON wire envelope and its two-phase decoder
//! - [`room`]: the actor, the handle, and the connection pumps
//! - [`auth`]: JWT admission
//! - [`ws`]: the axum WebSocket surface
//! - [`config`] / [`errors`]: environment configuration and error types

pub mod auth;
pub mod config;
pub mod errors;
pub mod identity;
pub mod participant;
pub mod protocol;
pub mod room;
pub mod ws;
