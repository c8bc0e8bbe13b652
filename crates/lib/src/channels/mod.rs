//! Chat channels: the inbound event model and the client capabilities the relay calls back into.
//!
//! The Matrix connector lives in the `matrix-channel` adapter crate and is wired in here behind
//! the `matrix` feature.

mod client;
mod inbound;
#[cfg(feature = "matrix")]
mod matrix;

pub use client::{ChatClient, RoomMembers};
pub use inbound::{InboundEvent, MessageKind};
#[cfg(feature = "matrix")]
pub use matrix::MatrixChatClient;
#[cfg(feature = "matrix")]
pub use matrix_channel::MatrixLogin;
