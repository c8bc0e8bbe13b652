//! hookrelay core library: configuration, the trigger policy, webhook delivery, and chat channels,
//! used by the CLI.

pub mod channels;
pub mod config;
pub mod delivery;
pub mod init;
pub mod relay;
pub mod trigger;
pub mod webhook;
