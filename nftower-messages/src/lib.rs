//! nftower-messages
//!
//! Centralized messaging for the provisioner CLI.
//! Provides the message templates, a builder that fills `{placeholders}`,
//! and the `msg!` macro.

pub mod builder;
pub mod macros;
pub mod messages;

pub use messages::MESSAGES;
