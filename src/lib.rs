//! MutantWhats bridge: bot-framework channel adapter for the MutantWhats messaging API.
//!
//! Turns provider webhooks into bot activities and bot replies into provider
//! HTTP calls. The [`bot`] module holds the framework contract, the
//! [`mutantwhats`] module the provider-specific adapter and client, and
//! [`server`] the axum webhook host.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;

pub mod bot;
pub mod mutantwhats;
pub mod server;
