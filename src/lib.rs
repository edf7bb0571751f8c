//! scratchpad-runner library
//!
//! This crate provides the core functionality behind the editor's "Run"
//! button:
//! - An HTTP execution service that builds and runs Python, Java and C++
//!   inside per-request scratch workspaces
//! - Language runners with per-step timeouts and guaranteed cleanup
//! - Clients for the hosted execution API and local JavaScript evaluation

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hosted;
pub mod language;
pub mod local;
pub mod naming;
pub mod runner;
pub mod server;
pub mod workspace;
