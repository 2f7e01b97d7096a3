//! `mat-domain` — configuration and shared error types for mcp-agent-tools.
//!
//! Kept free of transport and async dependencies so that any binary can
//! deserialize server definitions without pulling in the MCP client.

pub mod config;
pub mod error;

pub use error::{Error, Result};
