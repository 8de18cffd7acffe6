//! Agentic Gateway - WebSocket server and HTTP front end over the agent runtime

pub mod auth;
pub mod rpc;
pub mod server;
pub mod ws;

pub use server::{start_gateway, ExtendedConfig};
