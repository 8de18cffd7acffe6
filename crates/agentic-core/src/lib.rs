//! Agentic Core - identifier/carrier propagation (C1), the shared data model
//! (§3), error taxonomy (§7), wire protocol, and `agentic.toml` config.

pub mod carrier;
pub mod config;
pub mod error;
pub mod ids;
pub mod protocol;
pub mod types;

pub use carrier::{Carrier, IdBundle};
pub use config::AgentFileConfig;
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
