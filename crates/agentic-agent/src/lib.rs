//! Agentic Agent — the ReAct loop executor (C5), tool invoker (C3), context
//! manager (C4), sub-agent spawner (C6), and event emitter (C7), plus the
//! `.ctx`-persisted session layer a caller drives them through.

pub mod context;
pub mod ctx_file;
pub mod events;
pub mod executor;
pub mod invoker;
pub mod runtime;
pub mod session;
pub mod subagent;

pub use context::ContextManager;
pub use events::{AgentEvent, BackpressurePolicy, ChannelEventSink, EventSink};
pub use executor::Executor;
pub use invoker::ToolInvoker;
pub use runtime::{AgentConfig, AgentRuntime};
pub use session::{Session, SessionKey, SessionRegistry};
pub use subagent::{SubAgentSpawner, SubagentRegistry};
