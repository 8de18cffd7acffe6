//! Identifier generation (C1).
//!
//! Task/session/artifact IDs must sort lexicographically by creation time so
//! logs and persisted stores order naturally without a separate timestamp
//! column. Each ID is `<prefix>_<millis-hex>_<counter-hex>_<random-hex>`: the
//! millisecond timestamp dominates the sort, a process-wide monotonic counter
//! breaks ties within the same millisecond, and a short random suffix avoids
//! collisions across processes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn next_sortable(prefix: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    let random: u32 = {
        // No external RNG dependency is needed for a uniqueness suffix; the
        // low bits of a fresh UUID are plenty random and we already depend
        // on `uuid` elsewhere.
        let u = uuid::Uuid::new_v4();
        u32::from_le_bytes(u.as_bytes()[0..4].try_into().unwrap())
    };
    format!("{prefix}_{millis:012x}_{counter:08x}_{random:08x}")
}

/// A fresh, sortable session identifier.
pub fn new_session_id() -> String {
    next_sortable("sess")
}

/// A fresh, sortable task identifier.
pub fn new_task_id() -> String {
    next_sortable("task")
}

/// A fresh, sortable artifact identifier (tool outputs, generated files).
pub fn new_artifact_id() -> String {
    next_sortable("art")
}

/// A non-sortable correlation id, for cases where creation order doesn't
/// matter and a shorter opaque token is preferred (e.g. request tracing).
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
