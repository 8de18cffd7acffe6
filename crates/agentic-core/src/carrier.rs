//! Request-scoped identifier and cancellation propagation (C1).
//!
//! A `Carrier` is an explicit struct threaded through function signatures —
//! never an ambient thread-local — carrying the identifier bundle, a
//! cancellation token, and the sub-agent recursion depth counter. Every
//! boundary that crosses into a tool call, a sub-agent spawn, or an LLM call
//! takes a `&Carrier` (or a clone) so correlation survives the hop.

use crate::ids;
use tokio_util::sync::CancellationToken;

/// The identifier bundle carried through every boundary.
///
/// Missing fields are represented as empty strings rather than `Option` so
/// accessors never need to handle a "doubly absent" case — the contract in
/// spec terms is "return an empty string, never panic".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdBundle {
    pub session_id: String,
    pub task_id: String,
    pub parent_task_id: String,
    pub user_id: String,
    pub correlation_id: String,
}

/// A request-scoped carrier: identifiers, cancellation, and sub-agent depth.
#[derive(Clone, Debug)]
pub struct Carrier {
    ids: IdBundle,
    cancel: CancellationToken,
    /// How many sub-agent levels deep this carrier already is. 0 at the
    /// top-level task; incremented by one for each spawned sub-agent.
    depth: u32,
}

impl Default for Carrier {
    fn default() -> Self {
        Self {
            ids: IdBundle::default(),
            cancel: CancellationToken::new(),
            depth: 0,
        }
    }
}

impl Carrier {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            ids: IdBundle {
                session_id: session_id.into(),
                ..Default::default()
            },
            cancel: CancellationToken::new(),
            depth: 0,
        }
    }

    /// Returns the current identifier bundle (a cheap clone).
    pub fn ids(&self) -> IdBundle {
        self.ids.clone()
    }

    /// Installs a new identifier bundle, returning the updated carrier.
    pub fn with_ids(mut self, ids: IdBundle) -> Self {
        self.ids = ids;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// True once this carrier already belongs to a sub-agent (depth > 0).
    /// `agentic-agent::executor` uses this to disable mid-loop queue
    /// polling, which is an outer-task-only feature.
    pub fn is_subagent(&self) -> bool {
        self.depth > 0
    }

    /// Idempotent: returns the existing task id if one is already set,
    /// otherwise generates and installs a fresh one.
    pub fn ensure_task_id(&mut self) -> String {
        if self.ids.task_id.is_empty() {
            self.ids.task_id = ids::new_task_id();
        }
        self.ids.task_id.clone()
    }

    /// Derives a carrier for a spawned sub-agent: fresh session id and task
    /// id, the parent's task id recorded as `parent_task_id`, depth + 1, and
    /// a cancellation token linked to (but independently cancellable from)
    /// this carrier's token.
    pub fn derive_child(&self, child_session_id: impl Into<String>) -> Self {
        let child_cancel = self.cancel.child_token();
        Self {
            ids: IdBundle {
                session_id: child_session_id.into(),
                task_id: ids::new_task_id(),
                parent_task_id: self.ids.task_id.clone(),
                user_id: self.ids.user_id.clone(),
                correlation_id: self.ids.correlation_id.clone(),
            },
            cancel: child_cancel,
            depth: self.depth + 1,
        }
    }
}

/// Reads the identifier bundle off a carrier. Provided as a free function to
/// mirror the spec's `ids-from(ctx)` accessor alongside the method form.
pub fn ids_from(carrier: &Carrier) -> IdBundle {
    carrier.ids()
}

/// Installs an identifier bundle onto a carrier. Free-function mirror of
/// `Carrier::with_ids` for call sites that hold only a mutable reference.
pub fn with_ids(carrier: &mut Carrier, ids: IdBundle) {
    carrier.ids = ids;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_ids_then_ids_from_round_trips_set_fields() {
        let mut carrier = Carrier::new("s1");
        let bundle = IdBundle {
            session_id: "s1".into(),
            task_id: "t1".into(),
            parent_task_id: String::new(),
            user_id: "u1".into(),
            correlation_id: "c1".into(),
        };
        with_ids(&mut carrier, bundle.clone());
        assert_eq!(ids_from(&carrier), bundle);
    }

    #[test]
    fn ensure_task_id_is_idempotent() {
        let mut carrier = Carrier::new("s1");
        let first = carrier.ensure_task_id();
        let second = carrier.ensure_task_id();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_fields_are_empty_not_panicking() {
        let carrier = Carrier::default();
        let ids = carrier.ids();
        assert_eq!(ids.task_id, "");
        assert_eq!(ids.parent_task_id, "");
    }

    #[test]
    fn derive_child_links_parent_task_id_and_increments_depth() {
        let mut parent = Carrier::new("parent-session");
        parent.ensure_task_id();
        let child = parent.derive_child("child-session");

        assert_eq!(child.ids().parent_task_id, parent.ids().task_id);
        assert_ne!(child.ids().session_id, parent.ids().session_id);
        assert_eq!(child.depth(), parent.depth() + 1);
        assert!(child.is_subagent());
    }

    #[test]
    fn cancelling_parent_cancels_child_token() {
        let parent = Carrier::new("s1");
        let child = parent.derive_child("s2");
        parent.cancellation_token().cancel();
        assert!(child.is_cancelled());
    }
}
