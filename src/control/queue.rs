//! FIFO of in-flight commands awaiting their framed replies.
//!
//! Replies are matched positionally: the head of the queue owns the next
//! client-originated `%end`/`%error`. A query's `arity` counts the reply
//! bodies it still expects — one per `;`-separated command submitted under
//! it — and the entry is popped only when the count reaches zero, so a
//! multi-body command sequence stays at the head across all of its replies.

use std::collections::VecDeque;

use crate::control::bootstrap::BootstrapCtx;

/// What to do with a query's reply bodies.
///
/// The closed set of reply consumers in this client makes the callback pair
/// of a more dynamic design an enum dispatch.
pub(crate) enum QueryHandler {
    /// Fire-and-forget command; errors are logged, bodies discarded.
    Discard,
    /// The attach bootstrap sequence; the context carries its own state
    /// counter and staging maps.
    Bootstrap(Box<BootstrapCtx>),
}

impl std::fmt::Debug for QueryHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discard => f.write_str("Discard"),
            Self::Bootstrap(_) => f.write_str("Bootstrap"),
        }
    }
}

/// One in-flight command submission.
#[derive(Debug)]
pub(crate) struct Query {
    /// Short name for log lines.
    pub label: &'static str,
    /// Reply bodies still expected.
    pub arity: u32,
    pub handler: QueryHandler,
}

impl Query {
    pub fn new(label: &'static str, arity: u32, handler: QueryHandler) -> Self {
        Self { label, arity, handler }
    }
}

/// The pending-request FIFO.
#[derive(Debug, Default)]
pub(crate) struct QueryQueue {
    entries: VecDeque<Query>,
}

impl QueryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly-submitted query.
    pub fn push(&mut self, query: Query) {
        self.entries.push_back(query);
    }

    /// Detach the head for reply dispatch. The caller re-inserts it with
    /// [`QueryQueue::restore_head`] while its arity is still positive.
    pub fn take_head(&mut self) -> Option<Query> {
        self.entries.pop_front()
    }

    /// Put a still-pending head back in front of the queue.
    pub fn restore_head(&mut self, query: Query) {
        self.entries.push_front(query);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = QueryQueue::new();
        q.push(Query::new("first", 1, QueryHandler::Discard));
        q.push(Query::new("second", 1, QueryHandler::Discard));

        assert_eq!(q.len(), 2);
        assert_eq!(q.take_head().map(|e| e.label), Some("first"));
        assert_eq!(q.take_head().map(|e| e.label), Some("second"));
        assert!(q.is_empty());
    }

    #[test]
    fn restored_head_stays_in_front() {
        let mut q = QueryQueue::new();
        q.push(Query::new("multi", 3, QueryHandler::Discard));
        q.push(Query::new("later", 1, QueryHandler::Discard));

        let mut head = q.take_head().expect("head");
        head.arity -= 1;
        q.restore_head(head);

        assert_eq!(q.take_head().map(|e| (e.label, e.arity)), Some(("multi", 2)));
    }
}
