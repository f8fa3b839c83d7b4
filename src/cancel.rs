//! Latest-wins cancellation for conversational requests.
//!
//! The runner polls a [`CancellationToken`] while waiting on the child; once
//! it fires, the child's process group is terminated and the call settles as
//! [`crate::error::ToolError::Cancelled`]. Superseding a turn therefore kills
//! the older process rather than ignoring its result.
//!
//! Turns are keyed by conversation. A new turn only cancels the in-flight
//! turn of the same conversation; other conversations are untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;

type Inflight = HashMap<String, (u64, CancellationToken)>;

#[derive(Debug, Default)]
pub struct Superseder {
    inflight: Arc<Mutex<Inflight>>,
    next_turn: AtomicU64,
}

impl Superseder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the turn in flight for `conversation`, if any, and start a new
    /// one. The entry is removed when the returned [`Turn`] is dropped.
    pub fn begin(&self, conversation: &str) -> Turn {
        let id = self.next_turn.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = lock(&self.inflight).insert(conversation.to_owned(), (id, token.clone()));
        if let Some((_, previous)) = previous {
            debug!(conversation, "superseding in-flight turn");
            previous.cancel();
        }
        Turn {
            conversation: conversation.to_owned(),
            id,
            token,
            inflight: Arc::clone(&self.inflight),
        }
    }

    /// Conversations with a turn in flight.
    pub fn active(&self) -> usize {
        lock(&self.inflight).len()
    }
}

/// One in-flight turn. Dropping it forgets the conversation unless a newer
/// turn has already replaced it.
#[derive(Debug)]
pub struct Turn {
    conversation: String,
    id: u64,
    token: CancellationToken,
    inflight: Arc<Mutex<Inflight>>,
}

impl Turn {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let mut inflight = lock(&self.inflight);
        if inflight
            .get(&self.conversation)
            .is_some_and(|(id, _)| *id == self.id)
        {
            inflight.remove(&self.conversation);
        }
    }
}

fn lock(inflight: &Mutex<Inflight>) -> MutexGuard<'_, Inflight> {
    inflight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
