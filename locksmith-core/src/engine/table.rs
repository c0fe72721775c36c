//! The lock table and its state machine.
//!
//! One `LockTable` lives inside each shard worker and is only ever touched
//! by that worker, so it needs no locking of its own. A lock is either
//! absent from the map (unlocked, nobody waiting) or locked with an owner
//! and a FIFO queue of parked acquire actions. Waiters are re-executed
//! inline when the lock frees up; routing them back through the dispatch
//! queue would let an unrelated action slip in between release and grant
//! and break FIFO ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::metrics;

use super::owners::OwnerIndex;
use super::{Action, Completion, Rejection};

/// A parked acquire action, waiting for the lock to free up.
pub(crate) struct Waiter {
    pub(crate) client: String,
    pub(crate) completion: Completion,
}

/// Transition-time lock state. `Unlocked` is never stored: a lock that ends
/// a transition unlocked has no waiters and is evicted from the map.
enum Lock {
    Unlocked,
    Locked { owner: String, waiters: VecDeque<Waiter> },
}

pub(crate) struct LockTable {
    locks: HashMap<String, Lock>,
    owners: Arc<OwnerIndex>,
}

impl LockTable {
    pub(crate) fn new(owners: Arc<OwnerIndex>) -> Self {
        Self { locks: HashMap::new(), owners }
    }

    /// Run one action to completion, including any waiter grants it
    /// cascades into.
    pub(crate) fn apply(&mut self, tag: String, action: Action) {
        let lock = self.locks.remove(&tag).unwrap_or(Lock::Unlocked);
        let next = match action {
            Action::Acquire { client, completion } => self.acquire(&tag, lock, client, completion),
            Action::Release { client, completion } => self.release(&tag, lock, client, completion),
            Action::Cleanup { client } => self.cleanup(&tag, lock, client),
        };
        match next {
            Lock::Unlocked => {}
            held => {
                self.locks.insert(tag, held);
            }
        }
    }

    fn acquire(&self, tag: &str, lock: Lock, client: String, completion: Completion) -> Lock {
        match lock {
            Lock::Locked { owner, waiters } if owner == client => {
                log::warn!("client {} acquired {} twice, releasing it", client, tag);
                metrics::LOCKED_LOCKS.dec();
                metrics::REJECTIONS.with_label_values(&["unnecessary_acquire"]).inc();
                self.owners.forget(&owner, tag);
                let _ = completion(Err(Rejection::UnnecessaryAcquire));
                self.grant_next(tag, waiters)
            }
            Lock::Locked { owner, mut waiters } => {
                log::debug!("waitlisting client {} for {}", client, tag);
                waiters.push_back(Waiter { client, completion });
                Lock::Locked { owner, waiters }
            }
            Lock::Unlocked => self.grant(tag, client, completion, VecDeque::new()),
        }
    }

    fn release(&self, tag: &str, lock: Lock, client: String, completion: Completion) -> Lock {
        match lock {
            Lock::Unlocked => {
                log::warn!("client {} released {} while it was unlocked", client, tag);
                metrics::REJECTIONS.with_label_values(&["unnecessary_release"]).inc();
                let _ = completion(Err(Rejection::UnnecessaryRelease));
                Lock::Unlocked
            }
            Lock::Locked { owner, waiters } if owner != client => {
                log::warn!("client {} released {} owned by {}", client, tag, owner);
                metrics::REJECTIONS.with_label_values(&["bad_manners"]).inc();
                let _ = completion(Err(Rejection::BadManners));
                Lock::Locked { owner, waiters }
            }
            Lock::Locked { owner, waiters } => {
                metrics::LOCKED_LOCKS.dec();
                metrics::RELEASES.inc();
                self.owners.forget(&owner, tag);
                // Release feedback failures do not affect the lock.
                let _ = completion(Ok(()));
                self.grant_next(tag, waiters)
            }
        }
    }

    fn cleanup(&self, tag: &str, lock: Lock, client: String) -> Lock {
        match lock {
            Lock::Locked { owner, waiters } if owner == client => {
                log::debug!("releasing {} for disconnected client {}", tag, owner);
                metrics::LOCKED_LOCKS.dec();
                metrics::RELEASES.inc();
                self.owners.forget(&owner, tag);
                self.grant_next(tag, waiters)
            }
            other => other,
        }
    }

    /// Grant the lock to `client` if its completion accepts; a completion
    /// failure means the client will never learn of the grant, so the lock
    /// passes to the next waiter instead.
    fn grant(
        &self,
        tag: &str,
        client: String,
        completion: Completion,
        waiters: VecDeque<Waiter>,
    ) -> Lock {
        match completion(Ok(())) {
            Ok(()) => {
                metrics::LOCKED_LOCKS.inc();
                metrics::ACQUIRES.inc();
                self.owners.record(&client, tag);
                Lock::Locked { owner: client, waiters }
            }
            Err(err) => {
                log::warn!("not granting {} to {}: {}", tag, client, err);
                self.grant_next(tag, waiters)
            }
        }
    }

    /// Pop waiters head-first until one of them takes the lock. Waiters
    /// whose clients are gone fail their completion and are dropped, which
    /// is what drains stale entries from the queue.
    fn grant_next(&self, tag: &str, mut waiters: VecDeque<Waiter>) -> Lock {
        while let Some(Waiter { client, completion }) = waiters.pop_front() {
            match completion(Ok(())) {
                Ok(()) => {
                    metrics::LOCKED_LOCKS.inc();
                    metrics::ACQUIRES.inc();
                    self.owners.record(&client, tag);
                    return Lock::Locked { owner: client, waiters };
                }
                Err(err) => {
                    log::warn!("skipping stale waiter {} for {}: {}", client, tag, err);
                }
            }
        }
        Lock::Unlocked
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self, tag: &str) -> bool {
        matches!(self.locks.get(tag), Some(Lock::Locked { .. }))
    }

    #[cfg(test)]
    pub(crate) fn owner_of(&self, tag: &str) -> Option<&str> {
        match self.locks.get(tag) {
            Some(Lock::Locked { owner, .. }) => Some(owner.as_str()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self, tag: &str) -> usize {
        match self.locks.get(tag) {
            Some(Lock::Locked { waiters, .. }) => waiters.len(),
            _ => 0,
        }
    }
}
