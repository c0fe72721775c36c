//! The lock engine: hands out mutually-exclusive, named, advisory locks.
//!
//! Callers submit acquire/release/cleanup actions tagged with the lock name
//! and the requesting client. Actions for one tag are serialized through the
//! shard worker owning that tag (see [`dispatch`](self::dispatch)); the
//! worker applies them to its slice of the lock table and answers through
//! the action's completion callback. The completion is the only feedback
//! channel: it is invoked with `Ok(())` when the lock is granted or the
//! release went through, and with a [`Rejection`] when the client broke the
//! protocol. A completion that returns an error tells the engine its client
//! can no longer be reached, and the lock moves on to the next waiter.

mod dispatch;
mod owners;
mod table;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{QueueConfig, QueueMode};

pub use owners::OwnerIndex;

use dispatch::{Dispatcher, Job};

/// Protocol violations surfaced through completion callbacks.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("client tried to acquire a lock that it already had acquired")]
    UnnecessaryAcquire,
    #[error("client tried to release a lock that had not been acquired")]
    UnnecessaryRelease,
    #[error("client tried to release lock that it did not own")]
    BadManners,
}

/// What an action resolved to: granted/released, or a protocol violation.
pub type Verdict = Result<(), Rejection>;

/// Completion callback carried by an action. Runs inside the shard worker,
/// so it must not block; session completions only push frames onto an
/// outbound channel. The returned result reports whether the feedback could
/// be delivered.
pub type Completion = Box<dyn FnOnce(Verdict) -> anyhow::Result<()> + Send>;

pub(crate) enum Action {
    Acquire { client: String, completion: Completion },
    Release { client: String, completion: Completion },
    Cleanup { client: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("shard worker {0} is no longer accepting actions")]
    ShardUnavailable(usize),
}

/// Engine facade: owns the shard workers and the client index.
pub struct Engine {
    dispatcher: Dispatcher,
    owners: Arc<OwnerIndex>,
}

impl Engine {
    /// Spawn the shard workers described by `config`.
    pub fn new(config: &QueueConfig) -> Self {
        let owners = Arc::new(OwnerIndex::new());
        let shards = match config.mode {
            QueueMode::Single => 1,
            QueueMode::Multi => config.concurrency,
        };
        let dispatcher = Dispatcher::new(shards, config.capacity, owners.clone());
        Self { dispatcher, owners }
    }

    /// Request `tag` for `client`. The completion fires once the lock is
    /// granted, which may be much later; a protocol violation fires it
    /// immediately.
    pub async fn acquire(
        &self,
        tag: &str,
        client: &str,
        completion: Completion,
    ) -> Result<(), EngineError> {
        log::info!("client {} acquiring {}", client, tag);
        self.dispatcher
            .dispatch(Job {
                tag: tag.to_string(),
                action: Action::Acquire { client: client.to_string(), completion },
            })
            .await
    }

    /// Give up `tag` on behalf of `client`, handing it to the next waiter.
    pub async fn release(
        &self,
        tag: &str,
        client: &str,
        completion: Completion,
    ) -> Result<(), EngineError> {
        log::info!("client {} releasing {}", client, tag);
        self.dispatcher
            .dispatch(Job {
                tag: tag.to_string(),
                action: Action::Release { client: client.to_string(), completion },
            })
            .await
    }

    /// Release everything `client` holds. Called when its connection goes
    /// away; per-tag cleanup actions run on their owning shards and never
    /// produce feedback.
    pub async fn cleanup(&self, client: &str) {
        let tags = self.owners.owned_tags(client);
        if !tags.is_empty() {
            log::info!("cleaning up {} locks held by client {}", tags.len(), client);
        }
        for tag in tags {
            let result = self
                .dispatcher
                .dispatch(Job { tag, action: Action::Cleanup { client: client.to_string() } })
                .await;
            if let Err(err) = result {
                log::error!("cleanup for client {} failed: {}", client, err);
            }
        }
        self.owners.drop_client(client);
    }

    /// The client index, mapping clients to the tags they own.
    pub fn owners(&self) -> &OwnerIndex {
        &self.owners
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;

    fn test_config(mode: QueueMode) -> QueueConfig {
        QueueConfig { mode, concurrency: 4, capacity: 32 }
    }

    /// Completion that forwards its verdict to a channel and succeeds.
    fn notifying(tx: &mpsc::UnboundedSender<(String, Verdict)>, name: &str) -> Completion {
        let tx = tx.clone();
        let name = name.to_string();
        Box::new(move |verdict| {
            let _ = tx.send((name, verdict));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_acquire_release_acquire() {
        let engine = Engine::new(&test_config(QueueMode::Multi));
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.acquire("t", "a", notifying(&tx, "a")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ("a".to_string(), Ok(())));

        engine.acquire("t", "b", notifying(&tx, "b")).await.unwrap();
        engine.release("t", "a", notifying(&tx, "a-rel")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ("a-rel".to_string(), Ok(())));
        assert_eq!(rx.recv().await.unwrap(), ("b".to_string(), Ok(())));
    }

    #[tokio::test]
    async fn test_fifo_grants_in_single_mode() {
        let engine = Engine::new(&test_config(QueueMode::Single));
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.acquire("t", "x", notifying(&tx, "x")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ("x".to_string(), Ok(())));

        for waiter in ["a", "b", "c"] {
            engine.acquire("t", waiter, notifying(&tx, waiter)).await.unwrap();
        }
        engine.release("t", "x", notifying(&tx, "x-rel")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ("x-rel".to_string(), Ok(())));

        // Handover chain: each grantee releases as soon as it is granted.
        for expected in ["a", "b", "c"] {
            assert_eq!(rx.recv().await.unwrap(), (expected.to_string(), Ok(())));
            engine.release("t", expected, notifying(&tx, "rel")).await.unwrap();
            assert_eq!(rx.recv().await.unwrap(), ("rel".to_string(), Ok(())));
        }
    }

    #[tokio::test]
    async fn test_cleanup_frees_every_held_tag() {
        let engine = Engine::new(&test_config(QueueMode::Multi));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["t1", "t2", "t3"] {
            engine.acquire(tag, "a", notifying(&tx, tag)).await.unwrap();
            rx.recv().await.unwrap();
        }
        let mut held = engine.owners().owned_tags("a");
        held.sort();
        assert_eq!(held, vec!["t1".to_string(), "t2".to_string(), "t3".to_string()]);

        engine.cleanup("a").await;
        assert!(engine.owners().owned_tags("a").is_empty());

        // A fresh client gets each tag straight away.
        for tag in ["t1", "t2", "t3"] {
            engine.acquire(tag, "b", notifying(&tx, tag)).await.unwrap();
            assert_eq!(rx.recv().await.unwrap(), (tag.to_string(), Ok(())));
        }
    }

    #[tokio::test]
    async fn test_rejection_reaches_completion() {
        let engine = Engine::new(&test_config(QueueMode::Single));
        let (tx, mut rx) = mpsc::unbounded_channel();

        engine.acquire("t", "a", notifying(&tx, "a")).await.unwrap();
        rx.recv().await.unwrap();
        engine.release("t", "b", notifying(&tx, "b")).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ("b".to_string(), Err(Rejection::BadManners))
        );
    }

    #[tokio::test]
    async fn test_clients_waitlist_many_tags_concurrently() {
        let engine = Engine::new(&test_config(QueueMode::Multi));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let granted = Arc::new(Mutex::new(Vec::new()));

        engine.acquire("t1", "a", notifying(&tx, "a-t1")).await.unwrap();
        engine.acquire("t2", "a", notifying(&tx, "a-t2")).await.unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        // b waits on both of a's tags at once.
        for tag in ["t1", "t2"] {
            let granted = granted.clone();
            let tag_name = tag.to_string();
            engine
                .acquire(
                    tag,
                    "b",
                    Box::new(move |verdict| {
                        assert_eq!(verdict, Ok(()));
                        granted.lock().unwrap().push(tag_name);
                        Ok(())
                    }),
                )
                .await
                .unwrap();
        }

        engine.release("t1", "a", notifying(&tx, "rel")).await.unwrap();
        engine.release("t2", "a", notifying(&tx, "rel")).await.unwrap();
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let mut seen = granted.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["t1".to_string(), "t2".to_string()]);
    }
}
