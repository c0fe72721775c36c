//! Hash-partitioned dispatch of lock actions onto shard workers.
//!
//! Every tag hashes to a 16-bit value; each shard worker owns a contiguous
//! band of that hash space. A worker is a tokio task consuming a bounded
//! mpsc channel and running each action to completion before taking the
//! next, which is what gives the lock table single-writer access without
//! locks. Dispatching to a full shard awaits channel capacity, so a
//! congested shard pushes back on its submitters.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::owners::OwnerIndex;
use super::table::LockTable;
use super::{Action, EngineError};

/// 32-bit FNV-1a.
fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 16777619;

    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Hash a tag into the 16-bit shard space. Pure: the same tag maps to the
/// same value for the life of the process.
pub(crate) fn tag_hash(tag: &str) -> u16 {
    (fnv1a32(tag.as_bytes()) % 65535) as u16
}

/// Band selection. The band width is fractional, so the division is done in
/// floating point; the clamp keeps an unfavourably rounded top-of-range
/// hash inside the last shard.
pub(crate) fn shard_index(hash: u16, shards: usize) -> usize {
    let band = 65536.0 / shards as f64;
    usize::min((f64::from(hash) / band) as usize, shards - 1)
}

/// A job on its way to a shard worker.
pub(crate) struct Job {
    pub(crate) tag: String,
    pub(crate) action: Action,
}

/// The fixed pool of shard workers plus the tag-to-shard routing.
pub(crate) struct Dispatcher {
    shards: Vec<mpsc::Sender<Job>>,
}

impl Dispatcher {
    /// Spawn `shards` workers, each with an inbound queue of `capacity`.
    pub(crate) fn new(shards: usize, capacity: usize, owners: Arc<OwnerIndex>) -> Self {
        let shards = (0..shards)
            .map(|index| spawn_worker(index, capacity, owners.clone()))
            .collect();
        Self { shards }
    }

    /// Route `job` to the shard owning its tag, awaiting queue capacity.
    pub(crate) async fn dispatch(&self, job: Job) -> Result<(), EngineError> {
        let index = if self.shards.len() == 1 {
            0
        } else {
            shard_index(tag_hash(&job.tag), self.shards.len())
        };
        log::debug!("dispatching action for {} to shard {}", job.tag, index);
        self.shards[index]
            .send(job)
            .await
            .map_err(|_| EngineError::ShardUnavailable(index))
    }
}

fn spawn_worker(index: usize, capacity: usize, owners: Arc<OwnerIndex>) -> mpsc::Sender<Job> {
    let (tx, mut rx) = mpsc::channel::<Job>(capacity);

    tokio::spawn(async move {
        log::info!("shard worker {} started", index);
        let mut table = LockTable::new(owners);
        while let Some(job) = rx.recv().await {
            table.apply(job.tag, job.action);
        }
        log::debug!("shard worker {} stopped", index);
    });

    tx
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rand::distributions::Alphanumeric;
    use rand::Rng;

    use super::super::Completion;
    use super::*;

    #[test]
    fn test_fnv1a_reference_vectors() {
        // Published FNV-1a 32-bit vectors.
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"b"), 0xe70c2de5);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_tag_hash_is_deterministic() {
        for tag in ["HH", "resource/primary", "ütf8-tåg"] {
            let first = tag_hash(tag);
            for _ in 0..10 {
                assert_eq!(tag_hash(tag), first);
            }
        }
    }

    #[test]
    fn test_shard_index_covers_all_shards_and_clamps() {
        for shards in [1, 2, 10, 16, 1000] {
            assert_eq!(shard_index(0, shards), 0);
            assert_eq!(shard_index(u16::MAX, shards), shards - 1);
            for hash in (0..=u16::MAX).step_by(31) {
                assert!(shard_index(hash, shards) < shards);
            }
        }
    }

    #[test]
    fn test_shard_distribution_is_uniform() {
        const SAMPLES: usize = 1_000_000;
        const SHARDS: usize = 1000;

        let mut rng = rand::thread_rng();
        let mut counts = vec![0u32; SHARDS];
        for _ in 0..SAMPLES {
            let tag: String =
                (&mut rng).sample_iter(&Alphanumeric).take(20).map(char::from).collect();
            counts[shard_index(tag_hash(&tag), SHARDS)] += 1;
        }

        let mean = (SAMPLES / SHARDS) as f64;
        for (shard, count) in counts.iter().enumerate() {
            let deviation = (f64::from(*count) - mean).abs() / mean;
            assert!(
                deviation <= 0.2,
                "shard {} saw {} samples, more than 20% away from the mean {}",
                shard,
                count,
                mean
            );
        }
    }

    fn tracking_completion(order: &Arc<Mutex<Vec<String>>>, name: &str) -> Completion {
        let order = order.clone();
        let name = name.to_string();
        Box::new(move |_| {
            order.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_same_tag_actions_run_in_dispatch_order() {
        let dispatcher = Dispatcher::new(4, 16, Arc::new(OwnerIndex::new()));
        let order = Arc::new(Mutex::new(Vec::new()));

        // Interleave acquires and releases from one client; every action
        // lands on the same shard and must execute in dispatch order.
        for round in 0..50 {
            dispatcher
                .dispatch(Job {
                    tag: "ordered".to_string(),
                    action: Action::Acquire {
                        client: "a".to_string(),
                        completion: tracking_completion(&order, &format!("acquire-{}", round)),
                    },
                })
                .await
                .unwrap();
            dispatcher
                .dispatch(Job {
                    tag: "ordered".to_string(),
                    action: Action::Release {
                        client: "a".to_string(),
                        completion: tracking_completion(&order, &format!("release-{}", round)),
                    },
                })
                .await
                .unwrap();
        }

        // A no-op cleanup after the submissions; once it is processed the
        // shard has drained everything before it.
        dispatcher
            .dispatch(Job {
                tag: "ordered".to_string(),
                action: Action::Cleanup { client: "nobody".to_string() },
            })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let seen = order.lock().unwrap();
        let expected: Vec<String> = (0..50)
            .flat_map(|round| [format!("acquire-{}", round), format!("release-{}", round)])
            .collect();
        assert_eq!(seen.as_slice(), expected.as_slice());
    }
}
