//! Integration tests for the registry under concurrent use.
//!
//! Many tasks hit one shared `Registry` at once; every assertion is made
//! after the tasks have been joined, at a quiescent point.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use hearth_protocol::{ConnectionId, Identity};
use hearth_session::{Announce, ConnectionHandle, InboundHandler, Registry, RegistryConfig};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

const IDENTITIES: [&str; 5] = ["a@x.com", "b@x.com", "c@x.com", "d@x.com", "e@x.com"];

fn roomy() -> RegistryConfig {
    RegistryConfig {
        mailbox_capacity: 512,
        inbound_capacity: 512,
        ..RegistryConfig::default()
    }
}

/// Forwards everything the routers see into a channel the test can read.
struct Forward(mpsc::UnboundedSender<(Identity, String)>);

impl InboundHandler for Forward {
    fn handle(&self, identity: &Identity, message: String) {
        let _ = self.0.send((identity.clone(), message));
    }
}

async fn connect_many(registry: &Arc<Registry>, per_identity: usize) -> Vec<ConnectionHandle> {
    let mut tasks = Vec::new();
    for identity in IDENTITIES {
        for _ in 0..per_identity {
            let registry = Arc::clone(registry);
            tasks.push(tokio::spawn(
                async move { registry.connect(identity).await.unwrap() },
            ));
        }
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }
    handles
}

async fn assert_counts_agree(registry: &Registry) {
    let mut owned = 0;
    for identity in IDENTITIES {
        let ids = registry.connections_of(identity).await.unwrap();
        assert_eq!(
            registry.is_online(identity).await.unwrap(),
            !ids.is_empty(),
            "{identity} online flag"
        );
        for id in &ids {
            assert_eq!(registry.identity_of(*id).await.unwrap().as_str(), identity);
        }
        owned += ids.len();
    }
    assert_eq!(registry.connection_count().await.unwrap(), owned);
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_issue_distinct_sequential_ids() {
    let registry = Arc::new(Registry::new(roomy(), IDENTITIES));

    let handles = connect_many(&registry, 10).await;

    let ids: BTreeSet<ConnectionId> = handles.iter().map(ConnectionHandle::id).collect();
    let expected: BTreeSet<ConnectionId> = (0..50).map(ConnectionId).collect();
    assert_eq!(ids, expected);
    assert_eq!(registry.connection_count().await.unwrap(), 50);
    assert_counts_agree(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_connects_share_one_queue_per_identity() {
    let registry = Arc::new(Registry::new(roomy(), IDENTITIES));

    let handles = connect_many(&registry, 8).await;

    let mut by_identity: HashMap<&str, Vec<&ConnectionHandle>> = HashMap::new();
    for handle in &handles {
        by_identity
            .entry(handle.identity().as_str())
            .or_default()
            .push(handle);
    }
    for (identity, group) in by_identity {
        let first = group[0].inbound();
        assert!(
            group.iter().all(|h| h.inbound().same_queue(first)),
            "{identity} has more than one inbound queue"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_churn_leaves_registry_consistent() {
    let registry = Arc::new(Registry::new(roomy(), IDENTITIES));
    let keepers = connect_many(&registry, 2).await;

    let mut tasks = Vec::new();
    for round in 0..40 {
        let registry = Arc::clone(&registry);
        let identity = IDENTITIES[round % IDENTITIES.len()];
        tasks.push(tokio::spawn(async move {
            let handle = registry.connect(identity).await.unwrap();
            registry.notify_everyone("churn").await.unwrap();
            registry.disconnect(handle.id()).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(registry.connection_count().await.unwrap(), keepers.len());
    assert_counts_agree(&registry).await;
    assert_eq!(registry.online_identities().await.unwrap().len(), IDENTITIES.len());

    for handle in &keepers {
        registry.disconnect(handle.id()).await.unwrap();
    }
    assert_eq!(registry.connection_count().await.unwrap(), 0);
    assert!(registry.online_identities().await.unwrap().is_empty());
    assert_counts_agree(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcasts_arrive_in_issue_order_while_connections_join() {
    let registry = Arc::new(Registry::new(roomy(), IDENTITIES));

    let broadcaster = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            for n in 0..200u32 {
                registry.notify_everyone(&n.to_string()).await.unwrap();
                if n % 20 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };
    let mut handles = connect_many(&registry, 4).await;
    broadcaster.await.unwrap();

    // Each mailbox sees a gap-free run of the broadcasts issued after it
    // joined: everything from some starting point up to the last one.
    for handle in &mut handles {
        let mut seen = Vec::new();
        while let Some(message) = handle.try_recv() {
            seen.push(message.parse::<u32>().unwrap());
        }
        if let Some(&start) = seen.first() {
            let expected: Vec<u32> = (start..200).collect();
            assert_eq!(seen, expected, "connection {}", handle.id());
        }
    }
    assert_eq!(registry.stats().dropped, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_inbound_from_many_connections_keeps_per_connection_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let registry = Arc::new(Registry::new(roomy(), ["a@x.com"]).with_inbound_handler(Forward(tx)));

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(registry.connect("a@x.com").await.unwrap());
    }

    let mut writers = Vec::new();
    for handle in &handles {
        let inbound = handle.inbound().clone();
        let tag = handle.id().0;
        writers.push(tokio::spawn(async move {
            for n in 0..50 {
                inbound.send(format!("{tag}:{n}")).await.unwrap();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut per_connection: HashMap<u64, Vec<u32>> = HashMap::new();
    for _ in 0..200 {
        let (identity, message) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("router should keep up")
            .expect("router alive");
        assert_eq!(identity.as_str(), "a@x.com");
        let (tag, n) = message.split_once(':').unwrap();
        per_connection
            .entry(tag.parse().unwrap())
            .or_default()
            .push(n.parse().unwrap());
    }

    assert_eq!(per_connection.len(), 4);
    for sequence in per_connection.values() {
        assert_eq!(sequence, &(0..50).collect::<Vec<u32>>());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_presence_announcements_alternate_under_churn() {
    let registry = Arc::new(Registry::new(roomy(), ["a@x.com", "b@x.com"]).with_presence(Announce));
    let mut watcher = registry.connect("b@x.com").await.unwrap();
    while watcher.try_recv().is_some() {}

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let handle = registry.connect("a@x.com").await.unwrap();
            tokio::task::yield_now().await;
            registry.disconnect(handle.id()).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut heard = Vec::new();
    while let Some(message) = watcher.try_recv() {
        heard.push(message);
    }

    // However the tasks interleave, a@x.com can't leave before arriving.
    assert!(!heard.is_empty());
    for (n, message) in heard.iter().enumerate() {
        let expected = if n % 2 == 0 {
            "a@x.com has connected."
        } else {
            "a@x.com has disconnected."
        };
        assert_eq!(message, expected, "announcement {n} of {heard:?}");
    }
    assert_eq!(heard.len() % 2, 0);
}

#[tokio::test]
async fn test_connect_after_full_retirement_starts_fresh_queue() {
    let registry = Registry::new(RegistryConfig::default(), ["a@x.com"]);

    let old = registry.connect("a@x.com").await.unwrap();
    registry.disconnect(old.id()).await.unwrap();
    let new = registry.connect("a@x.com").await.unwrap();

    assert!(old.inbound().is_closed());
    assert!(!new.inbound().is_closed());
    assert!(new.inbound().send("back".into()).await.is_ok());
    assert!(old.inbound().send("stale".into()).await.is_err());
}
