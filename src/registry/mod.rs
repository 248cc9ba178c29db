//! Session registry for the relay.
//!
//! Tracks which connections have announced themselves and under which
//! display name. Every change is pushed to all open connections as a full
//! `users` snapshot.

use std::sync::Arc;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::websocket::{ConnectionId, ConnectionPool, ServerEvent, UserRecord};

pub struct SessionRegistry {
    users: RwLock<IndexMap<ConnectionId, UserRecord>>,
    pool: Arc<ConnectionPool>,
    default_name: String,
}

impl SessionRegistry {
    pub fn new(pool: Arc<ConnectionPool>, default_name: impl Into<String>) -> Self {
        Self {
            users: RwLock::new(IndexMap::new()),
            pool,
            default_name: default_name.into(),
        }
    }

    /// Inserts or replaces the record for `id` and broadcasts the new list.
    ///
    /// Returns `None` when `id` no longer has a live connection; nothing is
    /// stored in that case.
    pub async fn register(&self, id: ConnectionId, name: Option<&str>) -> Option<UserRecord> {
        let mut users = self.users.write().await;

        if !self.pool.contains(&id).await {
            warn!("Ignoring registration for closed connection {}", id);
            return None;
        }

        let record = UserRecord {
            id,
            name: self.display_name(name),
        };
        match users.insert(id, record.clone()) {
            Some(previous) => info!("Connection {} renamed from {:?} to {:?}", id, previous.name, record.name),
            None => info!("Registered connection {} as {:?}", id, record.name),
        }

        self.broadcast_locked(&users).await;
        Some(record)
    }

    /// Drops the record for `id`, if any, and broadcasts the new list.
    pub async fn remove(&self, id: &ConnectionId) -> Option<UserRecord> {
        let mut users = self.users.write().await;
        let removed = users.shift_remove(id);
        if let Some(record) = &removed {
            info!("Unregistered connection {} ({:?})", id, record.name);
        }

        self.broadcast_locked(&users).await;
        removed
    }

    pub async fn snapshot(&self) -> Vec<UserRecord> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn is_online(&self, id: &ConnectionId) -> bool {
        self.users.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    fn display_name(&self, name: Option<&str>) -> String {
        match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.default_name.clone(),
        }
    }

    // Callers hold the write lock so the snapshot matches what was just changed.
    async fn broadcast_locked(&self, users: &IndexMap<ConnectionId, UserRecord>) {
        let event = ServerEvent::Users(users.values().cloned().collect());
        match event.encode() {
            Ok(text) => {
                let reached = self.pool.broadcast(&text, None).await;
                debug!("Sent {} online users to {} connections", users.len(), reached);
            }
            Err(e) => error!("Failed to encode users broadcast: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    async fn open(pool: &ConnectionPool) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        pool.add(id, tx).await;
        (id, rx)
    }

    fn last_users(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<UserRecord> {
        let mut latest = None;
        while let Ok(text) = rx.try_recv() {
            if let Ok(ServerEvent::Users(users)) = ServerEvent::decode(&text) {
                latest = Some(users);
            }
        }
        latest.expect("no users broadcast received")
    }

    #[tokio::test]
    async fn test_register_broadcasts_to_every_connection() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (alice, mut alice_rx) = open(&pool).await;
        let (_lurker, mut lurker_rx) = open(&pool).await;

        registry.register(alice, Some("Alice")).await.unwrap();

        let expected = vec![UserRecord { id: alice, name: "Alice".to_string() }];
        assert_eq!(last_users(&mut alice_rx), expected);
        // Unregistered connections still hear about presence changes.
        assert_eq!(last_users(&mut lurker_rx), expected);
        assert_eq!(registry.snapshot().await, expected);
    }

    #[tokio::test]
    async fn test_reregister_overwrites_in_place() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (a, _rx_a) = open(&pool).await;
        let (b, _rx_b) = open(&pool).await;

        registry.register(a, Some("Alice")).await;
        registry.register(b, Some("Bob")).await;
        registry.register(a, Some("Alicia")).await;

        let names: Vec<_> = registry.snapshot().await.into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["Alicia", "Bob"]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_blank_names_fall_back_to_default() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (a, _rx_a) = open(&pool).await;
        let (b, _rx_b) = open(&pool).await;
        let (c, _rx_c) = open(&pool).await;

        assert_eq!(registry.register(a, None).await.unwrap().name, "Anonymous");
        assert_eq!(registry.register(b, Some("")).await.unwrap().name, "Anonymous");
        assert_eq!(registry.register(c, Some("   ")).await.unwrap().name, "Anonymous");
    }

    #[tokio::test]
    async fn test_duplicate_names_are_allowed() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (a, _rx_a) = open(&pool).await;
        let (b, _rx_b) = open(&pool).await;

        registry.register(a, Some("Sam")).await;
        registry.register(b, Some("Sam")).await;
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (a, _rx_a) = open(&pool).await;
        let (b, mut rx_b) = open(&pool).await;
        registry.register(a, Some("Alice")).await;
        registry.register(b, Some("Bob")).await;

        pool.remove(&a).await;
        assert!(registry.remove(&a).await.is_some());
        let after_first = registry.snapshot().await;
        assert_eq!(last_users(&mut rx_b), after_first);

        assert!(registry.remove(&a).await.is_none());
        assert_eq!(registry.snapshot().await, after_first);
        assert!(!registry.is_online(&a).await);
        assert!(registry.is_online(&b).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_and_leaves_converge() {
        const CONNECTIONS: usize = 40;

        let pool = Arc::new(ConnectionPool::new());
        let registry = Arc::new(SessionRegistry::new(pool.clone(), "Anonymous"));
        let mut opened = Vec::new();
        for _ in 0..CONNECTIONS {
            opened.push(open(&pool).await);
        }

        // Every connection registers; every other one also closes, racing its
        // own registration the way a disconnect can race an in-flight frame.
        let mut tasks = Vec::new();
        for (i, (id, _)) in opened.iter().enumerate() {
            let id = *id;
            let name = format!("user-{}", i);
            let registry_for_join = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry_for_join.register(id, Some(&name)).await;
            }));
            if i % 2 == 1 {
                let pool = pool.clone();
                let registry = registry.clone();
                tasks.push(tokio::spawn(async move {
                    pool.remove(&id).await;
                    registry.remove(&id).await;
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = registry.snapshot().await;
        let online: HashSet<_> = snapshot.iter().map(|u| u.id).collect();
        let survivors: HashSet<_> = opened
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(_, (id, _))| *id)
            .collect();
        assert_eq!(online, survivors);
        assert_eq!(pool.connection_count().await, survivors.len());

        // The last list each survivor heard is the final registry, in order.
        for (i, (_, rx)) in opened.iter_mut().enumerate() {
            if i % 2 == 0 {
                assert_eq!(last_users(rx), snapshot);
            }
        }
    }

    #[tokio::test]
    async fn test_registration_after_close_is_ignored() {
        let pool = Arc::new(ConnectionPool::new());
        let registry = SessionRegistry::new(pool.clone(), "Anonymous");
        let (a, _rx_a) = open(&pool).await;
        pool.remove(&a).await;

        assert!(registry.register(a, Some("Late")).await.is_none());
        assert!(registry.is_empty().await);
    }
}
