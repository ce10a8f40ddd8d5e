//! Live session registry keyed by concentrator serial number

use crate::session::Session;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the one it displaced
    ///
    /// A concentrator that reconnects before its old socket dies logs in
    /// again from a new address; the newcomer wins and the caller is
    /// expected to disconnect the loser.
    pub async fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.sn().to_string(), session)
    }

    pub async fn get(&self, sn: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions.get(sn).cloned()
    }

    /// Remove the session for `sn` only if it still belongs to `peer`
    ///
    /// A teardown racing a takeover must not evict the replacement.
    pub async fn remove_by_peer(&self, sn: &str, peer: SocketAddr) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(sn).is_some_and(|s| s.peer() == peer) {
            sessions.remove(sn)
        } else {
            None
        }
    }

    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ks_transport::DeviceConn;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    async fn session(sn: &str) -> Arc<Session> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let conn = DeviceConn::new(server).unwrap();
        Arc::new(Session::new(sn.to_string(), conn, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = SessionRegistry::new();
        let s = session("182106230096").await;
        assert!(registry.insert(s.clone()).await.is_none());
        assert_eq!(registry.len().await, 1);
        let found = registry.get("182106230096").await.unwrap();
        assert_eq!(found.peer(), s.peer());
        assert!(registry.get("000000000000").await.is_none());
    }

    #[tokio::test]
    async fn test_takeover_returns_displaced_session() {
        let registry = SessionRegistry::new();
        let old = session("182106230096").await;
        let new = session("182106230096").await;
        registry.insert(old.clone()).await;
        let displaced = registry.insert(new.clone()).await.unwrap();
        assert_eq!(displaced.peer(), old.peer());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_by_peer_spares_replacement() {
        let registry = SessionRegistry::new();
        let old = session("182106230096").await;
        let new = session("182106230096").await;
        registry.insert(old.clone()).await;
        registry.insert(new.clone()).await;
        // the old connection's teardown must not evict the new session
        assert!(registry
            .remove_by_peer("182106230096", old.peer())
            .await
            .is_none());
        assert_eq!(registry.len().await, 1);
        assert!(registry
            .remove_by_peer("182106230096", new.peer())
            .await
            .is_some());
        assert!(registry.is_empty().await);
    }
}
