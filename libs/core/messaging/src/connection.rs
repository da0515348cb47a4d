//! Connection manager: owns one session and reconnects it under a single-flight guard.

use crate::broker::{BrokerSession, Connector};
use crate::error::{BrokerError, BrokerResult};
use crate::topology::Topology;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Lifecycle of a broker connection.
///
/// `Uninitialized → Connected → (Degraded → Connected)* → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Degraded,
    Closed,
}

/// Owns the connection and channel of one component.
///
/// Callers obtain the session through [`session`](Self::session), which
/// connects lazily and re-declares the topology on every (re)connect. The
/// lock is held for the whole reconnect so concurrent callers wait for a
/// single attempt instead of racing.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    topology: Topology,
    session: Mutex<Option<C::Session>>,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, topology: Topology) -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        Self {
            connector,
            topology,
            session: Mutex::new(None),
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Return the open session, reconnecting if needed.
    pub async fn session(&self) -> BrokerResult<C::Session> {
        let mut guard = self.session.lock().await;

        if self.state() == ConnectionState::Closed {
            return Err(BrokerError::Closed);
        }

        if let Some(session) = guard.as_ref() {
            if session.is_open() {
                return Ok(session.clone());
            }
        }

        if let Some(stale) = guard.take() {
            debug!("Discarding stale broker session");
            if let Err(e) = stale.close().await {
                debug!(error = %e, "Stale session close failed");
            }
        }

        match self.open().await {
            Ok(session) => {
                *guard = Some(session.clone());
                self.transition(ConnectionState::Connected);
                Ok(session)
            }
            Err(e) => {
                self.transition(ConnectionState::Degraded);
                Err(e)
            }
        }
    }

    async fn open(&self) -> BrokerResult<C::Session> {
        let session = self.connector.connect().await?;

        if let Err(e) = session.declare_topology(&self.topology).await {
            let _ = session.close().await;
            return Err(e);
        }

        debug!(
            exchange = %self.topology.exchange,
            queue = %self.topology.queue,
            routing_key = %self.topology.routing_key,
            "Topology declared"
        );
        Ok(session)
    }

    /// Drop the current session after a failure; the next call to
    /// [`session`](Self::session) reconnects.
    pub async fn invalidate(&self) {
        let mut guard = self.session.lock().await;

        if let Some(session) = guard.take() {
            if let Err(e) = session.close().await {
                debug!(error = %e, "Close of invalidated session failed");
            }
        }

        if self.state() != ConnectionState::Closed {
            self.transition(ConnectionState::Degraded);
        }
    }

    /// Release channel then connection. Safe to call when never connected
    /// and safe to call twice.
    pub async fn close(&self) -> BrokerResult<()> {
        let mut guard = self.session.lock().await;
        self.transition(ConnectionState::Closed);

        match guard.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            match next {
                ConnectionState::Degraded => {
                    warn!(from = %previous, to = %next, "Broker connection state changed")
                }
                _ => info!(from = %previous, to = %next, "Broker connection state changed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{CloseEvent, InMemoryBroker};
    use std::sync::Arc;

    fn topology() -> Topology {
        Topology::new("sales.notifications", "sales.exchange", "sales.created")
    }

    #[tokio::test]
    async fn test_connects_lazily_and_declares_topology() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::new(broker.clone(), topology());

        assert_eq!(manager.state(), ConnectionState::Uninitialized);
        assert_eq!(broker.connect_count(), 0);

        manager.session().await.unwrap();
        manager.session().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(broker.connect_count(), 1);
        assert_eq!(broker.declared_topologies(), vec![topology()]);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_reconnect() {
        let broker = InMemoryBroker::new();
        let manager = Arc::new(ConnectionManager::new(broker.clone(), topology()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.session().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(broker.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_and_redeclares_after_connection_loss() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::new(broker.clone(), topology());

        manager.session().await.unwrap();
        broker.drop_connections();
        manager.session().await.unwrap();

        assert_eq!(broker.connect_count(), 2);
        assert_eq!(broker.declared_topologies().len(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_connect_degrades() {
        let broker = InMemoryBroker::new();
        broker.fail_next_connects(1);
        let manager = ConnectionManager::new(broker.clone(), topology());

        assert!(manager.session().await.is_err());
        assert_eq!(manager.state(), ConnectionState::Degraded);

        manager.session().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_close_releases_channel_then_connection() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::new(broker.clone(), topology());
        manager.session().await.unwrap();

        manager.close().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(
            broker.close_events(),
            vec![CloseEvent::Channel, CloseEvent::Connection]
        );
        assert!(matches!(
            manager.session().await,
            Err(BrokerError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_without_session_is_ok() {
        let broker = InMemoryBroker::new();
        let manager = ConnectionManager::new(broker.clone(), topology());

        manager.close().await.unwrap();
        manager.close().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(broker.close_events().is_empty());
    }
}
