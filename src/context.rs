//! The startup-constructed context handed to every component.
//!
//! There is no process-global mutable state: everything a session needs —
//! configuration, registry, router, the event sink, the authenticator,
//! the server keypair — travels in one `Arc<ProxyContext>`.

use crate::{
    auth::SessionAuthenticator,
    config::ProxyConfig,
    crypto::ServerKeyPair,
    events::EventSink,
    protocol::registry::PacketRegistry,
    router::{Router, ServerStatus},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

/// Asks a live session to move its player to another backend. Delivered
/// through the handle registered by the session and consumed between two
/// forwarded packets, while the current backend is still healthy.
pub struct SwitchRequest {
    pub target: String,
    /// Completion notification for the requester, if it wants one.
    pub ack: Option<oneshot::Sender<SwitchOutcome>>,
}

/// How a requested switch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The player is attached to the requested backend.
    Completed,
    /// The player stayed where it was; the message says why.
    Failed(String),
}

pub struct ProxyContext {
    pub config: ProxyConfig,
    pub registry: Arc<PacketRegistry>,
    pub router: Router,
    pub events: Arc<dyn EventSink>,
    pub authenticator: Arc<dyn SessionAuthenticator>,
    pub keypair: ServerKeyPair,
    /// Per-server health and population, read by the router's fallback
    /// ordering and by the status responder.
    status: RwLock<HashMap<String, ServerStatus>>,
    /// Switch-request channels of the live sessions, keyed by player UUID.
    sessions: RwLock<HashMap<Uuid, mpsc::UnboundedSender<SwitchRequest>>>,
}

impl ProxyContext {
    pub fn new(
        config: ProxyConfig,
        events: Arc<dyn EventSink>,
        authenticator: Arc<dyn SessionAuthenticator>,
    ) -> anyhow::Result<Arc<Self>> {
        let registry = Arc::new(PacketRegistry::build()?);
        let router = Router::from_config(&config);
        let keypair = ServerKeyPair::generate()?;

        let status = config
            .servers
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    ServerStatus {
                        reachable: true,
                        players: 0,
                    },
                )
            })
            .collect();

        Ok(Arc::new(ProxyContext {
            config,
            registry,
            router,
            events,
            authenticator,
            keypair,
            status: RwLock::new(status),
            sessions: RwLock::new(HashMap::new()),
        }))
    }

    /// Registers a session's switch-request channel. A reconnecting
    /// player's new session replaces the previous entry.
    pub(crate) async fn register_session(
        &self,
        player: Uuid,
        requests: mpsc::UnboundedSender<SwitchRequest>,
    ) {
        self.sessions.write().await.insert(player, requests);
    }

    /// Removes a session's entry, unless a newer session for the same
    /// player has already replaced it.
    pub(crate) async fn unregister_session(
        &self,
        player: Uuid,
        requests: &mpsc::UnboundedSender<SwitchRequest>,
    ) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&player)
            .is_some_and(|current| current.same_channel(requests))
        {
            sessions.remove(&player);
        }
    }

    /// Requests a live server switch for `player` without waiting for the
    /// current backend to fail — the caller-facing entry point to the
    /// switch machinery for plugins and admin surfaces.
    ///
    /// Returns a receiver for the outcome, or `None` when no session for
    /// that player exists (or it just went away).
    pub async fn request_switch(
        &self,
        player: Uuid,
        target: impl Into<String>,
    ) -> Option<oneshot::Receiver<SwitchOutcome>> {
        let (ack, outcome) = oneshot::channel();
        let request = SwitchRequest {
            target: target.into(),
            ack: Some(ack),
        };
        let sessions = self.sessions.read().await;
        sessions.get(&player)?.send(request).ok()?;
        Some(outcome)
    }

    pub async fn status_snapshot(&self) -> HashMap<String, ServerStatus> {
        self.status.read().await.clone()
    }

    pub async fn total_players(&self) -> usize {
        self.status.read().await.values().map(|s| s.players).sum()
    }

    pub async fn mark_reachable(&self, server: &str, reachable: bool) {
        if let Some(status) = self.status.write().await.get_mut(server) {
            status.reachable = reachable;
        }
    }

    pub async fn player_joined(&self, server: &str) {
        if let Some(status) = self.status.write().await.get_mut(server) {
            status.players += 1;
        }
    }

    pub async fn player_left(&self, server: &str) {
        if let Some(status) = self.status.write().await.get_mut(server) {
            status.players = status.players.saturating_sub(1);
        }
    }
}
