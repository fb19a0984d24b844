//! Generic per-peer hysteresis liveness tracking (§4.A-B of the design).
//!
//! [`Monitor`] owns a set of [`PeerInfo`] entries and applies hysteresis on each
//! [`Monitor::tick`]. It does not itself run probe loops — callers feed it
//! outcomes. [`crate::endpoint_monitor::EndpointMonitor`] wraps a `Monitor` with
//! the probe loop and reported-role tracking that backend endpoints need; the
//! sync manager instead ticks a bare `Monitor` directly from its own gossip
//! round-trips (see `spec.md` §4.D, §5 — "the Sync Manager's own Sync() performs
//! the gossip POSTs, ticking the peer from its result").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::model::PeerInfo;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Fired when a peer's published `alive` flips (either direction).
pub type HealthHook = Arc<dyn Fn(String) -> BoxFuture + Send + Sync>;

pub struct Monitor {
    peers: Mutex<HashMap<String, PeerInfo>>,
    failure_count: u32,
    recover_count: u32,
    health_hook: Mutex<Option<HealthHook>>,
}

impl Monitor {
    pub fn new(peer_addrs: &[String], proxied_port: Option<u16>, failure_count: u32, recover_count: u32) -> Self {
        let mut peers = HashMap::with_capacity(peer_addrs.len());
        for addr in peer_addrs {
            let peer = PeerInfo::new(addr.clone(), proxied_port);
            peers.insert(peer.peer_id.clone(), peer);
        }
        Self {
            peers: Mutex::new(peers),
            failure_count,
            recover_count,
            health_hook: Mutex::new(None),
        }
    }

    pub fn set_health_hook(&self, hook: HealthHook) {
        *self.health_hook.lock() = Some(hook);
    }

    /// Record one probe outcome for `peer_id`. Dispatches the health hook on
    /// its own task if `alive` flipped, so the caller's probe loop never
    /// blocks on hook work.
    pub fn tick(&self, peer_id: &str, outcome: bool) {
        let threshold = if outcome { self.recover_count } else { self.failure_count };
        let edge = {
            let mut peers = self.peers.lock();
            match peers.get_mut(peer_id) {
                Some(peer) => peer.tick(outcome, threshold),
                None => {
                    error!(peer_id, "monitor: tick for unknown peer");
                    return;
                }
            }
        };
        if edge {
            let hook = self.health_hook.lock().clone();
            if let Some(hook) = hook {
                let id = peer_id.to_string();
                tokio::spawn(hook(id));
            }
        }
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.lock().get(peer_id).cloned()
    }

    pub fn get_all(&self) -> Vec<PeerInfo> {
        self.peers.lock().values().cloned().collect()
    }

    pub fn get_healthy(&self) -> Vec<PeerInfo> {
        self.peers.lock().values().filter(|p| p.alive).cloned().collect()
    }

    pub fn is_healthy(&self, peer_id: &str) -> bool {
        self.peers.lock().get(peer_id).map(|p| p.alive).unwrap_or(false)
    }
}
