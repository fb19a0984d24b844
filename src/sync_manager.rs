//! The pairwise gossip election between the two sentinels (§5): which sentinel
//! is on duty, and propagation of which endpoint the on-duty sentinel elected
//! as master.
//!
//! Grounded on the original source's `SyncManager` (`sync/sync.go`): `Sync`,
//! `Handle`, `Get`, `SetMaster`, and the post-cycle `handleError` solo-promotion
//! path are all ported here with the same control flow.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::model::{ElectPeer, ElectType, PeerInfo};
use crate::monitor::Monitor;
use crate::sentinel::Sentinel;

/// After this many consecutive sync cycles with no elected master, promote
/// self unconditionally so a lone surviving sentinel doesn't stall forever.
const MAX_INIT_ATTEMPTS: u32 = 3;

struct SyncState {
    master: Option<PeerInfo>,
    elect_time: Option<chrono::DateTime<Utc>>,
    init_times: u32,
}

pub struct SyncManager {
    remote: Monitor,
    self_peer: PeerInfo,
    timeout: Duration,
    state: Mutex<SyncState>,
    sentinel: Arc<Sentinel>,
}

impl SyncManager {
    pub fn new(self_addr: impl Into<String>, peer_addr: impl Into<String>, timeout: Duration, failure_count: u32, recover_count: u32, sentinel: Arc<Sentinel>) -> Arc<Self> {
        let peer_addr = peer_addr.into();
        Arc::new(Self {
            remote: Monitor::new(&[peer_addr], None, failure_count, recover_count),
            self_peer: PeerInfo::new(self_addr, None),
            timeout,
            state: Mutex::new(SyncState { master: None, elect_time: None, init_times: 0 }),
            sentinel,
        })
    }

    pub fn is_master(&self) -> bool {
        self.state
            .lock()
            .master
            .as_ref()
            .map(|m| m.peer_id == self.self_peer.peer_id)
            .unwrap_or(false)
    }

    /// One gossip round: decide what to say, POST it to the remote sentinel,
    /// and handle the reply (or the lack of one).
    pub async fn sync(self: &Arc<Self>) {
        let outbound = {
            let mut state = self.state.lock();
            if state.master.is_none() && state.elect_time.is_none() {
                let now = Utc::now();
                state.elect_time = Some(now);
                Some(ElectPeer {
                    peer_id: self.self_peer.peer_id.clone(),
                    time: now,
                    kind: ElectType::Init,
                    ep_master_id: String::new(),
                })
            } else if state.master.is_none() {
                error!("sync manager: should not sync while election is pending");
                None
            } else {
                let master = state.master.clone().unwrap();
                let ep_master_id = if master.peer_id == self.self_peer.peer_id {
                    self.sentinel.get_master()
                } else {
                    String::new()
                };
                Some(ElectPeer {
                    peer_id: master.peer_id,
                    time: state.elect_time.unwrap_or_else(Utc::now),
                    kind: ElectType::Elected,
                    ep_master_id,
                })
            }
        };

        let Some(outbound) = outbound else {
            self.handle_cycle_error().await;
            return;
        };

        debug!(?outbound, "sync manager: sending gossip message");

        let mut remote_peers = self.remote.get_healthy();
        if remote_peers.is_empty() {
            let should_self_promote = {
                let state = self.state.lock();
                state.master.is_none() || state.master.as_ref().unwrap().peer_id != self.self_peer.peer_id
            };
            if should_self_promote {
                info!("sync manager: no healthy remote, electing self");
                let now = Utc::now();
                let self_peer = self.self_peer.clone();
                self.set_master(Some(self_peer)).await;
                self.state.lock().elect_time = Some(now);
                return;
            }
            // already master: fall through and probe the dead peer anyway, a
            // best-effort attempt that will mark it alive again via tick if
            // it has recovered.
            remote_peers = self.remote.get_all();
            if remote_peers.is_empty() {
                return;
            }
        }

        let remote_peer = remote_peers[0].clone();
        let url = format!("http://{}/sync", remote_peer.peer_addr);
        let resp = crate::http::client()
            .post(&url)
            .timeout(self.timeout)
            .json(&outbound)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                error!(error = %err, "sync manager: gossip request failed");
                self.remote.tick(&remote_peer.peer_id, false);
                return;
            }
        };
        if !resp.status().is_success() {
            error!(status = %resp.status(), "sync manager: gossip request failed");
            self.remote.tick(&remote_peer.peer_id, false);
            return;
        }
        let reply = match resp.json::<ElectPeer>().await {
            Ok(reply) => reply,
            Err(err) => {
                error!(error = %err, "sync manager: decode gossip reply failed");
                self.remote.tick(&remote_peer.peer_id, false);
                return;
            }
        };
        self.remote.tick(&remote_peer.peer_id, true);
        self.handle(reply).await;
    }

    /// Apply a received gossip message, possibly adopting a new master.
    pub async fn handle(self: &Arc<Self>, reply: ElectPeer) {
        if reply.peer_id.is_empty() {
            error!("sync manager: received an empty gossip reply");
            return;
        }

        if !self.is_master() {
            self.sentinel.hook_report_master(&reply.ep_master_id);
        }

        let decision = {
            let state = self.state.lock();
            match &state.master {
                None => {
                    if reply.peer_id == self.self_peer.peer_id {
                        Decision::AdoptSelf(reply.time)
                    } else if let Some(elect_time) = state.elect_time {
                        if elect_time < reply.time && reply.kind == ElectType::Init {
                            error!("sync manager: peer's init election happened after ours, ignoring");
                            Decision::Ignore
                        } else {
                            Decision::AdoptRemote(reply.peer_id.clone(), reply.time)
                        }
                    } else {
                        Decision::AdoptRemote(reply.peer_id.clone(), reply.time)
                    }
                }
                Some(master) if master.peer_id != reply.peer_id => {
                    let elect_time = state.elect_time;
                    if reply.kind == ElectType::Elected
                        && elect_time.is_some()
                        && elect_time.unwrap() > reply.time
                    {
                        Decision::AdoptRemote(reply.peer_id.clone(), reply.time)
                    } else {
                        Decision::Ignore
                    }
                }
                Some(_) => Decision::Ignore,
            }
        };

        match decision {
            Decision::Ignore => {}
            Decision::AdoptSelf(time) => {
                let self_peer = self.self_peer.clone();
                self.set_master(Some(self_peer)).await;
                self.state.lock().elect_time = Some(time);
            }
            Decision::AdoptRemote(peer_id, time) => {
                let peer = if peer_id == self.self_peer.peer_id {
                    Some(self.self_peer.clone())
                } else {
                    self.remote.get(&peer_id)
                };
                if peer.is_none() {
                    error!(peer_id, "sync manager: elected peer is not known");
                    return;
                }
                self.set_master(peer).await;
                self.state.lock().elect_time = Some(time);
            }
        }
    }

    /// The response sent back to whoever POSTed `/sync` to us.
    pub fn get(&self) -> ElectPeer {
        let state = self.state.lock();
        match &state.master {
            None => match state.elect_time {
                Some(time) => ElectPeer {
                    peer_id: self.self_peer.peer_id.clone(),
                    time,
                    kind: ElectType::Init,
                    ep_master_id: String::new(),
                },
                None => ElectPeer {
                    peer_id: String::new(),
                    time: Utc::now(),
                    kind: ElectType::Init,
                    ep_master_id: String::new(),
                },
            },
            Some(master) => {
                let ep_master_id = if master.peer_id == self.self_peer.peer_id {
                    self.sentinel.get_master()
                } else {
                    String::new()
                };
                ElectPeer {
                    peer_id: master.peer_id.clone(),
                    time: state.elect_time.unwrap_or_else(Utc::now),
                    kind: ElectType::Elected,
                    ep_master_id,
                }
            }
        }
    }

    pub fn ep_master(&self) -> String {
        self.sentinel.get_master()
    }

    /// The sentinel this sync manager activates/deactivates. Used by the
    /// metrics and `/info` adapters.
    pub fn sentinel(&self) -> &Arc<Sentinel> {
        &self.sentinel
    }

    /// Snapshot of the remote-sentinel peer tracked by the single-peer
    /// monitor (empty before the first gossip attempt observes it).
    pub fn remote_peer(&self) -> Vec<PeerInfo> {
        self.remote.get_all()
    }

    /// Seconds since the current `elect_time`, or `None` if no election has
    /// started yet.
    pub fn elect_time_age_seconds(&self) -> Option<f64> {
        self.state
            .lock()
            .elect_time
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
    }

    async fn set_master(self: &Arc<Self>, peer: Option<PeerInfo>) {
        let became_master = peer
            .as_ref()
            .map(|p| p.peer_id == self.self_peer.peer_id)
            .unwrap_or(false);
        self.state.lock().master = peer;
        self.sentinel.hook_self_role(became_master).await;
    }

    /// After a sync cycle produced no outbound message (election pending with
    /// no master), clear the stale elect time so the next cycle retries, or
    /// after three such rounds promote self unconditionally.
    async fn handle_cycle_error(self: &Arc<Self>) {
        let should_promote = {
            let mut state = self.state.lock();
            if state.master.is_none() && state.init_times < MAX_INIT_ATTEMPTS {
                state.elect_time = None;
                state.init_times += 1;
                false
            } else {
                state.master.is_none()
            }
        };
        if should_promote {
            let self_peer = self.self_peer.clone();
            self.set_master(Some(self_peer)).await;
        }
    }
}

enum Decision {
    Ignore,
    AdoptSelf(chrono::DateTime<Utc>),
    AdoptRemote(String, chrono::DateTime<Utc>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_monitor::{EndpointMonitor, EndpointMonitorConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sentinel() -> Arc<Sentinel> {
        let em = EndpointMonitor::new(&[], 0, EndpointMonitorConfig {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(1),
            url: "/health".to_string(),
            failure_count: 1,
            recover_count: 1,
            check_code: true,
        });
        Sentinel::new(em, "/to_master", "/to_slave", Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_sync_with_no_remote_elects_self() {
        let sm = SyncManager::new("10.0.0.1:9000", "10.0.0.2:9000", Duration::from_secs(1), 3, 2, sentinel());
        sm.sync().await;
        assert!(sm.is_master());
    }

    #[tokio::test]
    async fn handle_adopts_remote_master_on_fresh_init() {
        let sm = SyncManager::new("10.0.0.1:9000", "10.0.0.2:9000", Duration::from_secs(1), 3, 2, sentinel());
        sm.remote.tick("10.0.0.2:9000", true); // mark the peer known+healthy
        let reply = ElectPeer {
            peer_id: "10.0.0.2:9000".to_string(),
            time: Utc::now(),
            kind: ElectType::Init,
            ep_master_id: String::new(),
        };
        sm.handle(reply).await;
        assert!(!sm.is_master());
    }

    #[tokio::test]
    async fn handle_ignores_empty_reply() {
        let sm = SyncManager::new("10.0.0.1:9000", "10.0.0.2:9000", Duration::from_secs(1), 3, 2, sentinel());
        sm.handle(ElectPeer {
            peer_id: String::new(),
            time: Utc::now(),
            kind: ElectType::Init,
            ep_master_id: String::new(),
        })
        .await;
        assert!(sm.state.lock().master.is_none());
    }

    #[tokio::test]
    async fn sync_probes_a_dead_remote_even_while_already_master() {
        let peer = MockServer::start().await;
        let reply = ElectPeer {
            peer_id: "self".to_string(),
            time: Utc::now(),
            kind: ElectType::Elected,
            ep_master_id: String::new(),
        };
        Mock::given(method("POST"))
            .and(path("/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&reply))
            .mount(&peer)
            .await;

        let peer_addr = peer.address().to_string();
        let sm = SyncManager::new("self", peer_addr.clone(), Duration::from_secs(1), 1, 1, sentinel());
        sm.remote.tick(&peer_addr, false); // mark the peer dead up front
        assert!(!sm.remote.is_healthy(&peer_addr));

        let self_peer = PeerInfo::new("self", None);
        sm.set_master(Some(self_peer)).await;
        assert!(sm.is_master());

        // already master, remote is dead: sync() must still probe it rather
        // than returning early, so a recovered peer is marked alive again.
        sm.sync().await;
        assert!(sm.remote.is_healthy(&peer_addr));
    }

    #[tokio::test]
    async fn get_reflects_pending_init_before_any_master_is_set() {
        let sm = SyncManager::new("10.0.0.1:9000", "10.0.0.2:9000", Duration::from_secs(1), 3, 2, sentinel());
        sm.state.lock().elect_time = Some(Utc::now());
        let ep = sm.get();
        assert_eq!(ep.peer_id, "10.0.0.1:9000");
        assert_eq!(ep.kind, ElectType::Init);
    }
}
