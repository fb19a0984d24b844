//! The health monitor for backend endpoints (§4.B): a [`Monitor`] plus the
//! per-endpoint probe loop, reported-role tracking, and start/stop lifecycle.
//!
//! This is the Rust equivalent of the source's `MonitorManager`: the bare
//! [`Monitor`] only applies hysteresis when told an outcome; `EndpointMonitor`
//! is the thing that actually issues the periodic HTTP GETs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::model::PeerInfo;
use crate::monitor::{BoxFuture, HealthHook, Monitor};

pub type StatusHook = Arc<dyn Fn(String, bool) -> BoxFuture + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EndpointMonitorConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub url: String,
    pub failure_count: u32,
    pub recover_count: u32,
    pub check_code: bool,
}

#[derive(Deserialize)]
struct EndpointHealth {
    #[serde(rename = "Master")]
    master: bool,
}

pub struct EndpointMonitor {
    monitor: Monitor,
    config: EndpointMonitorConfig,
    ep_status: Mutex<HashMap<String, bool>>,
    status_hook: Mutex<Option<StatusHook>>,
    running: Mutex<bool>,
    stop_txs: Mutex<HashMap<String, mpsc::Sender<()>>>,
}

impl EndpointMonitor {
    pub fn new(endpoints: &[String], proxied_port: u16, config: EndpointMonitorConfig) -> Arc<Self> {
        let monitor = Monitor::new(endpoints, (proxied_port != 0).then_some(proxied_port), config.failure_count, config.recover_count);
        Arc::new(Self {
            monitor,
            config,
            ep_status: Mutex::new(HashMap::new()),
            status_hook: Mutex::new(None),
            running: Mutex::new(false),
            stop_txs: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_health_hook(&self, hook: HealthHook) {
        self.monitor.set_health_hook(hook);
    }

    pub fn set_status_hook(&self, hook: StatusHook) {
        *self.status_hook.lock() = Some(hook);
    }

    pub fn get(&self, peer_id: &str) -> Option<PeerInfo> {
        self.monitor.get(peer_id)
    }

    pub fn get_healthy(&self) -> Vec<PeerInfo> {
        self.monitor.get_healthy()
    }

    pub fn get_all(&self) -> Vec<PeerInfo> {
        self.monitor.get_all()
    }

    /// Force the recorded reported-role for `peer_id`, so that the next
    /// genuine probe-driven change is the only thing that triggers a
    /// `status_hook` call. Used by the sentinel when it promotes to on-duty
    /// with an already-known master (§4.C).
    pub fn set_ep_status(&self, peer_id: &str, master: bool) {
        self.ep_status.lock().insert(peer_id.to_string(), master);
    }

    /// Start one probe task per endpoint. Idempotent when already running.
    pub fn start(self: &Arc<Self>) {
        {
            let mut running = self.running.lock();
            if *running {
                warn!("endpoint monitor: start called while already running");
                return;
            }
            *running = true;
        }

        let peers = self.monitor.get_all();
        let mut stop_txs = self.stop_txs.lock();
        for peer in peers {
            let (tx, rx) = mpsc::channel::<()>(1);
            stop_txs.insert(peer.peer_id.clone(), tx);
            let this = self.clone();
            tokio::spawn(async move {
                this.probe_loop(peer.peer_id, peer.peer_addr, rx).await;
            });
        }
    }

    /// Signal every probe task to stop. Idempotent when already stopped.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        if !*running {
            warn!("endpoint monitor: stop called while already stopped");
            return;
        }
        *running = false;
        drop(running);

        for (_, tx) in self.stop_txs.lock().drain() {
            let _ = tx.try_send(());
        }
    }

    async fn probe_loop(self: Arc<Self>, peer_id: String, peer_addr: String, mut stop: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        // the first tick fires immediately; consume it so the first real probe
        // waits a full interval, matching a ticker-driven probe loop
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once(&peer_id, &peer_addr).await;
                }
                _ = stop.recv() => {
                    info!(peer_id = %peer_id, "endpoint monitor: probe task stopped");
                    return;
                }
            }
        }
    }

    async fn probe_once(&self, peer_id: &str, peer_addr: &str) {
        let url = format!("http://{peer_addr}{}", self.config.url);
        let resp = crate::http::client()
            .get(&url)
            .timeout(self.config.timeout)
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(err) => {
                error!(peer_id = %peer_id, error = %err, "endpoint probe: transport error");
                self.monitor.tick(peer_id, false);
                return;
            }
        };

        if self.config.check_code && !resp.status().is_success() {
            error!(peer_id = %peer_id, status = %resp.status(), "endpoint probe: non-2xx status");
            self.monitor.tick(peer_id, false);
            return;
        }

        let body = match resp.json::<EndpointHealth>().await {
            Ok(body) => body,
            Err(err) => {
                error!(peer_id = %peer_id, error = %err, "endpoint probe: decode error");
                self.monitor.tick(peer_id, false);
                return;
            }
        };

        self.monitor.tick(peer_id, true);
        self.check_reported_role(peer_id, body.master);
    }

    fn check_reported_role(&self, peer_id: &str, master: bool) {
        if !self.monitor.is_healthy(peer_id) {
            return;
        }
        let changed = {
            let mut ep_status = self.ep_status.lock();
            match ep_status.get(peer_id) {
                Some(&current) if current == master => false,
                _ => {
                    ep_status.insert(peer_id.to_string(), master);
                    true
                }
            }
        };
        if changed {
            if let Some(hook) = self.status_hook.lock().clone() {
                let id = peer_id.to_string();
                tokio::spawn(hook(id, master));
            }
        }
    }
}
