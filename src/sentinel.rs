//! The sentinel state machine (§4.C): on/off duty tracking, master election,
//! and the hook handlers wired onto an [`EndpointMonitor`].
//!
//! Grounded directly on the original source's `Sentinel` (`sync/sentinel.go`):
//! the hook bodies below are a line-for-line port of `HookEndpointHealth`,
//! `HookEndpointStatus`, `HookReportMaster`, `HookSelfRole`, and `Elect`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::endpoint_monitor::EndpointMonitor;
use crate::model::PeerInfo;

const ROLE_CHANGE_TIMEOUT: Duration = Duration::from_secs(10);

struct SentinelState {
    master: String,
    on_duty: bool,
}

pub struct Sentinel {
    monitor: Arc<EndpointMonitor>,
    to_master_path: String,
    to_slave_path: String,
    settle: Duration,
    state: Mutex<SentinelState>,
}

impl Sentinel {
    pub fn new(
        monitor: Arc<EndpointMonitor>,
        to_master_path: impl Into<String>,
        to_slave_path: impl Into<String>,
        settle: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            monitor,
            to_master_path: to_master_path.into(),
            to_slave_path: to_slave_path.into(),
            settle,
            state: Mutex::new(SentinelState {
                master: String::new(),
                on_duty: false,
            }),
        })
    }

    /// Register this sentinel's hooks on its endpoint monitor. Must run after
    /// construction: the monitor needs a `Sentinel` to call back into, and the
    /// `Sentinel` needs the monitor to build, so the wiring is two-phase.
    pub fn install_hooks(self: &Arc<Self>) {
        let health = self.clone();
        self.monitor.set_health_hook(Arc::new(move |peer_id| {
            let health = health.clone();
            Box::pin(async move { health.hook_endpoint_health(&peer_id).await })
        }));

        let status = self.clone();
        self.monitor.set_status_hook(Arc::new(move |peer_id, master| {
            let status = status.clone();
            Box::pin(async move { status.hook_endpoint_status(&peer_id, master).await })
        }));
    }

    pub fn get_master(&self) -> String {
        self.state.lock().master.clone()
    }

    pub fn get_master_peer(&self) -> Option<PeerInfo> {
        let master = self.get_master();
        if master.is_empty() {
            return None;
        }
        self.monitor.get(&master)
    }

    pub fn is_on_duty(&self) -> bool {
        self.state.lock().on_duty
    }

    /// The endpoint monitor this sentinel drives. Used by the metrics and
    /// `/info` adapters to read liveness without duplicating state.
    pub fn monitor(&self) -> &Arc<EndpointMonitor> {
        &self.monitor
    }

    /// Called when a monitored endpoint's liveness flips.
    async fn hook_endpoint_health(&self, peer_id: &str) {
        info!(peer_id, "sentinel: endpoint health changed");
        if !self.is_on_duty() {
            warn!("sentinel: not on duty, ignoring endpoint health change");
            return;
        }

        let master = self.get_master();
        if master.is_empty() {
            self.elect().await;
            return;
        }
        if peer_id != master {
            info!(peer_id, "sentinel: a slave's health changed, nothing to do");
            return;
        }
        // master endpoint went down (or came back): re-elect.
        self.elect().await;
    }

    /// Called when a monitored endpoint's self-reported role changes.
    async fn hook_endpoint_status(&self, peer_id: &str, master: bool) {
        info!(peer_id, master, "sentinel: endpoint reported role changed");
        if !self.is_on_duty() {
            warn!("sentinel: not on duty, endpoint status should not be monitored by me");
            return;
        }

        let initialized = {
            let mut state = self.state.lock();
            if state.master.is_empty() {
                if master {
                    state.master = peer_id.to_string();
                }
                true
            } else {
                false
            }
        };
        if initialized {
            return;
        }

        let current_master = self.get_master();
        if master && peer_id != current_master {
            error!(peer_id, "sentinel: another endpoint claims master, downgrading it");
            if let Err(err) = self.change_ep_role(peer_id, false).await {
                error!(peer_id, error = %err, "sentinel: downgrade failed");
            }
        } else if !master && peer_id == current_master {
            error!(peer_id, "sentinel: elected master downgraded itself, re-promoting");
            if let Err(err) = self.change_ep_role(peer_id, true).await {
                error!(peer_id, error = %err, "sentinel: upgrade failed");
            }
        }
    }

    /// Called by the sync manager when this sentinel is off duty and the
    /// remote sentinel reports a new master identity via gossip.
    pub fn hook_report_master(&self, peer_id: &str) {
        if self.is_on_duty() {
            error!("sentinel: i am on duty, remote-reported master change should never happen");
            return;
        }
        self.state.lock().master = peer_id.to_string();
    }

    /// Called by the sync manager when this sentinel's on-duty status
    /// changes. Starts or stops endpoint monitoring and, on promotion, either
    /// keeps the already-known master or runs an election.
    pub async fn hook_self_role(self: &Arc<Self>, master: bool) {
        info!(master, "sentinel: role change");
        {
            let state = self.state.lock();
            if state.on_duty == master {
                warn!(master, "sentinel: role change to the same status, ignoring");
                return;
            }
        }

        self.state.lock().on_duty = master;

        if master {
            self.monitor.start();
            // give the monitor time to re-establish endpoint status before
            // deciding whether an election is needed.
            tokio::time::sleep(self.settle).await;

            let existing_master = self.get_master();
            if existing_master.is_empty() {
                self.elect().await;
            } else {
                info!("sentinel: promoted with a known master, waiting for status confirmation");
                self.monitor.set_ep_status(&existing_master, true);
            }
        } else {
            self.monitor.stop();
        }
    }

    /// Elect a master from the currently healthy endpoints, trying each in
    /// turn until one accepts the promotion.
    async fn elect(&self) {
        let peers = self.monitor.get_healthy();
        let mut elected = None;
        for peer in &peers {
            match self.change_ep_role(&peer.peer_id, true).await {
                Ok(()) => {
                    elected = Some(peer.peer_id.clone());
                    break;
                }
                Err(err) => error!(peer_id = %peer.peer_id, error = %err, "sentinel: elect attempt failed"),
            }
        }
        self.state.lock().master = elected.unwrap_or_default();
    }

    async fn change_ep_role(&self, peer_id: &str, master: bool) -> Result<(), anyhow::Error> {
        let peer = self
            .monitor
            .get(peer_id)
            .ok_or_else(|| anyhow::anyhow!("unknown endpoint {peer_id}"))?;
        let path = if master { &self.to_master_path } else { &self.to_slave_path };
        let url = format!("http://{}{}", peer.peer_addr, path);

        let resp = crate::http::client()
            .post(&url)
            .timeout(ROLE_CHANGE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("change ep role failed: {}", resp.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint_monitor::EndpointMonitorConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg() -> EndpointMonitorConfig {
        EndpointMonitorConfig {
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(1),
            url: "/health".to_string(),
            failure_count: 1,
            recover_count: 1,
            check_code: true,
        }
    }

    #[tokio::test]
    async fn hook_self_role_elects_when_no_master_known() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"Master": false})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/to_master"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let addr = server.address().to_string();
        let monitor = EndpointMonitor::new(&[addr.clone()], 0, cfg());
        let sentinel = Sentinel::new(monitor.clone(), "/to_master", "/to_slave", Duration::from_millis(1));
        sentinel.install_hooks();

        // settle is 1ms; hook_self_role(true) starts monitoring, waits, then
        // elects since no master is known yet. Give the probe loop time to
        // mark the endpoint alive before electing races it.
        tokio::time::sleep(Duration::from_millis(30)).await;
        sentinel.hook_self_role(true).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(sentinel.get_master(), addr);
    }

    #[tokio::test]
    async fn hook_report_master_updates_master_when_off_duty() {
        let monitor = EndpointMonitor::new(&["10.0.0.1:1".to_string()], 0, cfg());
        let sentinel = Sentinel::new(monitor, "/to_master", "/to_slave", Duration::from_millis(1));
        sentinel.hook_report_master("10.0.0.1:1");
        assert_eq!(sentinel.get_master(), "10.0.0.1:1");
    }

    #[tokio::test]
    async fn hook_report_master_is_ignored_while_on_duty() {
        let monitor = EndpointMonitor::new(&["10.0.0.1:1".to_string()], 0, cfg());
        let sentinel = Sentinel::new(monitor, "/to_master", "/to_slave", Duration::from_millis(1));
        sentinel.state.lock().on_duty = true;
        sentinel.hook_report_master("10.0.0.1:1");
        assert_eq!(sentinel.get_master(), "");
    }

    #[tokio::test]
    async fn hook_self_role_ignores_redundant_transition() {
        let monitor = EndpointMonitor::new(&["10.0.0.1:1".to_string()], 0, cfg());
        let sentinel = Sentinel::new(monitor, "/to_master", "/to_slave", Duration::from_millis(1));
        // already off duty; transitioning to "off duty" again is a no-op
        sentinel.hook_self_role(false).await;
        assert!(!sentinel.is_on_duty());
    }
}
