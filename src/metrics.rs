//! Prometheus metrics exposed at `GET /metrics` (an ambient addition beyond
//! `spec.md` §6, carried per `SPEC_FULL.md` §B regardless of the spec's
//! Non-goals around observability).
//!
//! Gauges are refreshed at scrape time rather than on a background timer:
//! each of the three components already exposes cheap, lock-guarded reads, so
//! there is no reason to duplicate that state in a poller.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, Opts, Registry, TextEncoder};

use crate::sync_manager::SyncManager;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static ON_DUTY: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("sentinel_on_duty", "1 if this sentinel is currently on duty").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static IS_SENTINEL_MASTER: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("sentinel_is_master", "1 if this sentinel won the pairwise election").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static ELECT_TIME_AGE: Lazy<Gauge> = Lazy::new(|| {
    let g = Gauge::new(
        "sentinel_elect_time_age_seconds",
        "seconds since the current election's elect_time; -1 if no election is known",
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static ENDPOINT_ALIVE: Lazy<GaugeVec> = Lazy::new(|| {
    let g = GaugeVec::new(
        Opts::new("sentinel_endpoint_alive", "1 if the endpoint is currently published as alive"),
        &["peer_id"],
    )
    .unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

static PEER_SENTINEL_ALIVE: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::new("sentinel_peer_alive", "1 if the gossip channel to the peer sentinel is alive").unwrap();
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

/// Refresh every gauge from current component state, then text-encode the
/// registry for the scrape response.
pub fn render(sync_manager: &SyncManager) -> String {
    let on_duty = sync_manager.sentinel().is_on_duty();
    ON_DUTY.set(on_duty as i64);
    IS_SENTINEL_MASTER.set(sync_manager.is_master() as i64);

    match sync_manager.elect_time_age_seconds() {
        Some(age) => ELECT_TIME_AGE.set(age),
        None => ELECT_TIME_AGE.set(-1.0),
    }

    for peer in sync_manager.sentinel().monitor().get_all() {
        ENDPOINT_ALIVE
            .with_label_values(&[peer.peer_id.as_str()])
            .set(if peer.alive { 1.0 } else { 0.0 });
    }

    let peer_alive = sync_manager.remote_peer().iter().any(|p| p.alive);
    PEER_SENTINEL_ALIVE.set(peer_alive as i64);

    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).ok();
    String::from_utf8_lossy(&buffer).into_owned()
}
