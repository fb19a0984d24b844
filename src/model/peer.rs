//! Per-peer liveness tracking with hysteresis.

/// A peer watched by a [`crate::monitor::Monitor`] — either a backend endpoint or
/// the remote sentinel (via the sync manager's single-peer monitor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Stable identifier: the peer's control address.
    pub peer_id: String,
    /// Control address used for health/role RPCs.
    pub peer_addr: String,
    /// Data-plane URL, derived from `peer_addr`'s host plus the configured proxy
    /// port. Only set for endpoints — the remote-sentinel peer has none.
    pub proxied_addr: Option<String>,
    /// Consecutive streak of like outcomes (success or failure).
    pub count: u32,
    /// The kind of the current streak: true = success streak, false = failure streak.
    pub success: bool,
    /// Published liveness. Initially true.
    pub alive: bool,
}

impl PeerInfo {
    pub fn new(peer_addr: impl Into<String>, proxied_port: Option<u16>) -> Self {
        let peer_addr = peer_addr.into();
        let proxied_addr = proxied_port.map(|port| {
            let host = peer_addr.split(':').next().unwrap_or(&peer_addr);
            format!("http://{host}:{port}")
        });
        Self {
            peer_id: peer_addr.clone(),
            peer_addr,
            proxied_addr,
            count: 0,
            success: true,
            alive: true,
        }
    }

    /// Apply one probe outcome, updating the hysteresis streak and, once the
    /// streak for the current polarity reaches `threshold`, publishing `alive`.
    ///
    /// Returns `true` if this call flipped `alive` — the caller's edge signal.
    ///
    /// A change in outcome polarity always resets `count` to 0 before the
    /// threshold check runs. Once `count` has reached `threshold` for the
    /// current polarity it is intentionally left pinned there (not incremented
    /// further) rather than counting an unbounded streak — this mirrors the
    /// source implementation's behavior and is preserved rather than "fixed".
    pub fn tick(&mut self, outcome: bool, threshold: u32) -> bool {
        if outcome != self.success {
            self.count = 0;
            self.success = outcome;
        }

        let was_alive = self.alive;
        if self.count + 1 == threshold {
            self.alive = outcome;
            self.count += 1;
        } else if threshold > self.count + 1 {
            self.count += 1;
        }
        was_alive != self.alive
    }
}
