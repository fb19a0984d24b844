use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The gossip message exchanged between the two sentinels (§5): who each side
/// currently considers the sentinel master, when that election happened, and
/// (only set by the on-duty side) who the endpoint master currently is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectPeer {
    #[serde(rename = "PeerId")]
    pub peer_id: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
    #[serde(rename = "Type")]
    pub kind: ElectType,
    #[serde(rename = "EPMasterId", default)]
    pub ep_master_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectType {
    Init,
    Elected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_spec_schema() {
        let msg = ElectPeer {
            peer_id: "10.0.0.1:9000".to_string(),
            time: Utc::now(),
            kind: ElectType::Elected,
            ep_master_id: "10.0.0.10:8000".to_string(),
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["PeerId"], "10.0.0.1:9000");
        assert_eq!(v["Type"], "elected");
        assert_eq!(v["EPMasterId"], "10.0.0.10:8000");
        assert!(v.get("Time").is_some());
    }
}
