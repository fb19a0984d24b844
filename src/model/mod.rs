pub mod elect;
pub mod peer;

pub use elect::{ElectPeer, ElectType};
pub use peer::PeerInfo;
