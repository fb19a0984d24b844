//! Shared HTTP client used for every outbound probe, role-change, and gossip
//! call. A single pooled client, built once, the way the teacher wires up its
//! own process-wide `reqwest::Client` via `once_cell::sync::Lazy`.

use once_cell::sync::Lazy;
use reqwest::Client;

static CLIENT: Lazy<Client> = Lazy::new(|| Client::builder().build().expect("build http client"));

pub fn client() -> &'static Client {
    &CLIENT
}
