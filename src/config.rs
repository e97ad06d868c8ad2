use crate::application::polling::POLL_INTERVAL;
use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DISCOVERY_URL_PATTERN: &str = "http://localhost:7007/api/{{pluginId}}";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Pattern the host's discovery service resolves plugin ids with.
    pub discovery_url_pattern: String,
    pub id_token: Option<String>,
    pub listen_addr: SocketAddr,
    /// Settings are kept in memory only when unset.
    pub session_file: Option<PathBuf>,
    pub poll_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr = var("TRAVISCI_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("TRAVISCI_LISTEN_ADDR is not a socket address")?;
        let poll_interval = match var("TRAVISCI_POLL_INTERVAL_MS") {
            Some(raw) => Duration::from_millis(
                raw.parse()
                    .context("TRAVISCI_POLL_INTERVAL_MS is not a number of milliseconds")?,
            ),
            None => POLL_INTERVAL,
        };

        Ok(Self {
            discovery_url_pattern: var("TRAVISCI_DISCOVERY_URL_PATTERN")
                .unwrap_or_else(|| DEFAULT_DISCOVERY_URL_PATTERN.to_string()),
            id_token: var("TRAVISCI_ID_TOKEN"),
            listen_addr,
            session_file: var("TRAVISCI_SESSION_FILE").map(PathBuf::from),
            poll_interval,
        })
    }
}
