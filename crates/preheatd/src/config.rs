//! preheatd.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Durations are strings such as `"30s"`, `"500ms"` or `"1m"`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use preheat_client::ClientConfig;
use preheat_monitor::MonitorConfig;
use preheat_state::{DEFAULT_NAMESPACE, Metadata};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding the redb database.
    pub data_dir: PathBuf,
    /// Key namespace inside the database.
    pub namespace: String,
    pub port: u16,
    pub monitor: MonitorSection,
    pub client: ClientSection,
    /// Instances written to the store at start-up, replacing stored copies.
    pub instances: Vec<InstanceSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub health_interval: String,
    pub progress_interval: String,
    pub queue_capacity: usize,
    pub max_concurrent_checks: usize,
    pub max_poll_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub timeout: String,
    pub max_idle_connections: usize,
    pub idle_connection_timeout: String,
    pub tls_handshake_timeout: String,
    pub insecure_skip_verify: bool,
    pub accepted_statuses: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSection {
    pub id: String,
    pub provider: String,
    pub endpoint: String,
    #[serde(default)]
    pub auth_mode: String,
    #[serde(default)]
    pub auth_data: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub extensions: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/preheat"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            port: 8090,
            monitor: MonitorSection::default(),
            client: ClientSection::default(),
            instances: Vec::new(),
        }
    }
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            health_interval: "30s".to_string(),
            progress_interval: "5s".to_string(),
            queue_capacity: 1024,
            max_concurrent_checks: 64,
            max_poll_failures: 3,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
            max_idle_connections: 20,
            idle_connection_timeout: "30s".to_string(),
            tls_handshake_timeout: "30s".to_string(),
            insecure_skip_verify: true,
            accepted_statuses: Vec::new(),
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("preheat.redb")
    }

    pub fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
        let m = &self.monitor;
        Ok(MonitorConfig {
            health_interval: duration_field("monitor.health_interval", &m.health_interval)?,
            progress_interval: duration_field("monitor.progress_interval", &m.progress_interval)?,
            queue_capacity: m.queue_capacity,
            max_concurrent_checks: m.max_concurrent_checks,
            max_poll_failures: m.max_poll_failures,
        })
    }

    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let c = &self.client;
        Ok(ClientConfig {
            timeout: duration_field("client.timeout", &c.timeout)?,
            max_idle_connections: c.max_idle_connections,
            idle_connection_timeout: duration_field(
                "client.idle_connection_timeout",
                &c.idle_connection_timeout,
            )?,
            tls_handshake_timeout: duration_field(
                "client.tls_handshake_timeout",
                &c.tls_handshake_timeout,
            )?,
            insecure_skip_verify: c.insecure_skip_verify,
            accepted_statuses: c.accepted_statuses.clone(),
        })
    }

    /// Seed instances as store records. Health status starts unset.
    pub fn seed_instances(&self, now: i64) -> Vec<Metadata> {
        self.instances
            .iter()
            .map(|i| Metadata {
                id: i.id.clone(),
                provider: i.provider.clone(),
                endpoint: i.endpoint.clone(),
                auth_mode: i.auth_mode.clone(),
                auth_data: i.auth_data.clone(),
                status: String::new(),
                enabled: i.enabled,
                setup_timestamp: now,
                extensions: i.extensions.clone(),
            })
            .collect()
    }
}

fn duration_field(name: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).ok_or_else(|| anyhow!("{name}: invalid duration {value:?}"))
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
