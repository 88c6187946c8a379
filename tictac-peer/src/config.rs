//! Load config from file and environment; command-line flags are applied on top by the binary.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Role, Timeouts, TransportKind};

/// Peer configuration. File: ~/.config/tictac/config.toml or /etc/tictac/config.toml.
/// Env overrides: TICTAC_TRANSPORT, TICTAC_ROLE, TICTAC_ADDRESS, TICTAC_PORT,
/// TICTAC_HANDSHAKE_TIMEOUT_SECS, TICTAC_RECEIVE_TIMEOUT_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// tcp or udp (default tcp).
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// acceptor or initiator (default acceptor).
    #[serde(default = "default_role")]
    pub role: Role,
    /// Bind address for the acceptor, peer address for the initiator.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,
    /// tracing filter used when RUST_LOG is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_transport() -> TransportKind {
    TransportKind::Tcp
}
fn default_role() -> Role {
    Role::Acceptor
}
fn default_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_handshake_timeout_secs() -> u64 {
    crate::DEFAULT_HANDSHAKE_TIMEOUT.as_secs()
}
fn default_receive_timeout_secs() -> u64 {
    crate::DEFAULT_RECEIVE_TIMEOUT.as_secs()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            role: default_role(),
            address: default_address(),
            port: default_port(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            receive_timeout_secs: default_receive_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            handshake: Duration::from_secs(self.handshake_timeout_secs),
            receive: Duration::from_secs(self.receive_timeout_secs),
        }
    }

    /// Apply env overrides from `get`. Unparsable values are ignored.
    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(t) = get("TICTAC_TRANSPORT").and_then(|s| s.parse().ok()) {
            self.transport = t;
        }
        if let Some(r) = get("TICTAC_ROLE").and_then(|s| s.parse().ok()) {
            self.role = r;
        }
        if let Some(a) = get("TICTAC_ADDRESS") {
            self.address = a;
        }
        if let Some(p) = get("TICTAC_PORT").and_then(|s| s.parse().ok()) {
            self.port = p;
        }
        if let Some(s) = get("TICTAC_HANDSHAKE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.handshake_timeout_secs = s;
        }
        if let Some(s) = get("TICTAC_RECEIVE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.receive_timeout_secs = s;
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|k| std::env::var(k).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/tictac/config.toml"));
    }
    out.push(PathBuf::from("/etc/tictac/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    let path = config_paths().into_iter().find(|p| p.exists())?;
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read config file");
            return None;
        }
    };
    match toml::from_str::<Config>(&text) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.transport, TransportKind::Tcp);
        assert_eq!(c.role, Role::Acceptor);
        assert_eq!(c.port, 5555);
        assert_eq!(c.timeouts(), Timeouts::default());
    }

    #[test]
    fn parses_partial_file() {
        let c: Config = toml::from_str(
            r#"
            transport = "udp"
            role = "initiator"
            address = "::1"
            receive_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.transport, TransportKind::Udp);
        assert_eq!(c.role, Role::Initiator);
        assert_eq!(c.address, "::1");
        assert_eq!(c.port, 5555);
        assert_eq!(c.timeouts().receive, Duration::from_secs(5));
        assert_eq!(c.timeouts().handshake, Duration::from_secs(10));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(toml::from_str::<Config>("colour = \"red\"").is_err());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TICTAC_TRANSPORT", "udp"),
            ("TICTAC_PORT", "6000"),
            ("TICTAC_ROLE", "bogus"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.transport, TransportKind::Udp);
        assert_eq!(c.port, 6000);
        assert_eq!(c.role, Role::Acceptor);
    }
}
