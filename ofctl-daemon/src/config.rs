//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Daemon configuration (SPEC_FULL.md §3 "[EXPANSION] Config"). Loaded from
//! an optional TOML file, falling back to defaults, the same shape as the
//! teacher's `Config::load(path: Option<&str>)` — just without a northbound
//! YANG surface to mirror, since this core has none.

use std::net::SocketAddr;
use std::time::Duration;

use ofctl_core::UpdateMode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub southbound: Southbound,
    pub update_mode: UpdateModeConfig,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Southbound {
    pub listen_addr: SocketAddr,
    pub accept_backlog: u32,
    pub barrier_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateModeConfig {
    BestEffort,
    PerPacketConsistent,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub stdout: bool,
    pub level: String,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ofctld.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => {
                toml::from_str(&config_str).expect("failed to parse configuration file")
            }
            Err(err) => {
                eprintln!("failed to load configuration file: {err}");
                eprintln!("falling back to default configuration...");
                Config::default()
            }
        }
    }

    pub fn update_mode(&self) -> UpdateMode {
        match self.update_mode {
            UpdateModeConfig::BestEffort => UpdateMode::BestEffort,
            UpdateModeConfig::PerPacketConsistent => UpdateMode::PerPacketConsistent,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            southbound: Default::default(),
            update_mode: UpdateModeConfig::BestEffort,
            logging: Default::default(),
        }
    }
}

// ===== impl Southbound =====

impl Default for Southbound {
    fn default() -> Southbound {
        Southbound {
            // OpenFlow 1.0's well-known controller port (spec.md §6).
            listen_addr: "0.0.0.0:6633".parse().unwrap(),
            accept_backlog: 64,
            barrier_timeout_secs: 15,
        }
    }
}

impl Southbound {
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_secs(self.barrier_timeout_secs)
    }
}

// ===== impl Logging =====

impl Default for Logging {
    fn default() -> Logging {
        Logging {
            stdout: true,
            level: "info".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.southbound.listen_addr.port(), 6633);
        assert_eq!(config.southbound.accept_backlog, 64);
        assert_eq!(config.southbound.barrier_timeout().as_secs(), 15);
        assert!(matches!(config.update_mode(), UpdateMode::BestEffort));
    }

    #[test]
    fn parses_a_minimal_toml_override() {
        let toml_str = r#"
            update_mode = "per-packet-consistent"

            [southbound]
            listen_addr = "127.0.0.1:6634"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.southbound.listen_addr.port(), 6634);
        assert!(matches!(config.update_mode(), UpdateMode::PerPacketConsistent));
    }
}
