use std::time::Duration;

use serde::{Deserialize, Serialize};
use svckit::DnsRecordType;

/// Configuration for the service discovery binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Namespace to create when the environment has none; the environment id otherwise.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Record name; the service id when unset.
    #[serde(default)]
    pub record_name: Option<String>,
    #[serde(default = "default_record_type")]
    pub record_type: DnsRecordType,
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub ttl: Duration,
    /// Consecutive failed health checks before the record is removed.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Inject `<PEER>_SERVICE_ENDPOINT` into the caller on connect.
    #[serde(default = "default_inject_peer_endpoint")]
    pub inject_peer_endpoint: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            record_name: None,
            record_type: default_record_type(),
            ttl: default_ttl(),
            failure_threshold: default_failure_threshold(),
            inject_peer_endpoint: default_inject_peer_endpoint(),
        }
    }
}

fn default_record_type() -> DnsRecordType {
    DnsRecordType::A
}

fn default_ttl() -> Duration {
    Duration::from_secs(10)
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_inject_peer_endpoint() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_registration_policy() {
        let cfg = DiscoveryConfig::default();
        assert_eq!(cfg.ttl, Duration::from_secs(10));
        assert_eq!(cfg.failure_threshold, 2);
        assert_eq!(cfg.record_type, DnsRecordType::A);
        assert!(cfg.inject_peer_endpoint);
    }

    #[test]
    fn parses_partial_yaml() {
        let cfg: DiscoveryConfig =
            serde_yaml::from_str("ttl: 30s\nrecord_type: Srv\ninject_peer_endpoint: false\n").unwrap();
        assert_eq!(cfg.ttl, Duration::from_secs(30));
        assert_eq!(cfg.record_type, DnsRecordType::Srv);
        assert!(!cfg.inject_peer_endpoint);
        assert_eq!(cfg.failure_threshold, 2);
    }

    #[test]
    fn rejects_unknown_keys() {
        let res: Result<DiscoveryConfig, _> =
            serde_json::from_value(serde_json::json!({ "tll": "5s" }));
        assert!(res.is_err());
    }
}
