//! Connection edges between built services.

use serde::{Deserialize, Serialize};

use crate::workload::ServiceId;

/// What a connection opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Only a network grant.
    NetworkOnly,
    /// A network grant plus the peer's endpoint injected into the caller's environment.
    NetworkAndConfig,
}

/// Directed edge: `from` may call `to` on `port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: ServiceId,
    pub to: ServiceId,
    pub port: u16,
    pub kind: ConnectionKind,
}

/// What the peer side of a connection looks like to the caller's connectable extension.
#[derive(Debug, Clone, Copy)]
pub struct PeerEndpoint<'a> {
    pub service_id: &'a str,
    pub environment_id: &'a str,
    pub traffic_port: u16,
    /// Endpoint advertised by the peer's connectable extension, if any.
    pub advertised: Option<&'a str>,
}

/// Caller-side plan returned by [`crate::Connectable::plan_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPlan {
    pub kind: ConnectionKind,
    pub environment: Vec<(String, String)>,
}

impl ConnectionPlan {
    pub fn network_only() -> Self {
        Self {
            kind: ConnectionKind::NetworkOnly,
            environment: Vec::new(),
        }
    }

    pub fn with_config(environment: Vec<(String, String)>) -> Self {
        Self {
            kind: ConnectionKind::NetworkAndConfig,
            environment,
        }
    }
}

/// Upper-case `name`, replacing anything outside `[A-Za-z0-9]` with `_`.
pub fn env_var_fragment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Environment variable name for a peer endpoint, e.g. `api` → `API_SERVICE_ENDPOINT`.
pub fn peer_endpoint_env_key(peer: &str) -> String {
    format!("{}_SERVICE_ENDPOINT", env_var_fragment(peer))
}

/// The set of directed edges between services of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionGraph {
    edges: Vec<Connection>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge; an edge for the same ordered pair is kept only once.
    /// Returns `false` if the pair was already present.
    pub fn insert(&mut self, edge: Connection) -> bool {
        if self.contains(&edge.from, &edge.to) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn contains(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|e| e.from == from && e.to == to)
    }

    pub fn edges(&self) -> &[Connection] {
        &self.edges
    }

    pub fn outgoing<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.edges.iter().filter(move |e| e.from == from)
    }

    pub fn incoming<'a>(&'a self, to: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.edges.iter().filter(move |e| e.to == to)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
