//! Picks which backend a player should land on.
//!
//! The router itself is pure: it turns a virtual host plus a snapshot of
//! server health into an ordered candidate list. Walking that list and
//! dialing is the session's job, so everything here is unit-testable
//! without sockets.

use crate::config::{ProxyConfig, ServerEntry};
use std::collections::HashMap;

/// Live view of one backend, fed by dial results and join/leave counts.
#[derive(Debug, Copy, Clone, Default)]
pub struct ServerStatus {
    /// False once a dial fails; true again after any success.
    pub reachable: bool,
    pub players: usize,
}

pub struct Router {
    forced_hosts: HashMap<String, Vec<String>>,
    try_order: Vec<String>,
    servers: HashMap<String, ServerEntry>,
    dynamic_fallbacks: bool,
    most_populated_fallbacks: bool,
}

impl Router {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Router {
            forced_hosts: config
                .forced_hosts
                .iter()
                .map(|(host, candidates)| (host.to_lowercase(), candidates.clone()))
                .collect(),
            try_order: config.try_order.clone(),
            servers: config.servers.clone(),
            dynamic_fallbacks: config.advanced.enable_dynamic_fallbacks,
            most_populated_fallbacks: config.advanced.enable_most_populated_fallbacks,
        }
    }

    pub fn server(&self, name: &str) -> Option<&ServerEntry> {
        self.servers.get(name)
    }

    /// Normalizes the hostname a client dialed: lowercased, port and
    /// trailing dot stripped, Forge's `\0FML\0` marker removed.
    pub fn clean_vhost(raw: &str) -> String {
        let host = raw.split('\0').next().unwrap_or("");
        let host = host.split(':').next().unwrap_or("");
        host.trim_end_matches('.').to_lowercase()
    }

    /// The ordered candidate list for a connection on `vhost`.
    ///
    /// Forced hosts win over the try order; dynamic fallbacks demote
    /// unreachable candidates, then the population sort reorders what is
    /// left. Both steps are stable so configured order breaks ties.
    pub fn candidates(
        &self,
        vhost: &str,
        status: &HashMap<String, ServerStatus>,
    ) -> Vec<String> {
        let list: Vec<String> = self
            .forced_hosts
            .get(vhost)
            .unwrap_or(&self.try_order)
            .clone();

        // demoted candidates must stay demoted: a dead server can still
        // carry a stale player count, so the population sort only touches
        // the reachable prefix
        let (mut alive, dead): (Vec<String>, Vec<String>) = if self.dynamic_fallbacks {
            list.into_iter()
                .partition(|name| status.get(name).map_or(true, |s| s.reachable))
        } else {
            (list, Vec::new())
        };

        if self.most_populated_fallbacks {
            alive.sort_by_key(|name| {
                std::cmp::Reverse(status.get(name).map_or(0, |s| s.players))
            });
        }

        alive.extend(dead);
        alive
    }
}
