//! Access groups.
//!
//! # Responsibilities
//! - Expand configured group entries (literal addresses, CIDR blocks) into
//!   flat, sorted address lists
//! - Verify that servers only reference groups that exist
//! - Answer "is this client in one of these groups" queries
//!
//! # Design Decisions
//! - Groups are resolved once at startup and immutable afterwards, so
//!   lookups need no locking
//! - Lookups are binary searches over `IpAddr`'s own ordering
//! - IPv4-mapped IPv6 peers are matched as their IPv4 address

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use crate::security::cidr::{self, CidrError};

/// Error type for access group resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessControlError {
    #[error("access group '{group}': {source}")]
    InvalidEntry {
        group: String,
        #[source]
        source: CidrError,
    },

    #[error("server '{server}' refers to unknown access group '{group}'")]
    UnknownGroup { server: String, group: String },
}

/// Resolved access groups.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    groups: HashMap<String, Vec<IpAddr>>,
}

impl AccessControl {
    /// Resolve raw group definitions into sorted, deduplicated address lists.
    pub fn resolve(raw: &BTreeMap<String, Vec<String>>) -> Result<Self, AccessControlError> {
        let mut groups = HashMap::with_capacity(raw.len());

        for (name, entries) in raw {
            let mut addrs = Vec::new();
            for entry in entries {
                match entry.trim().parse::<IpAddr>() {
                    Ok(ip) => addrs.push(ip.to_canonical()),
                    Err(_) => {
                        let hosts = cidr::expand(entry).map_err(|source| {
                            AccessControlError::InvalidEntry {
                                group: name.clone(),
                                source,
                            }
                        })?;
                        addrs.extend(hosts);
                    }
                }
            }

            addrs.sort_unstable();
            addrs.dedup();

            tracing::debug!(group = %name, addresses = addrs.len(), "Access group resolved");
            groups.insert(name.clone(), addrs);
        }

        Ok(Self { groups })
    }

    /// Addresses of a resolved group.
    pub fn group(&self, name: &str) -> Option<&[IpAddr]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Fail if `server` references a group that does not exist.
    pub fn ensure_groups(&self, server: &str, refs: &[String]) -> Result<(), AccessControlError> {
        match refs.iter().find(|g| !self.groups.contains_key(g.as_str())) {
            Some(group) => Err(AccessControlError::UnknownGroup {
                server: server.to_string(),
                group: group.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Returns true if `addr` is in at least one of `groups`.
    ///
    /// Unknown group names never match.
    pub fn is_allowed(&self, addr: IpAddr, groups: &[String]) -> bool {
        let addr = addr.to_canonical();
        groups.iter().any(|name| {
            self.groups
                .get(name)
                .is_some_and(|list| list.binary_search(&addr).is_ok())
        })
    }
}
