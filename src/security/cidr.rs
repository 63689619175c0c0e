//! CIDR block expansion.
//!
//! Blocks are expanded into the literal host addresses they contain so that
//! group membership is a binary search over a sorted list.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Blocks with more host bits than this are refused.
pub const MAX_HOST_BITS: u32 = 24;

/// Error type for CIDR parsing and expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("'{0}' is neither an IP address nor a CIDR block")]
    Invalid(String),

    #[error("CIDR block '{0}' is too large to expand (more than 2^24 addresses)")]
    TooLarge(String),
}

/// Expand a CIDR block (`addr/prefix`) into its usable host addresses.
///
/// Every address from the network address to the broadcast address is
/// enumerated. Blocks holding at most two addresses (`/31`, `/32`, `/127`,
/// `/128`) are returned whole; larger blocks lose their first (network) and
/// last (broadcast) address.
pub fn expand(block: &str) -> Result<Vec<IpAddr>, CidrError> {
    let invalid = || CidrError::Invalid(block.to_string());

    let (addr, prefix) = block.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
    let prefix: u32 = prefix.trim().parse().map_err(|_| invalid())?;

    let width = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > width {
        return Err(invalid());
    }

    let host_bits = width - prefix;
    if host_bits > MAX_HOST_BITS {
        return Err(CidrError::TooLarge(block.to_string()));
    }

    let mut hosts = match addr {
        IpAddr::V4(v4) => {
            let mask = if prefix == 0 { 0 } else { u32::MAX << host_bits };
            let network = u32::from(v4) & mask;
            let broadcast = network | !mask;
            (network..=broadcast)
                .map(|raw| IpAddr::V4(Ipv4Addr::from(raw)))
                .collect::<Vec<_>>()
        }
        IpAddr::V6(v6) => {
            let mask = if prefix == 0 { 0 } else { u128::MAX << host_bits };
            let network = u128::from(v6) & mask;
            let broadcast = network | !mask;
            (network..=broadcast)
                .map(|raw| IpAddr::V6(Ipv6Addr::from(raw)))
                .collect::<Vec<_>>()
        }
    };

    if hosts.len() <= 2 {
        return Ok(hosts);
    }

    hosts.pop();
    hosts.remove(0);
    Ok(hosts)
}
