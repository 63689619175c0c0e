//! Upstream selection per virtual server.
//!
//! # Responsibilities
//! - Turn a server's resolved upstreams into a forwarding target
//! - Express fractional weights with the integer-only weighted set
//!
//! # Design Decisions
//! - One upstream never goes through a balancer
//! - Weights are scaled by the smallest power of ten (up to 1000) that
//!   makes every weight whole
//! - The first upstream whose weight has both a whole part and a fraction is
//!   split: its own entry keeps the whole part and an auxiliary listener
//!   relaying to it carries the fraction. A set therefore holds N or N+1
//!   entries.
//! - A weight never scales below 1, and repeated addresses keep separate
//!   entries, so no upstream disappears from the set

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::load_balancer::auxiliary::AuxiliaryListener;
use crate::load_balancer::weighted::WeightedUpstreamSet;

const SCALES: [u32; 4] = [1, 10, 100, 1000];

/// An upstream after DNS resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedUpstream {
    pub addr: SocketAddr,
    pub weight: f64,
}

/// Where forwarded requests of one server go.
#[derive(Debug, Clone)]
pub enum UpstreamTarget {
    /// Single upstream, no balancing.
    Direct(SocketAddr),
    /// Several upstreams behind the weighted set.
    Weighted(Arc<WeightedUpstreamSet>),
}

impl UpstreamTarget {
    /// Address for the next forwarded request.
    pub fn next(&self) -> Option<SocketAddr> {
        match self {
            UpstreamTarget::Direct(addr) => Some(*addr),
            UpstreamTarget::Weighted(set) => set.next(),
        }
    }
}

/// Result of selecting upstreams for one server.
#[derive(Debug, Default)]
pub struct UpstreamSelection {
    /// `None` when the server has no upstreams.
    pub target: Option<UpstreamTarget>,
    /// Listeners that must be served for the weighted set to work.
    pub auxiliaries: Vec<AuxiliaryListener>,
}

/// Build the forwarding target for `server`.
pub fn select(server: &str, upstreams: &[ResolvedUpstream]) -> io::Result<UpstreamSelection> {
    match upstreams {
        [] => Ok(UpstreamSelection::default()),
        [only] => Ok(UpstreamSelection {
            target: Some(UpstreamTarget::Direct(only.addr)),
            auxiliaries: Vec::new(),
        }),
        _ => weighted(server, upstreams),
    }
}

fn weighted(server: &str, upstreams: &[ResolvedUpstream]) -> io::Result<UpstreamSelection> {
    let scale = SCALES
        .into_iter()
        .find(|&s| upstreams.iter().all(|u| is_whole(u.weight * f64::from(s))))
        .unwrap_or(SCALES[SCALES.len() - 1]);

    let split = if scale == 1 {
        None
    } else {
        upstreams
            .iter()
            .position(|u| u.weight.trunc() >= 1.0 && !is_whole(u.weight))
    };

    let mut pairs = Vec::with_capacity(upstreams.len() + 1);
    let mut auxiliaries = Vec::new();

    for (i, upstream) in upstreams.iter().enumerate() {
        let scaled = ((upstream.weight * f64::from(scale)).round() as u32).max(1);

        if split != Some(i) {
            pairs.push((upstream.addr, scaled));
            continue;
        }

        let whole = upstream.weight.trunc() as u32 * scale;
        let fraction = scaled.saturating_sub(whole);
        pairs.push((upstream.addr, whole));

        if fraction > 0 {
            let aux = AuxiliaryListener::bind(upstream.addr)?;
            tracing::info!(
                server = %server,
                upstream = %upstream.addr,
                auxiliary = %aux.local_addr(),
                weight = whole,
                auxiliary_weight = fraction,
                "Fractional weight split through auxiliary listener"
            );
            pairs.push((aux.local_addr(), fraction));
            auxiliaries.push(aux);
        }
    }

    let set = WeightedUpstreamSet::new(pairs);
    tracing::debug!(
        server = %server,
        entries = set.len(),
        total_weight = set.total_weight(),
        "Weighted upstream set built"
    );

    Ok(UpstreamSelection {
        target: Some(UpstreamTarget::Weighted(Arc::new(set))),
        auxiliaries,
    })
}

fn is_whole(x: f64) -> bool {
    (x - x.round()).abs() < 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn up(port: u16, weight: f64) -> ResolvedUpstream {
        ResolvedUpstream {
            addr: SocketAddr::from(([10, 0, 0, 1], port)),
            weight,
        }
    }

    fn set(selection: &UpstreamSelection) -> &WeightedUpstreamSet {
        match selection.target.as_ref().unwrap() {
            UpstreamTarget::Weighted(set) => set.as_ref(),
            UpstreamTarget::Direct(addr) => panic!("expected weighted set, got {addr}"),
        }
    }

    #[test]
    fn test_no_upstreams_no_target() {
        let selection = select("s", &[]).unwrap();
        assert!(selection.target.is_none());
    }

    #[test]
    fn test_single_upstream_is_direct() {
        let selection = select("s", &[up(3000, 2.5)]).unwrap();
        assert!(matches!(
            selection.target,
            Some(UpstreamTarget::Direct(addr)) if addr == up(3000, 1.0).addr
        ));
        assert!(selection.auxiliaries.is_empty());
    }

    #[test]
    fn test_integer_weights_are_used_as_is() {
        let selection = select("s", &[up(3000, 3.0), up(3001, 1.0)]).unwrap();
        let set = set(&selection);
        assert_eq!(set.weights(), &[(up(3000, 0.0).addr, 3), (up(3001, 0.0).addr, 1)]);
        assert!(selection.auxiliaries.is_empty());
    }

    #[test]
    fn test_fractional_weight_synthesizes_auxiliary_listener() {
        let selection = select("s", &[up(3000, 1.5), up(3001, 1.0)]).unwrap();
        let set = set(&selection);

        assert_eq!(set.len(), 3);
        assert_eq!(selection.auxiliaries.len(), 1);

        let aux = &selection.auxiliaries[0];
        assert_eq!(aux.target(), up(3000, 0.0).addr);
        assert!(aux.local_addr().ip().is_loopback());

        assert_eq!(set.weight_of(up(3000, 0.0).addr), Some(10));
        assert_eq!(set.weight_of(aux.local_addr()), Some(5));
        assert_eq!(set.weight_of(up(3001, 0.0).addr), Some(10));
    }

    #[test]
    fn test_sub_unit_weights_are_scaled_without_auxiliary() {
        let selection = select("s", &[up(3000, 0.5), up(3001, 1.0)]).unwrap();
        let set = set(&selection);
        assert_eq!(set.len(), 2);
        assert!(selection.auxiliaries.is_empty());
        assert_eq!(set.weight_of(up(3000, 0.0).addr), Some(5));
        assert_eq!(set.weight_of(up(3001, 0.0).addr), Some(10));
    }

    #[test]
    fn test_traffic_split_follows_configured_ratio() {
        let selection = select("s", &[up(3000, 2.25), up(3001, 0.75)]).unwrap();
        let set = set(&selection);
        let aux = selection.auxiliaries[0].local_addr();

        let mut first = 0;
        let mut second = 0;
        for _ in 0..set.total_weight() {
            let picked = set.next().unwrap();
            if picked == up(3000, 0.0).addr || picked == aux {
                first += 1;
            } else {
                second += 1;
            }
        }
        assert_eq!(first * 75, second * 225);
    }

    #[test]
    fn test_tiny_weights_keep_their_entry() {
        let selection = select("s", &[up(3000, 0.0004), up(3001, 0.0004)]).unwrap();
        let set = set(&selection);
        assert_eq!(set.len(), 2);
        assert!(set.next().is_some());

        let selection = select("s", &[up(3000, 1.0), up(3001, 0.0004)]).unwrap();
        let set = self::set(&selection);
        assert_eq!(set.len(), 2);
        assert_eq!(set.weight_of(up(3000, 0.0).addr), Some(1000));
        assert_eq!(set.weight_of(up(3001, 0.0).addr), Some(1));
    }

    #[test]
    fn test_duplicate_upstream_addresses() {
        let selection = select("s", &[up(3000, 1.0), up(3000, 2.0)]).unwrap();
        let set = set(&selection);
        assert_eq!(set.len(), 2);
        assert_eq!(set.weight_of(up(3000, 0.0).addr), Some(3));
    }

    #[test]
    fn test_entry_count_is_n_or_n_plus_one() {
        for weights in [[1.0, 2.0, 3.0], [1.5, 2.5, 1.0], [0.1, 0.2, 0.3], [2.0, 1.25, 0.5]] {
            let ups: Vec<_> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| up(4000 + i as u16, *w))
                .collect();
            let selection = select("s", &ups).unwrap();
            let expected = ups.len() + selection.auxiliaries.len();
            assert_eq!(set(&selection).len(), expected);
            assert!(selection.auxiliaries.len() <= 1);
        }
    }
}
