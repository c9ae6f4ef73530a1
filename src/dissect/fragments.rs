//! Fragment bookkeeping for cross-record dependency discovery.
//!
//! Dissectors that recognize a fragment report the prior frames of the
//! same datagram as dependencies and return a [`FragmentObservation`];
//! the orchestrator commits the observation after the dissection returns.
//! Keeping the ledger write on the orchestrator side keeps dissection a
//! pure function of (bytes, context), which two-pass re-dissection
//! requires for determinism.

use std::collections::HashMap;
use std::net::IpAddr;

/// Identity of a fragmented datagram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    /// Source address
    pub src: IpAddr,
    /// Destination address
    pub dst: IpAddr,
    /// Datagram identification field
    pub id: u16,
    /// Payload protocol number
    pub protocol: u8,
}

/// One fragment sighting, returned by a dissector for the orchestrator
/// to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentObservation {
    /// Datagram this fragment belongs to
    pub key: FragmentKey,
    /// Fragment offset in 8-byte units
    pub offset: u16,
    /// Whether more fragments follow
    pub more_fragments: bool,
}

/// Frames observed per fragmented datagram, in read order.
#[derive(Debug, Default)]
pub struct FragmentLedger {
    entries: HashMap<FragmentKey, Vec<u64>>,
}

impl FragmentLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `frame` carried a fragment of `key`'s datagram.
    pub fn observe(&mut self, key: FragmentKey, frame: u64) {
        self.entries.entry(key).or_default().push(frame);
    }

    /// Frames seen so far for this datagram, in read order.
    pub fn frames(&self, key: &FragmentKey) -> &[u64] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Forget everything. The replay pass rebuilds the ledger in walk
    /// order so re-dissection sees the same prior-frame state as pass 1.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key(id: u16) -> FragmentKey {
        FragmentKey {
            src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            id,
            protocol: 17,
        }
    }

    #[test]
    fn test_observe_and_lookup() {
        let mut ledger = FragmentLedger::new();
        assert!(ledger.frames(&key(1)).is_empty());

        ledger.observe(key(1), 3);
        ledger.observe(key(1), 5);
        ledger.observe(key(2), 4);

        assert_eq!(ledger.frames(&key(1)), &[3, 5]);
        assert_eq!(ledger.frames(&key(2)), &[4]);
    }

    #[test]
    fn test_clear() {
        let mut ledger = FragmentLedger::new();
        ledger.observe(key(1), 1);
        ledger.clear();
        assert!(ledger.frames(&key(1)).is_empty());
    }
}
