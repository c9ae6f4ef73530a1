//! Tap fan-out.
//!
//! Taps are statistics/export consumers that receive emitted records
//! independently of the main output. Each listener declares the
//! capabilities it needs from dissection and may carry its own filter,
//! compiled at registration time - a bad filter rejects the listener and
//! is reported to the caller, it never aborts a run. The union of all
//! listeners' requirements feeds the run's
//! [`Requirements`](crate::dissect::Requirements), so a tap that needs
//! the tree forces tree construction even when no print option does.

pub mod stats;

use crate::dissect::{Dissection, Requirements};
use crate::error::FilterError;
use crate::filter::{self, CompiledFilter};
use crate::frame::FrameRecord;

/// A registered consumer of dissected records.
pub trait Tap {
    /// Identifier used in reports.
    fn name(&self) -> &'static str;

    /// Capabilities this listener needs from dissection.
    fn requirements(&self) -> Requirements {
        Requirements::default()
    }

    /// Consume one emitted record.
    ///
    /// `dissection` is `Some` whenever the run materialized one; a
    /// listener that declared tree or columns requirements always gets it.
    fn consume(&mut self, frame: &FrameRecord, dissection: Option<&Dissection<'_>>);

    /// Render the final report after the run.
    fn report(&self) -> String;
}

struct TapEntry {
    tap: Box<dyn Tap>,
    filter: Option<CompiledFilter>,
}

/// Registry of tap listeners.
#[derive(Default)]
pub struct TapRegistry {
    entries: Vec<TapEntry>,
}

impl TapRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener with an optional filter expression.
    ///
    /// The filter is compiled here; a syntax error rejects the listener.
    pub fn register(
        &mut self,
        tap: Box<dyn Tap>,
        filter_expr: Option<&str>,
    ) -> Result<(), FilterError> {
        let filter = match filter_expr {
            Some(expr) => Some(filter::compile(expr)?),
            None => None,
        };
        self.entries.push(TapEntry { tap, filter });
        Ok(())
    }

    /// Union of every listener's declared requirements.
    pub fn union_requirements(&self) -> Requirements {
        self.entries
            .iter()
            .fold(Requirements::default(), |acc, entry| {
                acc.union(entry.tap.requirements())
            })
    }

    /// Whether any listener carries its own filter. Filter evaluation
    /// reads field values, so this forces tree construction.
    pub fn has_filtered(&self) -> bool {
        self.entries.iter().any(|entry| entry.filter.is_some())
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver one record to every listener whose filter matches.
    /// A listener's filter miss is not a pipeline error.
    pub fn dispatch(&mut self, frame: &FrameRecord, dissection: Option<&Dissection<'_>>) {
        for entry in &mut self.entries {
            if let Some(filter) = &entry.filter {
                match dissection {
                    Some(d) if filter.matches(frame, d) => {}
                    _ => continue,
                }
            }
            entry.tap.consume(frame, dissection);
        }
    }

    /// Collect (name, report) pairs from all listeners.
    pub fn reports(&self) -> Vec<(&'static str, String)> {
        self.entries
            .iter()
            .map(|entry| (entry.tap.name(), entry.tap.report()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTap {
        needs_tree: bool,
        seen: u64,
    }

    impl Tap for CountingTap {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn requirements(&self) -> Requirements {
            Requirements {
                tree: self.needs_tree,
                ..Requirements::default()
            }
        }

        fn consume(&mut self, _frame: &FrameRecord, _dissection: Option<&Dissection<'_>>) {
            self.seen += 1;
        }

        fn report(&self) -> String {
            format!("{} records", self.seen)
        }
    }

    #[test]
    fn test_bad_filter_rejects_listener() {
        let mut taps = TapRegistry::new();
        let result = taps.register(
            Box::new(CountingTap {
                needs_tree: false,
                seen: 0,
            }),
            Some("tcp and"),
        );
        assert!(result.is_err());
        assert!(taps.is_empty());
    }

    #[test]
    fn test_union_requirements() {
        let mut taps = TapRegistry::new();
        taps.register(
            Box::new(CountingTap {
                needs_tree: false,
                seen: 0,
            }),
            None,
        )
        .unwrap();
        assert!(!taps.union_requirements().tree);

        taps.register(
            Box::new(CountingTap {
                needs_tree: true,
                seen: 0,
            }),
            None,
        )
        .unwrap();
        assert!(taps.union_requirements().tree);
    }

    #[test]
    fn test_dispatch_with_filter() {
        use crate::dissect::test_utils::{dissect_for_test, eth_ipv4_tcp_packet};

        let mut taps = TapRegistry::new();
        taps.register(
            Box::new(CountingTap {
                needs_tree: true,
                seen: 0,
            }),
            Some("udp"),
        )
        .unwrap();
        assert!(taps.has_filtered());

        let packet = eth_ipv4_tcp_packet(1, 2);
        let dissection = dissect_for_test(&packet);
        let frame = FrameRecord::new(1, 0, packet.len() as u32, packet.len() as u32, 0);

        // TCP packet does not match the listener's "udp" filter.
        taps.dispatch(&frame, Some(&dissection));
        assert_eq!(taps.reports()[0].1, "0 records");

        // Without a dissection, a filtered listener is never invoked.
        taps.dispatch(&frame, None);
        assert_eq!(taps.reports()[0].1, "0 records");
    }
}
