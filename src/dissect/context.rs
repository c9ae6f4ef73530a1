//! Dissection context and per-layer result types.

use smallvec::SmallVec;

use super::fragments::{FragmentLedger, FragmentObservation};
use super::FieldValue;

/// Field entry for layer results: (field_name, value).
/// Field names are always static strings (dissector-defined).
pub type FieldEntry<'data> = (&'static str, FieldValue<'data>);

/// Hint entry for child dissector selection: (hint_name, value).
pub type HintEntry = (&'static str, u64);

/// Context passed down the dissection chain.
///
/// Carries everything a dissector may consult and nothing it may mutate:
/// dissection is a pure function of (bytes, context), and all shared-state
/// commits happen in the orchestrator.
pub struct DissectContext<'run> {
    /// Link type from the capture header (e.g., 1 = Ethernet).
    pub link_type: u16,

    /// Number of the frame being dissected.
    pub frame_number: u64,

    /// Parent dissector that identified this layer.
    pub parent: Option<&'static str>,

    /// Protocol-specific hints (e.g., ethertype, IP protocol number).
    pub hints: SmallVec<[HintEntry; 4]>,

    /// Offset into the record where this layer's data starts.
    pub offset: usize,

    /// Read-only view of fragments observed in earlier frames.
    pub fragments: &'run FragmentLedger,
}

impl<'run> DissectContext<'run> {
    /// Create a context for the start of a record.
    pub fn new(link_type: u16, frame_number: u64, fragments: &'run FragmentLedger) -> Self {
        Self {
            link_type,
            frame_number,
            parent: None,
            hints: SmallVec::new(),
            offset: 0,
            fragments,
        }
    }

    /// Get a hint value by key (linear search, N is small).
    #[inline]
    pub fn hint(&self, key: &str) -> Option<u64> {
        self.hints.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Insert a hint value.
    #[inline]
    pub fn insert_hint(&mut self, key: &'static str, value: u64) {
        self.hints.push((key, value));
    }

    /// Check if we're at the start of the record (no parent layer).
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Error reported by a dissector for one layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    /// Malformed or truncated content: recorded as an annotation on the
    /// record, dissection of this record stops, the pipeline continues.
    Malformed(String),
    /// The dissector could not obtain memory. Fatal to the run.
    ResourceExhausted,
}

/// Result of dissecting one protocol layer.
///
/// Uses SmallVec for inline storage; most layers have <16 fields and
/// <4 child hints. The lifetime parameter ties field values to the record
/// bytes for zero-copy dissection.
#[derive(Debug, Clone)]
pub struct LayerResult<'data> {
    /// Extracted field values.
    pub fields: SmallVec<[FieldEntry<'data>; 16]>,

    /// Remaining unparsed bytes (payload for the next layer).
    pub remaining: &'data [u8],

    /// Hints for child dissector selection.
    pub child_hints: SmallVec<[HintEntry; 4]>,

    /// Error if partial dissection occurred.
    pub error: Option<LayerError>,

    /// Frames this record's interpretation depends on, discovered while
    /// dissecting (e.g., earlier fragments of the same datagram).
    pub depends_on: SmallVec<[u64; 2]>,

    /// Fragment observation for the orchestrator to commit after the
    /// dissection returns. Dissectors never write the ledger themselves.
    pub fragment: Option<FragmentObservation>,
}

impl<'data> LayerResult<'data> {
    /// Create a successful layer result.
    pub fn success(
        fields: SmallVec<[FieldEntry<'data>; 16]>,
        remaining: &'data [u8],
        child_hints: SmallVec<[HintEntry; 4]>,
    ) -> Self {
        Self {
            fields,
            remaining,
            child_hints,
            error: None,
            depends_on: SmallVec::new(),
            fragment: None,
        }
    }

    /// Create a malformed-layer result.
    pub fn malformed(message: String, remaining: &'data [u8]) -> Self {
        Self {
            fields: SmallVec::new(),
            remaining,
            child_hints: SmallVec::new(),
            error: Some(LayerError::Malformed(message)),
            depends_on: SmallVec::new(),
            fragment: None,
        }
    }

    /// Get a field value by name (linear search, N is small).
    pub fn get(&self, name: &str) -> Option<&FieldValue<'data>> {
        self.fields.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// Get a child hint value by name.
    pub fn hint(&self, name: &str) -> Option<u64> {
        self.child_hints
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
    }

    /// Check if dissection of this layer was successful.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_context_hint_access() {
        let ledger = FragmentLedger::new();
        let mut ctx = DissectContext::new(1, 7, &ledger);
        assert!(ctx.is_root());

        ctx.insert_hint("ip_protocol", 6);
        ctx.insert_hint("dst_port", 80);

        assert_eq!(ctx.hint("ip_protocol"), Some(6));
        assert_eq!(ctx.hint("dst_port"), Some(80));
        assert_eq!(ctx.hint("nonexistent"), None);
    }

    #[test]
    fn test_layer_result_success() {
        let fields: SmallVec<[FieldEntry; 16]> = smallvec![("src_port", FieldValue::UInt16(80))];
        let hints: SmallVec<[HintEntry; 4]> = smallvec![("transport", 6u64)];

        let result = LayerResult::success(fields, &[], hints);

        assert!(result.is_ok());
        assert_eq!(result.get("src_port"), Some(&FieldValue::UInt16(80)));
        assert_eq!(result.hint("transport"), Some(6));
        assert!(result.depends_on.is_empty());
    }

    #[test]
    fn test_layer_result_malformed() {
        let result = LayerResult::malformed("too short".to_string(), &[1, 2, 3]);

        assert!(!result.is_ok());
        assert_eq!(
            result.error,
            Some(LayerError::Malformed("too short".to_string()))
        );
        assert_eq!(result.remaining, &[1, 2, 3]);
    }
}
