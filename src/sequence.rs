use log::warn;

/// Non-fatal discontinuity in the 16-bit sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: u16,
    pub received: u16,
    /// `(received - expected) mod 65536`
    pub missing: u16,
}

/// Tracks the rolling sequence number of accepted batches.
///
/// Delivery is best-effort: a gap is reported but the batch is always
/// accepted and becomes the new reference point.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u16>,
    gaps: u64,
    missing: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, seq: u16) -> Option<SequenceGap> {
        let gap = match self.last {
            None => None,
            Some(last) => {
                let expected = last.wrapping_add(1);
                if seq == expected {
                    None
                } else {
                    Some(SequenceGap {
                        expected,
                        received: seq,
                        missing: seq.wrapping_sub(expected),
                    })
                }
            }
        };

        if let Some(g) = gap {
            self.gaps += 1;
            self.missing += g.missing as u64;
            warn!("[Seq] gap/reorder: expected={} received={} missing={}",
                  g.expected, g.received, g.missing);
        }

        self.last = Some(seq);
        gap
    }

    pub fn last(&self) -> Option<u16> {
        self.last
    }

    pub fn gap_count(&self) -> u64 {
        self.gaps
    }

    pub fn missing_count(&self) -> u64 {
        self.missing
    }
}
