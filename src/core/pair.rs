use std::fmt;

/// Canonical key for an unordered pair of users
///
/// The lower id always comes first, so `PairKey::new(a, b) == PairKey::new(b, a)`.
/// Every per-pair lock and per-pair record is keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self { low: a.to_string(), high: b.to_string() }
        } else {
            Self { low: b.to_string(), high: a.to_string() }
        }
    }

    /// Both members, lower id first
    pub fn members(&self) -> [&str; 2] {
        [&self.low, &self.high]
    }

    /// The member of the pair that is not `user_id`
    pub fn other(&self, user_id: &str) -> Option<&str> {
        if self.low == user_id {
            Some(&self.high)
        } else if self.high == user_id {
            Some(&self.low)
        } else {
            None
        }
    }

    /// True when `source` is the lower member, i.e. the edge runs low -> high
    pub fn is_forward(&self, source: &str) -> bool {
        self.low == source
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ids may contain ':' in theory; the length prefix keeps the key unambiguous
        write!(f, "{}:{}:{}", self.low.len(), self.low, self.high)
    }
}
