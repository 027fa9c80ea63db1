//! Campus Match - relationship and messaging engine for a campus dating service
//!
//! This library holds the like/dislike/block/match state machine, the
//! compatibility scoring used to rank candidates, and the message store with
//! best-effort live delivery. The `campus-match` binary serves it over HTTP.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{compatibility_score, CandidateSelector, DeliveryHub, EngineLimits, MatchEngine};
pub use error::{EngineError, Result};
pub use models::{Conversation, Intent, MatchRecord, Message, MessageKind, Profile, ScoredCandidate, Year};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        assert_eq!(Year::Graduate.ordinal(), 4);
        assert_eq!(EngineLimits::default().max_message_chars, 2000);
    }
}
