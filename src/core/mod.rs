// Core engine exports
pub mod delivery;
pub mod engine;
pub mod pair;
pub mod scoring;
pub mod selector;
pub mod store;

pub use delivery::{ConnectionHandle, DeliveryHub, DeliveryStatus, LiveConnection, ServerEvent};
pub use engine::{EngineLimits, MatchEngine};
pub use pair::PairKey;
pub use scoring::compatibility_score;
pub use selector::{is_eligible, CandidateSelector};
pub use store::{BlockOutcome, MessageStore, RelationshipStore, Transition};
