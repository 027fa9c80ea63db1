// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    ActOutcome, Conversation, EdgeKind, Intent, MatchEvent, MatchRecord, Message, MessageKind,
    NewMessage, Profile, RelationshipEdge, ScoredCandidate, Year,
};
pub use requests::{ActionRequest, BlockRequest, CandidatesQuery, SendMessageRequest};
pub use responses::{ActionResponse, CandidatesResponse, ErrorResponse, HealthResponse, StatusResponse};
