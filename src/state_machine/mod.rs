mod card;
mod engine;
mod guard;
mod request;
mod status;

pub use card::{CarCard, CardId, entry_timestamp};
pub use engine::{StateMachine, TransitionResult};
pub use guard::{EdgeKind, TransitionGuard, Verdict};
pub use request::{Escalation, Payload, TransitionCommand, TransitionRequest};
pub use status::Status;

#[cfg(test)]
pub(crate) use guard::tests::card_at;
