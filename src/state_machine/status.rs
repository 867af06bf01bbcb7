use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a car card.
///
/// The forward path is NEW → PHOTOS_READY → AI_READY → READY_TO_POST → POSTED.
/// NEED_ACTION and FAILED sit beside it and are reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    New,
    PhotosReady,
    AiReady,
    ReadyToPost,
    Posted,
    NeedAction,
    Failed,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::New,
        Status::PhotosReady,
        Status::AiReady,
        Status::ReadyToPost,
        Status::Posted,
        Status::NeedAction,
        Status::Failed,
    ];

    /// Position on the forward path, `None` for the side states.
    pub fn stage(&self) -> Option<u8> {
        match self {
            Status::New => Some(0),
            Status::PhotosReady => Some(1),
            Status::AiReady => Some(2),
            Status::ReadyToPost => Some(3),
            Status::Posted => Some(4),
            Status::NeedAction | Status::Failed => None,
        }
    }

    /// True once the card has reached `other` on the forward path.
    pub fn at_least(&self, other: Status) -> bool {
        match (self.stage(), other.stage()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "NEW",
            Status::PhotosReady => "PHOTOS_READY",
            Status::AiReady => "AI_READY",
            Status::ReadyToPost => "READY_TO_POST",
            Status::Posted => "POSTED",
            Status::NeedAction => "NEED_ACTION",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_matches_wire_name() {
        for status in Status::ALL {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire.as_str().unwrap(), status.to_string());
        }
        assert_eq!(Status::ReadyToPost.to_string(), "READY_TO_POST");
    }

    #[test]
    fn side_states_have_no_stage() {
        assert_eq!(Status::NeedAction.stage(), None);
        assert_eq!(Status::Failed.stage(), None);
        assert!(!Status::NeedAction.at_least(Status::New));
    }

    #[test]
    fn forward_path_is_ordered() {
        assert!(Status::Posted.at_least(Status::AiReady));
        assert!(Status::AiReady.at_least(Status::AiReady));
        assert!(!Status::PhotosReady.at_least(Status::AiReady));
    }
}
