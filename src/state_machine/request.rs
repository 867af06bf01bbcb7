use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::status::Status;

/// Data supplied alongside a forward transition. Absent fields keep the
/// card's current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_avito: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
}

impl Payload {
    pub fn photos(urls: Vec<String>, files: Vec<String>) -> Self {
        Self {
            photo_urls: Some(urls),
            photo_files: Some(files),
            ..Default::default()
        }
    }

    pub fn ai_result(value: Value) -> Self {
        Self {
            ai_result: Some(value),
            ..Default::default()
        }
    }

    pub fn mapped_avito(value: Value) -> Self {
        Self {
            mapped_avito: Some(value),
            ..Default::default()
        }
    }

    pub fn post_url(url: impl Into<String>) -> Self {
        Self {
            post_url: Some(url.into()),
            ..Default::default()
        }
    }
}

/// An escalation away from the forward path, available from every status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Escalation {
    NeedAction { reason: String },
    Failed { errors: Vec<String> },
}

/// A requested status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionRequest {
    /// Move along the forward path (or resume from NEED_ACTION).
    Advance { target: Status, payload: Payload },
    Escalate(Escalation),
}

impl TransitionRequest {
    pub fn advance(target: Status, payload: Payload) -> Self {
        TransitionRequest::Advance { target, payload }
    }

    pub fn need_action(reason: impl Into<String>) -> Self {
        TransitionRequest::Escalate(Escalation::NeedAction {
            reason: reason.into(),
        })
    }

    pub fn failed<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TransitionRequest::Escalate(Escalation::Failed {
            errors: errors.into_iter().map(Into::into).collect(),
        })
    }

    pub fn target(&self) -> Status {
        match self {
            TransitionRequest::Advance { target, .. } => *target,
            TransitionRequest::Escalate(Escalation::NeedAction { .. }) => Status::NeedAction,
            TransitionRequest::Escalate(Escalation::Failed { .. }) => Status::Failed,
        }
    }
}

/// Flat request shape exchanged with collaborators:
/// `{target_status, payload?, reason?, errors?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionCommand {
    pub target_status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<TransitionCommand> for TransitionRequest {
    fn from(cmd: TransitionCommand) -> Self {
        match cmd.target_status {
            Status::NeedAction => TransitionRequest::need_action(cmd.reason.unwrap_or_default()),
            Status::Failed => {
                let mut errors = cmd.errors;
                if errors.is_empty() {
                    errors.extend(cmd.reason);
                }
                TransitionRequest::failed(errors)
            }
            target => TransitionRequest::advance(target, cmd.payload.unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_to_need_action_uses_reason() {
        let cmd: TransitionCommand =
            serde_json::from_value(json!({"target_status": "NEED_ACTION", "reason": "manual check"}))
                .unwrap();
        assert_eq!(
            TransitionRequest::from(cmd),
            TransitionRequest::need_action("manual check")
        );
    }

    #[test]
    fn command_to_failed_falls_back_to_reason() {
        let cmd: TransitionCommand =
            serde_json::from_value(json!({"target_status": "FAILED", "reason": "captcha loop"}))
                .unwrap();
        assert_eq!(
            TransitionRequest::from(cmd),
            TransitionRequest::failed(["captcha loop"])
        );
    }

    #[test]
    fn command_to_forward_status_carries_payload() {
        let cmd: TransitionCommand = serde_json::from_value(json!({
            "target_status": "POSTED",
            "payload": {"post_url": "https://www.avito.ru/kazan/avtomobili/1"}
        }))
        .unwrap();
        let request = TransitionRequest::from(cmd);
        assert_eq!(request.target(), Status::Posted);
        assert_eq!(
            request,
            TransitionRequest::advance(
                Status::Posted,
                Payload::post_url("https://www.avito.ru/kazan/avtomobili/1")
            )
        );
    }

    #[test]
    fn command_without_payload_is_empty_advance() {
        let cmd: TransitionCommand =
            serde_json::from_value(json!({"target_status": "NEW"})).unwrap();
        assert_eq!(
            TransitionRequest::from(cmd),
            TransitionRequest::advance(Status::New, Payload::default())
        );
    }
}
