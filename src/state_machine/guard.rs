use serde_json::Value;
use url::Url;

use super::card::CarCard;
use super::request::{Escalation, Payload, TransitionRequest};
use super::status::Status;
use crate::error::TransitionError;
use crate::schema::{ValidationError, ValidationResult, validate_ai_result, validate_avito_mapping};

/// How a permitted request relates to the edge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// One step along the forward path.
    Forward,
    /// Leaving NEED_ACTION back onto the forward path.
    Resume,
    /// NEED_ACTION or FAILED, reachable from every status.
    Escalation,
}

/// A request the guard accepted, with any advisory findings attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub edge: EdgeKind,
    pub warnings: Vec<ValidationError>,
}

/// Decides whether a card may move to the requested status.
///
/// Pure: reads the card and the request, never mutates either.
pub struct TransitionGuard;

impl TransitionGuard {
    pub const FORWARD_EDGES: [(Status, Status); 4] = [
        (Status::New, Status::PhotosReady),
        (Status::PhotosReady, Status::AiReady),
        (Status::AiReady, Status::ReadyToPost),
        (Status::ReadyToPost, Status::Posted),
    ];

    /// Looks up the edge for a non-escalation move.
    pub fn edge(from: Status, to: Status) -> Option<EdgeKind> {
        if Self::FORWARD_EDGES.contains(&(from, to)) {
            Some(EdgeKind::Forward)
        } else if from == Status::NeedAction && to.at_least(Status::PhotosReady) {
            Some(EdgeKind::Resume)
        } else {
            None
        }
    }

    /// Evaluates a request against the card's current data plus the payload.
    ///
    /// Every requirement up to the target stage is re-checked against the
    /// prospective data, so resumption from NEED_ACTION re-validates from
    /// scratch and a payload cannot swap earlier-stage data for invalid data.
    pub fn check(card: &CarCard, request: &TransitionRequest) -> Result<Verdict, TransitionError> {
        let from = card.status();
        match request {
            TransitionRequest::Escalate(escalation) => {
                Self::check_escalation(escalation)?;
                Ok(Verdict {
                    edge: EdgeKind::Escalation,
                    warnings: Vec::new(),
                })
            }
            TransitionRequest::Advance { target, payload } => {
                let to = *target;
                let edge =
                    Self::edge(from, to).ok_or(TransitionError::InvalidTransition { from, to })?;

                let mut findings = unexpected_fields(payload, to);
                findings.extend(stage_requirements(card, payload, to));

                match ValidationResult::from_findings(findings) {
                    ValidationResult::Valid { warnings } => Ok(Verdict { edge, warnings }),
                    ValidationResult::Invalid { errors, .. } => Err(TransitionError::GuardFailed {
                        from,
                        to,
                        violations: errors,
                    }),
                }
            }
        }
    }

    fn check_escalation(escalation: &Escalation) -> Result<(), TransitionError> {
        match escalation {
            Escalation::NeedAction { reason } if reason.trim().is_empty() => {
                Err(TransitionError::MissingField {
                    field: "reason".into(),
                    to: Status::NeedAction,
                })
            }
            Escalation::Failed { errors } if errors.iter().all(|e| e.trim().is_empty()) => {
                Err(TransitionError::MissingField {
                    field: "errors".into(),
                    to: Status::Failed,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Returns the violation for a post URL that is not an absolute http(s) URL.
pub(crate) fn post_url_violation(url: &str) -> Option<ValidationError> {
    if url.trim().is_empty() {
        return Some(ValidationError::missing("post_url"));
    }
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => None,
        _ => Some(ValidationError::TypeMismatch {
            field: "post_url".into(),
            expected: "http(s) URL".into(),
            found: "string".into(),
        }),
    }
}

// Payload data belonging to a stage beyond the target.
fn unexpected_fields(payload: &Payload, to: Status) -> Vec<ValidationError> {
    let supplied = [
        ("photo_urls", payload.photo_urls.is_some(), Status::PhotosReady),
        ("photo_files", payload.photo_files.is_some(), Status::PhotosReady),
        ("ai_result", payload.ai_result.is_some(), Status::AiReady),
        ("mapped_avito", payload.mapped_avito.is_some(), Status::ReadyToPost),
        ("post_url", payload.post_url.is_some(), Status::Posted),
    ];
    supplied
        .into_iter()
        .filter(|(_, present, stage)| *present && !to.at_least(*stage))
        .map(|(field, _, _)| ValidationError::UnexpectedField {
            field: field.into(),
            target: to.to_string(),
        })
        .collect()
}

fn stage_requirements(card: &CarCard, payload: &Payload, to: Status) -> Vec<ValidationError> {
    let mut findings = Vec::new();

    if to.at_least(Status::PhotosReady) {
        let urls = payload.photo_urls.as_deref().unwrap_or(card.photo_urls());
        if urls.iter().all(|u| u.trim().is_empty()) {
            findings.push(ValidationError::missing("photo_urls"));
        }
    }
    if to.at_least(Status::AiReady) {
        let ai_result = payload.ai_result.as_ref().or(card.ai_result());
        findings.extend(validated("ai_result", ai_result, validate_ai_result));
    }
    if to.at_least(Status::ReadyToPost) {
        let mapped = payload.mapped_avito.as_ref().or(card.mapped_avito());
        findings.extend(validated("mapped_avito", mapped, validate_avito_mapping));
    }
    if to == Status::Posted {
        let url = payload.post_url.as_deref().or(card.post_url()).unwrap_or("");
        findings.extend(post_url_violation(url));
    }
    findings
}

fn validated(
    field: &str,
    value: Option<&Value>,
    validate: fn(&Value) -> ValidationResult,
) -> Vec<ValidationError> {
    let Some(value) = value else {
        return vec![ValidationError::missing(field)];
    };
    match validate(value) {
        ValidationResult::Valid { warnings } => warnings,
        ValidationResult::Invalid {
            mut errors,
            warnings,
        } => {
            errors.extend(warnings);
            errors
        }
    }
}
