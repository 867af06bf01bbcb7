use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::card::{CarCard, StatusChange, entry_timestamp};
use super::guard::TransitionGuard;
use super::request::{Escalation, TransitionRequest};
use super::status::Status;
use crate::error::TransitionError;

/// The outcome of a transition request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// The card now sits in `to`, with one new log entry.
    Applied { from: Status, to: Status },
    /// The card is unchanged.
    Rejected(TransitionError),
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionResult::Applied { .. })
    }

    pub fn into_result(self) -> Result<(Status, Status), TransitionError> {
        match self {
            TransitionResult::Applied { from, to } => Ok((from, to)),
            TransitionResult::Rejected(err) => Err(err),
        }
    }
}

/// Drives a `CarCard` through the lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Runs the guard and, if it accepts, applies the whole change at once:
    /// status, payload fields, one log entry and any error entries.
    pub fn transition(card: &mut CarCard, request: TransitionRequest) -> TransitionResult {
        Self::transition_at(card, request, Utc::now())
    }

    pub fn transition_at(
        card: &mut CarCard,
        request: TransitionRequest,
        at: DateTime<Utc>,
    ) -> TransitionResult {
        let from = card.status();
        let to = request.target();

        let verdict = match TransitionGuard::check(card, &request) {
            Ok(verdict) => verdict,
            Err(err) => {
                debug!(card_id = %card.id(), %from, %to, error = %err, "transition rejected");
                return TransitionResult::Rejected(err);
            }
        };
        for finding in &verdict.warnings {
            warn!(card_id = %card.id(), %from, %to, %finding, "advisory finding");
        }

        let stamp = entry_timestamp(at);
        let mut log_entry = format!("{stamp}: transitioned {from}→{to}");
        let mut change = StatusChange {
            to,
            photo_urls: None,
            photo_files: None,
            ai_result: None,
            mapped_avito: None,
            post_url: None,
            log_entry: String::new(),
            error_entries: Vec::new(),
            at,
        };

        match request {
            TransitionRequest::Advance { payload, .. } => {
                change.photo_urls = payload.photo_urls;
                change.photo_files = payload.photo_files;
                change.ai_result = payload.ai_result;
                change.mapped_avito = payload.mapped_avito;
                change.post_url = payload.post_url;
            }
            TransitionRequest::Escalate(Escalation::NeedAction { reason }) => {
                log_entry.push_str(&format!(": {}", reason.trim()));
            }
            TransitionRequest::Escalate(Escalation::Failed { errors }) => {
                change.error_entries = errors
                    .iter()
                    .map(|e| e.trim())
                    .filter(|e| !e.is_empty())
                    .map(|e| format!("{stamp}: {e}"))
                    .collect();
            }
        }
        if let Some(url) = card.post_url().filter(|_| to != Status::Posted) {
            log_entry.push_str(&format!(" (cleared post_url {url})"));
        }
        change.log_entry = log_entry;

        card.apply_transition(change);
        info!(card_id = %card.id(), batch_id = %card.batch_id(), %from, %to, "transition applied");
        TransitionResult::Applied { from, to }
    }
}
