use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::guard::post_url_violation;
use super::status::Status;
use crate::schema::{validate_ai_result, validate_avito_mapping};

pub type CardId = String;

/// Formats the timestamp prefix used by log and error entries.
pub fn entry_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The lifecycle record of one vehicle listing.
///
/// Fields are private: the only mutation path is [`CarCard::apply_transition`],
/// which the state machine calls after the guard has accepted a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarCard {
    id: CardId,
    batch_id: String,
    status: Status,
    #[serde(default)]
    photo_urls: Vec<String>,
    #[serde(default)]
    photo_files: Vec<String>,
    template_id: String,
    #[serde(default)]
    ai_result: Option<Value>,
    #[serde(default)]
    mapped_avito: Option<Value>,
    #[serde(default)]
    profile_id: String,
    #[serde(default)]
    post_url: Option<String>,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// A fully decided status change, applied to a card in one step.
#[derive(Debug, Clone)]
pub(crate) struct StatusChange {
    pub to: Status,
    pub photo_urls: Option<Vec<String>>,
    pub photo_files: Option<Vec<String>>,
    pub ai_result: Option<Value>,
    pub mapped_avito: Option<Value>,
    /// Only kept when `to` is POSTED.
    pub post_url: Option<String>,
    pub log_entry: String,
    pub error_entries: Vec<String>,
    pub at: DateTime<Utc>,
}

impl CarCard {
    pub fn new(
        batch_id: impl Into<String>,
        template_id: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        Self::new_at(batch_id, template_id, profile_id, Utc::now())
    }

    pub fn new_at(
        batch_id: impl Into<String>,
        template_id: impl Into<String>,
        profile_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.into(),
            status: Status::New,
            photo_urls: Vec::new(),
            photo_files: Vec::new(),
            template_id: template_id.into(),
            ai_result: None,
            mapped_avito: None,
            profile_id: profile_id.into(),
            post_url: None,
            logs: vec![format!("{}: card created", entry_timestamp(at))],
            errors: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn photo_urls(&self) -> &[String] {
        &self.photo_urls
    }

    pub fn photo_files(&self) -> &[String] {
        &self.photo_files
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn ai_result(&self) -> Option<&Value> {
        self.ai_result.as_ref()
    }

    pub fn mapped_avito(&self) -> Option<&Value> {
        self.mapped_avito.as_ref()
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn post_url(&self) -> Option<&str> {
        self.post_url.as_deref()
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub(crate) fn apply_transition(&mut self, change: StatusChange) {
        if let Some(urls) = change.photo_urls {
            self.photo_urls = urls;
        }
        if let Some(files) = change.photo_files {
            self.photo_files = files;
        }
        if let Some(ai_result) = change.ai_result {
            self.ai_result = Some(ai_result);
        }
        if let Some(mapped) = change.mapped_avito {
            self.mapped_avito = Some(mapped);
        }
        self.post_url = if change.to == Status::Posted {
            change.post_url
        } else {
            None
        };
        self.status = change.to;
        self.logs.push(change.log_entry);
        self.errors.extend(change.error_entries);
        self.updated_at = change.at;
    }

    /// Lists every lifecycle invariant this record breaks. Used to refuse
    /// persisted records that were edited outside the state machine.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let status = self.status;

        match (&self.post_url, status) {
            (Some(url), Status::Posted) => {
                if let Some(violation) = post_url_violation(url) {
                    problems.push(violation.to_string());
                }
            }
            (None, Status::Posted) => problems.push("POSTED card has no post_url".into()),
            (Some(_), other) => problems.push(format!("{other} card carries a post_url")),
            (None, _) => {}
        }

        if status.at_least(Status::PhotosReady)
            && self.photo_urls.iter().all(|u| u.trim().is_empty())
        {
            problems.push(format!("{status} card has no photo_urls"));
        }
        if status.at_least(Status::AiReady) {
            match &self.ai_result {
                None => problems.push(format!("{status} card has no ai_result")),
                Some(value) => {
                    for err in validate_ai_result(value).errors() {
                        problems.push(format!("ai_result {err}"));
                    }
                }
            }
        }
        if status.at_least(Status::ReadyToPost) {
            match &self.mapped_avito {
                None => problems.push(format!("{status} card has no mapped_avito")),
                Some(value) => {
                    for err in validate_avito_mapping(value).errors() {
                        problems.push(format!("mapped_avito {err}"));
                    }
                }
            }
        }
        if status == Status::Failed && self.errors.is_empty() {
            problems.push("FAILED card has no error entries".into());
        }
        if self.logs.is_empty() {
            problems.push("card has no log entries".into());
        }
        problems
    }
}
