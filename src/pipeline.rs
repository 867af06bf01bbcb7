use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{CollaboratorError, StoreError};
use crate::mapper::map_to_avito;
use crate::state_machine::{CardId, Payload, Status, TransitionRequest};
use crate::store::RecordStore;

/// Photos imported for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSet {
    pub photo_urls: Vec<String>,
    pub photo_files: Vec<String>,
}

/// What the marketplace publisher reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublishOutcome {
    Posted { post_url: String },
    /// Captcha or a confirmation only a human can give.
    NeedAction { reason: String },
    Failed { reason: String },
}

/// Fetches and stores the photos of a batch.
pub trait PhotoSource {
    async fn import(&self, batch_id: &str) -> Result<PhotoSet, CollaboratorError>;
}

/// Produces the AI result JSON for a card.
pub trait ContentGenerator {
    async fn generate(
        &self,
        photo_files: &[String],
        template_id: &str,
    ) -> Result<Value, CollaboratorError>;
}

/// Fills and submits the marketplace form.
pub trait Publisher {
    async fn publish(
        &self,
        mapped: &Value,
        photo_files: &[String],
    ) -> Result<PublishOutcome, CollaboratorError>;
}

/// Configuration for retrying system failures of collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries before the card is marked FAILED.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1), saturating at `u64::MAX`.
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .unwrap_or(if self.base_delay_ms == 0 { 0 } else { u64::MAX })
    }
}

/// Per-run settings of the flow runner.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub template_id: String,
    pub profile_id: String,
    pub retry: RetryConfig,
    pub interval: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            template_id: "sale".into(),
            profile_id: String::new(),
            retry: RetryConfig::default(),
            interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Tally of one or more runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub skipped_batches: usize,
    pub outcomes: Vec<(CardId, Status)>,
}

impl RunSummary {
    pub fn count(&self, status: Status) -> usize {
        self.outcomes.iter().filter(|(_, s)| *s == status).count()
    }

    fn merge(&mut self, other: RunSummary) {
        self.skipped_batches += other.skipped_batches;
        self.outcomes.extend(other.outcomes);
    }
}

/// Drives new batches through the collaborators, one card per batch.
///
/// Every status change goes through the store. A failed guard or a business
/// failure is followed by an explicit NEED_ACTION request; system failures
/// are retried and then escalated to FAILED.
pub struct FlowRunner<P, G, B> {
    store: Arc<RecordStore>,
    photos: P,
    generator: G,
    publisher: B,
    settings: FlowSettings,
}

impl<P, G, B> FlowRunner<P, G, B>
where
    P: PhotoSource,
    G: ContentGenerator,
    B: Publisher,
{
    pub fn new(
        store: Arc<RecordStore>,
        photos: P,
        generator: G,
        publisher: B,
        settings: FlowSettings,
    ) -> Self {
        Self {
            store,
            photos,
            generator,
            publisher,
            settings,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Processes every batch not seen before.
    pub async fn run_once(&self, batch_ids: &[String]) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();
        for batch_id in batch_ids {
            if self.store.is_batch_processed(batch_id)? {
                summary.skipped_batches += 1;
                continue;
            }
            let id = self.store.create(
                batch_id,
                &self.settings.template_id,
                &self.settings.profile_id,
            )?;
            let status = self.drive(&id, batch_id).await?;
            self.store.mark_batch_processed(batch_id)?;
            info!(card_id = %id, batch_id = %batch_id, %status, "batch processed");
            summary.outcomes.push((id, status));
        }
        Ok(summary)
    }

    /// Repeats `run_once` with the configured interval between cycles.
    pub async fn run_cycles<F>(
        &self,
        cycles: u32,
        mut fetch_batches: F,
    ) -> Result<RunSummary, StoreError>
    where
        F: FnMut() -> Vec<String>,
    {
        let mut total = RunSummary::default();
        for cycle in 0..cycles {
            if cycle > 0 {
                sleep(self.settings.interval).await;
            }
            total.merge(self.run_once(&fetch_batches()).await?);
        }
        Ok(total)
    }

    async fn drive(&self, id: &str, batch_id: &str) -> Result<Status, StoreError> {
        // NEW → PHOTOS_READY
        let photos = match self.with_retry(id, "photo import", || self.photos.import(batch_id)).await {
            Ok(photos) => photos,
            Err(err) => return self.escalate(id, err),
        };
        let files = photos.photo_files.clone();
        let payload = Payload::photos(photos.photo_urls, photos.photo_files);
        if let Some(stopped) = self.advance(id, Status::PhotosReady, payload)? {
            return Ok(stopped);
        }

        // PHOTOS_READY → AI_READY
        let template_id = &self.settings.template_id;
        let ai_result = match self
            .with_retry(id, "content generation", || self.generator.generate(&files, template_id))
            .await
        {
            Ok(value) => value,
            Err(err) => return self.escalate(id, err),
        };
        if let Some(stopped) = self.advance(id, Status::AiReady, Payload::ai_result(ai_result.clone()))? {
            return Ok(stopped);
        }

        // AI_READY → READY_TO_POST
        let mapped = match map_to_avito(&ai_result, &files) {
            Ok(mapped) => mapped,
            Err(errors) => {
                let reason = errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
                return self.need_action(id, format!("mapping failed: {reason}"));
            }
        };
        if let Some(stopped) = self.advance(id, Status::ReadyToPost, Payload::mapped_avito(mapped.clone()))? {
            return Ok(stopped);
        }

        // READY_TO_POST → POSTED
        let outcome = match self
            .with_retry(id, "publishing", || self.publisher.publish(&mapped, &files))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return self.escalate(id, err),
        };
        match outcome {
            PublishOutcome::Posted { post_url } => {
                match self.advance(id, Status::Posted, Payload::post_url(post_url))? {
                    Some(stopped) => Ok(stopped),
                    None => Ok(Status::Posted),
                }
            }
            PublishOutcome::NeedAction { reason } => self.need_action(id, reason),
            PublishOutcome::Failed { reason } => self.fail(id, reason),
        }
    }

    /// Requests a forward move. On a guard rejection the card is escalated to
    /// NEED_ACTION and that status is returned.
    fn advance(&self, id: &str, target: Status, payload: Payload) -> Result<Option<Status>, StoreError> {
        match self.store.transition(id, TransitionRequest::advance(target, payload)) {
            Ok(_) => Ok(None),
            Err(StoreError::Rejected(err)) => self.need_action(id, err.to_string()).map(Some),
            Err(err) => Err(err),
        }
    }

    fn need_action(&self, id: &str, reason: String) -> Result<Status, StoreError> {
        let reason = if reason.trim().is_empty() {
            "manual action required".to_string()
        } else {
            reason
        };
        self.store.transition(id, TransitionRequest::need_action(reason))?;
        Ok(Status::NeedAction)
    }

    fn fail(&self, id: &str, reason: String) -> Result<Status, StoreError> {
        let reason = if reason.trim().is_empty() {
            "publishing failed".to_string()
        } else {
            reason
        };
        self.store.transition(id, TransitionRequest::failed([reason]))?;
        Ok(Status::Failed)
    }

    fn escalate(&self, id: &str, err: CollaboratorError) -> Result<Status, StoreError> {
        match err {
            CollaboratorError::Business(reason) => self.need_action(id, reason),
            CollaboratorError::System(reason) => self.fail(id, reason),
        }
    }

    async fn with_retry<T, F, Fut>(
        &self,
        card_id: &str,
        stage: &str,
        mut op: F,
    ) -> Result<T, CollaboratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let retry = &self.settings.retry;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay_ms = retry.delay_for_attempt(attempt);
                    warn!(
                        card_id,
                        stage,
                        attempt,
                        max = retry.max_retries,
                        delay_ms,
                        error = %err,
                        "retrying collaborator"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
