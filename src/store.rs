//! Keyed collection of car cards with per-card mutual exclusion.
//!
//! Each card lives behind its own mutex, so transitions on different cards
//! never contend while transitions on one card are applied one at a time.
//! The store also keeps the flow-level bookkeeping: the NEED_ACTION queue,
//! the publication history, processed batches and rejected attempts.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{StoreError, TransitionError};
use crate::state_machine::{
    CarCard, CardId, Escalation, StateMachine, Status, TransitionRequest, TransitionResult,
};

/// A card waiting for an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedActionItem {
    pub card_id: CardId,
    pub batch_id: String,
    pub reason: String,
    pub requires_manual_confirmation: bool,
    pub queued_at: DateTime<Utc>,
}

/// Record written each time a card reaches POSTED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub card_id: CardId,
    pub batch_id: String,
    pub post_url: String,
    pub status: Status,
    pub published_at: DateTime<Utc>,
    /// Time from card creation to publication.
    pub duration_ms: i64,
}

/// A transition request that was refused, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedAttempt {
    pub card_id: CardId,
    pub from: Status,
    pub to: Status,
    pub error: TransitionError,
    pub at: DateTime<Utc>,
}

/// Rejected attempts kept per card; older ones are dropped first.
pub const MAX_REJECTIONS_PER_CARD: usize = 50;

#[derive(Default)]
struct Journal {
    need_action: Vec<NeedActionItem>,
    history: Vec<PublicationRecord>,
    rejections: Vec<RejectedAttempt>,
    processed_batches: HashSet<String>,
}

#[derive(Default)]
pub struct RecordStore {
    cards: RwLock<HashMap<CardId, Arc<Mutex<CarCard>>>>,
    // Lock order: a card's mutex before the journal.
    journal: Mutex<Journal>,
}

fn poisoned<T>(err: PoisonError<T>) -> StoreError {
    StoreError::Poisoned(err.to_string())
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a NEW card and returns its id.
    pub fn create(
        &self,
        batch_id: &str,
        template_id: &str,
        profile_id: &str,
    ) -> Result<CardId, StoreError> {
        let card = CarCard::new(batch_id, template_id, profile_id);
        let id = card.id().to_string();
        self.insert(card)?;
        info!(card_id = %id, batch_id, "card created");
        Ok(id)
    }

    /// Inserts a persisted card, refusing records that break lifecycle invariants.
    pub fn restore(&self, card: CarCard) -> Result<(), StoreError> {
        let problems = card.invariant_violations();
        if !problems.is_empty() {
            warn!(card_id = %card.id(), ?problems, "refusing corrupt record");
            return Err(StoreError::CorruptRecord {
                id: card.id().to_string(),
                problems,
            });
        }
        self.insert(card)
    }

    fn insert(&self, card: CarCard) -> Result<(), StoreError> {
        let mut cards = self.cards.write().map_err(poisoned)?;
        if cards.contains_key(card.id()) {
            return Err(StoreError::DuplicateCard(card.id().to_string()));
        }
        cards.insert(card.id().to_string(), Arc::new(Mutex::new(card)));
        Ok(())
    }

    fn slot(&self, id: &str) -> Result<Arc<Mutex<CarCard>>, StoreError> {
        let cards = self.cards.read().map_err(poisoned)?;
        cards
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CardNotFound(id.to_string()))
    }

    /// Applies a transition under the card's lock.
    ///
    /// Rejections come back as `StoreError::Rejected` and are recorded in the
    /// journal; the card itself is not touched.
    pub fn transition(
        &self,
        id: &str,
        request: TransitionRequest,
    ) -> Result<(Status, Status), StoreError> {
        let slot = self.slot(id)?;
        let mut card = slot.lock().map_err(poisoned)?;

        let from = card.status();
        let to = request.target();
        let reason = match &request {
            TransitionRequest::Escalate(Escalation::NeedAction { reason }) => {
                Some(reason.trim().to_string())
            }
            _ => None,
        };

        match StateMachine::transition(&mut card, request) {
            TransitionResult::Applied { from, to } => {
                let mut journal = self.journal.lock().map_err(poisoned)?;
                if from == Status::NeedAction {
                    journal.need_action.retain(|item| item.card_id != id);
                }
                if let Some(reason) = reason {
                    journal.need_action.push(NeedActionItem {
                        card_id: id.to_string(),
                        batch_id: card.batch_id().to_string(),
                        reason,
                        requires_manual_confirmation: true,
                        queued_at: card.updated_at(),
                    });
                }
                if to == Status::Posted {
                    journal.history.push(PublicationRecord {
                        card_id: id.to_string(),
                        batch_id: card.batch_id().to_string(),
                        post_url: card.post_url().unwrap_or_default().to_string(),
                        status: to,
                        published_at: card.updated_at(),
                        duration_ms: (card.updated_at() - card.created_at()).num_milliseconds(),
                    });
                }
                Ok((from, to))
            }
            TransitionResult::Rejected(error) => {
                warn!(card_id = %id, %from, %to, %error, "transition rejected");
                let mut journal = self.journal.lock().map_err(poisoned)?;
                let kept = journal.rejections.iter().filter(|r| r.card_id == id).count();
                if kept >= MAX_REJECTIONS_PER_CARD {
                    if let Some(oldest) = journal.rejections.iter().position(|r| r.card_id == id) {
                        journal.rejections.remove(oldest);
                    }
                }
                journal.rejections.push(RejectedAttempt {
                    card_id: id.to_string(),
                    from,
                    to,
                    error: error.clone(),
                    at: Utc::now(),
                });
                Err(StoreError::Rejected(error))
            }
        }
    }

    /// Copy of the card's current state.
    pub fn snapshot(&self, id: &str) -> Result<CarCard, StoreError> {
        let slot = self.slot(id)?;
        let card = slot.lock().map_err(poisoned)?;
        Ok(card.clone())
    }

    pub fn ids(&self) -> Result<Vec<CardId>, StoreError> {
        let cards = self.cards.read().map_err(poisoned)?;
        let mut ids: Vec<CardId> = cards.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.cards.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn by_status(&self, status: Status) -> Result<Vec<CarCard>, StoreError> {
        let slots: Vec<_> = self.cards.read().map_err(poisoned)?.values().cloned().collect();
        let mut matching = Vec::new();
        for slot in slots {
            let card = slot.lock().map_err(poisoned)?;
            if card.status() == status {
                matching.push(card.clone());
            }
        }
        matching.sort_by_key(|c| c.created_at());
        Ok(matching)
    }

    pub fn need_action_queue(&self) -> Result<Vec<NeedActionItem>, StoreError> {
        Ok(self.journal.lock().map_err(poisoned)?.need_action.clone())
    }

    /// Drops the card's queue entry. Returns false if it was not queued.
    pub fn resolve_need_action(&self, id: &str) -> Result<bool, StoreError> {
        let mut journal = self.journal.lock().map_err(poisoned)?;
        let before = journal.need_action.len();
        journal.need_action.retain(|item| item.card_id != id);
        Ok(journal.need_action.len() < before)
    }

    pub fn history(&self) -> Result<Vec<PublicationRecord>, StoreError> {
        Ok(self.journal.lock().map_err(poisoned)?.history.clone())
    }

    pub fn rejections(&self, id: &str) -> Result<Vec<RejectedAttempt>, StoreError> {
        let journal = self.journal.lock().map_err(poisoned)?;
        Ok(journal
            .rejections
            .iter()
            .filter(|r| r.card_id == id)
            .cloned()
            .collect())
    }

    /// Removes and returns the card's rejected attempts.
    pub fn drain_rejections(&self, id: &str) -> Result<Vec<RejectedAttempt>, StoreError> {
        let mut journal = self.journal.lock().map_err(poisoned)?;
        let (drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut journal.rejections)
            .into_iter()
            .partition(|r| r.card_id == id);
        journal.rejections = kept;
        Ok(drained)
    }

    /// Records a batch as handled. Returns false if it already was.
    pub fn mark_batch_processed(&self, batch_id: &str) -> Result<bool, StoreError> {
        let mut journal = self.journal.lock().map_err(poisoned)?;
        Ok(journal.processed_batches.insert(batch_id.to_string()))
    }

    pub fn is_batch_processed(&self, batch_id: &str) -> Result<bool, StoreError> {
        let journal = self.journal.lock().map_err(poisoned)?;
        Ok(journal.processed_batches.contains(batch_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{valid_ai_result, valid_mapping};
    use crate::state_machine::{Payload, card_at};
    use serde_json::json;

    fn photos() -> Payload {
        Payload::photos(
            vec!["https://photo/batch_1/01.jpg".into()],
            vec!["data/batch_1/01.jpg".into()],
        )
    }

    fn store_with_card_at(status: Status) -> (RecordStore, CardId) {
        let store = RecordStore::new();
        let card = card_at(status);
        let id = card.id().to_string();
        store.restore(card).unwrap();
        (store, id)
    }

    #[test]
    fn create_and_advance() {
        let store = RecordStore::new();
        let id = store.create("batch_1", "sale", "profile-1").unwrap();
        assert_eq!(store.snapshot(&id).unwrap().status(), Status::New);

        let moved = store
            .transition(&id, TransitionRequest::advance(Status::PhotosReady, photos()))
            .unwrap();
        assert_eq!(moved, (Status::New, Status::PhotosReady));
        assert_eq!(store.snapshot(&id).unwrap().photo_urls().len(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn unknown_card() {
        let store = RecordStore::new();
        let err = store
            .transition("nope", TransitionRequest::need_action("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::CardNotFound(id) if id == "nope"));
    }

    #[test]
    fn rejection_is_journaled_and_card_untouched() {
        let (store, id) = store_with_card_at(Status::PhotosReady);
        let before = store.snapshot(&id).unwrap();
        let mut ai = valid_ai_result();
        ai["avito_fields"]["payment_per_month_rub"] = json!(30000);

        let err = store
            .transition(&id, TransitionRequest::advance(Status::AiReady, Payload::ai_result(ai)))
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(TransitionError::GuardFailed { .. })));
        assert_eq!(store.snapshot(&id).unwrap(), before);
        let rejections = store.rejections(&id).unwrap();
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].from, Status::PhotosReady);
        assert_eq!(rejections[0].to, Status::AiReady);
        assert_eq!(
            rejections[0].error.violations()[0].field(),
            "avito_fields.payment_per_month_rub"
        );
    }

    #[test]
    fn rejection_journal_is_bounded_per_card() {
        let (store, id) = store_with_card_at(Status::Posted);
        let other = store.create("batch_2", "sale", "").unwrap();
        store
            .transition(&other, TransitionRequest::advance(Status::Posted, Payload::default()))
            .unwrap_err();

        for _ in 0..MAX_REJECTIONS_PER_CARD + 10 {
            store
                .transition(&id, TransitionRequest::advance(Status::New, Payload::default()))
                .unwrap_err();
        }
        assert_eq!(store.rejections(&id).unwrap().len(), MAX_REJECTIONS_PER_CARD);
        assert_eq!(store.rejections(&other).unwrap().len(), 1);

        let drained = store.drain_rejections(&id).unwrap();
        assert_eq!(drained.len(), MAX_REJECTIONS_PER_CARD);
        assert!(store.rejections(&id).unwrap().is_empty());
        assert_eq!(store.rejections(&other).unwrap().len(), 1);
    }

    #[test]
    fn poisoned_card_map_is_reported() {
        let store = RecordStore::new();
        store.create("batch_1", "sale", "").unwrap();
        let crashed = std::thread::scope(|s| {
            s.spawn(|| {
                let _held = store.cards.write().unwrap();
                panic!("writer crashed");
            })
            .join()
        });
        assert!(crashed.is_err());
        assert!(matches!(store.len(), Err(StoreError::Poisoned(_))));
        assert!(matches!(store.is_empty(), Err(StoreError::Poisoned(_))));
    }

    #[test]
    fn need_action_queue_follows_the_card() {
        let (store, id) = store_with_card_at(Status::AiReady);
        store
            .transition(&id, TransitionRequest::need_action("captcha required"))
            .unwrap();
        let queue = store.need_action_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].reason, "captcha required");
        assert_eq!(queue[0].batch_id, "batch_1");

        // Re-entering NEED_ACTION replaces the entry instead of duplicating it.
        store
            .transition(&id, TransitionRequest::need_action("captcha again"))
            .unwrap();
        let queue = store.need_action_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].reason, "captcha again");

        // Resuming drops it.
        store
            .transition(&id, TransitionRequest::advance(Status::ReadyToPost, Payload::mapped_avito(valid_mapping())))
            .unwrap();
        assert!(store.need_action_queue().unwrap().is_empty());
    }

    #[test]
    fn resolve_need_action_by_hand() {
        let (store, id) = store_with_card_at(Status::New);
        store
            .transition(&id, TransitionRequest::need_action("no photos in batch"))
            .unwrap();
        assert!(store.resolve_need_action(&id).unwrap());
        assert!(!store.resolve_need_action(&id).unwrap());
        assert_eq!(store.snapshot(&id).unwrap().status(), Status::NeedAction);
    }

    #[test]
    fn posting_writes_history() {
        let (store, id) = store_with_card_at(Status::ReadyToPost);
        store
            .transition(
                &id,
                TransitionRequest::advance(Status::Posted, Payload::post_url("https://www.avito.ru/item/77")),
            )
            .unwrap();
        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].card_id, id);
        assert_eq!(history[0].post_url, "https://www.avito.ru/item/77");
        assert_eq!(history[0].status, Status::Posted);
        assert!(history[0].duration_ms >= 0);
        assert_eq!(store.by_status(Status::Posted).unwrap().len(), 1);
    }

    #[test]
    fn restore_refuses_corrupt_and_duplicate_records() {
        let card = card_at(Status::AiReady);
        let mut raw = serde_json::to_value(&card).unwrap();
        raw["ai_result"]["specs"]["mileage_km"] = json!(500000);
        let tampered: CarCard = serde_json::from_value(raw).unwrap();

        let store = RecordStore::new();
        let err = store.restore(tampered).unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord { .. }));
        assert!(store.is_empty().unwrap());

        store.restore(card.clone()).unwrap();
        let err = store.restore(card).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCard(_)));
    }

    #[test]
    fn batches_are_processed_once() {
        let store = RecordStore::new();
        assert!(!store.is_batch_processed("batch_1").unwrap());
        assert!(store.mark_batch_processed("batch_1").unwrap());
        assert!(!store.mark_batch_processed("batch_1").unwrap());
        assert!(store.is_batch_processed("batch_1").unwrap());
    }

    #[test]
    fn concurrent_writers_on_one_card_apply_once() {
        let (store, id) = store_with_card_at(Status::AiReady);
        let applied: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        store
                            .transition(
                                &id,
                                TransitionRequest::advance(Status::ReadyToPost, Payload::mapped_avito(valid_mapping())),
                            )
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(applied.iter().filter(|ok| **ok).count(), 1);
        let card = store.snapshot(&id).unwrap();
        assert_eq!(card.status(), Status::ReadyToPost);
        let moves = card
            .logs()
            .iter()
            .filter(|l| l.ends_with("transitioned AI_READY→READY_TO_POST"))
            .count();
        assert_eq!(moves, 1);
        for rejection in store.rejections(&id).unwrap() {
            assert_eq!(
                rejection.error,
                TransitionError::InvalidTransition {
                    from: Status::ReadyToPost,
                    to: Status::ReadyToPost,
                }
            );
        }
        assert_eq!(store.rejections(&id).unwrap().len(), 7);
    }

    #[test]
    fn different_cards_progress_in_parallel() {
        let store = RecordStore::new();
        let ids: Vec<CardId> = (0..16)
            .map(|i| store.create(&format!("batch_{i}"), "sale", "").unwrap())
            .collect();
        std::thread::scope(|s| {
            for id in &ids {
                let store = &store;
                s.spawn(move || {
                    store
                        .transition(id, TransitionRequest::advance(Status::PhotosReady, photos()))
                        .unwrap();
                    store
                        .transition(id, TransitionRequest::advance(Status::AiReady, Payload::ai_result(valid_ai_result())))
                        .unwrap();
                });
            }
        });
        assert_eq!(store.by_status(Status::AiReady).unwrap().len(), 16);
        let mut expected = ids.clone();
        expected.sort();
        assert_eq!(store.ids().unwrap(), expected);
    }
}
