//! In-memory publication store.
//!
//! Publications are kept in an ordered map behind a single `RwLock`. Each
//! mutation runs entirely under the write lock and swaps in a new
//! `Arc<Publication>`, so readers observe a publication either before or after
//! a change to it and its images, questions and stars, never in between.

use crate::error::StoreError;
use crate::publication::Publication;
use crate::publication::PublicationStar;
use crate::search::ComposedQuery;
use crate::storage::wal::WalEntry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Internal data for the store, protected by a `RwLock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub publications: BTreeMap<u64, Arc<Publication>>,
    /// Next publication id to hand out. Ids start at 1.
    pub next_publication_id: u64,
    pub next_question_id: u64,
}

impl Default for StoreData {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreData {
    pub fn new() -> Self {
        Self {
            publications: BTreeMap::new(),
            next_publication_id: 1,
            next_question_id: 1,
        }
    }

    /// Validate structural integrity of the store data.
    ///
    /// Checks that map keys match publication ids, that the id counters are
    /// ahead of every stored id, and that stars and question ids are unique
    /// within each publication.
    pub fn validate(&self) -> Result<(), String> {
        for (id, publication) in &self.publications {
            if *id != publication.id {
                return Err(format!(
                    "publication stored under id {} reports id {}",
                    id, publication.id
                ));
            }
            if publication.id >= self.next_publication_id {
                return Err(format!(
                    "next_publication_id {} not ahead of stored id {}",
                    self.next_publication_id, publication.id
                ));
            }
            let mut users: Vec<i64> = publication.stars.iter().map(|s| s.user_id).collect();
            users.sort_unstable();
            if users.windows(2).any(|w| w[0] == w[1]) {
                return Err(format!("publication {} has duplicate stars", id));
            }
            let mut question_ids: Vec<u64> = publication.questions.iter().map(|q| q.id).collect();
            question_ids.sort_unstable();
            if question_ids.windows(2).any(|w| w[0] == w[1]) {
                return Err(format!("publication {} has duplicate question ids", id));
            }
            for question in &publication.questions {
                if question.id >= self.next_question_id {
                    return Err(format!(
                        "next_question_id {} not ahead of question id {}",
                        self.next_question_id, question.id
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks that `entry` would apply, without changing anything.
    fn check(&self, entry: &WalEntry) -> Result<(), StoreError> {
        if let WalEntry::CreatePublication { publication } = entry {
            if self.publications.contains_key(&publication.id) {
                return Err(StoreError::PublicationExists(publication.id));
            }
            return Ok(());
        }

        let id = entry.publication_id();
        let publication = self
            .publications
            .get(&id)
            .ok_or(StoreError::PublicationNotFound(id))?;

        match entry {
            WalEntry::UnstarPublication { user_id, .. } => {
                if !publication.is_starred_by(*user_id) {
                    return Err(StoreError::NotStarred {
                        publication_id: id,
                        user_id: *user_id,
                    });
                }
            }
            _ if publication.blocked => return Err(StoreError::PublicationBlocked(id)),
            WalEntry::StarPublication { star } => {
                if publication.is_starred_by(star.user_id) {
                    return Err(StoreError::AlreadyStarred {
                        publication_id: id,
                        user_id: star.user_id,
                    });
                }
            }
            WalEntry::AskQuestion { question, .. } => {
                if publication.questions.iter().any(|q| q.id == question.id) {
                    return Err(StoreError::QuestionExists {
                        publication_id: id,
                        question_id: question.id,
                    });
                }
            }
            WalEntry::ReplyQuestion { question_id, .. } => {
                if !publication.questions.iter().any(|q| q.id == *question_id) {
                    return Err(StoreError::QuestionNotFound {
                        publication_id: id,
                        question_id: *question_id,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply(&mut self, entry: &WalEntry) -> Result<Arc<Publication>, StoreError> {
        self.check(entry)?;

        if let WalEntry::CreatePublication { publication } = entry {
            let publication = Arc::new(publication.clone());
            self.next_publication_id = self.next_publication_id.max(publication.id + 1);
            for question in &publication.questions {
                self.next_question_id = self.next_question_id.max(question.id + 1);
            }
            self.publications.insert(publication.id, Arc::clone(&publication));
            return Ok(publication);
        }

        let id = entry.publication_id();
        let slot = self
            .publications
            .get_mut(&id)
            .ok_or(StoreError::PublicationNotFound(id))?;
        let publication = Arc::make_mut(slot);
        match entry {
            WalEntry::CreatePublication { .. } => {}
            WalEntry::ReplacePublication { draft, .. } => publication.apply_draft(draft.clone()),
            WalEntry::PatchPublication { patch, .. } => publication.apply_patch(patch.clone()),
            WalEntry::BlockPublication { .. } => publication.blocked = true,
            WalEntry::StarPublication { star } => publication.stars.push(star.clone()),
            WalEntry::UnstarPublication { user_id, .. } => {
                publication.stars.retain(|s| s.user_id != *user_id)
            }
            WalEntry::AskQuestion { question, .. } => {
                self.next_question_id = self.next_question_id.max(question.id + 1);
                publication.questions.push(question.clone());
            }
            WalEntry::ReplyQuestion {
                question_id,
                reply,
                replied_at,
                ..
            } => {
                if let Some(question) = publication
                    .questions
                    .iter_mut()
                    .find(|q| q.id == *question_id)
                {
                    question.reply = Some(reply.clone());
                    question.replied_at = Some(*replied_at);
                }
            }
        }
        Ok(Arc::clone(slot))
    }
}

/// Thread-safe handle to the publication store. Cloning shares the same data.
#[derive(Clone, Default)]
pub struct PublicationStore {
    pub data: Arc<RwLock<StoreData>>,
}

impl PublicationStore {
    pub fn new() -> Self {
        Self::from_data(StoreData::new())
    }

    pub fn from_data(data: StoreData) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Reserves the next publication id.
    pub fn next_publication_id(&self) -> u64 {
        let mut data = self.data.write();
        let id = data.next_publication_id;
        data.next_publication_id += 1;
        id
    }

    /// Reserves the next question id.
    pub fn next_question_id(&self) -> u64 {
        let mut data = self.data.write();
        let id = data.next_question_id;
        data.next_question_id += 1;
        id
    }

    pub fn get(&self, id: u64) -> Option<Arc<Publication>> {
        self.data.read().publications.get(&id).cloned()
    }

    /// Checks that `entry` would apply against the current state.
    ///
    /// Run before appending to the WAL so rejected requests never reach it.
    pub fn check(&self, entry: &WalEntry) -> Result<(), StoreError> {
        self.data.read().check(entry)
    }

    /// Applies one mutation and returns the publication as it is afterwards.
    pub fn apply(&self, entry: &WalEntry) -> Result<Arc<Publication>, StoreError> {
        self.data.write().apply(entry)
    }

    /// Applies entries in order, skipping the ones that no longer apply.
    /// Returns how many were applied.
    pub fn replay(&self, entries: &[WalEntry]) -> usize {
        let mut data = self.data.write();
        let mut applied = 0;
        for entry in entries {
            match data.apply(entry) {
                Ok(_) => applied += 1,
                Err(e) => tracing::warn!(
                    operation = entry.operation(),
                    publication_id = entry.publication_id(),
                    "Skipping WAL entry during replay: {}",
                    e
                ),
            }
        }
        applied
    }

    /// Publications matching `query`, in ascending id order.
    pub fn query(&self, query: &ComposedQuery<Publication>) -> Vec<Arc<Publication>> {
        self.data
            .read()
            .publications
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect()
    }

    /// Stars of one publication matching `query`.
    pub fn stars(
        &self,
        publication_id: u64,
        query: &ComposedQuery<PublicationStar>,
    ) -> Result<Vec<PublicationStar>, StoreError> {
        let data = self.data.read();
        let publication = data
            .publications
            .get(&publication_id)
            .ok_or(StoreError::PublicationNotFound(publication_id))?;
        Ok(publication
            .stars
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.data.read().publications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().publications.is_empty()
    }

    pub fn blocked_count(&self) -> usize {
        self.data
            .read()
            .publications
            .values()
            .filter(|p| p.blocked)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::{
        BlockchainPatch, BlockchainStatus, GeoPoint, PublicationDraft, PublicationQuestion,
    };
    use crate::search::{publication_filters, star_filters, validate_and_compose};
    use chrono::Utc;
    use std::collections::HashMap;

    fn draft(user_id: i64) -> PublicationDraft {
        PublicationDraft {
            user_id,
            title: "Flat".into(),
            description: "Two rooms".into(),
            rooms: 2,
            beds: 2,
            bathrooms: 1,
            price_per_night: 70.0,
            images: vec![],
            loc: GeoPoint::new(0.0, 0.0).unwrap(),
        }
    }

    fn create(store: &PublicationStore, user_id: i64) -> u64 {
        let id = store.next_publication_id();
        let publication = Publication::new(id, draft(user_id), Utc::now());
        store
            .apply(&WalEntry::CreatePublication { publication })
            .unwrap();
        id
    }

    fn star_entry(publication_id: u64, user_id: i64) -> WalEntry {
        WalEntry::StarPublication {
            star: PublicationStar {
                user_id,
                publication_id,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let store = PublicationStore::new();
        assert_eq!(create(&store, 1), 1);
        assert_eq!(create(&store, 1), 2);
        assert_eq!(store.len(), 2);
        assert!(store.data.read().validate().is_ok());
    }

    #[test]
    fn test_block_then_mutations_rejected() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        store
            .apply(&WalEntry::BlockPublication { publication_id: id })
            .unwrap();
        assert!(store.get(id).unwrap().blocked);
        assert_eq!(store.blocked_count(), 1);

        for entry in [
            WalEntry::BlockPublication { publication_id: id },
            WalEntry::PatchPublication {
                publication_id: id,
                patch: BlockchainPatch::default(),
            },
            star_entry(id, 5),
        ] {
            assert_eq!(store.apply(&entry), Err(StoreError::PublicationBlocked(id)));
        }
    }

    #[test]
    fn test_missing_publication() {
        let store = PublicationStore::new();
        assert_eq!(
            store.check(&WalEntry::BlockPublication { publication_id: 9 }),
            Err(StoreError::PublicationNotFound(9))
        );
        assert!(store.stars(9, &ComposedQuery::all()).is_err());
    }

    #[test]
    fn test_star_and_unstar() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        store.apply(&star_entry(id, 5)).unwrap();
        assert_eq!(
            store.apply(&star_entry(id, 5)),
            Err(StoreError::AlreadyStarred {
                publication_id: id,
                user_id: 5
            })
        );
        store.apply(&star_entry(id, 6)).unwrap();

        let registry = star_filters().unwrap();
        let raw: HashMap<String, String> = [("user_id".to_string(), "6".to_string())].into();
        let parsed = registry.parse(&raw).unwrap();
        let query = validate_and_compose(ComposedQuery::all(), &parsed).unwrap();
        let stars = store.stars(id, &query).unwrap();
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].user_id, 6);

        let unstar = WalEntry::UnstarPublication {
            publication_id: id,
            user_id: 5,
        };
        store.apply(&unstar).unwrap();
        assert_eq!(
            store.apply(&unstar),
            Err(StoreError::NotStarred {
                publication_id: id,
                user_id: 5
            })
        );
        assert_eq!(store.stars(id, &ComposedQuery::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_question_reply() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        let question_id = store.next_question_id();
        store
            .apply(&WalEntry::AskQuestion {
                publication_id: id,
                question: PublicationQuestion {
                    id: question_id,
                    user_id: 2,
                    question: "Pets allowed?".into(),
                    reply: None,
                    created_at: Utc::now(),
                    replied_at: None,
                },
            })
            .unwrap();
        let replied = store
            .apply(&WalEntry::ReplyQuestion {
                publication_id: id,
                question_id,
                reply: "Yes".into(),
                replied_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(replied.questions[0].reply.as_deref(), Some("Yes"));
        assert!(replied.questions[0].replied_at.is_some());

        assert_eq!(
            store.apply(&WalEntry::ReplyQuestion {
                publication_id: id,
                question_id: question_id + 100,
                reply: "?".into(),
                replied_at: Utc::now(),
            }),
            Err(StoreError::QuestionNotFound {
                publication_id: id,
                question_id: question_id + 100
            })
        );
    }

    fn ask_entry(publication_id: u64, question_id: u64) -> WalEntry {
        WalEntry::AskQuestion {
            publication_id,
            question: PublicationQuestion {
                id: question_id,
                user_id: 2,
                question: "Is there parking?".into(),
                reply: None,
                created_at: Utc::now(),
                replied_at: None,
            },
        }
    }

    #[test]
    fn test_question_id_applied_once() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        let ask = ask_entry(id, store.next_question_id());
        store.apply(&ask).unwrap();
        assert_eq!(
            store.apply(&ask),
            Err(StoreError::QuestionExists {
                publication_id: id,
                question_id: 1
            })
        );
        assert_eq!(store.get(id).unwrap().questions.len(), 1);
    }

    #[test]
    fn test_replay_over_snapshot_skips_applied_entries() {
        let live = PublicationStore::new();
        let id = live.next_publication_id();
        let create = WalEntry::CreatePublication {
            publication: Publication::new(id, draft(1), Utc::now()),
        };
        let ask = ask_entry(id, live.next_question_id());
        live.apply(&create).unwrap();
        live.apply(&ask).unwrap();

        // Snapshot taken but the WAL was never truncated.
        let restored = PublicationStore::from_data(live.data.read().clone());
        assert_eq!(restored.replay(&[create, ask]), 0);
        assert_eq!(restored.get(id).unwrap().questions.len(), 1);
        assert!(restored.data.read().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_question_ids() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        let WalEntry::AskQuestion { question, .. } = ask_entry(id, store.next_question_id()) else {
            unreachable!();
        };
        let mut data = store.data.read().clone();
        if let Some(slot) = data.publications.get_mut(&id) {
            let publication = Arc::make_mut(slot);
            publication.questions.push(question.clone());
            publication.questions.push(question);
        }
        assert!(data.validate().unwrap_err().contains("duplicate question ids"));
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let store = PublicationStore::new();
        let id = create(&store, 1);
        let before = store.get(id).unwrap();
        store.apply(&star_entry(id, 5)).unwrap();
        assert!(before.stars.is_empty());
        assert_eq!(store.get(id).unwrap().stars.len(), 1);
    }

    #[test]
    fn test_replay_rebuilds_state_and_counters() {
        let live = PublicationStore::new();
        let mut log = Vec::new();
        for user_id in [1, 2] {
            let id = live.next_publication_id();
            let entry = WalEntry::CreatePublication {
                publication: Publication::new(id, draft(user_id), Utc::now()),
            };
            live.apply(&entry).unwrap();
            log.push(entry);
        }
        let patch = WalEntry::PatchPublication {
            publication_id: 2,
            patch: BlockchainPatch {
                blockchain_status: Some(BlockchainStatus::Confirmed),
                ..Default::default()
            },
        };
        live.apply(&patch).unwrap();
        log.push(patch);
        // Rejected live, skipped on replay.
        log.push(star_entry(99, 1));

        let replayed = PublicationStore::new();
        assert_eq!(replayed.replay(&log), 3);
        assert_eq!(replayed.len(), 2);
        assert_eq!(
            replayed.get(2).unwrap().blockchain_status,
            BlockchainStatus::Confirmed
        );
        assert_eq!(replayed.next_publication_id(), 3);
    }

    #[test]
    fn test_query_returns_ascending_ids() {
        let store = PublicationStore::new();
        for _ in 0..3 {
            let id = create(&store, 1);
            store
                .apply(&WalEntry::PatchPublication {
                    publication_id: id,
                    patch: BlockchainPatch {
                        blockchain_status: Some(BlockchainStatus::Confirmed),
                        ..Default::default()
                    },
                })
                .unwrap();
        }
        store
            .apply(&WalEntry::BlockPublication { publication_id: 2 })
            .unwrap();

        let registry = publication_filters().unwrap();
        let parsed = registry.parse(&HashMap::new()).unwrap();
        let query = validate_and_compose(ComposedQuery::all(), &parsed).unwrap();
        let ids: Vec<u64> = store.query(&query).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 3]);
        let all: Vec<u64> = store
            .query(&ComposedQuery::all())
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(all, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_detects_stale_counter() {
        let mut data = StoreData::new();
        data.publications.insert(
            4,
            Arc::new(Publication::new(4, draft(1), Utc::now())),
        );
        assert!(data.validate().is_err());
        data.next_publication_id = 5;
        assert!(data.validate().is_ok());
    }
}
