//! Typed record stores over the key-value backend
//!
//! Documents and analyses are keyed `"{owner_id}/{document_id}"`, so the
//! composite key doubles as the owner index: listing a user's documents is
//! a prefix scan, and a cross-owner fetch simply misses.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::kv::{KvError, KvStore};
use crate::types::{Analysis, AnalysisStatus, Document, Profile, ProfileUpdate};

const NS_DOCUMENTS: &str = "documents";
const NS_ANALYSES: &str = "analyses";
const NS_PROFILES: &str = "profiles";

fn owner_key(owner_id: &str, id: &str) -> String {
    format!("{}/{}", owner_id, id)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, KvError> {
    Ok(serde_json::from_value(value)?)
}

// ── Documents ─────────────────────────────────────────────────────────────

/// CRUD over document records, scoped to the owning user
#[derive(Clone)]
pub struct DocumentStore {
    kv: Arc<dyn KvStore>,
}

impl DocumentStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Create a document record with a fresh id, status `pending`, progress 0.
    pub async fn create(
        &self,
        owner_id: &str,
        name: &str,
        storage_path: &str,
        mime_type: &str,
        size_bytes: i64,
    ) -> Result<Document, KvError> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            storage_path: storage_path.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            created_at: Utc::now(),
            analysis_status: AnalysisStatus::Pending,
            analysis_progress: 0,
        };
        self.update(&document).await?;
        Ok(document)
    }

    pub async fn get(&self, owner_id: &str, id: &str) -> Result<Option<Document>, KvError> {
        match self.kv.get(NS_DOCUMENTS, &owner_key(owner_id, id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    /// All documents owned by `owner_id`, newest first.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, KvError> {
        let prefix = format!("{}/", owner_id);
        let entries = self.kv.scan(NS_DOCUMENTS, &prefix).await?;
        let mut documents = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            documents.push(decode::<Document>(value)?);
        }
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    /// Persist a full document record (upsert). Status and progress mutations
    /// go through here and are restricted to the stage runner.
    pub async fn update(&self, document: &Document) -> Result<(), KvError> {
        let key = owner_key(&document.owner_id, &document.id);
        self.kv
            .set(NS_DOCUMENTS, &key, serde_json::to_value(document)?)
            .await
    }

    pub async fn delete(&self, owner_id: &str, id: &str) -> Result<(), KvError> {
        self.kv.delete(NS_DOCUMENTS, &owner_key(owner_id, id)).await
    }
}

// ── Analyses ──────────────────────────────────────────────────────────────

/// Completed analysis results, one per document
#[derive(Clone)]
pub struct AnalysisStore {
    kv: Arc<dyn KvStore>,
}

impl AnalysisStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Store the analysis for a document. Written exactly once, at the
    /// terminal stage; results are immutable afterwards.
    pub async fn put(&self, owner_id: &str, analysis: &Analysis) -> Result<(), KvError> {
        let key = owner_key(owner_id, &analysis.document_id);
        self.kv
            .set(NS_ANALYSES, &key, serde_json::to_value(analysis)?)
            .await
    }

    pub async fn get(&self, owner_id: &str, document_id: &str) -> Result<Option<Analysis>, KvError> {
        match self.kv.get(NS_ANALYSES, &owner_key(owner_id, document_id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }
}

// ── Profiles ──────────────────────────────────────────────────────────────

/// Per-user profiles and the documents-analyzed counter
#[derive(Clone)]
pub struct ProfileStore {
    kv: Arc<dyn KvStore>,
}

impl ProfileStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Create a profile at signup. No-op returning the existing record if the
    /// user already has one.
    pub async fn create(&self, user_id: &str, name: &str, email: &str) -> Result<Profile, KvError> {
        if let Some(existing) = self.get(user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        let profile = Profile {
            id: user_id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: now,
            updated_at: now,
            documents_analyzed: 0,
            tier: "free".to_string(),
        };
        self.persist(&profile).await?;
        Ok(profile)
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<Profile>, KvError> {
        match self.kv.get(NS_PROFILES, user_id).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    /// Merge the given partial fields into the current record, stamping
    /// `updated_at`. Returns `None` when no profile exists.
    pub async fn apply_update(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<Option<Profile>, KvError> {
        let Some(mut profile) = self.get(user_id).await? else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            profile.name = name;
        }
        if let Some(email) = update.email {
            profile.email = email;
        }
        if let Some(tier) = update.tier {
            profile.tier = tier;
        }
        profile.updated_at = Utc::now();
        self.persist(&profile).await?;
        Ok(Some(profile))
    }

    /// Bump the documents-analyzed counter by one. Returns false (and writes
    /// nothing) when the user has no profile. Goes through the KV's atomic
    /// modify so concurrent completions never lose an increment.
    pub async fn increment_analyzed(&self, user_id: &str) -> Result<bool, KvError> {
        let now = Utc::now();
        let stored = self
            .kv
            .modify(NS_PROFILES, user_id, &move |current| {
                let mut profile: Profile = serde_json::from_value(current?).ok()?;
                profile.documents_analyzed += 1;
                profile.updated_at = now;
                serde_json::to_value(profile).ok()
            })
            .await?;
        Ok(stored.is_some())
    }

    async fn persist(&self, profile: &Profile) -> Result<(), KvError> {
        self.kv
            .set(NS_PROFILES, &profile.id, serde_json::to_value(profile)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use pretty_assertions::assert_eq;

    fn kv() -> Arc<dyn KvStore> {
        Arc::new(MemoryKv::new())
    }

    #[tokio::test]
    async fn create_starts_pending_at_zero() {
        let store = DocumentStore::new(kv());
        let doc = store
            .create("user-a", "contract.pdf", "user-a/x/contract.pdf", "application/pdf", 1024)
            .await
            .unwrap();

        assert_eq!(doc.analysis_status, AnalysisStatus::Pending);
        assert_eq!(doc.analysis_progress, 0);
        assert_eq!(doc.owner_id, "user-a");

        let fetched = store.get("user-a", &doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, doc.id);
        assert_eq!(fetched.name, "contract.pdf");
    }

    #[tokio::test]
    async fn get_misses_for_other_owner() {
        let store = DocumentStore::new(kv());
        let doc = store
            .create("user-a", "nda.pdf", "user-a/x/nda.pdf", "application/pdf", 10)
            .await
            .unwrap();

        assert!(store.get("user-b", &doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_owner_is_scoped_and_newest_first() {
        let store = DocumentStore::new(kv());
        let first = store
            .create("user-a", "one.pdf", "user-a/1/one.pdf", "application/pdf", 1)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store
            .create("user-a", "two.pdf", "user-a/2/two.pdf", "application/pdf", 2)
            .await
            .unwrap();
        store
            .create("user-b", "other.pdf", "user-b/3/other.pdf", "application/pdf", 3)
            .await
            .unwrap();

        let docs = store.list_by_owner("user-a").await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert!(docs.iter().all(|d| d.owner_id == "user-a"));
    }

    #[tokio::test]
    async fn analysis_store_scopes_by_owner() {
        let store = AnalysisStore::new(kv());
        let analysis = crate::analyzer::canned_analysis("doc-1");
        store.put("user-a", &analysis).await.unwrap();

        assert!(store.get("user-a", "doc-1").await.unwrap().is_some());
        assert!(store.get("user-b", "doc-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn profile_create_is_idempotent() {
        let store = ProfileStore::new(kv());
        let created = store.create("u1", "Ada", "ada@example.com").await.unwrap();
        assert_eq!(created.documents_analyzed, 0);
        assert_eq!(created.tier, "free");

        store.increment_analyzed("u1").await.unwrap();
        // Second signup must not reset the counter
        let again = store.create("u1", "Someone Else", "x@example.com").await.unwrap();
        assert_eq!(again.documents_analyzed, 1);
        assert_eq!(again.name, "Ada");
    }

    #[tokio::test]
    async fn profile_update_merges_partial_fields() {
        let store = ProfileStore::new(kv());
        let created = store.create("u1", "Ada", "ada@example.com").await.unwrap();

        let updated = store
            .apply_update(
                "u1",
                ProfileUpdate {
                    tier: Some("pro".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.tier, "pro");
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.email, "ada@example.com");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn profile_update_missing_user_is_none() {
        let store = ProfileStore::new(kv());
        let result = store
            .apply_update("ghost", ProfileUpdate::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn increment_skips_missing_profile() {
        let store = ProfileStore::new(kv());
        assert!(!store.increment_analyzed("ghost").await.unwrap());

        store.create("u1", "Ada", "ada@example.com").await.unwrap();
        assert!(store.increment_analyzed("u1").await.unwrap());
        assert!(store.increment_analyzed("u1").await.unwrap());
        let profile = store.get("u1").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_are_not_lost() {
        let store = ProfileStore::new(kv());
        store.create("u1", "Ada", "ada@example.com").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_analyzed("u1").await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let profile = store.get("u1").await.unwrap().unwrap();
        assert_eq!(profile.documents_analyzed, 20);
    }
}
