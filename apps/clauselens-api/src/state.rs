//! Application state for the ClauseLens API
//!
//! Built once at startup and passed explicitly into every handler; no
//! global clients.

use anyhow::{Context, Result};
use clauselens_core::{
    AnalysisStore, CannedAnalyzer, DocumentStore, FsObjectStore, KvStore, ObjectStore,
    ProfileStore, RunnerConfig, SqliteKv, StageRunner, UrlSigner,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::auth::TokenVerifier;

pub struct AppState {
    pub documents: DocumentStore,
    pub analyses: AnalysisStore,
    pub profiles: ProfileStore,
    pub objects: Arc<dyn ObjectStore>,
    pub signer: UrlSigner,
    pub runner: StageRunner,
    pub verifier: Arc<dyn TokenVerifier>,
    pub chat_rng: Mutex<StdRng>,
}

impl AppState {
    /// Initialize from the environment: SQLite persistence, filesystem
    /// object storage, JWT bearer verification.
    pub async fn new() -> Result<Self> {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data dir {data_dir}"))?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite:{data_dir}/clauselens.db?mode=rwc"));
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::connect(&database_url).await?);

        let auth_secret =
            std::env::var("AUTH_SECRET").context("AUTH_SECRET must be set")?;
        let url_secret =
            std::env::var("URL_SIGNING_SECRET").unwrap_or_else(|_| auth_secret.clone());

        info!("Object storage root: {}/objects", data_dir);
        let objects: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(format!("{data_dir}/objects")));
        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(crate::auth::JwtVerifier::new(&auth_secret));

        Ok(Self::assemble(
            kv,
            objects,
            verifier,
            RunnerConfig::from_env(),
            &url_secret,
            StdRng::from_entropy(),
        ))
    }

    /// Wire the stores, runner and signer from already-constructed parts.
    pub fn assemble(
        kv: Arc<dyn KvStore>,
        objects: Arc<dyn ObjectStore>,
        verifier: Arc<dyn TokenVerifier>,
        runner_config: RunnerConfig,
        url_secret: &str,
        chat_rng: StdRng,
    ) -> Self {
        let documents = DocumentStore::new(Arc::clone(&kv));
        let analyses = AnalysisStore::new(Arc::clone(&kv));
        let profiles = ProfileStore::new(Arc::clone(&kv));
        let runner = StageRunner::new(
            documents.clone(),
            analyses.clone(),
            profiles.clone(),
            Arc::new(CannedAnalyzer),
            runner_config,
        );

        Self {
            documents,
            analyses,
            profiles,
            objects,
            signer: UrlSigner::new(url_secret),
            runner,
            verifier,
            chat_rng: Mutex::new(chat_rng),
        }
    }
}
