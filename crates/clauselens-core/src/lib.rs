//! ClauseLens core - domain logic for contract upload and review
//!
//! Provides the building blocks the HTTP surface is assembled from:
//!
//! - Data model for documents, analyses and profiles
//! - A namespaced key-value store abstraction (SQLite-backed, plus an
//!   in-memory variant for tests)
//! - Typed record stores layered on top of the key-value store
//! - The staged analysis runner that drives a document from `pending`
//!   to `complete`
//! - Object storage with time-limited signed URLs
//! - The canned legal-assistant chat responder

pub mod analyzer;
pub mod chat;
pub mod config;
pub mod kv;
pub mod runner;
pub mod storage;
pub mod store;
pub mod types;

pub use analyzer::{AnalysisProducer, CannedAnalyzer};
pub use chat::{ChatContext, ChatReply};
pub use config::RunnerConfig;
pub use kv::{KvError, KvStore, MemoryKv, SqliteKv};
pub use runner::StageRunner;
pub use storage::{FsObjectStore, ObjectStore, SignedUrl, UrlSigner, DEFAULT_URL_TTL};
pub use store::{AnalysisStore, DocumentStore, ProfileStore};
pub use types::{
    mime_for_filename, mime_supported, Analysis, AnalysisStatus, ClauseFinding, Document, Profile,
    ProfileUpdate,
};
