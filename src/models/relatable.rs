//! # Relatable References
//!
//! Steps are owned by external domain objects (positions, orders, accounts)
//! through a polymorphic reference. The reference is a plain tagged pair;
//! resolution goes through a small kind registry rather than reflection, so
//! the core never needs to know the owning types.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;

/// Tagged reference to the external domain object a step acts on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatableRef {
    pub kind: String,
    pub id: i64,
}

impl RelatableRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

/// Repository seam for one relatable kind. Implemented by the domain layer;
/// the core only ever asks existence-level questions.
#[async_trait]
pub trait RelatableRepository: Send + Sync {
    /// The kind tag this repository resolves
    fn kind(&self) -> &'static str;

    /// Check the referenced object still exists
    async fn exists(&self, pool: &PgPool, id: i64) -> Result<bool, sqlx::Error>;
}

/// Kind -> repository registry for resolving relatable references
#[derive(Default)]
pub struct RelatableRegistry {
    repositories: RwLock<HashMap<String, Arc<dyn RelatableRepository>>>,
}

impl RelatableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a repository under its kind tag, replacing any previous one
    pub fn register(&self, repository: Arc<dyn RelatableRepository>) {
        self.repositories
            .write()
            .insert(repository.kind().to_string(), repository);
    }

    /// Look up the repository for a kind
    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn RelatableRepository>> {
        self.repositories.read().get(kind).cloned()
    }

    pub fn registered_kinds(&self) -> Vec<String> {
        self.repositories.read().keys().cloned().collect()
    }
}
