//! Model registry.
//!
//! Maps model ids to tables, per repository. A repository is named after the adapter
//! its models live on, so resolving a model also resolves the connection to use.
//!
//! Manifest format:
//!
//! ```json
//! {
//!   "default": "main",
//!   "repositories": {
//!     "main": {
//!       "users": { "table": "users", "columns": ["id", "name"] }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::db::{ConnectionManager, SqlDataset};
use crate::error::RegistryError;
use crate::models::ModelDef;

type Models = BTreeMap<String, ModelDef>;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    repositories: BTreeMap<String, Models>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    default_repo: Option<String>,
    repos: BTreeMap<String, Models>,
}

impl ModelRegistry {
    pub fn new(default_repo: Option<String>) -> Self {
        Self {
            default_repo,
            repos: BTreeMap::new(),
        }
    }

    /// Load a JSON manifest.
    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::ManifestIo {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            repositories = registry.repos.len(),
            "Loaded model manifest"
        );
        Ok(registry)
    }

    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let manifest: Manifest = serde_json::from_str(text)?;
        let mut registry = Self::new(manifest.default);
        for (repo, models) in manifest.repositories {
            for (model, def) in models {
                registry.register(model, def, &repo);
            }
        }
        Ok(registry)
    }

    pub fn default_repo(&self) -> Option<&str> {
        self.default_repo.as_deref()
    }

    /// Repository used when none is named.
    pub fn set_default_repo(&mut self, repo: impl Into<String>) {
        self.default_repo = Some(repo.into());
    }

    /// The repository named, or the default one.
    pub fn active_repo<'a>(&'a self, repo: Option<&'a str>) -> Result<&'a str, RegistryError> {
        repo.or(self.default_repo.as_deref())
            .ok_or(RegistryError::NoDefaultRepository)
    }

    /// Register `model` in `repo`. A model already registered there is left untouched.
    pub fn register(&mut self, model: impl Into<String>, def: ModelDef, repo: &str) {
        let model = model.into();
        let models = self.repos.entry(repo.to_string()).or_default();
        if models.contains_key(&model) {
            return;
        }
        debug!(repo = %repo, model = %model, table = %def.table, "Registered model");
        models.insert(model, def);
    }

    pub fn known(&self, model: &str, repo: &str) -> bool {
        self.repos
            .get(repo)
            .is_some_and(|models| models.contains_key(model))
    }

    pub fn get(&self, model: &str, repo: Option<&str>) -> Result<&ModelDef, RegistryError> {
        let repo = self.active_repo(repo)?;
        self.repos
            .get(repo)
            .and_then(|models| models.get(model))
            .ok_or_else(|| RegistryError::UnknownModel {
                model: model.to_string(),
                repo: repo.to_string(),
            })
    }

    /// Models of a repository, sorted by id.
    pub fn models(&self, repo: Option<&str>) -> Result<Vec<(&str, &ModelDef)>, RegistryError> {
        let repo = self.active_repo(repo)?;
        let models = self
            .repos
            .get(repo)
            .ok_or_else(|| RegistryError::UnknownRepository {
                repo: repo.to_string(),
            })?;
        Ok(models.iter().map(|(id, def)| (id.as_str(), def)).collect())
    }

    /// Bind a model's table on its repository's adapter.
    pub async fn dataset(
        &self,
        pool: &ConnectionManager,
        model: &str,
        repo: Option<&str>,
    ) -> Result<SqlDataset, RegistryError> {
        let repo = self.active_repo(repo)?;
        let def = self.get(model, Some(repo))?;
        Ok(pool.dataset(Some(repo), &def.table).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "default": "main",
        "repositories": {
            "main": {
                "users": { "table": "users", "columns": ["id", "name"] },
                "orders": { "table": "sales.orders" }
            },
            "archive": {
                "users": { "table": "old_users" }
            }
        }
    }"#;

    #[test]
    fn test_from_json() {
        let registry = ModelRegistry::from_json(MANIFEST).unwrap();
        assert_eq!(registry.default_repo(), Some("main"));

        let users = registry.get("users", None).unwrap();
        assert_eq!(users.table, "users");
        assert_eq!(users.columns, vec!["id", "name"]);

        let archived = registry.get("users", Some("archive")).unwrap();
        assert_eq!(archived.table, "old_users");
        assert!(archived.columns.is_empty());
    }

    #[test]
    fn test_unknown_model_message() {
        let registry = ModelRegistry::from_json(MANIFEST).unwrap();
        let err = registry.get("orders", Some("archive")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The 'orders' model does not exist in the repository 'archive'"
        );
    }

    #[test]
    fn test_register_keeps_first_definition() {
        let mut registry = ModelRegistry::new(Some("main".to_string()));
        registry.register("users", ModelDef::new("users"), "main");
        registry.register("users", ModelDef::new("people"), "main");
        assert_eq!(registry.get("users", None).unwrap().table, "users");
        assert!(registry.known("users", "main"));
        assert!(!registry.known("users", "other"));
    }

    #[test]
    fn test_models_sorted_by_id() {
        let registry = ModelRegistry::from_json(MANIFEST).unwrap();
        let ids: Vec<&str> = registry
            .models(None)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["orders", "users"]);

        assert!(matches!(
            registry.models(Some("missing")),
            Err(RegistryError::UnknownRepository { .. })
        ));
    }

    #[test]
    fn test_active_repo_without_default() {
        let registry = ModelRegistry::default();
        assert!(matches!(
            registry.active_repo(None),
            Err(RegistryError::NoDefaultRepository)
        ));
        assert_eq!(registry.active_repo(Some("x")).unwrap(), "x");
    }

    #[test]
    fn test_invalid_manifest() {
        assert!(matches!(
            ModelRegistry::from_json("{ not json"),
            Err(RegistryError::Manifest(_))
        ));
        let err = ModelRegistry::from_manifest("/nonexistent/models.json").unwrap_err();
        assert!(matches!(err, RegistryError::ManifestIo { .. }));
    }
}
