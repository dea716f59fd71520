// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Catalog Configuration
//!
//! Configuration manifest of a catalog deployment:
//! - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
//! - Storage backend and deletion policy
//! - Embedding provider, dimensionality and failure policy
//! - Search limits and operation timeouts
//! - Resource schemas enforced by the validator
//!
//! The PostgreSQL migrations create a fixed-width `vector(384)` column, so
//! the postgres backend only accepts `spec.embedding.dimensions: 384`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::embedding::EmbeddingFailurePolicy;
use crate::domain::repository::{DeletionPolicy, PostgresConfig, StorageBackend};
use crate::domain::schema::{ResourceSchema, SchemaRegistry};

pub const API_VERSION: &str = "cloudledger.io/v1";
pub const KIND: &str = "CatalogConfig";

/// Width of the `embedding` column created by the PostgreSQL migrations.
pub const POSTGRES_VECTOR_DIMENSIONS: usize = 384;

/// Upper bound on `spec.lifecycle.operation_timeout_seconds` (one day).
pub const MAX_OPERATION_TIMEOUT_SECONDS: u64 = 86_400;

/// Top-level Kubernetes-style catalog configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfigManifest {
    /// API version (must be "cloudledger.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "CatalogConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: CatalogConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Catalog settings (content under `spec:`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Data schemas keyed by (provider, type)
    #[serde(default)]
    pub schemas: Vec<ResourceSchema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Required for the postgres backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub deletion: DeletionPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::InMemory,
            database_url: None,
            max_connections: default_max_connections(),
            deletion: DeletionPolicy::Physical,
        }
    }
}

impl StorageConfig {
    pub fn backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            StorageBackendKind::InMemory => Ok(StorageBackend::InMemory),
            StorageBackendKind::Postgres => {
                let url = self
                    .database_url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.database_url is required for the postgres backend"))?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                    max_connections: self.max_connections,
                }))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    FeatureHash,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Ollama endpoint, e.g. "http://localhost:11434"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Fixed dimensionality of every stored vector
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub on_failure: EmbeddingFailurePolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::FeatureHash,
            endpoint: None,
            model: None,
            dimensions: default_dimensions(),
            timeout_seconds: default_embedding_timeout(),
            on_failure: EmbeddingFailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Upper bound for `k` in similarity search
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Deadline applied to operations whose caller supplied none
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            operation_timeout_seconds: default_operation_timeout(),
        }
    }
}

impl LifecycleConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_results() -> usize {
    100
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    500
}

fn default_operation_timeout() -> u64 {
    30
}

impl Default for CatalogConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "cloudledger".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: CatalogConfigSpec::default(),
        }
    }
}

impl CatalogConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Standard configuration locations in precedence order:
    /// 1. CLOUDLEDGER_CONFIG_PATH environment variable
    /// 2. ./cloudledger-config.yaml (working directory)
    /// 3. ~/.cloudledger/config.yaml (user home)
    /// 4. /etc/cloudledger/config.yaml (Unix) or C:\ProgramData\CloudLedger\config.yaml (Windows)
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("CLOUDLEDGER_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./cloudledger-config.yaml"));

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".cloudledger").join("config.yaml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/cloudledger/config.yaml"));
        #[cfg(windows)]
        paths.push(PathBuf::from("C:\\ProgramData\\CloudLedger\\config.yaml"));

        paths
    }

    /// Discover configuration file using precedence order
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|path| path.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CLOUDLEDGER_DATABASE_URL") {
            tracing::info!("Environment override: CLOUDLEDGER_DATABASE_URL (postgres backend)");
            self.spec.storage.backend = StorageBackendKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if let Some(val) = lookup("CLOUDLEDGER_EMBEDDING_DIMENSIONS") {
            match val.parse::<usize>() {
                Ok(dimensions) => {
                    tracing::info!("Environment override: CLOUDLEDGER_EMBEDDING_DIMENSIONS={}", dimensions);
                    self.spec.embedding.dimensions = dimensions;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for CLOUDLEDGER_EMBEDDING_DIMENSIONS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("CLOUDLEDGER_DELETION_POLICY") {
            match val.to_lowercase().as_str() {
                "physical" => {
                    tracing::info!("Environment override: CLOUDLEDGER_DELETION_POLICY=physical");
                    self.spec.storage.deletion = DeletionPolicy::Physical;
                }
                "logical" => {
                    tracing::info!("Environment override: CLOUDLEDGER_DELETION_POLICY=logical");
                    self.spec.storage.deletion = DeletionPolicy::Logical;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CLOUDLEDGER_DELETION_POLICY: '{}'. Expected physical/logical. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;

        if spec.storage.backend == StorageBackendKind::Postgres {
            match spec.storage.database_url.as_deref() {
                None | Some("") => anyhow::bail!("spec.storage.database_url is required for the postgres backend"),
                Some(_) => {}
            }
            if spec.storage.max_connections == 0 {
                anyhow::bail!("spec.storage.max_connections must be at least 1");
            }
            if spec.embedding.dimensions != POSTGRES_VECTOR_DIMENSIONS {
                anyhow::bail!(
                    "spec.embedding.dimensions must be {} for the postgres backend (got {})",
                    POSTGRES_VECTOR_DIMENSIONS,
                    spec.embedding.dimensions
                );
            }
        }

        if spec.embedding.dimensions == 0 {
            anyhow::bail!("spec.embedding.dimensions must be at least 1");
        }

        if spec.embedding.provider == EmbeddingProviderKind::Ollama {
            if spec.embedding.endpoint.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("spec.embedding.endpoint is required for the ollama provider");
            }
            if spec.embedding.model.as_deref().is_none_or(str::is_empty) {
                anyhow::bail!("spec.embedding.model is required for the ollama provider");
            }
        }

        if spec.search.max_results == 0 {
            anyhow::bail!("spec.search.max_results must be at least 1");
        }

        if spec.search.default_page_size == 0 || spec.search.default_page_size > spec.search.max_page_size {
            anyhow::bail!(
                "spec.search.default_page_size must be between 1 and max_page_size ({})",
                spec.search.max_page_size
            );
        }

        if spec.lifecycle.operation_timeout_seconds == 0
            || spec.lifecycle.operation_timeout_seconds > MAX_OPERATION_TIMEOUT_SECONDS
        {
            anyhow::bail!(
                "spec.lifecycle.operation_timeout_seconds must be between 1 and {}",
                MAX_OPERATION_TIMEOUT_SECONDS
            );
        }

        let mut seen = std::collections::HashSet::new();
        for schema in &spec.schemas {
            if schema.provider.is_empty() || schema.resource_type.is_empty() {
                anyhow::bail!("Schema provider and type cannot be empty");
            }
            if !seen.insert((schema.provider.as_str(), schema.resource_type.as_str())) {
                anyhow::bail!("Duplicate schema for {}/{}", schema.provider, schema.resource_type);
            }
        }

        Ok(())
    }

    /// Build the validator's registry from the configured schemas
    pub fn schema_registry(&self) -> SchemaRegistry {
        SchemaRegistry::from_schemas(self.spec.schemas.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::FieldKind;
    use std::io::Write;

    const SAMPLE: &str = r#"
apiVersion: cloudledger.io/v1
kind: CatalogConfig
metadata:
  name: test-catalog
spec:
  storage:
    backend: postgres
    database_url: postgres://localhost/cloudledger
    deletion: logical
  embedding:
    provider: ollama
    endpoint: http://localhost:11434
    model: nomic-embed-text
    dimensions: 384
    on_failure: mark_unvectorized
  search:
    max_results: 20
  schemas:
    - provider: aws
      type: vm
      required_fields: [size]
      field_kinds:
        size: string
"#;

    #[test]
    fn test_default_manifest() {
        let manifest = CatalogConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::InMemory);
        assert_eq!(manifest.spec.embedding.dimensions, 384);
        assert_eq!(manifest.spec.embedding.on_failure, EmbeddingFailurePolicy::Abort);
        assert_eq!(manifest.spec.storage.deletion, DeletionPolicy::Physical);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_sample() {
        let manifest = CatalogConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert!(manifest.validate().is_ok());

        assert_eq!(manifest.metadata.name, "test-catalog");
        assert_eq!(manifest.spec.storage.deletion, DeletionPolicy::Logical);
        assert_eq!(manifest.spec.embedding.provider, EmbeddingProviderKind::Ollama);
        assert_eq!(manifest.spec.embedding.model.as_deref(), Some("nomic-embed-text"));
        assert_eq!(manifest.spec.embedding.on_failure, EmbeddingFailurePolicy::MarkUnvectorized);
        assert_eq!(manifest.spec.search.max_results, 20);
        assert_eq!(manifest.spec.search.default_page_size, 50);

        let registry = manifest.schema_registry();
        let schema = registry.lookup("aws", "vm").unwrap();
        assert_eq!(schema.field_kinds.get("size"), Some(&FieldKind::String));

        match manifest.spec.storage.backend().unwrap() {
            StorageBackend::PostgreSQL(pg) => assert_eq!(pg.max_connections, 10),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let manifest = CatalogConfigManifest::from_yaml_str(SAMPLE).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        manifest.to_yaml_file(&path).unwrap();
        let parsed = CatalogConfigManifest::from_yaml_file(&path).unwrap();

        assert_eq!(parsed.spec.embedding.model.as_deref(), Some("nomic-embed-text"));
        assert_eq!(parsed.spec.schemas.len(), 1);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(CatalogConfigManifest::load_or_default(Some(missing)).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"apiVersion: cloudledger.io/v1\nkind: CatalogConfig\nmetadata:\n  name: x\nspec: {}\n")
            .unwrap();
        let loaded = CatalogConfigManifest::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(loaded.metadata.name, "x");
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = CatalogConfigManifest::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("CLOUDLEDGER_DATABASE_URL", "postgres://db/catalog"),
            ("CLOUDLEDGER_EMBEDDING_DIMENSIONS", "not-a-number"),
            ("CLOUDLEDGER_DELETION_POLICY", "LOGICAL"),
        ]);

        manifest.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.storage.backend, StorageBackendKind::Postgres);
        assert_eq!(manifest.spec.storage.database_url.as_deref(), Some("postgres://db/catalog"));
        assert_eq!(manifest.spec.embedding.dimensions, 384);
        assert_eq!(manifest.spec.storage.deletion, DeletionPolicy::Logical);
    }

    #[test]
    fn test_validation() {
        let mut manifest = CatalogConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.storage.backend = StorageBackendKind::Postgres;
        assert!(manifest.validate().is_err());
        manifest.spec.storage.backend = StorageBackendKind::InMemory;

        manifest.spec.embedding.provider = EmbeddingProviderKind::Ollama;
        assert!(manifest.validate().is_err());
        manifest.spec.embedding.provider = EmbeddingProviderKind::FeatureHash;

        manifest.spec.search.default_page_size = 1000;
        assert!(manifest.validate().is_err());
        manifest.spec.search.default_page_size = 50;

        manifest.spec.schemas.push(ResourceSchema::new("aws", "vm"));
        manifest.spec.schemas.push(ResourceSchema::new("aws", "vm"));
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_operation_timeout_bounds() {
        let mut manifest = CatalogConfigManifest::default();

        manifest.spec.lifecycle.operation_timeout_seconds = u64::MAX;
        assert!(manifest.validate().is_err());

        manifest.spec.lifecycle.operation_timeout_seconds = MAX_OPERATION_TIMEOUT_SECONDS + 1;
        assert!(manifest.validate().is_err());

        manifest.spec.lifecycle.operation_timeout_seconds = MAX_OPERATION_TIMEOUT_SECONDS;
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_column_dimensions() {
        let mut manifest = CatalogConfigManifest::from_yaml_str(SAMPLE).unwrap();
        assert!(manifest.validate().is_ok());

        manifest.spec.embedding.dimensions = 768;
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("postgres backend"));

        manifest.spec.storage.backend = StorageBackendKind::InMemory;
        assert!(manifest.validate().is_ok());
    }
}
