use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::catalog::{CategoryRegistry, GenerationCategory};

pub const DEFAULT_SETTINGS_PATH: &str = "data/settings.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Category name and slug are required for all categories.")]
    EmptyField,
    #[error("Duplicate category slugs are not allowed: {0}")]
    DuplicateSlug(String),
    #[error("At least one category is required.")]
    NoCategories,
    #[error("settings file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SettingsError {
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyField | Self::DuplicateSlug(_) | Self::NoCategories
        )
    }
}

/// The persisted settings record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<GenerationCategory>>,
}

impl Settings {
    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn registry(&self) -> CategoryRegistry {
        CategoryRegistry::from_stored(self.categories.as_deref())
    }

    pub fn view(&self) -> SettingsView {
        SettingsView {
            openai_api_key: self.api_key().map(mask_key),
            api_key_configured: self.api_key().is_some(),
            categories: self
                .registry()
                .categories()
                .iter()
                .map(|c| CategoryRow {
                    name: c.name.clone(),
                    slug: Some(c.slug.clone()),
                })
                .collect(),
        }
    }
}

/// What the settings endpoints return. The key is never echoed in full.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub openai_api_key: Option<String>,
    pub api_key_configured: bool,
    pub categories: Vec<CategoryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRow {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<CategoryRow>>,
}

impl SettingsUpdate {
    /// Applies the update to `current`, returning the new record.
    pub fn apply(&self, current: &Settings) -> Result<Settings, SettingsError> {
        let mut next = current.clone();
        if let Some(key) = &self.openai_api_key {
            let key = key.trim();
            next.openai_api_key = (!key.is_empty()).then(|| key.to_string());
        }
        if let Some(rows) = &self.categories {
            next.categories = Some(normalize_categories(rows)?);
        }
        Ok(next)
    }
}

/// Rows keep the order the operator entered them in.
fn normalize_categories(rows: &[CategoryRow]) -> Result<Vec<GenerationCategory>, SettingsError> {
    if rows.is_empty() {
        return Err(SettingsError::NoCategories);
    }
    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(rows.len());
    for row in rows {
        let name = row.name.trim();
        if name.is_empty() {
            return Err(SettingsError::EmptyField);
        }
        let slug = match row.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slugify(slug),
            _ => slugify(name),
        };
        if slug.is_empty() {
            return Err(SettingsError::EmptyField);
        }
        if !seen.insert(slug.clone()) {
            return Err(SettingsError::DuplicateSlug(slug));
        }
        categories.push(GenerationCategory {
            slug,
            name: name.to_string(),
        });
    }
    Ok(categories)
}

/// Lowercases and collapses every run of characters outside `[a-z0-9]` into
/// a single `-`, trimming dashes at both ends.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let visible: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("****{visible}")
}

/// File-backed settings with an in-memory snapshot.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads `path` (a missing file yields defaults). `env_key` seeds the API
    /// key when the file does not carry one.
    pub async fn load(path: impl Into<PathBuf>, env_key: Option<String>) -> Result<Self, SettingsError> {
        let path = path.into();
        let mut settings = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Settings::default(),
            Ok(raw) => serde_yaml::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "importer.settings", path = %path.display(), "settings file missing, using defaults");
                Settings::default()
            }
            Err(err) => return Err(err.into()),
        };
        if settings.api_key().is_none() {
            settings.openai_api_key = env_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty());
        }
        Ok(Self {
            path,
            current: RwLock::new(settings),
        })
    }

    pub async fn snapshot(&self) -> Settings {
        self.current.read().await.clone()
    }

    pub async fn update(&self, update: &SettingsUpdate) -> Result<Settings, SettingsError> {
        let mut current = self.current.write().await;
        let next = update.apply(&current)?;
        persist(&self.path, &next).await?;
        *current = next.clone();
        info!(
            target: "importer.settings",
            categories = next.registry().categories().len(),
            api_key = next.api_key().is_some(),
            "settings saved"
        );
        Ok(next)
    }
}

async fn persist(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let raw = serde_yaml::to_string(settings)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = path.with_extension("yaml.tmp");
    tokio::fs::write(&staging, raw).await?;
    if let Err(err) = tokio::fs::rename(&staging, path).await {
        warn!(target: "importer.settings", error = %err, "settings rename failed");
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, slug: Option<&str>) -> CategoryRow {
        CategoryRow {
            name: name.into(),
            slug: slug.map(str::to_string),
        }
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Garden & Tools"), "garden-tools");
        assert_eq!(slugify("  --Home Décor 2024!! "), "home-d-cor-2024");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn update_derives_missing_slugs() {
        let update = SettingsUpdate {
            openai_api_key: None,
            categories: Some(vec![
                row("Toys", Some(" ")),
                row("Garden Tools", None),
                row("Books", Some("a-books")),
            ]),
        };
        let next = update.apply(&Settings::default()).expect("valid");
        let categories = next.categories.expect("categories");
        let pairs: Vec<(&str, &str)> = categories
            .iter()
            .map(|c| (c.slug.as_str(), c.name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [("toys", "Toys"), ("garden-tools", "Garden Tools"), ("a-books", "Books")]
        );
    }

    #[test]
    fn update_rejects_bad_rows() {
        let dup = SettingsUpdate {
            openai_api_key: None,
            categories: Some(vec![row("Toys", None), row("TOYS", Some("toys"))]),
        };
        assert!(matches!(
            dup.apply(&Settings::default()),
            Err(SettingsError::DuplicateSlug(slug)) if slug == "toys"
        ));

        let empty = SettingsUpdate {
            openai_api_key: None,
            categories: Some(vec![row("  ", Some("toys"))]),
        };
        assert!(matches!(empty.apply(&Settings::default()), Err(SettingsError::EmptyField)));

        let none = SettingsUpdate {
            openai_api_key: None,
            categories: Some(Vec::new()),
        };
        assert!(matches!(none.apply(&Settings::default()), Err(SettingsError::NoCategories)));
    }

    #[test]
    fn blank_key_clears_and_view_masks() {
        let current = Settings {
            openai_api_key: Some("sk-abcdef123456".into()),
            categories: None,
        };
        assert_eq!(current.view().openai_api_key.as_deref(), Some("****3456"));
        assert_eq!(current.view().categories.len(), 3);

        let cleared = SettingsUpdate {
            openai_api_key: Some("   ".into()),
            categories: None,
        }
        .apply(&current)
        .expect("valid");
        assert_eq!(cleared.api_key(), None);
        assert!(!cleared.view().api_key_configured);
    }

    #[tokio::test]
    async fn load_update_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/settings.yaml");

        let store = SettingsStore::load(&path, Some("sk-env".into()))
            .await
            .expect("load");
        assert_eq!(store.snapshot().await.api_key(), Some("sk-env"));

        store
            .update(&SettingsUpdate {
                openai_api_key: Some("sk-file".into()),
                categories: Some(vec![row("Garden", None), row("Auto Parts", None)]),
            })
            .await
            .expect("update");

        let reloaded = SettingsStore::load(&path, Some("sk-env".into()))
            .await
            .expect("reload");
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.api_key(), Some("sk-file"));
        let slugs: Vec<String> = snapshot
            .registry()
            .categories()
            .iter()
            .map(|c| c.slug.clone())
            .collect();
        assert_eq!(slugs, ["garden", "auto-parts"]);
        assert!(!path.with_extension("yaml.tmp").exists());
    }

    #[tokio::test]
    async fn invalid_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.yaml");
        let store = SettingsStore::load(&path, None).await.expect("load");

        let err = store
            .update(&SettingsUpdate {
                openai_api_key: None,
                categories: Some(Vec::new()),
            })
            .await
            .expect_err("invalid");
        assert!(err.is_invalid_input());
        assert!(!path.exists());
        assert_eq!(store.snapshot().await, Settings::default());
    }
}
