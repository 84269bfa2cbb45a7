use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationCategory {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
}

impl Language {
    /// Label handed to the model, e.g. `English (EN)`.
    pub fn prompt_label(&self) -> String {
        format!("{} ({})", self.name, self.code.to_uppercase())
    }
}

pub const LANGUAGES: [Language; 10] = [
    Language { code: "en", name: "English" },
    Language { code: "de", name: "Deutsch" },
    Language { code: "es", name: "Español" },
    Language { code: "fr", name: "Français" },
    Language { code: "it", name: "Italiano" },
    Language { code: "nl", name: "Nederlands" },
    Language { code: "pl", name: "Polski" },
    Language { code: "pt", name: "Português" },
    Language { code: "ru", name: "Русский" },
    Language { code: "zh", name: "中文" },
];

static LANGUAGE_INDEX: Lazy<HashMap<&'static str, &'static Language>> =
    Lazy::new(|| LANGUAGES.iter().map(|lang| (lang.code, lang)).collect());

pub const DEFAULT_CATEGORIES: [(&str, &str); 3] = [
    ("electronics", "Electronics"),
    ("clothing", "Clothing"),
    ("books", "Books"),
];

/// Generation categories and content languages offered on the import form.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    categories: Vec<GenerationCategory>,
}

impl CategoryRegistry {
    pub fn defaults() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES
                .iter()
                .map(|(slug, name)| GenerationCategory {
                    slug: (*slug).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }

    /// Builds the registry from the persisted list, keeping its order and
    /// falling back to the defaults when none is stored.
    pub fn from_stored(stored: Option<&[GenerationCategory]>) -> Self {
        match stored {
            Some(list) if !list.is_empty() => Self {
                categories: list.to_vec(),
            },
            _ => Self::defaults(),
        }
    }

    pub fn categories(&self) -> &[GenerationCategory] {
        &self.categories
    }

    pub fn category(&self, slug: &str) -> Option<&GenerationCategory> {
        self.categories.iter().find(|c| c.slug == slug)
    }

    pub fn languages(&self) -> &'static [Language] {
        &LANGUAGES
    }

    pub fn language(&self, code: &str) -> Option<&'static Language> {
        LANGUAGE_INDEX.get(code).copied()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
