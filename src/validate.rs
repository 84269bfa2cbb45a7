use crate::catalog::{CategoryRegistry, Language};
use crate::models::ImportForm;
use crate::store::{TargetCategory, TargetCategoryId};
use thiserror::Error;

pub const MIN_PRODUCTS: u8 = 1;
pub const MAX_PRODUCTS: u8 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("OpenAI API key is not configured. Please add it in the settings.")]
    MissingApiKey,
    #[error("Product count must be a whole number between 1 and 25, got '{0}'.")]
    InvalidCount(String),
    #[error("Unknown generation category '{0}'.")]
    UnknownGenerationCategory(String),
    #[error("Unknown content language '{0}'.")]
    UnknownLanguage(String),
    #[error("Unknown product category '{0}'.")]
    UnknownTargetCategory(String),
}

/// A validated import. Only [`CheckedForm::resolve`] builds one.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    count: u8,
    target: TargetCategory,
    generation_slug: String,
    generation_name: String,
    language: &'static Language,
}

impl ImportRequest {
    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn target_category_id(&self) -> TargetCategoryId {
        self.target.id
    }

    pub fn target_category_name(&self) -> &str {
        &self.target.name
    }

    pub fn generation_category(&self) -> &str {
        &self.generation_slug
    }

    pub fn generation_category_name(&self) -> &str {
        &self.generation_name
    }

    pub fn language(&self) -> &'static Language {
        self.language
    }
}

/// Form fields that passed every local check. The target category id is
/// parsed but not yet matched against the store.
#[derive(Debug, Clone)]
pub struct CheckedForm {
    count: u8,
    target_id: Option<TargetCategoryId>,
    raw_target: String,
    generation_slug: String,
    generation_name: String,
    language: &'static Language,
}

impl CheckedForm {
    /// Matches the requested target category against the store's listing.
    pub fn resolve(self, targets: &[TargetCategory]) -> Result<ImportRequest, ValidationError> {
        let target = self
            .target_id
            .and_then(|id| targets.iter().find(|t| t.id == id))
            .ok_or(ValidationError::UnknownTargetCategory(self.raw_target))?;
        Ok(ImportRequest {
            count: self.count,
            target: target.clone(),
            generation_slug: self.generation_slug,
            generation_name: self.generation_name,
            language: self.language,
        })
    }
}

/// Checks everything that needs no store access. The API key is checked
/// first, then each field in form order.
pub fn check_form(
    form: &ImportForm,
    registry: &CategoryRegistry,
    api_key_present: bool,
) -> Result<CheckedForm, ValidationError> {
    if !api_key_present {
        return Err(ValidationError::MissingApiKey);
    }

    let raw_count = form.product_count.trim();
    let count = raw_count
        .parse::<u8>()
        .ok()
        .filter(|n| (MIN_PRODUCTS..=MAX_PRODUCTS).contains(n))
        .ok_or_else(|| ValidationError::InvalidCount(raw_count.to_string()))?;

    let slug = form.generation_category.trim();
    let category = registry
        .category(slug)
        .ok_or_else(|| ValidationError::UnknownGenerationCategory(slug.to_string()))?;

    let code = form.content_language.trim();
    let language = registry
        .language(code)
        .ok_or_else(|| ValidationError::UnknownLanguage(code.to_string()))?;

    let raw_target = form.product_category.trim();
    let target_id = raw_target.parse::<u64>().ok().map(TargetCategoryId);
    if target_id.is_none() {
        return Err(ValidationError::UnknownTargetCategory(raw_target.to_string()));
    }

    Ok(CheckedForm {
        count,
        target_id,
        raw_target: raw_target.to_string(),
        generation_slug: category.slug.clone(),
        generation_name: category.name.clone(),
        language,
    })
}
