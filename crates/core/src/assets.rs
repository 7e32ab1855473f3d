//! Locating the preview asset (rendered GIF or image) shown next to a record.

use std::path::{Path, PathBuf};

use crate::codec::IMAGE_FIELD_PREFIX;
use crate::record::AnnotationRecord;

/// Default layout of rendered previews below the asset base path.
pub const DEFAULT_ASSET_TEMPLATE: &str =
    "{type}_objects/{subtype}/{category}/thumbnails/merged_views/{model_id}/{model_id}_fixed.gif";

/// Resolves the preview asset for a record.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, record: &AnnotationRecord) -> Option<PathBuf>;
}

/// Parts of a structured `type-subtype-category-modelID` id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdParts<'a> {
    pub kind: &'a str,
    pub subtype: &'a str,
    pub category: &'a str,
    pub model_id: &'a str,
}

impl<'a> IdParts<'a> {
    /// Split a structured id. The model id keeps any further dashes.
    pub fn parse(id: &'a str) -> Option<Self> {
        let mut parts = id.splitn(4, '-');
        let kind = parts.next()?;
        let subtype = parts.next()?;
        let category = parts.next()?;
        let model_id = parts.next()?;
        if [kind, subtype, category, model_id].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            kind,
            subtype,
            category,
            model_id,
        })
    }
}

/// Expands a path template under a base directory.
///
/// Placeholders: `{id}`, `{type}`, `{subtype}`, `{category}`, `{model_id}`.
/// Free-form ids only fill `{id}`; a template that needs the structured parts
/// yields no asset for them. An `image_url` field on the record wins over the
/// template.
#[derive(Debug, Clone)]
pub struct TemplateAssetResolver {
    base_path: PathBuf,
    template: String,
    require_exists: bool,
}

impl TemplateAssetResolver {
    pub fn new(base_path: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            template: template.into(),
            require_exists: true,
        }
    }

    /// Return paths even when nothing exists there yet.
    pub fn allow_missing(mut self) -> Self {
        self.require_exists = false;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn expand(&self, id: &str) -> Option<String> {
        let mut out = self.template.replace("{id}", id);
        if !out.contains('{') {
            return Some(out);
        }
        let parts = IdParts::parse(id)?;
        out = out
            .replace("{type}", parts.kind)
            .replace("{subtype}", parts.subtype)
            .replace("{category}", parts.category)
            .replace("{model_id}", parts.model_id);
        Some(out)
    }

    fn candidate(&self, record: &AnnotationRecord) -> Option<PathBuf> {
        let explicit = record
            .fields
            .get(IMAGE_FIELD_PREFIX)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());
        if let Some(url) = explicit {
            let path = Path::new(url);
            return Some(if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.base_path.join(path)
            });
        }
        self.expand(&record.id).map(|rel| self.base_path.join(rel))
    }
}

impl AssetResolver for TemplateAssetResolver {
    fn resolve(&self, record: &AnnotationRecord) -> Option<PathBuf> {
        let path = self.candidate(record)?;
        if self.require_exists && !path.exists() {
            tracing::debug!(record_id = %record.id, path = %path.display(), "Asset not found");
            return None;
        }
        Some(path)
    }
}

/// A resolver that never finds anything, for deployments without previews.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssets;

impl AssetResolver for NoAssets {
    fn resolve(&self, _record: &AnnotationRecord) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_id_fills_every_placeholder() {
        let resolver = TemplateAssetResolver::new("/data", DEFAULT_ASSET_TEMPLATE).allow_missing();
        let record = AnnotationRecord::new("furniture-indoor-chair-ab12");
        assert_eq!(
            resolver.resolve(&record).unwrap(),
            PathBuf::from(
                "/data/furniture_objects/indoor/chair/thumbnails/merged_views/ab12/ab12_fixed.gif"
            )
        );
    }

    #[test]
    fn model_id_keeps_trailing_dashes() {
        let parts = IdParts::parse("a-b-c-d-e").unwrap();
        assert_eq!(parts.model_id, "d-e");
        assert!(IdParts::parse("a-b-c").is_none());
        assert!(IdParts::parse("a--c-d").is_none());
    }

    #[test]
    fn free_form_id_only_fills_id_placeholder() {
        let simple = TemplateAssetResolver::new("/data", "{id}.gif").allow_missing();
        let record = AnnotationRecord::new("x");
        assert_eq!(simple.resolve(&record).unwrap(), PathBuf::from("/data/x.gif"));

        let structured = TemplateAssetResolver::new("/data", DEFAULT_ASSET_TEMPLATE).allow_missing();
        assert!(structured.resolve(&record).is_none());
    }

    #[test]
    fn image_url_field_wins() {
        let resolver = TemplateAssetResolver::new("/data", "{id}.gif").allow_missing();
        let record = AnnotationRecord::new("x").with_field("image_url", json!("renders/x.png"));
        assert_eq!(resolver.resolve(&record).unwrap(), PathBuf::from("/data/renders/x.png"));

        let absolute = AnnotationRecord::new("x").with_field("image_url", json!("/srv/x.png"));
        assert_eq!(resolver.resolve(&absolute).unwrap(), PathBuf::from("/srv/x.png"));
    }

    #[test]
    fn missing_file_resolves_to_none_by_default() {
        let resolver = TemplateAssetResolver::new("/definitely/not/here", "{id}.gif");
        assert!(resolver.resolve(&AnnotationRecord::new("x")).is_none());
        assert!(NoAssets.resolve(&AnnotationRecord::new("x")).is_none());
    }
}
