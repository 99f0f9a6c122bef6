//! Run configuration: the file-match glob and the active image
//! patterns, validated before any scanning begins.

use camino::Utf8Path;
use globset::{Glob, GlobMatcher};
use indexmap::IndexMap;
use thiserror::Error;

use crate::{App, extract::ImagePattern};

/// Default file selection: docker-compose manifests anywhere in the
/// tree.
pub(crate) const DEFAULT_FILE_MATCH: &str = "**/docker-compose.y*ml";

/// Configuration errors are fatal and pre-flight: none of them can
/// occur once scanning has started.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid extra-fields JSON")]
    ExtraFields(#[source] serde_json::Error),

    #[error(
        "template for field `{field}` must contain exactly one `?` placeholder, found {count}: `{template}`"
    )]
    Template {
        field: String,
        template: String,
        count: usize,
    },

    #[error("invalid file-match glob")]
    Glob(#[from] globset::Error),
}

pub(crate) struct Config {
    file_match: GlobMatcher,
    patterns: Vec<ImagePattern>,
    dry_run: bool,
}

impl Config {
    pub(crate) fn new(app: &App) -> Result<Self, ConfigError> {
        // The action runner passes unset inputs through as empty
        // strings; treat those like absent.
        let extra_fields = match app.extra_fields.as_deref().map(str::trim) {
            None | Some("") => IndexMap::new(),
            Some(raw) => serde_json::from_str::<IndexMap<String, String>>(raw)
                .map_err(ConfigError::ExtraFields)?,
        };

        Self::build(&app.file_match, &extra_fields, app.dry)
    }

    pub(crate) fn build(
        file_match: &str,
        extra_fields: &IndexMap<String, String>,
        dry_run: bool,
    ) -> Result<Self, ConfigError> {
        // The built-in pattern always comes first: for an ambiguous
        // line, the first configured pattern wins.
        let mut patterns = vec![ImagePattern::builtin()];
        for (field, template) in extra_fields {
            patterns.push(ImagePattern::new(field, template)?);
        }

        Ok(Self {
            file_match: Glob::new(file_match)?.compile_matcher(),
            patterns,
            dry_run,
        })
    }

    pub(crate) fn patterns(&self) -> &[ImagePattern] {
        &self.patterns
    }

    pub(crate) fn pattern(&self, field: &str) -> Option<&ImagePattern> {
        self.patterns.iter().find(|pattern| pattern.field() == field)
    }

    /// Matches `path` (relative to the scan root) against the
    /// file-match glob.
    pub(crate) fn matches_path(&self, path: &Utf8Path) -> bool {
        self.file_match.is_match(path.as_std_path())
    }

    pub(crate) fn dry_run(&self) -> bool {
        self.dry_run
    }
}
