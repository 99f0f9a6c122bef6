//! Locating image-version references inside YAML text.
//!
//! Extraction is line-oriented on purpose: compose files in the wild
//! carry anchors, comments, and odd indentation that a strict document
//! parse would trip over, and all we need is the field's scalar value.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::config::ConfigError;

/// Comment directive excluding a reference from updates, either on the
/// matching line itself or on a comment line directly above it.
const DISABLE_DIRECTIVE: &str = "tagsweep: disable";

/// How to recognize one image-bearing field and rebuild the full
/// `repository:tag` reference from its captured value.
///
/// The template contains exactly one `?` placeholder; for the built-in
/// `image` field the template is the identity and the captured value is
/// already a full reference.
#[derive(Debug, Clone)]
pub(crate) struct ImagePattern {
    field: String,
    template: String,
    /// Literal template text on either side of the placeholder.
    prefix: String,
    suffix: String,
    line: Regex,
}

impl ImagePattern {
    pub(crate) fn builtin() -> Self {
        Self::new("image", "?").expect("identity template is valid")
    }

    pub(crate) fn new(field: &str, template: &str) -> Result<Self, ConfigError> {
        let placeholders = template.matches('?').count();
        if placeholders != 1 {
            return Err(ConfigError::Template {
                field: field.to_string(),
                template: template.to_string(),
                count: placeholders,
            });
        }
        let (prefix, suffix) = template.split_once('?').expect("placeholder checked above");
        let line = Regex::new(&format!(r"^\s*{}:\s+(.+)$", regex::escape(field)))
            .expect("escaped field name forms a valid pattern");

        Ok(Self {
            field: field.to_string(),
            template: template.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            line,
        })
    }

    pub(crate) fn field(&self) -> &str {
        &self.field
    }

    pub(crate) fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes `value` into the template, yielding the full image
    /// reference.
    pub(crate) fn expand(&self, value: &str) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }

    /// Inverse of [`ImagePattern::expand`]: the field value that would
    /// expand to `repository:tag`. `None` when the placeholder doesn't
    /// cover the changing part of the reference, in which case the
    /// update can't be written back through this pattern.
    pub(crate) fn contract(&self, repository: &str, tag: &str) -> Option<String> {
        let full = format!("{repository}:{tag}");
        let inner = full.strip_prefix(&self.prefix)?.strip_suffix(&self.suffix)?;
        (!inner.is_empty()).then(|| inner.to_string())
    }

    fn capture<'line>(&self, line: &'line str) -> Option<&'line str> {
        Some(self.line.captures(line)?.get(1)?.as_str())
    }
}

/// One image reference found in one file, identified by
/// `(file, line, field)`. The same repository may appear any number of
/// times and each occurrence is planned independently.
#[derive(Debug, Clone)]
pub(crate) struct ImageReference {
    pub(crate) file: Utf8PathBuf,
    /// 1-based.
    pub(crate) line: usize,
    pub(crate) field: String,
    /// The captured field value after quote/comment/anchor cleanup;
    /// this is the text that gets rewritten on update.
    pub(crate) raw_value: String,
    pub(crate) repository: String,
    pub(crate) current_tag: String,
}

/// Scans one file's text against the active patterns, in line order.
/// A line matches at most one pattern; the first configured pattern
/// wins.
pub(crate) fn extract_references(
    file: &Utf8Path,
    text: &str,
    patterns: &[ImagePattern],
) -> Vec<ImageReference> {
    let mut references = Vec::new();
    let mut previous: Option<&str> = None;

    for (index, raw_line) in text.lines().enumerate() {
        let number = index + 1;
        let disabled = raw_line.contains(DISABLE_DIRECTIVE)
            || previous.is_some_and(|line| {
                line.trim_start().starts_with('#') && line.contains(DISABLE_DIRECTIVE)
            });
        previous = Some(raw_line);

        let Some((pattern, captured)) = patterns
            .iter()
            .find_map(|pattern| pattern.capture(raw_line).map(|value| (pattern, value)))
        else {
            continue;
        };

        let value = clean_value(captured);
        if value.is_empty() {
            continue;
        }

        if disabled {
            tracing::info!("{file}:{number}: updates disabled for `{value}`");
            continue;
        }

        let full = pattern.expand(&value);
        let Some((repository, tag)) = split_reference(&full) else {
            tracing::debug!("{file}:{number}: `{full}` has no updatable tag");
            continue;
        };

        references.push(ImageReference {
            file: file.to_path_buf(),
            line: number,
            field: pattern.field().to_string(),
            raw_value: value,
            repository: repository.to_string(),
            current_tag: tag.to_string(),
        });
    }

    references
}

/// Splits a full reference at the *last* colon so that
/// `registry-host:port` prefixes survive. Digest-pinned and untagged
/// references are not update candidates and yield `None`.
fn split_reference(full: &str) -> Option<(&str, &str)> {
    if full.contains('@') {
        return None;
    }
    let (repository, tag) = full.rsplit_once(':')?;
    if repository.is_empty() || tag.is_empty() || tag.contains('/') {
        return None;
    }
    Some((repository, tag))
}

/// Trims the captured remainder of a line down to the bare field value:
/// surrounding whitespace, a leading YAML anchor, a trailing comment,
/// and one pair of surrounding quotes.
fn clean_value(captured: &str) -> String {
    let mut value = captured.trim();

    // `image: &web nginx:1.27.0` — the anchor rides along with the scalar.
    if let Some(rest) = value.strip_prefix('&') {
        value = match rest.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim_start(),
            None => "",
        };
    }

    if let Some(at) = comment_start(value) {
        value = value[..at].trim_end();
    }

    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            value = &value[1..value.len() - 1];
            break;
        }
    }

    value.trim().to_string()
}

fn comment_start(value: &str) -> Option<usize> {
    value.char_indices().find_map(|(at, c)| {
        (c == '#' && (at == 0 || value[..at].ends_with(char::is_whitespace))).then_some(at)
    })
}
