//! Tag selection: given a current tag and a repository's available
//! tags, decides whether a strictly newer tag of the same shape exists.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

/// Matches tags with a numeric body: a literal prefix, `.`/`-`
/// separated numeric segments, and a literal suffix. `latest`,
/// `stable`, and similar tags have no numeric body and never match.
static TAG_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)(\d+(?:[.-]\d+)*)(.*)$").expect("static pattern compiles")
});

/// The structural signature of a tag. Two tags belong to the same
/// release line only when their decoration (prefix and suffix) and
/// segment count agree, which keeps e.g. `-alpine` variants from being
/// "updated" to a different variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagShape {
    prefix: String,
    segments: Vec<u64>,
    suffix: String,
}

impl TagShape {
    pub(crate) fn parse(tag: &str) -> Option<Self> {
        let caps = TAG_SHAPE.captures(tag)?;
        let segments = caps[2]
            .split(['.', '-'])
            .map(|segment| segment.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            prefix: caps[1].to_string(),
            segments,
            suffix: caps[3].to_string(),
        })
    }

    fn same_line(&self, other: &Self) -> bool {
        self.prefix == other.prefix
            && self.suffix == other.suffix
            && self.segments.len() == other.segments.len()
    }
}

/// Positional numeric comparison; missing trailing segments read as
/// zero.
fn cmp_segments(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for at in 0..len {
        let ord = a
            .get(at)
            .copied()
            .unwrap_or(0)
            .cmp(&b.get(at).copied().unwrap_or(0));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Returns the best strictly newer tag among `available`, if any.
///
/// Candidates must share `current`'s shape, and the winner must
/// numerically exceed `current`; equal values are never an improvement.
/// When `current` has no numeric body there is nothing to compare
/// against and no update is ever proposed.
pub(crate) fn select_newer(current: &str, available: &[String]) -> Option<String> {
    let current_shape = TagShape::parse(current)?;

    let mut best: Option<(&str, TagShape)> = None;
    for tag in available {
        if tag == current {
            continue;
        }
        let Some(shape) = TagShape::parse(tag) else {
            continue;
        };
        if !shape.same_line(&current_shape) {
            continue;
        }
        match &best {
            Some((_, best_shape))
                if cmp_segments(&shape.segments, &best_shape.segments) != Ordering::Greater => {}
            _ => best = Some((tag, shape)),
        }
    }

    let (tag, shape) = best?;
    (cmp_segments(&shape.segments, &current_shape.segments) == Ordering::Greater)
        .then(|| tag.to_string())
}
