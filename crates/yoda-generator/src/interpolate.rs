//! `{{key}}` placeholder substitution in document bodies.

use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};
use yoda_core::{
    Metadata,
    metadata::{display_value, lookup},
};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").expect("valid regex")
});

/// Replace every resolvable placeholder in `text` with its metadata value.
///
/// Keys may be dotted paths (`{{ site.title }}`). Placeholders whose key is
/// not in `metadata` are left verbatim.
pub fn interpolate<'a>(text: &'a str, metadata: &Metadata) -> Cow<'a, str> {
    PLACEHOLDER_RE.replace_all(text, |caps: &Captures<'_>| match lookup(metadata, &caps[1]) {
        Some(value) => display_value(value),
        None => caps[0].to_string(),
    })
}
