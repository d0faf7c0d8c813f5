use regex::Regex;
use std::sync::OnceLock;

static NON_ALNUM_RE: OnceLock<Regex> = OnceLock::new();

fn non_alnum_re() -> &'static Regex {
    NON_ALNUM_RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex is valid"))
}

/// Derive an event slug from its title.
///
/// Lower-cases, collapses every run of non-alphanumeric characters into one
/// hyphen and trims hyphens at both ends. An empty result becomes `"event"`.
/// No uniqueness check is made: two events with the same title get the same
/// slug.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let hyphenated = non_alnum_re().replace_all(&lower, "-");
    let slug = hyphenated.trim_matches('-');
    if slug.is_empty() {
        "event".to_string()
    } else {
        slug.to_string()
    }
}
