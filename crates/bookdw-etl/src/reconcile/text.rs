//! Text normalization helpers
//!
//! Pure string cleanup shared by the reconciler. Lowercasing is only
//! ever applied to dedup keys; display values keep their casing apart
//! from the smart-case rule for all-caps or all-lowercase input.

use chrono::NaiveDate;

/// Collapse internal whitespace runs and trim the ends
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case and whitespace insensitive key for deduplication and comparison
pub fn dedup_key(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

/// Normalize an ISBN to its 13-digit form: strip separators, keep
/// digits only. Returns `None` unless exactly 13 digits remain.
pub fn normalize_isbn13(s: &str) -> Option<String> {
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 13 {
        Some(digits)
    } else {
        None
    }
}

/// Title-case every word (used only when the input carries no casing
/// signal at all)
fn smart_title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                },
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_all_upper(s: &str) -> bool {
    s.chars().any(|c| c.is_alphabetic()) && !s.chars().any(|c| c.is_lowercase())
}

fn is_all_lower(s: &str) -> bool {
    s.chars().any(|c| c.is_alphabetic()) && !s.chars().any(|c| c.is_uppercase())
}

/// Edition and format suffixes that differ between catalogs,
/// e.g. "(Hardcover)", "[Kindle Edition]", "- Revised".
fn strip_edition_suffix(title: &str) -> String {
    const FORMATS: [&str; 7] = [
        "hardcover",
        "paperback",
        "kindle",
        "ebook",
        "e-book",
        "audio",
        "unabridged",
    ];
    const QUALIFIERS: [&str; 3] = ["revised", "annotated", "illustrated"];

    let mut result = title.to_string();
    loop {
        let lower = result.to_lowercase();
        let trimmed = lower.trim_end();

        let mut stripped = None;
        for word in FORMATS.iter().chain(QUALIFIERS.iter()) {
            for wrapped in [
                format!("({})", word),
                format!("[{}]", word),
                format!("- {}", word),
            ] {
                if trimmed.ends_with(&wrapped) {
                    stripped = Some(trimmed.len() - wrapped.len());
                    break;
                }
            }
            if stripped.is_some() {
                break;
            }
        }

        match stripped {
            Some(cut) => {
                result.truncate(cut);
                result = result.trim_end().to_string();
            },
            None => break,
        }
    }
    result
}

/// Clean a title: collapse whitespace, drop edition suffixes, smart
/// case when the input is shouting or whispering, strip stray trailing
/// punctuation.
pub fn clean_title(title: &str) -> Option<String> {
    let mut cleaned = collapse_whitespace(title);
    if cleaned.is_empty() {
        return None;
    }

    cleaned = strip_edition_suffix(&cleaned);

    if is_all_upper(&cleaned) || is_all_lower(&cleaned) {
        cleaned = smart_title_case(&cleaned);
    }

    cleaned = collapse_whitespace(&cleaned);
    let cleaned = cleaned.trim_matches(|c| ".,;:-_".contains(c)).trim().to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Clean a publisher name: whitespace, smart case, canonical legal
/// suffixes, trailing punctuation, isolated region suffix.
pub fn clean_publisher(publisher: &str) -> Option<String> {
    let mut cleaned = collapse_whitespace(publisher);
    if cleaned.is_empty() {
        return None;
    }

    if is_all_upper(&cleaned) || is_all_lower(&cleaned) {
        cleaned = smart_title_case(&cleaned);
    }

    let canonical_suffixes = [
        ("ltd", "Ltd"),
        ("ltd.", "Ltd"),
        ("inc", "Inc"),
        ("inc.", "Inc"),
        ("llc", "LLC"),
        ("llc.", "LLC"),
        ("co", "Co"),
        ("co.", "Co"),
        ("corporation", "Corporation"),
        ("limited", "Limited"),
    ];
    let words: Vec<String> = cleaned
        .split(' ')
        .map(|word| {
            let key = word.to_lowercase();
            canonical_suffixes
                .iter()
                .find(|(pat, _)| *pat == key)
                .map(|(_, repl)| repl.to_string())
                .unwrap_or_else(|| word.to_string())
        })
        .collect();
    cleaned = words.join(" ");

    cleaned = cleaned
        .trim_end_matches(|c: char| ".,;: ".contains(c))
        .to_string();

    for region in ["U.S.", "US", "UK", "EU", "CA", "AU"] {
        let suffix = format!(" {}", region);
        if cleaned.to_uppercase().ends_with(&suffix.to_uppercase()) {
            cleaned.truncate(cleaned.len() - suffix.len());
            cleaned = cleaned.trim_end().to_string();
            break;
        }
    }

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Clean a genre label: lowercase, collapse whitespace, drop a leading
/// "fiction /" or "non-fiction /" catalog prefix, reject overlong labels.
pub fn clean_genre(genre: &str) -> Option<String> {
    let mut cleaned = dedup_key(genre);
    if cleaned.is_empty() {
        return None;
    }

    for prefix in ["fiction /", "fiction/", "non-fiction /", "non-fiction/"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim_start().to_string();
            break;
        }
    }

    if cleaned.is_empty() || cleaned.len() > 100 {
        None
    } else {
        Some(cleaned)
    }
}

/// Normalize a language code to 2-letter ISO 639-1.
///
/// Known 3-letter codes map to their 2-letter form; unknown 3-letter
/// codes pass through unchanged, 2-letter codes are taken as-is,
/// anything else is rejected.
pub fn normalize_language(code: &str) -> Option<String> {
    const THREE_TO_TWO: [(&str, &str); 22] = [
        ("eng", "en"),
        ("fre", "fr"),
        ("fra", "fr"),
        ("ger", "de"),
        ("deu", "de"),
        ("spa", "es"),
        ("rus", "ru"),
        ("ita", "it"),
        ("por", "pt"),
        ("jpn", "ja"),
        ("chi", "zh"),
        ("zho", "zh"),
        ("dut", "nl"),
        ("nld", "nl"),
        ("lat", "la"),
        ("gre", "el"),
        ("ell", "el"),
        ("ara", "ar"),
        ("heb", "he"),
        ("pol", "pl"),
        ("swe", "sv"),
        ("kor", "ko"),
    ];

    let code = code.trim().to_lowercase();
    match code.len() {
        2 => Some(code),
        3 => Some(
            THREE_TO_TWO
                .iter()
                .find(|(three, _)| *three == code)
                .map(|(_, two)| two.to_string())
                .unwrap_or(code),
        ),
        _ => None,
    }
}

/// Parse the date formats the catalogs actually emit:
/// `YYYY-MM-DD`, `YYYY-MM` (first of month), `YYYY` (January 1st).
pub fn parse_published_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() == 10 && s.matches('-').count() == 2 {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }
    if s.len() == 7 && s.matches('-').count() == 1 {
        return NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok();
    }
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(&format!("{}-01-01", s), "%Y-%m-%d").ok();
    }
    None
}
