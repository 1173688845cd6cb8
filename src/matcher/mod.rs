//! Fuzzy title matching against scraped theme-song index pages.
//!
//! Index pages list one `<li><a href="...">Title</a></li>` entry per series.
//! Matching builds an ordered list of title variants (most specific first)
//! and tries a fixed sequence of anchor patterns for each, so a literal
//! title match always beats a normalized variant and a strict anchor match
//! beats the loose trailing-dash form. Within one pattern the *last* anchor
//! in the document wins, which avoids matching an entry whose title is a
//! prefix of a later one.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// A successful index-page match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMatch {
    /// The title variant that produced the hit.
    pub variant: String,
    /// The anchor pattern template that produced the hit.
    pub pattern: &'static str,
    /// Relative path of the matched content page.
    pub page_path: String,
}

/// Anchor patterns in precedence order. `{title}` is replaced with the
/// regex-escaped title variant before compilation.
/// The href capture excludes `"` so one match never spans two anchors; with
/// that constraint, taking the last left-to-right match yields the same
/// anchor a right-to-left scan would find.
const LINK_PATTERNS: [&str; 4] = [
    r#"<li><a href="/(?P<url>[^"]*?)"\s*>\s*{title}\s*</a></li>"#,
    r#"<li><a href="/(?P<url>[^"]*?)"\s*>\s*{title}\s*-"#,
    r#"<li><a href="/(?P<url>[^"]*?)"\s*>\s*{title}</a></li>"#,
    r#"<li><a href="/(?P<url>[^"]*?)"\s*>\s*{title}\s*- "#,
];

fn paren_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The leading `.` also swallows the separator before the parenthesis.
    RE.get_or_init(|| Regex::new(r".\(.*?\)").expect("static pattern"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[./']").expect("static pattern"))
}

fn theme_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        RegexBuilder::new(r"televisiontunes\.com/uploads/audio/(?P<themesong>.*?)\.mp3")
            .case_insensitive(true)
            .build()
            .expect("static pattern")
    })
}

/// Generate the ordered title variants to try, most specific first.
///
/// 1. the title verbatim
/// 2. `&` replaced with `and`
/// 3. parenthesized suffix removed (e.g. trailing `(2019)`)
/// 4. the characters `. / '` removed
/// 5. the same characters replaced with spaces
/// 6. the part before a `" - "` subtitle separator
///
/// Duplicates of earlier variants are skipped.
pub fn title_variants(title: &str) -> Vec<String> {
    let mut variants: Vec<String> = vec![title.to_string()];

    fn push(variants: &mut Vec<String>, title: &str, candidate: String) {
        if candidate != title && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }

    push(&mut variants, title, title.replace('&', "and"));
    push(
        &mut variants,
        title,
        paren_suffix_re().replace_all(title, "").trim().to_string(),
    );
    push(
        &mut variants,
        title,
        punctuation_re().replace_all(title, "").trim().to_string(),
    );
    push(
        &mut variants,
        title,
        punctuation_re().replace_all(title, " ").trim().to_string(),
    );
    if title.contains(" - ") {
        if let Some(head) = title.split(" - ").next() {
            push(&mut variants, title, head.trim().to_string());
        }
    }

    variants
}

/// Move a leading "The "/"A " article to the end: "The Office" -> "Office, The".
pub fn search_key(title: &str) -> String {
    for article in ["The", "A"] {
        let prefix_len = article.len() + 1;
        if let Some(prefix) = title.get(..prefix_len) {
            if title.len() > prefix_len && prefix.eq_ignore_ascii_case(&format!("{} ", article)) {
                return format!("{}, {}", title[prefix_len..].trim(), article);
            }
        }
    }
    title.to_string()
}

/// Index-section bucket for a title: the first character of its search key,
/// or "numbers" when that character is a digit. `None` for an empty title.
pub fn section_key(title: &str) -> Option<String> {
    let first = search_key(title).chars().next()?;
    if first.is_ascii_digit() {
        Some("numbers".to_string())
    } else {
        Some(first.to_string())
    }
}

/// Find the content-page path for a series title in index-page HTML.
///
/// Tries every (variant, pattern) pair in order and stops at the first hit.
pub fn find_series_page(html: &str, title: &str) -> Option<PageMatch> {
    for variant in title_variants(title) {
        let escaped = regex::escape(&variant);
        for pattern in LINK_PATTERNS {
            let compiled = match RegexBuilder::new(&pattern.replace("{title}", &escaped))
                .case_insensitive(true)
                .build()
            {
                Ok(re) => re,
                Err(err) => {
                    debug!("unusable anchor pattern for {:?}: {}", variant, err);
                    continue;
                }
            };
            // Prefer the last anchor in the document for this pattern.
            if let Some(captures) = compiled.captures_iter(html).last() {
                if let Some(url) = captures.name("url") {
                    debug!("matched variant {:?} with pattern {}", variant, pattern);
                    return Some(PageMatch {
                        variant,
                        pattern,
                        page_path: url.as_str().to_string(),
                    });
                }
            }
        }
    }
    None
}

/// Extract the audio-file name from a content page, entity-decoded.
///
/// The page embeds a `televisiontunes.com/uploads/audio/<name>.mp3` link;
/// the returned value is `<name>` without the extension.
pub fn find_theme_file(html: &str) -> Option<String> {
    let captures = theme_file_re().captures(html)?;
    Some(decode_html_entities(captures.name("themesong")?.as_str()))
}

/// Decode the HTML entities that occur in scraped hrefs.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let decoded = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    None => out.push_str(&tail[..=end]),
                }
            }
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_keep_title_first_and_strip_parenthesized_suffix() {
        let variants = title_variants("The Office (US)");
        assert_eq!(variants[0], "The Office (US)");
        assert!(variants.contains(&"The Office".to_string()));
    }

    #[test]
    fn variants_replace_ampersand() {
        let variants = title_variants("Law & Order");
        assert_eq!(variants[0], "Law & Order");
        assert!(variants.contains(&"Law and Order".to_string()));
    }

    #[test]
    fn variants_handle_punctuation_both_ways() {
        let variants = title_variants("Dr. Who");
        assert!(variants.contains(&"Dr Who".to_string()));
        assert!(variants.contains(&"Dr  Who".to_string()));
    }

    #[test]
    fn variants_drop_subtitles() {
        let variants = title_variants("Stargate - SG1");
        assert!(variants.contains(&"Stargate".to_string()));
    }

    #[test]
    fn variants_skip_duplicates() {
        let variants = title_variants("Friends");
        assert_eq!(variants, vec!["Friends".to_string()]);
    }

    #[test]
    fn search_key_moves_articles() {
        assert_eq!(search_key("The Office (US)"), "Office (US), The");
        assert_eq!(search_key("A Team"), "Team, A");
        assert_eq!(search_key("Friends"), "Friends");
        // No bare-article match without a following word.
        assert_eq!(search_key("The"), "The");
    }

    #[test]
    fn section_key_buckets_digits_into_numbers() {
        assert_eq!(section_key("24").as_deref(), Some("numbers"));
        assert_eq!(section_key("The Office").as_deref(), Some("O"));
        assert_eq!(section_key(""), None);
    }

    #[test]
    fn exact_pattern_beats_trailing_dash_pattern() {
        let html = concat!(
            r#"<li><a href="/y">Show - Theme</a></li>"#,
            r#"<li><a href="/x">Show</a></li>"#,
        );
        let hit = find_series_page(html, "Show").unwrap();
        assert_eq!(hit.page_path, "x");
        assert_eq!(hit.pattern, LINK_PATTERNS[0]);
    }

    #[test]
    fn last_anchor_wins_for_a_single_pattern() {
        let html = concat!(
            r#"<li><a href="/first">Show</a></li>"#,
            r#"<li><a href="/second">Show</a></li>"#,
        );
        let hit = find_series_page(html, "Show").unwrap();
        assert_eq!(hit.page_path, "second");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let html = r#"<li><a href="/x">THE OFFICE</a></li>"#;
        let hit = find_series_page(html, "The Office").unwrap();
        assert_eq!(hit.page_path, "x");
    }

    #[test]
    fn metacharacters_in_titles_are_escaped() {
        let html = r#"<li><a href="/x">What (If)</a></li>"#;
        let hit = find_series_page(html, "What (If)").unwrap();
        assert_eq!(hit.page_path, "x");
        assert_eq!(hit.variant, "What (If)");
    }

    #[test]
    fn normalized_variant_matches_when_literal_does_not() {
        let html = r#"<li><a href="/x">Law and Order</a></li>"#;
        let hit = find_series_page(html, "Law & Order").unwrap();
        assert_eq!(hit.page_path, "x");
        assert_eq!(hit.variant, "Law and Order");
    }

    #[test]
    fn no_match_returns_none() {
        let html = r#"<li><a href="/x">Some Other Show</a></li>"#;
        assert!(find_series_page(html, "Missing Show").is_none());
    }

    #[test]
    fn theme_file_is_extracted_and_decoded() {
        let html = r#"<a href="http://televisiontunes.com/uploads/audio/Law%20&amp;%20Order.mp3">play</a>"#;
        assert_eq!(
            find_theme_file(html).as_deref(),
            Some("Law%20&%20Order")
        );
    }

    #[test]
    fn theme_file_absent_returns_none() {
        assert!(find_theme_file("<html><body>nothing here</body></html>").is_none());
    }

    #[test]
    fn entity_decoding_handles_named_and_numeric_forms() {
        assert_eq!(decode_html_entities("a &amp; b"), "a & b");
        assert_eq!(decode_html_entities("&#039;tis"), "'tis");
        assert_eq!(decode_html_entities("&#x27;tis"), "'tis");
        assert_eq!(decode_html_entities("no entities"), "no entities");
        // Unknown entities pass through untouched.
        assert_eq!(decode_html_entities("&bogus;"), "&bogus;");
        // A dangling ampersand is not an entity.
        assert_eq!(decode_html_entities("fish & chips"), "fish & chips");
    }
}
