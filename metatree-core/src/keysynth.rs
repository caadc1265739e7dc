//! C2 — Key synthesizer.
//!
//! Given a text block (a sub-section's content) and a sort rule, produce a
//! `(key, shape)` pair. Structured keys keep semantically identical entries
//! aligned across branches regardless of file order; the MD5 fallback gives
//! any unnamed entry a deterministic identity so it still round-trips
//! through diff and merge.

use md5::{Digest, Md5};

use crate::config::SortRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Simple,
    Complex,
}

/// Compute the sort key and shape for a block of text under the given rule.
pub fn synthesize_key(block: &str, rule: &SortRule) -> (String, Shape) {
    let lines: Vec<&str> = block.lines().collect();
    let inner = strip_wrapper(&lines);

    let (param_lines, shape) = partition_parameter_region(inner);

    let key = match rule {
        SortRule::Single => Some("#SINGLE#".to_string()),
        SortRule::Content => None,
        SortRule::Tags(tags) => find_first_tag_value(&param_lines, tags),
    };

    match key {
        Some(k) => (k, shape),
        None => (fallback_md5(block), shape),
    }
}

/// Strip a leading `<tag>` line and trailing `</tag>` line, if present.
fn strip_wrapper<'a>(lines: &'a [&'a str]) -> &'a [&'a str] {
    if lines.len() < 2 {
        return lines;
    }
    let first = lines[0].trim();
    let last = lines[lines.len() - 1].trim();
    if is_opening_line(first) && is_closing_line(last) {
        &lines[1..lines.len() - 1]
    } else {
        lines
    }
}

/// Walk lines maintaining a depth counter; lines at depth 0 are the
/// "parameter lines" of this block. Returns those lines (in order) and
/// whether any opening line was seen (COMPLEX) or not (SIMPLE).
fn partition_parameter_region<'a>(lines: &[&'a str]) -> (Vec<&'a str>, Shape) {
    let mut depth: i32 = 0;
    let mut shape = Shape::Simple;
    let mut param_lines = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if is_opening_line(trimmed) {
            depth += 1;
            shape = Shape::Complex;
        } else if is_closing_line(trimmed) {
            depth -= 1;
        } else if depth == 0 {
            param_lines.push(*line);
        }
    }

    (param_lines, shape)
}

/// A bare opening tag line: `<tag>` with no content and no self-close.
fn is_opening_line(trimmed: &str) -> bool {
    trimmed.starts_with('<')
        && trimmed.ends_with('>')
        && !trimmed.starts_with("</")
        && !trimmed.ends_with("/>")
        && !trimmed[1..trimmed.len() - 1].contains('<')
}

/// A closing tag line: `</tag>`.
fn is_closing_line(trimmed: &str) -> bool {
    trimmed.starts_with("</") && trimmed.ends_with('>')
}

/// For each tag in order, find the first `<tag>` occurrence in the joined
/// parameter-line region; the key is the text between the tag and the next
/// `<` after it. First match wins.
fn find_first_tag_value(param_lines: &[&str], tags: &[String]) -> Option<String> {
    let region = param_lines.join("\n");
    for tag in tags {
        let needle = format!("<{tag}>");
        if let Some(start) = region.find(&needle) {
            let after = &region[start + needle.len()..];
            if let Some(end) = after.find('<') {
                return Some(after[..end].to_string());
            }
            return Some(after.to_string());
        }
    }
    None
}

/// Strip leading whitespace on every line, remove line breaks, hex MD5 of
/// the result. The key is exactly 32 lowercase hex characters with no
/// spaces — detectable by the merger via `diffkey::is_fallback_key`.
fn fallback_md5(block: &str) -> String {
    let mut normalized = String::with_capacity(block.len());
    for line in block.lines() {
        normalized.push_str(line.trim_start());
    }
    md5_hex(normalized.as_bytes())
}

/// Hex-encoded MD5 of arbitrary bytes, exposed for the `overwrite`
/// directory whole-file comparison, which reuses the same hash rather
/// than pulling in a second MD5 crate.
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_block_uses_named_tag() {
        let block = "<fields>\n<fullName>Foo__c</fullName>\n<type>Checkbox</type>\n</fields>\n";
        let (key, shape) = synthesize_key(block, &SortRule::Tags(vec!["fullName".to_string()]));
        assert_eq!(key, "Foo__c");
        assert_eq!(shape, Shape::Simple);
    }

    #[test]
    fn complex_block_has_nested_opening_line() {
        let block = "<fields>\n<fullName>Foo__c</fullName>\n<valueSet>\n<valueSetDefinition>\n<value>A</value>\n</valueSetDefinition>\n</valueSet>\n</fields>\n";
        let (key, shape) = synthesize_key(block, &SortRule::Tags(vec!["fullName".to_string()]));
        assert_eq!(key, "Foo__c");
        assert_eq!(shape, Shape::Complex);
    }

    #[test]
    fn single_rule_always_returns_literal() {
        let block = "<indexes/>\n";
        let (key, _) = synthesize_key(block, &SortRule::Single);
        assert_eq!(key, "#SINGLE#");
    }

    #[test]
    fn falls_back_to_md5_when_no_tag_matches() {
        let block = "<listViews>\n<unrelatedTag>x</unrelatedTag>\n</listViews>\n";
        let (key, _) = synthesize_key(block, &SortRule::Tags(vec!["fullName".to_string()]));
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(key, key.to_lowercase());
    }

    #[test]
    fn fallback_key_is_deterministic_and_whitespace_insensitive() {
        let a = "<x>\n  <a>1</a>\n</x>\n";
        let b = "<x>\n<a>1</a>\n</x>\n";
        let (ka, _) = synthesize_key(a, &SortRule::default());
        let (kb, _) = synthesize_key(b, &SortRule::default());
        assert_eq!(ka, kb);
    }

    #[test]
    fn content_rule_always_falls_through() {
        let block = "<x>\n<fullName>Foo</fullName>\n</x>\n";
        let (key, _) = synthesize_key(block, &SortRule::Content);
        assert_eq!(key.len(), 32);
    }
}
