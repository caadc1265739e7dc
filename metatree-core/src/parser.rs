//! C3 — Tree parser.
//!
//! A line-oriented state machine over a metadata file's text. Finds the
//! root tag within the first three lines, then walks top-level lines,
//! committing one sub-section at a time into a `Section`, emitting leaf
//! map entries as it goes (directly, or via `subparser` when deeper
//! structure is needed).

use crate::config::ParserMode;
use crate::context::Context;
use crate::diffkey::{DiffKey, LevelKey};
use crate::error::{MetatreeError, Result};
use crate::keysynth::{self, Shape};
use crate::section::{Section, SectionKind, SectionTree, SubSection};
use crate::subparser;

/// Parse one file's text into a section tree, populating `ctx.leaves` (and,
/// if `ctx.merge_actions` is bound, splicing merge actions) as a side
/// effect.
pub fn parse_file(ctx: &mut Context, text: &str) -> Result<SectionTree> {
    let lines: Vec<&str> = text.lines().collect();
    let (root_idx, type_name) = find_root_tag(&lines).ok_or_else(|| MetatreeError::NotMetadata {
        path: ctx.file_path.clone().into(),
    })?;

    ctx.metadata_type = type_name.clone();
    if ctx.metadata_name.is_empty() {
        ctx.metadata_name = std::path::Path::new(&ctx.file_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    let header_text = lines[..=root_idx].join("\n") + "\n";
    let mut sections = vec![header_section(header_text)];

    let mut pending: Option<Section> = None;
    let mut i = root_idx + 1;
    let end_tag = format!("</{type_name}>");

    while i < lines.len() {
        let raw = lines[i];
        let trimmed = raw.trim();

        if trimmed == end_tag {
            finish_pending(&mut sections, pending.take());
            flush_remaining_creates(&mut sections, ctx);
            let mut end = Section::new(type_name.clone(), SectionKind::End, crate::config::ReconstructMode::Sort);
            end.entries.push(SubSection::new("#SINGLE#", Shape::Simple, format!("{raw}\n")));
            sections.push(end);
            i += 1;
            break;
        }

        if let Some(tag) = self_closing_tag(trimmed) {
            finish_pending(&mut sections, pending.take());
            flush_creates_before(&mut sections, &tag, ctx);
            let scope = ctx.scope(&[&tag]);
            let mode = ctx.config.reconstruct_mode(&scope, &ctx.metadata_type);
            let mut sec = Section::new(tag.clone(), SectionKind::Empty, mode);
            let (content, deleted) = apply_single_merge_action(ctx, &tag, "#SINGLE#", format!("{raw}\n"));
            if !deleted {
                let key = DiffKey::new(ctx.file_path.clone()).with_level(0, LevelKey::structural(&tag, "#SINGLE#"));
                ctx.emit_leaf(key, &content);
            }
            let mut sub = SubSection::new("#SINGLE#", Shape::Simple, content);
            sub.deleted = deleted;
            sec.entries.push(sub);
            sections.push(sec);
            i += 1;
            continue;
        }

        if let Some(inline_value) = param_tag_value(trimmed) {
            finish_pending(&mut sections, pending.take());
            let tag = inline_open_tag_name(trimmed).unwrap_or_default();
            flush_creates_before(&mut sections, &tag, ctx);
            let mut sec = Section::new(tag.clone(), SectionKind::Params, crate::config::ReconstructMode::Sort);
            let (content, deleted) = apply_single_merge_action(ctx, &tag, "#PARAM#", format!("{raw}\n"));
            if !deleted {
                let key = DiffKey::new(ctx.file_path.clone()).with_level(0, LevelKey::structural(&tag, "#PARAM#"));
                ctx.emit_leaf(key, &content);
            }
            let _ = inline_value;
            let mut sub = SubSection::new("#PARAM#", Shape::Simple, content);
            sub.deleted = deleted;
            sec.entries.push(sub);
            sections.push(sec);
            i += 1;
            continue;
        }

        if let Some(tag) = open_only_tag(trimmed) {
            let same_section = pending.as_ref().map(|s| s.name == tag).unwrap_or(false);
            if !same_section {
                finish_pending(&mut sections, pending.take());
                flush_creates_before(&mut sections, &tag, ctx);
                let scope = ctx.scope(&[&tag]);
                let mode = ctx.config.reconstruct_mode(&scope, &ctx.metadata_type);
                pending = Some(Section::new(tag.clone(), SectionKind::Standard, mode));
            }
            let (block_lines, next_i) = collect_until_closing(&lines, i, &tag);
            i = next_i;
            let block = block_lines.join("\n") + "\n";
            commit_subsection(pending.as_mut().expect("just opened"), &tag, block, ctx);
            continue;
        }

        // Stray line between sections (blank or unrecognized) — ignore.
        i += 1;
    }

    finish_pending(&mut sections, pending.take());

    Ok(SectionTree {
        metadata_type: ctx.metadata_type.clone(),
        metadata_name: ctx.metadata_name.clone(),
        sections,
    })
}

fn header_section(text: String) -> Section {
    let mut sec = Section::new("#HEADER#", SectionKind::Header, crate::config::ReconstructMode::DoNotSort);
    sec.entries.push(SubSection::new("#SINGLE#", Shape::Simple, text));
    sec
}

fn finish_pending(sections: &mut Vec<Section>, pending: Option<Section>) {
    if let Some(sec) = pending {
        sections.push(sec);
    }
}

/// Find the root tag within the first three lines: a line of the form
/// `<TYPE ...>` that is not an XML declaration (`<?xml ...?>`) and not a
/// closing/self-closing tag.
fn find_root_tag(lines: &[&str]) -> Option<(usize, String)> {
    for (idx, line) in lines.iter().take(3).enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("<?") || trimmed.starts_with("</") {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('<') {
            let name_end = rest
                .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .unwrap_or(rest.len());
            if name_end > 0 {
                return Some((idx, rest[..name_end].to_string()));
            }
        }
    }
    None
}

pub(crate) fn self_closing_tag(trimmed: &str) -> Option<String> {
    if trimmed.starts_with('<') && !trimmed.starts_with("</") && trimmed.ends_with("/>") {
        let inner = &trimmed[1..trimmed.len() - 2];
        let name_end = inner.find(|c: char| c.is_whitespace()).unwrap_or(inner.len());
        Some(inner[..name_end].to_string())
    } else {
        None
    }
}

pub(crate) fn inline_open_tag_name(trimmed: &str) -> Option<String> {
    if trimmed.starts_with('<') && !trimmed.starts_with("</") {
        let after = &trimmed[1..];
        let name_end = after.find('>')?;
        Some(after[..name_end].to_string())
    } else {
        None
    }
}

/// `<tag>value</tag>` on a single line — returns the inner value.
pub(crate) fn param_tag_value(trimmed: &str) -> Option<String> {
    if !trimmed.starts_with('<') || trimmed.starts_with("</") || trimmed.ends_with("/>") {
        return None;
    }
    let tag = inline_open_tag_name(trimmed)?;
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    if trimmed.starts_with(&open) && trimmed.ends_with(&close) && trimmed.len() > open.len() + close.len() - 1 {
        Some(trimmed[open.len()..trimmed.len() - close.len()].to_string())
    } else {
        None
    }
}

/// A bare `<tag>` line — open tag, no content, no self-close.
pub(crate) fn open_only_tag(trimmed: &str) -> Option<String> {
    if trimmed.starts_with('<') && !trimmed.starts_with("</") && trimmed.ends_with('>') && !trimmed.ends_with("/>") {
        let inner = &trimmed[1..trimmed.len() - 1];
        if !inner.contains('<') {
            return Some(inner.to_string());
        }
    }
    None
}

/// Gather lines `[start..]` up to and including the line `</tag>`.
pub(crate) fn collect_until_closing<'a>(lines: &[&'a str], start: usize, tag: &str) -> (Vec<&'a str>, usize) {
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut i = start;
    while i < lines.len() {
        out.push(lines[i]);
        if lines[i].trim() == close {
            i += 1;
            break;
        }
        i += 1;
    }
    (out, i)
}

/// Commit one Standard sub-section.
fn commit_subsection(section: &mut Section, tag: &str, block: String, ctx: &mut Context) {
    let scope = ctx.scope(&[tag]);
    let deletes = ctx.config.delete_substrings(&scope, &ctx.metadata_type);
    if !deletes.is_empty() && deletes.iter().all(|d| block.contains(d.as_str())) {
        return;
    }

    let rule = ctx.config.sort_rule(&scope, &ctx.metadata_type);
    let (key, shape) = keysynth::synthesize_key(&block, &rule);

    let merge_node_key = format!("{tag}={key}");
    let has_merge_action = ctx
        .merge_actions
        .as_ref()
        .map(|t| t.child(&merge_node_key).is_some())
        .unwrap_or(false);

    if let Some(filter) = ctx.config.filter(&scope, &ctx.metadata_type) {
        let retained = filter
            .iter()
            .any(|(name, fkey)| name == &ctx.metadata_name && fkey == &key);
        if !retained && !has_merge_action {
            return;
        }
    }

    let child_scope = ctx.scope(&[tag, &key]);
    let has_sub_filter = ctx.config.filter(&child_scope, &ctx.metadata_type).is_some();
    let parser_mode = ctx.config.parser_mode(&scope, &ctx.metadata_type);

    let needs_descend = shape == Shape::Complex
        && parser_mode != Some(ParserMode::FullSection)
        && (ctx.report || has_sub_filter || has_merge_action);

    let (content, deleted) = if needs_descend {
        let node = ctx.merge_actions.as_mut().and_then(|t| t.child_owned(&merge_node_key));
        subparser::parse_children(ctx, tag, &key, block, node)
    } else {
        let (content, deleted) = apply_single_merge_action(ctx, tag, &key, block);
        if !deleted {
            let leaf_key = DiffKey::new(ctx.file_path.clone()).with_level(0, LevelKey::structural(tag, &key));
            ctx.emit_leaf(leaf_key, &content);
        }
        (content, deleted)
    };

    let mut sub = SubSection::new(key, shape, content);
    sub.deleted = deleted;
    section.entries.push(sub);
}

/// Apply a `##CHANGE##`/`##DELETE##` action bound exactly at `(section, key)`,
/// without descending further — used for Header/Empty/Params and for
/// Standard sub-sections whose content is kept flat.
fn apply_single_merge_action(ctx: &mut Context, section: &str, key: &str, content: String) -> (String, bool) {
    let merge_node_key = format!("{section}={key}");
    let Some(tree) = ctx.merge_actions.as_mut() else {
        return (content, false);
    };
    let Some(mut node) = tree.child_owned(&merge_node_key) else {
        return (content, false);
    };
    let content = node.take_change().unwrap_or(content);
    let deleted = node.take_delete();
    (content, deleted)
}

/// Flush pending creates for every section whose name sorts strictly before
/// `next_section_name` — new sections that never appeared in the target at
/// all. Called just before opening `next_section_name`.
fn flush_creates_before(sections: &mut Vec<Section>, next_section_name: &str, ctx: &mut Context) {
    flush_creates(sections, ctx, |name| name < next_section_name);
}

/// At end of file, flush everything still pending.
fn flush_remaining_creates(sections: &mut Vec<Section>, ctx: &mut Context) {
    flush_creates(sections, ctx, |_| true);
}

fn flush_creates(sections: &mut Vec<Section>, ctx: &mut Context, keep: impl Fn(&str) -> bool) {
    let Some(tree) = ctx.merge_actions.as_mut() else {
        return;
    };
    let mut names: Vec<String> = tree.pending_sections().into_iter().filter(|n| keep(n)).collect();
    names.sort();

    for name in names {
        let creates = tree.creates_for(&name);
        if creates.is_empty() {
            continue;
        }
        let existing_idx = sections.iter().position(|s| s.name == name);
        let idx = match existing_idx {
            Some(idx) => idx,
            None => {
                sections.push(Section::new(name.clone(), SectionKind::Standard, crate::config::ReconstructMode::Sort));
                sections.len() - 1
            }
        };
        insert_creates_sorted(&mut sections[idx], creates);
    }
}

/// Splice a batch of `##CREATE##` entries into a section's entries in
/// sorted order relative to existing keys; MD5-fallback keys (no natural
/// order) are appended at the end.
pub fn insert_creates_sorted(section: &mut Section, creates: Vec<crate::merger::CreateEntry>) {
    for create in creates {
        if crate::diffkey::is_fallback_key(&create.sort_key) {
            // No natural identity to dedupe on; a re-run is idempotent only
            // if the exact same content was already spliced in earlier.
            let already_present = section.entries.iter().any(|e| e.content == create.content);
            if already_present {
                continue;
            }
            section.entries.push(SubSection::new(create.sort_key, Shape::Complex, create.content));
            continue;
        }
        let already_present = section.entries.iter().any(|e| e.sort_key == create.sort_key);
        if already_present {
            continue;
        }
        let pos = section
            .entries
            .iter()
            .position(|e| !crate::diffkey::is_fallback_key(&e.sort_key) && e.sort_key > create.sort_key)
            .unwrap_or(section.entries.len());
        section
            .entries
            .insert(pos, SubSection::new(create.sort_key, Shape::Complex, create.content));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn base_config() -> Config {
        Config::parse("[CustomObject-fields]\nsort=fullName\n").unwrap()
    }

    #[test]
    fn finds_root_tag_and_parses_header() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "Account.object");
        let text = "<?xml version=\"1.0\"?>\n<CustomObject xmlns=\"x\">\n<label>Account</label>\n</CustomObject>\n";
        let tree = parse_file(&mut ctx, text).unwrap();
        assert_eq!(tree.metadata_type, "CustomObject");
        assert_eq!(tree.sections[0].kind, SectionKind::Header);
        assert_eq!(tree.sections.last().unwrap().kind, SectionKind::End);
    }

    #[test]
    fn non_metadata_file_is_rejected() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "readme.txt");
        let err = parse_file(&mut ctx, "just some text\nno tags here\nat all\n").unwrap_err();
        assert!(matches!(err, MetatreeError::NotMetadata { .. }));
    }

    #[test]
    fn standard_section_entries_get_flat_leaves() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "Account.object");
        let text = "\
<CustomObject xmlns=\"x\">
<fields>
<fullName>Foo__c</fullName>
<type>Checkbox</type>
</fields>
<fields>
<fullName>Bar__c</fullName>
<type>Text</type>
</fields>
</CustomObject>
";
        let tree = parse_file(&mut ctx, text).unwrap();
        let fields = tree.sections.iter().find(|s| s.name == "fields").unwrap();
        assert_eq!(fields.entries.len(), 2);
        assert_eq!(fields.entries[0].sort_key, "Foo__c");
        assert_eq!(ctx.leaves.len(), 2);
    }

    #[test]
    fn param_and_empty_sections_recognized() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "Account.object");
        let text = "<CustomObject xmlns=\"x\">\n<version>1.0</version>\n<indexes/>\n</CustomObject>\n";
        let tree = parse_file(&mut ctx, text).unwrap();
        assert!(tree.sections.iter().any(|s| s.kind == SectionKind::Params && s.name == "version"));
        assert!(tree.sections.iter().any(|s| s.kind == SectionKind::Empty && s.name == "indexes"));
    }

    #[test]
    fn params_and_empty_and_end_content_keep_trailing_newline() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "Account.object");
        let text = "<CustomObject xmlns=\"x\">\n<version>1.0</version>\n<indexes/>\n</CustomObject>\n";
        let tree = parse_file(&mut ctx, text).unwrap();

        let version = tree.sections.iter().find(|s| s.name == "version").unwrap();
        assert_eq!(version.entries[0].content, "<version>1.0</version>\n");

        let indexes = tree.sections.iter().find(|s| s.name == "indexes").unwrap();
        assert_eq!(indexes.entries[0].content, "<indexes/>\n");

        let end = tree.sections.last().unwrap();
        assert_eq!(end.entries[0].content, "</CustomObject>\n");

        assert_eq!(crate::reconstruct::render(&tree), text);
    }

    #[test]
    fn report_mode_descends_into_complex_sections_without_filter_or_merge() {
        let config = base_config();
        let mut ctx = Context::new(&config, "SRC", "Account.object");
        ctx.report = true;
        let text = "\
<CustomObject xmlns=\"x\">
<fields>
<fullName>Foo__c</fullName>
<valueSet>
<valueSetDefinition>
<value>A</value>
</valueSetDefinition>
</valueSet>
</fields>
</CustomObject>
";
        parse_file(&mut ctx, text).unwrap();
        assert!(ctx.leaves.keys().any(|k| k.contains(&crate::diffkey::LevelKey::Contents)));
        assert!(ctx.leaves.keys().any(|k| k.contains(&crate::diffkey::LevelKey::Params)));
    }

    #[test]
    fn insert_creates_sorted_is_idempotent_on_rerun() {
        use crate::merger::CreateEntry;

        let mut section = Section::new("fields", SectionKind::Standard, crate::config::ReconstructMode::Sort);
        section.entries.push(SubSection::new("Bar__c", Shape::Complex, "<fields>\n<fullName>Bar__c</fullName>\n</fields>\n"));

        let create = CreateEntry {
            sort_key: "Foo__c".to_string(),
            content: "<fields>\n<fullName>Foo__c</fullName>\n</fields>\n".to_string(),
        };
        insert_creates_sorted(&mut section, vec![create.clone()]);
        assert_eq!(section.entries.len(), 2);

        // Re-running the same merge (e.g. against an already-updated target
        // whose text now contains "Foo__c") must not duplicate the entry.
        insert_creates_sorted(&mut section, vec![create]);
        assert_eq!(section.entries.len(), 2);
    }
}
