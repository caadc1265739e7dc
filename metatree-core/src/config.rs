//! C1 — Config resolver.
//!
//! Configuration is a mapping from scope to options. Scopes are hierarchical
//! names formed by joining metadata type and sub-section names with `-`,
//! e.g. `""` (global), `CustomObject`, `CustomObject-fields-valueSet`.
//!
//! The resolver exposes pure functions; it holds no mutable state.

use std::collections::HashMap;

use crate::diffkey::DEFAULT_SEPARATOR;
use crate::error::{MetatreeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortRule {
    /// Ordered list of tag names; first match in the block wins.
    Tags(Vec<String>),
    /// `#SINGLE#` — key is always the literal string `#SINGLE#`.
    Single,
    /// `#CONTENT#` — always fall through to the MD5 fallback.
    Content,
}

impl Default for SortRule {
    fn default() -> Self {
        SortRule::Tags(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructMode {
    Sort,
    DoNotSort,
}

impl Default for ReconstructMode {
    fn default() -> Self {
        ReconstructMode::Sort
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserMode {
    FullSection,
}

/// A rule for inferring `(type, name)` from a filename in an overwrite
/// directory (the `metadatamap-<dir>` option).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMapRule {
    pub metadata_type: String,
    /// Filename suffixes to strip to recover the artifact name, or
    /// `#BASENAME#` meaning "part before the first dot".
    pub suffixes: Vec<String>,
}

/// Options resolvable at one scope. `None` means "not set at this scope";
/// the resolver walks up the scope chain to find the first `Some`.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub sort: Option<SortRule>,
    pub delete: Option<Vec<String>>,
    pub reconstruct: Option<ReconstructMode>,
    pub filter: Option<Vec<(String, String)>>,
    pub parser_mode: Option<ParserMode>,
}

/// Global-only options that are not meaningfully scoped by type/section.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub merge_dirs: Vec<String>,
    pub overwrite_dirs: Vec<String>,
    pub metadatamap: HashMap<String, Vec<MetadataMapRule>>,
    pub exclude_files: Vec<String>,
    pub diff_key_separator: char,
}

impl GlobalOptions {
    fn new() -> Self {
        GlobalOptions {
            diff_key_separator: DEFAULT_SEPARATOR,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    scopes: HashMap<String, Options>,
    pub global: GlobalOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scopes: HashMap::new(),
            global: GlobalOptions::new(),
        }
    }
}

/// Build the dash-joined scope name from a metadata type and a chain of
/// nested section names, e.g. `scope_name("CustomObject", &["fields", "valueSet"])`
/// → `"CustomObject-fields-valueSet"`.
pub fn scope_name(metadata_type: &str, path: &[&str]) -> String {
    if path.is_empty() {
        return metadata_type.to_string();
    }
    let mut parts = Vec::with_capacity(path.len() + 1);
    parts.push(metadata_type);
    parts.extend_from_slice(path);
    parts.join("-")
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        let raw = parse_sections(text);
        let mut config = Config::default();

        if let Some(entries) = raw.get("") {
            apply_global(&mut config.global, entries)?;
            config.scopes.insert(String::new(), options_from_entries(entries)?);
        }

        for (scope, entries) in &raw {
            if scope.is_empty() {
                continue;
            }
            let opts = options_from_entries(entries)?;
            config.scopes.insert(scope.clone(), opts);
        }

        Ok(config)
    }

    /// Resolve a scoped option: full scope → metadata-type scope → global
    /// (`""`) scope, first hit wins. `scope` is the full dash-joined chain
    /// (e.g. `CustomObject-fields`), `metadata_type` the bare type.
    fn resolve<T: Clone>(
        &self,
        scope: &str,
        metadata_type: &str,
        pick: impl Fn(&Options) -> Option<T>,
    ) -> Option<T> {
        for candidate in [scope, metadata_type, ""] {
            if let Some(opts) = self.scopes.get(candidate) {
                if let Some(v) = pick(opts) {
                    return Some(v);
                }
            }
        }
        None
    }

    pub fn sort_rule(&self, scope: &str, metadata_type: &str) -> SortRule {
        self.resolve(scope, metadata_type, |o| o.sort.clone())
            .unwrap_or_default()
    }

    pub fn delete_substrings(&self, scope: &str, metadata_type: &str) -> Vec<String> {
        self.resolve(scope, metadata_type, |o| o.delete.clone())
            .unwrap_or_default()
    }

    pub fn reconstruct_mode(&self, scope: &str, metadata_type: &str) -> ReconstructMode {
        self.resolve(scope, metadata_type, |o| o.reconstruct)
            .unwrap_or_default()
    }

    pub fn filter(&self, scope: &str, metadata_type: &str) -> Option<Vec<(String, String)>> {
        self.resolve(scope, metadata_type, |o| o.filter.clone())
    }

    pub fn parser_mode(&self, scope: &str, metadata_type: &str) -> Option<ParserMode> {
        self.resolve(scope, metadata_type, |o| o.parser_mode)
    }

    pub fn is_merge_dir(&self, top_level_dir: &str) -> bool {
        self.global.merge_dirs.iter().any(|d| d == top_level_dir)
    }

    pub fn is_overwrite_dir(&self, top_level_dir: &str) -> bool {
        self.global
            .overwrite_dirs
            .iter()
            .any(|d| d == top_level_dir)
    }

    pub fn diff_key_separator(&self) -> char {
        self.global.diff_key_separator
    }

    /// Whether a bare filename is excluded at the top level (prefix match,
    /// preserved intentionally, default
    /// `excludeFiles: . package destructiveChanges`).
    pub fn is_excluded_file(&self, bare_filename: &str) -> bool {
        self.global
            .exclude_files
            .iter()
            .any(|prefix| bare_filename.starts_with(prefix.as_str()))
    }
}

fn parse_sections(text: &str) -> HashMap<String, Vec<(String, String)>> {
    let mut sections: HashMap<String, Vec<(String, String)>> = HashMap::new();
    let mut current = String::new();
    sections.entry(current.clone()).or_default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    sections
}

fn values_for<'a>(entries: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    entries
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

fn apply_global(global: &mut GlobalOptions, entries: &[(String, String)]) -> Result<()> {
    global.merge_dirs = values_for(entries, "merge").iter().map(|s| s.to_string()).collect();
    global.overwrite_dirs = values_for(entries, "overwrite")
        .iter()
        .map(|s| s.to_string())
        .collect();
    global.exclude_files = values_for(entries, "excludeFiles")
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(sep) = values_for(entries, "diffKeySeparator").first() {
        global.diff_key_separator = sep.chars().next().unwrap_or(DEFAULT_SEPARATOR);
    } else {
        global.diff_key_separator = DEFAULT_SEPARATOR;
    }

    for (key, value) in entries {
        if let Some(dir) = key.strip_prefix("metadatamap-") {
            let mut parts = value.split_whitespace();
            let metadata_type = parts
                .next()
                .ok_or_else(|| MetatreeError::Config(format!("empty metadatamap-{dir} rule")))?
                .to_string();
            let suffixes = parts.map(|s| s.to_string()).collect();
            global
                .metadatamap
                .entry(dir.to_string())
                .or_default()
                .push(MetadataMapRule {
                    metadata_type,
                    suffixes,
                });
        }
    }

    Ok(())
}

fn options_from_entries(entries: &[(String, String)]) -> Result<Options> {
    let mut opts = Options::default();

    let sort_values = values_for(entries, "sort");
    if !sort_values.is_empty() {
        opts.sort = Some(match sort_values.as_slice() {
            [one] if *one == "#SINGLE#" => SortRule::Single,
            [one] if *one == "#CONTENT#" => SortRule::Content,
            many => SortRule::Tags(many.iter().map(|s| s.to_string()).collect()),
        });
    }

    let delete_values = values_for(entries, "delete");
    if !delete_values.is_empty() {
        opts.delete = Some(delete_values.iter().map(|s| s.to_string()).collect());
    }

    if let Some(mode) = values_for(entries, "reconstruct").first() {
        opts.reconstruct = Some(match *mode {
            "#DONOTSORT#" => ReconstructMode::DoNotSort,
            _ => ReconstructMode::Sort,
        });
    }

    let filter_values = values_for(entries, "filter");
    if !filter_values.is_empty() {
        let mut pairs = Vec::new();
        for v in filter_values {
            if let Some((name, key)) = v.split_once('.') {
                pairs.push((name.to_string(), key.to_string()));
            }
        }
        opts.filter = Some(pairs);
    }

    if let Some(mode) = values_for(entries, "parser").first() {
        if *mode == "#FULLSECTION#" {
            opts.parser_mode = Some(ParserMode::FullSection);
        }
    }

    Ok(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_scope_then_type_then_global() {
        let text = "\
[CustomObject]
sort=fullName

[CustomObject-fields]
sort=field1
sort=field2
delete=OBSOLETE
";
        let config = Config::parse(text).unwrap();

        assert_eq!(
            config.sort_rule("CustomObject-fields", "CustomObject"),
            SortRule::Tags(vec!["field1".to_string(), "field2".to_string()])
        );
        // Falls back to the type-level scope when the full scope has no rule.
        assert_eq!(
            config.sort_rule("CustomObject-listViews", "CustomObject"),
            SortRule::Tags(vec!["fullName".to_string()])
        );
        // Falls back to the default when nothing matches.
        assert_eq!(config.sort_rule("Flow-nodes", "Flow"), SortRule::default());
    }

    #[test]
    fn parses_global_directory_lists() {
        let text = "\
merge=objects
merge=flows
overwrite=staticresources
excludeFiles=.
excludeFiles=package
excludeFiles=destructiveChanges
metadatamap-staticresources=StaticResource #BASENAME#
";
        let config = Config::parse(text).unwrap();
        assert!(config.is_merge_dir("objects"));
        assert!(config.is_merge_dir("flows"));
        assert!(!config.is_merge_dir("staticresources"));
        assert!(config.is_overwrite_dir("staticresources"));
        assert!(config.is_excluded_file("destructiveChangesPost.xml"));
        assert!(!config.is_excluded_file("Account.object"));
        let rules = &config.global.metadatamap["staticresources"];
        assert_eq!(rules[0].metadata_type, "StaticResource");
        assert_eq!(rules[0].suffixes, vec!["#BASENAME#".to_string()]);
    }

    #[test]
    fn default_separator_is_record_separator() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.diff_key_separator(), DEFAULT_SEPARATOR);
    }
}
