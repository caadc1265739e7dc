//! The section tree data model shared by C3 (parse), C4 (descend), and C7
//! (reconstruct). A sub-section's `content` is always a contiguous,
//! byte-exact slice of the original file; mutation only ever replaces that
//! string wholesale (whole-subsection `##CHANGE##`/`##DELETE##`) or splices
//! within it (deeper merge actions applied by C4).

use crate::config::ReconstructMode;
use crate::keysynth::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Header,
    Standard,
    Empty,
    Params,
    End,
}

#[derive(Debug, Clone)]
pub struct SubSection {
    pub sort_key: String,
    pub shape: Shape,
    pub content: String,
    /// Whether this entry was dropped during parse (delete rule or merge
    /// `##DELETE##`). Retained (rather than removed from the vec) so
    /// duplicate-key bookkeeping and diagnostics can still see it; the
    /// reconstructor skips it.
    pub deleted: bool,
}

impl SubSection {
    pub fn new(sort_key: impl Into<String>, shape: Shape, content: impl Into<String>) -> Self {
        SubSection {
            sort_key: sort_key.into(),
            shape,
            content: content.into(),
            deleted: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub kind: SectionKind,
    pub reconstruct: ReconstructMode,
    pub entries: Vec<SubSection>,
}

impl Section {
    pub fn new(name: impl Into<String>, kind: SectionKind, reconstruct: ReconstructMode) -> Self {
        Section {
            name: name.into(),
            kind,
            reconstruct,
            entries: Vec::new(),
        }
    }
}

/// A fully parsed file: an ordered list of sections in original order.
#[derive(Debug, Clone, Default)]
pub struct SectionTree {
    pub metadata_type: String,
    pub metadata_name: String,
    pub sections: Vec<Section>,
}

impl SectionTree {
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name == name)
    }
}
