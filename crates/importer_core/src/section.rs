use importer_logging::importer_debug;

/// The mutually exclusive sections of the create flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Section {
    #[default]
    Upload,
    Parsing,
    Preview,
    Progress,
}

impl Section {
    pub fn label(self) -> &'static str {
        match self {
            Section::Upload => "upload",
            Section::Parsing => "parsing",
            Section::Preview => "preview",
            Section::Progress => "progress",
        }
    }
}

/// Exactly one section is visible at a time.
///
/// Holding a single value makes double visibility unrepresentable: showing a
/// section replaces whatever was visible before.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionState {
    visible: Section,
}

impl SectionState {
    pub fn visible(&self) -> Section {
        self.visible
    }

    pub fn is_visible(&self, section: Section) -> bool {
        self.visible == section
    }

    /// Returns true when the visible section changed.
    pub(crate) fn show(&mut self, section: Section) -> bool {
        if self.visible == section {
            return false;
        }
        importer_debug!("section {} -> {}", self.visible.label(), section.label());
        self.visible = section;
        true
    }
}
