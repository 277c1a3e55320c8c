use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How serious a [`Diagnostic`] is. Ordered from most to least serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
    Remark,
}

impl Severity {
    /// Colour the editor paints the inline message with.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Error => "red",
            Severity::Warning => "yellow",
            Severity::Note => "gray",
            Severity::Remark => "blue",
        }
    }

    /// Symbol shown in the gutter next to the message.
    pub fn symbol(self) -> &'static str {
        match self {
            Severity::Error => "xmark.octagon.fill",
            Severity::Warning => "exclamationmark.triangle.fill",
            Severity::Note => "info.circle.fill",
            Severity::Remark => "info.square.fill",
        }
    }

    pub fn is_blocking(self) -> bool {
        self == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Remark => "remark",
        };
        f.write_str(s)
    }
}

/// One compiler message. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line,
            severity,
            message: message.into(),
        }
    }

    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Error, message)
    }

    pub fn warning(line: u32, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Warning, message)
    }

    pub fn note(line: u32, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Note, message)
    }

    pub fn remark(line: u32, message: impl Into<String>) -> Self {
        Self::new(line, Severity::Remark, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.line, self.severity, self.message)
    }
}

/// Diagnostics of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiagnostics {
    pub file: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Diagnostics of a whole build, grouped per file in phase order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSet {
    files: Vec<FileDiagnostics>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: &str, diagnostic: Diagnostic) {
        match self.files.iter_mut().find(|f| f.file == file) {
            Some(entry) => entry.diagnostics.push(diagnostic),
            None => self.files.push(FileDiagnostics {
                file: file.to_string(),
                diagnostics: vec![diagnostic],
            }),
        }
    }

    pub fn extend(&mut self, file: &str, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(file, d);
        }
    }

    pub fn for_file(&self, file: &str) -> &[Diagnostic] {
        self.files
            .iter()
            .find(|f| f.file == file)
            .map(|f| f.diagnostics.as_slice())
            .unwrap_or(&[])
    }

    pub fn files(&self) -> &[FileDiagnostics] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Diagnostic)> {
        self.files
            .iter()
            .flat_map(|f| f.diagnostics.iter().map(move |d| (f.file.as_str(), d)))
    }

    pub fn has_errors(&self) -> bool {
        self.iter().any(|(_, d)| d.severity.is_blocking())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.iter().filter(|(_, d)| d.severity == severity).count()
    }

    pub fn is_empty(&self) -> bool {
        self.files.iter().all(|f| f.diagnostics.is_empty())
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

/// Target locale of a build; picks the entries of localized literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Jp,
    En,
    Tw,
    Cn,
    Kr,
}

impl Locale {
    pub const ALL: [Locale; 5] = [Locale::Jp, Locale::En, Locale::Tw, Locale::Cn, Locale::Kr];

    pub fn code(self) -> &'static str {
        match self {
            Locale::Jp => "jp",
            Locale::En => "en",
            Locale::Tw => "tw",
            Locale::Cn => "cn",
            Locale::Kr => "kr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Locale::Jp => 0,
            Locale::En => 1,
            Locale::Tw => 2,
            Locale::Cn => 3,
            Locale::Kr => 4,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        Self::ALL.get(b as usize).copied()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::from_code(&s.to_ascii_lowercase()).ok_or_else(|| format!("unknown locale `{s}`"))
    }
}

/// Descriptive fields of a project, carried into the IR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub locale: Locale,
    pub project_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
}

/// `Code/Project.json` of a `.zeileproj` bundle.
///
/// `code_phases` lists the source files in link order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub code_phases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_set_groups_by_file() {
        let mut set = DiagnosticSet::new();
        set.push("a.zeile", Diagnostic::warning(1, "w"));
        set.push("b.zeile", Diagnostic::error(3, "e"));
        set.push("a.zeile", Diagnostic::note(2, "n"));

        assert_eq!(set.files().len(), 2);
        assert_eq!(set.for_file("a.zeile").len(), 2);
        assert_eq!(set.for_file("missing.zeile").len(), 0);
        assert!(set.has_errors());
        assert_eq!(set.count(Severity::Note), 1);
    }

    #[test]
    fn test_project_config_json_keys() {
        let json = r#"{
            "metadata": { "locale": "en", "projectName": "Demo", "author": "me" },
            "codePhases": ["Main.zeile", "Ending.zeile"]
        }"#;
        let config: ProjectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.metadata.locale, Locale::En);
        assert_eq!(config.metadata.description, "");
        assert_eq!(config.code_phases, vec!["Main.zeile", "Ending.zeile"]);
    }

    #[test]
    fn test_locale_codes() {
        for locale in Locale::ALL {
            assert_eq!(Locale::from_code(locale.code()), Some(locale));
            assert_eq!(Locale::from_byte(locale.to_byte()), Some(locale));
        }
        assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
        assert!("xx".parse::<Locale>().is_err());
    }
}
