//! Unit types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Unique, stable identifier for a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a new unit ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the `-`/`_` separated segments of the identifier.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .split(['-', '_'])
            .filter(|segment| !segment.is_empty())
    }

    /// Returns true if the ID can be used as a directory name inside the inventory.
    #[must_use]
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.contains(['/', '\\'])
            && self.0 != ".."
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Declared type tag of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Reference knowledge consulted by the agent.
    #[default]
    Knowledge,
    /// Scripted automation the agent executes.
    Automation,
}

impl UnitKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Automation => "automation",
        }
    }

    /// Parses a kind string, falling back to `Knowledge`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "automation" | "script" | "workflow" => Self::Automation,
            _ => Self::Knowledge,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who may invoke a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceMode {
    /// The agent may invoke the unit on its own.
    #[default]
    AutoInvoked,
    /// Only an explicit user request invokes the unit.
    UserOnly,
}

impl AudienceMode {
    /// Returns the audience mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AutoInvoked => "auto_invoked",
            Self::UserOnly => "user_only",
        }
    }
}

/// A capability unit parsed from its descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier.
    pub id: UnitId,
    /// Free-text description from the descriptor.
    pub description: String,
    /// Trigger phrases in declaration order.
    pub triggers: Vec<String>,
    /// Declared tool names in declaration order, without duplicates.
    pub tools: Vec<String>,
    /// Explicitly declared domain objects, if any.
    pub domain: Vec<String>,
    /// Declared type tag.
    pub kind: UnitKind,
    /// Audience mode.
    pub audience: AudienceMode,
    /// Optional declared version.
    pub version: Option<String>,
    /// Free-text body following the front matter.
    pub body: String,
    /// Number of lines in the trimmed body.
    pub body_lines: usize,
    /// Directory the unit was loaded from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Unit {
    /// Creates an empty unit with the given identifier.
    #[must_use]
    pub fn new(id: impl Into<UnitId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the trigger phrases.
    #[must_use]
    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = triggers.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the declared tools.
    #[must_use]
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the body and recomputes the line count.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.body_lines = count_body_lines(&self.body);
        self
    }

    /// Returns true if the unit declares the given tool.
    #[must_use]
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

/// Counts lines of a body after trimming surrounding whitespace.
#[must_use]
pub fn count_body_lines(body: &str) -> usize {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        0
    } else {
        trimmed.lines().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_segments() {
        let id = UnitId::new("email-subject_writer");
        let segments: Vec<&str> = id.segments().collect();
        assert_eq!(segments, vec!["email", "subject", "writer"]);
    }

    #[test]
    fn test_unit_id_path_safety() {
        assert!(UnitId::new("pdf-tools").is_path_safe());
        assert!(!UnitId::new("../etc").is_path_safe());
        assert!(!UnitId::new(".archive").is_path_safe());
        assert!(!UnitId::new("").is_path_safe());
    }

    #[test]
    fn test_unit_kind_parse() {
        assert_eq!(UnitKind::parse("Automation"), UnitKind::Automation);
        assert_eq!(UnitKind::parse("knowledge"), UnitKind::Knowledge);
        assert_eq!(UnitKind::parse("???"), UnitKind::Knowledge);
    }

    #[test]
    fn test_count_body_lines() {
        assert_eq!(count_body_lines(""), 0);
        assert_eq!(count_body_lines("\n\n  \n"), 0);
        assert_eq!(count_body_lines("\none\ntwo\n\n"), 2);
    }

    #[test]
    fn test_builder() {
        let unit = Unit::new("pdf-tools")
            .with_triggers(["edit pdf"])
            .with_tools(["Bash", "Read"])
            .with_body("# PDF\n\nSteps");
        assert_eq!(unit.id.as_str(), "pdf-tools");
        assert!(unit.has_tool("Read"));
        assert_eq!(unit.body_lines, 3);
    }
}
