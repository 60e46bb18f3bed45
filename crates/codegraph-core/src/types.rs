use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for an entity in the code graph. The graph adapter
/// mints these; the justification core treats them as opaque keys.
pub type EntityId = Uuid;

/// Entity kinds as enumerated by the data model (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
    Variable,
    File,
    Module,
}

impl EntityKind {
    /// Whether the kind has a (start_line, end_line) span rather than a
    /// single `line` (true for everything except `Variable`).
    pub fn has_span(self) -> bool {
        !matches!(self, EntityKind::Variable)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::TypeAlias => "type_alias",
            EntityKind::Variable => "variable",
            EntityKind::File => "file",
            EntityKind::Module => "module",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(EntityKind::Function),
            "method" => Ok(EntityKind::Method),
            "class" => Ok(EntityKind::Class),
            "interface" => Ok(EntityKind::Interface),
            "type_alias" => Ok(EntityKind::TypeAlias),
            "variable" => Ok(EntityKind::Variable),
            "file" => Ok(EntityKind::File),
            "module" => Ok(EntityKind::Module),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Directed edge kinds in the code graph (§3 "Relationships").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Calls,
    Imports,
    Extends,
    Implements,
    ExtendsInterface,
    Contains,
    HasMethod,
}

impl RelationshipKind {
    /// Whether this edge kind implies "source's meaning depends on
    /// target's meaning" for the purposes of the dependency scheduler
    /// (§4.2). `contains` and `has_method` are structural, not semantic,
    /// and are not scheduling edges.
    pub fn implies_dependency(self) -> bool {
        matches!(
            self,
            RelationshipKind::Calls
                | RelationshipKind::Imports
                | RelationshipKind::Extends
                | RelationshipKind::Implements
                | RelationshipKind::ExtendsInterface
        )
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipKind::Calls => "calls",
            RelationshipKind::Imports => "imports",
            RelationshipKind::Extends => "extends",
            RelationshipKind::Implements => "implements",
            RelationshipKind::ExtendsInterface => "extends_interface",
            RelationshipKind::Contains => "contains",
            RelationshipKind::HasMethod => "has_method",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calls" => Ok(RelationshipKind::Calls),
            "imports" => Ok(RelationshipKind::Imports),
            "extends" => Ok(RelationshipKind::Extends),
            "implements" => Ok(RelationshipKind::Implements),
            "extends_interface" => Ok(RelationshipKind::ExtendsInterface),
            "contains" => Ok(RelationshipKind::Contains),
            "has_method" => Ok(RelationshipKind::HasMethod),
            other => Err(format!("unknown relationship kind: {other}")),
        }
    }
}

/// A directed edge between two entities, as surfaced by `get_relationships`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: RelationshipKind,
}

/// Kind-specific source range. Spans carry start/end lines; a bare
/// `Line` is used for variables (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SourceRange {
    Span { start_line: u32, end_line: u32 },
    Line(u32),
}

impl SourceRange {
    /// Inclusive line count used by the triviality filter (§4.3).
    pub fn line_count(self) -> u32 {
        match self {
            SourceRange::Span { start_line, end_line } => end_line.saturating_sub(start_line) + 1,
            SourceRange::Line(_) => 1,
        }
    }
}
