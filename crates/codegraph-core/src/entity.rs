use crate::{EntityId, EntityKind, SourceRange};
use serde::{Deserialize, Serialize};

/// A nameable unit of code, as produced by the (external) source parser and
/// read back through the Graph Adapter. Entities are immutable from the
/// core's viewpoint (§3 "Lifecycles").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub file_path: String,
    pub kind: EntityKind,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub range: SourceRange,
    /// First lines of the entity's source text, used by the token batcher
    /// (§4.4) to estimate prompt cost without re-reading the file.
    pub snippet: Vec<String>,
}

impl Entity {
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        file_path: impl Into<String>,
        kind: EntityKind,
        range: SourceRange,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            file_path: file_path.into(),
            kind,
            signature: None,
            doc_comment: None,
            range,
            snippet: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_doc_comment(mut self, doc: impl Into<String>) -> Self {
        self.doc_comment = Some(doc.into());
        self
    }

    pub fn with_snippet(mut self, lines: Vec<String>) -> Self {
        self.snippet = lines;
        self
    }

    pub fn line_count(&self) -> u32 {
        self.range.line_count()
    }

    pub fn first_doc_line(&self) -> Option<&str> {
        self.doc_comment
            .as_deref()
            .and_then(|d| d.lines().find(|l| !l.trim().is_empty()))
    }

    #[cfg(test)]
    pub fn new_test(name: &str) -> Self {
        Entity::new(
            uuid::Uuid::new_v4(),
            name,
            "test.rs",
            EntityKind::Function,
            crate::SourceRange::Span {
                start_line: 1,
                end_line: 1,
            },
        )
    }
}
