//! Contracts for the external knowledge-base collaborators.
//!
//! The core never talks to a graph database or ontology editor directly; it
//! consumes the narrow read-only surfaces below. Implementations live with
//! the host application.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::types::RagError;

/// One row of a structured query result.
pub type QueryRow = serde_json::Map<String, serde_json::Value>;

/// A pre-rendered fragment of graph data, ready for text chunking.
#[derive(Clone, Debug)]
pub struct GraphChunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl GraphChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Property-graph collaborator: query execution, schema introspection, and
/// bulk chunk candidates for indexing.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Executes a structured query string and returns its rows.
    async fn execute_query(&self, query: &str) -> Result<Vec<QueryRow>, RagError>;

    /// Human-readable schema description (node labels, relationship types),
    /// used when translating natural-language questions into queries.
    async fn describe_schema(&self) -> Result<String, RagError>;

    /// Text renderings of the graph's nodes and relationships for indexing.
    async fn chunk_candidates(&self) -> Result<Vec<GraphChunk>, RagError>;
}

/// Kind of named ontology entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Class,
    ObjectProperty,
    DataProperty,
    Individual,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Class => "Class",
            EntityKind::ObjectProperty => "ObjectProperty",
            EntityKind::DataProperty => "DataProperty",
            EntityKind::Individual => "Individual",
        };
        f.write_str(label)
    }
}

/// A named entity with enough detail to render a textual description:
/// annotations (`rdfs:label`-style key/value pairs) plus axiom-derived facts
/// (superclasses, domains/ranges, types, property assertions).
#[derive(Clone, Debug)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub label: String,
    pub iri: String,
    pub annotations: Vec<(String, String)>,
    pub facts: Vec<(String, String)>,
}

impl EntityRecord {
    pub fn new(kind: EntityKind, label: impl Into<String>, iri: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            iri: iri.into(),
            annotations: Vec::new(),
            facts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_fact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.facts.push((key.into(), value.into()));
        self
    }
}

/// Ontology collaborator: read-only enumeration of named entities.
pub trait EntitySource: Send + Sync {
    fn entities(&self) -> Result<Vec<EntityRecord>, RagError>;
}

/// Renders one entity into the text block that gets chunked and embedded.
pub fn render_entity(entity: &EntityRecord) -> String {
    let mut text = String::new();
    text.push_str(&format!("{}: {}\n", entity.kind, entity.label));
    text.push_str(&format!("IRI: {}\n", entity.iri));
    for (property, value) in &entity.annotations {
        text.push_str(&format!("{property}: {value}\n"));
    }
    for (name, value) in &entity.facts {
        text.push_str(&format!("{name}: {value}\n"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_rendering_lists_annotations_and_facts() {
        let entity = EntityRecord::new(
            EntityKind::Individual,
            "Case 42",
            "http://example.org/legal#case42",
        )
        .with_annotation("comment", "A sample case")
        .with_fact("Type", "CourtCase")
        .with_fact("filedIn", "District Court");

        let text = render_entity(&entity);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Individual: Case 42");
        assert_eq!(lines[1], "IRI: http://example.org/legal#case42");
        assert_eq!(lines[2], "comment: A sample case");
        assert_eq!(lines[3], "Type: CourtCase");
        assert_eq!(lines[4], "filedIn: District Court");
    }

    #[test]
    fn entity_kinds_display_like_owl() {
        assert_eq!(EntityKind::Class.to_string(), "Class");
        assert_eq!(EntityKind::ObjectProperty.to_string(), "ObjectProperty");
    }
}
