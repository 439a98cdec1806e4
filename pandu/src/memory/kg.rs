//! Knowledge-graph lookups: typed entities with short attributes and their
//! relationships. The graph store itself is external; this is the read
//! surface the prompt builder and the `knowledge_graph_search` tool share.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A typed graph node with short attributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KgEntity {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// A directed relationship between two entities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KgRelation {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// Read access to the knowledge graph.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Entities mentioned in (or related to) the query text.
    async fn entity_context(&self, query: &str, limit: usize) -> Vec<KgEntity>;

    /// Outgoing and incoming relations of one entity.
    async fn relations_for(&self, entity: &str) -> Vec<KgRelation>;
}

/// Graph held in memory, loaded once at startup.
pub struct InMemoryKnowledgeGraph {
    entities: Vec<KgEntity>,
    relations: Vec<KgRelation>,
}

impl InMemoryKnowledgeGraph {
    pub fn new(entities: Vec<KgEntity>, relations: Vec<KgRelation>) -> Self {
        Self {
            entities,
            relations,
        }
    }

    /// Seed graph for the business-assistant domain.
    pub fn with_defaults() -> Self {
        let entity = |name: &str, entity_type: &str, attrs: &[(&str, &str)]| KgEntity {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let relation = |source: &str, rel: &str, target: &str| KgRelation {
            source: source.to_string(),
            relation: rel.to_string(),
            target: target.to_string(),
        };
        Self::new(
            vec![
                entity("KITAS", "permit", &[("duration", "1-2 years")]),
                entity("KITAP", "permit", &[("duration", "5 years")]),
                entity("E33G", "visa", &[("holder", "remote worker")]),
                entity("E28A", "visa", &[("holder", "investor")]),
                entity("PT PMA", "company", &[("ownership", "foreign")]),
                entity("NIB", "license", &[("issuer", "OSS")]),
                entity("NPWP", "tax_id", &[("issuer", "DJP")]),
                entity("RPTKA", "plan", &[("scope", "foreign worker employment")]),
            ],
            vec![
                relation("E28A", "grants", "KITAS"),
                relation("E33G", "grants", "KITAS"),
                relation("KITAS", "upgrades_to", "KITAP"),
                relation("PT PMA", "requires", "NIB"),
                relation("PT PMA", "requires", "NPWP"),
                relation("PT PMA", "sponsors", "E28A"),
                relation("RPTKA", "precedes", "KITAS"),
            ],
        )
    }
}

#[async_trait]
impl KnowledgeGraph for InMemoryKnowledgeGraph {
    async fn entity_context(&self, query: &str, limit: usize) -> Vec<KgEntity> {
        let q = query.to_lowercase();
        self.entities
            .iter()
            .filter(|e| q.contains(&e.name.to_lowercase()))
            .take(limit)
            .cloned()
            .collect()
    }

    async fn relations_for(&self, entity: &str) -> Vec<KgRelation> {
        let name = entity.to_lowercase();
        self.relations
            .iter()
            .filter(|r| {
                r.source.to_lowercase() == name || r.target.to_lowercase() == name
            })
            .cloned()
            .collect()
    }
}
