use experts::{GeochemFinding, SpatialFinding, TabularFinding, TextualFinding};
use extract::Confidence;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

pub const SPATIAL_GEOCHEMICAL: &str = "spatial_geochemical_association";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    SpatialFeature,
    GeochemicalConclusion,
    TabularDataset,
    TextEntity,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub node_type: NodeType,
    pub properties: Map<String, Value>,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
    /// How the edge was established
    pub basis: String,
}

/// Fused view over every expert's output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(skip)]
    node_index: HashMap<String, usize>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node unless one with the same id exists; returns its index.
    pub fn add_node(&mut self, node: GraphNode) -> usize {
        if let Some(&idx) = self.node_index.get(&node.id) {
            return idx;
        }

        let idx = self.nodes.len();
        self.node_index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        idx
    }

    pub fn add_edge(&mut self, edge: GraphEdge) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn nodes_of(&self, node_type: NodeType) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    /// Ids of the nodes sharing an edge with `id`
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter_map(|e| {
                if e.source == id {
                    Some(e.target.as_str())
                } else if e.target == id {
                    Some(e.source.as_str())
                } else {
                    None
                }
            })
            .collect()
    }
}

pub fn spatial_node_id(feature_id: &str) -> String {
    format!("spatial:{}", feature_id)
}

pub fn geochem_node_id(conclusion_id: &str) -> String {
    format!("geochem:{}", conclusion_id)
}

pub fn table_node_id(table_id: &str) -> String {
    format!("table:{}", table_id)
}

pub fn entity_node_id(name: &str) -> String {
    format!("entity:{}", name)
}

/// Lowercase word tokens with surrounding punctuation removed.
pub fn name_tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Names are related when they share at least one token.
pub fn names_related(a: &str, b: &str) -> bool {
    let tokens = name_tokens(a);
    name_tokens(b).iter().any(|t| tokens.contains(t))
}

pub fn build_graph(
    spatial: &SpatialFinding,
    geochem: &GeochemFinding,
    tabular: &TabularFinding,
    textual: &TextualFinding,
) -> KnowledgeGraph {
    let mut graph = KnowledgeGraph::new();

    for feature in &spatial.features {
        let mut properties = Map::new();
        properties.insert("feature_type".into(), json!(feature.feature_type));
        properties.insert("geometry".into(), json!(feature.geometry));
        properties.insert("coordinates".into(), json!(feature.coordinates));
        properties.insert("description".into(), json!(feature.description));
        properties.insert("degenerate".into(), json!(feature.is_degenerate()));

        graph.add_node(GraphNode {
            id: spatial_node_id(&feature.feature_id),
            name: feature.name.clone(),
            node_type: NodeType::SpatialFeature,
            properties,
            confidence: feature.confidence,
        });
    }

    for conclusion in &geochem.conclusions {
        let mut properties = Map::new();
        properties.insert("rock_type".into(), json!(conclusion.rock_type));
        properties.insert("affinity".into(), json!(conclusion.affinity));
        properties.insert("text".into(), json!(conclusion.text));
        properties.insert("evidence_count".into(), json!(conclusion.evidence.len()));

        graph.add_node(GraphNode {
            id: geochem_node_id(&conclusion.conclusion_id),
            name: format!("{} - {}", conclusion.rock_type, conclusion.affinity),
            node_type: NodeType::GeochemicalConclusion,
            properties,
            confidence: conclusion.confidence,
        });
    }

    for table in &tabular.tables {
        let mut properties = Map::new();
        properties.insert("columns".into(), json!(table.columns));
        properties.insert("row_count".into(), json!(table.rows.len()));
        properties.insert("quality".into(), json!(table.quality.overall));

        graph.add_node(GraphNode {
            id: table_node_id(&table.table_id),
            name: table.table_name.clone(),
            node_type: NodeType::TabularDataset,
            properties,
            confidence: Confidence::new(table.quality.overall),
        });
    }

    for entity in &textual.entities {
        let mut properties = Map::new();
        properties.insert("entity_type".into(), json!(entity.entity_type));
        properties.insert("description".into(), json!(entity.description));
        properties.insert("mentions".into(), json!(entity.mentions));

        graph.add_node(GraphNode {
            id: entity_node_id(&entity.name),
            name: entity.name.clone(),
            node_type: NodeType::TextEntity,
            properties,
            confidence: Confidence::UNKNOWN,
        });
    }

    // A single shared name token links a feature to a conclusion
    let links: Vec<GraphEdge> = graph
        .nodes_of(NodeType::SpatialFeature)
        .flat_map(|s| {
            graph
                .nodes_of(NodeType::GeochemicalConclusion)
                .filter(move |g| names_related(&s.name, &g.name))
                .map(move |g| GraphEdge {
                    source: s.id.clone(),
                    target: g.id.clone(),
                    relation: SPATIAL_GEOCHEMICAL.to_string(),
                    basis: "name_token_overlap".to_string(),
                })
        })
        .collect();
    for edge in links {
        graph.add_edge(edge);
    }

    for relation in &textual.relations {
        graph.add_edge(GraphEdge {
            source: entity_node_id(&relation.source),
            target: entity_node_id(&relation.target),
            relation: relation.relation.clone(),
            basis: "text_relation".to_string(),
        });
    }

    graph
}
