//! Graph Service - 이웃 문서 조회와 전체 그래프 export

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::documents::{Document, DocumentRepository};
use super::error::WikiResult;
use super::relationships::{Relationship, RelationshipRepository};
use super::store::Store;

/// 이웃 방향 정책
///
/// 관계는 source -> target 방향입니다. `Both`는 들어오는 관계도 이웃으로 봅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborDirection {
    #[default]
    Outgoing,
    Both,
}

impl fmt::Display for NeighborDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => f.write_str("outgoing"),
            Self::Both => f.write_str("both"),
        }
    }
}

impl FromStr for NeighborDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outgoing" | "out" => Ok(Self::Outgoing),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown neighbor direction '{}'", other)),
        }
    }
}

/// 시각화용 그래프 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    pub nodes: Vec<Document>,
    #[serde(rename = "relationships")]
    pub edges: Vec<Relationship>,
}

/// 그래프 서비스
#[derive(Clone)]
pub struct GraphService {
    documents: DocumentRepository,
    relationships: RelationshipRepository,
    direction: NeighborDirection,
}

impl GraphService {
    pub fn new(
        store: Store,
        documents: DocumentRepository,
        relationships: RelationshipRepository,
    ) -> Self {
        let direction = store.config().neighbor_direction;
        Self {
            documents,
            relationships,
            direction,
        }
    }

    pub fn with_direction(mut self, direction: NeighborDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn direction(&self) -> NeighborDirection {
        self.direction
    }

    /// 관련 문서 (관계 생성 순, 중복 제거, 자기 자신 제외)
    pub fn neighbors(&self, id: &str) -> WikiResult<Vec<Document>> {
        self.documents.get(id)?;

        let edges = match self.direction {
            NeighborDirection::Outgoing => self.relationships.list_outgoing(id)?,
            NeighborDirection::Both => self.relationships.list_touching(id)?,
        };
        self.hydrate(id, &edges)
    }

    /// 특정 타입 관계로 연결된 문서
    pub fn neighbors_of_type(&self, id: &str, relationship_type: &str) -> WikiResult<Vec<Document>> {
        self.documents.get(id)?;

        let edges: Vec<Relationship> = match self.direction {
            NeighborDirection::Outgoing => self
                .relationships
                .list_outgoing_typed(id, relationship_type)?,
            NeighborDirection::Both => self
                .relationships
                .list_touching(id)?
                .into_iter()
                .filter(|r| r.relationship_type == relationship_type)
                .collect(),
        };
        self.hydrate(id, &edges)
    }

    /// 전체 그래프 (페이지네이션 없음)
    pub fn export_graph(&self) -> WikiResult<Graph> {
        let nodes = self.documents.list_all()?;
        let edges = self.relationships.list_all()?;

        tracing::debug!(
            "Exported graph: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(Graph { nodes, edges })
    }

    fn hydrate(&self, id: &str, edges: &[Relationship]) -> WikiResult<Vec<Document>> {
        let mut seen = HashSet::new();
        let mut neighbors = Vec::new();

        for edge in edges {
            let other = if edge.source_id == id {
                &edge.target_id
            } else {
                &edge.source_id
            };
            if other == id || !seen.insert(other.clone()) {
                continue;
            }
            if let Some(document) = self.documents.find(other)? {
                neighbors.push(document);
            }
        }

        Ok(neighbors)
    }
}

// ============================================================================
// Tests
// ============================================================================
