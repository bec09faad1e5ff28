//! Relationship Repository - 문서 간 방향성 엣지
//!
//! (source_id, target_id, relationship_type) 조합은 유일합니다.
//! 생성 시 두 엔드포인트의 id 락을 잡은 상태에서 존재를 확인하고,
//! INSERT 문 자체도 `EXISTS` 조건으로 다시 검증합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::documents::{format_timestamp, now, parse_timestamp, DocumentRepository};
use super::error::{WikiError, WikiResult};
use super::query::{Condition, Literal, Order, Query, Relation};
use super::store::Store;

const RELATIONSHIP_COLUMNS: &[&str] = &[
    "source_id",
    "target_id",
    "relationship_type",
    "properties",
    "created_at",
];

/// 문서 간 관계 (source -> target)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    /// 자유 형식 속성 (JSON 객체)
    #[serde(default = "empty_properties")]
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

fn empty_properties() -> Value {
    Value::Object(Default::default())
}

/// 관계 저장소
#[derive(Clone)]
pub struct RelationshipRepository {
    store: Store,
    documents: DocumentRepository,
}

impl RelationshipRepository {
    pub fn new(store: Store, documents: DocumentRepository) -> Self {
        Self { store, documents }
    }

    /// 관계 생성
    pub async fn create(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: &str,
    ) -> WikiResult<Relationship> {
        self.create_with_properties(source_id, target_id, relationship_type, empty_properties())
            .await
    }

    /// 속성을 포함한 관계 생성
    ///
    /// - 엔드포인트가 없으면 `Validation`
    /// - 같은 조합이 이미 있으면 `Conflict`
    pub async fn create_with_properties(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: &str,
        properties: Value,
    ) -> WikiResult<Relationship> {
        if relationship_type.trim().is_empty() {
            return Err(WikiError::Validation(
                "relationship_type must not be empty".to_string(),
            ));
        }
        if !properties.is_object() {
            return Err(WikiError::Validation(
                "relationship properties must be a JSON object".to_string(),
            ));
        }

        // 동시 삭제와 교차하지 않도록 두 엔드포인트를 잠금
        let _guards = self.store.locks().lock_many(&[source_id, target_id]).await;

        for id in [source_id, target_id] {
            if !self.documents.exists(id)? {
                return Err(WikiError::Validation(format!(
                    "document {} does not exist",
                    id
                )));
            }
        }

        if self.find(source_id, target_id, relationship_type)?.is_some() {
            return Err(duplicate(source_id, target_id, relationship_type));
        }

        let relationship = Relationship {
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relationship_type: relationship_type.to_string(),
            properties,
            created_at: now(),
        };

        let endpoints_exist = Condition::And(vec![
            Condition::exists(
                Relation::Document,
                Condition::eq("id", Literal::text(source_id)?),
            ),
            Condition::exists(
                Relation::Document,
                Condition::eq("id", Literal::text(target_id)?),
            ),
        ]);

        let sql = Query::insert(Relation::Relationship)
            .value("source_id", Literal::text(&relationship.source_id)?)
            .value("target_id", Literal::text(&relationship.target_id)?)
            .value(
                "relationship_type",
                Literal::text(&relationship.relationship_type)?,
            )
            .value("properties", Literal::json(&relationship.properties)?)
            .value(
                "created_at",
                Literal::text(&format_timestamp(&relationship.created_at))?,
            )
            .when(endpoints_exist)
            .build()?;

        match self.store.execute(&sql) {
            Ok(0) => Err(WikiError::Validation(format!(
                "endpoint of {} -> {} was removed",
                source_id, target_id
            ))),
            Ok(_) => {
                tracing::info!(
                    "Linked {} -[{}]-> {}",
                    source_id,
                    relationship.relationship_type,
                    target_id
                );
                Ok(relationship)
            }
            Err(WikiError::Sqlite(e)) if is_unique_violation(&e) => {
                Err(duplicate(source_id, target_id, relationship_type))
            }
            Err(e) => Err(e),
        }
    }

    /// 특정 조합 조회
    pub fn find(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: &str,
    ) -> WikiResult<Option<Relationship>> {
        let filter = Condition::And(vec![
            Condition::eq("source_id", Literal::text(source_id)?),
            Condition::eq("target_id", Literal::text(target_id)?),
            Condition::eq("relationship_type", Literal::text(relationship_type)?),
        ]);
        Ok(self.select(Some(filter))?.pop())
    }

    /// source에서 나가는 관계 (생성 순)
    pub fn list_outgoing(&self, source_id: &str) -> WikiResult<Vec<Relationship>> {
        self.select(Some(Condition::eq("source_id", Literal::text(source_id)?)))
    }

    /// 타입으로 필터링한 나가는 관계
    pub fn list_outgoing_typed(
        &self,
        source_id: &str,
        relationship_type: &str,
    ) -> WikiResult<Vec<Relationship>> {
        self.select(Some(Condition::And(vec![
            Condition::eq("source_id", Literal::text(source_id)?),
            Condition::eq("relationship_type", Literal::text(relationship_type)?),
        ])))
    }

    /// target으로 들어오는 관계
    pub fn list_incoming(&self, target_id: &str) -> WikiResult<Vec<Relationship>> {
        self.select(Some(Condition::eq("target_id", Literal::text(target_id)?)))
    }

    /// 문서가 source 또는 target인 모든 관계 (생성 순)
    pub fn list_touching(&self, id: &str) -> WikiResult<Vec<Relationship>> {
        let id = Literal::text(id)?;
        self.select(Some(Condition::Or(vec![
            Condition::eq("source_id", id.clone()),
            Condition::eq("target_id", id),
        ])))
    }

    /// 전체 관계
    pub fn list_all(&self) -> WikiResult<Vec<Relationship>> {
        self.select(None)
    }

    pub fn count(&self) -> WikiResult<usize> {
        let sql = Query::select(Relation::Relationship, &["COUNT(*)"]).build()?;
        self.store.query_count(&sql)
    }

    fn select(&self, filter: Option<Condition>) -> WikiResult<Vec<Relationship>> {
        let mut query = Query::select(Relation::Relationship, RELATIONSHIP_COLUMNS)
            .order_by("created_at", Order::Asc)
            .order_by("rowid", Order::Asc);
        if let Some(filter) = filter {
            query = query.filter(filter);
        }

        let rows = self.store.query(&query.build()?, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        rows.into_iter()
            .map(|(source_id, target_id, relationship_type, properties, created_at)| {
                Ok(Relationship {
                    source_id,
                    target_id,
                    relationship_type,
                    properties: serde_json::from_str(&properties)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}

fn duplicate(source_id: &str, target_id: &str, relationship_type: &str) -> WikiError {
    WikiError::Conflict(format!(
        "relationship {} -[{}]-> {} already exists",
        source_id, relationship_type, target_id
    ))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ============================================================================
// Tests
// ============================================================================
