//! Query Builder - 구조화된 연산을 엔진 쿼리 텍스트로 변환
//!
//! 사용자 값은 오직 [`Literal`]로만 쿼리에 들어갑니다. `Literal`은
//! 인코더를 거쳐야만 만들 수 있으므로 원시 문자열 삽입이 구조적으로 불가능합니다.
//! 컬럼/릴레이션 이름은 `&'static str`로 고정되어 사용자 입력이 될 수 없습니다.
//!
//! 같은 인코더가 SQLite 문장과 LanceDB 필터(`only_if`, `delete`) 양쪽에 쓰입니다.
//! ref: https://www.sqlite.org/lang_expr.html#literal_values_constants_

use std::fmt;

use serde::Serialize;

use super::error::{WikiError, WikiResult};

// ============================================================================
// Literal
// ============================================================================

/// 인코딩이 끝난 리터럴 값
///
/// 문자열은 작은따옴표로 감싸고 내부 `'`는 `''`로 이중화합니다.
/// 개행/탭/제어문자는 리터럴 안에서 그대로 안전하지만, NUL은 파서가
/// 문장 끝으로 해석하므로 거부합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal(String);

impl Literal {
    /// 문자열 리터럴
    pub fn text(value: &str) -> WikiResult<Self> {
        if value.contains('\0') {
            return Err(WikiError::QueryBuild(
                "string value contains a NUL character".to_string(),
            ));
        }

        let mut encoded = String::with_capacity(value.len() + 2);
        encoded.push('\'');
        for c in value.chars() {
            if c == '\'' {
                encoded.push('\'');
            }
            encoded.push(c);
        }
        encoded.push('\'');

        Ok(Self(encoded))
    }

    /// NULL 허용 문자열
    pub fn opt_text(value: Option<&str>) -> WikiResult<Self> {
        match value {
            Some(v) => Self::text(v),
            None => Ok(Self::null()),
        }
    }

    /// JSON 직렬화 후 문자열 리터럴로 저장
    pub fn json<T: Serialize + ?Sized>(value: &T) -> WikiResult<Self> {
        let raw = serde_json::to_string(value)
            .map_err(|e| WikiError::QueryBuild(format!("value is not JSON encodable: {}", e)))?;
        Self::text(&raw)
    }

    pub fn null() -> Self {
        Self("NULL".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 임베딩 벡터 검증
///
/// 차원이 맞지 않거나 NaN/Inf 성분이 있으면 인코딩 불가로 처리합니다.
pub fn check_vector(values: &[f32], dimension: usize) -> WikiResult<()> {
    if values.len() != dimension {
        return Err(WikiError::QueryBuild(format!(
            "vector has {} components, index expects {}",
            values.len(),
            dimension
        )));
    }

    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
        return Err(WikiError::QueryBuild(format!(
            "vector component {} is not finite",
            pos
        )));
    }

    Ok(())
}

// ============================================================================
// Relations & Conditions
// ============================================================================

/// 저장 릴레이션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Document,
    Relationship,
}

impl Relation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Relationship => "relationship",
        }
    }

    /// INSERT 시 반드시 있어야 하는 컬럼
    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Document => &["id", "title", "content", "tags", "created_at", "updated_at"],
            Self::Relationship => &["source_id", "target_id", "relationship_type", "created_at"],
        }
    }
}

/// WHERE 조건
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(&'static str, Literal),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// `EXISTS (SELECT 1 FROM relation WHERE ...)`
    Exists(Relation, Box<Condition>),
}

impl Condition {
    pub fn eq(column: &'static str, value: Literal) -> Self {
        Self::Eq(column, value)
    }

    pub fn exists(relation: Relation, filter: Condition) -> Self {
        Self::Exists(relation, Box::new(filter))
    }

    /// 엔진 필터 텍스트 (LanceDB `only_if`/`delete`에도 사용)
    pub fn render(&self) -> String {
        match self {
            Self::Eq(column, value) => format!("{} = {}", column, value),
            Self::And(parts) => join_conditions(parts, " AND ", "1 = 1"),
            Self::Or(parts) => join_conditions(parts, " OR ", "1 = 0"),
            Self::Exists(relation, filter) => format!(
                "EXISTS (SELECT 1 FROM {} WHERE {})",
                relation.name(),
                filter.render()
            ),
        }
    }
}

/// 빈 AND는 참, 빈 OR는 거짓
fn join_conditions(parts: &[Condition], sep: &str, identity: &str) -> String {
    if parts.is_empty() {
        return identity.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|c| format!("({})", c.render())).collect();
    rendered.join(sep)
}

/// 정렬 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

// ============================================================================
// Statements
// ============================================================================

/// 쿼리 빌더 진입점
pub struct Query;

impl Query {
    pub fn insert(relation: Relation) -> Insert {
        Insert {
            relation,
            values: Vec::new(),
            guard: None,
        }
    }

    pub fn update(relation: Relation) -> Update {
        Update {
            relation,
            assignments: Vec::new(),
            filter: None,
        }
    }

    pub fn delete(relation: Relation) -> Delete {
        Delete {
            relation,
            filter: None,
        }
    }

    pub fn select(relation: Relation, columns: &'static [&'static str]) -> Select {
        Select {
            relation,
            columns,
            filter: None,
            order_by: Vec::new(),
            limit: None,
        }
    }
}

/// INSERT 문
#[derive(Debug, Clone)]
pub struct Insert {
    relation: Relation,
    values: Vec<(&'static str, Literal)>,
    guard: Option<Condition>,
}

impl Insert {
    pub fn value(mut self, column: &'static str, value: Literal) -> Self {
        self.values.push((column, value));
        self
    }

    /// 조건이 참일 때만 삽입 (`INSERT ... SELECT ... WHERE`)
    pub fn when(mut self, guard: Condition) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn build(&self) -> WikiResult<String> {
        for required in self.relation.required_columns() {
            if !self.values.iter().any(|(c, _)| c == required) {
                return Err(WikiError::QueryBuild(format!(
                    "missing required field '{}' for {}",
                    required,
                    self.relation.name()
                )));
            }
        }

        let columns: Vec<&str> = self.values.iter().map(|(c, _)| *c).collect();
        let values: Vec<&str> = self.values.iter().map(|(_, v)| v.as_str()).collect();

        let sql = match &self.guard {
            Some(guard) => format!(
                "INSERT INTO {} ({}) SELECT {} WHERE {}",
                self.relation.name(),
                columns.join(", "),
                values.join(", "),
                guard.render()
            ),
            None => format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.relation.name(),
                columns.join(", "),
                values.join(", ")
            ),
        };

        Ok(finish(sql))
    }
}

/// UPDATE 문
#[derive(Debug, Clone)]
pub struct Update {
    relation: Relation,
    assignments: Vec<(&'static str, Literal)>,
    filter: Option<Condition>,
}

impl Update {
    pub fn set(mut self, column: &'static str, value: Literal) -> Self {
        self.assignments.push((column, value));
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn build(&self) -> WikiResult<String> {
        if self.assignments.is_empty() {
            return Err(WikiError::QueryBuild(format!(
                "update of {} has no fields",
                self.relation.name()
            )));
        }
        let filter = self.filter.as_ref().ok_or_else(|| {
            WikiError::QueryBuild(format!("update of {} has no filter", self.relation.name()))
        })?;

        let sets: Vec<String> = self
            .assignments
            .iter()
            .map(|(c, v)| format!("{} = {}", c, v))
            .collect();

        Ok(finish(format!(
            "UPDATE {} SET {} WHERE {}",
            self.relation.name(),
            sets.join(", "),
            filter.render()
        )))
    }
}

/// DELETE 문
///
/// 필터 없는 전체 삭제는 만들 수 없습니다.
#[derive(Debug, Clone)]
pub struct Delete {
    relation: Relation,
    filter: Option<Condition>,
}

impl Delete {
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn build(&self) -> WikiResult<String> {
        let filter = self.filter.as_ref().ok_or_else(|| {
            WikiError::QueryBuild(format!("delete from {} has no filter", self.relation.name()))
        })?;

        Ok(finish(format!(
            "DELETE FROM {} WHERE {}",
            self.relation.name(),
            filter.render()
        )))
    }
}

/// SELECT 문
#[derive(Debug, Clone)]
pub struct Select {
    relation: Relation,
    columns: &'static [&'static str],
    filter: Option<Condition>,
    order_by: Vec<(&'static str, Order)>,
    limit: Option<usize>,
}

impl Select {
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    pub fn order_by(mut self, column: &'static str, order: Order) -> Self {
        self.order_by.push((column, order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn build(&self) -> WikiResult<String> {
        if self.columns.is_empty() {
            return Err(WikiError::QueryBuild(format!(
                "select from {} has no columns",
                self.relation.name()
            )));
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            self.columns.join(", "),
            self.relation.name()
        );

        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&filter.render());
        }

        if !self.order_by.is_empty() {
            let orders: Vec<String> = self
                .order_by
                .iter()
                .map(|(c, o)| match o {
                    Order::Asc => format!("{} ASC", c),
                    Order::Desc => format!("{} DESC", c),
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(limit) = self.limit {
            // SQLite LIMIT은 i64 범위, 넘어가면 -1 (제한 없음)
            match i64::try_from(limit) {
                Ok(limit) => sql.push_str(&format!(" LIMIT {}", limit)),
                Err(_) => sql.push_str(" LIMIT -1"),
            }
        }

        Ok(finish(sql))
    }
}

/// 앞뒤 공백을 제거하고 개행 하나로 끝나게 정규화
fn finish(sql: String) -> String {
    let mut normalized = sql.trim().to_string();
    normalized.push('\n');
    normalized
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    /// 리터럴을 실제 SQLite 파서에 통과시켜 원래 값으로 돌아오는지 확인
    fn parse_back(literal: &Literal) -> String {
        let conn = Connection::open_in_memory().unwrap();
        conn.query_row(&format!("SELECT {}", literal), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_text_literal_quotes() {
        assert_eq!(Literal::text("plain").unwrap().as_str(), "'plain'");
        assert_eq!(Literal::text("it's").unwrap().as_str(), "'it''s'");
        assert_eq!(Literal::text("").unwrap().as_str(), "''");
    }

    #[test]
    fn test_text_literal_survives_parser() {
        let tricky = [
            "it's \"quoted\"",
            "line1\nline2\r\n\tend",
            "'; DROP TABLE document; --",
            "back\\slash and {braces} and $param",
            "\u{1}\u{7f} control",
            "한국어 日本語 emoji 🚀",
        ];

        for value in tricky {
            let lit = Literal::text(value).unwrap();
            assert_eq!(parse_back(&lit), value);
        }
    }

    #[test]
    fn test_nul_is_rejected() {
        let err = Literal::text("a\0b").unwrap_err();
        assert!(matches!(err, WikiError::QueryBuild(_)));
    }

    #[test]
    fn test_json_literal() {
        let tags = vec!["db".to_string(), "it's".to_string()];
        let lit = Literal::json(&tags).unwrap();
        assert_eq!(parse_back(&lit), r#"["db","it's"]"#);
    }

    #[test]
    fn test_check_vector() {
        assert!(check_vector(&[0.1, 0.2, 0.3], 3).is_ok());
        assert!(check_vector(&[0.1, 0.2], 3).is_err());
        assert!(check_vector(&[0.1, f32::NAN, 0.3], 3).is_err());
        assert!(check_vector(&[0.1, f32::INFINITY, 0.3], 3).is_err());
    }

    #[test]
    fn test_insert_requires_fields() {
        let err = Query::insert(Relation::Relationship)
            .value("source_id", Literal::text("a").unwrap())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("target_id"));
    }

    #[test]
    fn test_insert_with_guard() {
        let sql = Query::insert(Relation::Relationship)
            .value("source_id", Literal::text("a").unwrap())
            .value("target_id", Literal::text("b").unwrap())
            .value("relationship_type", Literal::text("related").unwrap())
            .value("created_at", Literal::text("t").unwrap())
            .when(Condition::exists(
                Relation::Document,
                Condition::eq("id", Literal::text("a").unwrap()),
            ))
            .build()
            .unwrap();

        assert_eq!(
            sql,
            "INSERT INTO relationship (source_id, target_id, relationship_type, created_at) \
             SELECT 'a', 'b', 'related', 't' WHERE EXISTS (SELECT 1 FROM document WHERE id = 'a')\n"
        );
    }

    #[test]
    fn test_update_and_delete_need_filter() {
        assert!(Query::update(Relation::Document)
            .set("title", Literal::text("x").unwrap())
            .build()
            .is_err());
        assert!(Query::update(Relation::Document)
            .filter(Condition::eq("id", Literal::text("x").unwrap()))
            .build()
            .is_err());
        assert!(Query::delete(Relation::Document).build().is_err());
    }

    #[test]
    fn test_or_condition_render() {
        let id = Literal::text("d1").unwrap();
        let cond = Condition::Or(vec![
            Condition::eq("source_id", id.clone()),
            Condition::eq("target_id", id),
        ]);
        assert_eq!(cond.render(), "(source_id = 'd1') OR (target_id = 'd1')");
        assert_eq!(Condition::Or(vec![]).render(), "1 = 0");
        assert_eq!(Condition::And(vec![]).render(), "1 = 1");
    }

    #[test]
    fn test_select_render_and_trailing_newline() {
        let sql = Query::select(Relation::Document, &["id", "title"])
            .order_by("updated_at", Order::Desc)
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT id, title FROM document ORDER BY updated_at DESC LIMIT 5\n"
        );
        assert!(!sql.ends_with("\n\n"));
    }

    #[test]
    fn test_select_limit_beyond_i64() {
        let sql = Query::select(Relation::Document, &["id"])
            .limit(usize::MAX)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT id FROM document LIMIT -1\n");
    }
}
