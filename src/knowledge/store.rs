//! Store - 명시적 저장소 핸들
//!
//! 모든 repository/service는 이 핸들을 생성자로 받습니다.
//! 한 번 열고(`open`) 종료 시 닫습니다(`close`). 복제는 내부 `Arc`만 복사합니다.
//!
//! - SQLite 연결: document, relationship 릴레이션
//! - VectorStore: vector_document 릴레이션 (LanceDB)
//! - DocumentLocks: 문서 id 단위 직렬화

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Row};

use crate::config::Config;

use super::error::{WikiError, WikiResult};
use super::lance::LanceVectorStore;
use super::locks::DocumentLocks;
use super::vector::VectorStore;

/// 다른 프로세스가 쓰기 중일 때 대기 시간
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct StoreInner {
    conn: Mutex<Connection>,
    vectors: Arc<dyn VectorStore>,
    locks: DocumentLocks,
    config: Config,
}

/// 저장소 핸들
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// 저장소 열기 (없으면 디렉토리 생성)
    pub async fn open(config: &Config) -> WikiResult<Self> {
        if !config.data_dir.exists() {
            std::fs::create_dir_all(&config.data_dir)?;
        }

        let vectors = LanceVectorStore::open(&config.lance_path(), &config.index).await?;
        Self::open_with_vectors(config, Arc::new(vectors))
    }

    /// 벡터 저장소를 직접 지정하여 열기
    pub fn open_with_vectors(config: &Config, vectors: Arc<dyn VectorStore>) -> WikiResult<Self> {
        let conn = open_sqlite(&config.sqlite_path())?;

        tracing::debug!("Store opened at {:?}", config.data_dir);

        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                vectors,
                locks: DocumentLocks::default(),
                config: config.clone(),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn vectors(&self) -> &dyn VectorStore {
        self.inner.vectors.as_ref()
    }

    pub fn locks(&self) -> &DocumentLocks {
        &self.inner.locks
    }

    /// SQLite 연결로 작업 실행
    ///
    /// 락은 클로저 범위에서만 유지됩니다 (`.await` 너머로 들고 가지 않음).
    pub fn with_conn<T, F>(&self, f: F) -> WikiResult<T>
    where
        F: FnOnce(&Connection) -> WikiResult<T>,
    {
        let conn = self
            .inner
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&conn)
    }

    /// 빌더가 만든 문장 실행, 영향받은 행 수 반환
    pub fn execute(&self, sql: &str) -> WikiResult<usize> {
        tracing::debug!("execute: {}", sql.trim_end());
        self.with_conn(|conn| Ok(conn.execute(sql, [])?))
    }

    /// 빌더가 만든 SELECT 실행
    pub fn query<T, F>(&self, sql: &str, map: F) -> WikiResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        tracing::debug!("query: {}", sql.trim_end());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([], map)?.collect::<Result<Vec<T>, _>>()?;
            Ok(rows)
        })
    }

    /// 단일 정수 결과 (COUNT 등)
    pub fn query_count(&self, sql: &str) -> WikiResult<usize> {
        let counts = self.query(sql, |row| row.get::<_, i64>(0))?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    /// 저장소 닫기
    ///
    /// 다른 핸들이 남아 있으면 마지막 핸들이 drop될 때 닫힙니다.
    pub fn close(self) -> WikiResult<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let conn = inner
                    .conn
                    .into_inner()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                conn.close().map_err(|(_, e)| WikiError::from(e))?;
                tracing::debug!("Store closed");
            }
            Err(_) => {
                tracing::debug!("Store handle dropped; other handles still open");
            }
        }
        Ok(())
    }
}

fn open_sqlite(path: &Path) -> WikiResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    Ok(conn)
}

// ============================================================================
// Tests
// ============================================================================
