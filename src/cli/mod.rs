//! CLI 모듈
//!
//! vesa CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::embedding::has_api_key;
use crate::knowledge::{
    Document, DocumentPatch, NeighborDirection, NewDocument, SearchTier, VectorStatus, Wiki,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "vesa")]
#[command(version, about = "벡터 + 그래프 위키 문서 저장소", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: VESA_DATA_DIR 또는 ~/.vesa)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 추가
    Add {
        /// 문서 제목
        title: String,

        /// 본문 텍스트
        #[arg(short, long)]
        content: Option<String>,

        /// 본문 파일 (Markdown)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 태그 (여러 번 지정 가능)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// 작성자
        #[arg(short, long)]
        author: Option<String>,
    },

    /// 문서 조회
    Get {
        /// 문서 ID
        id: String,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 문서 수정 (지정한 필드만 변경)
    Update {
        /// 문서 ID
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        content: Option<String>,

        /// 본문 파일 (Markdown)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 태그 (지정하면 전체 교체)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        #[arg(short, long)]
        author: Option<String>,
    },

    /// 문서 삭제 (관계와 벡터 포함)
    Delete {
        /// 문서 ID
        id: String,
    },

    /// 최근 수정 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한 (기본: VESA_SEARCH_LIMIT)
        #[arg(short, long)]
        limit: Option<usize>,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 문서 간 관계 생성
    Link {
        source_id: String,
        target_id: String,

        /// 관계 타입
        #[arg(short = 't', long = "type", default_value = "related")]
        relationship_type: String,

        /// 관계 속성 (JSON 객체)
        #[arg(short, long)]
        properties: Option<String>,
    },

    /// 관련 문서 조회
    Related {
        /// 문서 ID
        id: String,

        /// 관계 타입 필터
        #[arg(short = 't', long = "type")]
        relationship_type: Option<String>,

        /// 들어오는 관계도 포함
        #[arg(long)]
        both: bool,
    },

    /// 전체 그래프 JSON 출력
    Graph {
        /// 들여쓰기 출력
        #[arg(long)]
        pretty: bool,
    },

    /// pending/failed 문서 재임베딩
    Reembed {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// 스키마 초기화
    Init,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Add {
            title,
            content,
            file,
            tags,
            author,
        } => {
            let path = file.as_deref().map(source_path);
            let content = read_content(content, file.as_deref())?
                .context("--content 또는 --file 중 하나를 지정해야 합니다")?;
            let input = NewDocument {
                title,
                content,
                tags,
                author,
                path,
            };
            cmd_add(&config, input).await
        }
        Commands::Get { id, json } => cmd_get(&config, &id, json).await,
        Commands::Update {
            id,
            title,
            content,
            file,
            tags,
            author,
        } => {
            let patch = DocumentPatch {
                title,
                content: read_content(content, file.as_deref())?,
                tags: (!tags.is_empty()).then_some(tags),
                author,
                path: file.as_deref().map(source_path),
            };
            cmd_update(&config, &id, patch).await
        }
        Commands::Delete { id } => cmd_delete(&config, &id).await,
        Commands::List { limit } => cmd_list(&config, limit).await,
        Commands::Search { query, limit, json } => {
            let limit = limit.unwrap_or(config.search_limit);
            cmd_search(&config, &query, limit, json).await
        }
        Commands::Link {
            source_id,
            target_id,
            relationship_type,
            properties,
        } => cmd_link(&config, &source_id, &target_id, &relationship_type, properties).await,
        Commands::Related {
            id,
            relationship_type,
            both,
        } => cmd_related(&config, &id, relationship_type.as_deref(), both).await,
        Commands::Graph { pretty } => cmd_graph(&config, pretty).await,
        Commands::Reembed { limit } => cmd_reembed(&config, limit).await,
        Commands::Init => cmd_init(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 추가 명령어 (add)
async fn cmd_add(config: &Config, input: NewDocument) -> Result<()> {
    let wiki = open_wiki(config).await?;

    println!("[*] 문서 저장 및 임베딩 생성 중...");

    let written = wiki.documents().create(input).await.context("문서 추가 실패")?;

    println!("[OK] 문서가 추가되었습니다 (ID: {})", written.document.id);
    print_vector_status(written.vector_status);

    wiki.close()?;
    Ok(())
}

/// 문서 조회 명령어 (get)
async fn cmd_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let wiki = open_wiki(config).await?;
    let doc = wiki.documents().get(id).context("문서 조회 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        let status = wiki.documents().vector_status(id).await?;
        print_document(&doc);
        println!("        임베딩: {}", status);
        println!();
        println!("{}", doc.content);
    }

    wiki.close()?;
    Ok(())
}

/// 문서 수정 명령어 (update)
async fn cmd_update(config: &Config, id: &str, patch: DocumentPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("수정할 필드를 하나 이상 지정해야 합니다 (--title, --content, --file, --tag, --author)");
    }

    let wiki = open_wiki(config).await?;
    let written = wiki
        .documents()
        .update(id, patch)
        .await
        .context("문서 수정 실패")?;

    println!("[OK] 문서 {} 수정됨", written.document.id);
    print_vector_status(written.vector_status);

    wiki.close()?;
    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    let wiki = open_wiki(config).await?;
    wiki.documents().delete(id).await.context("문서 삭제 실패")?;

    println!("[OK] 문서 {} 삭제됨 (관계, 벡터 포함)", id);

    wiki.close()?;
    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(config: &Config, limit: usize) -> Result<()> {
    let wiki = open_wiki(config).await?;
    let docs = wiki
        .documents()
        .list_recent(limit)
        .context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
    } else {
        println!("[OK] 저장된 문서 ({} 건):\n", docs.len());
        for doc in &docs {
            print_document(doc);
            println!();
        }
    }

    wiki.close()?;
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(config: &Config, query: &str, limit: usize, json: bool) -> Result<()> {
    let wiki = open_wiki(config).await?;
    let results = wiki
        .search()
        .search(query, limit)
        .await
        .context("검색 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        wiki.close()?;
        return Ok(());
    }

    println!("[*] 검색: \"{}\"", query);

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
    } else {
        println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

        for (i, result) in results.iter().enumerate() {
            let tier = match result.tier {
                SearchTier::Semantic => "VEC",
                SearchTier::Fallback => "TXT",
            };

            println!(
                "{}. [{}] [점수: {:.4}] {}",
                i + 1,
                tier,
                result.score,
                result.document.title
            );
            println!("   ID: {}", result.document.id);
            println!("   내용: {}", truncate_text(&result.document.content, 200));
            println!();
        }
    }

    wiki.close()?;
    Ok(())
}

/// 관계 생성 명령어 (link)
async fn cmd_link(
    config: &Config,
    source_id: &str,
    target_id: &str,
    relationship_type: &str,
    properties: Option<String>,
) -> Result<()> {
    let properties = match properties {
        Some(raw) => serde_json::from_str(&raw).context("--properties JSON 파싱 실패")?,
        None => serde_json::json!({}),
    };

    let wiki = open_wiki(config).await?;
    let relationship = wiki
        .relationships()
        .create_with_properties(source_id, target_id, relationship_type, properties)
        .await
        .context("관계 생성 실패")?;

    println!(
        "[OK] {} -[{}]-> {}",
        relationship.source_id, relationship.relationship_type, relationship.target_id
    );

    wiki.close()?;
    Ok(())
}

/// 관련 문서 명령어 (related)
async fn cmd_related(
    config: &Config,
    id: &str,
    relationship_type: Option<&str>,
    both: bool,
) -> Result<()> {
    let wiki = open_wiki(config).await?;

    let mut graph = wiki.graph().clone();
    if both {
        graph = graph.with_direction(NeighborDirection::Both);
    }

    let docs = match relationship_type {
        Some(kind) => graph.neighbors_of_type(id, kind),
        None => graph.neighbors(id),
    }
    .context("관련 문서 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 관련 문서가 없습니다. (방향: {})", graph.direction());
    } else {
        println!("[OK] 관련 문서 ({} 건):\n", docs.len());
        for doc in &docs {
            print_document(doc);
            println!();
        }
    }

    wiki.close()?;
    Ok(())
}

/// 그래프 export 명령어 (graph)
async fn cmd_graph(config: &Config, pretty: bool) -> Result<()> {
    let wiki = open_wiki(config).await?;
    let graph = wiki.graph().export_graph().context("그래프 export 실패")?;

    let output = if pretty {
        serde_json::to_string_pretty(&graph)?
    } else {
        serde_json::to_string(&graph)?
    };
    println!("{}", output);

    wiki.close()?;
    Ok(())
}

/// 재임베딩 명령어 (reembed)
async fn cmd_reembed(config: &Config, limit: usize) -> Result<()> {
    let wiki = open_wiki(config).await?;

    println!("[*] pending/failed 문서 재임베딩 중...");
    let recovered = wiki
        .documents()
        .retry_embeddings(limit)
        .await
        .context("재임베딩 실패")?;

    if wiki.schema().ensure_ann_index().await? {
        println!("[OK] ANN 인덱스 생성됨");
    }

    println!("[OK] {} 건 임베딩 완료", recovered);

    wiki.close()?;
    Ok(())
}

/// 스키마 초기화 명령어 (init)
async fn cmd_init(config: &Config) -> Result<()> {
    let wiki = open_wiki(config).await?;

    println!("[OK] 스키마 준비 완료: {}", config.data_dir.display());
    for (name, _) in wiki.schema().relation_definitions()? {
        println!("     - {}", name);
    }
    println!(
        "     - vector_document (dimension {}, {})",
        config.index.dimension, config.index.distance
    );

    wiki.close()?;
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &Config) -> Result<()> {
    println!("vesa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    if let Ok(meta) = std::fs::metadata(config.sqlite_path()) {
        println!("    wiki.db: {}", format_bytes(meta.len() as usize));
    }

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (오프라인 해싱 임베딩 사용 가능)");
    }

    match open_wiki(config).await {
        Ok(wiki) => {
            match wiki.stats().await {
                Ok(stats) => {
                    println!(
                        "[OK] 임베딩: {} (dimension {})",
                        stats.provider, stats.dimension
                    );
                    println!("[OK] 저장된 문서: {} 건", stats.documents);
                    println!("[OK] 관계: {} 건", stats.relationships);
                    println!(
                        "[OK] 벡터: ready {}, pending {}, failed {}",
                        stats.vectors.ready, stats.vectors.pending, stats.vectors.failed
                    );
                }
                Err(e) => println!("[!] 통계 조회 실패: {}", e),
            }
            wiki.close()?;
        }
        Err(e) => println!("[!] 저장소 열기 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_config(data_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::from_env().context("설정 로드 실패")?;
    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    }
    Ok(config)
}

async fn open_wiki(config: &Config) -> Result<Wiki> {
    Wiki::open(config).await.context("위키 저장소 열기 실패")
}

/// `--content`와 `--file` 중 하나에서 본문 읽기
fn read_content(content: Option<String>, file: Option<&Path>) -> Result<Option<String>> {
    match (content, file) {
        (Some(_), Some(_)) => bail!("--content와 --file은 함께 지정할 수 없습니다"),
        (Some(text), None) => Ok(Some(text)),
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
            Ok(Some(text))
        }
        (None, None) => Ok(None),
    }
}

/// 저장용 파일 경로 (가능하면 절대 경로)
fn source_path(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn print_document(doc: &Document) {
    let tags = if doc.tags.is_empty() {
        "-".to_string()
    } else {
        doc.tags.join(", ")
    };

    println!("  {} {}", doc.id, truncate_text(&doc.title, 60));
    println!(
        "        [{}] {} | {} | {} chars",
        tags,
        doc.author.as_deref().unwrap_or("-"),
        doc.updated_at.format("%Y-%m-%d %H:%M"),
        doc.content.chars().count()
    );
    if let Some(path) = &doc.path {
        println!("        source: {}", path);
    }
}

fn print_vector_status(status: VectorStatus) {
    match status {
        VectorStatus::Ready => println!("     임베딩: ready"),
        other => println!(
            "[!] 임베딩: {} (검색은 텍스트 폴백으로 동작, `vesa reembed`로 재시도)",
            other
        ),
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
        assert_eq!(truncate_text("안녕하세요 세계", 5), "안녕하세요...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_tags() {
        let cli = Cli::try_parse_from([
            "vesa", "add", "Intro", "-c", "body", "-t", "db", "-t", "vector", "--data-dir", "/tmp/x",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Add { title, tags, .. } => {
                assert_eq!(title, "Intro");
                assert_eq!(tags, vec!["db", "vector"]);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_read_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Title\n\nbody").unwrap();

        assert_eq!(
            read_content(None, Some(&path)).unwrap().as_deref(),
            Some("# Title\n\nbody")
        );
        assert_eq!(read_content(None, None).unwrap(), None);
        assert!(read_content(Some("x".into()), Some(&path)).is_err());

        let stored = source_path(&path);
        assert!(Path::new(&stored).is_absolute());
        assert!(stored.ends_with("doc.md"));
        assert_eq!(source_path(Path::new("missing.md")), "missing.md");
    }
}
