//! SQLite-based corpus implementation.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use tracing::{debug, info};

use ciceron_core::similarity::cosine_similarity;
use ciceron_core::text::keyword_tokens;
use ciceron_core::{
    Chunk, ChunkId, ChunkMetadata, ChunkStore, CiceronError, Country, ImageId, ImageIndex,
    ImageRecord, IntentLabel, LexicalIndex, Result, Stats, Topic, VectorIndex,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};
use crate::snapshot::{LoadReport, Snapshot};

const CHUNK_COLUMNS: &str = "id, text, source, page, chunk_index, country, topics, title";
const IMAGE_COLUMNS: &str = "id, description, source, page, path, country, embedding";

/// SQLite-backed guide corpus.
///
/// Uses a blocking Mutex for thread-safe access. Requests only read; writes
/// happen through [`SqliteCorpus::load_snapshot`].
pub struct SqliteCorpus {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCorpus {
    /// Open or create a corpus database at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout_ms: u32) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CiceronError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, busy_timeout_ms, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CiceronError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, 5000, Path::new(":memory:"))
    }

    fn init(conn: Connection, busy_timeout_ms: u32, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn, busy_timeout_ms)?;

        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| CiceronError::database(e.to_string()))?;
        if version > SCHEMA_VERSION {
            return Err(CiceronError::database(format!(
                "corpus schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| CiceronError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
            .map_err(|e| CiceronError::database(e.to_string()))?;

        info!("Corpus opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection, busy_timeout_ms: u32) -> Result<()> {
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = {busy_timeout_ms};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#
        ))
        .map_err(|e| CiceronError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CiceronError::database(e.to_string()))?;
        f(&conn)
    }

    /// Materialize a snapshot, replacing whatever the corpus held before.
    pub fn load_snapshot(&self, snapshot: &Snapshot) -> Result<LoadReport> {
        snapshot.validate()?;

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CiceronError::database(e.to_string()))?;

            tx.execute_batch(
                "DELETE FROM chunk_embeddings; DELETE FROM images; DELETE FROM chunks;",
            )
            .map_err(|e| CiceronError::database(format!("Failed to clear corpus: {}", e)))?;

            let mut report = LoadReport::default();
            {
                let mut chunk_stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (id, text, source, page, chunk_index, country, topics, title)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        "#,
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                let mut embedding_stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunk_embeddings (chunk_id, dimension, embedding)
                        VALUES (?1, ?2, ?3)
                        "#,
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                for chunk in &snapshot.chunks {
                    chunk_stmt
                        .execute(params![
                            chunk.id.as_str(),
                            chunk.text,
                            chunk.source,
                            chunk.page,
                            chunk.chunk_index,
                            chunk.country.map(|c| c.as_str()),
                            encode_topics(&chunk.topics),
                            chunk.title,
                        ])
                        .map_err(|e| {
                            CiceronError::database(format!("Failed to insert chunk: {}", e))
                        })?;
                    report.chunks += 1;

                    if !chunk.embedding.is_empty() {
                        embedding_stmt
                            .execute(params![
                                chunk.id.as_str(),
                                chunk.embedding.len() as i64,
                                vec_to_bytes(&chunk.embedding),
                            ])
                            .map_err(|e| {
                                CiceronError::database(format!(
                                    "Failed to insert embedding: {}",
                                    e
                                ))
                            })?;
                        report.embeddings += 1;
                    }
                }

                let mut image_stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO images (id, description, source, page, path, country, embedding)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                for image in &snapshot.images {
                    let embedding =
                        (!image.embedding.is_empty()).then(|| vec_to_bytes(&image.embedding));
                    image_stmt
                        .execute(params![
                            image.id.as_str(),
                            image.description,
                            image.source,
                            image.page,
                            image.path,
                            image.country.map(|c| c.as_str()),
                            embedding,
                        ])
                        .map_err(|e| {
                            CiceronError::database(format!("Failed to insert image: {}", e))
                        })?;
                    report.images += 1;
                }
            }

            tx.commit()
                .map_err(|e| CiceronError::database(e.to_string()))?;

            info!(
                chunks = report.chunks,
                embeddings = report.embeddings,
                images = report.images,
                "Snapshot loaded"
            );
            Ok(report)
        })
    }

    /// Corpus statistics.
    pub fn get_stats(&self) -> Result<Stats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64> {
                conn.query_row(sql, [], |row| row.get(0))
                    .map_err(|e| CiceronError::database(e.to_string()))
            };

            let chunks = count("SELECT COUNT(*) FROM chunks")?;
            let images = count("SELECT COUNT(*) FROM images")?;
            let embeddings = count("SELECT COUNT(*) FROM chunk_embeddings")?;

            let mut stmt = conn
                .prepare(
                    "SELECT COALESCE(country, 'unlabeled'), COUNT(*) FROM chunks GROUP BY 1 ORDER BY 1",
                )
                .map_err(|e| CiceronError::database(e.to_string()))?;
            let by_country = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
                .map_err(|e| CiceronError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| CiceronError::database(e.to_string()))?;

            // Get page count and page size to estimate storage
            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(Stats {
                chunks,
                images,
                embeddings,
                storage_bytes: page_count * page_size,
                by_country,
            })
        })
    }
}

#[async_trait]
impl LexicalIndex for SqliteCorpus {
    /// BM25 keyword hits within the filtered subset, topped up with the
    /// subset's unmatched chunks (score 0, id order) until `k` are returned.
    async fn lexical_search(
        &self,
        query: &str,
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        let match_expr = fts5_match_expression(query);
        let (country, topic) = filter_params(filter);

        self.with_conn(move |conn| {
            let mut results = Vec::new();

            if let Some(match_expr) = &match_expr {
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT c.id, bm25(chunks_fts) AS score
                        FROM chunks_fts
                        JOIN chunks c ON c.rowid = chunks_fts.rowid
                        WHERE chunks_fts MATCH ?1
                        AND (?2 IS NULL OR c.country = ?2)
                        AND (?3 IS NULL OR instr(c.topics, ?3) > 0)
                        ORDER BY score, c.id
                        LIMIT ?4
                        "#,
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                let rows = stmt
                    .query_map(
                        params![match_expr, country, topic.as_deref(), k as i64],
                        |row| {
                            let id: String = row.get(0)?;
                            let score: f64 = row.get(1)?;
                            // bm25() is lower-is-better
                            Ok((ChunkId::new(id), (-score) as f32))
                        },
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                results = rows
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| CiceronError::database(e.to_string()))?;
            }
            let keyword_hits = results.len();

            if results.len() < k {
                let matched: HashSet<ChunkId> =
                    results.iter().map(|(id, _)| id.clone()).collect();
                let mut stmt = conn
                    .prepare(
                        r#"
                        SELECT c.id FROM chunks c
                        WHERE (?1 IS NULL OR c.country = ?1)
                        AND (?2 IS NULL OR instr(c.topics, ?2) > 0)
                        ORDER BY c.id
                        LIMIT ?3
                        "#,
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                let ids = stmt
                    .query_map(
                        params![country, topic.as_deref(), (k + matched.len()) as i64],
                        |row| row.get::<_, String>(0),
                    )
                    .map_err(|e| CiceronError::database(e.to_string()))?;

                for id in ids {
                    let id = ChunkId::new(id.map_err(|e| CiceronError::database(e.to_string()))?);
                    if results.len() == k {
                        break;
                    }
                    if !matched.contains(&id) {
                        results.push((id, 0.0));
                    }
                }
            }

            debug!(keyword_hits, returned = results.len(), %filter, "lexical search");
            Ok(results)
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteCorpus {
    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        let (country, topic) = filter_params(filter);

        let mut scored = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT c.id, e.dimension, e.embedding
                    FROM chunk_embeddings e
                    JOIN chunks c ON c.id = e.chunk_id
                    WHERE (?1 IS NULL OR c.country = ?1)
                    AND (?2 IS NULL OR instr(c.topics, ?2) > 0)
                    "#,
                )
                .map_err(|e| CiceronError::database(e.to_string()))?;

            let mut rows = stmt
                .query(params![country, topic])
                .map_err(|e| CiceronError::database(e.to_string()))?;

            let mut scored = Vec::new();
            while let Some(row) = rows
                .next()
                .map_err(|e| CiceronError::database(e.to_string()))?
            {
                let id: String = row
                    .get(0)
                    .map_err(|e| CiceronError::database(e.to_string()))?;
                let dimension: i64 = row
                    .get(1)
                    .map_err(|e| CiceronError::database(e.to_string()))?;
                if dimension as usize != embedding.len() {
                    return Err(CiceronError::invalid_argument(format!(
                        "query embedding has dimension {}, corpus stores {}",
                        embedding.len(),
                        dimension
                    )));
                }
                let bytes: Vec<u8> = row
                    .get(2)
                    .map_err(|e| CiceronError::database(e.to_string()))?;
                let stored = bytes_to_vec(&bytes);
                scored.push((ChunkId::new(id), cosine_similarity(embedding, &stored)));
            }
            Ok(scored)
        })?;

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        debug!(hits = scored.len(), %filter, "vector search");
        Ok(scored)
    }
}

#[async_trait]
impl ChunkStore for SqliteCorpus {
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<ChunkId, Chunk> = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM chunks WHERE id IN ({})",
                CHUNK_COLUMNS,
                placeholders(ids.len())
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| CiceronError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params_from_iter(ids.iter().map(|id| id.as_str())), row_to_chunk)
                .map_err(|e| CiceronError::database(e.to_string()))?;

            rows.map(|r| r.map(|chunk| (chunk.id.clone(), chunk)))
                .collect::<std::result::Result<HashMap<_, _>, _>>()
                .map_err(|e| CiceronError::database(e.to_string()))
        })?;

        // Preserve the caller's order
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

#[async_trait]
impl ImageIndex for SqliteCorpus {
    async fn images_for_sources(&self, sources: &[&str]) -> Result<Vec<ImageRecord>> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM images WHERE source IN ({}) ORDER BY id",
                IMAGE_COLUMNS,
                placeholders(sources.len())
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| CiceronError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params_from_iter(sources.iter()), row_to_image)
                .map_err(|e| CiceronError::database(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| CiceronError::database(e.to_string()))
        })
    }
}

// Helper functions

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let country: Option<String> = row.get(5)?;
    let topics: String = row.get(6)?;

    Ok(Chunk {
        id: ChunkId::new(row.get::<_, String>(0)?),
        text: row.get(1)?,
        metadata: ChunkMetadata {
            source: row.get(2)?,
            page: row.get(3)?,
            chunk_index: row.get(4)?,
            country: country.and_then(|c| c.parse::<Country>().ok()),
            topics: decode_topics(&topics),
            title: row.get(7)?,
        },
    })
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    let country: Option<String> = row.get(5)?;
    let embedding: Option<Vec<u8>> = row.get(6)?;

    Ok(ImageRecord {
        id: ImageId::new(row.get::<_, String>(0)?),
        description: row.get(1)?,
        source: row.get(2)?,
        page: row.get(3)?,
        path: row.get(4)?,
        country: country.and_then(|c| c.parse::<Country>().ok()),
        embedding: embedding.map(|b| bytes_to_vec(&b)).unwrap_or_default(),
    })
}

/// SQL parameters for a label filter: (country, topic pattern).
fn filter_params(filter: &IntentLabel) -> (Option<&'static str>, Option<String>) {
    (
        filter.country.map(|c| c.as_str()),
        filter.topic.map(|t| format!(",{},", t.as_str())),
    )
}

fn encode_topics(topics: &[Topic]) -> String {
    let mut encoded = String::from(",");
    for topic in topics {
        encoded.push_str(topic.as_str());
        encoded.push(',');
    }
    encoded
}

fn decode_topics(encoded: &str) -> Vec<Topic> {
    encoded
        .split(',')
        .filter(|t| !t.is_empty())
        .filter_map(|t| t.parse().ok())
        .collect()
}

/// Build an FTS5 MATCH expression that ORs the quoted query tokens.
///
/// Tokens are alphanumeric only, so user punctuation never reaches FTS5
/// syntax. Returns `None` when the query has no searchable token.
fn fts5_match_expression(query: &str) -> Option<String> {
    let mut tokens = keyword_tokens(query);
    tokens.dedup();
    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotChunk;

    fn chunk(
        id: &str,
        text: &str,
        source: &str,
        country: Option<Country>,
        topics: &[Topic],
        embedding: Vec<f32>,
    ) -> SnapshotChunk {
        SnapshotChunk {
            id: ChunkId::from(id),
            text: text.to_string(),
            source: source.to_string(),
            page: Some(1),
            chunk_index: 0,
            country,
            topics: topics.to_vec(),
            title: None,
            embedding,
        }
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            chunks: vec![
                chunk(
                    "madrid_0",
                    "El Museo del Prado en Madrid abre a las 10:00.",
                    "guia_madrid.pdf",
                    Some(Country::Spain),
                    &[Topic::Sightseeing],
                    vec![1.0, 0.0, 0.0],
                ),
                chunk(
                    "madrid_1",
                    "Tapas y vermut en La Latina, Madrid.",
                    "guia_madrid.pdf",
                    Some(Country::Spain),
                    &[Topic::Food],
                    vec![0.8, 0.2, 0.0],
                ),
                chunk(
                    "tokio_0",
                    "Ramen en Shinjuku, Tokio, Japón.",
                    "guia_tokio.pdf",
                    Some(Country::Japan),
                    &[Topic::Food],
                    vec![0.0, 1.0, 0.0],
                ),
                chunk(
                    "tokio_1",
                    "El templo Senso-ji en Asakusa.",
                    "guia_tokio.pdf",
                    Some(Country::Japan),
                    &[Topic::Sightseeing],
                    vec![0.0, 0.7, 0.7],
                ),
            ],
            images: vec![
                ImageRecord {
                    id: ImageId::new("guia_tokio_img_1_0"),
                    description: "Puerta del templo Senso-ji".to_string(),
                    source: "guia_tokio.pdf".to_string(),
                    page: Some(1),
                    path: "img/sensoji.png".to_string(),
                    country: Some(Country::Japan),
                    embedding: vec![0.5, 0.5],
                },
                ImageRecord {
                    id: ImageId::new("guia_madrid_img_1_0"),
                    description: "Fachada del Prado".to_string(),
                    source: "guia_madrid.pdf".to_string(),
                    page: Some(1),
                    path: "img/prado.png".to_string(),
                    country: Some(Country::Spain),
                    embedding: Vec::new(),
                },
            ],
        }
    }

    fn loaded() -> SqliteCorpus {
        let corpus = SqliteCorpus::open_memory().unwrap();
        corpus.load_snapshot(&sample_snapshot()).unwrap();
        corpus
    }

    fn ids(results: &[(ChunkId, f32)]) -> Vec<&str> {
        results.iter().map(|(id, _)| id.as_str()).collect()
    }

    fn keyword_hits(results: &[(ChunkId, f32)]) -> usize {
        results.iter().filter(|(_, score)| *score > 0.0).count()
    }

    #[tokio::test]
    async fn test_open_memory() {
        let corpus = SqliteCorpus::open_memory().unwrap();
        let stats = corpus.get_stats().unwrap();
        assert_eq!(stats.chunks, 0);
        assert_eq!(stats.images, 0);
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("corpus.db");
        let corpus = SqliteCorpus::open(&path, 1000).unwrap();
        corpus.load_snapshot(&sample_snapshot()).unwrap();
        drop(corpus);

        let reopened = SqliteCorpus::open(&path, 1000).unwrap();
        assert_eq!(reopened.get_stats().unwrap().chunks, 4);
    }

    #[tokio::test]
    async fn test_load_snapshot_and_stats() {
        let corpus = SqliteCorpus::open_memory().unwrap();
        let report = corpus.load_snapshot(&sample_snapshot()).unwrap();
        assert_eq!(
            report,
            LoadReport {
                chunks: 4,
                embeddings: 4,
                images: 2
            }
        );

        let stats = corpus.get_stats().unwrap();
        assert_eq!(stats.chunks, 4);
        assert_eq!(stats.embeddings, 4);
        assert_eq!(stats.images, 2);
        assert_eq!(
            stats.by_country,
            vec![("japan".to_string(), 2), ("spain".to_string(), 2)]
        );
        assert!(stats.storage_bytes > 0);
    }

    #[tokio::test]
    async fn test_reload_replaces_corpus() {
        let corpus = loaded();

        let mut snapshot = sample_snapshot();
        snapshot.chunks.truncate(1);
        snapshot.chunks[0].text = "Paella valenciana".to_string();
        snapshot.images.clear();
        corpus.load_snapshot(&snapshot).unwrap();

        let stats = corpus.get_stats().unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.embeddings, 1);
        assert_eq!(stats.images, 0);

        let old = corpus
            .lexical_search("Prado ramen", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(keyword_hits(&old), 0);
        let new = corpus
            .lexical_search("paella", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(ids(&new), vec!["madrid_0"]);
        assert!(new[0].1 > 0.0);

        assert!(corpus
            .get_chunks(&[ChunkId::from("tokio_0")])
            .await
            .unwrap()
            .is_empty());
        assert!(corpus
            .images_for_sources(&["guia_tokio.pdf"])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_lexical_search_folds_accents() {
        let corpus = loaded();
        let results = corpus
            .lexical_search("japon", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(results[0].0.as_str(), "tokio_0");
        assert_eq!(keyword_hits(&results), 1);

        let results = corpus
            .lexical_search("¿Dónde comer en Tokio?", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(results[0].0.as_str(), "tokio_0");
    }

    #[tokio::test]
    async fn test_lexical_search_applies_filter() {
        let corpus = loaded();

        let spain = IntentLabel::country(Country::Spain);
        let results = corpus.lexical_search("ramen madrid", &spain, 10).await.unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|(id, _)| id.as_str().starts_with("madrid")));

        let spain_food = spain.with_topic(Topic::Food);
        let results = corpus
            .lexical_search("madrid", &spain_food, 10)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["madrid_1"]);

        let japan = IntentLabel::country(Country::Japan);
        let results = corpus.lexical_search("prado", &japan, 10).await.unwrap();
        assert_eq!(ids(&results), vec!["tokio_0", "tokio_1"]);
        assert_eq!(keyword_hits(&results), 0);
    }

    #[tokio::test]
    async fn test_lexical_search_stays_inside_filtered_subset() {
        let corpus = loaded();
        let spain = IntentLabel::country(Country::Spain);

        // Only Japanese chunks mention these words
        let results = corpus
            .lexical_search("ramen shinjuku asakusa", &spain, 10)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["madrid_0", "madrid_1"]);
        assert_eq!(keyword_hits(&results), 0);

        // Keyword hits come first, the rest of the subset fills up to k
        let results = corpus.lexical_search("tapas", &spain, 2).await.unwrap();
        assert_eq!(ids(&results), vec!["madrid_1", "madrid_0"]);
        assert!(results[0].1 > 0.0);
        assert_eq!(results[1].1, 0.0);

        let results = corpus.lexical_search("tapas", &spain, 1).await.unwrap();
        assert_eq!(ids(&results), vec!["madrid_1"]);

        let spain_transport = spain.with_topic(Topic::Transport);
        let results = corpus
            .lexical_search("tren", &spain_transport, 10)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_lexical_search_tolerates_fts_syntax() {
        let corpus = loaded();
        let results = corpus
            .lexical_search("ramen\" OR (NEAR*", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(results[0].0.as_str(), "tokio_0");

        let results = corpus
            .lexical_search("?!", &IntentLabel::UNSPECIFIED, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(keyword_hits(&results), 0);
    }

    #[tokio::test]
    async fn test_lexical_ties_break_on_id() {
        let corpus = SqliteCorpus::open_memory().unwrap();
        let snapshot = Snapshot {
            chunks: vec![
                chunk("b", "onsen en Hakone", "g.pdf", None, &[], Vec::new()),
                chunk("a", "onsen en Hakone", "g.pdf", None, &[], Vec::new()),
                chunk("c", "onsen en Hakone", "g.pdf", None, &[], Vec::new()),
            ],
            images: Vec::new(),
        };
        corpus.load_snapshot(&snapshot).unwrap();

        let results = corpus
            .lexical_search("onsen", &IntentLabel::UNSPECIFIED, 2)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_similarity() {
        let corpus = loaded();
        let results = corpus
            .vector_search(&[1.0, 0.1, 0.0], &IntentLabel::UNSPECIFIED, 3)
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["madrid_0", "madrid_1", "tokio_0"]);
        assert!(results[0].1 >= results[1].1);
    }

    #[tokio::test]
    async fn test_vector_search_applies_filter() {
        let corpus = loaded();
        let japan = IntentLabel::country(Country::Japan);
        let results = corpus
            .vector_search(&[1.0, 0.0, 0.0], &japan, 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(id, _)| id.as_str().starts_with("tokio")));
    }

    #[tokio::test]
    async fn test_vector_search_rejects_dimension_mismatch() {
        let corpus = loaded();
        let err = corpus
            .vector_search(&[1.0, 0.0], &IntentLabel::UNSPECIFIED, 3)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_get_chunks_preserves_order_and_skips_unknown() {
        let corpus = loaded();
        let chunks = corpus
            .get_chunks(&[
                ChunkId::from("tokio_1"),
                ChunkId::from("missing"),
                ChunkId::from("madrid_0"),
            ])
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id.as_str(), "tokio_1");
        assert_eq!(chunks[0].metadata.country, Some(Country::Japan));
        assert_eq!(chunks[0].metadata.topics, vec![Topic::Sightseeing]);
        assert_eq!(chunks[1].metadata.source, "guia_madrid.pdf");
        assert_eq!(chunks[1].metadata.page, Some(1));

        assert!(corpus.get_chunks(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_images_for_sources() {
        let corpus = loaded();
        let images = corpus
            .images_for_sources(&["guia_tokio.pdf"])
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].id.as_str(), "guia_tokio_img_1_0");
        assert_eq!(images[0].embedding, vec![0.5, 0.5]);

        let images = corpus
            .images_for_sources(&["guia_madrid.pdf", "guia_tokio.pdf"])
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].embedding.is_empty());

        assert!(corpus.images_for_sources(&["otra.pdf"]).await.unwrap().is_empty());
    }

    #[test]
    fn test_topic_encoding() {
        let encoded = encode_topics(&[Topic::Food, Topic::Shopping]);
        assert_eq!(encoded, ",food,shopping,");
        assert_eq!(decode_topics(&encoded), vec![Topic::Food, Topic::Shopping]);
        assert!(decode_topics(",").is_empty());
    }

    #[test]
    fn test_fts5_match_expression() {
        assert_eq!(
            fts5_match_expression("Tapas, Madrid!").as_deref(),
            Some("\"tapas\" OR \"madrid\"")
        );
        assert_eq!(fts5_match_expression("  ¿? "), None);
    }
}
