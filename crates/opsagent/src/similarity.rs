use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::db;

/// Default number of tables matched per question.
pub const DEFAULT_TOP_K: usize = 2;

/// One described table/view matched against a query embedding.
#[derive(Debug, Clone, Serialize)]
pub struct TableMatch {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub columns: Vec<String>,
    pub similarity: f64,
}

/// Cosine similarity between two vectors. Returns 0 (not an error) when the
/// lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

/// Parse a stored embedding. Descriptors written by older jobs carry the
/// vector JSON-encoded as text; newer ones may store a native numeric
/// array. This is the single place both encodings are resolved.
pub fn parse_embedding(raw: &serde_json::Value) -> Option<Vec<f64>> {
    match raw {
        serde_json::Value::String(s) => {
            let parsed: Vec<f64> = serde_json::from_str(s.trim()).ok()?;
            if parsed.is_empty() {
                None
            } else {
                Some(parsed)
            }
        }
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(item.as_f64()?);
            }
            if out.is_empty() {
                None
            } else {
                Some(out)
            }
        }
        _ => None,
    }
}

/// Render a vector as a pgvector-compatible literal, e.g. `[0.1,0.2,0.3]`.
pub fn vector_literal(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Sort matches descending by similarity and keep the first `k`.
pub fn top_k_matches(mut matches: Vec<TableMatch>, k: usize) -> Vec<TableMatch> {
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(k);
    matches
}

/// Canonical text a descriptor is embedded from. The indexing worker and
/// any future re-embedding job must agree on this rendering.
pub fn descriptor_text(
    name: &str,
    kind: &str,
    description: Option<&str>,
    columns: &[String],
) -> String {
    let mut text = format!("Table: {}\nType: {}\n", name, kind);
    if let Some(desc) = description {
        if !desc.trim().is_empty() {
            text.push_str(&format!("Description: {}\n", desc));
        }
    }
    text.push_str(&format!("Columns: {}", columns.join(", ")));
    text
}

/// Semantic index over `table_semantics`. Read-only on the query path; the
/// stored embeddings are maintained by the out-of-band indexing worker.
pub struct TableIndex {
    pool: PgPool,
}

impl TableIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn top_k_from_env() -> usize {
        std::env::var("OA_MATCH_TOPK")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOP_K)
    }

    /// Find the `k` tables most similar to the query embedding, descending
    /// by similarity. Index failures never propagate: a native-path error
    /// selects the in-process fallback, and a total failure degrades to
    /// zero matches.
    pub async fn find_top_matches(&self, query: &[f64], k: usize) -> Vec<TableMatch> {
        if query.is_empty() {
            return Vec::new();
        }
        match self.try_native(query, k).await {
            Ok(matches) => matches,
            Err(e) => {
                log::warn!(
                    "native similarity query unavailable, falling back to in-process scan: {}",
                    e
                );
                match self.fallback(query, k).await {
                    Ok(matches) => matches,
                    Err(e) => {
                        log::error!("similarity fallback failed, returning no matches: {}", e);
                        Vec::new()
                    }
                }
            }
        }
    }

    // Native path: one pgvector nearest-neighbor query ordered ascending by
    // distance. Stored embeddings are cast to `vector`, so a missing
    // extension or an uncastable value fails the whole statement, which is
    // the expected signal to use the fallback.
    async fn try_native(&self, query: &[f64], k: usize) -> Result<Vec<TableMatch>, sqlx::Error> {
        let literal = vector_literal(query);
        let rows = sqlx::query(
            "SELECT id::text AS id, name, type AS kind, description, columns, \
             (embed::vector <-> $1::vector)::float8 AS distance \
             FROM table_semantics \
             WHERE embed IS NOT NULL \
             ORDER BY embed::vector <-> $1::vector \
             LIMIT $2",
        )
        .bind(&literal)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let distance: f64 = row.try_get("distance")?;
            matches.push(TableMatch {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                kind: row.try_get("kind")?,
                description: row.try_get("description")?,
                columns: db::decode_column_list(row),
                similarity: 1.0 - distance,
            });
        }
        Ok(matches)
    }

    // Fallback path: fetch every descriptor and rank in process. Rows with
    // missing, unparseable, or dimension-mismatched embeddings are logged
    // and skipped rather than failing the index.
    async fn fallback(&self, query: &[f64], k: usize) -> Result<Vec<TableMatch>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id::text AS id, name, type AS kind, description, columns, embed \
             FROM table_semantics",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<TableMatch> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let name: String = row.try_get("name")?;
            let embedding = match db::decode_embedding(row).as_ref().and_then(parse_embedding) {
                Some(v) => v,
                None => {
                    log::debug!("table '{}' has no usable embedding, skipping", name);
                    continue;
                }
            };
            if embedding.len() != query.len() {
                log::warn!(
                    "embedding dimension mismatch for table '{}': {} vs {}, skipping",
                    name,
                    embedding.len(),
                    query.len()
                );
                continue;
            }
            scored.push(TableMatch {
                id: row.try_get("id")?,
                name,
                kind: row.try_get("kind")?,
                description: row.try_get("description")?,
                columns: db::decode_column_list(row),
                similarity: cosine_similarity(query, &embedding),
            });
        }
        Ok(top_k_matches(scored, k))
    }
}

// Descriptor fetch used by the indexing worker: id, name, kind,
// description and columns for every described table.
pub async fn fetch_descriptors(pool: &PgPool) -> Result<Vec<PgRow>, sqlx::Error> {
    sqlx::query(
        "SELECT id::text AS id, name, type AS kind, description, columns FROM table_semantics",
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![0.5, -1.0, 2.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_length_mismatch_is_zero_not_error() {
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn vector_literal_is_pgvector_shaped() {
        assert_eq!(vector_literal(&[1.0, 2.5, -0.25]), "[1,2.5,-0.25]");
    }
}
