//! Generic cosine-similarity search over any vector-bearing table.
//!
//! Memory recall is a specialization of this routine; new vector-bearing
//! entities can reuse it by naming their table and columns.

use crate::db::ConnectionManager;
use crate::error::{DhakiraError, Result};

/// A single result from a vector similarity search.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: String,
    pub text: String,
    pub distance: f64,
    pub score: f64,
}

/// Identifies the table, columns, and scope to search. Table and column
/// names are embedded into the SQL text and must come from trusted
/// compile-time callers, never user input.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
    pub table: &'a str,
    pub id_column: &'a str,
    pub text_column: &'a str,
    pub embedding_column: &'a str,
    pub agent_id: &'a str,
    pub max_results: usize,
    pub min_score: f64,
}

/// Nearest-neighbor search ordered by ascending cosine distance.
///
/// Distances convert to similarity via `score = 1 - distance`; results
/// scoring below `min_score` are dropped, not just ranked lower.
pub async fn vector_search(
    cm: &ConnectionManager,
    query: VectorQuery<'_>,
    query_vector: &[f32],
) -> Result<Vec<VectorSearchResult>> {
    let sql = format!(
        "SELECT {id}, {text},
                VECTOR_DISTANCE({emb}, TO_VECTOR(:1), COSINE) AS distance
         FROM {table}
         WHERE agent_id = :2
           AND {emb} IS NOT NULL
         ORDER BY distance ASC
         FETCH FIRST :3 ROWS ONLY",
        id = query.id_column,
        text = query.text_column,
        emb = query.embedding_column,
        table = query.table,
    );
    let table = query.table.to_string();
    let vector = vector_literal(query_vector);
    let agent_id = query.agent_id.to_string();
    let max_results = query.max_results as i64;
    let min_score = query.min_score;

    cm.with_conn(move |conn| {
        let rows = conn
            .query_as::<(String, Option<String>, f64)>(&sql, &[&vector, &agent_id, &max_results])
            .map_err(|e| {
                DhakiraError::Storage(format!("vector search failed on {table}: {e}"))
            })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, text, distance) =
                row.map_err(|e| DhakiraError::Storage(format!("scan failed: {e}")))?;
            let score = 1.0 - distance;
            if score < min_score {
                continue;
            }
            results.push(VectorSearchResult {
                id,
                text: text.unwrap_or_default(),
                distance,
                score,
            });
        }
        Ok(results)
    })
    .await
}

/// Serialize a vector as the bracketed literal Oracle's `TO_VECTOR()`
/// accepts, e.g. `[0.123,0.456,-0.789]`.
pub fn vector_literal(v: &[f32]) -> String {
    if v.is_empty() {
        return "[]".to_string();
    }
    let parts: Vec<String> = v.iter().map(|f| format!("{f}")).collect();
    format!("[{}]", parts.join(","))
}

/// Parse the textual form produced by `FROM_VECTOR(... RETURNING CLOB)`
/// back into floats.
pub fn parse_vector_literal(s: &str) -> Result<Vec<f32>> {
    let inner = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| DhakiraError::Embedding(format!("bad vector component {part:?}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal_formatting() {
        assert_eq!(vector_literal(&[0.123, 0.456, -0.789]), "[0.123,0.456,-0.789]");
        assert_eq!(vector_literal(&[]), "[]");
        assert_eq!(vector_literal(&[1.0]), "[1]");
    }

    #[test]
    fn test_parse_vector_literal() {
        let v = parse_vector_literal("[0.5,-0.25,1]").unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);
    }

    #[test]
    fn test_parse_vector_literal_scientific_notation() {
        let v = parse_vector_literal("[1.04061793E-001, -2.5E-002]").unwrap();
        assert!((v[0] - 0.104061793).abs() < 1e-6);
        assert!((v[1] + 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_parse_vector_literal_empty() {
        assert!(parse_vector_literal("[]").unwrap().is_empty());
        assert!(parse_vector_literal("  [ ]  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_vector_literal_rejects_garbage() {
        assert!(parse_vector_literal("[1.0,abc]").is_err());
    }

    #[test]
    fn test_literal_roundtrip() {
        let original = vec![0.1_f32, -0.2, 0.33333];
        let parsed = parse_vector_literal(&vector_literal(&original)).unwrap();
        assert_eq!(parsed.len(), original.len());
        for (a, b) in original.iter().zip(&parsed) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_score_conversion() {
        // cosine distance -> similarity
        for (distance, want) in [(0.0, 1.0), (0.1, 0.9), (0.8, 0.2), (1.0, 0.0)] {
            let score = 1.0 - distance;
            assert!((score - want).abs() < 1e-9);
        }
    }
}
