//! Rank merging across several templated queries
//!
//! Runs each named template with the same row budget and folds the resulting
//! `(key, score)` rows into one ranked list, keeping the maximum score seen
//! for every key.

use crate::db::connector::Connector;
use crate::sql::executor::{Provenance, QueryExecutor};
use crate::sql::template::Params;
use crate::error::QueryResult;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Execute every `(template, params)` pair with `limit = k` and merge the
/// results into a descending ranked list of at most `k` entries.
///
/// The first column of each row is the merge key; the second, when present,
/// is the score (missing or non-numeric cells score 0.0). A failing
/// sub-query propagates immediately — no partial results. Provenance records
/// are returned in input order, one per sub-query.
///
/// Ties are broken by first-seen order: the sort is `sort_by`, which is
/// stable, over keys kept in encounter order.
pub async fn ranked_multi<C: Connector>(
    executor: &QueryExecutor<C>,
    queries: &[(String, Params)],
    k: u64,
) -> QueryResult<(Vec<(String, f64)>, Vec<Provenance>)> {
    let mut order: Vec<String> = Vec::new();
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut provenances: Vec<Provenance> = Vec::with_capacity(queries.len());

    for (name, params) in queries {
        let (rows, provenance) = executor.run(name, params.clone(), Some(k)).await?;
        provenances.push(provenance);

        for row in rows {
            if row.is_empty() {
                continue;
            }
            let key = row.values[0].key_string();
            let score = match row.values.get(1) {
                None => 0.0,
                Some(cell) => cell.score().unwrap_or_else(|| {
                    tracing::warn!(
                        "non-numeric score for key {key:?} in {name}; treating as 0.0"
                    );
                    0.0
                }),
            };

            match scores.get_mut(&key) {
                Some(existing) => {
                    if score > *existing {
                        *existing = score;
                    }
                }
                None => {
                    scores.insert(key.clone(), score);
                    order.push(key);
                }
            }
        }
    }

    let mut ranked: Vec<(String, f64)> = order
        .into_iter()
        .map(|key| {
            let score = scores.get(&key).copied().unwrap_or(0.0);
            (key, score)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k as usize);

    Ok((ranked, provenances))
}
