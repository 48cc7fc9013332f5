//! Generic schema partitioning.
//!
//! Fields are grouped greedily in declaration order. The target per-chunk size
//! starts at the whole schema (one chunk) and shrinks as the desired chunk count
//! grows, until every multi-field group fits the safe output budget. A single
//! field heavier than the budget gets a chunk of its own.

use super::ChunkDescriptor;
use crate::schema::SchemaField;
use tracing::warn;

/// Smallest output budget handed to a generic chunk.
const MIN_CHUNK_TOKENS: usize = 256;

/// Headroom multiplier applied to a group's estimated size.
const CHUNK_HEADROOM: f64 = 1.5;

/// Greedily group fields so no group's weight exceeds `capacity`, except groups
/// holding one oversized field.
fn greedy_groups<'a>(fields: &'a [SchemaField], capacity: usize) -> Vec<Vec<&'a SchemaField>> {
    let mut groups: Vec<Vec<&SchemaField>> = Vec::new();
    let mut current: Vec<&SchemaField> = Vec::new();
    let mut current_tokens = 0usize;

    for field in fields {
        if !current.is_empty() && current_tokens + field.estimated_tokens > capacity {
            groups.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += field.estimated_tokens;
        current.push(field);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn group_tokens(group: &[&SchemaField]) -> usize {
    group.iter().map(|f| f.estimated_tokens).sum()
}

/// Every group holding more than one field must fit the budget.
fn fits_budget(groups: &[Vec<&SchemaField>], safe_output_tokens: usize) -> bool {
    groups
        .iter()
        .all(|g| g.len() == 1 || group_tokens(g) <= safe_output_tokens)
}

/// Output budget for a group: its estimate plus headroom, clamped to `[256, safe]`.
pub fn chunk_budget(estimated_tokens: usize, safe_output_tokens: usize) -> usize {
    let padded = (estimated_tokens as f64 * CHUNK_HEADROOM).ceil() as usize;
    padded.max(MIN_CHUNK_TOKENS).min(safe_output_tokens).max(1)
}

/// Partition `fields` into chunks for a model with the given safe output budget.
///
/// Chunk names are `part_{n}` numbered from `first_index`.
pub fn plan_generic(
    fields: &[SchemaField],
    safe_output_tokens: usize,
    first_index: usize,
) -> Vec<ChunkDescriptor> {
    if fields.is_empty() {
        return Vec::new();
    }

    let total: usize = fields.iter().map(|f| f.estimated_tokens).sum();
    let groups = (1..=fields.len())
        .map(|desired| greedy_groups(fields, total.div_ceil(desired).max(1)))
        .find(|groups| fits_budget(groups, safe_output_tokens))
        .unwrap_or_else(|| greedy_groups(fields, safe_output_tokens));

    groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| {
            let estimate = group_tokens(&group);
            if estimate > safe_output_tokens {
                warn!(
                    field = %group[0].name,
                    estimate,
                    safe_output_tokens,
                    "Field alone exceeds the safe output budget; output may be cut short"
                );
            }
            ChunkDescriptor::new(
                format!("part_{}", first_index + i),
                group.iter().map(|f| f.name.clone()).collect(),
                chunk_budget(estimate, safe_output_tokens),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldShape;

    fn fields(weights: &[(&str, usize)]) -> Vec<SchemaField> {
        weights
            .iter()
            .map(|(name, w)| SchemaField::new(*name, FieldShape::Any, *w))
            .collect()
    }

    fn names(chunks: &[ChunkDescriptor]) -> Vec<Vec<&str>> {
        chunks
            .iter()
            .map(|c| c.fields.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_everything_fits_in_one_chunk() {
        let f = fields(&[("a", 100), ("b", 200)]);
        let chunks = plan_generic(&f, 1_000, 1);
        assert_eq!(names(&chunks), vec![vec!["a", "b"]]);
        assert_eq!(chunks[0].name, "part_1");
        assert_eq!(chunks[0].max_output_tokens, 450);
    }

    #[test]
    fn test_header_fields_separated_from_large_fields() {
        let f = fields(&[
            ("title", 100),
            ("patient", 300),
            ("diagnoses", 1_500),
            ("treatments", 1_500),
        ]);
        let chunks = plan_generic(&f, 1_000, 1);
        assert_eq!(
            names(&chunks),
            vec![vec!["title", "patient"], vec!["diagnoses"], vec!["treatments"]]
        );
        assert!(chunks.iter().all(|c| c.max_output_tokens <= 1_000));
    }

    #[test]
    fn test_balanced_split() {
        let f = fields(&[("a", 400), ("b", 400), ("c", 400), ("d", 400)]);
        let chunks = plan_generic(&f, 1_000, 1);
        assert_eq!(names(&chunks), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_fallback_to_safe_capacity() {
        let f = fields(&[("a", 10), ("b", 10), ("c", 5_000)]);
        let chunks = plan_generic(&f, 15, 1);
        assert_eq!(names(&chunks), vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert!(chunks.iter().all(|c| c.max_output_tokens <= 15));
    }

    #[test]
    fn test_numbering_offset_and_empty() {
        let f = fields(&[("a", 10)]);
        assert_eq!(plan_generic(&f, 100, 4)[0].name, "part_4");
        assert!(plan_generic(&[], 100, 1).is_empty());
    }

    #[test]
    fn test_chunk_budget_bounds() {
        assert_eq!(chunk_budget(0, 1_000), 256);
        assert_eq!(chunk_budget(400, 1_000), 600);
        assert_eq!(chunk_budget(5_000, 1_000), 1_000);
        assert_eq!(chunk_budget(10, 100), 100);
        assert_eq!(chunk_budget(10, 0), 1);
    }
}
