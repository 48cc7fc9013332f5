//! Chunk planning.
//!
//! Partitions a schema's top-level fields into an ordered sequence of chunks,
//! each bounded by the model's safe output budget. Three sources are supported:
//!
//! - **Predefined**: hand-curated groupings for known task types
//! - **Custom**: caller-supplied `(name, fields, max_tokens)` groups
//! - **Generic**: greedy partitioning by estimated field weight
//!
//! Whatever the source, the resulting plan covers every schema field exactly once.
//! Predefined and custom groups are reconciled with the schema: fields the schema
//! lacks are dropped, and schema fields the groups miss are planned generically and
//! appended.

mod generic;
mod predefined;

pub use generic::{chunk_budget, plan_generic};
pub use predefined::{
    DEFAULT_EXPECTED_TOKENS, PredefinedGroup, PredefinedPlan, known_task_types, predefined_plan,
};

use crate::capacity::ModelCapacity;
use crate::errors::GenerationError;
use crate::schema::{Schema, SchemaField};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One capacity-bounded subset of the schema's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub name: String,
    pub fields: Vec<String>,
    pub max_output_tokens: usize,
}

impl ChunkDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<String>, max_output_tokens: usize) -> Self {
        Self {
            name: name.into(),
            fields,
            max_output_tokens,
        }
    }

    /// Whether this chunk is responsible for generating `field`.
    pub fn owns(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// A caller-supplied chunk definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomChunk {
    pub name: String,
    pub fields: Vec<String>,
    pub max_tokens: usize,
}

impl CustomChunk {
    pub fn new<I, S>(name: &str, fields: I, max_tokens: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            max_tokens,
        }
    }
}

/// Where a plan's grouping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Predefined,
    Custom,
    Generic,
    /// Single chunk covering the whole schema (chunking skipped).
    Direct,
}

impl std::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanSource::Predefined => write!(f, "predefined"),
            PlanSource::Custom => write!(f, "custom"),
            PlanSource::Generic => write!(f, "generic"),
            PlanSource::Direct => write!(f, "direct"),
        }
    }
}

/// Ordered chunk sequence for one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub root_key: Option<String>,
    pub chunks: Vec<ChunkDescriptor>,
    pub source: PlanSource,
}

impl ChunkPlan {
    /// A one-chunk plan covering the whole schema with the full safe budget.
    pub fn direct(schema: &Schema, safe_output_tokens: usize) -> Self {
        Self {
            root_key: schema.root_key.clone(),
            chunks: vec![ChunkDescriptor::new(
                "full_document",
                schema.fields.iter().map(|f| f.name.clone()).collect(),
                safe_output_tokens.max(1),
            )],
            source: PlanSource::Direct,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_names(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.name.as_str()).collect()
    }

    /// Sum of all chunks' output budgets.
    pub fn total_budget(&self) -> usize {
        self.chunks.iter().map(|c| c.max_output_tokens).sum()
    }

    /// Verify every schema field is owned by exactly one chunk and nothing else is.
    pub fn check_coverage(&self, schema: &Schema) -> Result<(), GenerationError> {
        let mut seen = HashSet::new();
        let mut names = HashSet::new();
        for chunk in &self.chunks {
            if !names.insert(chunk.name.as_str()) {
                return Err(GenerationError::InvalidPlan(format!(
                    "chunk name '{}' is used twice",
                    chunk.name
                )));
            }
            if chunk.fields.is_empty() {
                return Err(GenerationError::InvalidPlan(format!(
                    "chunk '{}' has no fields",
                    chunk.name
                )));
            }
            if chunk.max_output_tokens == 0 {
                return Err(GenerationError::InvalidPlan(format!(
                    "chunk '{}' has a zero output budget",
                    chunk.name
                )));
            }
            for field in &chunk.fields {
                if !schema.contains(field) {
                    return Err(GenerationError::InvalidPlan(format!(
                        "chunk '{}' names unknown field '{}'",
                        chunk.name, field
                    )));
                }
                if !seen.insert(field.as_str()) {
                    return Err(GenerationError::InvalidPlan(format!(
                        "field '{}' is assigned to more than one chunk",
                        field
                    )));
                }
            }
        }
        if let Some(missing) = schema.fields.iter().find(|f| !seen.contains(f.name.as_str())) {
            return Err(GenerationError::InvalidPlan(format!(
                "field '{}' is not assigned to any chunk",
                missing.name
            )));
        }
        Ok(())
    }
}

/// Reject custom chunk lists that cannot form a valid plan.
pub fn validate_custom_chunks(chunks: &[CustomChunk]) -> Result<(), GenerationError> {
    if chunks.is_empty() {
        return Err(GenerationError::InvalidPlan(
            "custom chunk list is empty".to_string(),
        ));
    }
    let mut names = HashSet::new();
    let mut fields = HashSet::new();
    for chunk in chunks {
        if chunk.name.trim().is_empty() {
            return Err(GenerationError::InvalidPlan(
                "custom chunk has an empty name".to_string(),
            ));
        }
        if !names.insert(chunk.name.as_str()) {
            return Err(GenerationError::InvalidPlan(format!(
                "chunk name '{}' is used twice",
                chunk.name
            )));
        }
        if chunk.fields.is_empty() {
            return Err(GenerationError::InvalidPlan(format!(
                "chunk '{}' has no fields",
                chunk.name
            )));
        }
        if chunk.max_tokens == 0 {
            return Err(GenerationError::InvalidPlan(format!(
                "chunk '{}' has max_tokens = 0",
                chunk.name
            )));
        }
        for field in &chunk.fields {
            if !fields.insert(field.as_str()) {
                return Err(GenerationError::InvalidPlan(format!(
                    "field '{}' appears in more than one chunk",
                    field
                )));
            }
        }
    }
    Ok(())
}

/// Plans chunks for one model.
pub struct ChunkPlanner<'a> {
    capacity: &'a ModelCapacity,
}

impl<'a> ChunkPlanner<'a> {
    pub fn new(capacity: &'a ModelCapacity) -> Self {
        Self { capacity }
    }

    fn safe_output(&self) -> usize {
        self.capacity.safe_output_tokens()
    }

    /// Generic plan over the whole schema.
    pub fn plan(&self, schema: &Schema) -> Result<ChunkPlan, GenerationError> {
        let plan = ChunkPlan {
            root_key: schema.root_key.clone(),
            chunks: plan_generic(&schema.fields, self.safe_output(), 1),
            source: PlanSource::Generic,
        };
        self.finish(plan, schema)
    }

    /// Plan using custom chunks if given, else the task type's predefined plan,
    /// else the generic algorithm.
    pub fn plan_for_task(
        &self,
        schema: &Schema,
        task_type: Option<&str>,
        custom_chunks: Option<&[CustomChunk]>,
    ) -> Result<ChunkPlan, GenerationError> {
        if let Some(custom) = custom_chunks {
            validate_custom_chunks(custom)?;
            let groups: Vec<(&str, Vec<&str>, usize)> = custom
                .iter()
                .map(|c| {
                    let fields = c.fields.iter().map(String::as_str).collect();
                    (c.name.as_str(), fields, c.max_tokens)
                })
                .collect();
            return self.reconcile(schema, groups, PlanSource::Custom);
        }

        if let Some(task) = task_type {
            match predefined_plan(task) {
                Some(predefined) => {
                    let groups: Vec<(&str, Vec<&str>, usize)> = predefined
                        .groups
                        .iter()
                        .map(|g| (g.name, g.fields.to_vec(), g.max_tokens))
                        .collect();
                    return self.reconcile(schema, groups, PlanSource::Predefined);
                }
                None => warn!(task_type = task, "No predefined plan for task type, planning generically"),
            }
        }

        self.plan(schema)
    }

    /// Map named groups onto the schema and cover any leftover fields generically.
    fn reconcile(
        &self,
        schema: &Schema,
        groups: Vec<(&str, Vec<&str>, usize)>,
        source: PlanSource,
    ) -> Result<ChunkPlan, GenerationError> {
        let safe = self.safe_output();
        let mut chunks = Vec::new();
        let mut covered = HashSet::new();

        for (name, fields, max_tokens) in groups {
            let present: Vec<String> = fields
                .iter()
                .filter(|f| {
                    let known = schema.contains(f);
                    if !known {
                        debug!(chunk = name, field = **f, "Field not in schema, dropping from chunk");
                    }
                    known
                })
                .map(|f| f.to_string())
                .collect();
            if present.is_empty() {
                debug!(chunk = name, "No schema fields left in chunk, skipping");
                continue;
            }
            if max_tokens > safe {
                warn!(
                    chunk = name,
                    max_tokens, safe, "Chunk budget exceeds safe output budget, clamping"
                );
            }
            covered.extend(present.iter().cloned());
            chunks.push(ChunkDescriptor::new(name, present, max_tokens.min(safe).max(1)));
        }

        let leftovers: Vec<SchemaField> = schema
            .fields
            .iter()
            .filter(|f| !covered.contains(&f.name))
            .cloned()
            .collect();
        if !leftovers.is_empty() {
            debug!(
                count = leftovers.len(),
                "Planning schema fields not covered by named chunks"
            );
            let mut taken: HashSet<String> = chunks.iter().map(|c| c.name.clone()).collect();
            let mut index = chunks.len() + 1;
            for mut chunk in plan_generic(&leftovers, safe, index) {
                while taken.contains(&format!("part_{}", index)) {
                    index += 1;
                }
                chunk.name = format!("part_{}", index);
                taken.insert(chunk.name.clone());
                index += 1;
                chunks.push(chunk);
            }
        }

        let plan = ChunkPlan {
            root_key: schema.root_key.clone(),
            chunks,
            source,
        };
        self.finish(plan, schema)
    }

    fn finish(&self, plan: ChunkPlan, schema: &Schema) -> Result<ChunkPlan, GenerationError> {
        plan.check_coverage(schema)?;
        debug!(
            source = %plan.source,
            chunks = plan.len(),
            safe_output = self.safe_output(),
            "Chunk plan ready"
        );
        Ok(plan)
    }
}
