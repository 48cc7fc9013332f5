pub mod capacity;
pub mod compress;
pub mod config;
pub mod errors;
pub mod estimate;
pub mod generator;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod schema;
pub mod util;

pub use capacity::{CapacityRegistry, ModelCapacity, SafetyRatio};
pub use compress::{Compression, CompressionMethod, Compressor};
pub use config::{ChunkedOutputMode, ChunkgenToml, GenerationConfig};
pub use errors::{ChunkError, ChunkFailure, GenerationError};
pub use estimate::estimate_tokens;
pub use model::{CommandModel, FnModel, ModelClient, ScriptedModel};
pub use orchestrator::{ChunkedGenerator, GenerationOutcome, GenerationRequest, merge_results};
pub use planner::{ChunkDescriptor, ChunkPlan, ChunkPlanner, CustomChunk};
pub use schema::Schema;
