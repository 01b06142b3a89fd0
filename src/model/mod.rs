// ABOUTME: Model module - registry seam, capability matrix, and fuzzy resolution.
// ABOUTME: Pure lookups plus the request-scoped registry snapshot.

mod fuzzy;
mod matrix;
mod registry;

pub use fuzzy::resolve_model_fuzzy;
pub use matrix::{CapabilityMatrix, Ratings, TaskType};
pub use registry::{
    provider_key_env_var, ModelCandidate, ModelCost, ModelInfo, ModelRegistry, RegistrySnapshot,
    StaticModelRegistry,
};
