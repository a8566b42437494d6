use std::path::PathBuf;

pub mod cache;
pub mod compile;
pub mod epoch;

/// Settings shared by every session created from one template.
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    pub cache: Option<PathBuf>,
    pub max_memory: usize,
    pub capture_capacity: usize,
    pub env: Vec<(String, String)>,
}
