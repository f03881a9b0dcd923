pub mod dedup;
pub mod log;
pub mod normalizer;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod scheduler;
