pub mod commands;
pub mod diagnostics;
pub mod effects;
pub mod engine;
pub mod graph;
pub mod midi;
pub mod mixer;
pub mod plugin;
pub mod recorder;
pub mod render;
pub mod session;
pub mod sources;
pub mod synth;
pub mod transport;

mod tests_engine;

// Re-exports
pub use commands::EngineCommand;
pub use diagnostics::Diagnostic;
pub use engine::{AudioEngine, RecordingOutcome};
pub use transport::TransportState;
