pub mod codec;
pub mod failure;
pub mod pipeline;
pub mod planner;
pub mod scanner;
mod transport;
pub mod visualizer;

pub use failure::CallFailure;
pub use pipeline::{
    Backends, CaptureSet, NoProgress, Pipeline, ProgressSink, RunNotice, RunOutcome, RunReport,
    RunStage, Visualization,
};
