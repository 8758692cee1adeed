//! Multi-agent orchestration for the market analysis crew
//!
//! A [`Pipeline`] chains role agents: each [`Stage`] receives its task plus
//! the outputs of the stages it depends on, independent stages run
//! concurrently, and failures are recorded instead of aborting the run.

pub mod pipeline;

pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineError, PipelineRun, PromptFn, Stage, StageOutput,
    StageStatus, compose_input,
};
