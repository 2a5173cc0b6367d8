//! Pipeline orchestration for DocFrame.
//!
//! This crate ties the engine to its collaborators: interface descriptions
//! (`interface`), the template compute step (`template`) and the end-to-end
//! run that loads inputs, computes and saves outputs (`pipeline`).

pub mod interface;
pub mod pipeline;
pub mod template;

pub use interface::Interface;
pub use pipeline::{
    PipelineResult, ProgressReporter, SilentProgress, build_frame, explicit_names, run_pipeline,
};
pub use template::{Compute, ComputeSpec, TemplateCompute};
