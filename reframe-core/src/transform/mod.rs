//! Transform planning and filter-graph rendering.
//!
//! `planner` decides which operations a source needs relative to a target
//! profile; `filter_graph` renders that decision into an ffmpeg `-vf` chain.

pub mod filter_graph;
pub mod planner;

pub use filter_graph::{FilterChain, FilterGraphBuilder, VideoFilterChain};
pub use planner::{
    PlannerOptions, ScaleStrategy, TargetAspect, TargetProfile, TransformPlan, TransformPlanner,
};
