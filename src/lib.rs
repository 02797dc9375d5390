//! crew — task orchestration and quality-gate pipeline for autonomous
//! maintenance bots.
//!
//! The core accepts a batch of work items, routes each to a
//! capability-matched worker, drives three concurrent execution lanes,
//! subjects completed work to validator fan-out and quality gates, and
//! reports a final verdict with full metrics and alerting. Content
//! generation, document rendering, and git plumbing are external
//! collaborators behind the traits in [`traits`].

pub mod checks;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gates;
pub mod monitor;
pub mod orchestrator;
pub mod task;
pub mod traits;
pub mod validation;
pub mod worker;
