//! The traceback engine.
//!
//! This module provides:
//! - **errors**: Error types for inference failures
//! - **network**: Stage-partitioned supply-chain DAG with an edge arena
//! - **reports**: Contamination reports and per-node time summaries
//! - **paths**: Graph algebra (ancestors, path enumeration, shortest and most probable paths)
//! - **feasibility**: Candidate-source filter
//! - **incidence**: Edge-incidence matrices
//! - **time_model**: Gaussian travel-time likelihood
//! - **volume**: Flow-volume (absorption) likelihood
//! - **exact**: Full trajectory-space estimator
//! - **heuristic**: One-path-per-node estimators (BFS and MaxP)
//! - **traceback**: Estimator selection and posterior assembly

pub mod errors;
pub mod exact;
pub mod feasibility;
pub mod heuristic;
pub mod incidence;
pub mod network;
pub mod numeric;
pub(crate) mod parallel;
pub mod paths;
pub mod reports;
pub mod time_model;
pub mod traceback;
pub mod volume;
