// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Memory-aware, distributed scheduler for batches of quantum-circuit
//! simulation jobs.
//!
//! This crate implements the Controller only: it decides how to
//! parallelize a batch of experiments across processes, threads, and
//! shots, invokes a caller-supplied [`Backend`] to actually simulate each
//! shot, and aggregates the results. It does not implement any simulation
//! algorithm, transpiler optimization rule, or wire protocol itself — see
//! [`backend`], [`transpile`], and [`fabric`] for the seams a caller plugs
//! into.

pub mod backend;
pub mod batch_controller;
pub mod circuit_runner;
pub mod config;
pub mod distribution;
pub mod error;
pub mod fabric;
pub mod memory_probe;
pub mod model;
pub mod parallelism;
pub mod transpile;
pub mod validator;

pub use backend::Backend;
pub use batch_controller::BatchController;
pub use config::parse_job;
pub use error::{BackendError, Error, OpSide, OutOfMemoryError, ParseError, ValidationError};
pub use fabric::{Fabric, SingleRankFabric};
pub use memory_probe::MemoryProbe;
pub use model::{
    BatchResult, BatchStatus, Circuit, ConfigChannels, DistributionState, ExperimentData,
    ExperimentResult, ExperimentStatus, Job, NoiseModel, OpSet, Operation, ParallelismConfig,
    ParallelismCounts,
};
