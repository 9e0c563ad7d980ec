// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Deserialize;

use crate::error::ParseError;
use crate::model::{Circuit, ConfigChannels, Job, NoiseModel, OpSet, Operation, ParallelismConfig};

#[derive(Debug, Deserialize)]
struct JobDocument {
    id: String,
    circuits: Vec<CircuitDocument>,
    #[serde(default)]
    config: ConfigDocument,
    #[serde(default)]
    header: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OperationDocument {
    name: String,
    #[serde(default)]
    qubits: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct CircuitDocument {
    #[serde(default)]
    operations: Vec<OperationDocument>,
    num_qubits: usize,
    #[serde(default)]
    op_set: Option<Vec<String>>,
    shots: u32,
    seed: u64,
    #[serde(default)]
    header: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct NoiseModelDocument {
    #[serde(default)]
    op_set: Vec<String>,
    #[serde(default)]
    is_ideal: bool,
}

fn default_max_parallel_experiments() -> u32 {
    1
}

fn default_validation_threshold() -> f64 {
    1e-8
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    noise_model: Option<NoiseModelDocument>,
    #[serde(default)]
    max_parallel_threads: u32,
    #[serde(default = "default_max_parallel_experiments")]
    max_parallel_experiments: u32,
    #[serde(default)]
    max_parallel_shots: u32,
    #[serde(default)]
    max_memory_mb: u64,
    #[serde(default = "default_validation_threshold")]
    validation_threshold: f64,
    #[serde(default)]
    truncate_qubits: bool,
    #[serde(default)]
    accept_distributed_results: bool,
    #[serde(default)]
    counts: Option<bool>,
    #[serde(default)]
    snapshots: Option<bool>,
    #[serde(default)]
    memory: Option<bool>,
    #[serde(default)]
    register: Option<bool>,
    #[serde(default, rename = "_parallel_experiments")]
    explicit_parallel_experiments: Option<u32>,
    #[serde(default, rename = "_parallel_shots")]
    explicit_parallel_shots: Option<u32>,
    #[serde(default, rename = "_parallel_state_update")]
    explicit_parallel_state_update: Option<u32>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            noise_model: None,
            max_parallel_threads: 0,
            max_parallel_experiments: default_max_parallel_experiments(),
            max_parallel_shots: 0,
            max_memory_mb: 0,
            validation_threshold: default_validation_threshold(),
            truncate_qubits: false,
            accept_distributed_results: false,
            counts: None,
            snapshots: None,
            memory: None,
            register: None,
            explicit_parallel_experiments: None,
            explicit_parallel_shots: None,
            explicit_parallel_state_update: None,
        }
    }
}

/// Parses a job document (§6) into a [`Job`]. Deserialization failures and
/// missing required fields both surface as [`ParseError::InvalidJson`].
pub fn parse_job(job_blob: &[u8]) -> std::result::Result<Job, ParseError> {
    let document: JobDocument =
        serde_json::from_slice(job_blob).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let circuits = document
        .circuits
        .into_iter()
        .map(|c| {
            let operations: Vec<Operation> = c
                .operations
                .into_iter()
                .map(|op| Operation {
                    name: op.name,
                    qubits: op.qubits,
                })
                .collect();
            let op_set = match c.op_set {
                Some(names) => OpSet::new(names),
                None => OpSet::from_operations(&operations),
            };
            Circuit {
                operations,
                num_qubits: c.num_qubits,
                op_set,
                shots: c.shots,
                seed: c.seed,
                header: c.header,
            }
        })
        .collect();

    let noise_model = document.config.noise_model.as_ref().map(|n| NoiseModel {
        op_set: OpSet::new(n.op_set.clone()),
        is_ideal: n.is_ideal,
    });

    let explicit_parallelization = document.config.explicit_parallel_experiments.is_some()
        || document.config.explicit_parallel_shots.is_some()
        || document.config.explicit_parallel_state_update.is_some();

    let config = ParallelismConfig {
        max_parallel_threads: document.config.max_parallel_threads,
        max_parallel_experiments: document.config.max_parallel_experiments,
        max_parallel_shots: document.config.max_parallel_shots,
        max_memory_mb: document.config.max_memory_mb,
        validation_threshold: document.config.validation_threshold,
        truncate_qubits: document.config.truncate_qubits,
        accept_distributed_results: document.config.accept_distributed_results,
        explicit_parallelization,
        explicit_parallel_experiments: document.config.explicit_parallel_experiments.unwrap_or(1).max(1),
        explicit_parallel_shots: document.config.explicit_parallel_shots.unwrap_or(1).max(1),
        explicit_parallel_state_update: document
            .config
            .explicit_parallel_state_update
            .unwrap_or(1)
            .max(1),
    };

    let channels = ConfigChannels {
        counts: document.config.counts.unwrap_or(true),
        snapshots: document.config.snapshots.unwrap_or(true),
        memory: document.config.memory.unwrap_or(false),
        register: document.config.register.unwrap_or(false),
    };

    Ok(Job {
        id: document.id,
        circuits,
        noise_model,
        config,
        channels,
        header: document.header,
    })
}
