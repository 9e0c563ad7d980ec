// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

use serde::Serialize;
use std::collections::BTreeMap;

/// A single circuit instruction. The Controller never interprets the
/// contents of an operation beyond its name (for op-set validation and the
/// barrier/truncation transpile passes); everything else is forwarded to
/// the back-end verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub qubits: Vec<usize>,
}

/// The set of instruction kinds a circuit contains, or a back-end
/// supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpSet(BTreeSet<String>);

impl OpSet {
    pub fn new(ops: impl IntoIterator<Item = String>) -> Self {
        Self(ops.into_iter().collect())
    }

    pub fn from_operations(ops: &[Operation]) -> Self {
        Self(ops.iter().map(|op| op.name.clone()).collect())
    }

    /// True if every instruction in `other` is also in `self`.
    #[must_use]
    pub fn contains(&self, other: &OpSet) -> bool {
        other.0.is_subset(&self.0)
    }

    /// Instructions present in `other` but absent from `self`.
    #[must_use]
    pub fn difference(&self, other: &OpSet) -> Vec<String> {
        other.0.difference(&self.0).cloned().collect()
    }
}

/// A shared noise model. The core never interprets its contents; it is
/// cloned per experiment so that a back-end may mutate its private copy.
#[derive(Debug, Clone, Default)]
pub struct NoiseModel {
    pub op_set: OpSet,
    pub is_ideal: bool,
}

/// One circuit, as read by the core. Not owned: the Controller borrows
/// this for the duration of a batch.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub operations: Vec<Operation>,
    pub num_qubits: usize,
    pub op_set: OpSet,
    pub shots: u32,
    pub seed: u64,
    pub header: serde_json::Value,
}

/// Which output channels the caller requested from a back-end.
#[derive(Debug, Clone)]
pub struct ConfigChannels {
    pub counts: bool,
    pub snapshots: bool,
    pub memory: bool,
    pub register: bool,
}

impl Default for ConfigChannels {
    fn default() -> Self {
        Self {
            counts: true,
            snapshots: true,
            memory: false,
            register: false,
        }
    }
}

/// Planner knobs for a batch, read from the job's `config` map (§6).
#[derive(Debug, Clone)]
pub struct ParallelismConfig {
    pub max_parallel_threads: u32,
    pub max_parallel_experiments: u32,
    pub max_parallel_shots: u32,
    pub max_memory_mb: u64,
    pub validation_threshold: f64,
    pub truncate_qubits: bool,
    pub accept_distributed_results: bool,
    pub explicit_parallelization: bool,
    pub explicit_parallel_experiments: u32,
    pub explicit_parallel_shots: u32,
    pub explicit_parallel_state_update: u32,
}

impl Default for ParallelismConfig {
    fn default() -> Self {
        Self {
            max_parallel_threads: 0,
            max_parallel_experiments: 1,
            max_parallel_shots: 0,
            max_memory_mb: 0,
            validation_threshold: 1e-8,
            truncate_qubits: false,
            accept_distributed_results: false,
            explicit_parallelization: false,
            explicit_parallel_experiments: 1,
            explicit_parallel_shots: 1,
            explicit_parallel_state_update: 1,
        }
    }
}

impl ParallelismConfig {
    /// Coerces the first four budget knobs so that `0` consistently means
    /// "choose automatically" downstream, and clamps the explicit overrides
    /// to at least 1, per §3's invariant.
    #[must_use]
    pub fn max_parallel_threads_or(&self, default_threads: u32) -> u32 {
        if self.max_parallel_threads == 0 {
            default_threads.max(1)
        } else {
            self.max_parallel_threads
        }
    }
}

/// A batch job: an identifier, its circuits, a shared noise model, and
/// planner configuration.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub circuits: Vec<Circuit>,
    pub noise_model: Option<NoiseModel>,
    pub config: ParallelismConfig,
    pub channels: ConfigChannels,
    pub header: serde_json::Value,
}

/// Per-rank partitioning derived by the `DistributionPlanner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionState {
    pub num_processes: u32,
    pub my_rank: u32,
    pub num_process_per_experiment: u32,
    pub distributed_experiments: u32,
    pub group_id: u32,
    pub rank_in_group: u32,
    pub experiments_begin: usize,
    pub experiments_end: usize,
    pub distributed_shots: u32,
    pub distributed_shots_rank: u32,
}

/// The thread-count decision made by the `ParallelismPlanner` for one
/// batch or one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParallelismCounts {
    pub parallel_experiments: u32,
    pub parallel_shots: u32,
    pub parallel_state_update: u32,
    pub nested: bool,
}

/// Additive, commutative, associative aggregate of everything a back-end
/// produces for a set of shots.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentData {
    pub counts: BTreeMap<String, u64>,
    pub snapshots: Vec<serde_json::Value>,
    pub memory: Vec<String>,
    pub register: Vec<String>,
}

impl ExperimentData {
    /// Merges `other` into `self` by destructive move; `other` is consumed.
    pub fn combine(&mut self, other: ExperimentData) {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        self.snapshots.extend(other.snapshots);
        self.memory.extend(other.memory);
        self.register.extend(other.register);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Completed,
    Error,
}

/// The outcome of running one experiment on this process.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentResult {
    pub status: ExperimentStatus,
    pub data: ExperimentData,
    pub shots: u32,
    pub seed: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
    pub header: serde_json::Value,
}

impl ExperimentResult {
    pub fn new(header: serde_json::Value) -> Self {
        Self {
            status: ExperimentStatus::Completed,
            data: ExperimentData::default(),
            shots: 0,
            seed: 0,
            metadata: BTreeMap::new(),
            message: None,
            header,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    PartialCompleted,
    Error,
}

/// The aggregate outcome of a batch job, restricted to the local
/// experiment range.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub status: BatchStatus,
    pub results: Vec<ExperimentResult>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub job_id: String,
    pub message: String,
    pub header: serde_json::Value,
}

impl BatchResult {
    pub fn error(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: BatchStatus::Error,
            results: Vec::new(),
            metadata: BTreeMap::new(),
            job_id: job_id.into(),
            message: message.into(),
            header: serde_json::Value::Null,
        }
    }
}
