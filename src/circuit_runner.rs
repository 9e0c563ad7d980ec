// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Instant;

use rayon::prelude::*;

use crate::backend::Backend;
use crate::model::{
    Circuit, ConfigChannels, DistributionState, ExperimentData, ExperimentResult, ExperimentStatus,
    NoiseModel, ParallelismConfig,
};
use crate::parallelism::{local_shot_count, split_shots, CircuitLevelPlanner};
use crate::transpile::{BarrierReduction, QubitTruncation, TranspilePass};

/// Executes one experiment on this rank: transpile, split shots into
/// subshot groups, invoke the back-end, merge.
pub struct CircuitRunner;

impl CircuitRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        circuit: &Circuit,
        noise: &NoiseModel,
        backend: &dyn Backend,
        channels: &ConfigChannels,
        config: &ParallelismConfig,
        distribution: &DistributionState,
        parallel_experiments: u32,
        max_memory_mb: u64,
        required_memory_mb: impl Fn(&Circuit, &NoiseModel) -> u64,
    ) -> ExperimentResult {
        let start = Instant::now();
        let mut result = ExperimentResult::new(circuit.header.clone());

        let mut circuit = circuit.clone();
        let mut noise = noise.clone();
        let backend_op_set = backend.op_set();

        let mut barrier_reduction = BarrierReduction::default();
        barrier_reduction.set_config(config.validation_threshold);
        barrier_reduction.optimize_circuit(&mut circuit, &mut noise, &backend_op_set);

        if config.truncate_qubits {
            let mut truncation = QubitTruncation::default();
            truncation.set_config(config.validation_threshold);
            truncation.optimize_circuit(&mut circuit, &mut noise, &backend_op_set);
        }

        let (parallel_shots, parallel_state_update, shots_local) = if config.explicit_parallelization {
            let shots_local = local_shot_count(
                circuit.shots,
                distribution.distributed_shots,
                distribution.distributed_shots_rank,
            );
            (
                config.explicit_parallel_shots.max(1),
                config.explicit_parallel_state_update.max(1),
                shots_local,
            )
        } else {
            match CircuitLevelPlanner::plan(
                &circuit,
                &noise,
                &required_memory_mb,
                config.max_parallel_shots,
                config.max_parallel_threads_or(num_cpus_fallback()),
                max_memory_mb,
                distribution.num_process_per_experiment,
                parallel_experiments,
                distribution.distributed_shots,
                distribution.distributed_shots_rank,
            ) {
                Ok(counts) => counts,
                Err(err) => {
                    result.status = ExperimentStatus::Error;
                    result.message = Some(err.to_string());
                    return result;
                }
            }
        };

        let outcome = if parallel_shots <= 1 {
            backend
                .run(&circuit, &noise, channels, shots_local, circuit.seed)
                .map_err(|e| vec![e.to_string()])
        } else {
            let buckets = split_shots(shots_local, parallel_shots);
            let bucket_results: Vec<std::result::Result<ExperimentData, String>> = buckets
                .par_iter()
                .enumerate()
                .map(|(i, &bucket_shots)| {
                    backend
                        .run(&circuit, &noise, channels, bucket_shots, circuit.seed + i as u64)
                        .map_err(|e| e.to_string())
                })
                .collect();

            let errors: Vec<String> = bucket_results
                .iter()
                .filter_map(|r| r.as_ref().err().cloned())
                .collect();

            if errors.is_empty() {
                let mut merged = ExperimentData::default();
                for bucket in bucket_results {
                    merged.combine(bucket.expect("checked above: no bucket errored"));
                }
                Ok(merged)
            } else {
                Err(errors)
            }
        };

        match outcome {
            Ok(data) => {
                result.status = ExperimentStatus::Completed;
                result.data = data;
                result.shots = shots_local;
                result.seed = circuit.seed;
                result
                    .metadata
                    .insert("parallel_shots".to_string(), parallel_shots.into());
                result
                    .metadata
                    .insert("parallel_state_update".to_string(), parallel_state_update.into());
                if distribution.distributed_shots > 1 {
                    result
                        .metadata
                        .insert("distributed_shots".to_string(), distribution.distributed_shots.into());
                }
                result
                    .metadata
                    .insert("time_taken".to_string(), start.elapsed().as_secs_f64().into());
            }
            Err(messages) => {
                result.status = ExperimentStatus::Error;
                result.message = messages.into_iter().find(|m| !m.is_empty());
            }
        }

        result
    }
}

fn num_cpus_fallback() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OpSet;

    struct CountingBackend;

    impl Backend for CountingBackend {
        fn op_set(&self) -> OpSet {
            OpSet::default()
        }
        fn name(&self) -> &str {
            "counting"
        }
        fn required_memory_mb(&self, _circuit: &Circuit, _noise: &NoiseModel) -> u64 {
            1
        }
        fn run(
            &self,
            _circuit: &Circuit,
            _noise: &NoiseModel,
            _channels: &ConfigChannels,
            shots: u32,
            seed: u64,
        ) -> std::result::Result<ExperimentData, crate::error::BackendError> {
            let mut data = ExperimentData::default();
            data.counts.insert(format!("seed={seed}"), u64::from(shots));
            Ok(data)
        }
    }

    struct FailingBackend;

    impl Backend for FailingBackend {
        fn op_set(&self) -> OpSet {
            OpSet::default()
        }
        fn name(&self) -> &str {
            "failing"
        }
        fn required_memory_mb(&self, _circuit: &Circuit, _noise: &NoiseModel) -> u64 {
            1
        }
        fn run(
            &self,
            _circuit: &Circuit,
            _noise: &NoiseModel,
            _channels: &ConfigChannels,
            _shots: u32,
            _seed: u64,
        ) -> std::result::Result<ExperimentData, crate::error::BackendError> {
            Err(crate::error::BackendError::ExecutionFailed("boom".to_string()))
        }
    }

    fn circuit(shots: u32, seed: u64) -> Circuit {
        Circuit {
            operations: Vec::new(),
            num_qubits: 1,
            op_set: OpSet::default(),
            shots,
            seed,
            header: serde_json::Value::Null,
        }
    }

    fn single_rank_distribution() -> DistributionState {
        DistributionState {
            num_processes: 1,
            my_rank: 0,
            num_process_per_experiment: 1,
            distributed_experiments: 1,
            group_id: 0,
            rank_in_group: 0,
            experiments_begin: 0,
            experiments_end: 1,
            distributed_shots: 1,
            distributed_shots_rank: 0,
        }
    }

    #[test]
    fn merges_shot_buckets_and_preserves_total_shots() {
        let circuit = circuit(1000, 7);
        let noise = NoiseModel::default();
        let mut config = ParallelismConfig {
            max_parallel_threads: 4,
            ..Default::default()
        };
        config.max_parallel_experiments = 1;
        let distribution = single_rank_distribution();
        let result = CircuitRunner::run(
            &circuit,
            &noise,
            &CountingBackend,
            &ConfigChannels::default(),
            &config,
            &distribution,
            1,
            1024,
            |_, _| 1,
        );
        assert_eq!(result.status, ExperimentStatus::Completed);
        assert_eq!(result.shots, 1000);
        let total: u64 = result.data.counts.values().sum();
        assert_eq!(total, 1000);
    }

    #[test]
    fn backend_failure_is_captured_as_experiment_error() {
        let circuit = circuit(10, 1);
        let noise = NoiseModel::default();
        let config = ParallelismConfig {
            max_parallel_threads: 1,
            max_parallel_experiments: 1,
            ..Default::default()
        };
        let distribution = single_rank_distribution();
        let result = CircuitRunner::run(
            &circuit,
            &noise,
            &FailingBackend,
            &ConfigChannels::default(),
            &config,
            &distribution,
            1,
            1024,
            |_, _| 1,
        );
        assert_eq!(result.status, ExperimentStatus::Error);
        assert_eq!(result.message.as_deref(), Some("boom"));
    }
}
