// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::OutOfMemoryError;
use crate::model::{Circuit, NoiseModel};

/// True when the platform can actually run more than one OS thread. When
/// false, both planners below are bypassed entirely and every `parallel_*`
/// count collapses to 1, per the thread-budget contract.
#[must_use]
pub fn threads_available() -> bool {
    !cfg!(target_family = "wasm")
}

/// Chooses how many local experiments run at once, given a memory budget
/// and a thread budget.
pub struct ExperimentLevelPlanner;

impl ExperimentLevelPlanner {
    /// Returns `(parallel_experiments, nested)`.
    pub fn plan(
        local_circuits: &[Circuit],
        noise: &NoiseModel,
        required_memory_mb: impl Fn(&Circuit, &NoiseModel) -> u64,
        max_parallel_experiments: u32,
        max_parallel_threads: u32,
        max_memory_mb: u64,
        num_process_per_experiment: u32,
        num_processes: u32,
    ) -> std::result::Result<(u32, bool), OutOfMemoryError> {
        if !threads_available() || local_circuits.is_empty() {
            return Ok((1, false));
        }

        let max_experiments = if max_parallel_experiments > 0 {
            max_parallel_experiments.min(max_parallel_threads)
        } else {
            max_parallel_threads
        };

        if max_experiments == 1 && num_processes == 1 {
            return Ok((1, false));
        }

        // Per-circuit memory on this process, ascending so that the
        // greedy fill below admits as many experiments as possible within
        // the budget (matches the worked example in the spec's testable
        // properties: a 90%-budget circuit plus three 40%-budget circuits
        // yields parallel_experiments=2, which only a smallest-first fill
        // produces).
        let mut per_circuit_mb: Vec<u64> = local_circuits
            .iter()
            .map(|c| required_memory_mb(c, noise) / u64::from(num_process_per_experiment).max(1))
            .collect();
        per_circuit_mb.sort_unstable();

        let budget = max_memory_mb * u64::from(num_process_per_experiment);
        let mut candidate = 0usize;
        let mut running_total = 0u64;
        for &mb in &per_circuit_mb {
            let next_total = running_total + mb;
            if next_total > budget {
                break;
            }
            running_total = next_total;
            candidate += 1;
        }

        if candidate == 0 {
            return Err(OutOfMemoryError::NoExperimentFits { max_memory_mb });
        }

        let parallel_experiments = (candidate as u32)
            .min(max_experiments)
            .min(max_parallel_threads)
            .min(local_circuits.len() as u32)
            .max(1);

        let nested = parallel_experiments > 1 && parallel_experiments < max_parallel_threads;

        Ok((parallel_experiments, nested))
    }
}

/// Chooses how many shots of a single circuit run at once, and how many
/// threads each shot's state update may use.
pub struct CircuitLevelPlanner;

impl CircuitLevelPlanner {
    /// `shots_local` is `floor(S*(r+1)/D) - floor(S*r/D)` for this rank's
    /// shot-rank `r` of `D` within the circuit's experiment group.
    ///
    /// Returns `(parallel_shots, parallel_state_update, shots_local)`.
    #[allow(clippy::too_many_arguments)]
    pub fn plan(
        circuit: &Circuit,
        noise: &NoiseModel,
        required_memory_mb: impl Fn(&Circuit, &NoiseModel) -> u64,
        max_parallel_shots: u32,
        max_parallel_threads: u32,
        max_memory_mb: u64,
        num_process_per_experiment: u32,
        parallel_experiments: u32,
        distributed_shots: u32,
        distributed_shots_rank: u32,
    ) -> std::result::Result<(u32, u32, u32), OutOfMemoryError> {
        let shots_local = local_shot_count(circuit.shots, distributed_shots, distributed_shots_rank);

        if !threads_available() {
            return Ok((1, 1, shots_local));
        }

        let max_shots = if max_parallel_shots > 0 {
            max_parallel_shots.min(max_parallel_threads)
        } else {
            max_parallel_threads
        };

        let parallel_shots = if max_shots <= 1 || parallel_experiments > 1 {
            1
        } else {
            let circ_mb = (required_memory_mb(circuit, noise) / u64::from(num_process_per_experiment).max(1)).max(1);
            if circ_mb > max_memory_mb {
                return Err(OutOfMemoryError::NoExperimentFits { max_memory_mb });
            }
            let by_memory = (max_memory_mb / circ_mb).max(1);
            (by_memory.min(u64::from(max_shots)).min(u64::from(shots_local.max(1)))) as u32
        }
        .max(1);

        let parallel_state_update = if parallel_shots > 1 {
            (max_parallel_threads / parallel_shots).max(1)
        } else {
            (max_parallel_threads / parallel_experiments.max(1)).max(1)
        };

        Ok((parallel_shots, parallel_state_update, shots_local))
    }
}

/// `floor(S*(r+1)/D) - floor(S*r/D)`: the number of shots rank `r` of `D`
/// owns out of `total_shots`, with the remainder distributed to the
/// lowest-indexed shot-ranks.
#[must_use]
pub fn local_shot_count(total_shots: u32, distributed_shots: u32, distributed_shots_rank: u32) -> u32 {
    let s = u64::from(total_shots);
    let d = u64::from(distributed_shots.max(1));
    let r = u64::from(distributed_shots_rank);
    (s * (r + 1) / d - s * r / d) as u32
}

/// Splits `shots_local` into `buckets` subshot counts whose floors sum to
/// `shots_local`, with the remainder distributed one-per-bucket starting
/// from index 0.
#[must_use]
pub fn split_shots(shots_local: u32, buckets: u32) -> Vec<u32> {
    if buckets == 0 {
        return Vec::new();
    }
    let base = shots_local / buckets;
    let remainder = shots_local % buckets;
    (0..buckets)
        .map(|i| base + u32::from(i < remainder))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_split_1000_shots_4_buckets() {
        assert_eq!(split_shots(1000, 4), vec![250, 250, 250, 250]);
    }

    #[test]
    fn shot_split_1001_shots_4_buckets() {
        assert_eq!(split_shots(1001, 4), vec![251, 250, 250, 250]);
    }

    #[test]
    fn shot_split_sums_to_total() {
        for (total, buckets) in [(1000, 4), (1001, 4), (100, 3), (7, 5)] {
            let parts = split_shots(total, buckets);
            assert_eq!(parts.iter().sum::<u32>(), total);
        }
    }

    #[test]
    fn local_shot_count_sums_across_ranks_to_total() {
        let total = 100;
        let d = 3;
        let sum: u32 = (0..d).map(|r| local_shot_count(total, d, r)).sum();
        assert_eq!(sum, total);
        assert_eq!(local_shot_count(total, d, 0), 34);
        assert_eq!(local_shot_count(total, d, 1), 33);
        assert_eq!(local_shot_count(total, d, 2), 33);
    }
}
