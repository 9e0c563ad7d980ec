// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::model::{Circuit, DistributionState, NoiseModel};

/// Splits experiments and shots across processes, and computes the
/// process-per-experiment factor that lets a single experiment span more
/// than one process when it doesn't fit in one process's memory budget.
pub struct DistributionPlanner;

impl DistributionPlanner {
    /// Computes the `DistributionState` for this rank.
    ///
    /// `required_memory_mb` is the back-end's per-circuit memory estimator.
    /// `max_memory_mb` must already be resolved (never 0 — a 0 in the
    /// job's `config` means "choose automatically" and is resolved by the
    /// caller before this call).
    pub fn plan(
        circuits: &[Circuit],
        noise: &NoiseModel,
        required_memory_mb: impl Fn(&Circuit, &NoiseModel) -> u64,
        my_rank: u32,
        num_processes: u32,
        max_memory_mb: u64,
    ) -> DistributionState {
        // Step 1: process-per-experiment factor.
        let mut num_process_per_experiment: u32 = 1;
        for circuit in circuits {
            let m = required_memory_mb(circuit, noise);
            if m > max_memory_mb && max_memory_mb > 0 {
                let factor = m.div_ceil(max_memory_mb);
                num_process_per_experiment = num_process_per_experiment.max(factor as u32);
            }
        }

        // Step 2-3.
        let mut distributed_experiments = num_processes / num_process_per_experiment;
        let group_id = my_rank / num_process_per_experiment;
        let rank_in_group = my_rank % num_process_per_experiment;

        let num_circuits = circuits.len() as u32;

        let (experiments_begin, experiments_end, distributed_shots, distributed_shots_rank);

        if num_circuits > 0 && num_circuits < distributed_experiments {
            // Case A: fewer circuits than groups — surplus groups become
            // shot-parallelism for the one experiment they're assigned to.
            let begin = (group_id % num_circuits) as usize;
            experiments_begin = begin;
            experiments_end = begin + 1;

            let base = distributed_experiments / num_circuits;
            let remainder = distributed_experiments % num_circuits;
            distributed_shots = base + u32::from((begin as u32) < remainder);
            distributed_shots_rank = group_id / num_circuits;

            // Open question (a): the clamp happens only after the shot-rank
            // and distributed_shots quantities above are computed from the
            // pre-clamp `distributed_experiments`. Consumers of the
            // metadata see the clamped value; the shot math above does not.
            distributed_experiments = num_circuits;
        } else {
            // Case B: experiments are partitioned whole across groups (or
            // there are no circuits at all, which degenerates to an empty
            // range).
            if distributed_experiments == 0 {
                experiments_begin = 0;
                experiments_end = 0;
            } else {
                experiments_begin =
                    (u64::from(num_circuits) * u64::from(group_id) / u64::from(distributed_experiments)) as usize;
                experiments_end = (u64::from(num_circuits) * u64::from(group_id + 1)
                    / u64::from(distributed_experiments)) as usize;
            }
            distributed_shots = 1;
            distributed_shots_rank = 0;
        }

        DistributionState {
            num_processes,
            my_rank,
            num_process_per_experiment,
            distributed_experiments,
            group_id,
            rank_in_group,
            experiments_begin,
            experiments_end,
            distributed_shots,
            distributed_shots_rank,
        }
    }
}
