// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::backend::Backend;
use crate::error::{OpSide, ValidationError};
use crate::model::{Circuit, NoiseModel};

/// Checks that a circuit and its noise model are within a back-end's
/// supported op-set and memory budget.
pub struct Validator;

impl Validator {
    /// A circuit is valid for a back-end iff the back-end's op-set
    /// contains the circuit's op-set, and the noise model is either ideal
    /// or likewise contained.
    pub fn validate_ops(
        backend: &dyn Backend,
        circuit: &Circuit,
        noise: &NoiseModel,
    ) -> std::result::Result<(), ValidationError> {
        let backend_ops = backend.op_set();

        if !backend_ops.contains(&circuit.op_set) {
            return Err(ValidationError::UnsupportedOps {
                backend: backend.name().to_string(),
                side: OpSide::Circuit,
                missing: backend_ops.difference(&circuit.op_set),
            });
        }

        if !noise.is_ideal && !backend_ops.contains(&noise.op_set) {
            return Err(ValidationError::UnsupportedOps {
                backend: backend.name().to_string(),
                side: OpSide::Noise,
                missing: backend_ops.difference(&noise.op_set),
            });
        }

        Ok(())
    }

    /// Non-throwing variant of [`Self::validate_ops`], for callers that
    /// want a boolean rather than an error.
    #[must_use]
    pub fn try_validate_ops(backend: &dyn Backend, circuit: &Circuit, noise: &NoiseModel) -> bool {
        Self::validate_ops(backend, circuit, noise).is_ok()
    }

    /// If `max_memory_mb > 0`, requires that the circuit's per-process
    /// memory fits within the budget.
    pub fn validate_memory(
        backend: &dyn Backend,
        circuit: &Circuit,
        noise: &NoiseModel,
        num_process_per_experiment: u32,
        max_memory_mb: u64,
    ) -> std::result::Result<(), ValidationError> {
        if max_memory_mb == 0 {
            return Ok(());
        }
        let required = backend.required_memory_mb(circuit, noise) / u64::from(num_process_per_experiment.max(1));
        if required > max_memory_mb {
            return Err(ValidationError::MemoryBudgetExceeded {
                circuit: circuit
                    .header
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("<unnamed>")
                    .to_string(),
                backend: backend.name().to_string(),
                max_memory_mb,
            });
        }
        Ok(())
    }
}
