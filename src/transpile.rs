// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::model::{Circuit, NoiseModel, OpSet};

/// A transpiler pass, as consumed by `CircuitRunner`. The optimization
/// rules a real transpiler would apply are out of scope for the
/// Controller (see the crate's Non-goals); these two passes provide the
/// seams the Controller calls into, with the minimal real behavior their
/// names imply.
pub trait TranspilePass: Send + Sync {
    fn set_config(&mut self, validation_threshold: f64);

    fn optimize_circuit(&self, circuit: &mut Circuit, noise: &mut NoiseModel, backend_op_set: &OpSet);
}

/// Collapses runs of consecutive `barrier` markers into a single barrier,
/// always run before a back-end invocation.
#[derive(Debug, Default)]
pub struct BarrierReduction {
    #[allow(dead_code)]
    validation_threshold: f64,
}

impl TranspilePass for BarrierReduction {
    fn set_config(&mut self, validation_threshold: f64) {
        self.validation_threshold = validation_threshold;
    }

    fn optimize_circuit(&self, circuit: &mut Circuit, _noise: &mut NoiseModel, _backend_op_set: &OpSet) {
        let mut reduced = Vec::with_capacity(circuit.operations.len());
        let mut last_was_barrier = false;
        for op in circuit.operations.drain(..) {
            let is_barrier = op.name == "barrier";
            if is_barrier && last_was_barrier {
                continue;
            }
            last_was_barrier = is_barrier;
            reduced.push(op);
        }
        circuit.operations = reduced;
    }
}

/// Shrinks `circuit.num_qubits` down to one past the highest qubit index
/// actually referenced by an operation, dropping unused trailing qubits.
/// Only run when `ParallelismConfig::truncate_qubits` is set.
#[derive(Debug, Default)]
pub struct QubitTruncation {
    #[allow(dead_code)]
    validation_threshold: f64,
}

impl TranspilePass for QubitTruncation {
    fn set_config(&mut self, validation_threshold: f64) {
        self.validation_threshold = validation_threshold;
    }

    fn optimize_circuit(&self, circuit: &mut Circuit, _noise: &mut NoiseModel, _backend_op_set: &OpSet) {
        let highest = circuit
            .operations
            .iter()
            .flat_map(|op| op.qubits.iter().copied())
            .max();
        if let Some(highest) = highest {
            circuit.num_qubits = highest + 1;
        } else {
            circuit.num_qubits = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operation;

    fn op(name: &str, qubits: &[usize]) -> Operation {
        Operation {
            name: name.to_string(),
            qubits: qubits.to_vec(),
        }
    }

    #[test]
    fn barrier_reduction_collapses_consecutive_barriers() {
        let mut circuit = Circuit {
            operations: vec![
                op("h", &[0]),
                op("barrier", &[]),
                op("barrier", &[]),
                op("barrier", &[]),
                op("cx", &[0, 1]),
            ],
            num_qubits: 2,
            op_set: OpSet::default(),
            shots: 1,
            seed: 0,
            header: serde_json::Value::Null,
        };
        let mut noise = NoiseModel::default();
        BarrierReduction::default().optimize_circuit(&mut circuit, &mut noise, &OpSet::default());
        assert_eq!(circuit.operations.len(), 3);
        assert_eq!(circuit.operations[1].name, "barrier");
    }

    #[test]
    fn qubit_truncation_drops_unused_trailing_qubits() {
        let mut circuit = Circuit {
            operations: vec![op("h", &[0]), op("cx", &[0, 1])],
            num_qubits: 5,
            op_set: OpSet::default(),
            shots: 1,
            seed: 0,
            header: serde_json::Value::Null,
        };
        let mut noise = NoiseModel::default();
        QubitTruncation::default().optimize_circuit(&mut circuit, &mut noise, &OpSet::default());
        assert_eq!(circuit.num_qubits, 2);
    }
}
