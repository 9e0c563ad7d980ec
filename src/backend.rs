// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::BackendError;
use crate::model::{Circuit, ConfigChannels, ExperimentData, NoiseModel, OpSet};

/// The pluggable subsystem that actually simulates shots of a circuit and
/// returns aggregated data. Modeled as a capability object rather than a
/// generic type parameter: the Controller itself stays non-polymorphic and
/// dispatches through `&dyn Backend`.
pub trait Backend: Send + Sync {
    /// The set of instruction kinds this back-end supports.
    fn op_set(&self) -> OpSet;

    /// A human-readable identifier, used in diagnostics.
    fn name(&self) -> &str;

    /// Estimated memory, in MiB, required to simulate `circuit` under
    /// `noise` on a single process.
    fn required_memory_mb(&self, circuit: &Circuit, noise: &NoiseModel) -> u64;

    /// Evolves `shots` independent trajectories of `circuit` under `noise`,
    /// seeded deterministically from `seed`, and returns the aggregated
    /// data for those shots.
    fn run(
        &self,
        circuit: &Circuit,
        noise: &NoiseModel,
        channels: &ConfigChannels,
        shots: u32,
        seed: u64,
    ) -> std::result::Result<ExperimentData, BackendError>;
}
