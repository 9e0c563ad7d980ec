// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// An optional distributed fabric: a rank-and-size collective with a
/// MIN-reduction over 64-bit unsigned integers. Absence is indistinguishable
/// from a 1-rank fabric, which `SingleRankFabric` models.
pub trait Fabric: Send + Sync {
    fn rank(&self) -> u32;
    fn size(&self) -> u32;
    fn all_reduce_min_u64(&self, value: u64) -> u64;
}

/// The default fabric when no distributed transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleRankFabric;

impl Fabric for SingleRankFabric {
    fn rank(&self) -> u32 {
        0
    }

    fn size(&self) -> u32 {
        1
    }

    fn all_reduce_min_u64(&self, value: u64) -> u64 {
        value
    }
}

/// A distributed fabric backed by MPI. Grounded on
/// `AlvinKuruvilla-memwatch`'s `examples/mpi_distributed_compute.rs`, which
/// drives the same `mpi` crate for rank/size/collective queries.
#[cfg(feature = "mpi-fabric")]
pub struct MpiFabric {
    world: mpi::topology::SimpleCommunicator,
}

#[cfg(feature = "mpi-fabric")]
impl MpiFabric {
    /// Initializes the MPI universe for this process. Must be called at
    /// most once per process.
    #[must_use]
    pub fn initialize() -> Self {
        let universe = mpi::initialize().expect("MPI should initialize exactly once per process");
        let world = universe.world();
        // Leak the universe: it must outlive every communicator derived
        // from it, and the controller treats the fabric as process-wide.
        std::mem::forget(universe);
        Self { world }
    }
}

#[cfg(feature = "mpi-fabric")]
impl Fabric for MpiFabric {
    fn rank(&self) -> u32 {
        self.world.rank() as u32
    }

    fn size(&self) -> u32 {
        self.world.size() as u32
    }

    fn all_reduce_min_u64(&self, value: u64) -> u64 {
        use mpi::collective::SystemOperation;
        use mpi::traits::*;
        let mut result = value;
        self.world
            .all_reduce_into(&value, &mut result, SystemOperation::min());
        result
    }
}
