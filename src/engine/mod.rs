//! The engine adapter contract.
//!
//! The engine owns the ground truth of what is attached and what feeds what.
//! The graph operations in [`wiring`](crate::wiring) only ever read that
//! state back through [`Engine::connection_points`]; they never keep a copy.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::unit::{AudioUnit, EngineId, UnitId};

pub mod memory;

pub use memory::{EngineEvent, MemoryEngine};

/// One end of a connection as recorded by the engine: a unit and one of its
/// input buses.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConnectionPoint {
    pub unit: UnitId,
    pub bus: usize,
}

/// A unit's render timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RenderTime {
    pub sample_time: u64,
    pub sample_rate: u32,
}

/// A real-time audio engine as seen from the control thread.
///
/// Implementations must make every mutation idempotent: attaching an attached
/// unit, detaching a detached one or disconnecting a missing edge does nothing.
/// Attach and detach must keep [`AudioUnit::engine`] in sync via
/// [`AudioUnit::set_engine`].
pub trait Engine {
    fn id(&self) -> EngineId;

    fn attach(&mut self, unit: &Arc<AudioUnit>);

    /// Detach `unit`, dropping every connection into or out of it.
    fn detach(&mut self, unit: &AudioUnit);

    fn is_attached(&self, unit: &AudioUnit) -> bool {
        unit.engine() == Some(self.id())
    }

    /// Feed `source`'s output into `destination` at input `bus`.
    ///
    /// `source` keeps any other destinations it already feeds; whatever fed
    /// `destination` at `bus` before is replaced.
    fn connect(&mut self, source: &AudioUnit, destination: &AudioUnit, bus: usize);

    /// Feed `source` into `mixer` on the mixer's next free input bus.
    ///
    /// Returns the bus `source` now feeds, which is its existing one if it was
    /// already wired into `mixer`. `None` if either unit is not attached or
    /// every input bus is taken.
    fn connect_auto_bus(&mut self, mixer: &AudioUnit, source: &AudioUnit) -> Option<usize>;

    /// Remove all input wiring into `unit` without detaching it.
    fn disconnect_input(&mut self, unit: &AudioUnit);

    /// Remove whatever feeds `unit` at input `bus`.
    fn disconnect_input_bus(&mut self, unit: &AudioUnit, bus: usize);

    /// Units currently feeding `unit`, one point per occupied input bus.
    fn input_connections(&self, unit: &AudioUnit) -> Vec<ConnectionPoint>;

    /// Destinations currently fed by `unit`'s `output_bus`.
    fn connection_points(&self, unit: &AudioUnit, output_bus: usize) -> Vec<ConnectionPoint>;

    /// Last render time of `unit`.
    ///
    /// Engines may report `None` on the very first read of a freshly attached
    /// unit; that read is what makes later ones valid. See
    /// [`prime_render_clock`](crate::prime_render_clock).
    fn last_render_time(&mut self, unit: &AudioUnit) -> Option<RenderTime>;
}
