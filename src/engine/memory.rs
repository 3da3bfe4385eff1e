//! In-process engine that keeps the runtime graph in memory.
//!
//! Used as the reference [`Engine`] for tests and headless hosts. It keeps the
//! attachment table in a `hashbrown` map and the wiring in a petgraph
//! `StableGraph` (edges point from source to destination, weighted by the
//! destination's input bus). It also reproduces the render-clock quirk of
//! hardware engines: the first render-time read of a unit is invalid.

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use super::{ConnectionPoint, Engine, RenderTime};
use crate::unit::{AudioUnit, EngineId, UnitId};

/// A mutation performed by [`MemoryEngine`], in the order it happened.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EngineEvent {
    Attached(UnitId),
    Detached(UnitId),
    Connected { source: UnitId, destination: UnitId, bus: usize },
    Disconnected { source: UnitId, destination: UnitId, bus: usize },
}

struct Slot {
    unit: Arc<AudioUnit>,
    index: NodeIndex,
}

/// An [`Engine`] whose runtime state lives entirely in memory.
///
/// ```
/// use std::sync::Arc;
/// use schaltung::{AudioUnit, Engine, MemoryEngine, UnitKind};
///
/// let mut engine = MemoryEngine::new(48_000);
/// let unit = Arc::new(AudioUnit::new(UnitKind::Generator));
///
/// engine.attach(&unit);
/// assert!(engine.is_attached(&unit));
/// assert_eq!(engine.attached_units(), vec![unit.id()]);
/// ```
pub struct MemoryEngine {
    id: EngineId,
    sample_rate: u32,
    mixer_buses: usize,

    units: HashMap<UnitId, Slot>,
    wiring: StableGraph<UnitId, usize>,

    /// Units whose render clock has been read at least once.
    primed: HashSet<UnitId>,
    sample_time: u64,

    events: Vec<EngineEvent>,
}

impl MemoryEngine {
    /// Create an engine rendering at `sample_rate`. Mixers get 64 input buses.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            id: EngineId::next(),
            sample_rate,
            mixer_buses: 64,
            units: HashMap::new(),
            wiring: StableGraph::new(),
            primed: HashSet::new(),
            sample_time: 0,
            events: Vec::new(),
        }
    }

    /// Set how many input buses a mixer unit offers (builder pattern).
    pub fn with_mixer_buses(mut self, buses: usize) -> Self {
        self.mixer_buses = buses;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Advance the render clock by `frames` samples.
    pub fn render(&mut self, frames: u64) {
        self.sample_time += frames;
    }

    /// Ids of all attached units, in ascending order.
    pub fn attached_units(&self) -> Vec<UnitId> {
        self.units.keys().copied().sorted().collect()
    }

    /// Every live connection as `(source, destination, bus)`, sorted.
    pub fn connections(&self) -> Vec<(UnitId, UnitId, usize)> {
        self.wiring
            .edge_references()
            .map(|e| (self.wiring[e.source()], self.wiring[e.target()], *e.weight()))
            .sorted()
            .collect()
    }

    /// Mutations performed so far, oldest first.
    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    fn index_of(&self, unit: &AudioUnit) -> Option<NodeIndex> {
        self.units.get(&unit.id()).map(|slot| slot.index)
    }

    fn remove_edges_into(&mut self, destination: NodeIndex, bus: Option<usize>) {
        let doomed = self
            .wiring
            .edges_directed(destination, Direction::Incoming)
            .filter(|e| bus.map_or(true, |b| *e.weight() == b))
            .map(|e| (e.id(), self.wiring[e.source()], *e.weight()))
            .collect::<Vec<_>>();

        let dest_id = self.wiring[destination];
        for (edge, source, bus) in doomed {
            self.wiring.remove_edge(edge);
            tracing::trace!(?source, destination = ?dest_id, bus, "disconnected");
            self.events.push(EngineEvent::Disconnected { source, destination: dest_id, bus });
        }
    }
}

impl Engine for MemoryEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn attach(&mut self, unit: &Arc<AudioUnit>) {
        match unit.engine() {
            Some(id) if id == self.id => return,
            Some(other) => {
                tracing::warn!(unit = ?unit.id(), engine = ?other, "unit belongs to another engine, not attaching");
                return;
            }
            None => {}
        }

        let index = self.wiring.add_node(unit.id());
        self.units.insert(unit.id(), Slot { unit: Arc::clone(unit), index });
        unit.set_engine(Some(self.id));

        tracing::trace!(unit = ?unit.id(), name = unit.name(), "attached");
        self.events.push(EngineEvent::Attached(unit.id()));
    }

    fn detach(&mut self, unit: &AudioUnit) {
        let Some(slot) = self.units.remove(&unit.id()) else {
            return;
        };

        // Outgoing edges vanish with the node; record them first.
        let outgoing = self
            .wiring
            .edges_directed(slot.index, Direction::Outgoing)
            .map(|e| (self.wiring[e.target()], *e.weight()))
            .collect::<Vec<_>>();
        self.remove_edges_into(slot.index, None);
        for (destination, bus) in outgoing {
            self.events.push(EngineEvent::Disconnected { source: unit.id(), destination, bus });
        }

        self.wiring.remove_node(slot.index);
        self.primed.remove(&unit.id());
        slot.unit.set_engine(None);

        tracing::trace!(unit = ?unit.id(), name = unit.name(), "detached");
        self.events.push(EngineEvent::Detached(unit.id()));
    }

    fn connect(&mut self, source: &AudioUnit, destination: &AudioUnit, bus: usize) {
        let (Some(from), Some(to)) = (self.index_of(source), self.index_of(destination)) else {
            tracing::debug!(source = ?source.id(), destination = ?destination.id(), "connect on unattached unit ignored");
            return;
        };

        let existing = self
            .wiring
            .edges_directed(to, Direction::Incoming)
            .find(|e| *e.weight() == bus)
            .map(|e| e.source());
        if existing == Some(from) {
            return;
        }

        self.remove_edges_into(to, Some(bus));
        self.wiring.add_edge(from, to, bus);

        tracing::trace!(source = ?source.id(), destination = ?destination.id(), bus, "connected");
        self.events.push(EngineEvent::Connected { source: source.id(), destination: destination.id(), bus });
    }

    fn connect_auto_bus(&mut self, mixer: &AudioUnit, source: &AudioUnit) -> Option<usize> {
        let (Some(from), Some(to)) = (self.index_of(source), self.index_of(mixer)) else {
            tracing::debug!(source = ?source.id(), mixer = ?mixer.id(), "connect on unattached unit ignored");
            return None;
        };

        let occupied = self
            .wiring
            .edges_directed(to, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
            .collect::<Vec<_>>();
        if let Some((_, bus)) = occupied.iter().find(|(s, _)| *s == from) {
            return Some(*bus);
        }

        let free = (0..self.mixer_buses).find(|bus| occupied.iter().all(|(_, b)| b != bus));
        match free {
            Some(bus) => self.connect(source, mixer, bus),
            None => tracing::warn!(mixer = ?mixer.id(), buses = self.mixer_buses, "mixer has no free input bus"),
        }
        free
    }

    fn disconnect_input(&mut self, unit: &AudioUnit) {
        if let Some(index) = self.index_of(unit) {
            self.remove_edges_into(index, None);
        }
    }

    fn disconnect_input_bus(&mut self, unit: &AudioUnit, bus: usize) {
        if let Some(index) = self.index_of(unit) {
            self.remove_edges_into(index, Some(bus));
        }
    }

    fn input_connections(&self, unit: &AudioUnit) -> Vec<ConnectionPoint> {
        let Some(index) = self.index_of(unit) else {
            return Vec::new();
        };
        self.wiring
            .edges_directed(index, Direction::Incoming)
            .map(|e| ConnectionPoint { unit: self.wiring[e.source()], bus: *e.weight() })
            .sorted_by_key(|p| p.bus)
            .collect()
    }

    fn connection_points(&self, unit: &AudioUnit, output_bus: usize) -> Vec<ConnectionPoint> {
        // Every unit here has a single output bus.
        let Some(index) = self.index_of(unit).filter(|_| output_bus == 0) else {
            return Vec::new();
        };
        self.wiring
            .edges_directed(index, Direction::Outgoing)
            .map(|e| ConnectionPoint { unit: self.wiring[e.target()], bus: *e.weight() })
            .collect()
    }

    fn last_render_time(&mut self, unit: &AudioUnit) -> Option<RenderTime> {
        if !self.units.contains_key(&unit.id()) {
            return None;
        }
        if self.primed.insert(unit.id()) {
            return None;
        }
        Some(RenderTime { sample_time: self.sample_time, sample_rate: self.sample_rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitKind;

    fn unit(kind: UnitKind) -> Arc<AudioUnit> {
        Arc::new(AudioUnit::new(kind))
    }

    #[test]
    fn attach_and_detach_are_idempotent() {
        let mut engine = MemoryEngine::new(48_000);
        let u = unit(UnitKind::Generator);

        engine.attach(&u);
        engine.attach(&u);
        assert_eq!(engine.events(), &[EngineEvent::Attached(u.id())]);
        assert_eq!(u.engine(), Some(engine.id()));

        engine.detach(&u);
        engine.detach(&u);
        assert!(engine.attached_units().is_empty());
        assert_eq!(u.engine(), None);
        assert_eq!(engine.events().len(), 2);
    }

    #[test]
    fn unit_of_other_engine_is_not_stolen() {
        let mut a = MemoryEngine::new(48_000);
        let mut b = MemoryEngine::new(48_000);
        let u = unit(UnitKind::Generator);

        a.attach(&u);
        b.attach(&u);

        assert_eq!(u.engine(), Some(a.id()));
        assert!(b.attached_units().is_empty());
    }

    #[test]
    fn connect_replaces_bus_and_allows_fan_out() {
        let mut engine = MemoryEngine::new(48_000);
        let src1 = unit(UnitKind::Generator);
        let src2 = unit(UnitKind::Generator);
        let fx = unit(UnitKind::Effect);
        let fx2 = unit(UnitKind::Effect);
        for u in [&src1, &src2, &fx, &fx2] {
            engine.attach(u);
        }

        engine.connect(&src1, &fx, 0);
        engine.connect(&src1, &fx2, 0);
        engine.connect(&src1, &fx, 0);
        assert_eq!(engine.connection_points(&src1, 0).len(), 2);

        engine.connect(&src2, &fx, 0);
        assert_eq!(engine.input_connections(&fx), vec![ConnectionPoint { unit: src2.id(), bus: 0 }]);
        assert_eq!(engine.connection_points(&src1, 0), vec![ConnectionPoint { unit: fx2.id(), bus: 0 }]);
        assert!(engine.connection_points(&src1, 1).is_empty());
    }

    #[test]
    fn auto_bus_picks_lowest_free_bus() {
        let mut engine = MemoryEngine::new(48_000).with_mixer_buses(2);
        let mixer = unit(UnitKind::Mixer);
        let a = unit(UnitKind::Generator);
        let b = unit(UnitKind::Generator);
        let c = unit(UnitKind::Generator);
        for u in [&mixer, &a, &b, &c] {
            engine.attach(u);
        }

        assert_eq!(engine.connect_auto_bus(&mixer, &a), Some(0));
        assert_eq!(engine.connect_auto_bus(&mixer, &b), Some(1));
        assert_eq!(engine.connect_auto_bus(&mixer, &a), Some(0));
        assert_eq!(engine.connect_auto_bus(&mixer, &c), None);

        assert_eq!(
            engine.input_connections(&mixer),
            vec![ConnectionPoint { unit: a.id(), bus: 0 }, ConnectionPoint { unit: b.id(), bus: 1 }]
        );

        engine.disconnect_input_bus(&mixer, 0);
        assert_eq!(engine.connect_auto_bus(&mixer, &c), Some(0));
        assert_eq!(
            engine.input_connections(&mixer),
            vec![ConnectionPoint { unit: c.id(), bus: 0 }, ConnectionPoint { unit: b.id(), bus: 1 }]
        );
    }

    #[test]
    fn detach_drops_edges_both_ways() {
        let mut engine = MemoryEngine::new(48_000);
        let src = unit(UnitKind::Generator);
        let fx = unit(UnitKind::Effect);
        let out = unit(UnitKind::Output);
        for u in [&src, &fx, &out] {
            engine.attach(u);
        }
        engine.connect(&src, &fx, 0);
        engine.connect(&fx, &out, 0);

        engine.detach(&fx);

        assert!(engine.connections().is_empty());
        assert!(engine.connection_points(&src, 0).is_empty());
        assert_eq!(engine.attached_units().len(), 2);
    }

    #[test]
    fn first_render_time_read_is_invalid() {
        let mut engine = MemoryEngine::new(44_100);
        let u = unit(UnitKind::Generator);
        assert_eq!(engine.last_render_time(&u), None, "not attached");

        engine.attach(&u);
        assert_eq!(engine.last_render_time(&u), None);
        engine.render(512);
        assert_eq!(
            engine.last_render_time(&u),
            Some(RenderTime { sample_time: 512, sample_rate: 44_100 })
        );
    }
}
