//! Runtime units: the engine-side half of a node.
//!
//! An [`AudioUnit`] is what the engine actually attaches, wires and renders.
//! Each node owns exactly one. Everything on it is readable from the render
//! thread: bypass, parameter values, the reset generation and the MIDI queue.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use hashbrown::HashMap;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::GraphError;
use crate::param::{BoundParam, ParamAddress, ParamCell, ParamDescriptor, ParameterTree};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a runtime unit, unique for the life of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct UnitId(pub(crate) u64);

impl UnitId {
    fn next() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of an engine instance. Never zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EngineId(pub(crate) u64);

impl EngineId {
    /// Allocate a fresh id for a new engine instance.
    pub fn next() -> Self {
        Self(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What the engine treats this unit as.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnitKind {
    /// Produces audio, no inputs (oscillators, players).
    Generator,
    /// Processes its inputs at explicit bus indices.
    Effect,
    /// Sums any number of inputs, picks its own input buses.
    Mixer,
    /// Terminal unit feeding the device.
    Output,
}

/// Optional control capabilities of a unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct UnitCaps(u8);

impl UnitCaps {
    pub const NONE: Self = Self(0);
    /// Accepts a global reset of its internal filter/delay state.
    pub const RESET: Self = Self(1 << 0);
    /// Accepts scheduled MIDI events.
    pub const MIDI: Self = Self(1 << 1);

    /// Both sets of capabilities.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every capability in `other` is present.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for UnitCaps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A raw MIDI message scheduled `offset` samples into the next render cycle.
///
/// The bytes are opaque here; encoding is the caller's business.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MidiMessage {
    pub offset: u64,
    bytes: [u8; 3],
    len: u8,
}

impl MidiMessage {
    /// Longest message the queue carries (status plus two data bytes).
    pub const MAX_LEN: usize = 3;

    /// `None` for an empty message or one longer than [`MAX_LEN`](Self::MAX_LEN).
    pub fn new(data: &[u8], offset: u64) -> Option<Self> {
        if data.is_empty() || data.len() > Self::MAX_LEN {
            return None;
        }
        let mut bytes = [0u8; 3];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self { offset, bytes, len: data.len() as u8 })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Live entry of the unit's control surface.
struct SurfaceEntry {
    def: Arc<ParamDescriptor>,
    cell: Arc<ParamCell>,
}

/// The engine-side handle of a node.
///
/// Built with the `with_*` methods and then shared as `Arc<AudioUnit>` between
/// the owning node and the engine.
///
/// ```
/// use schaltung::{AudioUnit, UnitCaps, UnitKind};
///
/// let unit = AudioUnit::new(UnitKind::Effect)
///     .named("delay")
///     .with_caps(UnitCaps::RESET);
///
/// assert!(!unit.bypassed());
/// assert!(unit.engine().is_none());
/// ```
pub struct AudioUnit {
    id: UnitId,
    name: String,
    kind: UnitKind,
    caps: UnitCaps,
    /// `EngineId` of the engine holding this unit, 0 when detached.
    engine: AtomicU64,
    bypassed: AtomicBool,
    reset_generation: AtomicU64,
    surface: RwLock<HashMap<ParamAddress, SurfaceEntry>>,
    tree: RwLock<ParameterTree>,
    midi: Option<Mutex<Producer<MidiMessage>>>,
}

impl AudioUnit {
    /// Create a detached, unbypassed unit with a fresh id and no capabilities.
    pub fn new(kind: UnitKind) -> Self {
        Self {
            id: UnitId::next(),
            name: String::new(),
            kind,
            caps: UnitCaps::NONE,
            engine: AtomicU64::new(0),
            bypassed: AtomicBool::new(false),
            reset_generation: AtomicU64::new(0),
            surface: RwLock::new(HashMap::new()),
            tree: RwLock::new(ParameterTree::new()),
            midi: None,
        }
    }

    /// Set a display name, used in logs (builder pattern).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add control capabilities (builder pattern).
    pub fn with_caps(mut self, caps: UnitCaps) -> Self {
        self.caps = self.caps | caps;
        self
    }

    /// Construction default for the bypass flag (normally `false`).
    pub fn with_bypassed(self, bypassed: bool) -> Self {
        self.bypassed.store(bypassed, Ordering::Relaxed);
        self
    }

    /// Give the unit a MIDI queue of `capacity` messages.
    ///
    /// Returns the render-side end of the queue alongside the unit.
    pub fn with_midi(mut self, capacity: usize) -> (Self, Consumer<MidiMessage>) {
        let (producer, consumer) = RingBuffer::new(capacity);
        self.midi = Some(Mutex::new(producer));
        self.caps = self.caps | UnitCaps::MIDI;
        (self, consumer)
    }

    /// Process-unique identity of this unit.
    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the engine treats this unit.
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Control capabilities this unit advertises.
    pub fn caps(&self) -> UnitCaps {
        self.caps
    }

    /// Mixers pick their own input buses.
    pub fn is_mixer(&self) -> bool {
        self.kind == UnitKind::Mixer
    }

    /// Engine currently holding this unit, if any.
    pub fn engine(&self) -> Option<EngineId> {
        match self.engine.load(Ordering::Acquire) {
            0 => None,
            id => Some(EngineId(id)),
        }
    }

    /// Record which engine holds this unit. Called by [`Engine`](crate::Engine)
    /// implementations on attach and detach only.
    pub fn set_engine(&self, engine: Option<EngineId>) {
        self.engine.store(engine.map_or(0, |e| e.0), Ordering::Release);
    }

    pub fn bypassed(&self) -> bool {
        self.bypassed.load(Ordering::Acquire)
    }

    pub fn set_bypassed(&self, bypassed: bool) {
        self.bypassed.store(bypassed, Ordering::Release);
    }

    /// Issue a global reset if the unit supports it. Returns whether it did.
    pub fn reset(&self) -> bool {
        if !self.caps.contains(UnitCaps::RESET) {
            return false;
        }
        self.reset_generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Number of resets issued so far; the render side clears its state when
    /// this changes.
    pub fn reset_generation(&self) -> u64 {
        self.reset_generation.load(Ordering::Acquire)
    }

    /// Queue raw MIDI bytes for the render side.
    ///
    /// Returns `false` if the unit takes no MIDI, the message is malformed,
    /// or the queue is full.
    pub fn schedule_midi(&self, data: &[u8], offset: u64) -> bool {
        let Some(queue) = &self.midi else {
            return false;
        };
        let Some(msg) = MidiMessage::new(data, offset) else {
            tracing::warn!(unit = ?self.id, len = data.len(), "dropping malformed MIDI message");
            return false;
        };
        let mut producer = queue.lock().unwrap_or_else(PoisonError::into_inner);
        match producer.push(msg) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                tracing::warn!(unit = ?self.id, "MIDI queue full, message dropped");
                false
            }
        }
    }

    /// Create (or replace) the control-surface entry for `def` and return a
    /// handle bound to it.
    ///
    /// Replacing an address keeps its live value, clamped to the new range, so
    /// earlier handles and the new one observe the same state.
    pub fn create_parameter(&self, def: ParamDescriptor) -> BoundParam {
        let def = Arc::new(def);
        let mut surface = self.surface.write().unwrap_or_else(PoisonError::into_inner);
        let cell = match surface.get(&def.address()) {
            Some(entry) => {
                let cell = Arc::clone(&entry.cell);
                cell.store(def.clamp(cell.load()));
                cell
            }
            None => Arc::new(ParamCell::new(def.initial())),
        };
        surface.insert(
            def.address(),
            SurfaceEntry { def: Arc::clone(&def), cell: Arc::clone(&cell) },
        );
        BoundParam::new(def, self.id, cell)
    }

    /// Publish `tree` as this unit's parameter tree.
    pub fn set_parameter_tree(&self, tree: ParameterTree) {
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = tree;
    }

    pub fn parameter_tree(&self) -> ParameterTree {
        self.tree.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn parameter_value(&self, address: ParamAddress) -> Result<f32, GraphError> {
        let surface = self.surface.read().unwrap_or_else(PoisonError::into_inner);
        surface
            .get(&address)
            .map(|entry| entry.cell.load())
            .ok_or(GraphError::UnknownParameter { unit: self.id, address })
    }

    pub fn set_parameter_value(&self, address: ParamAddress, value: f32) -> Result<(), GraphError> {
        let surface = self.surface.read().unwrap_or_else(PoisonError::into_inner);
        let entry = surface
            .get(&address)
            .ok_or(GraphError::UnknownParameter { unit: self.id, address })?;
        entry.cell.store(entry.def.clamp(value));
        Ok(())
    }
}

impl core::fmt::Debug for AudioUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("engine", &self.engine())
            .field("bypassed", &self.bypassed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = AudioUnit::new(UnitKind::Generator);
        let b = AudioUnit::new(UnitKind::Generator);
        assert_ne!(a.id(), b.id());
        assert_ne!(EngineId::next(), EngineId::next());
    }

    #[test]
    fn reset_needs_capability() {
        let plain = AudioUnit::new(UnitKind::Effect);
        assert!(!plain.reset());
        assert_eq!(plain.reset_generation(), 0);

        let resettable = AudioUnit::new(UnitKind::Effect).with_caps(UnitCaps::RESET);
        assert!(resettable.reset());
        assert!(resettable.reset());
        assert_eq!(resettable.reset_generation(), 2);
    }

    #[test]
    fn midi_reaches_render_side() {
        let (unit, mut rx) = AudioUnit::new(UnitKind::Generator).with_midi(2);
        assert!(unit.caps().contains(UnitCaps::MIDI));

        assert!(unit.schedule_midi(&[0x90, 60, 100], 0));
        assert!(unit.schedule_midi(&[0x80, 60, 0], 32));
        assert!(!unit.schedule_midi(&[0x90, 62, 100], 0), "queue holds two");
        assert!(!unit.schedule_midi(&[], 0));

        let first = rx.pop().unwrap();
        assert_eq!(first.bytes(), &[0x90, 60, 100]);
        assert_eq!(first.offset, 0);
        assert_eq!(rx.pop().unwrap().offset, 32);
        assert!(rx.pop().is_err());
    }

    #[test]
    fn midi_without_queue_is_ignored() {
        let unit = AudioUnit::new(UnitKind::Effect);
        assert!(!unit.schedule_midi(&[0x90, 60, 100], 0));
    }

    #[test]
    fn recreating_parameter_keeps_live_value() {
        let unit = AudioUnit::new(UnitKind::Effect);
        let def = ParamDescriptor::new("gain", "Gain", ParamAddress(7), 0.0..=2.0);

        let first = unit.create_parameter(def.clone());
        first.set_value(1.5);
        let second = unit.create_parameter(def);

        assert!(first.shares_value_with(&second));
        assert_eq!(second.value(), 1.5);
        assert_eq!(unit.parameter_value(ParamAddress(7)), Ok(1.5));
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let unit = AudioUnit::new(UnitKind::Effect);
        assert_eq!(
            unit.set_parameter_value(ParamAddress(1), 0.0),
            Err(GraphError::UnknownParameter { unit: unit.id(), address: ParamAddress(1) })
        );
    }
}
