//! The node trait and its optional capabilities.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashSet;

use crate::engine::Engine;
use crate::param::{BoundParam, ParamDescriptor};
use crate::unit::{AudioUnit, UnitId};

/// Shared handle to a node. A node feeding several consumers appears in each
/// of their connection lists through clones of the same `NodeRef`.
pub type NodeRef = Arc<dyn Node>;

/// A participant in the audio graph.
///
/// A node wraps exactly one [`AudioUnit`] and lists the nodes feeding it. The
/// position of an input in [`connections`](Node::connections) is the bus it
/// is wired to, unless the node's unit is a mixer.
///
/// Connections must never lead back to the node itself. Nodes built from
/// existing `NodeRef`s cannot express a cycle; nodes with mutable inputs must
/// reject one (see [`Mixer::add_input`](crate::nodes::Mixer::add_input)).
///
/// Start/stop/bypass state is the unit's bypass flag, nothing else:
///
/// ```
/// use schaltung::nodes::UnitNode;
/// use schaltung::{Node, UnitKind};
///
/// let node = UnitNode::new(UnitKind::Effect);
/// assert!(node.is_started());
///
/// node.bypass();
/// assert!(!node.is_started());
/// assert!(node.unit().bypassed());
/// ```
pub trait Node: Send + Sync {
    /// Nodes feeding this node's inputs, in bus order.
    fn connections(&self) -> Vec<NodeRef>;

    /// The runtime unit this node wraps.
    fn unit(&self) -> &Arc<AudioUnit>;

    /// Parameters this node declares, in declaration order.
    fn parameter_descriptors(&self) -> &[ParamDescriptor] {
        &[]
    }

    /// Internal wiring hook, if this node builds sub-units of its own.
    fn internal_connections(&self) -> Option<&dyn HasInternalConnections> {
        None
    }

    /// Waveform control, if this node plays a swappable table.
    fn dynamic_waveform(&self) -> Option<&dyn DynamicWaveform> {
        None
    }

    fn bypassed(&self) -> bool {
        self.unit().bypassed()
    }

    fn set_bypassed(&self, bypassed: bool) {
        self.unit().set_bypassed(bypassed)
    }

    /// Whether the node is processing (started, playing or active).
    fn is_started(&self) -> bool {
        !self.bypassed()
    }

    /// Resume processing.
    fn start(&self) {
        self.set_bypassed(false)
    }

    /// Stop processing; the unit passes its input through.
    fn stop(&self) {
        self.set_bypassed(true)
    }

    /// Same as [`start`](Node::start).
    fn play(&self) {
        self.set_bypassed(false)
    }

    /// Same as [`stop`](Node::stop).
    fn bypass(&self) {
        self.set_bypassed(true)
    }

    /// Clear the unit's internal filter/delay state. Returns whether the unit
    /// supports it.
    fn reset(&self) -> bool {
        self.unit().reset()
    }

    /// Schedule raw MIDI bytes `offset` samples ahead. Returns whether the
    /// message was queued.
    fn schedule_midi_event(&self, data: &[u8], offset: u64) -> bool {
        self.unit().schedule_midi(data, offset)
    }

    /// Parameters currently bound on the unit.
    fn parameters(&self) -> Vec<BoundParam> {
        self.unit().parameter_tree().params().to_vec()
    }
}

/// Nodes that wire sub-nodes of their own before being wired externally.
pub trait HasInternalConnections {
    /// Attach and wire the node's sub-units. Runs once per wiring pass, before
    /// the node's external inputs are connected.
    fn make_internal_connections(&self, engine: &mut dyn Engine);
}

/// A single-cycle waveform.
#[derive(Clone, Debug, PartialEq)]
pub struct Table(Vec<f32>);

impl Table {
    /// Wrap precomputed sample values.
    pub fn from_values(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// One sine cycle over `size` samples.
    pub fn sine(size: usize) -> Self {
        Self(
            (0..size)
                .map(|i| (i as f32 / size as f32 * core::f32::consts::TAU).sin())
                .collect(),
        )
    }

    /// One rising ramp from -1 over `size` samples.
    pub fn sawtooth(size: usize) -> Self {
        Self((0..size).map(|i| 2.0 * i as f32 / size as f32 - 1.0).collect())
    }

    /// Sample values of one cycle.
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Callback fired with the new values whenever a waveform changes.
pub type WaveformHandler = Box<dyn Fn(&[f32]) + Send + Sync>;

/// Nodes whose waveform table can be swapped at runtime.
pub trait DynamicWaveform {
    /// Swap in `table` and notify the update handler.
    fn set_waveform(&self, table: Table);

    fn waveform_values(&self) -> Vec<f32>;

    /// Replace the callback fired on every waveform change.
    fn set_waveform_update_handler(&self, handler: WaveformHandler);
}

/// Whether `target` is `node` itself or feeds it, directly or transitively.
///
/// Each node is visited once, however many paths lead to it.
pub fn reaches(node: &dyn Node, target: UnitId) -> bool {
    let mut visited = HashSet::new();
    reaches_unvisited(node, target, &mut visited)
}

fn reaches_unvisited(node: &dyn Node, target: UnitId, visited: &mut HashSet<UnitId>) -> bool {
    let id = node.unit().id();
    if id == target {
        return true;
    }
    if !visited.insert(id) {
        return false;
    }
    node.connections()
        .iter()
        .any(|c| reaches_unvisited(c.as_ref(), target, visited))
}
