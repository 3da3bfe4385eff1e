//! Mixer node - sums any number of inputs, inputs can change while live

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::{PoisonError, RwLock};

use crate::binder::bind_parameters;
use crate::engine::Engine;
use crate::error::{ConnectionError, GraphError};
use crate::node::{reaches, Node, NodeRef};
use crate::param::{ParamAddress, ParamDescriptor, ParamUnit};
use crate::unit::{AudioUnit, UnitKind};
use crate::wiring::{attach_graph, detach_last_user};

pub const VOLUME: ParamAddress = ParamAddress(0);
pub const PAN: ParamAddress = ParamAddress(1);

/// A mixer whose inputs can be added and removed at any time.
///
/// The mixer's unit picks its own input buses, so the order of inputs carries
/// no bus meaning here. Removing an input only tears it down if the mixer was
/// its last consumer.
pub struct Mixer {
    unit: Arc<AudioUnit>,
    inputs: RwLock<Vec<NodeRef>>,
    params: [ParamDescriptor; 2],
}

impl Mixer {
    /// Create an empty mixer at full volume, centered.
    pub fn new() -> Self {
        Self::named("mixer")
    }

    /// Like [`new`](Self::new) with a display name for the unit.
    pub fn named(name: impl Into<String>) -> Self {
        let mixer = Self {
            unit: Arc::new(AudioUnit::new(UnitKind::Mixer).named(name)),
            inputs: RwLock::new(Vec::new()),
            params: [
                ParamDescriptor::new("volume", "Volume", VOLUME, 0.0..=1.0)
                    .with_unit(ParamUnit::LinearGain)
                    .with_initial(1.0),
                ParamDescriptor::new("pan", "Pan", PAN, -1.0..=1.0).with_initial(0.0),
            ],
        };
        bind_parameters(&mixer);
        mixer
    }

    /// Start with `inputs` (builder pattern).
    pub fn with_inputs(self, inputs: impl IntoIterator<Item = NodeRef>) -> Self {
        self.write_inputs().extend(inputs);
        self
    }

    /// Whether `node` is one of this mixer's inputs.
    pub fn has_input(&self, node: &dyn Node) -> bool {
        let id = node.unit().id();
        self.read_inputs().iter().any(|n| n.unit().id() == id)
    }

    pub fn input_count(&self) -> usize {
        self.read_inputs().len()
    }

    /// Add `input` and, if the mixer is attached to `engine`, wire it in.
    ///
    /// Rejects an input that is already present or that the mixer itself
    /// feeds. Edges that could not be wired are returned, as from
    /// [`attach_graph`].
    pub fn add_input(
        &self,
        engine: &mut dyn Engine,
        input: NodeRef,
    ) -> Result<Vec<ConnectionError>, GraphError> {
        let consumer = self.unit.id();
        if reaches(input.as_ref(), consumer) {
            return Err(GraphError::Cycle { consumer, input: input.unit().id() });
        }
        {
            // Duplicate check and push share one guard.
            let mut inputs = self.write_inputs();
            let id = input.unit().id();
            if inputs.iter().any(|n| n.unit().id() == id) {
                return Err(GraphError::DuplicateInput { consumer, input: id });
            }
            inputs.push(input);
        }
        Ok(attach_graph(engine, self))
    }

    /// Remove `input`, detaching it (and whatever only it used) if this mixer
    /// was its last consumer. Returns whether it was an input.
    pub fn remove_input(&self, engine: &mut dyn Engine, input: &dyn Node) -> bool {
        let id = input.unit().id();
        let removed = {
            let mut inputs = self.write_inputs();
            let before = inputs.len();
            inputs.retain(|n| n.unit().id() != id);
            inputs.len() != before
        };

        if removed {
            detach_last_user(engine, self, input);
        }
        removed
    }

    fn read_inputs(&self) -> std::sync::RwLockReadGuard<'_, Vec<NodeRef>> {
        self.inputs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_inputs(&self) -> std::sync::RwLockWriteGuard<'_, Vec<NodeRef>> {
        self.inputs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Mixer {
    fn connections(&self) -> Vec<NodeRef> {
        self.read_inputs().clone()
    }

    fn unit(&self) -> &Arc<AudioUnit> {
        &self.unit
    }

    fn parameter_descriptors(&self) -> &[ParamDescriptor] {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::nodes::UnitNode;

    fn source() -> NodeRef {
        Arc::new(UnitNode::new(UnitKind::Generator))
    }

    #[test]
    fn parameters_are_bound_on_construction() {
        let mixer = Mixer::new();
        assert_eq!(mixer.unit().parameter_value(VOLUME), Ok(1.0));
        assert_eq!(mixer.unit().parameter_value(PAN), Ok(0.0));
        assert_eq!(mixer.parameters().len(), 2);
    }

    #[test]
    fn add_input_wires_on_next_free_bus() {
        let mut engine = MemoryEngine::new(48_000);
        let mixer = Mixer::new();
        engine.attach(mixer.unit());
        let a = source();
        let b = source();

        assert_eq!(mixer.add_input(&mut engine, Arc::clone(&a)), Ok(vec![]));
        assert_eq!(mixer.add_input(&mut engine, Arc::clone(&b)), Ok(vec![]));

        let m = mixer.unit().id();
        assert_eq!(engine.connections(), {
            let mut expected = vec![(a.unit().id(), m, 0), (b.unit().id(), m, 1)];
            expected.sort();
            expected
        });
    }

    #[test]
    fn add_input_rejects_duplicates_and_cycles() {
        let mut engine = MemoryEngine::new(48_000);
        let mixer = Arc::new(Mixer::new());
        let a = source();
        mixer.add_input(&mut engine, Arc::clone(&a)).unwrap();

        assert_eq!(
            mixer.add_input(&mut engine, Arc::clone(&a)),
            Err(GraphError::DuplicateInput { consumer: mixer.unit().id(), input: a.unit().id() })
        );

        let downstream: NodeRef = Arc::new(UnitNode::new(UnitKind::Effect).with_input(mixer.clone()));
        assert_eq!(
            mixer.add_input(&mut engine, Arc::clone(&downstream)),
            Err(GraphError::Cycle { consumer: mixer.unit().id(), input: downstream.unit().id() })
        );
        assert!(matches!(mixer.add_input(&mut engine, mixer.clone()), Err(GraphError::Cycle { .. })));
        assert_eq!(mixer.input_count(), 1);
    }

    #[test]
    fn concurrent_adds_of_one_input_keep_a_single_entry() {
        let mixer = Arc::new(Mixer::new());
        let a = source();

        let results = std::thread::scope(|scope| {
            let handles = (0..8)
                .map(|_| {
                    let mixer = Arc::clone(&mixer);
                    let a = Arc::clone(&a);
                    scope.spawn(move || {
                        let mut engine = MemoryEngine::new(48_000);
                        mixer.add_input(&mut engine, a).is_ok()
                    })
                })
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(mixer.input_count(), 1);
    }

    #[test]
    fn unattached_mixer_only_records_input() {
        let mut engine = MemoryEngine::new(48_000);
        let mixer = Mixer::new();
        let a = source();

        mixer.add_input(&mut engine, Arc::clone(&a)).unwrap();

        assert!(mixer.has_input(a.as_ref()));
        assert!(engine.attached_units().is_empty());
    }

    #[test]
    fn remove_input_detaches_exclusive_input() {
        let mut engine = MemoryEngine::new(48_000);
        let mixer = Mixer::new();
        engine.attach(mixer.unit());
        let a = source();
        mixer.add_input(&mut engine, Arc::clone(&a)).unwrap();

        assert!(mixer.remove_input(&mut engine, a.as_ref()));
        assert!(!mixer.remove_input(&mut engine, a.as_ref()));

        assert!(!engine.is_attached(a.unit()));
        assert_eq!(engine.attached_units(), vec![mixer.unit().id()]);
    }
}
