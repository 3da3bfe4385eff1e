//! Generic node: one unit, a fixed list of inputs, declared parameters.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::binder::bind_parameters;
use crate::node::{Node, NodeRef};
use crate::param::ParamDescriptor;
use crate::unit::{AudioUnit, UnitKind};

/// A node whose inputs are fixed when it is built.
///
/// Inputs can only be nodes that already exist, so a `UnitNode` can never end
/// up feeding itself.
pub struct UnitNode {
    unit: Arc<AudioUnit>,
    inputs: Vec<NodeRef>,
    params: Vec<ParamDescriptor>,
}

impl UnitNode {
    pub fn new(kind: UnitKind) -> Self {
        Self::from_unit(AudioUnit::new(kind))
    }

    /// Wrap an already configured unit.
    pub fn from_unit(unit: AudioUnit) -> Self {
        Self { unit: Arc::new(unit), inputs: Vec::new(), params: Vec::new() }
    }

    /// Append one input; it takes the next bus.
    pub fn with_input(mut self, input: NodeRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = NodeRef>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    /// Declare parameters and bind them to the unit.
    pub fn with_parameters(mut self, params: impl IntoIterator<Item = ParamDescriptor>) -> Self {
        self.params.extend(params);
        bind_parameters(&self);
        self
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(self)
    }
}

impl Node for UnitNode {
    fn connections(&self) -> Vec<NodeRef> {
        self.inputs.clone()
    }

    fn unit(&self) -> &Arc<AudioUnit> {
        &self.unit
    }

    fn parameter_descriptors(&self) -> &[ParamDescriptor] {
        &self.params
    }
}
