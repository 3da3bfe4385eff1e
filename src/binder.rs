//! Binding declared parameters to a unit's control surface.
//!
//! Nodes list their parameters explicitly through
//! [`Node::parameter_descriptors`]; binding turns each descriptor into a live
//! [`BoundParam`](crate::BoundParam) and publishes the lot as the unit's
//! parameter tree.

use tracing::instrument;

use crate::node::Node;
use crate::param::ParameterTree;
use crate::unit::AudioUnit;

/// Bind `node`'s declared parameters to its own unit.
///
/// Call once when the node is set up. Binding again is harmless: entries are
/// replaced per address and keep their live values.
///
/// ```
/// use schaltung::nodes::UnitNode;
/// use schaltung::{bind_parameters, ParamAddress, ParamDescriptor, UnitKind};
///
/// let node = UnitNode::new(UnitKind::Effect).with_parameters([
///     ParamDescriptor::new("gain", "Gain", ParamAddress(0), 0.0..=2.0).with_initial(1.0),
/// ]);
///
/// let tree = bind_parameters(&node);
/// assert_eq!(tree.len(), 1);
/// assert_eq!(tree.find("gain").map(|p| p.value()), Some(1.0));
/// ```
#[instrument(level = "debug", skip_all, fields(unit = ?node.unit().id()))]
pub fn bind_parameters(node: &dyn Node) -> ParameterTree {
    associate_parameters(node, node.unit())
}

/// Bind `node`'s declared parameters to `unit`, which need not be the node's
/// own unit (composite nodes forward parameters to an inner unit).
pub fn associate_parameters(node: &dyn Node, unit: &AudioUnit) -> ParameterTree {
    let tree = ParameterTree::with_children(
        node.parameter_descriptors()
            .iter()
            .cloned()
            .map(|def| unit.create_parameter(def)),
    );
    unit.set_parameter_tree(tree.clone());

    tracing::debug!(unit = ?unit.id(), count = tree.len(), "bound parameters");
    tree
}
