//! Projecting the logical node graph onto an engine.
//!
//! Every operation here walks the node graph depth first and issues engine
//! calls in a fixed order. Attaching goes parent before child (a child is only
//! attached once it has somewhere to go); tearing down goes child before parent
//! (an upstream node never loses its path to the engine while still attached).
//!
//! None of these functions keep state between calls. Whether a shared node
//! still has other consumers is always asked of the engine at the moment of
//! the decision.

use alloc::vec::Vec;

use tracing::instrument;

use crate::engine::Engine;
use crate::error::ConnectionError;
use crate::node::Node;
use crate::unit::AudioUnit;

/// Attach and wire everything reachable from `root`.
///
/// `root` itself must already be attached to `engine`; otherwise nothing
/// happens. Each node's internal-connection hook runs before its external
/// inputs are wired. An input whose unit is held by another engine, or that a
/// full mixer has no bus left for, is skipped and reported; its siblings are
/// still wired. Calling this again on a wired graph changes nothing.
///
/// ```
/// use std::sync::Arc;
/// use schaltung::nodes::UnitNode;
/// use schaltung::{attach_graph, Engine, MemoryEngine, Node, NodeRef, UnitKind};
///
/// let mut engine = MemoryEngine::new(48_000);
/// let source: NodeRef = Arc::new(UnitNode::new(UnitKind::Generator));
/// let effect = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&source));
///
/// engine.attach(effect.unit());
/// let errors = attach_graph(&mut engine, &effect);
///
/// assert!(errors.is_empty());
/// assert!(engine.is_attached(source.unit()));
/// ```
#[instrument(level = "debug", skip_all, fields(root = ?root.unit().id()))]
pub fn attach_graph(engine: &mut dyn Engine, root: &dyn Node) -> Vec<ConnectionError> {
    let mut errors = Vec::new();
    make_connections(engine, root, &mut errors);
    if !errors.is_empty() {
        tracing::debug!(skipped = errors.len(), "graph attached with skipped edges");
    }
    errors
}

fn make_connections(engine: &mut dyn Engine, node: &dyn Node, errors: &mut Vec<ConnectionError>) {
    let unit = node.unit();
    if !engine.is_attached(unit) {
        return;
    }

    if let Some(internal) = node.internal_connections() {
        internal.make_internal_connections(engine);
    }

    for (bus, input) in node.connections().iter().enumerate() {
        let input_unit = input.unit();

        if let Some(found) = input_unit.engine() {
            if found != engine.id() {
                let err = ConnectionError::CrossEngine {
                    consumer: unit.id(),
                    input: input_unit.id(),
                    bus,
                    expected: engine.id(),
                    found,
                };
                tracing::error!("attempt to connect nodes from different engines: {}", err);
                errors.push(err);
                continue;
            }
        }

        let was_attached = engine.is_attached(input_unit);
        engine.attach(input_unit);

        // Mixers decide which input bus to use.
        if unit.is_mixer() {
            if engine.connect_auto_bus(unit, input_unit).is_none() {
                let err = ConnectionError::NoFreeBus { mixer: unit.id(), input: input_unit.id() };
                tracing::error!("{}", err);
                errors.push(err);
                // Nothing consumes it, don't leave it attached.
                if !was_attached {
                    engine.detach(input_unit);
                }
                continue;
            }
        } else {
            engine.connect(input_unit, unit, bus);
        }

        make_connections(engine, input.as_ref(), errors);
    }
}

/// Remove the edge `consumer ← input`, detaching `input` if nothing else uses it.
///
/// If `consumer` is the only unit `input` still feeds, `input`'s own inputs are
/// released the same way first, then `input` is detached. Otherwise only the
/// edge into `consumer` is cut and `input` stays attached for its other
/// consumers. Nothing happens unless `consumer` is attached to `engine`.
#[instrument(level = "debug", skip_all, fields(consumer = ?consumer.unit().id(), input = ?input.unit().id()))]
pub fn detach_last_user(engine: &mut dyn Engine, consumer: &dyn Node, input: &dyn Node) {
    if !engine.is_attached(consumer.unit()) {
        return;
    }

    let consumer_id = consumer.unit().id();
    let other_users = engine
        .connection_points(input.unit(), 0)
        .into_iter()
        .filter(|point| point.unit != consumer_id)
        .count();

    if other_users == 0 {
        // Depth first: detaching `input` before its inputs would strand them.
        for upstream in input.connections() {
            detach_last_user(engine, input, upstream.as_ref());
        }
        engine.detach(input.unit());
    } else {
        tracing::trace!(other_users, "input still in use, cutting edge only");
        disconnect_edge(engine, consumer.unit(), input.unit());
    }
}

fn disconnect_edge(engine: &mut dyn Engine, consumer: &AudioUnit, input: &AudioUnit) {
    for point in engine.input_connections(consumer) {
        if point.unit == input.id() {
            engine.disconnect_input_bus(consumer, point.bus);
        }
    }
}

/// Detach `root` and everything reachable from it, ignoring other consumers.
///
/// Only for subtrees that are discarded as a whole; a shared node still needed
/// elsewhere is detached too.
#[instrument(level = "debug", skip_all, fields(root = ?root.unit().id()))]
pub fn detach_subtree(engine: &mut dyn Engine, root: &dyn Node) {
    if engine.is_attached(root.unit()) {
        engine.detach(root.unit());
    }
    for input in root.connections() {
        detach_subtree(engine, input.as_ref());
    }
}

/// Cut every input edge from `root` down, leaving all units attached.
#[instrument(level = "debug", skip_all, fields(root = ?root.unit().id()))]
pub fn disconnect_routing(engine: &mut dyn Engine, root: &dyn Node) {
    if !engine.is_attached(root.unit()) {
        return;
    }
    engine.disconnect_input(root.unit());
    for input in root.connections() {
        disconnect_routing(engine, input.as_ref());
    }
}

/// Read the render time of every unit reachable from `root` once.
///
/// Engines report an invalid render time until a unit's clock has been read,
/// so this has to run after the graph is first attached and before the first
/// render pass.
#[instrument(level = "debug", skip_all, fields(root = ?root.unit().id()))]
pub fn prime_render_clock(engine: &mut dyn Engine, root: &dyn Node) {
    let _ = engine.last_render_time(root.unit());
    for input in root.connections() {
        prime_render_clock(engine, input.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::engine::{EngineEvent, MemoryEngine};
    use crate::node::NodeRef;
    use crate::nodes::UnitNode;
    use crate::unit::UnitKind;

    fn source() -> NodeRef {
        Arc::new(UnitNode::new(UnitKind::Generator))
    }

    #[test]
    fn unattached_root_is_left_alone() {
        let mut engine = MemoryEngine::new(48_000);
        let input = source();
        let root = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&input));

        assert!(attach_graph(&mut engine, &root).is_empty());
        disconnect_routing(&mut engine, &root);
        detach_last_user(&mut engine, &root, input.as_ref());

        assert!(engine.events().is_empty());
    }

    #[test]
    fn inputs_get_their_position_as_bus() {
        let mut engine = MemoryEngine::new(48_000);
        let a = source();
        let b = source();
        let root = UnitNode::new(UnitKind::Effect).with_inputs([Arc::clone(&a), Arc::clone(&b)]);

        engine.attach(root.unit());
        attach_graph(&mut engine, &root);

        let root_id = root.unit().id();
        assert_eq!(
            engine.connections(),
            vec![(a.unit().id(), root_id, 0), (b.unit().id(), root_id, 1)]
        );
    }

    #[test]
    fn attach_is_parent_first() {
        let mut engine = MemoryEngine::new(48_000);
        let leaf = source();
        let mid: NodeRef = Arc::new(UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&leaf)));
        let root = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&mid));

        engine.attach(root.unit());
        engine.clear_events();
        attach_graph(&mut engine, &root);

        assert_eq!(
            engine.events(),
            &[
                EngineEvent::Attached(mid.unit().id()),
                EngineEvent::Connected { source: mid.unit().id(), destination: root.unit().id(), bus: 0 },
                EngineEvent::Attached(leaf.unit().id()),
                EngineEvent::Connected { source: leaf.unit().id(), destination: mid.unit().id(), bus: 0 },
            ]
        );
    }

    #[test]
    fn detach_subtree_ignores_sharing() {
        let mut engine = MemoryEngine::new(48_000);
        let shared = source();
        let a = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&shared));
        let d = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&shared));
        engine.attach(a.unit());
        engine.attach(d.unit());
        attach_graph(&mut engine, &a);
        attach_graph(&mut engine, &d);

        detach_subtree(&mut engine, &a);

        assert!(!engine.is_attached(shared.unit()));
        assert_eq!(engine.attached_units(), vec![d.unit().id()]);
    }

    #[test]
    fn priming_reads_every_clock_once() {
        let mut engine = MemoryEngine::new(48_000);
        let input = source();
        let root = UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&input));
        engine.attach(root.unit());
        attach_graph(&mut engine, &root);

        prime_render_clock(&mut engine, &root);

        assert!(engine.last_render_time(root.unit()).is_some());
        assert!(engine.last_render_time(input.unit()).is_some());
    }
}
