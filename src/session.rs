//! High-level output routing on top of an engine.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::engine::Engine;
use crate::error::{ConnectionError, GraphError};
use crate::node::{reaches, Node, NodeRef};
use crate::nodes::Mixer;
use crate::unit::{AudioUnit, UnitKind};
use crate::wiring::{attach_graph, detach_subtree, prime_render_clock};

/// An engine plus the node currently playing through it.
///
/// `Session` owns the engine's terminal output unit and, optionally, a main
/// mixer in front of it. Setting an output node tears down the previous one,
/// attaches and wires the new graph, and, once the session is started, primes
/// its render clocks.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use schaltung::nodes::UnitNode;
/// use schaltung::{Engine, MemoryEngine, Node, NodeRef, Session, UnitKind};
///
/// let mut session = Session::new(MemoryEngine::new(48_000));
///
/// let osc: NodeRef = Arc::new(UnitNode::new(UnitKind::Generator));
/// let fx: NodeRef = Arc::new(UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&osc)));
///
/// let errors = session.set_output(Arc::clone(&fx)).unwrap();
/// assert!(errors.is_empty());
/// session.start();
///
/// assert!(session.engine().is_attached(osc.unit()));
/// ```
pub struct Session<E: Engine> {
    engine: E,
    output_unit: Arc<AudioUnit>,
    use_main_mixer: bool,
    main_mixer: Option<Arc<Mixer>>,
    output: Option<NodeRef>,
    started: bool,
}

impl<E: Engine> Session<E> {
    /// Take over `engine` and attach its output unit.
    pub fn new(mut engine: E) -> Self {
        let output_unit = Arc::new(AudioUnit::new(UnitKind::Output).named("output"));
        engine.attach(&output_unit);

        Self {
            engine,
            output_unit,
            use_main_mixer: false,
            main_mixer: None,
            output: None,
            started: false,
        }
    }

    /// Route the output node through a main mixer (builder pattern).
    pub fn with_main_mixer(mut self, enabled: bool) -> Self {
        self.use_main_mixer = enabled;
        self
    }

    /// The engine the session drives.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct access to the engine. Mutating wiring behind the session's back
    /// is allowed; teardown always asks the engine what is connected.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Terminal unit everything ends up in.
    pub fn output_unit(&self) -> &Arc<AudioUnit> {
        &self.output_unit
    }

    /// Node currently set as output.
    pub fn output(&self) -> Option<&NodeRef> {
        self.output.as_ref()
    }

    pub fn main_mixer(&self) -> Option<&Arc<Mixer>> {
        self.main_mixer.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Make `node` the session's output, replacing the current one.
    ///
    /// Returns the edges that could not be wired. A node held by a different
    /// engine is not connected at all and is reported as a single error. A
    /// rejected node, whether refused with an error or reported as held
    /// elsewhere, leaves the current output in place.
    pub fn set_output(&mut self, node: NodeRef) -> Result<Vec<ConnectionError>, GraphError> {
        let consumer = if self.use_main_mixer {
            let mixer = self.main_mixer_or_create();
            self.check_mixer_input(&mixer, node.as_ref())?;
            Arc::clone(mixer.unit())
        } else {
            Arc::clone(&self.output_unit)
        };
        if let Some(found) = node.unit().engine() {
            if found != self.engine.id() {
                let err = ConnectionError::CrossEngine {
                    consumer: consumer.id(),
                    input: node.unit().id(),
                    bus: 0,
                    expected: self.engine.id(),
                    found,
                };
                tracing::error!("attempt to connect nodes from different engines: {}", err);
                return Ok(vec![err]);
            }
        }

        self.clear_output();

        let errors = match self.main_mixer.clone() {
            Some(mixer) if self.use_main_mixer => mixer.add_input(&mut self.engine, Arc::clone(&node))?,
            _ => {
                self.engine.attach(node.unit());
                self.engine.connect(node.unit(), &self.output_unit, 0);
                attach_graph(&mut self.engine, node.as_ref())
            }
        };

        if self.started {
            prime_render_clock(&mut self.engine, node.as_ref());
        }
        tracing::debug!(output = ?node.unit().id(), skipped = errors.len(), "output set");
        self.output = Some(node);
        Ok(errors)
    }

    /// Tear down the current output node, if any.
    pub fn clear_output(&mut self) {
        let Some(old) = self.output.take() else {
            return;
        };

        match &self.main_mixer {
            Some(mixer) => {
                mixer.remove_input(&mut self.engine, old.as_ref());
            }
            None => {
                self.engine.disconnect_input(&self.output_unit);
                detach_subtree(&mut self.engine, old.as_ref());
            }
        }
        tracing::debug!(output = ?old.unit().id(), "output cleared");
    }

    /// Prime render clocks for everything currently attached through the
    /// session. Call before the first render pass.
    pub fn start(&mut self) {
        let _ = self.engine.last_render_time(&self.output_unit);
        match (&self.main_mixer, &self.output) {
            (Some(mixer), _) => prime_render_clock(&mut self.engine, &**mixer),
            (None, Some(output)) => prime_render_clock(&mut self.engine, output.as_ref()),
            (None, None) => {}
        }
        self.started = true;
    }

    /// Refuse what `Mixer::add_input` would refuse, before anything is torn down.
    fn check_mixer_input(&self, mixer: &Mixer, node: &dyn Node) -> Result<(), GraphError> {
        let consumer = mixer.unit().id();
        let input = node.unit().id();
        if reaches(node, consumer) {
            return Err(GraphError::Cycle { consumer, input });
        }
        // The current output is removed first, so it may be set again.
        let is_current = self.output.as_ref().is_some_and(|o| o.unit().id() == input);
        if mixer.has_input(node) && !is_current {
            return Err(GraphError::DuplicateInput { consumer, input });
        }
        Ok(())
    }

    fn main_mixer_or_create(&mut self) -> Arc<Mixer> {
        if let Some(mixer) = &self.main_mixer {
            return Arc::clone(mixer);
        }

        let mixer = Arc::new(Mixer::named("main mixer"));
        self.engine.attach(mixer.unit());
        self.engine.connect(mixer.unit(), &self.output_unit, 0);
        if self.started {
            prime_render_clock(&mut self.engine, &*mixer);
        }
        self.main_mixer = Some(Arc::clone(&mixer));
        mixer
    }
}
