//! # schaltung
//!
//! Manage a graph of audio nodes on top of a real-time audio engine.
//!
//! Nodes ([`Node`]) each wrap one runtime unit ([`AudioUnit`]) and list the
//! nodes feeding them. The functions in [`wiring`] project that logical graph
//! onto an [`Engine`]'s live attachment state:
//!
//! - [`attach_graph`] - attach and wire everything reachable, parent first
//! - [`detach_last_user`] - drop one edge, tearing down inputs nobody else uses
//! - [`detach_subtree`] - tear down a whole subtree unconditionally
//! - [`disconnect_routing`] - cut signal flow but keep everything attached
//! - [`prime_render_clock`] - make the engine's render clocks valid
//!
//! Parameters are declared per node as [`ParamDescriptor`]s and bound to the
//! unit's control surface with [`bind_parameters`].
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use schaltung::nodes::{Mixer, UnitNode};
//! use schaltung::{attach_graph, detach_last_user, Engine, MemoryEngine, Node, NodeRef, UnitKind};
//!
//! let mut engine = MemoryEngine::new(48_000);
//!
//! let osc: NodeRef = Arc::new(UnitNode::new(UnitKind::Generator));
//! let filter: NodeRef = Arc::new(UnitNode::new(UnitKind::Effect).with_input(Arc::clone(&osc)));
//! let mixer = Mixer::new().with_inputs([Arc::clone(&filter)]);
//!
//! engine.attach(mixer.unit());
//! assert!(attach_graph(&mut engine, &mixer).is_empty());
//! assert!(engine.is_attached(osc.unit()));
//!
//! // The mixer was the filter's only consumer: filter and osc both go.
//! detach_last_user(&mut engine, &mixer, filter.as_ref());
//! assert!(!engine.is_attached(osc.unit()));
//! ```
//!
//! ## Threading
//!
//! Graph mutation happens on one control thread; every operation borrows the
//! engine mutably for its whole walk. Units are `Send + Sync` so the render
//! side can read bypass, parameter values and MIDI concurrently.

extern crate alloc;

mod binder;
mod error;
mod node;
mod param;
mod session;
mod unit;

pub mod engine;
pub mod nodes;
pub mod wiring;

pub use binder::{associate_parameters, bind_parameters};
pub use engine::{ConnectionPoint, Engine, EngineEvent, MemoryEngine, RenderTime};
pub use error::{ConnectionError, GraphError};
pub use node::{reaches, DynamicWaveform, HasInternalConnections, Node, NodeRef, Table, WaveformHandler};
pub use param::{BoundParam, ParamAddress, ParamDescriptor, ParamFlags, ParamUnit, ParameterTree};
pub use session::Session;
pub use unit::{AudioUnit, EngineId, MidiMessage, UnitCaps, UnitId, UnitKind};
pub use wiring::{attach_graph, detach_last_user, detach_subtree, disconnect_routing, prime_render_clock};
