//! Error types for graph construction and wiring.

use thiserror::Error;

use crate::param::ParamAddress;
use crate::unit::{EngineId, UnitId};

/// A single edge that [`attach_graph`](crate::attach_graph) refused to wire.
///
/// Wiring is best-effort: the offending edge is skipped and logged, every other
/// edge of the graph is still connected. The collected errors are returned so
/// callers can inspect them instead of scraping logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The input's unit is attached to a different engine than its consumer.
    #[error(
        "cannot connect {input:?} into {consumer:?} (bus {bus}): input belongs to {found:?}, consumer to {expected:?}"
    )]
    CrossEngine {
        /// Unit that would have received the signal.
        consumer: UnitId,
        /// Unit that would have fed the consumer.
        input: UnitId,
        /// Input bus the edge was meant for.
        bus: usize,
        /// Engine the consumer is attached to.
        expected: EngineId,
        /// Engine the input is attached to.
        found: EngineId,
    },

    /// The consumer is a mixer and every one of its input buses is taken.
    #[error("cannot connect {input:?} into mixer {mixer:?}: no free input bus")]
    NoFreeBus {
        /// Mixer that would have received the signal.
        mixer: UnitId,
        /// Unit that would have fed the mixer.
        input: UnitId,
    },
}

/// Errors from the few fallible builder operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Adding the input would make the consumer feed itself.
    #[error("connecting {input:?} into {consumer:?} would create a cycle")]
    Cycle {
        /// Node whose inputs were being extended.
        consumer: UnitId,
        /// Node that was rejected.
        input: UnitId,
    },

    /// The input is already connected to this consumer.
    #[error("{input:?} is already an input of {consumer:?}")]
    DuplicateInput {
        /// Node whose inputs were being extended.
        consumer: UnitId,
        /// Node that was rejected.
        input: UnitId,
    },

    /// No parameter is registered at this address on the unit.
    #[error("no parameter at address {address:?} on {unit:?}")]
    UnknownParameter {
        /// Unit that was queried.
        unit: UnitId,
        /// Address that was not found.
        address: ParamAddress,
    },
}
