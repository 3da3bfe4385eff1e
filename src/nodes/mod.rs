//! Built-in nodes.
//!
//! - [`UnitNode`] - any unit with a fixed list of inputs
//! - [`Mixer`] - sums inputs, which can be added and removed while live
//! - [`Wavetable`] - oscillator with a swappable [`Table`](crate::Table)
//!
//! Concrete DSP lives in the engine; these only describe graph shape,
//! parameters and capabilities.

mod mixer;
mod unit_node;
mod wavetable;

pub use mixer::Mixer;
pub use unit_node::UnitNode;
pub use wavetable::Wavetable;

/// Parameter addresses of [`Mixer`].
pub mod mixer_params {
    pub use super::mixer::{PAN, VOLUME};
}

/// Parameter addresses of [`Wavetable`].
pub mod wavetable_params {
    pub use super::wavetable::{AMPLITUDE, FREQUENCY};
}
