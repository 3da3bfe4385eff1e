//! Wavetable oscillator with a swappable table

use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::{PoisonError, RwLock};

use delegate::delegate;

use crate::node::{DynamicWaveform, Node, NodeRef, Table, WaveformHandler};
use crate::nodes::UnitNode;
use crate::param::{ParamAddress, ParamDescriptor, ParamUnit};
use crate::unit::{AudioUnit, UnitCaps, UnitKind};

pub const FREQUENCY: ParamAddress = ParamAddress(0);
pub const AMPLITUDE: ParamAddress = ParamAddress(1);

/// An oscillator reading a single-cycle [`Table`].
///
/// The table can be replaced while the node is live; the update handler, if
/// one is set, is called with the new values.
pub struct Wavetable {
    inner: UnitNode,
    table: RwLock<Table>,
    on_update: RwLock<Option<WaveformHandler>>,
}

impl Wavetable {
    pub fn new(table: Table) -> Self {
        let unit = AudioUnit::new(UnitKind::Generator)
            .named("wavetable")
            .with_caps(UnitCaps::RESET);
        let inner = UnitNode::from_unit(unit).with_parameters([
            ParamDescriptor::new("frequency", "Frequency", FREQUENCY, 0.0..=20_000.0)
                .with_unit(ParamUnit::Hertz)
                .with_initial(440.0),
            ParamDescriptor::new("amplitude", "Amplitude", AMPLITUDE, 0.0..=10.0)
                .with_unit(ParamUnit::LinearGain)
                .with_initial(1.0),
        ]);

        Self { inner, table: RwLock::new(table), on_update: RwLock::new(None) }
    }
}

impl Default for Wavetable {
    fn default() -> Self {
        Self::new(Table::sine(4096))
    }
}

impl Node for Wavetable {
    delegate! {
        to self.inner {
            fn connections(&self) -> Vec<NodeRef>;
            fn unit(&self) -> &Arc<AudioUnit>;
            fn parameter_descriptors(&self) -> &[ParamDescriptor];
        }
    }

    fn dynamic_waveform(&self) -> Option<&dyn DynamicWaveform> {
        Some(self)
    }
}

impl DynamicWaveform for Wavetable {
    fn set_waveform(&self, table: Table) {
        let values = table.values().to_vec();
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = table;

        if let Some(handler) = self.on_update.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            handler(&values);
        }
    }

    fn waveform_values(&self) -> Vec<f32> {
        self.table.read().unwrap_or_else(PoisonError::into_inner).values().to_vec()
    }

    fn set_waveform_update_handler(&self, handler: WaveformHandler) {
        *self.on_update.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
