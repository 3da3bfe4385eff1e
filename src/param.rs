//! Parameter descriptors and their live bindings.
//!
//! A [`ParamDescriptor`] is declarative metadata for one tunable control. Once
//! a node's descriptors are bound (see [`bind_parameters`](crate::bind_parameters))
//! each one becomes a [`BoundParam`]: a handle into the running unit's control
//! surface that reads and writes the value the render side sees.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::RangeInclusive;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::unit::UnitId;

/// Numeric address of a parameter within its unit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ParamAddress(pub u64);

/// Unit tag used by hosts to format a parameter's value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ParamUnit {
    #[default]
    Generic,
    Indexed,
    Boolean,
    Percent,
    Seconds,
    Milliseconds,
    SampleFrames,
    Hertz,
    Cents,
    Decibels,
    LinearGain,
    Ratio,
    Midi,
}

/// Capability flags attached to a parameter.
///
/// Combine with `|` or [`union`](Self::union).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct ParamFlags(u32);

impl ParamFlags {
    pub const NONE: Self = Self(0);
    pub const READABLE: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    /// Value changes may be ramped by the unit.
    pub const RAMPABLE: Self = Self(1 << 2);
    pub const LOGARITHMIC: Self = Self(1 << 3);
    /// Readable and writable, the usual case for a node parameter.
    pub const DEFAULT: Self = Self(Self::READABLE.0 | Self::WRITABLE.0);

    /// Both sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl core::ops::BitOr for ParamFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Declarative description of one tunable control.
///
/// ```
/// use schaltung::{ParamAddress, ParamDescriptor, ParamUnit};
///
/// let cutoff = ParamDescriptor::new("cutoff", "Cutoff Frequency", ParamAddress(0), 20.0..=20_000.0)
///     .with_unit(ParamUnit::Hertz)
///     .with_initial(1_000.0);
///
/// assert_eq!(cutoff.clamp(50_000.0), 20_000.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDescriptor {
    identifier: String,
    name: String,
    address: ParamAddress,
    min: f32,
    max: f32,
    unit: ParamUnit,
    flags: ParamFlags,
    initial: f32,
}

impl ParamDescriptor {
    /// Describe a parameter with default unit and flags. Initial value is the
    /// lower bound of `range`.
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        address: ParamAddress,
        range: RangeInclusive<f32>,
    ) -> Self {
        let (min, max) = range.into_inner();
        Self {
            identifier: identifier.into(),
            name: name.into(),
            address,
            min,
            max,
            unit: ParamUnit::Generic,
            flags: ParamFlags::DEFAULT,
            initial: min,
        }
    }

    /// Set the unit tag (builder pattern).
    pub fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Value the control surface starts with, clamped to the range.
    pub fn with_initial(mut self, value: f32) -> Self {
        self.initial = self.clamp(value);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> ParamAddress {
        self.address
    }

    pub fn range(&self) -> RangeInclusive<f32> {
        self.min..=self.max
    }

    pub fn unit(&self) -> ParamUnit {
        self.unit
    }

    pub fn flags(&self) -> ParamFlags {
        self.flags
    }

    pub fn initial(&self) -> f32 {
        self.initial
    }

    /// Clamp `value` into this parameter's range.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.min).min(self.max)
    }
}

/// Live storage for one parameter value, shared between control and render.
#[derive(Debug)]
pub(crate) struct ParamCell(AtomicU32);

impl ParamCell {
    pub(crate) fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release)
    }
}

/// A descriptor bound to a running unit's control surface.
///
/// Cloning a `BoundParam` yields another handle to the same live value.
#[derive(Clone, Debug)]
pub struct BoundParam {
    def: Arc<ParamDescriptor>,
    unit: UnitId,
    cell: Arc<ParamCell>,
}

impl BoundParam {
    pub(crate) fn new(def: Arc<ParamDescriptor>, unit: UnitId, cell: Arc<ParamCell>) -> Self {
        Self { def, unit, cell }
    }

    pub fn def(&self) -> &ParamDescriptor {
        &self.def
    }

    pub fn address(&self) -> ParamAddress {
        self.def.address()
    }

    /// Unit whose control surface this handle writes to.
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn value(&self) -> f32 {
        self.cell.load()
    }

    /// Write a new value, clamped to the descriptor's range.
    pub fn set_value(&self, value: f32) {
        self.cell.store(self.def.clamp(value))
    }

    /// Whether both handles point at the same live value.
    pub fn shares_value_with(&self, other: &BoundParam) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// Ordered set of bound parameters published on a unit.
///
/// At most one entry exists per address; inserting an address that is already
/// present replaces the old entry in place.
#[derive(Clone, Debug, Default)]
pub struct ParameterTree {
    params: Vec<BoundParam>,
}

impl ParameterTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `params`, keeping the last entry for any repeated address.
    pub fn with_children(params: impl IntoIterator<Item = BoundParam>) -> Self {
        let mut tree = Self::new();
        for param in params {
            tree.insert(param);
        }
        tree
    }

    /// Append `param`, or replace the entry already at its address.
    pub fn insert(&mut self, param: BoundParam) {
        match self.params.iter_mut().find(|p| p.address() == param.address()) {
            Some(slot) => *slot = param,
            None => self.params.push(param),
        }
    }

    pub fn get(&self, address: ParamAddress) -> Option<&BoundParam> {
        self.params.iter().find(|p| p.address() == address)
    }

    /// Look a parameter up by its identifier rather than its address.
    pub fn find(&self, identifier: &str) -> Option<&BoundParam> {
        self.params.iter().find(|p| p.def().identifier() == identifier)
    }

    pub fn params(&self) -> &[BoundParam] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParam> {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell_param(def: ParamDescriptor) -> BoundParam {
        let initial = def.initial();
        BoundParam::new(Arc::new(def), UnitId(1), Arc::new(ParamCell::new(initial)))
    }

    #[test]
    fn descriptor_defaults_to_lower_bound() {
        let def = ParamDescriptor::new("gain", "Gain", ParamAddress(3), 0.5..=2.0);
        assert_eq!(def.initial(), 0.5);
        assert_eq!(def.flags(), ParamFlags::DEFAULT);
        assert_eq!(def.range(), 0.5..=2.0);
    }

    #[test]
    fn set_value_clamps_to_range() {
        let param = cell_param(ParamDescriptor::new("mix", "Mix", ParamAddress(0), 0.0..=1.0));
        param.set_value(3.0);
        assert_eq!(param.value(), 1.0);
        param.set_value(-1.0);
        assert_eq!(param.value(), 0.0);
    }

    #[test]
    fn tree_replaces_same_address_in_place() {
        let a = cell_param(ParamDescriptor::new("a", "A", ParamAddress(0), 0.0..=1.0));
        let b = cell_param(ParamDescriptor::new("b", "B", ParamAddress(1), 0.0..=1.0));
        let a2 = cell_param(ParamDescriptor::new("a2", "A again", ParamAddress(0), 0.0..=4.0));

        let tree = ParameterTree::with_children(vec![a, b, a2]);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.params()[0].def().identifier(), "a2");
        assert_eq!(tree.params()[1].def().identifier(), "b");
        assert!(tree.find("a").is_none());
    }

    #[test]
    fn flags_combine() {
        let flags = ParamFlags::DEFAULT | ParamFlags::RAMPABLE;
        assert!(flags.contains(ParamFlags::READABLE));
        assert!(flags.contains(ParamFlags::RAMPABLE));
        assert!(!flags.contains(ParamFlags::LOGARITHMIC));
    }
}
