//! Timing and latency annotation over the netlist.
//!
//! The concrete device timing model is abstracted behind [`TimingOracle`];
//! downstream passes (pipelining, reporting) consume the annotated values.
//! A unit-delay model is provided so the annotation passes always run.

use crate::ops::OperationType;

use super::SignalId;

/// A per-clock-domain annotation value: a propagation delay in
/// nanoseconds or a pipeline latency in cycles.
#[derive(Debug, Clone, Copy)]
pub struct TimingValue<T> {
    /// The clock domain the value is relative to; `None` is don't-care.
    pub domain: Option<SignalId>,
    /// The annotated value.
    pub value: T,
}

impl<T: Default> Default for TimingValue<T> {
    fn default() -> Self {
        TimingValue {
            domain: None,
            value: T::default(),
        }
    }
}

impl<T> TimingValue<T> {
    /// A value in a known clock domain.
    pub fn new(domain: SignalId, value: T) -> Self {
        TimingValue {
            domain: Some(domain),
            value,
        }
    }
}

/// Per-device delay source used by the annotation passes.
pub trait TimingOracle {
    /// Flip-flop setup time.
    fn ff_setup_time(&self) -> f64;
    /// Clock-to-Q propagation delay of a flip-flop.
    fn ff_propagation_delay(&self) -> f64;
    /// Propagation delay of an operation over operands of the given
    /// widths.
    fn operation_delay(&self, op: OperationType, operand_widths: &[usize]) -> f64;
}

/// A placeholder model: every element costs one unit, multipliers scale
/// with width.
#[derive(Debug, Default)]
pub struct UnitDelayModel;

impl TimingOracle for UnitDelayModel {
    fn ff_setup_time(&self) -> f64 {
        0.5
    }

    fn ff_propagation_delay(&self) -> f64 {
        1.0
    }

    fn operation_delay(&self, op: OperationType, operand_widths: &[usize]) -> f64 {
        let width = operand_widths.iter().copied().max().unwrap_or(1) as f64;
        match op {
            OperationType::Mul => width,
            OperationType::Add | OperationType::Sub => width / 8.0 + 1.0,
            _ => 1.0,
        }
    }
}
