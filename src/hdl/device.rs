//! Netlist devices and their ports.
//!
//! Devices are plain data; their VHDL bodies are rendered by
//! [`super::HdlDesign`], which can resolve port connections to signal
//! names.

use crate::bitconst::BitConstant;
use crate::ops::OperationType;

use super::port_type::HdlPortType;
use super::SignalId;

/// Index of a device in its design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

/// Direction of a device port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Driven from outside the device.
    Input,
    /// Driven by the device.
    Output,
    /// Driven from both sides.
    Bidir,
}

impl PortDirection {
    /// The VHDL keyword for this direction.
    pub fn vhdl(&self) -> &'static str {
        match self {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
            PortDirection::Bidir => "inout",
        }
    }
}

/// A named, typed, directional connection point on a device. A port with
/// no signal is dangling.
#[derive(Debug, Clone)]
pub struct DevicePort {
    /// Port name.
    pub name: String,
    /// Port type.
    pub ty: HdlPortType,
    /// Direction.
    pub dir: PortDirection,
    /// Connected signal, if any.
    pub signal: Option<SignalId>,
}

/// What a device does; drives both emission and timing annotation.
#[derive(Debug, Clone)]
pub enum DeviceKind {
    /// Combinational operation over the input ports.
    Operation(OperationType),
    /// D flip-flop with enable and synchronous reset.
    Register {
        /// Whether this register exists for pipelining and adds a cycle
        /// of latency.
        is_pipeline: bool,
    },
    /// Drives a fixed bit pattern.
    Constant(BitConstant),
    /// Passes one signal to another with automatic casting; an optional
    /// slice selects `width` bits starting at `low` of the input.
    Buffer {
        /// `(low, width)` slice of the input, if any.
        slice: Option<(usize, usize)>,
    },
    /// Concatenates input slices into one output at fixed bit offsets.
    Combiner {
        /// Output bit offset of each input, positionally.
        offsets: Vec<usize>,
    },
    /// Selects one of `inputs` data ports by the select port.
    Multiplexer {
        /// Number of data inputs.
        inputs: usize,
    },
    /// An opaque vendor primitive or user component.
    Generic {
        /// Component name instantiated.
        device_type: String,
        /// Library providing the component; empty for work-library
        /// components.
        library: String,
    },
}

impl DeviceKind {
    /// Prefix used for instance names of this device class.
    pub fn serial_prefix(&self) -> &'static str {
        match self {
            DeviceKind::Operation(_) => "basic_op",
            DeviceKind::Register { .. } => "reg",
            DeviceKind::Constant(_) => "const",
            DeviceKind::Buffer { .. } => "buf",
            DeviceKind::Combiner { .. } => "comb",
            DeviceKind::Multiplexer { .. } => "mux",
            DeviceKind::Generic { .. } => "generic",
        }
    }

    /// `library`/`use` clauses the device's VHDL depends on.
    pub fn vhdl_deps(&self) -> Vec<String> {
        match self {
            DeviceKind::Generic { library, .. } if !library.is_empty() => vec![
                "ieee.std_logic_1164.all".to_string(),
                format!("{library}.all"),
            ],
            _ => vec![
                "ieee.std_logic_1164.all".to_string(),
                "ieee.numeric_std.all".to_string(),
            ],
        }
    }
}

/// One instantiated device.
#[derive(Debug, Clone)]
pub struct HdlDevice {
    /// Unique instance name within the design.
    pub inst_name: String,
    /// What the device does.
    pub kind: DeviceKind,
    /// Ports in declaration order.
    pub ports: Vec<DevicePort>,
}

impl HdlDevice {
    /// The output port, by convention the last port for the core devices.
    pub fn output_port(&self) -> Option<&DevicePort> {
        self.ports.iter().rev().find(|p| p.dir == PortDirection::Output)
    }
}
