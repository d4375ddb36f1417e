//! The HDL netlist: a design owns its signals, entity ports and devices;
//! device ports name their signal by id and each signal keeps a
//! back-reference list of connected ports, so removing either side keeps
//! the bookkeeping consistent.

pub mod device;
pub mod port_type;
pub mod timing;

use std::collections::BTreeSet;

pub use device::{DeviceId, DeviceKind, DevicePort, HdlDevice, PortDirection};
pub use port_type::HdlPortType;
pub use timing::{TimingOracle, TimingValue};

use crate::bitconst::BitConstant;
use crate::error::{EvalError, EvalResult};
use crate::ops::OperationType;

/// Index of a signal in its design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub usize);

/// One net of the design.
#[derive(Debug)]
pub struct HdlSignal {
    /// Signal (and entity port) name.
    pub name: String,
    /// Port type.
    pub ty: HdlPortType,
    /// Connected device ports as `(device, port index)` pairs.
    pub connections: Vec<(DeviceId, usize)>,
    /// Clock domain annotation.
    pub clock_domain: Option<SignalId>,
    /// Accumulated propagation delay.
    pub timing_delay: TimingValue<f64>,
    /// Accumulated pipeline latency in cycles.
    pub pipeline_latency: TimingValue<u32>,
    /// Excluded from pipeline-register insertion.
    pub dont_pipeline: bool,
}

/// An entity-level port; the signal's name is the port name.
#[derive(Debug, Clone, Copy)]
pub struct EntityPort {
    /// The signal exposed.
    pub signal: SignalId,
    /// Port direction.
    pub dir: PortDirection,
}

/// A synthesised design: one VHDL entity plus architecture.
#[derive(Debug)]
pub struct HdlDesign {
    /// Entity name.
    pub name: String,
    signals: Vec<Option<HdlSignal>>,
    devices: Vec<Option<HdlDevice>>,
    entity_ports: Vec<EntityPort>,
    /// The always-low rail.
    pub gnd: SignalId,
    /// The always-high rail.
    pub vcc: SignalId,
    serials: std::collections::HashMap<&'static str, usize>,
    temp_counter: usize,
}

impl HdlDesign {
    /// Creates an empty design with its ground and power rails driven.
    pub fn new(name: impl Into<String>) -> Self {
        let mut design = HdlDesign {
            name: name.into(),
            signals: Vec::new(),
            devices: Vec::new(),
            entity_ports: Vec::new(),
            gnd: SignalId(0),
            vcc: SignalId(0),
            serials: std::collections::HashMap::new(),
            temp_counter: 0,
        };
        design.gnd = design.add_signal("gnd", HdlPortType::Logic);
        design.vcc = design.add_signal("vcc", HdlPortType::Logic);
        let gnd = design.gnd;
        let vcc = design.vcc;
        design.add_constant(BitConstant::from_bool(false), gnd);
        design.add_constant(BitConstant::from_bool(true), vcc);
        design
    }

    /// Adds a named signal.
    pub fn add_signal(&mut self, name: impl Into<String>, ty: HdlPortType) -> SignalId {
        self.signals.push(Some(HdlSignal {
            name: name.into(),
            ty,
            connections: Vec::new(),
            clock_domain: None,
            timing_delay: TimingValue::default(),
            pipeline_latency: TimingValue::default(),
            dont_pipeline: false,
        }));
        SignalId(self.signals.len() - 1)
    }

    /// Adds a uniquely named temporary signal.
    pub fn temp_signal(&mut self, prefix: &str, ty: HdlPortType) -> SignalId {
        let n = self.temp_counter;
        self.temp_counter += 1;
        self.add_signal(format!("{prefix}_{n}_"), ty)
    }

    /// Exposes a signal as an entity port.
    pub fn add_port(&mut self, signal: SignalId, dir: PortDirection) {
        self.entity_ports.push(EntityPort { signal, dir });
    }

    /// The signal behind an id.
    pub fn signal(&self, id: SignalId) -> &HdlSignal {
        self.signals[id.0].as_ref().expect("signal was removed")
    }

    /// Mutable access to a signal.
    pub fn signal_mut(&mut self, id: SignalId) -> &mut HdlSignal {
        self.signals[id.0].as_mut().expect("signal was removed")
    }

    /// Whether a signal is exposed on the entity.
    pub fn is_entity_port(&self, id: SignalId) -> bool {
        self.entity_ports.iter().any(|p| p.signal == id)
    }

    /// The entity ports in declaration order.
    pub fn entity_ports(&self) -> &[EntityPort] {
        &self.entity_ports
    }

    /// Live devices in insertion order.
    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &HdlDevice)> {
        self.devices
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.as_ref().map(|d| (DeviceId(i), d)))
    }

    /// Live signals in insertion order.
    pub fn signals(&self) -> impl Iterator<Item = (SignalId, &HdlSignal)> {
        self.signals
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (SignalId(i), s)))
    }

    fn next_serial(&mut self, prefix: &'static str) -> usize {
        let counter = self.serials.entry(prefix).or_insert(0);
        let n = *counter;
        *counter += 1;
        n
    }

    /// Adds a device, registering its port connections.
    pub fn add_device(&mut self, kind: DeviceKind, ports: Vec<DevicePort>) -> DeviceId {
        let prefix = kind.serial_prefix();
        let serial = self.next_serial(prefix);
        let id = DeviceId(self.devices.len());
        for (index, port) in ports.iter().enumerate() {
            if let Some(signal) = port.signal {
                self.signal_mut(signal).connections.push((id, index));
            }
        }
        self.devices.push(Some(HdlDevice {
            inst_name: format!("{prefix}_{serial}"),
            kind,
            ports,
        }));
        id
    }

    /// Removes a device, disconnecting all of its ports.
    pub fn remove_device(&mut self, id: DeviceId) {
        if let Some(device) = self.devices[id.0].take() {
            for port in &device.ports {
                if let Some(signal) = port.signal {
                    if let Some(sig) = self.signals[signal.0].as_mut() {
                        sig.connections.retain(|&(d, _)| d != id);
                    }
                }
            }
        }
    }

    fn port(ty: &HdlPortType, name: impl Into<String>, dir: PortDirection, signal: SignalId) -> DevicePort {
        DevicePort {
            name: name.into(),
            ty: ty.clone(),
            dir,
            signal: Some(signal),
        }
    }

    /// Adds an operation device over `inputs` driving `output`.
    pub fn add_operation(
        &mut self,
        op: OperationType,
        inputs: &[SignalId],
        output: SignalId,
    ) -> DeviceId {
        let mut ports = Vec::with_capacity(inputs.len() + 1);
        for (i, &input) in inputs.iter().enumerate() {
            let ty = self.signal(input).ty.clone();
            ports.push(Self::port(&ty, format!("input_{}", i + 1), PortDirection::Input, input));
        }
        let out_ty = self.signal(output).ty.clone();
        ports.push(Self::port(&out_ty, "output", PortDirection::Output, output));
        self.add_device(DeviceKind::Operation(op), ports)
    }

    /// Adds a register: `q` follows `d` on the rising edge of `clk` when
    /// `en` is high, clearing synchronously on `rst`.
    pub fn add_register(
        &mut self,
        d: SignalId,
        clk: SignalId,
        q: SignalId,
        en: SignalId,
        rst: SignalId,
        is_pipeline: bool,
    ) -> DeviceId {
        let ports = vec![
            Self::port(&self.signal(d).ty.clone(), "d", PortDirection::Input, d),
            Self::port(&self.signal(clk).ty.clone(), "clk", PortDirection::Input, clk),
            Self::port(&self.signal(q).ty.clone(), "q", PortDirection::Output, q),
            Self::port(&self.signal(en).ty.clone(), "en", PortDirection::Input, en),
            Self::port(&self.signal(rst).ty.clone(), "rst", PortDirection::Input, rst),
        ];
        self.add_device(DeviceKind::Register { is_pipeline }, ports)
    }

    /// Adds a constant driver.
    pub fn add_constant(&mut self, value: BitConstant, output: SignalId) -> DeviceId {
        let out_ty = self.signal(output).ty.clone();
        let ports = vec![Self::port(&out_ty, "output", PortDirection::Output, output)];
        self.add_device(DeviceKind::Constant(value), ports)
    }

    /// Adds a buffer copying (a slice of) `input` to `output` with
    /// automatic casting.
    pub fn add_buffer(
        &mut self,
        input: SignalId,
        output: SignalId,
        slice: Option<(usize, usize)>,
    ) -> DeviceId {
        let ports = vec![
            Self::port(&self.signal(input).ty.clone(), "input", PortDirection::Input, input),
            Self::port(&self.signal(output).ty.clone(), "output", PortDirection::Output, output),
        ];
        self.add_device(DeviceKind::Buffer { slice }, ports)
    }

    /// Adds a combiner concatenating `inputs` at the given bit offsets
    /// into `output`.
    pub fn add_combiner(
        &mut self,
        inputs: &[(SignalId, usize)],
        output: SignalId,
    ) -> DeviceId {
        let mut ports = Vec::with_capacity(inputs.len() + 1);
        let mut offsets = Vec::with_capacity(inputs.len());
        for (i, &(input, offset)) in inputs.iter().enumerate() {
            let ty = self.signal(input).ty.clone();
            ports.push(Self::port(&ty, format!("input_{i}"), PortDirection::Input, input));
            offsets.push(offset);
        }
        let out_ty = self.signal(output).ty.clone();
        ports.push(Self::port(&out_ty, "output", PortDirection::Output, output));
        self.add_device(DeviceKind::Combiner { offsets }, ports)
    }

    /// Adds a multiplexer selecting among `inputs` by `sel`.
    pub fn add_multiplexer(
        &mut self,
        inputs: &[SignalId],
        sel: SignalId,
        output: SignalId,
    ) -> DeviceId {
        let mut ports = Vec::with_capacity(inputs.len() + 2);
        for (i, &input) in inputs.iter().enumerate() {
            let ty = self.signal(input).ty.clone();
            ports.push(Self::port(&ty, format!("input_{i}"), PortDirection::Input, input));
        }
        ports.push(Self::port(&self.signal(sel).ty.clone(), "sel", PortDirection::Input, sel));
        let out_ty = self.signal(output).ty.clone();
        ports.push(Self::port(&out_ty, "output", PortDirection::Output, output));
        self.add_device(
            DeviceKind::Multiplexer {
                inputs: inputs.len(),
            },
            ports,
        )
    }

    /// Whether a signal has a consumer: an entity output port or a device
    /// input port.
    fn has_consumer(&self, id: SignalId) -> bool {
        if self.is_entity_port(id) {
            return true;
        }
        self.signal(id).connections.iter().any(|&(dev, port)| {
            self.devices[dev.0]
                .as_ref()
                .map(|d| d.ports[port].dir != PortDirection::Output)
                .unwrap_or(false)
        })
    }

    /// Removes devices whose outputs nothing consumes, then signals with
    /// no remaining connections. Entity ports and anything reachable from
    /// them survive.
    pub fn prune(&mut self) {
        loop {
            let dead: Vec<DeviceId> = self
                .devices()
                .filter(|(_, dev)| {
                    let outputs: Vec<SignalId> = dev
                        .ports
                        .iter()
                        .filter(|p| p.dir == PortDirection::Output)
                        .filter_map(|p| p.signal)
                        .collect();
                    !outputs.is_empty() && outputs.iter().all(|&s| !self.has_consumer(s))
                })
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                self.remove_device(id);
            }
        }
        for i in 0..self.signals.len() {
            let id = SignalId(i);
            if self.signals[i].is_some()
                && !self.is_entity_port(id)
                && self.signal(id).connections.is_empty()
            {
                self.signals[i] = None;
            }
        }
    }

    /// Propagates delay annotations forward through the netlist.
    pub fn annotate_timing(&mut self, oracle: &dyn TimingOracle) {
        for i in 0..self.devices.len() {
            let Some(device) = self.devices[i].clone() else {
                continue;
            };
            let input_delay = device
                .ports
                .iter()
                .filter(|p| p.dir == PortDirection::Input)
                .filter_map(|p| p.signal)
                .map(|s| self.signal(s).timing_delay.value)
                .fold(0.0f64, f64::max);
            let widths: Vec<usize> = device
                .ports
                .iter()
                .filter(|p| p.dir == PortDirection::Input)
                .map(|p| p.ty.width())
                .collect();
            let out_delay = match &device.kind {
                DeviceKind::Operation(op) => input_delay + oracle.operation_delay(*op, &widths),
                DeviceKind::Register { .. } => oracle.ff_propagation_delay(),
                DeviceKind::Constant(_) => 0.0,
                _ => input_delay,
            };
            for port in &device.ports {
                if port.dir == PortDirection::Output {
                    if let Some(signal) = port.signal {
                        self.signal_mut(signal).timing_delay.value = out_delay;
                    }
                }
            }
        }
    }

    /// Propagates pipeline-latency annotations forward through the
    /// netlist.
    pub fn annotate_latency(&mut self) {
        for i in 0..self.devices.len() {
            let Some(device) = self.devices[i].clone() else {
                continue;
            };
            let input_latency = device
                .ports
                .iter()
                .filter(|p| p.dir == PortDirection::Input)
                .filter_map(|p| p.signal)
                .map(|s| self.signal(s).pipeline_latency.value)
                .max()
                .unwrap_or(0);
            let out_latency = match &device.kind {
                DeviceKind::Register { is_pipeline } => {
                    input_latency + u32::from(*is_pipeline)
                }
                _ => input_latency,
            };
            for port in &device.ports {
                if port.dir == PortDirection::Output {
                    if let Some(signal) = port.signal {
                        self.signal_mut(signal).pipeline_latency.value = out_latency;
                    }
                }
            }
        }
    }

    fn port_signal_name(&self, device: &HdlDevice, index: usize) -> EvalResult<&str> {
        let signal = device.ports[index].signal.ok_or_else(|| {
            EvalError::internal(format!(
                "dangling port {} on device {}",
                device.ports[index].name, device.inst_name
            ))
        })?;
        Ok(&self.signal(signal).name)
    }

    fn bool_expr(&self, device: &HdlDevice, index: usize) -> EvalResult<String> {
        let name = self.port_signal_name(device, index)?;
        Ok(match &device.ports[index].ty {
            HdlPortType::Logic | HdlPortType::Clock => format!("({name} = '1')"),
            HdlPortType::Numeric { .. } => format!("({name} /= 0)"),
            HdlPortType::LogicVector(_) => format!("(unsigned({name}) /= 0)"),
        })
    }

    fn literal_for(ty: &HdlPortType, value: &BitConstant) -> String {
        match ty {
            HdlPortType::Logic | HdlPortType::Clock => {
                if value.any_set() {
                    "'1'".to_string()
                } else {
                    "'0'".to_string()
                }
            }
            _ => value.cast(ty.width(), ty.is_signed()).to_vhdl_bits(),
        }
    }

    fn operation_vhdl(&self, device: &HdlDevice, op: OperationType) -> EvalResult<String> {
        use OperationType::*;
        let n_inputs = device.ports.len() - 1;
        let out_port = &device.ports[n_inputs];
        let out_name = self.port_signal_name(device, n_inputs)?.to_string();
        let mut width = 0usize;
        let mut signed = false;
        for port in &device.ports[..n_inputs] {
            width = width.max(port.ty.width());
            signed |= port.ty.is_signed();
        }
        if matches!(op, Add | Sub) {
            // one extra bit guarantees no overflow
            width += 1;
        }
        if op == Shl {
            // left shifts compute at the output width so no bits fall off
            width = width.max(out_port.ty.width());
        }
        let common = HdlPortType::Numeric { width, signed };
        let mut operands = Vec::with_capacity(n_inputs);
        for i in 0..n_inputs {
            let name = self.port_signal_name(device, i)?.to_string();
            let ty = &device.ports[i].ty;
            let cast = if op == Mul {
                // multiplies keep operand types for mixed-width support
                HdlPortType::Numeric {
                    width: ty.width(),
                    signed: ty.is_signed(),
                }
                .cast_from(ty, &name)
            } else {
                common.cast_from(ty, &name)
            };
            operands.push(cast);
        }
        let expression = match op {
            Add => format!("{} + {}", operands[0], operands[1]),
            Sub => format!("{} - {}", operands[0], operands[1]),
            Mul => format!("{} * {}", operands[0], operands[1]),
            BwAnd => format!("{} and {}", operands[0], operands[1]),
            BwOr => format!("{} or {}", operands[0], operands[1]),
            BwXor => format!("{} xor {}", operands[0], operands[1]),
            Shl => format!("shift_left({}, to_integer({}))", operands[0], operands[1]),
            Shr => format!("shift_right({}, to_integer({}))", operands[0], operands[1]),
            Minus => format!("-({})", operands[0]),
            BwNot => format!("not ({})", operands[0]),
            Eq | Neq | Lt | Lte | Gt | Gte => {
                let cmp = match op {
                    Eq => "=",
                    Neq => "/=",
                    Lt => "<",
                    Lte => "<=",
                    Gt => ">",
                    _ => ">=",
                };
                let one = Self::literal_for(&out_port.ty, &BitConstant::from_bool(true));
                let zero = Self::literal_for(&out_port.ty, &BitConstant::from_bool(false));
                return Ok(format!(
                    "\t{out_name} <= {one} when {} {cmp} {} else {zero};\n",
                    operands[0], operands[1]
                ));
            }
            LAnd | LOr | LNot => {
                let mut bools = Vec::with_capacity(n_inputs);
                for i in 0..n_inputs {
                    bools.push(self.bool_expr(device, i)?);
                }
                let cond = match op {
                    LAnd => format!("{} and {}", bools[0], bools[1]),
                    LOr => format!("{} or {}", bools[0], bools[1]),
                    _ => format!("not {}", bools[0]),
                };
                let one = Self::literal_for(&out_port.ty, &BitConstant::from_bool(true));
                let zero = Self::literal_for(&out_port.ty, &BitConstant::from_bool(false));
                return Ok(format!(
                    "\t{out_name} <= {one} when {cond} else {zero};\n"
                ));
            }
            Div | Mod => {
                return Err(EvalError::new(
                    "division and modulo are not synthesisable; rewrite using shifts and multiplies",
                ))
            }
            _ => {
                return Err(EvalError::internal(format!(
                    "operation {} reached the netlist",
                    op.token()
                )))
            }
        };
        let result_ty = if op == Mul {
            let total: usize = device.ports[..n_inputs].iter().map(|p| p.ty.width()).sum();
            HdlPortType::Numeric {
                width: total,
                signed,
            }
        } else {
            common
        };
        // parenthesised so slicing and resizing casts stay well-formed
        let cast = out_port.ty.cast_from(&result_ty, &format!("({expression})"));
        Ok(format!("\t{out_name} <= {cast};\n"))
    }

    /// Renders the body of one device.
    pub fn device_vhdl(&self, device: &HdlDevice) -> EvalResult<String> {
        match &device.kind {
            DeviceKind::Operation(op) => self.operation_vhdl(device, *op),
            DeviceKind::Register { .. } => {
                let d = self.port_signal_name(device, 0)?.to_string();
                let clk = self.port_signal_name(device, 1)?.to_string();
                let q = self.port_signal_name(device, 2)?.to_string();
                let en = self.bool_expr(device, 3)?;
                let rst = self.bool_expr(device, 4)?;
                let q_ty = &device.ports[2].ty;
                let d_cast = q_ty.cast_from(&device.ports[0].ty, &d);
                Ok(format!(
                    "\t{inst}: process({clk})\n\tbegin\n\t\tif rising_edge({clk}) then\n\t\t\tif {rst} then\n\t\t\t\t{q} <= {zero};\n\t\t\telsif {en} then\n\t\t\t\t{q} <= {d_cast};\n\t\t\tend if;\n\t\tend if;\n\tend process;\n",
                    inst = device.inst_name,
                    zero = q_ty.zero(),
                ))
            }
            DeviceKind::Constant(value) => {
                let out = self.port_signal_name(device, 0)?.to_string();
                let literal = Self::literal_for(&device.ports[0].ty, value);
                Ok(format!("\t{out} <= {literal};\n"))
            }
            DeviceKind::Buffer { slice } => {
                let input = self.port_signal_name(device, 0)?.to_string();
                let out = self.port_signal_name(device, 1)?.to_string();
                let out_ty = &device.ports[1].ty;
                let (expr, src_ty) = match slice {
                    Some((low, width)) => (
                        format!("{input}({} downto {low})", low + width - 1),
                        HdlPortType::LogicVector(*width),
                    ),
                    None => (input, device.ports[0].ty.clone()),
                };
                let cast = out_ty.cast_from(&src_ty, &expr);
                Ok(format!("\t{out} <= {cast};\n"))
            }
            DeviceKind::Combiner { offsets } => {
                let n_inputs = device.ports.len() - 1;
                let out = self.port_signal_name(device, n_inputs)?.to_string();
                let out_ty = &device.ports[n_inputs].ty;
                let total: usize = device.ports[..n_inputs].iter().map(|p| p.ty.width()).sum();
                let mut parts: Vec<(usize, String)> = Vec::with_capacity(n_inputs);
                for i in 0..n_inputs {
                    let name = self.port_signal_name(device, i)?.to_string();
                    let ty = &device.ports[i].ty;
                    let as_vector =
                        HdlPortType::LogicVector(ty.width()).cast_from(ty, &name);
                    parts.push((offsets[i], as_vector));
                }
                // highest offset first: VHDL concatenation is MSB-first
                parts.sort_by(|a, b| b.0.cmp(&a.0));
                let concatenated = parts
                    .iter()
                    .map(|(_, p)| p.as_str())
                    .collect::<Vec<_>>()
                    .join(" & ");
                let cast = out_ty.cast_from(&HdlPortType::LogicVector(total), &concatenated);
                Ok(format!("\t{out} <= {cast};\n"))
            }
            DeviceKind::Multiplexer { inputs } => {
                let n = *inputs;
                let sel_index = n;
                let out_index = n + 1;
                let out = self.port_signal_name(device, out_index)?.to_string();
                let out_ty = &device.ports[out_index].ty;
                let mut cast_inputs = Vec::with_capacity(n);
                for i in 0..n {
                    let name = self.port_signal_name(device, i)?.to_string();
                    cast_inputs.push(out_ty.cast_from(&device.ports[i].ty, &name));
                }
                if n == 2 {
                    let sel = self.bool_expr(device, sel_index)?;
                    return Ok(format!(
                        "\t{out} <= {} when {sel} else {};\n",
                        cast_inputs[1], cast_inputs[0]
                    ));
                }
                let sel_name = self.port_signal_name(device, sel_index)?.to_string();
                let sel_expr = match &device.ports[sel_index].ty {
                    HdlPortType::Numeric { .. } => format!("to_integer({sel_name})"),
                    _ => format!("to_integer(unsigned({sel_name}))"),
                };
                let mut body = format!("\twith {sel_expr} select {out} <=\n");
                for (i, input) in cast_inputs.iter().enumerate() {
                    if i + 1 == n {
                        body.push_str(&format!("\t\t{input} when others;\n"));
                    } else {
                        body.push_str(&format!("\t\t{input} when {i},\n"));
                    }
                }
                Ok(body)
            }
            DeviceKind::Generic { device_type, .. } => {
                let mut body = format!("\t{}: {} port map (\n", device.inst_name, device_type);
                for (i, port) in device.ports.iter().enumerate() {
                    let target = match port.signal {
                        Some(s) => self.signal(s).name.clone(),
                        None => "open".to_string(),
                    };
                    let sep = if i + 1 == device.ports.len() { "" } else { "," };
                    body.push_str(&format!("\t\t{} => {target}{sep}\n", port.name));
                }
                body.push_str("\t);\n");
                Ok(body)
            }
        }
    }

    fn device_vhdl_prefix(&self, device: &HdlDevice) -> String {
        match &device.kind {
            DeviceKind::Generic { device_type, .. } => {
                let mut out = format!("\tcomponent {device_type}\n\t\tport (\n");
                for (i, port) in device.ports.iter().enumerate() {
                    let sep = if i + 1 == device.ports.len() { "" } else { ";" };
                    out.push_str(&format!(
                        "\t\t\t{} : {} {}{sep}\n",
                        port.name,
                        port.dir.vhdl(),
                        port.ty.vhdl_type()
                    ));
                }
                out.push_str("\t\t);\n\tend component;\n");
                out
            }
            _ => String::new(),
        }
    }

    /// Renders the whole design as one VHDL file: package uses, entity,
    /// architecture prefix, signal declarations, one block per device.
    pub fn generate_vhdl(&self) -> EvalResult<String> {
        let mut uses: BTreeSet<String> = BTreeSet::new();
        let mut libraries: BTreeSet<String> = BTreeSet::new();
        libraries.insert("ieee".to_string());
        for (_, device) in self.devices() {
            for dep in device.kind.vhdl_deps() {
                if let Some((lib, _)) = dep.split_once('.') {
                    libraries.insert(lib.to_string());
                }
                uses.insert(dep);
            }
        }
        if self.devices().next().is_none() {
            uses.insert("ieee.std_logic_1164.all".to_string());
        }

        let mut out = String::new();
        out.push_str("-- generated by elasticc\n");
        for library in &libraries {
            out.push_str(&format!("library {library};\n"));
        }
        for use_clause in &uses {
            out.push_str(&format!("use {use_clause};\n"));
        }
        out.push('\n');

        out.push_str(&format!("entity {} is\n", self.name));
        if !self.entity_ports.is_empty() {
            out.push_str("\tport (\n");
            for (i, port) in self.entity_ports.iter().enumerate() {
                let signal = self.signal(port.signal);
                let sep = if i + 1 == self.entity_ports.len() { "" } else { ";" };
                out.push_str(&format!(
                    "\t\t{} : {} {}{sep}\n",
                    signal.name,
                    port.dir.vhdl(),
                    signal.ty.vhdl_type()
                ));
            }
            out.push_str("\t);\n");
        }
        out.push_str(&format!("end entity {};\n\n", self.name));

        out.push_str(&format!("architecture rtl of {} is\n", self.name));
        for (_, device) in self.devices() {
            out.push_str(&self.device_vhdl_prefix(device));
        }
        for (id, signal) in self.signals() {
            if !self.is_entity_port(id) {
                out.push_str(&format!(
                    "\tsignal {} : {};\n",
                    signal.name,
                    signal.ty.vhdl_type()
                ));
            }
        }
        out.push_str("begin\n");
        for (_, device) in self.devices() {
            out.push_str(&self.device_vhdl(device)?);
        }
        out.push_str("end architecture;\n");
        Ok(out)
    }
}
