//! Evaluator variables: the per-variable records carrying resolved types,
//! I/O direction, packed bit offsets and the synthesised child variables of
//! non-scalar kinds.
//!
//! Non-trivial kinds create port children eagerly: a static scalar gets a
//! write-enable and written-value pair, memories get address/q (and
//! write-enable/data when writable), streams get a sample window plus a
//! push target. The children are real variables registered with the
//! evaluator like any other.

use crate::attributes::AttributeSet;
use crate::bitconst::BitConstant;
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::types::DataType;

/// Index of an evaluator variable in the evaluator's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvalVarId(pub usize);

/// Data-flow direction of a variable relative to the generated entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableDir {
    /// Value arrives from hardware: top-level input, memory read data, or
    /// a static register's current value.
    pub is_input: bool,
    /// Value leaves towards hardware: top-level output, write enable,
    /// written data.
    pub is_output: bool,
    /// Exposed on the final entity's port list.
    pub is_toplevel: bool,
}

impl VariableDir {
    /// Creates a direction triple.
    pub fn new(is_input: bool, is_output: bool, is_toplevel: bool) -> Self {
        VariableDir {
            is_input,
            is_output,
            is_toplevel,
        }
    }
}

/// Kind-specific data and children of an evaluator variable.
#[derive(Debug)]
pub enum EvalVarKind {
    /// A fixed-width integer.
    Scalar {
        /// Whether the value is held in a register across invocations.
        is_static: bool,
        /// `__wren` child of static scalars.
        write_enable: Option<EvalVarId>,
        /// `__wrval` child of static scalars.
        written_value: Option<EvalVarId>,
    },
    /// A fixed-length array with one child per element.
    Array {
        /// Element children in index order.
        items: Vec<EvalVarId>,
    },
    /// A structure with one child per member.
    Structure {
        /// Member children in declaration order.
        members: Vec<(String, EvalVarId)>,
    },
    /// An external RAM or ROM, accessed through port children.
    Memory {
        /// Whether writes are rejected.
        is_rom: bool,
        /// `__address` port.
        address: EvalVarId,
        /// `__q` read-data port.
        q: EvalVarId,
        /// `__wren` port, writable memories only.
        write_enable: Option<EvalVarId>,
        /// `__data` port, writable memories only.
        data: Option<EvalVarId>,
    },
    /// A stream window plus push target.
    Stream {
        /// Visible samples, row-major for 2-D streams.
        window: Vec<EvalVarId>,
        /// `__wrval` push value.
        written_value: EvalVarId,
        /// `__wren` push strobe.
        write_enable: EvalVarId,
    },
}

/// One evaluator variable.
#[derive(Debug)]
pub struct EvaluatorVariable {
    /// Unique name, used for netlist signals.
    pub name: String,
    /// Direction triple.
    pub dir: VariableDir,
    /// Attributes carried over from the parser variable.
    pub attributes: AttributeSet,
    /// Resolved type.
    pub ty: DataType,
    /// Offset within the enclosing packed aggregate, in bits.
    pub bit_offset: usize,
    /// Value driven when nothing writes the variable.
    pub default_value: Option<BitConstant>,
    /// Whether writes insert a pipeline register.
    pub is_register: bool,
    /// Kind-specific data.
    pub kind: EvalVarKind,
}

impl EvaluatorVariable {
    /// Whether this is a plain scalar.
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, EvalVarKind::Scalar { .. })
    }

    /// Whether array subscripting goes through a port protocol rather than
    /// child selection.
    pub fn is_non_trivial_access(&self) -> bool {
        matches!(self.kind, EvalVarKind::Memory { .. })
    }
}

/// Number of address bits needed to select one of `length` words.
pub fn address_bus_size(length: usize) -> usize {
    let mut size = 2usize;
    for bits in 1..32 {
        if length <= size {
            return bits;
        }
        size *= 2;
    }
    32
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator variable of the kind matching `ty`, registering
    /// it and all of its children, and binding every created variable's
    /// initial value (inputs read themselves, everything else is
    /// don't-care).
    pub fn create_variable(
        &mut self,
        dir: VariableDir,
        name: String,
        ty: DataType,
        is_static: bool,
    ) -> EvalResult<EvalVarId> {
        let kind = match &ty {
            DataType::Integer(_) => {
                let mut write_enable = None;
                let mut written_value = None;
                if is_static {
                    let wren = self.create_variable(
                        VariableDir::new(false, true, false),
                        format!("{name}__wren"),
                        DataType::integer(1, false),
                        false,
                    )?;
                    self.variables[wren.0].default_value = Some(BitConstant::zero());
                    let wrval = self.create_variable(
                        VariableDir::new(false, true, false),
                        format!("{name}__wrval"),
                        ty.clone(),
                        false,
                    )?;
                    self.variables[wrval.0].default_value = Some(BitConstant::zero());
                    write_enable = Some(wren);
                    written_value = Some(wrval);
                }
                EvalVarKind::Scalar {
                    is_static,
                    write_enable,
                    written_value,
                }
            }
            DataType::Array(arr) => {
                let mut items = Vec::with_capacity(arr.length);
                for i in 0..arr.length {
                    items.push(self.create_variable(
                        VariableDir::new(dir.is_input, dir.is_output, false),
                        format!("{name}___itm{i}"),
                        (*arr.base).clone(),
                        is_static,
                    )?);
                }
                EvalVarKind::Array { items }
            }
            DataType::Structure(st) => {
                let mut members = Vec::with_capacity(st.members.len());
                for (member_name, member_ty) in &st.members {
                    let child = self.create_variable(
                        VariableDir::new(dir.is_input, dir.is_output, false),
                        format!("{name}_{member_name}"),
                        member_ty.clone(),
                        is_static,
                    )?;
                    members.push((member_name.clone(), child));
                }
                EvalVarKind::Structure { members }
            }
            DataType::Ram(ram) => {
                // memory ports always surface on the entity so the external
                // memory block can be attached
                let address = self.create_variable(
                    VariableDir::new(false, true, true),
                    format!("{name}_address"),
                    DataType::integer(address_bus_size(ram.length), false),
                    false,
                )?;
                self.variables[address.0].default_value = Some(BitConstant::zero());
                let q = self.create_variable(
                    VariableDir::new(true, false, true),
                    format!("{name}_q"),
                    DataType::Integer(ram.base.clone()),
                    false,
                )?;
                let mut write_enable = None;
                let mut data = None;
                if !ram.is_rom {
                    let wren = self.create_variable(
                        VariableDir::new(false, true, true),
                        format!("{name}_wren"),
                        DataType::integer(1, false),
                        false,
                    )?;
                    self.variables[wren.0].default_value = Some(BitConstant::zero());
                    write_enable = Some(wren);
                    data = Some(self.create_variable(
                        VariableDir::new(false, true, true),
                        format!("{name}_data"),
                        DataType::Integer(ram.base.clone()),
                        false,
                    )?);
                }
                EvalVarKind::Memory {
                    is_rom: ram.is_rom,
                    address,
                    q,
                    write_enable,
                    data,
                }
            }
            DataType::Stream(stream) => {
                let total = if stream.is_2d {
                    stream.length * stream.height
                } else {
                    stream.length
                };
                let mut window = Vec::with_capacity(total);
                for i in 0..total {
                    window.push(self.create_variable(
                        VariableDir::new(true, false, true),
                        format!("{name}___itm{i}"),
                        (*stream.base).clone(),
                        false,
                    )?);
                }
                let written_value = self.create_variable(
                    VariableDir::new(false, true, true),
                    format!("{name}__wrval"),
                    (*stream.base).clone(),
                    false,
                )?;
                let write_enable = self.create_variable(
                    VariableDir::new(false, true, true),
                    format!("{name}__wren"),
                    DataType::integer(1, false),
                    false,
                )?;
                self.variables[write_enable.0].default_value = Some(BitConstant::zero());
                EvalVarKind::Stream {
                    window,
                    written_value,
                    write_enable,
                }
            }
        };
        // static scalars read back from their register
        let dir = match &kind {
            EvalVarKind::Scalar { is_static: true, .. } => {
                VariableDir::new(true, dir.is_output, dir.is_toplevel)
            }
            // memories and streams are reached through their ports only
            EvalVarKind::Memory { .. } | EvalVarKind::Stream { .. } => {
                VariableDir::new(dir.is_input, dir.is_output, false)
            }
            _ => dir,
        };
        let id = EvalVarId(self.variables.len());
        self.variables.push(EvaluatorVariable {
            name,
            dir,
            attributes: AttributeSet::new(),
            ty,
            bit_offset: 0,
            default_value: None,
            is_register: false,
            kind,
        });
        self.bind_fresh_value(id);
        if let EvalVarKind::Array { .. } | EvalVarKind::Structure { .. } = self.variables[id.0].kind
        {
            self.set_bit_offset(id, 0);
        }
        Ok(id)
    }

    /// The variable record behind an id.
    pub fn var(&self, id: EvalVarId) -> &EvaluatorVariable {
        &self.variables[id.0]
    }

    /// Children addressed by array subscripting, in index order.
    pub fn array_children(&self, id: EvalVarId) -> Vec<EvalVarId> {
        match &self.variables[id.0].kind {
            EvalVarKind::Array { items } => items.clone(),
            EvalVarKind::Stream { window, .. } => window.clone(),
            _ => Vec::new(),
        }
    }

    /// Every child variable synthesised alongside this one.
    pub fn all_children(&self, id: EvalVarId) -> Vec<EvalVarId> {
        match &self.variables[id.0].kind {
            EvalVarKind::Scalar {
                write_enable,
                written_value,
                ..
            } => write_enable.iter().chain(written_value).copied().collect(),
            EvalVarKind::Array { items } => items.clone(),
            EvalVarKind::Structure { members } => members.iter().map(|&(_, c)| c).collect(),
            EvalVarKind::Memory {
                address,
                q,
                write_enable,
                data,
                ..
            } => [*address, *q]
                .into_iter()
                .chain(write_enable.iter().copied())
                .chain(data.iter().copied())
                .collect(),
            EvalVarKind::Stream {
                window,
                written_value,
                write_enable,
            } => window
                .iter()
                .copied()
                .chain([*write_enable, *written_value])
                .collect(),
        }
    }

    /// Finds a named child: structure members, plus the port children of
    /// memories, streams and static scalars.
    pub fn child_by_name(&self, id: EvalVarId, name: &str) -> EvalResult<EvalVarId> {
        let not_found = || {
            EvalError::new(format!(
                "variable ==={}=== does not contain member ==={}===",
                self.variables[id.0].name, name
            ))
        };
        match &self.variables[id.0].kind {
            EvalVarKind::Scalar {
                is_static: true,
                write_enable,
                written_value,
            } => match name {
                "__wren" => (*write_enable).ok_or_else(not_found),
                "__wrval" => (*written_value).ok_or_else(not_found),
                _ => Err(not_found()),
            },
            EvalVarKind::Structure { members } => members
                .iter()
                .find(|(n, _)| n == name)
                .map(|&(_, c)| c)
                .ok_or_else(not_found),
            EvalVarKind::Memory {
                address,
                q,
                write_enable,
                data,
                ..
            } => match name {
                "__address" => Ok(*address),
                "__q" => Ok(*q),
                "__wren" => (*write_enable).ok_or_else(not_found),
                "__data" => (*data).ok_or_else(not_found),
                _ => Err(not_found()),
            },
            EvalVarKind::Stream {
                written_value,
                write_enable,
                ..
            } => match name {
                "__wrval" => Ok(*written_value),
                "__wren" => Ok(*write_enable),
                _ => Err(not_found()),
            },
            _ => Err(not_found()),
        }
    }

    /// Assigns packed bit offsets: children tile the parent's width in
    /// declaration order without gaps.
    pub fn set_bit_offset(&mut self, id: EvalVarId, offset: usize) {
        self.variables[id.0].bit_offset = offset;
        let children: Vec<(EvalVarId, usize)> = match &self.variables[id.0].kind {
            EvalVarKind::Array { items } => {
                let mut out = Vec::with_capacity(items.len());
                let mut at = offset;
                for &item in items {
                    out.push((item, at));
                    at += self.variables[item.0].ty.width();
                }
                out
            }
            EvalVarKind::Structure { members } => {
                let mut out = Vec::with_capacity(members.len());
                let mut at = offset;
                for &(_, member) in members {
                    out.push((member, at));
                    at += self.variables[member.0].ty.width();
                }
                out
            }
            _ => Vec::new(),
        };
        for (child, child_offset) in children {
            self.set_bit_offset(child, child_offset);
        }
    }
}
