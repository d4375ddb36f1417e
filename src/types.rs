//! The type system: concrete resolved types and the unresolved parse-time
//! specifiers they come from.
//!
//! Specifiers may depend on template parameters and constant expressions;
//! the evaluator resolves them against a template-parameter context (see
//! `eval`). Concrete types are plain values compared structurally.

use crate::ast::{ContextRef, ExprId, StructId, TypeSpecId};
use crate::error::{EvalError, EvalResult};
use crate::hdl::port_type::HdlPortType;
use crate::template::{TemplateParameter, TemplateParameterKind};

/// The built-in parametric type keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicType {
    /// `unsigned<W>`
    Unsigned,
    /// `signed<W>`
    Signed,
    /// `stream<T, L>`
    Stream,
    /// `stream2d<T, L, H, LW>`
    Stream2d,
    /// `ram<T, L>`
    Ram,
    /// `rom<T, L>`
    Rom,
}

impl BasicType {
    /// The template parameters this type expects, unbound.
    pub fn default_params(self) -> Vec<TemplateParameter> {
        match self {
            BasicType::Unsigned | BasicType::Signed => {
                vec![TemplateParameter::int("width")]
            }
            BasicType::Stream => vec![
                TemplateParameter::data_type("baseType"),
                TemplateParameter::int("length"),
            ],
            BasicType::Stream2d => vec![
                TemplateParameter::data_type("baseType"),
                TemplateParameter::int("length"),
                TemplateParameter::int("width"),
                TemplateParameter::int("lineWidth"),
            ],
            BasicType::Ram | BasicType::Rom => vec![
                TemplateParameter::data_type("baseType"),
                TemplateParameter::int("length"),
            ],
        }
    }
}

/// An unresolved type as written in the source.
#[derive(Debug, Clone)]
pub enum TypeSpecifier {
    /// The initialiser decides the type.
    Auto,
    /// One of the built-in keyword types with its template arguments.
    Basic {
        /// Which keyword type.
        kind: BasicType,
        /// Bound template arguments, positionally.
        params: Vec<TemplateParameter>,
    },
    /// A user structure with its template arguments.
    Structure {
        /// The structure declaration.
        structure: StructId,
        /// Bound template arguments, positionally.
        params: Vec<TemplateParameter>,
    },
    /// An array of some other specifier.
    Array {
        /// Element type.
        base: TypeSpecId,
        /// Length expression, a compile-time constant.
        length: ExprId,
    },
    /// A type given as a template parameter of an enclosing declaration.
    TemplateParam {
        /// Context whose parameter list is referenced.
        context: ContextRef,
        /// Position in that parameter list.
        index: usize,
    },
    /// The type of an expression.
    Decltype {
        /// The inspected expression.
        operand: ExprId,
    },
}

/// A synthesisable fixed-width integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerType {
    /// Width in bits.
    pub width: usize,
    /// Two's-complement signedness.
    pub is_signed: bool,
}

/// A fixed-length array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    /// Element type.
    pub base: Box<DataType>,
    /// Number of elements.
    pub length: usize,
}

/// A `stream` or `stream2d` sample window.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamType {
    /// Element type.
    pub base: Box<DataType>,
    /// Whether this is a two-dimensional stream.
    pub is_2d: bool,
    /// Window length.
    pub length: usize,
    /// Window height, 2-D streams only.
    pub height: usize,
    /// Line-buffer width, 2-D streams only.
    pub line_width: usize,
}

/// An external RAM or ROM.
#[derive(Debug, Clone, PartialEq)]
pub struct RamType {
    /// Word type; memories hold integers only.
    pub base: IntegerType,
    /// Number of words.
    pub length: usize,
    /// Whether the memory is read-only.
    pub is_rom: bool,
}

/// A resolved user structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureType {
    /// Structure name.
    pub name: String,
    /// Ordered members with their resolved types.
    pub members: Vec<(String, DataType)>,
}

/// Any concrete type.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Fixed-width integer.
    Integer(IntegerType),
    /// Fixed-length array.
    Array(ArrayType),
    /// Stream window.
    Stream(StreamType),
    /// External memory.
    Ram(RamType),
    /// User structure.
    Structure(StructureType),
}

impl DataType {
    /// Shorthand for an integer type.
    pub fn integer(width: usize, is_signed: bool) -> Self {
        DataType::Integer(IntegerType { width, is_signed })
    }

    /// User-friendly name, as it would be written in source.
    pub fn name(&self) -> String {
        match self {
            DataType::Integer(t) => {
                if t.is_signed {
                    format!("signed<{}>", t.width)
                } else {
                    format!("unsigned<{}>", t.width)
                }
            }
            DataType::Array(t) => format!("{}[{}]", t.base.name(), t.length),
            DataType::Stream(t) => {
                if t.is_2d {
                    format!(
                        "stream2d<{}, {}, {}, {}>",
                        t.base.name(),
                        t.length,
                        t.height,
                        t.line_width
                    )
                } else {
                    format!("stream<{}, {}>", t.base.name(), t.length)
                }
            }
            DataType::Ram(t) => {
                let kw = if t.is_rom { "rom" } else { "ram" };
                format!(
                    "{}<{}, {}>",
                    kw,
                    DataType::Integer(t.base.clone()).name(),
                    t.length
                )
            }
            DataType::Structure(t) => t.name.clone(),
        }
    }

    /// Width in bits: arrays flatten, structures sum, streams and memories
    /// report one element's width.
    pub fn width(&self) -> usize {
        match self {
            DataType::Integer(t) => t.width,
            DataType::Array(t) => t.length * t.base.width(),
            DataType::Stream(t) => t.base.width(),
            DataType::Ram(t) => t.base.width,
            DataType::Structure(t) => t.members.iter().map(|(_, m)| m.width()).sum(),
        }
    }

    /// Array dimension sizes; empty for scalars and structures.
    pub fn dimensions(&self) -> Vec<usize> {
        match self {
            DataType::Integer(_) | DataType::Structure(_) => Vec::new(),
            DataType::Array(t) => vec![t.length],
            DataType::Stream(t) => {
                if t.is_2d {
                    vec![t.length, t.height]
                } else {
                    vec![t.length]
                }
            }
            DataType::Ram(t) => vec![t.length],
        }
    }

    /// Element type of arrays, streams and memories.
    pub fn base_type(&self) -> EvalResult<DataType> {
        match self {
            DataType::Array(t) => Ok((*t.base).clone()),
            DataType::Stream(t) => Ok((*t.base).clone()),
            DataType::Ram(t) => Ok(DataType::Integer(t.base.clone())),
            _ => Err(EvalError::new(format!("{} has no base type", self.name()))),
        }
    }

    /// Type of a named structure member.
    pub fn member_type(&self, member: &str) -> EvalResult<DataType> {
        match self {
            DataType::Structure(t) => t
                .members
                .iter()
                .find(|(name, _)| name == member)
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| {
                    EvalError::new(format!(
                        "structure ==={}=== contains no member named ==={}===",
                        t.name, member
                    ))
                }),
            _ => Err(EvalError::new(format!(
                "{} has no member named {}",
                self.name(),
                member
            ))),
        }
    }

    /// The HDL port type carrying a value of this type: scalar integers map
    /// to numeric vectors, aggregates to a flat logic vector of the full
    /// width. Streams and memories have no single-port equivalent.
    pub fn hdl_type(&self) -> EvalResult<HdlPortType> {
        match self {
            DataType::Integer(t) => Ok(HdlPortType::Numeric {
                width: t.width,
                signed: t.is_signed,
            }),
            DataType::Array(_) | DataType::Structure(_) => {
                Ok(HdlPortType::LogicVector(self.width()))
            }
            DataType::Stream(_) | DataType::Ram(_) => Err(EvalError::new(format!(
                "{} has no HDL equivalent",
                self.name()
            ))),
        }
    }
}

/// Creates the default parameter lists used by [`BasicType`]. Lives here so
/// `template.rs` stays independent of concrete types.
impl TemplateParameter {
    /// An integer-valued parameter with `auto` value type.
    pub fn int(name: &str) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            was_specified: false,
            kind: TemplateParameterKind::Int {
                ty: TypeSpecId::AUTO,
                expr: ExprId::NULL,
            },
        }
    }

    /// A data-type-valued parameter.
    pub fn data_type(name: &str) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            was_specified: false,
            kind: TemplateParameterKind::DataType { value: None },
        }
    }
}
