//! Template parameters: the compile-time arguments bound when a parametric
//! type, structure or function is instantiated.
//!
//! A parameter list is cloned whenever a declaration is instantiated, with
//! values reset, and then filled positionally by the `<...>` argument
//! parser. Values are evaluated lazily by the evaluator against its current
//! template-parameter context.

use crate::ast::{ContextRef, ExprId, TypeSpecId};

/// One template parameter with its bound value, if any.
#[derive(Debug, Clone)]
pub struct TemplateParameter {
    /// Parameter name, used for lookup from expressions.
    pub name: String,
    /// Whether an argument was written for this parameter.
    pub was_specified: bool,
    /// Kind and value storage.
    pub kind: TemplateParameterKind,
}

/// The kinds of template parameter and their bound values.
#[derive(Debug, Clone)]
pub enum TemplateParameterKind {
    /// An integer constant.
    Int {
        /// Declared value type, `auto` when unconstrained.
        ty: TypeSpecId,
        /// Bound argument expression.
        expr: ExprId,
    },
    /// A typed arbitrary-width constant.
    BitConstant {
        /// Declared value type.
        ty: TypeSpecId,
        /// Bound argument expression.
        expr: ExprId,
    },
    /// A bare string token.
    String {
        /// Bound value.
        value: String,
    },
    /// One of a fixed set of allowed tokens.
    Selector {
        /// Allowed values, in order.
        allowed: Vec<String>,
        /// Index of the bound value in `allowed`.
        index: usize,
    },
    /// A data type.
    DataType {
        /// Bound type specifier.
        value: Option<TypeSpecId>,
    },
}

impl TemplateParameter {
    /// A typed constant parameter, as declared in `template<TYPE NAME>`
    /// lists.
    pub fn bit_constant(name: &str, ty: TypeSpecId) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            was_specified: false,
            kind: TemplateParameterKind::BitConstant {
                ty,
                expr: ExprId::NULL,
            },
        }
    }

    /// A selector parameter over a fixed token set.
    pub fn selector(name: &str, allowed: Vec<String>) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            was_specified: false,
            kind: TemplateParameterKind::Selector { allowed, index: 0 },
        }
    }

    /// A string parameter.
    pub fn string(name: &str) -> TemplateParameter {
        TemplateParameter {
            name: name.to_string(),
            was_specified: false,
            kind: TemplateParameterKind::String {
                value: String::new(),
            },
        }
    }

    /// Clones the parameter, dropping any bound value so a fresh
    /// instantiation can fill it.
    pub fn clone_reset(&self) -> TemplateParameter {
        let kind = match &self.kind {
            TemplateParameterKind::Int { ty, .. } => TemplateParameterKind::Int {
                ty: *ty,
                expr: ExprId::NULL,
            },
            TemplateParameterKind::BitConstant { ty, .. } => TemplateParameterKind::BitConstant {
                ty: *ty,
                expr: ExprId::NULL,
            },
            TemplateParameterKind::String { .. } => TemplateParameterKind::String {
                value: String::new(),
            },
            TemplateParameterKind::Selector { allowed, .. } => TemplateParameterKind::Selector {
                allowed: allowed.clone(),
                index: 0,
            },
            TemplateParameterKind::DataType { .. } => {
                TemplateParameterKind::DataType { value: None }
            }
        };
        TemplateParameter {
            name: self.name.clone(),
            was_specified: false,
            kind,
        }
    }
}

/// Clones a parameter set with values reset, for a fresh instantiation.
pub fn clone_parameter_set(params: &[TemplateParameter]) -> Vec<TemplateParameter> {
    params.iter().map(TemplateParameter::clone_reset).collect()
}

/// A reference to a template-parameter frame in the evaluator; frames form
/// an index-linked list rather than a pointer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpId(pub usize);

impl TpId {
    /// The root frame, attached to the global scope with no parameters.
    pub const ROOT: TpId = TpId(0);
}

/// One frame of the template-parameter context list.
#[derive(Debug, Clone)]
pub struct TpFrame {
    /// Enclosing frame, `None` at the root.
    pub parent: Option<TpId>,
    /// The scope whose parameters this frame binds.
    pub context: ContextRef,
    /// The bound parameters.
    pub params: Vec<TemplateParameter>,
}
