//! The operation set shared by the parser, constant folder and netlist
//! generator: token spellings, precedence, arity and result-width rules.

use crate::bitconst::BitConstant;
use crate::error::{EvalError, EvalResult};

/// Every operation the expression parser can produce. Division and modulo
/// exist so the parser can name them in diagnostics, but they are rejected
/// by constant folding and synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (never synthesised)
    Div,
    /// `%` (never synthesised)
    Mod,
    /// `<<` (also the stream push operator)
    Shl,
    /// `>>`
    Shr,
    /// `|`
    BwOr,
    /// `&`
    BwAnd,
    /// `^`
    BwXor,
    /// `||`
    LOr,
    /// `&&`
    LAnd,
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=` (never synthesised)
    DivAssign,
    /// `%=` (never synthesised)
    ModAssign,
    /// `|=`
    OrAssign,
    /// `&=`
    AndAssign,
    /// `^=`
    XorAssign,
    /// `<<=`
    ShlAssign,
    /// `>>=`
    ShrAssign,
    /// Unary `-`
    Minus,
    /// Postfix `++`
    PostInc,
    /// Prefix `++`
    PreInc,
    /// Postfix `--`
    PostDec,
    /// Prefix `--`
    PreDec,
    /// Unary `~`
    BwNot,
    /// Unary `!`
    LNot,
}

impl OperationType {
    /// The source token for this operation.
    pub fn token(self) -> &'static str {
        lookup_operation(self).token
    }

    /// True for plain and compound assignments and increments/decrements.
    pub fn is_assignment(self) -> bool {
        lookup_operation(self).is_assignment
    }
}

/// Parser-facing description of one operation.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    /// The operation this entry describes.
    pub ty: OperationType,
    /// Token text.
    pub token: &'static str,
    /// Precedence; lower binds tighter.
    pub precedence: u8,
    /// Number of operands, 1 or 2.
    pub num_params: u8,
    /// Right associativity flag for the shunting yard.
    pub right_associative: bool,
    /// Whether the operation writes its first operand.
    pub is_assignment: bool,
}

const fn op(
    ty: OperationType,
    token: &'static str,
    precedence: u8,
    num_params: u8,
    right_associative: bool,
    is_assignment: bool,
) -> Operation {
    Operation {
        ty,
        token,
        precedence,
        num_params,
        right_associative,
        is_assignment,
    }
}

/// Postfix unary operators (searched together with the binary table).
pub const UNARY_POSTFIX_OPERATIONS: &[Operation] = &[
    op(OperationType::PostInc, "++", 2, 1, false, true),
    op(OperationType::PostDec, "--", 2, 1, false, true),
];

/// Prefix unary operators, only legal where an operand is expected.
pub const UNARY_PREFIX_OPERATIONS: &[Operation] = &[
    op(OperationType::BwNot, "~", 3, 1, true, false),
    op(OperationType::LNot, "!", 3, 1, true, false),
    op(OperationType::PreInc, "++", 3, 1, true, true),
    op(OperationType::PreDec, "--", 3, 1, true, true),
    op(OperationType::Minus, "-", 3, 1, true, false),
];

/// Binary operators.
pub const BINARY_OPERATIONS: &[Operation] = &[
    op(OperationType::Mul, "*", 5, 2, false, false),
    op(OperationType::Div, "/", 5, 2, false, false),
    op(OperationType::Mod, "%", 5, 2, false, false),
    op(OperationType::Add, "+", 6, 2, false, false),
    op(OperationType::Sub, "-", 6, 2, false, false),
    op(OperationType::Shl, "<<", 7, 2, false, false),
    op(OperationType::Shr, ">>", 7, 2, false, false),
    op(OperationType::Lt, "<", 8, 2, false, false),
    op(OperationType::Lte, "<=", 8, 2, false, false),
    op(OperationType::Gt, ">", 8, 2, false, false),
    op(OperationType::Gte, ">=", 8, 2, false, false),
    op(OperationType::Eq, "==", 9, 2, false, false),
    op(OperationType::Neq, "!=", 9, 2, false, false),
    op(OperationType::BwAnd, "&", 10, 2, false, false),
    op(OperationType::BwXor, "^", 11, 2, false, false),
    op(OperationType::BwOr, "|", 12, 2, false, false),
    op(OperationType::LAnd, "&&", 13, 2, false, false),
    op(OperationType::LOr, "||", 14, 2, false, false),
    op(OperationType::Assign, "=", 15, 2, true, true),
    op(OperationType::AddAssign, "+=", 15, 2, true, true),
    op(OperationType::SubAssign, "-=", 15, 2, true, true),
    op(OperationType::MulAssign, "*=", 15, 2, true, true),
    op(OperationType::DivAssign, "/=", 15, 2, true, true),
    op(OperationType::ModAssign, "%=", 15, 2, true, true),
    op(OperationType::ShlAssign, "<<=", 15, 2, true, true),
    op(OperationType::ShrAssign, ">>=", 15, 2, true, true),
    op(OperationType::AndAssign, "&=", 15, 2, true, true),
    op(OperationType::XorAssign, "^=", 15, 2, true, true),
    op(OperationType::OrAssign, "|=", 15, 2, true, true),
];

/// Looks up the table entry for an operation.
pub fn lookup_operation(ty: OperationType) -> &'static Operation {
    UNARY_POSTFIX_OPERATIONS
        .iter()
        .chain(UNARY_PREFIX_OPERATIONS)
        .chain(BINARY_OPERATIONS)
        .find(|o| o.ty == ty)
        .expect("operation table covers every OperationType")
}

/// Width of the result of an operation on scalar operands. `constants[i]` is
/// the known constant value of operand `i`, when there is one; shifts by a
/// known amount produce exact widths.
pub fn result_width(
    in_widths: &[usize],
    oper: OperationType,
    constants: &[Option<&BitConstant>],
) -> EvalResult<usize> {
    use OperationType::*;
    match oper {
        Add | Sub => Ok(in_widths[0].max(in_widths[1]) + 1),
        Mul => Ok(in_widths[0] + in_widths[1]),
        Shl => match constants.get(1).copied().flatten() {
            Some(amount) => Ok(in_widths[0] + amount.int_value().max(0) as usize),
            None => Ok(in_widths[0].max(in_widths[1])),
        },
        Shr => match constants.get(1).copied().flatten() {
            Some(amount) => {
                Ok((in_widths[0] as i64 - amount.int_value()).max(1) as usize)
            }
            None => Ok(in_widths[0].max(in_widths[1])),
        },
        BwOr | BwAnd | BwXor => Ok(in_widths[0].max(in_widths[1])),
        LOr | LAnd | Eq | Neq | Gt | Gte | Lt | Lte | LNot => Ok(1),
        Minus | BwNot => Ok(in_widths[0]),
        Div | Mod => Err(EvalError::new(
            "division and modulo are not synthesisable; rewrite using shifts and multiplies",
        )),
        _ => Err(EvalError::internal(format!(
            "operation {} has no result width",
            oper.token()
        ))),
    }
}
