//! The symbolic value graph produced by evaluation.
//!
//! An [`EvalObject`] is a purely functional expression node held in the
//! evaluator's arena. The capability contract (type query, constant
//! folding, subscripting, member access, assignment, state application,
//! push) is implemented as one exhaustive `match` per capability, with
//! explicit error arms for variants an operation does not apply to. Every
//! capability invoked on the null sentinel reports an internal error.

use crate::bitconst::{perform_const_operation, BitConstant};
use crate::error::{EvalError, EvalResult};
use crate::eval::vars::{EvalVarId, EvalVarKind};
use crate::eval::Evaluator;
use crate::ops::OperationType;
use crate::types::{ArrayType, DataType, IntegerType, StructureType};

/// Index of an eval object in the evaluator's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub usize);

impl ObjId {
    /// The process-wide null sentinel; every capability on it errors.
    pub const NULL: ObjId = ObjId(0);
}

/// Operations inferred by the evaluator rather than written by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialOperation {
    /// Ternary select: operands are selector, true value, false value.
    Cond,
    /// Dynamic array read: all children followed by the index.
    ArraySel,
    /// Conditional array element write: original value, new value, index.
    ArrayWrite,
}

/// One node of the symbolic value graph.
#[derive(Debug, Clone)]
pub enum EvalObject {
    /// The null sentinel.
    Null,
    /// A literal value.
    Constant(BitConstant),
    /// A reference to an evaluator variable.
    Variable(EvalVarId),
    /// A temporary array aggregate.
    Array {
        /// The aggregate's type.
        ty: ArrayType,
        /// Element values in index order.
        items: Vec<ObjId>,
    },
    /// A temporary structure aggregate.
    Struct {
        /// The aggregate's type.
        ty: StructureType,
        /// Member values in declaration order.
        items: Vec<(String, ObjId)>,
    },
    /// A width/signedness coercion.
    Cast {
        /// Target type.
        to: IntegerType,
        /// Coerced value.
        operand: ObjId,
    },
    /// An arithmetic, logic, comparison, shift or assignment operation.
    Operation {
        /// Which operation.
        op: OperationType,
        /// Operands in source order.
        operands: Vec<ObjId>,
    },
    /// A subscript expression, resolved against the base on read/write.
    ArrayAccess {
        /// Subscripted value.
        base: ObjId,
        /// Index values.
        indices: Vec<ObjId>,
    },
    /// A member access expression.
    StructAccess {
        /// Accessed value.
        base: ObjId,
        /// Member name.
        member: String,
    },
    /// A pipeline register barrier.
    Register {
        /// Registered value.
        input: ObjId,
    },
    /// An inferred operation such as conditional select.
    Special {
        /// Which special operation.
        op: SpecialOperation,
        /// Operands; meaning depends on `op`.
        operands: Vec<ObjId>,
        /// Constant parameters; meaning depends on `op`.
        params: Vec<BitConstant>,
    },
    /// A value the program never observes; any value may be driven.
    DontCare(DataType),
}

impl<'a> Evaluator<'a> {
    /// Adds an object to the arena, returning its id.
    pub fn alloc_obj(&mut self, obj: EvalObject) -> ObjId {
        self.objects.push(obj);
        ObjId(self.objects.len() - 1)
    }

    /// The object behind an id.
    pub fn obj(&self, id: ObjId) -> &EvalObject {
        &self.objects[id.0]
    }

    fn obj_cloned(&self, id: ObjId) -> EvalObject {
        self.objects[id.0].clone()
    }

    /// A short identifier for diagnostics.
    pub fn obj_label(&self, id: ObjId) -> String {
        match self.obj(id) {
            EvalObject::Null => "null".to_string(),
            EvalObject::Constant(_) => format!("const_{}", id.0),
            EvalObject::Variable(v) => format!("eval_var_{}_{}", self.var(*v).name, id.0),
            EvalObject::Struct { .. } => format!("temp_struct_{}", id.0),
            EvalObject::Array { .. } => format!("temp_array_{}", id.0),
            EvalObject::Operation { .. } => format!("oper_{}", id.0),
            _ => format!("eval_{}", id.0),
        }
    }

    fn null_error(&self) -> EvalError {
        EvalError::internal("null in evaluation tree")
    }

    /// Direct children of a node, for traversal.
    pub fn operands(&self, id: ObjId) -> Vec<ObjId> {
        match self.obj(id) {
            EvalObject::Array { items, .. } => items.clone(),
            EvalObject::Struct { items, .. } => items.iter().map(|&(_, o)| o).collect(),
            EvalObject::Cast { operand, .. } => vec![*operand],
            EvalObject::Operation { operands, .. } => operands.clone(),
            EvalObject::ArrayAccess { base, indices } => {
                let mut out = vec![*base];
                out.extend(indices);
                out
            }
            EvalObject::StructAccess { base, .. } => vec![*base],
            EvalObject::Register { input } => vec![*input],
            EvalObject::Special { operands, .. } => operands.clone(),
            _ => Vec::new(),
        }
    }

    /// The concrete type of a value, when determinable.
    pub fn data_type(&mut self, id: ObjId) -> EvalResult<DataType> {
        match self.obj_cloned(id) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Constant(c) => Ok(DataType::integer(c.width(), c.is_signed)),
            EvalObject::Variable(v) => Ok(self.var(v).ty.clone()),
            EvalObject::Array { ty, .. } => Ok(DataType::Array(ty)),
            EvalObject::Struct { ty, .. } => Ok(DataType::Structure(ty)),
            EvalObject::Cast { to, .. } => Ok(DataType::Integer(to)),
            EvalObject::Operation { op, operands } => {
                if self.non_numeric_allowed(op, &operands) {
                    return self.data_type(operands[1]);
                }
                let mut widths = Vec::with_capacity(operands.len());
                let mut signed = false;
                let mut constants = Vec::with_capacity(operands.len());
                for &operand in &operands {
                    match self.data_type(operand)? {
                        DataType::Integer(it) => {
                            widths.push(it.width);
                            signed |= it.is_signed;
                        }
                        _ => {
                            return Err(EvalError::new(format!(
                                "all operands of operator {} must be numeric and scalar",
                                op.token()
                            )))
                        }
                    }
                    constants.push(self.fold_constant(operand).ok());
                }
                let const_refs: Vec<Option<&BitConstant>> =
                    constants.iter().map(Option::as_ref).collect();
                let width = crate::ops::result_width(&widths, op, &const_refs)?;
                Ok(DataType::integer(width, signed))
            }
            EvalObject::ArrayAccess { base, .. } => self.data_type(base)?.base_type(),
            EvalObject::StructAccess { base, member } => {
                self.data_type(base)?.member_type(&member)
            }
            EvalObject::Register { input } => self.data_type(input),
            EvalObject::Special { op, operands, .. } => match op {
                SpecialOperation::Cond => self.data_type(operands[1]),
                _ => Err(EvalError::internal(format!(
                    "special operation {op:?} has no data type"
                ))),
            },
            EvalObject::DontCare(ty) => Ok(ty),
        }
    }

    /// Folds a scalar value to its constant, or errors if any leaf is not
    /// compile-time constant.
    pub fn fold_constant(&mut self, id: ObjId) -> EvalResult<BitConstant> {
        match self.obj_cloned(id) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Constant(c) => Ok(c),
            EvalObject::Variable(v) => {
                if self.var(v).dir.is_input {
                    Err(EvalError::new(format!(
                        "input (top-level or internal) variable ==={}=== cannot be used as a constant",
                        self.var(v).name
                    )))
                } else {
                    let value = self.value_for(v);
                    if value == id {
                        return Err(EvalError::internal("self-referential variable value"));
                    }
                    self.fold_constant(value)
                }
            }
            EvalObject::Cast { to, operand } => {
                Ok(self.fold_constant(operand)?.cast(to.width, to.is_signed))
            }
            EvalObject::Operation { op, operands } => {
                if op.is_assignment() {
                    return Err(EvalError::new(
                        "assignment type operation does not have const value",
                    ));
                }
                let mut consts = Vec::with_capacity(operands.len());
                for &operand in &operands {
                    consts.push(self.fold_constant(operand)?);
                }
                perform_const_operation(&consts, op)
            }
            EvalObject::Register { input } => self.fold_constant(input),
            EvalObject::Special { op, operands, .. } => match op {
                SpecialOperation::Cond => {
                    let selector = self.fold_constant(operands[0])?;
                    let branch = if selector.any_set() {
                        operands[1]
                    } else {
                        operands[2]
                    };
                    self.fold_constant(branch)
                }
                _ => Err(EvalError::new(format!(
                    "==={}=== not a constant",
                    self.obj_label(id)
                ))),
            },
            EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => {
                let resolved = self.value_of(id)?;
                if resolved == id {
                    return Err(EvalError::new(format!(
                        "==={}=== not a constant",
                        self.obj_label(id)
                    )));
                }
                self.fold_constant(resolved)
            }
            _ => Err(EvalError::new(format!(
                "==={}=== not a constant",
                self.obj_label(id)
            ))),
        }
    }

    /// Whether the value folds to a compile-time constant.
    pub fn has_constant_value(&mut self, id: ObjId) -> bool {
        match self.obj_cloned(id) {
            EvalObject::Constant(_) => true,
            EvalObject::Array { .. } | EvalObject::Struct { .. } => {
                let children = self.operands(id);
                children.into_iter().all(|o| self.has_constant_value(o))
            }
            _ => self.fold_constant(id).is_ok(),
        }
    }

    /// The fully folded constant form of a value; aggregates fold per
    /// element. Errors if anything is not constant.
    pub fn constant_value(&mut self, id: ObjId) -> EvalResult<ObjId> {
        match self.obj_cloned(id) {
            EvalObject::Constant(_) => Ok(id),
            EvalObject::Array { ty, items } => {
                let mut folded = Vec::with_capacity(items.len());
                for item in items {
                    folded.push(self.constant_value(item)?);
                }
                Ok(self.alloc_obj(EvalObject::Array { ty, items: folded }))
            }
            EvalObject::Struct { ty, items } => {
                let mut folded = Vec::with_capacity(items.len());
                for (name, item) in items {
                    folded.push((name, self.constant_value(item)?));
                }
                Ok(self.alloc_obj(EvalObject::Struct { ty, items: folded }))
            }
            _ => {
                let value = self.fold_constant(id)?;
                Ok(self.alloc_obj(EvalObject::Constant(value)))
            }
        }
    }

    /// The scalar constant value; errors on aggregates and non-constants.
    pub fn scalar_const_value(&mut self, id: ObjId) -> EvalResult<BitConstant> {
        self.fold_constant(id)
    }

    /// Whether a push (`<<`) can target this object.
    pub fn can_push_into(&self, id: ObjId) -> bool {
        match self.obj(id) {
            EvalObject::Variable(v) => {
                matches!(self.var(*v).kind, EvalVarKind::Stream { .. })
            }
            _ => false,
        }
    }

    /// Pushes a value into a stream-like object.
    pub fn apply_push_into(&mut self, id: ObjId, value: ObjId) -> EvalResult<()> {
        match self.obj_cloned(id) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => self.handle_push(v, value),
            _ => Err(EvalError::new(format!(
                "==={}=== cannot be pushed into",
                self.obj_label(id)
            ))),
        }
    }

    fn non_numeric_allowed(&self, op: OperationType, operands: &[ObjId]) -> bool {
        op == OperationType::Assign
            || (op == OperationType::Shl && self.can_push_into(operands[0]))
    }

    /// The result of an operation over operand values, ignoring side
    /// effects: compound assignments reduce to their base operation,
    /// increments to add/subtract one, and fully constant operations fold.
    pub fn operation_result(&mut self, op: OperationType, operands: &[ObjId]) -> EvalResult<ObjId> {
        use OperationType::*;
        if self.non_numeric_allowed(op, operands) {
            return self.value_of(operands[1]);
        }
        let mut values = Vec::with_capacity(operands.len());
        for &operand in operands {
            values.push(self.value_of(operand)?);
        }
        if op.is_assignment() {
            return match op {
                Assign => Ok(values[1]),
                AddAssign => self.operation_result(Add, &values),
                SubAssign => self.operation_result(Sub, &values),
                MulAssign => self.operation_result(Mul, &values),
                DivAssign => self.operation_result(Div, &values),
                ModAssign => self.operation_result(Mod, &values),
                OrAssign => self.operation_result(BwOr, &values),
                AndAssign => self.operation_result(BwAnd, &values),
                XorAssign => self.operation_result(BwXor, &values),
                ShlAssign => self.operation_result(Shl, &values),
                ShrAssign => self.operation_result(Shr, &values),
                PostInc | PostDec => Ok(values[0]),
                PreInc => {
                    let one = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(1)));
                    self.operation_result(Add, &[values[0], one])
                }
                PreDec => {
                    let one = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(1)));
                    self.operation_result(Sub, &[values[0], one])
                }
                _ => Err(EvalError::new("unknown assignment type operation")),
            };
        }
        // fold eagerly when every operand is constant, so unrolled loop
        // counters stay literal
        if values.iter().all(|&v| self.has_constant_value(v)) {
            let mut consts = Vec::with_capacity(values.len());
            for &v in &values {
                consts.push(self.fold_constant(v)?);
            }
            let folded = perform_const_operation(&consts, op)?;
            return Ok(self.alloc_obj(EvalObject::Constant(folded)));
        }
        Ok(self.alloc_obj(EvalObject::Operation {
            op,
            operands: values,
        }))
    }

    /// The effective r-value of an object: variables dereference to their
    /// current value, operations compute over operand values, access nodes
    /// resolve against their base.
    pub fn value_of(&mut self, id: ObjId) -> EvalResult<ObjId> {
        match self.obj_cloned(id) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Constant(_)
            | EvalObject::Array { .. }
            | EvalObject::Struct { .. }
            | EvalObject::Special { .. }
            | EvalObject::DontCare(_) => Ok(id),
            EvalObject::Variable(v) => {
                let value = self.handle_read(v)?;
                // a stored value may itself be a reference (argument
                // binding); chase it, stopping at input self-references
                let chase = matches!(self.obj(value), EvalObject::Variable(other) if *other != v);
                if chase {
                    self.value_of(value)
                } else {
                    Ok(value)
                }
            }
            EvalObject::Cast { to, operand } => {
                let value = self.value_of(operand)?;
                if value == operand {
                    Ok(id)
                } else {
                    Ok(self.alloc_obj(EvalObject::Cast { to, operand: value }))
                }
            }
            EvalObject::Operation { op, operands } => self.operation_result(op, &operands),
            EvalObject::ArrayAccess { base, indices } => {
                let mut index_values = Vec::with_capacity(indices.len());
                for index in indices {
                    index_values.push(self.value_of(index)?);
                }
                self.subscript_read(base, &index_values)
            }
            EvalObject::StructAccess { base, member } => self.member_read(base, &member),
            EvalObject::Register { input } => {
                let value = self.value_of(input)?;
                Ok(self.alloc_obj(EvalObject::Register { input: value }))
            }
        }
    }

    /// Applies side effects (assignments, pushes) and returns the
    /// resulting value.
    pub fn apply_to_state(&mut self, id: ObjId) -> EvalResult<ObjId> {
        use OperationType::*;
        match self.obj_cloned(id) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Operation { op, operands } => {
                let mut applied = Vec::with_capacity(operands.len());
                for operand in operands {
                    applied.push(self.apply_to_state(operand)?);
                }
                if op == Shl && self.can_push_into(applied[0]) {
                    let value = self.value_of(applied[1])?;
                    self.apply_push_into(applied[0], value)?;
                    return Ok(value);
                }
                if op == Assign {
                    let value = self.value_of(applied[1])?;
                    self.assign(applied[0], value)?;
                    return Ok(value);
                }
                if op.is_assignment() {
                    let result = self.operation_result(op, &applied)?;
                    match op {
                        PostInc => {
                            let incremented = self.operation_result(PreInc, &applied)?;
                            self.assign(applied[0], incremented)?;
                        }
                        PostDec => {
                            let decremented = self.operation_result(PreDec, &applied)?;
                            self.assign(applied[0], decremented)?;
                        }
                        _ => self.assign(applied[0], result)?,
                    }
                    return Ok(result);
                }
                Ok(self.alloc_obj(EvalObject::Operation {
                    op,
                    operands: applied,
                }))
            }
            EvalObject::ArrayAccess { base, indices } => {
                let base = self.apply_to_state(base)?;
                let mut applied = Vec::with_capacity(indices.len());
                for index in indices {
                    applied.push(self.apply_to_state(index)?);
                }
                Ok(self.alloc_obj(EvalObject::ArrayAccess {
                    base,
                    indices: applied,
                }))
            }
            EvalObject::StructAccess { base, member } => {
                let base = self.apply_to_state(base)?;
                Ok(self.alloc_obj(EvalObject::StructAccess { base, member }))
            }
            EvalObject::Cast { to, operand } => {
                let operand = self.apply_to_state(operand)?;
                Ok(self.alloc_obj(EvalObject::Cast { to, operand }))
            }
            EvalObject::Register { input } => {
                let input = self.apply_to_state(input)?;
                Ok(self.alloc_obj(EvalObject::Register { input }))
            }
            _ => Ok(id),
        }
    }

    /// Assigns `value` to an assignable object.
    pub fn assign(&mut self, target: ObjId, value: ObjId) -> EvalResult<()> {
        match self.obj_cloned(target) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => self.handle_write(v, value),
            EvalObject::ArrayAccess { base, indices } => {
                let mut index_values = Vec::with_capacity(indices.len());
                for index in indices {
                    index_values.push(self.value_of(index)?);
                }
                self.subscript_write(base, &index_values, value)
            }
            EvalObject::StructAccess { base, member } => {
                self.member_write(base, &member, value)
            }
            _ => Err(EvalError::new(format!(
                "==={}=== cannot be assigned to",
                self.obj_label(target)
            ))),
        }
    }

    fn constant_subscript_offset(
        &mut self,
        name: &str,
        dims: &[usize],
        indices: &[ObjId],
    ) -> EvalResult<usize> {
        if indices.len() != dims.len() {
            return Err(EvalError::new(format!(
                "dimensionality mismatch for variable ==={name}==="
            )));
        }
        let mut offset = 0usize;
        let mut last_dim = 1usize;
        for (i, &index) in indices.iter().enumerate() {
            if !self.has_constant_value(index) {
                return Err(EvalError::new(
                    "non-constant array indices are not yet implemented",
                ));
            }
            offset *= last_dim;
            let value = self.scalar_const_value(index)?.int_value();
            last_dim = dims[i];
            if value >= 0 && (value as usize) < last_dim {
                offset += value as usize;
            } else {
                return Err(EvalError::new(format!(
                    "array index out of bounds for variable ==={name}==="
                )));
            }
        }
        Ok(offset)
    }

    /// Reads `base[indices]`.
    pub fn subscript_read(&mut self, base: ObjId, indices: &[ObjId]) -> EvalResult<ObjId> {
        match self.obj_cloned(base) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => {
                if self.var(v).is_non_trivial_access() {
                    return self.handle_subscripted_read(v, indices);
                }
                let name = self.var(v).name.clone();
                let dims = self.var(v).ty.dimensions();
                let offset = self.constant_subscript_offset(&name, &dims, indices)?;
                let children = self.array_children(v);
                Ok(self.alloc_obj(EvalObject::Variable(children[offset])))
            }
            EvalObject::Array { items, .. } => {
                if indices.len() != 1 {
                    return Err(EvalError::new(format!(
                        "dimensionality mismatch for ==={}===",
                        self.obj_label(base)
                    )));
                }
                let offset =
                    self.constant_subscript_offset("temporary array", &[items.len()], indices)?;
                Ok(items[offset])
            }
            EvalObject::DontCare(ty) => {
                let base_ty = ty.base_type()?;
                Ok(self.alloc_obj(EvalObject::DontCare(base_ty)))
            }
            EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => {
                let resolved = self.value_of(base)?;
                if resolved == base {
                    return Err(EvalError::new(format!(
                        "==={}=== not an array or array-like type",
                        self.obj_label(base)
                    )));
                }
                self.subscript_read(resolved, indices)
            }
            _ => Err(EvalError::new(format!(
                "==={}=== not an array or array-like type",
                self.obj_label(base)
            ))),
        }
    }

    /// Writes `value` into `base[indices]`.
    pub fn subscript_write(
        &mut self,
        base: ObjId,
        indices: &[ObjId],
        value: ObjId,
    ) -> EvalResult<()> {
        match self.obj_cloned(base) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => {
                if self.var(v).is_non_trivial_access() {
                    return self.handle_subscripted_write(v, indices, value);
                }
                let name = self.var(v).name.clone();
                let dims = self.var(v).ty.dimensions();
                let offset = self.constant_subscript_offset(&name, &dims, indices)?;
                let children = self.array_children(v);
                self.handle_write(children[offset], value)
            }
            EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => {
                let resolved = self.value_of(base)?;
                if resolved == base {
                    return Err(EvalError::new(format!(
                        "==={}=== not an array or array-like type",
                        self.obj_label(base)
                    )));
                }
                self.subscript_write(resolved, indices, value)
            }
            EvalObject::Array { .. } => Err(EvalError::new("cannot assign to temporary array")),
            _ => Err(EvalError::new(format!(
                "==={}=== not an array or array-like type",
                self.obj_label(base)
            ))),
        }
    }

    /// Reads `base.member`.
    pub fn member_read(&mut self, base: ObjId, member: &str) -> EvalResult<ObjId> {
        match self.obj_cloned(base) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => {
                let child = self.child_by_name(v, member)?;
                Ok(self.alloc_obj(EvalObject::Variable(child)))
            }
            EvalObject::Struct { ty, items } => items
                .iter()
                .find(|(name, _)| name == member)
                .map(|&(_, o)| o)
                .ok_or_else(|| {
                    EvalError::new(format!(
                        "structure type ==={}=== does not contain member ==={member}===",
                        ty.name
                    ))
                }),
            EvalObject::DontCare(ty) => {
                let member_ty = ty.member_type(member)?;
                Ok(self.alloc_obj(EvalObject::DontCare(member_ty)))
            }
            EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => {
                let resolved = self.value_of(base)?;
                if resolved == base {
                    return Err(EvalError::new(format!(
                        "==={}=== not of structure type",
                        self.obj_label(base)
                    )));
                }
                self.member_read(resolved, member)
            }
            _ => Err(EvalError::new(format!(
                "==={}=== not of structure type",
                self.obj_label(base)
            ))),
        }
    }

    /// Writes `value` into `base.member`.
    pub fn member_write(&mut self, base: ObjId, member: &str, value: ObjId) -> EvalResult<()> {
        match self.obj_cloned(base) {
            EvalObject::Null => Err(self.null_error()),
            EvalObject::Variable(v) => {
                let child = self.child_by_name(v, member)?;
                self.handle_write(child, value)
            }
            EvalObject::ArrayAccess { .. } | EvalObject::StructAccess { .. } => {
                let resolved = self.value_of(base)?;
                if resolved == base {
                    return Err(EvalError::new(format!(
                        "==={}=== not of structure type",
                        self.obj_label(base)
                    )));
                }
                self.member_write(resolved, member, value)
            }
            EvalObject::Struct { .. } => {
                Err(EvalError::new("cannot assign to temporary struct"))
            }
            _ => Err(EvalError::new(format!(
                "==={}=== not of structure type",
                self.obj_label(base)
            ))),
        }
    }

    /// Reads a variable's effective value: aggregates gather their
    /// children, memories refuse unaddressed reads.
    pub fn handle_read(&mut self, v: EvalVarId) -> EvalResult<ObjId> {
        match &self.variables[v.0].kind {
            EvalVarKind::Scalar { .. } | EvalVarKind::Stream { .. } => Ok(self.value_for(v)),
            EvalVarKind::Array { items } => {
                let items = items.clone();
                let ty = match &self.var(v).ty {
                    DataType::Array(arr) => arr.clone(),
                    other => {
                        return Err(EvalError::internal(format!(
                            "array variable with non-array type {}",
                            other.name()
                        )))
                    }
                };
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.handle_read(item)?);
                }
                Ok(self.alloc_obj(EvalObject::Array { ty, items: values }))
            }
            EvalVarKind::Structure { members } => {
                let members = members.clone();
                let ty = match &self.var(v).ty {
                    DataType::Structure(st) => st.clone(),
                    other => {
                        return Err(EvalError::internal(format!(
                            "structure variable with non-structure type {}",
                            other.name()
                        )))
                    }
                };
                let mut values = Vec::with_capacity(members.len());
                for (name, member) in members {
                    values.push((name, self.handle_read(member)?));
                }
                Ok(self.alloc_obj(EvalObject::Struct { ty, items: values }))
            }
            EvalVarKind::Memory { .. } => Err(EvalError::new(format!(
                "memory ==={}=== must always be addressed",
                self.var(v).name
            ))),
        }
    }

    /// Writes a variable: static scalars redirect through their write
    /// ports, aggregates decompose element-wise, register-qualified
    /// variables interpose a pipeline register.
    pub fn handle_write(&mut self, v: EvalVarId, value: ObjId) -> EvalResult<()> {
        let value = if self.var(v).is_register {
            self.alloc_obj(EvalObject::Register { input: value })
        } else {
            value
        };
        match &self.variables[v.0].kind {
            EvalVarKind::Scalar {
                is_static: true,
                write_enable,
                written_value,
            } => {
                let wren = (*write_enable).expect("static scalar has a write enable");
                let wrval = (*written_value).expect("static scalar has a written value");
                self.set_variable_value(wrval, value)?;
                let one = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(1)));
                self.set_variable_value(wren, one)
            }
            EvalVarKind::Scalar { .. } => self.set_variable_value(v, value),
            EvalVarKind::Array { items } => {
                let items = items.clone();
                for (i, item) in items.into_iter().enumerate() {
                    let index = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(i as i64)));
                    let element = self.subscript_read(value, &[index])?;
                    self.handle_write(item, element)?;
                }
                Ok(())
            }
            EvalVarKind::Structure { members } => {
                let members = members.clone();
                for (name, member) in members {
                    let element = self.member_read(value, &name)?;
                    self.handle_write(member, element)?;
                }
                Ok(())
            }
            EvalVarKind::Memory { .. } => Err(EvalError::new(format!(
                "memory ==={}=== must always be addressed",
                self.var(v).name
            ))),
            EvalVarKind::Stream { .. } => Err(EvalError::new(format!(
                "cannot assign to stream ==={}===, use operator<< instead",
                self.var(v).name
            ))),
        }
    }

    /// Subscripted read on a port-protocol variable: drives the address
    /// and returns the read-data port.
    pub fn handle_subscripted_read(
        &mut self,
        v: EvalVarId,
        indices: &[ObjId],
    ) -> EvalResult<ObjId> {
        match &self.variables[v.0].kind {
            EvalVarKind::Memory { address, q, .. } => {
                let (address, q) = (*address, *q);
                if indices.len() != 1 {
                    return Err(EvalError::new(format!(
                        "invalid dimensions for access to variable ==={}===",
                        self.var(v).name
                    )));
                }
                self.set_variable_value(address, indices[0])?;
                Ok(self.alloc_obj(EvalObject::Variable(q)))
            }
            _ => Err(EvalError::new(format!(
                "subscripted read not supported for variable ==={}===",
                self.var(v).name
            ))),
        }
    }

    /// Subscripted write on a port-protocol variable: drives address,
    /// write-enable and data.
    pub fn handle_subscripted_write(
        &mut self,
        v: EvalVarId,
        indices: &[ObjId],
        value: ObjId,
    ) -> EvalResult<()> {
        match &self.variables[v.0].kind {
            EvalVarKind::Memory {
                is_rom,
                address,
                write_enable,
                data,
                ..
            } => {
                if *is_rom {
                    return Err(EvalError::new(format!(
                        "cannot write to ROM type variable ==={}===",
                        self.var(v).name
                    )));
                }
                let (address, wren, data) = (
                    *address,
                    (*write_enable).expect("writable memory has a write enable"),
                    (*data).expect("writable memory has a data port"),
                );
                if indices.len() != 1 {
                    return Err(EvalError::new(format!(
                        "invalid dimensions for access to variable ==={}===",
                        self.var(v).name
                    )));
                }
                self.set_variable_value(address, indices[0])?;
                let one = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(1)));
                self.set_variable_value(wren, one)?;
                self.set_variable_value(data, value)
            }
            _ => Err(EvalError::new(format!(
                "subscripted write not supported for variable ==={}===",
                self.var(v).name
            ))),
        }
    }

    /// Push (`<<`) into a stream: asserts the push strobe and routes the
    /// value to the push target.
    pub fn handle_push(&mut self, v: EvalVarId, value: ObjId) -> EvalResult<()> {
        match &self.variables[v.0].kind {
            EvalVarKind::Stream {
                written_value,
                write_enable,
                ..
            } => {
                let (wrval, wren) = (*written_value, *write_enable);
                let one = self.alloc_obj(EvalObject::Constant(BitConstant::from_int(1)));
                self.set_variable_value(wren, one)?;
                self.set_variable_value(wrval, value)
            }
            _ => Err(EvalError::new(format!(
                "push (operator<<) not supported for variable ==={}===",
                self.var(v).name
            ))),
        }
    }
}
