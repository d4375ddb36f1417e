//! The single-cycle symbolic evaluator.
//!
//! Evaluation executes the AST at compile time: loops unroll against
//! constant conditions, function calls inline through call frames,
//! template parameters resolve through an index-linked context list, and
//! every write lands in a per-variable value expression. Conditional
//! writes merge through an explicit condition stack: writing under `if`s
//! rebuilds exactly one path of the variable's select tree, leaving other
//! paths untouched and placing don't-care in branches the write does not
//! reach.

pub mod object;
pub mod vars;

use std::collections::HashMap;

pub use object::{EvalObject, ObjId, SpecialOperation};
pub use vars::{EvalVarId, EvalVarKind, EvaluatorVariable, VariableDir};

use crate::ast::{
    Ast, BlockId, BuiltinKind, ContextRef, ExprId, Expression, FuncId, Statement, StmtId, TypeSpecId,
    VarId, VariableQualifier,
};
use crate::bitconst::BitConstant;
use crate::error::{EvalError, EvalResult};
use crate::report::Reporter;
use crate::template::{TemplateParameter, TemplateParameterKind, TpFrame, TpId};
use crate::types::{BasicType, DataType, StreamType, StructureType, TypeSpecifier};

/// Upper bound on unrolled loop iterations, so a condition that never
/// becomes false is reported instead of hanging the compiler.
const MAX_LOOP_ITERATIONS: usize = 65536;

#[derive(Debug)]
struct CallFrame {
    return_value: Option<EvalVarId>,
}

/// The evaluator: owns the value graph, the evaluator variables and all
/// evaluation state for one hardware block.
#[derive(Debug)]
pub struct Evaluator<'a> {
    /// The AST being evaluated.
    pub ast: &'a Ast,
    reporter: &'a Reporter,
    /// Value-graph arena; index 0 is the null sentinel.
    pub objects: Vec<EvalObject>,
    /// Evaluator-variable arena, in creation order.
    pub variables: Vec<EvaluatorVariable>,
    values: HashMap<EvalVarId, ObjId>,
    parser_vars: HashMap<VarId, EvalVarId>,
    call_stack: Vec<CallFrame>,
    tp_frames: Vec<TpFrame>,
    tp_current: TpId,
    conditions: Vec<(ObjId, bool)>,
    name_counter: usize,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over a parsed AST.
    pub fn new(ast: &'a Ast, reporter: &'a Reporter) -> Self {
        Evaluator {
            ast,
            reporter,
            objects: vec![EvalObject::Null],
            variables: Vec::new(),
            values: HashMap::new(),
            parser_vars: HashMap::new(),
            call_stack: Vec::new(),
            tp_frames: vec![TpFrame {
                parent: None,
                context: ContextRef::Global,
                params: Vec::new(),
            }],
            tp_current: TpId::ROOT,
            conditions: Vec::new(),
            name_counter: 0,
        }
    }

    /// The reporter diagnostics go to.
    pub fn reporter(&self) -> &Reporter {
        self.reporter
    }

    fn next_unique(&mut self) -> usize {
        let n = self.name_counter;
        self.name_counter += 1;
        n
    }

    /// Ids of every evaluator variable, in creation order.
    pub fn variable_ids(&self) -> impl Iterator<Item = EvalVarId> {
        (0..self.variables.len()).map(EvalVarId)
    }

    /// The evaluator variable bound to a parser variable in the current
    /// frame, if any.
    pub fn evaluator_variable(&self, var: VarId) -> Option<EvalVarId> {
        self.parser_vars.get(&var).copied()
    }

    /// The current value expression of a variable.
    pub fn value_for(&self, var: EvalVarId) -> ObjId {
        self.values[&var]
    }

    /// Registers the initial value binding of a freshly created variable:
    /// inputs read themselves, everything else starts as don't-care.
    pub(crate) fn bind_fresh_value(&mut self, id: EvalVarId) {
        let obj = if self.variables[id.0].dir.is_input {
            self.alloc_obj(EvalObject::Variable(id))
        } else {
            let ty = self.variables[id.0].ty.clone();
            self.alloc_obj(EvalObject::DontCare(ty))
        };
        self.values.insert(id, obj);
    }

    /// Sets a variable's value under the live condition stack, inserting a
    /// cast when the value's type differs from the variable's (integers
    /// only) and merging into the existing select tree.
    pub fn set_variable_value(&mut self, var: EvalVarId, value: ObjId) -> EvalResult<()> {
        let var_ty = self.var(var).ty.clone();
        let value_ty = self.data_type(value)?;
        let cast_value = if var_ty == value_ty {
            value
        } else {
            match &var_ty {
                DataType::Integer(it) => self.alloc_obj(EvalObject::Cast {
                    to: it.clone(),
                    operand: value,
                }),
                _ => {
                    return Err(EvalError::new(format!(
                        "cannot convert type ==={}=== to ==={}===",
                        value_ty.name(),
                        var_ty.name()
                    )))
                }
            }
        };
        let current = self.value_for(var);
        let merged = self.merge_conditional(current, 0, cast_value, &var_ty);
        self.values.insert(var, merged);
        Ok(())
    }

    /// Descends the select tree while it matches the condition stack,
    /// then replaces exactly the sub-expression the active path reaches.
    fn merge_conditional(
        &mut self,
        node: ObjId,
        depth: usize,
        new_value: ObjId,
        ty: &DataType,
    ) -> ObjId {
        if depth >= self.conditions.len() {
            // every live condition matched: the new value replaces this leaf
            return new_value;
        }
        let (cond, in_true_branch) = self.conditions[depth];
        let select = match self.obj(node) {
            EvalObject::Special {
                op: SpecialOperation::Cond,
                operands,
                ..
            } if operands[0] == cond => Some((operands[1], operands[2])),
            _ => None,
        };
        if let Some((true_branch, false_branch)) = select {
            let operands = if in_true_branch {
                let rebuilt = self.merge_conditional(true_branch, depth + 1, new_value, ty);
                vec![cond, rebuilt, false_branch]
            } else {
                let rebuilt = self.merge_conditional(false_branch, depth + 1, new_value, ty);
                vec![cond, true_branch, rebuilt]
            };
            return self.alloc_obj(EvalObject::Special {
                op: SpecialOperation::Cond,
                operands,
                params: Vec::new(),
            });
        }
        // first mismatch: wrap the new value in the remaining conditions,
        // don't-care in the untaken branches
        self.build_condition_chain(depth, new_value, ty)
    }

    fn build_condition_chain(&mut self, depth: usize, new_value: ObjId, ty: &DataType) -> ObjId {
        let mut value = new_value;
        for i in (depth..self.conditions.len()).rev() {
            let (cond, in_true_branch) = self.conditions[i];
            let dont_care = self.alloc_obj(EvalObject::DontCare(ty.clone()));
            let operands = if in_true_branch {
                vec![cond, value, dont_care]
            } else {
                vec![cond, dont_care, value]
            };
            value = self.alloc_obj(EvalObject::Special {
                op: SpecialOperation::Cond,
                operands,
                params: Vec::new(),
            });
        }
        value
    }

    /// Creates the evaluator variable for a parser variable: evaluates the
    /// initialiser, resolves the type against the current template
    /// context, forms a unique name and binds the initial value.
    pub fn add_parser_variable(
        &mut self,
        var: VarId,
        is_block_input: bool,
        is_block_output: bool,
    ) -> EvalResult<EvalVarId> {
        let pv = self.ast.variable(var).clone();
        let is_const = pv.qualifiers.contains(VariableQualifier::Const);
        let is_static = pv.qualifiers.contains(VariableQualifier::Static);
        let is_register = pv.qualifiers.contains(VariableQualifier::Register);
        let mut init = self.evaluate_initialiser(pv.initialiser, pv.ty)?;
        if init != ObjId::NULL {
            // bind the value as it stands now, not a live reference
            init = self.value_of(init)?;
        }
        let ty = self.resolve_type_in(pv.ty, self.tp_current, init)?;
        let unique_name = if is_block_input || is_block_output {
            pv.name.clone()
        } else {
            format!("{}_ecc_{}", pv.name, self.next_unique())
        };
        let dir = VariableDir::new(
            is_block_input,
            is_block_output,
            is_block_input || is_block_output,
        );
        let id = self.create_variable(dir, unique_name, ty, is_static)?;
        self.variables[id.0].attributes = pv.attributes.clone();
        self.variables[id.0].is_register = is_register;
        self.parser_vars.insert(var, id);
        if is_const {
            if init == ObjId::NULL {
                return Err(EvalError::new(format!(
                    "const variable ==={}=== must have initialiser",
                    pv.name
                )));
            }
            if !self.has_constant_value(init) {
                return Err(EvalError::new(format!(
                    "initialiser for const variable ==={}=== is not const itself",
                    pv.name
                )));
            }
            init = self.constant_value(init)?;
        }
        if init != ObjId::NULL {
            self.bind_initial_value(id, init)?;
        }
        Ok(id)
    }

    /// Binds an initial value: static scalars take it as their register
    /// default, aggregates decompose element-wise, everything else is an
    /// ordinary (possibly conditional) write.
    fn bind_initial_value(&mut self, id: EvalVarId, value: ObjId) -> EvalResult<()> {
        match &self.variables[id.0].kind {
            EvalVarKind::Scalar { is_static: true, .. } => {
                let default = self.scalar_const_value(value).map_err(|_| {
                    EvalError::new(format!(
                        "initialiser for static variable ==={}=== must be constant",
                        self.var(id).name
                    ))
                })?;
                self.variables[id.0].default_value = Some(default);
                Ok(())
            }
            EvalVarKind::Scalar { .. } => self.set_variable_value(id, value),
            EvalVarKind::Array { items } => {
                let items = items.clone();
                for (i, item) in items.into_iter().enumerate() {
                    let index =
                        self.alloc_obj(EvalObject::Constant(BitConstant::from_int(i as i64)));
                    let element = self.subscript_read(value, &[index])?;
                    self.bind_initial_value(item, element)?;
                }
                Ok(())
            }
            EvalVarKind::Structure { members } => {
                let members = members.clone();
                for (name, member) in members {
                    let element = self.member_read(value, &name)?;
                    self.bind_initial_value(member, element)?;
                }
                Ok(())
            }
            EvalVarKind::Memory { .. } | EvalVarKind::Stream { .. } => {
                Err(EvalError::new(format!(
                    "variable ==={}=== cannot take an initialiser",
                    self.var(id).name
                )))
            }
        }
    }

    /// Evaluates a declaration initialiser; brace lists build aggregate
    /// values against the declared type.
    fn evaluate_initialiser(&mut self, expr: ExprId, spec: TypeSpecId) -> EvalResult<ObjId> {
        if let Expression::InitialiserList(_) = &self.ast.expr(expr).kind {
            let ty = self.resolve_type_in(spec, self.tp_current, ObjId::NULL)?;
            self.initialiser_for_type(&ty, expr)
        } else {
            self.evaluate_expression(expr)
        }
    }

    fn initialiser_for_type(&mut self, ty: &DataType, expr: ExprId) -> EvalResult<ObjId> {
        let items = match &self.ast.expr(expr).kind {
            Expression::InitialiserList(items) => items.clone(),
            _ => return self.evaluate_expression(expr),
        };
        match ty {
            DataType::Array(arr) => {
                if items.len() != arr.length {
                    return Err(EvalError::new(format!(
                        "initialiser list has {} elements but ==={}=== has {}",
                        items.len(),
                        ty.name(),
                        arr.length
                    )));
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.initialiser_for_type(&arr.base, item)?);
                }
                Ok(self.alloc_obj(EvalObject::Array {
                    ty: arr.clone(),
                    items: values,
                }))
            }
            DataType::Structure(st) => {
                if items.len() != st.members.len() {
                    return Err(EvalError::new(format!(
                        "initialiser list has {} elements but ==={}=== has {} members",
                        items.len(),
                        st.name,
                        st.members.len()
                    )));
                }
                let mut values = Vec::with_capacity(items.len());
                for (item, (name, member_ty)) in items.into_iter().zip(st.members.clone()) {
                    values.push((name, self.initialiser_for_type(&member_ty, item)?));
                }
                Ok(self.alloc_obj(EvalObject::Struct {
                    ty: st.clone(),
                    items: values,
                }))
            }
            _ => Err(EvalError::new("initialiser list not permitted here")),
        }
    }

    /// Evaluates a hardware block: inputs, then outputs, then the body.
    pub fn evaluate_block(&mut self, block: BlockId) -> EvalResult<()> {
        let blk = self.ast.blocks[block.0].clone();
        for &input in &blk.inputs {
            self.add_parser_variable(input, true, false)?;
        }
        for &output in &blk.outputs {
            self.add_parser_variable(output, false, true)?;
        }
        self.evaluate_statement(blk.body)
    }

    /// Evaluates one statement.
    pub fn evaluate_statement(&mut self, stmt: StmtId) -> EvalResult<()> {
        let node = self.ast.stmt(stmt);
        let line = node.line;
        let kind = node.kind.clone();
        self.evaluate_statement_kind(&kind)
            .map_err(|e| e.with_line(line))
    }

    fn evaluate_statement_kind(&mut self, kind: &Statement) -> EvalResult<()> {
        match kind {
            Statement::Null => Ok(()),
            Statement::VariableDeclaration { vars } => {
                for &var in vars {
                    self.add_parser_variable(var, false, false)?;
                }
                Ok(())
            }
            Statement::Block { content, .. } => {
                for &child in content {
                    self.evaluate_statement(child)?;
                }
                Ok(())
            }
            Statement::Expression(expr) => {
                self.evaluate_expression(*expr)?;
                Ok(())
            }
            Statement::If {
                condition,
                if_true,
                if_false,
            } => {
                let cond = self.evaluate_expression(*condition)?;
                self.conditions.push((cond, true));
                let true_result = self.evaluate_statement(*if_true);
                if true_result.is_err() {
                    self.conditions.pop();
                    return true_result;
                }
                if let Some(top) = self.conditions.last_mut() {
                    top.1 = false;
                }
                let false_result = self.evaluate_statement(*if_false);
                self.conditions.pop();
                false_result
            }
            Statement::For {
                init,
                condition,
                incrementer,
                body,
                ..
            } => {
                self.evaluate_statement(*init)?;
                let mut iterations = 0usize;
                loop {
                    let cond = self.evaluate_expression(*condition)?;
                    if !self.has_constant_value(cond) {
                        return Err(EvalError::new(
                            "for loop must have compile-time constant condition",
                        ));
                    }
                    if !self.scalar_const_value(cond)?.any_set() {
                        break;
                    }
                    iterations += 1;
                    if iterations > MAX_LOOP_ITERATIONS {
                        return Err(EvalError::new(format!(
                            "loop condition still true after {MAX_LOOP_ITERATIONS} unrolled iterations"
                        )));
                    }
                    self.evaluate_statement(*body)?;
                    self.evaluate_expression(*incrementer)?;
                }
                Ok(())
            }
            Statement::While { condition, body } => {
                let mut iterations = 0usize;
                loop {
                    let cond = self.evaluate_expression(*condition)?;
                    if !self.has_constant_value(cond) {
                        return Err(EvalError::new(
                            "while loop must have compile-time constant condition",
                        ));
                    }
                    if !self.scalar_const_value(cond)?.any_set() {
                        break;
                    }
                    iterations += 1;
                    if iterations > MAX_LOOP_ITERATIONS {
                        return Err(EvalError::new(format!(
                            "loop condition still true after {MAX_LOOP_ITERATIONS} unrolled iterations"
                        )));
                    }
                    self.evaluate_statement(*body)?;
                }
                Ok(())
            }
            Statement::Return { value } => {
                let result = self.evaluate_expression(*value)?;
                match self.call_stack.last().and_then(|f| f.return_value) {
                    Some(return_var) => {
                        if result == ObjId::NULL {
                            return Err(EvalError::new(
                                "return statement requires a value in this function",
                            ));
                        }
                        self.handle_write(return_var, result)
                    }
                    None if self.call_stack.is_empty() => {
                        Err(EvalError::new("return statement outside function"))
                    }
                    None if result != ObjId::NULL => Err(EvalError::new(
                        "cannot return a value from a void function",
                    )),
                    None => Ok(()),
                }
            }
        }
    }

    /// Evaluates one expression to an eval object, applying side effects.
    pub fn evaluate_expression(&mut self, expr: ExprId) -> EvalResult<ObjId> {
        let node = self.ast.expr(expr);
        let line = node.line;
        let kind = node.kind.clone();
        self.evaluate_expression_kind(&kind)
            .map_err(|e| e.with_line(line))
    }

    fn evaluate_expression_kind(&mut self, kind: &Expression) -> EvalResult<ObjId> {
        match kind {
            Expression::Null => Ok(ObjId::NULL),
            Expression::Literal(value) => Ok(self.alloc_obj(EvalObject::Constant(value.clone()))),
            Expression::Variable(var) => {
                if let Some(&bound) = self.parser_vars.get(var) {
                    return Ok(self.alloc_obj(EvalObject::Variable(bound)));
                }
                // not bound in this frame: a global constant, folded in a
                // fresh constant evaluator
                let globals = self.ast.declared_variables(ContextRef::Global);
                if !globals.contains(var) {
                    return Err(EvalError::new(format!(
                        "variable {} not declared properly",
                        self.ast.variable(*var).name
                    )));
                }
                let init = self.ast.variable(*var).initialiser;
                let folded = {
                    let mut constant_eval = Evaluator::new(self.ast, self.reporter);
                    constant_eval.const_expression(init)?
                };
                Ok(self.alloc_obj(EvalObject::Constant(folded)))
            }
            Expression::ArraySubscript { base, indices } => {
                let base = self.evaluate_expression(*base)?;
                let mut index_objs = Vec::with_capacity(indices.len());
                for &index in indices {
                    index_objs.push(self.evaluate_expression(index)?);
                }
                Ok(self.alloc_obj(EvalObject::ArrayAccess {
                    base,
                    indices: index_objs,
                }))
            }
            Expression::MemberAccess { base, member } => {
                let base = self.evaluate_expression(*base)?;
                Ok(self.alloc_obj(EvalObject::StructAccess {
                    base,
                    member: member.clone(),
                }))
            }
            Expression::Operation { op, operands } => {
                let mut operand_objs = Vec::with_capacity(operands.len());
                for &operand in operands {
                    operand_objs.push(self.evaluate_expression(operand)?);
                }
                let operation = self.alloc_obj(EvalObject::Operation {
                    op: *op,
                    operands: operand_objs,
                });
                let applied = self.apply_to_state(operation)?;
                self.value_of(applied)
            }
            Expression::Conditional {
                condition,
                if_true,
                if_false,
            } => {
                let cond = self.evaluate_expression(*condition)?;
                let if_true = self.evaluate_expression(*if_true)?;
                let if_false = self.evaluate_expression(*if_false)?;
                let cond = self.value_of(cond)?;
                let if_true = self.value_of(if_true)?;
                let if_false = self.value_of(if_false)?;
                if self.has_constant_value(cond) {
                    let selector = self.scalar_const_value(cond)?;
                    return Ok(if selector.any_set() { if_true } else { if_false });
                }
                Ok(self.alloc_obj(EvalObject::Special {
                    op: SpecialOperation::Cond,
                    operands: vec![cond, if_true, if_false],
                    params: Vec::new(),
                }))
            }
            Expression::FunctionCall { func, args, params } => {
                let mut arg_objs = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_objs.push(self.evaluate_expression(arg)?);
                }
                self.process_function_call(*func, arg_objs, params.clone())
            }
            Expression::InitialiserList(_) => {
                Err(EvalError::new("initialiser list not permitted here"))
            }
            Expression::Builtin { kind, operand } => {
                let ty = match &self.ast.expr(*operand).kind {
                    Expression::TypeRef(spec) => {
                        self.resolve_type_in(*spec, self.tp_current, ObjId::NULL)?
                    }
                    _ => {
                        let operand = self.evaluate_expression(*operand)?;
                        self.data_type(operand)?
                    }
                };
                let value = self.builtin_value(*kind, &ty)?;
                Ok(self.alloc_obj(EvalObject::Constant(value)))
            }
            Expression::TypeRef(_) => Err(EvalError::new(
                "type name not permitted in this expression",
            )),
            Expression::TemplateParam { context, index } => {
                let value =
                    self.numeric_template_parameter(self.tp_current, *context, *index)?;
                Ok(self.alloc_obj(EvalObject::Constant(value)))
            }
        }
    }

    fn builtin_value(&self, kind: BuiltinKind, ty: &DataType) -> EvalResult<BitConstant> {
        match kind {
            BuiltinKind::Sizeof => Ok(BitConstant::from_int(((ty.width() + 7) / 8) as i64)),
            BuiltinKind::WidthOf => Ok(BitConstant::from_int(ty.width() as i64)),
            BuiltinKind::Length => {
                let dims = ty.dimensions();
                if dims.is_empty() {
                    return Err(EvalError::new("cannot call __length on scalar"));
                }
                Ok(BitConstant::from_int(dims[0] as i64))
            }
            BuiltinKind::Min => match ty {
                DataType::Integer(it) => {
                    if it.is_signed {
                        let mut bits = vec![false; it.width];
                        if let Some(last) = bits.last_mut() {
                            *last = true;
                        }
                        Ok(BitConstant {
                            bits,
                            is_signed: true,
                        })
                    } else {
                        Ok(BitConstant::zero())
                    }
                }
                _ => Err(EvalError::new("cannot call __min on non-integer")),
            },
            BuiltinKind::Max => match ty {
                DataType::Integer(it) => {
                    let mut bits = vec![true; it.width];
                    if it.is_signed {
                        if let Some(last) = bits.last_mut() {
                            *last = false;
                        }
                    }
                    Ok(BitConstant {
                        bits,
                        is_signed: it.is_signed,
                    })
                }
                _ => Err(EvalError::new("cannot call __max on non-integer")),
            },
        }
    }

    /// Evaluates an expression and folds it to a scalar constant.
    pub fn const_expression(&mut self, expr: ExprId) -> EvalResult<BitConstant> {
        let obj = self.evaluate_expression(expr)?;
        self.scalar_const_value(obj)
    }

    /// Inlines a function call: a fresh frame binds arguments to new
    /// evaluator variables, the body evaluates, by-reference arguments
    /// write back, and the return variable's value is the result.
    pub fn process_function_call(
        &mut self,
        func: FuncId,
        args: Vec<ObjId>,
        params: Vec<TemplateParameter>,
    ) -> EvalResult<ObjId> {
        let function = self.ast.functions[func.0].clone();
        let saved_parser_vars = self.parser_vars.clone();
        let saved_tp = self.tp_current;
        let new_tp = TpId(self.tp_frames.len());
        self.tp_frames.push(TpFrame {
            parent: Some(saved_tp),
            context: ContextRef::Function(func),
            params,
        });
        self.tp_current = new_tp;

        let return_value = match function.return_type {
            Some(spec) => {
                let ty = self.resolve_type_in(spec, new_tp, ObjId::NULL)?;
                let name = format!("retval_{}", self.next_unique());
                Some(self.create_variable(VariableDir::default(), name, ty, false)?)
            }
            None => None,
        };

        if args.len() < function.arguments.len() {
            return Err(EvalError::new(format!(
                "too few arguments passed to function ==={}=== (expected {}, got {})",
                function.name,
                function.arguments.len(),
                args.len()
            )));
        }
        for (i, &(arg_var, _)) in function.arguments.iter().enumerate() {
            let bound = self.add_parser_variable(arg_var, false, false)?;
            self.handle_write(bound, args[i])?;
        }

        self.call_stack.push(CallFrame { return_value });
        let body_result = self.evaluate_statement(function.body);
        self.call_stack.pop();
        body_result?;

        for (i, &(arg_var, by_ref)) in function.arguments.iter().enumerate() {
            if by_ref {
                let bound = self.parser_vars[&arg_var];
                let final_value = self.handle_read(bound)?;
                self.assign(args[i], final_value)?;
            }
        }
        self.parser_vars = saved_parser_vars;
        self.tp_current = saved_tp;

        match return_value {
            Some(rv) => self.handle_read(rv),
            None => Ok(ObjId::NULL),
        }
    }

    /// Resolves a type specifier against the current template context.
    pub fn resolve_type(&mut self, spec: TypeSpecId, value: ObjId) -> EvalResult<DataType> {
        self.resolve_type_in(spec, self.tp_current, value)
    }

    /// Resolves a type specifier against an explicit template context;
    /// `value` feeds `auto`.
    pub fn resolve_type_in(
        &mut self,
        spec: TypeSpecId,
        tp: TpId,
        value: ObjId,
    ) -> EvalResult<DataType> {
        match self.ast.type_spec(spec).clone() {
            TypeSpecifier::Auto => {
                if value == ObjId::NULL {
                    Err(EvalError::new(
                        "use of ===auto=== type requires a value to be specified",
                    ))
                } else {
                    self.data_type(value)
                }
            }
            TypeSpecifier::Basic { kind, params } => self.resolve_basic_type(kind, &params, tp),
            TypeSpecifier::Structure { structure, params } => {
                let st = self.ast.structures[structure.0].clone();
                let struct_tp = TpId(self.tp_frames.len());
                self.tp_frames.push(TpFrame {
                    parent: Some(tp),
                    context: ContextRef::Structure(structure),
                    params,
                });
                // member width expressions resolve against the structure's
                // own parameters
                let saved_tp = self.tp_current;
                self.tp_current = struct_tp;
                let mut members = Vec::with_capacity(st.members.len());
                let mut result = Ok(());
                for &member in &st.members {
                    let member_var = self.ast.variable(member).clone();
                    let resolved = self
                        .evaluate_expression(member_var.initialiser)
                        .and_then(|init| self.resolve_type_in(member_var.ty, struct_tp, init));
                    match resolved {
                        Ok(member_ty) => members.push((member_var.name, member_ty)),
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                self.tp_current = saved_tp;
                result?;
                Ok(DataType::Structure(StructureType {
                    name: st.name,
                    members,
                }))
            }
            TypeSpecifier::Array { base, length } => {
                let base_ty = self.resolve_type_in(base, tp, ObjId::NULL)?;
                let len = self.dimension_value(length, "array length")?;
                Ok(DataType::Array(crate::types::ArrayType {
                    base: Box::new(base_ty),
                    length: len,
                }))
            }
            TypeSpecifier::TemplateParam { context, index } => {
                let target = self.type_template_parameter(tp, context, index)?;
                self.resolve_type_in(target, tp, ObjId::NULL)
            }
            TypeSpecifier::Decltype { operand } => {
                let obj = self.evaluate_expression(operand)?;
                self.data_type(obj)
            }
        }
    }

    fn dimension_value(&mut self, expr: ExprId, what: &str) -> EvalResult<usize> {
        let value = self.const_expression(expr)?.int_value();
        if value <= 0 {
            return Err(EvalError::new(format!(
                "{what} must be a strictly positive compile-time constant"
            )));
        }
        Ok(value as usize)
    }

    fn resolve_basic_type(
        &mut self,
        kind: BasicType,
        params: &[TemplateParameter],
        tp: TpId,
    ) -> EvalResult<DataType> {
        match kind {
            BasicType::Unsigned | BasicType::Signed => {
                let width = self.int_parameter_value(&params[0])?;
                if width <= 0 {
                    return Err(EvalError::new(
                        "integer width must be a strictly positive compile-time constant",
                    ));
                }
                Ok(DataType::integer(width as usize, kind == BasicType::Signed))
            }
            BasicType::Stream | BasicType::Stream2d => {
                let base = self.type_parameter_spec(&params[0])?;
                let base_ty = self.resolve_type_in(base, tp, ObjId::NULL)?;
                let length = self.int_parameter_positive(&params[1], "stream length")?;
                if kind == BasicType::Stream {
                    Ok(DataType::Stream(StreamType {
                        base: Box::new(base_ty),
                        is_2d: false,
                        length,
                        height: 0,
                        line_width: 0,
                    }))
                } else {
                    let height = self.int_parameter_positive(&params[2], "stream height")?;
                    let line_width =
                        self.int_parameter_positive(&params[3], "stream line width")?;
                    Ok(DataType::Stream(StreamType {
                        base: Box::new(base_ty),
                        is_2d: true,
                        length,
                        height,
                        line_width,
                    }))
                }
            }
            BasicType::Ram | BasicType::Rom => {
                let base = self.type_parameter_spec(&params[0])?;
                let base_ty = self.resolve_type_in(base, tp, ObjId::NULL)?;
                let base_int = match base_ty {
                    DataType::Integer(it) => it,
                    _ => {
                        return Err(EvalError::new("base type of memory must be an integer"))
                    }
                };
                let length = self.int_parameter_positive(&params[1], "memory length")?;
                Ok(DataType::Ram(crate::types::RamType {
                    base: base_int,
                    length,
                    is_rom: kind == BasicType::Rom,
                }))
            }
        }
    }

    /// The numeric value of an int or bit-constant template parameter,
    /// evaluated in the current frame and cast to its declared type.
    pub fn numeric_parameter_value(
        &mut self,
        param: &TemplateParameter,
    ) -> EvalResult<BitConstant> {
        match &param.kind {
            TemplateParameterKind::Int { ty, expr }
            | TemplateParameterKind::BitConstant { ty, expr } => {
                if !param.was_specified {
                    return Err(EvalError::new(format!(
                        "template parameter ==={}=== not specified",
                        param.name
                    )));
                }
                let (ty, expr) = (*ty, *expr);
                let base_value = self.evaluate_expression(expr)?;
                let cast_ty = self.resolve_type_in(ty, TpId::ROOT, base_value)?;
                match cast_ty {
                    DataType::Integer(it) => {
                        let cast = self.alloc_obj(EvalObject::Cast {
                            to: it,
                            operand: base_value,
                        });
                        self.scalar_const_value(cast)
                    }
                    _ => Err(EvalError::new(format!(
                        "template parameter ==={}=== must have scalar type",
                        param.name
                    ))),
                }
            }
            _ => Err(EvalError::new(format!(
                "parameter ==={}=== is not numeric",
                param.name
            ))),
        }
    }

    /// The numeric parameter as a host integer.
    pub fn int_parameter_value(&mut self, param: &TemplateParameter) -> EvalResult<i64> {
        Ok(self.numeric_parameter_value(param)?.int_value())
    }

    fn int_parameter_positive(
        &mut self,
        param: &TemplateParameter,
        what: &str,
    ) -> EvalResult<usize> {
        let value = self.int_parameter_value(param)?;
        if value <= 0 {
            return Err(EvalError::new(format!(
                "{what} must be a strictly positive compile-time constant"
            )));
        }
        Ok(value as usize)
    }

    fn type_parameter_spec(&mut self, param: &TemplateParameter) -> EvalResult<TypeSpecId> {
        match &param.kind {
            TemplateParameterKind::DataType { value } => value.ok_or_else(|| {
                EvalError::new(format!(
                    "template parameter ==={}=== not specified",
                    param.name
                ))
            }),
            _ => Err(EvalError::new(format!(
                "parameter ==={}=== is not a type",
                param.name
            ))),
        }
    }

    /// Finds the numeric template parameter declared at `context` by
    /// walking the frame list from `tp` towards the root.
    pub fn numeric_template_parameter(
        &mut self,
        tp: TpId,
        context: ContextRef,
        index: usize,
    ) -> EvalResult<BitConstant> {
        let param = self.find_template_frame_param(tp, context, index)?;
        self.numeric_parameter_value(&param)
    }

    fn type_template_parameter(
        &mut self,
        tp: TpId,
        context: ContextRef,
        index: usize,
    ) -> EvalResult<TypeSpecId> {
        let param = self.find_template_frame_param(tp, context, index)?;
        self.type_parameter_spec(&param)
    }

    fn find_template_frame_param(
        &self,
        tp: TpId,
        context: ContextRef,
        index: usize,
    ) -> EvalResult<TemplateParameter> {
        let mut frame = tp;
        loop {
            let fr = &self.tp_frames[frame.0];
            if fr.context == context {
                return fr.params.get(index).cloned().ok_or_else(|| {
                    EvalError::internal("template parameter index out of range")
                });
            }
            match fr.parent {
                Some(parent) => frame = parent,
                None => {
                    return Err(EvalError::new("unable to resolve template parameter"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MessageLevel;

    #[test]
    fn condition_stack_restores_after_merge() {
        let ast = Ast::new();
        let reporter = Reporter::plain(MessageLevel::Error);
        let mut eval = Evaluator::new(&ast, &reporter);
        let var = eval
            .create_variable(
                VariableDir::default(),
                "x".to_string(),
                DataType::integer(8, false),
                false,
            )
            .unwrap();
        let cond = eval.alloc_obj(EvalObject::Variable(var));
        let five = eval.alloc_obj(EvalObject::Constant(BitConstant::from_int(5)));
        let seven = eval.alloc_obj(EvalObject::Constant(BitConstant::from_int(7)));

        let target = eval
            .create_variable(
                VariableDir::default(),
                "y".to_string(),
                DataType::integer(8, false),
                false,
            )
            .unwrap();

        eval.conditions.push((cond, true));
        eval.set_variable_value(target, five).unwrap();
        eval.conditions.last_mut().unwrap().1 = false;
        eval.set_variable_value(target, seven).unwrap();
        eval.conditions.pop();

        // both branches survive in one select tree
        let value = eval.value_for(target);
        match eval.obj(value).clone() {
            EvalObject::Special {
                op: SpecialOperation::Cond,
                operands,
                ..
            } => {
                assert_eq!(operands[0], cond);
                assert!(matches!(
                    eval.obj(operands[1]),
                    EvalObject::Cast { .. } | EvalObject::Constant(_)
                ));
                assert!(matches!(
                    eval.obj(operands[2]),
                    EvalObject::Cast { .. } | EvalObject::Constant(_)
                ));
            }
            other => panic!("expected select tree, got {other:?}"),
        }
        assert!(eval.conditions.is_empty());
    }

    #[test]
    fn null_sentinel_errors() {
        let ast = Ast::new();
        let reporter = Reporter::plain(MessageLevel::Error);
        let mut eval = Evaluator::new(&ast, &reporter);
        assert!(eval.data_type(ObjId::NULL).is_err());
        assert!(eval.value_of(ObjId::NULL).is_err());
        assert!(eval.apply_to_state(ObjId::NULL).is_err());
    }
}
