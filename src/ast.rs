//! The abstract syntax tree.
//!
//! All nodes live in per-kind arenas owned by [`Ast`] and refer to each
//! other through index newtypes; the null statement and null expression are
//! dedicated arena index 0 entries rather than options, so optional slots
//! (missing initialisers, empty else branches) stay cheap and uniform.
//!
//! Scopes are modelled by [`ContextRef`]: any statement block, for loop,
//! function, structure or hardware block can own declarations, and name
//! lookup walks outwards from the innermost context, most recent
//! declaration first.

use flagset::{flags, FlagSet};

use crate::attributes::AttributeSet;
use crate::bitconst::BitConstant;
use crate::error::{ParseError, ParseResult};
use crate::ops::OperationType;
use crate::template::TemplateParameter;
use crate::types::TypeSpecifier;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

arena_id!(
    /// Index of a statement in the AST arena.
    StmtId
);
arena_id!(
    /// Index of an expression in the AST arena.
    ExprId
);
arena_id!(
    /// Index of a parser variable in the AST arena.
    VarId
);
arena_id!(
    /// Index of a user structure in the AST arena.
    StructId
);
arena_id!(
    /// Index of a function in the AST arena.
    FuncId
);
arena_id!(
    /// Index of a hardware block in the AST arena.
    BlockId
);
arena_id!(
    /// Index of a type specifier in the AST arena.
    TypeSpecId
);

impl StmtId {
    /// The process-wide null statement sentinel.
    pub const NULL: StmtId = StmtId(0);
}

impl ExprId {
    /// The process-wide null expression sentinel.
    pub const NULL: ExprId = ExprId(0);
}

impl TypeSpecId {
    /// The shared `auto` type specifier.
    pub const AUTO: TypeSpecId = TypeSpecId(0);
}

flags! {
    /// Qualifiers a variable declaration may carry.
    pub enum VariableQualifier: u8 {
        /// Value is held across invocations (synthesised as a register).
        Static,
        /// Compile-time constant; requires a constant initialiser.
        Const,
        /// Written values pass through a pipeline register.
        Register,
    }

    /// Special inputs and outputs a hardware block declared.
    pub enum BlockFlag: u8 {
        /// `clock` input present.
        Clock,
        /// `clken` clock-enable input present.
        ClockEnable,
        /// `input_valid` data-enable input present.
        InputValid,
        /// `output_valid` data-enable output requested.
        OutputValid,
        /// `reset` synchronous reset input present.
        SyncReset,
    }
}

/// A scope that can declare variables and template parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextRef {
    /// The global scope of the parsed file set.
    Global,
    /// A `{ ... }` statement block.
    Block(StmtId),
    /// A for loop; its initialiser's declarations scope the body.
    ForLoop(StmtId),
    /// A function; declares its arguments and template parameters.
    Function(FuncId),
    /// A user structure; declares its template parameters.
    Structure(StructId),
    /// A hardware block; declares its inputs and outputs.
    HardwareBlock(BlockId),
}

/// The default clock frequency assumed when `clock` has no `frequency`
/// template argument.
pub const DEFAULT_CLOCK_FREQ: u64 = 50_000_000;

/// A statement node plus its source position and attributes.
#[derive(Debug, Clone)]
pub struct StatementNode {
    /// The statement itself.
    pub kind: Statement,
    /// 1-based source line, for diagnostics.
    pub line: usize,
    /// Attributes written before the statement.
    pub attributes: AttributeSet,
}

/// One statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Does nothing; the shared sentinel for optional statements.
    Null,
    /// `{ ... }`, itself a context.
    Block {
        /// Child statements in order.
        content: Vec<StmtId>,
        /// Enclosing context.
        parent: ContextRef,
    },
    /// `if (cond) ... else ...`
    If {
        /// Controlling condition.
        condition: ExprId,
        /// Taken when the condition is non-zero.
        if_true: StmtId,
        /// Taken otherwise; the null statement when absent.
        if_false: StmtId,
    },
    /// `for (init; cond; inc) body`, a context scoping its initialiser.
    For {
        /// Initialiser statement.
        init: StmtId,
        /// Loop condition, required compile-time constant at evaluation.
        condition: ExprId,
        /// Incrementer expression evaluated after each iteration.
        incrementer: ExprId,
        /// Loop body.
        body: StmtId,
        /// Enclosing context.
        parent: ContextRef,
    },
    /// `while (cond) body`
    While {
        /// Loop condition, required compile-time constant at evaluation.
        condition: ExprId,
        /// Loop body.
        body: StmtId,
    },
    /// `return expr;`
    Return {
        /// Returned value; the null expression for `return;`.
        value: ExprId,
    },
    /// A declaration of one or more variables.
    VariableDeclaration {
        /// The declared variables, in source order.
        vars: Vec<VarId>,
    },
    /// An expression evaluated for its side effects.
    Expression(ExprId),
}

/// An expression node plus its source position.
#[derive(Debug, Clone)]
pub struct ExpressionNode {
    /// The expression itself.
    pub kind: Expression,
    /// 1-based source line, for diagnostics.
    pub line: usize,
}

/// Builtin pseudo-functions taking a single parenthesised operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// C-style size in bytes.
    Sizeof,
    /// Width in bits.
    WidthOf,
    /// First array dimension.
    Length,
    /// Minimum representable value of an integer type.
    Min,
    /// Maximum representable value of an integer type.
    Max,
}

/// One expression.
#[derive(Debug, Clone)]
pub enum Expression {
    /// The shared sentinel for optional expressions.
    Null,
    /// A numeric literal.
    Literal(BitConstant),
    /// A reference to a parser variable.
    Variable(VarId),
    /// `base[i, j, ...]`; multiple indices address row-major dimensions.
    ArraySubscript {
        /// The subscripted expression.
        base: ExprId,
        /// Index expressions.
        indices: Vec<ExprId>,
    },
    /// `base.member`
    MemberAccess {
        /// The accessed expression.
        base: ExprId,
        /// Member name.
        member: String,
    },
    /// A unary or binary operation.
    Operation {
        /// Which operation.
        op: OperationType,
        /// Operand expressions, in source order.
        operands: Vec<ExprId>,
    },
    /// The ternary conditional `cond ? a : b`.
    Conditional {
        /// Selecting condition.
        condition: ExprId,
        /// Value when the condition is non-zero.
        if_true: ExprId,
        /// Value otherwise.
        if_false: ExprId,
    },
    /// A call of a user-defined function.
    FunctionCall {
        /// The called function.
        func: FuncId,
        /// Argument expressions.
        args: Vec<ExprId>,
        /// Template arguments bound at the call site.
        params: Vec<TemplateParameter>,
    },
    /// A brace-enclosed initialiser list; only valid in declarations.
    InitialiserList(Vec<ExprId>),
    /// A builtin pseudo-function application.
    Builtin {
        /// Which builtin.
        kind: BuiltinKind,
        /// The operand expression.
        operand: ExprId,
    },
    /// A reference to a template parameter of an enclosing declaration.
    TemplateParam {
        /// Context whose parameter list is referenced.
        context: ContextRef,
        /// Position in that parameter list.
        index: usize,
    },
    /// A type name used as a value, legal only as a builtin operand
    /// (`__max(unsigned<8>)`).
    TypeRef(TypeSpecId),
}

/// A parser-level variable binding.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Declared name.
    pub name: String,
    /// Owning context; never changes after parsing.
    pub context: ContextRef,
    /// Unresolved type.
    pub ty: TypeSpecId,
    /// Qualifier set.
    pub qualifiers: FlagSet<VariableQualifier>,
    /// Whether declared with `&`.
    pub is_reference: bool,
    /// Initialiser expression; the null expression when absent.
    pub initialiser: ExprId,
    /// Attributes from the enclosing declaration.
    pub attributes: AttributeSet,
}

/// A user-defined structure.
#[derive(Debug, Clone)]
pub struct UserStructure {
    /// Structure name.
    pub name: String,
    /// Member variables in declaration order.
    pub members: Vec<VarId>,
    /// Template parameters declared on the structure.
    pub params: Vec<TemplateParameter>,
    /// Attributes written before the definition.
    pub attributes: AttributeSet,
}

/// A user-defined function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Return type; `None` for `void`.
    pub return_type: Option<TypeSpecId>,
    /// Arguments with their by-reference flags.
    pub arguments: Vec<(VarId, bool)>,
    /// Template parameters declared on the function.
    pub params: Vec<TemplateParameter>,
    /// Function body.
    pub body: StmtId,
    /// Attributes written before the definition.
    pub attributes: AttributeSet,
}

/// A top-level hardware block, compiled to one VHDL entity.
#[derive(Debug, Clone)]
pub struct HardwareBlock {
    /// Block name, also the entity name.
    pub name: String,
    /// Input variables in port order.
    pub inputs: Vec<VarId>,
    /// Output variables in port order.
    pub outputs: Vec<VarId>,
    /// Block body.
    pub body: StmtId,
    /// Which special inputs and outputs were declared.
    pub flags: FlagSet<BlockFlag>,
    /// Clock frequency in Hz.
    pub clock_freq: u64,
    /// Attributes written before the definition.
    pub attributes: AttributeSet,
}

/// Owner of every AST arena plus the global scope contents.
#[derive(Debug)]
pub struct Ast {
    /// Statement arena; index 0 is the null statement.
    pub statements: Vec<StatementNode>,
    /// Expression arena; index 0 is the null expression.
    pub expressions: Vec<ExpressionNode>,
    /// Variable arena.
    pub variables: Vec<Variable>,
    /// Structure arena.
    pub structures: Vec<UserStructure>,
    /// Function arena.
    pub functions: Vec<Function>,
    /// Hardware block arena.
    pub blocks: Vec<HardwareBlock>,
    /// Type specifier arena; index 0 is the shared `auto`.
    pub type_specs: Vec<TypeSpecifier>,
    /// Global-scope statements (declarations) in order.
    pub global_statements: Vec<StmtId>,
    /// `#pragma` lines collected verbatim.
    pub pragmas: Vec<String>,
}

impl Ast {
    /// Creates an empty AST with the null sentinels in place.
    pub fn new() -> Self {
        Ast {
            statements: vec![StatementNode {
                kind: Statement::Null,
                line: 0,
                attributes: AttributeSet::new(),
            }],
            expressions: vec![ExpressionNode {
                kind: Expression::Null,
                line: 0,
            }],
            variables: Vec::new(),
            structures: Vec::new(),
            functions: Vec::new(),
            blocks: Vec::new(),
            type_specs: vec![TypeSpecifier::Auto],
            global_statements: Vec::new(),
            pragmas: Vec::new(),
        }
    }

    /// Adds a statement, returning its id.
    pub fn alloc_stmt(&mut self, kind: Statement, line: usize, attributes: AttributeSet) -> StmtId {
        self.statements.push(StatementNode {
            kind,
            line,
            attributes,
        });
        StmtId(self.statements.len() - 1)
    }

    /// Adds an expression, returning its id.
    pub fn alloc_expr(&mut self, kind: Expression, line: usize) -> ExprId {
        self.expressions.push(ExpressionNode { kind, line });
        ExprId(self.expressions.len() - 1)
    }

    /// Adds a variable, returning its id.
    pub fn alloc_variable(&mut self, var: Variable) -> VarId {
        self.variables.push(var);
        VarId(self.variables.len() - 1)
    }

    /// Adds a type specifier, returning its id.
    pub fn alloc_type_spec(&mut self, spec: TypeSpecifier) -> TypeSpecId {
        self.type_specs.push(spec);
        TypeSpecId(self.type_specs.len() - 1)
    }

    /// The statement node behind an id.
    pub fn stmt(&self, id: StmtId) -> &StatementNode {
        &self.statements[id.0]
    }

    /// The expression node behind an id.
    pub fn expr(&self, id: ExprId) -> &ExpressionNode {
        &self.expressions[id.0]
    }

    /// The variable behind an id.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    /// The type specifier behind an id.
    pub fn type_spec(&self, id: TypeSpecId) -> &TypeSpecifier {
        &self.type_specs[id.0]
    }

    /// Finds a function by name.
    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId)
    }

    /// Finds a structure by name.
    pub fn find_structure(&self, name: &str) -> Option<StructId> {
        self.structures
            .iter()
            .position(|s| s.name == name)
            .map(StructId)
    }

    /// Variables a statement introduces into its enclosing scope. A for
    /// loop's initialiser declarations surface here as well, matching the
    /// scoping the evaluator applies.
    pub fn stmt_declared_variables(&self, id: StmtId) -> Vec<VarId> {
        match &self.stmt(id).kind {
            Statement::VariableDeclaration { vars } => vars.clone(),
            Statement::For { init, .. } => self.stmt_declared_variables(*init),
            _ => Vec::new(),
        }
    }

    /// The parent of a context, `None` at the global scope.
    pub fn parent_context(&self, ctx: ContextRef) -> Option<ContextRef> {
        match ctx {
            ContextRef::Global => None,
            ContextRef::Block(id) => match &self.stmt(id).kind {
                Statement::Block { parent, .. } => Some(*parent),
                _ => None,
            },
            ContextRef::ForLoop(id) => match &self.stmt(id).kind {
                Statement::For { parent, .. } => Some(*parent),
                _ => None,
            },
            ContextRef::Function(_) | ContextRef::Structure(_) | ContextRef::HardwareBlock(_) => {
                Some(ContextRef::Global)
            }
        }
    }

    /// Variables declared directly in a context, excluding parents.
    pub fn declared_variables(&self, ctx: ContextRef) -> Vec<VarId> {
        match ctx {
            ContextRef::Global => self
                .global_statements
                .iter()
                .flat_map(|&s| self.stmt_declared_variables(s))
                .collect(),
            ContextRef::Block(id) => match &self.stmt(id).kind {
                Statement::Block { content, .. } => content
                    .iter()
                    .flat_map(|&s| self.stmt_declared_variables(s))
                    .collect(),
                _ => Vec::new(),
            },
            ContextRef::ForLoop(id) => match &self.stmt(id).kind {
                Statement::For { init, .. } => self.stmt_declared_variables(*init),
                _ => Vec::new(),
            },
            ContextRef::Function(id) => self.functions[id.0]
                .arguments
                .iter()
                .map(|&(v, _)| v)
                .collect(),
            ContextRef::Structure(_) => Vec::new(),
            ContextRef::HardwareBlock(id) => {
                let blk = &self.blocks[id.0];
                blk.inputs.iter().chain(&blk.outputs).copied().collect()
            }
        }
    }

    /// Finds a variable by name, walking innermost-first and most recent
    /// declaration first within each scope.
    pub fn find_variable(&self, ctx: ContextRef, name: &str) -> ParseResult<VarId> {
        let mut current = Some(ctx);
        while let Some(c) = current {
            if let Some(&found) = self
                .declared_variables(c)
                .iter()
                .rev()
                .find(|&&v| self.variable(v).name == name)
            {
                return Ok(found);
            }
            current = self.parent_context(c);
        }
        Err(ParseError::new(format!(
            "variable ==={name}=== not found in any scope"
        )))
    }

    /// Whether a variable of this name is visible from a context.
    pub fn variable_exists(&self, ctx: ContextRef, name: &str) -> bool {
        self.find_variable(ctx, name).is_ok()
    }

    /// Template parameters declared directly on a context.
    pub fn defined_template_parameters(&self, ctx: ContextRef) -> &[TemplateParameter] {
        match ctx {
            ContextRef::Function(id) => &self.functions[id.0].params,
            ContextRef::Structure(id) => &self.structures[id.0].params,
            _ => &[],
        }
    }

    /// Finds a template parameter by name, walking towards the global
    /// scope; returns the declaring context and the parameter's position.
    pub fn find_template_parameter(
        &self,
        ctx: ContextRef,
        name: &str,
    ) -> ParseResult<(ContextRef, usize)> {
        let mut current = Some(ctx);
        while let Some(c) = current {
            if let Some(index) = self
                .defined_template_parameters(c)
                .iter()
                .position(|p| p.name == name)
            {
                return Ok((c, index));
            }
            current = self.parent_context(c);
        }
        Err(ParseError::new(format!(
            "==={name}=== is not a template parameter"
        )))
    }

    /// Whether the name resolves to a template parameter from a context.
    pub fn is_template_parameter(&self, ctx: ContextRef, name: &str) -> bool {
        self.find_template_parameter(ctx, name).is_ok()
    }
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}
