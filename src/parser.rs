//! The ElasticC parser: recursive descent for statements and declarations,
//! a modified shunting yard for expressions.
//!
//! The parser owns the [`Ast`] it builds. `#include` swaps the scanner for
//! the included file and recurses; the built-in core header is included
//! quietly on construction. A parse error aborts the current top-level
//! element only: it is reported, the scanner resynchronises at the next
//! `;` or `}`, and the next element is attempted. Include failures abort
//! the whole parse.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::ast::{
    Ast, BlockFlag, ContextRef, ExprId, Expression, FuncId, HardwareBlock, Statement, StmtId,
    StructId, TypeSpecId, UserStructure, Variable, DEFAULT_CLOCK_FREQ,
};
use crate::attributes::AttributeSet;
use crate::bitconst::BitConstant;
use crate::consts::{
    BASIC_TYPE_NAMES, BUILTIN_TOKENS, CORE_HEADER, CORE_HEADER_NAME, DATA_TYPE_KEYWORDS,
    INCLUDE_PATH_VAR, VARIABLE_QUALIFIERS,
};
use crate::error::{ParseError, ParseResult};
use crate::eval::Evaluator;
use crate::lexer::ParserState;
use crate::ops::{
    lookup_operation, OperationType, BINARY_OPERATIONS, UNARY_POSTFIX_OPERATIONS,
    UNARY_PREFIX_OPERATIONS,
};
use crate::report::{MessageLevel, Reporter};
use crate::template::{clone_parameter_set, TemplateParameter, TemplateParameterKind};
use crate::types::TypeSpecifier;

/// A special argument name recognised in hardware block headers, with its
/// optional template-style parameters.
struct SpecialArg {
    name: &'static str,
    params: Vec<TemplateParameter>,
    found: bool,
}

impl SpecialArg {
    fn new(name: &'static str, params: Vec<TemplateParameter>) -> Self {
        SpecialArg {
            name,
            params,
            found: false,
        }
    }
}

enum OpStackItem {
    LParen,
    Oper(OperationType),
    /// A `?` awaiting its `:`.
    Question,
    /// A complete `? ... :` awaiting its false operand.
    Colon,
}

/// Precedence of the ternary conditional, matching the assignment tier.
const TERNARY_PRECEDENCE: u8 = 15;

/// The ElasticC parser.
pub struct EccParser<'r> {
    /// Scanner over the file currently being parsed.
    pub code: ParserState,
    /// The AST being built.
    pub ast: Ast,
    typedefs: HashMap<String, TypeSpecId>,
    reporter: &'r Reporter,
    unary_prefix_tokens: Vec<&'static str>,
    unary_prefix_types: Vec<OperationType>,
    binary_postfix_tokens: Vec<&'static str>,
    binary_postfix_types: Vec<OperationType>,
}

impl<'r> EccParser<'r> {
    /// Creates a parser over the given source and quietly includes the core
    /// header.
    pub fn new(code: ParserState, reporter: &'r Reporter) -> ParseResult<Self> {
        let mut parser = EccParser {
            code,
            ast: Ast::new(),
            typedefs: HashMap::new(),
            reporter,
            unary_prefix_tokens: UNARY_PREFIX_OPERATIONS.iter().map(|o| o.token).collect(),
            unary_prefix_types: UNARY_PREFIX_OPERATIONS.iter().map(|o| o.ty).collect(),
            binary_postfix_tokens: BINARY_OPERATIONS
                .iter()
                .chain(UNARY_POSTFIX_OPERATIONS)
                .map(|o| o.token)
                .collect(),
            binary_postfix_types: BINARY_OPERATIONS
                .iter()
                .chain(UNARY_POSTFIX_OPERATIONS)
                .map(|o| o.ty)
                .collect(),
        };
        parser.include_file(CORE_HEADER_NAME, true, true)?;
        Ok(parser)
    }

    /// Consumes the parser, returning the AST built so far.
    pub fn into_ast(self) -> Ast {
        self.ast
    }

    /// Parses the whole input at the global scope, recovering from errors
    /// at top-level element boundaries.
    pub fn parse_all(&mut self) -> ParseResult<()> {
        self.code.skip();
        let mut template_params: Vec<TemplateParameter> = Vec::new();
        while !self.code.at_end() {
            let attr = match self.parse_attributes() {
                Ok(attr) => attr,
                Err(e) => {
                    self.report_and_resync(e);
                    template_params.clear();
                    continue;
                }
            };
            self.code.skip();
            if self.code.at_end() {
                break;
            }
            if self.code.peek()? == '#' {
                // a failing include aborts the whole parse
                self.parse_preprocessor()?;
                template_params.clear();
            } else if let Err(e) = self.parse_top_level(attr, &mut template_params) {
                self.report_and_resync(e);
                template_params.clear();
            }
            self.code.skip();
        }
        Ok(())
    }

    fn report_and_resync(&mut self, e: ParseError) {
        let line = e.line.unwrap_or_else(|| self.code.line());
        self.reporter
            .report_at(MessageLevel::Error, Some(line), &e.message);
        // skip to just past the next ; or } so the next element can start
        while !self.code.at_end() {
            match self.code.get() {
                Ok(';') | Ok('}') | Err(_) => break,
                Ok(_) => {}
            }
        }
    }

    fn parse_top_level(
        &mut self,
        attr: AttributeSet,
        template_params: &mut Vec<TemplateParameter>,
    ) -> ParseResult<()> {
        let next = self.code.peek_ident_or_literal();
        match next.as_str() {
            "template" => {
                *template_params = self.parse_template_definition(ContextRef::Global)?;
                return Ok(());
            }
            "struct" => {
                let params = std::mem::take(template_params);
                self.parse_structure_definition(attr, params)?;
            }
            "block" => {
                template_params.clear();
                self.parse_hw_block(attr)?;
            }
            "typedef" => {
                template_params.clear();
                self.code.next_ident_or_literal();
                self.code.skip();
                let base = self.parse_data_type(ContextRef::Global)?;
                self.code.skip();
                let line = self.code.line();
                let name = self.code.next_ident_or_literal();
                if name.is_empty() {
                    return Err(ParseError::at(line, "invalid name"));
                }
                self.typedefs.insert(name, base);
                self.code.skip();
                if !self.code.at_end() {
                    self.code.check_match(';')?;
                }
            }
            "const" => {
                template_params.clear();
                let line = self.code.line();
                let (vars, _) = self.parse_variable_declaration(ContextRef::Global, &attr, false)?;
                if self.code.get()? != ';' {
                    return Err(ParseError::at(
                        self.code.line(),
                        "variable declaration must end in semicolon",
                    ));
                }
                let stmt = self
                    .ast
                    .alloc_stmt(Statement::VariableDeclaration { vars }, line, attr);
                self.ast.global_statements.push(stmt);
            }
            _ if self.is_data_type_keyword(&next) => {
                let params = std::mem::take(template_params);
                self.parse_function(attr, params)?;
            }
            _ => {
                template_params.clear();
                if self.code.peek()? == ';' {
                    self.code.get()?;
                } else if !next.is_empty() {
                    return Err(ParseError::at(
                        self.code.line(),
                        format!("unexpected token {next}"),
                    ));
                } else {
                    return Err(ParseError::at(
                        self.code.line(),
                        format!("unexpected character {}", self.code.peek()?),
                    ));
                }
            }
        }
        Ok(())
    }

    fn parse_preprocessor(&mut self) -> ParseResult<()> {
        if !self.code.check_match('#')? {
            return Err(ParseError::at(
                self.code.line(),
                "invalid preprocessor definition",
            ));
        }
        let ident = self.code.next_ident_or_literal();
        if ident == "include" {
            self.code.skip();
            let system_only = if self.code.check_match('<')? {
                true
            } else if self.code.check_match('"')? {
                false
            } else {
                return Err(ParseError::at(
                    self.code.line(),
                    "invalid ===#include=== statement",
                ));
            };
            let close = if system_only { '>' } else { '"' };
            let mut filename = String::new();
            while !self.code.check_match(close)? {
                filename.push(self.code.get()?);
            }
            self.include_file(&filename, system_only, false)?;
        } else if ident == "pragma" {
            self.code.skip();
            let mut text = String::new();
            while !self.code.at_end() && !self.code.check_match('\n')? {
                text.push(self.code.get()?);
            }
            self.ast.pragmas.push(text);
        }
        Ok(())
    }

    /// Parses `fileName` as a nested module. Internal headers pass `quiet`
    /// to drop reporting to error level for the duration.
    fn include_file(&mut self, filename: &str, system_only: bool, quiet: bool) -> ParseResult<()> {
        let old_verbosity = if quiet {
            Some(self.reporter.set_verbosity(MessageLevel::Error))
        } else {
            None
        };
        let result = self.include_file_inner(filename, system_only);
        if let Some(v) = old_verbosity {
            self.reporter.set_verbosity(v);
        }
        result
    }

    fn include_file_inner(&mut self, filename: &str, system_only: bool) -> ParseResult<()> {
        let content = match find_file(filename, !system_only) {
            Some(path) => {
                self.reporter.report_at(
                    MessageLevel::Note,
                    Some(self.code.line()),
                    &format!("parsing included file ==={}===", path.display()),
                );
                std::fs::read_to_string(&path).map_err(|e| {
                    ParseError::new(format!(
                        "failed to open included file ==={}===: {e}",
                        path.display()
                    ))
                })?
            }
            None if filename == CORE_HEADER_NAME => CORE_HEADER.to_string(),
            None => {
                return Err(ParseError::at(
                    self.code.line(),
                    format!("included file ==={filename}=== not found"),
                ))
            }
        };
        let original = std::mem::replace(&mut self.code, ParserState::new(&content, filename));
        let result = self.parse_all();
        self.code = original;
        result
    }

    /// Parses any `[[...]]` attributes at the current position.
    pub fn parse_attributes(&mut self) -> ParseResult<AttributeSet> {
        let mut attrs = AttributeSet::new();
        self.code.skip();
        while !self.code.at_end() && self.code.peek_str(2) == "[[" {
            self.code.get_str(2)?;
            let mut text = String::new();
            while self.code.peek_str(2) != "]]" {
                text.push(self.code.get()?);
            }
            attrs
                .add_from_str(&text)
                .map_err(|e| e.with_line(self.code.line()))?;
            self.code.get_str(2)?;
            self.code.skip();
        }
        Ok(attrs)
    }

    fn is_data_type_keyword(&self, keyword: &str) -> bool {
        DATA_TYPE_KEYWORDS.contains(keyword)
            || self.typedefs.contains_key(keyword)
            || self.ast.find_structure(keyword).is_some()
    }

    /// Parses a single statement in `ctx`.
    pub fn parse_statement(&mut self, ctx: ContextRef) -> ParseResult<StmtId> {
        self.code.skip();
        let attr = self.parse_attributes()?;
        let start_line = self.code.line();
        let next_ident = self.code.peek_ident_or_literal();
        if self.code.peek()? == ';' {
            self.code.get()?;
            return Ok(StmtId::NULL);
        }
        if self.code.peek()? == '{' {
            self.code.get()?;
            let blk = self.parse_block_content(ctx, attr, start_line)?;
            self.code.get()?; // consume }
            return Ok(blk);
        }
        match next_ident.as_str() {
            "if" => {
                self.code.next_ident_or_literal();
                self.code.skip();
                if self.code.peek()? != '(' {
                    return Err(ParseError::at(
                        start_line,
                        format!(
                            "invalid if statement syntax (expecting '(', got {})",
                            self.code.peek()?
                        ),
                    ));
                }
                self.code.get()?;
                let condition = self.parse_expression(&[')'], ctx)?;
                self.code.get()?; // consume )
                self.code.skip();
                let if_true = self.parse_statement(ctx)?;
                self.code.skip();
                let mut if_false = StmtId::NULL;
                if self.code.peek_ident_or_literal() == "else" {
                    self.code.next_ident_or_literal();
                    if_false = self.parse_statement(ctx)?;
                }
                Ok(self.ast.alloc_stmt(
                    Statement::If {
                        condition,
                        if_true,
                        if_false,
                    },
                    start_line,
                    attr,
                ))
            }
            "for" => {
                self.code.next_ident_or_literal();
                self.code.skip();
                if self.code.peek()? != '(' {
                    return Err(ParseError::at(
                        start_line,
                        format!(
                            "invalid for statement syntax (expecting '(', got {})",
                            self.code.peek()?
                        ),
                    ));
                }
                self.code.get()?;
                let init = self.parse_statement(ctx)?; // consumes the ;
                let for_id = self.ast.alloc_stmt(
                    Statement::For {
                        init,
                        condition: ExprId::NULL,
                        incrementer: ExprId::NULL,
                        body: StmtId::NULL,
                        parent: ctx,
                    },
                    start_line,
                    attr,
                );
                let for_ctx = ContextRef::ForLoop(for_id);
                let condition = self.parse_expression(&[';'], for_ctx)?;
                self.code.get()?; // consume ;
                let incrementer = self.parse_expression(&[')'], for_ctx)?;
                self.code.get()?; // consume )
                let body = self.parse_statement(for_ctx)?;
                if let Statement::For {
                    condition: c,
                    incrementer: i,
                    body: b,
                    ..
                } = &mut self.ast.statements[for_id.0].kind
                {
                    *c = condition;
                    *i = incrementer;
                    *b = body;
                }
                Ok(for_id)
            }
            "while" => {
                self.code.next_ident_or_literal();
                self.code.skip();
                if self.code.peek()? != '(' {
                    return Err(ParseError::at(
                        start_line,
                        format!(
                            "invalid while statement syntax (expecting '(', got {})",
                            self.code.peek()?
                        ),
                    ));
                }
                self.code.get()?;
                let condition = self.parse_expression(&[')'], ctx)?;
                self.code.get()?; // consume )
                self.code.skip();
                let body = self.parse_statement(ctx)?;
                Ok(self
                    .ast
                    .alloc_stmt(Statement::While { condition, body }, start_line, attr))
            }
            "return" => {
                self.code.next_ident_or_literal();
                self.code.skip();
                let value = if self.code.peek()? != ';' {
                    self.parse_expression(&[';'], ctx)?
                } else {
                    ExprId::NULL
                };
                self.code.get()?; // consume ;
                Ok(self
                    .ast
                    .alloc_stmt(Statement::Return { value }, start_line, attr))
            }
            _ if self.is_data_type_keyword(&next_ident)
                || VARIABLE_QUALIFIERS.contains_key(next_ident.as_str()) =>
            {
                let (vars, _) = self.parse_variable_declaration(ctx, &attr, false)?;
                if self.code.get()? != ';' {
                    return Err(ParseError::at(
                        self.code.line(),
                        "variable declaration must end in semicolon",
                    ));
                }
                Ok(self
                    .ast
                    .alloc_stmt(Statement::VariableDeclaration { vars }, start_line, attr))
            }
            _ => {
                // assume it's an expression
                let expr = self.parse_expression(&[';'], ctx)?;
                self.code.get()?; // consume ;
                Ok(self
                    .ast
                    .alloc_stmt(Statement::Expression(expr), start_line, attr))
            }
        }
    }

    fn parse_block_content(
        &mut self,
        ctx: ContextRef,
        attr: AttributeSet,
        line: usize,
    ) -> ParseResult<StmtId> {
        let block_id = self.ast.alloc_stmt(
            Statement::Block {
                content: Vec::new(),
                parent: ctx,
            },
            line,
            attr,
        );
        let block_ctx = ContextRef::Block(block_id);
        let mut content = Vec::new();
        self.code.skip();
        while self.code.peek()? != '}' {
            content.push(self.parse_statement(block_ctx)?);
            self.code.skip();
        }
        if let Statement::Block { content: c, .. } = &mut self.ast.statements[block_id.0].kind {
            *c = content;
        }
        Ok(block_id)
    }

    /// Parses a type specifier, including optional template arguments and
    /// trailing array suffixes.
    pub fn parse_data_type(&mut self, ctx: ContextRef) -> ParseResult<TypeSpecId> {
        self.code.skip();
        let line = self.code.line();
        let type_name = self.code.next_ident_or_literal();
        if type_name.is_empty() {
            return Err(ParseError::at(
                line,
                format!(
                    "failed to parse data type: unexpected character {}",
                    self.code.peek()?
                ),
            ));
        }
        let base = if type_name == "auto" {
            TypeSpecId::AUTO
        } else if type_name == "decltype" {
            self.code.skip();
            if !self.code.check_match('(')? {
                return Err(ParseError::at(line, "expected '(' after decltype"));
            }
            let operand = self.parse_expression(&[')'], ctx)?;
            self.code.get()?; // consume )
            self.ast.alloc_type_spec(TypeSpecifier::Decltype { operand })
        } else if let Some(&kind) = BASIC_TYPE_NAMES.get(type_name.as_str()) {
            let mut params = kind.default_params();
            self.parse_template_args(&mut params, ctx)?;
            self.ast
                .alloc_type_spec(TypeSpecifier::Basic { kind, params })
        } else if let Some(&spec) = self.typedefs.get(&type_name) {
            spec
        } else if let Some(sid) = self.ast.find_structure(&type_name) {
            let mut params = clone_parameter_set(&self.ast.structures[sid.0].params);
            self.parse_template_args(&mut params, ctx)?;
            self.ast.alloc_type_spec(TypeSpecifier::Structure {
                structure: sid,
                params,
            })
        } else if self.ast.is_template_parameter(ctx, &type_name) {
            let (context, index) = self.ast.find_template_parameter(ctx, &type_name)?;
            self.ast
                .alloc_type_spec(TypeSpecifier::TemplateParam { context, index })
        } else {
            return Err(ParseError::at(
                line,
                format!("failed to parse data type: no type named {type_name}"),
            ));
        };
        self.handle_array_specifier(base, ctx)
    }

    /// Applies `[len]` suffixes to a base specifier; the last suffix is the
    /// innermost array.
    fn handle_array_specifier(
        &mut self,
        base: TypeSpecId,
        ctx: ContextRef,
    ) -> ParseResult<TypeSpecId> {
        self.code.skip();
        let mut sizes = Vec::new();
        while !self.code.at_end() && self.code.check_match('[')? {
            sizes.push(self.parse_expression(&[']'], ctx)?);
            self.code.get()?; // consume ]
            self.code.skip();
        }
        let mut result = base;
        for &length in sizes.iter().rev() {
            result = self.ast.alloc_type_spec(TypeSpecifier::Array {
                base: result,
                length,
            });
        }
        Ok(result)
    }

    /// Parses a `template<...>` parameter definition list.
    pub fn parse_template_definition(
        &mut self,
        ctx: ContextRef,
    ) -> ParseResult<Vec<TemplateParameter>> {
        self.code.skip();
        let mut params = Vec::new();
        if self.code.peek_ident_or_literal() != "template" {
            return Ok(params);
        }
        self.code.next_ident_or_literal();
        self.code.skip();
        if !self.code.check_match('<')? {
            return Err(ParseError::at(
                self.code.line(),
                "expected start of template parameter list",
            ));
        }
        self.code.skip();
        while !self.code.check_match('>')? {
            let keyword = self.code.peek_ident_or_literal();
            if keyword == "class" || keyword == "typename" {
                self.code.next_ident_or_literal();
                let name = self.code.next_ident_or_literal();
                validate_name(&name, "template parameter", self.code.line())?;
                params.push(TemplateParameter::data_type(&name));
            } else {
                let param_type = self.parse_data_type(ctx)?;
                let name = self.code.next_ident_or_literal();
                validate_name(&name, "template parameter", self.code.line())?;
                params.push(TemplateParameter::bit_constant(&name, param_type));
            }
            self.code.skip();
            if !self.code.check_match(',')? && self.code.peek()? != '>' {
                return Err(ParseError::at(
                    self.code.line(),
                    "invalid template parameter list syntax",
                ));
            }
            self.code.skip();
        }
        Ok(params)
    }

    /// Parses a positional `<...>` template argument list into `params`,
    /// marking each filled parameter as specified. Absence of `<` is fine.
    pub fn parse_template_args(
        &mut self,
        params: &mut [TemplateParameter],
        ctx: ContextRef,
    ) -> ParseResult<()> {
        self.code.skip();
        if self.code.at_end() || !self.code.check_match('<')? {
            return Ok(());
        }
        for i in 0..params.len() {
            params[i].was_specified = true;
            self.parse_template_param_value(&mut params[i], ctx)?;
            self.code.skip();
            if self.code.check_match('>')? {
                return Ok(());
            }
            if !self.code.check_match(',')? {
                return Err(ParseError::at(
                    self.code.line(),
                    format!(
                        "expected parameter set separator (expected ',', got '{}')",
                        self.code.peek()?
                    ),
                ));
            }
            self.code.skip();
        }
        self.code.skip();
        if !self.code.check_match('>')? {
            return Err(ParseError::at(
                self.code.line(),
                "too many template arguments given",
            ));
        }
        Ok(())
    }

    fn parse_template_param_value(
        &mut self,
        param: &mut TemplateParameter,
        ctx: ContextRef,
    ) -> ParseResult<()> {
        match &mut param.kind {
            TemplateParameterKind::Int { expr, .. }
            | TemplateParameterKind::BitConstant { expr, .. } => {
                *expr = self.parse_expression(&[',', '>'], ctx)?;
            }
            TemplateParameterKind::String { value } => {
                self.code.skip();
                *value = self.code.next_ident_or_literal();
            }
            TemplateParameterKind::Selector { allowed, index } => {
                self.code.skip();
                let value = self.code.next_ident_or_literal();
                match allowed.iter().position(|a| *a == value) {
                    Some(i) => *index = i,
                    None if value.is_empty() => {
                        return Err(ParseError::at(
                            self.code.line(),
                            format!("unexpected character {}", self.code.peek()?),
                        ))
                    }
                    None => {
                        return Err(ParseError::at(
                            self.code.line(),
                            format!("{value} is not an allowed parameter value"),
                        ))
                    }
                }
            }
            TemplateParameterKind::DataType { value } => {
                *value = Some(self.parse_data_type(ctx)?);
            }
        }
        Ok(())
    }

    /// Parses `[qualifiers] TYPE name [= init][, name2 ...]`. With
    /// `one_only`, exactly one declarator is read (argument lists). The
    /// returned flag reports a `&` reference declarator.
    pub fn parse_variable_declaration(
        &mut self,
        ctx: ContextRef,
        attr: &AttributeSet,
        one_only: bool,
    ) -> ParseResult<(Vec<crate::ast::VarId>, bool)> {
        self.code.skip();
        let mut qualifiers: flagset::FlagSet<crate::ast::VariableQualifier> =
            flagset::FlagSet::default();
        loop {
            let next = self.code.peek_ident_or_literal();
            match VARIABLE_QUALIFIERS.get(next.as_str()) {
                Some(&q) => {
                    self.code.next_ident_or_literal();
                    qualifiers |= q;
                    self.code.skip();
                }
                None => break,
            }
        }
        let base = self.parse_data_type(ctx)?;
        self.code.skip();
        let is_ref = self.code.check_match('&')?;
        let mut vars = Vec::new();
        loop {
            self.code.skip();
            let line = self.code.line();
            let name = self.code.next_ident_or_literal();
            if name.is_empty() {
                return Err(ParseError::at(
                    line,
                    format!(
                        "bad variable name - unexpected character ==={}===",
                        self.code.peek()?
                    ),
                ));
            }
            if name.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(ParseError::at(
                    line,
                    "variable name cannot start with a number",
                ));
            }
            if self.ast.variable_exists(ctx, &name) {
                self.reporter.report_at(
                    MessageLevel::Warning,
                    Some(line),
                    &format!("redefining variable ==={name}==="),
                );
            }
            self.code.skip();
            // arrays may also be specified after the variable name
            let var_type = self.handle_array_specifier(base, ctx)?;
            self.code.skip();
            let initialiser = if self.code.check_match('=')? {
                self.code.skip();
                self.parse_expression(&[';', ','], ctx)?
            } else {
                ExprId::NULL
            };
            vars.push(self.ast.alloc_variable(Variable {
                name,
                context: ctx,
                ty: var_type,
                qualifiers,
                is_reference: is_ref,
                initialiser,
                attributes: attr.clone(),
            }));
            self.code.skip();
            if one_only || !self.code.check_match(',')? {
                break;
            }
        }
        Ok((vars, is_ref))
    }

    /// Parses a parenthesised argument list; `specials` names arguments
    /// like `clock` that are recognised by name and may carry template
    /// arguments rather than declaring a variable.
    fn parse_argument_list(
        &mut self,
        ctx: ContextRef,
        specials: &mut [SpecialArg],
    ) -> ParseResult<Vec<(crate::ast::VarId, bool)>> {
        self.code.skip();
        if self.code.get()? != '(' {
            return Err(ParseError::at(
                self.code.line(),
                "invalid argument list, expected '('",
            ));
        }
        self.code.skip();
        let mut args = Vec::new();
        if self.code.peek()? != ')' {
            loop {
                self.code.skip();
                let attr = self.parse_attributes()?;
                self.code.skip();
                let next = self.code.peek_ident_or_literal();
                if let Some(pos) = specials.iter().position(|s| s.name == next) {
                    self.code.next_ident_or_literal();
                    specials[pos].found = true;
                    let mut params = std::mem::take(&mut specials[pos].params);
                    self.parse_template_args(&mut params, ctx)?;
                    specials[pos].params = params;
                } else {
                    let (vars, is_ref) = self.parse_variable_declaration(ctx, &attr, true)?;
                    args.push((vars[0], is_ref));
                }
                self.code.skip();
                if !self.code.check_match(',')? {
                    break;
                }
            }
        }
        self.code.skip();
        if self.code.get()? != ')' {
            return Err(ParseError::at(
                self.code.line(),
                "expected ')' at end of argument list",
            ));
        }
        Ok(args)
    }

    fn parse_structure_definition(
        &mut self,
        attr: AttributeSet,
        params: Vec<TemplateParameter>,
    ) -> ParseResult<()> {
        if self.code.next_ident_or_literal() != "struct" {
            return Err(ParseError::at(self.code.line(), "bad structure definition"));
        }
        self.code.skip();
        let line = self.code.line();
        let name = self.code.next_ident_or_literal();
        validate_name(&name, "structure", line)?;
        let sid = StructId(self.ast.structures.len());
        self.ast.structures.push(UserStructure {
            name,
            members: Vec::new(),
            params,
            attributes: attr,
        });
        self.code.skip();
        if !self.code.check_match('{')? {
            return Err(ParseError::at(line, "expected '{' after struct name"));
        }
        let ctx = ContextRef::Structure(sid);
        let mut members = Vec::new();
        self.code.skip();
        while !self.code.check_match('}')? {
            self.code.skip();
            let (vars, _) = self.parse_variable_declaration(ctx, &AttributeSet::new(), false)?;
            members.extend(vars);
            self.code.skip();
            if !self.code.check_match(';')? {
                return Err(ParseError::at(
                    self.code.line(),
                    "structure member must end in semicolon",
                ));
            }
            self.code.skip();
        }
        self.ast.structures[sid.0].members = members;
        Ok(())
    }

    fn parse_function(
        &mut self,
        attr: AttributeSet,
        params: Vec<TemplateParameter>,
    ) -> ParseResult<()> {
        let fid = FuncId(self.ast.functions.len());
        self.ast.functions.push(crate::ast::Function {
            name: String::new(),
            return_type: None,
            arguments: Vec::new(),
            params,
            body: StmtId::NULL,
            attributes: attr,
        });
        let ctx = ContextRef::Function(fid);
        self.code.skip();
        let return_type = if self.code.peek_ident_or_literal() == "void" {
            self.code.next_ident_or_literal();
            None
        } else {
            Some(self.parse_data_type(ctx)?)
        };
        self.code.skip();
        let line = self.code.line();
        let name = self.code.next_ident_or_literal();
        validate_name(&name, "function", line)?;
        let arguments = self.parse_argument_list(ctx, &mut [])?;
        self.ast.functions[fid.0].return_type = return_type;
        self.ast.functions[fid.0].arguments = arguments;
        self.code.skip();
        let body = self.parse_statement(ctx)?;
        self.ast.functions[fid.0].body = body;
        // bound late so the body cannot call itself back into evaluation
        self.ast.functions[fid.0].name = name;
        Ok(())
    }

    fn parse_hw_block(&mut self, attr: AttributeSet) -> ParseResult<()> {
        self.code.next_ident_or_literal(); // consume block keyword
        self.code.skip();
        let line = self.code.line();
        let name = self.code.next_ident_or_literal();
        validate_name(&name, "hardware block", line)?;
        self.reporter.report_at(
            MessageLevel::Debug,
            Some(line),
            &format!("parsing block {name}"),
        );
        let bid = crate::ast::BlockId(self.ast.blocks.len());
        self.ast.blocks.push(HardwareBlock {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            body: StmtId::NULL,
            flags: flagset::FlagSet::default(),
            clock_freq: DEFAULT_CLOCK_FREQ,
            attributes: attr,
        });
        let ctx = ContextRef::HardwareBlock(bid);
        self.code.skip();

        let mut specials = vec![
            SpecialArg::new("clock", vec![TemplateParameter::int("frequency")]),
            SpecialArg::new("clken", Vec::new()),
            SpecialArg::new("input_valid", Vec::new()),
            SpecialArg::new("reset", Vec::new()),
        ];
        let input_list = self.parse_argument_list(ctx, &mut specials)?;
        let mut inputs = Vec::new();
        for (var, is_ref) in input_list {
            if is_ref {
                return Err(ParseError::at(
                    line,
                    "reference type not allowed as block input (consider using an output instead?)",
                ));
            }
            inputs.push(var);
        }
        self.ast.blocks[bid.0].inputs = inputs;
        let mut flags: flagset::FlagSet<BlockFlag> = flagset::FlagSet::default();
        if specials[0].found {
            flags |= BlockFlag::Clock;
            if specials[0].params[0].was_specified {
                let param = specials[0].params[0].clone();
                let freq = {
                    let mut eval = Evaluator::new(&self.ast, self.reporter);
                    eval.int_parameter_value(&param)
                        .map_err(|e| ParseError::at(line, e.message))?
                };
                self.ast.blocks[bid.0].clock_freq = freq.max(0) as u64;
            }
        }
        if specials[1].found {
            flags |= BlockFlag::ClockEnable;
        }
        if specials[2].found {
            flags |= BlockFlag::InputValid;
        }
        if specials[3].found {
            flags |= BlockFlag::SyncReset;
        }

        self.code.skip();
        if self.code.get_str(2)? != "=>" {
            return Err(ParseError::at(
                self.code.line(),
                "missing => after block input list",
            ));
        }
        self.code.skip();

        let mut out_specials = vec![SpecialArg::new("output_valid", Vec::new())];
        let output_list = self.parse_argument_list(ctx, &mut out_specials)?;
        let mut outputs = Vec::new();
        for (var, is_ref) in output_list {
            if is_ref {
                self.reporter.report_at(
                    MessageLevel::Warning,
                    Some(self.code.line()),
                    "ignoring reference type as block output",
                );
            }
            outputs.push(var);
        }
        self.ast.blocks[bid.0].outputs = outputs;
        if out_specials[0].found {
            flags |= BlockFlag::OutputValid;
        }
        self.ast.blocks[bid.0].flags = flags;

        let body = self.parse_statement(ctx)?;
        self.ast.blocks[bid.0].body = body;
        Ok(())
    }

    /// Parses an expression until one of `terminators` is reached at
    /// nesting depth zero. The terminator is not consumed.
    pub fn parse_expression(
        &mut self,
        terminators: &[char],
        ctx: ContextRef,
    ) -> ParseResult<ExprId> {
        // a modified shunting yard: tracks whether the previous token was
        // an operation to decide between prefix and postfix/binary tables
        let mut op_stack: Vec<OpStackItem> = Vec::new();
        let mut parse_stack: Vec<ExprId> = Vec::new();
        let mut done = false;
        let mut last_was_operation = true;
        self.code.skip();
        while !done {
            let line = self.code.line();
            let c = self.code.peek()?;
            let mut next_is_literal = c.is_ascii_digit();
            if !next_is_literal && last_was_operation && c == '-' {
                let two = self.code.peek_str(2);
                if two.chars().nth(1).is_some_and(|d| d.is_ascii_digit()) {
                    next_is_literal = true;
                }
            }
            if next_is_literal {
                let mut literal = String::new();
                if self.code.check_match('-')? {
                    literal.push('-');
                }
                literal.push_str(&self.code.next_ident_or_literal());
                let value: BitConstant =
                    literal.parse().map_err(|e: ParseError| e.with_line(line))?;
                parse_stack.push(self.ast.alloc_expr(Expression::Literal(value), line));
                last_was_operation = false;
            } else if c == '(' {
                self.code.get()?;
                op_stack.push(OpStackItem::LParen);
                last_was_operation = true;
            } else if c == ')' {
                while matches!(
                    op_stack.last(),
                    Some(OpStackItem::Oper(_)) | Some(OpStackItem::Colon)
                ) {
                    self.apply_from_op_stack(&mut op_stack, &mut parse_stack, line)?;
                }
                if matches!(op_stack.last(), Some(OpStackItem::LParen)) {
                    op_stack.pop();
                    self.code.get()?;
                    last_was_operation = false;
                } else if terminators.contains(&')') {
                    done = true;
                } else {
                    return Err(ParseError::at(line, "mismatched parentheses"));
                }
            } else if !self.code.peek_ident_or_literal().is_empty() {
                let next_ident = self.code.peek_ident_or_literal();
                if let Some(&kind) = BUILTIN_TOKENS.get(next_ident.as_str()) {
                    self.code.next_ident_or_literal();
                    self.code.skip();
                    if !self.code.check_match('(')? {
                        return Err(ParseError::at(
                            line,
                            "expected opening parentheses after builtin token",
                        ));
                    }
                    let operand = self.parse_expression(&[')'], ctx)?;
                    if !self.code.check_match(')')? {
                        return Err(ParseError::at(line, "invalid builtin argument list"));
                    }
                    parse_stack.push(
                        self.ast
                            .alloc_expr(Expression::Builtin { kind, operand }, line),
                    );
                } else if let Some(func) = self.ast.find_function(&next_ident) {
                    self.code.next_ident_or_literal();
                    let mut params = clone_parameter_set(&self.ast.functions[func.0].params);
                    self.parse_template_args(&mut params, ctx)?;
                    self.code.skip();
                    if !self.code.check_match('(')? {
                        return Err(ParseError::at(
                            line,
                            "expected argument list after function token",
                        ));
                    }
                    let args = self.parse_expression_list(ctx, ')')?;
                    self.code.skip();
                    if !self.code.check_match(')')? {
                        return Err(ParseError::at(line, "invalid function argument list"));
                    }
                    parse_stack.push(
                        self.ast
                            .alloc_expr(Expression::FunctionCall { func, args, params }, line),
                    );
                } else if self.is_data_type_keyword(&next_ident) {
                    // a type used as a value, e.g. __max(unsigned<8>)
                    let spec = self.parse_data_type(ctx)?;
                    parse_stack.push(self.ast.alloc_expr(Expression::TypeRef(spec), line));
                } else {
                    // a variable or variable-like construct
                    let expr = self.parse_var_expression(ctx)?;
                    parse_stack.push(expr);
                }
                last_was_operation = false;
            } else if terminators.contains(&c) {
                done = true;
            } else if c == '?' {
                self.code.get()?;
                while let Some(OpStackItem::Oper(top_ty)) = op_stack.last() {
                    if TERNARY_PRECEDENCE > lookup_operation(*top_ty).precedence {
                        self.apply_from_op_stack(&mut op_stack, &mut parse_stack, line)?;
                    } else {
                        break;
                    }
                }
                op_stack.push(OpStackItem::Question);
                last_was_operation = true;
            } else if c == ':' {
                self.code.get()?;
                while matches!(
                    op_stack.last(),
                    Some(OpStackItem::Oper(_)) | Some(OpStackItem::Colon)
                ) {
                    self.apply_from_op_stack(&mut op_stack, &mut parse_stack, line)?;
                }
                if !matches!(op_stack.last(), Some(OpStackItem::Question)) {
                    return Err(ParseError::at(line, "':' without matching '?'"));
                }
                op_stack.pop();
                op_stack.push(OpStackItem::Colon);
                last_was_operation = true;
            } else if c == '{' {
                self.code.get()?;
                let items = self.parse_expression_list(ctx, '}')?;
                if !self.code.check_match('}')? {
                    return Err(ParseError::at(line, "invalid initialiser list"));
                }
                parse_stack.push(self.ast.alloc_expr(Expression::InitialiserList(items), line));
                last_was_operation = false;
            } else {
                let found = if last_was_operation {
                    self.code
                        .find_token(&self.unary_prefix_tokens, true, false)
                        .map(|i| (self.unary_prefix_types[i], true))
                } else {
                    self.code
                        .find_token(&self.binary_postfix_tokens, true, false)
                        .map(|i| {
                            let ty = self.binary_postfix_types[i];
                            (ty, lookup_operation(ty).num_params != 1)
                        })
                };
                let Some((op_ty, next_last_was_operation)) = found else {
                    return Err(ParseError::at(
                        line,
                        format!("unexpected character {c} in expression"),
                    ));
                };
                let oper = lookup_operation(op_ty);
                while let Some(OpStackItem::Oper(top_ty)) = op_stack.last() {
                    let top = lookup_operation(*top_ty);
                    let apply = if oper.right_associative {
                        oper.precedence > top.precedence
                    } else {
                        oper.precedence >= top.precedence
                    };
                    if apply {
                        self.apply_from_op_stack(&mut op_stack, &mut parse_stack, line)?;
                    } else {
                        break;
                    }
                }
                op_stack.push(OpStackItem::Oper(op_ty));
                last_was_operation = next_last_was_operation;
            }
            self.code.skip();
        }

        let final_line = self.code.line();
        while let Some(top) = op_stack.last() {
            if matches!(top, OpStackItem::LParen) {
                return Err(ParseError::at(final_line, "mismatched parentheses"));
            }
            self.apply_from_op_stack(&mut op_stack, &mut parse_stack, final_line)?;
        }

        match parse_stack.len() {
            0 => Ok(ExprId::NULL),
            1 => Ok(parse_stack[0]),
            _ => Err(ParseError::at(
                final_line,
                "invalid expression (too many operands given?)",
            )),
        }
    }

    fn apply_from_op_stack(
        &mut self,
        op_stack: &mut Vec<OpStackItem>,
        parse_stack: &mut Vec<ExprId>,
        line: usize,
    ) -> ParseResult<()> {
        let top = op_stack.pop().ok_or_else(|| {
            ParseError::at(line, "invalid expression (operation stack underflow)")
        })?;
        match top {
            OpStackItem::Oper(ty) => {
                let info = lookup_operation(ty);
                let mut operands = Vec::with_capacity(info.num_params as usize);
                for _ in 0..info.num_params {
                    let operand = parse_stack.pop().ok_or_else(|| {
                        ParseError::at(line, "invalid expression (too few operands)")
                    })?;
                    // reversed: the stack pops operands right to left
                    operands.insert(0, operand);
                }
                parse_stack.push(
                    self.ast
                        .alloc_expr(Expression::Operation { op: ty, operands }, line),
                );
            }
            OpStackItem::Colon => {
                if parse_stack.len() < 3 {
                    return Err(ParseError::at(line, "invalid conditional expression"));
                }
                let if_false = parse_stack.pop().unwrap();
                let if_true = parse_stack.pop().unwrap();
                let condition = parse_stack.pop().unwrap();
                parse_stack.push(self.ast.alloc_expr(
                    Expression::Conditional {
                        condition,
                        if_true,
                        if_false,
                    },
                    line,
                ));
            }
            OpStackItem::Question => {
                return Err(ParseError::at(line, "'?' without matching ':'"));
            }
            OpStackItem::LParen => {}
        }
        Ok(())
    }

    /// Parses a comma separated list of expressions, ending at `term`. The
    /// terminator is not consumed.
    fn parse_expression_list(&mut self, ctx: ContextRef, term: char) -> ParseResult<Vec<ExprId>> {
        let mut list = Vec::new();
        if self.code.peek()? == term {
            return Ok(list);
        }
        loop {
            list.push(self.parse_expression(&[',', term], ctx)?);
            self.code.skip();
            if !self.code.check_match(',')? {
                break;
            }
        }
        Ok(list)
    }

    /// Parses an identifier with any `[...]` and `.member` suffixes. A name
    /// resolving to a template parameter yields a parameter token instead.
    fn parse_var_expression(&mut self, ctx: ContextRef) -> ParseResult<ExprId> {
        let line = self.code.line();
        let name = self.code.next_ident_or_literal();
        let mut expr = if self.ast.is_template_parameter(ctx, &name) {
            let (context, index) = self.ast.find_template_parameter(ctx, &name)?;
            self.ast
                .alloc_expr(Expression::TemplateParam { context, index }, line)
        } else {
            let var = self
                .ast
                .find_variable(ctx, &name)
                .map_err(|e| e.with_line(line))?;
            self.ast.alloc_expr(Expression::Variable(var), line)
        };
        self.code.skip();
        while !self.code.at_end() {
            if self.code.check_match('[')? {
                let indices = self.parse_expression_list(ctx, ']')?;
                if !self.code.check_match(']')? {
                    return Err(ParseError::at(self.code.line(), "expected end of array index"));
                }
                expr = self.ast.alloc_expr(
                    Expression::ArraySubscript {
                        base: expr,
                        indices,
                    },
                    line,
                );
            } else if self.code.check_match('.')? {
                let member = self.code.next_ident_or_literal();
                if member.is_empty() {
                    return Err(ParseError::at(
                        self.code.line(),
                        "expected a structure member name",
                    ));
                }
                expr = self
                    .ast
                    .alloc_expr(Expression::MemberAccess { base: expr, member }, line);
            } else {
                break;
            }
            self.code.skip();
        }
        Ok(expr)
    }
}

fn validate_name(name: &str, what: &str, line: usize) -> ParseResult<()> {
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        Err(ParseError::at(line, format!("invalid name for {what}")))
    } else {
        Ok(())
    }
}

/// Splits a colon-separated path list; components may be double-quoted to
/// contain colons.
pub fn parse_include_dirs(value: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = value;
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('"') {
            match stripped.find('"') {
                Some(end) => {
                    paths.push(stripped[..end].to_string());
                    rest = &stripped[end + 1..];
                    rest = rest.strip_prefix(':').unwrap_or(rest);
                }
                None => break,
            }
        } else {
            match rest.find(':') {
                Some(sep) => {
                    if sep > 0 {
                        paths.push(rest[..sep].to_string());
                    }
                    rest = &rest[sep + 1..];
                }
                None => {
                    paths.push(rest.to_string());
                    break;
                }
            }
        }
    }
    paths
}

/// Locates a file on the include path (and the working directory for
/// `"..."` includes).
fn find_file(filename: &str, include_cwd: bool) -> Option<PathBuf> {
    let mut bases: Vec<PathBuf> = Vec::new();
    if include_cwd {
        if let Ok(cwd) = std::env::current_dir() {
            bases.push(cwd);
        }
    }
    if let Ok(value) = std::env::var(INCLUDE_PATH_VAR) {
        bases.extend(parse_include_dirs(&value).into_iter().map(PathBuf::from));
    }
    bases
        .into_iter()
        .map(|base| base.join(filename))
        .find(|path| path.exists())
}
