use elasticc::ast::{Ast, BlockFlag, ContextRef, Expression, Statement};
use elasticc::lexer::ParserState;
use elasticc::ops::OperationType;
use elasticc::phases::do_parse;
use elasticc::report::{MessageLevel, Reporter};

fn parse(source: &str) -> Ast {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = do_parse(ParserState::new(source, "test.ecc"), &reporter).unwrap();
    assert_eq!(reporter.error_count(), 0, "unexpected parse errors");
    ast
}

#[test]
fn block_header_with_specials() {
    let ast = parse(
        "block filter(clock<100000000>, clken, input_valid, reset, \
         unsigned<8> pixel) => (output_valid, unsigned<8> result) { result = pixel; }",
    );
    assert_eq!(ast.blocks.len(), 1);
    let blk = &ast.blocks[0];
    assert_eq!(blk.name, "filter");
    assert!(blk.flags.contains(BlockFlag::Clock));
    assert!(blk.flags.contains(BlockFlag::ClockEnable));
    assert!(blk.flags.contains(BlockFlag::InputValid));
    assert!(blk.flags.contains(BlockFlag::SyncReset));
    assert!(blk.flags.contains(BlockFlag::OutputValid));
    assert_eq!(blk.clock_freq, 100_000_000);
    assert_eq!(blk.inputs.len(), 1);
    assert_eq!(blk.outputs.len(), 1);
    assert_eq!(ast.variable(blk.inputs[0]).name, "pixel");
}

#[test]
fn default_clock_frequency() {
    let ast = parse("block b(clock, unsigned<1> i) => (unsigned<1> o) { o = i; }");
    assert_eq!(ast.blocks[0].clock_freq, 50_000_000);
}

#[test]
fn operator_precedence_shape() {
    let ast = parse("block b(unsigned<8> a, unsigned<8> c) => (unsigned<8> s) { s = a + a * c; }");
    let body = ast.blocks[0].body;
    let Statement::Block { content, .. } = &ast.stmt(body).kind else {
        panic!("block body is a statement block");
    };
    let Statement::Expression(expr) = &ast.stmt(content[0]).kind else {
        panic!("first statement is an expression");
    };
    let Expression::Operation { op, operands } = &ast.expr(*expr).kind else {
        panic!("assignment expression expected");
    };
    assert_eq!(*op, OperationType::Assign);
    let Expression::Operation { op, operands } = &ast.expr(operands[1]).kind else {
        panic!("addition on the right-hand side");
    };
    assert_eq!(*op, OperationType::Add);
    // multiplication binds tighter than addition
    let Expression::Operation { op, .. } = &ast.expr(operands[1]).kind else {
        panic!("multiplication nested under addition");
    };
    assert_eq!(*op, OperationType::Mul);
}

#[test]
fn shadowing_resolves_innermost() {
    let ast = parse(
        "block b(unsigned<8> x) => (unsigned<8> o) { unsigned<8> y = x; { unsigned<8> y = 0; o = y; } }",
    );
    let body = ast.blocks[0].body;
    let Statement::Block { content, .. } = &ast.stmt(body).kind else {
        panic!("block body");
    };
    let inner = content[1];
    let Statement::Block { content: inner_content, .. } = &ast.stmt(inner).kind else {
        panic!("inner block");
    };
    let Statement::Expression(assign) = &ast.stmt(inner_content[1]).kind else {
        panic!("assignment in inner block");
    };
    let Expression::Operation { operands, .. } = &ast.expr(*assign).kind else {
        panic!("assignment");
    };
    let Expression::Variable(var) = &ast.expr(operands[1]).kind else {
        panic!("variable read");
    };
    // the read resolves to the inner declaration
    assert_eq!(ast.variable(*var).context, ContextRef::Block(inner));
}

#[test]
fn structs_functions_and_typedefs() {
    let ast = parse(
        "typedef unsigned<12> sample;\n\
         struct pair { sample first; sample second; };\n\
         sample add_samples(sample a, sample b) { return a + b; }\n\
         block top(pair p) => (sample o) { o = add_samples(p.first, p.second); }",
    );
    assert_eq!(ast.structures.len(), 1);
    assert_eq!(ast.structures[0].name, "pair");
    assert_eq!(ast.structures[0].members.len(), 2);
    assert_eq!(ast.functions.len(), 1);
    assert_eq!(ast.functions[0].name, "add_samples");
    assert_eq!(ast.functions[0].arguments.len(), 2);
    assert_eq!(ast.blocks.len(), 1);
}

#[test]
fn template_definitions_bind_to_functions() {
    let ast = parse(
        "template<int W> unsigned<W> ident(unsigned<W> x) { return x; }\n\
         block top(unsigned<4> i) => (unsigned<4> o) { o = ident<4>(i); }",
    );
    assert_eq!(ast.functions[0].params.len(), 1);
    assert_eq!(ast.functions[0].params[0].name, "W");
}

#[test]
fn pragmas_and_attributes_are_collected() {
    let ast = parse(
        "#pragma synth_style fast\n\
         [[keep]] block top(unsigned<1> i) => (unsigned<1> o) { o = i; }",
    );
    assert_eq!(ast.pragmas, vec!["synth_style fast".to_string()]);
    assert!(ast.blocks[0].attributes.has("keep"));
}

#[test]
fn comments_are_skipped() {
    let ast = parse(
        "// line comment\n/* block\ncomment */ block top(unsigned<1> i) => (unsigned<1> o) { o = i; /* inline */ }",
    );
    assert_eq!(ast.blocks.len(), 1);
}

#[test]
fn core_header_typedefs_available() {
    let ast = parse("block top(u8 i) => (u8 o) { o = i; }");
    assert_eq!(ast.blocks.len(), 1);
}

#[test]
fn parse_error_recovers_at_top_level() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let source = "garbage!!;\nblock top(unsigned<1> i) => (unsigned<1> o) { o = i; }";
    let ast = do_parse(ParserState::new(source, "bad.ecc"), &reporter).unwrap();
    assert!(reporter.error_count() > 0);
    // the next top-level element still parsed
    assert_eq!(ast.blocks.len(), 1);
}

#[test]
fn line_numbers_attach_to_statements() {
    let ast = parse("block top(unsigned<1> i) => (unsigned<1> o)\n{\n    o = i;\n}");
    let body = ast.blocks[0].body;
    let Statement::Block { content, .. } = &ast.stmt(body).kind else {
        panic!("block body");
    };
    assert_eq!(ast.stmt(content[0]).line, 3);
}
