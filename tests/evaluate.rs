use std::collections::HashSet;

use elasticc::ast::Ast;
use elasticc::eval::{EvalObject, Evaluator, ObjId, SpecialOperation};
use elasticc::lexer::ParserState;
use elasticc::ops::OperationType;
use elasticc::phases::{do_parse, evaluate_block, select_top_block};
use elasticc::report::{MessageLevel, Reporter};

fn parse(source: &str, reporter: &Reporter) -> Ast {
    let ast = do_parse(ParserState::new(source, "test.ecc"), reporter).unwrap();
    assert_eq!(reporter.error_count(), 0);
    ast
}

fn evaluate<'a>(ast: &'a Ast, reporter: &'a Reporter) -> Evaluator<'a> {
    let block = select_top_block(ast, None, reporter).unwrap().unwrap();
    evaluate_block(ast, reporter, block).unwrap()
}

fn output_value(eval: &Evaluator, name: &str) -> ObjId {
    let id = eval
        .variable_ids()
        .find(|&v| eval.var(v).name == name)
        .expect("output variable exists");
    eval.value_for(id)
}

fn count_ops(eval: &Evaluator, root: ObjId, wanted: OperationType) -> usize {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut count = 0;
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        if let EvalObject::Operation { op, .. } = eval.obj(node) {
            if *op == wanted {
                count += 1;
            }
        }
        stack.extend(eval.operands(node));
    }
    count
}

#[test]
fn loop_unrolls_into_addition_chain() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block acc(unsigned<8> a[4]) => (unsigned<8> s) {\n\
             s = 0;\n\
             for (unsigned<4> i = 0; i < 4; ++i) {\n\
                 s = s + a[i];\n\
             }\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "s");
    assert_eq!(count_ops(&eval, value, OperationType::Add), 4);
}

#[test]
fn while_loop_unrolls_like_for() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block twice(unsigned<8> a) => (unsigned<16> o) {\n\
             o = a;\n\
             unsigned<4> n = 2;\n\
             while (n > 0) {\n\
                 o = o + o;\n\
                 n = n - 1;\n\
             }\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    assert_eq!(count_ops(&eval, value, OperationType::Add), 2);
}

#[test]
fn non_constant_loop_condition_is_rejected() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block bad(unsigned<4> n) => (unsigned<8> o) {\n\
             o = 0;\n\
             for (unsigned<4> i = 0; i < n; ++i) { o = o + 1; }\n\
         }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err.message.contains("compile-time constant condition"));
}

#[test]
fn non_constant_array_index_is_rejected() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block sel(unsigned<2> i, unsigned<8> v[4]) => (unsigned<8> o) { o = v[i]; }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err
        .message
        .contains("non-constant array indices are not yet implemented"));
}

#[test]
fn out_of_bounds_constant_index_is_rejected() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block oob(unsigned<8> v[4]) => (unsigned<8> o) { o = v[4]; }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err.message.contains("out of bounds"));
}

#[test]
fn conditional_writes_merge_into_select_tree() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block pick(unsigned<8> a, unsigned<8> b) => (unsigned<8> o) {\n\
             if (a > b) { o = a; } else { o = b; }\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    let EvalObject::Special {
        op: SpecialOperation::Cond,
        operands,
        ..
    } = eval.obj(value)
    else {
        panic!("conditional write produced {:?}", eval.obj(value));
    };
    // selector is the comparison, both branches are real values
    assert!(matches!(
        eval.obj(operands[0]),
        EvalObject::Operation {
            op: OperationType::Gt,
            ..
        }
    ));
    assert!(matches!(eval.obj(operands[1]), EvalObject::Variable(_)));
    assert!(matches!(eval.obj(operands[2]), EvalObject::Variable(_)));
}

#[test]
fn partial_conditional_write_keeps_dont_care() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block maybe(unsigned<8> a) => (unsigned<8> o) {\n\
             if (a > 10) { o = a; }\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    let EvalObject::Special {
        op: SpecialOperation::Cond,
        operands,
        ..
    } = eval.obj(value)
    else {
        panic!("expected select tree");
    };
    assert!(matches!(eval.obj(operands[1]), EvalObject::Variable(_)));
    assert!(matches!(eval.obj(operands[2]), EvalObject::DontCare(_)));
}

#[test]
fn template_function_resolves_and_folds_max() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "template<int W> unsigned<W> saturate(unsigned<W+1> x) {\n\
             return x > __max(unsigned<W>) ? __max(unsigned<W>) : x;\n\
         }\n\
         block top(unsigned<9> x) => (unsigned<8> o) { o = saturate<8>(x); }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    // the saturation point folded to the constant 255 somewhere in the tree
    let mut stack = vec![value];
    let mut seen = HashSet::new();
    let mut found_255 = false;
    let mut found_select = false;
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        match eval.obj(node) {
            EvalObject::Constant(c) if c.int_value() == 255 => found_255 = true,
            EvalObject::Special {
                op: SpecialOperation::Cond,
                ..
            } => found_select = true,
            _ => {}
        }
        stack.extend(eval.operands(node));
    }
    assert!(found_255, "__max(unsigned<8>) folded to 255");
    assert!(found_select, "ternary lowered to a select");
}

#[test]
fn function_calls_inline_with_by_reference_writeback() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "void bump(unsigned<8> &v, unsigned<8> amount) { v = v + amount; }\n\
         block top(unsigned<8> a) => (unsigned<8> o) {\n\
             unsigned<8> t = a;\n\
             bump(t, 3);\n\
             o = t;\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    assert_eq!(count_ops(&eval, value, OperationType::Add), 1);
}

#[test]
fn builtins_fold_to_constants() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block b(unsigned<8> v[4]) => (unsigned<8> o) {\n\
             o = __length(v) + __widthof(unsigned<13>) + sizeof(unsigned<13>);\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    // 4 + 13 + 2, folded during evaluation
    match eval.obj(value) {
        EvalObject::Cast { operand, .. } => match eval.obj(*operand) {
            EvalObject::Constant(c) => assert_eq!(c.int_value(), 19),
            other => panic!("expected folded constant, got {other:?}"),
        },
        EvalObject::Constant(c) => assert_eq!(c.int_value(), 19),
        other => panic!("expected folded constant, got {other:?}"),
    }
}

#[test]
fn static_variable_reads_come_from_register() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block mac(clock, unsigned<8> a, unsigned<8> b) => (unsigned<16> acc) {\n\
             static unsigned<16> r = 0;\n\
             r = r + a * b;\n\
             acc = r;\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    // acc reads the register itself, not the newly written value
    let acc = output_value(&eval, "acc");
    let EvalObject::Variable(r) = eval.obj(acc) else {
        panic!("acc wired to the static register");
    };
    assert!(eval.var(*r).dir.is_input);
    assert_eq!(eval.var(*r).default_value.as_ref().map(|d| d.int_value()), Some(0));
    // the written value chains multiply into add
    let wrval = eval
        .variable_ids()
        .find(|&v| eval.var(v).name.ends_with("__wrval"))
        .unwrap();
    let wrval_value = eval.value_for(wrval);
    assert_eq!(count_ops(&eval, wrval_value, OperationType::Mul), 1);
    assert_eq!(count_ops(&eval, wrval_value, OperationType::Add), 1);
}

#[test]
fn rom_access_drives_address_and_reads_q() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block lookup(unsigned<4> i) => (unsigned<8> o) {\n\
             rom<unsigned<8>, 16> t;\n\
             o = t[i];\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let address = eval
        .variable_ids()
        .find(|&v| eval.var(v).name.ends_with("_address"))
        .unwrap();
    assert_eq!(eval.var(address).ty.width(), 4);
    // address is driven from the block input
    let addr_value = eval.value_for(address);
    let mut node = addr_value;
    if let EvalObject::Cast { operand, .. } = eval.obj(node) {
        node = *operand;
    }
    assert!(matches!(eval.obj(node), EvalObject::Variable(_)));
    // the output reads the q port
    let o = output_value(&eval, "o");
    let EvalObject::Variable(q) = eval.obj(o) else {
        panic!("output wired to q");
    };
    assert!(eval.var(*q).name.ends_with("_q"));
}

#[test]
fn rom_writes_are_rejected() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block bad(unsigned<4> i) => (unsigned<8> o) {\n\
             rom<unsigned<8>, 16> t;\n\
             t[0] = 1;\n\
             o = t[i];\n\
         }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err.message.contains("ROM"));
}

#[test]
fn stream_push_sets_strobe_and_value() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block smooth(clock, stream<unsigned<8>, 3> s) => (unsigned<10> o) {\n\
             o = s[0] + s[1] + s[2];\n\
             s << s[0];\n\
         }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let wren = eval
        .variable_ids()
        .find(|&v| eval.var(v).name.ends_with("__wren"))
        .unwrap();
    let wren_value = eval.value_for(wren);
    let mut node = wren_value;
    if let EvalObject::Cast { operand, .. } = eval.obj(node) {
        node = *operand;
    }
    match eval.obj(node) {
        EvalObject::Constant(c) => assert_eq!(c.int_value(), 1),
        other => panic!("push strobe should be constant one, got {other:?}"),
    }
}

#[test]
fn direct_stream_assignment_is_rejected() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block bad(stream<unsigned<8>, 3> s) => (unsigned<8> o) {\n\
             s = 1;\n\
             o = s[0];\n\
         }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err.message.contains("operator<<"));
}

#[test]
fn global_constants_fold() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "const unsigned<8> BIAS = 7;\n\
         block top(unsigned<8> a) => (unsigned<9> o) { o = a + BIAS; }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    let mut found = false;
    let mut stack = vec![value];
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        if let EvalObject::Constant(c) = eval.obj(node) {
            if c.int_value() == 7 {
                found = true;
            }
        }
        stack.extend(eval.operands(node));
    }
    assert!(found, "global constant folded into the expression");
}

#[test]
fn structure_members_access_children() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "struct point { unsigned<8> x; unsigned<8> y; };\n\
         block mag(point p) => (unsigned<9> o) { o = p.x + p.y; }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let value = output_value(&eval, "o");
    assert_eq!(count_ops(&eval, value, OperationType::Add), 1);
    assert!(eval.variable_ids().any(|v| eval.var(v).name == "p_x"));
    assert!(eval.variable_ids().any(|v| eval.var(v).name == "p_y"));
}

#[test]
fn bit_offsets_tile_aggregates() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "struct rgb { unsigned<8> r; unsigned<8> g; unsigned<8> b; };\n\
         block pass(rgb c) => (unsigned<8> o) { o = c.g; }",
        &reporter,
    );
    let eval = evaluate(&ast, &reporter);
    let parent = eval
        .variable_ids()
        .find(|&v| eval.var(v).name == "c")
        .unwrap();
    let children = eval.all_children(parent);
    let mut offsets: Vec<(usize, usize)> = children
        .iter()
        .map(|&c| (eval.var(c).bit_offset, eval.var(c).ty.width()))
        .collect();
    offsets.sort();
    // children tile [0, width) without gaps or overlaps
    let mut expected = 0;
    for (offset, width) in offsets {
        assert_eq!(offset, expected);
        expected = offset + width;
    }
    assert_eq!(expected, eval.var(parent).ty.width());
}

#[test]
fn division_is_rejected_during_evaluation() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let ast = parse(
        "block bad(unsigned<8> a, unsigned<8> b) => (unsigned<8> o) { o = a / b; }",
        &reporter,
    );
    let block = select_top_block(&ast, None, &reporter).unwrap().unwrap();
    let err = evaluate_block(&ast, &reporter, block).unwrap_err();
    assert!(err.message.contains("division"));
}
