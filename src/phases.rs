//! The compilation pipeline, one function per phase: load, parse, select
//! the top block, evaluate, lower, annotate, prune and emit.

use std::path::Path;

use crate::ast::{Ast, BlockId};
use crate::error::{Error, EvalResult, ParseError, ParseResult};
use crate::eval::Evaluator;
use crate::hdl::timing::UnitDelayModel;
use crate::lexer::ParserState;
use crate::parser::EccParser;
use crate::report::Reporter;
use crate::synth::{make_hdl_design, SynthContext};

/// Reads a source file into a scanner.
pub fn load_code(path: &Path) -> Result<ParserState, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("failed to open input file ==={}===: {e}", path.display())))?;
    Ok(ParserState::new(&text, path.display().to_string()))
}

/// Parses a whole source into an AST. Per-element parse errors are
/// reported and recovered; callers should consult the reporter's error
/// count before continuing to evaluation.
pub fn do_parse(code: ParserState, reporter: &Reporter) -> ParseResult<Ast> {
    reporter.debug("starting parse");
    let mut parser = EccParser::new(code, reporter)?;
    parser.parse_all()?;
    Ok(parser.into_ast())
}

/// Picks the top-level hardware block: the only one, or the one named by
/// `top`. `Ok(None)` means the design has no blocks at all.
pub fn select_top_block(
    ast: &Ast,
    top: Option<&str>,
    reporter: &Reporter,
) -> Result<Option<BlockId>, Error> {
    if ast.blocks.is_empty() {
        reporter.note("design contains no hardware blocks, nothing to do");
        return Ok(None);
    }
    match top {
        Some(name) => ast
            .blocks
            .iter()
            .position(|b| b.name == name)
            .map(|i| Some(BlockId(i)))
            .ok_or_else(|| {
                Error::Parse(ParseError::new(format!(
                    "hardware block ==={name}=== was not found in design"
                )))
            }),
        None if ast.blocks.len() > 1 => Err(Error::Parse(ParseError::new(
            "multiple hardware blocks found but none specified, use --top to specify one",
        ))),
        None => Ok(Some(BlockId(0))),
    }
}

/// Evaluates one hardware block, producing the per-variable value graph.
pub fn evaluate_block<'a>(
    ast: &'a Ast,
    reporter: &'a Reporter,
    block: BlockId,
) -> EvalResult<Evaluator<'a>> {
    reporter.note(&format!(
        "evaluating block ==={}===",
        ast.blocks[block.0].name
    ));
    let mut eval = Evaluator::new(ast, reporter);
    eval.evaluate_block(block)?;
    Ok(eval)
}

/// Lowers an evaluated block to a netlist, prunes dead logic and runs the
/// timing and latency annotation passes.
pub fn lower_block(eval: &mut Evaluator, block: BlockId) -> EvalResult<SynthContext> {
    let mut sc = make_hdl_design(eval, block)?;
    sc.design.prune();
    sc.design.annotate_timing(&UnitDelayModel);
    sc.design.annotate_latency();
    Ok(sc)
}

/// Compiles one source text to VHDL; the convenience path used by the CLI
/// and the integration tests. Returns the entity name and the VHDL text.
pub fn compile_to_vhdl(
    source: &str,
    filename: &str,
    top: Option<&str>,
    reporter: &Reporter,
) -> Result<Option<(String, String)>, Error> {
    let code = ParserState::new(source, filename);
    let ast = do_parse(code, reporter)?;
    if reporter.error_count() > 0 {
        return Err(Error::Parse(ParseError::new(
            "compilation failed due to parse errors",
        )));
    }
    let Some(block) = select_top_block(&ast, top, reporter)? else {
        return Ok(None);
    };
    let mut eval = evaluate_block(&ast, reporter, block)?;
    let sc = lower_block(&mut eval, block)?;
    let vhdl = sc.design.generate_vhdl()?;
    Ok(Some((sc.design.name.clone(), vhdl)))
}

/// Writes a generated VHDL file, replacing any previous output.
pub fn write_vhdl(vhdl: &str, path: &Path) -> Result<(), Error> {
    std::fs::write(path, vhdl).map_err(|e| {
        Error::Io(format!(
            "failed to open output file ==={}===: {e}",
            path.display()
        ))
    })
}
