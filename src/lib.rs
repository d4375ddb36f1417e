//! elasticc is a high-level synthesis compiler: it translates the
//! ElasticC hardware description language, a C-like language with
//! fixed-width integers, templates, streams and external memories, into a
//! synthesisable VHDL netlist.
//!
//! The pipeline runs strictly forward: source text is scanned and parsed
//! into an arena-backed AST ([`parser`], [`ast`]), the single-cycle
//! evaluator symbolically executes it, unrolling loops and inlining
//! functions until every variable is bound to a dataflow expression
//! ([`eval`]), synthesis lowers those expressions into a netlist of
//! signals and devices ([`synth`], [`hdl`]), and the design is emitted as
//! one VHDL entity per hardware block.
//!
//! # Examples
//!
//! ```
//! use elasticc::phases::compile_to_vhdl;
//! use elasticc::report::{MessageLevel, Reporter};
//!
//! let reporter = Reporter::plain(MessageLevel::Error);
//! let source = "block add(unsigned<8> a, unsigned<8> b) => (unsigned<9> s) { s = a + b; }";
//! let (entity, vhdl) = compile_to_vhdl(source, "add.ecc", None, &reporter)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(entity, "add");
//! assert!(vhdl.contains("entity add is"));
//! ```

#![warn(missing_docs)]

pub mod ast;
pub mod attributes;
pub mod bitconst;
pub mod consts;
pub mod error;
pub mod eval;
pub mod hdl;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod phases;
pub mod report;
pub mod synth;
pub mod template;
pub mod types;

pub use ast::Ast;
pub use bitconst::BitConstant;
pub use error::{Error, EvalError, ParseError};
pub use eval::Evaluator;
pub use hdl::HdlDesign;
pub use lexer::ParserState;
pub use parser::EccParser;
pub use report::{MessageLevel, Reporter};
pub use synth::SynthContext;
