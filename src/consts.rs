//! Static keyword tables the parser dispatches on, and the built-in core
//! header that is quietly included before user code.

use phf::{phf_map, phf_set};

use crate::ast::{BuiltinKind, VariableQualifier};
use crate::types::BasicType;

/// Names of the built-in parametric types.
pub static BASIC_TYPE_NAMES: phf::Map<&'static str, BasicType> = phf_map! {
    "unsigned" => BasicType::Unsigned,
    "signed" => BasicType::Signed,
    "stream" => BasicType::Stream,
    "stream2d" => BasicType::Stream2d,
    "ram" => BasicType::Ram,
    "rom" => BasicType::Rom,
};

/// Builtin pseudo-function tokens.
pub static BUILTIN_TOKENS: phf::Map<&'static str, BuiltinKind> = phf_map! {
    "sizeof" => BuiltinKind::Sizeof,
    "__widthof" => BuiltinKind::WidthOf,
    "__length" => BuiltinKind::Length,
    "__min" => BuiltinKind::Min,
    "__max" => BuiltinKind::Max,
};

/// Variable qualifier keywords.
pub static VARIABLE_QUALIFIERS: phf::Map<&'static str, VariableQualifier> = phf_map! {
    "static" => VariableQualifier::Static,
    "const" => VariableQualifier::Const,
    "register" => VariableQualifier::Register,
};

/// Keywords that start a type and therefore a declaration or function.
/// `fifo` is reserved but has no resolvable type yet.
pub static DATA_TYPE_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "auto", "unsigned", "signed", "ram", "rom", "stream", "stream2d", "fifo", "void",
    "decltype",
};

/// Name of the core header included before user code.
pub const CORE_HEADER_NAME: &str = "elasticcore.ech";

/// Contents of the built-in core header, used when no file of that name is
/// found on the include path. Keeps a bare checkout self-contained.
pub const CORE_HEADER: &str = "\
/* ElasticC built-in core definitions */
typedef unsigned<1> bit;
typedef unsigned<8> byte;
typedef signed<32> int;
typedef unsigned<32> uint;
typedef unsigned<8> u8;
typedef unsigned<16> u16;
typedef unsigned<32> u32;
typedef unsigned<64> u64;
typedef signed<8> s8;
typedef signed<16> s16;
typedef signed<32> s32;
typedef signed<64> s64;
";

/// Environment variable holding the colon-separated include path.
pub const INCLUDE_PATH_VAR: &str = "ELASTICC_INCDIR";
