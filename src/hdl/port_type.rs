//! VHDL-facing port types and the cast lattice between them.
//!
//! Any aggregate casts to a logic vector of the same width; a logic vector
//! casts to a numeric vector of the requested width through `unsigned`/
//! `signed` and `resize`.

/// The type of a signal or device port as it appears in VHDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HdlPortType {
    /// A single `std_logic`.
    Logic,
    /// A clock; electrically a `std_logic`.
    Clock,
    /// `std_logic_vector(width-1 downto 0)`.
    LogicVector(usize),
    /// `unsigned`/`signed(width-1 downto 0)`.
    Numeric {
        /// Width in bits.
        width: usize,
        /// Whether the vector is `signed`.
        signed: bool,
    },
}

fn zeros(n: usize) -> String {
    format!("\"{}\"", "0".repeat(n))
}

impl HdlPortType {
    /// The VHDL spelling of this type.
    pub fn vhdl_type(&self) -> String {
        match self {
            HdlPortType::Logic | HdlPortType::Clock => "std_logic".to_string(),
            HdlPortType::LogicVector(width) => {
                format!("std_logic_vector({} downto 0)", width.saturating_sub(1))
            }
            HdlPortType::Numeric { width, signed } => format!(
                "{}({} downto 0)",
                if *signed { "signed" } else { "unsigned" },
                width.saturating_sub(1)
            ),
        }
    }

    /// Width in bits.
    pub fn width(&self) -> usize {
        match self {
            HdlPortType::Logic | HdlPortType::Clock => 1,
            HdlPortType::LogicVector(width) => *width,
            HdlPortType::Numeric { width, .. } => *width,
        }
    }

    /// Whether values of this type are signed.
    pub fn is_signed(&self) -> bool {
        matches!(self, HdlPortType::Numeric { signed: true, .. })
    }

    /// An all-zero literal of this type.
    pub fn zero(&self) -> String {
        match self {
            HdlPortType::Logic | HdlPortType::Clock => "'0'".to_string(),
            HdlPortType::LogicVector(width) => zeros(*width),
            HdlPortType::Numeric { width, signed } => format!(
                "{}'({})",
                if *signed { "signed" } else { "unsigned" },
                zeros(*width)
            ),
        }
    }

    /// A VHDL expression coercing `value`, of type `other`, into this
    /// type.
    pub fn cast_from(&self, other: &HdlPortType, value: &str) -> String {
        match self {
            HdlPortType::Logic | HdlPortType::Clock => match other {
                HdlPortType::Logic | HdlPortType::Clock => value.to_string(),
                _ => format!("{value}(0)"),
            },
            HdlPortType::LogicVector(width) => match other {
                HdlPortType::Logic | HdlPortType::Clock => {
                    format!("std_logic_vector({} & {value})", zeros(width.saturating_sub(1)))
                }
                HdlPortType::Numeric { .. } => {
                    format!("std_logic_vector(resize({value}, {width}))")
                }
                HdlPortType::LogicVector(other_width) => {
                    let mut out = String::new();
                    if width > other_width {
                        out.push_str(&format!("{} & ", zeros(width - other_width)));
                    }
                    out.push_str(value);
                    if width < other_width {
                        out.push_str(&format!("({} downto 0)", width.saturating_sub(1)));
                    }
                    out
                }
            },
            HdlPortType::Numeric { width, signed } => {
                let kw = if *signed { "signed" } else { "unsigned" };
                let (current, same_signedness) = match other {
                    HdlPortType::Numeric {
                        signed: other_signed,
                        ..
                    } => (value.to_string(), other_signed == signed),
                    _ => (
                        HdlPortType::LogicVector(other.width()).cast_from(other, value),
                        false,
                    ),
                };
                let mut out = if same_signedness {
                    current
                } else {
                    format!("{kw}({current})")
                };
                if other.width() != *width {
                    out = format!("resize({out}, {width})");
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cast_resizes_and_wraps() {
        let to = HdlPortType::Numeric {
            width: 9,
            signed: false,
        };
        let from = HdlPortType::Numeric {
            width: 8,
            signed: false,
        };
        assert_eq!(to.cast_from(&from, "a"), "resize(a, 9)");

        let from_signed = HdlPortType::Numeric {
            width: 9,
            signed: true,
        };
        assert_eq!(to.cast_from(&from_signed, "b"), "unsigned(b)");
    }

    #[test]
    fn vector_from_numeric() {
        let to = HdlPortType::LogicVector(8);
        let from = HdlPortType::Numeric {
            width: 8,
            signed: false,
        };
        assert_eq!(to.cast_from(&from, "x"), "std_logic_vector(resize(x, 8))");
    }
}
