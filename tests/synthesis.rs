use elasticc::phases::compile_to_vhdl;
use elasticc::report::{MessageLevel, Reporter};

fn compile(source: &str) -> (String, String) {
    let reporter = Reporter::plain(MessageLevel::Error);
    compile_to_vhdl(source, "test.ecc", None, &reporter)
        .expect("compilation succeeds")
        .expect("design has a block")
}

#[test]
fn adder_entity_and_ports() {
    let (entity, vhdl) = compile(
        "block add(unsigned<8> a, unsigned<8> b) => (unsigned<9> s) { s = a + b; }",
    );
    assert_eq!(entity, "add");
    assert!(vhdl.contains("entity add is"));
    assert!(vhdl.contains("a : in unsigned(7 downto 0)"));
    assert!(vhdl.contains("b : in unsigned(7 downto 0)"));
    assert!(vhdl.contains("s : out unsigned(8 downto 0)"));
    assert!(vhdl.contains(" + "));
    // purely combinational: no registers
    assert!(!vhdl.contains("rising_edge"));
}

#[test]
fn entity_ports_listed_exactly_once() {
    let (_, vhdl) = compile(
        "block add(unsigned<8> a, unsigned<8> b) => (unsigned<9> s) { s = a + b; }",
    );
    for port in ["a : in", "b : in", "s : out"] {
        assert_eq!(vhdl.matches(port).count(), 1, "port {port}");
    }
    assert_eq!(vhdl.matches("entity add is").count(), 1);
    assert!(vhdl.contains("library ieee;"));
    assert!(vhdl.contains("use ieee.numeric_std.all;"));
    assert!(vhdl.contains("architecture rtl of add is"));
    assert!(vhdl.contains("end architecture;"));
}

#[test]
fn mac_builds_register_multiplier_adder() {
    let (_, vhdl) = compile(
        "block mac(clock, unsigned<8> a, unsigned<8> b) => (unsigned<16> acc) {\n\
             static unsigned<16> r = 0;\n\
             r = r + a * b;\n\
             acc = r;\n\
         }",
    );
    assert!(vhdl.contains("clock : in std_logic"));
    assert!(vhdl.contains(" * "));
    assert!(vhdl.contains(" + "));
    assert!(vhdl.contains("rising_edge(clock)"));
    // the register resets to the static default
    assert_eq!(vhdl.matches("process").count(), 2); // one process, open + close
}

#[test]
fn conditional_write_lowers_to_multiplexer() {
    let (_, vhdl) = compile(
        "block pick(unsigned<8> a, unsigned<8> b) => (unsigned<8> o) {\n\
             if (a > b) { o = a; } else { o = b; }\n\
         }",
    );
    assert!(vhdl.contains(" when "));
    assert!(vhdl.contains(" else "));
}

#[test]
fn rom_ports_surface_on_entity() {
    let (_, vhdl) = compile(
        "block lookup(unsigned<4> i) => (unsigned<8> o) {\n\
             rom<unsigned<8>, 16> t;\n\
             o = t[i];\n\
         }",
    );
    assert!(vhdl.contains("_address : out unsigned(3 downto 0)"));
    assert!(vhdl.contains("_q : in unsigned(7 downto 0)"));
    // the output is wired from the q port
    let q_name = vhdl
        .lines()
        .find(|l| l.contains("_q : in"))
        .and_then(|l| l.trim().split(' ').next())
        .unwrap()
        .to_string();
    assert!(vhdl.contains(&format!("o <= {q_name}")));
    // a ROM has no write-side ports
    assert!(!vhdl.contains("_wren"));
    assert!(!vhdl.contains("_data"));
}

#[test]
fn ram_exposes_write_ports() {
    let (_, vhdl) = compile(
        "block store(clock, unsigned<4> i, unsigned<8> d) => (unsigned<8> o) {\n\
             ram<unsigned<8>, 16> m;\n\
             m[i] = d;\n\
             o = m[i];\n\
         }",
    );
    assert!(vhdl.contains("_address : out unsigned(3 downto 0)"));
    assert!(vhdl.contains("_q : in unsigned(7 downto 0)"));
    assert!(vhdl.contains("_wren : out unsigned(0 downto 0)"));
    assert!(vhdl.contains("_data : out unsigned(7 downto 0)"));
}

#[test]
fn aggregate_input_unpacks_with_slices() {
    let (_, vhdl) = compile(
        "block sum(unsigned<8> v[3]) => (unsigned<8> o) {\n\
             o = v[0] + v[1] + v[2];\n\
         }",
    );
    // one flat input port of the total width
    assert!(vhdl.contains("v : in std_logic_vector(23 downto 0)"));
    // per-element slice buffers
    assert!(vhdl.contains("v(7 downto 0)"));
    assert!(vhdl.contains("v(15 downto 8)"));
    assert!(vhdl.contains("v(23 downto 16)"));
}

#[test]
fn aggregate_output_packs_with_combiner() {
    let (_, vhdl) = compile(
        "struct pair { unsigned<8> lo; unsigned<8> hi; };\n\
         block split(unsigned<8> a, unsigned<8> b) => (pair o) {\n\
             o.lo = a;\n\
             o.hi = b;\n\
         }",
    );
    assert!(vhdl.contains("o : out std_logic_vector(15 downto 0)"));
    // the combiner concatenates hi above lo
    assert!(vhdl.contains(" & "));
}

#[test]
fn output_valid_follows_input_valid() {
    let (_, vhdl) = compile(
        "block pass(clock, input_valid, unsigned<8> a) => (output_valid, unsigned<8> o) {\n\
             o = a;\n\
         }",
    );
    assert!(vhdl.contains("input_valid : in std_logic"));
    assert!(vhdl.contains("output_valid : out std_logic"));
    assert!(vhdl.contains("output_valid <= input_valid"));
}

#[test]
fn unclocked_block_has_no_clock_port() {
    let (_, vhdl) = compile("block inv(unsigned<8> a) => (unsigned<8> o) { o = 255 - a; }");
    assert!(!vhdl.contains("clock : in"));
    assert!(vhdl.contains(" - "));
}

#[test]
fn register_qualifier_inserts_pipeline_register() {
    let (_, vhdl) = compile(
        "block stage(clock, unsigned<8> a) => (unsigned<8> o) {\n\
             register unsigned<8> t;\n\
             t = a;\n\
             o = t;\n\
         }",
    );
    assert!(vhdl.contains("rising_edge(clock)"));
}

#[test]
fn shift_by_constant_synthesises() {
    let (_, vhdl) = compile(
        "block sh(unsigned<8> a) => (unsigned<10> o) { o = a << 2; }",
    );
    assert!(vhdl.contains("shift_left"));
}

#[test]
fn multiple_blocks_require_top_selection() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let source = "block one(unsigned<1> a) => (unsigned<1> o) { o = a; }\n\
                  block two(unsigned<1> a) => (unsigned<1> o) { o = a; }";
    assert!(compile_to_vhdl(source, "multi.ecc", None, &reporter).is_err());
    let picked = compile_to_vhdl(source, "multi.ecc", Some("two"), &reporter)
        .unwrap()
        .unwrap();
    assert_eq!(picked.0, "two");
    assert!(compile_to_vhdl(source, "multi.ecc", Some("three"), &reporter).is_err());
}

#[test]
fn empty_design_compiles_to_nothing() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let result = compile_to_vhdl("const unsigned<8> X = 1;", "empty.ecc", None, &reporter).unwrap();
    assert!(result.is_none());
}

#[test]
fn division_fails_cleanly() {
    let reporter = Reporter::plain(MessageLevel::Error);
    let err = compile_to_vhdl(
        "block bad(unsigned<8> a, unsigned<8> b) => (unsigned<8> o) { o = a / b; }",
        "div.ecc",
        None,
        &reporter,
    )
    .unwrap_err();
    assert!(err.to_string().contains("division"));
}

#[test]
fn signed_arithmetic_keeps_signedness() {
    let (_, vhdl) = compile(
        "block neg(signed<8> a) => (signed<9> o) { o = 0 - a; }",
    );
    assert!(vhdl.contains("o : out signed(8 downto 0)"));
}
