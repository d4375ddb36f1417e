use elasticc::bitconst::{
    add_bits, is_less_than, multiply_bits, perform_const_operation, subtract_bits, BitConstant,
};
use elasticc::ops::{result_width, OperationType};

fn c(s: &str) -> BitConstant {
    s.parse().unwrap()
}

#[test]
fn parse_render_round_trip() {
    for (text, value) in [
        ("0", 0),
        ("1", 1),
        ("255", 255),
        ("0xff", 255),
        ("0b101", 5),
        ("017", 15),
        ("-1", -1),
        ("-128", -128),
        ("1000000", 1_000_000),
    ] {
        let parsed = c(text);
        assert_eq!(parsed.int_value(), value, "literal {text}");
        // the rendered bit string re-reads to the same value
        let bits = parsed.to_vhdl_bits();
        let reparsed = c(&format!("0b{}", bits.trim_matches('"')));
        assert_eq!(
            reparsed.cast(parsed.width(), parsed.is_signed).int_value(),
            value,
            "render of {text}"
        );
    }
}

#[test]
fn cast_idempotent_at_own_width() {
    for text in ["0", "200", "-77", "0xffff"] {
        let value = c(text);
        let cast = value.cast(value.width(), value.is_signed);
        assert_eq!(cast, value);
    }
}

#[test]
fn additive_identities() {
    let a = c("1234");
    let mut sum = add_bits(&a, &BitConstant::zero(), false);
    sum.trim();
    assert_eq!(sum.int_value(), 1234);

    let mut diff = subtract_bits(&a, &a);
    diff.trim();
    assert!(!diff.any_set());
}

#[test]
fn const_operations_match_arithmetic() {
    let cases: &[(i64, i64)] = &[(0, 0), (1, 1), (13, 7), (255, 1), (100, 3), (-5, 9), (-8, -3)];
    for &(x, y) in cases {
        let (a, b) = (BitConstant::from_int(x), BitConstant::from_int(y));
        let ops: &[(OperationType, i64)] = &[
            (OperationType::Add, x + y),
            (OperationType::Sub, x - y),
            (OperationType::Mul, x * y),
            (OperationType::Eq, (x == y) as i64),
            (OperationType::Neq, (x != y) as i64),
            (OperationType::Lt, (x < y) as i64),
            (OperationType::Lte, (x <= y) as i64),
            (OperationType::Gt, (x > y) as i64),
            (OperationType::Gte, (x >= y) as i64),
            (OperationType::LAnd, ((x != 0) && (y != 0)) as i64),
            (OperationType::LOr, ((x != 0) || (y != 0)) as i64),
        ];
        for &(op, expected) in ops {
            let result = perform_const_operation(&[a.clone(), b.clone()], op).unwrap();
            assert_eq!(result.int_value(), expected, "{x} {} {y}", op.token());
        }
    }
}

#[test]
fn shifts_by_known_amounts() {
    let v = c("0b1011");
    let shifted = perform_const_operation(
        &[v.clone(), BitConstant::from_int(3)],
        OperationType::Shl,
    )
    .unwrap();
    assert_eq!(shifted.int_value(), 0b1011000);
    let back = perform_const_operation(&[shifted, BitConstant::from_int(3)], OperationType::Shr)
        .unwrap();
    assert_eq!(back.int_value(), 0b1011);
}

#[test]
fn result_widths_bound_folded_values() {
    let a = BitConstant::from_int(200); // 8 bits
    let b = BitConstant::from_int(100); // 7 bits
    let sum_width = result_width(&[a.width(), b.width()], OperationType::Add, &[None, None]).unwrap();
    assert_eq!(sum_width, 9);
    let sum = perform_const_operation(&[a.clone(), b.clone()], OperationType::Add).unwrap();
    assert!(sum.width() <= sum_width);

    let product_width =
        result_width(&[a.width(), b.width()], OperationType::Mul, &[None, None]).unwrap();
    assert_eq!(product_width, 15);
    let product = perform_const_operation(&[a, b], OperationType::Mul).unwrap();
    assert!(product.width() <= product_width);
}

#[test]
fn wide_values_survive() {
    // 2^80: far beyond host integer widths
    let mut big = BitConstant::from_int(1);
    for _ in 0..80 {
        big = perform_const_operation(
            &[big, BitConstant::from_int(2)],
            OperationType::Mul,
        )
        .unwrap();
    }
    assert_eq!(big.width(), 81);
    assert!(big.bits[80]);
    assert_eq!(big.bits[..80].iter().filter(|&&b| b).count(), 0);
}

#[test]
fn signed_unsigned_compare_resolves_by_sign() {
    let negative = c("-1");
    let large = c("255");
    assert!(is_less_than(&negative, &large).any_set());
    assert!(!is_less_than(&large, &negative).any_set());
    let product = multiply_bits(&negative, &negative);
    let mut product = product;
    product.trim();
    assert_eq!(product.int_value(), 1);
}

#[test]
fn division_and_modulo_are_rejected() {
    let a = BitConstant::from_int(10);
    let b = BitConstant::from_int(2);
    for op in [
        OperationType::Div,
        OperationType::Mod,
    ] {
        let err = perform_const_operation(&[a.clone(), b.clone()], op).unwrap_err();
        assert!(err.message.contains("division"));
    }
    assert!(result_width(&[8, 8], OperationType::Div, &[None, None]).is_err());
}
