//! Constant values and the arithmetic on them.
//!
//! Go constants are exact; JavaScript numbers are not. Folding constant
//! expressions at compile time keeps `1 << 40` or `math.MaxUint32 + 1`
//! correct where evaluating them with 32-bit JavaScript operators would not.

use golower_runtime::numeric;
use golower_syntax::{BinaryOp, Lit, UnaryOp};
use golower_types::Basic;
use golower_types::resolve::parse_int_literal;

use crate::js;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
}

impl ConstValue {
    pub fn from_lit(lit: &Lit) -> Option<Self> {
        match lit {
            Lit::Int(text) => parse_int_literal(text).map(|n| ConstValue::Int(i128::from(n))),
            Lit::Float(text) => text.replace('_', "").parse().ok().map(ConstValue::Float),
            Lit::Rune(c) => Some(ConstValue::Int(i128::from(u32::from(*c)))),
            Lit::Str(s) => Some(ConstValue::Str(s.clone())),
            Lit::Imag(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(n) => Some(*n as f64),
            ConstValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            ConstValue::Int(n) => Some(*n),
            ConstValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i128),
            _ => None,
        }
    }

    /// The value as it is stored in a variable of basic kind `kind`.
    pub fn convert(self, kind: Basic) -> Option<Self> {
        if kind.is_integer() {
            return match self {
                ConstValue::Int(n) => Some(ConstValue::Int(wrap(n, kind))),
                ConstValue::Float(f) if f.is_finite() => Some(ConstValue::Int(wrap(f.trunc() as i128, kind))),
                _ => None,
            };
        }
        if kind.is_float() {
            let f = self.as_f64()?;
            return Some(ConstValue::Float(if kind == Basic::Float32 {
                f64::from(f as f32)
            } else {
                f
            }));
        }
        if kind.is_string() {
            return match self {
                ConstValue::Str(s) => Some(ConstValue::Str(s)),
                ConstValue::Int(n) => {
                    let c = u32::try_from(n).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
                    Some(ConstValue::Str(c.to_string()))
                }
                _ => None,
            };
        }
        match (kind, self) {
            (Basic::Bool | Basic::UntypedBool, b @ ConstValue::Bool(_)) => Some(b),
            _ => None,
        }
    }

    pub fn to_js(&self) -> js::Expr {
        match self {
            ConstValue::Bool(b) => js::Expr::bool(*b),
            ConstValue::Int(n) => {
                let f = *n as f64;
                if f < 0.0 {
                    js::Expr::unary(js::UnaryOp::Neg, js::Expr::number(-f))
                } else {
                    js::Expr::number(f)
                }
            }
            ConstValue::Float(f) if *f < 0.0 || (*f == 0.0 && f.is_sign_negative()) => {
                js::Expr::unary(js::UnaryOp::Neg, js::Expr::number(-f))
            }
            ConstValue::Float(f) => js::Expr::number(*f),
            ConstValue::Str(s) => js::Expr::string(s.clone()),
        }
    }
}

/// Truncate `n` to the width of an integer kind, two's complement.
pub fn wrap(n: i128, kind: Basic) -> i128 {
    let Some(bits) = kind.int_bits() else {
        return n;
    };
    let modulus = 1i128 << bits;
    let m = n.rem_euclid(modulus);
    if kind.is_unsigned() || m < modulus / 2 {
        m
    } else {
        m - modulus
    }
}

pub fn unary(op: UnaryOp, x: ConstValue) -> Option<ConstValue> {
    match (op, x) {
        (UnaryOp::Pos, v) => Some(v),
        (UnaryOp::Neg, ConstValue::Int(n)) => Some(ConstValue::Int(-n)),
        (UnaryOp::Neg, ConstValue::Float(f)) => Some(ConstValue::Float(-f)),
        (UnaryOp::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (UnaryOp::Xor, ConstValue::Int(n)) => Some(ConstValue::Int(!n)),
        _ => None,
    }
}

/// Evaluate `x op y`. `integer` selects truncated division when both
/// operands are integral.
pub fn binary(op: BinaryOp, x: ConstValue, y: ConstValue, integer: bool) -> Option<ConstValue> {
    use ConstValue::*;
    if op.is_comparison() {
        let ord = match (&x, &y) {
            (Str(a), Str(b)) => a.cmp(b),
            (Bool(a), Bool(b)) if matches!(op, BinaryOp::Eq | BinaryOp::Ne) => a.cmp(b),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?)?,
        };
        return Some(Bool(match op {
            BinaryOp::Eq => ord.is_eq(),
            BinaryOp::Ne => ord.is_ne(),
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::Le => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            _ => ord.is_ge(),
        }));
    }
    match (op, x, y) {
        (BinaryOp::LAnd, Bool(a), Bool(b)) => Some(Bool(a && b)),
        (BinaryOp::LOr, Bool(a), Bool(b)) => Some(Bool(a || b)),
        (BinaryOp::Add, Str(a), Str(b)) => Some(Str(a + &b)),
        (BinaryOp::Shl, x, y) => {
            let shift = u32::try_from(y.as_int()?).ok().filter(|s| *s < 120)?;
            x.as_int()?.checked_shl(shift).map(Int)
        }
        (BinaryOp::Shr, x, y) => {
            let shift = u32::try_from(y.as_int()?).ok()?;
            Some(Int(x.as_int()? >> shift.min(127)))
        }
        (op, Int(a), Int(b)) => int_binary(op, a, b, integer),
        (op, x, y) => {
            let (a, b) = (x.as_f64()?, y.as_f64()?);
            match op {
                BinaryOp::Add => Some(Float(a + b)),
                BinaryOp::Sub => Some(Float(a - b)),
                BinaryOp::Mul => Some(Float(a * b)),
                BinaryOp::Quo if b != 0.0 => Some(Float(a / b)),
                _ => None,
            }
        }
    }
}

fn int_binary(op: BinaryOp, a: i128, b: i128, integer: bool) -> Option<ConstValue> {
    let n = match op {
        BinaryOp::Add => a.checked_add(b)?,
        BinaryOp::Sub => a.checked_sub(b)?,
        BinaryOp::Mul => a.checked_mul(b)?,
        BinaryOp::Quo if b == 0 => return None,
        BinaryOp::Quo if !integer => return Some(ConstValue::Float(a as f64 / b as f64)),
        BinaryOp::Quo => a / b,
        BinaryOp::Rem if b == 0 => return None,
        BinaryOp::Rem => a % b,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::AndNot => a & !b,
        _ => return None,
    };
    Some(ConstValue::Int(n))
}

/// `math.Float32bits` and friends applied to a constant.
pub fn float_bits(func: &str, arg: &ConstValue) -> Option<ConstValue> {
    Some(match func {
        "Float32bits" => ConstValue::Int(i128::from(numeric::float32_bits(arg.as_f64()? as f32))),
        "Float64bits" => ConstValue::Int(i128::from(numeric::float64_bits(arg.as_f64()?))),
        "Float32frombits" => {
            let bits = u32::try_from(arg.as_int()?).ok()?;
            ConstValue::Float(f64::from(numeric::float32_from_bits(bits)))
        }
        "Float64frombits" => {
            let bits = u64::try_from(arg.as_int()?).ok()?;
            ConstValue::Float(numeric::float64_from_bits(bits))
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_is_exact() {
        let big = binary(BinaryOp::Shl, ConstValue::Int(1), ConstValue::Int(40), true);
        assert_eq!(big, Some(ConstValue::Int(1 << 40)));
        assert_eq!(
            binary(BinaryOp::Quo, ConstValue::Int(7), ConstValue::Int(2), true),
            Some(ConstValue::Int(3))
        );
        assert_eq!(
            binary(BinaryOp::Quo, ConstValue::Int(7), ConstValue::Int(2), false),
            Some(ConstValue::Float(3.5))
        );
        assert_eq!(binary(BinaryOp::Rem, ConstValue::Int(1), ConstValue::Int(0), true), None);
        assert_eq!(
            binary(BinaryOp::AndNot, ConstValue::Int(0b1111), ConstValue::Int(0b0101), true),
            Some(ConstValue::Int(0b1010))
        );
    }

    #[test]
    fn test_comparisons_and_strings() {
        assert_eq!(
            binary(BinaryOp::Lt, ConstValue::Int(1), ConstValue::Float(1.5), true),
            Some(ConstValue::Bool(true))
        );
        assert_eq!(
            binary(
                BinaryOp::Add,
                ConstValue::Str("go".into()),
                ConstValue::Str("lower".into()),
                false
            ),
            Some(ConstValue::Str("golower".into()))
        );
        assert_eq!(unary(UnaryOp::Xor, ConstValue::Int(0)), Some(ConstValue::Int(-1)));
    }

    #[test]
    fn test_wrap_and_convert() {
        assert_eq!(wrap(300, Basic::Uint8), 44);
        assert_eq!(wrap(-1, Basic::Uint32), 4_294_967_295);
        assert_eq!(wrap(1 << 31, Basic::Int32), -(1 << 31));
        assert_eq!(
            ConstValue::Float(2.9).convert(Basic::Int),
            Some(ConstValue::Int(2))
        );
        assert_eq!(
            ConstValue::Int(65).convert(Basic::String),
            Some(ConstValue::Str("A".into()))
        );
        assert_eq!(
            ConstValue::Float(0.1).convert(Basic::Float32),
            Some(ConstValue::Float(f64::from(0.1f32)))
        );
    }

    #[test]
    fn test_float_bits_folding() {
        assert_eq!(
            float_bits("Float32bits", &ConstValue::Float(1.5)),
            Some(ConstValue::Int(0x3FC0_0000))
        );
        assert_eq!(
            float_bits("Float64frombits", &ConstValue::Int(0x4000_0000_0000_0000)),
            Some(ConstValue::Float(2.0))
        );
        let nan = float_bits("Float64bits", &ConstValue::Float(f64::NAN));
        assert_eq!(
            nan,
            Some(ConstValue::Int(i128::from(numeric::CANONICAL_NAN64)))
        );
        assert_eq!(float_bits("Sqrt", &ConstValue::Float(4.0)), None);
    }

    #[test]
    fn test_negative_values_emit_unary_minus() {
        assert_eq!(
            ConstValue::Int(-3).to_js(),
            js::Expr::unary(js::UnaryOp::Neg, js::Expr::number(3.0))
        );
        assert_eq!(ConstValue::Str("x".into()).to_js(), js::Expr::string("x"));
    }
}
