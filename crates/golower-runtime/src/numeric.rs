//! IEEE-754 bit conversions computed arithmetically.
//!
//! The generated code has no typed-array access to float bits in every
//! host, so `math.Float32bits` and friends are computed from the value by
//! normalising the mantissa. These are the reference versions of those
//! routines and the ones the compiler uses for constant folding. NaN maps to
//! a single canonical bit pattern.

pub const CANONICAL_NAN32: u32 = 0x7FC0_0000;
pub const CANONICAL_NAN64: u64 = 0x7FF8_0000_0000_0001;

/// `x * 2^exp`, exact for every result representable as an `f64`
/// (including subnormals) since each step only scales by a power of two.
fn ldexp(mut x: f64, mut exp: i32) -> f64 {
    while exp > 0 {
        x *= 2.0;
        exp -= 1;
    }
    while exp < 0 {
        x *= 0.5;
        exp += 1;
    }
    x
}

pub fn float32_bits(f: f32) -> u32 {
    let f = f as f64;
    if f == 0.0 {
        return if f.is_sign_negative() { 1 << 31 } else { 0 };
    }
    if f.is_nan() {
        return CANONICAL_NAN32;
    }
    let sign: u32 = if f < 0.0 { 1 << 31 } else { 0 };
    if f.is_infinite() {
        return sign | 0x7F80_0000;
    }
    let mut f = f.abs();
    let mut e: u32 = 127 + 23;
    while f >= (1u32 << 24) as f64 {
        f /= 2.0;
        if e == 255 {
            break;
        }
        e += 1;
    }
    while f < (1u32 << 23) as f64 {
        e -= 1;
        if e == 0 {
            break;
        }
        f *= 2.0;
    }
    sign | (e << 23) | ((f as u32) & !(1 << 23))
}

pub fn float32_from_bits(b: u32) -> f32 {
    let sign = if b & (1 << 31) != 0 { -1.0 } else { 1.0 };
    let mut e = ((b >> 23) & 0xFF) as i32;
    let mut m = (b & 0x7F_FFFF) as f64;
    if e == 0xFF {
        if m == 0.0 {
            return (sign * f64::INFINITY) as f32;
        }
        return f32::NAN;
    }
    if e != 0 {
        m += (1u32 << 23) as f64;
    }
    if e == 0 {
        e = 1;
    }
    (sign * ldexp(m, e - 127 - 23)) as f32
}

pub fn float64_bits(f: f64) -> u64 {
    if f == 0.0 {
        return if f.is_sign_negative() { 1 << 63 } else { 0 };
    }
    if f.is_nan() {
        return CANONICAL_NAN64;
    }
    let sign: u64 = if f < 0.0 { 1 << 63 } else { 0 };
    if f.is_infinite() {
        return sign | 0x7FF0_0000_0000_0000;
    }
    let mut f = f.abs();
    let mut e: u64 = 1023 + 52;
    while f >= (1u64 << 53) as f64 {
        f /= 2.0;
        if e == 2047 {
            break;
        }
        e += 1;
    }
    while f < (1u64 << 52) as f64 {
        e -= 1;
        if e == 0 {
            break;
        }
        f *= 2.0;
    }
    sign | (e << 52) | ((f as u64) & !(1 << 52))
}

pub fn float64_from_bits(b: u64) -> f64 {
    let sign = if b & (1 << 63) != 0 { -1.0 } else { 1.0 };
    let mut e = ((b >> 52) & 0x7FF) as i32;
    let mut m = (b & 0xF_FFFF_FFFF_FFFF) as f64;
    if e == 0x7FF {
        if m == 0.0 {
            return sign * f64::INFINITY;
        }
        return f64::NAN;
    }
    if e != 0 {
        m += (1u64 << 52) as f64;
    }
    if e == 0 {
        e = 1;
    }
    sign * ldexp(m, e - 1023 - 52)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BITS32: [u32; 8] = [
        0,
        1,
        1109917696,
        2139095039,
        2139095040,
        4286578688,
        1 << 31,
        2143289344,
    ];

    const BITS64: [u64; 8] = [
        0,
        1,
        4631107791820423168,
        9218868437227405311,
        9218868437227405312,
        18442240474082181120,
        1 << 63,
        9221120237041090561,
    ];

    #[test]
    fn test_float32_bits_agree_with_native() {
        for bits in BITS32 {
            let f = float32_from_bits(bits);
            if f.is_nan() {
                assert_eq!(float32_bits(f), CANONICAL_NAN32);
                continue;
            }
            assert_eq!(f.to_bits(), bits, "bits {bits}");
            assert_eq!(float32_bits(f), bits, "bits {bits}");
        }
    }

    #[test]
    fn test_float64_bits_agree_with_native() {
        for bits in BITS64 {
            let f = float64_from_bits(bits);
            if f.is_nan() {
                assert_eq!(float64_bits(f), CANONICAL_NAN64);
                continue;
            }
            assert_eq!(f.to_bits(), bits, "bits {bits}");
            assert_eq!(float64_bits(f), bits, "bits {bits}");
        }
    }

    #[test]
    fn test_nan_is_canonical() {
        assert_eq!(float32_bits(f32::NAN), CANONICAL_NAN32);
        assert_eq!(float32_bits(-f32::NAN), CANONICAL_NAN32);
        assert_eq!(float64_bits(f64::NAN), CANONICAL_NAN64);
        assert!(float32_from_bits(0x7F80_0001).is_nan());
        assert!(float64_from_bits(0xFFF0_0000_0000_0001).is_nan());
    }

    #[test]
    fn test_signed_zero_and_infinity() {
        assert_eq!(float32_bits(-0.0), 1 << 31);
        assert_eq!(float64_bits(-0.0), 1 << 63);
        assert_eq!(float32_bits(f32::NEG_INFINITY), 0xFF80_0000);
        assert_eq!(float64_bits(f64::INFINITY), 0x7FF0_0000_0000_0000);
        assert!(float64_from_bits(1 << 63).is_sign_negative());
    }

    #[test]
    fn test_round_trip_matches_native() {
        // xorshift64 over the whole bit space, skipping NaN patterns.
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        for _ in 0..20_000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;

            let f = f64::from_bits(state);
            if !f.is_nan() {
                assert_eq!(float64_bits(f), state, "f64 {f:e}");
                assert_eq!(float64_from_bits(state).to_bits(), state);
            }

            let low = state as u32;
            let g = f32::from_bits(low);
            if !g.is_nan() {
                assert_eq!(float32_bits(g), low, "f32 {g:e}");
                assert_eq!(float32_from_bits(low).to_bits(), low);
            }
        }
    }
}
