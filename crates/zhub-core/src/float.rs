//! Floating point layouts with explicit mantissa/exponent widths
//!
//! ZCL carries half (`semi`), single and double precision values. All three
//! share the IEEE biased-exponent layout and differ only in field widths, so
//! one generic conversion handles them through `f64`.

/// Bit layout of a binary floating point format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    pub mantissa_bits: u32,
    pub exponent_bits: u32,
}

pub const SEMI: FloatFormat = FloatFormat {
    mantissa_bits: 10,
    exponent_bits: 5,
};

pub const SINGLE: FloatFormat = FloatFormat {
    mantissa_bits: 23,
    exponent_bits: 8,
};

pub const DOUBLE: FloatFormat = FloatFormat {
    mantissa_bits: 52,
    exponent_bits: 11,
};

/// Exact `2^n` for every exponent an `f64` can represent, 0 below that
fn pow2(n: i32) -> f64 {
    if n > 1023 {
        f64::INFINITY
    } else if n >= -1022 {
        f64::from_bits(((n + 1023) as u64) << 52)
    } else if n >= -1074 {
        f64::from_bits(1u64 << (n + 1074))
    } else {
        0.0
    }
}

/// `value >> shift`, rounded to nearest with ties to even
fn round_shift(value: u64, shift: i32) -> u64 {
    if shift <= 0 {
        return value << (-shift);
    }
    if shift >= 64 {
        return 0;
    }
    let q = value >> shift;
    let rem = value & ((1u64 << shift) - 1);
    let half = 1u64 << (shift - 1);
    if rem > half || (rem == half && q & 1 == 1) {
        q + 1
    } else {
        q
    }
}

impl FloatFormat {
    /// Encoded width in bytes
    pub fn width(&self) -> usize {
        ((1 + self.mantissa_bits + self.exponent_bits) / 8) as usize
    }

    fn bias(&self) -> i32 {
        (1 << (self.exponent_bits - 1)) - 1
    }

    fn max_exponent(&self) -> u64 {
        (1u64 << self.exponent_bits) - 1
    }

    /// Interpret raw bits as a number
    pub fn decode(&self, raw: u64) -> f64 {
        let m = self.mantissa_bits;
        let negative = (raw >> (m + self.exponent_bits)) & 1 == 1;
        let exponent = (raw >> m) & self.max_exponent();
        let mantissa = raw & ((1u64 << m) - 1);

        let magnitude = if exponent == self.max_exponent() {
            if mantissa == 0 {
                f64::INFINITY
            } else {
                f64::NAN
            }
        } else if exponent == 0 {
            mantissa as f64 * pow2(1 - self.bias() - m as i32)
        } else {
            (mantissa | (1u64 << m)) as f64 * pow2(exponent as i32 - self.bias() - m as i32)
        };

        if negative {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Produce raw bits for a number
    ///
    /// Rounds to nearest (ties to even). Magnitudes beyond the largest
    /// finite value become infinity; every NaN becomes the canonical positive
    /// quiet NaN (top mantissa bit set), e.g. `0x7e00` for semi precision.
    pub fn encode(&self, value: f64) -> u64 {
        let m = self.mantissa_bits;
        let sign = (value.is_sign_negative() as u64) << (m + self.exponent_bits);
        let pack = |exponent: u64, mantissa: u64| sign | (exponent << m) | mantissa;

        if value.is_nan() {
            return (self.max_exponent() << m) | (1u64 << (m - 1));
        }
        if value.is_infinite() {
            return pack(self.max_exponent(), 0);
        }
        if value == 0.0 {
            return sign;
        }

        // value = significand * 2^scale, exactly
        let bits = value.abs().to_bits();
        let raw_exponent = ((bits >> 52) & 0x7ff) as i32;
        let raw_mantissa = bits & ((1u64 << 52) - 1);
        let (significand, scale) = if raw_exponent == 0 {
            (raw_mantissa, -1074)
        } else {
            (raw_mantissa | (1u64 << 52), raw_exponent - 1075)
        };

        let top_bit = 63 - significand.leading_zeros() as i32;
        let unbiased = scale + top_bit;
        let mut exponent = unbiased + self.bias();

        if exponent >= 1 {
            let mut q = round_shift(significand, top_bit - m as i32);
            if q == 1u64 << (m + 1) {
                q >>= 1;
                exponent += 1;
            }
            if exponent as u64 >= self.max_exponent() {
                return pack(self.max_exponent(), 0);
            }
            pack(exponent as u64, q - (1u64 << m))
        } else {
            let q = round_shift(significand, (1 - self.bias() - m as i32) - scale);
            if q == 1u64 << m {
                pack(1, 0)
            } else {
                pack(0, q)
            }
        }
    }
}
