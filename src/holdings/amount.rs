use alloy_primitives::{I256, U256};
use serde::{Serialize, Serializer};
use std::fmt;

/// Signed fixed-point amount: `mantissa / 10^scale`.
///
/// Token values routinely exceed 64 bits, so the mantissa is a 256-bit
/// integer. The scale is the token's decimals and is kept when printing, so
/// 70 at scale 2 prints as `0.70`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amount {
    mantissa: I256,
    scale: u32,
}

impl Amount {
    pub const fn zero(scale: u32) -> Self {
        Self {
            mantissa: I256::ZERO,
            scale,
        }
    }

    pub fn new(mantissa: I256, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    /// Parse an unsigned base-10 integer, e.g. the `value` field of a transfer.
    pub fn from_raw(value: &str, scale: u32) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let unsigned = U256::from_str_radix(value, 10).ok()?;
        let mantissa = I256::try_from(unsigned).ok()?;
        Some(Self { mantissa, scale })
    }

    pub fn mantissa(&self) -> I256 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.mantissa.is_negative()
    }

    pub fn checked_neg(self) -> Option<Self> {
        Some(Self {
            mantissa: self.mantissa.checked_neg()?,
            scale: self.scale,
        })
    }

    // Operands with different scales are brought to the larger one first
    pub fn checked_add(self, other: Self) -> Option<Self> {
        let scale = self.scale.max(other.scale);
        let lhs = self.rescaled(scale)?;
        let rhs = other.rescaled(scale)?;
        Some(Self {
            mantissa: lhs.checked_add(rhs)?,
            scale,
        })
    }

    fn rescaled(&self, scale: u32) -> Option<I256> {
        let factor = U256::from(10u8).checked_pow(U256::from(scale - self.scale))?;
        self.mantissa.checked_mul(I256::try_from(factor).ok()?)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa.is_negative() { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;

        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }

        let digits = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
