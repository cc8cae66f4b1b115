use std::fmt;
use std::str::FromStr;

use num_bigint::{BigInt, Sign};

use crate::error::BridgeError;

/// Arbitrary-precision fixed-point number: `unscaled * 10^-scale`.
///
/// Equality is representational, so `41.1` and `41.10` are different values (they carry
/// different scales), matching how the engine reports declared scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    scale: u32,
}

impl Decimal {
    pub fn new(unscaled: impl Into<BigInt>, scale: u32) -> Self {
        Self {
            unscaled: unscaled.into(),
            scale,
        }
    }

    #[must_use]
    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    #[must_use]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Number of significant decimal digits in the unscaled value.
    #[must_use]
    pub fn digits(&self) -> u32 {
        let magnitude = self.unscaled.magnitude().to_string();
        u32::try_from(magnitude.len()).unwrap_or(u32::MAX)
    }

    /// Change the scale without losing information.
    ///
    /// Returns `None` when shrinking the scale would drop non-zero digits.
    #[must_use]
    pub fn rescale(&self, scale: u32) -> Option<Decimal> {
        use std::cmp::Ordering;
        match scale.cmp(&self.scale) {
            Ordering::Equal => Some(self.clone()),
            Ordering::Greater => {
                let factor = BigInt::from(10u8).pow(scale - self.scale);
                Some(Decimal::new(&self.unscaled * factor, scale))
            }
            Ordering::Less => {
                let factor = BigInt::from(10u8).pow(self.scale - scale);
                let remainder = &self.unscaled % &factor;
                if remainder.sign() == Sign::NoSign {
                    Some(Decimal::new(&self.unscaled / factor, scale))
                } else {
                    None
                }
            }
        }
    }

    /// Lossy conversion for callers that want a float.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse::<f64>().unwrap_or(f64::NAN)
    }

    /// Unscaled value narrowed to `i128`, the widest backing integer the engine uses.
    #[must_use]
    pub fn unscaled_i128(&self) -> Option<i128> {
        i128::try_from(&self.unscaled).ok()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.magnitude().to_string();
        let negative = self.unscaled.sign() == Sign::Minus;
        let scale = self.scale as usize;
        let body = if scale == 0 {
            digits
        } else if digits.len() > scale {
            let (int_part, frac) = digits.split_at(digits.len() - scale);
            format!("{int_part}.{frac}")
        } else {
            format!("0.{}{digits}", "0".repeat(scale - digits.len()))
        };
        if negative {
            write!(f, "-{body}")
        } else {
            f.write_str(&body)
        }
    }
}

impl FromStr for Decimal {
    type Err = BridgeError;

    /// Parses plain notation such as `-12.3400`; the scale is the number of fractional digits
    /// written.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || BridgeError::Conversion(format!("invalid decimal literal '{s}'"));
        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let digits = format!("{int_part}{frac_part}");
        let mut unscaled = BigInt::from_str(if digits.is_empty() { "0" } else { &digits })
            .map_err(|_| invalid())?;
        if negative {
            unscaled = -unscaled;
        }
        let scale = u32::try_from(frac_part.len()).map_err(|_| invalid())?;
        Ok(Decimal::new(unscaled, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_places_the_decimal_point() {
        assert_eq!(Decimal::new(411, 1).to_string(), "41.1");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(12_000, 0).to_string(), "12000");
        assert_eq!(Decimal::new(0, 2).to_string(), "0.00");
    }

    #[test]
    fn parse_and_rescale() {
        let d: Decimal = "-12.3400".parse().unwrap();
        assert_eq!(d, Decimal::new(-123_400, 4));
        assert_eq!(d.rescale(2), Some(Decimal::new(-1234, 2)));
        assert_eq!(d.rescale(1), None);
        assert_eq!(d.rescale(7), Some(Decimal::new(-123_400_000, 7)));
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("abc".parse::<Decimal>().is_err());
        assert_eq!(".5".parse::<Decimal>().unwrap(), Decimal::new(5, 1));
    }
}
