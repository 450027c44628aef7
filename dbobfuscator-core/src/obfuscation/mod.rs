//! Type-aware value masking.
//!
//! # Module Structure
//! - `numeric`: bounded random perturbation for integer, float and decimal columns
//! - `text`: truncated MD5 hashing for character and text columns
//!
//! Masking is driven purely by the declared column type (see [`crate::catalog`]).
//! `NULL` is never masked and never consumes randomness.

mod numeric;
mod text;


use crate::Result;
use crate::catalog::SqlType;
use crate::config::ObfuscatorConfig;
use crate::error::ObfuscatorError;
use crate::models::CellValue;
use rand::Rng;

pub use text::hash_hex;

/// Largest accepted dispersion percent
pub const MAX_DISPERSION_PERCENT: u8 = 100;

/// Masks individual cell values according to their declared SQL type.
///
/// # Example
/// ```rust
/// use dbobfuscator_core::models::CellValue;
/// use dbobfuscator_core::obfuscation::ValueObfuscator;
///
/// let obfuscator = ValueObfuscator::new(10).unwrap();
/// let masked = obfuscator.obfuscate(&CellValue::from("alice"), "varchar(8)").unwrap();
/// assert_eq!(masked, CellValue::from("6384e2b2"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueObfuscator {
    dispersion_percent: u8,
}

impl ValueObfuscator {
    /// Creates an obfuscator perturbing numbers by at most `dispersion_percent`.
    ///
    /// # Errors
    /// Returns a configuration error if the percent exceeds 100.
    pub fn new(dispersion_percent: u8) -> Result<Self> {
        if dispersion_percent > MAX_DISPERSION_PERCENT {
            return Err(ObfuscatorError::configuration(format!(
                "dispersion_percent must be between 0 and {}, got {}",
                MAX_DISPERSION_PERCENT, dispersion_percent
            )));
        }
        Ok(Self { dispersion_percent })
    }

    /// Creates an obfuscator from validated configuration.
    ///
    /// # Errors
    /// Same as [`ValueObfuscator::new`].
    pub fn from_config(config: &ObfuscatorConfig) -> Result<Self> {
        Self::new(config.dispersion_percent)
    }

    pub fn dispersion_percent(&self) -> u8 {
        self.dispersion_percent
    }

    /// Masks `raw` using the thread-local random generator.
    ///
    /// # Errors
    /// [`ObfuscatorError::TypeParse`] when the type's parameters cannot be
    /// parsed, [`ObfuscatorError::Conversion`] when the value does not fit the
    /// type's representation.
    pub fn obfuscate(&self, raw: &CellValue, declared_type: &str) -> Result<CellValue> {
        self.obfuscate_with(raw, declared_type, &mut rand::rng())
    }

    /// Masks `raw` drawing randomness from `rng`.
    ///
    /// # Errors
    /// Same as [`ValueObfuscator::obfuscate`].
    pub fn obfuscate_with<R>(&self, raw: &CellValue, declared_type: &str, rng: &mut R) -> Result<CellValue>
    where
        R: Rng + ?Sized,
    {
        if raw.is_null() {
            return Ok(CellValue::Null);
        }
        let sql_type = SqlType::parse(declared_type)?;
        self.obfuscate_parsed(raw, &sql_type, declared_type, rng)
    }

    /// Masks `raw` for an already parsed type.
    ///
    /// The copy pipeline parses each column type once per table and calls
    /// this for every cell.
    ///
    /// # Errors
    /// [`ObfuscatorError::Conversion`] when the value does not fit the type.
    pub fn obfuscate_parsed<R>(
        &self,
        raw: &CellValue,
        sql_type: &SqlType,
        declared_type: &str,
        rng: &mut R,
    ) -> Result<CellValue>
    where
        R: Rng + ?Sized,
    {
        let Some(text) = raw.canonical_text() else {
            return Ok(CellValue::Null);
        };
        let percent = self.dispersion_percent;

        match *sql_type {
            SqlType::SignedInt(width) => {
                let value = numeric::parse_signed(&text, declared_type, width)?;
                Ok(CellValue::Int(numeric::perturb_signed(
                    value,
                    width.signed_bounds(),
                    percent,
                    rng,
                )))
            }
            SqlType::UnsignedInt(width) => {
                let value = numeric::parse_unsigned(&text, declared_type, width)?;
                Ok(CellValue::UInt(numeric::perturb_unsigned(
                    value,
                    width.unsigned_max(),
                    percent,
                    rng,
                )))
            }
            SqlType::Float => {
                let value = numeric::parse_float(&text, declared_type, Some(f64::from(f32::MAX)))?;
                Ok(CellValue::Float(numeric::perturb_float(value, None, percent, rng)))
            }
            SqlType::Double => {
                let value = numeric::parse_float(&text, declared_type, None)?;
                Ok(CellValue::Float(numeric::perturb_float(value, None, percent, rng)))
            }
            SqlType::Decimal { precision, scale } => {
                let bound = crate::catalog::decimal_abs_bound(precision, scale);
                let value = numeric::parse_float(&text, declared_type, None)?;
                if value.abs() >= bound {
                    return Err(ObfuscatorError::conversion(
                        text,
                        declared_type,
                        format!("value exceeds the decimal bound of {}", bound),
                    ));
                }
                // Stored values are rounded to the scale, so flip before reaching the
                // point that rounds up to the bound.
                let limit = crate::catalog::decimal_rounding_limit(precision, scale);
                Ok(CellValue::Float(numeric::perturb_float(value, Some(limit), percent, rng)))
            }
            SqlType::Char { .. } | SqlType::Varchar { .. } | SqlType::Text(_) => {
                Ok(CellValue::Text(text::hash_truncated(raw, sql_type.max_chars())))
            }
            SqlType::Other => Ok(raw.clone()),
        }
    }
}
