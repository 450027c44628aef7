//! MySQL column type catalog.
//!
//! Maps the `Type` strings reported by `SHOW COLUMNS` to the families the
//! obfuscator knows how to mask, together with the storage bounds a masked
//! value must stay within.
//!
//! Recognized families:
//! - `tinyint`, `smallint`, `mediumint`, `int`, `bigint`, optionally `unsigned`
//! - `float`, `double`
//! - `decimal(p,s)`
//! - `char(n)`, `varchar(n)`
//! - `tinytext`, `text`, `mediumtext`, `longtext`
//!
//! Every other type parses to [`SqlType::Other`] and is copied verbatim.

use crate::Result;
use crate::error::ObfuscatorError;

pub const LOWER_BOUND_TINYINT: i64 = -128;
pub const UPPER_BOUND_TINYINT: i64 = 127;
pub const LOWER_BOUND_SMALLINT: i64 = -32_768;
pub const UPPER_BOUND_SMALLINT: i64 = 32_767;
pub const LOWER_BOUND_MEDIUMINT: i64 = -8_388_608;
pub const UPPER_BOUND_MEDIUMINT: i64 = 8_388_607;
pub const LOWER_BOUND_INT: i64 = -2_147_483_648;
pub const UPPER_BOUND_INT: i64 = 2_147_483_647;
pub const LOWER_BOUND_BIGINT: i64 = i64::MIN;
pub const UPPER_BOUND_BIGINT: i64 = i64::MAX;

pub const UPPER_BOUND_UTINYINT: u64 = 255;
pub const UPPER_BOUND_USMALLINT: u64 = 65_535;
pub const UPPER_BOUND_UMEDIUMINT: u64 = 16_777_215;
pub const UPPER_BOUND_UINT: u64 = 4_294_967_295;
pub const UPPER_BOUND_UBIGINT: u64 = u64::MAX;

/// MySQL's implicit precision for a bare `decimal`
const DEFAULT_DECIMAL_PRECISION: u32 = 10;
/// MySQL allows at most 65 digits in a decimal
const MAX_DECIMAL_PRECISION: u32 = 65;

/// Storage width of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// 1 byte
    Tiny,
    /// 2 bytes
    Small,
    /// 3 bytes
    Medium,
    /// 4 bytes
    Regular,
    /// 8 bytes
    Big,
}

impl IntWidth {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "tinyint" => Some(Self::Tiny),
            "smallint" => Some(Self::Small),
            "mediumint" => Some(Self::Medium),
            "int" | "integer" => Some(Self::Regular),
            "bigint" => Some(Self::Big),
            _ => None,
        }
    }

    /// Storage size in bytes.
    pub fn bytes(self) -> u8 {
        match self {
            Self::Tiny => 1,
            Self::Small => 2,
            Self::Medium => 3,
            Self::Regular => 4,
            Self::Big => 8,
        }
    }

    /// Inclusive `(min, max)` of the signed variant.
    pub fn signed_bounds(self) -> (i64, i64) {
        match self {
            Self::Tiny => (LOWER_BOUND_TINYINT, UPPER_BOUND_TINYINT),
            Self::Small => (LOWER_BOUND_SMALLINT, UPPER_BOUND_SMALLINT),
            Self::Medium => (LOWER_BOUND_MEDIUMINT, UPPER_BOUND_MEDIUMINT),
            Self::Regular => (LOWER_BOUND_INT, UPPER_BOUND_INT),
            Self::Big => (LOWER_BOUND_BIGINT, UPPER_BOUND_BIGINT),
        }
    }

    /// Inclusive max of the unsigned variant (the min is always zero).
    pub fn unsigned_max(self) -> u64 {
        match self {
            Self::Tiny => UPPER_BOUND_UTINYINT,
            Self::Small => UPPER_BOUND_USMALLINT,
            Self::Medium => UPPER_BOUND_UMEDIUMINT,
            Self::Regular => UPPER_BOUND_UINT,
            Self::Big => UPPER_BOUND_UBIGINT,
        }
    }
}

/// Size tier of an unbounded text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextTier {
    Tiny,
    Regular,
    Medium,
    Long,
}

/// A parsed column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    SignedInt(IntWidth),
    UnsignedInt(IntWidth),
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char { size: usize },
    Varchar { size: usize },
    Text(TextTier),
    /// Any type the obfuscator does not mask
    Other,
}

impl SqlType {
    /// Parses a `SHOW COLUMNS` type string such as `int(11) unsigned`,
    /// `decimal(10,2)` or `varchar(255)`.
    ///
    /// # Errors
    /// Returns [`ObfuscatorError::TypeParse`] when a recognized type carries
    /// parameters that cannot be read (e.g. `varchar(abc)`, `decimal(2,5)`).
    pub fn parse(declared: &str) -> Result<Self> {
        let lowered = declared.trim().to_lowercase();
        let parts = split_type(&lowered)
            .ok_or_else(|| ObfuscatorError::type_parse(declared, "unbalanced parentheses"))?;
        let unsigned = parts.modifiers.split_whitespace().any(|m| m == "unsigned");

        if let Some(width) = IntWidth::from_keyword(parts.base) {
            // A display width such as int(11) has no effect on storage
            return Ok(if unsigned {
                Self::UnsignedInt(width)
            } else {
                Self::SignedInt(width)
            });
        }

        match parts.base {
            "float" => Ok(Self::Float),
            "double" | "real" => Ok(Self::Double),
            "decimal" | "numeric" | "dec" | "fixed" => parse_decimal(declared, parts.params),
            "char" => {
                let size = match parts.params {
                    Some(params) => parse_size(declared, params)?,
                    None => 1,
                };
                Ok(Self::Char { size })
            }
            "varchar" => {
                let params = parts.params.ok_or_else(|| {
                    ObfuscatorError::type_parse(declared, "varchar requires a size")
                })?;
                Ok(Self::Varchar {
                    size: parse_size(declared, params)?,
                })
            }
            "tinytext" => Ok(Self::Text(TextTier::Tiny)),
            "text" => Ok(Self::Text(TextTier::Regular)),
            "mediumtext" => Ok(Self::Text(TextTier::Medium)),
            "longtext" => Ok(Self::Text(TextTier::Long)),
            _ => Ok(Self::Other),
        }
    }

    /// Whether the obfuscator has a masking strategy for this type.
    pub fn is_obfuscatable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    /// Maximum code points a masked value may have, if bounded.
    pub fn max_chars(&self) -> Option<usize> {
        match self {
            Self::Char { size } | Self::Varchar { size } => Some(*size),
            _ => None,
        }
    }
}

/// Exclusive absolute bound of a `decimal(p,s)` column: `10^(p-s)`.
pub fn decimal_abs_bound(precision: u32, scale: u32) -> f64 {
    let integer_digits = i32::try_from(precision.saturating_sub(scale)).unwrap_or(i32::MAX);
    10_f64.powi(integer_digits)
}

/// Smallest magnitude that MySQL rounds up to [`decimal_abs_bound`] when it
/// stores a value at the column's scale: `10^(p-s) - 0.5 * 10^-s`.
pub fn decimal_rounding_limit(precision: u32, scale: u32) -> f64 {
    let half_unit = 0.5 / 10_f64.powi(i32::try_from(scale).unwrap_or(i32::MAX));
    decimal_abs_bound(precision, scale) - half_unit
}

/// Whether a declared type string can be masked at all.
///
/// Unparsable parameters count as "not obfuscatable".
pub fn is_obfuscatable_type(declared: &str) -> bool {
    SqlType::parse(declared).is_ok_and(|t| t.is_obfuscatable())
}

struct TypeParts<'a> {
    base: &'a str,
    params: Option<&'a str>,
    modifiers: &'a str,
}

fn split_type(lowered: &str) -> Option<TypeParts<'_>> {
    match lowered.find('(') {
        Some(open) => {
            let close = lowered.rfind(')')?;
            if close < open {
                return None;
            }
            Some(TypeParts {
                base: lowered.get(..open)?.trim(),
                params: Some(lowered.get(open.checked_add(1)?..close)?.trim()),
                modifiers: lowered.get(close.checked_add(1)?..)?.trim(),
            })
        }
        None => {
            let (base, modifiers) = lowered.split_once(' ').unwrap_or((lowered, ""));
            Some(TypeParts {
                base,
                params: None,
                modifiers,
            })
        }
    }
}

fn parse_size(declared: &str, params: &str) -> Result<usize> {
    params.trim().parse::<usize>().map_err(|e| {
        ObfuscatorError::type_parse(declared, format!("invalid size '{}': {}", params, e))
    })
}

fn parse_decimal(declared: &str, params: Option<&str>) -> Result<SqlType> {
    let Some(params) = params else {
        return Ok(SqlType::Decimal {
            precision: DEFAULT_DECIMAL_PRECISION,
            scale: 0,
        });
    };

    let parse_part = |part: &str| {
        part.trim().parse::<u32>().map_err(|e| {
            ObfuscatorError::type_parse(declared, format!("invalid precision '{}': {}", part, e))
        })
    };

    let (precision, scale) = match params.split_once(',') {
        Some((p, s)) => (parse_part(p)?, parse_part(s)?),
        None => (parse_part(params)?, 0),
    };

    if precision == 0 || precision > MAX_DECIMAL_PRECISION {
        return Err(ObfuscatorError::type_parse(
            declared,
            format!("precision {} outside 1..={}", precision, MAX_DECIMAL_PRECISION),
        ));
    }
    if scale > precision {
        return Err(ObfuscatorError::type_parse(
            declared,
            format!("scale {} exceeds precision {}", scale, precision),
        ));
    }

    Ok(SqlType::Decimal { precision, scale })
}
