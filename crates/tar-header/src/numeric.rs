//! Numeric and string fields of a header.

use crate::{HeaderError, Result};

/// Decode an octal ASCII field such as `"0000644\0"` or `"   123 "`.
///
/// Leading spaces are skipped and the number ends at the first space or
/// NUL. An empty field is zero.
///
/// # Errors
///
/// [`HeaderError::InvalidNumeric`] for non-octal digits or overflow.
pub fn parse_octal(field: &[u8]) -> Result<u64> {
    let invalid = || HeaderError::InvalidNumeric(field.to_vec());
    let digits = field
        .iter()
        .skip_while(|&&b| b == b' ')
        .take_while(|&&b| b != b' ' && b != 0);
    let mut value = 0u64;
    for &digit in digits {
        if !matches!(digit, b'0'..=b'7') {
            return Err(invalid());
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(digit - b'0')))
            .ok_or_else(invalid)?;
    }
    Ok(value)
}

/// Decode a numeric field that is either octal or GNU base-256.
///
/// Base-256 is flagged by the top bit of the first byte; the rest of the
/// field is a big-endian number. A leading `0xff` marks a negative value,
/// which sizes and ids may not hold; see [`parse_signed_numeric`].
///
/// # Errors
///
/// [`HeaderError::InvalidNumeric`] for malformed, negative or overflowing
/// values.
pub fn parse_numeric(field: &[u8]) -> Result<u64> {
    let Some((&first, rest)) = field.split_first() else {
        return Ok(0);
    };
    if first & 0x80 == 0 {
        return parse_octal(field);
    }
    if first == 0xff {
        return Err(HeaderError::InvalidNumeric(field.to_vec()));
    }
    rest.iter().try_fold(u64::from(first & 0x7f), |value, &byte| {
        value
            .checked_mul(256)
            .map(|v| v | u64::from(byte))
            .ok_or_else(|| HeaderError::InvalidNumeric(field.to_vec()))
    })
}

/// Like [`parse_numeric`], but a base-256 field led by `0xff` decodes as a
/// negative two's complement number. GNU tar writes pre-1970 times this way.
///
/// # Errors
///
/// [`HeaderError::InvalidNumeric`] for malformed values or values outside
/// the `i64` range.
pub fn parse_signed_numeric(field: &[u8]) -> Result<i64> {
    let invalid = || HeaderError::InvalidNumeric(field.to_vec());
    match field.split_first() {
        Some((&0xff, rest)) => {
            if rest.len() > 15 {
                return Err(invalid());
            }
            let magnitude = rest
                .iter()
                .fold(0i128, |value, &byte| (value << 8) | i128::from(byte));
            i64::try_from(magnitude - (1i128 << (8 * rest.len()))).map_err(|_| invalid())
        }
        _ => i64::try_from(parse_numeric(field)?).map_err(|_| invalid()),
    }
}

/// The part of `bytes` before the first NUL.
///
/// ```
/// assert_eq!(tar_header::truncate_null(b"name\0junk"), b"name");
/// assert_eq!(tar_header::truncate_null(b"full"), b"full");
/// ```
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    bytes.split(|&b| b == 0).next().unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_octal() {
        assert_eq!(parse_octal(b"0000644\0").unwrap(), 0o644);
        assert_eq!(parse_octal(b"   755 \0").unwrap(), 0o755);
        assert_eq!(parse_octal(b"\0\0\0\0").unwrap(), 0);
        assert_eq!(parse_octal(b"").unwrap(), 0);
        assert!(matches!(
            parse_octal(b"0009"),
            Err(HeaderError::InvalidNumeric(_))
        ));
        assert!(parse_octal(b"7777777777777777777777777").is_err());
    }

    #[test]
    fn test_base256() {
        // a 10 GiB size, too large for the 11-digit octal form
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[4..].copy_from_slice(&(10u64 << 30).to_be_bytes());
        assert_eq!(parse_numeric(&field).unwrap(), 10 << 30);

        let mut too_big = [0x80u8; 12];
        too_big[1] = 0x01;
        assert!(parse_numeric(&too_big).is_err());

        assert!(parse_numeric(&[0xff; 12]).is_err());
    }

    #[test]
    fn test_signed_base256() {
        assert_eq!(parse_signed_numeric(&[0xff; 12]).unwrap(), -1);

        let mut field = [0xffu8; 12];
        field[4..].copy_from_slice(&(-86_400i64).to_be_bytes());
        assert_eq!(parse_signed_numeric(&field).unwrap(), -86_400);

        assert_eq!(parse_signed_numeric(b"00000001750\0").unwrap(), 1000);

        // -2^64 does not fit
        let mut too_small = [0u8; 12];
        too_small[0] = 0xff;
        too_small[1..4].fill(0xff);
        assert!(parse_signed_numeric(&too_small).is_err());
    }

    proptest! {
        #[test]
        fn octal_and_base256_agree(value in 0u64..0o77777777777) {
            let octal = format!("{value:011o}\0");
            let mut binary = [0u8; 12];
            binary[0] = 0x80;
            binary[4..].copy_from_slice(&value.to_be_bytes());
            prop_assert_eq!(parse_numeric(octal.as_bytes()).unwrap(), value);
            prop_assert_eq!(parse_numeric(&binary).unwrap(), value);
        }

        #[test]
        fn base256_covers_u64(value in any::<u64>()) {
            let mut binary = [0u8; 12];
            binary[0] = 0x80;
            binary[4..].copy_from_slice(&value.to_be_bytes());
            prop_assert_eq!(parse_numeric(&binary).unwrap(), value);
        }
    }
}
