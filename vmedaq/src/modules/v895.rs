//! Register encodings of the CAEN V895 16 channel leading edge discriminator

use thiserror::Error;

/// Offset of the majority threshold register, written as a 16-bit word
pub const MAJORITY: u32 = 0x48;

/// Number of channels that can be required to fire together
pub const MAX_MAJORITY_LEVEL: u8 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid {what} `{value}`, expected {expected}")]
    InvalidArgument {
        what: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Encodes a majority level (the number of channels firing in coincidence) into the value of the
/// majority threshold register, `round((50 * level - 25) / 4)`
/// # Errors
/// Returns [`Error::InvalidArgument`] outside of 1..=20
pub fn encode_majority_level(level: u8) -> Result<u16, Error> {
    if !(1..=MAX_MAJORITY_LEVEL).contains(&level) {
        return Err(Error::InvalidArgument {
            what: "majority level",
            value: level.to_string(),
            expected: "1..=20",
        });
    }
    // 50 * level - 25 is odd, so adding 2 before the division rounds to nearest
    Ok((50 * u16::from(level) - 25 + 2) / 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_majority_levels() {
        for level in 1..=MAX_MAJORITY_LEVEL {
            let expected = ((f64::from(level) * 50.0 - 25.0) / 4.0).round();
            assert_eq!(
                f64::from(encode_majority_level(level).unwrap()),
                expected,
                "level {level}"
            );
        }
    }

    #[test]
    fn test_majority_known_values() {
        assert_eq!(encode_majority_level(1), Ok(6));
        assert_eq!(encode_majority_level(2), Ok(19));
        assert_eq!(encode_majority_level(20), Ok(244));
    }

    #[test]
    fn test_majority_out_of_range() {
        for level in [0, 21, u8::MAX] {
            assert!(matches!(
                encode_majority_level(level),
                Err(Error::InvalidArgument { .. })
            ));
        }
    }
}
