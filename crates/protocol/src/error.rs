//! Descriptor decoding errors

use thiserror::Error;

/// Errors raised while decoding raw descriptor bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Buffer ends before the descriptor does
    #[error("Descriptor too short: needed {needed}, got {available}")]
    TooShort { needed: usize, available: usize },

    /// Descriptor type byte does not match what the parser expects
    #[error("Unexpected descriptor type {found:#04x} (expected {expected:#04x})")]
    UnexpectedType { expected: u8, found: u8 },

    /// A nested descriptor reports a length that cannot be walked
    #[error("Invalid descriptor length {length} at offset {offset}")]
    InvalidLength { offset: usize, length: u8 },

    /// Endpoint descriptor appears before any interface descriptor
    #[error("Endpoint descriptor at offset {offset} has no owning interface")]
    OrphanEndpoint { offset: usize },
}

/// Type alias for descriptor results
pub type Result<T> = std::result::Result<T, DescriptorError>;

/// Fail with [`DescriptorError::TooShort`] unless `buf` holds `needed` bytes
pub(crate) fn ensure_len(buf: &[u8], needed: usize) -> Result<()> {
    if buf.len() < needed {
        return Err(DescriptorError::TooShort {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Fail with [`DescriptorError::UnexpectedType`] unless `found == expected`
pub(crate) fn ensure_type(found: u8, expected: u8) -> Result<()> {
    if found != expected {
        return Err(DescriptorError::UnexpectedType { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DescriptorError::TooShort {
            needed: 18,
            available: 4,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("too short"));
        assert!(msg.contains("18"));

        let err = DescriptorError::UnexpectedType {
            expected: 0x0f,
            found: 0x02,
        };
        assert!(format!("{}", err).contains("0x0f"));
    }

    #[test]
    fn test_ensure_helpers() {
        assert!(ensure_len(&[0; 5], 5).is_ok());
        assert_eq!(
            ensure_len(&[0; 2], 5),
            Err(DescriptorError::TooShort {
                needed: 5,
                available: 2
            })
        );
        assert!(ensure_type(1, 1).is_ok());
        assert!(ensure_type(2, 1).is_err());
    }
}
