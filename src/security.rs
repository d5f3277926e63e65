//! Security key (sk) cell parsing.

use crate::error::{RegistryError, Result};
use crate::utils::read_u32_le;

/// Minimum size of a security key structure in bytes.
const SECURITY_KEY_MIN_SIZE: usize = 20;

/// Offset of the security descriptor in the security key structure.
const DESCRIPTOR_OFFSET: usize = 0x14;

/// Security key (sk) structure.
///
/// Security keys are shared between registry keys through a doubly linked
/// list and a reference count. The reference count is bookkeeping for
/// writers; readers copy the descriptor per key.
#[derive(Debug, Clone)]
pub struct SecurityKey {
    /// Offset to the previous security key cell.
    pub previous_offset: u32,

    /// Offset to the next security key cell.
    pub next_offset: u32,

    /// Number of keys referencing this security key.
    pub reference_count: u32,

    /// Raw security descriptor bytes (NT SECURITY_DESCRIPTOR, self-relative).
    descriptor: Vec<u8>,
}

impl SecurityKey {
    /// Parses a security key from cell data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SECURITY_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: SECURITY_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"sk" {
            return Err(RegistryError::InvalidFormat(format!(
                "Expected 'sk' signature at offset {:#x}",
                offset
            )));
        }

        // Two reserved bytes at 0x02
        let previous_offset = read_u32_le(data, 0x04)?;
        let next_offset = read_u32_le(data, 0x08)?;
        let reference_count = read_u32_le(data, 0x0C)?;
        let descriptor_size = read_u32_le(data, 0x10)? as usize;

        if descriptor_size > data.len() - DESCRIPTOR_OFFSET {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: DESCRIPTOR_OFFSET.saturating_add(descriptor_size),
                actual: data.len(),
            });
        }

        let descriptor = data[DESCRIPTOR_OFFSET..DESCRIPTOR_OFFSET + descriptor_size].to_vec();

        Ok(SecurityKey {
            previous_offset,
            next_offset,
            reference_count,
            descriptor,
        })
    }

    /// Returns the security descriptor bytes.
    pub fn descriptor(&self) -> &[u8] {
        &self.descriptor
    }

    /// Consumes the security key, returning the descriptor bytes.
    pub fn into_descriptor(self) -> Vec<u8> {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security_key_cell(descriptor: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; DESCRIPTOR_OFFSET + descriptor.len()];
        data[0..2].copy_from_slice(b"sk");
        data[0x0C..0x10].copy_from_slice(&2u32.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&(descriptor.len() as u32).to_le_bytes());
        data[DESCRIPTOR_OFFSET..].copy_from_slice(descriptor);
        data
    }

    #[test]
    fn test_security_key_minimum_size() {
        let data = vec![0u8; 19];
        assert!(SecurityKey::parse(&data, 0).is_err());
    }

    #[test]
    fn test_security_key_invalid_signature() {
        let mut data = vec![0u8; 24];
        data[0..2].copy_from_slice(b"XX");
        assert!(SecurityKey::parse(&data, 0).is_err());
    }

    #[test]
    fn test_security_key_descriptor() {
        let data = security_key_cell(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let sk = SecurityKey::parse(&data, 0).unwrap();

        assert_eq!(sk.reference_count, 2);
        assert_eq!(sk.descriptor(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(sk.into_descriptor(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_security_key_descriptor_size_out_of_bounds() {
        let mut data = security_key_cell(&[0x01, 0x02]);
        // Claim more descriptor bytes than the cell holds
        data[0x10..0x14].copy_from_slice(&64u32.to_le_bytes());
        assert!(SecurityKey::parse(&data, 0).is_err());
    }
}
