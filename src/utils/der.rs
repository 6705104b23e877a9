use crate::error::{Result, VerifyError};

/// Marker-driven view over raw DER bytes.
///
/// RA certificates are not walked as a full ASN.1 tree. A field is found by
/// searching for the encoded OID that precedes it, and the value that follows
/// is read as a single TLV. Every offset is checked against the buffer, so
/// hostile input yields [`VerifyError::CertFormat`] instead of a panic.
pub struct DerScanner<'a> {
    bytes: &'a [u8],
}

impl<'a> DerScanner<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Offset of the first byte following the first occurrence of `marker`.
    pub fn locate_field_by_marker(&self, marker: &[u8]) -> Option<usize> {
        if marker.is_empty() || marker.len() > self.bytes.len() {
            return None;
        }
        self.bytes
            .windows(marker.len())
            .position(|window| window == marker)
            .map(|index| index + marker.len())
    }

    /// Reads a DER length starting at `offset`.
    ///
    /// Returns the decoded length and the offset of the first value byte.
    /// Short form (`< 0x80`) and the one and two byte long forms are accepted;
    /// indefinite and wider lengths are rejected. A lone `0x80` is an error
    /// here, although earlier scanners read it as a short length of 128.
    pub fn read_tlv_length(&self, offset: usize) -> Result<(usize, usize)> {
        let first = self.byte_at(offset)?;
        match first {
            0x00..=0x7F => Ok((first as usize, offset + 1)),
            0x81 => {
                let len = self.byte_at(offset + 1)? as usize;
                Ok((len, offset + 2))
            }
            0x82 => {
                let hi = self.byte_at(offset + 1)? as usize;
                let lo = self.byte_at(offset + 2)? as usize;
                Ok(((hi << 8) | lo, offset + 3))
            }
            other => Err(VerifyError::CertFormat(format!(
                "unsupported DER length encoding 0x{other:02x} at offset {offset}"
            ))),
        }
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn read_octets(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(len).ok_or_else(|| {
            VerifyError::CertFormat(format!("length {len} at offset {offset} overflows"))
        })?;
        self.bytes.get(offset..end).ok_or_else(|| {
            VerifyError::CertFormat(format!(
                "field [{offset}, {end}) exceeds certificate of {} bytes",
                self.bytes.len()
            ))
        })
    }

    /// Locates `marker`, checks that the next element carries `tag`, and
    /// returns that element's value bytes.
    pub fn read_value_after_marker(&self, marker: &[u8], tag: u8, field: &str) -> Result<&'a [u8]> {
        let tag_offset = self
            .locate_field_by_marker(marker)
            .ok_or_else(|| VerifyError::CertFormat(format!("{field} marker not found")))?;

        let found = self.byte_at(tag_offset)?;
        if found != tag {
            return Err(VerifyError::CertFormat(format!(
                "{field}: expected tag 0x{tag:02x} but found 0x{found:02x}"
            )));
        }

        let (len, value_offset) = self.read_tlv_length(tag_offset + 1)?;
        self.read_octets(value_offset, len)
    }

    fn byte_at(&self, offset: usize) -> Result<u8> {
        self.bytes.get(offset).copied().ok_or_else(|| {
            VerifyError::CertFormat(format!(
                "offset {offset} exceeds certificate of {} bytes",
                self.bytes.len()
            ))
        })
    }
}
