use std::time::SystemTime;

use x509_cert::certificate::CertificateInner;

pub mod der;
pub mod hash;

/// Serializes byte arrays as `"[1, 2, 3]"` strings, the rendering used in
/// IAS platform info dumps.
pub mod byte_list {
    use serde::Serializer;

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&render(value.as_ref()))
    }

    pub fn render(bytes: &[u8]) -> String {
        let items: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
        format!("[{}]", items.join(", "))
    }
}

pub trait Expireable {
    fn valid_at(&self, timestamp: SystemTime) -> bool;
}

impl Expireable for CertificateInner {
    /// Validate a single certificate not_before/not_after
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        let nb = self.tbs_certificate.validity.not_before.to_system_time();
        let na = self.tbs_certificate.validity.not_after.to_system_time();
        !(timestamp < nb || na < timestamp)
    }
}

impl Expireable for &[CertificateInner] {
    fn valid_at(&self, timestamp: SystemTime) -> bool {
        self.iter().all(|cert| cert.valid_at(timestamp))
    }
}

/// Removes `std::mem::size_of<T>()` bytes from the front of `bytes` and returns it as a `T`.
///
/// Returns `None` and leaves `bytes` unchanged if it isn't long enough.
pub fn read_from_bytes<T: zerocopy::FromBytes>(bytes: &mut &[u8]) -> Option<T> {
    let front = T::read_from_prefix(bytes)?;
    *bytes = &bytes[std::mem::size_of::<T>()..];
    Some(front)
}

/// Printable rendering of raw certificate bytes for trace output.
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_list_matches_ias_rendering() {
        assert_eq!(byte_list::render(&[1, 2, 255]), "[1, 2, 255]");
        assert_eq!(byte_list::render(&[]), "[]");
    }

    #[test]
    fn read_from_bytes_advances_only_on_success() {
        let data = [1u8, 2, 3];
        let mut cursor = &data[..];
        let pair: Option<[u8; 2]> = read_from_bytes(&mut cursor);
        assert_eq!(pair, Some([1, 2]));
        assert_eq!(cursor, &[3]);

        let too_long: Option<[u8; 4]> = read_from_bytes(&mut cursor);
        assert!(too_long.is_none());
        assert_eq!(cursor, &[3]);
    }

    #[test]
    fn escape_bytes_is_printable() {
        assert_eq!(escape_bytes(b"a\n\"\x01"), "a\\n\\\"\\x01");
    }
}
