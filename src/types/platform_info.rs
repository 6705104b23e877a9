use serde::Serialize;
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use crate::constants::{PLATFORM_INFO_BLOB_LEN, PLATFORM_INFO_HEADER_LEN};
use crate::error::PolicyError;
use crate::utils::byte_list;

/// Advisory platform state IAS attaches to degraded quote statuses.
///
/// Layout after the 4 byte TLV header. Multi-byte integers are little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct PlatformInfoBlob {
    /// [1 byte]
    pub sgx_epid_group_flags: u8,

    /// [2 bytes]
    pub sgx_tcb_evaluation_flags: little_endian::U16,

    /// [2 bytes]
    pub pse_evaluation_flags: little_endian::U16,

    /// [18 bytes]
    pub latest_equivalent_tcb_psvn: [u8; 18],

    /// [2 bytes]
    pub latest_pse_isvsvn: [u8; 2],

    /// [4 bytes]
    pub latest_psda_svn: [u8; 4],

    /// Extended EPID group id.
    /// [4 bytes]
    pub xeid: little_endian::U32,

    /// EPID group id.
    /// [4 bytes]
    pub gid: little_endian::U32,

    /// [64 bytes]
    pub signature: Ec256Signature,
}

/// `sgx_ec256_signature_t` embedded in the platform info blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct Ec256Signature {
    pub gx: [u8; 32],
    pub gy: [u8; 32],
}

impl PlatformInfoBlob {
    /// Decodes the hex `platformInfoBlob` field of an attestation report.
    ///
    /// The decoded blob must be exactly 105 bytes; its 4 byte header is dropped.
    pub fn from_hex(blob: &str) -> Result<Self, PolicyError> {
        let raw = hex::decode(blob).map_err(|_| PolicyError::IllegalPlatformInfoBlob)?;
        if raw.len() != PLATFORM_INFO_BLOB_LEN {
            return Err(PolicyError::IllegalPlatformInfoBlob);
        }
        raw.get(PLATFORM_INFO_HEADER_LEN..)
            .and_then(Self::read_from)
            .ok_or(PolicyError::IllegalPlatformInfoBlob)
    }
}

impl Serialize for PlatformInfoBlob {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Signature<'a> {
            #[serde(with = "byte_list")]
            gx: &'a [u8; 32],
            #[serde(with = "byte_list")]
            gy: &'a [u8; 32],
        }

        #[derive(Serialize)]
        struct Summary<'a> {
            sgx_epid_group_flags: u8,
            sgx_tcb_evaluation_flags: u32,
            pse_evaluation_flags: u32,
            #[serde(with = "byte_list")]
            latest_equivalent_tcb_psvn: &'a [u8; 18],
            #[serde(with = "byte_list")]
            latest_pse_isvsvn: &'a [u8; 2],
            #[serde(with = "byte_list")]
            latest_psda_svn: &'a [u8; 4],
            xeid: u32,
            gid: u32,
            sgx_ec256_signature_t: Signature<'a>,
        }

        Summary {
            sgx_epid_group_flags: self.sgx_epid_group_flags,
            sgx_tcb_evaluation_flags: self.sgx_tcb_evaluation_flags.get().into(),
            pse_evaluation_flags: self.pse_evaluation_flags.get().into(),
            latest_equivalent_tcb_psvn: &self.latest_equivalent_tcb_psvn,
            latest_pse_isvsvn: &self.latest_pse_isvsvn,
            latest_psda_svn: &self.latest_psda_svn,
            xeid: self.xeid.get(),
            gid: self.gid.get(),
            sgx_ec256_signature_t: Signature {
                gx: &self.signature.gx,
                gy: &self.signature.gy,
            },
        }
        .serialize(serializer)
    }
}
