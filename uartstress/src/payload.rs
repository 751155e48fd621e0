//! Test payloads and the additive checksum the device echoes back.
//!
//! A payload is a run of random bytes in `1..=255`; zero never appears on the
//! wire. The device answers with the 32-bit wrapping sum of everything it
//! received, sent as [`RESPONSE_LEN`] bytes in an agreed [`ResponseByteOrder`].

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use rand::Rng;

/// Length of the checksum trailer sent back by the device.
pub const RESPONSE_LEN: usize = 4;

/// 32-bit wrapping sum of `data`, accumulated in order.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Byte order of the checksum trailer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ResponseByteOrder {
    /// Least significant byte first (what little-endian MCUs send from a raw `uint32_t`).
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

impl ResponseByteOrder {
    /// Decode a checksum trailer.
    pub fn decode(self, bytes: [u8; RESPONSE_LEN]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(&bytes),
            Self::Big => BigEndian::read_u32(&bytes),
        }
    }

    /// Encode a checksum the way a conforming device sends it.
    pub fn encode(self, value: u32) -> [u8; RESPONSE_LEN] {
        let mut bytes = [0u8; RESPONSE_LEN];
        match self {
            Self::Little => LittleEndian::write_u32(&mut bytes, value),
            Self::Big => BigEndian::write_u32(&mut bytes, value),
        }
        bytes
    }
}

impl std::fmt::Display for ResponseByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Little => write!(f, "little-endian"),
            Self::Big => write!(f, "big-endian"),
        }
    }
}

/// Random test payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Generate `len` bytes from the thread-local RNG.
    pub fn random(len: usize) -> Self {
        Self::with_rng(len, &mut rand::thread_rng())
    }

    /// Generate `len` bytes from `rng`, each uniform in `1..=255`.
    pub fn with_rng<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Self {
        let bytes = (0..len)
            .map(|_| rng.gen_range(1..=u8::MAX))
            .collect();
        Self { bytes }
    }

    /// Payload bytes in transmission order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload has no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Checksum of the payload, recomputed on every call.
    pub fn checksum(&self) -> u32 {
        checksum(&self.bytes)
    }

    /// Lowercase hex dump, comma separated.
    pub fn to_hex(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
