//! Identifier types for packs and objects.
//!
//! Both identifiers are raw 20-byte SHA-1 values with a lowercase-hex
//! textual form. They are kept as fixed-size, zero-heap containers so they
//! can be written to and read from the pack log without any framing.
//!
//! # Invariants
//! - `ObjectId`/`PackId` always hold exactly [`ID_RAW_LEN`] bytes.
//! - Equality, hashing, and ordering are over the raw bytes.
//! - The hex form is always lowercase, matching Git's canonical rendering.

use std::fmt;
use std::path::{Path, PathBuf};

/// Raw identifier width in bytes.
pub const ID_RAW_LEN: usize = 20;
/// Hex identifier width in characters.
pub const ID_HEX_LEN: usize = ID_RAW_LEN * 2;

/// A 20-byte Git object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    raw: [u8; ID_RAW_LEN],
}

impl ObjectId {
    /// Creates an id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: [u8; ID_RAW_LEN]) -> Self {
        Self { raw }
    }

    /// Creates an id from a raw slice, returning `None` for invalid lengths.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ID_RAW_LEN {
            return None;
        }
        let mut raw = [0u8; ID_RAW_LEN];
        raw.copy_from_slice(bytes);
        Some(Self { raw })
    }

    /// Parses a 40-character lowercase or uppercase hex id.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let bytes = hex.as_bytes();
        if bytes.len() != ID_HEX_LEN {
            return None;
        }
        let mut raw = [0u8; ID_RAW_LEN];
        for (i, out) in raw.iter_mut().enumerate() {
            let hi = hex_val(bytes[2 * i])?;
            let lo = hex_val(bytes[2 * i + 1])?;
            *out = (hi << 4) | lo;
        }
        Some(Self { raw })
    }

    /// The all-zero id, used by reflogs to mark ref creation/deletion.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            raw: [0u8; ID_RAW_LEN],
        }
    }

    /// Returns true if this is the all-zero id.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.raw.iter().all(|&b| b == 0)
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> &[u8; ID_RAW_LEN] {
        &self.raw
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.raw {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

/// A 20-byte pack identifier (the pack writer's content hash).
///
/// This is the value recorded in the pack log and embedded in the
/// `pack-<hex>.<ext>` file names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackId {
    raw: [u8; ID_RAW_LEN],
}

impl PackId {
    /// Creates a pack id from raw bytes.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: [u8; ID_RAW_LEN]) -> Self {
        Self { raw }
    }

    /// Creates a pack id from a raw slice, returning `None` for invalid lengths.
    #[must_use]
    pub fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        ObjectId::try_from_slice(bytes).map(|id| Self { raw: *id.raw() })
    }

    /// Parses a 40-character hex pack id.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        ObjectId::from_hex(hex).map(|id| Self { raw: *id.raw() })
    }

    /// Returns the raw bytes.
    #[inline]
    #[must_use]
    pub const fn raw(&self) -> &[u8; ID_RAW_LEN] {
        &self.raw
    }

    /// Returns the file name `pack-<hex>.<ext>` for this pack.
    #[must_use]
    pub fn file_name(&self, ext: PackExt) -> String {
        format!("pack-{self}.{}", ext.extension())
    }

    /// Returns the path of this pack's file with the given extension.
    #[must_use]
    pub fn file_path(&self, dir: &Path, ext: PackExt) -> PathBuf {
        dir.join(self.file_name(ext))
    }

    /// Extracts the pack id from a `pack-<hex>.<ext>` file name.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("pack-")?;
        if rest.len() < ID_HEX_LEN {
            return None;
        }
        let (hex, tail) = rest.split_at(ID_HEX_LEN);
        if !tail.is_empty() && !tail.starts_with('.') {
            return None;
        }
        Self::from_hex(hex)
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.raw {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackId({self})")
    }
}

/// Pack sibling file kinds.
///
/// `Index` must be published last so a concurrent pack scanner only
/// observes a pack once all of its siblings exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PackExt {
    /// The pack data file (`.pack`).
    Pack,
    /// The pack lookup index (`.idx`).
    Index,
    /// The reachability bitmap index (`.bitmap`).
    Bitmap,
    /// The keep marker (`.keep`); packs carrying one are never repacked.
    Keep,
}

impl PackExt {
    /// All extensions that make up a published pack triple, in publish
    /// order: the index goes last.
    pub const TRIPLE: [PackExt; 3] = [PackExt::Pack, PackExt::Bitmap, PackExt::Index];

    /// Returns the real file extension.
    #[inline]
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Pack => "pack",
            Self::Index => "idx",
            Self::Bitmap => "bitmap",
            Self::Keep => "keep",
        }
    }

    /// Returns the temporary extension used while staging.
    #[inline]
    #[must_use]
    pub const fn tmp_extension(self) -> &'static str {
        match self {
            Self::Pack => "pack_tmp",
            Self::Index => "idx_tmp",
            Self::Bitmap => "bitmap_tmp",
            Self::Keep => "keep_tmp",
        }
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_hex_round_trip() {
        let hex = "a3f5c9e8b7d6421f0e9a4c3b2d1e6f8a9b0c7d5e";
        let id = ObjectId::from_hex(hex).unwrap();
        assert_eq!(id.to_string(), hex);
    }

    #[test]
    fn object_id_rejects_bad_hex() {
        assert!(ObjectId::from_hex("zz").is_none());
        assert!(ObjectId::from_hex(&"g".repeat(40)).is_none());
        assert!(ObjectId::from_hex(&"a".repeat(39)).is_none());
        assert!(ObjectId::from_hex(&"a".repeat(41)).is_none());
    }

    #[test]
    fn object_id_zero() {
        assert!(ObjectId::zero().is_zero());
        assert!(!ObjectId::from_raw([1; ID_RAW_LEN]).is_zero());
    }

    #[test]
    fn try_from_slice_lengths() {
        assert!(ObjectId::try_from_slice(&[0u8; 19]).is_none());
        assert!(ObjectId::try_from_slice(&[0u8; 21]).is_none());
        assert!(ObjectId::try_from_slice(&[0u8; 20]).is_some());
    }

    #[test]
    fn pack_file_name_templating() {
        let id = PackId::from_raw([0xab; ID_RAW_LEN]);
        let name = id.file_name(PackExt::Bitmap);
        assert_eq!(name, format!("pack-{}.bitmap", "ab".repeat(20)));
    }

    #[test]
    fn pack_id_from_file_name() {
        let id = PackId::from_raw([0xcd; ID_RAW_LEN]);
        for ext in PackExt::TRIPLE {
            let parsed = PackId::from_file_name(&id.file_name(ext)).unwrap();
            assert_eq!(parsed, id);
        }
        assert!(PackId::from_file_name("pack-short.pack").is_none());
        assert!(PackId::from_file_name("loose.pack").is_none());
    }

    #[test]
    fn index_publishes_last() {
        assert_eq!(*PackExt::TRIPLE.last().unwrap(), PackExt::Index);
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = PackId::from_raw([0x00; ID_RAW_LEN]);
        let b = PackId::from_raw([0x01; ID_RAW_LEN]);
        assert!(a < b);
    }
}
