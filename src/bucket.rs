// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::ops::Range;

use crate::engine::parse_version;

/// Group of engine versions sharing one code cache header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatBucket {
    /// 8.8.x and 8.9.x
    LegacyNarrow,
    /// 12 through 23
    ModernBroad,
    /// Everything older or newer
    CatchAll,
}

impl CompatBucket {
    pub fn from_version(version: &str) -> Self {
        match parse_version(version) {
            Some((8, 8)) | Some((8, 9)) => Self::LegacyNarrow,
            Some((major, _)) if (12..=23).contains(&major) => Self::ModernBroad,
            _ => Self::CatchAll,
        }
    }

    /// Header ranges holding build flags, copied from a reference cache by the fixup.
    pub fn patch_ranges(self) -> &'static [Range<usize>] {
        match self {
            Self::LegacyNarrow => &[16..20, 20..24],
            Self::ModernBroad => &[12..16],
            Self::CatchAll => &[12..16, 16..20],
        }
    }

    /// Offset of the little-endian source length field.
    pub fn source_length_offset(self) -> usize {
        match self {
            Self::LegacyNarrow => 12,
            Self::ModernBroad | Self::CatchAll => 8,
        }
    }

    /// Reads the declared source length, `None` if the buffer is too short.
    pub fn read_source_length(self, buf: &[u8]) -> Option<u32> {
        let offset = self.source_length_offset();
        let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_from_versions() {
        assert_eq!(CompatBucket::from_version("8.8.0"), CompatBucket::LegacyNarrow);
        assert_eq!(CompatBucket::from_version("v8.9.4"), CompatBucket::LegacyNarrow);
        assert_eq!(CompatBucket::from_version("8.7.0"), CompatBucket::CatchAll);
        assert_eq!(CompatBucket::from_version("10.24.1"), CompatBucket::CatchAll);
        assert_eq!(CompatBucket::from_version("12.22.1"), CompatBucket::ModernBroad);
        assert_eq!(CompatBucket::from_version("20.1.0"), CompatBucket::ModernBroad);
        assert_eq!(CompatBucket::from_version("23.0.0"), CompatBucket::ModernBroad);
        assert_eq!(CompatBucket::from_version("24.0.0"), CompatBucket::CatchAll);
        assert_eq!(CompatBucket::from_version(""), CompatBucket::CatchAll);
    }

    #[test]
    fn source_length_offsets() {
        assert_eq!(CompatBucket::LegacyNarrow.source_length_offset(), 12);
        assert_eq!(CompatBucket::ModernBroad.source_length_offset(), 8);
        assert_eq!(CompatBucket::CatchAll.source_length_offset(), 8);
    }

    #[test]
    fn reads_source_length_little_endian() {
        let mut buf = vec![0u8; 16];
        buf[8..12].copy_from_slice(&300u32.to_le_bytes());
        assert_eq!(CompatBucket::ModernBroad.read_source_length(&buf), Some(300));
        assert_eq!(CompatBucket::LegacyNarrow.read_source_length(&buf), Some(0));
        assert_eq!(CompatBucket::LegacyNarrow.read_source_length(&buf[..15]), None);
    }
}
