// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

use super::parse_version;

pub const MAGIC_NUMBER: u32 = 0xC0DE_0000;

/// Byte offsets of the serialized code data header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayout {
    pub source_hash: usize,
    pub flag_hash: usize,
    pub feature_hash: Option<usize>,
    pub payload_length: usize,
    pub checksum: usize,
    pub header_size: usize,
}

const MAGIC_OFFSET: usize = 0;
const VERSION_HASH_OFFSET: usize = 4;

impl CacheLayout {
    const LEGACY: Self = Self {
        source_hash: 12,
        flag_hash: 16,
        feature_hash: Some(20),
        payload_length: 24,
        checksum: 28,
        header_size: 32,
    };

    const MODERN: Self = Self {
        source_hash: 8,
        flag_hash: 12,
        feature_hash: None,
        payload_length: 16,
        checksum: 20,
        header_size: 24,
    };

    const EXTENDED: Self = Self {
        source_hash: 8,
        flag_hash: 12,
        feature_hash: Some(16),
        payload_length: 20,
        checksum: 24,
        header_size: 28,
    };

    pub fn for_version(version: &str) -> Self {
        match parse_version(version) {
            Some((8, 8)) | Some((8, 9)) => Self::LEGACY,
            Some((major, _)) if (12..=23).contains(&major) => Self::MODERN,
            _ => Self::EXTENDED,
        }
    }
}

/// Values the engine stamps into (and expects back from) a header.
#[derive(Debug, Clone, Copy)]
pub struct HeaderFields {
    pub magic: u32,
    pub version_hash: u32,
    pub source_hash: u32,
    pub flag_hash: u32,
    pub feature_hash: u32,
}

/// Why the engine refused a code cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MagicMismatch,
    VersionMismatch,
    SourceMismatch,
    FlagsMismatch,
    FeaturesMismatch,
    LengthMismatch,
    ChecksumMismatch,
    PayloadRejected,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MagicMismatch => "magic number mismatch",
            Self::VersionMismatch => "version mismatch",
            Self::SourceMismatch => "source mismatch",
            Self::FlagsMismatch => "flags mismatch",
            Self::FeaturesMismatch => "features mismatch",
            Self::LengthMismatch => "length mismatch",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::PayloadRejected => "payload rejected",
        })
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

impl CacheLayout {
    pub fn write(&self, fields: &HeaderFields, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0; self.header_size + payload.len()];
        put_u32(&mut buf, MAGIC_OFFSET, fields.magic);
        put_u32(&mut buf, VERSION_HASH_OFFSET, fields.version_hash);
        put_u32(&mut buf, self.source_hash, fields.source_hash);
        put_u32(&mut buf, self.flag_hash, fields.flag_hash);
        if let Some(offset) = self.feature_hash {
            put_u32(&mut buf, offset, fields.feature_hash);
        }
        put_u32(&mut buf, self.payload_length, payload.len() as u32);
        put_u32(&mut buf, self.checksum, crc32fast::hash(payload));
        buf[self.header_size..].copy_from_slice(payload);
        buf
    }

    /// Runs the consistency check and returns the payload on success.
    pub fn sanity_check<'a>(
        &self,
        buf: &'a [u8],
        expected: &HeaderFields,
    ) -> Result<&'a [u8], RejectReason> {
        if buf.len() < self.header_size {
            return Err(RejectReason::LengthMismatch);
        }
        let field = |offset| read_u32(buf, offset).ok_or(RejectReason::LengthMismatch);

        if field(MAGIC_OFFSET)? != expected.magic {
            return Err(RejectReason::MagicMismatch);
        }
        if field(VERSION_HASH_OFFSET)? != expected.version_hash {
            return Err(RejectReason::VersionMismatch);
        }
        if field(self.source_hash)? != expected.source_hash {
            return Err(RejectReason::SourceMismatch);
        }
        if field(self.flag_hash)? != expected.flag_hash {
            return Err(RejectReason::FlagsMismatch);
        }
        if let Some(offset) = self.feature_hash {
            if field(offset)? != expected.feature_hash {
                return Err(RejectReason::FeaturesMismatch);
            }
        }

        let payload = &buf[self.header_size..];
        if field(self.payload_length)? as usize != payload.len() {
            return Err(RejectReason::LengthMismatch);
        }
        if field(self.checksum)? != crc32fast::hash(payload) {
            return Err(RejectReason::ChecksumMismatch);
        }
        Ok(payload)
    }
}
