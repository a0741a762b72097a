// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::borrow::Cow;

use tracing::trace;

use crate::error::{Error, Result};

pub const BYTECODE_FILE_EXT: &str = ".jsc";
pub const MAGIC_MARKER: [u8; 2] = [0xDE, 0xC0];
pub const EMPTY_REFERENCE_TABLE: [u8; 2] = [0x00, 0x00];
const COMPRESSION_LEVEL: i32 = 19;

/// True if `buf` carries the engine magic marker and a non-empty reference table tag.
pub fn is_valid_cache(buf: &[u8]) -> bool {
    match (buf.get(..2), buf.get(2..4)) {
        (Some(tag), Some(magic)) => {
            tag != &EMPTY_REFERENCE_TABLE[..] && magic == &MAGIC_MARKER[..]
        },
        _ => false,
    }
}

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::bulk::compress(bytes, COMPRESSION_LEVEL)?)
}

/// Returns `buf` unchanged when it already is a cache, or its decompressed form.
pub fn decompress_if_needed(buf: &[u8]) -> Result<Cow<'_, [u8]>> {
    if is_valid_cache(buf) {
        return Ok(Cow::Borrowed(buf));
    }

    trace!("Not a raw code cache, trying to decompress {} bytes", buf.len());
    let decompressed = zstd::stream::decode_all(buf).map_err(|_| Error::InvalidBytecode)?;

    if is_valid_cache(&decompressed) {
        Ok(Cow::Owned(decompressed))
    } else {
        Err(Error::InvalidBytecode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cache() -> Vec<u8> {
        let mut buf = vec![0x35, 0x12, 0xDE, 0xC0];
        buf.extend_from_slice(&[7; 60]);
        buf
    }

    #[test]
    fn accepts_magic_marker() {
        assert!(is_valid_cache(&sample_cache()));
    }

    #[test]
    fn rejects_empty_reference_table() {
        let mut buf = sample_cache();
        buf[0] = 0;
        buf[1] = 0;
        assert!(!is_valid_cache(&buf));
    }

    #[test]
    fn rejects_short_and_foreign_buffers() {
        assert!(!is_valid_cache(&[]));
        assert!(!is_valid_cache(&[0x35, 0x12, 0xDE]));
        assert!(!is_valid_cache(b"export default 1"));
    }

    #[test]
    fn decompress_restores_original_bytes() {
        let original = sample_cache();
        let compressed = compress(&original).unwrap();
        assert!(!is_valid_cache(&compressed));
        let restored = decompress_if_needed(&compressed).unwrap();
        assert_eq!(restored.as_ref(), original.as_slice());
    }

    #[test]
    fn raw_cache_is_borrowed() {
        let original = sample_cache();
        let restored = decompress_if_needed(&original).unwrap();
        assert!(matches!(restored, Cow::Borrowed(_)));
    }

    #[test]
    fn random_bytes_are_invalid() {
        let noise = [0x4f, 0x91, 0x03, 0xa7, 0x5c, 0xe2, 0x18, 0x6b, 0xd0, 0x3e];
        assert!(matches!(
            decompress_if_needed(&noise),
            Err(Error::InvalidBytecode)
        ));
    }

    #[test]
    fn compressed_garbage_is_invalid() {
        let compressed = compress(b"not a code cache at all").unwrap();
        assert!(matches!(
            decompress_if_needed(&compressed),
            Err(Error::InvalidBytecode)
        ));
    }
}
