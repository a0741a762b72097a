// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use tracing::trace;

use crate::bucket::CompatBucket;
use crate::compiler::{compile_source, CompileOptions};
use crate::engine::EngineBuild;
use crate::error::{Error, Result};

/// Trivial program compiled on every fixup to learn the running engine's header values.
pub const REFERENCE_SOURCE: &str = "\"ಠ_ಠ\"";

/// Copies the build flag ranges of a freshly compiled reference cache into `buf`.
///
/// The reference is compiled in a scratch engine instance so nothing is left
/// behind in the caller's context. `buf` must already have passed
/// [`crate::bytecode::is_valid_cache`].
pub fn fix_bytecode(build: &EngineBuild, bucket: CompatBucket, buf: &mut [u8]) -> Result<()> {
    let options = CompileOptions {
        wrap_as_module: false,
        compress: false,
        ..CompileOptions::default()
    };
    let reference = compile_source(build, "<reference>", REFERENCE_SOURCE, &options)?;

    for range in bucket.patch_ranges() {
        let (Some(from), Some(to)) = (reference.get(range.clone()), buf.get_mut(range.clone()))
        else {
            return Err(Error::InvalidBytecode);
        };
        to.copy_from_slice(from);
    }
    trace!("Patched {:?} header for engine {}", bucket, build.version());

    Ok(())
}
