// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use rquickjs::{Ctx, Module, Object};
use tracing::trace;

use crate::bucket::CompatBucket;
use crate::bytecode::decompress_if_needed;
use crate::engine::EngineBuild;
use crate::error::{EngineResultExt, Error, Result};
use crate::fixup::fix_bytecode;
use crate::services::RuntimeServices;

/// Zero width space, one UTF-16 code unit and unlikely to occur in real source.
pub const PLACEHOLDER_FILLER: char = '\u{200B}';
/// Longest string QuickJS can hold, in UTF-16 code units.
pub const MAX_SOURCE_LENGTH: u32 = (1 << 30) - 1;
const ANONYMOUS: &str = "<anonymous>";

/// Builds a string literal of exactly `length` UTF-16 code units, or nothing when `length <= 1`.
pub fn placeholder_source(length: u32) -> String {
    if length <= 1 {
        return String::new();
    }
    let fillers = (length - 2) as usize;
    let mut source = String::with_capacity(fillers * PLACEHOLDER_FILLER.len_utf8() + 2);
    source.push('"');
    source.extend(std::iter::repeat(PLACEHOLDER_FILLER).take(fillers));
    source.push('"');
    source
}

/// Reconstructs a compiled module from a validated, fixed cache buffer.
///
/// The engine is handed a placeholder whose length matches the declared source
/// length, so it accepts the cache and binds the unit to the cached bytecode.
pub fn rehydrate<'js>(
    ctx: &Ctx<'js>,
    build: &EngineBuild,
    bucket: CompatBucket,
    buf: &[u8],
    filename: Option<&str>,
) -> Result<Module<'js>> {
    let length = bucket
        .read_source_length(buf)
        .ok_or(Error::InvalidBytecode)?;
    if length > MAX_SOURCE_LENGTH {
        trace!("Declared source length {} exceeds the engine maximum", length);
        return Err(Error::InvalidBytecode);
    }
    let placeholder = placeholder_source(length);

    let unit = build.compile_with_cache(ctx, filename.unwrap_or(ANONYMOUS), &placeholder, buf)?;
    if let Some(reason) = unit.rejected() {
        return Err(Error::IncompatibleCache(reason));
    }
    Ok(unit.into_module())
}

/// Validates, decompresses, patches and rehydrates `bytes` on a private copy.
pub fn load_bytecode<'js>(
    ctx: &Ctx<'js>,
    services: &RuntimeServices,
    bytes: &[u8],
    filename: Option<&str>,
) -> Result<Module<'js>> {
    let mut buf = decompress_if_needed(bytes)?.into_owned();
    let bucket = services.bucket();
    fix_bytecode(services.build(), bucket, &mut buf)?;
    trace!(
        "Rehydrating {} ({} bytes)",
        filename.unwrap_or(ANONYMOUS),
        buf.len()
    );
    rehydrate(ctx, services.build(), bucket, &buf, filename)
}

/// Loads `bytes` and evaluates the unit, returning its module namespace.
pub fn run_bytecode<'js>(
    ctx: &Ctx<'js>,
    services: &RuntimeServices,
    bytes: &[u8],
    filename: Option<&str>,
) -> Result<Object<'js>> {
    let module = load_bytecode(ctx, services, bytes, filename)?;
    let (module, promise) = module.eval().or_script_error(ctx)?;
    promise.finish::<()>().or_script_error(ctx)?;
    module.namespace().or_script_error(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile_code, compile_source, CompileOptions};
    use crate::engine::{utf16_len, EngineFlags, RejectReason, ENGINE_VERSION};
    use crate::test_utils::utils::{test_build, with_vm};

    fn unwrapped() -> CompileOptions {
        CompileOptions {
            wrap_as_module: false,
            ..CompileOptions::default()
        }
    }

    #[test]
    fn placeholder_has_declared_length() {
        for length in 0..300u32 {
            let placeholder = placeholder_source(length);
            if length <= 1 {
                assert!(placeholder.is_empty());
            } else {
                assert_eq!(utf16_len(&placeholder), length);
                assert!(placeholder.starts_with('"') && placeholder.ends_with('"'));
            }
        }
    }

    #[test]
    fn round_trip_matches_direct_execution() {
        let source = "export const value = [3, 1, 2].sort().join('-') + `${2 ** 10}`;";
        with_vm(test_build(ENGINE_VERSION), |ctx, services| {
            let direct: String = ctx
                .eval::<String, _>("[3, 1, 2].sort().join('-') + `${2 ** 10}`")
                .unwrap();
            let cache = compile_code(&ctx, services.build(), "rt", source, &unwrapped()).unwrap();

            let namespace = run_bytecode(&ctx, services, &cache, Some("rt.jsc")).unwrap();
            let value: String = namespace.get("value").unwrap();
            assert_eq!(value, direct);
        });
    }

    #[test]
    fn compressed_cache_loads() {
        let options = CompileOptions {
            compress: true,
            ..unwrapped()
        };
        with_vm(test_build(ENGINE_VERSION), |ctx, services| {
            let cache = compile_code(&ctx, services.build(), "z", "export default 7;", &options)
                .unwrap();
            let namespace = run_bytecode(&ctx, services, &cache, None).unwrap();
            let value: i32 = namespace.get("default").unwrap();
            assert_eq!(value, 7);
        });
    }

    #[test]
    fn fixup_bridges_foreign_flags() {
        let foreign = EngineBuild::new(
            ENGINE_VERSION,
            EngineFlags {
                gc_threshold: 64 * 1024 * 1024,
                ..EngineFlags::default()
            },
        );
        let cache = compile_source(&foreign, "flags", "export default 'ok';", &unwrapped())
            .unwrap();

        with_vm(test_build(ENGINE_VERSION), |ctx, services| {
            let unpatched = rehydrate(&ctx, services.build(), services.bucket(), &cache, None);
            assert!(matches!(
                unpatched,
                Err(Error::IncompatibleCache(RejectReason::FlagsMismatch))
            ));

            let namespace = run_bytecode(&ctx, services, &cache, None).unwrap();
            let value: String = namespace.get("default").unwrap();
            assert_eq!(value, "ok");
        });
    }

    #[test]
    fn other_engine_version_is_incompatible() {
        let cache = compile_source(&test_build("21.0.0"), "v", "export default 1;", &unwrapped())
            .unwrap();

        with_vm(test_build("22.0.0"), |ctx, services| {
            let result = load_bytecode(&ctx, services, &cache, None);
            assert!(matches!(result, Err(Error::IncompatibleCache(_))));
        });
    }

    #[test]
    fn every_bucket_round_trips() {
        for version in ["8.8.2", "16.20.0", "25.0.0"] {
            let foreign = EngineBuild::new(
                version,
                EngineFlags {
                    max_stack_size: 2 * 1024 * 1024,
                    ..EngineFlags::default()
                },
            );
            let cache = compile_source(&foreign, "b", "export default 40 + 2;", &unwrapped())
                .unwrap();

            with_vm(test_build(version), |ctx, services| {
                let namespace = run_bytecode(&ctx, services, &cache, None).unwrap();
                let value: i32 = namespace.get("default").unwrap();
                assert_eq!(value, 42, "{version}");
            });
        }
    }

    #[test]
    fn oversized_source_length_is_invalid() {
        let mut forged = vec![0x01, 0x02, 0xDE, 0xC0, 0, 0, 0, 0];
        forged.extend_from_slice(&u32::MAX.to_le_bytes());
        forged.extend_from_slice(&[0; 12]);

        with_vm(test_build(ENGINE_VERSION), |ctx, services| {
            assert!(crate::bytecode::is_valid_cache(&forged));
            let result = load_bytecode(&ctx, services, &forged, Some("forged.jsc"));
            assert!(matches!(result, Err(Error::InvalidBytecode)));
        });
    }

    #[test]
    fn random_bytes_are_invalid() {
        with_vm(test_build(ENGINE_VERSION), |ctx, services| {
            let noise = [0x13, 0x37, 0x42, 0x99, 0x00, 0xfe, 0x21, 0x7a, 0x0c, 0xb4];
            let result = load_bytecode(&ctx, services, &noise, None);
            assert!(matches!(result, Err(Error::InvalidBytecode)));
        });
    }
}
