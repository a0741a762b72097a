// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//! Code cache support for the embedded QuickJS engine.
//!
//! QuickJS bytecode is framed in a serialized code data header which the engine
//! checks before it trusts a cache: magic number, engine version, source hash,
//! flag hash and a payload checksum. A cache that fails the check is rejected
//! and the supplied source is compiled instead.
use std::env;

use rquickjs::{module::Declared, CatchResultExt, Ctx, Module, Runtime, WriteOptions};
use tracing::trace;

use crate::environment;
use crate::error::{EngineResultExt, Error, Result};

mod layout;

pub use layout::{CacheLayout, RejectReason, MAGIC_NUMBER};
use layout::HeaderFields;

/// Version of the code cache format written by this engine binding.
pub const ENGINE_VERSION: &str = "20.1.0";

/// Parses the `major.minor` prefix of a version string such as `v8.9.4` or `20.1.0`.
pub fn parse_version(version: &str) -> Option<(u32, u32)> {
    let version = version.strip_prefix('v').unwrap_or(version);
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Runtime settings baked into the flag hash. None of them change program semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFlags {
    pub max_stack_size: usize,
    pub gc_threshold: usize,
    pub memory_limit: usize,
}

impl Default for EngineFlags {
    fn default() -> Self {
        Self {
            max_stack_size: 512 * 1024,
            gc_threshold: 20 * 1024 * 1024,
            memory_limit: 0,
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

impl EngineFlags {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_stack_size: env_usize(environment::ENV_BYTECACHE_MAX_STACK_SIZE_KB)
                .map(|kb| kb * 1024)
                .unwrap_or(defaults.max_stack_size),
            gc_threshold: env_usize(environment::ENV_BYTECACHE_GC_THRESHOLD_MB)
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.gc_threshold),
            memory_limit: env_usize(environment::ENV_BYTECACHE_MEMORY_LIMIT_MB)
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.memory_limit),
        }
    }

    pub fn apply(&self, runtime: &Runtime) {
        runtime.set_max_stack_size(self.max_stack_size);
        runtime.set_gc_threshold(self.gc_threshold);
        if self.memory_limit > 0 {
            runtime.set_memory_limit(self.memory_limit);
        }
    }

    fn hash(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        for value in [self.max_stack_size, self.gc_threshold, self.memory_limit] {
            hasher.update(&(value as u64).to_le_bytes());
        }
        hasher.finalize()
    }
}

fn feature_hash() -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(env::consts::ARCH.as_bytes());
    hasher.update(if cfg!(target_endian = "little") { b"le" } else { b"be" });
    hasher.update(&(usize::BITS).to_le_bytes());
    hasher.finalize()
}

/// Identity of an engine build: its version and the flags it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBuild {
    version: String,
    flags: EngineFlags,
}

impl EngineBuild {
    pub fn new(version: impl Into<String>, flags: EngineFlags) -> Self {
        Self {
            version: version.into(),
            flags,
        }
    }

    pub fn current() -> Self {
        Self::new(ENGINE_VERSION, EngineFlags::from_env())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn flags(&self) -> &EngineFlags {
        &self.flags
    }

    pub fn layout(&self) -> CacheLayout {
        CacheLayout::for_version(&self.version)
    }

    fn header_fields(&self, source_len: u32) -> HeaderFields {
        let version_hash = crc32fast::hash(self.version.as_bytes());
        let reference_tag = ((version_hash >> 16) as u16 ^ version_hash as u16) | 1;
        HeaderFields {
            magic: MAGIC_NUMBER ^ reference_tag as u32,
            version_hash,
            source_hash: source_len,
            flag_hash: self.flags.hash(),
            feature_hash: feature_hash(),
        }
    }

    /// Frames module bytecode compiled from a source of `source_len` UTF-16 code units.
    pub fn create_code_cache(&self, source_len: u32, bytecode: &[u8]) -> Vec<u8> {
        self.layout()
            .write(&self.header_fields(source_len), bytecode)
    }

    /// Compiles `source` as a module, reporting syntax errors as [`Error::Compile`].
    pub fn compile<'js>(&self, ctx: &Ctx<'js>, name: &str, source: &str) -> Result<Module<'js>> {
        Module::declare(ctx.clone(), name, source)
            .catch(ctx)
            .map_err(|err| Error::Compile(err.to_string()))
    }

    /// Compiles `source` while offering `cached` as precompiled data.
    ///
    /// When the cache passes the consistency check the source text is never
    /// compiled and the unit is bound to the cached bytecode. Otherwise the
    /// source is compiled and the unit reports why the cache was rejected.
    pub fn compile_with_cache<'js>(
        &self,
        ctx: &Ctx<'js>,
        name: &str,
        source: &str,
        cached: &[u8],
    ) -> Result<CompiledUnit<'js>> {
        let expected = self.header_fields(utf16_len(source));
        let reason = match self.layout().sanity_check(cached, &expected) {
            Ok(payload) => {
                // SAFETY: the payload checksum matched the one this engine wrote
                match unsafe { Module::load(ctx.clone(), payload) } {
                    Ok(module) => {
                        return Ok(CompiledUnit {
                            module,
                            rejected: None,
                        })
                    },
                    Err(err) => {
                        let err = Error::from_engine(ctx, err);
                        trace!("Bytecode payload refused: {}", err);
                        RejectReason::PayloadRejected
                    },
                }
            },
            Err(reason) => reason,
        };

        trace!("Code cache rejected for {}: {}", name, reason);
        let module = Module::declare(ctx.clone(), name, source).or_script_error(ctx)?;
        Ok(CompiledUnit {
            module,
            rejected: Some(reason),
        })
    }

    /// Writes the bytecode of a compiled module.
    pub fn write_module(&self, ctx: &Ctx<'_>, module: &Module<'_>) -> Result<Vec<u8>> {
        module.write(WriteOptions::default()).or_script_error(ctx)
    }
}

/// A module ready to evaluate, plus the outcome of the cache check.
pub struct CompiledUnit<'js> {
    module: Module<'js, Declared>,
    rejected: Option<RejectReason>,
}

impl<'js> CompiledUnit<'js> {
    pub fn rejected(&self) -> Option<RejectReason> {
        self.rejected
    }

    pub fn into_module(self) -> Module<'js, Declared> {
        self.module
    }
}

/// Length of `source` in UTF-16 code units, the unit the source hash is measured in.
pub fn utf16_len(source: &str) -> u32 {
    source.encode_utf16().count() as u32
}

#[cfg(test)]
mod tests {
    use rquickjs::{Context, Runtime};

    use super::*;

    fn with_ctx<F>(f: F)
    where
        F: for<'js> FnOnce(Ctx<'js>),
    {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f);
    }

    #[test]
    fn parses_versions() {
        assert_eq!(parse_version("v8.9.4"), Some((8, 9)));
        assert_eq!(parse_version("20.1.0"), Some((20, 1)));
        assert_eq!(parse_version("22"), Some((22, 0)));
        assert_eq!(parse_version("quickjs-ng"), None);
    }

    #[test]
    fn cache_round_trips_through_engine() {
        with_ctx(|ctx| {
            let build = EngineBuild::new(ENGINE_VERSION, EngineFlags::default());
            let source = "export const answer = 6 * 7;";
            let module = build.compile(&ctx, "answer", source).unwrap();
            let bytecode = build.write_module(&ctx, &module).unwrap();
            let cache = build.create_code_cache(utf16_len(source), &bytecode);

            let unit = build
                .compile_with_cache(&ctx, "answer", source, &cache)
                .unwrap();
            assert_eq!(unit.rejected(), None);

            let (module, promise) = unit.into_module().eval().unwrap();
            promise.finish::<()>().unwrap();
            let answer: i32 = module.get("answer").unwrap();
            assert_eq!(answer, 42);
        });
    }

    #[test]
    fn foreign_flags_are_rejected() {
        with_ctx(|ctx| {
            let writer = EngineBuild::new(ENGINE_VERSION, EngineFlags::default());
            let reader = EngineBuild::new(
                ENGINE_VERSION,
                EngineFlags {
                    max_stack_size: 1024 * 1024,
                    ..EngineFlags::default()
                },
            );
            let source = "export default 1;";
            let module = writer.compile(&ctx, "one", source).unwrap();
            let bytecode = writer.write_module(&ctx, &module).unwrap();
            let cache = writer.create_code_cache(utf16_len(source), &bytecode);

            let unit = reader
                .compile_with_cache(&ctx, "one", source, &cache)
                .unwrap();
            assert_eq!(unit.rejected(), Some(RejectReason::FlagsMismatch));
        });
    }

    #[test]
    fn syntax_error_is_compile_error() {
        with_ctx(|ctx| {
            let build = EngineBuild::new(ENGINE_VERSION, EngineFlags::default());
            let err = build.compile(&ctx, "broken", "function (").unwrap_err();
            assert!(matches!(err, Error::Compile(_)));
        });
    }

    #[test]
    fn utf16_length_counts_code_units() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("\"ಠ_ಠ\""), 5);
        assert_eq!(utf16_len("😀"), 2);
    }
}
