// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//! Persist compiled QuickJS modules as code caches and load them back later,
//! even on an engine build whose flags differ from the one that compiled them.

pub mod bucket;
pub mod bytecode;
pub mod compiler;
mod compiler_common;
pub mod cross_runtime;
pub mod engine;
pub mod environment;
pub mod error;
pub mod fixup;
pub mod loader;
pub mod minimal_tracer;
pub mod rehydrate;
pub mod services;
pub mod stub;
pub mod utils;
pub mod vm;

pub use bucket::CompatBucket;
pub use bytecode::{decompress_if_needed, is_valid_cache};
pub use compiler::{
    compile_code, compile_file, compile_source, CompileOptions, CompileTarget, CompiledArtifact,
};
pub use engine::{EngineBuild, EngineFlags, RejectReason, ENGINE_VERSION};
pub use error::{Error, Result};
pub use fixup::fix_bytecode;
pub use rehydrate::{load_bytecode, rehydrate, run_bytecode};
pub use services::RuntimeServices;
pub use stub::{generate_stub, write_stub, StubKind};
pub use vm::Vm;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
