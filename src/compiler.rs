// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use rquickjs::{Context, Ctx, Runtime};
use tokio::fs;
use tracing::trace;

use crate::bytecode::{compress, BYTECODE_FILE_EXT};
use crate::compiler_common::{human_file_size, DummyLoader, DummyResolver};
use crate::cross_runtime;
use crate::engine::{utf16_len, EngineBuild};
use crate::error::Result;
use crate::stub::{write_stub, StubKind};

pub const MODULE_WRAPPER_PROLOGUE: &str =
    "export default (function (exports, require, module, __filename, __dirname, process, global) {\n";
pub const MODULE_WRAPPER_EPILOGUE: &str = "\n});\n";

/// Where compilation happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CompileTarget {
    #[default]
    InProcess,
    /// Another runtime executable with its own engine build. `None` discovers the default one.
    Runtime { executable: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub wrap_as_module: bool,
    pub compress: bool,
    /// Only consulted by [`compile_file`].
    pub target: CompileTarget,
    /// Companion loader written beside the artifact by [`compile_file`].
    pub loader: Option<StubKind>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            wrap_as_module: true,
            compress: false,
            target: CompileTarget::InProcess,
            loader: None,
        }
    }
}

/// Output of [`compile_file`].
#[derive(Debug)]
pub struct CompiledArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub stub: Option<PathBuf>,
}

pub fn wrap_module(source: &str) -> String {
    let mut wrapped = String::with_capacity(
        MODULE_WRAPPER_PROLOGUE.len() + source.len() + MODULE_WRAPPER_EPILOGUE.len(),
    );
    wrapped.push_str(MODULE_WRAPPER_PROLOGUE);
    wrapped.push_str(source);
    wrapped.push_str(MODULE_WRAPPER_EPILOGUE);
    wrapped
}

/// Compiles `source` inside `ctx` into a code cache, optionally wrapped and compressed.
pub fn compile_code(
    ctx: &Ctx<'_>,
    build: &EngineBuild,
    name: &str,
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<u8>> {
    let wrapped;
    let source = if options.wrap_as_module {
        wrapped = wrap_module(source);
        wrapped.as_str()
    } else {
        source
    };

    trace!("Compiling module: {}", name);
    let module = build.compile(ctx, name, source)?;
    let bytecode = build.write_module(ctx, &module)?;
    let cache = build.create_code_cache(utf16_len(source), &bytecode);

    if options.compress {
        compress(&cache)
    } else {
        Ok(cache)
    }
}

/// Compiles `source` in a fresh engine instance configured for `build`.
pub fn compile_source(
    build: &EngineBuild,
    name: &str,
    source: &str,
    options: &CompileOptions,
) -> Result<Vec<u8>> {
    let runtime = Runtime::new()?;
    build.flags().apply(&runtime);
    runtime.set_loader((DummyResolver,), (DummyLoader,));
    let context = Context::full(&runtime)?;

    context.with(|ctx| compile_code(&ctx, build, name, source, options))
}

pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension(BYTECODE_FILE_EXT.trim_start_matches('.'))
}

pub async fn compile_file(
    build: &EngineBuild,
    input: &Path,
    output: Option<&Path>,
    options: &CompileOptions,
) -> Result<CompiledArtifact> {
    let source = fs::read_to_string(input).await?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));
    let module_name = input.with_extension("").to_string_lossy().to_string();

    let bytes = match &options.target {
        CompileTarget::InProcess => compile_source(build, &module_name, &source, options)?,
        CompileTarget::Runtime { executable } => {
            cross_runtime::compile(&source, &module_name, executable.as_deref(), options).await?
        },
    };

    fs::write(&output, &bytes).await?;

    let stub = match options.loader {
        Some(kind) => Some(write_stub(&output, kind).await?),
        None => None,
    };

    trace!("JS size: {}", human_file_size(source.len()));
    trace!(
        "{} size: {}",
        if options.compress {
            "Compressed bytecode"
        } else {
            "Bytecode"
        },
        human_file_size(bytes.len())
    );

    Ok(CompiledArtifact {
        path: output,
        bytes,
        stub,
    })
}
