// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use rquickjs::{
    module::{Declarations, Exports, ModuleDef},
    prelude::{Func, Opt},
    ArrayBuffer, Ctx, Function, Object, Result, TypedArray, Value,
};

use crate::compiler::{compile_code, CompileOptions};
use crate::error::Error;
use crate::loader::{create_require, services};
use crate::rehydrate::run_bytecode;
use crate::utils::{module::export_default, result::ResultExt};

const COMPILE_CODE_NAME: &str = "<compileCode>";

/// The `module` builtin.
pub struct ModuleModule;

fn create_require_from<'js>(ctx: Ctx<'js>, location: String) -> Result<Function<'js>> {
    let location = location.strip_prefix("file://").unwrap_or(&location);
    let path = Path::new(location);
    let dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent().map(Path::to_path_buf).unwrap_or_else(PathBuf::new)
    };
    create_require(&ctx, dir)
}

impl ModuleDef for ModuleModule {
    fn declare(declare: &Declarations) -> Result<()> {
        declare.declare("createRequire")?;
        declare.declare("default")?;

        Ok(())
    }

    fn evaluate<'js>(ctx: &Ctx<'js>, exports: &Exports<'js>) -> Result<()> {
        export_default(ctx, exports, |default| {
            default.set("createRequire", Func::from(create_require_from))?;

            Ok(())
        })?;

        Ok(())
    }
}

/// The `bytecache` builtin, also returned by `require("bytecache")`.
pub struct BytecacheModule;

fn compile_code_js<'js>(
    ctx: Ctx<'js>,
    source: Value<'js>,
    compress: Opt<bool>,
) -> Result<TypedArray<'js, u8>> {
    let source = match source.as_string() {
        Some(source) => source.to_string()?,
        None => {
            return Err(Error::InputType(String::from(
                "The \"source\" argument must be of type string",
            ))
            .throw(&ctx))
        },
    };
    let services = services(&ctx)?;
    let options = CompileOptions {
        wrap_as_module: false,
        compress: compress.0.unwrap_or_default(),
        ..CompileOptions::default()
    };

    let bytes =
        compile_code(&ctx, services.build(), COMPILE_CODE_NAME, &source, &options).or_throw(&ctx)?;
    TypedArray::new(ctx.clone(), bytes)
}

fn bytes_from_value(ctx: &Ctx<'_>, value: &Value<'_>) -> Result<Vec<u8>> {
    if let Some(object) = value.as_object() {
        if let Ok(array) = TypedArray::<u8>::from_object(object.clone()) {
            if let Some(bytes) = array.as_bytes() {
                return Ok(bytes.to_vec());
            }
        }
        if let Some(buffer) = ArrayBuffer::from_object(object.clone()) {
            if let Some(bytes) = buffer.as_bytes() {
                return Ok(bytes.to_vec());
            }
        }
    }
    Err(Error::InputType(String::from(
        "The \"bytes\" argument must be a Uint8Array or an ArrayBuffer",
    ))
    .throw(ctx))
}

fn run_bytecode_js<'js>(ctx: Ctx<'js>, bytes: Value<'js>) -> Result<Object<'js>> {
    let bytes = bytes_from_value(&ctx, &bytes)?;
    let services = services(&ctx)?;
    run_bytecode(&ctx, &services, &bytes, None).or_throw(&ctx)
}

fn register(ctx: Ctx<'_>) -> Result<bool> {
    Ok(services(&ctx)?.register_bytecode_hook())
}

fn set_api(object: &Object<'_>) -> Result<()> {
    object.set("compileCode", Func::from(compile_code_js))?;
    object.set("runBytecode", Func::from(run_bytecode_js))?;
    object.set("register", Func::from(register))?;
    Ok(())
}

pub fn bytecache_api<'js>(ctx: &Ctx<'js>) -> Result<Object<'js>> {
    let api = Object::new(ctx.clone())?;
    set_api(&api)?;
    Ok(api)
}

impl ModuleDef for BytecacheModule {
    fn declare(declare: &Declarations) -> Result<()> {
        declare.declare("compileCode")?;
        declare.declare("runBytecode")?;
        declare.declare("register")?;
        declare.declare("default")?;

        Ok(())
    }

    fn evaluate<'js>(ctx: &Ctx<'js>, exports: &Exports<'js>) -> Result<()> {
        export_default(ctx, exports, set_api)?;

        Ok(())
    }
}
