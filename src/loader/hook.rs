// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{fs, path::Path};

use rquickjs::{Ctx, Object, Result};
use tracing::trace;

use crate::loader::{evaluate_unit, registry::ExtensionHandler};
use crate::rehydrate::load_bytecode;
use crate::services::RuntimeServices;
use crate::utils::result::ResultExt;

/// Loads `.jsc` files: the cache is fixed up for the running engine,
/// rehydrated under its real path and evaluated like CommonJS source.
pub struct BytecodeHook;

impl ExtensionHandler for BytecodeHook {
    fn load<'js>(
        &self,
        ctx: &Ctx<'js>,
        services: &RuntimeServices,
        module: &Object<'js>,
        path: &Path,
    ) -> Result<()> {
        let bytes = fs::read(path).or_throw(ctx)?;
        evaluate_bytecode(ctx, services, module, path, &bytes)
    }
}

pub fn evaluate_bytecode<'js>(
    ctx: &Ctx<'js>,
    services: &RuntimeServices,
    module: &Object<'js>,
    path: &Path,
    bytes: &[u8],
) -> Result<()> {
    let filename = path.to_string_lossy();
    trace!("Loading bytecode: {} ({} bytes)", filename, bytes.len());
    let unit = load_bytecode(ctx, services, bytes, Some(filename.as_ref())).or_throw(ctx)?;
    evaluate_unit(ctx, unit, module)
}
