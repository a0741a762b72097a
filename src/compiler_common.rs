// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
// Shared by the in-process compiler and host compile mode

use rquickjs::{
    loader::{Loader, Resolver},
    Ctx, Module, Result,
};

/// Resolves every import to itself; compilation never links.
pub struct DummyResolver;

impl Resolver for DummyResolver {
    fn resolve(&mut self, _ctx: &Ctx<'_>, _base: &str, name: &str) -> Result<String> {
        Ok(name.into())
    }
}

pub struct DummyLoader;

impl Loader for DummyLoader {
    fn load<'js>(&mut self, ctx: &Ctx<'js>, name: &str) -> Result<Module<'js>> {
        Module::declare(ctx.clone(), name, "")
    }
}

pub fn human_file_size(size: usize) -> String {
    let fsize = size as f64;
    let i = if size == 0 {
        0
    } else {
        (fsize.log2() / 1024f64.log2()).floor() as i32
    };
    let size = fsize / 1024f64.powi(i);
    let units = ["B", "kB", "MB", "GB", "TB", "PB"];
    format!("{:.3} {}", size, units[i as usize])
}
