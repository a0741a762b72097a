// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use rquickjs::{
    loader::{BuiltinResolver, FileResolver, ModuleLoader, ScriptLoader},
    Context, Ctx, Module, Object, Runtime,
};
use tokio::fs;
use tracing::trace;

use crate::error::{EngineResultExt, Result};
use crate::loader::{
    self,
    builtin::{BytecacheModule, ModuleModule},
    normalize, BYTECACHE_MODULE,
};
use crate::services::RuntimeServices;

pub struct Vm {
    pub runtime: Runtime,
    pub ctx: Context,
    services: Arc<RuntimeServices>,
}

impl Vm {
    pub fn new(services: Arc<RuntimeServices>) -> Result<Self> {
        let runtime = Runtime::new()?;
        services.build().flags().apply(&runtime);

        let resolver = (
            BuiltinResolver::default()
                .with_module("module")
                .with_module(BYTECACHE_MODULE),
            FileResolver::default().with_path("."),
        );
        let module_loader = (
            ModuleLoader::default()
                .with_module("module", ModuleModule)
                .with_module(BYTECACHE_MODULE, BytecacheModule),
            ScriptLoader::default().with_extension("mjs"),
        );
        runtime.set_loader(resolver, module_loader);

        let ctx = Context::full(&runtime)?;
        ctx.with(|ctx| loader::init(&ctx, services.clone()).or_script_error(&ctx))?;
        trace!("Initialized VM for engine {}", services.build().version());

        Ok(Self {
            runtime,
            ctx,
            services,
        })
    }

    pub fn services(&self) -> &Arc<RuntimeServices> {
        &self.services
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>, &RuntimeServices) -> R,
    {
        self.ctx.with(|ctx| f(ctx, self.services.as_ref()))
    }

    /// Runs a CommonJS entry point, either source or a `.jsc` cache.
    pub async fn run_file(&self, path: &Path) -> Result<()> {
        let path = absolute(path)?;
        let content = fs::read(&path).await?;
        trace!("Running {}", path.display());

        self.with(|ctx, _| {
            loader::run_main(&ctx, &path, &content)
                .map(|_| ())
                .or_script_error(&ctx)
        })
    }

    /// Evaluates an ES module file with `import.meta.url` pointing at it.
    pub async fn import_file(&self, path: &Path) -> Result<()> {
        let path = absolute(path)?;
        let source = fs::read(&path).await?;
        let name = path.to_string_lossy().into_owned();
        trace!("Importing {}", name);

        self.with(|ctx, _| {
            let result = (|| {
                let module = Module::declare(ctx.clone(), name.clone(), source)?;
                let meta: Object = module.meta()?;
                meta.prop("url", format!("file://{}", name))?;
                let (_, promise) = module.eval()?;
                promise.finish::<()>()
            })();
            result.or_script_error(&ctx)
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(env::current_dir()?.join(path)))
    }
}
