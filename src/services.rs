// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::bucket::CompatBucket;
use crate::bytecode::BYTECODE_FILE_EXT;
use crate::engine::EngineBuild;
use crate::loader::{hook::BytecodeHook, registry::ExtensionRegistry};

/// Process wide state shared by every context: the engine build, its
/// compatibility bucket and the registered extension handlers.
pub struct RuntimeServices {
    build: EngineBuild,
    bucket: OnceCell<CompatBucket>,
    extensions: ExtensionRegistry,
}

impl RuntimeServices {
    pub fn new(build: EngineBuild) -> Self {
        Self {
            build,
            bucket: OnceCell::new(),
            extensions: ExtensionRegistry::default(),
        }
    }

    pub fn current() -> Self {
        Self::new(EngineBuild::current())
    }

    pub fn build(&self) -> &EngineBuild {
        &self.build
    }

    /// Resolved from the engine version the first time it is needed.
    pub fn bucket(&self) -> CompatBucket {
        *self.bucket.get_or_init(|| {
            let bucket = CompatBucket::from_version(self.build.version());
            debug!("Engine {} uses the {:?} cache layout", self.build.version(), bucket);
            bucket
        })
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Binds `.jsc` to the bytecode loader. Returns `false` if it was already bound.
    pub fn register_bytecode_hook(&self) -> bool {
        self.extensions
            .register(BYTECODE_FILE_EXT, Arc::new(BytecodeHook))
    }
}
