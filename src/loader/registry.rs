// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

use rquickjs::{Ctx, Object, Result};
use tracing::trace;

use crate::services::RuntimeServices;

/// Loads a file with a registered extension into a CommonJS module record.
///
/// Implementations set `module.exports` on the record.
pub trait ExtensionHandler: Send + Sync {
    fn load<'js>(
        &self,
        ctx: &Ctx<'js>,
        services: &RuntimeServices,
        module: &Object<'js>,
        path: &Path,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct ExtensionRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ExtensionHandler>>>,
}

impl ExtensionRegistry {
    /// Binds `extension` (with its leading dot) unless something is bound already.
    pub fn register(&self, extension: &str, handler: Arc<dyn ExtensionHandler>) -> bool {
        let mut handlers = match self.handlers.write() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handlers.contains_key(extension) {
            return false;
        }
        trace!("Registered loader for {}", extension);
        handlers.insert(extension.to_string(), handler);
        true
    }

    pub fn handler(&self, extension: &str) -> Option<Arc<dyn ExtensionHandler>> {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(extension).cloned()
    }

    pub fn extensions(&self) -> Vec<String> {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut extensions: Vec<String> = handlers.keys().cloned().collect();
        extensions.sort();
        extensions
    }
}
