// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{io, path::PathBuf, result::Result as StdResult};

use rquickjs::{CatchResultExt, Ctx, Exception};

use crate::engine::RejectReason;

pub type Result<T> = StdResult<T, Error>;

/// Failures produced while compiling, validating or loading bytecode caches.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument had the wrong shape (for example a number where source text was expected).
    #[error("{0}")]
    InputType(String),

    /// The buffer is not a code cache, even after a decompression attempt.
    #[error("Invalid or unsupported bytecode cache")]
    InvalidBytecode,

    /// The engine refused the cache after the compatibility fixup.
    #[error("Incompatible bytecode cache ({0}), the running engine is not supported")]
    IncompatibleCache(RejectReason),

    #[error("Runtime executable not found: {}", .0.display())]
    RuntimeNotFound(PathBuf),

    #[error("Child process failed: {0}")]
    ChildProcess(String),

    /// The source text does not compile.
    #[error("{0}")]
    Compile(String),

    /// An uncaught exception while executing a compiled unit.
    #[error("{0}")]
    Script(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Converts an engine error into a script error, taking the pending exception
    /// out of the context so its message survives.
    pub fn from_engine(ctx: &Ctx<'_>, err: rquickjs::Error) -> Self {
        match Err::<(), _>(err).catch(ctx) {
            Err(caught) => Self::Script(caught.to_string()),
            Ok(()) => Self::Script(String::from("Unknown engine error")),
        }
    }

    /// Raises this error as a JS exception, `TypeError` for argument shape errors.
    pub fn throw(self, ctx: &Ctx<'_>) -> rquickjs::Error {
        match self {
            Self::InputType(msg) => Exception::throw_type(ctx, &msg),
            other => Exception::throw_message(ctx, &other.to_string()),
        }
    }
}

impl From<rquickjs::Error> for Error {
    fn from(err: rquickjs::Error) -> Self {
        Self::Script(err.to_string())
    }
}

pub trait EngineResultExt<T> {
    fn or_script_error(self, ctx: &Ctx<'_>) -> Result<T>;
}

impl<T> EngineResultExt<T> for rquickjs::Result<T> {
    fn or_script_error(self, ctx: &Ctx<'_>) -> Result<T> {
        self.map_err(|err| Error::from_engine(ctx, err))
    }
}
