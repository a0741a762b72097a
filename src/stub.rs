// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::trace;

use crate::error::{Error, Result};
use crate::loader::BYTECACHE_MODULE;

/// Module system of the companion loader written next to a compiled artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    CommonJs,
    EsModule,
}

impl StubKind {
    fn extension(self) -> &'static str {
        match self {
            Self::CommonJs => "loader.js",
            Self::EsModule => "loader.mjs",
        }
    }
}

/// Source of a loader that installs the bytecode hook and re-exports `artifact`.
pub fn generate_stub(artifact: &Path, kind: StubKind) -> Result<String> {
    let file = artifact
        .file_name()
        .map(|name| name.to_string_lossy())
        .ok_or_else(|| {
            Error::InputType(format!("Not a file path: {}", artifact.display()))
        })?;
    let specifier = format!("{:?}", format!("./{}", file));
    let module = format!("{:?}", BYTECACHE_MODULE);

    Ok(match kind {
        StubKind::CommonJs => {
            format!("require({module});\nmodule.exports = require({specifier});\n")
        },
        StubKind::EsModule => format!(
            "import {{ createRequire }} from \"module\";\n\
             const require = createRequire(import.meta.url);\n\
             require({module});\n\
             export default require({specifier});\n"
        ),
    })
}

pub fn stub_path(artifact: &Path, kind: StubKind) -> PathBuf {
    artifact.with_extension(kind.extension())
}

pub async fn write_stub(artifact: &Path, kind: StubKind) -> Result<PathBuf> {
    let path = stub_path(artifact, kind);
    fs::write(&path, generate_stub(artifact, kind)?).await?;
    trace!("Wrote {:?} loader {}", kind, path.display());
    Ok(path)
}
