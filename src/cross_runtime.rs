// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//! Compiles source with another runtime executable so the cache matches that
//! runtime's engine build rather than ours.
use std::{
    env,
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::debug;

use crate::bytecode::{compress, is_valid_cache};
use crate::compiler::{wrap_module, CompileOptions};
use crate::environment::{ENV_BYTECACHE_RUNTIME, ENV_BYTECACHE_RUN_AS_HOST};
use crate::error::{Error, Result};

pub const DEFAULT_RUNTIME: &str = "bytecache";

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Explicit path, then `BYTECACHE_RUNTIME`, then `bytecache` on `PATH`.
pub fn locate_runtime(explicit: Option<&Path>) -> Result<PathBuf> {
    let candidate = match explicit {
        Some(path) => path.to_path_buf(),
        None => match env::var_os(ENV_BYTECACHE_RUNTIME) {
            Some(path) => PathBuf::from(path),
            None => find_on_path(DEFAULT_RUNTIME).unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME)),
        },
    };

    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(Error::RuntimeNotFound(candidate))
    }
}

pub async fn compile(
    source: &str,
    name: &str,
    executable: Option<&Path>,
    options: &CompileOptions,
) -> Result<Vec<u8>> {
    let runtime = locate_runtime(executable)?;
    let input = if options.wrap_as_module {
        wrap_module(source)
    } else {
        source.to_string()
    };

    debug!("Compiling {} with {}", name, runtime.display());
    let failed =
        |err: io::Error| Error::ChildProcess(format!("Compiling {} failed: {}", name, err));
    let mut child = Command::new(&runtime)
        .args(["compile", "-", "--stdout", "--no-module", "--name", name])
        .env(ENV_BYTECACHE_RUN_AS_HOST, "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(failed)?;

    let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        return Err(Error::ChildProcess(String::from(
            "Child process pipes are unavailable",
        )));
    };

    let write = async move {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await?;
        Ok::<_, io::Error>(())
    };
    let read = async move {
        let mut output = Vec::new();
        stdout.read_to_end(&mut output).await?;
        Ok::<_, io::Error>(output)
    };
    let drain = async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => debug!(
                    "{}: {}",
                    runtime.display(),
                    String::from_utf8_lossy(&line).trim_end()
                ),
                Err(err) => {
                    debug!("Stopped reading stderr of {}: {}", runtime.display(), err);
                    break;
                },
            }
        }
    };

    let (written, output, (), status) = tokio::join!(write, read, drain, child.wait());
    let status = status.map_err(failed)?;
    if !status.success() {
        return Err(Error::ChildProcess(format!(
            "Compiling {} exited with {}",
            name, status
        )));
    }
    written.map_err(failed)?;

    let output = output.map_err(failed)?;
    if !is_valid_cache(&output) {
        return Err(Error::ChildProcess(format!(
            "Compiling {} produced no code cache",
            name
        )));
    }

    if options.compress {
        compress(&output)
    } else {
        Ok(output)
    }
}
