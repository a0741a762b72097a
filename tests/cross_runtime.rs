// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use bytecache::{
    compile_file, compile_source, decompress_if_needed, CompileOptions, CompileTarget,
    EngineBuild, RuntimeServices, StubKind, Vm,
};

fn runtime_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_bytecache"))
}

async fn given_file(content: &str) -> PathBuf {
    let path = env::temp_dir().join(format!("{}.js", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, content).await.unwrap();
    path
}

fn module_name(input: &Path) -> String {
    input.with_extension("").to_string_lossy().into_owned()
}

fn cross_runtime(compress: bool) -> CompileOptions {
    CompileOptions {
        compress,
        target: CompileTarget::Runtime {
            executable: Some(runtime_exe()),
        },
        ..CompileOptions::default()
    }
}

#[tokio::test]
async fn child_runtime_output_matches_in_process_compile() {
    let source =
        "module.exports = { greeting: 'hello', sum: [1, 2, 3].reduce((a, b) => a + b) };";
    let input = given_file(source).await;
    let build = EngineBuild::current();

    let artifact = compile_file(&build, &input, None, &cross_runtime(false))
        .await
        .unwrap();
    let local = compile_source(&build, &module_name(&input), source, &CompileOptions::default())
        .unwrap();

    assert_eq!(artifact.bytes, local);
}

#[tokio::test]
async fn compression_is_applied_by_the_parent() {
    let source = "module.exports = 'compressed';";
    let input = given_file(source).await;
    let build = EngineBuild::current();

    let artifact = compile_file(&build, &input, None, &cross_runtime(true))
        .await
        .unwrap();
    let local = compile_source(&build, &module_name(&input), source, &CompileOptions::default())
        .unwrap();

    assert_eq!(decompress_if_needed(&artifact.bytes).unwrap().as_ref(), local.as_slice());
}

#[tokio::test]
async fn child_syntax_error_fails_and_writes_nothing() {
    let input = given_file("module.exports = (").await;
    let output = env::temp_dir().join(format!("{}.jsc", uuid::Uuid::new_v4()));

    let result = compile_file(
        &EngineBuild::current(),
        &input,
        Some(&output),
        &cross_runtime(false),
    )
    .await;

    assert!(result.is_err());
    assert!(!output.exists());
}

#[tokio::test]
async fn cross_compiled_cache_runs_through_loader_stub() {
    let input = given_file("module.exports = 'from child';").await;
    let options = CompileOptions {
        loader: Some(StubKind::CommonJs),
        ..cross_runtime(true)
    };

    let artifact = compile_file(&EngineBuild::current(), &input, None, &options)
        .await
        .unwrap();
    let stub = artifact.stub.unwrap();

    let vm = Vm::new(Arc::new(RuntimeServices::current())).unwrap();
    vm.run_file(&stub).await.unwrap();
    vm.with(|ctx, _| {
        let script = format!("require({:?})", stub.to_string_lossy());
        let value: String = ctx.eval(script).unwrap();
        assert_eq!(value, "from child");
    });
}

#[test]
fn cli_runs_compiled_file() {
    let dir = env::temp_dir().join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("main.js");
    std::fs::write(&input, "if (module.loaded) { throw new Error('loaded twice') }").unwrap();

    let status = Command::new(runtime_exe())
        .args(["compile", "--compress"])
        .arg(&input)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(dir.join("main.jsc").is_file());

    let status = Command::new(runtime_exe())
        .arg("run")
        .arg(dir.join("main.jsc"))
        .status()
        .unwrap();
    assert!(status.success());
}

#[test]
fn cli_reports_missing_runtime() {
    let dir = env::temp_dir().join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("main.js");
    std::fs::write(&input, "module.exports = 1").unwrap();

    let output = Command::new(runtime_exe())
        .arg("compile")
        .arg(&input)
        .arg("--runtime")
        .arg(dir.join("no-such-runtime"))
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    assert!(!dir.join("main.jsc").exists());
}

#[test]
fn cli_prints_help_without_entry_point() {
    let dir = env::temp_dir().join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&dir).unwrap();

    let output = Command::new(runtime_exe())
        .current_dir(&dir)
        .env_remove("BYTECACHE_RUN_AS_HOST")
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage"));
}
