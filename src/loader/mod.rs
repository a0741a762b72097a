// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
//! CommonJS module host.
//!
//! Every context gets a `require` rooted at the working directory. Each
//! loaded module receives its own `require` bound to its directory, and the
//! resolved module records are cached per context so repeated and circular
//! requires observe the same `exports`.
use std::{
    cell::RefCell,
    collections::HashMap,
    env,
    ffi::OsString,
    fs,
    path::{Component, Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use rquickjs::{
    function::Args, Ctx, Exception, Function, JsLifetime, Module, Object, Result, Value,
};
use tracing::trace;

use crate::bytecode::BYTECODE_FILE_EXT;
use crate::compiler::wrap_module;
use crate::services::RuntimeServices;
use crate::utils::result::ResultExt;

pub mod builtin;
pub mod hook;
pub mod registry;

pub const BYTECACHE_MODULE: &str = "bytecache";
pub const REGISTER_MODULE: &str = "bytecache/register";

const SOURCE_EXTENSIONS: [&str; 3] = [".js", ".cjs", ".json"];

#[derive(Default)]
pub struct RequireState<'js> {
    cache: HashMap<Rc<str>, Object<'js>>,
}

unsafe impl<'js> JsLifetime<'js> for RequireState<'js> {
    type Changed<'to> = RequireState<'to>;
}

pub struct ServicesHandle(Arc<RuntimeServices>);

unsafe impl<'js> JsLifetime<'js> for ServicesHandle {
    type Changed<'to> = ServicesHandle;
}

pub fn get_platform() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        platform => platform,
    }
}

pub fn get_arch() -> &'static str {
    match env::consts::ARCH {
        "x86_64" | "x86" => "x64",
        "aarch64" => "arm64",
        arch => arch,
    }
}

pub fn init(ctx: &Ctx<'_>, services: Arc<RuntimeServices>) -> Result<()> {
    ctx.store_userdata(ServicesHandle(services))
        .map_err(|_| Exception::throw_message(ctx, "Runtime services already installed"))?;
    ctx.store_userdata(RefCell::new(RequireState::default()))
        .map_err(|_| Exception::throw_message(ctx, "Require state already installed"))?;

    let globals = ctx.globals();
    globals.set("global", ctx.globals())?;

    let process = Object::new(ctx.clone())?;
    let env_map: HashMap<String, String> = env::vars().collect();
    let args: Vec<String> = env::args().collect();
    process.set("env", env_map)?;
    process.set("argv", args)?;
    process.set("platform", get_platform())?;
    process.set("arch", get_arch())?;
    globals.set("process", process)?;

    let cwd = env::current_dir().or_throw(ctx)?;
    globals.set("require", create_require(ctx, cwd)?)?;

    Ok(())
}

pub fn services(ctx: &Ctx<'_>) -> Result<Arc<RuntimeServices>> {
    ctx.userdata::<ServicesHandle>()
        .map(|handle| handle.0.clone())
        .or_throw_type(ctx, "Runtime services are not installed in this context")
}

/// A `require` function resolving relative specifiers against `dir`.
pub fn create_require<'js>(ctx: &Ctx<'js>, dir: PathBuf) -> Result<Function<'js>> {
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, specifier: Value<'js>| {
        require(&ctx, &dir, specifier)
    })
}

fn require<'js>(ctx: &Ctx<'js>, dir: &Path, specifier: Value<'js>) -> Result<Value<'js>> {
    let specifier = match specifier.as_string() {
        Some(specifier) => specifier.to_string()?,
        None => {
            return Err(Exception::throw_type(
                ctx,
                "The \"id\" argument must be of type string",
            ))
        },
    };
    if specifier.is_empty() {
        return Err(Exception::throw_type(
            ctx,
            "The \"id\" argument must be a non-empty string",
        ));
    }

    match specifier.as_str() {
        BYTECACHE_MODULE => {
            services(ctx)?.register_bytecode_hook();
            return builtin::bytecache_api(ctx).map(Object::into_value);
        },
        REGISTER_MODULE => {
            services(ctx)?.register_bytecode_hook();
            return Ok(Value::new_undefined(ctx.clone()));
        },
        _ => {},
    }

    let services = services(ctx)?;
    let path = resolve(dir, &specifier, &services).ok_or_else(|| {
        Exception::throw_message(ctx, &format!("Cannot find module '{}'", specifier))
    })?;
    trace!("Require: {} -> {}", specifier, path.display());

    let key: Rc<str> = path.to_string_lossy().into();
    if let Some(record) = cached(ctx, &key)? {
        return record.get("exports");
    }

    let record = new_record(ctx, &path)?;
    insert(ctx, key.clone(), record.clone())?;

    match load_into(ctx, &services, &record, &path) {
        Ok(()) => {
            record.set("loaded", true)?;
            record.get("exports")
        },
        Err(err) => {
            remove(ctx, &key)?;
            Err(err)
        },
    }
}

/// Runs the entry file of a program from already read contents.
pub fn run_main<'js>(ctx: &Ctx<'js>, path: &Path, content: &[u8]) -> Result<Value<'js>> {
    let services = services(ctx)?;
    let record = new_record(ctx, path)?;
    insert(ctx, path.to_string_lossy().into(), record.clone())?;

    if has_extension(path, BYTECODE_FILE_EXT) {
        hook::evaluate_bytecode(ctx, &services, &record, path, content)?;
    } else {
        let source = String::from_utf8_lossy(content);
        evaluate_source(ctx, &record, path, &source)?;
    }

    record.set("loaded", true)?;
    record.get("exports")
}

fn load_into<'js>(
    ctx: &Ctx<'js>,
    services: &RuntimeServices,
    record: &Object<'js>,
    path: &Path,
) -> Result<()> {
    if let Some(handler) = extension_of(path).and_then(|ext| services.extensions().handler(&ext))
    {
        return handler.load(ctx, services, record, path);
    }

    let source = fs::read_to_string(path).or_throw(ctx)?;
    if has_extension(path, ".json") {
        let exports = ctx.json_parse(source)?;
        return record.set("exports", exports);
    }
    evaluate_source(ctx, record, path, &source)
}

/// Compiles CommonJS source through the module wrapper and runs it.
pub fn evaluate_source<'js>(
    ctx: &Ctx<'js>,
    record: &Object<'js>,
    path: &Path,
    source: &str,
) -> Result<()> {
    let source = strip_shebang(source);
    let module = Module::declare(
        ctx.clone(),
        path.to_string_lossy().into_owned(),
        wrap_module(source),
    )?;
    evaluate_unit(ctx, module, record)
}

/// Evaluates a compiled unit and, if its default export is the module
/// factory, calls it with the record's wrapper arguments. Units without a
/// factory expose their namespace as `exports`.
pub fn evaluate_unit<'js>(ctx: &Ctx<'js>, module: Module<'js>, record: &Object<'js>) -> Result<()> {
    let (module, promise) = module.eval()?;
    promise.finish::<()>()?;
    let namespace = module.namespace()?;

    let default: Value = namespace.get("default")?;
    let Some(factory) = default.as_function() else {
        return record.set("exports", namespace);
    };

    let exports: Value = record.get("exports")?;
    let require: Value = record.get("require")?;
    let filename: String = record.get("filename")?;
    let dirname: String = record.get("path")?;
    let globals = ctx.globals();
    let process: Value = globals.get("process")?;

    let mut args = Args::new(ctx.clone(), 7);
    args.this(exports.clone())?;
    args.push_arg(exports)?;
    args.push_arg(require)?;
    args.push_arg(record.clone())?;
    args.push_arg(filename)?;
    args.push_arg(dirname)?;
    args.push_arg(process)?;
    args.push_arg(globals)?;
    factory.call_arg::<()>(args)
}

fn new_record<'js>(ctx: &Ctx<'js>, path: &Path) -> Result<Object<'js>> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let filename = path.to_string_lossy().into_owned();

    let record = Object::new(ctx.clone())?;
    record.set("id", filename.as_str())?;
    record.set("filename", filename)?;
    record.set("path", dir.to_string_lossy().into_owned())?;
    record.set("exports", Object::new(ctx.clone())?)?;
    record.set("loaded", false)?;
    record.set("require", create_require(ctx, dir)?)?;
    Ok(record)
}

fn with_state<'js, R>(ctx: &Ctx<'js>, f: impl FnOnce(&mut RequireState<'js>) -> R) -> Result<R> {
    let binding = ctx
        .userdata::<RefCell<RequireState>>()
        .or_throw_type(ctx, "Require state is not installed in this context")?;
    let mut state = binding.borrow_mut();
    Ok(f(&mut state))
}

fn cached<'js>(ctx: &Ctx<'js>, key: &str) -> Result<Option<Object<'js>>> {
    with_state(ctx, |state| state.cache.get(key).cloned())
}

fn insert<'js>(ctx: &Ctx<'js>, key: Rc<str>, record: Object<'js>) -> Result<()> {
    with_state(ctx, |state| {
        state.cache.insert(key, record);
    })
}

fn remove(ctx: &Ctx<'_>, key: &str) -> Result<()> {
    with_state(ctx, |state| {
        state.cache.remove(key);
    })
}

fn resolve(dir: &Path, specifier: &str, services: &RuntimeServices) -> Option<PathBuf> {
    let specifier = specifier.strip_prefix("file://").unwrap_or(specifier);
    let relative = specifier.starts_with("./") || specifier.starts_with("../");
    let candidate = if relative || Path::new(specifier).is_absolute() {
        normalize(dir.join(specifier))
    } else {
        return None;
    };

    if candidate.is_file() {
        return Some(candidate);
    }

    let registered = services.extensions().extensions();
    SOURCE_EXTENSIONS
        .iter()
        .copied()
        .chain(registered.iter().map(String::as_str))
        .map(|ext| {
            let mut path: OsString = candidate.clone().into_os_string();
            path.push(ext);
            PathBuf::from(path)
        })
        .find(|path| path.is_file())
}

pub fn normalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.as_ref().components() {
        match &component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            },
            _ => {
                normalized.push(component);
            },
        }
    }
    normalized
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    extension_of(path).is_some_and(|found| found == ext)
}

fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        // keep the newline so line numbers stay stable
        match source.find('\n') {
            Some(end) => &source[end..],
            None => "",
        }
    } else {
        source
    }
}
