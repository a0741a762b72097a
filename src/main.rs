// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0
use std::{
    env,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
    time::Instant,
};

use bytecache::{
    compile_file, compile_source, cross_runtime,
    environment::ENV_BYTECACHE_RUN_AS_HOST,
    minimal_tracer::MinimalTracer,
    CompileOptions, CompileTarget, EngineBuild, Result, RuntimeServices, StubKind, Vm, VERSION,
};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tracing::trace;

/// Compile JavaScript into portable QuickJS code caches and run them.
#[derive(Parser, Debug)]
#[command(name = "bytecache", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script into a `.jsc` code cache.
    Compile(CompileArgs),
    /// Run a script, an ES module or a `.jsc` code cache.
    Run {
        /// File to run.
        file: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Source file, `-` reads standard input.
    input: PathBuf,

    /// Output path (default: the input with a `.jsc` extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compile the source as is instead of wrapping it as a CommonJS module.
    #[arg(long)]
    no_module: bool,

    /// Compress the cache with zstd.
    #[arg(long, overrides_with = "no_compress")]
    compress: bool,

    /// Write the cache uncompressed.
    #[arg(long, overrides_with = "compress")]
    no_compress: bool,

    /// Write the cache to standard output.
    #[arg(long)]
    stdout: bool,

    /// Module name recorded in the cache.
    #[arg(long)]
    name: Option<String>,

    /// Compile with another runtime executable (default: `BYTECACHE_RUNTIME`, then `PATH`).
    #[arg(long, num_args = 0..=1, value_name = "EXE")]
    runtime: Option<Option<PathBuf>>,

    /// Companion loader written beside the cache.
    #[arg(long, value_enum, default_value_t = LoaderKind::None)]
    loader: LoaderKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LoaderKind {
    None,
    Cjs,
    Esm,
}

impl From<LoaderKind> for Option<StubKind> {
    fn from(kind: LoaderKind) -> Self {
        match kind {
            LoaderKind::None => None,
            LoaderKind::Cjs => Some(StubKind::CommonJs),
            LoaderKind::Esm => Some(StubKind::EsModule),
        }
    }
}

fn is_host_mode() -> bool {
    env::var(ENV_BYTECACHE_RUN_AS_HOST).is_ok_and(|value| value == "1" || value == "true")
}

#[tokio::main]
async fn main() {
    if let Err(err) = MinimalTracer::register() {
        eprintln!("{err}");
    }
    trace!("Started bytecache {}", VERSION);

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Command::Compile(args)) => compile(args).await,
        Some(Command::Run { file }) => run(&file).await,
        None => start_default().await,
    };

    if let Err(err) = result {
        eprintln!("{err}");
        exit(1);
    }
}

async fn compile(args: CompileArgs) -> Result<()> {
    let now = Instant::now();
    let build = EngineBuild::current();
    let options = CompileOptions {
        wrap_as_module: !args.no_module,
        compress: args.compress,
        target: match args.runtime {
            Some(executable) => CompileTarget::Runtime { executable },
            None => CompileTarget::InProcess,
        },
        loader: args.loader.into(),
    };

    let from_stdin = args.input.as_os_str() == "-";
    let to_stdout = args.stdout || args.output.as_deref() == Some(Path::new("-"));

    if from_stdin || to_stdout {
        let source = if from_stdin {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source).await?;
            source
        } else {
            tokio::fs::read_to_string(&args.input).await?
        };
        let name = args.name.unwrap_or_else(|| {
            if from_stdin {
                String::from("<stdin>")
            } else {
                args.input.with_extension("").to_string_lossy().into_owned()
            }
        });

        let bytes = match &options.target {
            CompileTarget::InProcess => compile_source(&build, &name, &source, &options)?,
            CompileTarget::Runtime { executable } => {
                cross_runtime::compile(&source, &name, executable.as_deref(), &options).await?
            },
        };

        if to_stdout {
            let mut stdout = io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        } else {
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{}.jsc", name)));
            tokio::fs::write(output, &bytes).await?;
        }
    } else {
        let artifact = compile_file(&build, &args.input, args.output.as_deref(), &options).await?;
        trace!("Wrote {}", artifact.path.display());
    }

    trace!("Compiled in {}ms", now.elapsed().as_millis());
    Ok(())
}

async fn run(file: &Path) -> Result<()> {
    let now = Instant::now();
    let vm = Vm::new(Arc::new(RuntimeServices::current()))?;
    trace!("Initialized VM in {}ms", now.elapsed().as_millis());

    match file.extension().and_then(|ext| ext.to_str()) {
        Some("mjs") => vm.import_file(file).await,
        _ => vm.run_file(file).await,
    }
}

async fn start_default() -> Result<()> {
    if is_host_mode() {
        return Ok(());
    }

    for entry in ["index.jsc", "index.js"] {
        let path = Path::new(entry);
        if path.is_file() {
            return run(path).await;
        }
    }

    Cli::command().print_help()?;
    Ok(())
}
