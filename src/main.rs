use std::{
    os::unix::{fs::PermissionsExt, process::ExitStatusExt},
    path::{Path, PathBuf},
    process::ExitStatus,
};

use anyhow::Context;
use clap::Parser;
use podscript::{
    config::DEFAULT_SANDBOX_IMAGE, exitcode::Outcome, CompileOptions, CompiledUnit, Compiler,
    NetworkMode, PodName, PodSpec,
};
use tracing::{info, warn, Level};
use uuid::Uuid;

/// Compile a pod into a bash script that runs it on a docker compatible engine.
#[derive(Parser, Debug)]
#[clap(version)]
struct Opts {
    /// Path to the pod definition (toml, json or yaml, native or a kubernetes v1 Pod)
    pod: PathBuf,

    /// Container engine command line client
    #[clap(long, env = "PODSCRIPT_ENGINE", default_value = "docker")]
    engine: String,

    /// Replace the pod name from the pod file
    #[clap(long)]
    name: Option<PodName>,

    /// Append a random suffix to the pod name so several copies can run side by side
    #[clap(long)]
    random_suffix: bool,

    /// Give every container its own network namespace on the pod network instead of sharing
    /// the namespace of a sandbox container. Pod-mates then reach each other by name, not on
    /// localhost.
    #[clap(long)]
    bridge: bool,

    /// Image for the sandbox container holding the shared network namespace
    #[clap(long, env = "PODSCRIPT_SANDBOX_IMAGE", default_value = DEFAULT_SANDBOX_IMAGE)]
    sandbox_image: String,

    /// Don't pass container logs through to stderr on teardown
    #[clap(long)]
    no_logs: bool,

    /// Write the script to this file instead of stdout
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Run the script right away and exit with its exit code
    #[clap(long)]
    exec: bool,

    /// Debug logging
    #[clap(short, long)]
    verbose: bool,
}

impl Opts {
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            engine: self.engine.clone(),
            network_mode: if self.bridge {
                NetworkMode::Bridge
            } else {
                NetworkMode::SharedNamespace
            },
            sandbox_image: self.sandbox_image.clone(),
            dump_logs: !self.no_logs,
        }
    }
}

async fn inner_main() -> anyhow::Result<i32> {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if opts.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let mut spec = PodSpec::from_file(&opts.pod)?;
    if let Some(name) = &opts.name {
        spec.name = name.to_string();
    }
    if opts.random_suffix {
        let base: PodName = spec.name.parse().with_context(|| {
            format!("invalid pod name in {}", opts.pod.to_string_lossy())
        })?;
        let suffix = Uuid::new_v4().simple().to_string();
        spec.name = base.with_suffix(&suffix[..8])?.to_string();
    }

    let unit = Compiler::new(opts.compile_options())
        .compile(&spec)
        .with_context(|| format!("invalid pod in {}", opts.pod.to_string_lossy()))?;

    match &opts.output {
        Some(path) => write_script(path, &unit)?,
        None if !opts.exec => print!("{}", unit),
        None => {}
    }

    if !opts.exec {
        return Ok(0);
    }
    let status = run(&unit).await?;
    let code = status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1);
    let outcome = Outcome::from_exit_code(code);
    if outcome.is_success() {
        info!(pod = %unit.pod(), "{}", outcome);
    } else {
        warn!(pod = %unit.pod(), code, "{}", outcome);
    }
    Ok(code)
}

fn write_script(path: &Path, unit: &CompiledUnit) -> anyhow::Result<()> {
    std::fs::write(path, unit.script())
        .with_context(|| format!("failed to write script to {}", path.to_string_lossy()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    info!(pod = %unit.pod(), path = %path.to_string_lossy(), "wrote script");
    Ok(())
}

/// Run the unit under bash. Ctrl-C reaches bash too, which tears the pod down and exits, so
/// keep waiting for it instead of dying first.
async fn run(unit: &CompiledUnit) -> anyhow::Result<ExitStatus> {
    info!(pod = %unit.pod(), "running pod");
    let mut child = tokio::process::Command::new("bash")
        .arg("-c")
        .arg(unit.script())
        .spawn()
        .context("failed to start bash")?;
    loop {
        tokio::select! {
            status = child.wait() => return Ok(status?),
            interrupted = tokio::signal::ctrl_c() => {
                interrupted?;
                warn!(pod = %unit.pod(), "interrupted, waiting for teardown");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    match inner_main().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{:?}", e);
            std::process::exit(1);
        }
    }
}
