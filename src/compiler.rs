//! Turns a [`PodSpec`] into a self-contained bash script.
//!
//! The script layout is always the same: teardown helpers and traps, resource provisioning,
//! the init sequence, then launch and monitoring of the main containers. Compiling touches no
//! engine and keeps no state, so the same spec and options always produce the same script.

use std::{
    borrow::Cow,
    fmt::{Display, Formatter},
};

use tracing::info;

use crate::{
    config::{CompileOptions, PodName},
    error::ValidationError,
    exitcode, init, monitor,
    naming::PodResources,
    podspec::PodSpec,
    provision,
    script::{quote, Cmd, Script},
    teardown, validate,
};

/// A compiled pod: the script plus the names of everything it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    resources: PodResources,
    script: String,
}

impl CompiledUnit {
    pub fn pod(&self) -> &PodName {
        &self.resources.pod
    }

    pub fn resources(&self) -> &PodResources {
        &self.resources
    }

    /// The bash script. Run it with `bash -c` or save it and execute it directly.
    pub fn script(&self) -> &str {
        &self.script
    }
}

impl Display for CompiledUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.script)
    }
}

/// Everything an emitter needs, borrowed for the duration of one compile.
pub(crate) struct Plan<'a> {
    pub spec: &'a PodSpec,
    pub resources: &'a PodResources,
    pub options: &'a CompileOptions,
}

impl Plan<'_> {
    pub fn engine(&self) -> Cmd {
        Cmd::new(&self.options.engine)
    }

    /// The engine program as a quoted shell word.
    pub fn engine_word(&self) -> Cow<'_, str> {
        quote(&self.options.engine)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Validate `spec` and emit its script. Only validation can fail, everything else that can go
    /// wrong happens when the script runs and shows up in its exit code.
    pub fn compile(&self, spec: &PodSpec) -> Result<CompiledUnit, ValidationError> {
        let pod = validate::validate(spec)?;
        let resources = PodResources::plan(&pod, spec, self.options.network_mode);
        let plan = Plan {
            spec,
            resources: &resources,
            options: &self.options,
        };

        let mut script = header(&plan);
        for part in [
            teardown::emit(&plan),
            provision::emit(&plan),
            init::emit(&plan),
            monitor::emit(&plan),
        ] {
            if part.is_empty() {
                continue;
            }
            script.blank();
            script.append(&part);
        }

        info!(
            pod = %pod,
            init_containers = resources.init_containers.len(),
            containers = resources.containers.len(),
            volumes = resources.volumes.len(),
            "compiled pod"
        );
        Ok(CompiledUnit {
            script: script.render(),
            resources,
        })
    }
}

/// Compile with [`CompileOptions::default`].
pub fn compile(spec: &PodSpec) -> Result<CompiledUnit, ValidationError> {
    Compiler::default().compile(spec)
}

fn header(plan: &Plan) -> Script {
    let mut script = Script::new();
    script.line("#!/usr/bin/env bash");
    script.comment(&format!(
        "pod {}, compiled by podscript {}",
        plan.resources.pod,
        env!("CARGO_PKG_VERSION")
    ));
    script.comment(&format!(
        "exit codes: 0 when every container exits 0, the code of the first failed container, \
         {} when provisioning fails, {} when a container can not be launched, \
         {} when monitoring breaks down",
        exitcode::PROVISION_FAILED,
        exitcode::LAUNCH_FAILED,
        exitcode::MONITOR_ABORTED
    ));
    script
}
