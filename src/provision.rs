use tracing::debug;

use crate::{
    compiler::Plan,
    exitcode,
    launch::abort,
    script::{quote, Script},
};

/// Create the pod network, one engine volume per `emptyDir` and, when containers share a
/// network namespace, the sandbox holding it. Host paths need no step.
pub(crate) fn emit(plan: &Plan) -> Script {
    let resources = plan.resources;
    let label = resources.label();
    let failed = |what: &str| abort(exitcode::PROVISION_FAILED, what);
    let mut script = Script::new();

    script.comment("provision");
    script.line(format!(
        "{} version >/dev/null 2>&1 || {}",
        plan.engine().render(),
        failed(&format!(
            "container engine {} is unreachable",
            plan.options.engine
        ))
    ));

    let network = plan
        .engine()
        .args(["network", "create"])
        .opt("--label", &label)
        .arg(&resources.network);
    script.line(format!(
        "{} >/dev/null || {}",
        network.render(),
        failed(&format!("failed to create network {}", resources.network))
    ));

    for volume in &resources.volumes {
        let create = plan
            .engine()
            .args(["volume", "create"])
            .opt("--label", &label)
            .arg(&volume.resource);
        script.line(format!(
            "{} >/dev/null || {}",
            create.render(),
            failed(&format!(
                "failed to create volume {} for {}",
                volume.resource, volume.declared
            ))
        ));
    }

    if let Some(sandbox) = &resources.sandbox {
        let create = plan
            .engine()
            .arg("create")
            .opt("--name", sandbox)
            .opt("--label", &label)
            .opt("--network", &resources.network)
            .arg(&plan.options.sandbox_image);
        script.line(format!(
            "{} >/dev/null || {}",
            create.render(),
            failed(&format!("failed to create sandbox {}", sandbox))
        ));
        script.line(format!(
            "{} start {} >/dev/null || {}",
            plan.engine().render(),
            quote(sandbox),
            failed(&format!("failed to start sandbox {}", sandbox))
        ));
    }

    debug!(
        pod = %resources.pod,
        network = %resources.network,
        volumes = resources.volumes.len(),
        sandbox = resources.sandbox.is_some(),
        "emitted provisioning"
    );
    script
}
