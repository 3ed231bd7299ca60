use tracing::debug;

use crate::{compiler::Plan, error::NameKind, launch, script::Script};

/// Run init containers one at a time, in declared order. The first non-zero exit ends the pod
/// with that exit code before anything else is started. Each attached run is waited on in the
/// background so INT and TERM reach the teardown trap while an init container is running.
pub(crate) fn emit(plan: &Plan) -> Script {
    let mut script = Script::new();
    if plan.spec.init_containers.is_empty() {
        return script;
    }

    script.comment("init containers");
    for (container, owned) in plan
        .spec
        .init_containers
        .iter()
        .zip(&plan.resources.init_containers)
    {
        if let Some(pull) = launch::pull(plan, NameKind::InitContainer, container) {
            script.line(pull);
        }
        script.line(launch::create(plan, NameKind::InitContainer, container, owned));
        script.line(format!(
            "{} start -a {} &",
            plan.engine().render(),
            owned.resource
        ));
        script.line("wait $!");
        script.line("pod_status=$?");
        script.block(r#"if [ "$pod_status" -ne 0 ]; then"#, "fi", |s| {
            s.line(format!(
                r#"pod_abort "$pod_status" "init container {} exited with code $pod_status""#,
                owned.declared
            ));
        });
    }

    debug!(
        pod = %plan.resources.pod,
        init_containers = plan.spec.init_containers.len(),
        "emitted init sequence"
    );
    script
}
