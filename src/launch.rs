//! Engine invocations shared by init containers and main containers.

use crate::{
    compiler::Plan,
    error::NameKind,
    exitcode,
    naming::OwnedContainer,
    podspec::{ContainerSpec, PullPolicy, VolumeSource},
    script::{quote, Cmd},
};

/// `pull` step for containers with [`PullPolicy::Always`].
pub(crate) fn pull(plan: &Plan, kind: NameKind, container: &ContainerSpec) -> Option<String> {
    if container.pull_policy != PullPolicy::Always {
        return None;
    }
    let cmd = plan.engine().arg("pull").arg(&container.image);
    Some(format!(
        "{} || {}",
        cmd.render(),
        abort(
            exitcode::LAUNCH_FAILED,
            &format!("failed to pull image {} for {} {}", container.image, kind, container.name),
        )
    ))
}

/// `create` step, leaves the container ready to start.
pub(crate) fn create(
    plan: &Plan,
    kind: NameKind,
    container: &ContainerSpec,
    owned: &OwnedContainer,
) -> String {
    format!(
        "{} >/dev/null || {}",
        create_command(plan, container, owned).render(),
        abort(
            exitcode::LAUNCH_FAILED,
            &format!("failed to create {} {}", kind, container.name),
        )
    )
}

fn create_command(plan: &Plan, container: &ContainerSpec, owned: &OwnedContainer) -> Cmd {
    let mut cmd = plan
        .engine()
        .arg("create")
        .opt("--name", &owned.resource)
        .opt("--label", plan.resources.label());

    cmd = match &plan.resources.sandbox {
        Some(sandbox) => cmd.opt("--network", format!("container:{}", sandbox)),
        None => cmd
            .opt("--network", &plan.resources.network)
            .opt("--network-alias", &container.name),
    };

    for mount in &container.volume_mounts {
        if let Some(source) = mount_source(plan, &mount.volume_name) {
            let mut bind = format!("{}:{}", source, mount.mount_path);
            if mount.read_only {
                bind.push_str(":ro");
            }
            cmd = cmd.opt("-v", bind);
        }
    }
    for var in &container.env {
        cmd = cmd.opt("-e", format!("{}={}", var.name, var.value));
    }
    if let Some(dir) = &container.working_dir {
        cmd = cmd.opt("-w", dir);
    }
    if container.pull_policy == PullPolicy::Never {
        cmd = cmd.opt("--pull", "never");
    }
    if let Some(entrypoint) = container.entrypoint() {
        cmd = cmd.opt("--entrypoint", entrypoint);
    }
    cmd.arg(&container.image).args(container.arguments())
}

/// Engine volume or host path backing a declared volume.
fn mount_source(plan: &Plan, volume_name: &str) -> Option<String> {
    match &plan.spec.volume(volume_name)?.source {
        VolumeSource::EmptyDir {} => plan.resources.volume(volume_name).map(str::to_string),
        VolumeSource::HostPath { path } => Some(path.to_string_lossy().into_owned()),
    }
}

/// `pod_abort <code> '<message>'`, see [`crate::teardown`].
pub fn abort(code: i32, message: &str) -> String {
    format!("pod_abort {} {}", code, quote(message))
}
