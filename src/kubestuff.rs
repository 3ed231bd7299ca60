//! Translation of the supported subset of a kubernetes `v1/Pod` into a [`PodSpec`].

use k8s_openapi::api::core::v1::{self as corev1, Container, Pod};
use tracing::warn;

use crate::{
    config::PodName,
    error::ManifestError,
    podspec::{ContainerSpec, EnvVar, PodSpec, PullPolicy, VolumeMount, VolumeSpec},
};

impl TryFrom<&Pod> for PodSpec {
    type Error = ManifestError;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .ok_or(ManifestError::Missing(".metadata.name"))?;
        let spec = pod.spec.as_ref().ok_or(ManifestError::Missing(".spec"))?;

        let name = if name.parse::<PodName>().is_ok() {
            name.to_string()
        } else {
            let sanitized = as_pod_name(name);
            warn!("pod name {:?} is not a valid pod name, using {:?}", name, sanitized);
            sanitized
        };

        let init_containers = spec
            .init_containers
            .iter()
            .flatten()
            .map(as_container_spec)
            .collect::<Result<_, _>>()?;
        let containers = spec
            .containers
            .iter()
            .map(as_container_spec)
            .collect::<Result<_, _>>()?;
        let volumes = spec
            .volumes
            .iter()
            .flatten()
            .map(as_volume_spec)
            .collect::<Result<_, _>>()?;

        Ok(PodSpec {
            name,
            init_containers,
            containers,
            volumes,
        })
    }
}

fn as_container_spec(container: &Container) -> Result<ContainerSpec, ManifestError> {
    let unsupported = |field| ManifestError::UnsupportedContainerField {
        container: container.name.clone(),
        field,
    };

    if container.env_from.as_ref().map_or(false, |e| !e.is_empty()) {
        return Err(unsupported("envFrom"));
    }
    let env = container
        .env
        .iter()
        .flatten()
        .map(|var| match var.value_from {
            Some(_) => Err(unsupported("env[].valueFrom")),
            None => Ok(EnvVar {
                name: var.name.clone(),
                value: var.value.clone().unwrap_or_default(),
            }),
        })
        .collect::<Result<_, _>>()?;

    let volume_mounts = container
        .volume_mounts
        .iter()
        .flatten()
        .map(|mount| {
            if mount.sub_path.is_some() || mount.sub_path_expr.is_some() {
                return Err(unsupported("volumeMounts[].subPath"));
            }
            Ok(VolumeMount {
                volume_name: mount.name.clone(),
                mount_path: mount.mount_path.clone(),
                read_only: mount.read_only.unwrap_or(false),
            })
        })
        .collect::<Result<_, _>>()?;

    let pull_policy = match container.image_pull_policy.as_deref() {
        None | Some("IfNotPresent") => PullPolicy::Default,
        Some("Always") => PullPolicy::Always,
        Some("Never") => PullPolicy::Never,
        Some(other) => {
            return Err(ManifestError::UnknownPullPolicy {
                container: container.name.clone(),
                policy: other.to_string(),
            })
        }
    };

    // Probes, ports and resource limits have no local counterpart; they are dropped.
    for (present, field) in [
        (container.ports.is_some(), "ports"),
        (container.liveness_probe.is_some(), "livenessProbe"),
        (container.readiness_probe.is_some(), "readinessProbe"),
        (container.startup_probe.is_some(), "startupProbe"),
        (container.resources.is_some(), "resources"),
    ] {
        if present {
            warn!("ignoring {} of container {:?}", field, container.name);
        }
    }

    Ok(ContainerSpec {
        name: container.name.clone(),
        image: container.image.clone().unwrap_or_default(),
        command: container.command.clone(),
        args: container.args.clone().unwrap_or_default(),
        env,
        working_dir: container.working_dir.clone(),
        volume_mounts,
        pull_policy,
    })
}

fn as_volume_spec(volume: &corev1::Volume) -> Result<VolumeSpec, ManifestError> {
    match (&volume.empty_dir, &volume.host_path) {
        (Some(_), None) => Ok(VolumeSpec::empty_dir(&volume.name)),
        (None, Some(host_path)) => Ok(VolumeSpec::host_path(&volume.name, &host_path.path)),
        _ => Err(ManifestError::UnsupportedVolume(volume.name.clone())),
    }
}

/// pod name must be a valid [`PodName`]
// Kubernetes accepts dots and up to 253 characters in pod names, engines are pickier.
fn as_pod_name(name_for_humans: &str) -> String {
    let mut s: String = name_for_humans
        .to_lowercase()
        .chars()
        .map(|c| if c == '.' || c == '_' { '-' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .take(61)
        .collect();
    if !s.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        s = format!("a{}", s);
    };
    if !s.ends_with(|c: char| c.is_ascii_alphanumeric()) {
        s = format!("{}a", s);
    };
    s
}
