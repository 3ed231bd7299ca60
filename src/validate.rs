use std::collections::HashSet;

use crate::{
    config::PodName,
    error::{NameKind, ValidationError},
    podspec::{ContainerSpec, PodSpec, VolumeSource},
};

/// Check a pod spec for internal consistency. Returns the validated pod name.
///
/// Names only have to be unique within their own list: an init container may share a name with
/// a main container because their resource names differ by role.
pub fn validate(spec: &PodSpec) -> Result<PodName, ValidationError> {
    let pod: PodName = spec.name.parse().map_err(|e: anyhow::Error| ValidationError::PodName {
        name: spec.name.clone(),
        reason: e.to_string(),
    })?;

    if spec.containers.is_empty() {
        return Err(ValidationError::NoContainers(spec.name.clone()));
    }

    let mut volumes = HashSet::new();
    for volume in &spec.volumes {
        check_dns_label(NameKind::Volume, &volume.name)?;
        if !volumes.insert(volume.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind: NameKind::Volume,
                name: volume.name.clone(),
            });
        }
        if let VolumeSource::HostPath { path } = &volume.source {
            let invalid = |reason| ValidationError::InvalidHostPath {
                volume: volume.name.clone(),
                path: path.to_string_lossy().into_owned(),
                reason,
            };
            let text = path.to_str().ok_or_else(|| invalid("must be valid UTF-8"))?;
            if !path.is_absolute() {
                return Err(invalid("must be absolute"));
            }
            if text.contains(':') {
                return Err(invalid("must not contain ':'"));
            }
        }
    }

    check_containers(NameKind::InitContainer, &spec.init_containers, &volumes)?;
    check_containers(NameKind::Container, &spec.containers, &volumes)?;

    Ok(pod)
}

fn check_containers(
    kind: NameKind,
    containers: &[ContainerSpec],
    volumes: &HashSet<&str>,
) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for container in containers {
        check_dns_label(kind, &container.name)?;
        if !names.insert(container.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                kind,
                name: container.name.clone(),
            });
        }

        if container.image.is_empty() || container.image.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidImage {
                kind,
                container: container.name.clone(),
                image: container.image.clone(),
            });
        }

        let mut paths = HashSet::new();
        for mount in &container.volume_mounts {
            if !volumes.contains(mount.volume_name.as_str()) {
                return Err(ValidationError::UndeclaredVolume {
                    kind,
                    container: container.name.clone(),
                    volume: mount.volume_name.clone(),
                });
            }
            let invalid = |reason| ValidationError::InvalidMountPath {
                kind,
                container: container.name.clone(),
                path: mount.mount_path.clone(),
                reason,
            };
            if !mount.mount_path.starts_with('/') {
                return Err(invalid("must be absolute"));
            }
            if mount.mount_path.contains(':') {
                return Err(invalid("must not contain ':'"));
            }
            let normalized = mount.mount_path.trim_end_matches('/');
            if !paths.insert(normalized) {
                return Err(ValidationError::DuplicateMountPath {
                    kind,
                    container: container.name.clone(),
                    path: mount.mount_path.clone(),
                });
            }
        }

        for var in &container.env {
            if var.name.is_empty() || var.name.contains('=') {
                return Err(ValidationError::InvalidEnvVar {
                    kind,
                    container: container.name.clone(),
                    var: var.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Declared names double as network aliases, so they follow the DNS-1123 label rules.
fn check_dns_label(kind: NameKind, name: &str) -> Result<(), ValidationError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > 63 {
        "must be <= 63 characters"
    } else if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        "must contain only lowercase alphanumeric characters or '-'"
    } else if name.starts_with('-') || name.ends_with('-') {
        "must start and end with an alphanumeric character"
    } else {
        return Ok(());
    };
    Err(ValidationError::InvalidName {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
