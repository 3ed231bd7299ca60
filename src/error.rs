use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Which list a duplicated name was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    InitContainer,
    Container,
    Volume,
}

impl Display for NameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NameKind::InitContainer => "init container",
            NameKind::Container => "container",
            NameKind::Volume => "volume",
        };
        f.write_str(s)
    }
}

/// Reasons a pod spec is rejected before anything is emitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("invalid pod name {name:?}: {reason}")]
    PodName { name: String, reason: String },

    #[error("pod {0:?} declares no containers")]
    NoContainers(String),

    #[error("invalid {kind} name {name:?}: {reason}")]
    InvalidName {
        kind: NameKind,
        name: String,
        reason: String,
    },

    #[error("duplicate {kind} name {name:?}")]
    DuplicateName { kind: NameKind, name: String },

    #[error("{kind} {container:?} has an invalid image reference {image:?}")]
    InvalidImage {
        kind: NameKind,
        container: String,
        image: String,
    },

    #[error("{kind} {container:?} mounts undeclared volume {volume:?}")]
    UndeclaredVolume {
        kind: NameKind,
        container: String,
        volume: String,
    },

    #[error("{kind} {container:?} has an invalid mount path {path:?}: {reason}")]
    InvalidMountPath {
        kind: NameKind,
        container: String,
        path: String,
        reason: &'static str,
    },

    #[error("{kind} {container:?} mounts {path:?} more than once")]
    DuplicateMountPath {
        kind: NameKind,
        container: String,
        path: String,
    },

    #[error("volume {volume:?} has an invalid host path {path:?}: {reason}")]
    InvalidHostPath {
        volume: String,
        path: String,
        reason: &'static str,
    },

    #[error("{kind} {container:?} has an invalid environment variable name {var:?}")]
    InvalidEnvVar {
        kind: NameKind,
        container: String,
        var: String,
    },
}

/// Kubernetes pod manifests that can not be expressed as a [`crate::podspec::PodSpec`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    #[error("pod manifest is missing {0}")]
    Missing(&'static str),

    #[error("container {container:?}: {field} is not supported")]
    UnsupportedContainerField {
        container: String,
        field: &'static str,
    },

    #[error("volume {0:?} uses an unsupported volume source, only emptyDir and hostPath are supported")]
    UnsupportedVolume(String),

    #[error("container {container:?} has unknown image pull policy {policy:?}")]
    UnknownPullPolicy { container: String, policy: String },
}
