use std::path::{Path, PathBuf};

use anyhow::Context;
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pod: init containers that run one after another, then main containers that run together,
/// all sharing a network and the declared volumes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Seeds the name of every engine resource created for this pod. Two pods that may run at
    /// the same time must not share a name.
    pub name: String,
    #[serde(default)]
    pub init_containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Replaces the image entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default)]
    pub pull_policy: PullPolicy,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Everything passed after the image reference: the tail of `command` followed by `args`.
    pub fn arguments(&self) -> impl Iterator<Item = &str> {
        self.command
            .iter()
            .flat_map(|command| command.iter().skip(1))
            .chain(self.args.iter())
            .map(String::as_str)
    }

    /// The entrypoint override, if `command` is set.
    pub fn entrypoint(&self) -> Option<&str> {
        self.command
            .as_ref()
            .and_then(|command| command.first())
            .map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum PullPolicy {
    /// Pull only when the image is not present locally.
    #[default]
    #[serde(alias = "IfNotPresent")]
    Default,
    /// Pull before every launch.
    Always,
    /// Never pull, fail the launch if the image is missing.
    Never,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    #[serde(alias = "name")]
    pub volume_name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeMount {
    pub fn new(volume_name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            volume_name: volume_name.into(),
            mount_path: mount_path.into(),
            read_only: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(flatten)]
    pub source: VolumeSource,
}

impl VolumeSpec {
    pub fn empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::EmptyDir {},
        }
    }

    pub fn host_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::HostPath { path: path.into() },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum VolumeSource {
    /// Scratch volume owned by the pod, created at start and removed at teardown.
    EmptyDir {},
    /// Existing host directory, bind mounted and never created or removed.
    HostPath { path: PathBuf },
}

/// Manifest encodings accepted by [`PodSpec::from_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
    Yaml,
}

impl Format {
    /// Guess from the file extension, anything unknown is read as yaml.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Format::Toml,
            Some("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

impl PodSpec {
    /// read a pod from a file
    /// the file may hold a native pod spec or a kubernetes v1 Pod manifest
    /// relative host paths are considered relative to the pod file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pod file at {}", path.to_string_lossy()))?;
        let mut spec = Self::parse(&contents, Format::from_path(path))
            .with_context(|| format!("failed to parse pod file at {}", path.to_string_lossy()))?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        spec.make_relative_to(&parent.canonicalize()?);
        Ok(spec)
    }

    pub fn parse(contents: &str, format: Format) -> anyhow::Result<Self> {
        let value: Value = match format {
            Format::Toml => toml::from_str(contents)?,
            Format::Json => serde_json::from_str(contents)?,
            Format::Yaml => serde_yaml::from_str(contents)?,
        };
        if value.get("kind").and_then(Value::as_str) == Some("Pod") {
            let pod: Pod = serde_json::from_value(value)?;
            return Ok(PodSpec::try_from(&pod)?);
        }
        Ok(serde_json::from_value(value)?)
    }

    fn make_relative_to(&mut self, base: &Path) {
        for volume in &mut self.volumes {
            if let VolumeSource::HostPath { path } = &mut volume.source {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    pub fn volume(&self, name: &str) -> Option<&VolumeSpec> {
        self.volumes.iter().find(|volume| volume.name == name)
    }
}
