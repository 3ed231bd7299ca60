//! Deterministic names for every engine resource a pod owns.
//!
//! Names are `<pod>-<role>` or `<pod>-<role>-<index>`. The index is the position in the
//! declaring list, so two pods with different names can never produce the same resource name
//! and declared names never have to be sanitized.

use std::fmt::{Display, Formatter};

use crate::{
    config::{NetworkMode, PodName},
    podspec::{ContainerSpec, PodSpec, VolumeSource},
};

/// Label attached to every resource a pod creates, valued with the pod name.
pub const POD_LABEL: &str = "podscript.pod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Network,
    Sandbox,
    Volume,
    InitContainer,
    Container,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::Network => "net",
            Role::Sandbox => "sandbox",
            Role::Volume => "vol",
            Role::InitContainer => "init",
            Role::Container => "ctr",
        }
    }

    /// A pod has at most one network and one sandbox, the index is ignored for those.
    pub fn is_indexed(self) -> bool {
        !matches!(self, Role::Network | Role::Sandbox)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

pub fn resource_name(pod: &PodName, role: Role, index: usize) -> String {
    if role.is_indexed() {
        format!("{}-{}-{}", pod, role, index)
    } else {
        format!("{}-{}", pod, role)
    }
}

/// An engine volume backing an `emptyDir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedVolume {
    /// Name declared in the pod spec.
    pub declared: String,
    pub resource: String,
}

/// A container created for the pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedContainer {
    pub declared: String,
    pub resource: String,
}

/// Every resource a compiled pod creates, and therefore removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodResources {
    pub pod: PodName,
    pub network: String,
    pub sandbox: Option<String>,
    pub volumes: Vec<OwnedVolume>,
    pub init_containers: Vec<OwnedContainer>,
    pub containers: Vec<OwnedContainer>,
}

impl PodResources {
    pub fn plan(pod: &PodName, spec: &PodSpec, network_mode: NetworkMode) -> Self {
        let volumes = spec
            .volumes
            .iter()
            .enumerate()
            .filter(|(_, volume)| matches!(volume.source, VolumeSource::EmptyDir {}))
            .map(|(i, volume)| OwnedVolume {
                declared: volume.name.clone(),
                resource: resource_name(pod, Role::Volume, i),
            })
            .collect();
        Self {
            pod: pod.clone(),
            network: resource_name(pod, Role::Network, 0),
            sandbox: match network_mode {
                NetworkMode::Bridge => None,
                NetworkMode::SharedNamespace => Some(resource_name(pod, Role::Sandbox, 0)),
            },
            volumes,
            init_containers: owned(pod, Role::InitContainer, &spec.init_containers),
            containers: owned(pod, Role::Container, &spec.containers),
        }
    }

    /// Engine volume backing the declared `emptyDir`, `None` for host paths and unknown names.
    pub fn volume(&self, declared: &str) -> Option<&str> {
        self.volumes
            .iter()
            .find(|v| v.declared == declared)
            .map(|v| v.resource.as_str())
    }

    /// `--label` value carried by every resource of this pod.
    pub fn label(&self) -> String {
        format!("{}={}", POD_LABEL, self.pod)
    }

    /// Every container name the pod may create, in removal order.
    pub fn removal_order(&self) -> impl Iterator<Item = &str> {
        self.containers
            .iter()
            .rev()
            .chain(self.init_containers.iter().rev())
            .map(|c| c.resource.as_str())
            .chain(self.sandbox.as_deref())
    }

    /// Every resource name, for collision checks.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.network.as_str())
            .chain(self.sandbox.as_deref())
            .chain(self.volumes.iter().map(|v| v.resource.as_str()))
            .chain(self.init_containers.iter().map(|c| c.resource.as_str()))
            .chain(self.containers.iter().map(|c| c.resource.as_str()))
    }
}

fn owned(pod: &PodName, role: Role, containers: &[ContainerSpec]) -> Vec<OwnedContainer> {
    containers
        .iter()
        .enumerate()
        .map(|(i, container)| OwnedContainer {
            declared: container.name.clone(),
            resource: resource_name(pod, role, i),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::podspec::VolumeSpec;

    fn pod(name: &str) -> PodName {
        name.parse().unwrap()
    }

    fn spec() -> PodSpec {
        PodSpec {
            name: "ignored".into(),
            init_containers: vec![ContainerSpec::new("sidecar", "ubuntu")],
            containers: vec![
                ContainerSpec::new("sidecar", "ubuntu"),
                ContainerSpec::new("worker", "ubuntu"),
            ],
            volumes: vec![
                VolumeSpec::host_path("testdata", "/srv"),
                VolumeSpec::empty_dir("shared"),
            ],
        }
    }

    #[test]
    fn names() {
        let p = pod("abc");
        assert_eq!(resource_name(&p, Role::Network, 7), "abc-net");
        assert_eq!(resource_name(&p, Role::Sandbox, 0), "abc-sandbox");
        assert_eq!(resource_name(&p, Role::Volume, 1), "abc-vol-1");
        assert_eq!(resource_name(&p, Role::InitContainer, 0), "abc-init-0");
        assert_eq!(resource_name(&p, Role::Container, 2), "abc-ctr-2");
    }

    #[test]
    fn init_and_main_with_same_name_do_not_collide() {
        let resources = PodResources::plan(&pod("abc"), &spec(), NetworkMode::SharedNamespace);
        let names: Vec<&str> = resources.all_names().collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
        assert_eq!(resources.init_containers[0].declared, "sidecar");
        assert_eq!(resources.containers[0].declared, "sidecar");
    }

    #[test]
    fn only_empty_dirs_are_owned() {
        let resources = PodResources::plan(&pod("abc"), &spec(), NetworkMode::Bridge);
        assert_eq!(resources.volume("shared"), Some("abc-vol-1"));
        assert_eq!(resources.volume("testdata"), None);
        assert_eq!(resources.sandbox, None);
    }

    #[test]
    fn distinct_pods_never_share_names() {
        // pod names chosen to look like each other's resource names
        let pods = ["a", "a-ctr", "a-ctr-0", "a-net", "a-vol-1", "a-init-0", "b"];
        let mut seen = HashSet::new();
        for name in pods {
            let resources = PodResources::plan(&pod(name), &spec(), NetworkMode::SharedNamespace);
            for resource in resources.all_names() {
                assert!(seen.insert(resource.to_string()), "{resource} reused");
            }
        }
    }

    #[test]
    fn removal_order_is_reverse_creation() {
        let resources = PodResources::plan(&pod("abc"), &spec(), NetworkMode::SharedNamespace);
        assert_eq!(
            resources.removal_order().collect::<Vec<_>>(),
            ["abc-ctr-1", "abc-ctr-0", "abc-init-0", "abc-sandbox"]
        );
        assert_eq!(resources.label(), "podscript.pod=abc");
    }
}
