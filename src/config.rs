use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use anyhow::Context;

/// Image used for the namespace-holding sandbox container in [`NetworkMode::SharedNamespace`].
pub const DEFAULT_SANDBOX_IMAGE: &str = "registry.k8s.io/pause:3.9";

/// How the containers of a pod reach each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// Every container joins the network namespace of a sandbox container attached to the
    /// pod network, so pod-mates reach each other on `localhost`.
    #[default]
    SharedNamespace,
    /// Every container joins a dedicated pod network and is reachable by its declared name.
    /// No sandbox image is needed, but pod-mates do not share `localhost`.
    Bridge,
}

/// Knobs that change the emitted script without changing pod semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Docker compatible command line client, e.g. `docker` or `podman`.
    pub engine: String,
    pub network_mode: NetworkMode,
    pub sandbox_image: String,
    /// Pass the logs of the main containers through to stderr during teardown.
    pub dump_logs: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            network_mode: NetworkMode::default(),
            sandbox_image: DEFAULT_SANDBOX_IMAGE.to_string(),
            dump_logs: true,
        }
    }
}

/// Valid pod names:
///   must not be empty
///   contain at most 63 characters
///   contain only lowercase alphanumeric characters or '-'
///   start with an alphanumeric character
///   end with an alphanumeric character
///
/// Every engine resource created for a pod is named after it, so these rules keep
/// derived names acceptable to docker and podman alike.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PodName(String);

const MAX_POD_NAME_LEN: usize = 63;

impl PodName {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `<name>-<suffix>`, with the name shortened as needed so the result is still a valid
    /// pod name.
    pub fn with_suffix(&self, suffix: &str) -> anyhow::Result<Self> {
        let keep = MAX_POD_NAME_LEN
            .saturating_sub(suffix.len() + 1)
            .min(self.0.len());
        let base = self.0[..keep].trim_end_matches('-');
        format!("{}-{}", base, suffix)
            .parse()
            .with_context(|| format!("can not append suffix {:?} to pod name {}", suffix, self))
    }
}

impl FromStr for PodName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(!s.is_empty(), "pod name cannot be an empty string");
        anyhow::ensure!(
            s.len() <= MAX_POD_NAME_LEN,
            "pod name must be <= 63 characters"
        );
        anyhow::ensure!(
            s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "pod name must contain only lowercase alphanumeric characters or '-'"
        );
        anyhow::ensure!(
            s.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()),
            "pod name must start with an alphanumeric character"
        );
        anyhow::ensure!(
            s.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit()),
            "pod name must end with an alphanumeric character"
        );
        Ok(Self(s.to_string()))
    }
}

impl Debug for PodName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for PodName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_names() {
        for ok in ["a", "demo", "job-42", "0abc", &"x".repeat(63)] {
            assert!(ok.parse::<PodName>().is_ok(), "{ok} should be accepted");
        }
        for bad in ["", "Demo", "-demo", "demo-", "de_mo", "de mo", &"x".repeat(64)] {
            assert!(bad.parse::<PodName>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn suffix_fits_in_a_pod_name() {
        let short: PodName = "demo".parse().unwrap();
        assert_eq!(short.with_suffix("1a2b3c4d").unwrap().as_str(), "demo-1a2b3c4d");

        let long: PodName = "x".repeat(63).parse().unwrap();
        let suffixed = long.with_suffix("1a2b3c4d").unwrap();
        assert_eq!(suffixed.as_str().len(), 63);
        assert_eq!(suffixed.as_str(), format!("{}-1a2b3c4d", "x".repeat(54)));

        // the cut lands right after a '-', which is dropped
        let dashed: PodName = format!("{}-{}", "a".repeat(53), "b".repeat(9)).parse().unwrap();
        assert_eq!(
            dashed.with_suffix("1a2b3c4d").unwrap().as_str(),
            format!("{}-1a2b3c4d", "a".repeat(53))
        );

        assert!(short.with_suffix("Not_Valid").is_err());
    }

    #[test]
    fn defaults() {
        let opts = CompileOptions::default();
        assert_eq!(opts.engine, "docker");
        assert_eq!(opts.network_mode, NetworkMode::SharedNamespace);
        assert!(opts.dump_logs);
    }
}
