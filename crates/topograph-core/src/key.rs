//! Canonical deployment keys: `{environment}@{hostname}:{component}:{version}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ContractResult, Violation};

/// The identity of a deployment instance, derived from its owning
/// component and its target. Never assigned by users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentKey {
    pub environment: String,
    pub hostname: String,
    pub component: String,
    pub version: String,
}

impl DeploymentKey {
    pub fn new(
        environment: impl Into<String>,
        hostname: impl Into<String>,
        component: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            hostname: hostname.into(),
            component: component.into(),
            version: version.into(),
        }
    }

    /// Parse a stored key.
    ///
    /// Splits once on the first `@` (the environment must be non-empty),
    /// then splits the remainder on `:` into exactly three non-blank parts.
    pub fn parse(raw: &str) -> ContractResult<Self> {
        let malformed = || {
            Violation::precondition(format!(
                "malformed deployment key '{raw}': expected {{env}}@{{host}}:{{name}}:{{version}}"
            ))
        };

        let (environment, rest) = raw.split_once('@').ok_or_else(malformed)?;
        if environment.trim().is_empty() {
            return Err(malformed());
        }

        let parts: Vec<&str> = rest.split(':').collect();
        let [hostname, component, version] = parts.as_slice() else {
            return Err(malformed());
        };
        if [hostname, component, version].iter().any(|p| p.trim().is_empty()) {
            return Err(malformed());
        }

        Ok(Self::new(environment, *hostname, *component, *version))
    }

    /// The same component identity placed on a new environment and node.
    pub fn retarget(&self, environment: &str, hostname: &str) -> Self {
        Self::new(environment, hostname, &self.component, &self.version)
    }

    pub fn is_blank(&self) -> bool {
        [&self.environment, &self.hostname, &self.component, &self.version]
            .iter()
            .any(|p| p.trim().is_empty())
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}:{}",
            self.environment, self.hostname, self.component, self.version
        )
    }
}
