//! Referential validation of a manifest before anything touches the graph.

use std::collections::{HashMap, HashSet};

use topograph_core::{ContractResult, Manifest, Violation};

/// Check a manifest for internal consistency.
///
/// Stops at the first problem. Checks run in a fixed order: systems
/// present, environment names, node hostnames and IPs (node by node),
/// system names, component ownership, deployment targets, link endpoints.
/// Every failure is a precondition violation.
pub fn validate_manifest(manifest: &Manifest) -> ContractResult<()> {
    if manifest.systems.is_empty() {
        return Err(Violation::precondition(
            "Manifest must include at least one software system",
        ));
    }

    let mut environments = HashSet::new();
    for env in &manifest.environments {
        if !environments.insert(env.name.as_str()) {
            return Err(Violation::precondition(format!(
                "Conflicting environment identifier: {}",
                env.name
            )));
        }
    }

    let mut hostnames = HashSet::new();
    let mut ips = HashSet::new();
    for node in manifest.nodes() {
        if !hostnames.insert(node.hostname.as_str()) {
            return Err(Violation::precondition(format!(
                "Conflicting hardware node identifier: {}",
                node.hostname
            )));
        }
        if !ips.insert(node.ip_address.as_str()) {
            return Err(Violation::precondition(format!(
                "Duplicate IP address detected: {}",
                node.ip_address
            )));
        }
    }

    let mut systems = HashSet::new();
    for system in &manifest.systems {
        if !systems.insert(system.name.as_str()) {
            return Err(Violation::precondition(format!(
                "Conflicting software system identifier: {}",
                system.name
            )));
        }
    }

    let mut owners: HashMap<String, &str> = HashMap::new();
    for system in &manifest.systems {
        for component in &system.components {
            let identity = format!("{}:{}", component.name, component.version);
            let owner = owners.entry(identity).or_insert(system.name.as_str());
            if *owner != system.name {
                return Err(Violation::precondition(format!(
                    "Conflicting component identifier across systems: {}:{}",
                    component.name, component.version
                )));
            }
        }
    }

    for system in &manifest.systems {
        for component in &system.components {
            for target in &component.deployments {
                if !environments.contains(target.environment.as_str()) {
                    return Err(Violation::precondition(format!(
                        "Missing target environment: {}",
                        target.environment
                    )));
                }
                if !hostnames.contains(target.hostname.as_str()) {
                    return Err(Violation::precondition(format!(
                        "Missing target host: {}",
                        target.hostname
                    )));
                }
            }
        }
    }

    for link in &manifest.links {
        if !hostnames.contains(link.from_hostname.as_str()) {
            return Err(Violation::precondition(format!(
                "Missing network link source host: {}",
                link.from_hostname
            )));
        }
        if !hostnames.contains(link.to_hostname.as_str()) {
            return Err(Violation::precondition(format!(
                "Missing network link destination host: {}",
                link.to_hostname
            )));
        }
    }

    Ok(())
}
