//! Declared resources and the dependency graph the reconciler walks.
//!
//! Descriptors are recomputed on every pass from the plane config and agent
//! spec; they are never persisted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use plane_common::SecretPayload;
use serde::Serialize;
use thiserror::Error;

use crate::domain::agent::{AgentNames, AgentSpec};
use crate::domain::plane::PlaneConfig;

/// Source range used by the cloud's TCP tunnelling proxy.
pub const TUNNEL_SOURCE_RANGE: &str = "35.235.240.0/20";

/// Project roles granted to the plane's control service account.
pub const CONTROL_ROLES: &[&str] = &[
    "roles/compute.instanceAdmin.v1",
    "roles/secretmanager.admin",
    "roles/iam.serviceAccountUser",
];

/// Project roles granted to every agent service account.
pub const AGENT_ROLES: &[&str] = &[
    "roles/secretmanager.secretAccessor",
    "roles/logging.logWriter",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Firewall,
    ServiceAccount,
    Secret,
    Instance,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::Firewall => "firewall",
            Self::ServiceAccount => "service-account",
            Self::Secret => "secret",
            Self::Instance => "instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `kind/name`, unique within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// How existence is checked before acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceCheck {
    /// Describe the resource by kind and name.
    ByName,
    /// Describe the instance in a specific zone.
    InstanceInZone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub network: String,
    pub action: FirewallAction,
    pub source_ranges: Vec<String>,
    /// Protocol/port specs such as `tcp:22`, or `all`.
    pub rules: Vec<String>,
    pub target_tag: String,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub zone: String,
    pub machine_type: String,
    pub disk_gb: u32,
    pub subnet: String,
    pub network_tag: String,
    pub service_account: String,
    pub image_family: String,
    pub image_project: String,
    pub metadata: BTreeMap<String, String>,
}

/// Desired shape per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    Network,
    Subnet {
        network: String,
        region: String,
        cidr: String,
    },
    Firewall(FirewallRule),
    ServiceAccount {
        display_name: String,
        roles: Vec<String>,
    },
    /// Container plus a version holding `data`.
    Secret {
        data: Vec<u8>,
    },
    Instance(InstanceSpec),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub check: ExistenceCheck,
    pub spec: ResourceSpec,
    pub depends_on: Vec<ResourceId>,
}

impl ResourceDescriptor {
    fn new(kind: ResourceKind, name: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            check: ExistenceCheck::ByName,
            spec,
            depends_on: Vec::new(),
        }
    }

    fn after(mut self, deps: &[&ResourceId]) -> Self {
        self.depends_on = deps.iter().map(|id| (*id).clone()).collect();
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("resource {0} declared twice")]
    Duplicate(ResourceId),
    #[error("resource {node} depends on undeclared {missing}")]
    UnknownDependency { node: ResourceId, missing: ResourceId },
    #[error("dependency cycle through {0}")]
    Cycle(ResourceId),
}

/// Resources with explicit dependency edges.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    nodes: Vec<ResourceDescriptor>,
}

impl ResourceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`GraphError::Duplicate`] if a node with the same id exists.
    pub fn add(&mut self, node: ResourceDescriptor) -> Result<(), GraphError> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(GraphError::Duplicate(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceDescriptor> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Topological order. Among ready nodes the earliest inserted goes
    /// first, so the order is stable across runs.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownDependency`] for dangling edges and
    /// [`GraphError::Cycle`] if no order exists.
    pub fn ordered(&self) -> Result<Vec<&ResourceDescriptor>, GraphError> {
        let index: HashMap<&ResourceId, usize> =
            self.nodes.iter().enumerate().map(|(i, n)| (&n.id, i)).collect();

        let mut pending = vec![0usize; self.nodes.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let Some(&d) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        node: node.id.clone(),
                        missing: dep.clone(),
                    });
                };
                pending[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut done = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        while order.len() < self.nodes.len() {
            let Some(next) = (0..self.nodes.len()).find(|&i| !done[i] && pending[i] == 0) else {
                let stuck = (0..self.nodes.len()).find(|&i| !done[i]).unwrap_or(0);
                return Err(GraphError::Cycle(self.nodes[stuck].id.clone()));
            };
            done[next] = true;
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
            }
            order.push(&self.nodes[next]);
        }
        Ok(order)
    }
}

/// Shared plane resources: network, subnet and the two firewall rules.
#[must_use]
pub fn plan_plane(plane: &PlaneConfig) -> ResourceGraph {
    let mut graph = ResourceGraph::new();
    for node in plane_nodes(plane) {
        // Names are derived from distinct suffixes and cannot collide.
        let _ = graph.add(node);
    }
    graph
}

fn plane_nodes(plane: &PlaneConfig) -> Vec<ResourceDescriptor> {
    let network = ResourceDescriptor::new(ResourceKind::Network, &plane.network, ResourceSpec::Network);
    let subnet = ResourceDescriptor::new(
        ResourceKind::Subnet,
        &plane.subnet,
        ResourceSpec::Subnet {
            network: plane.network.clone(),
            region: plane.region.clone(),
            cidr: plane.subnet_cidr.clone(),
        },
    )
    .after(&[&network.id]);
    let allow = ResourceDescriptor::new(
        ResourceKind::Firewall,
        format!("{}-allow-tunnel", plane.name),
        ResourceSpec::Firewall(FirewallRule {
            network: plane.network.clone(),
            action: FirewallAction::Allow,
            source_ranges: vec![TUNNEL_SOURCE_RANGE.to_string()],
            rules: vec!["tcp:22".to_string()],
            target_tag: plane.firewall_tag.clone(),
            priority: 1000,
        }),
    )
    .after(&[&subnet.id]);
    let deny = ResourceDescriptor::new(
        ResourceKind::Firewall,
        format!("{}-deny-external", plane.name),
        ResourceSpec::Firewall(FirewallRule {
            network: plane.network.clone(),
            action: FirewallAction::Deny,
            source_ranges: vec!["0.0.0.0/0".to_string()],
            rules: vec!["all".to_string()],
            target_tag: plane.firewall_tag.clone(),
            priority: 2000,
        }),
    )
    .after(&[&allow.id]);
    vec![network, subnet, allow, deny]
}

/// The plane's own service account, used by the control plane.
#[must_use]
pub fn plan_control_account(plane: &PlaneConfig) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::ServiceAccount,
        plane.control_account(),
        ResourceSpec::ServiceAccount {
            display_name: format!("{} plane control", plane.name),
            roles: CONTROL_ROLES.iter().map(|r| (*r).to_string()).collect(),
        },
    )
}

/// Secret carrying the plane configuration for instances to read at boot.
#[must_use]
pub fn plan_plane_secret(plane: &PlaneConfig) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::Secret,
        plane.config_secret(),
        ResourceSpec::Secret {
            data: encode_json(plane),
        },
    )
}

fn encode_json<T: Serialize>(value: &T) -> Vec<u8> {
    // Plain structs of strings and integers always serialize.
    serde_json::to_vec(value).unwrap_or_default()
}

/// Plane resources followed by the agent's service account, secret and instance.
#[must_use]
pub fn plan_agent(plane: &PlaneConfig, spec: &AgentSpec) -> ResourceGraph {
    plan_agent_with(plane, spec, &spec.payload())
}

/// [`plan_agent`] with an explicit secret payload.
#[must_use]
pub fn plan_agent_with(plane: &PlaneConfig, spec: &AgentSpec, payload: &SecretPayload) -> ResourceGraph {
    let names = AgentNames::derive(&spec.owner);
    let shared = plane_nodes(plane);
    let firewall_ids: Vec<ResourceId> = shared
        .iter()
        .filter(|n| n.id.kind == ResourceKind::Firewall)
        .map(|n| n.id.clone())
        .collect();
    let subnet_id = ResourceId::new(ResourceKind::Subnet, &plane.subnet);

    let account = ResourceDescriptor::new(
        ResourceKind::ServiceAccount,
        &names.service_account,
        ResourceSpec::ServiceAccount {
            display_name: format!("Agent for {}", spec.owner),
            roles: AGENT_ROLES.iter().map(|r| (*r).to_string()).collect(),
        },
    )
    .after(&firewall_ids.iter().collect::<Vec<_>>());
    let secret = ResourceDescriptor::new(
        ResourceKind::Secret,
        &names.secret,
        ResourceSpec::Secret {
            data: encode_json(payload),
        },
    )
    .after(&[&account.id]);

    let mut metadata = BTreeMap::new();
    metadata.insert("agent-owner".to_string(), spec.owner.clone());
    metadata.insert("agent-secret".to_string(), names.secret.clone());
    metadata.insert("agent-plane".to_string(), plane.name.clone());
    let mut instance = ResourceDescriptor::new(
        ResourceKind::Instance,
        &names.instance,
        ResourceSpec::Instance(InstanceSpec {
            zone: plane.zone.clone(),
            machine_type: spec.machine_type(plane).to_string(),
            disk_gb: spec.disk_gb,
            subnet: plane.subnet.clone(),
            network_tag: plane.firewall_tag.clone(),
            service_account: names.service_account.clone(),
            image_family: plane.image_family.clone(),
            image_project: plane.image_project.clone(),
            metadata,
        }),
    )
    .after(&[&subnet_id, &account.id, &secret.id]);
    instance.check = ExistenceCheck::InstanceInZone(plane.zone.clone());

    let mut graph = ResourceGraph::new();
    for node in shared.into_iter().chain([account, secret, instance]) {
        let _ = graph.add(node);
    }
    graph
}
