//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod agent;
pub mod decision;
pub mod directory;
pub mod error;
pub mod plane;
pub mod resource;
pub mod setup;

pub use agent::{AgentNames, AgentRecord, AgentSpec, config_digest, validate_owner};
pub use decision::{Action, Decision, LiveStatus, NoOpReason, decide};
pub use directory::{DirectoryChange, DirectoryUser, UserFilter, WatchSnapshot, net_delta, spec_from_user};
pub use error::{
    FailureClass, InfraError, InfraErrorKind, ProvisionError, SetupError, ValidationError,
    classify_failure,
};
pub use plane::{DirectoryConfig, PlaneConfig, validate_plane_name};
pub use resource::{
    ExistenceCheck, FirewallAction, FirewallRule, GraphError, InstanceSpec, ResourceDescriptor,
    ResourceGraph, ResourceId, ResourceKind, ResourceSpec, plan_agent, plan_agent_with,
    plan_control_account, plan_plane, plan_plane_secret,
};
pub use setup::SetupStep;
