//! Request validation. Pure functions, called before any storage access.

use std::collections::HashSet;

use sysmodel_state::ServiceGroup;

use crate::error::{RegistryError, RegistryResult};
use crate::requests::*;

/// Identifiers are opaque but must be non-empty and free of `/`, the index
/// key separator.
pub fn validate_identifier(field: &str, value: &str) -> RegistryResult<()> {
    if value.is_empty() {
        return Err(RegistryError::invalid(format!("{field} must be set")));
    }
    if value.contains('/') {
        return Err(RegistryError::invalid(format!(
            "{field} must not contain '/': {value}"
        )));
    }
    Ok(())
}

/// Upper bound on group instances created by one request.
pub const MAX_REPLICAS: u32 = 1024;

fn require_text(field: &str, value: &str) -> RegistryResult<()> {
    if value.trim().is_empty() {
        return Err(RegistryError::invalid(format!("{field} must be set")));
    }
    Ok(())
}

fn validate_port(field: &str, port: u32) -> RegistryResult<()> {
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(RegistryError::invalid(format!(
            "{field} {port} is outside 1..=65535"
        )));
    }
    Ok(())
}

pub fn validate_add_organization(request: &AddOrganizationRequest) -> RegistryResult<()> {
    require_text("name", &request.name)
}

pub fn validate_update_organization(request: &UpdateOrganizationRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    if let Some(name) = &request.name {
        require_text("name", name)?;
    }
    Ok(())
}

pub fn validate_add_cluster(request: &AddClusterRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    require_text("name", &request.name)?;
    require_text("hostname", &request.hostname)
}

pub fn validate_update_cluster(request: &UpdateClusterRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("cluster_id", &request.cluster_id)?;
    if let Some(name) = &request.name {
        require_text("name", name)?;
    }
    if let Some(hostname) = &request.hostname {
        require_text("hostname", hostname)?;
    }
    Ok(())
}

pub fn validate_add_node(request: &AddNodeRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    require_text("ip", &request.ip)
}

pub fn validate_add_user(request: &AddUserRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("email", &request.email)?;
    if !request.email.contains('@') {
        return Err(RegistryError::invalid(format!(
            "email is not an address: {}",
            request.email
        )));
    }
    require_text("name", &request.name)
}

pub fn validate_add_role(request: &AddRoleRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    require_text("name", &request.name)
}

/// Shape checks shared by descriptor creation and group replacement.
pub fn validate_service_groups(groups: &[ServiceGroup]) -> RegistryResult<()> {
    if groups.is_empty() {
        return Err(RegistryError::invalid("descriptor needs at least one service group"));
    }
    let mut group_names = HashSet::new();
    for group in groups {
        require_text("service group name", &group.name)?;
        if !group_names.insert(group.name.as_str()) {
            return Err(RegistryError::invalid(format!(
                "duplicate service group name {}",
                group.name
            )));
        }
        if group.services.is_empty() {
            return Err(RegistryError::invalid(format!(
                "service group {} has no services",
                group.name
            )));
        }
        let mut service_names = HashSet::new();
        for service in &group.services {
            require_text("service name", &service.name)?;
            require_text("service image", &service.image)?;
            if !service_names.insert(service.name.as_str()) {
                return Err(RegistryError::invalid(format!(
                    "duplicate service name {} in group {}",
                    service.name, group.name
                )));
            }
            for port in &service.exposed_ports {
                validate_port("internal port", port.internal_port)?;
                validate_port("exposed port", port.exposed_port)?;
            }
        }
    }
    Ok(())
}

pub fn validate_add_descriptor(request: &AddDescriptorRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    require_text("name", &request.name)?;
    validate_service_groups(&request.groups)?;
    for rule in &request.rules {
        require_text("rule name", &rule.name)?;
        validate_port("rule target port", rule.target_port)?;
    }
    Ok(())
}

pub fn validate_update_descriptor(request: &UpdateDescriptorRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("app_descriptor_id", &request.app_descriptor_id)?;
    if let Some(name) = &request.name {
        require_text("name", name)?;
    }
    if let Some(groups) = &request.groups {
        validate_service_groups(groups)?;
    }
    Ok(())
}

pub fn validate_add_instance(request: &AddInstanceRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("app_descriptor_id", &request.app_descriptor_id)?;
    require_text("name", &request.name)?;
    if let Some(parameters) = &request.parameters {
        for parameter in parameters {
            require_text("parameter name", &parameter.name)?;
        }
    }
    Ok(())
}

pub fn validate_add_service_group_instances(
    request: &AddServiceGroupInstancesRequest,
) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("app_descriptor_id", &request.app_descriptor_id)?;
    validate_identifier("app_instance_id", &request.app_instance_id)?;
    validate_identifier("service_group_id", &request.service_group_id)?;
    if request.replica_count == 0 {
        return Err(RegistryError::invalid("replica_count must be at least 1"));
    }
    if request.replica_count > MAX_REPLICAS {
        return Err(RegistryError::invalid(format!(
            "replica_count must be at most {MAX_REPLICAS}, got {}",
            request.replica_count
        )));
    }
    Ok(())
}

pub fn validate_add_service_instance(request: &AddServiceInstanceRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("app_descriptor_id", &request.app_descriptor_id)?;
    validate_identifier("app_instance_id", &request.app_instance_id)?;
    validate_identifier("service_group_id", &request.service_group_id)?;
    validate_identifier("service_group_instance_id", &request.service_group_instance_id)?;
    validate_identifier("service_id", &request.service_id)
}

pub fn validate_update_service_status(request: &UpdateServiceStatusRequest) -> RegistryResult<()> {
    validate_identifier("organization_id", &request.organization_id)?;
    validate_identifier("app_instance_id", &request.app_instance_id)?;
    validate_identifier("service_group_instance_id", &request.service_group_instance_id)?;
    validate_identifier("service_instance_id", &request.service_instance_id)?;
    for endpoint in &request.endpoints {
        require_text("endpoint fqdn", &endpoint.fqdn)?;
        validate_port("endpoint port", endpoint.port)?;
    }
    Ok(())
}
