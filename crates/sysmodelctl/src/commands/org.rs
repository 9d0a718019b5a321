use sysmodel_core::{AddOrganizationRequest, Registry};

use super::print_json;

pub fn add(registry: &Registry, name: String) -> anyhow::Result<()> {
    let organization = registry
        .organization_manager()
        .add_organization(AddOrganizationRequest {
            name,
            ..Default::default()
        })?;
    print_json(&organization)
}

pub fn list(registry: &Registry) -> anyhow::Result<()> {
    print_json(&registry.organization_manager().list_organizations()?)
}
