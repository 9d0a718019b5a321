//! Organization manager for the tenants that own everything else.

use sysmodel_state::Organization;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;
use crate::requests::{AddOrganizationRequest, UpdateOrganizationRequest};
use crate::validation;

pub struct OrganizationManager {
    registry: Registry,
}

impl OrganizationManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Create an organization. Names are unique across organizations.
    pub fn add_organization(&self, request: AddOrganizationRequest) -> RegistryResult<Organization> {
        validation::validate_add_organization(&request)?;
        self.ensure_name_free(&request.name, None)?;

        let organization = Organization {
            organization_id: self.registry.ids.next_id(),
            name: request.name,
            full_address: request.full_address,
            city: request.city,
            state: request.state,
            country: request.country,
            zip_code: request.zip_code,
            created: self.registry.clock.now(),
        };
        self.registry.organizations.add(&organization)?;
        info!(
            organization_id = %organization.organization_id,
            name = %organization.name,
            "organization added"
        );
        Ok(organization)
    }

    pub fn get_organization(&self, organization_id: &str) -> RegistryResult<Organization> {
        Ok(self.registry.organizations.get(organization_id)?)
    }

    pub fn list_organizations(&self) -> RegistryResult<Vec<Organization>> {
        Ok(self.registry.organizations.list()?)
    }

    pub fn update_organization(
        &self,
        request: UpdateOrganizationRequest,
    ) -> RegistryResult<Organization> {
        validation::validate_update_organization(&request)?;
        let mut organization = self.registry.organizations.get(&request.organization_id)?;

        if let Some(name) = request.name {
            if name != organization.name {
                self.ensure_name_free(&name, Some(&organization.organization_id))?;
                organization.name = name;
            }
        }
        if let Some(full_address) = request.full_address {
            organization.full_address = full_address;
        }
        if let Some(city) = request.city {
            organization.city = city;
        }
        if let Some(state) = request.state {
            organization.state = state;
        }
        if let Some(country) = request.country {
            organization.country = country;
        }
        if let Some(zip_code) = request.zip_code {
            organization.zip_code = zip_code;
        }

        self.registry.organizations.update(&organization)?;
        info!(organization_id = %organization.organization_id, "organization updated");
        Ok(organization)
    }

    fn ensure_name_free(&self, name: &str, except: Option<&str>) -> RegistryResult<()> {
        let taken = self
            .registry
            .organizations
            .list()?
            .into_iter()
            .any(|o| o.name == name && Some(o.organization_id.as_str()) != except);
        if taken {
            return Err(RegistryError::AlreadyExists(format!("organization named {name}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FixedClock, SequentialIds};
    use crate::ErrorKind;

    fn manager() -> OrganizationManager {
        Registry::in_memory()
            .with_ids(SequentialIds::new("org"))
            .with_clock(FixedClock(1_700_000_000))
            .organization_manager()
    }

    fn named(name: &str) -> AddOrganizationRequest {
        AddOrganizationRequest {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn add_assigns_id_and_timestamp() {
        let orgs = manager();
        let acme = orgs.add_organization(named("acme")).unwrap();
        assert_eq!(acme.organization_id, "org-1");
        assert_eq!(acme.created, 1_700_000_000);
        assert_eq!(orgs.get_organization("org-1").unwrap(), acme);
    }

    #[test]
    fn duplicate_name_rejected() {
        let orgs = manager();
        orgs.add_organization(named("acme")).unwrap();
        let err = orgs.add_organization(named("acme")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(orgs.list_organizations().unwrap().len(), 1);
    }

    #[test]
    fn rename_checks_other_organizations_only() {
        let orgs = manager();
        orgs.add_organization(named("acme")).unwrap();
        orgs.add_organization(named("globex")).unwrap();

        let same = orgs
            .update_organization(UpdateOrganizationRequest {
                organization_id: "org-1".into(),
                name: Some("acme".into()),
                city: Some("Springfield".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(same.city, "Springfield");

        let err = orgs
            .update_organization(UpdateOrganizationRequest {
                organization_id: "org-1".into(),
                name: Some("globex".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn missing_organization_is_not_found() {
        assert_eq!(
            manager().get_organization("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
