//! Application manager: descriptors, instances and the instance aggregate.
//!
//! An application instance is stored as one document holding its service
//! group instances and their service instances. Every change to the nested
//! parts reads the document, edits it and writes it back with
//! [`EntityStore::replace`], so two writers racing on the same instance
//! cannot silently drop each other's change: the loser gets `Conflict`.
//!
//! Each instance also gets a frozen copy of its descriptor at creation (the
//! parametrized descriptor). Group instances are created from that copy, so
//! later descriptor edits never change what an existing instance deploys.

use std::collections::BTreeMap;

use sysmodel_state::*;
use tracing::{debug, info, warn};

use crate::compensation::Compensation;
use crate::error::{RegistryError, RegistryResult};
use crate::ownership::Owned;
use crate::registry::Registry;
use crate::requests::*;
use crate::validation;

pub struct ApplicationManager {
    registry: Registry,
}

impl ApplicationManager {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    fn descriptors(&self) -> Owned<'_, AppDescriptor> {
        Owned::new(
            &*self.registry.descriptors,
            &*self.registry.index,
            ChildKind::Descriptor,
        )
    }

    fn instances(&self) -> Owned<'_, AppInstance> {
        Owned::new(
            &*self.registry.instances,
            &*self.registry.index,
            ChildKind::Instance,
        )
    }

    // ── Descriptors ───────────────────────────────────────────────

    /// Store a new descriptor. Groups, services and rules get fresh ids.
    ///
    /// If indexing fails the stored descriptor is kept and the error is
    /// returned. The unindexed record is never listed and is left in place.
    pub fn add_descriptor(&self, request: AddDescriptorRequest) -> RegistryResult<AppDescriptor> {
        validation::validate_add_descriptor(&request)?;
        self.registry.require_organization(&request.organization_id)?;

        let descriptor = AppDescriptor {
            organization_id: request.organization_id,
            app_descriptor_id: self.registry.ids.next_id(),
            name: request.name,
            configuration_options: request.configuration_options,
            environment_variables: request.environment_variables,
            labels: request.labels,
            rules: self.assign_rule_ids(request.rules),
            groups: self.assign_group_ids(request.groups),
            created: self.registry.clock.now(),
        };

        self.registry.descriptors.add(&descriptor)?;
        if let Err(err) = self.registry.index.add_child(
            &descriptor.organization_id,
            ChildKind::Descriptor,
            &descriptor.app_descriptor_id,
        ) {
            warn!(
                organization_id = %descriptor.organization_id,
                app_descriptor_id = %descriptor.app_descriptor_id,
                error = %err,
                "descriptor stored but not indexed"
            );
            return Err(err.into());
        }

        info!(
            organization_id = %descriptor.organization_id,
            app_descriptor_id = %descriptor.app_descriptor_id,
            groups = descriptor.groups.len(),
            "descriptor added"
        );
        Ok(descriptor)
    }

    pub fn get_descriptor(
        &self,
        organization_id: &str,
        app_descriptor_id: &str,
    ) -> RegistryResult<AppDescriptor> {
        self.descriptors().get(organization_id, app_descriptor_id)
    }

    pub fn list_descriptors(&self, organization_id: &str) -> RegistryResult<Vec<AppDescriptor>> {
        self.descriptors().list(organization_id)
    }

    /// Rename, relabel or replace the groups of a descriptor. Existing
    /// instances keep deploying from their own snapshot.
    pub fn update_descriptor(
        &self,
        request: UpdateDescriptorRequest,
    ) -> RegistryResult<AppDescriptor> {
        validation::validate_update_descriptor(&request)?;
        let mut descriptor =
            self.get_descriptor(&request.organization_id, &request.app_descriptor_id)?;

        if let Some(name) = request.name {
            descriptor.name = name;
        }
        if let Some(labels) = request.labels {
            descriptor.labels = labels;
        }
        if let Some(groups) = request.groups {
            descriptor.groups = self.assign_group_ids(groups);
        }

        self.registry.descriptors.update(&descriptor)?;
        info!(
            organization_id = %descriptor.organization_id,
            app_descriptor_id = %descriptor.app_descriptor_id,
            "descriptor updated"
        );
        Ok(descriptor)
    }

    /// Remove a descriptor no instance was created from.
    pub fn remove_descriptor(
        &self,
        organization_id: &str,
        app_descriptor_id: &str,
    ) -> RegistryResult<()> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("app_descriptor_id", app_descriptor_id)?;
        self.descriptors().require(organization_id, app_descriptor_id)?;

        let in_use = self
            .registry
            .instances
            .list_by_owner(organization_id)?
            .into_iter()
            .filter(|i| i.app_descriptor_id == app_descriptor_id)
            .count();
        if in_use > 0 {
            return Err(RegistryError::FailedPrecondition(format!(
                "descriptor {app_descriptor_id} is used by {in_use} instance(s)"
            )));
        }

        self.descriptors().remove(organization_id, app_descriptor_id)?;
        info!(%organization_id, %app_descriptor_id, "descriptor removed");
        Ok(())
    }

    fn assign_group_ids(&self, groups: Vec<ServiceGroup>) -> Vec<ServiceGroup> {
        groups
            .into_iter()
            .map(|mut group| {
                group.service_group_id = self.registry.ids.next_id();
                for service in &mut group.services {
                    service.service_id = self.registry.ids.next_id();
                }
                group
            })
            .collect()
    }

    fn assign_rule_ids(&self, rules: Vec<SecurityRule>) -> Vec<SecurityRule> {
        rules
            .into_iter()
            .map(|mut rule| {
                rule.rule_id = self.registry.ids.next_id();
                rule.device_group_ids.clear();
                rule
            })
            .collect()
    }

    // ── Instances ─────────────────────────────────────────────────

    /// Create an instance of a descriptor together with its parametrized
    /// descriptor and, if given, its parameters.
    ///
    /// Either every record is written or, after a failure, every record
    /// already written is removed again.
    pub fn add_instance(&self, request: AddInstanceRequest) -> RegistryResult<AppInstance> {
        validation::validate_add_instance(&request)?;
        self.registry.require_organization(&request.organization_id)?;
        let descriptor =
            self.get_descriptor(&request.organization_id, &request.app_descriptor_id)?;

        let app_instance_id = self.registry.ids.next_id();
        let parametrized = self.parametrize(&descriptor, &app_instance_id)?;
        let instance = AppInstance {
            organization_id: request.organization_id,
            app_instance_id: app_instance_id.clone(),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            name: request.name,
            labels: request.labels,
            status: ApplicationStatus::Deploying,
            groups: Vec::new(),
            created: self.registry.clock.now(),
            revision: 0,
        };
        let parameters = request.parameters.map(|parameters| InstanceParameters {
            organization_id: instance.organization_id.clone(),
            app_instance_id: app_instance_id.clone(),
            parameters,
        });

        let organization_id = instance.organization_id.as_str();
        let registry = &self.registry;
        let mut saga = Compensation::begin("add_instance", app_instance_id.as_str());
        saga.step(
            "store instance",
            || Ok(registry.instances.add(&instance)?),
            || Ok(registry.instances.remove(&app_instance_id)?),
        )?;
        saga.step(
            "index instance",
            || Ok(registry.index.add_child(organization_id, ChildKind::Instance, &app_instance_id)?),
            || Ok(registry.index.delete_child(organization_id, ChildKind::Instance, &app_instance_id)?),
        )?;
        saga.step(
            "store parametrized descriptor",
            || Ok(registry.parametrized_descriptors.add(&parametrized)?),
            || Ok(registry.parametrized_descriptors.remove(&app_instance_id)?),
        )?;
        if let Some(parameters) = &parameters {
            saga.step(
                "store parameters",
                || Ok(registry.instance_parameters.add(parameters)?),
                || Ok(registry.instance_parameters.remove(&app_instance_id)?),
            )?;
        }
        saga.commit();

        info!(
            %organization_id,
            %app_instance_id,
            app_descriptor_id = %instance.app_descriptor_id,
            "instance added"
        );
        Ok(instance)
    }

    /// Frozen copy of a descriptor with device group names resolved to ids.
    fn parametrize(
        &self,
        descriptor: &AppDescriptor,
        app_instance_id: &str,
    ) -> RegistryResult<ParametrizedDescriptor> {
        let device_groups: BTreeMap<String, String> = self
            .registry
            .device_groups
            .list_by_owner(&descriptor.organization_id)?
            .into_iter()
            .map(|g| (g.name, g.device_group_id))
            .collect();

        let mut rules = descriptor.rules.clone();
        for rule in &mut rules {
            rule.device_group_ids = rule
                .device_group_names
                .iter()
                .map(|name| {
                    device_groups.get(name).cloned().ok_or_else(|| {
                        RegistryError::not_found(format!(
                            "device group {name} in organization {}",
                            descriptor.organization_id
                        ))
                    })
                })
                .collect::<RegistryResult<Vec<_>>>()?;
        }

        Ok(ParametrizedDescriptor {
            organization_id: descriptor.organization_id.clone(),
            app_descriptor_id: descriptor.app_descriptor_id.clone(),
            app_instance_id: app_instance_id.to_string(),
            name: descriptor.name.clone(),
            configuration_options: descriptor.configuration_options.clone(),
            environment_variables: descriptor.environment_variables.clone(),
            labels: descriptor.labels.clone(),
            rules,
            groups: descriptor.groups.clone(),
        })
    }

    pub fn get_instance(
        &self,
        organization_id: &str,
        app_instance_id: &str,
    ) -> RegistryResult<AppInstance> {
        self.instances().get(organization_id, app_instance_id)
    }

    pub fn list_instances(&self, organization_id: &str) -> RegistryResult<Vec<AppInstance>> {
        self.instances().list(organization_id)
    }

    pub fn get_parametrized_descriptor(
        &self,
        organization_id: &str,
        app_instance_id: &str,
    ) -> RegistryResult<ParametrizedDescriptor> {
        self.instances().require(organization_id, app_instance_id)?;
        Ok(self.registry.parametrized_descriptors.get(app_instance_id)?)
    }

    /// Parameters given at creation. `NotFound` if none were given.
    pub fn get_instance_parameters(
        &self,
        organization_id: &str,
        app_instance_id: &str,
    ) -> RegistryResult<InstanceParameters> {
        self.instances().require(organization_id, app_instance_id)?;
        Ok(self.registry.instance_parameters.get(app_instance_id)?)
    }

    /// Remove an instance. Its snapshot and parameters are removed on a
    /// best-effort basis once the instance itself is gone.
    pub fn remove_instance(
        &self,
        organization_id: &str,
        app_instance_id: &str,
    ) -> RegistryResult<()> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("app_instance_id", app_instance_id)?;
        self.instances().remove(organization_id, app_instance_id)?;

        if let Err(err) = self.registry.parametrized_descriptors.remove(app_instance_id) {
            warn!(%app_instance_id, error = %err, "parametrized descriptor not removed");
        }
        match self.registry.instance_parameters.remove(app_instance_id) {
            Ok(()) | Err(StateError::NotFound(_)) => {}
            Err(err) => warn!(%app_instance_id, error = %err, "instance parameters not removed"),
        }

        info!(%organization_id, %app_instance_id, "instance removed");
        Ok(())
    }

    // ── Aggregate ─────────────────────────────────────────────────

    /// Write back an edited instance. Fails with `Conflict` if the stored
    /// copy changed since it was read.
    fn store_aggregate(&self, instance: &AppInstance) -> RegistryResult<AppInstance> {
        let stored = self.registry.instances.replace(instance, instance.revision)?;
        debug!(
            app_instance_id = %stored.app_instance_id,
            revision = stored.revision,
            "instance aggregate stored"
        );
        Ok(stored)
    }

    fn require_created_from(instance: &AppInstance, app_descriptor_id: &str) -> RegistryResult<()> {
        if instance.app_descriptor_id != app_descriptor_id {
            return Err(RegistryError::invalid(format!(
                "instance {} was created from descriptor {}, not {app_descriptor_id}",
                instance.app_instance_id, instance.app_descriptor_id
            )));
        }
        Ok(())
    }

    /// Append `replica_count` instances of one service group, each expecting
    /// `replica_count` replicas. Returns the new group instances.
    pub fn add_service_group_instances(
        &self,
        request: AddServiceGroupInstancesRequest,
    ) -> RegistryResult<Vec<ServiceGroupInstance>> {
        validation::validate_add_service_group_instances(&request)?;
        let organization_id = request.organization_id.as_str();
        self.descriptors()
            .require(organization_id, &request.app_descriptor_id)?;
        let mut instance = self.get_instance(organization_id, &request.app_instance_id)?;
        Self::require_created_from(&instance, &request.app_descriptor_id)?;

        let parametrized = self
            .registry
            .parametrized_descriptors
            .get(&request.app_instance_id)?;
        let group = parametrized.group(&request.service_group_id).ok_or_else(|| {
            RegistryError::not_found(format!(
                "service group {} in instance {}",
                request.service_group_id, request.app_instance_id
            ))
        })?;

        let created: Vec<ServiceGroupInstance> = (0..request.replica_count)
            .map(|_| ServiceGroupInstance {
                service_group_instance_id: self.registry.ids.next_id(),
                service_group_id: group.service_group_id.clone(),
                name: group.name.clone(),
                status: ServiceStatus::Scheduled,
                metadata: InstanceMetadata {
                    desired_replicas: request.replica_count,
                    available_replicas: 0,
                    unavailable_replicas: 0,
                },
                service_instances: Vec::new(),
            })
            .collect();
        instance.groups.extend(created.iter().cloned());
        self.store_aggregate(&instance)?;

        info!(
            %organization_id,
            app_instance_id = %request.app_instance_id,
            service_group_id = %request.service_group_id,
            count = created.len(),
            "service group instances added"
        );
        Ok(created)
    }

    /// Append a service instance to an existing service group instance.
    pub fn add_service_instance(
        &self,
        request: AddServiceInstanceRequest,
    ) -> RegistryResult<ServiceInstance> {
        validation::validate_add_service_instance(&request)?;
        let organization_id = request.organization_id.as_str();
        let descriptor = self.get_descriptor(organization_id, &request.app_descriptor_id)?;
        let mut instance = self.get_instance(organization_id, &request.app_instance_id)?;
        Self::require_created_from(&instance, &request.app_descriptor_id)?;

        let service = descriptor
            .group(&request.service_group_id)
            .and_then(|g| g.service(&request.service_id))
            .ok_or_else(|| {
                RegistryError::not_found(format!(
                    "service {} in group {} of descriptor {}",
                    request.service_id, request.service_group_id, request.app_descriptor_id
                ))
            })?;
        let service_instance = ServiceInstance {
            service_instance_id: self.registry.ids.next_id(),
            service_id: service.service_id.clone(),
            name: service.name.clone(),
            image: service.image.clone(),
            status: ServiceStatus::Scheduled,
            endpoints: Vec::new(),
            deployed_on_cluster_id: None,
        };

        instance
            .group_instance_mut(&request.service_group_id, &request.service_group_instance_id)
            .ok_or_else(|| {
                RegistryError::not_found(format!(
                    "service group instance {} of group {} in instance {}",
                    request.service_group_instance_id,
                    request.service_group_id,
                    request.app_instance_id
                ))
            })?
            .service_instances
            .push(service_instance.clone());
        self.store_aggregate(&instance)?;

        info!(
            %organization_id,
            app_instance_id = %request.app_instance_id,
            service_instance_id = %service_instance.service_instance_id,
            "service instance added"
        );
        Ok(service_instance)
    }

    /// Record a deployment report for one service instance and recompute
    /// the status of its group.
    ///
    /// Reports name ids the registry handed out, so an unknown pair means
    /// the aggregate and its reporter disagree: `Internal`, not `NotFound`.
    pub fn update_service_status(
        &self,
        request: UpdateServiceStatusRequest,
    ) -> RegistryResult<AppInstance> {
        validation::validate_update_service_status(&request)?;
        let mut instance = self.get_instance(&request.organization_id, &request.app_instance_id)?;

        let group = instance
            .groups
            .iter_mut()
            .find(|g| g.service_group_instance_id == request.service_group_instance_id)
            .ok_or_else(|| {
                RegistryError::Internal(format!(
                    "instance {} has no service group instance {}",
                    request.app_instance_id, request.service_group_instance_id
                ))
            })?;
        let service = group
            .service_instance_mut(&request.service_instance_id)
            .ok_or_else(|| {
                RegistryError::Internal(format!(
                    "service group instance {} has no service instance {}",
                    request.service_group_instance_id, request.service_instance_id
                ))
            })?;
        service.status = request.status;
        service.endpoints = request.endpoints;
        service.deployed_on_cluster_id = request.deployed_on_cluster_id;
        group.status = ServiceStatus::aggregate(group.service_instances.iter().map(|s| s.status));
        let group_status = group.status;

        let stored = self.store_aggregate(&instance)?;
        debug!(
            app_instance_id = %request.app_instance_id,
            service_instance_id = %request.service_instance_id,
            status = ?request.status,
            group_status = ?group_status,
            "service status updated"
        );
        Ok(stored)
    }

    pub fn update_service_group_metadata(
        &self,
        organization_id: &str,
        app_instance_id: &str,
        service_group_instance_id: &str,
        available_replicas: u32,
        unavailable_replicas: u32,
    ) -> RegistryResult<ServiceGroupInstance> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("app_instance_id", app_instance_id)?;
        validation::validate_identifier("service_group_instance_id", service_group_instance_id)?;
        let mut instance = self.get_instance(organization_id, app_instance_id)?;
        let group = instance
            .groups
            .iter_mut()
            .find(|g| g.service_group_instance_id == service_group_instance_id)
            .ok_or_else(|| {
                RegistryError::not_found(format!(
                    "service group instance {service_group_instance_id} in instance {app_instance_id}"
                ))
            })?;
        group.metadata.available_replicas = available_replicas;
        group.metadata.unavailable_replicas = unavailable_replicas;
        let updated = group.clone();

        self.store_aggregate(&instance)?;
        Ok(updated)
    }

    pub fn update_instance_status(
        &self,
        organization_id: &str,
        app_instance_id: &str,
        status: ApplicationStatus,
    ) -> RegistryResult<AppInstance> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("app_instance_id", app_instance_id)?;
        let mut instance = self.get_instance(organization_id, app_instance_id)?;
        let previous = instance.status;
        instance.status = status;
        let stored = self.store_aggregate(&instance)?;
        info!(%organization_id, %app_instance_id, from = ?previous, to = ?status, "instance status changed");
        Ok(stored)
    }

    /// Drop every service group instance, as on undeploy.
    pub fn remove_service_group_instances(
        &self,
        organization_id: &str,
        app_instance_id: &str,
    ) -> RegistryResult<AppInstance> {
        validation::validate_identifier("organization_id", organization_id)?;
        validation::validate_identifier("app_instance_id", app_instance_id)?;
        let mut instance = self.get_instance(organization_id, app_instance_id)?;
        let removed = instance.groups.len();
        instance.groups.clear();
        let stored = self.store_aggregate(&instance)?;
        info!(%organization_id, %app_instance_id, removed, "service group instances removed");
        Ok(stored)
    }
}
