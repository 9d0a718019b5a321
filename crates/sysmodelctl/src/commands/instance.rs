use serde::Serialize;
use sysmodel_core::{AddInstanceRequest, Registry};
use sysmodel_state::{AppInstance, ParametrizedDescriptor};

use super::print_json;

#[derive(Serialize)]
struct InstanceView {
    instance: AppInstance,
    parametrized_descriptor: ParametrizedDescriptor,
}

pub fn add(registry: &Registry, org: String, descriptor: String, name: String) -> anyhow::Result<()> {
    let instance = registry.application_manager().add_instance(AddInstanceRequest {
        organization_id: org,
        app_descriptor_id: descriptor,
        name,
        ..Default::default()
    })?;
    print_json(&instance)
}

/// Print the instance aggregate together with the descriptor snapshot it
/// deploys from.
pub fn show(registry: &Registry, org: &str, instance: &str) -> anyhow::Result<()> {
    let apps = registry.application_manager();
    let view = InstanceView {
        instance: apps.get_instance(org, instance)?,
        parametrized_descriptor: apps.get_parametrized_descriptor(org, instance)?,
    };
    print_json(&view)
}

pub fn remove(registry: &Registry, org: &str, instance: &str) -> anyhow::Result<()> {
    registry.application_manager().remove_instance(org, instance)?;
    println!("✓ Removed instance {instance}");
    Ok(())
}
