use std::path::Path;

use anyhow::Context;
use sysmodel_core::{AddDescriptorRequest, Registry};

use super::print_json;

/// Read an `AddDescriptorRequest` from JSON. The file's organization, if
/// any, is replaced by `org`.
pub fn add(registry: &Registry, org: String, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mut request: AddDescriptorRequest = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    request.organization_id = org;

    let descriptor = registry.application_manager().add_descriptor(request)?;
    print_json(&descriptor)
}

pub fn list(registry: &Registry, org: &str) -> anyhow::Result<()> {
    print_json(&registry.application_manager().list_descriptors(org)?)
}
