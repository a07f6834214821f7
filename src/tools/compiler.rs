//! Derivation augmentation pass run once when a tool set is compiled.

use crate::tools::derivation::DerivationRegistry;
use crate::tools::params::{ParameterLocation, ToolDefinition, ToolParameterSpec};
use serde_json::json;
use std::collections::HashMap;

/// Injects derived-parameter slots into every definition that declares a
/// registered source parameter. Returns the number of slots injected.
///
/// Single pass: slots injected here are not scanned as sources again, so a
/// derived field cannot itself feed another derivation.
pub fn augment(definitions: &mut [ToolDefinition], registry: &DerivationRegistry) -> usize {
    if registry.is_empty() {
        return 0;
    }

    let known_locations = sibling_locations(definitions);
    let mut injected = 0;

    for definition in definitions.iter_mut() {
        let sources: Vec<String> = definition
            .execute
            .params
            .iter()
            .filter(|p| !p.is_derived() && registry.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();

        for source in sources {
            let Some(transformer) = registry.get(&source) else {
                continue;
            };

            for target in transformer.targets() {
                if definition.execute.param(target).is_some() {
                    continue;
                }

                let location = known_locations
                    .get(target)
                    .copied()
                    .unwrap_or(ParameterLocation::Body);

                definition
                    .execute
                    .params
                    .push(ToolParameterSpec::derived(target, location, source.as_str()));
                definition.insert_property(
                    target,
                    json!({
                        "type": "string",
                        "description": format!("Derived from {}", source),
                    }),
                );
                injected += 1;

                tracing::debug!(
                    tool = %definition.name,
                    source = %source,
                    field = target,
                    ?location,
                    "Injected derived parameter"
                );
            }
        }
    }

    injected
}

/// First declared location of every parameter name across the tool set.
fn sibling_locations(definitions: &[ToolDefinition]) -> HashMap<String, ParameterLocation> {
    let mut locations = HashMap::new();
    for param in definitions.iter().flat_map(|d| d.execute.params.iter()) {
        locations
            .entry(param.name.clone())
            .or_insert(param.location);
    }
    locations
}
