//! Pre-build attribute resolution
//!
//! Some attributes are not statically known when the graph is configured:
//! which availability zones to spread the public subnets across, and which
//! machine image matches the configured filters. These are resolved once
//! per session, before the topological walk, and written into the affected
//! nodes. Resolution is never retried; any failure aborts the whole build.

use crate::error::BuildError;
use crate::gateway::{DescribeAnswer, DescribeQuery, ProviderGateway};
use crate::graph::{DependencyGraph, ImageSelector, ResourceSpec};
use tracing::{debug, info};

pub(crate) async fn resolve<G: ProviderGateway>(
    graph: &mut DependencyGraph,
    gateway: &G,
) -> Result<(), BuildError> {
    let zones_needed = graph
        .nodes()
        .filter_map(|n| match &n.spec {
            ResourceSpec::Subnet {
                zone_slot: Some(slot),
                ..
            } => Some(slot + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    let mut selectors: Vec<ImageSelector> = Vec::new();
    for node in graph.nodes() {
        if let ResourceSpec::Instance {
            image,
            image_id: None,
            ..
        } = &node.spec
        {
            if !selectors.contains(image) {
                selectors.push(image.clone());
            }
        }
    }

    if zones_needed == 0 && selectors.is_empty() {
        debug!("nothing to resolve");
        return Ok(());
    }

    let zones = if zones_needed > 0 {
        let answer = gateway
            .describe(DescribeQuery::AvailabilityZones {
                count: zones_needed,
            })
            .await
            .map_err(|e| BuildError::Resolution(format!("availability zones: {e:#}")))?;
        match answer {
            DescribeAnswer::Zones(zones) if zones.len() >= zones_needed => zones,
            DescribeAnswer::Zones(zones) => {
                return Err(BuildError::Resolution(format!(
                    "needed {zones_needed} distinct availability zones, provider returned {}",
                    zones.len()
                )));
            }
            other => {
                return Err(BuildError::Resolution(format!(
                    "unexpected answer to zone query: {other:?}"
                )));
            }
        }
    } else {
        Vec::new()
    };

    let mut images: Vec<(ImageSelector, String)> = Vec::with_capacity(selectors.len());
    for selector in selectors {
        let answer = gateway
            .describe(DescribeQuery::ImageByFilters {
                name_pattern: selector.name_pattern.clone(),
                architecture: selector.architecture.clone(),
            })
            .await
            .map_err(|e| BuildError::Resolution(format!("image lookup: {e:#}")))?;
        match answer {
            DescribeAnswer::ImageId(id) => {
                info!(
                    image = %id,
                    pattern = %selector.name_pattern,
                    "resolved machine image"
                );
                images.push((selector, id));
            }
            other => {
                return Err(BuildError::Resolution(format!(
                    "unexpected answer to image query: {other:?}"
                )));
            }
        }
    }

    // Write results into the affected nodes; attributes are immutable from
    // here on.
    let names: Vec<String> = graph.creation_order().to_vec();
    for name in names {
        match &mut graph.node_mut(&name).spec {
            ResourceSpec::Subnet {
                zone_slot: Some(slot),
                zone,
                ..
            } => {
                *zone = Some(zones[*slot].clone());
            }
            ResourceSpec::Instance {
                image,
                image_id: image_id @ None,
                ..
            } => {
                let resolved = images
                    .iter()
                    .find(|(sel, _)| sel == image)
                    .map(|(_, id)| id.clone());
                *image_id = resolved;
            }
            _ => {}
        }
    }

    if zones_needed > 0 {
        info!(zones = ?&zones[..zones_needed], "resolved availability zones");
    }
    Ok(())
}
