//! Pre-baked index buffers.
//!
//! A shader's index pattern is repeated once per instance, each copy offset
//! by `vertices_per_instance`. Indices are 16-bit, which bounds how many
//! instances one index buffer can address.

use super::Topology;

/// Primitive-restart sentinel for 16-bit strip topologies.
pub const RESTART_INDEX: u16 = u16::MAX;

const INDEX_SPACE: u32 = 1 << 16;

/// Instances one 16-bit index buffer can address.
///
/// Strip topologies lose the sentinel value from the index space.
pub fn instance_capacity(vertices_per_instance: u32, topology: Topology) -> u32 {
    assert!(vertices_per_instance > 0, "vertices_per_instance must be non-zero");
    let space = if topology.is_strip() { INDEX_SPACE - 1 } else { INDEX_SPACE };
    space / vertices_per_instance
}

/// Index pattern expanded for [`capacity`](Self::capacity) instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BakedIndices {
    pub indices: Vec<u16>,
    pub capacity: u32,
    pub indices_per_instance: u32,
}

/// Expands `pattern` for the full instance capacity.
///
/// Strip topologies get a restart sentinel after every instance unless the
/// pattern already ends with one.
pub fn bake_indices(pattern: &[u16], vertices_per_instance: u32, topology: Topology) -> BakedIndices {
    let capacity = instance_capacity(vertices_per_instance, topology);
    let terminate = topology.is_strip() && pattern.last() != Some(&RESTART_INDEX);
    let per_instance = pattern.len() + usize::from(terminate);

    let mut indices = Vec::with_capacity(capacity as usize * per_instance);
    for instance in 0..capacity {
        let base = instance * vertices_per_instance;
        indices.extend(pattern.iter().map(|&i| {
            if i == RESTART_INDEX { RESTART_INDEX } else { (base + u32::from(i)) as u16 }
        }));
        if terminate {
            indices.push(RESTART_INDEX);
        }
    }

    BakedIndices {
        indices,
        capacity,
        indices_per_instance: per_instance as u32,
    }
}
