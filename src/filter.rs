//! Pruning of structures absent from the annotation volume.
//!
//! A region survives iff its own id appears as a voxel value in the
//! annotation, or some descendant survives by the same rule. Presence is
//! computed bottom-up over the hierarchy (leaves first, parents fold their
//! children), so each node is resolved exactly once even on deep or heavily
//! shared subtrees.

use std::collections::{HashMap, HashSet};

use ndarray::Array3;

use crate::hierarchy::{HierarchyError, StructureTree};
use crate::types::Region;

/// Filter out regions that are not present in the annotation volume, directly
/// or through a descendant. Input order is preserved.
///
/// Every removed region is logged (id + name); no removal is silent. The root
/// gets no special exemption: a hierarchy whose root has zero voxels anywhere
/// in its subtree filters down to nothing.
pub fn filter_structures_not_present(
    regions: &[Region],
    annotation: &Array3<u32>,
) -> Result<Vec<Region>, HierarchyError> {
    let present_ids: HashSet<u32> = annotation.iter().copied().collect();
    let tree = StructureTree::build(regions)?;
    let presence = compute_presence(&tree, &present_ids);

    let mut kept = Vec::with_capacity(regions.len());
    for region in regions {
        if presence.get(&region.id).copied().unwrap_or(false) {
            kept.push(region.clone());
        } else {
            tracing::info!(
                id = region.id,
                name = %region.name,
                "removed structure not present in annotation"
            );
        }
    }
    Ok(kept)
}

/// Post-order presence computation: a node is present if its id is a voxel
/// value or any child is present.
fn compute_presence(tree: &StructureTree, present_ids: &HashSet<u32>) -> HashMap<u32, bool> {
    let mut memo: HashMap<u32, bool> = HashMap::new();
    for &root in tree.roots() {
        let mut stack = vec![(root, false)];
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                let present = present_ids.contains(&id)
                    || tree
                        .children(id)
                        .iter()
                        .any(|child| memo.get(child).copied().unwrap_or(false));
                memo.insert(id, present);
            } else if !memo.contains_key(&id) {
                stack.push((id, true));
                for &child in tree.children(id) {
                    stack.push((child, false));
                }
            }
        }
    }
    memo
}
