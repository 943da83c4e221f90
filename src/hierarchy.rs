//! Structure hierarchy index and consistency checking.
//!
//! The hierarchy arrives as a flat list of [`Region`]s whose parent links are
//! encoded in `structure_id_path`. [`StructureTree`] indexes it as an arena
//! keyed by id, with child lookups in input order. Building the tree runs the
//! full consistency check, so malformed hierarchies are rejected before any
//! filtering or persistence happens.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::types::Region;

/// Error type for malformed structure hierarchies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    /// Two regions share an id.
    #[error("duplicate region id {0}")]
    DuplicateId(u32),
    /// `structure_id_path` is empty or does not end with the region's own id.
    #[error("region {0} has a structure_id_path that does not end with its own id")]
    PathMismatch(u32),
    /// A parent id is referenced but never defined.
    #[error("region {id} references missing parent {parent}")]
    DanglingParent {
        /// The region with the broken link.
        id: u32,
        /// The undefined parent id.
        parent: u32,
    },
    /// No region qualifies as a root.
    #[error("hierarchy has no root region")]
    NoRoot,
    /// A region is unreachable from any root, i.e. its parent chain loops.
    #[error("region {0} is part of a parent cycle")]
    Cycle(u32),
}

/// Arena index over a region list, supporting child lookup by id.
#[derive(Debug, Clone)]
pub struct StructureTree {
    children: HashMap<u32, Vec<u32>>,
    roots: Vec<u32>,
}

impl StructureTree {
    /// Index a region list, validating it first via [`check_consistency`].
    pub fn build(regions: &[Region]) -> Result<Self, HierarchyError> {
        check_consistency(regions)?;

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        let mut roots = Vec::new();
        for region in regions {
            children.entry(region.id).or_default();
            match region.parent_id() {
                Some(parent) => children.entry(parent).or_default().push(region.id),
                None => roots.push(region.id),
            }
        }
        Ok(Self { children, roots })
    }

    /// Child ids of `id`, in input order. Empty for leaves and unknown ids.
    pub fn children(&self, id: u32) -> &[u32] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root ids, in input order.
    pub fn roots(&self) -> &[u32] {
        &self.roots
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: u32) -> bool {
        self.children.contains_key(&id)
    }
}

/// Validate a region list: unique ids, well-formed paths, resolvable parents,
/// at least one root, and no parent cycles.
pub fn check_consistency(regions: &[Region]) -> Result<(), HierarchyError> {
    let mut ids = HashSet::with_capacity(regions.len());
    for region in regions {
        if !ids.insert(region.id) {
            return Err(HierarchyError::DuplicateId(region.id));
        }
        if region.structure_id_path.last() != Some(&region.id) {
            return Err(HierarchyError::PathMismatch(region.id));
        }
    }

    // Child adjacency in input order; BTreeMap keeps error reporting stable.
    let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut roots = Vec::new();
    for region in regions {
        match region.parent_id() {
            Some(parent) => {
                if !ids.contains(&parent) {
                    return Err(HierarchyError::DanglingParent {
                        id: region.id,
                        parent,
                    });
                }
                children.entry(parent).or_default().push(region.id);
            }
            None => roots.push(region.id),
        }
    }
    if roots.is_empty() {
        return Err(HierarchyError::NoRoot);
    }

    // Everything must be reachable from a root, otherwise the parent links
    // close a cycle somewhere off-tree.
    let mut visited = HashSet::with_capacity(regions.len());
    let mut stack = roots;
    while let Some(id) = stack.pop() {
        if visited.insert(id) {
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().copied());
            }
        }
    }
    if visited.len() != regions.len() {
        let stranded = regions
            .iter()
            .map(|r| r.id)
            .find(|id| !visited.contains(id))
            .expect("visited is a strict subset of region ids");
        return Err(HierarchyError::Cycle(stranded));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: u32, path: Vec<u32>) -> Region {
        Region::new(id, format!("r{id}"), format!("region {id}"), path)
    }

    #[test]
    fn test_build_indexes_children_in_input_order() {
        let regions = vec![
            region(1, vec![1]),
            region(3, vec![1, 3]),
            region(2, vec![1, 2]),
            region(4, vec![1, 3, 4]),
        ];
        let tree = StructureTree::build(&regions).unwrap();

        assert_eq!(tree.roots(), &[1]);
        assert_eq!(tree.children(1), &[3, 2]);
        assert_eq!(tree.children(3), &[4]);
        assert!(tree.children(4).is_empty());
        assert!(tree.contains(2));
        assert!(!tree.contains(99));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let regions = vec![region(1, vec![1]), region(1, vec![1])];
        assert_eq!(
            check_consistency(&regions),
            Err(HierarchyError::DuplicateId(1))
        );
    }

    #[test]
    fn test_path_must_end_with_own_id() {
        let regions = vec![region(1, vec![1]), region(2, vec![1, 3])];
        assert_eq!(
            check_consistency(&regions),
            Err(HierarchyError::PathMismatch(2))
        );
    }

    #[test]
    fn test_dangling_parent_rejected() {
        let regions = vec![region(1, vec![1]), region(2, vec![42, 2])];
        assert_eq!(
            check_consistency(&regions),
            Err(HierarchyError::DanglingParent { id: 2, parent: 42 })
        );
    }

    #[test]
    fn test_cycle_rejected() {
        // 2 and 3 are each other's parents; 1 is a valid root so the cycle
        // is only detectable through reachability.
        let regions = vec![
            region(1, vec![1]),
            region(2, vec![3, 2]),
            region(3, vec![2, 3]),
        ];
        assert_eq!(check_consistency(&regions), Err(HierarchyError::Cycle(2)));
    }

    #[test]
    fn test_no_root_rejected() {
        let regions = vec![region(2, vec![3, 2]), region(3, vec![2, 3])];
        assert_eq!(check_consistency(&regions), Err(HierarchyError::NoRoot));
    }

    #[test]
    fn test_forest_with_two_roots_accepted() {
        let regions = vec![region(1, vec![1]), region(5, vec![5]), region(2, vec![1, 2])];
        let tree = StructureTree::build(&regions).unwrap();
        assert_eq!(tree.roots(), &[1, 5]);
    }
}
