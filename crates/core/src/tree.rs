//! Persistent tree operations over the scene/shot hierarchy.
//!
//! The storyboard is a forest of [`Arc<Scene>`] nodes. Updates are
//! copy-on-write: [`update`] re-allocates only the nodes on the path
//! from a root to the target and returns a new forest, while every
//! untouched subtree keeps its original `Arc`. Callers relying on
//! pointer identity for change detection can compare with
//! [`Arc::ptr_eq`].

use std::sync::Arc;

use crate::scene::{Scene, SceneId};

/// Depth-first pre-order search for a node by id.
pub fn find(roots: &[Arc<Scene>], id: SceneId) -> Option<&Arc<Scene>> {
    for root in roots {
        if root.id == id {
            return Some(root);
        }
        if let Some(found) = find(&root.shots, id) {
            return Some(found);
        }
    }
    None
}

/// Return a new forest where the node matching `id` has been replaced
/// by `f(node)`. All ancestors of the changed node are re-allocated;
/// siblings and unrelated subtrees are shared unchanged.
///
/// Returns `None` when no node matches `id` (the forest is unchanged).
pub fn update<F>(roots: &[Arc<Scene>], id: SceneId, f: F) -> Option<Vec<Arc<Scene>>>
where
    F: FnOnce(&Scene) -> Scene,
{
    let mut f = Some(f);
    update_inner(roots, id, &mut f)
}

fn update_inner<F>(roots: &[Arc<Scene>], id: SceneId, f: &mut Option<F>) -> Option<Vec<Arc<Scene>>>
where
    F: FnOnce(&Scene) -> Scene,
{
    for (i, root) in roots.iter().enumerate() {
        if root.id == id {
            let apply = f.take()?;
            let replaced = Arc::new(apply(root));
            return Some(splice(roots, i, replaced));
        }
        if let Some(new_shots) = update_inner(&root.shots, id, f) {
            let mut parent = Scene::clone(root);
            parent.shots = new_shots;
            return Some(splice(roots, i, Arc::new(parent)));
        }
    }
    None
}

/// Rebuild a sibling list with the node at `index` replaced.
/// All other entries are `Arc`-shared.
fn splice(siblings: &[Arc<Scene>], index: usize, replacement: Arc<Scene>) -> Vec<Arc<Scene>> {
    siblings
        .iter()
        .enumerate()
        .map(|(j, s)| {
            if j == index {
                Arc::clone(&replacement)
            } else {
                Arc::clone(s)
            }
        })
        .collect()
}

/// Flatten the forest into a deterministic pre-order list of every node
/// at every depth.
pub fn flatten(roots: &[Arc<Scene>]) -> Vec<Arc<Scene>> {
    let mut out = Vec::new();
    flatten_into(roots, &mut out);
    out
}

fn flatten_into(roots: &[Arc<Scene>], out: &mut Vec<Arc<Scene>>) {
    for root in roots {
        out.push(Arc::clone(root));
        flatten_into(&root.shots, out);
    }
}

/// Return a new forest with the node matching `id` (and its entire
/// subtree) removed. Ancestors of the removed node are re-allocated;
/// everything else is shared. Returns `None` when the id is absent.
pub fn remove(roots: &[Arc<Scene>], id: SceneId) -> Option<Vec<Arc<Scene>>> {
    for (i, root) in roots.iter().enumerate() {
        if root.id == id {
            let mut out: Vec<Arc<Scene>> = Vec::with_capacity(roots.len() - 1);
            out.extend(roots[..i].iter().cloned());
            out.extend(roots[i + 1..].iter().cloned());
            return Some(out);
        }
        if let Some(new_shots) = remove(&root.shots, id) {
            let mut parent = Scene::clone(root);
            parent.shots = new_shots;
            return Some(splice(roots, i, Arc::new(parent)));
        }
    }
    None
}

/// Apply `f` to every node in the forest, rebuilding it unconditionally.
///
/// Unlike [`update`] this touches all nodes, so no structural sharing is
/// preserved. Used by stop-all to reset volatile state tree-wide.
pub fn map_all<F>(roots: &[Arc<Scene>], f: &F) -> Vec<Arc<Scene>>
where
    F: Fn(&mut Scene),
{
    roots
        .iter()
        .map(|root| {
            let mut node = Scene::clone(root);
            f(&mut node);
            node.shots = map_all(&node.shots, f);
            Arc::new(node)
        })
        .collect()
}
