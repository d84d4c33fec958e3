//! Representations: host-side owners of render objects with selection
//! semantics.
//!
//! The canvas never inspects what a representation draws. It diffs the
//! render-object sets it is given, forwards marking actions, and asks each
//! representation to resolve pick results into loci.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::picking::PickingId;
use crate::scene::{GraphicsRenderObject, ObjectId};

/// Stable representation identity.
pub type ReprId = u32;

/// How a marking request changes the marked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerAction {
    /// Highlight the loci.
    Highlight,
    /// Remove highlight from the loci.
    RemoveHighlight,
    /// Select the loci.
    Select,
    /// Deselect the loci.
    Deselect,
    /// Flip selection of the loci.
    Toggle,
    /// Clear all marking.
    Clear,
}

/// A set of pickable elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Loci {
    /// Nothing.
    #[default]
    Empty,
    /// Everything a representation draws.
    Every,
    /// Groups of one instance of one render object.
    Groups {
        /// Render object.
        object_id: ObjectId,
        /// Instance within the object.
        instance_id: u32,
        /// Group ids.
        groups: Vec<u32>,
    },
}

impl Loci {
    /// Whether the loci selects nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Every => false,
            Self::Groups { groups, .. } => groups.is_empty(),
        }
    }
}

/// Loci scoped to one representation, or to all when `repr` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReprLoci {
    /// Owning representation.
    pub repr: Option<ReprId>,
    /// Elements.
    pub loci: Loci,
}

/// Host-provided bundle of render objects.
pub trait Representation {
    /// Stable identity. Adding a representation with a known id replaces
    /// the previous one.
    fn id(&self) -> ReprId;

    /// Render objects currently making up the representation.
    fn render_objects(&self) -> Vec<Rc<dyn GraphicsRenderObject>>;

    /// Elements behind a pick result, `None` if the id is not ours.
    fn get_loci(&self, id: &PickingId) -> Option<Loci>;

    /// Apply `action` to `loci`. Returns whether any marker changed; the
    /// canvas then re-syncs this representation's renderables.
    fn mark(&mut self, loci: &Loci, action: MarkerAction) -> bool;
}

struct ReprEntry {
    repr: Box<dyn Representation>,
    objects: Vec<Rc<dyn GraphicsRenderObject>>,
}

/// Scene mutations produced by a registry change.
#[derive(Default)]
pub struct ReprDiff {
    /// Objects to add.
    pub added: Vec<Rc<dyn GraphicsRenderObject>>,
    /// Objects to remove.
    pub removed: Vec<Rc<dyn GraphicsRenderObject>>,
}

/// Registered representations in insertion order.
#[derive(Default)]
pub struct ReprRegistry {
    entries: Vec<ReprEntry>,
    index: FxHashMap<ReprId, usize>,
}

impl std::fmt::Debug for ReprRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReprRegistry")
            .field("reprs", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ReprRegistry {
    /// Number of representations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ReprId) -> bool {
        self.index.contains_key(&id)
    }

    /// Register or replace `repr`, returning only the render objects that
    /// were added or dropped relative to the previous registration.
    pub fn insert(&mut self, repr: Box<dyn Representation>) -> ReprDiff {
        let objects = repr.render_objects();
        let id = repr.id();
        let Some(&i) = self.index.get(&id) else {
            let _ = self.index.insert(id, self.entries.len());
            let diff = ReprDiff {
                added: objects.clone(),
                removed: Vec::new(),
            };
            self.entries.push(ReprEntry { repr, objects });
            return diff;
        };
        let entry = &mut self.entries[i];
        let old: FxHashSet<ObjectId> = entry.objects.iter().map(|o| o.id()).collect();
        let new: FxHashSet<ObjectId> = objects.iter().map(|o| o.id()).collect();
        let diff = ReprDiff {
            added: objects.iter().filter(|o| !old.contains(&o.id())).cloned().collect(),
            removed: entry
                .objects
                .iter()
                .filter(|o| !new.contains(&o.id()))
                .cloned()
                .collect(),
        };
        *entry = ReprEntry { repr, objects };
        diff
    }

    /// Unregister `id`, returning its render objects.
    pub fn remove(&mut self, id: ReprId) -> Vec<Rc<dyn GraphicsRenderObject>> {
        let Some(i) = self.index.remove(&id) else {
            return Vec::new();
        };
        let entry = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        entry.objects
    }

    /// Unregister everything, returning every render object.
    pub fn clear(&mut self) -> Vec<Rc<dyn GraphicsRenderObject>> {
        self.index.clear();
        self.entries.drain(..).flat_map(|e| e.objects).collect()
    }

    /// Every registered render object.
    pub fn objects(&self) -> impl Iterator<Item = &Rc<dyn GraphicsRenderObject>> {
        self.entries.iter().flat_map(|e| e.objects.iter())
    }

    /// Render object ids of `id`, or of all representations.
    #[must_use]
    pub fn object_ids(&self, id: Option<ReprId>) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|e| id.is_none_or(|id| e.repr.id() == id))
            .flat_map(|e| e.objects.iter().map(|o| o.id()))
            .collect()
    }

    /// First representation that claims `picking_id`, with its loci.
    #[must_use]
    pub fn get_loci(&self, picking_id: &PickingId) -> Option<ReprLoci> {
        self.entries.iter().find_map(|e| {
            e.repr
                .get_loci(picking_id)
                .filter(|loci| !loci.is_empty())
                .map(|loci| ReprLoci {
                    repr: Some(e.repr.id()),
                    loci,
                })
        })
    }

    /// Forward a marking action. Returns the representations whose markers
    /// changed.
    pub fn mark(&mut self, target: &ReprLoci, action: MarkerAction) -> Vec<ReprId> {
        if target.loci.is_empty() && action != MarkerAction::Clear {
            return Vec::new();
        }
        let mut changed = Vec::new();
        for entry in &mut self.entries {
            let id = entry.repr.id();
            if target.repr.is_some_and(|r| r != id) {
                continue;
            }
            if entry.repr.mark(&target.loci, action) {
                changed.push(id);
            }
        }
        changed
    }
}


#[cfg(test)]
mod tests {
    use super::test_repr::TestRepr;
    use super::*;

    fn ids(objects: &[Rc<dyn GraphicsRenderObject>]) -> Vec<ObjectId> {
        let mut ids: Vec<_> = objects.iter().map(|o| o.id()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn reinsert_yields_only_differences() {
        let mut registry = ReprRegistry::default();
        let diff = registry.insert(Box::new(TestRepr::new(1, &[10, 11])));
        assert_eq!(ids(&diff.added), vec![10, 11]);
        assert!(diff.removed.is_empty());

        let diff = registry.insert(Box::new(TestRepr::new(1, &[11, 12])));
        assert_eq!(ids(&diff.added), vec![12]);
        assert_eq!(ids(&diff.removed), vec![10]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut registry = ReprRegistry::default();
        let _ = registry.insert(Box::new(TestRepr::new(1, &[10])));
        let _ = registry.insert(Box::new(TestRepr::new(2, &[20])));
        let _ = registry.insert(Box::new(TestRepr::new(3, &[30])));
        assert_eq!(ids(&registry.remove(1)), vec![10]);
        assert!(registry.remove(1).is_empty());
        assert_eq!(registry.object_ids(Some(3)), vec![30]);
        assert_eq!(ids(&registry.remove(3)), vec![30]);
        assert_eq!(registry.object_ids(None), vec![20]);
    }

    #[test]
    fn loci_resolve_to_the_owning_repr() {
        let mut registry = ReprRegistry::default();
        let _ = registry.insert(Box::new(TestRepr::new(1, &[10])));
        let _ = registry.insert(Box::new(TestRepr::new(2, &[20])));
        let hit = PickingId {
            object_id: 20,
            instance_id: 0,
            group_id: 5,
        };
        let loci = registry.get_loci(&hit).unwrap();
        assert_eq!(loci.repr, Some(2));
        assert!(!loci.loci.is_empty());
        let miss = PickingId { object_id: 99, ..hit };
        assert!(registry.get_loci(&miss).is_none());
    }

    #[test]
    fn mark_targets_one_or_all() {
        let mut registry = ReprRegistry::default();
        let a = TestRepr::new(1, &[10]);
        let a_actions = Rc::clone(&a.actions);
        let _ = registry.insert(Box::new(a));
        let _ = registry.insert(Box::new(TestRepr::new(2, &[20])));

        let one = ReprLoci {
            repr: Some(2),
            loci: Loci::Every,
        };
        assert_eq!(registry.mark(&one, MarkerAction::Select), vec![2]);
        assert!(a_actions.borrow().is_empty());

        let empty = ReprLoci::default();
        assert!(registry.mark(&empty, MarkerAction::Highlight).is_empty());
        assert_eq!(registry.mark(&empty, MarkerAction::Clear), vec![1, 2]);
        assert_eq!(*a_actions.borrow(), vec![MarkerAction::Clear]);
    }
}
