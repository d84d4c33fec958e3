//! The set of renderables drawn each frame.
//!
//! Mutations go through a [`CommitQueue`] and are applied by
//! [`Scene::commit`], optionally under a time budget so a large scene can be
//! built across several frames. Aggregates the renderer needs every frame
//! (bounding spheres, marker/emissive/opacity averages) are computed lazily
//! and cached until a commit, an [`update`](Scene::update) or a visibility
//! change invalidates them.

/// Pending additions and removals.
pub mod commit_queue;
/// Host-side render objects.
pub mod object;
/// Renderable trait, values and state.
pub mod renderable;
#[cfg(test)]
pub(crate) mod test_support;

use std::cell::Cell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::error::CanvasError;
use crate::gpu::GpuContext;
use crate::math::{BoundaryHelper, Sphere3D};
use crate::util::hash::hash_ids;

pub use commit_queue::CommitQueue;
pub use object::{GraphicsRenderObject, ObjectId};
pub use renderable::{
    GeometryKind, InstanceCell, InstanceGrid, LodRange, MarkingType, PickType, PointStyle,
    RenderVariant, Renderable, RenderableId, RenderableState, RenderableValues, XrayShaded,
};

/// Queue operations applied between two time-budget checks.
const COMMIT_CHECK_INTERVAL: usize = 100;

/// Which renderables a pass iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Everything.
    All,
    /// Everything except direct volumes.
    Primitives,
    /// Direct volumes only.
    Volumes,
}

impl Group {
    /// Whether `renderable` belongs to the group.
    #[must_use]
    pub fn contains(self, renderable: &dyn Renderable) -> bool {
        let volume = renderable.values().geometry_kind.value() == GeometryKind::DirectVolume;
        match self {
            Self::All => true,
            Self::Primitives => !volume,
            Self::Volumes => volume,
        }
    }
}

/// Weights applied to the opacity of renderables whose blending is
/// inherently soft (x-ray, fuzzy points, text, images) when averaging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct OpacityWeights {
    /// Weight for x-ray shaded renderables.
    pub xray: f32,
    /// Weight for fuzzy point sprites.
    pub fuzzy: f32,
    /// Weight for text.
    pub text: f32,
    /// Weight for images.
    pub image: f32,
}

impl Default for OpacityWeights {
    fn default() -> Self {
        Self {
            xray: 0.5,
            fuzzy: 0.5,
            text: 0.5,
            image: 0.5,
        }
    }
}

impl OpacityWeights {
    /// Product of the weights of every soft-blending trait the values carry.
    fn weight(&self, values: &RenderableValues) -> f32 {
        let mut weight = 1.0;
        if values.xray_shaded.value().is_on() {
            weight *= self.xray;
        }
        if values.point_style.value() == PointStyle::Fuzzy {
            weight *= self.fuzzy;
        }
        match values.geometry_kind.value() {
            GeometryKind::Text => weight *= self.text,
            GeometryKind::Image => weight *= self.image,
            _ => {}
        }
        weight
    }
}

/// Lazily computed aggregate. `None` means dirty.
#[derive(Debug, Default)]
struct Cached<T: Copy>(Cell<Option<T>>);

impl<T: Copy> Cached<T> {
    fn get_or(&self, compute: impl FnOnce() -> T) -> T {
        if let Some(v) = self.0.get() {
            return v;
        }
        let v = compute();
        self.0.set(Some(v));
        v
    }

    fn invalidate(&self) {
        self.0.set(None);
    }
}

/// Cached per-scene aggregates.
#[derive(Debug, Default)]
struct Aggregates {
    bounding_sphere: Cached<Sphere3D>,
    bounding_sphere_visible: Cached<Sphere3D>,
    marker_average: Cached<f32>,
    emissive_average: Cached<f32>,
    opacity_average: Cached<f32>,
    transparency_min: Cached<f32>,
    has_opaque: Cached<bool>,
}

impl Aggregates {
    fn invalidate_averages(&self) {
        self.marker_average.invalidate();
        self.emissive_average.invalidate();
        self.opacity_average.invalidate();
        self.transparency_min.invalidate();
        self.has_opaque.invalidate();
    }

    fn invalidate_visible(&self) {
        self.bounding_sphere_visible.invalidate();
        self.invalidate_averages();
    }

    fn invalidate_all(&self) {
        self.bounding_sphere.invalidate();
        self.invalidate_visible();
    }
}

/// A committed renderable and the object it was built from.
pub struct SceneEntry {
    /// Identity of the source object.
    pub object_id: ObjectId,
    /// The drawable.
    pub renderable: Box<dyn Renderable>,
}

/// Ordered renderables plus the commit queue feeding them.
pub struct Scene {
    entries: Vec<SceneEntry>,
    index: FxHashMap<ObjectId, RenderableId>,
    queue: CommitQueue,
    next_renderable_id: RenderableId,
    needs_sort: bool,
    visible_hash: u64,
    opacity_weights: OpacityWeights,
    aggregates: Aggregates,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(OpacityWeights::default())
    }
}

impl Scene {
    /// Empty scene.
    #[must_use]
    pub fn new(opacity_weights: OpacityWeights) -> Self {
        Self {
            entries: Vec::new(),
            index: FxHashMap::default(),
            queue: CommitQueue::new(),
            next_renderable_id: 0,
            needs_sort: false,
            visible_hash: hash_ids(std::iter::empty()),
            opacity_weights,
            aggregates: Aggregates::default(),
        }
    }

    /// Replace the opacity weights used by
    /// [`opacity_average`](Self::opacity_average).
    pub fn set_opacity_weights(&mut self, weights: OpacityWeights) {
        if weights != self.opacity_weights {
            self.opacity_weights = weights;
            self.aggregates.opacity_average.invalidate();
        }
    }

    /// Queue `object` for addition.
    pub fn add(&mut self, object: Rc<dyn GraphicsRenderObject>) {
        self.queue.add(object);
    }

    /// Queue `object` for removal.
    pub fn remove(&mut self, object: Rc<dyn GraphicsRenderObject>) {
        self.queue.remove(object);
    }

    /// Whether `object` is committed.
    #[must_use]
    pub fn has(&self, object: ObjectId) -> bool {
        self.index.contains_key(&object)
    }

    /// Whether queued work is waiting for [`commit`](Self::commit).
    #[must_use]
    pub fn needs_commit(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of queued operations.
    #[must_use]
    pub fn commit_queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Number of committed renderables.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Committed renderables in draw order.
    #[must_use]
    pub fn entries(&self) -> &[SceneEntry] {
        &self.entries
    }

    /// Mutable access to the committed renderables in draw order.
    pub fn entries_mut(&mut self) -> &mut [SceneEntry] {
        &mut self.entries
    }

    /// Renderables of `group`, in draw order.
    pub fn group(&self, group: Group) -> impl Iterator<Item = &dyn Renderable> {
        self.entries
            .iter()
            .map(|e| e.renderable.as_ref())
            .filter(move |r| group.contains(*r))
    }

    /// Renderable built from `object`.
    #[must_use]
    pub fn renderable(&self, object: ObjectId) -> Option<&dyn Renderable> {
        self.entry(object).map(|e| e.renderable.as_ref())
    }

    /// Mutable renderable built from `object`. Call
    /// [`update`](Self::update) after changing values.
    pub fn renderable_mut(&mut self, object: ObjectId) -> Option<&mut (dyn Renderable + 'static)> {
        let id = *self.index.get(&object)?;
        self.entries
            .iter_mut()
            .find(|e| e.renderable.id() == id)
            .map(|e| e.renderable.as_mut())
    }

    /// Call `f` for every committed renderable in draw order.
    pub fn for_each_renderable(&self, mut f: impl FnMut(ObjectId, &dyn Renderable)) {
        for entry in &self.entries {
            f(entry.object_id, entry.renderable.as_ref());
        }
    }

    fn entry(&self, object: ObjectId) -> Option<&SceneEntry> {
        let id = *self.index.get(&object)?;
        self.entries.iter().find(|e| e.renderable.id() == id)
    }

    /// Apply queued removals, then additions.
    ///
    /// With `max_time_ms`, stops once the budget is exceeded (checked every
    /// [`COMMIT_CHECK_INTERVAL`] operations) and returns `Ok(false)`; the
    /// rest stays queued. Returns `Ok(true)` once the queue is drained, at
    /// which point the renderables are sorted by program, material and id
    /// and every cached aggregate is invalidated.
    ///
    /// # Errors
    ///
    /// The first renderable creation failure. The failing object is dropped
    /// from the queue; everything already applied stays applied.
    pub fn commit(
        &mut self,
        ctx: &mut dyn GpuContext,
        max_time_ms: Option<f64>,
    ) -> Result<bool, CanvasError> {
        let start = Instant::now();
        let mut ops = 0_usize;
        let over_budget = |ops: usize| {
            max_time_ms.is_some_and(|max| {
                ops % COMMIT_CHECK_INTERVAL == 0
                    && start.elapsed().as_secs_f64() * 1000.0 > max
            })
        };

        while let Some(object) = self.queue.try_get_remove() {
            self.remove_now(ctx, object.id());
            ops += 1;
            if over_budget(ops) {
                self.aggregates.invalidate_all();
                return Ok(false);
            }
        }
        while let Some(object) = self.queue.try_get_add() {
            let added = self.add_now(ctx, object.as_ref());
            ops += 1;
            if let Err(err) = added {
                self.aggregates.invalidate_all();
                return Err(err);
            }
            if over_budget(ops) {
                self.aggregates.invalidate_all();
                return Ok(false);
            }
        }

        if ops > 0 || self.needs_sort {
            self.sort();
            self.aggregates.invalidate_all();
            log::debug!("scene commit applied {ops} ops, {} renderables", self.entries.len());
        }
        Ok(true)
    }

    fn add_now(
        &mut self,
        ctx: &mut dyn GpuContext,
        object: &dyn GraphicsRenderObject,
    ) -> Result<(), CanvasError> {
        let object_id = object.id();
        if self.index.contains_key(&object_id) {
            log::warn!("render object {object_id} is already in the scene");
            return Ok(());
        }
        let id = self.next_renderable_id;
        let renderable = object.create_renderable(ctx, id)?;
        self.next_renderable_id = self.next_renderable_id.wrapping_add(1);
        self.entries.push(SceneEntry {
            object_id,
            renderable,
        });
        let _ = self.index.insert(object_id, id);
        self.needs_sort = true;
        Ok(())
    }

    fn remove_now(&mut self, ctx: &mut dyn GpuContext, object: ObjectId) {
        let Some(id) = self.index.remove(&object) else {
            return;
        };
        if let Some(pos) = self.entries.iter().position(|e| e.renderable.id() == id) {
            let mut entry = self.entries.remove(pos);
            entry.renderable.dispose(ctx);
        }
        self.needs_sort = true;
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| {
            let r = &e.renderable;
            (
                r.program_id(RenderVariant::ColorBlended)
                    .map_or(u32::MAX, |p| p.0),
                r.material_id(),
                r.id(),
            )
        });
        self.needs_sort = false;
    }

    /// Push value changes of the given objects (all when `None`) to the GPU,
    /// re-derive their opacity flags and invalidate the aggregates. The
    /// bounding spheres are kept when `keep_bounding_sphere` is set, e.g.
    /// for marker-only changes.
    ///
    /// # Errors
    ///
    /// Backend errors from the renderables' uploads.
    pub fn update(
        &mut self,
        ctx: &mut dyn GpuContext,
        objects: Option<&[ObjectId]>,
        keep_bounding_sphere: bool,
    ) -> Result<(), CanvasError> {
        let ids: Option<Vec<RenderableId>> =
            objects.map(|o| o.iter().filter_map(|id| self.index.get(id).copied()).collect());
        for entry in &mut self.entries {
            let r = entry.renderable.as_mut();
            if ids.as_ref().is_some_and(|ids| !ids.contains(&r.id())) {
                continue;
            }
            r.update(ctx)?;
            let opaque = r.state().effective_alpha(r.values()) >= 1.0;
            r.state_mut().opaque = opaque;
        }
        if keep_bounding_sphere {
            self.aggregates.invalidate_averages();
        } else {
            self.aggregates.invalidate_all();
        }
        let _ = self.sync_visibility();
        Ok(())
    }

    /// Recompute the visible-set hash. Returns `true` (and invalidates the
    /// visibility-dependent aggregates) when it changed.
    pub fn sync_visibility(&mut self) -> bool {
        let hash = hash_ids(
            self.entries
                .iter()
                .filter(|e| e.renderable.state().visible)
                .map(|e| e.renderable.id()),
        );
        if hash == self.visible_hash {
            return false;
        }
        self.visible_hash = hash;
        self.aggregates.invalidate_visible();
        true
    }

    /// Dispose every renderable and drop all pending work.
    pub fn clear(&mut self, ctx: &mut dyn GpuContext) {
        for mut entry in self.entries.drain(..) {
            entry.renderable.dispose(ctx);
        }
        self.index.clear();
        self.queue = CommitQueue::new();
        self.needs_sort = false;
        self.visible_hash = hash_ids(std::iter::empty());
        self.aggregates.invalidate_all();
    }

    /// Bounds of every renderable that draws something.
    #[must_use]
    pub fn bounding_sphere(&self) -> Sphere3D {
        self.aggregates
            .bounding_sphere
            .get_or(|| self.fit_bounds(false))
    }

    /// Bounds of every visible renderable that draws something.
    #[must_use]
    pub fn bounding_sphere_visible(&self) -> Sphere3D {
        self.aggregates
            .bounding_sphere_visible
            .get_or(|| self.fit_bounds(true))
    }

    /// World bounds of each visible renderable that draws something.
    #[must_use]
    pub fn visible_spheres(&self) -> Vec<Sphere3D> {
        self.drawn_spheres(true)
    }

    fn drawn_spheres(&self, only_visible: bool) -> Vec<Sphere3D> {
        self.entries
            .iter()
            .map(|e| e.renderable.as_ref())
            .filter(|r| {
                (!only_visible || r.state().visible)
                    && r.values().draw_count.value() > 0
                    && r.values().bounding_sphere.value().radius > 0.0
            })
            .map(|r| r.values().bounding_sphere.value())
            .collect()
    }

    fn fit_bounds(&self, only_visible: bool) -> Sphere3D {
        let spheres = self.drawn_spheres(only_visible);
        if spheres.is_empty() {
            return Sphere3D::EMPTY;
        }
        let mut helper = BoundaryHelper::new();
        for s in &spheres {
            helper.include_sphere(s);
        }
        helper.finished_include_step();
        for s in &spheres {
            helper.radius_sphere(s);
        }
        helper.sphere()
    }

    fn visible_primitives(&self) -> impl Iterator<Item = &dyn Renderable> {
        self.group(Group::Primitives).filter(|r| r.state().visible)
    }

    fn visible_average(&self, value: impl Fn(&dyn Renderable) -> f32) -> f32 {
        let (sum, count) = self
            .visible_primitives()
            .fold((0.0, 0_u32), |(sum, count), r| (sum + value(r), count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Mean marker level over visible primitives, 0 when there are none.
    #[must_use]
    pub fn marker_average(&self) -> f32 {
        self.aggregates
            .marker_average
            .get_or(|| self.visible_average(|r| r.values().marker_average.value()))
    }

    /// Mean emissive level over visible primitives, 0 when there are none.
    #[must_use]
    pub fn emissive_average(&self) -> f32 {
        self.aggregates
            .emissive_average
            .get_or(|| self.visible_average(|r| r.values().emissive_average.value()))
    }

    /// Weighted mean opacity over visible primitives, 0 when there are none.
    ///
    /// Each renderable contributes `(1 - transparency_average) * alpha`,
    /// scaled by its [`OpacityWeights`] entry when it blends softly.
    #[must_use]
    pub fn opacity_average(&self) -> f32 {
        let weights = self.opacity_weights;
        self.aggregates.opacity_average.get_or(|| {
            self.visible_average(|r| {
                let values = r.values();
                let alpha = r.state().effective_alpha(values);
                (1.0 - values.transparency_average.value()) * alpha * weights.weight(values)
            })
        })
    }

    /// Lowest effective opacity among visible primitives that are at least
    /// partly transparent; 1 when every visible primitive is opaque.
    #[must_use]
    pub fn transparency_min(&self) -> f32 {
        self.aggregates.transparency_min.get_or(|| {
            self.visible_primitives()
                .map(|r| {
                    let values = r.values();
                    (1.0 - values.transparency_average.value()) * r.state().effective_alpha(values)
                })
                .filter(|opacity| *opacity < 1.0)
                .fold(1.0, f32::min)
        })
    }

    /// Whether any visible primitive has opaque parts.
    #[must_use]
    pub fn has_opaque(&self) -> bool {
        self.aggregates.has_opaque.get_or(|| {
            self.visible_primitives().any(|r| {
                let values = r.values();
                r.state().opaque
                    && values.transparency_average.value() < 1.0
                    && !values.xray_shaded.value().is_on()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::test_support::TestObject;
    use super::*;
    use crate::gpu::HeadlessContext;

    fn committed(objects: Vec<Rc<dyn GraphicsRenderObject>>) -> (Scene, HeadlessContext) {
        let mut ctx = HeadlessContext::new(64, 64);
        let mut scene = Scene::default();
        for o in objects {
            scene.add(o);
        }
        assert!(scene.commit(&mut ctx, None).unwrap());
        (scene, ctx)
    }

    #[test]
    fn commit_adds_and_removes() {
        let a = TestObject::rc(1);
        let (mut scene, mut ctx) = committed(vec![a.clone(), TestObject::rc(2)]);
        assert_eq!(scene.count(), 2);
        assert!(scene.has(1));
        scene.remove(a);
        assert!(scene.needs_commit());
        assert!(scene.commit(&mut ctx, None).unwrap());
        assert_eq!(scene.count(), 1);
        assert!(!scene.has(1));
        assert!(!scene.needs_commit());
    }

    #[test]
    fn add_then_remove_before_commit_is_a_no_op() {
        let (mut scene, mut ctx) = committed(vec![]);
        let created = TestObject::new(5);
        let counter = created.created.clone();
        let object = created.into_rc();
        scene.add(object.clone());
        scene.remove(object);
        assert!(scene.commit(&mut ctx, None).unwrap());
        assert_eq!(scene.count(), 0);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn remove_then_add_keeps_one_entry() {
        let object = TestObject::rc(1);
        let (mut scene, mut ctx) = committed(vec![object.clone()]);
        scene.remove(object.clone());
        scene.add(object);
        assert!(scene.commit(&mut ctx, None).unwrap());
        assert_eq!(scene.count(), 1);
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let object = TestObject::rc(1);
        let (mut scene, mut ctx) = committed(vec![object.clone()]);
        scene.add(object);
        assert!(scene.commit(&mut ctx, None).unwrap());
        assert_eq!(scene.count(), 1);
    }

    #[test]
    fn zero_budget_commits_in_slices() {
        let mut ctx = HeadlessContext::new(64, 64);
        let mut scene = Scene::default();
        for id in 0..250 {
            scene.add(TestObject::rc(id));
        }
        let mut rounds = 0;
        while !scene.commit(&mut ctx, Some(0.0)).unwrap() {
            rounds += 1;
            assert!(scene.count() % COMMIT_CHECK_INTERVAL == 0);
        }
        assert!(rounds >= 2);
        assert_eq!(scene.count(), 250);
        assert_eq!(scene.commit_queue_size(), 0);
    }

    #[test]
    fn renderables_sorted_by_program_material_id() {
        let mut objects = Vec::new();
        for (id, material) in [(1, 2), (2, 1), (3, 1)] {
            let mut o = TestObject::new(id);
            o.material = material;
            objects.push(o.into_rc());
        }
        let (scene, _) = committed(objects);
        let order: Vec<ObjectId> = scene.entries().iter().map(|e| e.object_id).collect();
        // each object registers its own program, in creation order
        assert_eq!(order, vec![1, 2, 3]);
        let keys: Vec<_> = scene
            .entries()
            .iter()
            .map(|e| {
                (
                    e.renderable.program_id(RenderVariant::ColorBlended).unwrap().0,
                    e.renderable.material_id(),
                    e.renderable.id(),
                )
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn failed_creation_is_reported_and_dropped() {
        let mut bad = TestObject::new(9);
        bad.fail = true;
        let mut ctx = HeadlessContext::new(8, 8);
        let mut scene = Scene::default();
        scene.add(bad.into_rc());
        scene.add(TestObject::rc(1));
        assert!(scene.commit(&mut ctx, None).is_err());
        assert!(scene.commit(&mut ctx, None).unwrap());
        assert_eq!(scene.count(), 1);
        assert!(!scene.has(9));
    }

    #[test]
    fn bounding_spheres_respect_visibility_and_draw_count() {
        let mut empty = TestObject::new(3).at(Vec3::new(100.0, 0.0, 0.0), 5.0);
        empty.draw_count = 0;
        let (mut scene, _) = committed(vec![
            TestObject::new(1).at(Vec3::new(-10.0, 0.0, 0.0), 1.0).into_rc(),
            TestObject::new(2).at(Vec3::new(10.0, 0.0, 0.0), 1.0).into_rc(),
            empty.into_rc(),
        ]);
        let all = scene.bounding_sphere();
        assert!(all.center.length() < 1e-3);
        assert!(all.radius >= 11.0 - 1e-3);

        scene.renderable_mut(2).unwrap().state_mut().visible = false;
        assert!(scene.sync_visibility());
        let visible = scene.bounding_sphere_visible();
        assert!((visible.center - Vec3::new(-10.0, 0.0, 0.0)).length() < 1e-3);
        assert!((visible.radius - 1.0).abs() < 1e-3);
        assert!(!scene.sync_visibility());
    }

    #[test]
    fn empty_scene_aggregates() {
        let (scene, _) = committed(vec![]);
        assert_eq!(scene.bounding_sphere(), Sphere3D::EMPTY);
        assert_eq!(scene.opacity_average(), 0.0);
        assert_eq!(scene.marker_average(), 0.0);
        assert_eq!(scene.transparency_min(), 1.0);
        assert!(!scene.has_opaque());
    }

    #[test]
    fn averages_cover_visible_primitives_only() {
        let mut a = TestObject::new(1);
        a.marker = 1.0;
        a.emissive = 0.5;
        let mut b = TestObject::new(2);
        b.alpha = 0.5;
        let mut text = TestObject::new(3);
        text.kind = GeometryKind::Text;
        let mut volume = TestObject::new(4);
        volume.kind = GeometryKind::DirectVolume;
        volume.marker = 1.0;
        let (mut scene, _) =
            committed(vec![a.into_rc(), b.into_rc(), text.into_rc(), volume.into_rc()]);

        assert!((scene.marker_average() - 1.0 / 3.0).abs() < 1e-6);
        assert!((scene.emissive_average() - 0.5 / 3.0).abs() < 1e-6);
        // 1 + 0.5 + 0.5 (text weight)
        assert!((scene.opacity_average() - 2.0 / 3.0).abs() < 1e-6);
        assert!((scene.transparency_min() - 0.5).abs() < 1e-6);
        assert!(scene.has_opaque());

        scene.renderable_mut(1).unwrap().state_mut().visible = false;
        assert!(scene.sync_visibility());
        assert!((scene.marker_average()).abs() < 1e-6);
    }

    #[test]
    fn soft_blending_weights_multiply() {
        let weights = OpacityWeights::default();
        let mut values = RenderableValues::default();
        assert!((weights.weight(&values) - 1.0).abs() < 1e-6);
        values.xray_shaded.update(XrayShaded::On);
        assert!((weights.weight(&values) - 0.5).abs() < 1e-6);
        values.point_style.update(PointStyle::Fuzzy);
        assert!((weights.weight(&values) - 0.25).abs() < 1e-6);
        values.geometry_kind.update(GeometryKind::Image);
        assert!((weights.weight(&values) - 0.125).abs() < 1e-6);

        let custom = OpacityWeights { xray: 0.2, fuzzy: 1.0, text: 0.1, image: 1.0 };
        let mut text = RenderableValues::default();
        text.geometry_kind.update(GeometryKind::Text);
        text.xray_shaded.update(XrayShaded::Inverted);
        assert!((custom.weight(&text) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn visible_bounds_contain_every_visible_sphere() {
        // Small LCG so the layout is reproducible.
        let mut seed = 0x2545_f491_u32;
        let mut next = move || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            f32::from(u16::try_from(seed >> 16).unwrap_or(0)) / f32::from(u16::MAX)
        };
        let mut objects = Vec::new();
        for id in 1..=40 {
            let center = Vec3::new(next(), next(), next()) * 200.0 - Vec3::splat(100.0);
            let mut object = TestObject::new(id).at(center, 0.5 + next() * 20.0);
            if id % 7 == 0 {
                object.draw_count = 0;
            }
            objects.push(object.into_rc());
        }
        let (mut scene, _) = committed(objects);
        for round in 0..8 {
            for id in 1..=40 {
                let visible = next() > 0.4 || id == round + 1;
                scene.renderable_mut(id).unwrap().state_mut().visible = visible;
            }
            let _ = scene.sync_visibility();
            let bounds = scene.bounding_sphere_visible();
            let spheres = scene.visible_spheres();
            assert!(!spheres.is_empty());
            for sphere in &spheres {
                assert!(
                    bounds.expand(1e-3).includes(sphere),
                    "round {round}: {sphere:?} outside {bounds:?}"
                );
            }
            let all = scene.bounding_sphere().expand(1e-3);
            assert!(spheres.iter().all(|sphere| all.includes(sphere)));
        }
    }

    #[test]
    fn update_rederives_opacity() {
        let (mut scene, mut ctx) = committed(vec![TestObject::rc(1)]);
        assert!(scene.has_opaque());
        scene.renderable_mut(1).unwrap().values_mut().alpha.update(0.3);
        scene.update(&mut ctx, Some(&[1]), false).unwrap();
        assert!(!scene.renderable(1).unwrap().state().opaque);
        assert!(!scene.has_opaque());
    }

    #[test]
    fn clear_disposes_everything() {
        let (mut scene, mut ctx) = committed(vec![TestObject::rc(1), TestObject::rc(2)]);
        scene.add(TestObject::rc(3));
        scene.clear(&mut ctx);
        assert_eq!(scene.count(), 0);
        assert!(!scene.needs_commit());
        assert_eq!(scene.bounding_sphere(), Sphere3D::EMPTY);
    }
}
