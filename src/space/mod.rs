//! The fragment space: libraries of building blocks, the compatibility
//! rules that govern how they join, and lookup tables derived from both.
//!
//! A [`FragmentSpace`] is an ordinary value. Share it between workers with
//! an `Arc`; all queries take `&self`. Growing a library is serialised per
//! library, so concurrent growth never appends two isomorphic entries.

mod error;
mod growth;
mod index;
mod params;

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub use error::FragmentSpaceError;
pub use growth::{GeometryError, GeometryExtractor, GrowthOutcome};
pub use index::{BuildingBlockIndex, LibraryAp};
pub use params::{FragmentSpaceParameters, ParametersError};

use crate::apclass::APClass;
use crate::compat::CompatibilityRules;
use crate::random::Randomizer;
use crate::vertex::{BBType, Vertex};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct Library {
    bb_type: BBType,
    entries: RwLock<Option<Vec<Vertex>>>,
    growth: Mutex<()>,
}

impl Library {
    fn new(bb_type: BBType) -> Self {
        Self {
            bb_type,
            entries: RwLock::new(None),
            growth: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Vec<Vertex>>> {
        read(&self.entries)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Vec<Vertex>>> {
        write(&self.entries)
    }

    fn lock_growth(&self) -> MutexGuard<'_, ()> {
        self.growth
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn len(&self) -> Result<usize, FragmentSpaceError> {
        self.read()
            .as_ref()
            .map(Vec::len)
            .ok_or(FragmentSpaceError::LibraryNotInitialized {
                bb_type: self.bb_type,
            })
    }
}

/// Stamps type and position onto each entry of a new library.
fn normalise(bb_type: BBType, mut vertices: Vec<Vertex>) -> Vec<Vertex> {
    for (i, v) in vertices.iter_mut().enumerate() {
        v.set_bb_type(bb_type);
        v.set_bb_id(i);
    }
    vertices
}

#[derive(Debug)]
pub struct FragmentSpace {
    params: FragmentSpaceParameters,
    rules: RwLock<CompatibilityRules>,
    scaffolds: Library,
    fragments: Library,
    caps: Library,
    index: RwLock<BuildingBlockIndex>,
}

impl FragmentSpace {
    /// A space with no libraries and no rules.
    pub fn new(params: FragmentSpaceParameters) -> Self {
        Self {
            params,
            rules: RwLock::new(CompatibilityRules::default()),
            scaffolds: Library::new(BBType::Scaffold),
            fragments: Library::new(BBType::Fragment),
            caps: Library::new(BBType::Cap),
            index: RwLock::new(BuildingBlockIndex::default()),
        }
    }

    /// A fully defined space. The class-based approach is used iff `rules`
    /// carries a compatibility map.
    pub fn define(
        params: FragmentSpaceParameters,
        scaffolds: Vec<Vertex>,
        fragments: Vec<Vertex>,
        caps: Vec<Vertex>,
        rules: CompatibilityRules,
    ) -> Self {
        let space = Self::new(params);
        *write(&space.rules) = rules;
        *space.scaffolds.write() = Some(normalise(BBType::Scaffold, scaffolds));
        *space.caps.write() = Some(normalise(BBType::Cap, caps));
        space.set_fragment_library(fragments);
        space
    }

    pub fn parameters(&self) -> &FragmentSpaceParameters {
        &self.params
    }

    pub fn randomizer(&self) -> Randomizer {
        Randomizer::new(self.params.random_seed)
    }

    pub fn is_defined(&self) -> bool {
        self.scaffolds.read().is_some()
            && self.fragments.read().is_some()
            && self.caps.read().is_some()
    }

    /// Forgets libraries, rules and derived tables.
    pub fn clear_all(&self) {
        *self.scaffolds.write() = None;
        *self.fragments.write() = None;
        *self.caps.write() = None;
        *write(&self.rules) = CompatibilityRules::default();
        write(&self.index).clear();
    }

    pub fn rules(&self) -> RwLockReadGuard<'_, CompatibilityRules> {
        read(&self.rules)
    }

    /// Replaces the rules. The derived tables are rebuilt since the
    /// class-based switch may have flipped.
    pub fn set_rules(&self, rules: CompatibilityRules) {
        *write(&self.rules) = rules;
        self.group_and_classify_fragments();
    }

    pub fn use_ap_class_based_approach(&self) -> bool {
        self.rules().is_class_based()
    }

    pub fn index(&self) -> RwLockReadGuard<'_, BuildingBlockIndex> {
        read(&self.index)
    }

    fn library(&self, bb_type: BBType) -> Result<&Library, FragmentSpaceError> {
        match bb_type {
            BBType::Scaffold => Ok(&self.scaffolds),
            BBType::Fragment => Ok(&self.fragments),
            BBType::Cap => Ok(&self.caps),
            BBType::Undefined => Err(FragmentSpaceError::UndefinedBuildingBlockType),
        }
    }

    pub fn set_scaffold_library(&self, vertices: Vec<Vertex>) {
        *self.scaffolds.write() = Some(normalise(BBType::Scaffold, vertices));
    }

    pub fn set_fragment_library(&self, vertices: Vec<Vertex>) {
        *self.fragments.write() = Some(normalise(BBType::Fragment, vertices));
        self.group_and_classify_fragments();
    }

    pub fn set_capping_library(&self, vertices: Vec<Vertex>) {
        *self.caps.write() = Some(normalise(BBType::Cap, vertices));
    }

    pub fn library_size(&self, bb_type: BBType) -> Result<usize, FragmentSpaceError> {
        self.library(bb_type)?.len()
    }

    pub fn library_snapshot(&self, bb_type: BBType) -> Result<Vec<Vertex>, FragmentSpaceError> {
        self.library(bb_type)?
            .read()
            .clone()
            .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type })
    }

    /// A copy of library entry `index` with a fresh vertex identity.
    pub fn get_vertex(&self, bb_type: BBType, index: usize) -> Result<Vertex, FragmentSpaceError> {
        let lib = self.library(bb_type)?;
        let entries = lib.read();
        let vertices = entries
            .as_ref()
            .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type })?;
        let original = vertices
            .get(index)
            .ok_or(FragmentSpaceError::IndexOutOfRange {
                bb_type,
                index,
                size: vertices.len(),
            })?;
        let mut v = original.clone_with_fresh_id();
        if v.bb_id() != index {
            warn!(
                %bb_type,
                index,
                stored = v.bb_id(),
                "building block id does not match its library position"
            );
            v.set_bb_id(index);
        }
        v.set_bb_type(bb_type);
        Ok(v)
    }

    pub fn append_vertex_to_library(
        &self,
        vertex: Vertex,
        bb_type: BBType,
    ) -> Result<usize, FragmentSpaceError> {
        let lib = self.library(bb_type)?;
        let _growing = lib.lock_growth();
        self.append_locked(lib, vertex)
    }

    /// Appends while the caller holds the growth lock of `lib`.
    fn append_locked(
        &self,
        lib: &Library,
        mut vertex: Vertex,
    ) -> Result<usize, FragmentSpaceError> {
        let bb_type = lib.bb_type;
        let mut entries = lib.write();
        let vertices = entries
            .as_mut()
            .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type })?;
        let bb_id = vertices.len();
        vertex.set_bb_type(bb_type);
        vertex.set_bb_id(bb_id);
        if bb_type == BBType::Fragment {
            let class_based = self.use_ap_class_based_approach();
            write(&self.index).classify(&vertex, bb_id, class_based);
        }
        vertices.push(vertex);
        Ok(bb_id)
    }

    /// Rebuilds the derived tables from the fragment library.
    pub fn group_and_classify_fragments(&self) {
        let entries = self.fragments.read();
        let class_based = self.use_ap_class_based_approach();
        let rebuilt = match entries.as_ref() {
            Some(frags) => BuildingBlockIndex::build(frags, class_based),
            None => BuildingBlockIndex::default(),
        };
        *write(&self.index) = rebuilt;
    }

    /// Fragment APs whose class is compatible with `apc`, class by class in
    /// the order of the compatibility list. An AP reachable through two
    /// compatible classes is listed twice.
    pub fn compatible_fragment_aps(&self, apc: &APClass) -> Vec<LibraryAp> {
        let rules = self.rules();
        let classes = rules.compatible_classes(apc);
        if classes.is_empty() {
            warn!(class = %apc, "no compatible class defined");
            return Vec::new();
        }
        let index = self.index();
        classes
            .iter()
            .flat_map(|c| index.frags_with_ap_class(c).iter().copied())
            .collect()
    }

    /// Fragments offering, for every class in `classes`, at least one AP
    /// compatible with it. One copy per fragment.
    pub fn fragments_compatible_with_aps(
        &self,
        classes: &[APClass],
    ) -> Result<Vec<Vertex>, FragmentSpaceError> {
        let mut survivors: Option<Vec<usize>> = None;
        for apc in classes {
            let reachable = unique_bb_ids(self.compatible_fragment_aps(apc).iter());
            let next = match survivors {
                None => reachable,
                Some(prev) => prev.into_iter().filter(|i| reachable.contains(i)).collect(),
            };
            if next.is_empty() {
                return Ok(Vec::new());
            }
            survivors = Some(next);
        }
        survivors
            .unwrap_or_default()
            .into_iter()
            .map(|i| self.get_vertex(BBType::Fragment, i))
            .collect()
    }

    pub fn frags_with_num_aps(&self, n: usize) -> Vec<usize> {
        self.index().frags_with_num_aps(n).to_vec()
    }

    pub fn ap_classes_of_fragment(&self, bb_id: usize) -> Vec<APClass> {
        self.index().ap_classes_of_fragment(bb_id).to_vec()
    }

    pub fn frags_with_ap_class(&self, apc: &APClass) -> Vec<LibraryAp> {
        self.index().frags_with_ap_class(apc).to_vec()
    }

    /// One copy of each fragment with a free AP of class `apc`.
    pub fn vertices_with_ap_class(&self, apc: &APClass) -> Result<Vec<Vertex>, FragmentSpaceError> {
        let ids = unique_bb_ids(self.index().frags_with_ap_class(apc).iter());
        ids.into_iter()
            .map(|i| self.get_vertex(BBType::Fragment, i))
            .collect()
    }

    /// The ring-closing vertices met while classifying fragments.
    pub fn rcvs(&self) -> Vec<Vertex> {
        self.index().rcvs().to_vec()
    }

    pub fn capping_groups_with_class(
        &self,
        cap_class: &APClass,
    ) -> Result<Vec<usize>, FragmentSpaceError> {
        self.scan_caps(|v| {
            v.ap(0).and_then(|ap| ap.class.as_ref()) == Some(cap_class)
        })
    }

    /// Capping groups carrying class `apc` on any AP.
    pub fn compatible_capping_fragments(
        &self,
        apc: &APClass,
    ) -> Result<Vec<usize>, FragmentSpaceError> {
        self.scan_caps(|v| v.aps().iter().any(|ap| ap.class.as_ref() == Some(apc)))
    }

    /// A random capping group carrying class `apc`.
    pub fn capping_fragment_for(
        &self,
        apc: &APClass,
        rng: &mut Randomizer,
    ) -> Result<Option<usize>, FragmentSpaceError> {
        let candidates = self.compatible_capping_fragments(apc)?;
        Ok(rng.choose_one(&candidates).copied())
    }

    fn scan_caps(&self, keep: impl Fn(&Vertex) -> bool) -> Result<Vec<usize>, FragmentSpaceError> {
        let entries = self.caps.read();
        let caps = entries
            .as_ref()
            .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type: BBType::Cap })?;
        Ok(caps
            .iter()
            .enumerate()
            .filter(|(_, v)| keep(v))
            .map(|(i, _)| i)
            .collect())
    }

    pub fn random_scaffold(&self, rng: &mut Randomizer) -> Result<Vertex, FragmentSpaceError> {
        let size = self.library_size(BBType::Scaffold)?;
        if size == 0 {
            return Err(FragmentSpaceError::IndexOutOfRange {
                bb_type: BBType::Scaffold,
                index: 0,
                size,
            });
        }
        self.get_vertex(BBType::Scaffold, rng.next_int(size))
    }
}

fn unique_bb_ids<'a>(aps: impl Iterator<Item = &'a LibraryAp>) -> Vec<usize> {
    let mut ids: Vec<usize> = Vec::new();
    for ap in aps {
        if !ids.contains(&ap.bb_id) {
            ids.push(ap.bb_id);
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::DGraph;
    use crate::vertex::{ApId, Geometry, VertexId};

    fn apc(s: &str) -> APClass {
        APClass::parse(s).unwrap()
    }

    fn frag(classes: &[&str]) -> Vertex {
        Vertex::molecular(
            BBType::Fragment,
            "C",
            classes.iter().map(|c| apc(c)).collect(),
        )
    }

    fn small_space() -> FragmentSpace {
        space_with(FragmentSpaceParameters::default())
    }

    fn space_with(params: FragmentSpaceParameters) -> FragmentSpace {
        let mut rules = CompatibilityRules::new();
        rules
            .add_compatibility(apc("sp_a:0"), apc("sp_b:0"))
            .add_compatibility(apc("sp_b:0"), apc("sp_a:0"))
            .set_capping(apc("sp_a:0"), apc("sp_cap:0"));
        FragmentSpace::define(
            params,
            vec![frag(&["sp_a:0", "sp_a:0"])],
            vec![frag(&["sp_a:0", "sp_b:0"]), frag(&["sp_b:0"])],
            vec![frag(&["sp_cap:0"]), frag(&["sp_b:0"]), frag(&["sp_cap:0"])],
            rules,
        )
    }

    #[test]
    fn uninitialized_library_is_an_error() {
        let space = FragmentSpace::new(FragmentSpaceParameters::default());
        assert!(!space.is_defined());
        assert_eq!(
            space.get_vertex(BBType::Fragment, 0).unwrap_err(),
            FragmentSpaceError::LibraryNotInitialized {
                bb_type: BBType::Fragment
            }
        );
        assert_eq!(
            space.get_vertex(BBType::Undefined, 0).unwrap_err(),
            FragmentSpaceError::UndefinedBuildingBlockType
        );
    }

    #[test]
    fn get_vertex_returns_fresh_copies() {
        let space = small_space();
        assert!(space.is_defined());
        let a = space.get_vertex(BBType::Fragment, 1).unwrap();
        let b = space.get_vertex(BBType::Fragment, 1).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.bb_id(), 1);
        assert_eq!(a.bb_type(), BBType::Fragment);
        assert_eq!(
            space.get_vertex(BBType::Cap, 3).unwrap_err(),
            FragmentSpaceError::IndexOutOfRange {
                bb_type: BBType::Cap,
                index: 3,
                size: 3
            }
        );
    }

    #[test]
    fn capping_queries() {
        let space = small_space();
        assert_eq!(space.capping_groups_with_class(&apc("sp_cap:0")).unwrap(), vec![0, 2]);
        assert_eq!(space.compatible_capping_fragments(&apc("sp_b:0")).unwrap(), vec![1]);
        let mut rng = Randomizer::seeded(1);
        let chosen = space
            .capping_fragment_for(&apc("sp_cap:0"), &mut rng)
            .unwrap()
            .unwrap();
        assert!(chosen == 0 || chosen == 2);
        assert_eq!(space.capping_fragment_for(&apc("sp_x:0"), &mut rng).unwrap(), None);
    }

    #[test]
    fn append_classifies_new_fragment() {
        let space = small_space();
        let id = space
            .append_vertex_to_library(frag(&["sp_b:0", "sp_b:0", "sp_b:0"]), BBType::Fragment)
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(space.frags_with_num_aps(3), vec![2]);
        assert_eq!(space.get_vertex(BBType::Fragment, 2).unwrap().bb_id(), 2);
        assert_eq!(space.frags_with_ap_class(&apc("sp_b:0")).len(), 5);
    }

    #[test]
    fn rules_change_rebuilds_index() {
        let space = small_space();
        assert!(space.use_ap_class_based_approach());
        assert!(!space.frags_with_ap_class(&apc("sp_a:0")).is_empty());
        space.set_rules(CompatibilityRules::new());
        assert!(!space.use_ap_class_based_approach());
        assert!(space.frags_with_ap_class(&apc("sp_a:0")).is_empty());
        assert_eq!(space.frags_with_num_aps(2), vec![0]);
    }

    #[test]
    fn clear_all_forgets_everything() {
        let space = small_space();
        space.clear_all();
        assert!(!space.is_defined());
        assert!(space.frags_with_num_aps(2).is_empty());
        assert!(!space.use_ap_class_based_approach());
    }

    #[test]
    fn random_scaffold_comes_from_library() {
        let space = small_space();
        let s = space.random_scaffold(&mut Randomizer::seeded(9)).unwrap();
        assert_eq!(s.bb_type(), BBType::Scaffold);
        assert_eq!(s.bb_id(), 0);
    }

    fn ring_graph(scaffold: bool) -> DGraph {
        let mut g = DGraph::new();
        let first = if scaffold {
            let mut v = frag(&["sp_a:0", "sp_a:0", "sp_b:0"]);
            v.set_bb_type(BBType::Scaffold);
            v
        } else {
            frag(&["sp_a:0", "sp_a:0", "sp_b:0"])
        };
        let ids: Vec<VertexId> = [first, frag(&["sp_b:0", "sp_a:0"]), frag(&["sp_b:0", "sp_a:0"])]
            .into_iter()
            .map(|v| g.add_vertex(v).unwrap())
            .collect();
        g.add_edge(ApId::new(ids[0], 0), ApId::new(ids[1], 0)).unwrap();
        g.add_edge(ApId::new(ids[1], 1), ApId::new(ids[2], 0)).unwrap();
        g.add_edge(ApId::new(ids[2], 1), ApId::new(ids[0], 2)).unwrap();
        g.add_ring(ids.clone()).unwrap();
        g
    }

    struct FailingExtractor;

    impl GeometryExtractor for FailingExtractor {
        fn extract(&self, _: &DGraph, _: &DGraph) -> Result<Geometry, GeometryError> {
            Err(GeometryError("no coordinates".to_string()))
        }
    }

    #[test]
    fn growth_deduplicates_isomorphs() {
        let space = small_space();
        let g1 = ring_graph(false);
        let g2 = ring_graph(false);
        let first = space.add_fused_rings_to_library(&g1, true, true, None).unwrap();
        assert_eq!(
            first,
            vec![GrowthOutcome::Added {
                bb_type: BBType::Fragment,
                bb_id: 2
            }]
        );
        let second = space.add_fused_rings_to_library(&g2, true, true, None).unwrap();
        assert_eq!(
            second,
            vec![GrowthOutcome::Duplicate {
                bb_type: BBType::Fragment,
                bb_id: 2
            }]
        );
        assert_eq!(space.library_size(BBType::Fragment).unwrap(), 3);
        let sub = g2.subgraph(&g2.vertex_ids()).unwrap();
        assert_eq!(
            space.has_isomorph(&sub, BBType::Fragment).unwrap(),
            Some(2)
        );
        // The new template exposes the one free AP of the ring.
        let t = space.get_vertex(BBType::Fragment, 2).unwrap();
        assert_eq!(t.ap_count(), 1);
        assert_eq!(space.frags_with_num_aps(1), vec![1, 2]);
    }

    #[test]
    fn growth_goes_to_scaffolds_and_survives_geometry_failure() {
        let space = small_space();
        let g = ring_graph(true);
        let outcome = space
            .add_fused_rings_to_library(&g, true, true, Some(&FailingExtractor))
            .unwrap();
        assert_eq!(
            outcome,
            vec![GrowthOutcome::Added {
                bb_type: BBType::Scaffold,
                bb_id: 1
            }]
        );
        let t = space.get_vertex(BBType::Scaffold, 1).unwrap();
        assert!(t.template().unwrap().geometry.is_none());

        let skipped = space
            .add_fused_rings_to_library(&ring_graph(true), false, true, None)
            .unwrap();
        assert_eq!(
            skipped,
            vec![GrowthOutcome::Skipped {
                bb_type: BBType::Scaffold
            }]
        );
    }

    #[test]
    fn growth_switches_come_from_parameters() {
        let space = space_with(FragmentSpaceParameters {
            add_fused_rings_as_fragments: false,
            ..FragmentSpaceParameters::default()
        });
        let outcome = space.grow_with_fused_rings(&ring_graph(false), None).unwrap();
        assert_eq!(
            outcome,
            vec![GrowthOutcome::Skipped {
                bb_type: BBType::Fragment
            }]
        );
        assert_eq!(space.library_size(BBType::Fragment).unwrap(), 2);

        let outcome = space.grow_with_fused_rings(&ring_graph(true), None).unwrap();
        assert_eq!(
            outcome,
            vec![GrowthOutcome::Added {
                bb_type: BBType::Scaffold,
                bb_id: 1
            }]
        );
    }

    #[test]
    fn growth_switches_parse_from_toml() {
        let params =
            FragmentSpaceParameters::from_toml_str("add_fused_rings_as_scaffolds = false\n")
                .unwrap();
        let space = space_with(params);
        let outcome = space.grow_with_fused_rings(&ring_graph(true), None).unwrap();
        assert_eq!(
            outcome,
            vec![GrowthOutcome::Skipped {
                bb_type: BBType::Scaffold
            }]
        );
        assert_eq!(space.library_size(BBType::Scaffold).unwrap(), 1);
    }

    #[test]
    fn concurrent_growth_appends_once() {
        let space = Arc::new(small_space());
        let graphs: Vec<DGraph> = (0..8).map(|_| ring_graph(false)).collect();
        std::thread::scope(|s| {
            for g in &graphs {
                let space = Arc::clone(&space);
                s.spawn(move || {
                    space.add_fused_rings_to_library(g, true, true, None).unwrap();
                });
            }
        });
        assert_eq!(space.library_size(BBType::Fragment).unwrap(), 3);
    }
}
