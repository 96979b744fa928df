use std::collections::{BTreeMap, HashMap};

use crate::apclass::APClass;
use crate::vertex::{BBType, Vertex};

/// One attachment point of one library building block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LibraryAp {
    pub bb_type: BBType,
    pub bb_id: usize,
    pub ap: usize,
}

impl LibraryAp {
    pub fn fragment(bb_id: usize, ap: usize) -> Self {
        Self {
            bb_type: BBType::Fragment,
            bb_id,
            ap,
        }
    }
}

/// Lookup tables derived from the fragment library.
#[derive(Debug, Clone, Default)]
pub struct BuildingBlockIndex {
    frags_by_ap_count: BTreeMap<usize, Vec<usize>>,
    ap_classes_per_fragment: HashMap<usize, Vec<APClass>>,
    frags_and_aps_by_class: HashMap<APClass, Vec<LibraryAp>>,
    rcvs: Vec<Vertex>,
}

impl BuildingBlockIndex {
    pub fn build(fragments: &[Vertex], class_based: bool) -> Self {
        let mut index = Self::default();
        for (i, frag) in fragments.iter().enumerate() {
            index.classify(frag, i, class_based);
        }
        index
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Registers one fragment. Fragments without free APs are not listed by
    /// AP count. Class tables are kept only for the class-based approach.
    pub fn classify(&mut self, frag: &Vertex, bb_id: usize, class_based: bool) {
        let n_aps = frag.free_ap_count();
        if n_aps != 0 {
            self.frags_by_ap_count.entry(n_aps).or_default().push(bb_id);
        }
        if !class_based {
            return;
        }

        let mut classes: Vec<APClass> = Vec::new();
        for apc in frag.aps().iter().filter_map(|ap| ap.class.as_ref()) {
            if !classes.contains(apc) {
                classes.push(apc.clone());
            }
        }
        self.ap_classes_per_fragment.insert(bb_id, classes);

        for (j, ap) in frag.aps().iter().enumerate() {
            if !ap.is_available() {
                continue;
            }
            if let Some(apc) = &ap.class {
                self.frags_and_aps_by_class
                    .entry(apc.clone())
                    .or_default()
                    .push(LibraryAp::fragment(bb_id, j));
            }
        }

        if frag.is_rcv() {
            self.rcvs.push(frag.clone());
        }
    }

    pub fn frags_with_num_aps(&self, n: usize) -> &[usize] {
        self.frags_by_ap_count
            .get(&n)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn frags_by_ap_count(&self) -> &BTreeMap<usize, Vec<usize>> {
        &self.frags_by_ap_count
    }

    pub fn ap_classes_of_fragment(&self, bb_id: usize) -> &[APClass] {
        self.ap_classes_per_fragment
            .get(&bb_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn frags_with_ap_class(&self, apc: &APClass) -> &[LibraryAp] {
        self.frags_and_aps_by_class
            .get(apc)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct classes with at least one free fragment AP.
    pub fn class_count(&self) -> usize {
        self.frags_and_aps_by_class.len()
    }

    pub fn rcvs(&self) -> &[Vertex] {
        &self.rcvs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apc(s: &str) -> APClass {
        APClass::parse(s).unwrap()
    }

    fn frag(classes: &[&str]) -> Vertex {
        Vertex::empty(
            BBType::Fragment,
            classes.iter().map(|c| Some(apc(c))).collect(),
        )
    }

    #[test]
    fn classify_fills_all_tables() {
        let frags = vec![
            frag(&["idx_a:0", "idx_a:0", "idx_b:0"]),
            frag(&["idx_b:0"]),
            frag(&[]),
        ];
        let index = BuildingBlockIndex::build(&frags, true);
        assert_eq!(index.frags_with_num_aps(3), &[0]);
        assert_eq!(index.frags_with_num_aps(1), &[1]);
        assert!(index.frags_with_num_aps(0).is_empty());
        assert_eq!(
            index.ap_classes_of_fragment(0),
            &[apc("idx_a:0"), apc("idx_b:0")]
        );
        assert_eq!(
            index.frags_with_ap_class(&apc("idx_b:0")),
            &[LibraryAp::fragment(0, 2), LibraryAp::fragment(1, 0)]
        );
        assert_eq!(index.class_count(), 2);
    }

    #[test]
    fn class_tables_need_class_based_approach() {
        let frags = vec![frag(&["idx_a:0"])];
        let index = BuildingBlockIndex::build(&frags, false);
        assert_eq!(index.frags_with_num_aps(1), &[0]);
        assert!(index.frags_with_ap_class(&apc("idx_a:0")).is_empty());
        assert!(index.ap_classes_of_fragment(0).is_empty());
    }

    #[test]
    fn rcvs_are_registered() {
        let frags = vec![frag(&["ATplus:0"]), frag(&["idx_a:0"])];
        let index = BuildingBlockIndex::build(&frags, true);
        assert_eq!(index.rcvs().len(), 1);
    }

    #[test]
    fn library_aps_sort_by_type_then_position() {
        let cap = LibraryAp {
            bb_type: BBType::Cap,
            bb_id: 0,
            ap: 0,
        };
        let scaffold = LibraryAp {
            bb_type: BBType::Scaffold,
            bb_id: 5,
            ap: 1,
        };
        let mut aps = vec![
            Some(cap),
            LibraryAp::fragment(1, 0).into(),
            None,
            Some(scaffold),
            LibraryAp::fragment(0, 2).into(),
        ];
        aps.sort();
        assert_eq!(
            aps,
            vec![
                None,
                Some(scaffold),
                Some(LibraryAp::fragment(0, 2)),
                Some(LibraryAp::fragment(1, 0)),
                Some(cap),
            ]
        );
    }

    #[test]
    fn clear_empties_everything() {
        let mut index = BuildingBlockIndex::build(&[frag(&["ATplus:0"])], true);
        index.clear();
        assert!(index.rcvs().is_empty());
        assert!(index.frags_by_ap_count().is_empty());
    }
}
