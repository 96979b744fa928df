//! Lazy enumeration of the ways to complete a graph: for every free AP,
//! which fragment AP or capping group goes there, or nothing at all.
//!
//! Each free AP that needs a decision is a slot. A slot's candidates are
//! fixed when the iterator is built; the iterator then walks the product of
//! all candidate lists like an odometer, one combination per call, so the
//! whole product never exists in memory at once.

use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

use crate::apclass::APClass;
use crate::compat::CompatibilityRules;
use crate::graph::DGraph;
use crate::space::{FragmentSpace, FragmentSpaceError, LibraryAp};
use crate::vertex::{ApId, BBType, VertexId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombinationError {
    #[error("no more combinations")]
    NoMoreCombinations,
    #[error("starting point has {found} digits, expected {expected}")]
    InvalidStartingPoint { expected: usize, found: usize },
    #[error(transparent)]
    Space(#[from] FragmentSpaceError),
}

/// A free AP of the root graph that receives a destiny in every
/// combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub ap: ApId,
    pub bb_type: BBType,
    pub bb_id: usize,
    pub class: Option<APClass>,
    /// Position of the slot among the active slots. Destinies projected
    /// from this slot onto symmetric APs carry the same id.
    pub sym_set: usize,
}

/// What goes on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destiny {
    /// Bond to AP `target.ap` of a new copy of a library building block.
    /// The copy does not exist yet; `placeholder` is the id it will get.
    Block {
        placeholder: VertexId,
        target: LibraryAp,
        sym_set: usize,
    },
    /// Leave the AP free.
    Empty { sym_set: usize },
}

impl Destiny {
    fn block(target: LibraryAp) -> Self {
        Destiny::Block {
            placeholder: VertexId::fresh(),
            target,
            sym_set: 0,
        }
    }

    pub fn target(&self) -> Option<LibraryAp> {
        match self {
            Destiny::Block { target, .. } => Some(*target),
            Destiny::Empty { .. } => None,
        }
    }

    pub fn placeholder(&self) -> Option<VertexId> {
        match self {
            Destiny::Block { placeholder, .. } => Some(*placeholder),
            Destiny::Empty { .. } => None,
        }
    }

    pub fn sym_set(&self) -> usize {
        match self {
            Destiny::Block { sym_set, .. } | Destiny::Empty { sym_set } => *sym_set,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Destiny::Empty { .. })
    }

    fn set_sym_set(&mut self, id: usize) {
        match self {
            Destiny::Block { sym_set, .. } | Destiny::Empty { sym_set } => *sym_set = id,
        }
    }

    /// Same destiny for another AP: same target, new placeholder.
    fn reminted(&self) -> Self {
        match self {
            Destiny::Block {
                target, sym_set, ..
            } => Destiny::Block {
                placeholder: VertexId::fresh(),
                target: *target,
                sym_set: *sym_set,
            },
            Destiny::Empty { sym_set } => Destiny::Empty { sym_set: *sym_set },
        }
    }
}

impl fmt::Display for Destiny {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destiny::Block {
                placeholder,
                target,
                ..
            } => write!(
                f,
                "{}[{} {} ap{}]",
                placeholder, target.bb_type, target.bb_id, target.ap
            ),
            Destiny::Empty { .. } => f.write_str("empty"),
        }
    }
}

/// One point of the enumerated space: a destiny for every slot, plus the
/// destinies projected onto the APs symmetric to those slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragsCombination {
    entries: Vec<(ApId, Destiny)>,
}

impl FragsCombination {
    pub fn get(&self, ap: &ApId) -> Option<&Destiny> {
        self.entries.iter().find(|(k, _)| k == ap).map(|(_, d)| d)
    }

    pub fn contains(&self, ap: &ApId) -> bool {
        self.get(ap).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ApId, Destiny)> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, ap: ApId, destiny: Destiny) {
        if !self.contains(&ap) {
            self.entries.push((ap, destiny));
        }
    }
}

/// Restartable generator over every [`FragsCombination`] of a root graph.
///
/// The counter state can be exported with [`next_ids`] and fed to a fresh
/// iterator over the same graph and space with [`set_starting_point`] to
/// continue an interrupted enumeration.
///
/// [`next_ids`]: FragsCombinationIterator::next_ids
/// [`set_starting_point`]: FragsCombinationIterator::set_starting_point
#[derive(Debug)]
pub struct FragsCombinationIterator<'g> {
    root: &'g DGraph,
    rules: CompatibilityRules,
    enforce_symmetry: bool,
    symmetric: bool,
    slots: Vec<Slot>,
    candidates: Vec<Vec<Destiny>>,
    next_ids: Vec<usize>,
    total: usize,
    generated: usize,
    finished: bool,
}

impl<'g> FragsCombinationIterator<'g> {
    pub fn new(space: &FragmentSpace, root: &'g DGraph) -> Result<Self, CombinationError> {
        let rules = space.rules().clone();
        let enforce_symmetry = space.parameters().enforce_symmetry;
        let symmetric = enforce_symmetry || rules.has_symmetry_constraints();

        let mut slots = Vec::new();
        let mut candidates = Vec::new();
        for ap in source_aps(root, &rules, enforce_symmetry, symmetric) {
            let Some(vertex) = root.vertex(ap.vertex) else {
                continue;
            };
            let class = vertex.ap(ap.index).and_then(|a| a.class.clone());
            let cands = destinies_for(space, &rules, class.as_ref())?;
            debug!(
                slot = %ap,
                class = ?class.as_ref().map(ToString::to_string),
                candidates = cands.len(),
                "combination slot"
            );
            if cands.is_empty() {
                continue;
            }
            slots.push(Slot {
                ap,
                bb_type: vertex.bb_type(),
                bb_id: vertex.bb_id(),
                class,
                sym_set: 0,
            });
            candidates.push(cands);
        }
        for (pos, (slot, cands)) in slots.iter_mut().zip(candidates.iter_mut()).enumerate() {
            slot.sym_set = pos;
            cands.iter_mut().for_each(|d| d.set_sym_set(pos));
        }

        let total = if slots.is_empty() {
            0
        } else {
            candidates
                .iter()
                .fold(1usize, |acc, c| acc.saturating_mul(c.len().max(1)))
        };
        let next_ids = vec![0; slots.len()];
        debug!(slots = slots.len(), total, "combination iterator ready");
        Ok(Self {
            root,
            rules,
            enforce_symmetry,
            symmetric,
            slots,
            candidates,
            next_ids,
            total,
            generated: 0,
            finished: total == 0,
        })
    }

    pub fn has_next(&self) -> bool {
        !self.finished
    }

    /// Returns the combination at the current counter and advances it.
    pub fn next_combination(&mut self) -> Result<FragsCombination, CombinationError> {
        if self.finished {
            return Err(CombinationError::NoMoreCombinations);
        }
        trace!(ids = ?self.next_ids, sizes = ?self.candidate_set_sizes(), "next combination");

        let mut combination = FragsCombination::default();
        for ((slot, cands), &digit) in self
            .slots
            .iter()
            .zip(&self.candidates)
            .zip(&self.next_ids)
        {
            combination.push(slot.ap, cands[digit].clone());
        }
        self.advance();
        self.generated += 1;

        if self.symmetric {
            self.project_on_symmetric_aps(&mut combination);
            self.project_on_symmetric_vertices(&mut combination);
        }
        trace!(size = combination.len(), "combination built");
        Ok(combination)
    }

    fn advance(&mut self) {
        for i in (0..self.next_ids.len()).rev() {
            self.next_ids[i] += 1;
            if self.next_ids[i] < self.candidates[i].len() {
                return;
            }
            if i > 0 {
                self.next_ids[i] = 0;
            }
        }
        self.next_ids = self.candidate_set_sizes();
        self.finished = true;
    }

    /// Copies each destiny onto the other free APs of the same symmetric
    /// AP set, unless symmetry is not imposed on that class.
    fn project_on_symmetric_aps(&self, combination: &mut FragsCombination) {
        let mut extra = Vec::new();
        for (ap, destiny) in combination.iter() {
            let Some(vertex) = self.root.vertex(ap.vertex) else {
                continue;
            };
            let Some(class) = vertex.ap(ap.index).and_then(|a| a.class.as_ref()) else {
                continue;
            };
            if !self
                .rules
                .impose_symmetry_on_aps_of_class(class, self.enforce_symmetry)
            {
                continue;
            }
            let Some(set) = vertex.symmetric_ap_set_of(ap.index) else {
                continue;
            };
            for &j in set.iter().filter(|&&j| j != ap.index) {
                if vertex.ap(j).is_some_and(|a| a.is_available()) {
                    extra.push((ApId::new(ap.vertex, j), destiny.reminted()));
                }
            }
        }
        for (ap, destiny) in extra {
            combination.push(ap, destiny);
        }
    }

    /// Copies each destiny onto the same AP of every vertex symmetric to
    /// its owner.
    fn project_on_symmetric_vertices(&self, combination: &mut FragsCombination) {
        let mut extra = Vec::new();
        for (ap, destiny) in combination.iter() {
            let Some(set) = self.root.symmetric_set_of(ap.vertex) else {
                continue;
            };
            for &other in set.iter().filter(|&&v| v != ap.vertex) {
                let partner = ApId::new(other, ap.index);
                if self.root.ap(partner).is_some_and(|a| a.is_available()) {
                    extra.push((partner, destiny.reminted()));
                }
            }
        }
        for (ap, destiny) in extra {
            combination.push(ap, destiny);
        }
    }

    /// The counter: one digit per slot, each below its candidate count
    /// until the iterator is exhausted.
    pub fn next_ids(&self) -> &[usize] {
        &self.next_ids
    }

    /// Resumes from a counter exported by [`Self::next_ids`]. A digit at or
    /// above its slot's candidate count marks the iterator exhausted.
    pub fn set_starting_point(&mut self, ids: Vec<usize>) -> Result<(), CombinationError> {
        if ids.len() != self.slots.len() {
            return Err(CombinationError::InvalidStartingPoint {
                expected: self.slots.len(),
                found: ids.len(),
            });
        }
        self.finished = self.slots.is_empty()
            || ids
                .iter()
                .zip(&self.candidates)
                .any(|(&d, c)| d >= c.len());
        self.next_ids = ids;
        if self.finished {
            self.next_ids = self.candidate_set_sizes();
        }
        Ok(())
    }

    pub fn total_combinations(&self) -> usize {
        self.total
    }

    pub fn num_root_aps(&self) -> usize {
        self.slots.len()
    }

    pub fn num_generated(&self) -> usize {
        self.generated
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn candidates_map(&self) -> impl Iterator<Item = (&Slot, &[Destiny])> + '_ {
        self.slots
            .iter()
            .zip(self.candidates.iter().map(Vec::as_slice))
    }

    pub fn candidate_set_sizes(&self) -> Vec<usize> {
        self.candidates.iter().map(Vec::len).collect()
    }
}

impl Iterator for FragsCombinationIterator<'_> {
    type Item = FragsCombination;

    fn next(&mut self) -> Option<FragsCombination> {
        self.next_combination().ok()
    }
}

/// Free APs of `root` that become slots. With symmetry active only the
/// first vertex of each symmetric vertex set contributes, and of each
/// symmetric AP set only the first free member, unless symmetry is not
/// imposed on its class.
fn source_aps(
    root: &DGraph,
    rules: &CompatibilityRules,
    enforce_symmetry: bool,
    symmetric: bool,
) -> Vec<ApId> {
    let mut aps = Vec::new();
    for vertex in root.vertices() {
        let id = vertex.id();
        if symmetric && root.symmetric_set_of(id).is_some_and(|set| set[0] != id) {
            continue;
        }
        for (i, ap) in vertex.aps().iter().enumerate() {
            if !ap.is_available() {
                continue;
            }
            if symmetric {
                let imposed = ap
                    .class
                    .as_ref()
                    .map(|c| rules.impose_symmetry_on_aps_of_class(c, enforce_symmetry))
                    .unwrap_or(enforce_symmetry);
                let representative = vertex.symmetric_ap_set_of(i).and_then(|set| {
                    set.iter()
                        .copied()
                        .find(|&j| vertex.ap(j).is_some_and(|a| a.is_available()))
                });
                if imposed && representative.is_some_and(|r| r != i) {
                    continue;
                }
            }
            aps.push(ApId::new(id, i));
        }
    }
    aps
}

/// Compatible fragment APs first, then capping groups if the class has a
/// capping rule, otherwise an empty destiny unless the class is a
/// forbidden end.
fn destinies_for(
    space: &FragmentSpace,
    rules: &CompatibilityRules,
    class: Option<&APClass>,
) -> Result<Vec<Destiny>, FragmentSpaceError> {
    let mut out: Vec<Destiny> = match class {
        Some(c) => space
            .compatible_fragment_aps(c)
            .into_iter()
            .map(Destiny::block)
            .collect(),
        None => Vec::new(),
    };
    match class.and_then(|c| rules.capping_class(c)) {
        Some(cap_class) => {
            for bb_id in space.capping_groups_with_class(cap_class)? {
                out.push(Destiny::block(LibraryAp {
                    bb_type: BBType::Cap,
                    bb_id,
                    ap: 0,
                }));
            }
        }
        None => {
            if !class.is_some_and(|c| rules.is_forbidden_end(c)) {
                out.push(Destiny::Empty { sym_set: 0 });
            }
        }
    }
    Ok(out)
}
