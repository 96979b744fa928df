//! Finding building blocks that can take the place of a vertex, or be
//! inserted in the middle of an edge.

use tracing::debug;

use crate::apclass::APClass;
use crate::compat::CompatibilityRules;
use crate::finder::{combine, ApMapFinder, CompatTable, MappingOptions};
use crate::graph::{DGraph, Edge, GraphError};
use crate::mapping::ApMapping;
use crate::random::Randomizer;
use crate::scope::{ResolvedAp, Scope};
use crate::space::{FragmentSpace, FragmentSpaceError};
use crate::vertex::{BBType, Vertex, VertexId};

/// Outcome of a link search. Not finding anything is a normal result.
#[derive(Debug, Clone, Default)]
pub struct GraphLinkFinder {
    chosen_link: Option<Vertex>,
    chosen_mapping: Option<ApMapping>,
    alternatives: Vec<(Vertex, Vec<ApMapping>)>,
}

impl GraphLinkFinder {
    /// Looks for a building block that can replace vertex `original` of
    /// the scope's graph. The mapping keys are the APs of `original`, the
    /// values those of the replacement; every AP of `original` that is not
    /// free throughout is mapped.
    ///
    /// `new_bb_id` restricts the search to one building block of the same
    /// library. With `screen_all` every candidate is tried and all valid
    /// mappings are kept.
    pub fn for_vertex(
        space: &FragmentSpace,
        scope: &Scope<'_>,
        original: VertexId,
        new_bb_id: Option<usize>,
        screen_all: bool,
        rng: &mut Randomizer,
    ) -> Result<Self, FragmentSpaceError> {
        let vertex = scope
            .graph()
            .vertex(original)
            .ok_or(GraphError::UnknownVertex(original))?;
        let bb_type = vertex.bb_type();
        let mut candidates = candidate_ids(space, bb_type, new_bb_id)?;

        let list_a = scope.resolve_vertex(original);
        let needed = list_a
            .iter()
            .filter(|ap| !ap.is_available_throughout())
            .count();
        let rules = space.rules().clone();
        let options = MappingOptions {
            screen_all,
            ..space.parameters().mapping_options()
        };

        let mut result = Self::default();
        while !candidates.is_empty() {
            if result.found_alternative_link() && !screen_all {
                break;
            }
            let bb_id = candidates.remove(rng.next_int(candidates.len()));
            let candidate = space.get_vertex(bb_type, bb_id)?;
            if candidate.bb_id() == vertex.bb_id() {
                continue;
            }
            if candidate.ap_count() < needed {
                continue;
            }
            let list_b = ResolvedAp::standalone(&candidate);
            let finder = ApMapFinder::find(&rules, &list_a, &list_b, &options, rng);
            if !finder.found_mapping() {
                continue;
            }
            let chosen = finder.chosen_mapping().cloned();
            result.accept(candidate, chosen, finder.into_all_mappings(), screen_all);
        }
        result.settle(screen_all, rng);
        debug!(
            vertex = %original,
            found = result.found_alternative_link(),
            alternatives = result.alternatives.len(),
            "vertex replacement search"
        );
        Ok(result)
    }

    /// Looks for a building block to insert between the two ends of `edge`.
    /// The mapping has exactly two keys, the source and target APs of the
    /// edge, each paired with an AP of the new building block.
    pub fn for_edge(
        space: &FragmentSpace,
        graph: &DGraph,
        edge: &Edge,
        new_bb_id: Option<usize>,
        screen_all: bool,
        rng: &mut Randomizer,
    ) -> Result<Self, FragmentSpaceError> {
        let src_class = graph
            .ap(edge.src)
            .ok_or(GraphError::ApOutOfRange(edge.src))?
            .class
            .clone();
        let trg_class = graph
            .ap(edge.trg)
            .ok_or(GraphError::ApOutOfRange(edge.trg))?
            .class
            .clone();
        let bb_type = graph
            .vertex(edge.trg.vertex)
            .ok_or(GraphError::UnknownVertex(edge.trg.vertex))?
            .bb_type();
        let mut candidates = candidate_ids(space, bb_type, new_bb_id)?;
        let rules = space.rules().clone();
        let params = space.parameters();
        let limit = (!screen_all).then_some(params.max_ap_mapping_combinations);

        let mut result = Self::default();
        while !candidates.is_empty() {
            if result.found_alternative_link() && !screen_all {
                break;
            }
            let bb_id = candidates.remove(rng.next_int(candidates.len()));
            let candidate = space.get_vertex(bb_type, bb_id)?;
            if candidate.ap_count() < 2 {
                continue;
            }
            let table = edge_table(&rules, edge, &src_class, &trg_class, &candidate);
            if table.len() < 2 {
                continue;
            }
            let mappings = combine(table.entries(), &ApMapping::new(), limit).mappings;
            if mappings.is_empty() {
                continue;
            }
            let chosen = rng.choose_one(&mappings).cloned();
            result.accept(candidate, chosen, mappings, screen_all);
        }
        result.settle(screen_all, rng);
        Ok(result)
    }

    fn accept(
        &mut self,
        candidate: Vertex,
        chosen: Option<ApMapping>,
        all: Vec<ApMapping>,
        screen_all: bool,
    ) {
        if screen_all {
            self.alternatives.push((candidate, all));
        } else {
            self.chosen_link = Some(candidate);
            self.chosen_mapping = chosen;
        }
    }

    /// With `screen_all`, picks one (link, mapping) pair among all the
    /// alternatives so that the two always belong together.
    fn settle(&mut self, screen_all: bool, rng: &mut Randomizer) {
        if !screen_all || self.alternatives.is_empty() {
            return;
        }
        let i = rng.next_int(self.alternatives.len());
        let (link, mappings) = &self.alternatives[i];
        self.chosen_mapping = rng.choose_one(mappings).cloned();
        self.chosen_link = Some(link.clone());
    }

    pub fn found_alternative_link(&self) -> bool {
        self.chosen_link.is_some()
    }

    pub fn chosen_link(&self) -> Option<&Vertex> {
        self.chosen_link.as_ref()
    }

    pub fn chosen_mapping(&self) -> Option<&ApMapping> {
        self.chosen_mapping.as_ref()
    }

    /// Every valid candidate with all its mappings. Filled only when
    /// searching with `screen_all`.
    pub fn all_alternatives(&self) -> &[(Vertex, Vec<ApMapping>)] {
        &self.alternatives
    }
}

/// Library positions to try. Scaffolds are replaced by scaffolds and
/// fragments by fragments; capping groups are never replaced.
fn candidate_ids(
    space: &FragmentSpace,
    bb_type: BBType,
    new_bb_id: Option<usize>,
) -> Result<Vec<usize>, FragmentSpaceError> {
    if let Some(id) = new_bb_id {
        space.get_vertex(bb_type, id)?;
        return Ok(vec![id]);
    }
    match bb_type {
        BBType::Fragment | BBType::Scaffold => Ok((0..space.library_size(bb_type)?).collect()),
        BBType::Cap | BBType::Undefined => Ok(Vec::new()),
    }
}

/// Candidate APs for the two ends of `edge`: the source end needs an AP
/// it can bond to, the target end an AP that can bond to it.
fn edge_table(
    rules: &CompatibilityRules,
    edge: &Edge,
    src_class: &Option<APClass>,
    trg_class: &Option<APClass>,
    candidate: &Vertex,
) -> CompatTable {
    let class_based = rules.is_class_based();
    let mut table = CompatTable::new();
    for (i, ap) in candidate.aps().iter().enumerate() {
        let ok = !class_based
            || matches!((src_class, &ap.class), (Some(s), Some(c)) if rules.is_compatible(s, c));
        if ok {
            table.push(edge.src, Some(candidate.ap_id(i)));
        }
    }
    for (i, ap) in candidate.aps().iter().enumerate() {
        let ok = !class_based
            || matches!((&ap.class, trg_class), (Some(c), Some(t)) if rules.is_compatible(c, t));
        if ok {
            table.push(edge.trg, Some(candidate.ap_id(i)));
        }
    }
    table
}
