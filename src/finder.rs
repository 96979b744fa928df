//! Search for one-to-one mappings between two lists of attachment points.
//!
//! List A holds the APs that define the requirements (typically those of a
//! vertex about to be replaced), list B the candidates (the APs of the
//! replacement). APs of A that are bound by an edge must be mapped; free
//! ones may be left out.

use std::collections::HashSet;

use tracing::debug;

use crate::compat::CompatibilityRules;
use crate::mapping::ApMapping;
use crate::random::Randomizer;
use crate::scope::{Availability, ResolvedAp};
use crate::vertex::{ApId, ApRole};

/// Default ceiling on the number of mappings collected by a search.
pub const DEFAULT_MAX_COMBINATIONS: usize = 250;

/// For each key AP, the candidates it may be paired with. `None` means
/// "leave the key unmapped". Keys keep the order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatTable {
    entries: Vec<(ApId, Vec<Option<ApId>>)>,
}

impl CompatTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: ApId, candidate: Option<ApId>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, list)) => list.push(candidate),
            None => self.entries.push((key, vec![candidate])),
        }
    }

    pub fn candidates(&self, key: &ApId) -> &[Option<ApId>] {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, l)| l.as_slice())
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &ApId> + '_ {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn contains_key(&self, key: &ApId) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn all_candidates(&self) -> HashSet<ApId> {
        self.entries
            .iter()
            .flat_map(|(_, l)| l.iter().flatten().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(ApId, Vec<Option<ApId>>)] {
        &self.entries
    }
}

/// Outcome of [`combine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Combinations {
    pub mappings: Vec<ApMapping>,
    /// The ceiling was hit and the search stopped early.
    pub truncated: bool,
}

/// Enumerates the ways of extending `seed` by giving each key of `entries`
/// one of its candidates, never reusing a value. A `None` candidate leaves
/// its key out. Only non-empty mappings are reported.
///
/// With `limit = Some(n)` the search stops as soon as `n` mappings have
/// been collected and reports `truncated`.
pub fn combine(
    entries: &[(ApId, Vec<Option<ApId>>)],
    seed: &ApMapping,
    limit: Option<usize>,
) -> Combinations {
    let Some(((key, candidates), rest)) = entries.split_first() else {
        return Combinations::default();
    };
    let mut found = Vec::new();
    for candidate in candidates {
        let partial = match candidate {
            Some(value) if seed.contains_value(value) => continue,
            Some(value) => seed.with(*key, *value),
            None => seed.clone(),
        };
        if rest.is_empty() {
            if !partial.is_empty() {
                found.push(partial);
                if limit.is_some_and(|n| found.len() >= n) {
                    return Combinations {
                        mappings: found,
                        truncated: true,
                    };
                }
            }
        } else {
            let remaining = limit.map(|n| n.saturating_sub(found.len()));
            let deeper = combine(rest, &partial, remaining);
            found.extend(deeper.mappings);
            if deeper.truncated {
                return Combinations {
                    mappings: found,
                    truncated: true,
                };
            }
        }
    }
    Combinations {
        mappings: found,
        truncated: false,
    }
}

/// Whether AP `b` may take the place of AP `a` in a mapping.
///
/// A free `a` accepts anything when `compatible_if_free` is set and
/// otherwise only its own class. A bound `a` accepts the classes that can
/// bond to its partner, in the direction of the existing edge.
pub fn is_mapping_compatible(
    rules: &CompatibilityRules,
    a: &ResolvedAp,
    b: &ResolvedAp,
    compatible_if_free: bool,
) -> bool {
    if !rules.is_class_based() {
        return true;
    }
    match &a.availability {
        Availability::Free => {
            compatible_if_free || (a.class.is_some() && a.class == b.class)
        }
        Availability::Used {
            partner_class,
            role,
            ..
        } => match (partner_class, &b.class) {
            (Some(linked), Some(cand)) => match role {
                ApRole::Source => rules.is_compatible(cand, linked),
                ApRole::Target => rules.is_compatible(linked, cand),
            },
            _ => false,
        },
        Availability::Hidden => false,
    }
}

pub fn compatibility_table(
    rules: &CompatibilityRules,
    list_a: &[ResolvedAp],
    list_b: &[ResolvedAp],
    compatible_if_free: bool,
) -> CompatTable {
    let mut table = CompatTable::new();
    for a in list_a {
        for b in list_b {
            if is_mapping_compatible(rules, a, b, compatible_if_free) {
                table.push(a.id, Some(b.id));
            }
        }
    }
    table
}

/// Switches of a mapping search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOptions {
    /// Pairs imposed up front. Their APs are taken out of both lists and
    /// every result starts with them.
    pub fixed: Option<ApMapping>,
    /// APs of A that must be keys. `None` means the APs of A that are
    /// bound by an edge.
    pub required_a: Option<Vec<ApId>>,
    /// APs of B that must be values.
    pub required_b: Vec<ApId>,
    /// Collect every mapping instead of stopping at the ceiling.
    pub screen_all: bool,
    /// Every AP of both lists must be mapped.
    pub only_complete: bool,
    pub compatible_if_free: bool,
    pub max_combinations: usize,
    pub max_greedy_attempts: usize,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            fixed: None,
            required_a: None,
            required_b: Vec::new(),
            screen_all: false,
            only_complete: false,
            compatible_if_free: true,
            max_combinations: DEFAULT_MAX_COMBINATIONS,
            max_greedy_attempts: DEFAULT_MAX_COMBINATIONS,
        }
    }
}

/// Result of a mapping search between two AP lists.
#[derive(Debug, Clone, Default)]
pub struct ApMapFinder {
    all: Vec<ApMapping>,
    chosen: Option<ApMapping>,
    truncated: bool,
}

impl ApMapFinder {
    pub fn find(
        rules: &CompatibilityRules,
        list_a: &[ResolvedAp],
        list_b: &[ResolvedAp],
        options: &MappingOptions,
        rng: &mut Randomizer,
    ) -> Self {
        let fixed = options.fixed.clone().unwrap_or_default();
        let purged_a: Vec<ResolvedAp> = list_a
            .iter()
            .filter(|ap| !fixed.contains_key(&ap.id))
            .cloned()
            .collect();
        let purged_b: Vec<ResolvedAp> = list_b
            .iter()
            .filter(|ap| !fixed.contains_value(&ap.id))
            .cloned()
            .collect();

        let mut table =
            compatibility_table(rules, &purged_a, &purged_b, options.compatible_if_free);

        let mut needy_a: Vec<ApId> = match &options.required_a {
            Some(req) => req.clone(),
            None => list_a.iter().filter(|ap| ap.is_used()).map(|ap| ap.id).collect(),
        };
        let mut needy_b = options.required_b.clone();
        if options.only_complete {
            push_missing(&mut needy_a, list_a.iter().map(|ap| ap.id));
            push_missing(&mut needy_b, list_b.iter().map(|ap| ap.id));
        }

        let doable_b = table.all_candidates();
        let doable = needy_a
            .iter()
            .filter(|ap| !fixed.contains_key(ap))
            .all(|ap| table.contains_key(ap))
            && needy_b
                .iter()
                .filter(|ap| !fixed.contains_value(ap))
                .all(|ap| doable_b.contains(ap));
        if !doable {
            debug!(
                required_a = needy_a.len(),
                required_b = needy_b.len(),
                "AP mapping cannot cover the required APs"
            );
            return Self::default();
        }

        if !options.only_complete {
            for ap in &purged_a {
                if ap.is_available_throughout() && table.contains_key(&ap.id) {
                    table.push(ap.id, None);
                }
            }
        }

        let (mut all, truncated) = if table.is_empty() {
            (vec![fixed.clone()], false)
        } else {
            let limit = (!options.screen_all).then_some(options.max_combinations);
            let found = combine(table.entries(), &fixed, limit);
            (found.mappings, found.truncated)
        };

        all.retain(|m| m.contains_all_keys(&needy_a) && m.contains_all_values(&needy_b));

        if truncated && all.is_empty() {
            let must: Vec<ApId> = needy_a
                .iter()
                .copied()
                .filter(|ap| !fixed.contains_key(ap))
                .collect();
            if let Some(m) = greedy_mapping(
                &table,
                &must,
                &fixed,
                &needy_b,
                options.max_greedy_attempts,
                rng,
            ) {
                all.push(m);
            }
        }

        let chosen = rng.choose_one(&all).cloned();
        Self {
            all,
            chosen,
            truncated,
        }
    }

    pub fn found_mapping(&self) -> bool {
        !self.all.is_empty()
    }

    pub fn all_mappings(&self) -> &[ApMapping] {
        &self.all
    }

    pub fn chosen_mapping(&self) -> Option<&ApMapping> {
        self.chosen.as_ref()
    }

    pub fn into_all_mappings(self) -> Vec<ApMapping> {
        self.all
    }

    pub fn was_truncated(&self) -> bool {
        self.truncated
    }
}

fn push_missing(list: &mut Vec<ApId>, extra: impl Iterator<Item = ApId>) {
    for ap in extra {
        if !list.contains(&ap) {
            list.push(ap);
        }
    }
}

/// Randomised greedy pairing of the required keys: each key takes the
/// first unused candidate in a shuffled order, and an attempt is abandoned
/// at the first key left without one.
fn greedy_mapping(
    table: &CompatTable,
    must: &[ApId],
    fixed: &ApMapping,
    needy_b: &[ApId],
    attempts: usize,
    rng: &mut Randomizer,
) -> Option<ApMapping> {
    if must.is_empty() {
        return None;
    }
    'attempt: for _ in 0..attempts {
        let mut keys = must.to_vec();
        rng.shuffle(&mut keys);
        let mut mapping = fixed.clone();
        for key in keys {
            let mut partners: Vec<ApId> = table.candidates(&key).iter().flatten().copied().collect();
            rng.shuffle(&mut partners);
            match partners.into_iter().find(|p| !mapping.contains_value(p)) {
                Some(p) => {
                    mapping.insert(key, p);
                }
                None => continue 'attempt,
            }
        }
        if mapping.contains_all_values(needy_b) {
            return Some(mapping);
        }
    }
    None
}

/// Mappings that pair each AP of `list_a`, taken as the source end of a
/// new bond, with a class-compatible AP of `list_b`. Stops after
/// `max_combinations` mappings.
pub fn map_class_compatibilities(
    rules: &CompatibilityRules,
    list_a: &[ResolvedAp],
    list_b: &[ResolvedAp],
    max_combinations: usize,
) -> Vec<ApMapping> {
    let mut table = CompatTable::new();
    for a in list_a {
        for b in list_b {
            let compatible = !rules.is_class_based()
                || matches!((&a.class, &b.class), (Some(ca), Some(cb)) if rules.is_compatible(ca, cb));
            if compatible {
                table.push(a.id, Some(b.id));
            }
        }
    }
    combine(table.entries(), &ApMapping::new(), Some(max_combinations)).mappings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apclass::APClass;
    use crate::graph::DGraph;
    use crate::scope::Scope;
    use crate::vertex::{BBType, Vertex, VertexId};

    fn apc(s: &str) -> APClass {
        APClass::parse(s).unwrap()
    }

    fn rules() -> CompatibilityRules {
        let mut r = CompatibilityRules::new();
        r.add_compatibility(apc("find_a:0"), apc("find_a:0"))
            .add_compatibility(apc("find_a:0"), apc("find_d:0"))
            .add_compatibility(apc("find_d:0"), apc("find_a:0"));
        r
    }

    fn free_vertex(classes: &[&str]) -> Vertex {
        Vertex::molecular(
            BBType::Fragment,
            "C",
            classes.iter().map(|c| apc(c)).collect(),
        )
    }

    fn ids(n: usize) -> (VertexId, VertexId, Vec<ApId>, Vec<ApId>) {
        let a = VertexId::fresh();
        let b = VertexId::fresh();
        (
            a,
            b,
            (0..n).map(|i| ApId::new(a, i)).collect(),
            (0..n).map(|i| ApId::new(b, i)).collect(),
        )
    }

    #[test]
    fn combine_counts_partial_mappings() {
        let (_, _, ka, kb) = ids(2);
        let entries = vec![
            (ka[0], vec![Some(kb[0]), Some(kb[1]), None]),
            (ka[1], vec![Some(kb[0]), Some(kb[1]), None]),
        ];
        let all = combine(&entries, &ApMapping::new(), None);
        assert!(!all.truncated);
        assert_eq!(all.mappings.len(), 6);
        assert_eq!(all.mappings.iter().filter(|m| m.len() == 2).count(), 2);
        assert!(all.mappings.iter().all(ApMapping::is_one_to_one));
    }

    #[test]
    fn combine_stops_at_limit() {
        let (_, _, ka, kb) = ids(3);
        let cands: Vec<Option<ApId>> = kb.iter().copied().map(Some).collect();
        let entries: Vec<_> = ka.iter().map(|k| (*k, cands.clone())).collect();
        let full = combine(&entries, &ApMapping::new(), None);
        assert_eq!(full.mappings.len(), 6);
        let cut = combine(&entries, &ApMapping::new(), Some(4));
        assert!(cut.truncated);
        assert_eq!(cut.mappings, full.mappings[..4].to_vec());
        let exact = combine(&entries, &ApMapping::new(), Some(6));
        assert!(exact.truncated);
        let loose = combine(&entries, &ApMapping::new(), Some(7));
        assert!(!loose.truncated);
    }

    #[test]
    fn combine_respects_seed_values() {
        let (_, _, ka, kb) = ids(2);
        let seed: ApMapping = [(ka[1], kb[0])].into_iter().collect();
        let entries = vec![(ka[0], vec![Some(kb[0]), Some(kb[1])])];
        let all = combine(&entries, &seed, None);
        assert_eq!(all.mappings.len(), 1);
        assert_eq!(all.mappings[0].to_index_pairs(), vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn free_vertices_all_mappings() {
        let va = free_vertex(&["find_a:0", "find_d:0"]);
        let vb = free_vertex(&["find_a:0", "find_d:0"]);
        let la = ResolvedAp::standalone(&va);
        let lb = ResolvedAp::standalone(&vb);
        let mut rng = Randomizer::seeded(1);
        let opts = MappingOptions {
            screen_all: true,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &opts, &mut rng);
        assert!(f.found_mapping());
        assert_eq!(f.all_mappings().len(), 6);
        assert_eq!(f.all_mappings().iter().filter(|m| m.len() == 1).count(), 4);
        assert!(f.chosen_mapping().is_some());

        let complete = MappingOptions {
            only_complete: true,
            ..opts
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &complete, &mut rng);
        assert_eq!(f.all_mappings().len(), 2);
    }

    #[test]
    fn free_aps_match_own_class_without_compatible_if_free() {
        let va = free_vertex(&["find_a:0", "find_d:0"]);
        let vb = free_vertex(&["find_d:0", "find_a:0"]);
        let la = ResolvedAp::standalone(&va);
        let lb = ResolvedAp::standalone(&vb);
        let opts = MappingOptions {
            compatible_if_free: false,
            only_complete: true,
            screen_all: true,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &opts, &mut Randomizer::seeded(2));
        assert_eq!(f.all_mappings().len(), 1);
        assert_eq!(f.all_mappings()[0].to_index_pairs(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn empty_list_a_gives_empty_mapping() {
        let vb = free_vertex(&["find_a:0"]);
        let lb = ResolvedAp::standalone(&vb);
        let f = ApMapFinder::find(
            &rules(),
            &[],
            &lb,
            &MappingOptions::default(),
            &mut Randomizer::seeded(3),
        );
        assert!(f.found_mapping());
        assert!(f.chosen_mapping().unwrap().is_empty());
    }

    /// hub(find_a) -> middle(find_a, find_d) <- tail(find_d) where the
    /// middle vertex is the one to be replaced.
    fn bound_middle() -> (DGraph, VertexId) {
        let mut g = DGraph::new();
        let hub = g.add_vertex(free_vertex(&["find_a:0"])).unwrap();
        let mid = g.add_vertex(free_vertex(&["find_a:0", "find_d:0", "find_a:0"])).unwrap();
        let tail = g.add_vertex(free_vertex(&["find_d:0"])).unwrap();
        g.add_edge(ApId::new(hub, 0), ApId::new(mid, 0)).unwrap();
        g.add_edge(ApId::new(tail, 0), ApId::new(mid, 1)).unwrap();
        (g, mid)
    }

    #[test]
    fn used_aps_follow_edge_direction() {
        let (g, mid) = bound_middle();
        let la = Scope::root(&g).resolve_vertex(mid);
        // find_a -> X needs X in [find_a, find_d]; find_d -> X needs X in [find_a].
        let cand = free_vertex(&["find_d:0", "find_a:0"]);
        let lb = ResolvedAp::standalone(&cand);
        let r = rules();
        assert!(is_mapping_compatible(&r, &la[0], &lb[0], false));
        assert!(is_mapping_compatible(&r, &la[0], &lb[1], false));
        assert!(!is_mapping_compatible(&r, &la[1], &lb[0], false));
        assert!(is_mapping_compatible(&r, &la[1], &lb[1], false));

        let opts = MappingOptions {
            screen_all: true,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&r, &la, &lb, &opts, &mut Randomizer::seeded(4));
        assert!(f.found_mapping());
        for m in f.all_mappings() {
            assert!(m.contains_key(&la[0].id));
            assert!(m.contains_key(&la[1].id));
            assert!(m.is_one_to_one());
        }
        assert_eq!(f.all_mappings().len(), 1);
        assert_eq!(
            f.all_mappings()[0].to_index_pairs(),
            vec![(0, 0), (1, 1)]
        );
    }

    #[test]
    fn uncoverable_requirements_yield_nothing() {
        let (g, mid) = bound_middle();
        let la = Scope::root(&g).resolve_vertex(mid);
        let cand = free_vertex(&["find_d:0"]);
        let lb = ResolvedAp::standalone(&cand);
        let f = ApMapFinder::find(
            &rules(),
            &la,
            &lb,
            &MappingOptions::default(),
            &mut Randomizer::seeded(5),
        );
        assert!(!f.found_mapping());
        assert!(f.chosen_mapping().is_none());
    }

    #[test]
    fn fixed_pairs_lead_every_mapping() {
        let va = free_vertex(&["find_a:0", "find_a:0"]);
        let vb = free_vertex(&["find_a:0", "find_a:0"]);
        let la = ResolvedAp::standalone(&va);
        let lb = ResolvedAp::standalone(&vb);
        let fixed: ApMapping = [(la[1].id, lb[0].id)].into_iter().collect();
        let opts = MappingOptions {
            fixed: Some(fixed.clone()),
            screen_all: true,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &opts, &mut Randomizer::seeded(6));
        assert_eq!(f.all_mappings().len(), 2);
        for m in f.all_mappings() {
            assert_eq!(m.iter().next(), fixed.iter().next());
        }
    }

    #[test]
    fn required_b_must_be_values() {
        let va = free_vertex(&["find_a:0", "find_a:0"]);
        let vb = free_vertex(&["find_a:0", "find_a:0"]);
        let la = ResolvedAp::standalone(&va);
        let lb = ResolvedAp::standalone(&vb);
        let opts = MappingOptions {
            required_b: vec![lb[1].id],
            screen_all: true,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &opts, &mut Randomizer::seeded(7));
        assert!(f.found_mapping());
        assert!(f.all_mappings().iter().all(|m| m.contains_value(&lb[1].id)));
        assert_eq!(f.all_mappings().len(), 4);
    }

    #[test]
    fn truncated_search_falls_back_to_greedy() {
        // Four bound APs, five candidates. With a ceiling of one the only
        // collected mapping is lb0..lb3, which misses the required lb4.
        let mut g = DGraph::new();
        let mid = g.add_vertex(free_vertex(&["find_a:0"; 4])).unwrap();
        for i in 0..4 {
            let other = g.add_vertex(free_vertex(&["find_a:0"])).unwrap();
            g.add_edge(ApId::new(other, 0), ApId::new(mid, i)).unwrap();
        }
        let la = Scope::root(&g).resolve_vertex(mid);
        let cand = free_vertex(&["find_a:0"; 5]);
        let lb = ResolvedAp::standalone(&cand);
        let opts = MappingOptions {
            required_b: vec![lb[4].id],
            max_combinations: 1,
            ..MappingOptions::default()
        };
        let f = ApMapFinder::find(&rules(), &la, &lb, &opts, &mut Randomizer::seeded(8));
        assert!(f.was_truncated());
        assert!(f.found_mapping());
        let m = f.chosen_mapping().unwrap();
        assert_eq!(m.len(), 4);
        assert!(m.contains_value(&lb[4].id));
    }

    #[test]
    fn class_compatibility_mappings() {
        let va = free_vertex(&["find_d:0", "find_a:0"]);
        let vb = free_vertex(&["find_d:0"]);
        let la = ResolvedAp::standalone(&va);
        let lb = ResolvedAp::standalone(&vb);
        let maps = map_class_compatibilities(&rules(), &la, &lb, 10);
        // find_d -> find_d is not allowed, find_a -> find_d is.
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].to_index_pairs(), vec![(1, 0)]);
    }
}
