//! Attachment-point compatibility rules.
//!
//! The compatibility relation is directed: `a -> [b, ...]` says that an AP
//! of class `a` (the source end of a bond) may be joined to an AP of class
//! `b` (the target end). Nothing is mirrored implicitly.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::apclass::APClass;

/// Tolerance used when deciding whether a symmetry probability means
/// "always".
pub const SYMMETRY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityRules {
    compatibility: BTreeMap<APClass, Vec<APClass>>,
    capping: BTreeMap<APClass, APClass>,
    forbidden_ends: BTreeSet<APClass>,
    ring_closure: BTreeMap<APClass, Vec<APClass>>,
    symmetry_constraints: BTreeMap<APClass, f64>,
}

impl CompatibilityRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compatibility(&mut self, src: APClass, trg: APClass) -> &mut Self {
        let list = self.compatibility.entry(src).or_default();
        if !list.contains(&trg) {
            list.push(trg);
        }
        self
    }

    pub fn set_compatible_classes(&mut self, src: APClass, trgs: Vec<APClass>) -> &mut Self {
        self.compatibility.insert(src, trgs);
        self
    }

    pub fn set_capping(&mut self, src: APClass, cap: APClass) -> &mut Self {
        self.capping.insert(src, cap);
        self
    }

    pub fn add_forbidden_end(&mut self, apc: APClass) -> &mut Self {
        self.forbidden_ends.insert(apc);
        self
    }

    pub fn add_ring_closure_compatibility(&mut self, a: APClass, b: APClass) -> &mut Self {
        let list = self.ring_closure.entry(a).or_default();
        if !list.contains(&b) {
            list.push(b);
        }
        self
    }

    pub fn set_symmetry_constraint(&mut self, apc: APClass, probability: f64) -> &mut Self {
        self.symmetry_constraints
            .insert(apc, probability.clamp(0.0, 1.0));
        self
    }

    /// The classes `apc` may bond to. Undefined classes have none.
    pub fn compatible_classes(&self, apc: &APClass) -> &[APClass] {
        self.compatibility
            .get(apc)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_compatible(&self, src: &APClass, trg: &APClass) -> bool {
        self.compatible_classes(src).contains(trg)
    }

    pub fn compatibility_map(&self) -> &BTreeMap<APClass, Vec<APClass>> {
        &self.compatibility
    }

    /// Every class appearing in the compatibility map, as key or value.
    pub fn all_classes_in_compatibility_map(&self) -> BTreeSet<APClass> {
        self.compatibility
            .iter()
            .flat_map(|(k, vs)| std::iter::once(k).chain(vs.iter()))
            .cloned()
            .collect()
    }

    pub fn capping_class(&self, apc: &APClass) -> Option<&APClass> {
        self.capping.get(apc)
    }

    pub fn capping_map(&self) -> &BTreeMap<APClass, APClass> {
        &self.capping
    }

    pub fn is_forbidden_end(&self, apc: &APClass) -> bool {
        self.forbidden_ends.contains(apc)
    }

    pub fn forbidden_ends(&self) -> &BTreeSet<APClass> {
        &self.forbidden_ends
    }

    pub fn has_ring_closure_rules(&self) -> bool {
        !self.ring_closure.is_empty()
    }

    /// Ring closures are symmetric: either direction in the map suffices.
    pub fn is_ring_closure_compatible(&self, a: &APClass, b: &APClass) -> bool {
        let listed = |x: &APClass, y: &APClass| {
            self.ring_closure
                .get(x)
                .map(|l| l.contains(y))
                .unwrap_or(false)
        };
        listed(a, b) || listed(b, a)
    }

    pub fn has_symmetry_constraints(&self) -> bool {
        !self.symmetry_constraints.is_empty()
    }

    pub fn has_symmetry_constraint(&self, apc: &APClass) -> bool {
        self.symmetry_constraints.contains_key(apc)
    }

    pub fn symmetry_constraint(&self, apc: &APClass) -> Option<f64> {
        self.symmetry_constraints.get(apc).copied()
    }

    pub fn symmetry_constraints(&self) -> &BTreeMap<APClass, f64> {
        &self.symmetry_constraints
    }

    /// Whether symmetric APs of class `apc` must receive identical
    /// substitutions. A class-specific constraint wins over the global
    /// `enforce_symmetry` switch.
    pub fn impose_symmetry_on_aps_of_class(&self, apc: &APClass, enforce_symmetry: bool) -> bool {
        match self.symmetry_constraint(apc) {
            Some(p) => p >= 1.0 - SYMMETRY_TOLERANCE,
            None => enforce_symmetry,
        }
    }

    /// Class-based selection is used iff compatibility rules exist.
    pub fn is_class_based(&self) -> bool {
        !self.compatibility.is_empty()
    }
}
