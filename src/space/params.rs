//! Settings of a fragment space, loadable from TOML.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::finder::{MappingOptions, DEFAULT_MAX_COMBINATIONS};

#[derive(Debug, Error)]
pub enum ParametersError {
    #[error("cannot read parameters file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed parameters: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpaceParameters {
    #[serde(default)]
    pub enforce_symmetry: bool,
    #[serde(default = "default_max_combinations")]
    pub max_ap_mapping_combinations: usize,
    #[serde(default = "default_max_combinations")]
    pub max_greedy_attempts: usize,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default = "default_max_heavy_atoms")]
    pub max_heavy_atoms: usize,
    #[serde(default = "default_max_rotatable_bonds")]
    pub max_rotatable_bonds: usize,
    #[serde(default = "default_max_molecular_weight")]
    pub max_molecular_weight: f64,
    #[serde(default = "default_true")]
    pub add_fused_rings_as_scaffolds: bool,
    #[serde(default = "default_true")]
    pub add_fused_rings_as_fragments: bool,
}

fn default_max_combinations() -> usize {
    DEFAULT_MAX_COMBINATIONS
}

fn default_max_heavy_atoms() -> usize {
    100
}

fn default_max_rotatable_bonds() -> usize {
    20
}

fn default_max_molecular_weight() -> f64 {
    500.0
}

fn default_true() -> bool {
    true
}

impl Default for FragmentSpaceParameters {
    fn default() -> Self {
        Self {
            enforce_symmetry: false,
            max_ap_mapping_combinations: default_max_combinations(),
            max_greedy_attempts: default_max_combinations(),
            random_seed: None,
            max_heavy_atoms: default_max_heavy_atoms(),
            max_rotatable_bonds: default_max_rotatable_bonds(),
            max_molecular_weight: default_max_molecular_weight(),
            add_fused_rings_as_scaffolds: true,
            add_fused_rings_as_fragments: true,
        }
    }
}

impl FragmentSpaceParameters {
    pub fn from_toml_str(s: &str) -> Result<Self, ParametersError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParametersError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions {
            max_combinations: self.max_ap_mapping_combinations,
            max_greedy_attempts: self.max_greedy_attempts,
            ..MappingOptions::default()
        }
    }

    /// One `name = value` line per recognised option.
    pub fn describe(&self) -> String {
        let seed = match self.random_seed {
            Some(s) => s.to_string(),
            None => "none".to_string(),
        };
        let rows: [(&str, String); 9] = [
            ("enforce_symmetry", self.enforce_symmetry.to_string()),
            (
                "max_ap_mapping_combinations",
                self.max_ap_mapping_combinations.to_string(),
            ),
            ("max_greedy_attempts", self.max_greedy_attempts.to_string()),
            ("random_seed", seed),
            ("max_heavy_atoms", self.max_heavy_atoms.to_string()),
            ("max_rotatable_bonds", self.max_rotatable_bonds.to_string()),
            ("max_molecular_weight", self.max_molecular_weight.to_string()),
            (
                "add_fused_rings_as_scaffolds",
                self.add_fused_rings_as_scaffolds.to_string(),
            ),
            (
                "add_fused_rings_as_fragments",
                self.add_fused_rings_as_fragments.to_string(),
            ),
        ];
        let mut out = String::new();
        for (name, value) in rows {
            let _ = writeln!(out, "{name} = {value}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let p = FragmentSpaceParameters::from_toml_str("").unwrap();
        assert_eq!(p, FragmentSpaceParameters::default());
        assert_eq!(p.max_ap_mapping_combinations, 250);
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let p = FragmentSpaceParameters::from_toml_str(
            "enforce_symmetry = true\nrandom_seed = 42\nmax_ap_mapping_combinations = 10\n",
        )
        .unwrap();
        assert!(p.enforce_symmetry);
        assert_eq!(p.random_seed, Some(42));
        assert_eq!(p.mapping_options().max_combinations, 10);
        assert_eq!(p.max_heavy_atoms, 100);
    }

    #[test]
    fn bad_toml_is_reported() {
        let err = FragmentSpaceParameters::from_toml_str("enforce_symmetry = 3").unwrap_err();
        assert!(matches!(err, ParametersError::Toml(_)));
    }

    #[test]
    fn describe_lists_every_option() {
        let text = FragmentSpaceParameters::default().describe();
        assert_eq!(text.lines().count(), 9);
        assert!(text.contains("random_seed = none"));
        assert!(text.contains("max_molecular_weight = 500"));
    }
}
