//! Attachment-point classes.
//!
//! An [`APClass`] labels an attachment point with the cutting rule that
//! created it, a sub-rule discriminator and the bond type implied by the
//! cut. Classes are interned process-wide: [`APClass::make`] returns the
//! one canonical instance for each `(rule, subclass)` pair, so classes can
//! be compared and hashed cheaply and shared between threads.
//!
//! The string form is `rule:subclass`, e.g. `amide:1`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::warn;

/// Separator between rule and subclass in the string form of a class.
pub const SEPARATOR: char = ':';

/// Rules of the ring-closure-attractor classes. Their bond type is fixed.
pub const RCA_RULES: [&str; 3] = ["ATplus", "ATminus", "ATneutral"];

/// Bond order implied by an attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BondType {
    None,
    #[default]
    Single,
    Double,
    Triple,
    Quadruple,
    Any,
    Undefined,
}

impl BondType {
    fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
            Self::Quadruple => 4,
            Self::Any => 5,
            Self::Undefined => 6,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Single,
            2 => Self::Double,
            3 => Self::Triple,
            4 => Self::Quadruple,
            5 => Self::Any,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Single => "SINGLE",
            Self::Double => "DOUBLE",
            Self::Triple => "TRIPLE",
            Self::Quadruple => "QUADRUPLE",
            Self::Any => "ANY",
            Self::Undefined => "UNDEFINED",
        };
        f.write_str(s)
    }
}

impl FromStr for BondType {
    type Err = MalformedClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "SINGLE" => Ok(Self::Single),
            "DOUBLE" => Ok(Self::Double),
            "TRIPLE" => Ok(Self::Triple),
            "QUADRUPLE" => Ok(Self::Quadruple),
            "ANY" => Ok(Self::Any),
            "UNDEFINED" => Ok(Self::Undefined),
            _ => Err(MalformedClassError::BondType(s.to_string())),
        }
    }
}

/// Raised when a class is requested with a malformed rule or string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedClassError {
    #[error("invalid APClass rule '{0}': expected characters in [a-zA-Z0-9_-]")]
    Rule(String),
    #[error("APClass '{0}' does not respect syntax <rule>:<subclass>")]
    ClassString(String),
    #[error("unknown bond type '{0}'")]
    BondType(String),
}

struct ApClassInner {
    rule: String,
    sub_class: u32,
    bond_type: AtomicU8,
}

/// Interned attachment-point class.
#[derive(Clone)]
pub struct APClass(Arc<ApClassInner>);

type Registry = HashMap<(String, u32), APClass>;

fn registry() -> MutexGuard<'static, Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(seeded_registry()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn seeded_registry() -> Registry {
    RCA_RULES
        .iter()
        .map(|rule| {
            let apc = APClass::new_unregistered(rule, 0, BondType::Any);
            ((rule.to_string(), 0), apc)
        })
        .collect()
}

fn rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"))
}

fn subclass_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+$").expect("static regex"))
}

impl APClass {
    fn new_unregistered(rule: &str, sub_class: u32, bond_type: BondType) -> Self {
        Self(Arc::new(ApClassInner {
            rule: rule.to_string(),
            sub_class,
            bond_type: AtomicU8::new(bond_type.to_u8()),
        }))
    }

    /// Returns the canonical class for `rule` and `sub_class`.
    ///
    /// A class created here gets the default bond type; an existing class
    /// keeps whatever bond type it was first defined with.
    pub fn make(rule: &str, sub_class: u32) -> Result<Self, MalformedClassError> {
        Self::intern(rule, sub_class, None)
    }

    /// Like [`APClass::make`], but also sets the bond type.
    ///
    /// Requesting an existing class with a different bond type overwrites
    /// it (with a warning), except for the ring-closure-attractor classes.
    pub fn make_with_bond(
        rule: &str,
        sub_class: u32,
        bond_type: BondType,
    ) -> Result<Self, MalformedClassError> {
        Self::intern(rule, sub_class, Some(bond_type))
    }

    /// Parses a `rule:subclass` string into the canonical class.
    pub fn parse(s: &str) -> Result<Self, MalformedClassError> {
        let (rule, sub) = split_class_string(s)?;
        Self::make(rule, sub)
    }

    pub fn parse_with_bond(s: &str, bond_type: BondType) -> Result<Self, MalformedClassError> {
        let (rule, sub) = split_class_string(s)?;
        Self::make_with_bond(rule, sub, bond_type)
    }

    fn intern(
        rule: &str,
        sub_class: u32,
        bond_type: Option<BondType>,
    ) -> Result<Self, MalformedClassError> {
        if !is_valid_rule(rule) {
            return Err(MalformedClassError::Rule(rule.to_string()));
        }
        let mut reg = registry();
        if let Some(existing) = reg.get(&(rule.to_string(), sub_class)) {
            if let Some(bt) = bond_type {
                let current = existing.bond_type();
                if bt != current && !existing.is_rca() {
                    warn!(class = %existing, from = %current, to = %bt, "changing bond type of APClass");
                    existing.0.bond_type.store(bt.to_u8(), AtomicOrdering::Relaxed);
                }
            }
            return Ok(existing.clone());
        }
        let apc = Self::new_unregistered(rule, sub_class, bond_type.unwrap_or_default());
        reg.insert((rule.to_string(), sub_class), apc.clone());
        Ok(apc)
    }

    /// Forgets every interned class except the ring-closure attractors.
    ///
    /// Instances handed out earlier stay usable and keep comparing equal
    /// by rule and subclass, but a later `make` creates a fresh instance.
    pub fn clear_all() {
        *registry() = seeded_registry();
    }

    /// All interned classes in their string form, sorted.
    pub fn all_as_strings() -> Vec<String> {
        let mut names: Vec<String> = registry().values().map(|c| c.to_string()).collect();
        names.sort();
        names
    }

    pub fn rca_classes() -> Vec<APClass> {
        RCA_RULES
            .iter()
            .filter_map(|rule| Self::make(rule, 0).ok())
            .collect()
    }

    pub fn rule(&self) -> &str {
        &self.0.rule
    }

    pub fn sub_class(&self) -> u32 {
        self.0.sub_class
    }

    pub fn bond_type(&self) -> BondType {
        BondType::from_u8(self.0.bond_type.load(AtomicOrdering::Relaxed))
    }

    pub fn is_rca(&self) -> bool {
        self.0.sub_class == 0 && RCA_RULES.contains(&self.0.rule.as_str())
    }

    /// True if both handles point to the same interned instance.
    pub fn same_instance(&self, other: &APClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// `rule:subclass:BONDTYPE`, the form used in SDF annotations.
    pub fn to_sdf_string(&self) -> String {
        format!("{}{}{}", self, SEPARATOR, self.bond_type())
    }
}

fn split_class_string(s: &str) -> Result<(&str, u32), MalformedClassError> {
    if !is_valid_class_string(s) {
        return Err(MalformedClassError::ClassString(s.to_string()));
    }
    let (rule, sub) = s
        .split_once(SEPARATOR)
        .ok_or_else(|| MalformedClassError::ClassString(s.to_string()))?;
    let sub = sub
        .parse::<u32>()
        .map_err(|_| MalformedClassError::ClassString(s.to_string()))?;
    Ok((rule, sub))
}

pub fn is_valid_rule(s: &str) -> bool {
    rule_regex().is_match(s)
}

/// Checks the `rule:subclass` syntax without interning anything.
pub fn is_valid_class_string(s: &str) -> bool {
    if s.contains(' ') || s.matches(SEPARATOR).count() != 1 {
        return false;
    }
    match s.split_once(SEPARATOR) {
        Some((rule, sub)) => is_valid_rule(rule) && subclass_regex().is_match(sub),
        None => false,
    }
}

impl PartialEq for APClass {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other)
            || (self.0.sub_class == other.0.sub_class && self.0.rule == other.0.rule)
    }
}

impl Eq for APClass {}

impl Hash for APClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.rule.hash(state);
        self.0.sub_class.hash(state);
    }
}

impl PartialOrd for APClass {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for APClass {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .rule
            .cmp(&other.0.rule)
            .then(self.0.sub_class.cmp(&other.0.sub_class))
    }
}

impl fmt::Display for APClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0.rule, SEPARATOR, self.0.sub_class)
    }
}

impl fmt::Debug for APClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "APClass({})", self)
    }
}

impl FromStr for APClass {
    type Err = MalformedClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for APClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for APClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
