//! Attachment-point combinatorics over a fragment space.
//!
//! A fragment space is a set of building-block libraries (scaffolds,
//! fragments, capping groups) plus rules saying which attachment-point
//! classes may bond. On top of it this crate finds AP mappings between
//! vertices, alternative links for vertices and edges, and enumerates the
//! ways to complete a graph's free APs.

pub mod apclass;
pub mod combination;
pub mod compat;
pub mod finder;
pub mod graph;
pub mod link;
pub mod mapping;
pub mod random;
pub mod scope;
pub mod space;
pub mod vertex;

pub use apclass::{APClass, BondType, MalformedClassError};
pub use combination::{CombinationError, Destiny, FragsCombination, FragsCombinationIterator, Slot};
pub use compat::CompatibilityRules;
pub use finder::{
    combine, map_class_compatibilities, ApMapFinder, Combinations, CompatTable, MappingOptions,
};
pub use graph::{DGraph, Edge, GraphError};
pub use link::GraphLinkFinder;
pub use mapping::ApMapping;
pub use random::Randomizer;
pub use scope::{Availability, ResolvedAp, Scope};
pub use space::{
    FragmentSpace, FragmentSpaceError, FragmentSpaceParameters, GeometryError, GeometryExtractor,
    GrowthOutcome, LibraryAp, ParametersError,
};
pub use vertex::{
    ApId, AttachmentPoint, BBType, Geometry, Template, Vertex, VertexContent, VertexId,
};
