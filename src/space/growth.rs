//! Growing the libraries with fused ring systems found in graphs.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::{FragmentSpace, FragmentSpaceError};
use crate::graph::DGraph;
use crate::vertex::{BBType, Geometry, Vertex, VertexId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("geometry extraction failed: {0}")]
pub struct GeometryError(pub String);

/// Supplies coordinates for a subgraph about to become a library entry.
pub trait GeometryExtractor {
    fn extract(&self, graph: &DGraph, subgraph: &DGraph) -> Result<Geometry, GeometryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthOutcome {
    /// Appended as a new building block.
    Added { bb_type: BBType, bb_id: usize },
    /// An isomorphic building block already existed at `bb_id`.
    Duplicate { bb_type: BBType, bb_id: usize },
    /// Growth of that library is switched off.
    Skipped { bb_type: BBType },
}

impl FragmentSpace {
    /// Index of a template in the `bb_type` library whose inner graph is
    /// isomorphic to `graph`.
    pub fn has_isomorph(
        &self,
        graph: &DGraph,
        bb_type: BBType,
    ) -> Result<Option<usize>, FragmentSpaceError> {
        let lib = self.library(bb_type)?;
        let entries = lib.read();
        let vertices = entries
            .as_ref()
            .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type })?;
        Ok(find_isomorph(vertices, graph))
    }

    /// Wraps the vertices `system` of `graph` into a template and appends
    /// it to the scaffold library (if any member is a scaffold) or to the
    /// fragment library, unless an isomorphic template is already there.
    pub fn add_fused_ring_to_library(
        &self,
        graph: &DGraph,
        system: &[VertexId],
        add_if_scaffold: bool,
        add_if_fragment: bool,
        extractor: Option<&dyn GeometryExtractor>,
    ) -> Result<GrowthOutcome, FragmentSpaceError> {
        let sub = graph.subgraph(system)?;
        let bb_type = if sub.contains_bb_type(BBType::Scaffold) {
            BBType::Scaffold
        } else {
            BBType::Fragment
        };
        let wanted = match bb_type {
            BBType::Scaffold => add_if_scaffold,
            _ => add_if_fragment,
        };
        if !wanted {
            return Ok(GrowthOutcome::Skipped { bb_type });
        }

        let lib = self.library(bb_type)?;
        let _growing = lib.lock_growth();

        {
            let entries = lib.read();
            let vertices = entries
                .as_ref()
                .ok_or(FragmentSpaceError::LibraryNotInitialized { bb_type })?;
            if let Some(bb_id) = find_isomorph(vertices, &sub) {
                debug!(%bb_type, bb_id, "fused ring system already in library");
                return Ok(GrowthOutcome::Duplicate { bb_type, bb_id });
            }
        }

        let geometry = match extractor.map(|e| e.extract(graph, &sub)) {
            Some(Ok(g)) => Some(g),
            Some(Err(e)) => {
                warn!(error = %e, "storing fused ring system without geometry");
                None
            }
            None => None,
        };
        let template = Vertex::from_graph(bb_type, sub, geometry);
        let bb_id = self.append_locked(lib, template)?;
        info!(%bb_type, bb_id, "added fused ring system to library");
        Ok(GrowthOutcome::Added { bb_type, bb_id })
    }

    /// Runs [`FragmentSpace::add_fused_ring_to_library`] on every fused
    /// ring system of `graph`.
    pub fn add_fused_rings_to_library(
        &self,
        graph: &DGraph,
        add_if_scaffold: bool,
        add_if_fragment: bool,
        extractor: Option<&dyn GeometryExtractor>,
    ) -> Result<Vec<GrowthOutcome>, FragmentSpaceError> {
        graph
            .fused_ring_systems()
            .iter()
            .map(|system| {
                self.add_fused_ring_to_library(
                    graph,
                    system,
                    add_if_scaffold,
                    add_if_fragment,
                    extractor,
                )
            })
            .collect()
    }

    /// Like [`FragmentSpace::add_fused_rings_to_library`], with the growth
    /// switches taken from the space's parameters.
    pub fn grow_with_fused_rings(
        &self,
        graph: &DGraph,
        extractor: Option<&dyn GeometryExtractor>,
    ) -> Result<Vec<GrowthOutcome>, FragmentSpaceError> {
        let params = self.parameters();
        self.add_fused_rings_to_library(
            graph,
            params.add_fused_rings_as_scaffolds,
            params.add_fused_rings_as_fragments,
            extractor,
        )
    }
}

fn find_isomorph(vertices: &[Vertex], graph: &DGraph) -> Option<usize> {
    vertices.iter().position(|v| {
        v.template()
            .map(|t| t.inner.is_isomorphic_to(graph))
            .unwrap_or(false)
    })
}
