//! Graphs of building blocks joined through attachment points.

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_isomorphic_matching;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::unionfind::UnionFind;
use thiserror::Error;

use crate::apclass::BondType;
use crate::vertex::{ApId, ApRole, ApUser, AttachmentPoint, BBType, Vertex, VertexId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("vertex {0} is not part of the graph")]
    UnknownVertex(VertexId),
    #[error("vertex {0} is already part of the graph")]
    DuplicateVertex(VertexId),
    #[error("attachment point {0} does not exist")]
    ApOutOfRange(ApId),
    #[error("attachment point {0} is already in use")]
    ApInUse(ApId),
    #[error("cannot link vertex {0} to itself")]
    SelfLoop(VertexId),
}

/// A bond between two attachment points. The edge runs from `src` to `trg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: ApId,
    pub trg: ApId,
    pub bond_type: BondType,
}

#[derive(Debug, Clone, Default)]
pub struct DGraph {
    graph: DiGraph<Vertex, Edge>,
    nodes: HashMap<VertexId, NodeIndex>,
    symmetric_vertices: Vec<Vec<VertexId>>,
    rings: Vec<Vec<VertexId>>,
}

impl DGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<VertexId, GraphError> {
        let id = vertex.id();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateVertex(id));
        }
        let idx = self.graph.add_node(vertex);
        self.nodes.insert(id, idx);
        Ok(id)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.nodes.get(&id).map(|&idx| &self.graph[idx])
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices().map(Vertex::id).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.graph.edge_weights()
    }

    pub fn ap(&self, ap: ApId) -> Option<&AttachmentPoint> {
        self.vertex(ap.vertex).and_then(|v| v.ap(ap.index))
    }

    /// Joins two free APs. The bond type is taken from the source class.
    pub fn add_edge(&mut self, src: ApId, trg: ApId) -> Result<(), GraphError> {
        if src.vertex == trg.vertex {
            return Err(GraphError::SelfLoop(src.vertex));
        }
        let src_idx = self.node_of(src.vertex)?;
        let trg_idx = self.node_of(trg.vertex)?;
        let src_ap = self.graph[src_idx]
            .ap(src.index)
            .ok_or(GraphError::ApOutOfRange(src))?;
        if !src_ap.is_available() {
            return Err(GraphError::ApInUse(src));
        }
        let bond_type = src_ap
            .class
            .as_ref()
            .map(|c| c.bond_type())
            .unwrap_or(BondType::Undefined);
        let trg_ap = self.graph[trg_idx]
            .ap(trg.index)
            .ok_or(GraphError::ApOutOfRange(trg))?;
        if !trg_ap.is_available() {
            return Err(GraphError::ApInUse(trg));
        }

        self.set_user(src_idx, src, trg, ApRole::Source);
        self.set_user(trg_idx, trg, src, ApRole::Target);
        self.graph.add_edge(
            src_idx,
            trg_idx,
            Edge {
                src,
                trg,
                bond_type,
            },
        );
        Ok(())
    }

    fn set_user(&mut self, idx: NodeIndex, ap: ApId, partner: ApId, role: ApRole) {
        if let Some(a) = self.graph[idx].ap_mut(ap.index) {
            a.user = Some(ApUser { partner, role });
        }
    }

    fn node_of(&self, id: VertexId) -> Result<NodeIndex, GraphError> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or(GraphError::UnknownVertex(id))
    }

    /// All APs not used by an edge of this graph, vertex by vertex.
    pub fn free_aps(&self) -> Vec<ApId> {
        self.vertices()
            .flat_map(|v| {
                v.aps()
                    .iter()
                    .enumerate()
                    .filter(|(_, ap)| ap.is_available())
                    .map(move |(i, _)| v.ap_id(i))
            })
            .collect()
    }

    /// APs of `vertices` used by edges that leave the set.
    pub fn interface_aps(&self, vertices: &[VertexId]) -> Vec<ApId> {
        let inside: HashSet<VertexId> = vertices.iter().copied().collect();
        vertices
            .iter()
            .filter_map(|id| self.vertex(*id))
            .flat_map(|v| {
                v.aps()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, ap)| ap.user.map(|u| (i, u)))
                    .filter(|(_, u)| !inside.contains(&u.partner.vertex))
                    .map(move |(i, _)| v.ap_id(i))
            })
            .collect()
    }

    pub fn add_symmetric_vertex_set(&mut self, set: Vec<VertexId>) -> Result<(), GraphError> {
        if let Some(missing) = set.iter().find(|id| !self.contains(**id)) {
            return Err(GraphError::UnknownVertex(*missing));
        }
        if set.len() > 1 {
            self.symmetric_vertices.push(set);
        }
        Ok(())
    }

    pub fn symmetric_vertex_sets(&self) -> &[Vec<VertexId>] {
        &self.symmetric_vertices
    }

    pub fn symmetric_set_of(&self, id: VertexId) -> Option<&[VertexId]> {
        self.symmetric_vertices
            .iter()
            .find(|s| s.contains(&id))
            .map(Vec::as_slice)
    }

    pub fn add_ring(&mut self, ring: Vec<VertexId>) -> Result<(), GraphError> {
        if let Some(missing) = ring.iter().find(|id| !self.contains(**id)) {
            return Err(GraphError::UnknownVertex(*missing));
        }
        self.rings.push(ring);
        Ok(())
    }

    pub fn rings(&self) -> &[Vec<VertexId>] {
        &self.rings
    }

    /// Groups rings that share at least one vertex, transitively. Each
    /// system lists its vertices once, in order of first appearance.
    pub fn fused_ring_systems(&self) -> Vec<Vec<VertexId>> {
        let n = self.rings.len();
        let mut uf = UnionFind::<usize>::new(n);
        let mut owner: HashMap<VertexId, usize> = HashMap::new();
        for (i, ring) in self.rings.iter().enumerate() {
            for v in ring {
                match owner.get(v) {
                    Some(&j) => {
                        uf.union(i, j);
                    }
                    None => {
                        owner.insert(*v, i);
                    }
                }
            }
        }

        let mut systems: Vec<Vec<VertexId>> = Vec::new();
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        for (i, ring) in self.rings.iter().enumerate() {
            let root = uf.find(i);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                systems.push(Vec::new());
                systems.len() - 1
            });
            for v in ring {
                if !systems[slot].contains(v) {
                    systems[slot].push(*v);
                }
            }
        }
        systems
    }

    /// Copy of the part of the graph spanned by `vertices`. Vertex ids are
    /// kept; APs bound to vertices outside the set become free. Rings and
    /// symmetric sets survive only for the members inside.
    pub fn subgraph(&self, vertices: &[VertexId]) -> Result<DGraph, GraphError> {
        let inside: HashSet<VertexId> = vertices.iter().copied().collect();
        let mut sub = DGraph::new();
        for id in self.graph.node_indices().map(|idx| self.graph[idx].id()) {
            if !inside.contains(&id) {
                continue;
            }
            let mut v = self.graph[self.node_of(id)?].clone();
            for i in 0..v.ap_count() {
                if let Some(ap) = v.ap_mut(i) {
                    ap.user = None;
                }
            }
            sub.add_vertex(v)?;
        }
        if let Some(missing) = vertices.iter().find(|id| !self.contains(**id)) {
            return Err(GraphError::UnknownVertex(*missing));
        }
        for e in self.graph.edge_weights() {
            if inside.contains(&e.src.vertex) && inside.contains(&e.trg.vertex) {
                sub.add_edge(e.src, e.trg)?;
            }
        }
        for set in &self.symmetric_vertices {
            let kept: Vec<VertexId> = set.iter().copied().filter(|v| inside.contains(v)).collect();
            sub.add_symmetric_vertex_set(kept)?;
        }
        for ring in &self.rings {
            if ring.iter().all(|v| inside.contains(v)) {
                sub.add_ring(ring.clone())?;
            }
        }
        Ok(sub)
    }

    pub fn contains_bb_type(&self, bb_type: BBType) -> bool {
        self.vertices().any(|v| v.bb_type() == bb_type)
    }

    /// Structural isomorphism ignoring vertex ids: vertices must be the same
    /// building block with the same content and edges must join the same
    /// AP indices with the same bond type.
    pub fn is_isomorphic_to(&self, other: &DGraph) -> bool {
        if self.vertex_count() != other.vertex_count() || self.edge_count() != other.edge_count()
        {
            return false;
        }
        is_isomorphic_matching(
            &self.graph,
            &other.graph,
            |a: &Vertex, b: &Vertex| a.same_as(b),
            |a: &Edge, b: &Edge| {
                a.src.index == b.src.index
                    && a.trg.index == b.trg.index
                    && a.bond_type == b.bond_type
            },
        )
    }
}
