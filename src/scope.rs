//! Attachment-point state across template boundaries.
//!
//! A template vertex wraps a whole inner graph. A free AP of the inner
//! graph is really free only if the outer AP it projects onto is free too,
//! and so on up to the outermost graph. [`Scope`] walks that chain.

use crate::apclass::APClass;
use crate::graph::DGraph;
use crate::vertex::{ApId, ApRole, Vertex, VertexId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Free at every level.
    Free,
    /// Bound by an edge at some level. `partner` and `role` describe that
    /// edge as seen from the AP at that level.
    Used {
        partner: ApId,
        partner_class: Option<APClass>,
        role: ApRole,
    },
    /// Free inside a template that exposes no outer AP for it.
    Hidden,
}

/// An AP together with its state evaluated "throughout".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAp {
    pub id: ApId,
    pub class: Option<APClass>,
    /// The address at which the state was decided.
    pub outermost: ApId,
    pub availability: Availability,
}

impl ResolvedAp {
    pub fn is_available_throughout(&self) -> bool {
        self.availability == Availability::Free
    }

    pub fn is_used(&self) -> bool {
        matches!(self.availability, Availability::Used { .. })
    }

    /// The APs of a vertex that is not part of any graph. Only local state
    /// is known.
    pub fn standalone(vertex: &Vertex) -> Vec<ResolvedAp> {
        vertex
            .aps()
            .iter()
            .enumerate()
            .map(|(i, ap)| {
                let id = vertex.ap_id(i);
                let availability = match ap.user {
                    None => Availability::Free,
                    Some(u) => Availability::Used {
                        partner: u.partner,
                        partner_class: None,
                        role: u.role,
                    },
                };
                ResolvedAp {
                    id,
                    class: ap.class.clone(),
                    outermost: id,
                    availability,
                }
            })
            .collect()
    }
}

/// A graph seen from inside the templates that embed it.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    graph: &'a DGraph,
    jacket: Option<(&'a Scope<'a>, VertexId)>,
}

impl<'a> Scope<'a> {
    pub fn root(graph: &'a DGraph) -> Self {
        Self {
            graph,
            jacket: None,
        }
    }

    /// Scope of the inner graph of template vertex `template`, or `None` if
    /// that vertex is not a template of this graph.
    pub fn nested(&'a self, template: VertexId) -> Option<Scope<'a>> {
        let inner = &self.graph.vertex(template)?.template()?.inner;
        Some(Scope {
            graph: inner,
            jacket: Some((self, template)),
        })
    }

    pub fn graph(&self) -> &'a DGraph {
        self.graph
    }

    pub fn depth(&self) -> usize {
        match self.jacket {
            None => 0,
            Some((outer, _)) => 1 + outer.depth(),
        }
    }

    pub fn resolve(&self, id: ApId) -> Option<ResolvedAp> {
        let class = self.graph.ap(id)?.class.clone();
        let (outermost, availability) = self.state_of(id)?;
        Some(ResolvedAp {
            id,
            class,
            outermost,
            availability,
        })
    }

    fn state_of(&self, id: ApId) -> Option<(ApId, Availability)> {
        let ap = self.graph.ap(id)?;
        if let Some(user) = ap.user {
            let partner_class = self.graph.ap(user.partner).and_then(|p| p.class.clone());
            return Some((
                id,
                Availability::Used {
                    partner: user.partner,
                    partner_class,
                    role: user.role,
                },
            ));
        }
        let Some((outer, template)) = self.jacket else {
            return Some((id, Availability::Free));
        };
        let projected = outer
            .graph
            .vertex(template)
            .and_then(Vertex::template)
            .and_then(|t| t.outer_ap_for(id));
        match projected {
            Some(index) => outer.state_of(ApId::new(template, index)),
            None => Some((id, Availability::Hidden)),
        }
    }

    pub fn resolve_vertex(&self, vertex: VertexId) -> Vec<ResolvedAp> {
        self.graph
            .vertex(vertex)
            .map(|v| v.ap_ids().filter_map(|ap| self.resolve(ap)).collect())
            .unwrap_or_default()
    }

    pub fn is_available_throughout(&self, id: ApId) -> bool {
        self.resolve(id)
            .map(|r| r.is_available_throughout())
            .unwrap_or(false)
    }

    /// Number of APs of `vertex` that are not free throughout.
    pub fn used_ap_count_throughout(&self, vertex: VertexId) -> usize {
        self.resolve_vertex(vertex)
            .iter()
            .filter(|r| !r.is_available_throughout())
            .count()
    }
}
