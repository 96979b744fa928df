use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::apclass::APClass;
use crate::graph::DGraph;

/// Process-wide vertex identity. Every clone of a building block gets a new
/// one; the building-block id is what ties a vertex back to its library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u64);

static NEXT_VERTEX_ID: AtomicU64 = AtomicU64::new(1);

impl VertexId {
    pub fn fresh() -> Self {
        Self(NEXT_VERTEX_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Address of an attachment point: owner vertex plus index in the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApId {
    pub vertex: VertexId,
    pub index: usize,
}

impl ApId {
    pub fn new(vertex: VertexId, index: usize) -> Self {
        Self { vertex, index }
    }
}

impl fmt::Display for ApId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:ap{}", self.vertex, self.index)
    }
}

/// Side of an edge an attachment point sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApRole {
    Source,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApUser {
    pub partner: ApId,
    pub role: ApRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentPoint {
    pub class: Option<APClass>,
    pub user: Option<ApUser>,
}

impl AttachmentPoint {
    pub fn new(class: Option<APClass>) -> Self {
        Self { class, user: None }
    }

    /// Free in the vertex that owns it. Nesting is handled by
    /// [`crate::scope::Scope`].
    pub fn is_available(&self) -> bool {
        self.user.is_none()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BBType {
    Scaffold,
    Fragment,
    Cap,
    #[default]
    Undefined,
}

impl fmt::Display for BBType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scaffold => "SCAFFOLD",
            Self::Fragment => "FRAGMENT",
            Self::Cap => "CAP",
            Self::Undefined => "UNDEFINED",
        };
        f.write_str(s)
    }
}

/// Cartesian coordinates attached to a template, one row per atom.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub coordinates: Vec<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MolecularFragment {
    pub smiles: String,
}

/// A building block that wraps a whole graph. Outer AP `i` stands for the
/// inner AP `projections[i]`.
#[derive(Debug, Clone)]
pub struct Template {
    pub inner: Box<DGraph>,
    pub projections: Vec<ApId>,
    pub geometry: Option<Geometry>,
}

impl Template {
    pub fn outer_ap_for(&self, inner: ApId) -> Option<usize> {
        self.projections.iter().position(|p| *p == inner)
    }
}

#[derive(Debug, Clone)]
pub enum VertexContent {
    Molecular(MolecularFragment),
    Empty,
    Template(Template),
}

impl VertexContent {
    fn same_as(&self, other: &VertexContent) -> bool {
        match (self, other) {
            (Self::Molecular(a), Self::Molecular(b)) => a == b,
            (Self::Empty, Self::Empty) => true,
            (Self::Template(a), Self::Template(b)) => {
                a.projections.len() == b.projections.len()
                    && a.inner.is_isomorphic_to(&b.inner)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vertex {
    id: VertexId,
    bb_id: usize,
    bb_type: BBType,
    aps: Vec<AttachmentPoint>,
    symmetric_aps: Vec<Vec<usize>>,
    content: VertexContent,
}

impl Vertex {
    pub fn new(bb_type: BBType, content: VertexContent, classes: Vec<Option<APClass>>) -> Self {
        Self {
            id: VertexId::fresh(),
            bb_id: 0,
            bb_type,
            aps: classes.into_iter().map(AttachmentPoint::new).collect(),
            symmetric_aps: Vec::new(),
            content,
        }
    }

    pub fn molecular(bb_type: BBType, smiles: &str, classes: Vec<APClass>) -> Self {
        Self::new(
            bb_type,
            VertexContent::Molecular(MolecularFragment {
                smiles: smiles.to_string(),
            }),
            classes.into_iter().map(Some).collect(),
        )
    }

    pub fn empty(bb_type: BBType, classes: Vec<Option<APClass>>) -> Self {
        Self::new(bb_type, VertexContent::Empty, classes)
    }

    /// Wraps `inner` so that each of its free APs becomes an AP of the new
    /// vertex, in the order the inner graph lists them.
    pub fn from_graph(bb_type: BBType, inner: DGraph, geometry: Option<Geometry>) -> Self {
        let projections = inner.free_aps();
        Self::from_template(
            bb_type,
            Template {
                inner: Box::new(inner),
                projections,
                geometry,
            },
        )
    }

    /// Template vertex exposing exactly the projected inner APs.
    pub fn from_template(bb_type: BBType, template: Template) -> Self {
        let classes = template
            .projections
            .iter()
            .map(|ap| template.inner.ap(*ap).and_then(|a| a.class.clone()))
            .collect();
        Self::new(bb_type, VertexContent::Template(template), classes)
    }

    pub fn with_symmetric_aps(mut self, set: Vec<usize>) -> Self {
        self.add_symmetric_aps(set);
        self
    }

    pub fn with_bb_id(mut self, bb_id: usize) -> Self {
        self.bb_id = bb_id;
        self
    }

    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn bb_id(&self) -> usize {
        self.bb_id
    }

    pub fn set_bb_id(&mut self, bb_id: usize) {
        self.bb_id = bb_id;
    }

    pub fn bb_type(&self) -> BBType {
        self.bb_type
    }

    pub fn set_bb_type(&mut self, bb_type: BBType) {
        self.bb_type = bb_type;
    }

    pub fn content(&self) -> &VertexContent {
        &self.content
    }

    pub fn template(&self) -> Option<&Template> {
        match &self.content {
            VertexContent::Template(t) => Some(t),
            _ => None,
        }
    }

    pub fn aps(&self) -> &[AttachmentPoint] {
        &self.aps
    }

    pub fn ap(&self, index: usize) -> Option<&AttachmentPoint> {
        self.aps.get(index)
    }

    pub(crate) fn ap_mut(&mut self, index: usize) -> Option<&mut AttachmentPoint> {
        self.aps.get_mut(index)
    }

    pub fn ap_count(&self) -> usize {
        self.aps.len()
    }

    pub fn ap_id(&self, index: usize) -> ApId {
        ApId::new(self.id, index)
    }

    pub fn ap_ids(&self) -> impl Iterator<Item = ApId> + '_ {
        (0..self.aps.len()).map(move |i| ApId::new(self.id, i))
    }

    pub fn ap_classes(&self) -> Vec<Option<APClass>> {
        self.aps.iter().map(|ap| ap.class.clone()).collect()
    }

    pub fn free_ap_count(&self) -> usize {
        self.aps.iter().filter(|ap| ap.is_available()).count()
    }

    pub fn used_ap_count(&self) -> usize {
        self.aps.len() - self.free_ap_count()
    }

    /// Adds a set of mutually symmetric AP indices. Out-of-range indices
    /// and sets with fewer than two members are ignored.
    pub fn add_symmetric_aps(&mut self, mut set: Vec<usize>) {
        let n = self.aps.len();
        let mut seen = Vec::with_capacity(set.len());
        set.retain(|&i| i < n && !seen.contains(&i) && {
            seen.push(i);
            true
        });
        if set.len() > 1 {
            self.symmetric_aps.push(set);
        }
    }

    pub fn symmetric_ap_sets(&self) -> &[Vec<usize>] {
        &self.symmetric_aps
    }

    pub fn symmetric_ap_set_of(&self, index: usize) -> Option<&[usize]> {
        self.symmetric_aps
            .iter()
            .find(|set| set.contains(&index))
            .map(Vec::as_slice)
    }

    /// Ring-closing vertex: a single AP carrying a ring-closure-attractor
    /// class.
    pub fn is_rcv(&self) -> bool {
        self.aps.len() == 1
            && self.aps[0]
                .class
                .as_ref()
                .map(APClass::is_rca)
                .unwrap_or(false)
    }

    /// Copy with a new identity. Building-block id and type are kept.
    pub fn clone_with_fresh_id(&self) -> Self {
        let mut v = self.clone();
        v.id = VertexId::fresh();
        v
    }

    /// Structural equality ignoring vertex identity and AP usage.
    pub fn same_as(&self, other: &Vertex) -> bool {
        self.bb_type == other.bb_type
            && self.bb_id == other.bb_id
            && self.aps.len() == other.aps.len()
            && self
                .aps
                .iter()
                .zip(&other.aps)
                .all(|(a, b)| a.class == b.class)
            && self.content.same_as(&other.content)
    }
}
