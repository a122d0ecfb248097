//! Flat preorder expressions
//!
//! An [`Expression`] is the depth-first preorder listing of the primitives of
//! one tree. Because every primitive has a fixed arity, the listing decodes to
//! exactly one tree: a primitive of arity `k` is followed by the encodings of
//! its `k` children, left to right.
//!
//! ```text
//! add(scale(x), x)   <=>   [add, scale, x, x]
//! ```
//!
//! Expressions only hold [`PrimitiveId`]s; rendering them or checking their
//! structure needs the [`PrimitiveSet`] they were built from.
use std::ops::Range;

use crate::{
    error::{Error, Result},
    grammar::PrimitiveSet,
    primitive::PrimitiveId,
    types::TypeId,
};

/// Flat depth-first preorder encoding of one expression tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Expression {
    nodes: Vec<PrimitiveId>,
}

impl Expression {
    /// Wrap a preorder listing. The listing is not checked; see
    /// [`Expression::validate`].
    pub fn new(nodes: Vec<PrimitiveId>) -> Self {
        Self { nodes }
    }

    pub fn as_slice(&self) -> &[PrimitiveId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PrimitiveId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn root(&self) -> Option<PrimitiveId> {
        self.nodes.first().copied()
    }

    /// Range of the subtree rooted at position `begin`.
    ///
    /// Returns `None` if the listing ends before the subtree is complete or
    /// refers to an unknown primitive.
    pub fn subtree<T>(&self, pset: &PrimitiveSet<T>, begin: usize) -> Option<Range<usize>> {
        let mut pending = 1usize;
        let mut end = begin;
        while pending > 0 {
            let id = *self.nodes.get(end)?;
            pending = pending - 1 + pset.get(id)?.arity();
            end += 1;
        }
        Some(begin..end)
    }

    /// Check that the listing encodes exactly one tree over `pset`, whose
    /// root returns the set's type and whose children fit the inputs of
    /// their parent.
    pub fn validate<T>(&self, pset: &PrimitiveSet<T>) -> Result<()> {
        self.validate_structure(pset)?;

        // Types still expected, innermost on top.
        let mut expected: Vec<TypeId> = vec![pset.ret_type()];
        for id in &self.nodes {
            let (Some(ty), Some(primitive)) = (expected.pop(), pset.get(*id)) else {
                break;
            };
            pset.check_type(primitive, ty)?;
            expected.extend(primitive.in_types().iter().rev().copied());
        }
        Ok(())
    }

    fn validate_structure<T>(&self, pset: &PrimitiveSet<T>) -> Result<()> {
        if let Some(unknown) = self.nodes.iter().find(|id| pset.get(**id).is_none()) {
            return Err(Error::MalformedExpression {
                reason: format!("primitive {unknown} is not part of this primitive set"),
            });
        }

        match self.subtree(pset, 0) {
            None => Err(Error::MalformedExpression {
                reason: "the expression ends before all arguments are provided".to_string(),
            }),
            Some(range) if range.end < self.nodes.len() => Err(Error::MalformedExpression {
                reason: format!(
                    "{} trailing element(s) after a complete tree of {} element(s)",
                    self.nodes.len() - range.end,
                    range.end
                ),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Depth of the encoded tree, counted in edges (a lone terminal has
    /// depth 0). Assumes a valid expression.
    pub fn depth<T>(&self, pset: &PrimitiveSet<T>) -> usize {
        let mut max_depth = 0;
        // Remaining-children counters of the open ancestors.
        let mut stack: Vec<usize> = Vec::new();
        for id in &self.nodes {
            max_depth = max_depth.max(stack.len());
            if let Some(last) = stack.last_mut() {
                *last -= 1;
            }
            let arity = pset.get(*id).map_or(0, |p| p.arity());
            if arity > 0 {
                stack.push(arity);
            }
            while stack.last() == Some(&0) {
                stack.pop();
            }
        }
        max_depth
    }

    /// Names of the listed primitives, in preorder.
    pub fn names<'a, T>(&'a self, pset: &'a PrimitiveSet<T>) -> impl Iterator<Item = &'a str> {
        self.nodes
            .iter()
            .map(move |id| pset.get(*id).map_or("?", |p| p.name()))
    }

    /// Lenient display over `pset`, never failing on malformed listings.
    pub fn display<'a, T>(&'a self, pset: &'a PrimitiveSet<T>) -> ExpressionFmt<'a, T> {
        ExpressionFmt { expr: self, pset }
    }
}

impl From<Vec<PrimitiveId>> for Expression {
    fn from(nodes: Vec<PrimitiveId>) -> Self {
        Self::new(nodes)
    }
}

impl FromIterator<PrimitiveId> for Expression {
    fn from_iter<I: IntoIterator<Item = PrimitiveId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Renders an [`Expression`] in call notation.
///
/// Missing arguments are shown as `?` and trailing elements after the first
/// complete tree are appended in brackets, so that broken expressions can
/// still be reported.
pub struct ExpressionFmt<'a, T> {
    pub(crate) expr: &'a Expression,
    pub(crate) pset: &'a PrimitiveSet<T>,
}

impl<T> ExpressionFmt<'_, T> {
    fn write_node(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        pos: &mut usize,
    ) -> std::fmt::Result {
        let Some(id) = self.expr.nodes.get(*pos) else {
            return f.write_str("?");
        };
        *pos += 1;

        let Some(primitive) = self.pset.get(*id) else {
            return write!(f, "<unknown {id}>");
        };
        f.write_str(primitive.name())?;
        if primitive.arity() == 0 {
            return Ok(());
        }

        f.write_str("(")?;
        for i in 0..primitive.arity() {
            if i > 0 {
                f.write_str(", ")?;
            }
            self.write_node(f, pos)?;
        }
        f.write_str(")")
    }
}

impl<T> std::fmt::Display for ExpressionFmt<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pos = 0;
        self.write_node(f, &mut pos)?;
        if pos < self.expr.nodes.len() {
            let rest = self.expr.nodes[pos..]
                .iter()
                .map(|id| self.pset.get(*id).map_or("?", |p| p.name()))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " [{rest}]")?;
        }
        Ok(())
    }
}
