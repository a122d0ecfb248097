//! Instantiated expression trees
//!
//! A [`Node`] is one instantiated primitive: the kernel built by the
//! primitive's factory, the hyperparameters it was built with, its declared
//! parameters, and the nodes of its children, which it owns exclusively.
//!
//! Parameters are exposed through shared [`Parameter`] handles. The flat
//! mapping returned by [`Node::parameters`] is what an external optimizer
//! consumes: it writes new values through the handles between evaluations,
//! and the kernels read them back on the next [`Node::eval`].
use std::{collections::BTreeMap, sync::Arc};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    expr::Expression,
    hyper::{HyperArgs, HyperValue},
    primitive::{Kernel, Primitive, PrimitiveId},
};

/// Separator between nesting levels in flattened parameter names.
pub const PARAM_PATH_SEPARATOR: char = '.';

/// Shared handle to the storage of one optimizable parameter.
///
/// Clones alias the same storage.
pub struct Parameter<T>(Arc<RwLock<T>>);

impl<T> Parameter<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.0.write() = value;
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> Parameter<T> {
    pub fn get(&self) -> T {
        self.0.read().clone()
    }
}

impl<T> Clone for Parameter<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Parameter").field(&*self.0.read()).finish()
    }
}

/// Handed to a primitive's factory while its node is being built.
pub struct NodeBuilder<'a, T> {
    primitive: &'a Primitive<T>,
    hyper: &'a HyperArgs,
    params: Vec<(String, Option<Parameter<T>>)>,
}

impl<'a, T> NodeBuilder<'a, T> {
    pub(crate) fn new(primitive: &'a Primitive<T>, hyper: &'a HyperArgs) -> Self {
        Self {
            primitive,
            hyper,
            params: primitive.params.iter().map(|p| (p.clone(), None)).collect(),
        }
    }

    pub fn primitive(&self) -> &Primitive<T> {
        self.primitive
    }

    /// Hyperparameters resolved for this node.
    pub fn hyper(&self) -> &HyperArgs {
        self.hyper
    }

    /// Initialize the declared parameter `name` and return its handle, to be
    /// captured by the kernel.
    pub fn set_param(&mut self, name: &str, value: T) -> Result<Parameter<T>> {
        let slot = self
            .params
            .iter_mut()
            .find(|(p, _)| p == name)
            .ok_or_else(|| Error::UndeclaredParameter {
                primitive: self.primitive.name.clone(),
                parameter: name.to_string(),
            })?;

        let param = Parameter::new(value);
        slot.1 = Some(param.clone());
        Ok(param)
    }

    /// Consume the builder, checking every declared parameter was set.
    pub(crate) fn finish(self) -> Result<Vec<(String, Parameter<T>)>> {
        let primitive = &self.primitive.name;
        self.params
            .into_iter()
            .map(|(name, param)| match param {
                Some(param) => Ok((name, param)),
                None => Err(Error::UninitializedParameter {
                    primitive: primitive.clone(),
                    parameter: name,
                }),
            })
            .collect()
    }
}

/// An entry of a deep parameter mapping.
pub enum ParamEntry<T> {
    Leaf(Parameter<T>),
    Nested(BTreeMap<String, ParamEntry<T>>),
}

impl<T> ParamEntry<T> {
    pub fn as_leaf(&self) -> Option<&Parameter<T>> {
        match self {
            ParamEntry::Leaf(p) => Some(p),
            ParamEntry::Nested(_) => None,
        }
    }

    pub fn as_nested(&self) -> Option<&BTreeMap<String, ParamEntry<T>>> {
        match self {
            ParamEntry::Leaf(_) => None,
            ParamEntry::Nested(map) => Some(map),
        }
    }
}

fn flatten_into<T>(
    prefix: &str,
    map: &BTreeMap<String, ParamEntry<T>>,
    out: &mut BTreeMap<String, Parameter<T>>,
) {
    for (key, entry) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{PARAM_PATH_SEPARATOR}{key}")
        };
        match entry {
            ParamEntry::Leaf(param) => {
                out.insert(path, param.clone());
            }
            ParamEntry::Nested(inner) => flatten_into(&path, inner, out),
        }
    }
}

/// One instantiated primitive and, transitively, the subtree below it.
pub struct Node<T> {
    pub(crate) primitive: Arc<Primitive<T>>,
    pub(crate) index: usize,
    pub(crate) hyper: HyperArgs,
    pub(crate) params: Vec<(String, Parameter<T>)>,
    pub(crate) kernel: Kernel<T>,
    pub(crate) children: Vec<Node<T>>,
}

impl<T> Node<T> {
    pub fn name(&self) -> &str {
        &self.primitive.name
    }

    pub fn primitive(&self) -> &Primitive<T> {
        &self.primitive
    }

    pub fn primitive_id(&self) -> PrimitiveId {
        self.primitive.id
    }

    /// Preorder position of this node in the tree it was decoded with.
    pub fn index(&self) -> usize {
        self.index
    }

    /// A name unique to this node within its tree, e.g. `add#0`.
    pub fn unique_name(&self) -> String {
        format!("{}#{}", self.primitive.name, self.index)
    }

    pub fn children(&self) -> &[Node<T>] {
        &self.children
    }

    /// Hyperparameter values this node was built with.
    pub fn hyperparams(&self) -> &HyperArgs {
        &self.hyper
    }

    /// Defaults declared by this node's primitive.
    pub fn hyper_defaults(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.primitive.hyper_defaults()
    }

    /// Handle to one of this node's own parameters.
    pub fn param(&self, name: &str) -> Option<&Parameter<T>> {
        self.params.iter().find(|(p, _)| p == name).map(|(_, p)| p)
    }

    /// Evaluate the subtree: children first, left to right, then this node's
    /// kernel over their results.
    pub fn eval(&self) -> T {
        let inputs: SmallVec<T, 4> = self.children.iter().map(Node::eval).collect();
        (self.kernel)(&*inputs)
    }

    /// Parameter mapping of this node.
    ///
    /// The shallow mapping only holds the node's own parameters. The deep
    /// mapping additionally holds one nested entry per child, keyed by the
    /// child's [`unique_name`](Self::unique_name).
    pub fn dparam(&self, deep: bool) -> BTreeMap<String, ParamEntry<T>> {
        let mut map: BTreeMap<String, ParamEntry<T>> = self
            .params
            .iter()
            .map(|(name, param)| (name.clone(), ParamEntry::Leaf(param.clone())))
            .collect();

        if deep {
            for child in &self.children {
                map.insert(child.unique_name(), ParamEntry::Nested(child.dparam(true)));
            }
        }
        map
    }

    /// Every parameter of the subtree in a single-level mapping; nested keys
    /// are joined with [`PARAM_PATH_SEPARATOR`] (e.g. `scale#1.w`).
    pub fn parameters(&self) -> BTreeMap<String, Parameter<T>> {
        let mut out = BTreeMap::new();
        flatten_into("", &self.dparam(true), &mut out);
        out
    }

    /// Preorder iteration over the subtree.
    pub fn iter(&self) -> impl Iterator<Item = &Node<T>> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Number of nodes in the subtree.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Edges on the longest root-to-leaf path (a terminal has depth 0).
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// The flat preorder encoding this tree was decoded from.
    pub fn expression(&self) -> Expression {
        Expression::new(self.iter().map(Node::primitive_id).collect())
    }
}

impl<T> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} object #{}>", self.primitive.name, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_handles_alias_storage() {
        let a = Parameter::new(1.0f64);
        let b = a.clone();
        b.set(4.0);
        assert_eq!(a.get(), 4.0);
        *a.write() += 1.0;
        assert_eq!(*b.read(), 5.0);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&Parameter::new(5.0)));
    }

    #[test]
    fn nested_entries_flatten_with_paths() {
        let mut inner = BTreeMap::new();
        inner.insert("w".to_string(), ParamEntry::Leaf(Parameter::new(2)));
        let mut outer = BTreeMap::new();
        outer.insert("b".to_string(), ParamEntry::Leaf(Parameter::new(1)));
        outer.insert("leaf#1".to_string(), ParamEntry::Nested(inner));

        let mut flat = BTreeMap::new();
        flatten_into("", &outer, &mut flat);
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["b", "leaf#1.w"]);
        assert_eq!(flat["leaf#1.w"].get(), 2);
    }
}
