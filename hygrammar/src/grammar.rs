//! Primitive sets
//!
//! A [`PrimitiveSet`] is a realization of a factorization context-free
//! grammar: a catalog of primitives and terminals indexed by the type they
//! return, together with the type of the overall expression.
//!
//! The set is populated once during setup and is read-only afterwards.
//! Generation ([`PrimitiveSet::gen_expr`]), serialization
//! ([`PrimitiveSet::to_string`], [`PrimitiveSet::from_string`]) and
//! instantiation ([`PrimitiveSet::instantiate`]) only take `&self`, so a
//! finished set can be shared across threads.
use std::{collections::BTreeMap, sync::Arc};

use log::debug;

use crate::{
    error::{BoxError, Error, Result},
    expr::Expression,
    node::NodeBuilder,
    primitive::{self, Factory, Kernel, Primitive, PrimitiveId, Signature},
    types::{TypeId, TypeRegistry},
};

/// A strongly-typed grammar of factorization expressions whose nodes
/// evaluate to values of type `T`.
///
/// Example:
///
/// ```rust
/// # use hygrammar::prelude::*;
/// let mut types = TypeRegistry::new();
/// let t = types.new_type(Some("Scalar"), &[]).unwrap();
/// let mut pset = PrimitiveSet::<f64>::new(types, t).unwrap();
///
/// pset.add_terminal(Signature::new(t).name("one"), |_node| Ok(kernel(|_| 1.0)))
///     .unwrap();
/// pset.add_primitive(Signature::new(t).inputs([t, t]).name("add"), |_node| {
///     Ok(kernel(|xs: &[f64]| xs[0] + xs[1]))
/// })
/// .unwrap();
///
/// let expr = pset.from_string("add(one, add(one, one))").unwrap();
/// assert_eq!(pset.instantiate(&expr, &Hyperparams::new()).unwrap().eval(), 3.0);
/// ```
pub struct PrimitiveSet<T> {
    ret_type: TypeId,
    types: TypeRegistry,
    primitives: Vec<Arc<Primitive<T>>>,
    by_name: BTreeMap<String, PrimitiveId>,
    /// Type -> non-terminal primitives returning that type or a subtype.
    nonterminals_of: BTreeMap<TypeId, Vec<PrimitiveId>>,
    /// Type -> terminals returning that type or a subtype.
    terminals_of: BTreeMap<TypeId, Vec<PrimitiveId>>,
    /// Hyperparameter name -> names of the primitives consuming it.
    hyperdep: BTreeMap<String, Vec<String>>,
}

impl<T: 'static> PrimitiveSet<T> {
    /// Create an empty primitive set producing expressions of type
    /// `ret_type`, minted by `types`.
    pub fn new(types: TypeRegistry, ret_type: TypeId) -> Result<Self> {
        if !types.contains(ret_type) {
            return Err(Error::UnknownType(ret_type));
        }

        Ok(Self {
            ret_type,
            types,
            primitives: Vec::new(),
            by_name: BTreeMap::new(),
            nonterminals_of: BTreeMap::new(),
            terminals_of: BTreeMap::new(),
            hyperdep: BTreeMap::new(),
        })
    }

    /// Mint an additional grammatical type, see [`TypeRegistry::new_type`].
    pub fn new_type(&mut self, name: Option<&str>, bases: &[TypeId]) -> Result<TypeId> {
        self.types.new_type(name, bases)
    }

    /// Register a non-terminal primitive.
    ///
    /// The factory is called once for each node of this primitive when an
    /// expression is instantiated. It must set every parameter declared in
    /// `signature` and return the kernel of the node. When the signature
    /// carries no name, the name of the factory function is used.
    pub fn add_primitive<F>(&mut self, signature: Signature, factory: F) -> Result<PrimitiveId>
    where
        F: Fn(&mut NodeBuilder<'_, T>) -> std::result::Result<Kernel<T>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        let name = match signature.name.clone().or_else(primitive::infer_name::<F>) {
            Some(name) => name,
            None => {
                return Err(Error::Signature {
                    primitive: std::any::type_name::<F>().to_string(),
                    reason: "the factory has no usable name, please specify one".to_string(),
                });
            }
        };

        self.register(name, signature, Arc::new(factory))
    }

    /// Register a terminal, i.e. a primitive without inputs.
    pub fn add_terminal<F>(&mut self, signature: Signature, factory: F) -> Result<PrimitiveId>
    where
        F: Fn(&mut NodeBuilder<'_, T>) -> std::result::Result<Kernel<T>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        if signature.arity() != 0 {
            return Err(Error::Signature {
                primitive: signature.name.clone().unwrap_or_default(),
                reason: format!("a terminal cannot take {} input(s)", signature.arity()),
            });
        }
        self.add_primitive(signature, factory)
    }

    fn register(&mut self, name: String, sig: Signature, factory: Factory<T>) -> Result<PrimitiveId> {
        primitive::check_signature(&name, &sig)?;

        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        if let Some(unknown) = std::iter::once(sig.ret_type)
            .chain(sig.in_types.iter().copied())
            .find(|ty| !self.types.contains(*ty))
        {
            return Err(Error::UnknownType(unknown));
        }

        let id = PrimitiveId(self.primitives.len() as u32);

        for h in &sig.hyper {
            self.hyperdep
                .entry(h.name.clone())
                .or_default()
                .push(name.clone());
        }

        // A candidate for its return type is also a candidate wherever one of
        // that type's ancestors is expected.
        let table = if sig.in_types.is_empty() {
            &mut self.terminals_of
        } else {
            &mut self.nonterminals_of
        };
        for ty in self.types.ancestors(sig.ret_type) {
            table.entry(ty).or_default().push(id);
        }

        debug!(
            "Registered {} `{}` as {}: ({}) -> {}, hyperparameters [{}], parameters [{}].",
            if sig.in_types.is_empty() { "terminal" } else { "primitive" },
            name,
            id,
            sig.in_types
                .iter()
                .map(|t| self.types.fmt(*t).to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.types.fmt(sig.ret_type),
            sig.hyper.iter().map(|h| h.name.as_str()).collect::<Vec<_>>().join(", "),
            sig.params.join(", "),
        );

        self.by_name.insert(name.clone(), id);
        self.primitives.push(Arc::new(Primitive {
            id,
            name,
            ret_type: sig.ret_type,
            in_types: sig.in_types,
            hyper: sig.hyper,
            params: sig.params,
            factory,
        }));
        Ok(id)
    }

    /// Render `expr` in canonical call notation, e.g. `add(x, scale(x))`.
    ///
    /// Fails with [`Error::MalformedExpression`] if `expr` does not encode
    /// exactly one tree over this set.
    pub fn to_string(&self, expr: &Expression) -> Result<String> {
        expr.validate(self)?;
        Ok(expr.display(self).to_string())
    }
}

impl<T> PrimitiveSet<T> {
    /// Type of the overall expression.
    pub fn ret_type(&self) -> TypeId {
        self.ret_type
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&Primitive<T>> {
        self.primitives.get(id.index()).map(Arc::as_ref)
    }

    pub(crate) fn get_arc(&self, id: PrimitiveId) -> Option<&Arc<Primitive<T>>> {
        self.primitives.get(id.index())
    }

    /// Resolve a primitive or terminal by name.
    pub fn lookup(&self, name: &str) -> Result<PrimitiveId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    /// Every registered primitive, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Primitive<T>> {
        self.primitives.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Non-terminal primitives usable where a `ty` is expected.
    pub fn primitives_of(&self, ty: TypeId) -> &[PrimitiveId] {
        self.nonterminals_of
            .get(&ty)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Terminals usable where a `ty` is expected.
    pub fn terminals_of(&self, ty: TypeId) -> &[PrimitiveId] {
        self.terminals_of
            .get(&ty)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fail with [`Error::TypeMismatch`] unless `primitive` may stand where
    /// an `expected` is required.
    pub(crate) fn check_type(&self, primitive: &Primitive<T>, expected: TypeId) -> Result<()> {
        if self.types.is_subtype(primitive.ret_type(), expected) {
            return Ok(());
        }
        Err(Error::TypeMismatch {
            primitive: primitive.name().to_string(),
            expected: self.types.fmt(expected).to_string(),
            found: self.types.fmt(primitive.ret_type()).to_string(),
        })
    }

    /// Hyperparameter name -> names of the primitives consuming it, in
    /// registration order.
    pub fn hyper_dependencies(&self) -> &BTreeMap<String, Vec<String>> {
        &self.hyperdep
    }
}

impl<T> std::fmt::Debug for PrimitiveSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimitiveSet")
            .field("ret_type", &self.types.fmt(self.ret_type).to_string())
            .field("primitives", &self.by_name)
            .field("hyperdep", &self.hyperdep)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::kernel;

    fn scalar_set() -> (PrimitiveSet<f64>, TypeId) {
        let mut types = TypeRegistry::new();
        let t = types.new_type(Some("T"), &[]).unwrap();
        (PrimitiveSet::new(types, t).unwrap(), t)
    }

    fn negate(_node: &mut NodeBuilder<'_, f64>) -> std::result::Result<Kernel<f64>, BoxError> {
        Ok(kernel(|xs: &[f64]| -xs[0]))
    }

    #[test]
    fn names_are_inferred_from_function_items() {
        let (mut pset, t) = scalar_set();
        let id = pset.add_primitive(Signature::new(t).inputs([t]), negate).unwrap();
        assert_eq!(pset.get(id).unwrap().name(), "negate");
        assert_eq!(pset.lookup("negate").unwrap(), id);
    }

    #[test]
    fn closures_need_an_explicit_name() {
        let (mut pset, t) = scalar_set();
        let err = pset
            .add_terminal(Signature::new(t), |_| Ok(kernel(|_| 0.0)))
            .unwrap_err();
        assert!(err.is_signature());
        assert!(pset.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut pset, t) = scalar_set();
        pset.add_terminal(Signature::new(t).name("x"), |_| Ok(kernel(|_| 0.0)))
            .unwrap();
        let err = pset
            .add_terminal(Signature::new(t).name("x"), |_| Ok(kernel(|_| 1.0)))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "x"));
        assert_eq!(pset.len(), 1);
    }

    #[test]
    fn terminals_cannot_have_inputs() {
        let (mut pset, t) = scalar_set();
        let err = pset
            .add_terminal(Signature::new(t).inputs([t]).name("x"), |_| Ok(kernel(|_| 0.0)))
            .unwrap_err();
        assert!(err.is_signature());
    }

    #[test]
    fn hyperparameter_dependencies_accumulate() {
        let (mut pset, t) = scalar_set();
        pset.add_terminal(Signature::new(t).name("a").hyper("k").hyper("n"), |_| {
            Ok(kernel(|_| 0.0))
        })
        .unwrap();
        pset.add_primitive(
            Signature::new(t).inputs([t]).name("b").hyper_default("k", 2),
            |_| Ok(kernel(|xs: &[f64]| xs[0])),
        )
        .unwrap();

        let deps = pset.hyper_dependencies();
        assert_eq!(deps["k"], vec!["a", "b"]);
        assert_eq!(deps["n"], vec!["a"]);
    }

    #[test]
    fn candidates_are_indexed_by_ancestors() {
        let mut types = TypeRegistry::new();
        let tensor = types.new_type(Some("Tensor"), &[]).unwrap();
        let matrix = types.new_type(Some("Matrix"), &[tensor]).unwrap();
        let mut pset = PrimitiveSet::<f64>::new(types, tensor).unwrap();

        let m = pset
            .add_terminal(Signature::new(matrix).name("m"), |_| Ok(kernel(|_| 0.0)))
            .unwrap();
        let t = pset
            .add_terminal(Signature::new(tensor).name("t"), |_| Ok(kernel(|_| 0.0)))
            .unwrap();

        assert_eq!(pset.terminals_of(tensor), &[m, t]);
        assert_eq!(pset.terminals_of(matrix), &[m]);
        assert!(pset.primitives_of(matrix).is_empty());
    }

    #[test]
    fn unknown_types_are_rejected() {
        let mut other = TypeRegistry::new();
        other.new_type(None, &[]).unwrap();
        let foreign = other.new_type(None, &[]).unwrap();

        let (mut pset, t) = scalar_set();
        let err = pset
            .add_primitive(Signature::new(t).inputs([foreign]).name("f"), |_| {
                Ok(kernel(|_| 0.0))
            })
            .unwrap_err();
        assert!(err.is_unknown_type());
        assert!(pset.hyper_dependencies().is_empty());
    }
}
