//! Primitive descriptors
//!
//! A primitive is one production rule of the factorization grammar: a name,
//! an ordered list of input types, a return type, and a factory building the
//! computation carried by each instance of the rule. Terminals are primitives
//! without inputs.
//!
//! The factory is called once per node at instantiation time. It receives a
//! [`NodeBuilder`](crate::node::NodeBuilder) giving access to the resolved
//! hyperparameters, initializes the node's declared parameters, and returns a
//! [`Kernel`] mapping the children's results to the node's result.
use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    error::{BoxError, Error, Result},
    hyper::HyperValue,
    node::NodeBuilder,
    types::TypeId,
};

/// The computation bound to one node: children results in, node result out.
pub type Kernel<T> = Box<dyn Fn(&[T]) -> T + Send + Sync>;

/// Builds the [`Kernel`] of one node and initializes its parameters.
pub type Factory<T> =
    Arc<dyn Fn(&mut NodeBuilder<'_, T>) -> std::result::Result<Kernel<T>, BoxError> + Send + Sync>;

/// Wrap a closure into a [`Kernel`].
pub fn kernel<T, F>(f: F) -> Kernel<T>
where
    F: Fn(&[T]) -> T + Send + Sync + 'static,
{
    Box::new(f)
}

/// Index of a primitive inside its [`PrimitiveSet`](crate::grammar::PrimitiveSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrimitiveId(pub(crate) u32);

impl PrimitiveId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A declared hyperparameter: its name and optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperSpec {
    pub name: String,
    pub default: Option<HyperValue>,
}

/// The declared shape of a primitive, assembled before registration.
///
/// Example:
///
/// ```rust
/// # use hygrammar::{primitive::Signature, types::TypeRegistry};
/// let mut reg = TypeRegistry::new();
/// let t = reg.new_type(Some("Matrix"), &[]).unwrap();
/// let sig = Signature::new(t)
///     .inputs([t, t])
///     .name("add")
///     .hyper("alpha")
///     .hyper_default("beta", 1.0)
///     .param("bias");
/// assert_eq!(sig.arity(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    pub(crate) ret_type: TypeId,
    pub(crate) in_types: SmallVec<TypeId, 4>,
    pub(crate) name: Option<String>,
    pub(crate) hyper: Vec<HyperSpec>,
    pub(crate) params: Vec<String>,
}

impl Signature {
    pub fn new(ret_type: TypeId) -> Self {
        Self {
            ret_type,
            in_types: SmallVec::new(),
            name: None,
            hyper: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Input types, in child order.
    pub fn inputs(mut self, in_types: impl IntoIterator<Item = TypeId>) -> Self {
        self.in_types = in_types.into_iter().collect();
        self
    }

    /// Name shown in serialized expressions.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declare a required hyperparameter.
    pub fn hyper(mut self, name: impl Into<String>) -> Self {
        self.hyper.push(HyperSpec {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a hyperparameter falling back to `default` when not supplied.
    pub fn hyper_default(mut self, name: impl Into<String>, default: impl Into<HyperValue>) -> Self {
        self.hyper.push(HyperSpec {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Declare an optimizable parameter the factory must initialize.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }

    pub fn params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.params.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn arity(&self) -> usize {
        self.in_types.len()
    }
}

/// A registered production rule.
pub struct Primitive<T> {
    pub(crate) id: PrimitiveId,
    pub(crate) name: String,
    pub(crate) ret_type: TypeId,
    pub(crate) in_types: SmallVec<TypeId, 4>,
    pub(crate) hyper: Vec<HyperSpec>,
    pub(crate) params: Vec<String>,
    pub(crate) factory: Factory<T>,
}

impl<T> Primitive<T> {
    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ret_type(&self) -> TypeId {
        self.ret_type
    }

    pub fn in_types(&self) -> &[TypeId] {
        &self.in_types
    }

    pub fn arity(&self) -> usize {
        self.in_types.len()
    }

    pub fn is_terminal(&self) -> bool {
        self.in_types.is_empty()
    }

    /// Declared hyperparameters, in declaration order.
    pub fn hyperparams(&self) -> impl Iterator<Item = &str> {
        self.hyper.iter().map(|h| h.name.as_str())
    }

    /// Declared hyperparameters that carry a default value.
    pub fn hyper_defaults(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.hyper
            .iter()
            .filter_map(|h| h.default.as_ref().map(|d| (h.name.as_str(), d)))
    }

    pub fn hyper_specs(&self) -> &[HyperSpec] {
        &self.hyper
    }

    /// Declared optimizable parameter names.
    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl<T> std::fmt::Debug for Primitive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Primitive")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("ret_type", &self.ret_type)
            .field("in_types", &self.in_types)
            .field("hyper", &self.hyper)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Whether `s` can be used as a name in the textual notation.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Infer a primitive name from the type name of its factory.
///
/// Function items yield their last path segment (`my_crate::ops::add::<f64>`
/// gives `add`); closures have no usable name.
pub(crate) fn infer_name<F>() -> Option<String> {
    let full = std::any::type_name::<F>();
    let path = full.split('<').next().unwrap_or(full);
    let last = path.rsplit("::").next().unwrap_or(path);
    is_identifier(last).then(|| last.to_string())
}

/// Check that a signature's declared names are usable and unambiguous.
pub(crate) fn check_signature(name: &str, sig: &Signature) -> Result<()> {
    let reject = |reason: String| Error::Signature {
        primitive: name.to_string(),
        reason,
    };

    if !is_identifier(name) {
        return Err(reject(format!(
            "`{name}` is not a valid identifier ([A-Za-z_][A-Za-z0-9_]*)"
        )));
    }

    let mut seen: Vec<&str> = Vec::with_capacity(sig.hyper.len() + sig.params.len());
    let declared = sig
        .hyper
        .iter()
        .map(|h| ("hyperparameter", h.name.as_str()))
        .chain(sig.params.iter().map(|p| ("parameter", p.as_str())));

    for (kind, declared) in declared {
        if !is_identifier(declared) {
            return Err(reject(format!(
                "{kind} `{declared}` is not a valid identifier"
            )));
        }
        if seen.contains(&declared) {
            return Err(reject(format!("`{declared}` is declared more than once")));
        }
        seen.push(declared);
    }

    Ok(())
}
