//! Hygrammar: a strongly-typed generative grammar for symbolic tensor
//! factorizations.
//!
//! A [`PrimitiveSet`](grammar::PrimitiveSet) describes which operators
//! (primitives) and leaves (terminals) may be combined, and with which types.
//! From it, random well-typed expressions can be generated, written to and
//! read from a compact call notation, and instantiated into trees of
//! evaluable nodes whose parameters are exposed to an external optimizer.
//!
//! Components
//!  - [`types`]: nominal grammar types with multiple inheritance.
//!  - [`primitive`] / [`grammar`]: declaration and registration of primitives.
//!  - [`generator`]: depth-bounded stochastic expression generation.
//!  - [`expr`], [`parser`] and [`pretty`]: flat preorder expressions and
//!    their textual form.
//!  - [`instantiate`] / [`node`]: decoding into evaluable trees and parameter
//!    harvesting.
//!  - [`hyper`]: hyperparameter values, optionally loaded from TOML.
//!
//! Example
//! ```
//! use hygrammar::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut types = TypeRegistry::new();
//! let t = types.new_type(Some("Scalar"), &[]).unwrap();
//! let mut pset = PrimitiveSet::<f64>::new(types, t).unwrap();
//!
//! pset.add_terminal(Signature::new(t).name("w").hyper_default("init", 0.5).param("w"), |node| {
//!     let w = node.set_param("w", node.hyper().float("init")?)?;
//!     Ok(kernel(move |_| w.get()))
//! })
//! .unwrap();
//! pset.add_primitive(Signature::new(t).inputs([t, t]).name("mul"), |_| {
//!     Ok(kernel(|xs: &[f64]| xs[0] * xs[1]))
//! })
//! .unwrap();
//!
//! let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(0);
//! let expr = pset.gen_expr(&mut rng, 3).unwrap();
//! let text = pset.to_string(&expr).unwrap();
//! assert_eq!(pset.from_string(&text).unwrap(), expr);
//!
//! let tree = pset.instantiate(&expr, &Hyperparams::new()).unwrap();
//! for param in tree.parameters().values() {
//!     param.set(1.0);
//! }
//! assert_eq!(tree.eval(), 1.0);
//! ```

pub mod error;
pub mod expr;
pub mod generator;
pub mod grammar;
pub mod hyper;
pub mod instantiate;
pub mod node;
pub mod parser;
pub mod pretty;
pub mod primitive;
pub mod types;

pub use error::{Error, Result};

/// Commonly used items, for glob import.
pub mod prelude {
    pub use crate::{
        error::{BoxError, Error, Result},
        expr::Expression,
        generator::{Uniform, Weighting},
        grammar::PrimitiveSet,
        hyper::{HyperArgs, HyperValue, Hyperparams},
        node::{Node, NodeBuilder, ParamEntry, Parameter},
        pretty::PrettyExpression,
        primitive::{Kernel, Primitive, PrimitiveId, Signature, kernel},
        types::{TypeId, TypeRegistry},
    };
}
