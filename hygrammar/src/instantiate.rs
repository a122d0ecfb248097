//! Decoding of flat expressions into instantiated trees.
//!
//! The decoder is a recursive descent over the preorder listing: the head
//! element is consumed, its children are decoded one after another from the
//! remaining tail, and the primitive's factory is then called to build the
//! node. The outermost call requires the listing to be fully consumed.
use log::{trace, warn};

use crate::{
    error::{Error, Result},
    expr::Expression,
    grammar::PrimitiveSet,
    hyper::{HyperArgs, Hyperparams},
    node::{Node, NodeBuilder},
    primitive::{Primitive, PrimitiveId},
    types::TypeId,
};

impl<T> PrimitiveSet<T> {
    /// Instantiate `expr` into an evaluable tree of [`Node`]s.
    ///
    /// Each node receives the subset of `hyper` its primitive declares,
    /// completed with the declared defaults. Any failure, be it structural or
    /// raised by a factory, is reported as [`Error::Instantiation`] naming
    /// the expression; use [`Error::cause`] to reach the underlying error.
    pub fn instantiate(&self, expr: &Expression, hyper: &Hyperparams) -> Result<Node<T>> {
        for (name, _) in hyper.iter() {
            if !self.hyper_dependencies().contains_key(name) {
                warn!("Hyperparameter `{name}` is not used by any primitive of this set.");
            }
        }

        self.decode_all(expr, hyper)
            .map_err(|source| Error::Instantiation {
                expression: expr.display(self).to_string(),
                source: Box::new(source),
            })
    }

    fn decode_all(&self, expr: &Expression, hyper: &Hyperparams) -> Result<Node<T>> {
        let (node, tail) = self.decode(expr.len(), expr.as_slice(), self.ret_type(), hyper)?;
        if !tail.is_empty() {
            return Err(Error::MalformedExpression {
                reason: format!(
                    "{} trailing element(s) after a complete tree of {} element(s)",
                    tail.len(),
                    expr.len() - tail.len()
                ),
            });
        }
        trace!("Instantiated tree of {} node(s).", expr.len());
        Ok(node)
    }

    /// Decode one subtree of type `expected` from the head of `nodes`,
    /// returning it along with the part of `nodes` it did not consume.
    fn decode<'e>(
        &self,
        full_len: usize,
        nodes: &'e [PrimitiveId],
        expected: TypeId,
        hyper: &Hyperparams,
    ) -> Result<(Node<T>, &'e [PrimitiveId])> {
        let Some((&head, mut tail)) = nodes.split_first() else {
            return Err(Error::MalformedExpression {
                reason: "the expression ends before all arguments are provided".to_string(),
            });
        };
        let index = full_len - nodes.len();
        let Some(primitive) = self.get_arc(head) else {
            return Err(Error::MalformedExpression {
                reason: format!("primitive {head} is not part of this primitive set"),
            });
        };

        self.check_type(primitive, expected)?;

        let mut children = Vec::with_capacity(primitive.arity());
        for in_type in primitive.in_types() {
            let (child, rest) = self.decode(full_len, tail, *in_type, hyper)?;
            children.push(child);
            tail = rest;
        }

        let args = resolve_hyper(primitive, hyper)?;
        let mut builder = NodeBuilder::new(primitive, &args);
        let kernel = (primitive.factory)(&mut builder).map_err(|e| match e.downcast::<Error>() {
            Ok(own) => *own,
            Err(source) => Error::Factory {
                primitive: primitive.name.clone(),
                source,
            },
        })?;
        let params = builder.finish()?;

        trace!(
            "Built node `{}#{}` with {} child(ren) and {} parameter(s).",
            primitive.name,
            index,
            children.len(),
            params.len()
        );

        Ok((
            Node {
                primitive: primitive.clone(),
                index,
                hyper: args,
                params,
                kernel,
                children,
            },
            tail,
        ))
    }
}

/// Bind every hyperparameter declared by `primitive` to its supplied value,
/// or to its default.
fn resolve_hyper<T>(primitive: &Primitive<T>, hyper: &Hyperparams) -> Result<HyperArgs> {
    let values = primitive
        .hyper
        .iter()
        .map(|spec| {
            hyper
                .get(&spec.name)
                .or(spec.default.as_ref())
                .map(|value| (spec.name.clone(), value.clone()))
                .ok_or_else(|| Error::MissingHyperparameter {
                    primitive: primitive.name.clone(),
                    hyperparameter: spec.name.clone(),
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(HyperArgs::new(primitive.name.clone(), values))
}
