//! Random expression generation
//!
//! Expressions are grown depth first from the return type of the primitive
//! set. While depth remains, every primitive and terminal of the required type
//! is a candidate, drawn with probability proportional to its weight. Once the
//! depth budget is spent, terminals are preferred so that the tree closes as
//! soon as possible; primitives are only used when the required type has no
//! terminal at all.
use std::collections::{BTreeMap, HashMap};

use log::trace;
use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
    seq::IndexedRandom,
};

use crate::{
    error::{Error, Result},
    expr::Expression,
    grammar::PrimitiveSet,
    primitive::{Primitive, PrimitiveId},
    types::TypeId,
};

/// How far below zero the remaining depth may fall while no terminal is
/// available, before generation gives up.
pub const FALLBACK_DEPTH_LIMIT: i64 = 64;

/// Relative frequency of a candidate in generated expressions.
pub trait Weighting<T> {
    fn weight(&self, primitive: &Primitive<T>) -> f64;
}

impl<T, F> Weighting<T> for F
where
    F: Fn(&Primitive<T>) -> f64,
{
    fn weight(&self, primitive: &Primitive<T>) -> f64 {
        self(primitive)
    }
}

/// Look up by name; unlisted candidates weigh `1.0`.
impl<T> Weighting<T> for HashMap<String, f64> {
    fn weight(&self, primitive: &Primitive<T>) -> f64 {
        self.get(primitive.name()).copied().unwrap_or(1.0)
    }
}

/// Look up by name; unlisted candidates weigh `1.0`.
impl<T> Weighting<T> for BTreeMap<String, f64> {
    fn weight(&self, primitive: &Primitive<T>) -> f64 {
        self.get(primitive.name()).copied().unwrap_or(1.0)
    }
}

/// Every candidate weighs `1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl<T> Weighting<T> for Uniform {
    fn weight(&self, _primitive: &Primitive<T>) -> f64 {
        1.0
    }
}

impl<T> PrimitiveSet<T> {
    /// Generate a random expression of at most `max_depth` layers, drawing
    /// every candidate with equal probability.
    pub fn gen_expr<R: Rng + ?Sized>(&self, rng: &mut R, max_depth: usize) -> Result<Expression> {
        self.gen_expr_weighted(rng, max_depth, &Uniform)
    }

    /// Generate a random expression of at most `max_depth` layers, drawing
    /// candidates with probability proportional to `weights`.
    pub fn gen_expr_weighted<R, W>(
        &self,
        rng: &mut R,
        max_depth: usize,
        weights: &W,
    ) -> Result<Expression>
    where
        R: Rng + ?Sized,
        W: Weighting<T> + ?Sized,
    {
        let mut out = Vec::new();
        self.gen_depth_first(rng, weights, self.ret_type(), max_depth as i64, &mut out)?;
        trace!(
            "Generated expression of {} element(s) with max depth {}.",
            out.len(),
            max_depth
        );
        Ok(Expression::new(out))
    }

    fn generation_error(&self, ty: TypeId, reason: impl Into<String>) -> Error {
        Error::Generation {
            ty: self.types().fmt(ty).to_string(),
            reason: reason.into(),
        }
    }

    fn gen_depth_first<R, W>(
        &self,
        rng: &mut R,
        weights: &W,
        ty: TypeId,
        depth: i64,
        out: &mut Vec<PrimitiveId>,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
        W: Weighting<T> + ?Sized,
    {
        let choice = if depth <= 0 {
            // Try to terminate as soon as possible.
            if depth < -FALLBACK_DEPTH_LIMIT {
                return Err(self.generation_error(
                    ty,
                    format!(
                        "no terminal reached within {FALLBACK_DEPTH_LIMIT} levels past the maximum depth"
                    ),
                ));
            }

            let terminals = self.terminals_of(ty);
            let pool = if terminals.is_empty() {
                self.primitives_of(ty)
            } else {
                terminals
            };
            *pool
                .choose(rng)
                .ok_or_else(|| self.generation_error(ty, "no primitive or terminal returns it"))?
        } else {
            let candidates: Vec<PrimitiveId> = self
                .primitives_of(ty)
                .iter()
                .chain(self.terminals_of(ty))
                .copied()
                .collect();
            if candidates.is_empty() {
                return Err(self.generation_error(ty, "no primitive or terminal returns it"));
            }

            let dist = WeightedIndex::new(candidates.iter().map(|id| {
                self.get(*id)
                    .map_or(0.0, |primitive| weights.weight(primitive))
            }))
            .map_err(|e| self.generation_error(ty, format!("invalid candidate weights ({e})")))?;
            candidates[dist.sample(rng)]
        };

        out.push(choice);
        let Some(primitive) = self.get(choice) else {
            return Err(self.generation_error(ty, format!("dangling candidate {choice}")));
        };
        for in_type in primitive.in_types() {
            self.gen_depth_first(rng, weights, *in_type, depth - 1, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        primitive::{Signature, kernel},
        types::TypeRegistry,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn grammar() -> (PrimitiveSet<f64>, PrimitiveId, PrimitiveId) {
        let mut types = TypeRegistry::new();
        let t = types.new_type(Some("T"), &[]).unwrap();
        let mut pset = PrimitiveSet::new(types, t).unwrap();
        let leaf = pset
            .add_terminal(Signature::new(t).name("leaf"), |_| Ok(kernel(|_| 1.0)))
            .unwrap();
        let add = pset
            .add_primitive(Signature::new(t).inputs([t, t]).name("add"), |_| {
                Ok(kernel(|xs: &[f64]| xs[0] + xs[1]))
            })
            .unwrap();
        (pset, leaf, add)
    }

    #[test]
    fn zero_weight_excludes_a_candidate() {
        let (pset, leaf, _) = grammar();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let only_leaves = |p: &Primitive<f64>| if p.name() == "add" { 0.0 } else { 1.0 };
        for _ in 0..32 {
            let expr = pset.gen_expr_weighted(&mut rng, 4, &only_leaves).unwrap();
            assert_eq!(expr.as_slice(), &[leaf]);
        }
    }

    #[test]
    fn weight_maps_default_to_one() {
        let (pset, _, add) = grammar();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let weights: HashMap<String, f64> = [("leaf".to_string(), 0.0)].into_iter().collect();
        let expr = pset.gen_expr_weighted(&mut rng, 2, &weights).unwrap();
        // Leaves are only drawn once the depth budget is exhausted.
        assert_eq!(expr.root(), Some(add));
        assert_eq!(expr.depth(&pset), 2);
    }

    #[test]
    fn invalid_weights_are_reported() {
        let (pset, _, _) = grammar();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = pset
            .gen_expr_weighted(&mut rng, 3, &|_: &Primitive<f64>| 0.0)
            .unwrap_err();
        assert!(err.is_generation());

        let err = pset
            .gen_expr_weighted(&mut rng, 3, &|_: &Primitive<f64>| f64::NAN)
            .unwrap_err();
        assert!(err.is_generation());
    }

    #[test]
    fn same_seed_same_expression() {
        let (pset, _, _) = grammar();
        let a = pset.gen_expr(&mut ChaCha20Rng::seed_from_u64(42), 5).unwrap();
        let b = pset.gen_expr(&mut ChaCha20Rng::seed_from_u64(42), 5).unwrap();
        assert_eq!(a, b);
    }
}
