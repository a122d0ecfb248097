//! Parser for the call notation of expressions using chumsky.
//!
//! The accepted syntax is the one produced by
//! [`PrimitiveSet::to_string`](crate::grammar::PrimitiveSet::to_string):
//! - Terminals: a bare name, e.g. `x` (`x()` is accepted as well).
//! - Primitives: `name(arg, arg, ...)` where every argument is itself an
//!   expression.
//! - Names follow `[A-Za-z_][A-Za-z0-9_]*`; whitespace is allowed between
//!   tokens.
//!
//! Parsing happens in two stages: the text is first turned into a small
//! syntax tree of names and spans, which is then resolved against the
//! primitive set (names, arities and types) while being flattened into
//! preorder.
use std::ops::Range;

use chumsky::prelude::*;
use log::trace;

use crate::{
    error::{Diagnostic, Error, Result},
    expr::Expression,
    grammar::PrimitiveSet,
    primitive::PrimitiveId,
    types::TypeId,
};

#[derive(Debug, Clone)]
struct Call<'src> {
    name: &'src str,
    span: SimpleSpan,
    args: Vec<Call<'src>>,
}

fn call_parser<'src>() -> impl Parser<'src, &'src str, Call<'src>, extra::Err<Rich<'src, char>>> {
    recursive(|call| {
        let args = call
            .padded()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .padded()
            .delimited_by(just('('), just(')'))
            .labelled("argument list");

        text::ascii::ident()
            .map_with(|name: &'src str, e| (name, e.span()))
            .labelled("primitive name")
            .then(text::whitespace().ignore_then(args).or_not())
            .map(|((name, span), args)| Call {
                name,
                span,
                args: args.unwrap_or_default(),
            })
    })
}

fn span_range(span: SimpleSpan) -> Range<usize> {
    span.start..span.end
}

impl<T> PrimitiveSet<T> {
    /// Parse an expression written in call notation, e.g.
    /// `add(x, scale(x))`, into its flat preorder form.
    ///
    /// Every name is resolved against this set; arities and types are
    /// checked, and the whole expression must return the set's type.
    pub fn from_string(&self, src: &str) -> Result<Expression> {
        let root = call_parser()
            .padded()
            .then_ignore(end())
            .parse(src)
            .into_result()
            .map_err(|errors| Error::Parse {
                errors: errors
                    .into_iter()
                    .map(|e| Diagnostic {
                        message: format!("parse error: {}", e.reason()),
                        span: span_range(*e.span()),
                    })
                    .collect(),
            })?;

        let mut out = Vec::new();
        self.resolve(&root, self.ret_type(), &mut out)?;
        trace!("Parsed `{}` into {} element(s).", src.trim(), out.len());
        Ok(Expression::new(out))
    }

    fn resolve(&self, call: &Call<'_>, expected: TypeId, out: &mut Vec<PrimitiveId>) -> Result<()> {
        let id = self.lookup(call.name)?;
        let Some(primitive) = self.get(id) else {
            return Err(Error::UnknownName(call.name.to_string()));
        };

        self.check_type(primitive, expected)?;

        if primitive.arity() != call.args.len() {
            return Err(Error::Arity {
                primitive: call.name.to_string(),
                expected: primitive.arity(),
                found: call.args.len(),
            });
        }

        trace!(
            "Resolved `{}` at {:?} as {}.",
            call.name,
            span_range(call.span),
            id
        );
        out.push(id);
        for (arg, in_type) in call.args.iter().zip(primitive.in_types()) {
            self.resolve(arg, *in_type, out)?;
        }
        Ok(())
    }
}
