use std::path::PathBuf;

use ariadne::{ColorGenerator, Label, Report, Source};
use clap::Parser as ClapParser;
use hygrammar::prelude::*;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

type Matrix = DMatrix<f64>;

#[derive(ClapParser)]
pub struct Arguments {
    /// Expression to instantiate; a random one is generated when omitted
    expr: Option<String>,

    /// Maximum depth of generated expressions
    #[arg(long, default_value_t = 3)]
    max_depth: usize,

    /// Seed of the expression generator
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// TOML file holding the hyperparameters (`n`, `m` and optionally `k`)
    #[arg(long)]
    hyper: Option<PathBuf>,
}

fn build_grammar() -> Result<PrimitiveSet<Matrix>> {
    let mut types = TypeRegistry::new();
    let mat = types.new_type(Some("Matrix"), &[])?;
    let mut pset = PrimitiveSet::new(types, mat)?;

    pset.add_terminal(
        Signature::new(mat)
            .name("lowrank")
            .hyper("n")
            .hyper("m")
            .hyper_default("k", 1)
            .params(["u", "v"]),
        |node| {
            let (n, m, k) = (
                node.hyper().usize("n")?,
                node.hyper().usize("m")?,
                node.hyper().usize("k")?,
            );
            let u = node.set_param("u", Matrix::from_element(n, k, 0.1))?;
            let v = node.set_param("v", Matrix::from_element(k, m, 0.1))?;
            Ok(kernel(move |_| &*u.read() * &*v.read()))
        },
    )?;
    pset.add_terminal(Signature::new(mat).name("dense").hyper("n").hyper("m").param("w"), |node| {
        let (n, m) = (node.hyper().usize("n")?, node.hyper().usize("m")?);
        let w = node.set_param("w", Matrix::identity(n, m))?;
        Ok(kernel(move |_| w.get()))
    })?;
    pset.add_primitive(Signature::new(mat).inputs([mat, mat]).name("add"), |_| {
        Ok(kernel(|xs: &[Matrix]| &xs[0] + &xs[1]))
    })?;
    pset.add_primitive(Signature::new(mat).inputs([mat, mat]).name("hadamard"), |_| {
        Ok(kernel(|xs: &[Matrix]| xs[0].component_mul(&xs[1])))
    })?;
    Ok(pset)
}

fn report_parse_errors(src: &str, errors: &[hygrammar::error::Diagnostic]) {
    let mut colors = ColorGenerator::new();
    let a = colors.next();

    for error in errors {
        let span = ("<input>", error.span.clone());
        Report::build(ariadne::ReportKind::Error, span.clone())
            .with_message(&error.message)
            .with_label(
                Label::new(span)
                    .with_message("The error occurred here")
                    .with_color(a),
            )
            .finish()
            .eprint(("<input>", Source::from(src)))
            .unwrap();
    }
}

fn main() {
    let args = Arguments::parse();

    let pset = match build_grammar() {
        Ok(pset) => pset,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    let hyper = match &args.hyper {
        Some(path) => Hyperparams::load_from_toml(path),
        None => Ok(Hyperparams::new().with("n", 4).with("m", 3)),
    };
    let hyper = hyper.unwrap_or_else(|error| {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    });

    let expr = match &args.expr {
        Some(src) => match pset.from_string(src) {
            Ok(expr) => expr,
            Err(Error::Parse { errors }) => {
                report_parse_errors(src, &errors);
                std::process::exit(1);
            }
            Err(error) => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
        },
        None => {
            let mut rng = ChaCha20Rng::seed_from_u64(args.seed);
            pset.gen_expr(&mut rng, args.max_depth).unwrap_or_else(|error| {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            })
        }
    };

    println!("Expression (depth {}):", expr.depth(&pset));
    expr.display(&pset).pretty_print().unwrap();

    let tree = match pset.instantiate(&expr, &hyper) {
        Ok(tree) => tree,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };

    println!("\nParameters:");
    for (name, param) in tree.parameters() {
        let value = param.read();
        println!("  {name}: {}x{}", value.nrows(), value.ncols());
    }

    println!("\nResult: {}", tree.eval());
}
