use hygrammar::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// `leaf -> T` and `add(T, T) -> T`, where `leaf` evaluates to its
/// hyperparameter `value`.
fn add_leaf_grammar() -> PrimitiveSet<f64> {
    let mut types = TypeRegistry::new();
    let t = types.new_type(Some("T"), &[]).expect("fresh type");
    let mut pset = PrimitiveSet::new(types, t).expect("known return type");

    pset.add_terminal(
        Signature::new(t).name("leaf").hyper_default("value", 1.5),
        |node| {
            let value = node.hyper().float("value")?;
            Ok(kernel(move |_| value))
        },
    )
    .expect("register leaf");
    pset.add_primitive(Signature::new(t).inputs([t, t]).name("add"), |_| {
        Ok(kernel(|xs: &[f64]| xs[0] + xs[1]))
    })
    .expect("register add");
    pset
}

/// Tensor <- Matrix <- Square, with primitives of various arities and
/// hyperparameter requirements.
fn typed_grammar() -> PrimitiveSet<f64> {
    let mut types = TypeRegistry::new();
    let tensor = types.new_type(Some("Tensor"), &[]).unwrap();
    let matrix = types.new_type(Some("Matrix"), &[tensor]).unwrap();
    let square = types.new_type(Some("Square"), &[matrix]).unwrap();
    let mut pset = PrimitiveSet::new(types, tensor).unwrap();

    pset.add_terminal(Signature::new(tensor).name("x"), |_| Ok(kernel(|_| 2.0)))
        .unwrap();
    pset.add_terminal(Signature::new(square).name("eye"), |_| Ok(kernel(|_| 1.0)))
        .unwrap();
    pset.add_terminal(Signature::new(matrix).name("scaled").hyper("alpha"), |node| {
        let alpha = node.hyper().float("alpha")?;
        Ok(kernel(move |_| alpha))
    })
    .unwrap();
    pset.add_primitive(Signature::new(tensor).inputs([tensor, tensor]).name("add"), |_| {
        Ok(kernel(|xs: &[f64]| xs[0] + xs[1]))
    })
    .unwrap();
    pset.add_primitive(Signature::new(matrix).inputs([matrix, matrix]).name("matmul"), |_| {
        Ok(kernel(|xs: &[f64]| xs[0] * xs[1]))
    })
    .unwrap();
    pset.add_primitive(Signature::new(square).inputs([square]).name("inverse"), |_| {
        Ok(kernel(|xs: &[f64]| 1.0 / xs[0]))
    })
    .unwrap();
    pset.add_primitive(
        Signature::new(tensor)
            .inputs([matrix, tensor, square])
            .name("contract"),
        |_| Ok(kernel(|xs: &[f64]| xs[0] * xs[1] - xs[2])),
    )
    .unwrap();
    pset
}

#[test]
fn add_leaf_scenario() {
    let pset = add_leaf_grammar();
    let leaf = pset.lookup("leaf").unwrap();
    let add = pset.lookup("add").unwrap();

    for seed in 0..64 {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let expr = pset.gen_expr(&mut rng, 1).unwrap();
        assert!(
            expr.as_slice() == [leaf] || expr.as_slice() == [add, leaf, leaf],
            "unexpected expression {}",
            expr.display(&pset)
        );
    }

    let expr = Expression::new(vec![add, leaf, leaf]);
    assert_eq!(pset.to_string(&expr).unwrap(), "add(leaf, leaf)");
    let tree = pset.instantiate(&expr, &Hyperparams::new()).unwrap();
    assert_eq!(tree.eval(), 3.0);
    let tree = pset
        .instantiate(&expr, &Hyperparams::new().with("value", 4.0))
        .unwrap();
    assert_eq!(tree.eval(), 8.0);
}

#[test]
fn generated_expressions_round_trip() {
    let pset = typed_grammar();
    let mut rng = ChaCha20Rng::seed_from_u64(0xfac7);
    for max_depth in 0..6 {
        for _ in 0..32 {
            let expr = pset.gen_expr(&mut rng, max_depth).unwrap();
            let text = pset.to_string(&expr).unwrap();
            let parsed = pset
                .from_string(&text)
                .unwrap_or_else(|e| panic!("`{text}` did not parse back: {e}"));
            assert_eq!(parsed, expr, "round trip of `{text}`");
        }
    }
}

#[test]
fn generated_expressions_respect_the_depth_bound() {
    let pset = typed_grammar();
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    for max_depth in 0..8 {
        for _ in 0..32 {
            let expr = pset.gen_expr(&mut rng, max_depth).unwrap();
            assert!(
                expr.depth(&pset) <= max_depth,
                "{} is deeper than {max_depth}",
                expr.display(&pset)
            );
        }
    }
}

#[test]
fn generated_expressions_are_well_formed() {
    let pset = typed_grammar();
    let mut rng = ChaCha20Rng::seed_from_u64(2);
    for _ in 0..128 {
        let expr = pset.gen_expr(&mut rng, 5).unwrap();
        expr.validate(&pset).unwrap();

        // Every element heads a subtree of exactly its arity.
        let mut pos = 1;
        let root = expr.subtree(&pset, 0).unwrap();
        assert_eq!(root, 0..expr.len());
        while pos < expr.len() {
            let range = expr.subtree(&pset, pos).unwrap();
            assert!(range.end <= expr.len());
            pos += 1;
        }

        // Children types fit the inputs of their parent.
        let tree = pset
            .instantiate(&expr, &Hyperparams::new().with("alpha", 0.5))
            .unwrap();
        for node in tree.iter() {
            let primitive = node.primitive();
            assert_eq!(node.children().len(), primitive.arity());
            for (child, expected) in node.children().iter().zip(primitive.in_types()) {
                assert!(pset
                    .types()
                    .is_subtype(child.primitive().ret_type(), *expected));
            }
        }
    }
}

#[test]
fn hyperparameters_are_required_iff_used_without_default() {
    let pset = typed_grammar();
    let scaled = pset.lookup("scaled").unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(3);

    for _ in 0..128 {
        let expr = pset.gen_expr(&mut rng, 4).unwrap();
        let uses_alpha = expr.iter().any(|id| id == scaled);
        match pset.instantiate(&expr, &Hyperparams::new()) {
            Ok(_) => assert!(!uses_alpha),
            Err(err) => {
                assert!(uses_alpha);
                assert!(matches!(
                    err.cause(),
                    Error::MissingHyperparameter { primitive, hyperparameter }
                        if primitive == "scaled" && hyperparameter == "alpha"
                ));
            }
        }
    }
}

#[test]
fn subtypes_are_candidates_for_their_ancestors() {
    let pset = typed_grammar();
    let types = pset.types();
    let names = |ids: &[PrimitiveId]| {
        ids.iter()
            .map(|id| pset.get(*id).unwrap().name().to_string())
            .collect::<Vec<_>>()
    };

    let tensor = pset.ret_type();
    let square = types.iter().find(|t| types.name(*t) == Some("Square")).unwrap();
    let matrix = types.iter().find(|t| types.name(*t) == Some("Matrix")).unwrap();

    assert_eq!(names(pset.terminals_of(tensor)), ["x", "eye", "scaled"]);
    assert_eq!(names(pset.terminals_of(matrix)), ["eye", "scaled"]);
    assert_eq!(names(pset.terminals_of(square)), ["eye"]);
    assert_eq!(names(pset.primitives_of(matrix)), ["matmul", "inverse"]);

    let expr = pset
        .from_string("contract(inverse(eye), matmul(eye, scaled), inverse(inverse(eye)))")
        .unwrap();
    let tree = pset
        .instantiate(&expr, &Hyperparams::new().with("alpha", 3.0))
        .unwrap();
    assert_eq!(tree.eval(), 2.0);

    assert!(pset.from_string("inverse(scaled)").unwrap_err().is_type_mismatch());
}

#[test]
fn terminal_fallback_past_max_depth() {
    let mut types = TypeRegistry::new();
    let t = types.new_type(Some("T"), &[]).unwrap();
    let u = types.new_type(Some("U"), &[]).unwrap();
    let mut pset = PrimitiveSet::<f64>::new(types, u).unwrap();
    pset.add_terminal(Signature::new(t).name("leaf"), |_| Ok(kernel(|_| 1.0)))
        .unwrap();
    pset.add_primitive(Signature::new(u).inputs([t]).name("lift"), |_| {
        Ok(kernel(|xs: &[f64]| xs[0]))
    })
    .unwrap();

    let mut rng = ChaCha20Rng::seed_from_u64(4);
    let expr = pset.gen_expr(&mut rng, 0).unwrap();
    assert_eq!(pset.to_string(&expr).unwrap(), "lift(leaf)");
}

#[test]
fn generation_fails_without_candidates() {
    let mut types = TypeRegistry::new();
    let t = types.new_type(Some("T"), &[]).unwrap();
    let orphan = types.new_type(Some("Orphan"), &[]).unwrap();

    let empty = PrimitiveSet::<f64>::new(types.clone(), t).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    for max_depth in [0, 3] {
        let err = empty.gen_expr(&mut rng, max_depth).unwrap_err();
        assert!(err.is_generation(), "{err}");
    }

    // `wrap` is the only way to build a T and never terminates.
    let mut looping = PrimitiveSet::<f64>::new(types.clone(), t).unwrap();
    looping
        .add_primitive(Signature::new(t).inputs([t]).name("wrap"), |_| {
            Ok(kernel(|xs: &[f64]| xs[0]))
        })
        .unwrap();
    assert!(looping.gen_expr(&mut rng, 2).unwrap_err().is_generation());

    // The only terminal has a type nothing asks for.
    let mut unreachable = PrimitiveSet::<f64>::new(types, t).unwrap();
    unreachable
        .add_terminal(Signature::new(orphan).name("o"), |_| Ok(kernel(|_| 0.0)))
        .unwrap();
    let err = unreachable.gen_expr(&mut rng, 0).unwrap_err();
    assert!(err.to_string().contains("`T`"), "{err}");
}

#[test]
fn malformed_listings_are_rejected() {
    let pset = add_leaf_grammar();
    let leaf = pset.lookup("leaf").unwrap();
    let add = pset.lookup("add").unwrap();

    let trailing = Expression::new(vec![add, leaf, leaf, leaf]);
    assert!(pset.to_string(&trailing).unwrap_err().is_malformed_expression());
    let err = pset.instantiate(&trailing, &Hyperparams::new()).unwrap_err();
    assert!(err.cause().is_malformed_expression());

    let truncated = Expression::new(vec![add, add, leaf, leaf]);
    assert!(pset.to_string(&truncated).unwrap_err().is_malformed_expression());
    let err = pset.instantiate(&truncated, &Hyperparams::new()).unwrap_err();
    assert!(err.is_instantiation());
    assert!(err.cause().is_malformed_expression());
    assert_eq!(
        truncated.display(&pset).to_string(),
        "add(add(leaf, leaf), ?)"
    );
}

#[test]
fn parse_errors_are_reported() {
    let pset = add_leaf_grammar();
    for src in ["add(leaf,", "add(leaf leaf)", "(leaf)", "add(leaf, leaf))", "1leaf"] {
        let err = pset.from_string(src).unwrap_err();
        assert!(err.is_parse(), "`{src}` gave {err}");
    }
    assert!(pset.from_string("sub(leaf, leaf)").unwrap_err().is_unknown_name());
    assert!(pset.from_string("add(leaf, leaf, leaf)").unwrap_err().is_arity());
}

#[test]
fn one_grammar_many_threads() {
    let pset = typed_grammar();
    let hyper = Hyperparams::new().with("alpha", 0.25);

    let results: Vec<Vec<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4u64)
            .map(|seed| {
                let pset = &pset;
                let hyper = &hyper;
                scope.spawn(move || {
                    let mut rng = ChaCha20Rng::seed_from_u64(seed);
                    (0..32)
                        .map(|_| {
                            let expr = pset.gen_expr(&mut rng, 4).unwrap();
                            let tree = pset.instantiate(&expr, hyper).unwrap();
                            assert!(!tree.eval().is_nan());
                            pset.to_string(&expr).unwrap()
                        })
                        .collect::<Vec<String>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Threads are independent: each matches a sequential run with its seed.
    for (seed, texts) in results.iter().enumerate() {
        let mut rng = ChaCha20Rng::seed_from_u64(seed as u64);
        for text in texts {
            let expr = pset.gen_expr(&mut rng, 4).unwrap();
            assert_eq!(&pset.to_string(&expr).unwrap(), text);
        }
    }
}

#[test]
fn unused_hyperparameters_are_not_an_error() {
    let pset = add_leaf_grammar();
    let expr = pset.from_string("leaf").unwrap();
    let hyper = Hyperparams::new().with("value", 2.0).with("unused", true);
    assert_eq!(pset.instantiate(&expr, &hyper).unwrap().eval(), 2.0);
}

#[test]
fn hyperparameters_from_toml_file() {
    let pset = add_leaf_grammar();
    let path = std::env::temp_dir().join(format!("hygrammar-hyper-{}.toml", std::process::id()));
    std::fs::write(&path, "value = 0.25\n").unwrap();
    let hyper = Hyperparams::load_from_toml(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let expr = pset.from_string("add(leaf, leaf)").unwrap();
    assert_eq!(pset.instantiate(&expr, &hyper).unwrap().eval(), 0.5);

    assert!(Hyperparams::load_from_toml(&path).unwrap_err().is_io());
    assert!(Hyperparams::from_toml_str("value = ").unwrap_err().is_config());
}
