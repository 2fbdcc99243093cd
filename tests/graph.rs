use quiver::{
    path, translate::CoreDims, Arg, CacheStatus, CachePolicy, CallError, DataArgumentSpec,
    EngineError, FunctionDefinition, Graph, NodeState, Signature, Value, ValueType,
};
use test_log::test;

fn denied(result: Result<Value, CallError>) -> bool {
    matches!(result, Err(CallError::Engine(e)) if matches!(*e, EngineError::AccessDenied { .. }))
}

#[test]
fn function_bodies_only_read_their_own_sources() {
    let graph = Graph::new();
    let a = graph.input(5);
    let other = graph.input(1);
    let (own, captured) = (a.clone(), other.clone());
    graph.register(
        FunctionDefinition::builder("peek")
            .signature(Signature::new(["x"]))
            .data_arguments([DataArgumentSpec::single(0)])
            .evaluate(move |inv| {
                let read = inv.read(&own)?;
                let public = matches!(captured.get_value(), Err(EngineError::AccessDenied { .. }));
                let through_invocation = denied(inv.read(&captured));
                Ok(Value::tuple([
                    read,
                    Value::Bool(public),
                    Value::Bool(through_invocation),
                ]))
            })
            .build(),
    );
    let peek = graph.call("peek", vec![Arg::from(&a)]).unwrap();
    assert_eq!(
        peek.get_value(),
        Ok(Value::tuple([Value::Int(5), Value::Bool(true), Value::Bool(true)]))
    );
    assert_eq!(other.get_value(), Ok(Value::Int(1)));
}

#[test]
fn errors_name_the_failing_function_and_the_chain() {
    let graph = Graph::new();
    let x = graph.input(vec![1, 2]);
    let bad = graph
        .call("reshape", vec![Arg::from(&x), Arg::Const(Value::Int(3))])
        .unwrap();
    let child = graph.call("negative", vec![Arg::from(&bad)]).unwrap();
    match child.get_value() {
        Err(EngineError::External {
            function, chain, ..
        }) => {
            assert_eq!(&*function, "reshape");
            assert_eq!(chain, vec![child.id(), bad.id()]);
        }
        other => panic!("expected an external error, got {other:?}"),
    }
}

#[test]
fn unknown_functions() {
    let graph = Graph::new();
    assert!(matches!(
        graph.call("no_such_function", vec![]),
        Err(EngineError::UnknownFunction { .. })
    ));
}

#[test]
fn shape_and_type_without_full_evaluation() {
    let graph = Graph::new();
    let a = graph.input(Value::array(&[2, 3], vec![1i64, 2, 3, 4, 5, 6]).unwrap());
    let t = graph.call("transpose", vec![Arg::from(&a)]).unwrap();
    assert_eq!(t.state(), NodeState::Uncomputed);
    assert_eq!(t.get_shape().unwrap().as_slice(), &[3, 2]);
    assert_eq!(t.get_type(), Ok(ValueType::Array));
    assert_eq!(a.get_type(), Ok(ValueType::Array));
}

#[test]
fn garbage_collection_keeps_handles_and_their_ancestors() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2]);
    let b = graph.call("negative", vec![Arg::from(&a)]).unwrap();
    let c = graph.call("negative", vec![Arg::from(&b)]).unwrap();
    assert_eq!(graph.node_count(), 3);

    drop(b);
    assert_eq!(graph.collect_garbage(), 0);
    assert_eq!(c.get_value(), Ok(Value::array(&[2], vec![1i64, 2]).unwrap()));

    drop(c);
    assert_eq!(graph.collect_garbage(), 2);
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.stats().collected, 2);
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 2])));
}

#[test]
fn random_values_are_redrawn_on_invalidation() {
    let graph = Graph::new();
    let r = graph
        .call_with("random", vec![], vec![("size", Arg::Const(Value::tuple([8])))])
        .unwrap();
    let first = r.get_value().unwrap();
    assert_eq!(first.shape().as_slice(), &[8]);
    assert_eq!(r.get_value(), Ok(first.clone()));
    assert_eq!(r.cache_status(), CacheStatus::AllValid);

    r.invalidate().unwrap();
    assert_ne!(r.get_value(), Ok(first));
}

#[test]
fn vectorized_functions_invalidate_per_row() {
    let graph = Graph::new();
    graph.vectorize("row_sum", CoreDims::new([1], 0), |args| {
        let row = args[0].to_array()?;
        Ok(Value::Int(row.iter().filter_map(|s| s.as_i64()).sum()))
    });
    let m = graph.input(Value::array(&[2, 3], vec![1i64, 2, 3, 4, 5, 6]).unwrap());
    let sums = graph.call("row_sum", vec![Arg::from(&m)]).unwrap();
    sums.set_cache_policy(CachePolicy::Always);
    assert_eq!(sums.get_value(), Ok(Value::array(&[2], vec![6i64, 15]).unwrap()));

    m.assign(path![[1, 0]], 40).unwrap();
    assert_eq!(sums.cache_status(), CacheStatus::Partial);
    assert_eq!(sums.get_value(), Ok(Value::array(&[2], vec![6i64, 51]).unwrap()));
}

#[test]
fn dot_output() {
    let graph = Graph::new();
    let a = graph.input(1);
    let b = (&a + 1).unwrap();
    b.get_value().unwrap();
    let dot = graph.save_dot_to_string();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains(" -> "));
    assert!(dot.contains(&format!("{} operator_add", b.id())));
}

#[test]
fn stats_track_work() {
    let graph = Graph::new();
    let before = graph.stats();
    let a = graph.input(vec![1, 2, 3]);
    let b = (&a * 3).unwrap();
    b.get_value().unwrap();
    b.assign(path![0], 9).unwrap();
    let diff = graph.stats() - before;
    assert_eq!(diff.created, 2);
    assert_eq!(diff.live, 2);
    assert_eq!(diff.inversions, 1);
    assert!(diff.executions >= 1);
    assert!(diff.invalidations >= 2);
    assert_eq!(a.get_value(), Ok(Value::from(vec![3, 2, 3])));
}
