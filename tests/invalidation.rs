use std::time::Duration;

use quiver::value::Record;
use quiver::{
    path, Arg, CachePolicy, CacheStatus, Config, DataArgumentSpec, FunctionDefinition, Graph,
    NdArray, Node, Scalar, Signature, Value,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_log::test;

fn always(node: &Node) -> &Node {
    node.set_cache_policy(CachePolicy::Always);
    node
}

fn grid() -> Value {
    Value::from(vec![vec![1, 2, 3]])
}

#[test]
fn reductions_invalidate_whole() {
    let graph = Graph::new();
    let a = graph.input(vec![3, 1, 2]);
    let s = graph.call("sum", vec![Arg::from(&a)]).unwrap();
    always(&s);
    assert_eq!(s.get_value(), Ok(Value::Int(6)));
    assert_eq!(s.cache_status(), CacheStatus::AllValid);

    a.assign(path![1], 10).unwrap();
    assert_eq!(s.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(s.get_value(), Ok(Value::Int(15)));
}

#[test]
fn clockwise_rotation_then_item() {
    let graph = Graph::new();
    let a = graph.input(grid());
    let b = graph
        .call_with("rot90", vec![Arg::from(&a)], vec![("k", Arg::Const(Value::Int(-1)))])
        .unwrap();
    let c = always(&b).item(Value::tuple([0, 0])).unwrap();
    always(&c);
    assert_eq!(c.get_value(), Ok(Value::Int(1)));
    assert_eq!(c.cache_status(), CacheStatus::AllValid);

    a.invalidate_at(&path![[0, 1]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllValid);
    assert_eq!(b.cache_status(), CacheStatus::Partial);

    a.invalidate_at(&path![[0, 0]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(c.get_value(), Ok(Value::Int(1)));
}

fn record(shape: &[usize], x: Vec<i64>, y: Vec<i64>) -> Value {
    let field = |data: Vec<i64>| {
        NdArray::from_shape_vec(shape, data.into_iter().map(Scalar::Int).collect()).unwrap()
    };
    Value::Record(Record::new([("x", field(x)), ("y", field(y))]).unwrap())
}

#[test]
fn transposed_records_invalidate_per_field() {
    let graph = Graph::new();
    let a = graph.input(record(&[2, 3], vec![0, 1, 2, 3, 4, 5], vec![10, 11, 12, 13, 14, 15]));
    let t = graph.call("transpose", vec![Arg::from(&a)]).unwrap();
    always(&t);
    assert_eq!(
        t.get_value(),
        Ok(record(&[3, 2], vec![0, 3, 1, 4, 2, 5], vec![10, 13, 11, 14, 12, 15]))
    );
    assert_eq!(t.cache_status(), CacheStatus::AllValid);

    a.assign(path!["x", [0, 1]], 7).unwrap();
    assert_eq!(t.cache_status(), CacheStatus::Partial);
    assert_eq!(t.get_value_at(&path!["x", [1, 0]]), Ok(Value::Int(7)));
    assert_eq!(
        t.get_value(),
        Ok(record(&[3, 2], vec![0, 3, 7, 4, 2, 5], vec![10, 13, 11, 14, 12, 15]))
    );
    assert_eq!(t.cache_status(), CacheStatus::AllValid);
}

#[test]
fn counter_clockwise_rotation_then_item() {
    let graph = Graph::new();
    let a = graph.input(grid());
    let b = graph.call("rot90", vec![Arg::from(&a)]).unwrap();
    let c = always(&b).item(Value::tuple([0, 0])).unwrap();
    always(&c);
    assert_eq!(c.get_value(), Ok(Value::Int(3)));

    a.invalidate_at(&path![[0, 0]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllValid);

    a.invalidate_at(&path![[0, 2]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllInvalid);
}

#[test]
fn invalidating_an_intermediate_node() {
    let graph = Graph::new();
    let a = graph.input(grid());
    let b = graph
        .call_with("rot90", vec![Arg::from(&a)], vec![("k", Arg::Const(Value::Int(-1)))])
        .unwrap();
    let c = always(&b).item(Value::tuple([0, 0])).unwrap();
    always(&c);
    c.get_value().unwrap();

    b.invalidate_at(&path![[1, 0]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllValid);

    b.invalidate_at(&path![[0, 0]]).unwrap();
    assert_eq!(c.cache_status(), CacheStatus::AllInvalid);
}

#[test]
fn list_concatenation_follows_assignments() {
    let graph = Graph::new();
    let a = graph.input(vec![0, 1, 2]);
    let b = (&a + Value::from(vec![3, 4])).unwrap();
    assert_eq!(b.get_value(), Ok(Value::from(vec![0, 1, 2, 3, 4])));

    a.assign(path![1], 11).unwrap();
    assert_eq!(b.get_value(), Ok(Value::from(vec![0, 11, 2, 3, 4])));
}

#[test]
fn elementwise_invalidation_is_pointwise() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3, 4]);
    let b = graph.call("square", vec![Arg::from(&a)]).unwrap();
    always(&b);
    b.get_value().unwrap();

    a.assign(path![2], 5).unwrap();
    assert_eq!(b.cache_status(), CacheStatus::Partial);
    assert_eq!(
        b.get_value_at(&path![2]).unwrap(),
        Value::array(&[4], vec![1i64, 4, 25, 16]).unwrap()
    );
    assert_eq!(b.cache_status(), CacheStatus::AllValid);
}

#[test]
fn invalidation_is_idempotent() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let b = graph.call("negative", vec![Arg::from(&a)]).unwrap();
    always(&b);
    let before = b.get_value().unwrap();

    a.invalidate_at(&path![0]).unwrap();
    let once = b.cache_status();
    a.invalidate_at(&path![0]).unwrap();
    assert_eq!(b.cache_status(), once);
    assert_eq!(b.get_value(), Ok(before));
}

#[test]
fn parameter_sources_invalidate_everything() {
    let graph = Graph::new();
    let a = graph.input(Value::array(&[2, 2], vec![1i64, 2, 3, 4]).unwrap());
    let axis = graph.input(0);
    let s = graph
        .call_with("sum", vec![Arg::from(&a)], vec![("axis", Arg::from(&axis))])
        .unwrap();
    always(&s);
    assert_eq!(s.get_value(), Ok(Value::array(&[2], vec![4i64, 6]).unwrap()));

    axis.assign(path![], 1).unwrap();
    assert_eq!(s.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(s.get_value(), Ok(Value::array(&[2], vec![3i64, 7]).unwrap()));
}

#[test]
fn proxies_do_not_propagate() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2]);
    let p = graph.call("proxy", vec![Arg::from(&a)]).unwrap();
    always(&p);
    assert_eq!(p.get_value(), Ok(Value::from(vec![1, 2])));

    a.invalidate().unwrap();
    assert_eq!(p.cache_status(), CacheStatus::AllValid);
}

#[test]
fn cache_policies() {
    let config = Config {
        min_seconds_for_cache: Duration::from_secs(3600),
        ..Config::default()
    };
    let graph = Graph::with_config(config);
    let a = graph.input(vec![1, 2, 3]);
    let auto = graph.call("square", vec![Arg::from(&a)]).unwrap();
    let cached = graph.call("square", vec![Arg::from(&a)]).unwrap();
    let never = graph.call("square", vec![Arg::from(&a)]).unwrap();
    cached.set_cache_policy(CachePolicy::Always);
    never.set_cache_policy(CachePolicy::Never);
    assert_eq!(auto.cache_policy(), Some(CachePolicy::Auto));
    assert_eq!(a.cache_policy(), None);

    let expected = Value::array(&[3], vec![1i64, 4, 9]).unwrap();
    for node in [&auto, &cached, &never] {
        assert_eq!(node.get_value(), Ok(expected.clone()));
    }
    assert_eq!(auto.cache_status(), CacheStatus::AllInvalid);
    assert_eq!(cached.cache_status(), CacheStatus::AllValid);
    assert_eq!(never.cache_status(), CacheStatus::AllInvalid);

    let before = graph.stats();
    assert_eq!(cached.get_value(), Ok(expected.clone()));
    assert_eq!(graph.stats().executions, before.executions);
    assert_eq!(never.get_value(), Ok(expected));
    assert!(graph.stats().executions > before.executions);
}

#[test]
fn slow_results_are_cached_automatically() {
    let graph = Graph::new();
    graph.register(
        FunctionDefinition::builder("slow_identity")
            .signature(Signature::new(["x"]))
            .data_arguments([DataArgumentSpec::single(0)])
            .evaluate(|inv| {
                std::thread::sleep(Duration::from_millis(5));
                inv.arg("x")
            })
            .build(),
    );
    let a = graph.input(vec![1, 2]);
    let slow = graph.call("slow_identity", vec![Arg::from(&a)]).unwrap();
    assert_eq!(slow.get_value(), Ok(Value::from(vec![1, 2])));
    assert_eq!(slow.cache_policy(), Some(CachePolicy::Auto));
    assert_eq!(slow.cache_status(), CacheStatus::AllValid);
}

/// Random graphs of elementwise and cumulative operations, checked against plain vectors after
/// random assignments and invalidations.
#[test]
fn random_graphs_agree_with_direct_evaluation() {
    #[derive(Clone, Copy)]
    enum Op {
        Add(usize, usize),
        Subtract(usize, usize),
        Scale(usize, i64),
        Negative(usize),
        Cumsum(usize),
    }

    fn evaluate(op: Op, values: &[Vec<i64>]) -> Vec<i64> {
        match op {
            Op::Add(x, y) => values[x].iter().zip(&values[y]).map(|(a, b)| a + b).collect(),
            Op::Subtract(x, y) => values[x].iter().zip(&values[y]).map(|(a, b)| a - b).collect(),
            Op::Scale(x, k) => values[x].iter().map(|a| a * k).collect(),
            Op::Negative(x) => values[x].iter().map(|a| -a).collect(),
            Op::Cumsum(x) => values[x]
                .iter()
                .scan(0, |acc, a| {
                    *acc += a;
                    Some(*acc)
                })
                .collect(),
        }
    }

    const LEN: usize = 6;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..8 {
        let graph = Graph::new();
        let mut inputs: Vec<Vec<i64>> = (0..2)
            .map(|_| (0..LEN).map(|_| rng.gen_range(-5..5)).collect())
            .collect();
        let mut nodes: Vec<Node> = inputs.iter().map(|v| graph.input(v.clone())).collect();
        let mut ops = Vec::new();
        for _ in 0..10 {
            let n = nodes.len();
            let op = match rng.gen_range(0..5) {
                0 => Op::Add(rng.gen_range(0..n), rng.gen_range(0..n)),
                1 => Op::Subtract(rng.gen_range(0..n), rng.gen_range(0..n)),
                2 => Op::Scale(rng.gen_range(0..n), rng.gen_range(-3..4)),
                3 => Op::Negative(rng.gen_range(0..n)),
                _ => Op::Cumsum(rng.gen_range(0..n)),
            };
            let node = match op {
                Op::Add(x, y) => {
                    graph.call("add", vec![Arg::from(&nodes[x]), Arg::from(&nodes[y])])
                }
                Op::Subtract(x, y) => graph.call(
                    "subtract",
                    vec![Arg::from(&nodes[x]), Arg::from(&nodes[y])],
                ),
                Op::Scale(x, k) => graph.call(
                    "multiply",
                    vec![Arg::from(&nodes[x]), Arg::Const(Value::Int(k))],
                ),
                Op::Negative(x) => graph.call("negative", vec![Arg::from(&nodes[x])]),
                Op::Cumsum(x) => graph.call("cumsum", vec![Arg::from(&nodes[x])]),
            }
            .unwrap();
            if rng.gen_bool(0.5) {
                node.set_cache_policy(CachePolicy::Always);
            }
            nodes.push(node);
            ops.push(op);
        }

        let expected = |inputs: &[Vec<i64>]| {
            let mut values = inputs.to_vec();
            for op in &ops {
                let value = evaluate(*op, &values);
                values.push(value);
            }
            values
        };

        for _ in 0..20 {
            match rng.gen_range(0..3) {
                0 => {
                    let which = rng.gen_range(0..inputs.len());
                    let at = rng.gen_range(0..LEN);
                    let value = rng.gen_range(-5..5);
                    inputs[which][at] = value;
                    nodes[which].assign(path![at], value).unwrap();
                }
                1 => {
                    let node = &nodes[rng.gen_range(2..nodes.len())];
                    node.invalidate_at(&path![rng.gen_range(0..LEN)]).unwrap();
                }
                _ => {
                    let node = &nodes[rng.gen_range(2..nodes.len())];
                    node.invalidate().unwrap();
                }
            }

            let values = expected(&inputs);
            let sampled = rng.gen_range(2..nodes.len());
            let at = rng.gen_range(0..LEN);
            let partial = nodes[sampled].get_value_at(&path![at]).unwrap();
            let partial = partial.to_array().unwrap();
            assert_eq!(partial.data()[at], Scalar::Int(values[sampled][at]));

            for (node, value) in nodes.iter().zip(&values).skip(2) {
                let whole = Value::array(&[LEN], value.clone()).unwrap();
                assert_eq!(node.get_value(), Ok(whole));
            }
        }
    }
}
