use quiver::array::AxisIndex;
use quiver::call::FuncCall;
use quiver::source::{ResultMeta, Source, SourceCall};
use quiver::translate::{CoreDims, Requirement, Requirements};
use quiver::{path, Arg, Component, Graph, Path, PathComponent, Scalar, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use test_log::test;

enum Input {
    Source(Value),
    Const(Value),
}

struct Case {
    name: &'static str,
    args: Vec<Input>,
    kwargs: Vec<(&'static str, Value)>,
}

fn random_array(rng: &mut StdRng, shape: &[usize]) -> Value {
    let n: usize = shape.iter().product();
    let data: Vec<i64> = (0..n).map(|_| rng.gen_range(-9..10)).collect();
    Value::array(shape, data).unwrap()
}

fn random_case(rng: &mut StdRng) -> Case {
    let (rows, cols) = (rng.gen_range(1..4), rng.gen_range(1..5));
    let grid = random_array(rng, &[rows, cols]);
    let source = |v: Value| Input::Source(v);
    match rng.gen_range(0..9) {
        0 => {
            let other = if rng.gen_bool(0.5) {
                random_array(rng, &[cols])
            } else {
                random_array(rng, &[rows, 1])
            };
            Case {
                name: "add",
                args: vec![source(grid), source(other)],
                kwargs: vec![],
            }
        }
        1 => {
            let axis = match rng.gen_range(0..3) {
                2 => Value::None,
                axis => Value::Int(axis),
            };
            Case {
                name: "sum",
                args: vec![source(grid)],
                kwargs: vec![("axis", axis)],
            }
        }
        2 => Case {
            name: "cumsum",
            args: vec![source(grid)],
            kwargs: vec![("axis", Value::Int(rng.gen_range(0..2)))],
        },
        3 => Case {
            name: "rot90",
            args: vec![source(grid)],
            kwargs: vec![("k", Value::Int(rng.gen_range(-2..3)))],
        },
        4 => Case {
            name: "transpose",
            args: vec![source(grid)],
            kwargs: vec![],
        },
        5 => Case {
            name: "reshape",
            args: vec![source(grid), Input::Const(Value::tuple([cols as i64, rows as i64]))],
            kwargs: vec![],
        },
        6 => Case {
            name: "getitem",
            args: vec![
                source(grid),
                Input::Const(Value::Int(rng.gen_range(0..rows) as i64)),
            ],
            kwargs: vec![],
        },
        7 => Case {
            name: "row_sum",
            args: vec![source(grid)],
            kwargs: vec![],
        },
        _ => Case {
            name: "add",
            args: vec![source(grid), Input::Const(Value::Int(rng.gen_range(-3..4)))],
            kwargs: vec![],
        },
    }
}

/// The result of running the case through a graph, and the same call as translators see it.
fn evaluate(graph: &Graph, case: &Case) -> (Value, SourceCall) {
    let args = case
        .args
        .iter()
        .map(|input| match input {
            Input::Source(value) => Arg::Source(graph.input(value.clone())),
            Input::Const(value) => Arg::Const(value.clone()),
        })
        .collect();
    let kwargs = case
        .kwargs
        .iter()
        .map(|(name, value)| (*name, Arg::Const(value.clone())))
        .collect();
    let node = graph.call_with(case.name, args, kwargs).unwrap();
    let result = node.get_value().unwrap();

    let mut occurrence = 0;
    let args = case
        .args
        .iter()
        .map(|input| match input {
            Input::Source(value) => {
                occurrence += 1;
                Arg::Source(Source::known(occurrence - 1, value.clone()))
            }
            Input::Const(value) => Arg::Const(value.clone()),
        })
        .collect();
    let kwargs = case
        .kwargs
        .iter()
        .map(|(name, value)| ((*name).into(), Arg::Const(value.clone())))
        .collect();
    let call = FuncCall::new(graph.definition(case.name).unwrap(), args, kwargs);
    (result, call)
}

fn backward(call: &SourceCall, path: &Path, meta: &ResultMeta) -> Requirements {
    call.definition
        .backward_translators
        .iter()
        .find_map(|t| t.backward(call, path, Some(meta)).ok())
        .unwrap_or_else(|| panic!("no backward translation of {path} through {}", call.definition.name))
}

fn forward(call: &SourceCall, occurrence: usize, path: &Path, meta: &ResultMeta) -> Vec<Path> {
    let location = call.location_of(occurrence).unwrap();
    call.definition
        .forward_translators
        .iter()
        .find_map(|t| t.forward(call, &location, path, Some(meta)).ok())
        .unwrap_or_else(|| panic!("no forward translation of {path} through {}", call.definition.name))
}

fn element(index: &[usize]) -> Path {
    match index {
        [] => path![],
        _ => Path::from(vec![PathComponent::new(Component::Tuple(
            index.iter().map(|&i| AxisIndex::Index(i as isize)).collect(),
        ))]),
    }
}

/// Whether any of `paths` reaches the result element numbered `flat`.
fn covers(paths: &[Path], shape: &[usize], flat: usize) -> bool {
    let n: usize = shape.iter().product();
    let numbered = Value::array(shape, (0..n as i64).collect::<Vec<_>>()).unwrap();
    paths.iter().any(|p| {
        let tensor: Path = p
            .iter()
            .take_while(|c| !matches!(c.component, Component::OutOfArray | Component::Key(_)))
            .cloned()
            .collect();
        let reached = quiver::path::get(&numbered, &tensor).unwrap();
        reached
            .to_array()
            .unwrap()
            .iter()
            .any(|&s| s == Scalar::Int(flat as i64))
    })
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (axis, &len) in shape.iter().enumerate().rev() {
        index[axis] = flat % len;
        flat /= len;
    }
    index
}

#[test]
fn forward_of_backward_covers_the_requested_element() {
    let mut rng = StdRng::seed_from_u64(0x7a45);
    let graph = Graph::new();
    graph.vectorize("row_sum", CoreDims::new([1], 0), |args| {
        let row = args[0].to_array()?;
        Ok(Value::Int(row.iter().filter_map(|s| s.as_i64()).sum()))
    });
    let mut checked = 0;
    for _ in 0..200 {
        let case = random_case(&mut rng);
        let (result, call) = evaluate(&graph, &case);
        let meta = ResultMeta::of(&result);
        let shape = result.shape();
        let n: usize = shape.iter().product();
        let flat = rng.gen_range(0..n.max(1));
        let p = element(&unravel(flat, &shape));

        let requirements = backward(&call, &p, &meta);
        for (occurrence, requirement) in requirements.iter() {
            let Requirement::Path(needed) = requirement else {
                continue;
            };
            let affected = forward(&call, occurrence, needed, &meta);
            assert!(
                covers(&affected, &shape, flat),
                "{}: {p} needs {needed} of source {occurrence}, which reaches only {affected:?}",
                case.name
            );
            checked += 1;
        }
    }
    assert!(checked > 100, "only {checked} translations checked");
}
