use quiver::{path, Arg, AssignmentTemplate, EngineError, Graph, InversionError, Value};
use test_log::test;

#[test]
fn elementwise_round_trip() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let b = (&a * 2).unwrap();
    b.assign(path![0], 8).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![4, 2, 3])));
    assert_eq!(b.get_value(), Ok(Value::array(&[3], vec![8i64, 4, 6]).unwrap()));
}

#[test]
fn chained_inversion() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let b = graph
        .call("add", vec![Arg::from(&a), Arg::Const(Value::Int(10))])
        .unwrap();
    let c = graph.call("negative", vec![Arg::from(&b)]).unwrap();
    c.assign(path![2], -20).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 2, 10])));
    assert_eq!(c.get_value(), Ok(Value::array(&[3], vec![-11i64, -12, -20]).unwrap()));
}

#[test]
fn assignment_through_getitem_on_a_map() {
    let graph = Graph::new();
    let m = graph.input(Value::map([
        ("x", Value::from(vec![1, 2, 3])),
        ("y", Value::from(vec![4])),
    ]));
    let v = m.item("x").unwrap();
    v.assign(path![1], 5).unwrap();
    assert_eq!(
        m.get_value(),
        Ok(Value::map([
            ("x", Value::from(vec![1, 5, 3])),
            ("y", Value::from(vec![4])),
        ]))
    );
    assert_eq!(v.get_value(), Ok(Value::from(vec![1, 5, 3])));
}

#[test]
fn failed_inversion_leaves_sources_alone() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let s = graph.call("sum", vec![Arg::from(&a)]).unwrap();
    assert_eq!(s.get_value(), Ok(Value::Int(6)));

    let err = s.assign(path![], 10);
    assert!(matches!(err, Err(EngineError::Inversion(_))), "{err:?}");
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 2, 3])));
    assert!(a.list_overrides().is_empty());
    assert_eq!(s.get_value(), Ok(Value::Int(6)));
}

#[test]
fn overridable_function_nodes_keep_their_overrides() {
    let graph = Graph::new();
    let a = graph.input(10);
    let b = (&a * 2).unwrap();
    assert!(!b.allows_overriding());
    b.set_allow_overriding(true);

    b.assign(path![], 7).unwrap();
    assert_eq!(b.get_value(), Ok(Value::Int(7)));
    assert_eq!(a.get_value(), Ok(Value::Int(10)));
    assert_eq!(b.list_overrides().len(), 1);

    b.clear_overrides().unwrap();
    assert_eq!(b.get_value(), Ok(Value::Int(20)));
}

#[test]
fn later_assignments_win() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    a.assign(path![0], 5).unwrap();
    a.assign(path![0], 6).unwrap();
    assert_eq!(a.list_overrides().len(), 1);
    assert_eq!(a.get_value(), Ok(Value::from(vec![6, 2, 3])));
}

#[test]
fn overrides_carry_over_to_a_new_graph() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    a.assign(path![0], 9).unwrap();
    a.assign(path![2], 7).unwrap();
    let saved = a.list_overrides();
    assert_eq!(saved.len(), 2);

    let restored = Graph::new().input(vec![1, 2, 3]);
    restored.apply_overrides(saved).unwrap();
    assert_eq!(restored.get_value(), Ok(Value::from(vec![9, 2, 7])));

    assert_eq!(restored.remove_override_at(&path![0]), Ok(Some(Value::Int(9))));
    assert_eq!(restored.get_value(), Ok(Value::from(vec![1, 2, 7])));
    assert_eq!(restored.remove_override_at(&path![0]), Ok(None));
}

#[test]
fn overrides_reach_downstream_nodes() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let b = graph.call("square", vec![Arg::from(&a)]).unwrap();
    assert_eq!(b.get_value(), Ok(Value::array(&[3], vec![1i64, 4, 9]).unwrap()));
    a.apply_overrides(vec![quiver::Assignment::new(path![1], 4)])
        .unwrap();
    assert_eq!(b.get_value(), Ok(Value::array(&[3], vec![1i64, 16, 9]).unwrap()));
}

#[test]
fn list_concatenation_writes_back_to_the_list_operand() {
    let graph = Graph::new();
    let a = graph.input(vec![1]);
    let b = (&a + Value::from(vec![5])).unwrap();
    assert_eq!(b.get_value(), Ok(Value::from(vec![1, 5])));

    b.assign(path![0], 10).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![10])));
    assert_eq!(b.get_value(), Ok(Value::from(vec![10, 5])));

    let err = b.assign(path![1], 10);
    assert!(matches!(err, Err(EngineError::Inversion(_))), "{err:?}");
    assert_eq!(a.get_value(), Ok(Value::from(vec![10])));
    assert_eq!(b.get_value(), Ok(Value::from(vec![10, 5])));
}

#[test]
fn list_concatenation_keeps_other_elements() {
    let graph = Graph::new();
    let a = graph.input(vec![0, 1, 2]);
    let b = (&a + Value::from(vec![3, 4])).unwrap();
    b.assign(path![2], 22).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![0, 1, 22])));
    assert_eq!(b.get_value(), Ok(Value::from(vec![0, 1, 22, 3, 4])));
}

#[test]
fn templates_fit_assignments_stored_at_the_node() {
    let graph = Graph::new();
    let a = graph.input(vec![0, 0]);
    a.set_assignment_template(Some(AssignmentTemplate::bound(0, 10).unwrap()))
        .unwrap();
    a.assign(path![1], 99).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![0, 10])));

    let err = a.assign(path![0], "x");
    assert!(matches!(err, Err(EngineError::Template(_))), "{err:?}");
    assert_eq!(a.get_value(), Ok(Value::from(vec![0, 10])));
}

#[test]
fn templates_apply_after_inversion() {
    let graph = Graph::new();
    let a = graph.input(vec![0, 0]);
    a.set_assignment_template(Some(AssignmentTemplate::range(0, 100, 10).unwrap()))
        .unwrap();
    let b = (&a * 2).unwrap();
    b.assign(path![0], 74).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![40, 0])));
    assert_eq!(b.get_value(), Ok(Value::array(&[2], vec![80i64, 0]).unwrap()));
}

#[test]
fn assigned_nodes_choose_where_assignments_land() {
    let graph = Graph::new();
    let a = graph.input(vec![1, 2, 3]);
    let b = (&a + 10).unwrap();
    b.set_allow_overriding(true);
    let c = (-&b).unwrap();

    // the nearest overridable node takes it by default
    c.assign(path![0], -5).unwrap();
    assert_eq!(b.list_overrides().len(), 1);
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 2, 3])));

    c.set_assigned_nodes(&[&a]).unwrap();
    assert_eq!(c.assigned_nodes(), Some(vec![a.id()]));
    c.assign(path![1], -20).unwrap();
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 10, 3])));
    assert_eq!(b.list_overrides().len(), 1);
    assert_eq!(c.get_value(), Ok(Value::array(&[3], vec![-5i64, -20, -13]).unwrap()));

    c.set_assigned_nodes(&[]).unwrap();
    let err = c.assign(path![2], 0);
    assert!(
        matches!(err, Err(EngineError::Inversion(InversionError::NotAssignable { .. }))),
        "{err:?}"
    );
    assert_eq!(a.get_value(), Ok(Value::from(vec![1, 10, 3])));

    c.set_assigned_nodes(&[&c]).unwrap();
    assert!(c.allows_overriding());
    c.assign(path![2], 0).unwrap();
    assert_eq!(c.list_overrides().len(), 1);
    assert_eq!(c.get_value(), Ok(Value::array(&[3], vec![-5i64, -20, 0]).unwrap()));

    c.clear_assigned_nodes();
    assert_eq!(c.assigned_nodes(), None);
}
