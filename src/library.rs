//! The built-in functions every graph starts with. One or a few of each translator and
//! inverter category, registered through the same interface client code uses.

use rand::Rng;

use crate::array::NdArray;
use crate::call::{FuncCall, Signature};
use crate::definition::{
    DataArgumentSpec, DefinitionFlags, FunctionDefinition, Invocation, Registry,
};
use crate::error::{CallError, PathError};
use crate::invert::{
    CastingInverter, ElementwiseInverter, GetItemInverter, Inverse, ListAdditionInverter,
    ProxyInverter, TranspositionalInverter,
};
use crate::params;
use crate::path::{self, Component, PathComponent};
use crate::translate::{
    AccumulationTranslator, ElementwiseTranslator, GetItemTranslator, ListAdditionTranslator,
    ReductionTranslator, ShapeOnlyTranslator, Transposition, TranspositionalTranslator,
    WholeValueTranslator,
};
use crate::value::{Record, Scalar, Value};

mod arith;

pub(crate) use arith::array_result;
use arith::{Accumulation, Binary, Reduction, Unary};

pub fn register_all(registry: &mut Registry) {
    register_elementwise(registry);
    register_axis(registry);
    register_transpositions(registry);
    register_shape_only(registry);
    register_casts(registry);
    register_misc(registry);
}

fn single() -> [DataArgumentSpec; 1] {
    [DataArgumentSpec::single(0)]
}

fn register_elementwise(registry: &mut Registry) {
    let binaries = [
        ("add", Binary::Add, Inverse::Add),
        ("subtract", Binary::Subtract, Inverse::Subtract),
        ("multiply", Binary::Multiply, Inverse::Multiply),
        ("divide", Binary::Divide, Inverse::Divide),
        ("power", Binary::Power, Inverse::Power),
    ];
    for (name, op, inverse) in binaries {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(Signature::new(["x1", "x2"]))
                .data_arguments([DataArgumentSpec::single(0), DataArgumentSpec::single(1)])
                .evaluate(move |inv| Ok(arith::binary(op, &inv.arg("x1")?, &inv.arg("x2")?)?))
                .translator(ElementwiseTranslator)
                .inverter(ElementwiseInverter(inverse))
                .build(),
        );
    }

    let unaries = [
        ("negative", Unary::Negative, Inverse::Negative),
        ("abs", Unary::Abs, Inverse::Abs),
        ("square", Unary::Square, Inverse::Square),
        ("sqrt", Unary::Sqrt, Inverse::Sqrt),
        ("exp", Unary::Exp, Inverse::Exp),
        ("log", Unary::Log, Inverse::Log),
        ("sin", Unary::Sin, Inverse::Sin),
        ("cos", Unary::Cos, Inverse::Cos),
        ("tan", Unary::Tan, Inverse::Tan),
    ];
    for (name, op, inverse) in unaries {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(Signature::new(["x"]))
                .data_arguments(single())
                .evaluate(move |inv| Ok(arith::unary(op, &inv.arg("x")?)?))
                .translator(ElementwiseTranslator)
                .inverter(ElementwiseInverter(inverse))
                .build(),
        );
    }

    let operators = [
        ("operator_add", Binary::Add, Inverse::Add),
        ("operator_sub", Binary::Subtract, Inverse::Subtract),
        ("operator_mul", Binary::Multiply, Inverse::Multiply),
        ("operator_truediv", Binary::Divide, Inverse::Divide),
    ];
    for (name, op, inverse) in operators {
        let mut builder = FunctionDefinition::builder(name)
            .signature(Signature::new(["left", "right"]))
            .data_arguments([DataArgumentSpec::single(0), DataArgumentSpec::single(1)])
            .flags(DefinitionFlags {
                operator: true,
                ..Default::default()
            })
            .evaluate(move |inv| operator(op, &inv.arg("left")?, &inv.arg("right")?))
            .translator(ElementwiseTranslator)
            .inverter(ElementwiseInverter(inverse));
        if op == Binary::Add {
            builder = builder
                .translator(ListAdditionTranslator)
                .inverter(ListAdditionInverter);
        }
        registry.register(builder.build());
    }
    registry.register(
        FunctionDefinition::builder("operator_neg")
            .signature(Signature::new(["operand"]))
            .data_arguments(single())
            .flags(DefinitionFlags {
                operator: true,
                ..Default::default()
            })
            .evaluate(|inv| Ok(arith::unary(Unary::Negative, &inv.arg("operand")?)?))
            .translator(ElementwiseTranslator)
            .inverter(ElementwiseInverter(Inverse::Negative))
            .build(),
    );
}

/// Python-style operators: `+` on two sequences concatenates them, everything else is numeric.
fn operator(op: Binary, left: &Value, right: &Value) -> Result<Value, CallError> {
    match (op, left, right) {
        (Binary::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.clone();
            items.append(b.clone());
            Ok(Value::List(items))
        }
        (Binary::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.clone();
            items.append(b.clone());
            Ok(Value::Tuple(items))
        }
        (Binary::Add, Value::Str(a), Value::Str(b)) => Ok(Value::from(format!("{a}{b}"))),
        (Binary::Add, Value::List(_) | Value::Tuple(_), Value::List(_) | Value::Tuple(_)) => Err(
            CallError::msg(format!(
                "can only concatenate {} to {}",
                left.type_name(),
                right.type_name()
            )),
        ),
        _ => Ok(arith::binary(op, left, right)?),
    }
}

fn register_axis(registry: &mut Registry) {
    let reductions = [
        ("sum", Reduction::Sum),
        ("prod", Reduction::Prod),
        ("min", Reduction::Min),
        ("max", Reduction::Max),
        ("any", Reduction::Any),
        ("all", Reduction::All),
        ("mean", Reduction::Mean),
    ];
    for (name, reduction) in reductions {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(
                    Signature::new(["a", "axis", "keepdims", "where"])
                        .with_default("axis", Value::None)
                        .with_default("keepdims", false)
                        .with_default("where", Value::None),
                )
                .data_arguments(single())
                .evaluate(move |inv| {
                    let a = inv.arg("a")?;
                    let array = a.to_array()?;
                    let axes = params::axes(inv.arg_opt("axis").as_ref(), array.ndim())?;
                    let keepdims = params::flag(inv.arg_opt("keepdims").as_ref());
                    let where_ = params::mask(inv.arg_opt("where").as_ref())?;
                    let out = reduction.apply(&array, axes.as_deref(), keepdims, where_.as_ref())?;
                    Ok(match out.ndim() {
                        0 => Value::from(out.data()[0]),
                        _ => Value::Array(out),
                    })
                })
                .translator(ReductionTranslator)
                .build(),
        );
    }

    for (name, accumulation) in [("cumsum", Accumulation::Sum), ("cumprod", Accumulation::Prod)] {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(Signature::new(["a", "axis"]).with_default("axis", Value::None))
                .data_arguments(single())
                .evaluate(move |inv| {
                    let array = inv.arg("a")?.to_array()?;
                    let axis = params::axis(inv.arg_opt("axis").as_ref(), array.ndim())?;
                    Ok(Value::Array(accumulation.apply(&array, axis)?))
                })
                .translator(AccumulationTranslator)
                .build(),
        );
    }
}

/// Run a transposition over the data arguments of a call, as arrays. A multi-argument passed
/// as one constant sequence counts as its elements. Records move field by field.
fn transpose_values(t: Transposition, inv: &Invocation<'_>) -> Result<Value, CallError> {
    let call = inv.call();
    let mut inputs = Vec::new();
    for data in call.data_arguments() {
        let value = data
            .arg
            .to_value()
            .ok_or_else(|| CallError::argument("data", "unresolved"))?;
        let multi = call
            .definition
            .data_arguments
            .iter()
            .any(|d| d.formal == data.formal && d.multi);
        match (multi, data.element, value.as_sequence()) {
            (true, None, Some(items)) => inputs.extend(items.iter().cloned()),
            _ => inputs.push(value),
        }
    }
    if inputs.iter().any(|v| matches!(v, Value::Record(_))) {
        return transpose_records(t, call, &inputs);
    }
    let arrays = inputs
        .iter()
        .map(Value::to_array)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(t.apply(call, arrays)?))
}

fn transpose_records(
    t: Transposition,
    call: &FuncCall<Value>,
    inputs: &[Value],
) -> Result<Value, CallError> {
    let records = inputs
        .iter()
        .map(|v| match v {
            Value::Record(r) => Ok(r),
            other => Err(CallError::argument(
                "data",
                format!("cannot combine a record with a {}", other.type_name()),
            )),
        })
        .collect::<Result<Vec<&Record>, _>>()?;
    let Some(first) = records.first() else {
        return Err(CallError::argument("data", "no records"));
    };
    let mut fields = Vec::new();
    for name in first.field_names() {
        let arrays = records
            .iter()
            .map(|r| {
                r.field(name)
                    .cloned()
                    .ok_or_else(|| PathError::KeyNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        fields.push((name.clone(), t.apply(call, arrays)?));
    }
    Ok(Value::Record(Record::new(fields)?))
}

fn register_transpositions(registry: &mut Registry) {
    let table: [(&str, Transposition, Signature, DataArgumentSpec); 9] = [
        (
            "array",
            Transposition::Array,
            Signature::new(["object"]),
            DataArgumentSpec::single(0),
        ),
        (
            "reshape",
            Transposition::Reshape,
            Signature::new(["a", "newshape"]),
            DataArgumentSpec::single(0),
        ),
        (
            "transpose",
            Transposition::Transpose,
            Signature::new(["a", "axes"]).with_default("axes", Value::None),
            DataArgumentSpec::single(0),
        ),
        (
            "rot90",
            Transposition::Rot90,
            Signature::new(["m", "k", "axes"])
                .with_default("k", 1)
                .with_default("axes", Value::tuple([0, 1])),
            DataArgumentSpec::single(0),
        ),
        (
            "flip",
            Transposition::Flip,
            Signature::new(["m", "axis"]).with_default("axis", Value::None),
            DataArgumentSpec::single(0),
        ),
        (
            "concatenate",
            Transposition::Concatenate,
            Signature::new(["arrays", "axis"]).with_default("axis", 0),
            DataArgumentSpec::multi(0),
        ),
        (
            "tile",
            Transposition::Tile,
            Signature::new(["a", "reps"]),
            DataArgumentSpec::single(0),
        ),
        (
            "repeat",
            Transposition::Repeat,
            Signature::new(["a", "repeats", "axis"]).with_default("axis", Value::None),
            DataArgumentSpec::single(0),
        ),
        (
            "expand_dims",
            Transposition::ExpandDims,
            Signature::new(["a", "axis"]),
            DataArgumentSpec::single(0),
        ),
    ];
    for (name, transposition, signature, data) in table {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(signature)
                .data_arguments([data])
                .evaluate(move |inv| transpose_values(transposition, inv))
                .translator(TranspositionalTranslator(transposition))
                .inverter(TranspositionalInverter(transposition))
                .build(),
        );
    }

    registry.register(
        FunctionDefinition::builder("getitem")
            .signature(Signature::new(["obj", "item"]))
            .data_arguments(single())
            .evaluate(|inv| {
                let obj = inv.arg("obj")?;
                let item = inv.arg("item")?;
                let component = Component::from_value(&item).ok_or_else(|| {
                    CallError::argument("item", format!("{item:?} is not an index"))
                })?;
                Ok(path::get(&obj, &[PathComponent::new(component)])?)
            })
            .translator(GetItemTranslator)
            .translator(TranspositionalTranslator(Transposition::GetItem))
            .inverter(GetItemInverter)
            .inverter(TranspositionalInverter(Transposition::GetItem))
            .build(),
    );
}

fn register_shape_only(registry: &mut Registry) {
    let table: [(&str, fn(&Value) -> Result<Value, CallError>); 6] = [
        ("shape", |v| {
            Ok(Value::tuple(v.shape().iter().map(|&d| Value::from(d))))
        }),
        ("len", |v| match v {
            Value::Map(m) => Ok(Value::from(m.len())),
            Value::Str(s) => Ok(Value::from(s.chars().count())),
            other => other
                .shape()
                .first()
                .map(|&d| Value::from(d))
                .ok_or_else(|| CallError::msg(format!("{} has no len()", other.type_name()))),
        }),
        ("ndim", |v| Ok(Value::from(v.shape().len()))),
        ("size", |v| Ok(Value::from(v.shape().iter().product::<usize>()))),
        ("zeros_like", |v| filled_like(v, 0)),
        ("ones_like", |v| filled_like(v, 1)),
    ];
    for (name, body) in table {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(Signature::new(["a"]))
                .data_arguments(single())
                .evaluate(move |inv| body(&inv.arg("a")?))
                .translator(ShapeOnlyTranslator)
                .build(),
        );
    }
}

fn filled_like(value: &Value, fill: i64) -> Result<Value, CallError> {
    let array = value.to_array()?;
    let float = array.iter().any(|s| s.is_float());
    let fill = if float {
        Scalar::Float(fill as f64)
    } else {
        Scalar::Int(fill)
    };
    Ok(array_result(NdArray::from_elem(array.shape(), fill), &[value]))
}

fn cast(name: &'static str, value: &Value) -> Result<Value, CallError> {
    let fail = || CallError::argument("x", format!("cannot convert {value:?} with {name}"));
    Ok(match (name, value) {
        ("to_str", Value::Str(_)) => value.clone(),
        ("to_str", Value::Bool(b)) => Value::from(if *b { "True" } else { "False" }),
        ("to_str", Value::Int(i)) => Value::from(i.to_string()),
        ("to_str", Value::Float(f)) => Value::from(format!("{f:?}")),
        ("to_str", other) => Value::from(format!("{other:?}")),
        ("to_int", Value::Str(s)) => Value::Int(s.trim().parse().map_err(|_| fail())?),
        ("to_int", Value::Float(f)) if f.is_finite() => Value::Int(f.trunc() as i64),
        ("to_int", other) => Value::Int(other.as_i64().ok_or_else(fail)?),
        ("to_float", Value::Str(s)) => Value::Float(s.trim().parse().map_err(|_| fail())?),
        ("to_float", other) => Value::Float(other.as_f64().ok_or_else(fail)?),
        _ => return Err(fail()),
    })
}

fn register_casts(registry: &mut Registry) {
    for name in ["to_int", "to_float", "to_str"] {
        registry.register(
            FunctionDefinition::builder(name)
                .signature(Signature::new(["x"]))
                .data_arguments(single())
                .evaluate(move |inv| cast(name, &inv.arg("x")?))
                .translator(WholeValueTranslator)
                .inverter(CastingInverter)
                .build(),
        );
    }
}

fn register_misc(registry: &mut Registry) {
    registry.register(
        FunctionDefinition::builder("proxy")
            .signature(Signature::new(["obj"]))
            .data_arguments(single())
            .flags(DefinitionFlags {
                creates_dependency: false,
                ..Default::default()
            })
            .evaluate(|inv| inv.arg("obj"))
            .translator(WholeValueTranslator)
            .inverter(ProxyInverter)
            .build(),
    );

    registry.register(
        FunctionDefinition::builder("random")
            .signature(
                Signature::new(["low", "high", "size"])
                    .with_default("low", 0.0)
                    .with_default("high", 1.0)
                    .with_default("size", Value::None),
            )
            .flags(DefinitionFlags {
                random: true,
                ..Default::default()
            })
            .evaluate(|inv| {
                let bound = |name: &str| {
                    inv.arg(name)?
                        .as_f64()
                        .ok_or_else(|| CallError::argument(name, "not a number"))
                };
                let (low, high) = (bound("low")?, bound("high")?);
                if low >= high {
                    return Err(CallError::argument("high", "must be greater than low"));
                }
                let mut rng = rand::thread_rng();
                match inv.arg_opt("size") {
                    None => Ok(Value::Float(rng.gen_range(low..high))),
                    Some(size) => {
                        let shape = params::usize_list(&size)?;
                        let n = shape.iter().product::<usize>();
                        let data = (0..n)
                            .map(|_| Scalar::Float(rng.gen_range(low..high)))
                            .collect();
                        Ok(Value::Array(NdArray::from_shape_vec(shape, data)?))
                    }
                }
            })
            .translator(WholeValueTranslator)
            .build(),
    );
}
