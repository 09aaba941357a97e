use proptest::prelude::*;

use super::*;
use crate::vm::RuntimeError;

macro_rules! test_op {
    ($name:ident, $op:tt, $l:expr, $r:expr, $res:expr) => {
        #[test]
        fn $name() {
            let l: Value = $l.into();
            let r: Value = $r.into();
            assert_eq!((&l $op &r).expect("operation").repr(), $res);
        }
    };
}

macro_rules! test_op_err {
    ($name:ident, $op:tt, $l:expr, $r:expr, $err:expr) => {
        #[test]
        fn $name() {
            let l: Value = $l.into();
            let r: Value = $r.into();
            let err = (&l $op &r).unwrap_err();
            assert!(err.to_string().contains($err), "{err}");
        }
    };
}

fn list(elems: Vec<i64>) -> Value {
    Value::new_list(elems.into_iter().map(Value::Int).collect())
}

test_op!(add_ints, +, 1i64, 2i64, "3");
test_op!(add_mixed, +, 1i64, 0.5, "1.5");
test_op!(add_strs, +, "ab", "cd", "\"abcd\"");
test_op!(add_lists, +, list(vec![1]), list(vec![2, 3]), "[1, 2, 3]");
test_op!(sub_floats, -, 1.5, 0.25, "1.25");
test_op!(mul_str_repeat, *, "ab", 3i64, "\"ababab\"");
test_op!(mul_negative_repeat, *, list(vec![1]), -2i64, "[]");
test_op!(div_ints_is_float, /, 3i64, 2i64, "1.5");
test_op!(mod_floored, %, -7i64, 3i64, "2");
test_op!(mod_float_sign, %, 7.5, -2i64, "-0.5");
test_op!(percent_format, %, "%d-%s-%r", Value::new_tuple(vec![Value::Int(1), Value::str("a"), Value::str("b")]), "\"1-a-\\\"b\\\"\"");
test_op!(bitand, &, 12i64, 10i64, "8");
test_op!(bitor, |, 12i64, 10i64, "14");
test_op!(shl, <<, 1i64, 62i64, "4611686018427387904");

test_op_err!(add_overflow, +, i64::MAX, 1i64, "integer overflow");
test_op_err!(shl_overflow, <<, 1i64, 64i64, "integer overflow");
test_op_err!(add_str_int, +, "a", 1i64, "unknown binary op: string + int");
test_op_err!(div_by_zero, /, 1i64, 0i64, "floating-point division by zero");
test_op_err!(mod_by_zero, %, 1i64, 0i64, "integer modulo by zero");

#[test]
fn test_floor_div() {
    let cases = [(7, 2, 3), (-7, 2, -4), (7, -2, -4), (-7, -2, 3), (6, 3, 2)];
    for (a, b, want) in cases {
        let got = Value::Int(a).floor_div(&Value::Int(b)).expect("floor_div");
        assert_eq!(got.as_int(), Some(want), "{a} // {b}");
    }
    let err = Value::Int(i64::MIN).floor_div(&Value::Int(-1)).unwrap_err();
    assert_eq!(err.downcast_ref::<RuntimeError>(), Some(&RuntimeError::Overflow));
}

#[test]
fn test_truth() {
    let falsy = [Value::None, Value::Int(0), Value::Float(0.0), Value::str(""), list(vec![]), Value::new_dict()];
    assert!(falsy.iter().all(|v| !v.truth()));
    let truthy = [Value::Bool(true), Value::Int(-1), Value::str("x"), list(vec![0]), Value::new_tuple(vec![Value::None])];
    assert!(truthy.iter().all(Value::truth));
}

#[test]
fn test_comparison() {
    assert!(equals(&Value::Int(1), &Value::Float(1.0)).unwrap());
    assert!(equals(&list(vec![1, 2]), &list(vec![1, 2])).unwrap());
    assert!(!equals(&Value::Int(1), &Value::str("1")).unwrap());
    assert!(compare(CompareOp::Lt, &list(vec![1, 2]), &list(vec![1, 2, 0])).unwrap());
    assert!(compare(CompareOp::Ge, &Value::str("b"), &Value::str("abc")).unwrap());
    let err = compare(CompareOp::Lt, &Value::None, &Value::None).unwrap_err();
    assert!(err.to_string().contains("unsupported comparison: NoneType < NoneType"), "{err}");
    let nan = Value::Float(f64::NAN);
    assert!(!equals(&nan, &nan).unwrap());
}

#[test]
fn test_dict_keys_hash_by_value() {
    let d = Dict::new();
    d.insert(Value::Int(1), Value::str("int")).unwrap();
    d.insert(Value::new_tuple(vec![Value::str("a"), Value::Int(2)]), Value::str("tuple")).unwrap();
    assert_eq!(d.get(&Value::Float(1.0)).unwrap().map(|v| v.repr()), Some("\"int\"".to_string()));
    assert!(
        d.contains_key(&Value::new_tuple(vec![Value::str("a"), Value::Int(2)]))
            .unwrap()
    );
    let err = d.insert(list(vec![]), Value::None).unwrap_err();
    assert_eq!(err.downcast_ref::<RuntimeError>(), Some(&RuntimeError::Unhashable("list")));
}

#[test]
fn test_frozen_containers_reject_mutation() {
    let inner = list(vec![1]);
    let outer = Value::new_list(vec![inner.clone()]);
    let dict = Value::new_dict();
    dict.set_index(&Value::str("k"), outer.clone()).unwrap();
    dict.freeze();

    let Value::List(inner_list) = &inner else { unreachable!() };
    let err = inner_list.append(Value::Int(2)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::Frozen {
            verb: "append to",
            type_name: "list",
        })
    );
    let err = dict.set_index(&Value::str("k"), Value::None).unwrap_err();
    assert!(err.to_string().contains("frozen dict"), "{err}");
    // Reads still work.
    assert_eq!(dict.index(&Value::str("k")).unwrap().repr(), "[[1]]");
}

#[test]
fn test_indexing_and_slicing() {
    let s = Value::str("héllo");
    assert_eq!(s.index(&Value::Int(1)).unwrap().repr(), "\"é\"");
    assert_eq!(s.index(&Value::Int(-1)).unwrap().repr(), "\"o\"");
    let xs = list(vec![0, 1, 2, 3, 4]);
    let slice = xs.slice(&Value::Int(1), &Value::None, &Value::Int(2)).unwrap();
    assert_eq!(slice.repr(), "[1, 3]");
    let slice = xs.slice(&Value::None, &Value::None, &Value::Int(-1)).unwrap();
    assert_eq!(slice.repr(), "[4, 3, 2, 1, 0]");
    let err = xs.index(&Value::Int(5)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<RuntimeError>(),
        Some(&RuntimeError::IndexOutOfRange { index: 5, len: 5 })
    );
    assert!(err.to_string().contains("index 5 out of range [-5:4]"), "{err}");
    assert!(xs.slice(&Value::None, &Value::None, &Value::Int(0)).is_err());
}

#[test]
fn test_repr() {
    assert_eq!(Value::str("a\"b\n").repr(), r#""a\"b\n""#);
    assert_eq!(Value::new_tuple(vec![Value::Int(1)]).repr(), "(1,)");
    assert_eq!(Value::Float(1e20).repr(), "1e+20");
    assert_eq!(Value::Float(0.1).repr(), "0.1");
    assert_eq!(Value::str("s").to_string(), "s");

    let Value::List(l) = list(vec![1]) else { unreachable!() };
    let cyclic = Value::List(l.clone());
    l.append(cyclic.clone()).unwrap();
    assert_eq!(cyclic.repr(), "[1, [...]]");
}

#[test]
fn test_range() {
    let r = Range {
        start: 10,
        stop: 0,
        step: -3,
    };
    assert_eq!(r.len(), 4);
    assert_eq!(r.at(3), 1);
    assert!(r.contains(4));
    assert!(!r.contains(5));
    assert!(!r.contains(0));
}

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z]{0,4}".prop_map(Value::from),
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::new_list),
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::new_tuple),
            prop::collection::vec(("[a-z]{1,3}", inner), 0..4).prop_map(|entries| {
                let dict = Dict::new();
                for (k, v) in entries {
                    dict.insert(Value::from(k), v).expect("string keys hash");
                }
                Value::Dict(Arc::new(dict))
            }),
        ]
    })
}

fn all_frozen(v: &Value) -> bool {
    match v {
        Value::List(l) => l.is_frozen() && l.to_vec().iter().all(all_frozen),
        Value::Tuple(t) => t.iter().all(all_frozen),
        Value::Dict(d) => d.is_frozen() && d.items().iter().all(|(_, v)| all_frozen(v)),
        _ => true,
    }
}

proptest! {
    #[test]
    fn freeze_is_deep_and_idempotent(v in value_strategy()) {
        let before = v.repr();
        v.freeze();
        prop_assert!(all_frozen(&v));
        v.freeze();
        prop_assert_eq!(v.repr(), before);
    }

    #[test]
    fn equality_is_reflexive(v in value_strategy()) {
        prop_assert!(equals(&v, &v).expect("comparable"));
    }
}
