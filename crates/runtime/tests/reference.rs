//! Reference mechanics: constants, temporaries, materialization, zooming
//! through arrays and objects, negative-index materialization and unset.

use asteria_runtime::{GlobalContext, Modifier, Reference, RuntimeError, Value, Vtype};

#[test]
fn constants_read_but_never_write() {
    let refr = Reference::constant(Value::from("meow"));
    let value = refr.read().unwrap();
    assert_eq!(value.vtype(), Vtype::Str);
    assert_eq!(value, Value::from("meow"));
    assert_eq!(refr.write(Value::Boolean(true)), Err(RuntimeError::WriteToConstant));

    let copy = refr.clone();
    assert_eq!(copy.read().unwrap(), Value::from("meow"));
    assert_eq!(copy.write(Value::Boolean(true)), Err(RuntimeError::WriteToConstant));
}

#[test]
fn temporaries_require_materialization_before_writing() {
    let mut global = GlobalContext::new();

    let mut refr = Reference::temporary(Value::Integer(42));
    assert_eq!(refr.read().unwrap(), Value::Integer(42));
    assert_eq!(refr.write(Value::Boolean(true)), Err(RuntimeError::WriteToTemporary));

    refr.materialize(&mut global).unwrap();
    assert_eq!(refr.read().unwrap(), Value::Integer(42));
    refr.write(Value::Boolean(true)).unwrap();
    assert_eq!(refr.read().unwrap(), Value::Boolean(true));
}

#[test]
fn negative_index_extends_at_the_front() {
    let mut global = GlobalContext::new();

    let mut refr = Reference::temporary(Value::Null);
    refr.materialize(&mut global).unwrap();

    refr.zoom_in(Modifier::ArrayIndex(-3));
    assert_eq!(refr.read().unwrap(), Value::Null);
    refr.write(Value::Integer(36)).unwrap();
    refr.zoom_out();

    refr.zoom_in(Modifier::ArrayIndex(0));
    assert_eq!(refr.read().unwrap(), Value::Integer(36));
    refr.zoom_out();

    // Index 2 exists (it was created by the extension), so zooming into a
    // member of it materializes an object there.
    refr.zoom_in(Modifier::ArrayIndex(2));
    refr.zoom_in(Modifier::ObjectKey("my_key".to_string()));
    assert_eq!(refr.read().unwrap(), Value::Null);
    refr.write(Value::Real(10.5)).unwrap();
    assert_eq!(refr.read().unwrap(), Value::Real(10.5));
    refr.zoom_out();
    refr.zoom_out();

    // The same element is reachable from the tail.
    refr.zoom_in(Modifier::ArrayIndex(-1));
    refr.zoom_in(Modifier::ObjectKey("my_key".to_string()));
    assert_eq!(refr.read().unwrap(), Value::Real(10.5));

    // Zooming into a member of a real is a type error.
    refr.zoom_in(Modifier::ObjectKey("invalid_access".to_string()));
    assert!(matches!(
        refr.read(),
        Err(RuntimeError::TypeMismatch { .. })
    ));
    refr.zoom_out();

    // Unset returns the previous value once, then null.
    assert_eq!(refr.unset().unwrap(), Value::Real(10.5));
    assert_eq!(refr.read().unwrap(), Value::Null);
    assert_eq!(refr.unset().unwrap(), Value::Null);
}

#[test]
fn reads_through_missing_elements_yield_null() {
    let refr = {
        let mut r = Reference::constant(Value::object_from_pairs([(
            "list",
            Value::array(vec![Value::Integer(5)]),
        )]));
        r.zoom_in(Modifier::ObjectKey("list".to_string()));
        r.zoom_in(Modifier::ArrayIndex(7));
        r
    };
    assert_eq!(refr.read().unwrap(), Value::Null);

    let mut through_null = Reference::constant(Value::Null);
    through_null.zoom_in(Modifier::ObjectKey("anything".to_string()));
    through_null.zoom_in(Modifier::ArrayIndex(0));
    assert_eq!(through_null.read().unwrap(), Value::Null);
}

#[test]
fn head_and_tail_modifiers() {
    let mut global = GlobalContext::new();

    let mut refr = Reference::temporary(Value::array(vec![
        Value::Integer(1),
        Value::Integer(2),
    ]));
    refr.materialize(&mut global).unwrap();

    refr.zoom_in(Modifier::ArrayHead);
    assert_eq!(refr.read().unwrap(), Value::Integer(1));
    refr.zoom_out();
    refr.zoom_in(Modifier::ArrayTail);
    assert_eq!(refr.read().unwrap(), Value::Integer(2));

    // Writing through the tail marker appends.
    refr.write(Value::Integer(3)).unwrap();
    refr.zoom_out();
    assert_eq!(
        refr.read().unwrap(),
        Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    );

    // Unsetting the head pops the front.
    refr.zoom_in(Modifier::ArrayHead);
    assert_eq!(refr.unset().unwrap(), Value::Integer(1));
    refr.zoom_out();
    assert_eq!(
        refr.read().unwrap(),
        Value::array(vec![Value::Integer(2), Value::Integer(3)])
    );
}

#[test]
fn uninitialized_variables_trap_on_read() {
    let mut global = GlobalContext::new();
    let var = global.create_variable();
    let refr = Reference::variable(var);
    assert_eq!(refr.read(), Err(RuntimeError::UninitializedRead));
    // A write initializes.
    refr.write(Value::Integer(9)).unwrap();
    assert_eq!(refr.read().unwrap(), Value::Integer(9));
}

#[test]
fn unset_without_a_modifier_is_rejected() {
    let mut global = GlobalContext::new();
    let mut refr = Reference::temporary(Value::Integer(1));
    refr.materialize(&mut global).unwrap();
    assert_eq!(refr.unset(), Err(RuntimeError::UnsetNotAllowed));
}
