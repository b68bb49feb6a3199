//! Reference vectors for the `std.checksum` members, driven through the
//! standard-function binding surface and through member calls on hasher
//! objects.

use asteria_runtime::{
    solidify, AirNode, AirStatus, ContextFlavor, ExecutiveContext, FunctionValue, GlobalContext,
    Reference, SourceLocation, Value, Xop,
};

fn fixture() -> GlobalContext {
    let mut global = GlobalContext::new();
    asteria_library::create_bindings(&mut global).unwrap();
    global
}

fn checksum_fn(global: &GlobalContext, name: &str) -> FunctionValue {
    let checksum = global.get_std_member("checksum").unwrap();
    let object = checksum.as_object().expect("std.checksum is an object");
    object
        .get(name)
        .and_then(Value::as_function)
        .unwrap_or_else(|| panic!("std.checksum.{name} is missing"))
        .clone()
}

fn call_one_shot(global: &mut GlobalContext, name: &str, data: &str) -> Value {
    let function = checksum_fn(global, name);
    let mut self_ref = Reference::null();
    let args = vec![Reference::temporary(Value::from(data))];
    function.invoke(&mut self_ref, global, args).unwrap();
    self_ref.read().unwrap()
}

#[test]
fn crc32_vectors() {
    let mut global = fixture();
    assert_eq!(call_one_shot(&mut global, "crc32", ""), Value::Integer(0x0));
    assert_eq!(
        call_one_shot(&mut global, "crc32", "abc"),
        Value::Integer(0x352441C2)
    );
}

#[test]
fn fnv1a32_vectors() {
    let mut global = fixture();
    assert_eq!(
        call_one_shot(&mut global, "fnv1a32", ""),
        Value::Integer(0x811C9DC5)
    );
    assert_eq!(
        call_one_shot(&mut global, "fnv1a32", "abc"),
        Value::Integer(0x1A47E90B)
    );
}

#[test]
fn md5_vectors() {
    let mut global = fixture();
    assert_eq!(
        call_one_shot(&mut global, "md5", ""),
        Value::from("D41D8CD98F00B204E9800998ECF8427E")
    );
    assert_eq!(
        call_one_shot(&mut global, "md5", "abc"),
        Value::from("900150983CD24FB0D6963F7D28E17F72")
    );
}

#[test]
fn sha1_vectors() {
    let mut global = fixture();
    assert_eq!(
        call_one_shot(&mut global, "sha1", ""),
        Value::from("DA39A3EE5E6B4B0D3255BFEF95601890AFD80709")
    );
    assert_eq!(
        call_one_shot(&mut global, "sha1", "abc"),
        Value::from("A9993E364706816ABA3E25717850C26C9CD0D89D")
    );
}

#[test]
fn sha256_vectors() {
    let mut global = fixture();
    assert_eq!(
        call_one_shot(&mut global, "sha256", ""),
        Value::from("E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855")
    );
    assert_eq!(
        call_one_shot(&mut global, "sha256", "abc"),
        Value::from("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD")
    );
}

#[test]
fn wrong_argument_kinds_are_rejected() {
    let mut global = fixture();
    let function = checksum_fn(&global, "sha256");
    let mut self_ref = Reference::null();
    let error = function
        .invoke(
            &mut self_ref,
            &mut global,
            vec![Reference::temporary(Value::Integer(5))],
        )
        .unwrap_err();
    assert!(error
        .value()
        .to_string()
        .contains("no matching function call"));
}

fn sloc(line: u32) -> SourceLocation {
    SourceLocation::new("test", line)
}

/// Drive a hasher object through member calls, which exercises the self
/// binding of `o.f(...)` call sites end to end.
#[test]
fn incremental_hashing_through_member_calls() {
    let mut global = fixture();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);

    // var h = std.checksum.crc32_new();
    let new_fn = checksum_fn(&global, "crc32_new");
    let mut self_ref = Reference::null();
    new_fn.invoke(&mut self_ref, &mut global, vec![]).unwrap();
    let hasher_object = self_ref.read().unwrap();

    let var = global.create_variable();
    var.initialize(hasher_object, false);
    ctx.insert_named("h", Reference::variable(var));

    let member_call = |method: &str, args: Vec<Value>| -> Vec<AirNode> {
        let mut code = vec![
            AirNode::PushNamedReference {
                name: "h".to_string(),
            },
            AirNode::PushConstant {
                value: Value::from(method),
            },
            AirNode::ApplyOperator {
                xop: Xop::Subscript,
            },
        ];
        let nargs = args.len() as u32;
        for arg in args {
            code.push(AirNode::PushConstant { value: arg });
        }
        code.push(AirNode::FunctionCall {
            nargs,
            ptc: None,
            sloc: sloc(1),
        });
        code
    };

    // h.update("ab"); h.update("c"); h.finish() == crc32("abc")
    let status = solidify(&member_call("update", vec![Value::from("ab")]))
        .execute(&mut ctx, &mut global)
        .unwrap();
    assert_eq!(status, AirStatus::Next);
    ctx.clear_stack();

    solidify(&member_call("update", vec![Value::from("c")]))
        .execute(&mut ctx, &mut global)
        .unwrap();
    ctx.clear_stack();

    solidify(&member_call("finish", vec![]))
        .execute(&mut ctx, &mut global)
        .unwrap();
    let digest = ctx.pop_reference().unwrap().read().unwrap();
    assert_eq!(digest, Value::Integer(0x352441C2));

    // The hasher reset on finish; an immediate second finish is the empty
    // digest.
    solidify(&member_call("finish", vec![]))
        .execute(&mut ctx, &mut global)
        .unwrap();
    let digest = ctx.pop_reference().unwrap().read().unwrap();
    assert_eq!(digest, Value::Integer(0x0));
}

#[test]
fn sha256_hasher_object_matches_one_shot() {
    let mut global = fixture();

    let new_fn = checksum_fn(&global, "sha256_new");
    let mut self_ref = Reference::null();
    new_fn.invoke(&mut self_ref, &mut global, vec![]).unwrap();
    let hasher_object = self_ref.read().unwrap();

    let var = global.create_variable();
    var.initialize(hasher_object, false);
    let holder = Reference::variable(var);

    // Call update/finish directly through the binding convention: self is
    // the object holder.
    let call_member = |global: &mut GlobalContext, member: &str, args: Vec<Value>| -> Value {
        let mut target = holder.clone();
        target.zoom_in(asteria_runtime::Modifier::ObjectKey(member.to_string()));
        let function = target.read().unwrap().as_function().unwrap().clone();
        let mut self_ref = holder.clone();
        let refs = args.into_iter().map(Reference::temporary).collect();
        function.invoke(&mut self_ref, global, refs).unwrap();
        self_ref.read().unwrap()
    };

    call_member(&mut global, "update", vec![Value::from("a")]);
    call_member(&mut global, "update", vec![Value::from("bc")]);
    let digest = call_member(&mut global, "finish", vec![]);
    assert_eq!(
        digest,
        Value::from("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD")
    );
}
