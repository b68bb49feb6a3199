#![allow(dead_code)]

//! Shared helpers for building and running AIR programs in tests.

use asteria_runtime::{
    solidify, AirNode, AirStatus, Exception, ExecutiveContext, GlobalContext, PtcAware,
    SourceLocation, Value, Xop,
};

pub fn sloc(line: u32) -> SourceLocation {
    SourceLocation::new("test", line)
}

pub fn konst(value: Value) -> AirNode {
    AirNode::PushConstant { value }
}

pub fn named(name: &str) -> AirNode {
    AirNode::PushNamedReference {
        name: name.to_string(),
    }
}

pub fn op(xop: Xop) -> AirNode {
    AirNode::ApplyOperator { xop }
}

pub fn declare(name: &str) -> AirNode {
    AirNode::DeclareVariable {
        name: name.to_string(),
    }
}

pub fn init(immutable: bool) -> AirNode {
    AirNode::InitializeVariable { immutable }
}

pub fn clear() -> AirNode {
    AirNode::ClearStack
}

pub fn call(nargs: u32, line: u32) -> AirNode {
    AirNode::FunctionCall {
        nargs,
        ptc: None,
        sloc: sloc(line),
    }
}

pub fn tail_call(nargs: u32, line: u32) -> AirNode {
    AirNode::FunctionCall {
        nargs,
        ptc: Some(PtcAware::ByValue),
        sloc: sloc(line),
    }
}

/// `var <name> = <value>;`
pub fn var_decl(name: &str, value: Value) -> Vec<AirNode> {
    vec![declare(name), konst(value), init(false), clear()]
}

/// `const <name> = <value>;`
pub fn const_decl(name: &str, value: Value) -> Vec<AirNode> {
    vec![declare(name), konst(value), init(true), clear()]
}

/// Run a statement list; every status other than `Next` is a test bug.
pub fn run(ctx: &mut ExecutiveContext<'_>, global: &mut GlobalContext, code: &[AirNode]) {
    let status = solidify(code)
        .execute(ctx, global)
        .unwrap_or_else(|e| panic!("program failed: {e}"));
    assert_eq!(status, AirStatus::Next);
}

pub fn run_result(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    code: &[AirNode],
) -> Result<AirStatus, Exception> {
    solidify(code).execute(ctx, global)
}

/// Evaluate an expression and read its result off the evaluation stack.
pub fn eval(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    code: &[AirNode],
) -> Value {
    run(ctx, global, code);
    let value = ctx
        .pop_reference()
        .expect("expression left no result")
        .read()
        .unwrap_or_else(|e| panic!("result not readable: {e}"));
    ctx.clear_stack();
    value
}

/// Evaluate an expression that must fail.
pub fn eval_err(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    code: &[AirNode],
) -> Exception {
    let result = run_result(ctx, global, code);
    ctx.clear_stack();
    match result {
        Err(error) => error,
        Ok(_) => panic!("expression succeeded unexpectedly"),
    }
}

/// Read a named binding's current value.
pub fn read_named(ctx: &ExecutiveContext<'_>, name: &str) -> Value {
    ctx.get_named(name)
        .unwrap_or_else(|| panic!("unbound name {name}"))
        .read()
        .unwrap_or_else(|e| panic!("{name} not readable: {e}"))
}
