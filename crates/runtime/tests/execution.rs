//! Queue-level execution semantics: declarations, increments, subscripts,
//! unset, value-preserving short-circuit lowering, loops, switch,
//! try/catch, assertions and the errors a program can trap.

mod common;

use asteria_runtime::{
    AirNode, AirStatus, ContextFlavor, ErrorClass, ExecutiveContext, GlobalContext, Value, Xop,
};
use common::*;

fn fixture<'a>(global: &mut GlobalContext) -> ExecutiveContext<'a> {
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, global, &var_decl("b", Value::Boolean(false)));
    run(&mut ctx, global, &var_decl("i", Value::Integer(12)));
    run(&mut ctx, global, &var_decl("r", Value::Real(8.5)));
    run(&mut ctx, global, &var_decl("s", Value::from("a")));
    run(
        &mut ctx,
        global,
        &var_decl(
            "a",
            Value::array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ]),
        ),
    );
    run(
        &mut ctx,
        global,
        &var_decl(
            "o",
            Value::object_from_pairs([
                ("one", Value::Integer(1)),
                ("two", Value::Integer(2)),
                ("three", Value::Integer(3)),
            ]),
        ),
    );
    ctx
}

#[test]
fn increment_and_decrement() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    assert_eq!(eval(&mut ctx, &mut global, &[named("i"), op(Xop::IncPre)]), Value::Integer(13));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(13));
    assert_eq!(eval(&mut ctx, &mut global, &[named("r"), op(Xop::IncPre)]), Value::Real(9.5));
    assert_eq!(read_named(&ctx, "r"), Value::Real(9.5));

    assert_eq!(eval(&mut ctx, &mut global, &[named("i"), op(Xop::DecPre)]), Value::Integer(12));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(12));
    assert_eq!(eval(&mut ctx, &mut global, &[named("r"), op(Xop::DecPre)]), Value::Real(8.5));
    assert_eq!(read_named(&ctx, "r"), Value::Real(8.5));

    assert_eq!(eval(&mut ctx, &mut global, &[named("i"), op(Xop::IncPost)]), Value::Integer(12));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(13));
    assert_eq!(eval(&mut ctx, &mut global, &[named("r"), op(Xop::IncPost)]), Value::Real(8.5));
    assert_eq!(read_named(&ctx, "r"), Value::Real(9.5));

    assert_eq!(eval(&mut ctx, &mut global, &[named("i"), op(Xop::DecPost)]), Value::Integer(13));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(12));
    assert_eq!(eval(&mut ctx, &mut global, &[named("r"), op(Xop::DecPost)]), Value::Real(9.5));
    assert_eq!(read_named(&ctx, "r"), Value::Real(8.5));
}

#[test]
fn subscript_reads() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    let index = |ctx: &mut ExecutiveContext<'_>, global: &mut GlobalContext, i: i64| {
        eval(
            ctx,
            global,
            &[named("a"), konst(Value::Integer(i)), op(Xop::Subscript)],
        )
    };
    assert_eq!(index(&mut ctx, &mut global, 0), Value::Integer(1));
    assert_eq!(index(&mut ctx, &mut global, 1), Value::Integer(2));
    assert_eq!(index(&mut ctx, &mut global, 2), Value::Integer(3));
    assert_eq!(index(&mut ctx, &mut global, 3), Value::Null);
    assert_eq!(index(&mut ctx, &mut global, -1), Value::Integer(3));
    assert_eq!(index(&mut ctx, &mut global, -2), Value::Integer(2));
    assert_eq!(index(&mut ctx, &mut global, -3), Value::Integer(1));
    assert_eq!(index(&mut ctx, &mut global, -4), Value::Null);

    let member = |ctx: &mut ExecutiveContext<'_>, global: &mut GlobalContext, k: &str| {
        eval(
            ctx,
            global,
            &[named("o"), konst(Value::from(k)), op(Xop::Subscript)],
        )
    };
    assert_eq!(member(&mut ctx, &mut global, "one"), Value::Integer(1));
    assert_eq!(member(&mut ctx, &mut global, "two"), Value::Integer(2));
    assert_eq!(member(&mut ctx, &mut global, "three"), Value::Integer(3));
    assert_eq!(member(&mut ctx, &mut global, "nonexistent"), Value::Null);
}

#[test]
fn unset_removes_elements_and_members() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    let previous = eval(
        &mut ctx,
        &mut global,
        &[named("a"), konst(Value::Integer(1)), op(Xop::Subscript), op(Xop::Unset)],
    );
    assert_eq!(previous, Value::Integer(2));
    assert_eq!(
        read_named(&ctx, "a"),
        Value::array(vec![Value::Integer(1), Value::Integer(3)])
    );

    let previous = eval(
        &mut ctx,
        &mut global,
        &[named("a"), konst(Value::Integer(10000)), op(Xop::Subscript), op(Xop::Unset)],
    );
    assert_eq!(previous, Value::Null);

    let previous = eval(
        &mut ctx,
        &mut global,
        &[named("o"), konst(Value::from("one")), op(Xop::Subscript), op(Xop::Unset)],
    );
    assert_eq!(previous, Value::Integer(1));
    assert_eq!(
        eval(&mut ctx, &mut global, &[named("o"), konst(Value::from("one")), op(Xop::Subscript)]),
        Value::Null
    );

    let previous = eval(
        &mut ctx,
        &mut global,
        &[named("o"), konst(Value::from("nonexistent")), op(Xop::Subscript), op(Xop::Unset)],
    );
    assert_eq!(previous, Value::Null);
}

#[test]
fn short_circuit_preserves_operand_values() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    // (1 && ++i) evaluates the right side and yields it.
    let and_branch = |lhs: i64| {
        vec![
            konst(Value::Integer(lhs)),
            AirNode::Branch {
                negative: false,
                true_branch: vec![named("i"), op(Xop::IncPre)],
                false_branch: vec![],
            },
        ]
    };
    assert_eq!(eval(&mut ctx, &mut global, &and_branch(1)), Value::Integer(13));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(13));
    assert_eq!(eval(&mut ctx, &mut global, &and_branch(0)), Value::Integer(0));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(13));

    // (x || --i) keeps a truthy left side untouched.
    let or_branch = |lhs: i64| {
        vec![
            konst(Value::Integer(lhs)),
            AirNode::Branch {
                negative: true,
                true_branch: vec![named("i"), op(Xop::DecPre)],
                false_branch: vec![],
            },
        ]
    };
    assert_eq!(eval(&mut ctx, &mut global, &or_branch(1)), Value::Integer(1));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(13));
    assert_eq!(eval(&mut ctx, &mut global, &or_branch(0)), Value::Integer(12));
    assert_eq!(read_named(&ctx, "i"), Value::Integer(12));
}

#[test]
fn null_coalescing() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    let code = vec![
        named("i"),
        AirNode::CoalesceNull {
            null_branch: vec![konst(Value::from("abc"))],
        },
    ];
    assert_eq!(eval(&mut ctx, &mut global, &code), Value::Integer(12));

    let code = vec![
        konst(Value::Null),
        AirNode::CoalesceNull {
            null_branch: vec![konst(Value::from("abc"))],
        },
    ];
    assert_eq!(eval(&mut ctx, &mut global, &code), Value::from("abc"));

    // null ?? null ?? 1 ?? null ?? 2 == 1
    let chain = vec![
        konst(Value::Null),
        AirNode::CoalesceNull { null_branch: vec![konst(Value::Null)] },
        AirNode::CoalesceNull { null_branch: vec![konst(Value::Integer(1))] },
        AirNode::CoalesceNull { null_branch: vec![konst(Value::Null)] },
        AirNode::CoalesceNull { null_branch: vec![konst(Value::Integer(2))] },
    ];
    assert_eq!(eval(&mut ctx, &mut global, &chain), Value::Integer(1));
}

#[test]
fn assignment_writes_through_subscripts() {
    let mut global = GlobalContext::new();
    let mut ctx = fixture(&mut global);

    run(
        &mut ctx,
        &mut global,
        &[
            named("a"),
            konst(Value::Integer(1)),
            op(Xop::Subscript),
            konst(Value::from("two")),
            op(Xop::Assign),
            clear(),
        ],
    );
    assert_eq!(
        read_named(&ctx, "a"),
        Value::array(vec![Value::Integer(1), Value::from("two"), Value::Integer(3)])
    );

    // Missing members materialize on write.
    run(
        &mut ctx,
        &mut global,
        &[
            named("o"),
            konst(Value::from("four")),
            op(Xop::Subscript),
            konst(Value::Integer(4)),
            op(Xop::Assign),
            clear(),
        ],
    );
    assert_eq!(
        eval(&mut ctx, &mut global, &[named("o"), konst(Value::from("four")), op(Xop::Subscript)]),
        Value::Integer(4)
    );
}

#[test]
fn while_loop_with_break_and_continue() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, &mut global, &var_decl("n", Value::Integer(0)));
    run(&mut ctx, &mut global, &var_decl("sum", Value::Integer(0)));

    // while (n < 10) { ++n; if (n == 3) continue; if (n > 5) break;
    //                  sum = sum + n; }
    let program = vec![AirNode::WhileLoop {
        negative: false,
        cond: vec![named("n"), konst(Value::Integer(10)), op(Xop::CmpLt)],
        body: vec![
            named("n"),
            op(Xop::IncPre),
            clear(),
            named("n"),
            konst(Value::Integer(3)),
            op(Xop::CmpEq),
            AirNode::Branch {
                negative: false,
                true_branch: vec![AirNode::BreakOrContinue {
                    status: AirStatus::ContinueWhile,
                }],
                false_branch: vec![konst(Value::Null)],
            },
            clear(),
            named("n"),
            konst(Value::Integer(5)),
            op(Xop::CmpGt),
            AirNode::Branch {
                negative: false,
                true_branch: vec![AirNode::BreakOrContinue {
                    status: AirStatus::BreakWhile,
                }],
                false_branch: vec![konst(Value::Null)],
            },
            clear(),
            named("sum"),
            named("sum"),
            named("n"),
            op(Xop::Add),
            op(Xop::Assign),
            clear(),
        ],
    }];
    run(&mut ctx, &mut global, &program);
    // 1 + 2 + 4 + 5, with 3 skipped and 6 breaking out.
    assert_eq!(read_named(&ctx, "sum"), Value::Integer(12));
    assert_eq!(read_named(&ctx, "n"), Value::Integer(6));
}

#[test]
fn for_loop_counts() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, &mut global, &var_decl("total", Value::Integer(0)));

    let program = vec![AirNode::ForLoop {
        init: vec![declare("k"), konst(Value::Integer(0)), init(false), clear()],
        cond: vec![named("k"), konst(Value::Integer(5)), op(Xop::CmpLt)],
        step: vec![named("k"), op(Xop::IncPre), clear()],
        body: vec![
            named("total"),
            named("total"),
            named("k"),
            op(Xop::Add),
            op(Xop::Assign),
            clear(),
        ],
    }];
    run(&mut ctx, &mut global, &program);
    assert_eq!(read_named(&ctx, "total"), Value::Integer(10));
    // The induction variable was scoped to the loop.
    assert!(ctx.get_named("k").is_none());
}

#[test]
fn switch_matches_and_falls_through() {
    let mut global = GlobalContext::new();

    let run_switch = |global: &mut GlobalContext, subject: i64| -> Value {
        let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
        run(&mut ctx, global, &var_decl("out", Value::from("")));
        let program = vec![
            named("subject_holder"),
            AirNode::Switch {
                clauses: vec![
                    asteria_runtime::SwitchClause {
                        guard: Some(vec![konst(Value::Integer(1))]),
                        body: vec![
                            named("out"),
                            named("out"),
                            konst(Value::from("one,")),
                            op(Xop::Add),
                            op(Xop::Assign),
                            clear(),
                        ],
                    },
                    asteria_runtime::SwitchClause {
                        guard: Some(vec![konst(Value::Integer(2))]),
                        body: vec![
                            named("out"),
                            named("out"),
                            konst(Value::from("two,")),
                            op(Xop::Add),
                            op(Xop::Assign),
                            clear(),
                            AirNode::BreakOrContinue {
                                status: AirStatus::BreakSwitch,
                            },
                        ],
                    },
                    asteria_runtime::SwitchClause {
                        guard: None,
                        body: vec![
                            named("out"),
                            named("out"),
                            konst(Value::from("default")),
                            op(Xop::Add),
                            op(Xop::Assign),
                            clear(),
                        ],
                    },
                ],
            },
        ];
        run(&mut ctx, global, &var_decl("subject_holder", Value::Integer(subject)));
        run(&mut ctx, global, &program);
        read_named(&ctx, "out")
    };

    // Case 1 falls through into case 2, which breaks.
    assert_eq!(run_switch(&mut global, 1), Value::from("one,two,"));
    assert_eq!(run_switch(&mut global, 2), Value::from("two,"));
    // No match selects the default clause (and falls off the end).
    assert_eq!(run_switch(&mut global, 9), Value::from("default"));
}

#[test]
fn try_catch_recovers_runtime_errors() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, &mut global, &var_decl("msg", Value::Null));

    let program = vec![AirNode::TryCatch {
        try_body: vec![
            konst(Value::Integer(1)),
            konst(Value::Integer(0)),
            op(Xop::Div),
            clear(),
        ],
        catch_body: vec![named("msg"), named("e"), op(Xop::Assign), clear()],
        exc_name: "e".to_string(),
        sloc: sloc(10),
    }];
    run(&mut ctx, &mut global, &program);
    assert_eq!(read_named(&ctx, "msg"), Value::from("division by zero"));
}

#[test]
fn assertions() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);

    run(
        &mut ctx,
        &mut global,
        &[
            konst(Value::Integer(1)),
            AirNode::AssertStatement {
                negative: false,
                msg: "one is truthy".to_string(),
                sloc: sloc(1),
            },
        ],
    );

    let error = eval_err(
        &mut ctx,
        &mut global,
        &[
            konst(Value::Integer(0)),
            AirNode::AssertStatement {
                negative: false,
                msg: "zero is falsy".to_string(),
                sloc: sloc(2),
            },
        ],
    );
    assert_eq!(error.class(), ErrorClass::Runtime);
    assert!(error.value().to_string().contains("zero is falsy"));
    assert_eq!(
        error.frames().first().map(|f| f.kind()),
        Some(asteria_runtime::FrameKind::Assert)
    );
}

#[test]
fn const_bindings_reject_writes() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, &mut global, &const_decl("c", Value::Integer(1)));

    let error = eval_err(
        &mut ctx,
        &mut global,
        &[named("c"), konst(Value::Integer(2)), op(Xop::Assign)],
    );
    assert_eq!(error.class(), ErrorClass::Type);
}

#[test]
fn unbound_names_are_type_errors() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    let error = eval_err(&mut ctx, &mut global, &[named("nowhere")]);
    assert_eq!(error.class(), ErrorClass::Type);
    assert!(error.value().to_string().contains("nowhere"));
}

#[test]
fn blocks_scope_their_declarations() {
    let mut global = GlobalContext::new();
    let mut ctx = ExecutiveContext::new_root(ContextFlavor::Plain);
    run(&mut ctx, &mut global, &var_decl("outer", Value::Integer(1)));

    let program = vec![AirNode::ExecuteBlock {
        body: vec![
            declare("inner"),
            konst(Value::Integer(2)),
            init(false),
            clear(),
            named("outer"),
            konst(Value::Integer(3)),
            op(Xop::Assign),
            clear(),
        ],
    }];
    run(&mut ctx, &mut global, &program);
    assert_eq!(read_named(&ctx, "outer"), Value::Integer(3));
    assert!(ctx.get_named("inner").is_none());
}
