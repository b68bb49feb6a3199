//! The AIR node set: the lowered instruction vocabulary that queues are
//! solidified from, together with the executors that give each node its
//! meaning.
//!
//! Programs are built as `AirNode` trees (the shape a lowering pass or an
//! embedder produces) and solidified into an `AvmcQueue` with `reload`,
//! which runs the queue's two-phase request/append protocol. Executors
//! communicate through the context's evaluation stack: operand references
//! are pushed left to right and consumed right to left.

use std::rc::Rc;

use crate::avmc::{params_as, AirStatus, AvmcParams, AvmcQueue, ParamU};
use crate::context::{ContextFlavor, DeferredExpression, ExecutiveContext};
use crate::error::{ErrorClass, Exception, FrameKind, RuntimeError};
use crate::function::{FunctionValue, InstantiatedFunction, PtcArguments, PtcAware};
use crate::global::GlobalContext;
use crate::operators;
use crate::reference::{Modifier, Reference};
use crate::source::SourceLocation;
use crate::value::{Compare, Value};
use crate::variable::VariableEnumerator;

/// Stack-discipline operators. Prefix and postfix increment forms are
/// distinct because their results differ (lvalue vs. previous value).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Xop {
    IncPre,
    DecPre,
    IncPost,
    DecPost,
    Pos,
    Neg,
    NotB,
    NotL,
    Unset,
    Subscript,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Sla,
    Sra,
    Sll,
    Srl,
    AndB,
    OrB,
    XorB,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
    CmpLte,
    CmpGte,
    Cmp3Way,
    Assign,
}

const XOP_TABLE: &[Xop] = &[
    Xop::IncPre,
    Xop::DecPre,
    Xop::IncPost,
    Xop::DecPost,
    Xop::Pos,
    Xop::Neg,
    Xop::NotB,
    Xop::NotL,
    Xop::Unset,
    Xop::Subscript,
    Xop::Add,
    Xop::Sub,
    Xop::Mul,
    Xop::Div,
    Xop::Mod,
    Xop::Sla,
    Xop::Sra,
    Xop::Sll,
    Xop::Srl,
    Xop::AndB,
    Xop::OrB,
    Xop::XorB,
    Xop::CmpEq,
    Xop::CmpNe,
    Xop::CmpLt,
    Xop::CmpGt,
    Xop::CmpLte,
    Xop::CmpGte,
    Xop::Cmp3Way,
    Xop::Assign,
];

impl Xop {
    fn decode(code: u16) -> Xop {
        XOP_TABLE[code as usize]
    }
}

/// One clause of a `Switch` node; a `None` guard is the `default` clause.
pub struct SwitchClause {
    pub guard: Option<Vec<AirNode>>,
    pub body: Vec<AirNode>,
}

/// A lowered program node.
pub enum AirNode {
    /// Statement boundary: discard the evaluation stack.
    ClearStack,
    PushConstant {
        value: Value,
    },
    PushBoundReference {
        reference: Reference,
    },
    PushNamedReference {
        name: String,
    },
    DeclareVariable {
        name: String,
    },
    InitializeVariable {
        immutable: bool,
    },
    ApplyOperator {
        xop: Xop,
    },
    Branch {
        negative: bool,
        true_branch: Vec<AirNode>,
        false_branch: Vec<AirNode>,
    },
    CoalesceNull {
        null_branch: Vec<AirNode>,
    },
    ExecuteBlock {
        body: Vec<AirNode>,
    },
    DefineFunction {
        name: String,
        params: Vec<String>,
        captures: Vec<String>,
        body: Vec<AirNode>,
        sloc: SourceLocation,
    },
    FunctionCall {
        nargs: u32,
        ptc: Option<PtcAware>,
        sloc: SourceLocation,
    },
    ReturnValue,
    ReturnVoid,
    Throw {
        sloc: SourceLocation,
    },
    TryCatch {
        try_body: Vec<AirNode>,
        catch_body: Vec<AirNode>,
        exc_name: String,
        sloc: SourceLocation,
    },
    DeferExpression {
        body: Vec<AirNode>,
        /// Names whose references are bound when the defer is scheduled, so
        /// the body survives its frame (a tail call moves it into the
        /// argument pack).
        captures: Vec<String>,
        sloc: SourceLocation,
    },
    WhileLoop {
        negative: bool,
        cond: Vec<AirNode>,
        body: Vec<AirNode>,
    },
    ForLoop {
        init: Vec<AirNode>,
        cond: Vec<AirNode>,
        step: Vec<AirNode>,
        body: Vec<AirNode>,
    },
    Switch {
        clauses: Vec<SwitchClause>,
    },
    BreakOrContinue {
        status: AirStatus,
    },
    AssertStatement {
        negative: bool,
        msg: String,
        sloc: SourceLocation,
    },
}

impl AvmcQueue {
    /// Solidify an AIR node list: request storage for every node, then
    /// append them all.
    pub fn reload(&mut self, code: &[AirNode]) {
        self.clear();
        for node in code {
            self.request(node.symbols());
        }
        for node in code {
            node.solidify_into(self);
        }
    }
}

/// Convenience wrapper around `reload` on a fresh queue.
pub fn solidify(code: &[AirNode]) -> AvmcQueue {
    let mut queue = AvmcQueue::new();
    queue.reload(code);
    queue
}

fn solidify_rc(code: &[AirNode]) -> Rc<AvmcQueue> {
    Rc::new(solidify(code))
}

impl AirNode {
    fn symbols(&self) -> Option<&SourceLocation> {
        match self {
            AirNode::FunctionCall { sloc, .. } => Some(sloc),
            _ => None,
        }
    }

    fn solidify_into(&self, queue: &mut AvmcQueue) {
        match self {
            AirNode::ClearStack => {
                queue.append_trivial(exec_clear_stack, ParamU::new(), None);
            }
            AirNode::PushConstant { value } => {
                queue.append(
                    exec_push_constant,
                    ParamU::new(),
                    None,
                    ConstantParams {
                        value: value.clone(),
                    },
                );
            }
            AirNode::PushBoundReference { reference } => {
                queue.append(
                    exec_push_bound_reference,
                    ParamU::new(),
                    None,
                    BoundRefParams {
                        reference: reference.clone(),
                    },
                );
            }
            AirNode::PushNamedReference { name } => {
                queue.append(
                    exec_push_named_reference,
                    ParamU::new(),
                    None,
                    NameParams { name: name.clone() },
                );
            }
            AirNode::DeclareVariable { name } => {
                queue.append(
                    exec_declare_variable,
                    ParamU::new(),
                    None,
                    NameParams { name: name.clone() },
                );
            }
            AirNode::InitializeVariable { immutable } => {
                queue.append_trivial(
                    exec_initialize_variable,
                    ParamU::new().with_x16(u16::from(*immutable)),
                    None,
                );
            }
            AirNode::ApplyOperator { xop } => {
                queue.append_trivial(
                    exec_apply_operator,
                    ParamU::new().with_x16(*xop as u16),
                    None,
                );
            }
            AirNode::Branch {
                negative,
                true_branch,
                false_branch,
            } => {
                queue.append(
                    exec_branch,
                    ParamU::new().with_x16(u16::from(*negative)),
                    None,
                    BranchParams {
                        true_queue: solidify(true_branch),
                        false_queue: solidify(false_branch),
                    },
                );
            }
            AirNode::CoalesceNull { null_branch } => {
                queue.append(
                    exec_coalesce_null,
                    ParamU::new(),
                    None,
                    CoalesceParams {
                        null_queue: solidify(null_branch),
                    },
                );
            }
            AirNode::ExecuteBlock { body } => {
                queue.append(
                    exec_execute_block,
                    ParamU::new(),
                    None,
                    BlockParams {
                        body: solidify(body),
                    },
                );
            }
            AirNode::DefineFunction {
                name,
                params,
                captures,
                body,
                sloc,
            } => {
                queue.append(
                    exec_define_function,
                    ParamU::new(),
                    None,
                    DefineFunctionParams {
                        name: name.clone(),
                        params: params.clone(),
                        captures: captures.clone(),
                        body: solidify_rc(body),
                        sloc: sloc.clone(),
                    },
                );
            }
            AirNode::FunctionCall { nargs, ptc, sloc } => {
                let paramu = ParamU::new()
                    .with_x16(encode_ptc(*ptc))
                    .with_x32(*nargs);
                queue.append(
                    exec_function_call,
                    paramu,
                    Some(sloc.clone()),
                    CallParams { sloc: sloc.clone() },
                );
            }
            AirNode::ReturnValue => {
                queue.append_trivial(exec_return_value, ParamU::new(), None);
            }
            AirNode::ReturnVoid => {
                queue.append_trivial(exec_return_void, ParamU::new(), None);
            }
            AirNode::Throw { sloc } => {
                queue.append(
                    exec_throw,
                    ParamU::new(),
                    None,
                    ThrowParams { sloc: sloc.clone() },
                );
            }
            AirNode::TryCatch {
                try_body,
                catch_body,
                exc_name,
                sloc,
            } => {
                queue.append(
                    exec_try_catch,
                    ParamU::new(),
                    None,
                    TryCatchParams {
                        try_queue: solidify(try_body),
                        catch_queue: solidify(catch_body),
                        exc_name: exc_name.clone(),
                        sloc: sloc.clone(),
                    },
                );
            }
            AirNode::DeferExpression {
                body,
                captures,
                sloc,
            } => {
                queue.append(
                    exec_defer_expression,
                    ParamU::new(),
                    None,
                    DeferParams {
                        body: solidify_rc(body),
                        captures: captures.clone(),
                        sloc: sloc.clone(),
                    },
                );
            }
            AirNode::WhileLoop {
                negative,
                cond,
                body,
            } => {
                queue.append(
                    exec_while_loop,
                    ParamU::new().with_x16(u16::from(*negative)),
                    None,
                    WhileParams {
                        cond_queue: solidify(cond),
                        body_queue: solidify(body),
                    },
                );
            }
            AirNode::ForLoop {
                init,
                cond,
                step,
                body,
            } => {
                queue.append(
                    exec_for_loop,
                    ParamU::new(),
                    None,
                    ForParams {
                        init_queue: solidify(init),
                        cond_queue: solidify(cond),
                        step_queue: solidify(step),
                        body_queue: solidify(body),
                    },
                );
            }
            AirNode::Switch { clauses } => {
                queue.append(
                    exec_switch,
                    ParamU::new(),
                    None,
                    SwitchParams {
                        clauses: clauses
                            .iter()
                            .map(|clause| {
                                (
                                    clause.guard.as_deref().map(solidify),
                                    solidify(&clause.body),
                                )
                            })
                            .collect(),
                    },
                );
            }
            AirNode::BreakOrContinue { status } => {
                queue.append_trivial(
                    exec_break_or_continue,
                    ParamU::new().with_x16(encode_status(*status)),
                    None,
                );
            }
            AirNode::AssertStatement {
                negative,
                msg,
                sloc,
            } => {
                queue.append(
                    exec_assert,
                    ParamU::new().with_x16(u16::from(*negative)),
                    None,
                    AssertParams {
                        msg: msg.clone(),
                        sloc: sloc.clone(),
                    },
                );
            }
        }
    }
}

fn encode_ptc(ptc: Option<PtcAware>) -> u16 {
    match ptc {
        None => 0,
        Some(PtcAware::ByValue) => 1,
        Some(PtcAware::ByReference) => 2,
        Some(PtcAware::Void) => 3,
    }
}

fn decode_ptc(code: u16) -> Option<PtcAware> {
    match code {
        0 => None,
        1 => Some(PtcAware::ByValue),
        2 => Some(PtcAware::ByReference),
        _ => Some(PtcAware::Void),
    }
}

fn encode_status(status: AirStatus) -> u16 {
    match status {
        AirStatus::Next => 0,
        AirStatus::Return => 1,
        AirStatus::BreakSwitch => 2,
        AirStatus::BreakWhile => 3,
        AirStatus::BreakFor => 4,
        AirStatus::ContinueWhile => 5,
        AirStatus::ContinueFor => 6,
    }
}

fn decode_status(code: u16) -> AirStatus {
    match code {
        0 => AirStatus::Next,
        1 => AirStatus::Return,
        2 => AirStatus::BreakSwitch,
        3 => AirStatus::BreakWhile,
        4 => AirStatus::BreakFor,
        5 => AirStatus::ContinueWhile,
        _ => AirStatus::ContinueFor,
    }
}

// ---------------------------------------------------------------------------
// Node payloads

struct ConstantParams {
    value: Value,
}

impl AvmcParams for ConstantParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.value.enumerate_variables(enumerator);
    }
}

struct BoundRefParams {
    reference: Reference,
}

impl AvmcParams for BoundRefParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.reference.enumerate_variables(enumerator);
    }
}

struct NameParams {
    name: String,
}

impl AvmcParams for NameParams {}

struct BranchParams {
    true_queue: AvmcQueue,
    false_queue: AvmcQueue,
}

impl AvmcParams for BranchParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.true_queue.enumerate_variables(enumerator);
        self.false_queue.enumerate_variables(enumerator);
    }
}

struct CoalesceParams {
    null_queue: AvmcQueue,
}

impl AvmcParams for CoalesceParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.null_queue.enumerate_variables(enumerator);
    }
}

struct BlockParams {
    body: AvmcQueue,
}

impl AvmcParams for BlockParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.body.enumerate_variables(enumerator);
    }
}

struct DefineFunctionParams {
    name: String,
    params: Vec<String>,
    captures: Vec<String>,
    body: Rc<AvmcQueue>,
    sloc: SourceLocation,
}

impl AvmcParams for DefineFunctionParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        if enumerator.enter_payload(Rc::as_ptr(&self.body) as usize) {
            self.body.enumerate_variables(enumerator);
        }
    }
}

struct CallParams {
    sloc: SourceLocation,
}

impl AvmcParams for CallParams {}

struct ThrowParams {
    sloc: SourceLocation,
}

impl AvmcParams for ThrowParams {}

struct TryCatchParams {
    try_queue: AvmcQueue,
    catch_queue: AvmcQueue,
    exc_name: String,
    sloc: SourceLocation,
}

impl AvmcParams for TryCatchParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.try_queue.enumerate_variables(enumerator);
        self.catch_queue.enumerate_variables(enumerator);
    }
}

struct DeferParams {
    body: Rc<AvmcQueue>,
    captures: Vec<String>,
    sloc: SourceLocation,
}

impl AvmcParams for DeferParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        if enumerator.enter_payload(Rc::as_ptr(&self.body) as usize) {
            self.body.enumerate_variables(enumerator);
        }
    }
}

struct WhileParams {
    cond_queue: AvmcQueue,
    body_queue: AvmcQueue,
}

impl AvmcParams for WhileParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.cond_queue.enumerate_variables(enumerator);
        self.body_queue.enumerate_variables(enumerator);
    }
}

struct ForParams {
    init_queue: AvmcQueue,
    cond_queue: AvmcQueue,
    step_queue: AvmcQueue,
    body_queue: AvmcQueue,
}

impl AvmcParams for ForParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        self.init_queue.enumerate_variables(enumerator);
        self.cond_queue.enumerate_variables(enumerator);
        self.step_queue.enumerate_variables(enumerator);
        self.body_queue.enumerate_variables(enumerator);
    }
}

struct SwitchParams {
    clauses: Vec<(Option<AvmcQueue>, AvmcQueue)>,
}

impl AvmcParams for SwitchParams {
    fn enumerate_variables(&self, enumerator: &mut VariableEnumerator<'_>) {
        for (guard, body) in &self.clauses {
            if let Some(guard) = guard {
                guard.enumerate_variables(enumerator);
            }
            body.enumerate_variables(enumerator);
        }
    }
}

struct AssertParams {
    msg: String,
    sloc: SourceLocation,
}

impl AvmcParams for AssertParams {}

// ---------------------------------------------------------------------------
// Executors

fn raise(error: RuntimeError) -> Exception {
    Exception::from_runtime_error(SourceLocation::native(), error)
}

fn pop_value(ctx: &mut ExecutiveContext<'_>) -> Result<Value, Exception> {
    let refr = ctx.pop_reference().map_err(raise)?;
    refr.read().map_err(raise)
}

fn exec_clear_stack(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    ctx.clear_stack();
    Ok(AirStatus::Next)
}

fn exec_push_constant(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<ConstantParams>(params);
    ctx.push_reference(Reference::constant(params.value.clone()));
    Ok(AirStatus::Next)
}

fn exec_push_bound_reference(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<BoundRefParams>(params);
    ctx.push_reference(params.reference.clone());
    Ok(AirStatus::Next)
}

fn exec_push_named_reference(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<NameParams>(params);
    let refr = ctx
        .get_named(&params.name)
        .cloned()
        .ok_or_else(|| {
            raise(RuntimeError::UnboundName {
                name: params.name.clone(),
            })
        })?;
    ctx.push_reference(refr);
    Ok(AirStatus::Next)
}

fn exec_declare_variable(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<NameParams>(params);
    let var = global.create_variable();
    let refr = Reference::variable(var);
    ctx.insert_named(&params.name, refr.clone());
    ctx.push_reference(refr);
    Ok(AirStatus::Next)
}

fn exec_initialize_variable(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let immutable = paramu.x16() != 0;
    let value = pop_value(ctx)?;
    let target = ctx.pop_reference().map_err(raise)?;
    match target.root() {
        crate::reference::ReferenceRoot::Variable(var) => {
            var.initialize(value, immutable);
            Ok(AirStatus::Next)
        }
        _ => Err(Exception::new(
            ErrorClass::Runtime,
            SourceLocation::native(),
            Value::from("initialization target is not a variable"),
        )),
    }
}

fn exec_apply_operator(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let xop = Xop::decode(paramu.x16());
    match xop {
        Xop::IncPre | Xop::DecPre => {
            let delta = if xop == Xop::IncPre { 1 } else { -1 };
            let op = if delta > 0 { "++" } else { "--" };
            let target = ctx.top_reference().map_err(raise)?.clone();
            let old = target.read().map_err(raise)?;
            let new = operators::step(&old, delta, op).map_err(raise)?;
            target.write(new).map_err(raise)?;
            // The prefix forms yield the stepped lvalue itself.
        }
        Xop::IncPost | Xop::DecPost => {
            let delta = if xop == Xop::IncPost { 1 } else { -1 };
            let op = if delta > 0 { "++" } else { "--" };
            let target = ctx.pop_reference().map_err(raise)?;
            let old = target.read().map_err(raise)?;
            let new = operators::step(&old, delta, op).map_err(raise)?;
            target.write(new).map_err(raise)?;
            ctx.push_reference(Reference::temporary(old));
        }
        Xop::Pos | Xop::Neg | Xop::NotB | Xop::NotL => {
            let operand = pop_value(ctx)?;
            let result = match xop {
                Xop::Pos => operators::prefix_pos(operand),
                Xop::Neg => operators::prefix_neg(operand),
                Xop::NotB => operators::prefix_notb(operand),
                _ => operators::prefix_notl(operand),
            }
            .map_err(raise)?;
            ctx.push_reference(Reference::temporary(result));
        }
        Xop::Unset => {
            let target = ctx.pop_reference().map_err(raise)?;
            let previous = target.unset().map_err(raise)?;
            ctx.push_reference(Reference::temporary(previous));
        }
        Xop::Subscript => {
            let key = pop_value(ctx)?;
            let mut target = ctx.pop_reference().map_err(raise)?;
            match key {
                Value::Integer(index) => {
                    target.zoom_in(Modifier::ArrayIndex(index));
                }
                Value::Str(key) => {
                    target.zoom_in(Modifier::ObjectKey(key.to_string()));
                }
                other => {
                    return Err(raise(RuntimeError::TypeMismatch {
                        expected: "integer or string",
                        got: other.type_name(),
                    }));
                }
            }
            ctx.push_reference(target);
        }
        Xop::Assign => {
            let value = pop_value(ctx)?;
            let target = ctx.top_reference().map_err(raise)?;
            target.write(value).map_err(raise)?;
            // The assignment yields the target lvalue.
        }
        Xop::CmpEq | Xop::CmpNe | Xop::Cmp3Way => {
            let rhs = pop_value(ctx)?;
            let lhs = pop_value(ctx)?;
            let result = match xop {
                Xop::CmpEq => operators::infix_cmp_eq(&lhs, &rhs),
                Xop::CmpNe => operators::infix_cmp_ne(&lhs, &rhs),
                _ => operators::infix_cmp_3way(&lhs, &rhs),
            };
            ctx.push_reference(Reference::temporary(result));
        }
        Xop::CmpLt | Xop::CmpGt | Xop::CmpLte | Xop::CmpGte => {
            let rhs = pop_value(ctx)?;
            let lhs = pop_value(ctx)?;
            let op = match xop {
                Xop::CmpLt => "<",
                Xop::CmpGt => ">",
                Xop::CmpLte => "<=",
                _ => ">=",
            };
            let result = operators::infix_cmp_rel(op, &lhs, &rhs).map_err(raise)?;
            ctx.push_reference(Reference::temporary(result));
        }
        _ => {
            let rhs = pop_value(ctx)?;
            let lhs = pop_value(ctx)?;
            let result = match xop {
                Xop::Add => operators::infix_add(lhs, rhs),
                Xop::Sub => operators::infix_sub(lhs, rhs),
                Xop::Mul => operators::infix_mul(lhs, rhs),
                Xop::Div => operators::infix_div(lhs, rhs),
                Xop::Mod => operators::infix_mod(lhs, rhs),
                Xop::Sla => operators::infix_sla(lhs, rhs),
                Xop::Sra => operators::infix_sra(lhs, rhs),
                Xop::Sll => operators::infix_sll(lhs, rhs),
                Xop::Srl => operators::infix_srl(lhs, rhs),
                Xop::AndB => operators::infix_andb(lhs, rhs),
                Xop::OrB => operators::infix_orb(lhs, rhs),
                _ => operators::infix_xorb(lhs, rhs),
            }
            .map_err(raise)?;
            ctx.push_reference(Reference::temporary(result));
        }
    }
    Ok(AirStatus::Next)
}

fn exec_branch(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<BranchParams>(params);
    let negative = paramu.x16() != 0;
    let operand = ctx.pop_reference().map_err(raise)?;
    let taken = operand.read().map_err(raise)?.test() != negative;
    let queue = if taken {
        &params.true_queue
    } else {
        &params.false_queue
    };
    if queue.is_empty() {
        // An absent branch keeps the operand, which is what gives `&&` and
        // `||` their value-preserving short-circuit semantics.
        ctx.push_reference(operand);
        return Ok(AirStatus::Next);
    }
    queue.execute(ctx, global)
}

fn exec_coalesce_null(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<CoalesceParams>(params);
    let operand = ctx.pop_reference().map_err(raise)?;
    if !operand.read().map_err(raise)?.is_null() {
        ctx.push_reference(operand);
        return Ok(AirStatus::Next);
    }
    params.null_queue.execute(ctx, global)
}

fn exec_execute_block(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<BlockParams>(params);
    let mut child = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
    match params.body.execute(&mut child, global) {
        Ok(status) => {
            child.finish(global)?;
            Ok(status)
        }
        Err(mut error) => {
            child.finish_unwinding(global, &mut error);
            Err(error)
        }
    }
}

fn exec_define_function(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<DefineFunctionParams>(params);
    let mut captures = Vec::with_capacity(params.captures.len());
    for name in &params.captures {
        let refr = ctx.get_named(name).cloned().ok_or_else(|| {
            raise(RuntimeError::UnboundName { name: name.clone() })
        })?;
        captures.push((name.clone(), refr));
    }
    let function = InstantiatedFunction::new(
        &params.name,
        params.params.clone(),
        params.sloc.clone(),
        captures,
        Rc::clone(&params.body),
    );
    ctx.push_reference(Reference::temporary(Value::Function(
        FunctionValue::scripted(Rc::new(function)),
    )));
    Ok(AirStatus::Next)
}

fn exec_function_call(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<CallParams>(params);
    let nargs = paramu.x32() as usize;
    let ptc = decode_ptc(paramu.x16());

    let mut args = Vec::with_capacity(nargs + 1);
    for _ in 0..nargs {
        args.push(ctx.pop_reference().map_err(raise)?);
    }
    args.reverse();
    let target = ctx.pop_reference().map_err(raise)?;

    let callee = target.read().map_err(raise)?;
    let function = match callee.as_function() {
        Some(function) => function.clone(),
        None => {
            return Err(Exception::from_runtime_error(
                params.sloc.clone(),
                RuntimeError::NotCallable {
                    got: callee.type_name(),
                },
            ));
        }
    };

    // For a member call `o.f(...)` the self reference is the member's
    // holder.
    let mut self_ref = target.clone();
    if self_ref.zoom_out().is_none() {
        self_ref = Reference::null();
    }

    match ptc {
        None => {
            let is_native = matches!(function, FunctionValue::Native(_));
            if let Err(mut error) = function.invoke(&mut self_ref, global, args) {
                if is_native {
                    error.push_frame(FrameKind::Native, params.sloc.clone());
                }
                return Err(error);
            }
            ctx.push_reference(self_ref);
        }
        Some(flavor) => {
            // A tail call is packed, not performed: the enclosing caller's
            // resolve loop re-enters the target after this frame unwinds.
            let mut args_self = args;
            args_self.push(self_ref);
            let pack = PtcArguments::new(params.sloc.clone(), flavor, function, args_self);
            ctx.push_reference(Reference::tail_call(Rc::new(pack)));
        }
    }
    Ok(AirStatus::Next)
}

fn exec_return_value(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    ctx.top_reference().map_err(raise)?;
    Ok(AirStatus::Return)
}

fn exec_return_void(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    ctx.push_reference(Reference::constant(Value::Null));
    Ok(AirStatus::Return)
}

fn exec_throw(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<ThrowParams>(params);
    let value = pop_value(ctx)?;
    Err(Exception::throw(params.sloc.clone(), value))
}

fn exec_try_catch(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<TryCatchParams>(params);

    let mut tctx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
    let mut error = match params.try_queue.execute(&mut tctx, global) {
        Ok(status) => {
            tctx.finish(global)?;
            return Ok(status);
        }
        Err(error) => error,
    };
    tctx.finish_unwinding(global, &mut error);

    if !error.is_catchable() {
        return Err(error);
    }
    error.push_frame(FrameKind::Catch, params.sloc.clone());

    let mut cctx = ExecutiveContext::new_child(ctx, ContextFlavor::Catch);
    cctx.insert_named(
        &params.exc_name,
        Reference::constant(error.value().clone()),
    );
    cctx.insert_named("__backtrace", Reference::constant(error.backtrace_value()));
    match params.catch_queue.execute(&mut cctx, global) {
        Ok(status) => {
            cctx.finish(global)?;
            Ok(status)
        }
        Err(mut catch_error) => {
            cctx.finish_unwinding(global, &mut catch_error);
            Err(catch_error)
        }
    }
}

fn exec_defer_expression(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<DeferParams>(params);
    // Bind the captured names now; the body must stay runnable after this
    // frame has exited.
    let mut bindings = Vec::with_capacity(params.captures.len());
    for name in &params.captures {
        let refr = ctx.get_named(name).cloned().ok_or_else(|| {
            raise(RuntimeError::UnboundName { name: name.clone() })
        })?;
        bindings.push((name.clone(), refr));
    }
    ctx.defer_expression(DeferredExpression::new(
        params.sloc.clone(),
        Rc::clone(&params.body),
        bindings,
    ));
    Ok(AirStatus::Next)
}

fn exec_while_loop(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<WhileParams>(params);
    let negative = paramu.x16() != 0;
    loop {
        let mut cctx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
        let status = params.cond_queue.execute(&mut cctx, global)?;
        let condition = cctx.pop_reference().map_err(raise)?.read().map_err(raise)?;
        cctx.finish(global)?;
        if status != AirStatus::Next {
            return Ok(status);
        }
        if condition.test() == negative {
            return Ok(AirStatus::Next);
        }

        let mut bctx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
        match params.body_queue.execute(&mut bctx, global) {
            Ok(AirStatus::Next) | Ok(AirStatus::ContinueWhile) => {
                bctx.finish(global)?;
            }
            Ok(AirStatus::BreakWhile) => {
                bctx.finish(global)?;
                return Ok(AirStatus::Next);
            }
            Ok(other) => {
                bctx.finish(global)?;
                return Ok(other);
            }
            Err(mut error) => {
                bctx.finish_unwinding(global, &mut error);
                return Err(error);
            }
        }
    }
}

fn exec_for_loop(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<ForParams>(params);

    // The init clause owns a scope that the condition, step and body all
    // see.
    let mut ictx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
    let status = match params.init_queue.execute(&mut ictx, global) {
        Ok(status) => status,
        Err(mut error) => {
            ictx.finish_unwinding(global, &mut error);
            return Err(error);
        }
    };
    if status != AirStatus::Next {
        ictx.finish(global)?;
        return Ok(status);
    }

    let result = loop {
        if !params.cond_queue.is_empty() {
            let mut cctx = ExecutiveContext::new_child(&ictx, ContextFlavor::Plain);
            let status = match params.cond_queue.execute(&mut cctx, global) {
                Ok(status) => status,
                Err(error) => break Err(error),
            };
            let condition = match cctx.pop_reference().map_err(raise).and_then(|r| {
                r.read().map_err(raise)
            }) {
                Ok(condition) => condition,
                Err(error) => break Err(error),
            };
            if let Err(error) = cctx.finish(global) {
                break Err(error);
            }
            if status != AirStatus::Next {
                break Ok(status);
            }
            if !condition.test() {
                break Ok(AirStatus::Next);
            }
        }

        let mut bctx = ExecutiveContext::new_child(&ictx, ContextFlavor::Plain);
        match params.body_queue.execute(&mut bctx, global) {
            Ok(AirStatus::Next) | Ok(AirStatus::ContinueFor) => {
                if let Err(error) = bctx.finish(global) {
                    break Err(error);
                }
            }
            Ok(AirStatus::BreakFor) => {
                if let Err(error) = bctx.finish(global) {
                    break Err(error);
                }
                break Ok(AirStatus::Next);
            }
            Ok(other) => {
                if let Err(error) = bctx.finish(global) {
                    break Err(error);
                }
                break Ok(other);
            }
            Err(mut error) => {
                bctx.finish_unwinding(global, &mut error);
                break Err(error);
            }
        }

        let mut sctx = ExecutiveContext::new_child(&ictx, ContextFlavor::Plain);
        match params.step_queue.execute(&mut sctx, global) {
            Ok(_) => {
                if let Err(error) = sctx.finish(global) {
                    break Err(error);
                }
            }
            Err(error) => break Err(error),
        }
    };

    match result {
        Ok(status) => {
            ictx.finish(global)?;
            Ok(status)
        }
        Err(mut error) => {
            ictx.finish_unwinding(global, &mut error);
            Err(error)
        }
    }
}

fn exec_switch(
    ctx: &mut ExecutiveContext<'_>,
    global: &mut GlobalContext,
    _paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<SwitchParams>(params);
    let subject = pop_value(ctx)?;

    let mut matched = None;
    let mut default = None;
    for (index, (guard, _)) in params.clauses.iter().enumerate() {
        match guard {
            None => default = Some(index),
            Some(guard) => {
                let mut gctx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
                guard.execute(&mut gctx, global)?;
                let label = gctx.pop_reference().map_err(raise)?.read().map_err(raise)?;
                gctx.finish(global)?;
                if label.compare(&subject) == Compare::Equal {
                    matched = Some(index);
                    break;
                }
            }
        }
    }

    let Some(start) = matched.or(default) else {
        return Ok(AirStatus::Next);
    };

    // Clause bodies share one scope and fall through until a break.
    let mut bctx = ExecutiveContext::new_child(ctx, ContextFlavor::Plain);
    for (_, body) in &params.clauses[start..] {
        match body.execute(&mut bctx, global) {
            Ok(AirStatus::Next) => {}
            Ok(AirStatus::BreakSwitch) => break,
            Ok(other) => {
                bctx.finish(global)?;
                return Ok(other);
            }
            Err(mut error) => {
                bctx.finish_unwinding(global, &mut error);
                return Err(error);
            }
        }
    }
    bctx.finish(global)?;
    Ok(AirStatus::Next)
}

fn exec_break_or_continue(
    _ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    paramu: ParamU,
    _params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    Ok(decode_status(paramu.x16()))
}

fn exec_assert(
    ctx: &mut ExecutiveContext<'_>,
    _global: &mut GlobalContext,
    paramu: ParamU,
    params: Option<&dyn AvmcParams>,
) -> Result<AirStatus, Exception> {
    let params = params_as::<AssertParams>(params);
    let negative = paramu.x16() != 0;
    let value = pop_value(ctx)?;
    if value.test() != negative {
        return Ok(AirStatus::Next);
    }
    let mut error = Exception::new(
        ErrorClass::Runtime,
        params.sloc.clone(),
        Value::from(format!("assertion failure: {}", params.msg)),
    );
    error.push_frame(FrameKind::Assert, params.sloc.clone());
    Err(error)
}
