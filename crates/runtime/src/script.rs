//! The embedding surface for compiled code: an opaque handle wrapping a
//! solidified queue, executable against a global context with an argument
//! list.
//!
//! A lowering pass (an external collaborator) produces the AIR node list;
//! everything after that point lives here.

use std::rc::Rc;

use crate::air::{solidify, AirNode};
use crate::error::Exception;
use crate::function::{Callable, FunctionValue, InstantiatedFunction};
use crate::global::GlobalContext;
use crate::reference::Reference;
use crate::source::SourceLocation;
use crate::value::Value;

/// A compiled program: its body solidified once, shared across executions.
pub struct Script {
    function: Rc<InstantiatedFunction>,
}

impl Script {
    /// Wrap a lowered program. `params` names the positional arguments the
    /// program receives.
    pub fn new(name: &str, params: Vec<String>, code: &[AirNode]) -> Self {
        let sloc = SourceLocation::new(name, 0);
        let function = InstantiatedFunction::new(
            name,
            params,
            sloc,
            Vec::new(),
            Rc::new(solidify(code)),
        );
        Self {
            function: Rc::new(function),
        }
    }

    /// Run the program with an argument list and read back the returned
    /// reference. Tail calls are fully resolved before this returns.
    pub fn execute(
        &self,
        global: &mut GlobalContext,
        args: Vec<Reference>,
    ) -> Result<Reference, Exception> {
        let mut self_ref = Reference::constant(Value::Null);
        self.function
            .invoke_ptc_aware(&mut self_ref, global, args)?;
        self_ref.finish_call(global)?;
        Ok(self_ref)
    }

    /// The program as a callable function value, for mounting or passing
    /// into other scripts.
    pub fn as_function(&self) -> FunctionValue {
        let callable: Rc<dyn Callable> = self.function.clone();
        FunctionValue::scripted(callable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::air::Xop;

    #[test]
    fn scripts_execute_with_arguments() {
        let mut global = GlobalContext::new();
        // return a + b;
        let script = Script::new(
            "adder",
            vec!["a".to_string(), "b".to_string()],
            &[
                AirNode::PushNamedReference {
                    name: "a".to_string(),
                },
                AirNode::PushNamedReference {
                    name: "b".to_string(),
                },
                AirNode::ApplyOperator { xop: Xop::Add },
                AirNode::ReturnValue,
            ],
        );
        let result = script
            .execute(
                &mut global,
                vec![
                    Reference::temporary(Value::Integer(2)),
                    Reference::temporary(Value::Integer(3)),
                ],
            )
            .unwrap();
        assert_eq!(result.read().unwrap(), Value::Integer(5));
    }

    #[test]
    fn scripts_without_a_return_yield_null() {
        let mut global = GlobalContext::new();
        let script = Script::new("empty", vec![], &[AirNode::ClearStack]);
        let result = script.execute(&mut global, vec![]).unwrap();
        assert!(result.read().unwrap().is_null());
    }

    #[test]
    fn std_members_resolve_through_a_mounted_binding() {
        let mut global = GlobalContext::new();
        global
            .set_std_member("meow", Value::Integer(42))
            .unwrap();

        // return std.meow;
        let script = Script::new(
            "lookup",
            vec!["std".to_string()],
            &[
                AirNode::PushNamedReference {
                    name: "std".to_string(),
                },
                AirNode::PushConstant {
                    value: Value::from("meow"),
                },
                AirNode::ApplyOperator {
                    xop: Xop::Subscript,
                },
                AirNode::ReturnValue,
            ],
        );
        let std_ref = global.std_variable();
        let result = script.execute(&mut global, vec![std_ref.clone()]).unwrap();
        assert_eq!(result.read().unwrap(), Value::Integer(42));

        global.remove_std_member("meow").unwrap();
        let result = script.execute(&mut global, vec![std_ref]).unwrap();
        assert!(result.read().unwrap().is_null());
    }
}
