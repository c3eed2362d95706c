//! Declaration execution
//!
//! Control flow is gone by the time code reaches the interpreter, so the
//! only statement with behaviour of its own is a declaration:
//!
//! - enum constants become integer variables, counted from 0
//! - each declarator binds a fresh cell in the current scope, reset if the
//!   same scope declared it before (a declaration inside a loop body)
//! - arrays are pointers to the first cell of their own allocation
//! - prototypes declare nothing

use crate::interpreter::engine::{Debugger, Interpreter};
use crate::interpreter::errors::ExecError;
use crate::memory::{Path, Payload, Provenance, Selector};
use crate::parser::ast::{Declaration, Declarator, Enumerator};
use tracing::warn;

impl Interpreter {
    pub(crate) fn declare(&mut self, declaration: &Declaration, debugger: &mut dyn Debugger) -> Result<(), ExecError> {
        self.declare_enumerators(&declaration.enumerators, debugger)?;
        for declarator in &declaration.declarators {
            if declarator.is_function {
                continue;
            }
            self.declare_variable(declarator, debugger)?;
        }
        Ok(())
    }

    fn declare_enumerators(&mut self, enumerators: &[Enumerator], debugger: &mut dyn Debugger) -> Result<(), ExecError> {
        let mut next = 0i64;
        for enumerator in enumerators {
            let value = match &enumerator.value {
                Some(expr) => {
                    let value = self.eval(expr, debugger)?;
                    match self.trace.values.as_int(value) {
                        Some(k) => next = k,
                        None => warn!(
                            line = enumerator.line,
                            name = &*enumerator.name,
                            "enumerator value is not a constant"
                        ),
                    }
                    value
                }
                None => self
                    .trace
                    .values
                    .int(next, Provenance::new(enumerator.name.clone(), enumerator.line)),
            };
            next = next.wrapping_add(1);
            let alloc = self.trace.declare(&enumerator.name);
            self.trace.write(&Path::root(alloc), value);
        }
        Ok(())
    }

    fn declare_variable(&mut self, declarator: &Declarator, debugger: &mut dyn Debugger) -> Result<(), ExecError> {
        let init = match &declarator.init {
            Some(expr) => Some(self.eval(expr, debugger)?),
            None => None,
        };
        let alloc = self.trace.declare(&declarator.name);
        let root = Path::root(alloc);

        if !declarator.is_array {
            if let Some(value) = init {
                self.decay(value);
                self.trace.write(&root, value);
            }
            return Ok(());
        }

        if let Some(value) = init {
            // `{...}` and string initialisers already live in memory
            self.decay(value);
            if self.trace.values.as_ptr(value).is_some() {
                self.trace.write(&root, value);
                return Ok(());
            }
        }
        let storage = self.trace.memory.allocate(format!("{}[]", declarator.name));
        let first = Path::root(storage).child(Selector::Index(0));
        if let Some(value) = init {
            self.trace.write(&first, value);
        }
        let pointer = self
            .trace
            .values
            .concrete(Payload::Ptr(first), Provenance::new(declarator.name.clone(), declarator.line));
        self.trace.write(&root, pointer);
        Ok(())
    }
}
