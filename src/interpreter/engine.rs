// Execution engine for lowered C

use crate::config::SessionConfig;
use crate::console::Console;
use crate::error::LoadError;
use crate::interpreter::errors::ExecError;
use crate::ir::{Function, InstrKind, TranslationUnit};
use crate::lower;
use crate::memory::{opaque_reason, Explanation, Payload, Provenance, Trace, ValueId};
use crate::parser::ast::Expr;
use crate::parser::Parser;
use crate::rewrite::LabelGen;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path as FsPath;
use std::rc::Rc;
use tracing::{debug, info};

/// Where the current invocation stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Ready,
    Running,
    /// Stopped at a breakpoint, before the instructions of `line`
    Suspended { line: usize },
    Completed,
    Faulted,
}

/// What to do after a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakAction {
    Resume,
    /// Abandon the suspended invocation
    Abort,
}

/// Receives control when execution reaches a breakpoint. The interpreter
/// is live while the handler runs: the handler may evaluate expressions,
/// print memory and start nested invocations.
pub trait Debugger {
    fn on_breakpoint(&mut self, interp: &mut Interpreter, line: usize) -> BreakAction;
}

/// Resumes every breakpoint immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct RunToCompletion;

impl Debugger for RunToCompletion {
    fn on_breakpoint(&mut self, _interp: &mut Interpreter, _line: usize) -> BreakAction {
        BreakAction::Resume
    }
}

/// Set of breakpoint lines
#[derive(Debug, Clone, Default)]
pub struct Breakpoints {
    lines: FxHashSet<usize>,
}

impl Breakpoints {
    /// Returns false if the breakpoint was already set
    pub fn add(&mut self, line: usize) -> bool {
        self.lines.insert(line)
    }

    /// Returns false if there was no breakpoint to clear
    pub fn remove(&mut self, line: usize) -> bool {
        self.lines.remove(&line)
    }

    pub fn contains(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn sorted(&self) -> Vec<usize> {
        let mut lines: Vec<usize> = self.lines.iter().copied().collect();
        lines.sort_unstable();
        lines
    }
}

/// How a verbose registration prints one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgFormat {
    #[default]
    Decimal,
    Hex,
}

impl ArgFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec {
            "d" => Some(ArgFormat::Decimal),
            "x" => Some(ArgFormat::Hex),
            _ => None,
        }
    }
}

/// Whether a native handler stands in for the C body or runs before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeMode {
    Replace,
    Observe,
}

pub type NativeFn = Rc<dyn Fn(&mut Interpreter, &[ValueId]) -> Result<ValueId, ExecError>>;

#[derive(Clone)]
pub struct Native {
    pub mode: NativeMode,
    pub handler: NativeFn,
}

/// Result of evaluating an expression typed at the shell
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: ValueId,
    /// Memory location, for expressions that denote one
    pub place: Option<crate::memory::Path>,
}

/// Interpreter for one translation unit
pub struct Interpreter {
    pub(crate) unit: Rc<TranslationUnit>,
    pub(crate) parser: Parser,
    /// Shared with the lowering pass, so shell snippets get fresh names too
    pub(crate) labels: LabelGen,
    pub trace: Trace,
    pub console: Console,
    pub(crate) config: SessionConfig,
    breakpoints: Breakpoints,
    pub(crate) verbose: FxHashMap<Rc<str>, Vec<ArgFormat>>,
    pub(crate) natives: FxHashMap<Rc<str>, Native>,
    /// Names of the functions being executed, innermost last
    pub(crate) frames: Vec<Rc<str>>,
    state: ExecState,
    pub(crate) current_line: usize,
    /// Text the code being executed was lexed from
    pub(crate) source: Rc<str>,
}

impl Interpreter {
    /// Load `source` and prepare an interpreter for it. Globals are not run
    /// yet, so native handlers can be registered first.
    pub fn new(source: &str, config: SessionConfig) -> Result<Self, LoadError> {
        let parser = Parser::new();
        let mut labels = LabelGen::new(config.label_prefix.as_str());
        let unit = lower::load(source, &parser, &mut labels)?;
        Ok(Self {
            unit: Rc::new(unit),
            parser,
            labels,
            trace: Trace::new(),
            console: Console::new(),
            config,
            breakpoints: Breakpoints::default(),
            verbose: FxHashMap::default(),
            natives: FxHashMap::default(),
            frames: Vec::new(),
            state: ExecState::Ready,
            current_line: 0,
            source: "".into(),
        })
    }

    pub fn from_file(path: impl AsRef<FsPath>, config: SessionConfig) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(&source, config)
    }

    pub fn unit(&self) -> &TranslationUnit {
        &self.unit
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// The function being executed, if any
    pub fn current_function(&self) -> Option<&Rc<str>> {
        self.frames.last()
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn add_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.add(line)
    }

    pub fn remove_breakpoint(&mut self, line: usize) -> bool {
        self.breakpoints.remove(line)
    }

    /// Print the arguments of every call to `function`
    pub fn set_verbose(&mut self, function: &str, formats: Vec<ArgFormat>) {
        self.verbose.insert(function.into(), formats);
    }

    pub fn clear_verbose(&mut self, function: &str) -> bool {
        self.verbose.remove(function).is_some()
    }

    /// Drop every breakpoint and verbose registration. Natives stay.
    pub fn reset_session(&mut self) {
        self.breakpoints.clear();
        self.verbose.clear();
    }

    pub fn register_native<F>(&mut self, name: &str, mode: NativeMode, handler: F)
    where
        F: Fn(&mut Interpreter, &[ValueId]) -> Result<ValueId, ExecError> + 'static,
    {
        self.natives.insert(
            name.into(),
            Native {
                mode,
                handler: Rc::new(handler),
            },
        );
    }

    /// A concrete integer attributed to the current line, for native handlers
    pub fn int(&mut self, value: i64, text: &str) -> ValueId {
        self.trace.values.int(value, Provenance::new(text, self.current_line))
    }

    /// A fresh opaque value attributed to the current line
    pub fn opaque(&mut self, text: &str) -> ValueId {
        self.trace.values.opaque(Provenance::new(text, self.current_line))
    }

    /// Console output attributed to the current line
    pub fn print(&mut self, text: &str) {
        self.console.print(text, self.current_line);
    }

    pub fn explain(&self, value: ValueId) -> Explanation<'_> {
        Explanation::new(&self.trace.values, value)
    }

    /// Text and line of the unknown input `value` depends on
    pub fn opaque_reason(&self, value: ValueId) -> Option<(Rc<str>, usize)> {
        opaque_reason(&self.trace.values, value)
    }

    pub fn render_memory(&self) -> String {
        self.trace.render_all()
    }

    /// Bind every function name globally and run the file-scope code once
    pub fn run_globals(&mut self, debugger: &mut dyn Debugger) -> Result<(), ExecError> {
        for name in self.unit.function_names() {
            let alloc = self.trace.bind_global(&name);
            let start = self.unit.function(&name).map(|f| f.start_line).unwrap_or(0);
            let value = self
                .trace
                .values
                .concrete(Payload::Func(name.clone()), Provenance::new(name.clone(), start));
            self.trace.write(&crate::memory::Path::root(alloc), value);
        }
        let globals = self.unit.globals.clone();
        info!(instructions = globals.body.len(), "running globals");
        self.supervise(|interp| interp.execute(&globals, 0, debugger).map(|_| ()))
    }

    /// Run `function` with `args` until it returns
    pub fn invoke(&mut self, function: &str, args: &[ValueId], debugger: &mut dyn Debugger) -> Result<ValueId, ExecError> {
        let name: Rc<str> = function.into();
        if self.unit.function(function).is_none() && !self.natives.contains_key(function) {
            return Err(ExecError::UnboundName {
                name: function.to_string(),
                line: self.current_line,
            });
        }
        let line = self.unit.function(function).map(|f| f.start_line).unwrap_or(self.current_line);
        let rendered: Vec<String> = args.iter().map(|a| self.trace.values.display(*a).to_string()).collect();
        let text = format!("{} ( {} )", function, rendered.join(" , "));
        self.supervise(|interp| {
            interp.trace_call(&name, args, &format!("{}({})", function, rendered.join(", ")), line);
            interp.call(&name, args, &text, line, debugger)
        })
    }

    /// Start executing at `line` of the function that contains it.
    ///
    /// Parameters and locals of that function that are not bound already
    /// (by a suspended execution of the same function) get fresh cells, so
    /// reading them before they are assigned yields opaque values.
    pub fn execute_from_line(&mut self, line: usize, debugger: &mut dyn Debugger) -> Result<Option<ValueId>, ExecError> {
        self.supervise(|interp| interp.enter_at(line, debugger))
    }

    fn enter_at(&mut self, line: usize, debugger: &mut dyn Debugger) -> Result<Option<ValueId>, ExecError> {
        let function = self.unit.function_at_line(line).ok_or(ExecError::NoCodeAtLine { line })?;
        let pc = function.entry_at_line(line).ok_or(ExecError::NoCodeAtLine { line })?;
        let reuse = self.frames.last() == Some(&function.name);
        if !reuse {
            self.enter_frame(&function, line)?;
        }
        for name in function.params.iter().chain(function.declared_names().iter()) {
            if !self.trace.is_local(name) {
                self.trace.bind(name);
            }
        }
        debug!(function = &*function.name, line, pc, "entering mid-function");
        let result = self.execute(&function, pc, debugger);
        if !reuse {
            self.leave_frame();
        }
        result
    }

    pub(crate) fn enter_frame(&mut self, function: &Function, line: usize) -> Result<(), ExecError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(ExecError::CallDepthExceeded {
                function: function.name.to_string(),
                limit: self.config.max_call_depth,
                line,
            });
        }
        self.trace.push_scope();
        self.frames.push(function.name.clone());
        Ok(())
    }

    pub(crate) fn leave_frame(&mut self) {
        self.frames.pop();
        self.trace.pop_scope();
    }

    /// Run `body` as one invocation and move the state machine accordingly.
    /// An invocation started while suspended leaves the outer state in place
    /// when it ends.
    fn supervise<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T, ExecError>) -> Result<T, ExecError> {
        let outer = std::mem::replace(&mut self.state, ExecState::Running);
        let result = body(self);
        self.state = match (outer, &result) {
            (ExecState::Suspended { .. } | ExecState::Running, _) => outer,
            (_, Ok(_)) => ExecState::Completed,
            (_, Err(_)) => ExecState::Faulted,
        };
        result
    }

    /// Execute `function` from instruction `pc` until it returns or falls
    /// off its end
    pub(crate) fn execute(
        &mut self,
        function: &Function,
        pc: usize,
        debugger: &mut dyn Debugger,
    ) -> Result<Option<ValueId>, ExecError> {
        let outer = std::mem::replace(&mut self.source, function.source.clone());
        let result = self.step(function, pc, debugger);
        self.source = outer;
        result
    }

    /// Original text of `expr` in the code being executed, falling back to
    /// its token text
    pub(crate) fn source_text(&self, expr: &Expr) -> Rc<str> {
        expr.span
            .and_then(|span| self.source.get(span.start..span.end))
            .map(Rc::from)
            .unwrap_or_else(|| expr.text.clone())
    }

    fn step(
        &mut self,
        function: &Function,
        mut pc: usize,
        debugger: &mut dyn Debugger,
    ) -> Result<Option<ValueId>, ExecError> {
        let mut last_line = None;
        while let Some(instr) = function.body.get(pc) {
            if !instr.is_marker() {
                self.current_line = instr.line;
                // one suspension per entry into a line, however many
                // instructions the line was lowered to
                if last_line != Some(instr.line) {
                    last_line = Some(instr.line);
                    if self.breakpoints.contains(instr.line) {
                        self.suspend(instr.line, debugger)?;
                    }
                }
            }
            pc = match &instr.kind {
                InstrKind::Label(_) | InstrKind::Nop => pc + 1,
                InstrKind::Declare(declaration) => {
                    self.declare(declaration, debugger)?;
                    pc + 1
                }
                InstrKind::Eval(expr) => {
                    self.eval(expr, debugger)?;
                    pc + 1
                }
                InstrKind::Goto(label) => self.jump(function, label, instr.line)?,
                InstrKind::GotoIte {
                    cond,
                    then_label,
                    else_label,
                } => {
                    let value = self.eval(cond, debugger)?;
                    // an opaque condition takes the first target
                    let target = match self.trace.values.truthy(value) {
                        Some(false) => else_label,
                        Some(true) | None => then_label,
                    };
                    self.jump(function, target, instr.line)?
                }
                InstrKind::Return(value) => {
                    return match value {
                        Some(expr) => self.eval(expr, debugger).map(Some),
                        None => Ok(None),
                    };
                }
            };
        }
        Ok(None)
    }

    fn jump(&self, function: &Function, label: &str, line: usize) -> Result<usize, ExecError> {
        function.label_index(label).ok_or_else(|| ExecError::UnknownLabel {
            label: label.to_string(),
            line,
        })
    }

    fn suspend(&mut self, line: usize, debugger: &mut dyn Debugger) -> Result<(), ExecError> {
        let previous = std::mem::replace(&mut self.state, ExecState::Suspended { line });
        debug!(line, "breakpoint hit");
        let action = debugger.on_breakpoint(self, line);
        self.state = previous;
        match action {
            BreakAction::Resume => Ok(()),
            BreakAction::Abort => Err(ExecError::Aborted { line }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter(source: &str) -> Interpreter {
        Interpreter::new(source, SessionConfig::default()).unwrap()
    }

    /// Records breakpoint lines and the value of `x` at each
    struct Recorder {
        hits: Vec<(usize, Option<i64>)>,
        action: BreakAction,
    }

    impl Debugger for Recorder {
        fn on_breakpoint(&mut self, interp: &mut Interpreter, line: usize) -> BreakAction {
            assert_eq!(interp.state(), ExecState::Suspended { line });
            let x = interp
                .evaluate("x", &mut RunToCompletion)
                .ok()
                .and_then(|e| interp.trace.values.as_int(e.value));
            self.hits.push((line, x));
            self.action
        }
    }

    #[test]
    fn test_invoke_runs_to_completion() {
        let mut interp = interpreter("int add(int a, int b)\n{\n  return a + b;\n}\n");
        interp.run_globals(&mut RunToCompletion).unwrap();
        let two = interp.int(2, "2");
        let three = interp.int(3, "3");

        let result = interp.invoke("add", &[two, three], &mut RunToCompletion).unwrap();

        assert_eq!(interp.trace.values.as_int(result), Some(5));
        assert_eq!(interp.state(), ExecState::Completed);
    }

    #[test]
    fn test_breakpoint_fires_once_per_line_entry() {
        let source = "int main()\n{\n  int x = 0;\n  while (x < 3)\n    x++;\n  return x;\n}\n";
        let mut interp = interpreter(source);
        interp.add_breakpoint(5);
        let mut recorder = Recorder {
            hits: Vec::new(),
            action: BreakAction::Resume,
        };

        interp.invoke("main", &[], &mut recorder).unwrap();

        assert_eq!(recorder.hits, vec![(5, Some(0)), (5, Some(1)), (5, Some(2))]);
    }

    #[test]
    fn test_abort_faults_the_invocation() {
        let source = "int main()\n{\n  int x = 1;\n  x = 2;\n  return x;\n}\n";
        let mut interp = interpreter(source);
        interp.add_breakpoint(4);
        let mut recorder = Recorder {
            hits: Vec::new(),
            action: BreakAction::Abort,
        };

        let err = interp.invoke("main", &[], &mut recorder).unwrap_err();

        assert!(err.is_abort());
        assert_eq!(interp.state(), ExecState::Faulted);
        assert!(interp.current_function().is_none());
    }

    #[test]
    fn test_unknown_entry_point() {
        let mut interp = interpreter("int main() { return 0; }");
        let err = interp.invoke("probe", &[], &mut RunToCompletion).unwrap_err();
        assert!(matches!(err, ExecError::UnboundName { .. }));
    }

    #[test]
    fn test_breakpoint_set_twice_is_one_breakpoint() {
        let mut breakpoints = Breakpoints::default();
        assert!(breakpoints.add(7));
        assert!(!breakpoints.add(7));
        assert!(breakpoints.remove(7));
        assert!(!breakpoints.remove(7));
        assert!(breakpoints.sorted().is_empty());
    }

    #[test]
    fn test_call_depth_limit() {
        let config = SessionConfig::default().with_max_call_depth(16);
        let mut interp = Interpreter::new("int f(int n)\n{\n  return f(n + 1);\n}\n", config).unwrap();
        let zero = interp.int(0, "0");
        let err = interp.invoke("f", &[zero], &mut RunToCompletion).unwrap_err();
        assert!(matches!(err, ExecError::CallDepthExceeded { limit: 16, .. }));
        assert!(interp.current_function().is_none());
    }
}
