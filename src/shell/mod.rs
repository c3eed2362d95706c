//! Interactive shell
//!
//! A line-oriented command loop over an [`Interpreter`]. The same loop runs
//! at the top level and at every breakpoint: the shell is the interpreter's
//! [`Debugger`], so a command that starts an invocation while suspended
//! nests a new prompt inside the suspended one.
//!
//! Input and output are generic so tests can drive a session from memory.

pub mod commands;

use crate::config::SessionConfig;
use crate::interpreter::{BreakAction, Debugger, ExecState, Interpreter, RunToCompletion};
use crate::memory::ValueId;
use commands::{Command, HELP};
use crossterm::style::{Color, Stylize};
use rustc_hash::FxHashMap;
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use tracing::warn;

pub const PROMPT: &str = "ssi > ";

const BANNER: Color = Color::Rgb { r: 137, g: 180, b: 250 };
const ERROR: Color = Color::Rgb { r: 243, g: 139, b: 168 };

/// What the command loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Resume,
    Abort,
    Quit,
}

pub struct Shell<R, W> {
    input: R,
    output: W,
    color: bool,
    /// Domain action words and the functions they invoke
    actions: FxHashMap<String, String>,
    quit: bool,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(input: R, output: W, config: &SessionConfig) -> Self {
        Self {
            input,
            output,
            color: config.color,
            actions: FxHashMap::default(),
            quit: false,
        }
    }

    /// Make `word ARGS...` invoke `function`
    pub fn with_action(mut self, word: &str, function: &str) -> Self {
        self.actions.insert(word.to_string(), function.to_string());
        self
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Top-level command loop; returns at end of input or on `q`. Each run
    /// is a fresh session, so it starts with no breakpoints and no verbose
    /// registrations.
    pub fn run(&mut self, interp: &mut Interpreter) -> io::Result<()> {
        interp.reset_session();
        while !self.quit {
            let Some(line) = self.read_command()? else {
                break;
            };
            if self.execute(interp, &line)? == Flow::Quit {
                self.quit = true;
            }
        }
        Ok(())
    }

    fn read_command(&mut self) -> io::Result<Option<String>> {
        write!(self.output, "{}", PROMPT)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Run one command line
    pub fn execute(&mut self, interp: &mut Interpreter, line: &str) -> io::Result<Flow> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(message) => {
                self.error(message)?;
                return Ok(Flow::Continue);
            }
        };
        let suspended = matches!(interp.state(), ExecState::Suspended { .. });

        match command {
            Command::Empty => {}
            Command::Call { function, args } => self.invoke(interp, &function, &args)?,
            Command::Word { word, args } => match self.actions.get(&word).cloned() {
                Some(function) => self.invoke(interp, &function, &args)?,
                None if interp.unit().function(&word).is_some() => self.invoke(interp, &word, &args)?,
                None => self.error(format!("Unknown command '{}'; type help for a list", line.trim()))?,
            },
            Command::Break(None) => {
                let lines = interp.breakpoints().sorted();
                if lines.is_empty() {
                    writeln!(self.output, "No breakpoints")?;
                } else {
                    let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
                    writeln!(self.output, "Breakpoints: {}", lines.join(", "))?;
                }
            }
            Command::Break(Some(line)) => {
                if interp.add_breakpoint(line) {
                    writeln!(self.output, "Breakpoint set at line {}", line)?;
                } else {
                    writeln!(self.output, "Breakpoint already set at line {}", line)?;
                }
            }
            Command::Delete(line) => {
                if interp.remove_breakpoint(line) {
                    writeln!(self.output, "Breakpoint cleared at line {}", line)?;
                } else {
                    writeln!(self.output, "No breakpoint at line {}", line)?;
                }
            }
            Command::Explain(text) => match interp.evaluate(&text, self) {
                Ok(evaluation) => {
                    self.flush_console(interp)?;
                    write!(self.output, "{}", interp.explain(evaluation.value))?;
                    if let Some(place) = evaluation.place {
                        writeln!(self.output, "{} = {}", place, interp.trace.values.display(evaluation.value))?;
                    }
                }
                Err(e) => self.error(e)?,
            },
            Command::Why(text) => match interp.evaluate(&text, self) {
                Ok(evaluation) => {
                    self.flush_console(interp)?;
                    match interp.opaque_reason(evaluation.value) {
                        Some((source, line)) => {
                            writeln!(self.output, "{} depends on '{}' from line {}", text, source, line)?
                        }
                        None if interp.trace.values.is_concrete(evaluation.value) => {
                            writeln!(self.output, "{} is concrete", text)?
                        }
                        None => writeln!(self.output, "{} is opaque", text)?,
                    }
                }
                Err(e) => self.error(e)?,
            },
            Command::ExecuteLine(line) => {
                let result = interp.execute_from_line(line, self);
                self.flush_console(interp)?;
                match result {
                    Ok(Some(value)) => writeln!(self.output, "Returned {}", interp.trace.values.display(value))?,
                    Ok(None) => writeln!(self.output, "Reached end of function")?,
                    Err(e) => self.error(e)?,
                }
            }
            Command::PrintMemory => write!(self.output, "{}", interp.render_memory())?,
            Command::Verbose { function, formats } => {
                interp.set_verbose(&function, formats);
                writeln!(self.output, "Verbose calls to {}", function)?;
            }
            Command::Continue if suspended => return Ok(Flow::Resume),
            Command::Abort if suspended => return Ok(Flow::Abort),
            Command::Continue | Command::Abort => writeln!(self.output, "Not suspended")?,
            Command::Help => writeln!(self.output, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        self.flush_console(interp)?;
        Ok(Flow::Continue)
    }

    /// Evaluate `args` as expressions and invoke `function` with them
    fn invoke(&mut self, interp: &mut Interpreter, function: &str, args: &[String]) -> io::Result<()> {
        let mut values: Vec<ValueId> = Vec::with_capacity(args.len());
        for arg in args {
            match interp.evaluate(arg, &mut RunToCompletion) {
                Ok(evaluation) => values.push(evaluation.value),
                Err(e) => return self.error(e),
            }
        }
        let result = interp.invoke(function, &values, self);
        self.flush_console(interp)?;
        match result {
            Ok(value) => writeln!(self.output, "{} returned {}", function, interp.trace.values.display(value)),
            Err(e) => self.error(e),
        }
    }

    fn flush_console(&mut self, interp: &mut Interpreter) -> io::Result<()> {
        for line in interp.console.drain() {
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }

    fn error(&mut self, message: impl Display) -> io::Result<()> {
        let text = format!("error: {}", message);
        if self.color {
            writeln!(self.output, "{}", text.with(ERROR))
        } else {
            writeln!(self.output, "{}", text)
        }
    }

    fn banner(&mut self, interp: &Interpreter, line: usize) -> io::Result<()> {
        let source = interp
            .unit()
            .source
            .lines()
            .nth(line.saturating_sub(1))
            .map(str::trim)
            .unwrap_or("");
        let text = format!("ssi :: On line {}: {}", line, source);
        if self.color {
            writeln!(self.output, "{}", text.with(BANNER).bold())
        } else {
            writeln!(self.output, "{}", text)
        }
    }

    /// Command loop while suspended at `line`
    fn suspended(&mut self, interp: &mut Interpreter, line: usize) -> io::Result<BreakAction> {
        self.flush_console(interp)?;
        self.banner(interp, line)?;
        loop {
            let Some(input) = self.read_command()? else {
                return Ok(BreakAction::Abort);
            };
            match self.execute(interp, &input)? {
                Flow::Continue => {}
                Flow::Resume => return Ok(BreakAction::Resume),
                Flow::Abort => return Ok(BreakAction::Abort),
                Flow::Quit => {
                    self.quit = true;
                    return Ok(BreakAction::Abort);
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> Debugger for Shell<R, W> {
    fn on_breakpoint(&mut self, interp: &mut Interpreter, line: usize) -> BreakAction {
        if self.quit {
            return BreakAction::Abort;
        }
        self.suspended(interp, line).unwrap_or_else(|e| {
            warn!(line, error = %e, "shell i/o failed at a breakpoint; aborting");
            BreakAction::Abort
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn session(source: &str, input: &str) -> String {
        let config = SessionConfig::default().with_color(false);
        let mut interp = Interpreter::new(source, config.clone()).unwrap();
        let mut shell = Shell::new(Cursor::new(input.to_string()), Vec::new(), &config);
        interp.run_globals(&mut shell).unwrap();
        shell.run(&mut interp).unwrap();
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[test]
    fn test_breakpoint_listing_and_clearing() {
        let out = session("int main() { return 0; }", "b 3\nb 1\nb 3\nb\nd 3\nd 3\n");
        assert!(out.contains("Breakpoint set at line 3"));
        assert!(out.contains("Breakpoint already set at line 3"));
        assert!(out.contains("Breakpoints: 1, 3"));
        assert!(out.contains("Breakpoint cleared at line 3"));
        assert!(out.contains("No breakpoint at line 3"));
    }

    #[test]
    fn test_resume_outside_a_suspension() {
        let out = session("int main() { return 0; }", "c\nabort\n");
        assert_eq!(out.matches("Not suspended").count(), 2);
    }

    #[test]
    fn test_unknown_command() {
        let out = session("int main() { return 0; }", "frobnicate now\n");
        assert!(out.contains("error: Unknown command 'frobnicate now'"));
    }

    #[test]
    fn test_each_run_starts_without_breakpoints_or_verbose() {
        let config = SessionConfig::default().with_color(false);
        let source = "int main()\n{\n  log_val(1);\n  return 0;\n}\n";
        let mut interp = Interpreter::new(source, config.clone()).unwrap();
        interp.run_globals(&mut RunToCompletion).unwrap();

        let mut first = Shell::new(Cursor::new("b 3\nverbose log_val\n".to_string()), Vec::new(), &config);
        first.run(&mut interp).unwrap();
        assert_eq!(interp.breakpoints().sorted(), vec![3]);

        let mut second = Shell::new(Cursor::new("b\nmain\n".to_string()), Vec::new(), &config);
        second.run(&mut interp).unwrap();
        let out = String::from_utf8(second.into_output()).unwrap();

        assert!(out.contains("No breakpoints"));
        assert!(!out.contains("ssi :: On line"));
        assert!(!out.contains("Line 3:"));
        assert!(out.contains("main returned 0"));
    }

    #[test]
    fn test_quit_stops_reading() {
        let out = session("int main() { return 0; }", "q\nb 4\n");
        assert!(!out.contains("Breakpoint set"));
    }
}
