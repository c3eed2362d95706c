//! Shell command parsing

use crate::interpreter::ArgFormat;

/// One line of shell input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    /// `call FN ARGS...`
    Call { function: String, args: Vec<String> },
    /// Any other word: a registered action or a function of the unit
    Word { word: String, args: Vec<String> },
    /// `b` lists breakpoints, `b LINE` sets one
    Break(Option<usize>),
    /// `d LINE`
    Delete(usize),
    /// `xc EXPR`
    Explain(String),
    /// `why EXPR`
    Why(String),
    /// `xl LINE`
    ExecuteLine(usize),
    /// `pm`
    PrintMemory,
    /// `verbose FN FMT...`
    Verbose { function: String, formats: Vec<ArgFormat> },
    Continue,
    Abort,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  probe | FN [ARGS...]   run a function of the loaded file
  call FN [ARGS...]      run FN with the given argument expressions
  b [LINE]               set a breakpoint, or list them
  d LINE                 clear a breakpoint
  xc EXPR                evaluate EXPR and explain its value
  why EXPR               show the unknown input EXPR depends on
  xl LINE                execute from LINE
  pm                     print memory
  verbose FN [d|x...]    print the arguments of every call to FN
  c                      resume from a breakpoint
  abort                  abandon the suspended execution
  q                      quit";

impl Command {
    /// Parse one line. Errors are messages for the user.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args = || rest.split_whitespace().map(str::to_string).collect::<Vec<_>>();

        Ok(match word {
            "" => Command::Empty,
            "call" => {
                let mut args = args();
                if args.is_empty() {
                    return Err("usage: call FN [ARGS...]".to_string());
                }
                let function = args.remove(0);
                Command::Call { function, args }
            }
            "b" | "break" if rest.is_empty() => Command::Break(None),
            "b" | "break" => Command::Break(Some(line_number(rest)?)),
            "d" | "delete" => Command::Delete(line_number(rest)?),
            "xc" => Command::Explain(expression(rest, "xc")?),
            "why" => Command::Why(expression(rest, "why")?),
            "xl" => Command::ExecuteLine(line_number(rest)?),
            "pm" => Command::PrintMemory,
            "verbose" => {
                let mut args = args();
                if args.is_empty() {
                    return Err("usage: verbose FN [d|x...]".to_string());
                }
                let function = args.remove(0);
                let formats = args
                    .iter()
                    .map(|spec| ArgFormat::parse(spec).ok_or_else(|| format!("unknown format '{}' (use d or x)", spec)))
                    .collect::<Result<Vec<_>, _>>()?;
                Command::Verbose { function, formats }
            }
            "c" | "continue" => Command::Continue,
            "abort" => Command::Abort,
            "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            _ => Command::Word {
                word: word.to_string(),
                args: args(),
            },
        })
    }
}

fn line_number(text: &str) -> Result<usize, String> {
    text.parse::<usize>()
        .ok()
        .filter(|line| *line > 0)
        .ok_or_else(|| format!("expected a line number, got '{}'", text))
}

fn expression(text: &str, command: &str) -> Result<String, String> {
    if text.is_empty() {
        return Err(format!("usage: {} EXPR", command));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoint_commands() {
        assert_eq!(Command::parse("b 12"), Ok(Command::Break(Some(12))));
        assert_eq!(Command::parse("  b  "), Ok(Command::Break(None)));
        assert_eq!(Command::parse("d 3"), Ok(Command::Delete(3)));
        assert!(Command::parse("b twelve").is_err());
        assert!(Command::parse("xl 0").is_err());
    }

    #[test]
    fn test_expressions_keep_their_spaces() {
        assert_eq!(Command::parse("xc a [ 1 ] + b"), Ok(Command::Explain("a [ 1 ] + b".to_string())));
        assert!(Command::parse("why").is_err());
    }

    #[test]
    fn test_verbose_formats() {
        assert_eq!(
            Command::parse("verbose write_reg d x"),
            Ok(Command::Verbose {
                function: "write_reg".to_string(),
                formats: vec![ArgFormat::Decimal, ArgFormat::Hex],
            })
        );
        assert!(Command::parse("verbose write_reg q").is_err());
    }

    #[test]
    fn test_other_words_are_invocations() {
        assert_eq!(
            Command::parse("enable-irq 5"),
            Ok(Command::Word {
                word: "enable-irq".to_string(),
                args: vec!["5".to_string()],
            })
        );
        assert_eq!(
            Command::parse("call f 1 x+1"),
            Ok(Command::Call {
                function: "f".to_string(),
                args: vec!["1".to_string(), "x+1".to_string()],
            })
        );
        assert_eq!(Command::parse(""), Ok(Command::Empty));
    }
}
