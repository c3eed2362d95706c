// Captured interpreter output

/// Output produced by interpreted code (verbose call lines, native prints),
/// kept with the source line that produced it until the shell drains it
#[derive(Debug, Clone, Default)]
pub struct Console {
    pub lines: Vec<ConsoleLine>,
}

/// A chunk of output with the source line that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub text: String,
    pub line: usize,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print without newline
    pub fn print(&mut self, text: impl Into<String>, line: usize) {
        let text = text.into();
        if let Some(last) = self.lines.last_mut() {
            if last.line == line && !last.text.ends_with('\n') {
                last.text.push_str(&text);
                return;
            }
        }
        self.lines.push(ConsoleLine { text, line });
    }

    pub fn println(&mut self, text: impl Into<String>, line: usize) {
        let mut text = text.into();
        text.push('\n');
        self.print(text, line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All output as lines of text
    pub fn output(&self) -> Vec<String> {
        self.lines
            .iter()
            .flat_map(|chunk| {
                // a chunk may hold several lines printed from one source line
                let mut result: Vec<String> = chunk.text.split('\n').map(|s| s.to_string()).collect();
                if result.last().is_some_and(|s| s.is_empty()) {
                    result.pop();
                }
                result
            })
            .collect()
    }

    /// Take all output, leaving the console empty
    pub fn drain(&mut self) -> Vec<String> {
        let output = self.output();
        self.lines.clear();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prints_from_one_line_are_merged() {
        let mut console = Console::new();
        console.print("a", 3);
        console.print("b\n", 3);
        console.print("c", 3);
        console.println("d", 4);

        assert_eq!(console.output(), vec!["ab", "c", "d"]);
        assert_eq!(console.lines.len(), 3);
    }

    #[test]
    fn test_drain_empties() {
        let mut console = Console::new();
        console.println("Line 2: f ( x ) => 8", 2);
        assert_eq!(console.drain(), vec!["Line 2: f ( x ) => 8"]);
        assert!(console.is_empty());
    }
}
