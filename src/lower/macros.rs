//! `#define` handling
//!
//! Object-like and function-like macros are expanded with the same template
//! machinery the lowering rules use: parameters become holes, `#param`
//! becomes a stringified hole, `##` pastes its neighbours. A macro is
//! visible from its definition on and can be dropped with `#undef`. Every
//! other directive (`#include`, conditionals, pragmas) is discarded.

use crate::error::LoadError;
use crate::parser::ast::SourceLocation;
use crate::parser::lexer::{tokenize, Token, TokenKind};
use crate::parser::peg::find_balance;
use crate::rewrite::{LabelMap, Origin, Template, TemplatePart};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Macro {
    pub name: Rc<str>,
    /// `None` for object-like macros
    pub params: Option<Vec<Rc<str>>>,
    pub variadic: bool,
    body: Template,
}

#[derive(Debug, Default)]
pub struct MacroTable {
    macros: FxHashMap<Rc<str>, Macro>,
}

/// Apply every directive in `tokens` and expand macro uses
pub fn expand_macros(tokens: Vec<Token>, source: &str) -> Result<Vec<Token>, LoadError> {
    let mut table = MacroTable::default();
    let mut out = Vec::with_capacity(tokens.len());
    let mut segment = Vec::new();
    for token in tokens {
        if token.kind == TokenKind::Preproc {
            out.extend(table.expand(std::mem::take(&mut segment), source)?);
            table.directive(&token)?;
        } else {
            segment.push(token);
        }
    }
    out.extend(table.expand(segment, source)?);
    Ok(out)
}

impl MacroTable {
    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Apply one preprocessor line
    pub fn directive(&mut self, token: &Token) -> Result<(), LoadError> {
        let text = token.text.trim_start_matches('#').trim_start();
        let (word, rest) = text
            .split_once(|c: char| c.is_whitespace())
            .unwrap_or((text, ""));
        match word {
            "define" => {
                let definition = parse_define(rest, token.location)?;
                debug!(name = &*definition.name, line = token.line(), "defined macro");
                self.macros.insert(definition.name.clone(), definition);
            }
            "undef" => {
                self.macros.remove(rest.trim());
            }
            other => trace!(directive = other, line = token.line(), "ignoring directive"),
        }
        Ok(())
    }

    pub fn expand(&self, tokens: Vec<Token>, source: &str) -> Result<Vec<Token>, LoadError> {
        self.expand_with(tokens, source, &mut Vec::new())
    }

    /// Expand `tokens`; macros in `active` are being expanded already and
    /// are left alone, which stops self-reference
    fn expand_with(&self, tokens: Vec<Token>, source: &str, active: &mut Vec<Rc<str>>) -> Result<Vec<Token>, LoadError> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            let found = (token.kind == TokenKind::Ident)
                .then(|| self.macros.get(&token.text))
                .flatten()
                .filter(|m| !active.contains(&m.name));
            let Some(definition) = found else {
                out.push(token.clone());
                i += 1;
                continue;
            };
            let Some((replacement, consumed)) = definition.invoke(&tokens, i, source)? else {
                out.push(token.clone());
                i += 1;
                continue;
            };
            active.push(definition.name.clone());
            let expanded = self.expand_with(replacement, source, active);
            active.pop();
            out.extend(expanded?);
            i += consumed;
        }
        Ok(out)
    }
}

impl Macro {
    /// Replacement for a use at `tokens[at]` and how many tokens it replaces.
    /// A function-like macro named without an argument list is not a use.
    fn invoke(&self, tokens: &[Token], at: usize, source: &str) -> Result<Option<(Vec<Token>, usize)>, LoadError> {
        let Some(params) = &self.params else {
            let origin = Origin::of(tokens, at..at + 1);
            let out = self.body.instantiate(&[], &LabelMap::default(), &origin, source)?;
            return Ok(Some((paste(out), 1)));
        };
        if !tokens.get(at + 1).is_some_and(|t| t.is("(")) {
            return Ok(None);
        }
        let Some(close) = find_balance(tokens, at + 1, "(", ")") else {
            return Ok(None);
        };
        let mut args: Vec<Vec<Token>> = split_arguments(&tokens[at + 2..close]);
        if self.variadic && args.len() > params.len() {
            let rest = args.split_off(params.len());
            let mut joined = Vec::new();
            for (n, arg) in rest.into_iter().enumerate() {
                if n > 0 {
                    let at = &tokens[close];
                    let mut comma = Token::new(TokenKind::Punct, ",", at.location, at.span);
                    comma.synthetic = true;
                    joined.push(comma);
                }
                joined.extend(arg);
            }
            args.push(joined);
        }
        if params.is_empty() && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }
        let origin = Origin::of(tokens, at..close + 1);
        let out = self.body.instantiate(&args, &LabelMap::default(), &origin, source)?;
        Ok(Some((paste(out), close + 1 - at)))
    }
}

/// Parse the text after `#define`
fn parse_define(text: &str, location: SourceLocation) -> Result<Macro, LoadError> {
    let tokens = tokenize(text).map_err(|e| LoadError::Structure {
        message: format!("bad macro definition ({})", e),
        location,
    })?;
    let Some(name) = tokens.first().filter(|t| t.kind == TokenKind::Ident) else {
        return Err(LoadError::Structure {
            message: "macro definition without a name".to_string(),
            location,
        });
    };
    let function_like = tokens
        .get(1)
        .is_some_and(|t| t.is("(") && t.span.start == name.span.end);

    let (params, variadic, body_start) = if function_like {
        let close = find_balance(&tokens, 1, "(", ")").ok_or_else(|| LoadError::Structure {
            message: format!("unterminated parameter list of macro '{}'", name.text),
            location,
        })?;
        let mut params = Vec::new();
        let mut variadic = false;
        for param in tokens[2..close].iter().filter(|t| !t.is(",")) {
            if param.is("...") {
                variadic = true;
            } else {
                params.push(param.text.clone());
            }
        }
        (Some(params), variadic, close + 1)
    } else {
        (None, false, 1)
    };

    let hole_of = |token: &Token| -> Option<usize> {
        let params = params.as_ref()?;
        if variadic && token.is("__VA_ARGS__") {
            return Some(params.len());
        }
        params.iter().position(|p| token.is(p))
    };
    let mut parts = Vec::new();
    let mut text_run = Vec::new();
    let body = &tokens[body_start..];
    let mut i = 0;
    while i < body.len() {
        let stringified = body[i]
            .is("#")
            .then(|| body.get(i + 1).and_then(|next| hole_of(next)))
            .flatten();
        if let Some(index) = stringified {
            flush(&mut text_run, &mut parts);
            parts.push(TemplatePart::Stringify(index));
            i += 2;
        } else if let Some(index) = hole_of(&body[i]) {
            flush(&mut text_run, &mut parts);
            parts.push(TemplatePart::Hole(index));
            i += 1;
        } else {
            text_run.push(body[i].clone());
            i += 1;
        }
    }
    flush(&mut text_run, &mut parts);

    Ok(Macro {
        name: name.text.clone(),
        params,
        variadic,
        body: Template::from_parts(parts, text),
    })
}

fn flush(run: &mut Vec<Token>, parts: &mut Vec<TemplatePart>) {
    if !run.is_empty() {
        parts.push(TemplatePart::Text(std::mem::take(run)));
    }
}

fn split_arguments(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut args = vec![Vec::new()];
    let mut depth = 0i32;
    for token in tokens {
        if token.kind == TokenKind::Punct {
            match &*token.text {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                "," if depth == 0 => {
                    args.push(Vec::new());
                    continue;
                }
                _ => {}
            }
        }
        if let Some(current) = args.last_mut() {
            current.push(token.clone());
        }
    }
    args
}

/// Join the tokens around each `##`
fn paste(tokens: Vec<Token>) -> Vec<Token> {
    if !tokens.iter().any(|t| t.is("##")) {
        return tokens;
    }
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if !token.is("##") {
            out.push(token);
            continue;
        }
        let (Some(left), Some(right)) = (out.pop(), iter.next()) else {
            continue;
        };
        let text = format!("{}{}", left.text, right.text);
        let kind = if left.kind == TokenKind::Number {
            TokenKind::Number
        } else {
            TokenKind::Ident
        };
        let mut joined = Token::new(kind, text, left.location, left.span.cover(right.span));
        joined.synthetic = true;
        out.push(joined);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::join_text;

    fn expand(source: &str) -> String {
        let tokens = tokenize(source).unwrap();
        join_text(&expand_macros(tokens, source).unwrap())
    }

    #[test]
    fn test_object_like_macro() {
        assert_eq!(expand("#define N 10\nint a[N];"), "int a [ 10 ] ;");
    }

    #[test]
    fn test_function_like_macro_with_nested_use() {
        let source = "#define SQ(x) ((x) * (x))\n#define TWICE(y) (SQ(y) + SQ(y))\nr = TWICE(a + 1);";
        assert_eq!(
            expand(source),
            "r = ( ( ( a + 1 ) * ( a + 1 ) ) + ( ( a + 1 ) * ( a + 1 ) ) ) ;"
        );
    }

    #[test]
    fn test_stringify_paste_and_variadic() {
        let source = "#define SHOW(e) puts(#e)\n#define VAR(n) var_ ## n\n#define LOG(f, ...) printf(f, __VA_ARGS__)\n\
                      SHOW(a+b); VAR(2) = 1; LOG(\"%d %d\", x, y);";
        assert_eq!(
            expand(source),
            "puts ( \"a+b\" ) ; var_2 = 1 ; printf ( \"%d %d\" , x , y ) ;"
        );
    }

    #[test]
    fn test_function_like_name_without_call_is_left_alone() {
        assert_eq!(expand("#define F(x) x\nint F;"), "int F ;");
    }

    #[test]
    fn test_undef_and_other_directives() {
        let source = "#include <stdio.h>\n#define A 1\nx = A;\n#undef A\ny = A;";
        assert_eq!(expand(source), "x = 1 ; y = A ;");
    }

    #[test]
    fn test_self_reference_stops() {
        assert_eq!(expand("#define loop loop + 1\nx = loop;"), "x = loop + 1 ;");
    }

    #[test]
    fn test_expansion_takes_use_site_line() {
        let source = "#define ONE 1\n\n\nx = ONE;";
        let tokens = expand_macros(tokenize(source).unwrap(), source).unwrap();
        assert_eq!(tokens[2].text.as_ref(), "1");
        assert_eq!(tokens[2].location.line, 4);
    }
}
