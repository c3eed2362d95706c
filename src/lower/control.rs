//! Rewrite rules that remove structured control flow
//!
//! Each rule turns one construct into labels, `goto`, `goto_ite` and plain
//! statements. The output may still contain structured code (a `while`
//! becomes an `if`), which is lowered again when the statement loop reaches
//! it.

use crate::parser::ast::ParseNode;
use crate::parser::lexer::{LexError, Token};
use crate::rewrite::{Pattern, Rewrite, Template};

const WHILE: (&str, &str) = (
    "while ( ... ) ...",
    "[lchk]: if ({0}) { {1} goto [lchk]; } [lend]: ;",
);

const FOR: (&str, &str) = (
    "for ( ... ; ... ; ... ) ...",
    "{0}; goto [lchk]; [lupd]: {2}; [lchk]: goto_ite ({1}) [lloop] [lend]; \
     [lloop]: {3} goto [lupd]; [lend]: ;",
);

const DO_WHILE: (&str, &str) = (
    "do ... while ( ... ) ;",
    "[lbody]: {0} [lchk]: goto_ite ({1}) [lbody] [lend]; [lend]: ;",
);

const IF_ELSE: (&str, &str) = (
    "if ( ... ) ... else ...",
    "goto_ite ({0}) [lif] [lelse]; [lif]: {1} goto [lend]; [lelse]: {2} [lend]: ;",
);

const IF: (&str, &str) = (
    "if ( ... ) ...",
    "goto_ite ({0}) [lif] [lend]; [lif]: {1} [lend]: ;",
);

// Branch on a short-circuit condition; holes past the operands are the
// statement's own then/else labels.
const AND_BRANCH: (&str, &str) = (
    "... && ...",
    "goto_ite ({0}) [lmid] {3}; [lmid]: goto_ite ({1}) {2} {3};",
);

const OR_BRANCH: (&str, &str) = (
    "... || ...",
    "goto_ite ({0}) {2} [lmid]; [lmid]: goto_ite ({1}) {2} {3};",
);

const TERNARY_BRANCH: (&str, &str) = (
    "... ? ... : ...",
    "goto_ite ({0}) [lt] [lf]; [lt]: goto_ite ({1}) {3} {4}; [lf]: goto_ite ({2}) {3} {4};",
);

// Assignment of a short-circuit expression to a temporary; hole 0 is the
// temporary, the rest are the operands.
const AND_ASSIGN: (&str, &str) = (
    "... && ...",
    "{0} = 0; goto_ite ({1}) [lrhs] [lend]; [lrhs]: {0} = (({2}) != 0); [lend]: ;",
);

const OR_ASSIGN: (&str, &str) = (
    "... || ...",
    "{0} = 1; goto_ite ({1}) [lend] [lrhs]; [lrhs]: {0} = (({2}) != 0); [lend]: ;",
);

const TERNARY_ASSIGN: (&str, &str) = (
    "... ? ... : ...",
    "goto_ite ({1}) [lt] [lf]; [lt]: {0} = ({2}); goto [lend]; [lf]: {0} = ({3}); [lend]: ;",
);

const COMPOUND_OPS: &[&str] = &["*=", "/=", "%=", "+=", "-=", "<<=", ">>=", "&=", "^=", "|="];

/// Which short-circuit construct a node is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    And,
    Or,
    Ternary,
}

impl ShortCircuit {
    pub fn of(node: &ParseNode, tokens: &[Token]) -> Option<Self> {
        if node.is_form("Ternary") {
            return Some(ShortCircuit::Ternary);
        }
        if !node.is_form("Binary") {
            return None;
        }
        match node.children().get(1) {
            Some(ParseNode::Terminal(i)) if tokens[*i].is("&&") => Some(ShortCircuit::And),
            Some(ParseNode::Terminal(i)) if tokens[*i].is("||") => Some(ShortCircuit::Or),
            _ => None,
        }
    }
}

/// All rules, parsed once per lowering run
#[derive(Debug, Clone)]
pub struct ControlRules {
    pub while_loop: Rewrite,
    pub for_loop: Rewrite,
    pub do_while: Rewrite,
    pub if_else: Rewrite,
    pub if_then: Rewrite,
    pub switch: Rewrite,
    pub switch_case: Template,
    pub switch_dispatch: Template,
    pub case_label: Template,
    pub hoist: Template,
    pub assign: Pattern,
    pub compound: Vec<(&'static str, Rewrite)>,
    and_branch: Rewrite,
    or_branch: Rewrite,
    ternary_branch: Rewrite,
    and_assign: Rewrite,
    or_assign: Rewrite,
    ternary_assign: Rewrite,
}

fn rule((pattern, template): (&str, &str)) -> Result<Rewrite, LexError> {
    Rewrite::new(pattern, template)
}

impl ControlRules {
    pub fn new() -> Result<Self, LexError> {
        let compound = COMPOUND_OPS
            .iter()
            .map(|op| {
                let binary = &op[..op.len() - 1];
                let rewrite = Rewrite::new(
                    &format!("... {} ...", op),
                    &format!("({{0}}) = (({{0}}) {} ({{1}}))", binary),
                )?;
                Ok((*op, rewrite))
            })
            .collect::<Result<Vec<_>, LexError>>()?;
        Ok(Self {
            while_loop: rule(WHILE)?,
            for_loop: rule(FOR)?,
            do_while: rule(DO_WHILE)?,
            if_else: rule(IF_ELSE)?,
            if_then: rule(IF)?,
            switch: Rewrite::new("switch ( ... ) ...", "[val] = ({0});")?,
            switch_case: Template::parse("goto_ite ([val] == ({0})) [hit] [next]; [next]:")?,
            switch_dispatch: Template::parse("goto [target]; {0} [lend]: ;")?,
            case_label: Template::parse("[hit]:")?,
            hoist: Template::parse("[tmp] = ({1}); {0} [tmp] {2}")?,
            assign: Pattern::parse("... = ...")?,
            compound,
            and_branch: rule(AND_BRANCH)?,
            or_branch: rule(OR_BRANCH)?,
            ternary_branch: rule(TERNARY_BRANCH)?,
            and_assign: rule(AND_ASSIGN)?,
            or_assign: rule(OR_ASSIGN)?,
            ternary_assign: rule(TERNARY_ASSIGN)?,
        })
    }

    pub fn branch(&self, kind: ShortCircuit) -> &Rewrite {
        match kind {
            ShortCircuit::And => &self.and_branch,
            ShortCircuit::Or => &self.or_branch,
            ShortCircuit::Ternary => &self.ternary_branch,
        }
    }

    pub fn assign_to_temp(&self, kind: ShortCircuit) -> &Rewrite {
        match kind {
            ShortCircuit::And => &self.and_assign,
            ShortCircuit::Or => &self.or_assign,
            ShortCircuit::Ternary => &self.ternary_assign,
        }
    }

    pub fn compound(&self, op: &str) -> Option<&Rewrite> {
        self.compound
            .iter()
            .find(|(symbol, _)| *symbol == op)
            .map(|(_, rewrite)| rewrite)
    }
}
