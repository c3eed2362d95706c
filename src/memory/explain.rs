//! On-demand explanations of values
//!
//! Nothing here is computed while the program runs. Each value only keeps
//! its direct producer (text, line, operand values); an [`Explanation`]
//! walks those links backwards when it is displayed. Operands are always
//! created before the value computed from them, so the walk terminates.

use super::value::{Datum, Opacity, ValueId, ValueStore};
use std::fmt;
use std::rc::Rc;

const INDENT: &str = "|   ";

/// Lazily rendered provenance tree of one value
pub struct Explanation<'a> {
    values: &'a ValueStore,
    root: ValueId,
}

impl<'a> Explanation<'a> {
    pub fn new(values: &'a ValueStore, root: ValueId) -> Self {
        Self { values, root }
    }

    fn write_node(&self, f: &mut fmt::Formatter<'_>, id: ValueId, depth: usize) -> fmt::Result {
        let value = self.values.get(id);
        writeln!(f, "{}Value: {}", INDENT.repeat(depth), self.values.display(id))?;
        writeln!(
            f,
            "{}Explanation: {} on line {}",
            INDENT.repeat(depth + 1),
            value.provenance.text,
            value.provenance.line
        )?;
        for operand in &value.provenance.operands {
            self.write_node(f, *operand, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.root, 0)
    }
}

/// Text and line of the first fresh opaque value `id` depends on
pub fn opaque_reason(values: &ValueStore, id: ValueId) -> Option<(Rc<str>, usize)> {
    match values.datum(id) {
        Datum::Concrete(_) => None,
        Datum::Opaque(Opacity::Fresh(_)) => {
            let provenance = &values.get(id).provenance;
            Some((provenance.text.clone(), provenance.line))
        }
        Datum::Opaque(_) => values
            .get(id)
            .provenance
            .operands
            .iter()
            .find_map(|operand| opaque_reason(values, *operand)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::value::Provenance;
    use crate::parser::ast::BinOp;

    #[test]
    fn test_two_level_explanation() {
        let mut values = ValueStore::new();
        let five = values.int(5, Provenance::new("5", 2));
        let three = values.int(3, Provenance::new("3", 3));
        let sum = values.int(8, Provenance::new("( x ) + ( 3 )", 3).with_operands(vec![five, three]));

        let text = Explanation::new(&values, sum).to_string();

        assert_eq!(
            text,
            "Value: 8\n\
             |   Explanation: ( x ) + ( 3 ) on line 3\n\
             |   Value: 5\n\
             |   |   Explanation: 5 on line 2\n\
             |   Value: 3\n\
             |   |   Explanation: 3 on line 3\n"
        );
    }

    #[test]
    fn test_opaque_reason_finds_the_unknown_leaf() {
        let mut values = ValueStore::new();
        let known = values.int(1, Provenance::new("1", 4));
        let unknown = values.opaque(Provenance::new("readl ( base )", 7));
        let sum = values.derived(
            Opacity::Derived {
                op: BinOp::Add,
                lhs: known,
                rhs: unknown,
            },
            Provenance::new("1 + readl ( base )", 8).with_operands(vec![known, unknown]),
        );

        assert_eq!(opaque_reason(&values, sum), Some(("readl ( base )".into(), 7)));
        assert_eq!(opaque_reason(&values, known), None);
    }
}
