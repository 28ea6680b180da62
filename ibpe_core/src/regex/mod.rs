//! Regex front-end: parse → lower → compile.
//!
//! - **cst** — concrete syntax tree and parser
//! - **ast** — byte-level AST, lowering, UTF-8 range expansion
//! - **dfa** — followpos construction and the byte-range DFA

pub mod ast;
pub mod cst;
pub mod dfa;

pub use dfa::{Dfa, StateId, Transition};

use crate::error::Result;

/// Compile a regex pattern all the way to a byte-level DFA.
pub fn compile(pattern: &str) -> Result<Dfa> {
    let cst = cst::parse(pattern)?;
    let ast = ast::lower(&cst)?;
    dfa::build(&ast)
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Naive AST interpreter used as the matching oracle in tests.

    use std::collections::BTreeSet;

    use super::ast::Ast;

    /// All offsets at which `ast` can stop matching, starting from `start`.
    fn match_ends(ast: &Ast, input: &[u8], start: usize) -> BTreeSet<usize> {
        match ast {
            Ast::Empty { .. } => BTreeSet::from([start]),
            Ast::Range { lo, hi } => {
                if start < input.len() && (*lo..=*hi).contains(&input[start]) {
                    BTreeSet::from([start + 1])
                } else {
                    BTreeSet::new()
                }
            }
            Ast::Union(args) => args
                .iter()
                .flat_map(|arg| match_ends(arg, input, start))
                .collect(),
            Ast::Concat(args) => {
                let mut ends = BTreeSet::from([start]);
                for arg in args {
                    ends = ends
                        .iter()
                        .flat_map(|&e| match_ends(arg, input, e))
                        .collect();
                    if ends.is_empty() {
                        break;
                    }
                }
                ends
            }
            Ast::Star(arg) => {
                let mut ends = BTreeSet::from([start]);
                loop {
                    let next: BTreeSet<usize> = ends
                        .iter()
                        .flat_map(|&e| match_ends(arg, input, e))
                        .filter(|e| !ends.contains(e))
                        .collect();
                    if next.is_empty() {
                        return ends;
                    }
                    ends.extend(next);
                }
            }
        }
    }

    /// Whether `ast` matches the entire input.
    pub(crate) fn ast_matches(ast: &Ast, input: &[u8]) -> bool {
        match_ends(ast, input, 0).contains(&input.len())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn interpreter_basics() {
            let ast = Ast::Concat(vec![
                Ast::Range { lo: b'a', hi: b'a' },
                Ast::Star(Box::new(Ast::Range { lo: b'b', hi: b'b' })),
            ]);
            assert!(ast_matches(&ast, b"a"));
            assert!(ast_matches(&ast, b"abbb"));
            assert!(!ast_matches(&ast, b"b"));
        }
    }
}
