//! Ordered grammar validation.
//!
//! Any violation aborts grammar construction with a
//! [`GrammarError`] naming the offending symbol(s); parsing-table
//! construction never sees an invalid grammar.

use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};

use crate::config::MAX_PRODUCTIONS;
use crate::error::GrammarError;
use crate::grammar::{GrammarSets, NonTerm, Production, Symbol, AUGMENTED_PRODUCTION};
use crate::lexer::TokenKind;

/// Validate a grammar description.
///
/// Checks run in a fixed order: production-count bounds, start-symbol
/// membership, terminal/non-terminal name disjointness, per-production
/// right-hand-side symbol membership, duplicate productions, reachability
/// from the start symbol, completeness (every non-terminal defined), and
/// absence of left recursion, direct or through a nullable prefix.
///
/// `names` includes the synthesized augmented symbol as its last entry;
/// `productions[0]` is the augmented production and is exempt from the
/// user-facing checks.
///
/// # Errors
///
/// The first violated check, as a [`GrammarError`].
pub fn validate_grammar(
    names: &[CompactString],
    start: NonTerm,
    productions: &[Production],
    sets: &GrammarSets,
) -> Result<(), GrammarError> {
    let user_productions = &productions[AUGMENTED_PRODUCTION + 1..];
    let user_non_terminals = names.len().saturating_sub(1);

    // 1. Production-count bounds.
    if user_productions.is_empty() {
        return Err(GrammarError::Empty);
    }
    if user_productions.len() > MAX_PRODUCTIONS {
        return Err(GrammarError::TooManyProductions {
            count: user_productions.len(),
            limit: MAX_PRODUCTIONS,
        });
    }

    // 2. Start-symbol membership.
    if start.index() >= user_non_terminals {
        return Err(GrammarError::UnknownStartSymbol {
            name: format!("non-terminal #{}", start.index()),
        });
    }

    // 3. Terminal/non-terminal name disjointness.
    for name in &names[..user_non_terminals] {
        let clashes = TokenKind::ALL
            .iter()
            .any(|kind| kind.describe().trim_matches('\'') == name.as_str());
        if clashes {
            return Err(GrammarError::SymbolClash {
                name: name.to_string(),
            });
        }
    }

    // 4. Right-hand-side symbol membership.
    for production in user_productions {
        for symbol in &production.rhs {
            if let Symbol::Rule(nt) = symbol {
                if nt.index() >= names.len() {
                    return Err(GrammarError::UndefinedSymbol {
                        name: format!("non-terminal #{}", nt.index()),
                    });
                }
            }
        }
    }

    // 5. Duplicate productions.
    let mut seen: HashMap<(NonTerm, &[Symbol]), usize> = HashMap::new();
    for production in user_productions {
        if let Some(first) = seen.insert((production.lhs, production.rhs.as_slice()), production.id)
        {
            return Err(GrammarError::DuplicateProduction {
                first,
                second: production.id,
                symbol: names[production.lhs.index()].to_string(),
            });
        }
    }

    // 6. Reachability from the start symbol.
    let mut reachable = HashSet::new();
    reachable.insert(start);
    let mut worklist = vec![start];
    while let Some(current) = worklist.pop() {
        for production in user_productions.iter().filter(|p| p.lhs == current) {
            for symbol in &production.rhs {
                if let Symbol::Rule(nt) = symbol {
                    if reachable.insert(*nt) {
                        worklist.push(*nt);
                    }
                }
            }
        }
    }
    for index in 0..user_non_terminals {
        let nt = NonTerm(index as u16);
        if !reachable.contains(&nt) {
            return Err(GrammarError::UnreachableSymbol {
                name: names[index].to_string(),
            });
        }
    }

    // 7. Completeness: every non-terminal has at least one production.
    let defined: HashSet<NonTerm> = user_productions.iter().map(|p| p.lhs).collect();
    for index in 0..user_non_terminals {
        let nt = NonTerm(index as u16);
        if !defined.contains(&nt) {
            return Err(GrammarError::UndefinedSymbol {
                name: names[index].to_string(),
            });
        }
    }

    // 8. Left recursion over the leftmost-derivation dependency graph.
    detect_left_recursion(names, user_productions, sets)
}

/// Edges A -> B where B can appear leftmost in a derivation of A: B is
/// preceded in some production of A only by nullable non-terminals.
fn detect_left_recursion(
    names: &[CompactString],
    productions: &[Production],
    sets: &GrammarSets,
) -> Result<(), GrammarError> {
    let mut edges: HashMap<NonTerm, Vec<NonTerm>> = HashMap::new();
    for production in productions {
        for symbol in &production.rhs {
            match symbol {
                Symbol::Term(_) => break,
                Symbol::Rule(nt) => {
                    edges.entry(production.lhs).or_default().push(*nt);
                    if !sets.is_nullable(*nt) {
                        break;
                    }
                }
            }
        }
    }

    // DFS with an explicit path for cycle reporting.
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }
    fn visit(
        node: NonTerm,
        edges: &HashMap<NonTerm, Vec<NonTerm>>,
        marks: &mut HashMap<NonTerm, Mark>,
        path: &mut Vec<NonTerm>,
        names: &[CompactString],
    ) -> Result<(), GrammarError> {
        match marks.get(&node).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let from = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> = path[from..]
                    .iter()
                    .map(|n| names[n.index()].to_string())
                    .collect();
                cycle.push(names[node.index()].to_string());
                return Err(GrammarError::LeftRecursion { cycle });
            }
            Mark::Unvisited => {}
        }
        marks.insert(node, Mark::InProgress);
        path.push(node);
        if let Some(targets) = edges.get(&node) {
            for target in targets {
                visit(*target, edges, marks, path, names)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    for node in edges.keys().copied().collect::<Vec<_>>() {
        visit(node, &edges, &mut marks, &mut path, names)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::grammar::{GrammarBuilder, StackValue};

    fn leaf_builder(
        mut children: Vec<StackValue>,
    ) -> Result<std::sync::Arc<AstNode>, crate::error::FormulaError> {
        match children.pop() {
            Some(StackValue::Node(node)) => Ok(node),
            _ => Ok(AstNode::boolean(true)),
        }
    }

    #[test]
    fn test_empty_grammar_rejected() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        builder.start_symbol(expr);
        assert_eq!(builder.build().unwrap_err(), GrammarError::Empty);
    }

    #[test]
    fn test_undefined_symbol_named() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        let missing = builder.non_terminal("operand");
        builder.start_symbol(expr);
        builder.production(expr, [Symbol::Rule(missing)], leaf_builder);
        assert_eq!(
            builder.build().unwrap_err(),
            GrammarError::UndefinedSymbol {
                name: "operand".to_string()
            }
        );
    }

    #[test]
    fn test_unreachable_symbol_named() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        let orphan = builder.non_terminal("orphan");
        builder.start_symbol(expr);
        builder.production(expr, [Symbol::Term(TokenKind::Number)], leaf_builder);
        builder.production(orphan, [Symbol::Term(TokenKind::Boolean)], leaf_builder);
        assert_eq!(
            builder.build().unwrap_err(),
            GrammarError::UnreachableSymbol {
                name: "orphan".to_string()
            }
        );
    }

    #[test]
    fn test_direct_left_recursion_detected() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        builder.start_symbol(expr);
        builder.production(
            expr,
            [Symbol::Rule(expr), Symbol::Term(TokenKind::Plus)],
            leaf_builder,
        );
        builder.production(expr, [Symbol::Term(TokenKind::Number)], leaf_builder);
        assert!(matches!(
            builder.build().unwrap_err(),
            GrammarError::LeftRecursion { .. }
        ));
    }

    #[test]
    fn test_indirect_left_recursion_detected() {
        let mut builder = GrammarBuilder::new();
        let a = builder.non_terminal("a");
        let b = builder.non_terminal("b");
        builder.start_symbol(a);
        builder.production(a, [Symbol::Rule(b), Symbol::Term(TokenKind::Plus)], leaf_builder);
        builder.production(b, [Symbol::Rule(a), Symbol::Term(TokenKind::Star)], leaf_builder);
        builder.production(b, [Symbol::Term(TokenKind::Number)], leaf_builder);
        let err = builder.build().unwrap_err();
        match err {
            GrammarError::LeftRecursion { cycle } => {
                assert!(cycle.len() >= 2);
            }
            other => panic!("expected left recursion, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_production_detected() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        builder.start_symbol(expr);
        builder.production(expr, [Symbol::Term(TokenKind::Number)], leaf_builder);
        builder.production(expr, [Symbol::Term(TokenKind::Number)], leaf_builder);
        assert!(matches!(
            builder.build().unwrap_err(),
            GrammarError::DuplicateProduction { .. }
        ));
    }

    #[test]
    fn test_terminal_name_clash_detected() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        let clash = builder.non_terminal("number");
        builder.start_symbol(expr);
        builder.production(expr, [Symbol::Rule(clash)], leaf_builder);
        builder.production(clash, [Symbol::Term(TokenKind::Number)], leaf_builder);
        assert_eq!(
            builder.build().unwrap_err(),
            GrammarError::SymbolClash {
                name: "number".to_string()
            }
        );
    }

    #[test]
    fn test_formula_grammar_validates() {
        // The shipped grammar passes its own validation by construction.
        let grammar = crate::grammar::formula_grammar();
        assert!(grammar.productions().len() > 1);
    }
}
