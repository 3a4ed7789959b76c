//! Name analysis for calc cells.

use std::collections::BTreeSet;

use orrery_core::{Analyzer, CellAnalysis, SyntaxError, VariableKind};

use crate::parser::{Program, Statement, parse};

/// [`Analyzer`] for the calc language.
///
/// A name is a reference when it is read before the cell assigns it, so
/// `x = x + 1` both reads and defines `x`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalcAnalyzer;

impl CalcAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for CalcAnalyzer {
    fn analyze(&self, code: &str) -> Result<CellAnalysis, SyntaxError> {
        Ok(analyze_program(&parse(code)?))
    }
}

pub(crate) fn analyze_program(program: &Program) -> CellAnalysis {
    let mut analysis = CellAnalysis::new();
    let mut local: BTreeSet<String> = BTreeSet::new();

    let read = |name: &str, local: &BTreeSet<String>, analysis: &mut CellAnalysis| {
        if !local.contains(name) {
            analysis.refs.insert(name.to_string());
        }
    };

    for line in &program.lines {
        match &line.statement {
            Statement::Assign { name, expr } => {
                for n in expr.names() {
                    read(n, &local, &mut analysis);
                }
                analysis.define(name.clone(), VariableKind::Variable);
                local.insert(name.clone());
            }
            Statement::Delete { name } => {
                if !local.remove(name) {
                    analysis.deleted_refs.insert(name.clone());
                }
            }
            Statement::Print { expr } | Statement::Expr(expr) => {
                for n in expr.names() {
                    read(n, &local, &mut analysis);
                }
            }
            Statement::Raise { .. } | Statement::Stop => {}
            Statement::State { name, expr, .. } => {
                for n in expr.names() {
                    read(n, &local, &mut analysis);
                }
                analysis.define(name.clone(), VariableKind::State);
                local.insert(name.clone());
            }
            Statement::Set { name, expr } => {
                read(name, &local, &mut analysis);
                for n in expr.names() {
                    read(n, &local, &mut analysis);
                }
            }
            Statement::Slider { name, expr } => {
                for n in expr.names() {
                    read(n, &local, &mut analysis);
                }
                analysis.define(name.clone(), VariableKind::Element);
                local.insert(name.clone());
            }
            Statement::View { name, parent, .. } => {
                read(parent, &local, &mut analysis);
                analysis.define(name.clone(), VariableKind::Element);
                local.insert(name.clone());
            }
        }
    }

    analysis
}
