//! Displaying IR.

use super::{BlockTarget, FuncDecl, FunctionBody, Module, Terminator, Value, ValueDef};
use crate::Operator;

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Escape a string constant for the textual IR.
pub(crate) fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// String constants are printed in place of the value that refers to
/// them; everything else by value name.
fn operand(body: &FunctionBody, value: Value) -> String {
    match body.values.get(value) {
        Some(&ValueDef::StrRef(s)) => format!("{}", s),
        _ => format!("{}", value),
    }
}

fn operands(body: &FunctionBody, values: &[Value]) -> String {
    values
        .iter()
        .map(|&v| operand(body, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn target(body: &FunctionBody, target: &BlockTarget) -> String {
    format!("{}({})", target.block, operands(body, &target.args[..]))
}

pub struct FunctionBodyDisplay<'a> {
    pub(crate) body: &'a FunctionBody,
    pub(crate) indent: &'a str,
    pub(crate) verbose: bool,
}

impl<'a> Display for FunctionBodyDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let body = self.body;
        let indent = self.indent;

        // The entry block must come first: it is the entry by position
        // when parsed back.
        let order = std::iter::once(body.entry)
            .chain(body.blocks.iter().filter(|&block| block != body.entry));
        for block_id in order {
            let block = &body.blocks[block_id];
            let block_params = block
                .params
                .iter()
                .map(|(ty, val)| format!("{}: {}", val, ty))
                .collect::<Vec<_>>();
            writeln!(f, "{}{}({}):", indent, block_id, block_params.join(", "))?;
            if self.verbose {
                for &pred in &block.preds {
                    writeln!(f, "{}  # pred: {}", indent, pred)?;
                }
                for &succ in &block.succs {
                    writeln!(f, "{}  # succ: {}", indent, succ)?;
                }
            }
            for &inst in &block.insts {
                match &body.values[inst] {
                    ValueDef::Operator(op, args, tys) => {
                        let rhs = match op {
                            Operator::Call { .. } => {
                                format!("{}({})", op, operands(body, &args[..]))
                            }
                            _ if args.is_empty() => format!("{}", op),
                            _ => format!("{} {}", op, operands(body, &args[..])),
                        };
                        if self.verbose && !tys.is_empty() {
                            let tys = tys.iter().map(|ty| format!("{}", ty)).collect::<Vec<_>>();
                            writeln!(f, "{}  {} = {}  # {}", indent, inst, rhs, tys.join(", "))?;
                        } else {
                            writeln!(f, "{}  {} = {}", indent, inst, rhs)?;
                        }
                    }
                    other => unreachable!("non-instruction {:?} in block {}", other, block_id),
                }
            }
            let term = match &block.terminator {
                Terminator::Br { target: t } => format!("br {}", target(body, t)),
                Terminator::CondBr {
                    cond,
                    if_true,
                    if_false,
                } => format!(
                    "if {}, {}, {}",
                    operand(body, *cond),
                    target(body, if_true),
                    target(body, if_false)
                ),
                Terminator::Return { values } if values.is_empty() => "return".to_owned(),
                Terminator::Return { values } => {
                    format!("return {}", operands(body, &values[..]))
                }
                other => format!("{}", other),
            };
            writeln!(f, "{}  {}", indent, term)?;
        }
        Ok(())
    }
}

pub struct ModuleDisplay<'a> {
    pub(crate) module: &'a Module,
    pub(crate) verbose: bool,
}

impl<'a> Display for ModuleDisplay<'a> {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let module = self.module;
        writeln!(f, "module {{")?;
        for (sig, data) in module.signatures.entries() {
            writeln!(f, "  {} = {}", sig, data)?;
        }
        for (s, data) in module.strings.entries() {
            writeln!(f, "  {} = {}", s, escape_str(data))?;
        }
        for (func, decl) in module.funcs() {
            match decl {
                FuncDecl::Import(sig, name) => {
                    writeln!(f, "  {} = import {} : {}", func, escape_str(name), sig)?;
                }
                FuncDecl::Body(sig, name, body) => {
                    writeln!(f, "  {} = func {} : {} {{", func, escape_str(name), sig)?;
                    let body_display = if self.verbose {
                        body.display_verbose("    ")
                    } else {
                        body.display("    ")
                    };
                    write!(f, "{}", body_display)?;
                    writeln!(f, "  }}")?;
                }
            }
        }
        writeln!(f, "}}")?;
        Ok(())
    }
}
