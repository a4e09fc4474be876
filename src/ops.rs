//! Operators.

use crate::{Func, Module, Type};
use smallvec::{smallvec, SmallVec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Nop,

    I32Const { value: u32 },
    I64Const { value: u64 },

    I32Add,
    I32Sub,
    I32Mul,
    I32Eq,
    I32LtS,

    I64Add,
    I64Sub,
    I64Mul,

    Call { function_index: Func },
}

/// A binary operator's textual mnemonic and operand type, or `None`
/// if the operator is not a simple binary operator.
fn binop_info(op: &Operator) -> Option<(&'static str, Type)> {
    match op {
        Operator::I32Add => Some(("i32.add", Type::I32)),
        Operator::I32Sub => Some(("i32.sub", Type::I32)),
        Operator::I32Mul => Some(("i32.mul", Type::I32)),
        Operator::I32Eq => Some(("i32.eq", Type::I32)),
        Operator::I32LtS => Some(("i32.lt_s", Type::I32)),
        Operator::I64Add => Some(("i64.add", Type::I64)),
        Operator::I64Sub => Some(("i64.sub", Type::I64)),
        Operator::I64Mul => Some(("i64.mul", Type::I64)),
        _ => None,
    }
}

impl Operator {
    /// Look up a binary operator by mnemonic.
    pub fn binop_from_mnemonic(name: &str) -> Option<Operator> {
        let op = match name {
            "i32.add" => Operator::I32Add,
            "i32.sub" => Operator::I32Sub,
            "i32.mul" => Operator::I32Mul,
            "i32.eq" => Operator::I32Eq,
            "i32.lt_s" => Operator::I32LtS,
            "i64.add" => Operator::I64Add,
            "i64.sub" => Operator::I64Sub,
            "i64.mul" => Operator::I64Mul,
            _ => return None,
        };
        Some(op)
    }

    /// Operand types this operator expects, in order.
    pub fn input_types(&self, module: &Module) -> SmallVec<[Type; 4]> {
        match self {
            Operator::Nop | Operator::I32Const { .. } | Operator::I64Const { .. } => smallvec![],
            Operator::Call { function_index } => {
                let sig = module.funcs[*function_index].sig();
                module.signature(sig).params.iter().copied().collect()
            }
            op => {
                let (_, ty) = binop_info(op).unwrap();
                smallvec![ty, ty]
            }
        }
    }

    /// Result types this operator produces.
    pub fn output_types(&self, module: &Module) -> SmallVec<[Type; 1]> {
        match self {
            Operator::Nop => smallvec![],
            Operator::I32Const { .. } => smallvec![Type::I32],
            Operator::I64Const { .. } => smallvec![Type::I64],
            Operator::I32Eq | Operator::I32LtS => smallvec![Type::I32],
            Operator::Call { function_index } => {
                let sig = module.funcs[*function_index].sig();
                module.signature(sig).returns.iter().copied().collect()
            }
            op => {
                let (_, ty) = binop_info(op).unwrap();
                smallvec![ty]
            }
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operator::Nop => write!(f, "nop"),
            Operator::I32Const { value } => write!(f, "i32.const {}", value),
            Operator::I64Const { value } => write!(f, "i64.const {}", value),
            Operator::Call { function_index } => write!(f, "call {}", function_index),
            op => write!(f, "{}", binop_info(op).unwrap().0),
        }
    }
}
