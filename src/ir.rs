//! Intermediate representation.

use crate::entity;

entity!(Signature, "sig");
entity!(Func, "func");
entity!(Block, "block");
entity!(Value, "v");
entity!(StrConst, "str");

/// A primitive value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    I32,
    I64,
    /// An opaque pointer, e.g. the address of a string constant.
    Ptr,
}

impl Type {
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "i32" => Some(Type::I32),
            "i64" => Some(Type::I64),
            "ptr" => Some(Type::Ptr),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::Ptr => "ptr",
        };
        write!(f, "{}", s)
    }
}

mod module;
pub use module::*;
mod func;
pub use func::*;
mod value;
pub use value::*;
mod display;
pub use display::*;
