use super::{Block, StrConst, Type, Value};
use crate::Operator;
use smallvec::SmallVec;

/// The definition of one SSA value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// The `index`th parameter of a block. The entry block's
    /// parameters are the function's arguments.
    BlockParam(Block, usize, Type),
    /// The result(s) of an instruction: operator, arguments, and
    /// result types (empty for e.g. a call to a void function).
    Operator(Operator, SmallVec<[Value; 4]>, SmallVec<[Type; 1]>),
    /// A constant pointer to a module-level string. Never placed in a
    /// block's instruction list.
    StrRef(StrConst),
    /// A value slot that has been allocated but not yet defined.
    None,
}

impl ValueDef {
    /// The type of the (single) value defined, if any.
    pub fn ty(&self) -> Option<Type> {
        match self {
            &ValueDef::BlockParam(_, _, ty) => Some(ty),
            &ValueDef::Operator(_, _, ref tys) => tys.first().copied(),
            &ValueDef::StrRef(_) => Some(Type::Ptr),
            &ValueDef::None => None,
        }
    }

    /// Is this an instruction, i.e. something that lives in a block's
    /// instruction list?
    pub fn is_inst(&self) -> bool {
        matches!(self, ValueDef::Operator(..))
    }
}

impl std::default::Default for ValueDef {
    fn default() -> Self {
        ValueDef::None
    }
}
