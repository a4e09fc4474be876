use super::{Block, FunctionBodyDisplay, Module, Signature, Type, Value, ValueDef};
use crate::entity::{EntityVec, PerEntity};
use crate::Operator;
use smallvec::SmallVec;

/// A function in a module: either a declaration of an external
/// symbol, or a definition with an IR body.
#[derive(Clone, Debug)]
pub enum FuncDecl {
    Import(Signature, String),
    Body(Signature, String, FunctionBody),
}

impl FuncDecl {
    pub fn sig(&self) -> Signature {
        match self {
            FuncDecl::Import(sig, ..) => *sig,
            FuncDecl::Body(sig, ..) => *sig,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FuncDecl::Import(_, name) => &name[..],
            FuncDecl::Body(_, name, _) => &name[..],
        }
    }

    /// Is this a declaration only, with no body in this module?
    pub fn is_declaration(&self) -> bool {
        matches!(self, FuncDecl::Import(..))
    }

    pub fn body(&self) -> Option<&FunctionBody> {
        match self {
            FuncDecl::Body(_, _, body) => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut FunctionBody> {
        match self {
            FuncDecl::Body(_, _, body) => Some(body),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FunctionBody {
    /// How many parameters the function has. (They are the first
    /// `n_params` blockparams of the entry block.)
    pub n_params: usize,
    /// Return types of the function.
    pub rets: Vec<Type>,
    /// Entry block.
    pub entry: Block,
    /// Block bodies.
    pub blocks: EntityVec<Block, BlockDef>,
    /// Value definitions, indexed by `Value`.
    pub values: EntityVec<Value, ValueDef>,
    /// Blocks in which instructions are placed. `Block::invalid()` for
    /// constants and values not (yet) placed.
    pub value_blocks: PerEntity<Value, Block>,
}

impl FunctionBody {
    /// Create a body for a function of signature `sig`, with an entry
    /// block whose params are the function's arguments.
    pub fn new(module: &Module, sig: Signature) -> FunctionBody {
        let sig_data = module.signature(sig);
        let mut body = FunctionBody {
            n_params: sig_data.params.len(),
            rets: sig_data.returns.clone(),
            ..FunctionBody::default()
        };
        body.entry = body.add_block();
        for &ty in &sig_data.params {
            body.add_blockparam(body.entry, ty);
        }
        body
    }

    pub fn add_block(&mut self) -> Block {
        let id = self.blocks.push(BlockDef::default());
        log::trace!("add_block: block {}", id);
        id
    }

    pub fn add_value(&mut self, value: ValueDef) -> Value {
        log::trace!("add_value: def {:?}", value);
        let value = self.values.push(value);
        log::trace!(" -> {}", value);
        value
    }

    /// Create an instruction value. It still has to be placed with
    /// `append_to_block` or `prepend_to_block`.
    pub fn add_op(
        &mut self,
        op: Operator,
        args: SmallVec<[Value; 4]>,
        tys: SmallVec<[Type; 1]>,
    ) -> Value {
        self.add_value(ValueDef::Operator(op, args, tys))
    }

    pub fn add_blockparam(&mut self, block: Block, ty: Type) -> Value {
        let index = self.blocks[block].params.len();
        let value = self.add_value(ValueDef::BlockParam(block, index, ty));
        self.blocks[block].params.push((ty, value));
        self.value_blocks[value] = block;
        value
    }

    pub fn append_to_block(&mut self, block: Block, value: Value) {
        debug_assert!(self.values[value].is_inst());
        self.blocks[block].insts.push(value);
        self.value_blocks[value] = block;
    }

    /// Place `value` as the first instruction of `block`. Existing
    /// instructions shift down by one; none are removed.
    pub fn prepend_to_block(&mut self, block: Block, value: Value) {
        debug_assert!(self.values[value].is_inst());
        self.blocks[block].insts.insert(0, value);
        self.value_blocks[value] = block;
    }

    pub fn end_block(&mut self, block: Block, terminator: Terminator) {
        terminator.visit_successors(|succ| {
            self.add_edge(block, succ);
        });
        self.blocks[block].terminator = terminator;
    }

    fn add_edge(&mut self, from: Block, to: Block) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
        log::trace!("add_edge: from {} to {}", from, to);
    }

    /// Recompute all pred/succ lists from the terminators.
    pub fn recompute_edges(&mut self) {
        for block in self.blocks.values_mut() {
            block.preds.clear();
            block.succs.clear();
        }
        for block in self.blocks.iter() {
            let mut succs = vec![];
            self.blocks[block]
                .terminator
                .visit_successors(|succ| succs.push(succ));
            for succ in succs {
                self.add_edge(block, succ);
            }
        }
    }

    /// The first instruction of the entry block, if any.
    pub fn first_inst(&self) -> Option<Value> {
        self.blocks[self.entry].insts.first().copied()
    }

    pub fn display<'a>(&'a self, indent: &'a str) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay {
            body: self,
            indent,
            verbose: false,
        }
    }

    pub fn display_verbose<'a>(&'a self, indent: &'a str) -> FunctionBodyDisplay<'a> {
        FunctionBodyDisplay {
            body: self,
            indent,
            verbose: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlockDef {
    /// Instructions in this block, in execution order.
    pub insts: Vec<Value>,
    /// Terminator: branch or return.
    pub terminator: Terminator,
    /// Successor blocks.
    pub succs: Vec<Block>,
    /// Predecessor blocks.
    pub preds: Vec<Block>,
    /// Type and Value for each blockparam.
    pub params: Vec<(Type, Value)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTarget {
    pub block: Block,
    pub args: Vec<Value>,
}

impl std::fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let args = self
            .args
            .iter()
            .map(|arg| format!("{}", arg))
            .collect::<Vec<_>>();
        write!(f, "{}({})", self.block, args.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Br {
        target: BlockTarget,
    },
    CondBr {
        cond: Value,
        if_true: BlockTarget,
        if_false: BlockTarget,
    },
    Return {
        values: Vec<Value>,
    },
    Unreachable,
    None,
}

impl std::default::Default for Terminator {
    fn default() -> Self {
        Terminator::None
    }
}

impl std::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Terminator::None => write!(f, "no_terminator")?,
            Terminator::Br { target } => write!(f, "br {}", target)?,
            Terminator::CondBr {
                cond,
                if_true,
                if_false,
            } => write!(f, "if {}, {}, {}", cond, if_true, if_false)?,
            Terminator::Return { values } => write!(
                f,
                "return {}",
                values
                    .iter()
                    .map(|val| format!("{}", val))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?,
            Terminator::Unreachable => write!(f, "unreachable")?,
        }
        Ok(())
    }
}

impl Terminator {
    pub fn visit_targets<F: FnMut(&BlockTarget)>(&self, mut f: F) {
        match self {
            Terminator::Br { ref target } => f(target),
            Terminator::CondBr {
                ref if_true,
                ref if_false,
                ..
            } => {
                f(if_true);
                f(if_false);
            }
            Terminator::Return { .. } | Terminator::Unreachable | Terminator::None => {}
        }
    }

    pub fn visit_successors<F: FnMut(Block)>(&self, mut f: F) {
        self.visit_targets(|target| f(target.block));
    }
}
