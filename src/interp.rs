//! IR interpreter.
//!
//! Runs function bodies directly, dispatching calls to declared (not
//! defined) functions to a `HostEnv`. Mostly useful to watch what
//! inserted instrumentation does at runtime.

use crate::ir::*;
use crate::ops::Operator;
use fxhash::FxHashMap;
use smallvec::{smallvec, SmallVec};

/// How deep may interpreted calls nest before we trap? Keeps runaway
/// recursion from overflowing the native stack.
const MAX_CALL_DEPTH: usize = 256;

/// A constant concrete value during interpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstVal {
    I32(u32),
    I64(u64),
    /// Pointer to a module string constant.
    Ptr(StrConst),
}

impl ConstVal {
    pub fn as_u32(self) -> Option<u32> {
        match self {
            ConstVal::I32(x) => Some(x),
            _ => None,
        }
    }

    pub fn ty(self) -> Type {
        match self {
            ConstVal::I32(_) => Type::I32,
            ConstVal::I64(_) => Type::I64,
            ConstVal::Ptr(_) => Type::Ptr,
        }
    }
}

impl std::fmt::Display for ConstVal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConstVal::I32(x) => write!(f, "{}", *x as i32),
            ConstVal::I64(x) => write!(f, "{}", *x as i64),
            ConstVal::Ptr(s) => write!(f, "&{}", s),
        }
    }
}

/// Representation of multiple result values.
pub type MultiVal = SmallVec<[ConstVal; 2]>;

/// The result of an interpreter session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterpResult {
    /// The function returned with the given value(s).
    Ok(MultiVal),
    /// Execution hit `unreachable`, or nested calls too deeply.
    Trap(Func, Block),
    /// The context ran out of fuel.
    OutOfFuel,
    /// A host function failed or was not provided.
    HostError(Func, String),
}

impl InterpResult {
    /// Extract the return value(s), if normal return, otherwise
    /// produce an error.
    pub fn ok(self) -> anyhow::Result<MultiVal> {
        match self {
            InterpResult::Ok(vals) => Ok(vals),
            other => anyhow::bail!("Bad InterpResult: {:?}", other),
        }
    }
}

/// Implementations of functions a module declares but does not define.
pub trait HostEnv {
    /// Call the external function `name`. `module` is available to
    /// resolve pointers, e.g. `ConstVal::Ptr` to string contents.
    fn call_import(
        &mut self,
        module: &Module,
        name: &str,
        args: &[ConstVal],
    ) -> anyhow::Result<MultiVal>;
}

/// A host that implements `print_tagged_helper` by recording every
/// tag it is passed, in call order, and returns the tag's length as
/// its status.
#[derive(Clone, Debug, Default)]
pub struct TraceRecorder {
    pub tags: Vec<String>,
}

impl HostEnv for TraceRecorder {
    fn call_import(
        &mut self,
        module: &Module,
        name: &str,
        args: &[ConstVal],
    ) -> anyhow::Result<MultiVal> {
        match (name, args) {
            ("print_tagged_helper", &[ConstVal::Ptr(s)]) => {
                let tag = module.string(s);
                log::debug!("trace recorder: {}", tag);
                self.tags.push(tag.to_owned());
                Ok(smallvec![ConstVal::I32(tag.len() as u32)])
            }
            ("print_tagged_helper", _) => {
                anyhow::bail!("print_tagged_helper: bad arguments {:?}", args)
            }
            _ => anyhow::bail!("no host implementation of `{}`", name),
        }
    }
}

/// One stack frame in the interpreted execution context.
#[derive(Debug, Clone, Default)]
struct InterpStackFrame {
    func: Func,
    cur_block: Block,
    values: FxHashMap<Value, ConstVal>,
}

impl InterpStackFrame {
    /// `None` if `value` has not been computed on the path taken so
    /// far, e.g. it is defined only in a block that did not run.
    fn get(&self, body: &FunctionBody, value: Value) -> Option<ConstVal> {
        match body.values[value] {
            ValueDef::StrRef(s) => Some(ConstVal::Ptr(s)),
            _ => {
                let val = self.values.get(&value).copied();
                if val.is_none() {
                    log::debug!("use of undefined value {} in {}", value, self.func);
                }
                val
            }
        }
    }

    fn get_all(&self, body: &FunctionBody, values: &[Value]) -> Option<SmallVec<[ConstVal; 4]>> {
        values.iter().map(|&value| self.get(body, value)).collect()
    }
}

/// Context for the IR interpreter.
#[derive(Clone, Debug)]
pub struct InterpContext {
    /// Fuel remaining: one unit is consumed per block executed, which
    /// allows deterministic stopping of execution.
    pub fuel: u64,
    depth: usize,
}

impl Default for InterpContext {
    fn default() -> Self {
        InterpContext::new()
    }
}

impl InterpContext {
    pub fn new() -> Self {
        InterpContext {
            fuel: u64::MAX,
            depth: 0,
        }
    }

    pub fn with_fuel(fuel: u64) -> Self {
        InterpContext { fuel, depth: 0 }
    }

    /// Call the given function with the given args, running the
    /// interpreter until fuel is exhausted or the function returns.
    pub fn call(
        &mut self,
        module: &Module,
        host: &mut dyn HostEnv,
        func: Func,
        args: &[ConstVal],
    ) -> InterpResult {
        let body = match &module.funcs[func] {
            FuncDecl::Import(_, name) => {
                return match host.call_import(module, &name[..], args) {
                    Ok(vals) => InterpResult::Ok(vals),
                    Err(e) => InterpResult::HostError(func, format!("{:#}", e)),
                };
            }
            FuncDecl::Body(_, _, body) => body,
        };

        if self.depth >= MAX_CALL_DEPTH {
            return InterpResult::Trap(func, body.entry);
        }

        log::trace!(
            "Interp: entering func {}:\n{}\n",
            func,
            body.display_verbose("| ")
        );
        log::trace!("args: {:?}", args);

        let mut frame = InterpStackFrame {
            func,
            cur_block: body.entry,
            values: FxHashMap::default(),
        };

        for (&arg, &(_, blockparam)) in args.iter().zip(body.blocks[body.entry].params.iter()) {
            log::trace!("Entry block param {} gets arg value {:?}", blockparam, arg);
            frame.values.insert(blockparam, arg);
        }

        self.depth += 1;
        let result = self.run_frame(module, host, body, &mut frame);
        self.depth -= 1;
        result
    }

    fn run_frame(
        &mut self,
        module: &Module,
        host: &mut dyn HostEnv,
        body: &FunctionBody,
        frame: &mut InterpStackFrame,
    ) -> InterpResult {
        loop {
            if self.fuel == 0 {
                return InterpResult::OutOfFuel;
            }
            self.fuel -= 1;

            log::trace!("Interpreting block {}", frame.cur_block);
            for &inst in &body.blocks[frame.cur_block].insts {
                log::trace!("Evaluating inst {}", inst);
                let (op, args) = match &body.values[inst] {
                    ValueDef::Operator(op, args, _) => (*op, args),
                    other => unreachable!("non-instruction {:?} in block", other),
                };
                let args = match frame.get_all(body, &args[..]) {
                    Some(args) => args,
                    None => return InterpResult::Trap(frame.func, frame.cur_block),
                };
                let result = match op {
                    Operator::Call { function_index } => {
                        match self.call(module, host, function_index, &args[..]) {
                            InterpResult::Ok(vals) => vals.first().copied(),
                            other => return other,
                        }
                    }
                    op => const_eval(&op, &args[..]),
                };
                log::trace!(" -> {:?}", result);
                if let Some(result) = result {
                    frame.values.insert(inst, result);
                }
            }

            match &body.blocks[frame.cur_block].terminator {
                Terminator::None | Terminator::Unreachable => {
                    return InterpResult::Trap(frame.func, frame.cur_block);
                }
                Terminator::Br { target } => {
                    if !self.apply_target(body, frame, target) {
                        return InterpResult::Trap(frame.func, frame.cur_block);
                    }
                }
                Terminator::CondBr {
                    cond,
                    if_true,
                    if_false,
                } => {
                    let target = match frame.get(body, *cond) {
                        Some(cond) if cond.as_u32().unwrap_or(0) != 0 => if_true,
                        Some(_) => if_false,
                        None => return InterpResult::Trap(frame.func, frame.cur_block),
                    };
                    if !self.apply_target(body, frame, target) {
                        return InterpResult::Trap(frame.func, frame.cur_block);
                    }
                }
                Terminator::Return { values } => {
                    let values = match frame.get_all(body, &values[..]) {
                        Some(values) => values.into_iter().collect::<MultiVal>(),
                        None => return InterpResult::Trap(frame.func, frame.cur_block),
                    };
                    log::trace!("returning from {}: {:?}", frame.func, values);
                    return InterpResult::Ok(values);
                }
            }
        }
    }

    /// Move to `target`, binding its params. `false` if an argument is
    /// undefined.
    fn apply_target(
        &self,
        body: &FunctionBody,
        frame: &mut InterpStackFrame,
        target: &BlockTarget,
    ) -> bool {
        // Evaluate all args before writing any params: a loop may pass
        // one param's current value to another.
        let args = match frame.get_all(body, &target.args[..]) {
            Some(args) => args,
            None => return false,
        };
        log::trace!("taking target {} with args {:?}", target.block, args);
        for (&arg, &(_, param)) in args.iter().zip(body.blocks[target.block].params.iter()) {
            frame.values.insert(param, arg);
        }
        frame.cur_block = target.block;
        true
    }
}

/// Evaluate a non-call operator on constant operands. Returns `None`
/// for operators without a result, or operands of the wrong kind.
pub fn const_eval(op: &Operator, vals: &[ConstVal]) -> Option<ConstVal> {
    match (op, vals) {
        (Operator::Nop, []) => None,
        (Operator::I32Const { value }, []) => Some(ConstVal::I32(*value)),
        (Operator::I64Const { value }, []) => Some(ConstVal::I64(*value)),
        (Operator::I32Add, [ConstVal::I32(a), ConstVal::I32(b)]) => {
            Some(ConstVal::I32(a.wrapping_add(*b)))
        }
        (Operator::I32Sub, [ConstVal::I32(a), ConstVal::I32(b)]) => {
            Some(ConstVal::I32(a.wrapping_sub(*b)))
        }
        (Operator::I32Mul, [ConstVal::I32(a), ConstVal::I32(b)]) => {
            Some(ConstVal::I32(a.wrapping_mul(*b)))
        }
        (Operator::I32Eq, [ConstVal::I32(a), ConstVal::I32(b)]) => {
            Some(ConstVal::I32(if a == b { 1 } else { 0 }))
        }
        (Operator::I32LtS, [ConstVal::I32(a), ConstVal::I32(b)]) => {
            Some(ConstVal::I32(if (*a as i32) < (*b as i32) { 1 } else { 0 }))
        }
        (Operator::I64Add, [ConstVal::I64(a), ConstVal::I64(b)]) => {
            Some(ConstVal::I64(a.wrapping_add(*b)))
        }
        (Operator::I64Sub, [ConstVal::I64(a), ConstVal::I64(b)]) => {
            Some(ConstVal::I64(a.wrapping_sub(*b)))
        }
        (Operator::I64Mul, [ConstVal::I64(a), ConstVal::I64(b)]) => {
            Some(ConstVal::I64(a.wrapping_mul(*b)))
        }
        _ => None,
    }
}

/// Find a function by name and call it.
pub fn call_by_name(
    ctx: &mut InterpContext,
    module: &Module,
    host: &mut dyn HostEnv,
    name: &str,
    args: &[ConstVal],
) -> anyhow::Result<InterpResult> {
    match module.func_by_name(name) {
        Some(func) => {
            let sig = module.signature(module.funcs[func].sig());
            let arg_tys = args.iter().map(|a| a.ty()).collect::<Vec<_>>();
            if arg_tys != sig.params {
                anyhow::bail!(
                    "`{}` expects arguments {:?}, given {:?}",
                    name,
                    sig.params,
                    arg_tys
                );
            }
            Ok(ctx.call(module, host, func, args))
        }
        None => anyhow::bail!("no function named `{}`", name),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::passes::tag_helpers;

    const LOOP: &str = r#"
module {
  sig0 = (i32) -> (i32)
  func0 = func "helper_sum_to" : sig0 {
    block0(v0: i32):
      v1 = i32.const 0
      v2 = i32.const 0
      br block1(v1, v2)
    block1(v3: i32, v4: i32):
      v5 = i32.lt_s v3, v0
      if v5, block2(), block3()
    block2():
      v6 = i32.const 1
      v7 = i32.add v3, v6
      v8 = i32.add v4, v7
      br block1(v7, v8)
    block3():
      return v4
  }
  func1 = func "main" : sig0 {
    block0(v0: i32):
      v1 = call func0(v0)
      v2 = call func0(v1)
      return v2
  }
}
"#;

    #[test]
    fn runs_loops() {
        let module = Module::from_text(LOOP).unwrap();
        let mut host = TraceRecorder::default();
        let mut ctx = InterpContext::new();
        let result = call_by_name(
            &mut ctx,
            &module,
            &mut host,
            "helper_sum_to",
            &[ConstVal::I32(4)],
        )
        .unwrap();
        assert_eq!(result.ok().unwrap().as_slice(), &[ConstVal::I32(10)]);
        assert!(host.tags.is_empty());
    }

    #[test]
    fn tagged_helpers_report_each_entry() {
        let mut module = Module::from_text(LOOP).unwrap();
        tag_helpers::run(&mut module);
        let mut host = TraceRecorder::default();
        let mut ctx = InterpContext::new();
        let result = call_by_name(&mut ctx, &module, &mut host, "main", &[ConstVal::I32(3)])
            .unwrap()
            .ok()
            .unwrap();
        // sum_to(3) = 6, sum_to(6) = 21.
        assert_eq!(result.as_slice(), &[ConstVal::I32(21)]);
        assert_eq!(host.tags, vec!["|-- helper_sum_to", "|-- helper_sum_to"]);
    }

    #[test]
    fn missing_host_function_is_an_error() {
        let module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = import "mystery" : sig0
                 func1 = func "main" : sig0 {
                   block0():
                     v0 = call func0()
                     return
                 }
               }"#,
        )
        .unwrap();
        let mut host = TraceRecorder::default();
        let result = InterpContext::new().call(&module, &mut host, Func::new(1), &[]);
        assert!(matches!(result, InterpResult::HostError(f, _) if f == Func::new(0)));
    }

    #[test]
    fn unreachable_traps_and_fuel_runs_out() {
        let module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = func "trap" : sig0 {
                   block0():
                     unreachable
                 }
                 func1 = func "spin" : sig0 {
                   block0():
                     br block0()
                 }
               }"#,
        )
        .unwrap();
        let mut host = TraceRecorder::default();
        assert_eq!(
            InterpContext::new().call(&module, &mut host, Func::new(0), &[]),
            InterpResult::Trap(Func::new(0), Block::new(0))
        );
        assert_eq!(
            InterpContext::with_fuel(100).call(&module, &mut host, Func::new(1), &[]),
            InterpResult::OutOfFuel
        );
    }

    #[test]
    fn value_from_branch_not_taken_traps() {
        // `v1` is defined only on the `block1` path.
        let module = Module::from_text(
            r#"module {
                 sig0 = (i32) -> (i32)
                 func0 = func "helper_f" : sig0 {
                   block0(v0: i32):
                     if v0, block1(), block2()
                   block1():
                     v1 = i32.const 1
                     br block2()
                   block2():
                     return v1
                 }
               }"#,
        )
        .unwrap();
        let mut host = TraceRecorder::default();
        let mut ctx = InterpContext::new();
        let taken = call_by_name(&mut ctx, &module, &mut host, "helper_f", &[ConstVal::I32(1)])
            .unwrap();
        assert_eq!(taken, InterpResult::Ok(smallvec![ConstVal::I32(1)]));
        let skipped = call_by_name(&mut ctx, &module, &mut host, "helper_f", &[ConstVal::I32(0)])
            .unwrap();
        assert_eq!(skipped, InterpResult::Trap(Func::new(0), Block::new(2)));
    }

    #[test]
    fn deep_recursion_traps() {
        let module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = func "forever" : sig0 {
                   block0():
                     v0 = call func0()
                     return
                 }
               }"#,
        )
        .unwrap();
        let mut host = TraceRecorder::default();
        let result = InterpContext::new().call(&module, &mut host, Func::new(0), &[]);
        assert!(matches!(result, InterpResult::Trap(f, _) if f == Func::new(0)));
    }

    #[test]
    fn call_by_name_checks_arguments() {
        let module = Module::from_text(LOOP).unwrap();
        let mut host = TraceRecorder::default();
        let mut ctx = InterpContext::new();
        assert!(call_by_name(&mut ctx, &module, &mut host, "main", &[]).is_err());
        assert!(call_by_name(&mut ctx, &module, &mut host, "nope", &[]).is_err());
    }

    #[test]
    fn const_eval_wraps() {
        assert_eq!(
            const_eval(
                &Operator::I32Add,
                &[ConstVal::I32(u32::MAX), ConstVal::I32(2)]
            ),
            Some(ConstVal::I32(1))
        );
        assert_eq!(
            const_eval(
                &Operator::I32LtS,
                &[ConstVal::I32(-1i32 as u32), ConstVal::I32(0)]
            ),
            Some(ConstVal::I32(1))
        );
        assert_eq!(const_eval(&Operator::Nop, &[]), None);
    }
}
