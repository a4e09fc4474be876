//! Helper-tagging pass: make every `helper_*` function announce itself
//! on entry.
//!
//! For each function with a body whose name starts with `helper_`, a
//! call `print_tagged_helper("|-- <name>")` becomes the first
//! instruction of its entry block. `print_tagged_helper` is declared
//! as an external `(ptr) -> (i32)` function if the module does not bind
//! that name yet; its implementation is supplied at link/run time.

use crate::pass::{ModulePass, PassInfo};
use crate::{FuncDecl, Module, Operator, SignatureData, Type, ValueDef};
use log::{debug, trace};
use smallvec::smallvec;

/// Functions whose names start with this are instrumented.
pub const HELPER_PREFIX: &str = "helper_";
/// Prefix of every tag string.
pub const TAG_MARKER: &str = "|-- ";
/// The external routine called with the tag string.
pub const TAG_CALLEE: &str = "print_tagged_helper";

pub const PASS_NAME: &str = "TagHelpersPass";
pub const PASS_DESCRIPTION: &str =
    "A pass that inserts a `print_tagged_helper` call to every helper function.";

/// Signature of `print_tagged_helper`: a string pointer in, a status out.
pub fn tag_callee_signature() -> SignatureData {
    SignatureData {
        params: vec![Type::Ptr],
        returns: vec![Type::I32],
    }
}

/// Does this function get a tag call?
pub fn is_helper(decl: &FuncDecl) -> bool {
    !decl.is_declaration() && is_helper_name(decl.name())
}

fn is_helper_name(name: &str) -> bool {
    name.starts_with(HELPER_PREFIX)
}

/// The tag string passed for function `name`.
pub fn tag_for(name: &str) -> String {
    format!("{}{}", TAG_MARKER, name)
}

/// Run the pass over `module`.
///
/// Always returns `true`, even if no function was tagged: callers get a
/// conservative "may have changed" signal, not an exact one.
pub fn run(module: &mut Module) -> bool {
    let callee = module.get_or_insert_function(TAG_CALLEE, tag_callee_signature());
    let callee_rets = module
        .signature(module.funcs[callee].sig())
        .returns
        .iter()
        .copied()
        .collect::<smallvec::SmallVec<[Type; 1]>>();

    // The function list is fixed from here on; only bodies change.
    for decl in module.funcs.values_mut() {
        let (name, body) = match decl {
            FuncDecl::Body(_, name, body) if is_helper_name(name.as_str()) => (name, body),
            _ => continue,
        };
        let string = module.strings.push(tag_for(name));
        let arg = body.add_value(ValueDef::StrRef(string));
        let call = body.add_op(
            Operator::Call {
                function_index: callee,
            },
            smallvec![arg],
            callee_rets.clone(),
        );
        body.prepend_to_block(body.entry, call);
        debug!("tag_helpers: tagged `{}` with {} ({})", name, call, string);
    }

    trace!("tag_helpers: result:\n{}", module.display());
    true
}

/// `ModulePass` wrapper around `run`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagHelpersPass;

impl ModulePass for TagHelpersPass {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run_on_module(&mut self, module: &mut Module) -> bool {
        run(module)
    }
}

fn create() -> Box<dyn ModulePass> {
    Box::new(TagHelpersPass)
}

/// Registration record for `TagHelpersPass`.
pub fn pass_info() -> PassInfo {
    PassInfo {
        name: PASS_NAME,
        description: PASS_DESCRIPTION,
        cfg_only: true,
        is_analysis: false,
        constructor: create,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entity::EntityRef;
    use crate::{Func, FunctionBody, StrConst, Value};

    /// The tag string passed by `value` if it is a call to the tag
    /// routine with a single string-constant argument.
    fn tag_call_string(module: &Module, body: &FunctionBody, value: Value) -> Option<String> {
        match &body.values[value] {
            ValueDef::Operator(Operator::Call { function_index }, args, _)
                if module.funcs[*function_index].name() == TAG_CALLEE && args.len() == 1 =>
            {
                match body.values[args[0]] {
                    ValueDef::StrRef(s) => Some(module.string(s).to_owned()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn body<'a>(module: &'a Module, name: &str) -> &'a FunctionBody {
        let func = module.func_by_name(name).unwrap();
        module.funcs[func].body().unwrap()
    }

    fn declarations_of(module: &Module, name: &str) -> usize {
        module.funcs().filter(|(_, d)| d.name() == name).count()
    }

    #[test]
    fn tags_helper_and_leaves_main_alone() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> (i32)
                 func0 = func "helper_init" : sig0 {
                   block0():
                     v0 = i32.const 7
                     return v0
                 }
                 func1 = func "main" : sig0 {
                   block0():
                     v0 = call func0()
                     return v0
                 }
               }"#,
        )
        .unwrap();
        let main_before = body(&module, "main").blocks[body(&module, "main").entry]
            .insts
            .clone();

        assert!(run(&mut module));

        let helper = body(&module, "helper_init");
        let insts = &helper.blocks[helper.entry].insts;
        assert_eq!(insts.len(), 2);
        assert_eq!(
            tag_call_string(&module, helper, insts[0]).as_deref(),
            Some("|-- helper_init")
        );
        assert!(tag_call_string(&module, helper, insts[1]).is_none());

        let main = body(&module, "main");
        assert_eq!(main.blocks[main.entry].insts, main_before);
        assert_eq!(declarations_of(&module, TAG_CALLEE), 1);
    }

    #[test]
    fn skips_declarations() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = import "helper_extern" : sig0
               }"#,
        )
        .unwrap();
        assert!(run(&mut module));
        assert!(module.strings.is_empty());
        assert_eq!(module.funcs.len(), 2);
        assert!(module.funcs[Func::new(1)].is_declaration());
        assert_eq!(module.funcs[Func::new(1)].name(), TAG_CALLEE);
    }

    #[test]
    fn helper_named_import_next_to_body() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = import "helper_ext" : sig0
                 func1 = func "helper_def" : sig0 {
                   block0():
                     v0 = call func0()
                     return
                 }
               }"#,
        )
        .unwrap();
        assert!(!is_helper(&module.funcs[Func::new(0)]));
        assert!(is_helper(&module.funcs[Func::new(1)]));
        run(&mut module);
        assert_eq!(module.strings.len(), 1);
        assert_eq!(module.string(StrConst::new(0)), "|-- helper_def");
        assert!(module.funcs[Func::new(0)].is_declaration());
        let b = body(&module, "helper_def");
        assert_eq!(b.blocks[b.entry].insts.len(), 2);
    }

    #[test]
    fn empty_module_gets_declaration_and_reports_modified() {
        let mut module = Module::empty();
        assert!(run(&mut module));
        assert_eq!(module.funcs.len(), 1);
        let callee = module.func_by_name(TAG_CALLEE).unwrap();
        assert!(module.funcs[callee].is_declaration());
        assert_eq!(
            *module.signature(module.funcs[callee].sig()),
            tag_callee_signature()
        );
        assert!(module.strings.is_empty());
    }

    #[test]
    fn prefix_must_match_at_start() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = func "my_helper_x" : sig0 {
                   block0():
                     return
                 }
                 func1 = func "helper" : sig0 {
                   block0():
                     return
                 }
                 func2 = func "helper_" : sig0 {
                   block0():
                     return
                 }
               }"#,
        )
        .unwrap();
        run(&mut module);
        assert!(body(&module, "my_helper_x").first_inst().is_none());
        assert!(body(&module, "helper").first_inst().is_none());
        let tagged = body(&module, "helper_");
        assert_eq!(
            tag_call_string(&module, tagged, tagged.first_inst().unwrap()).as_deref(),
            Some("|-- helper_")
        );
    }

    #[test]
    fn one_declaration_for_many_helpers() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = (i32) -> (i32)
                 func0 = func "helper_a" : sig0 {
                   block0(v0: i32):
                     return v0
                 }
                 func1 = func "helper_b" : sig0 {
                   block0(v0: i32):
                     br block1(v0)
                   block1(v1: i32):
                     return v1
                 }
                 func2 = func "helper_c" : sig0 {
                   block0(v0: i32):
                     return v0
                 }
               }"#,
        )
        .unwrap();
        run(&mut module);
        assert_eq!(declarations_of(&module, TAG_CALLEE), 1);
        assert_eq!(module.strings.len(), 3);
        for name in &["helper_a", "helper_b", "helper_c"] {
            let b = body(&module, name);
            let first = b.first_inst().unwrap();
            assert_eq!(
                tag_call_string(&module, b, first),
                Some(format!("|-- {}", name))
            );
        }
        // Only the entry block is touched.
        let b = body(&module, "helper_b");
        let other = b.blocks.iter().find(|&blk| blk != b.entry).unwrap();
        assert!(b.blocks[other].insts.is_empty());
    }

    #[test]
    fn reuses_existing_declaration() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = (ptr) -> (i32)
                 sig1 = () -> ()
                 func0 = import "print_tagged_helper" : sig0
                 func1 = func "helper_x" : sig1 {
                   block0():
                     return
                 }
               }"#,
        )
        .unwrap();
        run(&mut module);
        assert_eq!(module.funcs.len(), 2);
        assert_eq!(module.signatures.len(), 2);
        let b = body(&module, "helper_x");
        match &b.values[b.first_inst().unwrap()] {
            ValueDef::Operator(Operator::Call { function_index }, _, tys) => {
                assert_eq!(*function_index, Func::new(0));
                assert_eq!(tys.as_slice(), &[Type::I32]);
            }
            other => panic!("unexpected first instruction {:?}", other),
        }
    }

    #[test]
    fn running_twice_tags_twice() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = func "helper_twice" : sig0 {
                   block0():
                     v0 = nop
                     return
                 }
               }"#,
        )
        .unwrap();
        assert!(run(&mut module));
        assert!(run(&mut module));

        assert_eq!(declarations_of(&module, TAG_CALLEE), 1);
        assert_eq!(module.strings.len(), 2);
        let b = body(&module, "helper_twice");
        let insts = &b.blocks[b.entry].insts;
        assert_eq!(insts.len(), 3);
        for &inst in &insts[..2] {
            assert_eq!(
                tag_call_string(&module, b, inst).as_deref(),
                Some("|-- helper_twice")
            );
        }
        // The second run's call is the one in front.
        match (&b.values[insts[0]], &b.values[insts[1]]) {
            (ValueDef::Operator(_, a0, _), ValueDef::Operator(_, a1, _)) => {
                assert_eq!(b.values[a0[0]], ValueDef::StrRef(StrConst::new(1)));
                assert_eq!(b.values[a1[0]], ValueDef::StrRef(StrConst::new(0)));
            }
            _ => panic!("expected two calls"),
        }
    }

    #[test]
    fn tagged_module_round_trips_through_text() {
        let mut module = Module::from_text(
            r#"module {
                 sig0 = () -> ()
                 func0 = func "helper_print" : sig0 {
                   block0():
                     return
                 }
               }"#,
        )
        .unwrap();
        run(&mut module);
        let printed = format!("{}", module.display());
        assert!(printed.contains("str0 = \"|-- helper_print\""));
        assert!(printed.contains("func1 = import \"print_tagged_helper\" : sig1"));
        assert!(printed.contains("= call func1(str0)"));
        let reparsed = Module::from_text(&printed).unwrap();
        assert_eq!(printed, format!("{}", reparsed.display()));
    }

    #[test]
    fn pass_wrapper_runs_the_pass() {
        let mut module = Module::empty();
        let mut pass = pass_info().create();
        assert_eq!(pass.name(), PASS_NAME);
        assert!(pass.run_on_module(&mut module));
        assert!(module.func_by_name(TAG_CALLEE).is_some());
    }
}
