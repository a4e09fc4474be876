//! Fuzzing-specific utilities.

use crate::entity::EntityRef;
use crate::passes::tag_helpers;
use crate::{
    Func, FuncDecl, FunctionBody, Module, Operator, Signature, SignatureData, Terminator, Type,
    Value, ValueDef,
};
use libfuzzer_sys::arbitrary;
use smallvec::{smallvec, SmallVec};

const MAX_FUNCS: usize = 12;
const MAX_INSTS: usize = 16;

/// Name stems: some match the helper prefix, some only look like they do.
const NAME_PREFIXES: [&str; 6] = ["helper_", "helper", "main", "my_helper_", "Helper_", "f"];

/// A wrapper around `Module` that uses `arbitrary` to generate new,
/// well-formed modules.
#[derive(Debug)]
pub struct ArbitraryModule(pub Module);

impl<'a> arbitrary::Arbitrary<'a> for ArbitraryModule {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut module = Module::empty();
        let sigs = [
            module.get_or_insert_signature(SignatureData {
                params: vec![],
                returns: vec![Type::I32],
            }),
            module.get_or_insert_signature(SignatureData {
                params: vec![Type::I32],
                returns: vec![Type::I32],
            }),
        ];

        let n_funcs = u.int_in_range(0..=MAX_FUNCS)?;
        for _ in 0..n_funcs {
            let sig = *u.choose(&sigs[..])?;
            let name = format!(
                "{}{}",
                u.choose(&NAME_PREFIXES[..])?,
                u.int_in_range(0..=99u32)?
            );
            if u.arbitrary::<bool>()? {
                module.add_func(FuncDecl::Import(sig, name));
            } else {
                let body = arbitrary_body(u, &module, sig)?;
                module.add_func(FuncDecl::Body(sig, name, body));
            }
        }
        Ok(ArbitraryModule(module))
    }
}

/// A single-block body computing some i32 from constants, its args,
/// and calls to functions already in `module`.
fn arbitrary_body(
    u: &mut arbitrary::Unstructured<'_>,
    module: &Module,
    sig: Signature,
) -> arbitrary::Result<FunctionBody> {
    let mut body = FunctionBody::new(module, sig);
    let entry = body.entry;
    let mut avail = body.blocks[entry]
        .params
        .iter()
        .map(|&(_, value)| value)
        .collect::<Vec<Value>>();

    let n_insts = u.int_in_range(0..=MAX_INSTS)?;
    for _ in 0..n_insts {
        let value = match u.int_in_range(0..=2u8)? {
            0 => body.add_op(
                Operator::I32Const {
                    value: u.arbitrary()?,
                },
                smallvec![],
                smallvec![Type::I32],
            ),
            1 if !avail.is_empty() => {
                let a = *u.choose(&avail[..])?;
                let b = *u.choose(&avail[..])?;
                body.add_op(Operator::I32Add, smallvec![a, b], smallvec![Type::I32])
            }
            2 if !module.funcs.is_empty() => {
                let callee = Func::new(u.int_in_range(0..=module.funcs.len() - 1)?);
                let op = Operator::Call {
                    function_index: callee,
                };
                let params = op.input_types(module);
                if !params.is_empty() && avail.is_empty() {
                    continue;
                }
                let args = params
                    .iter()
                    .map(|_| u.choose(&avail[..]).copied())
                    .collect::<arbitrary::Result<SmallVec<[Value; 4]>>>()?;
                body.add_op(op, args, op.output_types(module))
            }
            _ => continue,
        };
        body.append_to_block(entry, value);
        avail.push(value);
    }

    let ret = match avail.last() {
        Some(&value) => value,
        None => {
            let zero = body.add_op(
                Operator::I32Const { value: 0 },
                smallvec![],
                smallvec![Type::I32],
            );
            body.append_to_block(entry, zero);
            zero
        }
    };
    body.end_block(entry, Terminator::Return { values: vec![ret] });
    Ok(body)
}

/// Check that `after` is `before` with exactly the tagging pass's
/// changes applied once. Panics on violation.
pub fn check_tag_invariants(before: &Module, after: &Module) {
    let callees = after
        .funcs()
        .filter(|(_, decl)| decl.name() == tag_helpers::TAG_CALLEE)
        .map(|(func, _)| func)
        .collect::<Vec<_>>();
    assert!(!callees.is_empty());
    if before.func_by_name(tag_helpers::TAG_CALLEE).is_none() {
        assert_eq!(callees.len(), 1);
        assert_eq!(after.funcs.len(), before.funcs.len() + 1);
    } else {
        assert_eq!(after.funcs.len(), before.funcs.len());
    }
    let callee = callees[0];

    for (func, old) in before.funcs() {
        let new = &after.funcs[func];
        assert_eq!(old.name(), new.name());
        let (old_body, new_body) = match (old.body(), new.body()) {
            (Some(o), Some(n)) => (o, n),
            (None, None) => continue,
            _ => panic!("{} changed kind", func),
        };
        let old_insts = &old_body.blocks[old_body.entry].insts;
        let new_insts = &new_body.blocks[new_body.entry].insts;
        if !tag_helpers::is_helper(old) {
            assert_eq!(old_insts, new_insts);
            continue;
        }
        assert_eq!(new_insts.len(), old_insts.len() + 1);
        assert_eq!(&new_insts[1..], &old_insts[..]);
        match &new_body.values[new_insts[0]] {
            ValueDef::Operator(Operator::Call { function_index }, args, _) => {
                assert_eq!(*function_index, callee);
                assert_eq!(args.len(), 1);
                match new_body.values[args[0]] {
                    ValueDef::StrRef(s) => {
                        assert_eq!(after.string(s), tag_helpers::tag_for(old.name()))
                    }
                    ref other => panic!("tag argument is {:?}", other),
                }
            }
            other => panic!("first instruction of {} is {:?}", func, other),
        }
    }
}
