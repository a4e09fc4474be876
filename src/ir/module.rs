use super::{Func, FuncDecl, ModuleDisplay, Signature, StrConst, Type};
use crate::entity::EntityVec;
use crate::frontend;
use anyhow::Result;

/// A compilation unit: the functions (definitions and external
/// declarations) being processed, plus the signatures and string
/// constants they refer to.
///
/// The ordinary flow for a tool that processes a module is:
///
/// - Parse textual IR with `Module::from_text()`, or build one up from
///   `Module::empty()`.
/// - Run passes over it, e.g. through a `pass::PassManager`.
/// - Print the result with `Module::display()`.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The functions in this module, in declaration order.
    pub funcs: EntityVec<Func, FuncDecl>,
    /// Type signatures, referred to by `funcs`. Interned: no two
    /// entries are equal when built through `get_or_insert_signature`.
    pub signatures: EntityVec<Signature, SignatureData>,
    /// Module-level string constants.
    pub strings: EntityVec<StrConst, String>,
}

/// A function signature definition.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignatureData {
    pub params: Vec<Type>,
    /// Zero or one types in practice; calls produce at most one value.
    pub returns: Vec<Type>,
}

impl std::fmt::Display for SignatureData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let params = self
            .params
            .iter()
            .map(|ty| format!("{}", ty))
            .collect::<Vec<_>>();
        let returns = self
            .returns
            .iter()
            .map(|ty| format!("{}", ty))
            .collect::<Vec<_>>();
        write!(f, "({}) -> ({})", params.join(", "), returns.join(", "))
    }
}

impl Module {
    /// Create a new empty module, ready for entities to be added.
    pub fn empty() -> Module {
        Module::default()
    }

    /// Parse a module from its textual IR form.
    pub fn from_text(text: &str) -> Result<Module> {
        frontend::text_to_ir(text)
    }

    pub fn signature(&self, sig: Signature) -> &SignatureData {
        &self.signatures[sig]
    }

    /// Find or add a signature equal to `data`.
    pub fn get_or_insert_signature(&mut self, data: SignatureData) -> Signature {
        if let Some(sig) = self.signatures.position(|d| *d == data) {
            return sig;
        }
        let sig = self.signatures.push(data);
        log::trace!("get_or_insert_signature: new {}", sig);
        sig
    }

    /// The first function with the given symbol name, if any.
    pub fn func_by_name(&self, name: &str) -> Option<Func> {
        self.funcs.position(|decl| decl.name() == name)
    }

    /// Return the function bound to `name`, declaring it as an
    /// external symbol of signature `data` if it is not present yet.
    /// Asking twice never creates a duplicate. If the existing symbol
    /// has a different signature, it is returned anyway.
    pub fn get_or_insert_function(&mut self, name: &str, data: SignatureData) -> Func {
        if let Some(func) = self.func_by_name(name) {
            let existing = self.signature(self.funcs[func].sig());
            if *existing != data {
                log::warn!(
                    "symbol `{}` already bound as {} with signature {}, requested {}",
                    name,
                    func,
                    existing,
                    data
                );
            }
            return func;
        }
        let sig = self.get_or_insert_signature(data);
        let func = self.funcs.push(FuncDecl::Import(sig, name.to_owned()));
        log::debug!("declared external function `{}` as {}", name, func);
        func
    }

    pub fn add_func(&mut self, decl: FuncDecl) -> Func {
        self.funcs.push(decl)
    }

    pub fn add_string(&mut self, s: String) -> StrConst {
        self.strings.push(s)
    }

    pub fn string(&self, s: StrConst) -> &str {
        &self.strings[s][..]
    }

    pub fn funcs<'b>(&'b self) -> impl Iterator<Item = (Func, &'b FuncDecl)> + 'b {
        self.funcs.entries()
    }

    /// Return a wrapper that implements Display on this module,
    /// pretty-printing it as textual IR.
    pub fn display<'b>(&'b self) -> ModuleDisplay<'b> {
        ModuleDisplay {
            module: self,
            verbose: false,
        }
    }

    /// Like `display()`, with edge and type annotations as comments.
    pub fn display_verbose<'b>(&'b self) -> ModuleDisplay<'b> {
        ModuleDisplay {
            module: self,
            verbose: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn puts_sig() -> SignatureData {
        SignatureData {
            params: vec![Type::Ptr],
            returns: vec![Type::I32],
        }
    }

    #[test]
    fn signatures_are_interned() {
        let mut module = Module::empty();
        let a = module.get_or_insert_signature(puts_sig());
        let b = module.get_or_insert_signature(puts_sig());
        let c = module.get_or_insert_signature(SignatureData {
            params: vec![],
            returns: vec![],
        });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(module.signatures.len(), 2);
    }

    #[test]
    fn get_or_insert_function_is_idempotent() {
        let mut module = Module::empty();
        let f1 = module.get_or_insert_function("puts", puts_sig());
        let f2 = module.get_or_insert_function("puts", puts_sig());
        assert_eq!(f1, f2);
        assert_eq!(module.funcs.len(), 1);
        assert!(module.funcs[f1].is_declaration());
        assert_eq!(module.func_by_name("puts"), Some(f1));
    }

    #[test]
    fn get_or_insert_function_keeps_existing_binding() {
        let mut module = Module::empty();
        let other = module.get_or_insert_signature(SignatureData {
            params: vec![],
            returns: vec![],
        });
        let existing = module.add_func(FuncDecl::Import(other, "puts".to_owned()));
        let func = module.get_or_insert_function("puts", puts_sig());
        assert_eq!(func, existing);
        assert_eq!(module.funcs[func].sig(), other);
        assert_eq!(module.funcs.len(), 1);
    }

    #[test]
    fn signature_display() {
        assert_eq!(format!("{}", puts_sig()), "(ptr) -> (i32)");
    }
}
