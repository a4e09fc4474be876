//! Frontend: convert textual IR to a `Module`.
//!
//! Translation happens in three steps: the text is split into tokens,
//! the tokens are parsed into a syntax tree that still refers to
//! entities by name, and the tree is lowered into IR. Lowering is a
//! separate step so that functions can call functions defined further
//! down in the file, whose signatures are not known while parsing.

use crate::entity::EntityRef;
use crate::errors::FrontendError;
use crate::ir::*;
use crate::Operator;
use anyhow::Result;
use fxhash::FxHashMap;
use log::{debug, trace};
use smallvec::SmallVec;

pub fn text_to_ir(text: &str) -> Result<Module> {
    let tokens = Lexer::new(text).tokenize()?;
    trace!("frontend: {} tokens", tokens.len());
    let parsed = Parser::new(&tokens[..]).parse_module()?;
    let module = lower_module(parsed)?;
    debug!(
        "frontend: parsed module with {} funcs, {} signatures, {} strings",
        module.funcs.len(),
        module.signatures.len(),
        module.strings.len()
    );
    Ok(module)
}

fn syntax_error<T>(line: usize, message: impl Into<String>) -> Result<T, FrontendError> {
    Err(FrontendError::Syntax {
        line,
        message: message.into(),
    })
}

fn type_error<T>(line: usize, message: impl Into<String>) -> Result<T, FrontendError> {
    Err(FrontendError::Type {
        line,
        message: message.into(),
    })
}

fn undefined<T>(line: usize, name: impl Into<String>) -> Result<T, FrontendError> {
    Err(FrontendError::Undefined {
        line,
        name: name.into(),
    })
}

// ---------------------------------------------------------------------
// Lexing.

#[derive(Clone, Debug, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(i128),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Eq,
    Arrow,
}

impl std::fmt::Display for Tok {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Tok::Ident(name) => write!(f, "`{}`", name),
            Tok::Int(value) => write!(f, "integer {}", value),
            Tok::Str(s) => write!(f, "string {:?}", s),
            Tok::LParen => write!(f, "`(`"),
            Tok::RParen => write!(f, "`)`"),
            Tok::LBrace => write!(f, "`{{`"),
            Tok::RBrace => write!(f, "`}}`"),
            Tok::Colon => write!(f, "`:`"),
            Tok::Comma => write!(f, "`,`"),
            Tok::Eq => write!(f, "`=`"),
            Tok::Arrow => write!(f, "`->`"),
        }
    }
}

#[derive(Clone, Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    fn new(text: &str) -> Lexer {
        Lexer {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, FrontendError> {
        Err(FrontendError::Lex {
            line: self.line,
            message: message.into(),
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, FrontendError> {
        let mut tokens = vec![];
        while let Some(c) = self.peek() {
            let single = match c {
                '(' => Some(Tok::LParen),
                ')' => Some(Tok::RParen),
                '{' => Some(Tok::LBrace),
                '}' => Some(Tok::RBrace),
                ':' => Some(Tok::Colon),
                ',' => Some(Tok::Comma),
                '=' => Some(Tok::Eq),
                _ => None,
            };
            if let Some(tok) = single {
                tokens.push(Token {
                    tok,
                    line: self.line,
                });
                self.pos += 1;
                continue;
            }

            match c {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '-' if self.peek_at(1) == Some('>') => {
                    tokens.push(Token {
                        tok: Tok::Arrow,
                        line: self.line,
                    });
                    self.pos += 2;
                }
                '-' | '0'..='9' => {
                    let tok = self.lex_int()?;
                    tokens.push(Token {
                        tok,
                        line: self.line,
                    });
                }
                '"' => {
                    let line = self.line;
                    let tok = self.lex_str()?;
                    tokens.push(Token { tok, line });
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let start = self.pos;
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let ident = self.chars[start..self.pos].iter().collect::<String>();
                    tokens.push(Token {
                        tok: Tok::Ident(ident),
                        line: self.line,
                    });
                }
                other => return self.error(format!("unexpected character {:?}", other)),
            }
        }
        Ok(tokens)
    }

    fn lex_int(&mut self) -> Result<Tok, FrontendError> {
        let negative = self.peek() == Some('-');
        if negative {
            self.pos += 1;
        }
        let radix = if self.peek() == Some('0') && self.peek_at(1) == Some('x') {
            self.pos += 2;
            16
        } else {
            10
        };
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                self.pos += 1;
            } else {
                break;
            }
        }
        let digits = self.chars[start..self.pos].iter().collect::<String>();
        if digits.is_empty() {
            return self.error("expected digits");
        }
        if let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                return self.error(format!("malformed integer literal near {:?}", c));
            }
        }
        let magnitude = match i128::from_str_radix(&digits, radix) {
            Ok(value) => value,
            Err(_) => return self.error(format!("integer literal `{}` out of range", digits)),
        };
        Ok(Tok::Int(if negative { -magnitude } else { magnitude }))
    }

    fn lex_str(&mut self) -> Result<Tok, FrontendError> {
        // Opening quote.
        self.pos += 1;
        let mut s = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => return self.error("unterminated string literal"),
                Some('"') => {
                    self.pos += 1;
                    return Ok(Tok::Str(s));
                }
                Some('\\') => {
                    let escaped = match self.peek_at(1) {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('0') => '\0',
                        other => return self.error(format!("unknown escape {:?}", other)),
                    };
                    s.push(escaped);
                    self.pos += 2;
                }
                Some(c) => {
                    s.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------
// Parsing.

#[derive(Clone, Debug)]
enum ParsedOperand {
    Value(String),
    Str(usize),
}

#[derive(Clone, Debug)]
enum ParsedOp {
    Nop,
    I32Const(i128),
    I64Const(i128),
    Binop(Operator, ParsedOperand, ParsedOperand),
    Call(usize, Vec<ParsedOperand>),
}

#[derive(Clone, Debug)]
struct ParsedInst {
    line: usize,
    result: String,
    op: ParsedOp,
}

#[derive(Clone, Debug)]
struct ParsedTarget {
    block: String,
    args: Vec<ParsedOperand>,
}

#[derive(Clone, Debug)]
enum ParsedTerm {
    Br(ParsedTarget),
    CondBr(ParsedOperand, ParsedTarget, ParsedTarget),
    Return(Vec<ParsedOperand>),
    Unreachable,
}

#[derive(Clone, Debug)]
struct ParsedBlock {
    line: usize,
    name: String,
    params: Vec<(String, Type)>,
    insts: Vec<ParsedInst>,
    term: ParsedTerm,
    term_line: usize,
}

#[derive(Clone, Debug)]
struct ParsedFunc {
    line: usize,
    name: String,
    sig: usize,
    blocks: Option<Vec<ParsedBlock>>,
}

#[derive(Clone, Debug, Default)]
struct ParsedModule {
    sigs: Vec<SignatureData>,
    strings: Vec<String>,
    funcs: Vec<ParsedFunc>,
}

/// Parse `name` as `<prefix><decimal index>`.
fn entity_index(name: &str, prefix: &str) -> Option<usize> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Parser<'t> {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_ident(&self) -> Option<&'t str> {
        match self.peek() {
            Some(Tok::Ident(name)) => Some(&name[..]),
            _ => None,
        }
    }

    /// Line of the current token, or of the last token at end of input.
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn next(&mut self, what: &str) -> Result<&'t Tok, FrontendError> {
        match self.tokens.get(self.pos) {
            Some(token) => {
                self.pos += 1;
                Ok(&token.tok)
            }
            None => syntax_error(self.line(), format!("unexpected end of input, expected {}", what)),
        }
    }

    fn expect(&mut self, expected: Tok) -> Result<(), FrontendError> {
        let line = self.line();
        let tok = self.next(&format!("{}", expected))?;
        if *tok != expected {
            return syntax_error(line, format!("expected {}, found {}", expected, tok));
        }
        Ok(())
    }

    fn eat(&mut self, tok: Tok) -> bool {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<&'t str, FrontendError> {
        let line = self.line();
        match self.next(what)? {
            Tok::Ident(name) => Ok(&name[..]),
            other => syntax_error(line, format!("expected {}, found {}", what, other)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), FrontendError> {
        let line = self.line();
        let ident = self.expect_ident(&format!("`{}`", keyword))?;
        if ident != keyword {
            return syntax_error(line, format!("expected `{}`, found `{}`", keyword, ident));
        }
        Ok(())
    }

    fn expect_entity(&mut self, prefix: &str) -> Result<usize, FrontendError> {
        let line = self.line();
        let what = format!("{}N", prefix);
        let ident = self.expect_ident(&what)?;
        match entity_index(ident, prefix) {
            Some(index) => Ok(index),
            None => syntax_error(line, format!("expected {}, found `{}`", what, ident)),
        }
    }

    fn expect_str(&mut self) -> Result<String, FrontendError> {
        let line = self.line();
        match self.next("string literal")? {
            Tok::Str(s) => Ok(s.clone()),
            other => syntax_error(line, format!("expected string literal, found {}", other)),
        }
    }

    fn expect_int(&mut self) -> Result<i128, FrontendError> {
        let line = self.line();
        match self.next("integer literal")? {
            Tok::Int(value) => Ok(*value),
            other => syntax_error(line, format!("expected integer literal, found {}", other)),
        }
    }

    fn expect_type(&mut self) -> Result<Type, FrontendError> {
        let line = self.line();
        let name = self.expect_ident("type")?;
        match Type::from_name(name) {
            Some(ty) => Ok(ty),
            None => syntax_error(line, format!("unknown type `{}`", name)),
        }
    }

    /// `<open> item, item, ... <close>`, possibly empty.
    fn comma_list<T, F: FnMut(&mut Self) -> Result<T, FrontendError>>(
        &mut self,
        open: Tok,
        close: Tok,
        mut item: F,
    ) -> Result<Vec<T>, FrontendError> {
        self.expect(open)?;
        let mut items = vec![];
        if self.eat(close.clone()) {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat(close.clone()) {
                return Ok(items);
            }
            self.expect(Tok::Comma)?;
        }
    }

    fn parse_module(mut self) -> Result<ParsedModule, FrontendError> {
        let mut module = ParsedModule::default();
        self.expect_keyword("module")?;
        self.expect(Tok::LBrace)?;
        while !self.eat(Tok::RBrace) {
            let line = self.line();
            let ident = self.expect_ident("module item")?;
            if let Some(index) = entity_index(ident, Signature::PREFIX) {
                if index != module.sigs.len() {
                    return syntax_error(
                        line,
                        format!("expected sig{}, found `{}`", module.sigs.len(), ident),
                    );
                }
                self.expect(Tok::Eq)?;
                let params = self.comma_list(Tok::LParen, Tok::RParen, |p| p.expect_type())?;
                self.expect(Tok::Arrow)?;
                let returns = self.comma_list(Tok::LParen, Tok::RParen, |p| p.expect_type())?;
                if returns.len() > 1 {
                    return type_error(line, "functions return at most one value");
                }
                module.sigs.push(SignatureData { params, returns });
            } else if let Some(index) = entity_index(ident, StrConst::PREFIX) {
                if index != module.strings.len() {
                    return syntax_error(
                        line,
                        format!("expected str{}, found `{}`", module.strings.len(), ident),
                    );
                }
                self.expect(Tok::Eq)?;
                let s = self.expect_str()?;
                module.strings.push(s);
            } else if let Some(index) = entity_index(ident, Func::PREFIX) {
                if index != module.funcs.len() {
                    return syntax_error(
                        line,
                        format!("expected func{}, found `{}`", module.funcs.len(), ident),
                    );
                }
                let func = self.parse_func(line)?;
                module.funcs.push(func);
            } else {
                return syntax_error(line, format!("expected module item, found `{}`", ident));
            }
        }
        if self.pos != self.tokens.len() {
            return syntax_error(self.line(), "trailing input after module");
        }
        Ok(module)
    }

    fn parse_func(&mut self, line: usize) -> Result<ParsedFunc, FrontendError> {
        self.expect(Tok::Eq)?;
        let kind_line = self.line();
        let kind = self.expect_ident("`import` or `func`")?;
        let name = self.expect_str()?;
        self.expect(Tok::Colon)?;
        let sig = self.expect_entity(Signature::PREFIX)?;
        let blocks = match kind {
            "import" => None,
            "func" => {
                self.expect(Tok::LBrace)?;
                let mut blocks = vec![];
                while !self.eat(Tok::RBrace) {
                    blocks.push(self.parse_block()?);
                }
                if blocks.is_empty() {
                    return syntax_error(line, format!("function \"{}\" has no blocks", name));
                }
                Some(blocks)
            }
            other => {
                return syntax_error(
                    kind_line,
                    format!("expected `import` or `func`, found `{}`", other),
                )
            }
        };
        Ok(ParsedFunc {
            line,
            name,
            sig,
            blocks,
        })
    }

    fn parse_value_name(&mut self) -> Result<String, FrontendError> {
        let index = self.expect_entity(Value::PREFIX)?;
        Ok(format!("{}{}", Value::PREFIX, index))
    }

    fn parse_block_name(&mut self) -> Result<String, FrontendError> {
        let index = self.expect_entity(Block::PREFIX)?;
        Ok(format!("{}{}", Block::PREFIX, index))
    }

    fn at_operand(&self) -> bool {
        match self.peek_ident() {
            Some(name) => {
                entity_index(name, Value::PREFIX).is_some()
                    || entity_index(name, StrConst::PREFIX).is_some()
            }
            None => false,
        }
    }

    fn parse_operand(&mut self) -> Result<ParsedOperand, FrontendError> {
        let line = self.line();
        let name = self.expect_ident("operand")?;
        if let Some(index) = entity_index(name, StrConst::PREFIX) {
            Ok(ParsedOperand::Str(index))
        } else if let Some(index) = entity_index(name, Value::PREFIX) {
            Ok(ParsedOperand::Value(format!("{}{}", Value::PREFIX, index)))
        } else {
            syntax_error(line, format!("expected value or string operand, found `{}`", name))
        }
    }

    fn parse_target(&mut self) -> Result<ParsedTarget, FrontendError> {
        let block = self.parse_block_name()?;
        let args = self.comma_list(Tok::LParen, Tok::RParen, |p| p.parse_operand())?;
        Ok(ParsedTarget { block, args })
    }

    fn parse_block(&mut self) -> Result<ParsedBlock, FrontendError> {
        let line = self.line();
        let name = self.parse_block_name()?;
        let params = self.comma_list(Tok::LParen, Tok::RParen, |p| {
            let name = p.parse_value_name()?;
            p.expect(Tok::Colon)?;
            let ty = p.expect_type()?;
            Ok((name, ty))
        })?;
        self.expect(Tok::Colon)?;

        let mut insts = vec![];
        loop {
            let term_line = self.line();
            let keyword = self.expect_ident("instruction or terminator")?;
            if let Some(index) = entity_index(keyword, Value::PREFIX) {
                self.expect(Tok::Eq)?;
                let op = self.parse_op()?;
                insts.push(ParsedInst {
                    line: term_line,
                    result: format!("{}{}", Value::PREFIX, index),
                    op,
                });
                continue;
            }
            let term = match keyword {
                "br" => ParsedTerm::Br(self.parse_target()?),
                "if" => {
                    let cond = self.parse_operand()?;
                    self.expect(Tok::Comma)?;
                    let if_true = self.parse_target()?;
                    self.expect(Tok::Comma)?;
                    let if_false = self.parse_target()?;
                    ParsedTerm::CondBr(cond, if_true, if_false)
                }
                "return" => {
                    let mut values = vec![];
                    if self.at_operand() {
                        values.push(self.parse_operand()?);
                        while self.eat(Tok::Comma) {
                            values.push(self.parse_operand()?);
                        }
                    }
                    ParsedTerm::Return(values)
                }
                "unreachable" => ParsedTerm::Unreachable,
                other => {
                    return syntax_error(
                        term_line,
                        format!("expected instruction or terminator, found `{}`", other),
                    )
                }
            };
            return Ok(ParsedBlock {
                line,
                name,
                params,
                insts,
                term,
                term_line,
            });
        }
    }

    fn parse_op(&mut self) -> Result<ParsedOp, FrontendError> {
        let line = self.line();
        let mnemonic = self.expect_ident("operator")?;
        let op = match mnemonic {
            "nop" => ParsedOp::Nop,
            "i32.const" => ParsedOp::I32Const(self.expect_int()?),
            "i64.const" => ParsedOp::I64Const(self.expect_int()?),
            "call" => {
                let callee = self.expect_entity(Func::PREFIX)?;
                let args = self.comma_list(Tok::LParen, Tok::RParen, |p| p.parse_operand())?;
                ParsedOp::Call(callee, args)
            }
            other => match Operator::binop_from_mnemonic(other) {
                Some(op) => {
                    let lhs = self.parse_operand()?;
                    self.expect(Tok::Comma)?;
                    let rhs = self.parse_operand()?;
                    ParsedOp::Binop(op, lhs, rhs)
                }
                None => return syntax_error(line, format!("unknown operator `{}`", other)),
            },
        };
        Ok(op)
    }
}

// ---------------------------------------------------------------------
// Lowering.

fn lower_module(parsed: ParsedModule) -> Result<Module, FrontendError> {
    let mut module = Module::empty();
    for sig in parsed.sigs {
        // Pushed directly, not interned, so indices survive a print/parse
        // round trip.
        module.signatures.push(sig);
    }
    for s in parsed.strings {
        module.add_string(s);
    }

    // Declare every function first so that calls may refer forward.
    for func in &parsed.funcs {
        if func.sig >= module.signatures.len() {
            return undefined(func.line, format!("sig{}", func.sig));
        }
        let sig = Signature::new(func.sig);
        let decl = match func.blocks {
            None => FuncDecl::Import(sig, func.name.clone()),
            Some(_) => FuncDecl::Body(sig, func.name.clone(), FunctionBody::default()),
        };
        module.add_func(decl);
    }

    for (index, func) in parsed.funcs.iter().enumerate() {
        if let Some(blocks) = &func.blocks {
            let id = Func::new(index);
            let sig = module.funcs[id].sig();
            let lowered = FunctionLowering::new(&module, sig).lower(&blocks[..])?;
            trace!("frontend: lowered {}:\n{}", id, lowered.display_verbose("| "));
            if let Some(body) = module.funcs[id].body_mut() {
                *body = lowered;
            }
        }
    }

    Ok(module)
}

struct FunctionLowering<'m> {
    module: &'m Module,
    body: FunctionBody,
    values: FxHashMap<String, Value>,
    blocks: FxHashMap<String, Block>,
}

impl<'m> FunctionLowering<'m> {
    fn new(module: &'m Module, sig: Signature) -> Self {
        FunctionLowering {
            module,
            body: FunctionBody::new(module, sig),
            values: FxHashMap::default(),
            blocks: FxHashMap::default(),
        }
    }

    fn define(&mut self, line: usize, name: &str, value: Value) -> Result<(), FrontendError> {
        if self.values.insert(name.to_owned(), value).is_some() {
            return syntax_error(line, format!("redefinition of `{}`", name));
        }
        Ok(())
    }

    fn lower(mut self, parsed: &[ParsedBlock]) -> Result<FunctionBody, FrontendError> {
        // Create all blocks and their params up front: branches may
        // target blocks defined later.
        let mut ids = vec![];
        for (i, pb) in parsed.iter().enumerate() {
            if self.blocks.contains_key(&pb.name) {
                return syntax_error(pb.line, format!("redefinition of `{}`", pb.name));
            }
            let block = if i == 0 {
                let entry = self.body.entry;
                let expected = self.body.blocks[entry]
                    .params
                    .iter()
                    .map(|&(ty, _)| ty)
                    .collect::<Vec<_>>();
                let actual = pb.params.iter().map(|&(_, ty)| ty).collect::<Vec<_>>();
                if expected != actual {
                    return type_error(
                        pb.line,
                        format!(
                            "entry block params {:?} do not match signature params {:?}",
                            actual, expected
                        ),
                    );
                }
                let values = self.body.blocks[entry]
                    .params
                    .iter()
                    .map(|&(_, value)| value)
                    .collect::<Vec<_>>();
                for ((name, _), value) in pb.params.iter().zip(values) {
                    self.define(pb.line, name, value)?;
                }
                entry
            } else {
                let block = self.body.add_block();
                for (name, ty) in &pb.params {
                    let value = self.body.add_blockparam(block, *ty);
                    self.define(pb.line, name, value)?;
                }
                block
            };
            self.blocks.insert(pb.name.clone(), block);
            ids.push(block);
        }

        for (pb, &block) in parsed.iter().zip(ids.iter()) {
            for inst in &pb.insts {
                self.lower_inst(block, inst)?;
            }
            let term = self.lower_term(pb.term_line, &pb.term)?;
            self.body.end_block(block, term);
        }

        Ok(self.body)
    }

    fn operand(&mut self, line: usize, operand: &ParsedOperand) -> Result<Value, FrontendError> {
        match operand {
            ParsedOperand::Value(name) => match self.values.get(name) {
                Some(&value) => Ok(value),
                None => undefined(line, name.clone()),
            },
            ParsedOperand::Str(index) => {
                if *index >= self.module.strings.len() {
                    return undefined(line, format!("str{}", index));
                }
                Ok(self
                    .body
                    .add_value(ValueDef::StrRef(StrConst::new(*index))))
            }
        }
    }

    fn operands(
        &mut self,
        line: usize,
        operands: &[ParsedOperand],
    ) -> Result<SmallVec<[Value; 4]>, FrontendError> {
        operands.iter().map(|o| self.operand(line, o)).collect()
    }

    /// Check that `values` have exactly the types `expected`.
    fn check_types(
        &self,
        line: usize,
        what: &str,
        values: &[Value],
        expected: &[Type],
    ) -> Result<(), FrontendError> {
        if values.len() != expected.len() {
            return type_error(
                line,
                format!(
                    "{} expects {} operand(s), found {}",
                    what,
                    expected.len(),
                    values.len()
                ),
            );
        }
        for (i, (&value, &ty)) in values.iter().zip(expected.iter()).enumerate() {
            match self.body.values[value].ty() {
                Some(actual) if actual == ty => {}
                Some(actual) => {
                    return type_error(
                        line,
                        format!("{} operand {}: expected {}, found {}", what, i, ty, actual),
                    )
                }
                None => {
                    return type_error(
                        line,
                        format!("{} operand {}: value produces no result", what, i),
                    )
                }
            }
        }
        Ok(())
    }

    fn lower_inst(&mut self, block: Block, inst: &ParsedInst) -> Result<(), FrontendError> {
        let line = inst.line;
        let (op, args) = match &inst.op {
            ParsedOp::Nop => (Operator::Nop, SmallVec::new()),
            &ParsedOp::I32Const(value) => {
                if value < i32::MIN as i128 || value > u32::MAX as i128 {
                    return type_error(line, format!("{} does not fit in i32", value));
                }
                let value = if value < 0 { value as i32 as u32 } else { value as u32 };
                (Operator::I32Const { value }, SmallVec::new())
            }
            &ParsedOp::I64Const(value) => {
                if value < i64::MIN as i128 || value > u64::MAX as i128 {
                    return type_error(line, format!("{} does not fit in i64", value));
                }
                let value = if value < 0 { value as i64 as u64 } else { value as u64 };
                (Operator::I64Const { value }, SmallVec::new())
            }
            ParsedOp::Binop(op, lhs, rhs) => {
                let lhs = self.operand(line, lhs)?;
                let rhs = self.operand(line, rhs)?;
                (*op, SmallVec::from_slice(&[lhs, rhs]))
            }
            ParsedOp::Call(callee, args) => {
                if *callee >= self.module.funcs.len() {
                    return undefined(line, format!("func{}", callee));
                }
                let args = self.operands(line, &args[..])?;
                (
                    Operator::Call {
                        function_index: Func::new(*callee),
                    },
                    args,
                )
            }
        };
        let inputs = op.input_types(self.module);
        self.check_types(line, &format!("`{}`", op), &args[..], &inputs[..])?;
        let outputs = op.output_types(self.module);
        let value = self.body.add_op(op, args, outputs);
        self.body.append_to_block(block, value);
        self.define(line, &inst.result, value)
    }

    fn lower_target(
        &mut self,
        line: usize,
        target: &ParsedTarget,
    ) -> Result<BlockTarget, FrontendError> {
        let block = match self.blocks.get(&target.block) {
            Some(&block) => block,
            None => return undefined(line, target.block.clone()),
        };
        let args = self.operands(line, &target.args[..])?;
        let params = self.body.blocks[block]
            .params
            .iter()
            .map(|&(ty, _)| ty)
            .collect::<Vec<_>>();
        self.check_types(line, &format!("branch to {}", target.block), &args[..], &params[..])?;
        Ok(BlockTarget {
            block,
            args: args.into_vec(),
        })
    }

    fn lower_term(&mut self, line: usize, term: &ParsedTerm) -> Result<Terminator, FrontendError> {
        let term = match term {
            ParsedTerm::Br(target) => Terminator::Br {
                target: self.lower_target(line, target)?,
            },
            ParsedTerm::CondBr(cond, if_true, if_false) => {
                let cond = self.operand(line, cond)?;
                self.check_types(line, "`if`", &[cond], &[Type::I32])?;
                Terminator::CondBr {
                    cond,
                    if_true: self.lower_target(line, if_true)?,
                    if_false: self.lower_target(line, if_false)?,
                }
            }
            ParsedTerm::Return(values) => {
                let values = self.operands(line, &values[..])?;
                let rets = self.body.rets.clone();
                self.check_types(line, "`return`", &values[..], &rets[..])?;
                Terminator::Return {
                    values: values.into_vec(),
                }
            }
            ParsedTerm::Unreachable => Terminator::Unreachable,
        };
        Ok(term)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn frontend_error(text: &str) -> FrontendError {
        let err = text_to_ir(text).unwrap_err();
        err.downcast_ref::<FrontendError>()
            .expect("expected a FrontendError")
            .clone()
    }

    const SIMPLE: &str = r#"
module {
  sig0 = (ptr) -> (i32)
  sig1 = (i32) -> (i32)
  str0 = "hello \"world\"\n"
  func0 = import "print_tagged_helper" : sig0
  func1 = func "helper_add_one" : sig1 {
    block0(v0: i32):
      v1 = i32.const 1
      v2 = i32.add v0, v1
      v3 = call func0(str0)  # discard the status
      br block1(v2)
    block1(v4: i32):
      return v4
  }
}
"#;

    #[test]
    fn parses_simple_module() {
        let module = text_to_ir(SIMPLE).unwrap();
        assert_eq!(module.funcs.len(), 2);
        assert_eq!(module.signatures.len(), 2);
        assert_eq!(module.string(StrConst::new(0)), "hello \"world\"\n");

        let helper = module.func_by_name("helper_add_one").unwrap();
        let body = module.funcs[helper].body().unwrap();
        assert_eq!(body.blocks.len(), 2);
        assert_eq!(body.blocks[body.entry].insts.len(), 3);
        assert!(module.funcs[Func::new(0)].is_declaration());

        let call = body.blocks[body.entry].insts[2];
        match &body.values[call] {
            ValueDef::Operator(Operator::Call { function_index }, args, tys) => {
                assert_eq!(*function_index, Func::new(0));
                assert_eq!(tys.as_slice(), &[Type::I32]);
                assert_eq!(body.values[args[0]], ValueDef::StrRef(StrConst::new(0)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn print_then_parse_is_stable() {
        let module = text_to_ir(SIMPLE).unwrap();
        let printed = format!("{}", module.display());
        let reparsed = text_to_ir(&printed).unwrap();
        assert_eq!(printed, format!("{}", reparsed.display()));
        let verbose = format!("{}", module.display_verbose());
        let reparsed = text_to_ir(&verbose).unwrap();
        assert_eq!(printed, format!("{}", reparsed.display()));
    }

    #[test]
    fn calls_may_refer_forward() {
        let module = text_to_ir(
            r#"module {
                 sig0 = () -> (i64)
                 func0 = func "main" : sig0 {
                   block0():
                     v0 = call func1()
                     return v0
                 }
                 func1 = func "helper_value" : sig0 {
                   block0():
                     v0 = i64.const -1
                     return v0
                 }
               }"#,
        )
        .unwrap();
        let body = module.funcs[Func::new(1)].body().unwrap();
        let konst = body.blocks[body.entry].insts[0];
        assert_eq!(
            body.values[konst],
            ValueDef::Operator(
                Operator::I64Const { value: u64::MAX },
                SmallVec::new(),
                SmallVec::from_slice(&[Type::I64])
            )
        );
    }

    #[test]
    fn empty_module() {
        let module = text_to_ir("module { }").unwrap();
        assert!(module.funcs.is_empty());
        assert_eq!(format!("{}", module.display()), "module {\n}\n");
    }

    #[test]
    fn reports_unknown_operator() {
        let err = frontend_error(
            "module {\n sig0 = () -> ()\n func0 = func \"f\" : sig0 {\n block0():\n v0 = i32.frob\n return\n }\n}",
        );
        assert_eq!(err.line(), 5);
        assert!(matches!(err, FrontendError::Syntax { .. }));
    }

    #[test]
    fn reports_undefined_value() {
        let err = frontend_error(
            "module {\n sig0 = () -> (i32)\n func0 = func \"f\" : sig0 {\n block0():\n return v7\n }\n}",
        );
        assert_eq!(
            err,
            FrontendError::Undefined {
                line: 5,
                name: "v7".to_owned()
            }
        );
    }

    #[test]
    fn reports_undefined_callee_and_signature() {
        let err = frontend_error(
            "module {\n sig0 = () -> ()\n func0 = func \"f\" : sig0 {\n block0():\n v0 = call func3()\n return\n }\n}",
        );
        assert!(matches!(err, FrontendError::Undefined { ref name, .. } if name == "func3"));
        let err = frontend_error("module {\n func0 = import \"g\" : sig2\n}");
        assert!(matches!(err, FrontendError::Undefined { ref name, .. } if name == "sig2"));
    }

    #[test]
    fn reports_type_mismatch() {
        let err = frontend_error(
            "module {\n sig0 = (i64) -> (i32)\n func0 = func \"f\" : sig0 {\n block0(v0: i64):\n v1 = i32.const 1\n v2 = i32.add v0, v1\n return v2\n }\n}",
        );
        assert_eq!(err.line(), 6);
        assert!(matches!(err, FrontendError::Type { .. }));
    }

    #[test]
    fn reports_entry_param_mismatch() {
        let err = frontend_error(
            "module {\n sig0 = (i32) -> ()\n func0 = func \"f\" : sig0 {\n block0():\n return\n }\n}",
        );
        assert!(matches!(err, FrontendError::Type { line: 4, .. }));
    }

    #[test]
    fn reports_out_of_order_entities() {
        let err = frontend_error("module {\n sig1 = () -> ()\n}");
        assert!(matches!(err, FrontendError::Syntax { line: 2, .. }));
    }

    #[test]
    fn reports_unterminated_string() {
        let err = frontend_error("module {\n str0 = \"oops\n}");
        assert!(matches!(err, FrontendError::Lex { line: 2, .. }));
    }

    #[test]
    fn reports_redefinition() {
        let err = frontend_error(
            "module {\n sig0 = () -> ()\n func0 = func \"f\" : sig0 {\n block0():\n v0 = nop\n v0 = nop\n return\n }\n}",
        );
        assert!(matches!(err, FrontendError::Syntax { line: 6, .. }));
    }

    #[test]
    fn comments_do_not_apply_inside_strings() {
        let module = text_to_ir("module { # a module\n str0 = \"#not a comment\" }").unwrap();
        assert_eq!(module.string(StrConst::new(0)), "#not a comment");
    }
}
