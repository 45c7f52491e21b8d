//! The line parser: turns tokenised lines into [`Builder`] calls.
//!
//! This is the "textual front-end" the specification treats as an external
//! collaborator — only the six [`Builder`] methods it must call are a hard
//! contract. The grammar accepted here is deliberately forgiving about the
//! `,`, `=>` and `->` separators, matching the wire grammar's note that they
//! are "present in the source but not strictly required by the tokeniser".

use crate::builder::Builder;
use crate::common::{id, Id};
use crate::error::Error;
use crate::ir::instr::Instruction;
use crate::ir::value::{Register, Value};
use crate::ir::Program;

use super::lex::{Lexer, Token, TokenKind};

pub fn parse(input: &str) -> Result<Program, Error> {
    let mut builder = Builder::new();
    let mut in_data = false;

    for (idx, raw_line) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens = Lexer::new(trimmed)
            .tokenize()
            .map_err(|e| parse_err(line, e.to_string()))?;
        if tokens.is_empty() {
            continue;
        }

        if tokens[0].kind == TokenKind::Directive {
            match tokens[0].text {
                ".data" => {
                    in_data = true;
                    builder.start_data();
                }
                ".text" => {
                    in_data = false;
                    builder.start_text();
                }
                ".frame" => parse_frame(&mut builder, &tokens[1..], line)?,
                other => return Err(parse_err(line, format!("unknown directive `{other}`"))),
            }
            continue;
        }

        if in_data {
            parse_global(&mut builder, &tokens, line)?;
            continue;
        }

        if tokens.len() == 2 && tokens[0].kind == TokenKind::Ident && tokens[1].kind == TokenKind::Colon {
            builder.push_label(id(tokens[0].text))?;
            continue;
        }

        if tokens[0].kind != TokenKind::Ident {
            return Err(parse_err(line, format!("expected mnemonic, found `{}`", tokens[0].text)));
        }
        parse_mnemonic(&mut builder, tokens[0].text, &tokens[1..], line)?;
    }

    builder.finalize()
}

fn parse_err(line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        line,
        message: message.into(),
    }
}

/// Drops the separator tokens (`,`, `=>`, `->`) that the grammar shows but
/// does not require.
fn filter_punct<'src>(tokens: &[Token<'src>]) -> Vec<Token<'src>> {
    tokens
        .iter()
        .cloned()
        .filter(|t| !matches!(t.kind, TokenKind::Comma | TokenKind::FatArrow | TokenKind::Arrow))
        .collect()
}

struct Operands<'a, 'src> {
    tokens: std::iter::Peekable<std::slice::Iter<'a, Token<'src>>>,
    line: usize,
}

impl<'a, 'src> Operands<'a, 'src> {
    fn new(tokens: &'a [Token<'src>], line: usize) -> Self {
        Operands {
            tokens: tokens.iter().peekable(),
            line,
        }
    }

    fn next_tok(&mut self) -> Result<&'a Token<'src>, Error> {
        self.tokens
            .next()
            .ok_or_else(|| parse_err(self.line, "unexpected end of line"))
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|t| t.kind.clone())
    }

    fn reg(&mut self) -> Result<Register, Error> {
        let t = self.next_tok()?;
        if t.kind != TokenKind::Reg {
            return Err(parse_err(self.line, format!("expected register, found `{}`", t.text)));
        }
        t.text[1..]
            .parse::<u32>()
            .map_err(|_| parse_err(self.line, format!("bad register `{}`", t.text)))
    }

    fn regs_rest(&mut self) -> Result<Vec<Register>, Error> {
        let mut out = Vec::new();
        while self.peek_kind() == Some(TokenKind::Reg) {
            out.push(self.reg()?);
        }
        Ok(out)
    }

    fn ident(&mut self) -> Result<Id, Error> {
        let t = self.next_tok()?;
        if t.kind != TokenKind::Ident {
            return Err(parse_err(
                self.line,
                format!("expected a label or name, found `{}`", t.text),
            ));
        }
        Ok(id(t.text))
    }

    fn num_u32(&mut self) -> Result<u32, Error> {
        let t = self.next_tok()?;
        if t.kind != TokenKind::Num {
            return Err(parse_err(self.line, format!("expected a number, found `{}`", t.text)));
        }
        t.text
            .parse::<u32>()
            .map_err(|_| parse_err(self.line, format!("bad integer literal `{}`", t.text)))
    }

    fn value(&mut self) -> Result<Value, Error> {
        let t = self.next_tok()?;
        match t.kind {
            TokenKind::Num if t.text.contains('.') => t
                .text
                .parse::<f32>()
                .map(Value::Float)
                .map_err(|_| parse_err(self.line, format!("bad float literal `{}`", t.text))),
            TokenKind::Num => t
                .text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| parse_err(self.line, format!("bad integer literal `{}`", t.text))),
            TokenKind::Str => Ok(Value::Str(t.text[1..t.text.len() - 1].to_string())),
            _ => Err(parse_err(self.line, format!("expected a value, found `{}`", t.text))),
        }
    }

    fn end(&mut self) -> Result<(), Error> {
        match self.tokens.next() {
            Some(t) => Err(parse_err(self.line, format!("unexpected trailing token `{}`", t.text))),
            None => Ok(()),
        }
    }
}

fn parse_frame(builder: &mut Builder, tokens: &[Token], line: usize) -> Result<(), Error> {
    let filtered = filter_punct(tokens);
    let mut ops = Operands::new(&filtered, line);
    let name = ops.ident()?;
    let size = ops.num_u32()?;
    let params = ops.regs_rest()?;
    ops.end()?;
    builder.push_frame(name, size, params)
}

fn parse_global(builder: &mut Builder, tokens: &[Token], line: usize) -> Result<(), Error> {
    if tokens.len() < 2 || tokens[0].kind != TokenKind::Ident || tokens[1].kind != TokenKind::Equals {
        return Err(parse_err(line, "expected `name = value` in the data section"));
    }
    let name = id(tokens[0].text);
    let mut ops = Operands::new(&tokens[2..], line);
    let value = ops.value()?;
    ops.end()?;
    builder.push_instr(Instruction::Global { name, value })
}

fn parse_mnemonic(builder: &mut Builder, mnemonic: &str, rest: &[Token], line: usize) -> Result<(), Error> {
    let filtered = filter_punct(rest);
    let mut ops = Operands::new(&filtered, line);

    let instr = match mnemonic {
        "loadI" => {
            let value = ops.value()?;
            let dst = ops.reg()?;
            Instruction::LoadImm { value, dst }
        }
        "i2i" => {
            let src = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::I2I { src, dst }
        }
        "add" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::Add { lhs, rhs, dst }
        }
        "addI" => {
            let lhs = ops.reg()?;
            let rhs = ops.value()?;
            let dst = ops.reg()?;
            Instruction::AddImm { lhs, rhs, dst }
        }
        "mult" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::Mult { lhs, rhs, dst }
        }
        "multI" => {
            let lhs = ops.reg()?;
            let rhs = ops.value()?;
            let dst = ops.reg()?;
            Instruction::MultImm { lhs, rhs, dst }
        }
        "cmp_GT" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::CmpGT { lhs, rhs, dst }
        }
        "cmp_GE" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::CmpGE { lhs, rhs, dst }
        }
        "cmp_LT" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::CmpLT { lhs, rhs, dst }
        }
        "cmp_LE" => {
            let lhs = ops.reg()?;
            let rhs = ops.reg()?;
            let dst = ops.reg()?;
            Instruction::CmpLE { lhs, rhs, dst }
        }
        "cbr" => {
            let src = ops.reg()?;
            let loc = ops.ident()?;
            Instruction::Cbr { src, loc }
        }
        "iwrite" => {
            let src = ops.reg()?;
            Instruction::IWrite { src }
        }
        "ret" => Instruction::Ret,
        "nop" => Instruction::Nop,
        other => return Err(parse_err(line, format!("unknown mnemonic `{other}`"))),
    };
    ops.end()?;
    builder.push_instr(instr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_constant_load_and_print() {
        let program = parse(".frame main, 0\nloadI 7 => r0\niwrite r0\nret\n").unwrap();
        let main = program.functions.get(&id("main")).unwrap();
        assert_eq!(main.blocks.get(&id("__start__")).unwrap().instrs.len(), 3);
    }

    #[test]
    fn s3_loop_program_parses_with_label_and_backedge() {
        let src = ".frame main, 0\n\
                   loadI 3 => r0\n\
                   L:\n\
                   iwrite r0\n\
                   addI r0, -1 => r0\n\
                   loadI 0 => r1\n\
                   cmp_LT r1, r0 => r2\n\
                   cbr r2 -> L\n\
                   ret\n";
        let program = parse(src).unwrap();
        let main = program.functions.get(&id("main")).unwrap();
        assert_eq!(main.blocks.len(), 2);
        assert_eq!(main.blocks.get(&id("__start__")).unwrap().fallthrough, Some(id("L")));
    }

    #[test]
    fn s5_numeric_branch_target_is_parse_error() {
        let src = ".frame main, 0\nloadI 1 => r0\ncbr r0 -> 7\n";
        assert!(matches!(parse(src), Err(Error::Parse { .. })));
    }

    #[test]
    fn commas_and_arrows_are_optional() {
        let with = parse(".frame main, 0\nadd r0, r1 => r2\nret\n").unwrap();
        let without = parse(".frame main, 0\nadd r0 r1 r2\nret\n").unwrap();
        let get = |p: &Program| p.functions.get(&id("main")).unwrap().blocks.get(&id("__start__")).unwrap().instrs.len();
        assert_eq!(get(&with), get(&without));
    }

    #[test]
    fn global_section_round_trips() {
        let src = ".data\ncount = 5\n.text\n.frame main, 0\nret\n";
        let program = parse(src).unwrap();
        assert_eq!(program.globals.get(&id("count")), Some(&Value::Int(5)));
    }
}
