use std::{iter::Peekable, vec::IntoIter};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::Result;

use crate::{
    air::{Instruction, Op, Program},
    error,
    lexer::{tokenize, Token, TokenKind},
    symbol::{Label, Span},
};

/// Transforms source text into a [`Program`]
///
/// One instruction per line: `[label:] MNEMONIC [operand[, operand]]`. A label alone on a line
/// binds to the next instruction. Everything after `;` is a comment.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Tokens without whitespace or comments
    toks: Peekable<IntoIter<Token>>,
    instrs: Vec<Instruction>,
    /// Label definitions seen so far, for duplicate reporting
    labels: IndexMap<&'a str, Span, FxBuildHasher>,
}

/// Label waiting for the instruction it binds to.
struct PendingLabel<'a> {
    name: &'a str,
    span: Span,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Self {
        let toks: Vec<Token> = tokenize(src)
            .into_iter()
            .filter(|tok| !matches!(tok.kind, TokenKind::Whitespace | TokenKind::Comment))
            .collect();
        AsmParser {
            src,
            toks: toks.into_iter().peekable(),
            instrs: Vec::new(),
            labels: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.offs()..span.end()]
    }

    /// Create a program out of the token stream
    pub fn parse(mut self) -> Result<Program> {
        let mut pending: Option<PendingLabel> = None;
        loop {
            let Some(tok) = self.toks.next() else {
                break;
            };
            match tok.kind {
                TokenKind::Newline => continue,
                TokenKind::Eof => break,
                TokenKind::Unknown => return Err(error::lex_unknown(tok.span, self.src)),
                TokenKind::Colon => {
                    return Err(error::parse_generic_unexpected(
                        tok.span,
                        self.src,
                        "label or instruction",
                        tok.kind,
                    ))
                }
                TokenKind::Whitespace | TokenKind::Comment => unreachable!(),
                TokenKind::Word => {}
            }

            // Label definition
            if self.next_is(TokenKind::Colon) {
                self.toks.next();
                if pending.is_some() {
                    return Err(error::parse_stacked_label(tok.span, self.src));
                }
                let name = self.get_span(tok.span);
                if self.labels.insert(name, tok.span).is_some() {
                    return Err(error::parse_duplicate_label(tok.span, self.src));
                }
                pending = Some(PendingLabel {
                    name,
                    span: tok.span,
                });
                continue;
            }

            let label = pending.take();
            self.parse_instr(tok, label)?;
        }

        if let Some(label) = pending {
            // Nothing left for the label to bind to
            return Err(error::parse_eof(label.span, self.src));
        }
        Program::new(self.instrs).map_err(|err| error::load_error(&err))
    }

    fn next_is(&mut self, kind: TokenKind) -> bool {
        self.toks.peek().is_some_and(|tok| tok.kind == kind)
    }

    /// Mnemonic and operands up to the end of the line
    fn parse_instr(&mut self, mnemonic: Token, label: Option<PendingLabel>) -> Result<()> {
        let mut operands: Vec<Token> = Vec::new();
        while let Some(tok) = self.toks.peek().copied() {
            match tok.kind {
                TokenKind::Newline | TokenKind::Eof => break,
                TokenKind::Word => operands.push(tok),
                TokenKind::Unknown => return Err(error::lex_unknown(tok.span, self.src)),
                TokenKind::Colon => {
                    return Err(error::parse_generic_unexpected(
                        tok.span,
                        self.src,
                        "operand",
                        tok.kind,
                    ))
                }
                TokenKind::Whitespace | TokenKind::Comment => unreachable!(),
            }
            self.toks.next();
        }

        let args: Vec<&str> = operands.iter().map(|tok| self.get_span(tok.span)).collect();
        // Bad operands are kept and only fail once stepped
        let op = Op::decode(self.get_span(mnemonic.span), &args);

        let label = label.map(|label| Label::new(label.name));
        self.instrs.push(Instruction::new(label, op));
        Ok(())
    }
}
