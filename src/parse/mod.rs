//! Pipeline expressions.
//!
//! A small shell-like notation that builds a chain of [`Command`]s:
//!
//! | syntax        | meaning                                             |
//! |---------------|-----------------------------------------------------|
//! | `a \| b`      | `a`'s stdout feeds `b`'s stdin                      |
//! | `a 2\| b`     | `a`'s stderr feeds `b`                              |
//! | `a \|& b`     | `a`'s stdout and stderr, interleaved, feed `b`      |
//! | `a ; b`       | `b` starts after `a` has finished                   |
//! | `b <<< "txt"` | `b` reads `txt` plus a newline                      |
//! | `... &`       | the final command runs concurrently                 |
//!
//! Parsing returns the last command of the chain; running it runs everything
//! upstream.

use std::ops::Range;

use logos::Logos;
use thiserror::Error;

use crate::{cmd::Command, error::CommandError, process::Channel, shell::Shell};

use self::token::Token;

pub mod token;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unrecognized input {slice:?} at {span:?}")]
    Lexer { span: Range<usize>, slice: String },
    #[error("expected a command at {0}")]
    EmptyCommand(usize),
    #[error("`{0}` is missing a command on its right")]
    DanglingOperator(&'static str),
    #[error("`<<<` must be followed by a word or string")]
    MissingHereString,
    #[error("`{0}` already reads from a pipe and cannot take a here-string")]
    ConflictingInput(String),
    #[error("`&` is only allowed at the end of an expression")]
    MisplacedBackground,
    #[error("{0:?} cannot be quoted for the shell")]
    Unquotable(String),
    #[error(transparent)]
    Composition(#[from] CommandError),
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Pipe(Channel),
    Sequence,
}

impl Link {
    fn symbol(self) -> &'static str {
        match self {
            Self::Pipe(Channel::Stdout) => "|",
            Self::Pipe(Channel::Stderr) => "2|",
            Self::Pipe(Channel::Combined) => "|&",
            Self::Sequence => ";",
        }
    }
}

/// A command still being collected, plus how it attaches to what came before.
#[derive(Default)]
struct Pending {
    words: Vec<String>,
    here: Option<String>,
    start: usize,
}

/// What the previous word or string token went into.
#[derive(Debug, Clone, Copy)]
enum Piece {
    Word,
    Here,
}

impl Pending {
    /// Adds one word or string token. Tokens with no whitespace in between
    /// form a single word, as in sh: `joined` is where the previous one went.
    ///
    /// `rendered` is the token as the shell should see it, `raw` its plain
    /// text for here-strings.
    fn push(&mut self, joined: Option<Piece>, rendered: String, raw: &str) -> Piece {
        match (joined, self.words.last_mut()) {
            (Some(Piece::Here), _) => {
                self.here.get_or_insert_with(String::new).push_str(raw);
                return Piece::Here;
            }
            (Some(Piece::Word), Some(last)) => last.push_str(&rendered),
            _ => self.words.push(rendered),
        }

        Piece::Word
    }
}

pub fn parse_pipeline(shell: &Shell, expr: &str) -> Result<Command, ParseError> {
    let mut lexer = Token::lexer(expr);

    let mut pending = Pending::default();
    let mut upstream: Option<(Command, Link)> = None;
    let mut last: Option<Command> = None;
    let mut background = false;
    let mut glue: Option<(usize, Piece)> = None;

    while let Some(token) = lexer.next() {
        let span = lexer.span();

        let Ok(token) = token else {
            return Err(ParseError::Lexer {
                slice: lexer.slice().to_owned(),
                span,
            });
        };

        if background && !matches!(token, Token::Comment(_)) {
            return Err(ParseError::MisplacedBackground);
        }

        if pending.words.is_empty() && pending.here.is_none() {
            pending.start = span.start;
        }

        let joined = glue
            .take()
            .filter(|(end, _)| *end == span.start)
            .map(|(_, piece)| piece);

        match token {
            Token::Comment(_) => continue,
            Token::Word(word) => {
                let piece = pending.push(joined, word.to_owned(), word);
                glue = Some((span.end, piece));
            }
            Token::DoubleQuotedString(s) | Token::SingleQuotedString(s) => {
                let piece = pending.push(joined, quote(shell, &s)?, &s);
                glue = Some((span.end, piece));
            }
            Token::HereString => {
                let payload = match lexer.next() {
                    Some(Ok(Token::Word(word))) => word.to_owned(),
                    Some(Ok(Token::DoubleQuotedString(s) | Token::SingleQuotedString(s))) => s,
                    _ => return Err(ParseError::MissingHereString),
                };
                pending.here = Some(payload);
                glue = Some((lexer.span().end, Piece::Here));
            }
            Token::Background => background = true,
            Token::Pipe | Token::PipeStderr | Token::PipeCombined | Token::Semi => {
                let link = match token {
                    Token::Pipe => Link::Pipe(Channel::Stdout),
                    Token::PipeStderr => Link::Pipe(Channel::Stderr),
                    Token::PipeCombined => Link::Pipe(Channel::Combined),
                    _ => Link::Sequence,
                };

                let cmd = complete(shell, std::mem::take(&mut pending), upstream.take())?;
                pending.start = span.end;
                upstream = Some((cmd, link));
            }
        }
    }

    if !pending.words.is_empty() || pending.here.is_some() {
        last = Some(complete(shell, pending, upstream.take())?);
    }

    if let Some((_, link)) = upstream {
        return Err(ParseError::DanglingOperator(link.symbol()));
    }

    let cmd = last.ok_or(ParseError::EmptyCommand(0))?;

    Ok(if background { cmd.concurrent() } else { cmd })
}

fn complete(
    shell: &Shell,
    pending: Pending,
    upstream: Option<(Command, Link)>,
) -> Result<Command, ParseError> {
    let Pending { words, here, start } = pending;

    let mut words = words.into_iter();
    let program = words.next().ok_or(ParseError::EmptyCommand(start))?;
    let mut cmd = shell.command(program).args(words);

    if let Some(payload) = here {
        if matches!(upstream, Some((_, Link::Pipe(_)))) {
            return Err(ParseError::ConflictingInput(cmd.program().to_owned()));
        }
        cmd = cmd.pipe_literal(payload + "\n");
    }

    Ok(match upstream {
        None => cmd,
        Some((source, Link::Pipe(channel))) => cmd.pipe_from(&source, channel)?,
        Some((predecessor, Link::Sequence)) => cmd.after(&predecessor)?,
    })
}

/// Re-quotes a string literal so the shell sees it as a single word.
fn quote(shell: &Shell, s: &str) -> Result<String, ParseError> {
    if shell.config().direct {
        return Ok(s.to_owned());
    }

    shlex::try_quote(s)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| ParseError::Unquotable(s.to_owned()))
}
