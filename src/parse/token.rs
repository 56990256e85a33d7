use logos::{Lexer, Logos};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Default, Error)]
pub enum LexerError {
    #[default]
    #[error("unknown token")]
    UnknownToken,
}

#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(skip r"[ \t\n\r\f]+", error = LexerError)]
pub enum Token<'a> {
    #[token("|")]
    Pipe,
    #[token("2|")]
    PipeStderr,
    #[token("|&")]
    PipeCombined,
    #[token(";")]
    Semi,
    #[token("<<<")]
    HereString,
    #[token("&")]
    Background,

    // `#` only starts a comment at the beginning of a word
    #[regex(r#"[^\s|;&<>"'#][^\s|;&<>"']*"#)]
    Word(&'a str),
    #[regex(r#""([^"\\]|\\.)*""#, double_quoted)]
    DoubleQuotedString(String),
    #[regex(r"'[^']*'", single_quoted)]
    SingleQuotedString(String),
    #[regex(r"#.*")]
    Comment(&'a str),
}

fn double_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    let slice = lex.slice();
    let mut out = String::with_capacity(slice.len());
    let mut chars = slice[1..slice.len() - 1].chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(c @ ('"' | '\\' | '$' | '`')) => out.push(c),
            // anything else keeps its backslash, as in sh
            Some(c) => {
                out.push('\\');
                out.push(c);
            }
            None => out.push('\\'),
        }
    }

    out
}

fn single_quoted<'a>(lex: &mut Lexer<'a, Token<'a>>) -> String {
    let slice = lex.slice();
    slice[1..slice.len() - 1].to_owned()
}
