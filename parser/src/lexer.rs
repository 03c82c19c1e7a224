use codespan::{FileId, Span};
use diagnostics::Diagnostics;
use logos::Logos;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(text: impl Into<String>, kind: TokenKind, span: Span) -> Self {
        Self { text: text.into(), kind, span }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

#[derive(Logos, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    #[error]
    Error,

    // Punctuation
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("->")]
    RightArrow,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("==")]
    DoubleEqual,
    #[token("!=")]
    BangEqual,
    #[token("::")]
    DoubleColon,
    #[token("=")]
    Equal,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("&")]
    Ampersand,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("<")]
    LessThan,
    #[token(">")]
    GreaterThan,

    // Keywords
    #[token("func")]
    FuncKeyword,
    #[token("pure")]
    PureKeyword,
    #[token("return")]
    ReturnKeyword,
    #[token("let")]
    LetKeyword,
    #[token("if")]
    IfKeyword,
    #[token("else")]
    ElseKeyword,
    #[token("true")]
    TrueKeyword,
    #[token("false")]
    FalseKeyword,
    #[token("export")]
    ExportKeyword,
    #[token("import")]
    ImportKeyword,
    #[token("class")]
    ClassKeyword,

    #[token("i8")]
    #[token("i16")]
    #[token("i32")]
    #[token("i64")]
    #[token("u8")]
    #[token("u16")]
    #[token("u32")]
    #[token("u64")]
    #[token("void")]
    #[token("bool")]
    TypeKeyword,

    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // Radix decided by prefix; digit separators stay in the text and are
    // stripped when the literal's value is parsed.
    #[regex("0x[0-9a-fA-F]('?[0-9a-fA-F])*|0b[01]('?[01])*|0('?[0-7])*|[1-9]('?[0-9])*")]
    IntegerLiteral,

    #[regex(r#""(\\.|[^"\\])*""#)]
    StringLiteral,

    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    Whitespace,

    EndOfFile,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        use TokenKind::*;
        match self {
            LeftParen => "(",
            RightParen => ")",
            LeftBrace => "{",
            RightBrace => "}",
            RightArrow => "->",
            LessEqual => "<=",
            GreaterEqual => ">=",
            DoubleEqual => "==",
            BangEqual => "!=",
            DoubleColon => "::",
            Equal => "=",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Ampersand => "&",
            Semicolon => ";",
            Colon => ":",
            Comma => ",",
            Dot => ".",
            LessThan => "<",
            GreaterThan => ">",
            FuncKeyword => "func",
            PureKeyword => "pure",
            ReturnKeyword => "return",
            LetKeyword => "let",
            IfKeyword => "if",
            ElseKeyword => "else",
            TrueKeyword => "true",
            FalseKeyword => "false",
            ExportKeyword => "export",
            ImportKeyword => "import",
            ClassKeyword => "class",
            TypeKeyword => "type name",
            Identifier => "identifier",
            IntegerLiteral => "integer literal",
            StringLiteral => "string literal",
            EndOfFile => "end of file",
            Error | Whitespace => "token",
        }
    }
}

pub struct Lexer<'a> {
    source: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn lex(&self) -> Vec<Token> {
        let mut lexer = TokenKind::lexer(self.source);
        let mut tokens = Vec::new();

        while let Some(kind) = lexer.next() {
            let span = lexer.span();
            tokens.push(Token::new(lexer.slice(), kind, Span::new(span.start as u32, span.end as u32)));
        }

        let end = self.source.len() as u32;
        tokens.push(Token::new("", TokenKind::EndOfFile, Span::new(end, end)));
        tokens
    }
}

/// Reports every error token, so a file full of stray bytes produces one
/// diagnostic each rather than stopping at the first.
pub fn scan_invalid_tokens(tokens: &[Token], file: FileId, diag: &mut Diagnostics) {
    for token in tokens {
        if token.kind == TokenKind::Error {
            diag.error(file, token.span, format!("stray '{}' in program", token.text));
        }
    }
}

/// Integer literal text to value: radix from the prefix, separators
/// stripped. Out-of-range literals saturate.
pub fn integer_value(text: &str) -> u64 {
    let digits: String = text.chars().filter(|&c| c != '\'').collect();
    let (radix, rest) = if let Some(rest) = digits.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = digits.strip_prefix("0b") {
        (2, rest)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits.as_str())
    };
    u64::from_str_radix(rest, radix).unwrap_or(u64::MAX)
}

/// String literal text to content: quotes removed, escapes decoded.
pub fn string_value(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
