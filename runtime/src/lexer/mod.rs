use crate::error::LexError;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Token classification. Keywords get their own kinds so the parser can
/// match on them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,

    // keywords
    Class,
    Interface,
    Extends,
    Implements,
    Public,
    Private,
    Protected,
    Static,
    Final,
    Abstract,
    Default,
    Void,
    New,
    This,
    Super,
    Return,
    If,
    Else,
    For,
    While,
    Do,
    Break,
    Continue,
    Switch,
    Case,
    Try,
    Catch,
    Finally,
    Throw,
    Throws,
    Instanceof,
    Native,
    Import,
    Package,
    Synchronized,
    Enum,
    Transient,
    Volatile,
    Int,
    Long,
    Float,
    Double,
    Boolean,
    Char,
    Byte,
    Short,
    True,
    False,
    Null,

    // punctuation and operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    At,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PlusPlus,
    MinusMinus,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Question,
    Colon,
    Arrow,
    ColonColon,

    Eof,
}

impl TokenKind {
    /// Primitive type names double as expression-leading type tokens.
    pub fn is_primitive_type(self) -> bool {
        matches!(
            self,
            TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Boolean
                | TokenKind::Char
                | TokenKind::Byte
                | TokenKind::Short
                | TokenKind::Void
        )
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::Public
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Static
                | TokenKind::Final
                | TokenKind::Abstract
                | TokenKind::Default
                | TokenKind::Native
                | TokenKind::Synchronized
                | TokenKind::Transient
                | TokenKind::Volatile
        )
    }
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("class", TokenKind::Class),
        ("interface", TokenKind::Interface),
        ("extends", TokenKind::Extends),
        ("implements", TokenKind::Implements),
        ("public", TokenKind::Public),
        ("private", TokenKind::Private),
        ("protected", TokenKind::Protected),
        ("static", TokenKind::Static),
        ("final", TokenKind::Final),
        ("abstract", TokenKind::Abstract),
        ("default", TokenKind::Default),
        ("void", TokenKind::Void),
        ("new", TokenKind::New),
        ("this", TokenKind::This),
        ("super", TokenKind::Super),
        ("return", TokenKind::Return),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("for", TokenKind::For),
        ("while", TokenKind::While),
        ("do", TokenKind::Do),
        ("break", TokenKind::Break),
        ("continue", TokenKind::Continue),
        ("switch", TokenKind::Switch),
        ("case", TokenKind::Case),
        ("try", TokenKind::Try),
        ("catch", TokenKind::Catch),
        ("finally", TokenKind::Finally),
        ("throw", TokenKind::Throw),
        ("throws", TokenKind::Throws),
        ("instanceof", TokenKind::Instanceof),
        ("native", TokenKind::Native),
        ("import", TokenKind::Import),
        ("package", TokenKind::Package),
        ("synchronized", TokenKind::Synchronized),
        ("enum", TokenKind::Enum),
        ("transient", TokenKind::Transient),
        ("volatile", TokenKind::Volatile),
        ("int", TokenKind::Int),
        ("long", TokenKind::Long),
        ("float", TokenKind::Float),
        ("double", TokenKind::Double),
        ("boolean", TokenKind::Boolean),
        ("char", TokenKind::Char),
        ("byte", TokenKind::Byte),
        ("short", TokenKind::Short),
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("null", TokenKind::Null),
    ])
});

/// One lexeme with its source position (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Produces the flat token sequence, terminated by an EOF token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let (line, column) = (self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token::new(TokenKind::Eof, "", line, column));
                return Ok(tokens);
            };

            let token = if c.is_ascii_digit() {
                self.lex_number(line, column)
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                Ok(self.lex_word(line, column))
            } else if c == '"' {
                self.lex_string(line, column)
            } else if c == '\'' {
                self.lex_char(line, column)
            } else {
                self.lex_operator(line, column)
            }?;
            tokens.push(token);
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn lex_number(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // a dot only belongs to the number when digits follow it
        let is_float = self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit());
        if is_float {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        // suffixes are consumed but carry no meaning here
        match self.peek() {
            Some('f') | Some('F') | Some('d') | Some('D') => {
                self.advance();
                return Ok(Token::new(TokenKind::FloatLiteral, text, line, column));
            }
            Some('l') | Some('L') => {
                self.advance();
            }
            _ => {}
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Ok(Token::new(kind, text, line, column))
    }

    fn lex_word(&mut self, line: u32, column: u32) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = KEYWORDS
            .get(text.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        Token::new(kind, text, line, column)
    }

    fn lex_escape(&mut self, line: u32, column: u32) -> Result<char, LexError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some(c) => Ok(c),
            None => Err(LexError::new("unterminated escape sequence", line, column)),
        }
    }

    fn lex_string(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => {
                    return Ok(Token::new(TokenKind::StringLiteral, text, line, column));
                }
                Some('\\') => text.push(self.lex_escape(line, column)?),
                Some('\n') | None => {
                    return Err(LexError::new("unterminated string literal", line, column));
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn lex_char(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let c = match self.advance() {
            Some('\\') => self.lex_escape(line, column)?,
            Some('\'') | None => {
                return Err(LexError::new("unterminated char literal", line, column));
            }
            Some(c) => c,
        };
        if self.advance() != Some('\'') {
            return Err(LexError::new("unterminated char literal", line, column));
        }
        Ok(Token::new(
            TokenKind::CharLiteral,
            c.to_string(),
            line,
            column,
        ))
    }

    fn lex_operator(&mut self, line: u32, column: u32) -> Result<Token, LexError> {
        let c = self.advance().expect("caller checked peek");
        let two = |lexer: &mut Self, kind, text: &str| {
            lexer.advance();
            Ok(Token::new(kind, text, line, column))
        };

        match c {
            '(' => Ok(Token::new(TokenKind::LParen, "(", line, column)),
            ')' => Ok(Token::new(TokenKind::RParen, ")", line, column)),
            '{' => Ok(Token::new(TokenKind::LBrace, "{", line, column)),
            '}' => Ok(Token::new(TokenKind::RBrace, "}", line, column)),
            '[' => Ok(Token::new(TokenKind::LBracket, "[", line, column)),
            ']' => Ok(Token::new(TokenKind::RBracket, "]", line, column)),
            ';' => Ok(Token::new(TokenKind::Semicolon, ";", line, column)),
            ',' => Ok(Token::new(TokenKind::Comma, ",", line, column)),
            '.' => Ok(Token::new(TokenKind::Dot, ".", line, column)),
            '@' => Ok(Token::new(TokenKind::At, "@", line, column)),
            '?' => Ok(Token::new(TokenKind::Question, "?", line, column)),
            ':' => match self.peek() {
                Some(':') => two(self, TokenKind::ColonColon, "::"),
                _ => Ok(Token::new(TokenKind::Colon, ":", line, column)),
            },
            '+' => match self.peek() {
                Some('+') => two(self, TokenKind::PlusPlus, "++"),
                Some('=') => two(self, TokenKind::PlusAssign, "+="),
                _ => Ok(Token::new(TokenKind::Plus, "+", line, column)),
            },
            '-' => match self.peek() {
                Some('-') => two(self, TokenKind::MinusMinus, "--"),
                Some('=') => two(self, TokenKind::MinusAssign, "-="),
                Some('>') => two(self, TokenKind::Arrow, "->"),
                _ => Ok(Token::new(TokenKind::Minus, "-", line, column)),
            },
            '*' => match self.peek() {
                Some('=') => two(self, TokenKind::StarAssign, "*="),
                _ => Ok(Token::new(TokenKind::Star, "*", line, column)),
            },
            '/' => match self.peek() {
                Some('=') => two(self, TokenKind::SlashAssign, "/="),
                _ => Ok(Token::new(TokenKind::Slash, "/", line, column)),
            },
            '%' => Ok(Token::new(TokenKind::Percent, "%", line, column)),
            '=' => match self.peek() {
                Some('=') => two(self, TokenKind::Eq, "=="),
                _ => Ok(Token::new(TokenKind::Assign, "=", line, column)),
            },
            '!' => match self.peek() {
                Some('=') => two(self, TokenKind::NotEq, "!="),
                _ => Ok(Token::new(TokenKind::Not, "!", line, column)),
            },
            '<' => match self.peek() {
                Some('=') => two(self, TokenKind::Le, "<="),
                _ => Ok(Token::new(TokenKind::Lt, "<", line, column)),
            },
            '>' => match self.peek() {
                Some('=') => two(self, TokenKind::Ge, ">="),
                _ => Ok(Token::new(TokenKind::Gt, ">", line, column)),
            },
            '&' => match self.peek() {
                Some('&') => two(self, TokenKind::AndAnd, "&&"),
                _ => Ok(Token::new(TokenKind::Amp, "&", line, column)),
            },
            '|' => match self.peek() {
                Some('|') => two(self, TokenKind::OrOr, "||"),
                _ => Ok(Token::new(TokenKind::Pipe, "|", line, column)),
            },
            other => Err(LexError::new(
                format!("unexpected character '{}'", other),
                line,
                column,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("class Foo extends Bar"),
            vec![
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Extends,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[rstest]
    #[case("42", TokenKind::IntLiteral, "42")]
    #[case("42L", TokenKind::IntLiteral, "42")]
    #[case("3.14", TokenKind::FloatLiteral, "3.14")]
    #[case("2.5f", TokenKind::FloatLiteral, "2.5")]
    #[case("7F", TokenKind::FloatLiteral, "7")]
    fn number_literals(#[case] source: &str, #[case] kind: TokenKind, #[case] text: &str) {
        let tokens = Lexer::new(source).tokenize().unwrap();
        assert_eq!(tokens[0].kind, kind);
        assert_eq!(tokens[0].text, text);
    }

    #[test]
    fn field_access_is_not_a_float() {
        assert_eq!(
            kinds("a.length"),
            vec![
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let tokens = Lexer::new(r#""a\tb\n\"q\"""#).tokenize().unwrap();
        assert_eq!(tokens[0].text, "a\tb\n\"q\"");
    }

    #[test]
    fn char_literal() {
        let tokens = Lexer::new(r"'\n'").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[0].text, "\n");
    }

    #[test]
    fn comments_are_discarded() {
        assert_eq!(
            kinds("a // line\n/* block\nstill */ b"),
            vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn operator_clusters() {
        assert_eq!(
            kinds("a += b++ -> c :: d"),
            vec![
                TokenKind::Identifier,
                TokenKind::PlusAssign,
                TokenKind::Identifier,
                TokenKind::PlusPlus,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::ColonColon,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_position() {
        let err = Lexer::new("x = \"abc").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
        assert!(err.message.contains("unterminated string"));
    }

    #[test]
    fn unexpected_character_reports_position() {
        let err = Lexer::new("int a = #;").tokenize().unwrap_err();
        assert!(err.message.contains('#'));
        assert_eq!(err.column, 9);
    }

    #[test]
    fn positions_track_lines() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }
}
