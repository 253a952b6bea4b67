//! Hand-rolled lexer (scanner) for the Grace language.
//!
//! The [`Lexer`] hands out one [`Token`] per [`Lexer::next_token`] call; the
//! compiler drives it with a single token of lookahead, so there is no
//! up-front token vector.  Once the source is exhausted the lexer yields
//! [`TokenKind::EndOfFile`] forever.
//!
//! The lexer also keeps the source text split by line so that diagnostics can
//! quote the offending line via [`Lexer::code_at_line`].
//!
//! # Error Handling
//!
//! Lexical problems (unterminated strings, stray characters) are reported as
//! [`TokenKind::Error`] tokens whose lexeme is the message; the compiler
//! turns them into diagnostics.  Scanning continues after an error token.
//!
//! # Literals
//!
//! Literals are *not* parsed here.  Numeric text, quoted strings, and quoted
//! chars travel to the compiler verbatim, which keeps range checks and escape
//! processing (and their error lines) in one place.  A `.` only begins a
//! fraction when a digit follows, so `0..5` lexes as `0`, `..`, `5`.

use crate::token::{keyword, Span, Token, TokenKind};

// ─────────────────────────────────────────────────────────────────────────────
// Lexer struct
// ─────────────────────────────────────────────────────────────────────────────

/// The Grace lexical scanner.
///
/// Construct one with [`Lexer::new`], then pull tokens with
/// [`Lexer::next_token`].
pub struct Lexer<'src> {
    /// The full source text being scanned.
    src: &'src str,
    /// Source split by line (1-indexed access through [`Lexer::code_at_line`]).
    lines: Vec<&'src str>,
    /// Iterator over `(byte_offset, char)` pairs.
    chars: std::str::CharIndices<'src>,
    /// The current character and its byte offset, or `None` at EOF.
    current: Option<(usize, char)>,
    /// The *next* character, peeked without consuming (two-character lookahead).
    peeked: Option<(usize, char)>,
    /// Current source line (1-indexed).
    line: u32,
    /// Current source column in characters (1-indexed).
    col: u32,
    /// Byte offset just past the most recently consumed character.
    pos: usize,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(src: &'src str) -> Self {
        let mut chars = src.char_indices();
        let current = chars.next();
        let peeked = chars.next();
        Self {
            src,
            lines: src.lines().collect(),
            chars,
            current,
            peeked,
            line: 1,
            col: 1,
            pos: 0,
        }
    }

    /// The source text of the given 1-indexed line, without its newline.
    ///
    /// Returns the empty string for out-of-range lines so error paths never
    /// have to special-case a missing line.
    pub fn code_at_line(&self, line: u32) -> &str {
        if line == 0 {
            return "";
        }
        self.lines.get(line as usize - 1).copied().unwrap_or("")
    }

    /// Scan and return the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let (start, start_line, start_col) = (self.pos, self.line, self.col);

        let c = match self.advance() {
            Some(c) => c,
            None => {
                let span = Span::new(start, start, start_line, start_col);
                return Token::new(TokenKind::EndOfFile, "", span);
            }
        };

        if c.is_alphabetic() || c == '_' {
            return self.identifier(start, start_line, start_col);
        }
        if c.is_ascii_digit() {
            return self.number(start, start_line, start_col);
        }

        match c {
            '(' => self.make_token(TokenKind::LeftParen, start, start_line, start_col),
            ')' => self.make_token(TokenKind::RightParen, start, start_line, start_col),
            ',' => self.make_token(TokenKind::Comma, start, start_line, start_col),
            ':' => self.make_token(TokenKind::Colon, start, start_line, start_col),
            ';' => self.make_token(TokenKind::Semicolon, start, start_line, start_col),
            '+' => self.make_token(TokenKind::Plus, start, start_line, start_col),
            '-' => self.make_token(TokenKind::Minus, start, start_line, start_col),
            '/' => self.make_token(TokenKind::Slash, start, start_line, start_col),
            '%' => self.make_token(TokenKind::Mod, start, start_line, start_col),
            '.' => {
                if self.match_char('.') {
                    self.make_token(TokenKind::DotDot, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::Dot, start, start_line, start_col)
                }
            }
            '*' => {
                if self.match_char('*') {
                    self.make_token(TokenKind::StarStar, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::Star, start, start_line, start_col)
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::BangEqual, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::Bang, start, start_line, start_col)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::EqualEqual, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::Equal, start, start_line, start_col)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::LessEqual, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::LessThan, start, start_line, start_col)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenKind::GreaterEqual, start, start_line, start_col)
                } else {
                    self.make_token(TokenKind::GreaterThan, start, start_line, start_col)
                }
            }
            '"' => self.quoted(start, start_line, start_col, '"'),
            '\'' => self.quoted(start, start_line, start_col, '\''),
            _ => self.error_token(
                format!("Unexpected character: {c}"),
                start,
                start_line,
                start_col,
            ),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal scanning helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.current {
                Some((_, ' ')) | Some((_, '\r')) | Some((_, '\t')) | Some((_, '\n')) => {
                    self.advance();
                }
                Some((_, '/')) if matches!(self.peeked, Some((_, '/'))) => {
                    while let Some((_, c)) = self.current {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    /// Consume the current character, updating position bookkeeping.
    fn advance(&mut self) -> Option<char> {
        let (idx, c) = self.current?;
        self.pos = idx + c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.current = self.peeked;
        self.peeked = self.chars.next();
        Some(c)
    }

    /// Consume the current character only if it matches.
    fn match_char(&mut self, expected: char) -> bool {
        if let Some((_, c)) = self.current {
            if c == expected {
                self.advance();
                return true;
            }
        }
        false
    }

    fn make_token(&self, kind: TokenKind, start: usize, line: u32, col: u32) -> Token {
        let span = Span::new(start, self.pos, line, col);
        Token::new(kind, &self.src[start..self.pos], span)
    }

    fn error_token(&self, message: String, start: usize, line: u32, col: u32) -> Token {
        let span = Span::new(start, self.pos, line, col);
        Token::new(TokenKind::Error, message, span)
    }

    fn identifier(&mut self, start: usize, line: u32, col: u32) -> Token {
        while let Some((_, c)) = self.current {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.src[start..self.pos];
        let kind = keyword(text).unwrap_or(TokenKind::Identifier);
        self.make_token(kind, start, line, col)
    }

    fn number(&mut self, start: usize, line: u32, col: u32) -> Token {
        while matches!(self.current, Some((_, c)) if c.is_ascii_digit()) {
            self.advance();
        }

        // A '.' is part of the number only when a digit follows; otherwise it
        // belongs to a `..` range or a member access.
        let is_fraction = matches!(self.current, Some((_, '.')))
            && matches!(self.peeked, Some((_, c)) if c.is_ascii_digit());
        if is_fraction {
            self.advance();
            while matches!(self.current, Some((_, c)) if c.is_ascii_digit()) {
                self.advance();
            }
            self.make_token(TokenKind::Double, start, line, col)
        } else {
            self.make_token(TokenKind::Integer, start, line, col)
        }
    }

    /// Scan a `"`- or `'`-delimited literal.  Backslash escapes are skipped,
    /// not interpreted, so an escaped quote does not terminate the literal.
    fn quoted(&mut self, start: usize, line: u32, col: u32, delim: char) -> Token {
        loop {
            match self.current {
                None => {
                    let what = if delim == '"' { "string" } else { "char" };
                    return self.error_token(
                        format!("Unterminated {what} literal"),
                        start,
                        line,
                        col,
                    );
                }
                Some((_, '\\')) => {
                    self.advance();
                    self.advance();
                }
                Some((_, c)) if c == delim => {
                    self.advance();
                    let kind = if delim == '"' {
                        TokenKind::String
                    } else {
                        TokenKind::Char
                    };
                    return self.make_token(kind, start, line, col);
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Convenience entry point
// ─────────────────────────────────────────────────────────────────────────────

/// Lex an entire source string into a token vector ending with `EndOfFile`.
///
/// The compiler pulls tokens on demand instead; this is for tests and tools.
pub fn lex(src: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.is_eof();
        tokens.push(token);
        if done {
            break;
        }
    }
    tokens
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_punctuation_and_operators() {
        let k = kinds("( ) , . .. : ; + - * ** / % !");
        assert_eq!(
            k,
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::DotDot,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::StarStar,
                TokenKind::Slash,
                TokenKind::Mod,
                TokenKind::Bang,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let k = kinds("= == != < <= > >=");
        assert_eq!(
            k,
            vec![
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::BangEqual,
                TokenKind::LessThan,
                TokenKind::LessEqual,
                TokenKind::GreaterThan,
                TokenKind::GreaterEqual,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let k = kinds("var x final func end instanceof Int frob");
        assert_eq!(
            k,
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Final,
                TokenKind::Func,
                TokenKind::End,
                TokenKind::InstanceOf,
                TokenKind::IntIdent,
                TokenKind::Identifier,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = lex("1 42 3.14 0.5");
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].lexeme, "1");
        assert_eq!(tokens[1].kind, TokenKind::Integer);
        assert_eq!(tokens[2].kind, TokenKind::Double);
        assert_eq!(tokens[2].lexeme, "3.14");
        assert_eq!(tokens[3].kind, TokenKind::Double);
    }

    #[test]
    fn test_range_is_not_a_float() {
        let k = kinds("0..5");
        assert_eq!(
            k,
            vec![
                TokenKind::Integer,
                TokenKind::DotDot,
                TokenKind::Integer,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_string_literal_keeps_quotes() {
        let tokens = lex(r#""hello world""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, r#""hello world""#);
    }

    #[test]
    fn test_string_with_escaped_quote() {
        let tokens = lex(r#""say \"hi\"""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, r#""say \"hi\"""#);
        assert_eq!(tokens[1].kind, TokenKind::EndOfFile);
    }

    #[test]
    fn test_char_literals() {
        let tokens = lex(r"'a' '\n' '\''");
        assert_eq!(tokens[0].kind, TokenKind::Char);
        assert_eq!(tokens[0].lexeme, "'a'");
        assert_eq!(tokens[1].kind, TokenKind::Char);
        assert_eq!(tokens[1].lexeme, r"'\n'");
        assert_eq!(tokens[2].kind, TokenKind::Char);
        assert_eq!(tokens[2].lexeme, r"'\''");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = lex(r#""oops"#);
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert!(tokens[0].lexeme.contains("Unterminated string"));
    }

    #[test]
    fn test_comments_are_skipped() {
        let k = kinds("var x; // a comment\nvar y;");
        assert_eq!(
            k,
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Semicolon,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_line_and_column_tracking() {
        let tokens = lex("var x;\n  x = 1;");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.col, 1);
        // `x` on line 2 is indented by two spaces.
        assert_eq!(tokens[3].span.line, 2);
        assert_eq!(tokens[3].span.col, 3);
    }

    #[test]
    fn test_code_at_line() {
        let lexer = Lexer::new("func main():\n  var x = 1;\nend");
        assert_eq!(lexer.code_at_line(1), "func main():");
        assert_eq!(lexer.code_at_line(2), "  var x = 1;");
        assert_eq!(lexer.code_at_line(3), "end");
        assert_eq!(lexer.code_at_line(0), "");
        assert_eq!(lexer.code_at_line(99), "");
    }

    #[test]
    fn test_unexpected_character() {
        let tokens = lex("var @;");
        assert_eq!(tokens[2].kind, TokenKind::Error);
        assert!(tokens[2].lexeme.contains("Unexpected character"));
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_token().kind, TokenKind::EndOfFile);
        assert_eq!(lexer.next_token().kind, TokenKind::EndOfFile);
    }

    // ── Literal round-trip property ──────────────────────────────────────────
    //
    // Lexing a literal, printing its lexeme, and re-lexing must yield the
    // same token for Int, Float, Char, and String.

    fn roundtrip(src: &str, expected: TokenKind) {
        let first = lex(src);
        assert_eq!(first[0].kind, expected, "first lex of {src:?}");
        let printed = first[0].lexeme.clone();
        let second = lex(&printed);
        assert_eq!(second[0].kind, expected, "re-lex of {printed:?}");
        assert_eq!(second[0].lexeme, printed);
    }

    proptest! {
        #[test]
        fn prop_int_literal_round_trip(n in 0u64..=i64::MAX as u64) {
            roundtrip(&n.to_string(), TokenKind::Integer);
        }

        #[test]
        fn prop_float_literal_round_trip(whole in 0u32..1_000_000, frac in 0u32..1_000_000) {
            roundtrip(&format!("{whole}.{frac}"), TokenKind::Double);
        }

        #[test]
        fn prop_char_literal_round_trip(c in proptest::char::range('a', 'z')) {
            roundtrip(&format!("'{c}'"), TokenKind::Char);
        }

        #[test]
        fn prop_string_literal_round_trip(s in "[a-zA-Z0-9 _,.!?]{0,40}") {
            roundtrip(&format!("\"{s}\""), TokenKind::String);
        }
    }
}
