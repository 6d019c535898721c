use super::token::{keyword, Token, TokenKind};

/// Produces tokens one at a time from a borrowed source string. Never
/// restarted once it reaches `EOF`: callers that need `EOF` again just get
/// it served repeatedly, matching the sentinel-stream contract.
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    start: usize,
    current: usize,
    line: u32,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            bytes: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        if self.at_end() {
            0
        } else {
            self.bytes[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() {
            0
        } else {
            self.bytes[self.current + 1]
        }
    }

    fn advance(&mut self) -> u8 {
        let c = self.bytes[self.current];
        self.current += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.at_end() || self.bytes[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn lexeme(&self) -> &'a str {
        &self.source[self.start..self.current]
    }

    fn make_token(&self, kind: TokenKind) -> Token<'a> {
        Token::new(kind, self.lexeme(), self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'a> {
        Token::error(message, self.line)
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.line += 1;
                    self.advance();
                }
                b'/' if self.peek_next() == b'/' => {
                    while self.peek() != b'\n' && !self.at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn string(&mut self) -> Token<'a> {
        while self.peek() != b'"' && !self.at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.at_end() {
            return self.error_token("Unterminated string.");
        }

        self.advance(); // the closing quote
        self.make_token(TokenKind::String)
    }

    fn number(&mut self) -> Token<'a> {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance(); // the '.'
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'a> {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.advance();
        }

        let kind = keyword(self.lexeme()).unwrap_or(TokenKind::Identifier);
        self.make_token(kind)
    }

    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.start = self.current;

        if self.at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();

        if is_alpha(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b';' => self.make_token(TokenKind::Semicolon),
            b'*' => self.make_token(TokenKind::Star),
            b'/' => self.make_token(TokenKind::Slash),
            b'!' => {
                let kind = if self.matches(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.matches(b'=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token();
            let done = token.kind == TokenKind::Eof;
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn empty_source_is_immediate_eof() {
        let mut scanner = Scanner::new("");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Eof);
        assert_eq!(token.line, 1);
    }

    #[test]
    fn lexeme_is_exact_source_substring() {
        let source = "var   count = 12.5;";
        let mut scanner = Scanner::new(source);
        loop {
            let token = scanner.scan_token();
            if token.kind == TokenKind::Eof {
                break;
            }
            let found = source.find(token.lexeme).unwrap();
            assert_eq!(token.lexeme, &source[found..found + token.lexeme.len()]);
        }
    }

    #[test]
    fn keywords_vs_identifiers() {
        assert_eq!(
            kinds("and class else false for fun if nil or print return super this true var while"),
            vec![
                TokenKind::And,
                TokenKind::Class,
                TokenKind::Else,
                TokenKind::False,
                TokenKind::For,
                TokenKind::Fun,
                TokenKind::If,
                TokenKind::Nil,
                TokenKind::Or,
                TokenKind::Print,
                TokenKind::Return,
                TokenKind::Super,
                TokenKind::This,
                TokenKind::True,
                TokenKind::Var,
                TokenKind::While,
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("andy"), vec![TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn double_punctuators() {
        assert_eq!(
            kinds("!= == <= >= ="),
            vec![
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::Equal,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_with_trailing_dot_is_not_consumed() {
        let mut scanner = Scanner::new("1.");
        let number = scanner.scan_token();
        assert_eq!(number.kind, TokenKind::Number);
        assert_eq!(number.lexeme, "1");
        let dot = scanner.scan_token();
        assert_eq!(dot.kind, TokenKind::Dot);
    }

    #[test]
    fn unterminated_string_is_error_token() {
        let mut scanner = Scanner::new("\"never closed");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.message, Some("Unterminated string."));
    }

    #[test]
    fn unexpected_character_is_error_token() {
        let mut scanner = Scanner::new("@");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.message, Some("Unexpected character."));
    }

    #[test]
    fn line_comment_skipped_to_newline() {
        assert_eq!(
            kinds("// comment\nvar"),
            vec![TokenKind::Var, TokenKind::Eof]
        );
    }

    #[test]
    fn line_tracking_across_newlines() {
        let mut scanner = Scanner::new("1\n2\n3");
        assert_eq!(scanner.scan_token().line, 1);
        assert_eq!(scanner.scan_token().line, 2);
        assert_eq!(scanner.scan_token().line, 3);
    }
}
