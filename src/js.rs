//! A small, permissive TypeScript expression parser.
//!
//! Only the shapes the generators inspect get a structured node: identifiers,
//! literals, object and array literals, calls (with their type arguments) and
//! member access. Anything else inside an expression (arrow functions,
//! operators, `new`, JSX...) is kept as an [`ExprKind::Opaque`] span so its
//! source can still be spliced verbatim.

use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.start..self.end]
    }

    fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Str,
    Template,
    Num,
    Regex,
    Punct,
}

#[derive(Copy, Clone, Debug)]
struct Token {
    kind: TokenKind,
    span: Span,
    newline_before: bool,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    const MULTI_PUNCT: [&str; 3] = ["...", "=>", "?."];

    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut newline_before = false;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c == b'\n' {
            newline_before = true;
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if src[i..].starts_with("//") {
            i = src[i..].find('\n').map_or(bytes.len(), |end| i + end);
            continue;
        }
        if src[i..].starts_with("/*") {
            let end = src[i + 2..]
                .find("*/")
                .ok_or_else(|| ParseError::new(i, "unterminated comment"))?;
            newline_before |= src[i..i + 2 + end].contains('\n');
            i += end + 4;
            continue;
        }

        let kind = if c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80 {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric()
                    || bytes[i] == b'_'
                    || bytes[i] == b'$'
                    || bytes[i] >= 0x80)
            {
                i += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit()
            || (c == b'.' && bytes.get(i + 1).map_or(false, u8::is_ascii_digit))
        {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_')
            {
                i += 1;
            }
            TokenKind::Num
        } else if c == b'"' || c == b'\'' {
            i += 1;
            loop {
                match bytes.get(i) {
                    None | Some(b'\n') => {
                        return Err(ParseError::new(start, "unterminated string"))
                    }
                    Some(b'\\') => i += 2,
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            TokenKind::Str
        } else if c == b'`' {
            i = skip_template(src, i)?;
            TokenKind::Template
        } else if c == b'/' && !ends_operand(src, tokens.last()) {
            i = skip_regex(src, i)?;
            TokenKind::Regex
        } else {
            match MULTI_PUNCT.iter().find(|p| src[i..].starts_with(*p)) {
                Some(p) => i += p.len(),
                // punctuation is ASCII; step over whole chars otherwise
                None => i += src[i..].chars().next().map_or(1, char::len_utf8),
            }
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            span: Span::new(start, i),
            newline_before,
        });
        newline_before = false;
    }

    Ok(tokens)
}

/// Whether `prev` can close an operand, making a following `/` a division.
fn ends_operand(src: &str, prev: Option<&Token>) -> bool {
    prev.map_or(false, |prev| {
        prev.kind != TokenKind::Punct || matches!(prev.span.text(src), ")" | "]" | "}")
    })
}

/// Returns the offset just past the flags of the regular expression literal
/// that starts at `start`.
fn skip_regex(src: &str, start: usize) -> Result<usize, ParseError> {
    let bytes = src.as_bytes();
    let mut i = start + 1;
    let mut in_class = false;

    loop {
        match bytes.get(i) {
            None | Some(b'\n') => {
                return Err(ParseError::new(start, "unterminated regular expression"))
            }
            Some(b'\\') => i += 2,
            Some(b'[') => {
                in_class = true;
                i += 1;
            }
            Some(b']') => {
                in_class = false;
                i += 1;
            }
            Some(b'/') if !in_class => {
                i += 1;
                break;
            }
            Some(_) => i += 1,
        }
    }

    while bytes.get(i).map_or(false, u8::is_ascii_alphabetic) {
        i += 1;
    }
    Ok(i)
}

/// Returns the offset just past the closing backtick of the template that
/// starts at `start`.
fn skip_template(src: &str, start: usize) -> Result<usize, ParseError> {
    let bytes = src.as_bytes();
    let mut i = start + 1;
    let mut depth = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'`' if depth == 0 => return Ok(i + 1),
            b'$' if depth == 0 && bytes.get(i + 1) == Some(&b'{') => {
                depth = 1;
                i += 1;
            }
            b'{' if depth > 0 => depth += 1,
            b'}' if depth > 0 => depth -= 1,
            _ => {}
        }
        i += 1;
    }

    Err(ParseError::new(start, "unterminated template literal"))
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Ident(String),
    /// String literal contents without the quotes.
    Str(String),
    Template,
    Num,
    Object(Vec<Prop>),
    Array(Vec<Expr>),
    Call(Call),
    Member(Member),
    Opaque,
}

#[derive(Debug, Clone)]
pub struct Prop {
    /// `None` for spreads.
    pub key: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: Box<Expr>,
    /// Source spans of explicit type arguments, `f<A, B>(...)`.
    pub type_args: Vec<Span>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub object: Box<Expr>,
    pub property: String,
}

impl Expr {
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        self.span.text(src)
    }

    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[Prop]> {
        match &self.kind {
            ExprKind::Object(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Expr]> {
        match &self.kind {
            ExprKind::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_call(&self) -> Option<&Call> {
        match &self.kind {
            ExprKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// The value of property `key` when this is an object literal.
    pub fn prop(&self, key: &str) -> Option<&Expr> {
        self.as_object()?
            .iter()
            .find(|prop| prop.key.as_deref() == Some(key))
            .map(|prop| &prop.value)
    }
}

/// Top-level facts about one module.
#[derive(Debug, Default)]
pub struct Program {
    pub default_export: Option<Expr>,
    /// Initializers of top-level `const`/`let`/`var` declarations.
    pub bindings: FxHashMap<String, Expr>,
}

impl Program {
    /// The default export, looking through one identifier indirection.
    pub fn resolved_default_export(&self) -> Option<&Expr> {
        let export = self.default_export.as_ref()?;
        match export.as_ident() {
            Some(name) => self.bindings.get(name),
            None => Some(export),
        }
    }
}

pub fn parse_program(src: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(src)?;
    let mut program = Program::default();
    let mut depth = 0usize;

    while let Some(token) = parser.peek() {
        let text = parser.text(token);

        if depth == 0 && text == "export" && parser.peek_text_at(1) == Some("default") {
            parser.pos += 2;
            if matches!(parser.peek_text(), Some("function" | "class" | "async")) {
                continue;
            }
            program.default_export = Some(parser.expression()?);
            continue;
        }

        if depth == 0 && matches!(text, "const" | "let" | "var") {
            if let Some(name) = parser.peek_at(1).filter(|t| t.kind == TokenKind::Ident) {
                let name = parser.text(name).to_string();
                let checkpoint = parser.pos;
                parser.pos += 2;
                match parser.binding_initializer() {
                    Ok(Some(init)) => {
                        program.bindings.entry(name).or_insert(init);
                        continue;
                    }
                    // not something we need; step past the keyword
                    Ok(None) | Err(_) => parser.pos = checkpoint,
                }
            }
        }

        match text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth = depth.saturating_sub(1),
            _ => {}
        }
        parser.pos += 1;
    }

    Ok(program)
}

/// Parses a source string holding exactly one expression (a trailing `;` is
/// allowed).
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expression()?;
    parser.eat(";");
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ParseError::new(
            token.span.start,
            format!("unexpected `{}` after expression", parser.text(token)),
        )),
    }
}

struct Parser<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Result<Self, ParseError> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.tokens.get(self.pos + offset).copied()
    }

    fn text(&self, token: Token) -> &'s str {
        token.span.text(self.src)
    }

    fn peek_text(&self) -> Option<&'s str> {
        self.peek().map(|t| self.text(t))
    }

    fn peek_text_at(&self, offset: usize) -> Option<&'s str> {
        self.peek_at(offset).map(|t| self.text(t))
    }

    fn is_punct(&self, text: &str) -> bool {
        self.peek()
            .map_or(false, |t| t.kind == TokenKind::Punct && self.text(t) == text)
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.is_punct(text) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, text: &str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Punct && self.text(token) == text => {
                self.pos += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::new(
                token.span.start,
                format!("expected `{}`, found `{}`", text, self.text(token)),
            )),
            None => Err(self.eof(format!("expected `{text}`"))),
        }
    }

    fn eof(&self, message: String) -> ParseError {
        ParseError::new(self.src.len(), format!("{message} at end of input"))
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    /// Whether the next token ends the current expression.
    fn at_terminator(&self) -> bool {
        let Some(token) = self.peek() else {
            return true;
        };

        if token.kind == TokenKind::Punct {
            return matches!(self.text(token), "," | ")" | "]" | "}" | ";");
        }

        // Automatic semicolon insertion: a new line starting with a word or
        // literal ends an expression that could have ended on the line above.
        token.newline_before
            && self.pos > 0
            && self.tokens.get(self.pos - 1).map_or(false, |prev| {
                prev.kind != TokenKind::Punct || matches!(self.text(*prev), ")" | "]" | "}")
            })
    }

    /// Skips tokens up to the end of the current expression, stepping over
    /// bracketed groups. With `angles`, `<...>` also nests (for types).
    fn skip_to_terminator(&mut self, angles: bool) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            if depth == 0 && self.at_terminator() {
                return Ok(());
            }
            let Some(token) = self.peek() else {
                return Err(self.eof(String::from("unbalanced brackets")));
            };
            if token.kind == TokenKind::Punct {
                match self.text(token) {
                    "(" | "[" | "{" => depth += 1,
                    "<" if angles => depth += 1,
                    ">" if angles && depth > 0 => depth -= 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            self.pos += 1;
        }
    }

    /// Steps over a balanced group opening at the current token.
    fn skip_group(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            self.pos += 1;
            if token.kind != TokenKind::Punct {
                continue;
            }
            match self.text(token) {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.eof(String::from("unbalanced brackets")))
    }

    /// After `const name`: an optional type annotation, then `= expr`.
    fn binding_initializer(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.eat(":") {
            while !self.is_punct("=") {
                if self.peek().is_none() || self.is_punct(";") {
                    return Ok(None);
                }
                if matches!(self.peek_text(), Some("(" | "[" | "{")) {
                    self.skip_group()?;
                } else {
                    self.pos += 1;
                }
            }
        }
        if !self.eat("=") {
            return Ok(None);
        }
        self.expression().map(Some)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        let start = self
            .peek()
            .map(|t| t.span.start)
            .ok_or_else(|| self.eof(String::from("expected expression")))?;

        let expr = self.postfix()?;
        if self.at_terminator() {
            if let Some(expr) = expr {
                return Ok(expr);
            }
        }

        if let Some(expr) = expr.as_ref() {
            if matches!(self.peek_text(), Some("as" | "satisfies")) {
                self.pos += 1;
                self.skip_to_terminator(true)?;
                return Ok(expr.clone());
            }
        }

        self.skip_to_terminator(false)?;
        let end = self.prev_end().max(start);
        Ok(Expr {
            kind: ExprKind::Opaque,
            span: Span::new(start, end),
        })
    }

    fn postfix(&mut self) -> Result<Option<Expr>, ParseError> {
        let Some(mut expr) = self.primary()? else {
            return Ok(None);
        };

        loop {
            if self.is_punct(".") || self.is_punct("?.") {
                let optional = self.is_punct("?.");
                self.pos += 1;
                if optional && (self.is_punct("(") || self.is_punct("[")) {
                    continue;
                }
                let Some(name) = self.peek().filter(|t| t.kind == TokenKind::Ident) else {
                    return Ok(None);
                };
                self.pos += 1;
                expr = Expr {
                    span: expr.span.to(name.span),
                    kind: ExprKind::Member(Member {
                        object: Box::new(expr),
                        property: self.text(name).to_string(),
                    }),
                };
            } else if self.is_punct("[") && !self.peek().map_or(false, |t| t.newline_before) {
                self.pos += 1;
                let index = self.expression()?;
                let close = self.expect("]")?;
                let property = index
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| index.text(self.src).to_string());
                expr = Expr {
                    span: expr.span.to(close.span),
                    kind: ExprKind::Member(Member {
                        object: Box::new(expr),
                        property,
                    }),
                };
            } else if self.is_punct("(") {
                expr = self.call(expr, Vec::new())?;
            } else if self.is_punct("<") {
                match self.type_arguments()? {
                    Some(type_args) => expr = self.call(expr, type_args)?,
                    None => break,
                }
            } else if self.is_punct("!")
                && !self.peek_at(1).map_or(false, |t| self.text(t) == "=")
            {
                // non-null assertion
                self.pos += 1;
            } else {
                break;
            }
        }

        Ok(Some(expr))
    }

    fn call(&mut self, callee: Expr, type_args: Vec<Span>) -> Result<Expr, ParseError> {
        self.expect("(")?;
        let args = self.list(")", Parser::expression)?;
        let close = self.expect(")")?;
        Ok(Expr {
            span: callee.span.to(close.span),
            kind: ExprKind::Call(Call {
                callee: Box::new(callee),
                type_args,
                args,
            }),
        })
    }

    /// Tries `<A, B>` followed by `(`. Restores the position and returns
    /// `None` when the `<` turns out to be a comparison.
    fn type_arguments(&mut self) -> Result<Option<Vec<Span>>, ParseError> {
        let checkpoint = self.pos;
        self.pos += 1;

        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut arg_start: Option<usize> = None;
        loop {
            let Some(token) = self.peek() else {
                self.pos = checkpoint;
                return Ok(None);
            };
            let text = self.text(token);
            if token.kind == TokenKind::Punct {
                match text {
                    "<" | "(" | "[" | "{" => depth += 1,
                    ">" if depth == 0 => {
                        if let Some(start) = arg_start.take() {
                            args.push(Span::new(start, self.prev_end()));
                        }
                        self.pos += 1;
                        break;
                    }
                    ">" | ")" | "]" | "}" => match depth.checked_sub(1) {
                        Some(d) => depth = d,
                        None => {
                            self.pos = checkpoint;
                            return Ok(None);
                        }
                    },
                    "," if depth == 0 => {
                        if let Some(start) = arg_start.take() {
                            args.push(Span::new(start, self.prev_end()));
                        }
                        self.pos += 1;
                        continue;
                    }
                    ";" => {
                        self.pos = checkpoint;
                        return Ok(None);
                    }
                    _ => {}
                }
            }
            arg_start.get_or_insert(token.span.start);
            self.pos += 1;
        }

        if !self.is_punct("(") {
            self.pos = checkpoint;
            return Ok(None);
        }
        Ok(Some(args))
    }

    /// Comma separated items up to (not including) `close`; trailing comma
    /// allowed.
    fn list<T>(
        &mut self,
        close: &str,
        mut item: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        while !self.is_punct(close) {
            if self.peek().is_none() {
                return Err(self.eof(format!("expected `{close}`")));
            }
            items.push(item(self)?);
            if !self.eat(",") {
                break;
            }
        }
        Ok(items)
    }

    fn primary(&mut self) -> Result<Option<Expr>, ParseError> {
        let Some(token) = self.peek() else {
            return Err(self.eof(String::from("expected expression")));
        };
        let text = self.text(token);

        let kind = match token.kind {
            TokenKind::Ident => ExprKind::Ident(text.to_string()),
            TokenKind::Str => ExprKind::Str(text[1..text.len() - 1].to_string()),
            TokenKind::Template => ExprKind::Template,
            TokenKind::Num => ExprKind::Num,
            TokenKind::Regex => ExprKind::Opaque,
            TokenKind::Punct => {
                return match text {
                    "[" => self.array().map(Some),
                    "{" => self.object().map(Some),
                    "(" => self.parenthesized(),
                    _ => Ok(None),
                }
            }
        };

        self.pos += 1;
        Ok(Some(Expr {
            kind,
            span: token.span,
        }))
    }

    fn parenthesized(&mut self) -> Result<Option<Expr>, ParseError> {
        let checkpoint = self.pos;
        self.pos += 1;
        if let Ok(inner) = self.expression() {
            if self.eat(")") && !self.is_punct("=>") && !self.is_punct(":") {
                return Ok(Some(inner));
            }
        }

        // arrow parameters or something else we don't model
        self.pos = checkpoint;
        let start = self.peek().map_or(0, |t| t.span.start);
        self.skip_group()?;
        Ok(Some(Expr {
            kind: ExprKind::Opaque,
            span: Span::new(start, self.prev_end()),
        }))
    }

    fn array(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect("[")?;
        let items = self.list("]", Parser::element)?;
        let close = self.expect("]")?;
        Ok(Expr {
            kind: ExprKind::Array(items),
            span: open.span.to(close.span),
        })
    }

    fn element(&mut self) -> Result<Expr, ParseError> {
        if let Some(spread) = self.peek().filter(|_| self.is_punct("...")) {
            self.pos += 1;
            let inner = self.expression()?;
            return Ok(Expr {
                kind: ExprKind::Opaque,
                span: spread.span.to(inner.span),
            });
        }
        self.expression()
    }

    fn object(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect("{")?;
        let props = self.list("}", Parser::property)?;
        let close = self.expect("}")?;
        Ok(Expr {
            kind: ExprKind::Object(props),
            span: open.span.to(close.span),
        })
    }

    fn property(&mut self) -> Result<Prop, ParseError> {
        if self.is_punct("...") {
            self.pos += 1;
            return Ok(Prop {
                key: None,
                value: self.expression()?,
            });
        }

        let Some(key_token) = self.peek() else {
            return Err(self.eof(String::from("expected property")));
        };
        let key = match key_token.kind {
            TokenKind::Ident | TokenKind::Num => self.text(key_token).to_string(),
            TokenKind::Str => {
                let text = self.text(key_token);
                text[1..text.len() - 1].to_string()
            }
            _ if self.is_punct("[") => {
                self.skip_group()?;
                let text = Span::new(key_token.span.start, self.prev_end()).text(self.src);
                self.pos -= 1;
                text.to_string()
            }
            _ => {
                return Err(ParseError::new(
                    key_token.span.start,
                    format!("unexpected `{}` in object literal", self.text(key_token)),
                ))
            }
        };
        self.pos += 1;

        if self.eat(":") {
            return Ok(Prop {
                key: Some(key),
                value: self.expression()?,
            });
        }

        if self.is_punct(",") || self.is_punct("}") {
            // shorthand `{ key }`
            return Ok(Prop {
                key: Some(key.clone()),
                value: Expr {
                    kind: ExprKind::Ident(key),
                    span: key_token.span,
                },
            });
        }

        // methods, getters, `async` members
        self.skip_to_terminator(false)?;
        Ok(Prop {
            key: Some(key),
            value: Expr {
                kind: ExprKind::Opaque,
                span: Span::new(key_token.span.start, self.prev_end()),
            },
        })
    }
}
