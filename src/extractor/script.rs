//! Addresses assembled by inline JavaScript.
//!
//! This is a literal folder, not an interpreter: it understands string and
//! number literals, `+` concatenation, variables bound to literals, array
//! literals, `String.fromCharCode(..)` and a handful of string methods
//! (`split`, `reverse`, `join`, `replace`, `replaceAll`, `concat`,
//! `toLowerCase`, `toUpperCase`, `trim`). Anything else makes the expression
//! unknown and the folder moves on. Nothing is ever executed.

use std::collections::HashMap;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Selector};

use crate::extractor::PageView;
use crate::extractor::model::{ObfuscationMatch, Technique};
use crate::patterns::{EMAIL_REGEX, strip_invisible};

static INLINE_SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script:not([src])").unwrap());

/// Sources longer than this are only scanned up to the limit.
const MAX_SOURCE_CHARS: usize = 512 * 1024;
const MAX_EXPR_DEPTH: usize = 48;
const MAX_STRING_CHARS: usize = 4096;
const MAX_REGEX_CHARS: usize = 200;

pub fn find(page: &PageView<'_>) -> Vec<ObfuscationMatch> {
    let mut out = Vec::new();
    for source in sources(page) {
        for value in fold_literals(&source) {
            let value = strip_invisible(&value);
            for m in EMAIL_REGEX.find_iter(&value) {
                out.push(ObfuscationMatch::new(
                    value.as_ref(),
                    Technique::JsConcat,
                    m.as_str(),
                ));
            }
        }
    }
    out
}

/// Inline scripts, event handler attributes, `javascript:` URLs and linked
/// script bodies, in that order.
fn sources(page: &PageView<'_>) -> Vec<String> {
    let mut sources: Vec<String> = page
        .document
        .select(&INLINE_SCRIPT_SELECTOR)
        .map(|script| script.text().collect::<String>())
        .filter(|body| !body.trim().is_empty())
        .collect();

    for element in page.document.root_element().descendants().filter_map(ElementRef::wrap) {
        for (name, value) in element.value().attrs() {
            if name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on")) {
                sources.push(value.to_string());
                continue;
            }
            let value = value.trim_start();
            if let Some(scheme) = value.get(..11)
                && scheme.eq_ignore_ascii_case("javascript:")
            {
                let code = &value[11..];
                sources.push(percent_decode_str(code).decode_utf8_lossy().into_owned());
            }
        }
    }

    sources.extend(page.scripts.iter().cloned());
    sources
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Ident(String),
    Regex { pattern: String, flags: String },
    Punct(char),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Array(Vec<String>),
}

impl Value {
    fn into_string(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Num(n) => format_number(n),
            Value::Array(items) => items.join(","),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Every string value the folder could compute from `source`.
pub(super) fn fold_literals(source: &str) -> Vec<String> {
    let source = match source.char_indices().nth(MAX_SOURCE_CHARS) {
        Some((idx, _)) => &source[..idx],
        None => source,
    };
    let tokens = tokenize(source);
    let mut folder = Folder {
        tokens: &tokens,
        pos: 0,
        vars: HashMap::new(),
        out: Vec::new(),
    };
    folder.run();
    folder.out
}

fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
        } else if c == '\'' || c == '"' || c == '`' {
            let (token, next) = read_string(&chars, i);
            tokens.push(token);
            i = next;
        } else if c == '/' && regex_allowed(tokens.last()) {
            let (token, next) = read_regex(&chars, i);
            tokens.push(token);
            i = next;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = match literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16).ok().map(|v| v as f64),
                None => literal.parse::<f64>().ok(),
            };
            match value {
                Some(n) => tokens.push(Token::Num(n)),
                None => tokens.push(Token::Ident(literal)),
            }
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            tokens.push(Token::Punct(c));
            i += 1;
        }
    }
    tokens
}

/// A `/` starts a regex literal after an operator or opening bracket, and
/// is division after a value.
fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous {
        None => true,
        Some(Token::Punct(c)) => !matches!(c, ')' | ']' | '}'),
        Some(Token::Ident(word)) => matches!(word.as_str(), "return" | "typeof"),
        Some(_) => false,
    }
}

fn read_string(chars: &[char], start: usize) -> (Token, usize) {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;
    let mut interpolated = false;

    while i < chars.len() && chars[i] != quote {
        let c = chars[i];
        if quote != '`' && c == '\n' {
            break;
        }
        if quote == '`' && c == '$' && chars.get(i + 1) == Some(&'{') {
            interpolated = true;
        }
        if c == '\\' {
            let (decoded, next) = read_escape(chars, i + 1);
            if let Some(decoded) = decoded {
                value.push(decoded);
            }
            i = next;
            continue;
        }
        value.push(c);
        i += 1;
    }

    let token = if interpolated {
        Token::Ident("`template`".to_string())
    } else {
        Token::Str(value)
    };
    (token, i + 1)
}

/// Decode the escape after a backslash at `i`. Line continuations decode to nothing.
fn read_escape(chars: &[char], i: usize) -> (Option<char>, usize) {
    let Some(&c) = chars.get(i) else {
        return (None, i);
    };
    let hex = |from: usize, len: usize| -> Option<char> {
        let digits: String = chars.get(from..from + len)?.iter().collect();
        u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
    };
    match c {
        'n' => (Some('\n'), i + 1),
        't' => (Some('\t'), i + 1),
        'r' => (Some('\r'), i + 1),
        '0' => (Some('\0'), i + 1),
        'x' => match hex(i + 1, 2) {
            Some(decoded) => (Some(decoded), i + 3),
            None => (Some('x'), i + 1),
        },
        'u' if chars.get(i + 1) == Some(&'{') => {
            let end = chars[i + 2..]
                .iter()
                .position(|&c| c == '}')
                .map(|p| i + 2 + p);
            match end {
                Some(end) => (hex(i + 2, end - i - 2), end + 1),
                None => (Some('u'), i + 1),
            }
        }
        'u' => match hex(i + 1, 4) {
            Some(decoded) => (Some(decoded), i + 5),
            None => (Some('u'), i + 1),
        },
        '\n' => (None, i + 1),
        other => (Some(other), i + 1),
    }
}

fn read_regex(chars: &[char], start: usize) -> (Token, usize) {
    let mut pattern = String::new();
    let mut i = start + 1;
    let mut in_class = false;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            break;
        }
        if c == '\\' {
            pattern.push(c);
            if let Some(&next) = chars.get(i + 1) {
                pattern.push(next);
            }
            i += 2;
            continue;
        }
        if c == '[' {
            in_class = true;
        } else if c == ']' {
            in_class = false;
        } else if c == '/' && !in_class {
            break;
        }
        pattern.push(c);
        i += 1;
    }

    i += 1;
    let flags_start = i;
    while i < chars.len() && chars[i].is_ascii_alphabetic() {
        i += 1;
    }
    let flags = chars[flags_start.min(chars.len())..i.min(chars.len())]
        .iter()
        .collect();
    (Token::Regex { pattern, flags }, i)
}

struct Folder<'t> {
    tokens: &'t [Token],
    pos: usize,
    vars: HashMap<String, Value>,
    out: Vec<String>,
}

impl Folder<'_> {
    fn run(&mut self) {
        while self.pos < self.tokens.len() {
            let start = self.pos;
            if !self.statement() {
                self.pos = start + 1;
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(name)) => Some(name),
            _ => None,
        }
    }

    fn record(&mut self, value: &Value) {
        match value {
            Value::Str(s) if !s.is_empty() => self.out.push(s.clone()),
            Value::Array(items) => self.out.push(items.concat()),
            _ => {}
        }
    }

    /// Binding, assignment or bare expression. `false` when nothing could be
    /// folded at the current token.
    fn statement(&mut self) -> bool {
        if matches!(self.ident(), Some("var" | "let" | "const")) {
            self.pos += 1;
            return self.binding();
        }
        if let Some(Token::Ident(_)) = self.peek()
            && let Some(Token::Punct('=')) = self.peek_at(1)
            && self.peek_at(2) != Some(&Token::Punct('='))
        {
            return self.binding();
        }
        if let Some(Token::Ident(name)) = self.peek()
            && let (Some(Token::Punct('+')), Some(Token::Punct('='))) = (self.peek_at(1), self.peek_at(2))
        {
            let name = name.clone();
            self.pos += 3;
            let Some(rhs) = self.expression(0) else {
                self.vars.remove(&name);
                return true;
            };
            let Some(current) = self.vars.get(&name).cloned() else {
                return true;
            };
            let joined = concat(current, rhs);
            self.record(&joined);
            self.vars.insert(name, joined);
            return true;
        }

        match self.expression(0) {
            Some(value) => {
                self.record(&value);
                true
            }
            None => false,
        }
    }

    /// `name = expr (, name = expr)*`
    fn binding(&mut self) -> bool {
        loop {
            let Some(name) = self.ident().map(str::to_string) else {
                return false;
            };
            self.pos += 1;
            if !self.eat_punct('=') {
                self.vars.remove(&name);
            } else {
                match self.expression(0) {
                    Some(value) => {
                        self.record(&value);
                        self.vars.insert(name, value);
                    }
                    None => {
                        self.vars.remove(&name);
                        return true;
                    }
                }
            }
            if !self.eat_punct(',') {
                return true;
            }
        }
    }

    fn expression(&mut self, depth: usize) -> Option<Value> {
        if depth > MAX_EXPR_DEPTH {
            return None;
        }
        let start = self.pos;
        let Some(mut acc) = self.unary(depth + 1) else {
            self.pos = start;
            return None;
        };
        while self.peek() == Some(&Token::Punct('+')) && self.peek_at(1) != Some(&Token::Punct('=')) {
            self.pos += 1;
            let rhs = self.unary(depth + 1)?;
            acc = concat(acc, rhs);
            if let Value::Str(s) = &acc
                && s.chars().count() > MAX_STRING_CHARS
            {
                return None;
            }
        }
        Some(acc)
    }

    fn unary(&mut self, depth: usize) -> Option<Value> {
        let mut value = self.primary(depth)?;
        loop {
            if self.peek() == Some(&Token::Punct('.')) {
                let Some(Token::Ident(method)) = self.peek_at(1).cloned() else {
                    return None;
                };
                self.pos += 2;
                let args = self.arguments(depth)?;
                value = call_method(value, &method, args)?;
            } else if self.peek() == Some(&Token::Punct('['))
                && let Some(Token::Num(index)) = self.peek_at(1).cloned()
                && self.peek_at(2) == Some(&Token::Punct(']'))
            {
                self.pos += 3;
                value = index_value(value, index)?;
            } else {
                return Some(value);
            }
        }
    }

    fn primary(&mut self, depth: usize) -> Option<Value> {
        match self.peek()?.clone() {
            Token::Str(s) => {
                self.pos += 1;
                Some(Value::Str(s))
            }
            Token::Num(n) => {
                self.pos += 1;
                Some(Value::Num(n))
            }
            Token::Punct('(') => {
                self.pos += 1;
                let value = self.expression(depth + 1)?;
                self.eat_punct(')').then_some(value)
            }
            Token::Punct('[') => {
                self.pos += 1;
                let mut items = Vec::new();
                if !self.eat_punct(']') {
                    loop {
                        items.push(self.expression(depth + 1)?.into_string());
                        if self.eat_punct(']') {
                            break;
                        }
                        if !self.eat_punct(',') {
                            return None;
                        }
                    }
                }
                Some(Value::Array(items))
            }
            Token::Ident(name) if name == "String" => {
                if self.peek_at(1) != Some(&Token::Punct('.'))
                    || self.peek_at(2) != Some(&Token::Ident("fromCharCode".to_string()))
                {
                    return None;
                }
                self.pos += 3;
                let args = self.arguments(depth)?;
                let mut out = String::new();
                for arg in args {
                    let Value::Num(code) = arg else {
                        return None;
                    };
                    out.push(char::from_u32(code as u32)?);
                }
                Some(Value::Str(out))
            }
            Token::Ident(name) => {
                let value = self.vars.get(&name).cloned()?;
                self.pos += 1;
                Some(value)
            }
            _ => None,
        }
    }

    /// `( expr, ... )`. Regex literals are passed through as strings tagged
    /// for [`call_method`].
    fn arguments(&mut self, depth: usize) -> Option<Vec<Value>> {
        if !self.eat_punct('(') {
            return None;
        }
        let mut args = Vec::new();
        if self.eat_punct(')') {
            return Some(args);
        }
        loop {
            if let Some(Token::Regex { pattern, flags }) = self.peek().cloned() {
                self.pos += 1;
                args.push(Value::Array(vec![pattern, flags]));
            } else {
                args.push(self.expression(depth + 1)?);
            }
            if self.eat_punct(')') {
                return Some(args);
            }
            if !self.eat_punct(',') {
                return None;
            }
        }
    }
}

fn concat(lhs: Value, rhs: Value) -> Value {
    match (lhs, rhs) {
        (Value::Num(a), Value::Num(b)) => Value::Num(a + b),
        (lhs, rhs) => {
            let mut s = lhs.into_string();
            s.push_str(&rhs.into_string());
            Value::Str(s)
        }
    }
}

fn index_value(value: Value, index: f64) -> Option<Value> {
    let index = index as usize;
    match value {
        Value::Array(items) => items.into_iter().nth(index).map(Value::Str),
        Value::Str(s) => s.chars().nth(index).map(|c| Value::Str(c.to_string())),
        Value::Num(_) => None,
    }
}

fn call_method(value: Value, method: &str, args: Vec<Value>) -> Option<Value> {
    let mut args = args.into_iter();
    match (value, method) {
        (Value::Str(s), "split") => {
            let items = match args.next() {
                None => vec![s],
                Some(Value::Str(sep)) if sep.is_empty() => s.chars().map(String::from).collect(),
                Some(Value::Str(sep)) => s.split(sep.as_str()).map(String::from).collect(),
                Some(_) => return None,
            };
            Some(Value::Array(items))
        }
        (Value::Array(mut items), "reverse") => {
            items.reverse();
            Some(Value::Array(items))
        }
        (Value::Array(items), "join") => {
            let sep = match args.next() {
                None => ",".to_string(),
                Some(Value::Str(sep)) => sep,
                Some(_) => return None,
            };
            Some(Value::Str(items.join(&sep)))
        }
        (Value::Array(mut items), "concat") => {
            for arg in args {
                match arg {
                    Value::Array(more) => items.extend(more),
                    other => items.push(other.into_string()),
                }
            }
            Some(Value::Array(items))
        }
        (Value::Str(s), "concat") => {
            let mut out = s;
            for arg in args {
                out.push_str(&arg.into_string());
            }
            Some(Value::Str(out))
        }
        (Value::Str(s), "replace" | "replaceAll") => {
            let pattern = args.next()?;
            let replacement = match args.next()? {
                Value::Str(r) => r,
                _ => return None,
            };
            match pattern {
                Value::Str(needle) if method == "replace" => {
                    Some(Value::Str(s.replacen(needle.as_str(), &replacement, 1)))
                }
                Value::Str(needle) => Some(Value::Str(s.replace(needle.as_str(), &replacement))),
                Value::Array(regex) => replace_regex(&s, &regex, &replacement),
                Value::Num(_) => None,
            }
        }
        (Value::Str(s), "toLowerCase") => Some(Value::Str(s.to_lowercase())),
        (Value::Str(s), "toUpperCase") => Some(Value::Str(s.to_uppercase())),
        (Value::Str(s), "trim") => Some(Value::Str(s.trim().to_string())),
        (Value::Str(s), "toString") => Some(Value::Str(s)),
        _ => None,
    }
}

/// `s.replace(/pattern/flags, "lit")` for patterns the regex crate accepts.
fn replace_regex(s: &str, regex: &[String], replacement: &str) -> Option<Value> {
    let [pattern, flags] = regex else {
        return None;
    };
    if pattern.chars().count() > MAX_REGEX_CHARS {
        return None;
    }
    let re: Regex = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .size_limit(1 << 20)
        .build()
        .ok()?;
    let replacement = replacement.replace('$', "$$");
    let replaced = if flags.contains('g') {
        re.replace_all(s, replacement.as_str())
    } else {
        re.replace(s, replacement.as_str())
    };
    Some(Value::Str(replaced.into_owned()))
}
