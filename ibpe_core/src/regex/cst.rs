//! Regex concrete syntax tree and parser.
//!
//! Grammar (UTF-8 source):
//! ```text
//! pattern        := alternative ('|' alternative)*
//! alternative    := element+
//! element        := assertion | quantified | atom
//! quantified     := atom ('*' | '+' | '?' | '{' number (',' number?)? '}') '?'?
//! atom           := group | capture | class | set | char
//! group          := '(' '?' ':' pattern ')'
//! capture        := '(' ('?' '<' name '>')? pattern ')'
//! class          := '[' '^'? class_elem+ ']'
//! class_elem     := escape_set | unicode_prop | range | char_in_brackets
//! set            := '.' | escape_set | unicode_prop
//! escape_set     := '\' ('d'|'D'|'s'|'S'|'w'|'W')
//! unicode_prop   := '\' ('p'|'P') '{' alphabet ('=' alphanum)? '}'
//! assertion      := '^' | '$' | '\' ('b'|'B')
//! char           := '\' meta | <any non-meta char>
//! ```
//! Top-level meta characters are `. ^ $ * + ? ( ) [ { \ |`; inside brackets
//! they are `^ - ] \`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Assertion(Assertion),
    Quantified(Quantifier),
    Atom(Atom),
}

/// `min..=max` repetitions; `max == None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantifier {
    pub min: u32,
    pub max: Option<u32>,
    pub greedy: bool,
    pub atom: Atom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// `(?:...)`
    Group(Pattern),
    /// `(...)` or `(?<name>...)`
    Capture {
        name: Option<String>,
        pattern: Pattern,
    },
    Class(CharClass),
    Set(CharSet),
    Char(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub negate: bool,
    pub elements: Vec<ClassElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassElement {
    Escape(EscapeSet),
    Property(UnicodeProperty),
    Range { min: char, max: char },
    Char(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharSet {
    /// `.`
    Any,
    Escape(EscapeSet),
    Property(UnicodeProperty),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeSet {
    pub kind: EscapeKind,
    pub negate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeKind {
    Digit,
    Space,
    Word,
}

/// `\p{property}` / `\p{property=value}` / `\P{...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeProperty {
    pub negate: bool,
    pub property: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    Start,
    End,
    WordBoundary { negate: bool },
}

const META: &[char] = &[
    '.', '^', '$', '*', '+', '?', '(', ')', '[', '{', '\\', '|',
];
const BRACKET_META: &[char] = &['^', '-', ']', '\\'];

/// Parse a regex pattern into its concrete syntax tree.
pub fn parse(input: &str) -> Result<Pattern> {
    let mut parser = Parser::new(input);
    let pattern = parser.pattern()?;
    match parser.peek() {
        None => Ok(pattern),
        Some(c) => Err(parser.error(format!("unexpected {c:?}"))),
    }
}

struct Parser<'a> {
    input: &'a str,
    // (byte offset, char) pairs; offsets report error positions.
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input,
            chars: input.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected {expected:?}, found {c:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of pattern"))),
        }
    }

    fn byte_pos(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(off, _)| off)
            .unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            pos: self.byte_pos(),
            message: message.into(),
        }
    }

    fn pattern(&mut self) -> Result<Pattern> {
        let mut alternatives = vec![self.alternative()?];
        while self.eat('|') {
            alternatives.push(self.alternative()?);
        }
        Ok(Pattern { alternatives })
    }

    fn alternative(&mut self) -> Result<Alternative> {
        let mut elements = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            elements.push(self.element()?);
        }
        if elements.is_empty() {
            return Err(self.error("empty alternative"));
        }
        Ok(Alternative { elements })
    }

    fn element(&mut self) -> Result<Element> {
        if let Some(assertion) = self.assertion() {
            return Ok(Element::Assertion(assertion));
        }

        let atom = self.atom()?;
        match self.quantifier()? {
            Some((min, max)) => {
                let greedy = !self.eat('?');
                Ok(Element::Quantified(Quantifier {
                    min,
                    max,
                    greedy,
                    atom,
                }))
            }
            None => Ok(Element::Atom(atom)),
        }
    }

    fn assertion(&mut self) -> Option<Assertion> {
        match self.peek() {
            Some('^') => {
                self.pos += 1;
                Some(Assertion::Start)
            }
            Some('$') => {
                self.pos += 1;
                Some(Assertion::End)
            }
            Some('\\') => match self.peek_at(1) {
                Some('b') => {
                    self.pos += 2;
                    Some(Assertion::WordBoundary { negate: false })
                }
                Some('B') => {
                    self.pos += 2;
                    Some(Assertion::WordBoundary { negate: true })
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn quantifier(&mut self) -> Result<Option<(u32, Option<u32>)>> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok(Some((0, None)))
            }
            Some('+') => {
                self.pos += 1;
                Ok(Some((1, None)))
            }
            Some('?') => {
                self.pos += 1;
                Ok(Some((0, Some(1))))
            }
            Some('{') => {
                self.pos += 1;
                let min = self.number()?;
                let bounds = if self.eat(',') {
                    if self.peek() == Some('}') {
                        (min, None)
                    } else {
                        let max = self.number()?;
                        if max < min {
                            return Err(self.error(format!(
                                "quantifier range {{{min},{max}}} has max < min"
                            )));
                        }
                        (min, Some(max))
                    }
                } else {
                    (min, Some(min))
                };
                self.expect('}')?;
                Ok(Some(bounds))
            }
            _ => Ok(None),
        }
    }

    fn number(&mut self) -> Result<u32> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.error("expected a number"));
        }
        digits
            .parse()
            .map_err(|_| self.error(format!("number {digits} too large")))
    }

    fn atom(&mut self) -> Result<Atom> {
        match self.peek() {
            Some('(') => self.group(),
            Some('[') => Ok(Atom::Class(self.class()?)),
            Some('.') => {
                self.pos += 1;
                Ok(Atom::Set(CharSet::Any))
            }
            Some('\\') => self.escape(),
            Some(c) if !META.contains(&c) => {
                self.pos += 1;
                Ok(Atom::Char(c))
            }
            Some(c) => Err(self.error(format!("unexpected {c:?}"))),
            None => Err(self.error("unexpected end of pattern")),
        }
    }

    fn group(&mut self) -> Result<Atom> {
        self.expect('(')?;

        if self.peek() == Some('?') && self.peek_at(1) == Some(':') {
            self.pos += 2;
            let pattern = self.pattern()?;
            self.expect(')')?;
            return Ok(Atom::Group(pattern));
        }

        let name = if self.peek() == Some('?') && self.peek_at(1) == Some('<') {
            self.pos += 2;
            let mut name = String::new();
            loop {
                match self.bump() {
                    Some('>') => break,
                    Some(c) => name.push(c),
                    None => return Err(self.error("unterminated capture name")),
                }
            }
            Some(name)
        } else {
            None
        };

        let pattern = self.pattern()?;
        self.expect(')')?;
        Ok(Atom::Capture { name, pattern })
    }

    fn escape(&mut self) -> Result<Atom> {
        debug_assert_eq!(self.peek(), Some('\\'));
        match self.peek_at(1) {
            Some('d') | Some('D') | Some('s') | Some('S') | Some('w') | Some('W') => {
                self.pos += 1;
                let set = self.escape_set();
                Ok(Atom::Set(CharSet::Escape(set)))
            }
            Some('p') | Some('P') => Ok(Atom::Set(CharSet::Property(self.property()?))),
            Some(c) if META.contains(&c) => {
                self.pos += 2;
                Ok(Atom::Char(c))
            }
            Some(c) => Err(self.error(format!("unknown escape \\{c}"))),
            None => Err(self.error("dangling backslash")),
        }
    }

    /// Caller has consumed the backslash and verified the class letter.
    fn escape_set(&mut self) -> EscapeSet {
        let c = self.bump().unwrap_or('d');
        let (kind, negate) = match c {
            'd' => (EscapeKind::Digit, false),
            'D' => (EscapeKind::Digit, true),
            's' => (EscapeKind::Space, false),
            'S' => (EscapeKind::Space, true),
            'w' => (EscapeKind::Word, false),
            'W' => (EscapeKind::Word, true),
            _ => unreachable!("escape_set called on non-class letter"),
        };
        EscapeSet { kind, negate }
    }

    fn property(&mut self) -> Result<UnicodeProperty> {
        self.expect('\\')?;
        let negate = match self.bump() {
            Some('p') => false,
            Some('P') => true,
            _ => return Err(self.error("expected \\p or \\P")),
        };
        self.expect('{')?;

        let mut property = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() || c == '_' {
                property.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if property.is_empty() {
            return Err(self.error("empty property name"));
        }

        let value = if self.eat('=') {
            let mut value = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    value.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if value.is_empty() {
                return Err(self.error("empty property value"));
            }
            Some(value)
        } else {
            None
        };

        self.expect('}')?;
        Ok(UnicodeProperty {
            negate,
            property,
            value,
        })
    }

    fn class(&mut self) -> Result<CharClass> {
        self.expect('[')?;
        let negate = self.eat('^');

        let mut elements = Vec::new();
        while self.peek() != Some(']') {
            elements.push(self.class_element()?);
        }
        if elements.is_empty() {
            return Err(self.error("empty character class"));
        }
        self.expect(']')?;
        Ok(CharClass { negate, elements })
    }

    fn class_element(&mut self) -> Result<ClassElement> {
        if self.peek() == Some('\\') {
            match self.peek_at(1) {
                Some('d') | Some('D') | Some('s') | Some('S') | Some('w') | Some('W') => {
                    self.pos += 1;
                    return Ok(ClassElement::Escape(self.escape_set()));
                }
                Some('p') | Some('P') => {
                    return Ok(ClassElement::Property(self.property()?));
                }
                _ => {}
            }
        }

        let min = self.bracket_char()?;
        if self.peek() == Some('-') {
            self.pos += 1;
            let max = self.bracket_char()?;
            if min > max {
                return Err(self.error(format!(
                    "invalid character class range {min:?}-{max:?}"
                )));
            }
            return Ok(ClassElement::Range { min, max });
        }
        Ok(ClassElement::Char(min))
    }

    fn bracket_char(&mut self) -> Result<char> {
        match self.peek() {
            Some('\\') => match self.peek_at(1) {
                Some(c) if BRACKET_META.contains(&c) => {
                    self.pos += 2;
                    Ok(c)
                }
                Some(c) => Err(self.error(format!("unknown escape \\{c} in character class"))),
                None => Err(self.error("dangling backslash in character class")),
            },
            Some(c) if !BRACKET_META.contains(&c) => {
                self.pos += 1;
                Ok(c)
            }
            Some(c) => Err(self.error(format!("unexpected {c:?} in character class"))),
            None => Err(self.error("unterminated character class")),
        }
    }
}
