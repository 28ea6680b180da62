//! Byte-level regex AST and CST lowering.
//!
//! The DFA alphabet is raw bytes, so lowering expands every code-point
//! construct (literals, classes, `.`/`\d`/`\s`/`\w`) into UTF-8
//! byte-sequence fragments. Code-point ranges are partitioned by UTF-8
//! length class and each piece becomes a prefix/middle/suffix union over
//! byte ranges, with continuation bytes spanning `[0x80, 0xBF]`.

use crate::error::{Error, Result};
use crate::regex::cst::{
    self, Assertion, Atom, CharClass, CharSet, ClassElement, Element, EscapeKind, EscapeSet,
};

/// Byte-level AST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    /// Matches the empty string. A non-`None` assertion kind is rejected by
    /// DFA construction.
    Empty { assertion: AssertionKind },
    /// Matches one byte `b` with `lo <= b <= hi`.
    Range { lo: u8, hi: u8 },
    Union(Vec<Ast>),
    Concat(Vec<Ast>),
    Star(Box<Ast>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    None,
    Start,
    End,
    Word,
}

fn empty() -> Ast {
    Ast::Empty {
        assertion: AssertionKind::None,
    }
}

fn byte(b: u8) -> Ast {
    Ast::Range { lo: b, hi: b }
}

fn continuation() -> Ast {
    Ast::Range { lo: 0x80, hi: 0xBF }
}

/// Lower a CST to a normalized byte-level AST.
pub fn lower(pattern: &cst::Pattern) -> Result<Ast> {
    Ok(normalize(lower_pattern(pattern)?))
}

fn lower_pattern(pattern: &cst::Pattern) -> Result<Ast> {
    let mut args = pattern
        .alternatives
        .iter()
        .map(lower_alternative)
        .collect::<Result<Vec<_>>>()?;
    Ok(match args.len() {
        1 => args.pop().unwrap(),
        _ => Ast::Union(args),
    })
}

fn lower_alternative(alternative: &cst::Alternative) -> Result<Ast> {
    let mut args = alternative
        .elements
        .iter()
        .map(lower_element)
        .collect::<Result<Vec<_>>>()?;
    Ok(match args.len() {
        1 => args.pop().unwrap(),
        _ => Ast::Concat(args),
    })
}

fn lower_element(element: &Element) -> Result<Ast> {
    match element {
        Element::Assertion(assertion) => Ok(Ast::Empty {
            assertion: match assertion {
                Assertion::Start => AssertionKind::Start,
                Assertion::End => AssertionKind::End,
                Assertion::WordBoundary { .. } => AssertionKind::Word,
            },
        }),
        Element::Atom(atom) => lower_atom(atom),
        Element::Quantified(quantifier) => {
            let inner = lower_atom(&quantifier.atom)?;
            Ok(repeat(inner, quantifier.min, quantifier.max))
        }
    }
}

/// `E{m,n}` expands to `E^m · (ε|E)^(n−m)`; an open bound becomes a star.
fn repeat(ast: Ast, min: u32, max: Option<u32>) -> Ast {
    let mut args: Vec<Ast> = (0..min).map(|_| ast.clone()).collect();
    match max {
        None => args.push(Ast::Star(Box::new(ast))),
        Some(max) => {
            let optional = Ast::Union(vec![empty(), ast]);
            args.extend((min..max).map(|_| optional.clone()));
        }
    }
    match args.len() {
        0 => empty(),
        1 => args.pop().unwrap(),
        _ => Ast::Concat(args),
    }
}

fn lower_atom(atom: &Atom) -> Result<Ast> {
    match atom {
        Atom::Char(c) => Ok(char_bytes(*c)),
        Atom::Group(pattern) | Atom::Capture { pattern, .. } => lower_pattern(pattern),
        Atom::Class(class) => class_to_ast(class),
        Atom::Set(set) => set_to_ast(set),
    }
}

/// A literal code point is the concatenation of its UTF-8 bytes.
fn char_bytes(c: char) -> Ast {
    let mut buf = [0u8; 4];
    let bytes = c.encode_utf8(&mut buf).as_bytes();
    match bytes.len() {
        1 => byte(bytes[0]),
        _ => Ast::Concat(bytes.iter().map(|&b| byte(b)).collect()),
    }
}

fn set_to_ast(set: &CharSet) -> Result<Ast> {
    match set {
        CharSet::Any => {
            // Any code point except newline.
            let mut newline = RangeSet::new();
            newline.add('\n' as u32, '\n' as u32);
            ranges_to_ast(&newline.complement())
        }
        CharSet::Escape(escape) => {
            let mut set = escape_ranges(escape.kind);
            if escape.negate {
                set = set.complement();
            }
            ranges_to_ast(&set)
        }
        CharSet::Property(prop) => Err(unsupported_property(prop)),
    }
}

fn class_to_ast(class: &CharClass) -> Result<Ast> {
    let mut set = RangeSet::new();
    for element in &class.elements {
        match element {
            ClassElement::Char(c) => set.add(*c as u32, *c as u32),
            ClassElement::Range { min, max } => set.add(*min as u32, *max as u32),
            ClassElement::Escape(EscapeSet { kind, negate }) => {
                let mut inner = escape_ranges(*kind);
                if *negate {
                    inner = inner.complement();
                }
                for &(lo, hi) in &inner.ranges {
                    set.add(lo, hi);
                }
            }
            ClassElement::Property(prop) => return Err(unsupported_property(prop)),
        }
    }
    if class.negate {
        set = set.complement();
    }
    ranges_to_ast(&set)
}

fn unsupported_property(prop: &cst::UnicodeProperty) -> Error {
    let name = match &prop.value {
        Some(value) => format!("{}={}", prop.property, value),
        None => prop.property.clone(),
    };
    Error::Unsupported(format!(
        "Unicode property \\{}{{{}}}",
        if prop.negate { 'P' } else { 'p' },
        name
    ))
}

fn escape_ranges(kind: EscapeKind) -> RangeSet {
    let mut set = RangeSet::new();
    match kind {
        EscapeKind::Digit => set.add('0' as u32, '9' as u32),
        EscapeKind::Space => {
            set.add(0x09, 0x0D); // tab, LF, VT, FF, CR
            set.add(0x20, 0x20);
        }
        EscapeKind::Word => {
            set.add('0' as u32, '9' as u32);
            set.add('A' as u32, 'Z' as u32);
            set.add('_' as u32, '_' as u32);
            set.add('a' as u32, 'z' as u32);
        }
    }
    set
}

/// Sorted disjoint set of code-point ranges.
struct RangeSet {
    ranges: Vec<(u32, u32)>,
}

const MAX_CODEPOINT: u32 = 0x10FFFF;
const SURROGATE_LO: u32 = 0xD800;
const SURROGATE_HI: u32 = 0xDFFF;

impl RangeSet {
    fn new() -> Self {
        RangeSet { ranges: Vec::new() }
    }

    fn add(&mut self, lo: u32, hi: u32) {
        debug_assert!(lo <= hi);
        self.ranges.push((lo, hi));
        self.coalesce();
    }

    fn coalesce(&mut self) {
        self.ranges.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(self.ranges.len());
        for &(lo, hi) in &self.ranges {
            match merged.last_mut() {
                // Adjacent ranges merge too.
                Some((_, prev_hi)) if lo <= prev_hi.saturating_add(1) => {
                    *prev_hi = (*prev_hi).max(hi);
                }
                _ => merged.push((lo, hi)),
            }
        }
        self.ranges = merged;
    }

    /// Complement against `[0, 0x10FFFF]` minus the surrogate gap.
    fn complement(&self) -> RangeSet {
        let mut out = RangeSet::new();
        let mut next = 0u32;
        for &(lo, hi) in &self.ranges {
            if lo > next {
                out.push_excluding_surrogates(next, lo - 1);
            }
            next = hi.saturating_add(1);
        }
        if next <= MAX_CODEPOINT {
            out.push_excluding_surrogates(next, MAX_CODEPOINT);
        }
        out
    }

    fn push_excluding_surrogates(&mut self, lo: u32, hi: u32) {
        if lo <= SURROGATE_HI && hi >= SURROGATE_LO {
            if lo < SURROGATE_LO {
                self.add(lo, SURROGATE_LO - 1);
            }
            if hi > SURROGATE_HI {
                self.add(SURROGATE_HI + 1, hi);
            }
        } else {
            self.add(lo, hi);
        }
    }

    fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// UTF-8 length classes: code-point spans sharing an encoded byte length.
const LENGTH_CLASSES: [(u32, u32); 4] = [
    (0x0, 0x7F),
    (0x80, 0x7FF),
    (0x800, 0xFFFF),
    (0x10000, MAX_CODEPOINT),
];

fn ranges_to_ast(set: &RangeSet) -> Result<Ast> {
    if set.is_empty() {
        return Err(Error::Unsupported(
            "character class matches no code points".to_string(),
        ));
    }
    let mut fragments = Vec::new();
    for &(lo, hi) in &set.ranges {
        for &(class_lo, class_hi) in &LENGTH_CLASSES {
            let s = lo.max(class_lo);
            let e = hi.min(class_hi);
            if s <= e {
                fragments.push(byte_seq(&encode_utf8(s), &encode_utf8(e)));
            }
        }
    }
    Ok(match fragments.len() {
        1 => fragments.pop().unwrap(),
        _ => Ast::Union(fragments),
    })
}

/// Generic UTF-8 encoding over raw code-point values (endpoints are never
/// surrogates, but clamped class boundaries are encoded directly).
fn encode_utf8(cp: u32) -> Vec<u8> {
    match cp {
        0..=0x7F => vec![cp as u8],
        0x80..=0x7FF => vec![0xC0 | (cp >> 6) as u8, 0x80 | (cp & 0x3F) as u8],
        0x800..=0xFFFF => vec![
            0xE0 | (cp >> 12) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ],
        _ => vec![
            0xF0 | (cp >> 18) as u8,
            0x80 | ((cp >> 12) & 0x3F) as u8,
            0x80 | ((cp >> 6) & 0x3F) as u8,
            0x80 | (cp & 0x3F) as u8,
        ],
    }
}

/// Byte sequences between two same-length UTF-8 encodings, inclusive.
fn byte_seq(min: &[u8], max: &[u8]) -> Ast {
    debug_assert_eq!(min.len(), max.len());
    debug_assert!(!min.is_empty());

    if min.len() == 1 {
        return Ast::Range {
            lo: min[0],
            hi: max[0],
        };
    }
    if min[0] == max[0] {
        return Ast::Concat(vec![byte(min[0]), byte_seq(&min[1..], &max[1..])]);
    }

    // First bytes differ: prefix | middle | suffix.
    let mut args = vec![Ast::Concat(vec![byte(min[0]), tail_ge(&min[1..])])];
    if min[0] + 1 <= max[0] - 1 {
        let mut middle = vec![Ast::Range {
            lo: min[0] + 1,
            hi: max[0] - 1,
        }];
        middle.extend(std::iter::repeat_with(continuation).take(min.len() - 1));
        args.push(Ast::Concat(middle));
    }
    args.push(Ast::Concat(vec![byte(max[0]), tail_le(&max[1..])]));
    Ast::Union(args)
}

/// Continuation-byte sequences lexicographically >= `rest`.
fn tail_ge(rest: &[u8]) -> Ast {
    if rest.len() == 1 {
        return Ast::Range {
            lo: rest[0],
            hi: 0xBF,
        };
    }
    let mut args = vec![Ast::Concat(vec![byte(rest[0]), tail_ge(&rest[1..])])];
    if rest[0] < 0xBF {
        let mut above = vec![Ast::Range {
            lo: rest[0] + 1,
            hi: 0xBF,
        }];
        above.extend(std::iter::repeat_with(continuation).take(rest.len() - 1));
        args.push(Ast::Concat(above));
    }
    match args.len() {
        1 => args.pop().unwrap(),
        _ => Ast::Union(args),
    }
}

/// Continuation-byte sequences lexicographically <= `rest`.
fn tail_le(rest: &[u8]) -> Ast {
    if rest.len() == 1 {
        return Ast::Range {
            lo: 0x80,
            hi: rest[0],
        };
    }
    let mut args = vec![Ast::Concat(vec![byte(rest[0]), tail_le(&rest[1..])])];
    if rest[0] > 0x80 {
        let mut below = vec![Ast::Range {
            lo: 0x80,
            hi: rest[0] - 1,
        }];
        below.extend(std::iter::repeat_with(continuation).take(rest.len() - 1));
        args.push(Ast::Concat(below));
    }
    match args.len() {
        1 => args.pop().unwrap(),
        _ => Ast::Union(args),
    }
}

/// Collapse single-child unions/concats, drop ε inside concatenations, and
/// fold concatenations into the left-leaning binary shape the DFA builder
/// expects.
pub fn normalize(ast: Ast) -> Ast {
    match ast {
        Ast::Union(args) => {
            let mut out: Vec<Ast> = args.into_iter().map(normalize).collect();
            match out.len() {
                1 => out.pop().unwrap(),
                _ => Ast::Union(out),
            }
        }
        Ast::Concat(args) => {
            let mut out: Vec<Ast> = Vec::new();
            for arg in args {
                match normalize(arg) {
                    Ast::Empty {
                        assertion: AssertionKind::None,
                    } => {}
                    Ast::Concat(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            match out.len() {
                0 => empty(),
                1 => out.pop().unwrap(),
                _ => out
                    .into_iter()
                    .reduce(|left, right| Ast::Concat(vec![left, right]))
                    .unwrap(),
            }
        }
        Ast::Star(arg) => Ast::Star(Box::new(normalize(*arg))),
        other => other,
    }
}
