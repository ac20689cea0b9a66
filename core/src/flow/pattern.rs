//! Input patterns
//!
//! Authored patterns use the common browser dialect, where a `-` next to a
//! class escape (`[\w-.]`) is a literal and `[`, `&`, `~` inside a class are
//! plain characters. The `regex` crate reads those as ranges and set
//! operations, so classes are rewritten before compiling.

use std::borrow::Cow;

use regex::Regex;

/// Escapes that stand for a whole class and so cannot bound a range.
const CLASS_ESCAPES: &[char] = &['w', 'W', 'd', 'D', 's', 'S'];

fn is_class_escape(chars: &std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next() == Some('\\') && ahead.next().is_some_and(|c| CLASS_ESCAPES.contains(&c))
}

/// Rewrite character classes so they mean for `regex` what they mean to
/// authors.
pub fn normalize(pattern: &str) -> Cow<'_, str> {
    if !pattern.contains('[') {
        return Cow::Borrowed(pattern);
    }

    let mut out = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    let mut after_class_escape = false;

    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(c);
            let Some(escaped) = chars.next() else {
                break;
            };
            out.push(escaped);
            after_class_escape = in_class && CLASS_ESCAPES.contains(&escaped);
            continue;
        }

        if !in_class {
            out.push(c);
            if c == '[' {
                in_class = true;
                after_class_escape = false;
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
            }
            continue;
        }

        match c {
            ']' => {
                in_class = false;
                out.push(c);
            }
            '-' if after_class_escape || is_class_escape(&chars) => out.push_str(r"\-"),
            '[' | '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
        after_class_escape = false;
    }

    Cow::Owned(out)
}

/// Compile an authored input pattern.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&normalize(pattern))
}
