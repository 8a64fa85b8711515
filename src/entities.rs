/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::borrow::Cow;

pub mod predefined {
    pub const LT: &str = "&lt;";
    pub const GT: &str = "&gt;";
    pub const AMP: &str = "&amp;";
    pub const APOS: &str = "&apos;";
    pub const QUOT: &str = "&quot;";
}

fn needs_escape(c: char) -> bool {
    matches!(c, '<' | '>' | '&' | '\'' | '"')
}

/// Size of the string after the markup characters are escaped.
pub fn escaped_size(s: &str) -> usize {
    let mut size = 0;
    for c in s.chars() {
        match c {
            '<' => size += predefined::LT.len(),
            '>' => size += predefined::GT.len(),
            '&' => size += predefined::AMP.len(),
            '\'' => size += predefined::APOS.len(),
            '"' => size += predefined::QUOT.len(),
            _ => size += c.len_utf8(),
        }
    }

    size
}

/// Appends the string to `out` with markup characters escaped.
pub fn escape_into(s: &str, out: &mut String) {
    out.reserve(escaped_size(s));
    for c in s.chars() {
        match c {
            '<' => out.push_str(predefined::LT),
            '>' => out.push_str(predefined::GT),
            '&' => out.push_str(predefined::AMP),
            '\'' => out.push_str(predefined::APOS),
            '"' => out.push_str(predefined::QUOT),
            _ => out.push(c),
        }
    }
}

/// Escapes the markup characters, borrowing when there are none.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.chars().any(needs_escape) {
        return Cow::Borrowed(s);
    }
    let mut out = String::new();
    escape_into(s, &mut out);
    Cow::Owned(out)
}

fn hex_value(digits: &str, width: usize) -> Option<u32> {
    if digits.len() != width || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

fn decode_reference(reference: &str) -> Option<char> {
    match reference {
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "amp" => return Some('&'),
        "apos" => return Some('\''),
        "quot" => return Some('"'),
        _ => (),
    }
    if let Some(number) = reference.strip_prefix('#') {
        let value = match number.strip_prefix(['x', 'X']) {
            Some(hex) => {
                if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return None;
                }
                u32::from_str_radix(hex, 16).ok()?
            }
            None => {
                if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                number.parse::<u32>().ok()?
            }
        };
        return char::from_u32(value);
    }
    // Short forms some servers emit: &xHH; and &uHHHH;
    let value = match reference.as_bytes().first() {
        Some(b'x' | b'X') => hex_value(&reference[1..], 2)?,
        Some(b'u' | b'U') => hex_value(&reference[1..], 4)?,
        _ => return None,
    };
    char::from_u32(value)
}

/// Replaces character and entity references with their characters.
///
/// Unknown or malformed references are kept as written.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match after.find(';') {
            Some(semi) => {
                let reference = &after[..semi];
                match decode_reference(reference) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('&');
                        out.push_str(reference);
                        out.push(';');
                    }
                }
                rest = &after[semi + 1..];
            }
            None => {
                out.push_str(&rest[amp..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
