//! Minimal ToUnicode CMap reader.
//!
//! Only the parts needed to turn shown strings back into text are read:
//! `codespacerange` (for the code width), `bfchar` and `bfrange`.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Word(String),
    ArrayStart,
    ArrayEnd,
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        match b {
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                tokens.push(Token::Hex(decode_hex(&data[i + 1..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'(' => {
                // Literal strings only appear in the header; skip them
                let mut depth = 0;
                while i < data.len() {
                    match data[i] {
                        b'\\' => i += 1,
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
            }
            c if c.is_ascii_whitespace() => i += 1,
            _ => {
                let start = i;
                i += 1;
                while i < data.len() && !b"<>[]()% \t\r\n\x0c".contains(&data[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(String::from_utf8_lossy(&data[start..i]).into_owned()));
            }
        }
    }

    tokens
}

fn decode_hex(hex: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .iter()
        .filter_map(|c| (*c as char).to_digit(16).map(|d| d as u8))
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

/// Decode UTF-16BE (as used for CMap destinations), dropping unpaired surrogates
fn utf16be(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair.get(1).copied().unwrap_or(0)))
        .collect();
    char::decode_utf16(units).filter_map(Result::ok).collect()
}

/// Code-to-text mapping from a font's `ToUnicode` stream
#[derive(Debug, Clone, Default)]
pub struct ToUnicode {
    code_bytes: usize,
    map: HashMap<u32, String>,
}

impl ToUnicode {
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = ToUnicode {
            code_bytes: 0,
            map: HashMap::new(),
        };

        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while let Some(Token::Hex(low)) = tokens.get(i) {
                        cmap.code_bytes = cmap.code_bytes.max(low.len());
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(Token::Hex(src)), Some(Token::Hex(dst))) = (tokens.get(i), tokens.get(i + 1)) {
                        cmap.map.insert(code_value(src), utf16be(dst));
                        if cmap.code_bytes == 0 {
                            cmap.code_bytes = src.len();
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while let (Some(Token::Hex(low)), Some(Token::Hex(high))) = (tokens.get(i), tokens.get(i + 1)) {
                        if cmap.code_bytes == 0 {
                            cmap.code_bytes = low.len();
                        }
                        let (low_v, high_v) = (code_value(low), code_value(high));
                        i += 2;
                        match tokens.get(i) {
                            Some(Token::Hex(dst)) => {
                                cmap.insert_range(low_v, high_v, dst);
                                i += 1;
                            }
                            Some(Token::ArrayStart) => {
                                i += 1;
                                let mut code = low_v;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    if code <= high_v {
                                        cmap.map.insert(code, utf16be(dst));
                                    }
                                    code = code.saturating_add(1);
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                            }
                            _ => break,
                        }
                    }
                }
                _ => i += 1,
            }
        }

        if cmap.code_bytes == 0 {
            cmap.code_bytes = 1;
        }
        cmap
    }

    fn insert_range(&mut self, low: u32, high: u32, dst: &[u8]) {
        // Ranges are capped to one code page so broken maps cannot explode
        let high = high.min(low.saturating_add(0xFF));
        let Some((&last, prefix)) = dst.split_last() else {
            return;
        };
        for (offset, code) in (low..=high).enumerate() {
            let Some(byte) = u8::try_from(usize::from(last) + offset).ok() else {
                break;
            };
            let mut bytes = prefix.to_vec();
            bytes.push(byte);
            self.map.insert(code, utf16be(&bytes));
        }
    }

    /// Width of a character code in bytes
    pub fn code_bytes(&self) -> usize {
        self.code_bytes
    }

    /// Decode a shown string; unmapped codes are dropped
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .chunks(self.code_bytes.max(1))
            .filter_map(|code| self.map.get(&code_value(code)))
            .map(String::as_str)
            .collect()
    }
}
