//! Comment removal that leaves string literals intact

/// Removes `//` and `/* */` comments from kernel source
///
/// A line comment and its newline become one newline. A block comment is
/// dropped, except that the newlines it spanned are kept so every later
/// line keeps its number. Single-quoted, double-quoted and verbatim
/// (`@"..."`, `""` escape) literals are copied untouched.
pub fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut copy_from = 0;
    let mut i = 0;

    while i < len {
        let next = bytes.get(i + 1).copied();
        match bytes[i] {
            b'@' if next == Some(b'"') => i = skip_verbatim(bytes, i + 2),
            quote @ (b'"' | b'\'') => i = skip_quoted(bytes, i + 1, quote),
            b'/' if next == Some(b'/') => {
                out.push_str(&text[copy_from..i]);
                i = match text[i..].find('\n') {
                    Some(eol) => {
                        out.push('\n');
                        i + eol + 1
                    }
                    None => len,
                };
                copy_from = i;
            }
            b'/' if next == Some(b'*') => {
                out.push_str(&text[copy_from..i]);
                let end = text[i + 2..].find("*/").map_or(len, |pos| i + 2 + pos + 2);
                let newlines = text[i..end].matches('\n').count();
                out.push_str(&"\n".repeat(newlines));
                i = end;
                copy_from = i;
            }
            _ => i += 1,
        }
    }

    out.push_str(&text[copy_from..]);
    out
}

/// Returns the index just past a `"` or `'` literal starting at `i`
///
/// Ordinary literals cannot span lines, so an unterminated one ends at the
/// newline.
pub(crate) fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Returns the index just past a verbatim literal whose body starts at `i`
pub(crate) fn skip_verbatim(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if bytes.get(i + 1) == Some(&b'"') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}
