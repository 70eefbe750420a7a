// Copyright (c) 2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

/// Wrap an ASCII string (in practice, base-64) at `width` columns, ending
/// every line with a newline, the last included.
pub(crate) fn line_wrap(s: &str, width: usize) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / width + 2);
    let mut rest = s;
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(width.min(rest.len()));
        out.push_str(line);
        out.push('\n');
        rest = tail;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_width() {
        assert_eq!(line_wrap("abcdef", 4), "abcd\nef\n");
        assert_eq!(line_wrap("abcd", 4), "abcd\n");
        assert_eq!(line_wrap("", 4), "");
    }
}

////////////////////////////
// Test Utility Functions //
////////////////////////////
