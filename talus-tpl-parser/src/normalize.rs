// MIT License
//
// Copyright (c) 2024 Jerome Johnson
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.


//! Source normalization ahead of tokenizing: comment stripping and the rewrite of
//! deprecated tag spellings.

use std::borrow::Cow;

use regex::Regex;

pub(crate) struct Normalizer {
    comments: Regex,
    legacy: [(String, String); 2],
}

impl Normalizer {
    /// `namespace` is the tag prefix including its colon, or empty
    pub fn new(namespace: &str) -> Self {
        Self {
            comments: Regex::new(r"(?s)/\*.*?\*/").unwrap(),
            legacy: [
                (
                    format!("<{}blockelse />", namespace),
                    format!("<{}foreachelse />", namespace),
                ),
                (format!("</{}block>", namespace), format!("</{}foreach>", namespace)),
            ],
        }
    }

    pub fn apply<'a>(&self, src: &'a str) -> Cow<'a, str> {
        let mut normalized = self.comments.replace_all(src, "");
        for (from, to) in &self.legacy {
            if normalized.contains(from.as_str()) {
                normalized = Cow::Owned(normalized.replace(from.as_str(), to));
            }
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_lazily() {
        let normalizer = Normalizer::new("");
        assert_eq!(normalizer.apply("a/* x */b/* y\n z */c"), "abc");
        assert_eq!(normalizer.apply("a/* open"), "a/* open");
    }

    #[test]
    fn rewrites_legacy_tags_once() {
        let normalizer = Normalizer::new("");
        assert_eq!(
            normalizer.apply("<blockelse /></block>"),
            "<foreachelse /></foreach>"
        );
        let normalizer = Normalizer::new("tpl:");
        assert_eq!(
            normalizer.apply("<tpl:blockelse /></tpl:block></block>"),
            "<tpl:foreachelse /></tpl:foreach></block>"
        );
    }

    #[test]
    fn borrows_untouched_source() {
        let normalizer = Normalizer::new("");
        assert!(matches!(normalizer.apply("plain"), Cow::Borrowed(_)));
    }
}
