//! Outbound text preparation and splitting for `sendMessage`.
//!
//! The remote has no continuation primitive, so an oversized text goes out as
//! numbered parts sent strictly in order:
//!
//! ```text
//! <instance> part 1 <body> MESS #7 CONTINUE->
//! <instance> MESS #7 part 2 <body> MESS #7 ENDED
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::{errors::Error, Result};

/// Room kept in every part for the prefix and suffix labels.
///
/// Covers the widest possible labels (20-digit message number, 20-digit part
/// index), so every part carries the same body budget.
pub const LABEL_RESERVE: usize = 96;

const MIN_CHUNK: usize = 16;

/// Removes terminal color/control sequences.
pub fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| {
        Regex::new(
            "[\u{1b}\u{9b}][\\[\\]()#;?]*(?:(?:(?:[a-zA-Z\\d]*(?:;[a-zA-Z\\d]*)*)?\u{07})|(?:(?:\\d{1,4}(?:;\\d{0,4})*)?[\\dA-PRZcf-ntqry=><~]))",
        )
        .expect("valid ansi regex")
    });
    re.replace_all(text, "").into_owned()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmenter {
    instance: String,
    max_len: usize,
}

/// One bounded slice of an oversized message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 1-based.
    pub index: usize,
    pub body: &'a str,
    pub last: bool,
}

impl Segmenter {
    pub fn new(instance: impl Into<String>, max_len: usize) -> Result<Self> {
        let instance = instance.into();
        let needed = instance.len() + LABEL_RESERVE + MIN_CHUNK;
        if max_len < needed {
            return Err(Error::Config(format!(
                "max message length {max_len} leaves no room for the instance prefix and part labels (need at least {needed})"
            )));
        }
        Ok(Self { instance, max_len })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Text budget of a single-request message.
    pub fn effective_limit(&self) -> usize {
        self.max_len - self.instance.len()
    }

    /// Body budget of each part of a split message.
    pub fn chunk_size(&self) -> usize {
        self.effective_limit() - LABEL_RESERVE
    }

    /// Trim, and strip ANSI sequences unless the text is markdown.
    pub fn prepare(&self, text: &str, markdown: bool) -> String {
        let text = text.trim();
        if markdown {
            return text.to_string();
        }
        strip_ansi(text).trim().to_string()
    }

    pub fn fits(&self, text: &str) -> bool {
        text.len() <= self.effective_limit()
    }

    pub fn single(&self, text: &str) -> String {
        format!("{}{text}", self.instance)
    }

    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            text,
            pos: 0,
            index: 0,
            size: self.chunk_size(),
        }
    }

    /// Full wire text of `chunk`, labeled with message number `mess_no`.
    pub fn render(&self, chunk: &Chunk<'_>, mess_no: i64) -> String {
        let prefix = if chunk.index == 1 {
            " part 1 ".to_string()
        } else {
            format!(" MESS #{mess_no} part {} ", chunk.index)
        };
        let suffix = if chunk.last {
            format!(" MESS #{mess_no} ENDED")
        } else {
            format!(" MESS #{mess_no} CONTINUE->")
        };
        format!("{}{prefix}{}{suffix}", self.instance, chunk.body)
    }
}

/// Left-to-right carving of a text into parts; never splits a UTF-8 sequence.
#[derive(Clone, Debug)]
pub struct Chunks<'a> {
    text: &'a str,
    pos: usize,
    index: usize,
    size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }
        let mut end = (self.pos + self.size).min(self.text.len());
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        let body = &self.text[self.pos..end];
        self.pos = end;
        self.index += 1;
        Some(Chunk {
            index: self.index,
            body,
            last: end == self.text.len(),
        })
    }
}
