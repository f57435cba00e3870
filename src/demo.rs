//! Synthetic entries for the demo endpoint.
//!
//! Entry `i` is named `file_{i:03}.txt` and holds a small HTML document
//! rendered when the entry is opened: a title, an author, the rendering time
//! and one or two paragraphs of filler text.

use async_trait::async_trait;
use chrono::Local;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::io::{self, Cursor};

use crate::source::{ArchiveEntry, EntryReader, EntrySource};

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "voluptate",
];

const FIRST_NAMES: &[&str] = &["Ada", "Grace", "Linus", "Barbara", "Ken", "Frances", "Dennis"];
const LAST_NAMES: &[&str] = &["Lovelace", "Hopper", "Torvalds", "Liskov", "Thompson", "Allen"];

/// Source of `size` generated text entries
pub struct DemoSource {
    size: usize,
    index: usize,
}

impl DemoSource {
    pub fn new(size: usize) -> Self {
        Self { size, index: 0 }
    }
}

impl EntrySource for DemoSource {
    type Entry = DemoEntry;

    fn has_next(&mut self) -> bool {
        self.index < self.size
    }

    fn next_entry(&mut self) -> Option<DemoEntry> {
        if self.index >= self.size {
            return None;
        }
        let entry = DemoEntry::new(self.index);
        self.index += 1;
        Some(entry)
    }
}

pub struct DemoEntry {
    index: usize,
    path: String,
}

impl DemoEntry {
    fn new(index: usize) -> Self {
        Self {
            index,
            path: format!("file_{index:03}.txt"),
        }
    }

    fn render(&self) -> String {
        // Seeded per entry so a file renders the same text every time
        let mut rng = StdRng::seed_from_u64(self.index as u64);
        let author = format!("{} {}", pick(&mut rng, FIRST_NAMES), pick(&mut rng, LAST_NAMES));
        let date = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");

        let mut html = String::new();
        let _ = write!(
            html,
            "<html>\n<head><title>Title {index}</title></head>\n<body>\n\
             <h1>Title {index}</h1>\n<p class=\"author\">{author}</p>\n\
             <p class=\"date\">{date}</p>\n",
            index = self.index,
        );
        for _ in 0..rng.random_range(1..=2) {
            let _ = writeln!(html, "<p>{}</p>", paragraph(&mut rng));
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

#[async_trait]
impl ArchiveEntry for DemoEntry {
    fn path(&self) -> &str {
        &self.path
    }

    async fn open(self) -> io::Result<EntryReader> {
        Ok(Box::new(Cursor::new(self.render().into_bytes())))
    }
}

fn paragraph(rng: &mut StdRng) -> String {
    let sentences = rng.random_range(3..=6);
    let mut text = String::new();
    for s in 0..sentences {
        if s > 0 {
            text.push(' ');
        }
        let words = rng.random_range(6..=14);
        for w in 0..words {
            let word = pick(rng, WORDS);
            if w == 0 {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    text.extend(first.to_uppercase());
                    text.push_str(chars.as_str());
                }
            } else {
                text.push(' ');
                text.push_str(word);
            }
        }
        text.push('.');
    }
    text
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}
