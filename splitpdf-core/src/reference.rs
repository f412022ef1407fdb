use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Indirect object reference of a page inside its PDF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub num: u32,
    pub gen: u16,
}

impl PageRef {
    pub const fn new(num: u32, gen: u16) -> Self {
        Self { num, gen }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gen == 0 {
            write!(f, "{}R", self.num)
        } else {
            write!(f, "{}R{}", self.num, self.gen)
        }
    }
}

/// Maps the reference of every loaded page to its 1-based page number.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    pages: HashMap<PageRef, usize>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reference: PageRef, page: usize) {
        self.pages.insert(reference, page);
    }

    pub fn page_number(&self, reference: PageRef) -> Option<usize> {
        self.pages.get(&reference).copied()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
