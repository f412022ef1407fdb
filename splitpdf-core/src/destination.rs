use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::reference::PageRef;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DestinationTarget {
    Ref(PageRef),
    /// Zero-based page index, as written by producers that skip references.
    PageIndex(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DestinationView {
    Xyz {
        left: Option<f32>,
        top: Option<f32>,
        zoom: Option<f32>,
    },
    Fit,
    FitH {
        top: Option<f32>,
    },
    FitV {
        left: Option<f32>,
    },
    FitR {
        left: f32,
        bottom: f32,
        right: f32,
        top: f32,
    },
    FitB,
    FitBH {
        top: Option<f32>,
    },
    FitBV {
        left: Option<f32>,
    },
}

/// Explicit destination array: a target page and how to position it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplicitDestination {
    pub target: DestinationTarget,
    pub view: DestinationView,
}

impl ExplicitDestination {
    pub fn fit(target: DestinationTarget) -> Self {
        Self {
            target,
            view: DestinationView::Fit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DestinationEntry {
    pub destination: ExplicitDestination,
    pub page_number: usize,
}

/// Named destinations discovered so far, plus which pages have been scanned.
#[derive(Debug)]
pub struct DestinationIndex {
    entries: HashMap<String, DestinationEntry>,
    scanned: Vec<bool>,
}

impl DestinationIndex {
    pub fn new(page_count: usize) -> Self {
        Self {
            entries: HashMap::new(),
            scanned: vec![false; page_count],
        }
    }

    pub fn is_scanned(&self, page: usize) -> bool {
        page.checked_sub(1)
            .and_then(|index| self.scanned.get(index))
            .copied()
            .unwrap_or(false)
    }

    /// Records the destinations declared by `page` and marks it scanned.
    /// Names already present keep their earlier entry.
    pub fn record_page<I>(&mut self, page: usize, destinations: I)
    where
        I: IntoIterator<Item = (String, ExplicitDestination)>,
    {
        for (name, destination) in destinations {
            self.entries.entry(name).or_insert(DestinationEntry {
                destination,
                page_number: page,
            });
        }
        self.mark_scanned(page);
    }

    pub fn mark_scanned(&mut self, page: usize) {
        if let Some(slot) = page
            .checked_sub(1)
            .and_then(|index| self.scanned.get_mut(index))
        {
            *slot = true;
        }
    }

    pub fn get(&self, name: &str) -> Option<DestinationEntry> {
        self.entries.get(name).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, ExplicitDestination> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.destination))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scanned.iter_mut().for_each(|flag| *flag = false);
    }
}
