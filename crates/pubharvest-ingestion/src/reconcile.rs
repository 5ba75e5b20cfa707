//! Matching recorded metadata against documents found on disk.

use std::collections::{BTreeMap, HashSet};

use crate::models::PaperRecord;
use crate::store::OnDiskDocument;

#[derive(Debug, Default, PartialEq)]
pub struct Reconciled {
    /// Rows backed by a document, in table order, status `exists`.
    pub records: Vec<PaperRecord>,
    /// Documents with no row. Registered but never scored.
    pub untracked: Vec<String>,
    /// Rows whose document is missing or below the size floor.
    pub stale: usize,
    /// Repeated rows for an id already seen.
    pub duplicates: usize,
}

/// Pure: no I/O. The first row wins for a repeated id.
pub fn reconcile(tabular: Vec<PaperRecord>, on_disk: &BTreeMap<String, OnDiskDocument>) -> Reconciled {
    let mut out = Reconciled::default();
    let mut seen: HashSet<String> = HashSet::new();

    for mut record in tabular {
        if !seen.insert(record.pmid.clone()) {
            out.duplicates += 1;
            continue;
        }
        match on_disk.get(&record.pmid) {
            Some(doc) => {
                record.mark_exists(doc.filename.clone(), doc.path.clone(), doc.size);
                out.records.push(record);
            }
            None => out.stale += 1,
        }
    }

    out.untracked = on_disk
        .keys()
        .filter(|pmid| !seen.contains(*pmid))
        .cloned()
        .collect();
    out
}
