//! Continuation table: id allocation plus one optional resume action per continuation.
//!
//! The table is generic over the action type so it knows nothing about how a
//! continuation is actually woken. The scheduler stores its `ResumeAction` here.

use std::collections::HashMap;

use log::trace;

use crate::ids::ContinuationId;

/// One entry per known continuation.
///
/// `resume` present means the continuation is suspended (or unborn) and can be woken.
/// Absent means it is running, or it terminated without leaving a resume point.
#[derive(Debug)]
pub struct ContinuationRecord<A> {
    resume: Option<A>,
}

impl<A> ContinuationRecord<A> {
    fn empty() -> Self {
        ContinuationRecord { resume: None }
    }

    pub fn has_resume(&self) -> bool {
        self.resume.is_some()
    }

    pub fn resume(&self) -> Option<&A> {
        self.resume.as_ref()
    }
}

pub struct ContinuationTable<A> {
    records: HashMap<ContinuationId, ContinuationRecord<A>>,
    next_id: ContinuationId,
}

impl<A> ContinuationTable<A> {
    /// Create a table holding only the main continuation, with no stored resume action.
    pub fn new() -> Self {
        let mut records = HashMap::new();
        records.insert(ContinuationId::MAIN, ContinuationRecord::empty());
        ContinuationTable {
            records,
            next_id: ContinuationId::FIRST_SPAWNED,
        }
    }

    /// Hand out the next id. Does not create a record; `put` does.
    pub fn allocate(&mut self) -> ContinuationId {
        let id = self.next_id;
        self.next_id = id.next();
        trace!("table: allocated {}", id);
        id
    }

    /// Store or overwrite the resume action for `id`, creating the record if needed.
    pub fn put(&mut self, id: ContinuationId, action: A) {
        let record = self
            .records
            .entry(id)
            .or_insert_with(ContinuationRecord::empty);
        if record.resume.is_some() {
            trace!("table: overwriting resume action of {}", id);
        }
        record.resume = Some(action);
    }

    /// Read and clear the resume action for `id` in one step.
    pub fn take_resume(&mut self, id: ContinuationId) -> Option<A> {
        let taken = self.records.get_mut(&id).and_then(|r| r.resume.take());
        trace!("table: take_resume({}) -> {}", id, taken.is_some());
        taken
    }

    pub fn exists(&self, id: ContinuationId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn is_suspended(&self, id: ContinuationId) -> bool {
        self.records.get(&id).is_some_and(|r| r.has_resume())
    }

    pub fn get(&self, id: ContinuationId) -> Option<&ContinuationRecord<A>> {
        self.records.get(&id)
    }

    pub fn peek(&self, id: ContinuationId) -> Option<&A> {
        self.records.get(&id).and_then(|r| r.resume())
    }

    /// Ids whose record holds no resume action, in ascending order.
    pub fn without_resume(&self) -> Vec<ContinuationId> {
        let mut ids: Vec<_> = self
            .records
            .iter()
            .filter(|(_, record)| !record.has_resume())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// All known ids in ascending order.
    pub fn ids(&self) -> Vec<ContinuationId> {
        let mut ids: Vec<_> = self.records.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<A> Default for ContinuationTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for ContinuationTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationTable")
            .field("len", &self.records.len())
            .field("suspended", &(self.records.len() - self.without_resume().len()))
            .field("next_id", &self.next_id)
            .finish()
    }
}
