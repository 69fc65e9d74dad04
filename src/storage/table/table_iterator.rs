use std::sync::Arc;

use crate::{
    config::INVALID_PAGE_ID,
    storage::{page::Rid, table::TableHeap, tuple::Tuple},
    types::PageID,
};

/// Forward scan over the live tuples of a heap in RID order, skipping
/// tombstones and dead slots.
///
/// The iterator re-pins the current page on every advance and unpins it
/// before yielding, so it never blocks eviction between calls: a page may
/// be evicted and refetched mid-scan without the iterator noticing.
pub struct TableIterator {
    heap: Arc<TableHeap>,
    page_id: PageID,
    slot: u32,
}

impl TableIterator {
    pub(crate) fn new(heap: Arc<TableHeap>) -> Self {
        let page_id = heap.first_page_id();
        Self {
            heap,
            page_id,
            slot: 0,
        }
    }
}

impl Iterator for TableIterator {
    type Item = (Rid, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_id == INVALID_PAGE_ID {
                return None;
            }

            let table_page = match self.heap.fetch_table_page(self.page_id) {
                Ok(table_page) => table_page,
                Err(e) => {
                    e.show_backtrace();
                    return None;
                }
            };

            let count = table_page.tuple_count();
            while self.slot < count {
                let slot = self.slot;
                self.slot += 1;

                if let Some(data) = table_page.get_tuple_data(slot) {
                    let tuple = Tuple::from_bytes(&data, self.heap.schema());
                    let rid = Rid::new(self.page_id, slot);
                    let _ = self.heap.bpm.unpin_page(self.page_id, false);
                    return Some((rid, tuple));
                }
            }

            let next = table_page.next_page_id();
            let _ = self.heap.bpm.unpin_page(self.page_id, false);
            self.page_id = next;
            self.slot = 0;
        }
    }
}
