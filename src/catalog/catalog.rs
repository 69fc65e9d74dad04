use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

use log::{debug, info};

use crate::{
    buffer::BufferPoolManager,
    catalog::{Column, Schema},
    config::{CATALOG_PAGE_ID, PAGE_SIZE},
    error::DbError,
    index::HashIndex,
    io::{ByteReader, ByteWriter},
    recovery::LogManager,
    storage::table::TableHeap,
    transaction::{LockManager, Transaction},
    types::{DbResult, PageID, TypeId, OID},
    utils::HandyRwLock,
};

/// Everything the executor layer needs to know about one table.
pub struct TableMetadata {
    oid: OID,
    name: String,
    schema: Arc<Schema>,
    first_page_id: PageID,
    table: Arc<TableHeap>,
}

impl TableMetadata {
    pub fn oid(&self) -> OID {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn first_page_id(&self) -> PageID {
        self.first_page_id
    }

    pub fn table(&self) -> &Arc<TableHeap> {
        &self.table
    }

    pub fn get_index(&self, col_index: usize) -> Option<Arc<HashIndex>> {
        self.table.index(col_index)
    }
}

/// The table registry, persisted on page 0 of the database file.
///
/// The page is rewritten in place on every schema change, so a restart
/// only has to deserialize it to find every table's oid, name, schema and
/// first page. OIDs are dense and monotonic starting at 1.
pub struct Catalog {
    bpm: Arc<BufferPoolManager>,
    log_manager: Arc<LogManager>,
    lock_manager: Arc<LockManager>,
    tables: Mutex<Vec<Arc<TableMetadata>>>,
    next_oid: AtomicU32,
}

impl Catalog {
    /// First start against an empty file: claim page 0 and persist an
    /// empty registry.
    pub fn bootstrap(
        bpm: Arc<BufferPoolManager>,
        log_manager: Arc<LogManager>,
        lock_manager: Arc<LockManager>,
    ) -> Result<Catalog, DbError> {
        let frame = bpm.new_page()?;
        let page_id = frame.rl().id();
        if page_id != CATALOG_PAGE_ID {
            return Err(DbError::internal(&format!(
                "catalog bootstrap got page {} instead of {}",
                page_id, CATALOG_PAGE_ID
            )));
        }
        bpm.unpin_page(page_id, true)?;

        let catalog = Catalog {
            bpm,
            log_manager,
            lock_manager,
            tables: Mutex::new(Vec::new()),
            next_oid: AtomicU32::new(1),
        };
        catalog.persist()?;
        info!("catalog bootstrapped on page {}", CATALOG_PAGE_ID);
        Ok(catalog)
    }

    /// Restart against an existing file: rebuild the registry from page 0
    /// and re-attach the indexes by scanning each heap (the page-0 layout
    /// stores no index roots).
    pub fn recover(
        bpm: Arc<BufferPoolManager>,
        log_manager: Arc<LogManager>,
        lock_manager: Arc<LockManager>,
    ) -> Result<Catalog, DbError> {
        let frame = bpm.fetch_page(CATALOG_PAGE_ID)?;
        let mut tables = Vec::new();
        let mut max_oid = 0;

        {
            let page = frame.rl();
            let mut reader = ByteReader::new(&page.data);
            let table_count = reader.read::<u32>();

            for _ in 0..table_count {
                let oid = reader.read::<u32>();
                let first_page_id = reader.read::<i32>();
                let name = reader.read::<String>();
                let col_count = reader.read::<u32>();

                let mut columns = Vec::new();
                for _ in 0..col_count {
                    let col_name = reader.read::<String>();
                    let type_id = reader.read::<u32>();
                    let has_index = reader.read::<u8>() != 0;

                    let type_id = TypeId::from_u32(type_id).ok_or_else(|| {
                        DbError::internal(&format!("unknown column type {}", type_id))
                    })?;
                    columns.push(Column::new(&col_name, type_id, has_index));
                }

                let schema = Arc::new(Schema::new(columns));
                let table = TableHeap::open(
                    Arc::clone(&bpm),
                    Arc::clone(&log_manager),
                    Arc::clone(&lock_manager),
                    Arc::clone(&schema),
                    first_page_id,
                );

                max_oid = max_oid.max(oid);
                tables.push(Arc::new(TableMetadata {
                    oid,
                    name,
                    schema,
                    first_page_id,
                    table,
                }));
            }
        }
        bpm.unpin_page(CATALOG_PAGE_ID, false)?;

        for metadata in &tables {
            Self::rebuild_indexes(&bpm, metadata)?;
        }

        info!("catalog recovered, {} tables", tables.len());
        Ok(Catalog {
            bpm,
            log_manager,
            lock_manager,
            tables: Mutex::new(tables),
            next_oid: AtomicU32::new(max_oid + 1),
        })
    }

    /// Create a table: allocate its heap, assign the next oid, build the
    /// requested indexes and rewrite page 0.
    pub fn create_table(
        &self,
        name: &str,
        schema: Schema,
        txn: &Transaction,
    ) -> Result<Arc<TableMetadata>, DbError> {
        let schema = Arc::new(schema);
        let table = TableHeap::new(
            Arc::clone(&self.bpm),
            Arc::clone(&self.log_manager),
            Arc::clone(&self.lock_manager),
            Arc::clone(&schema),
            txn,
        )?;

        for (col, column) in schema.columns().iter().enumerate() {
            if column.has_index() {
                let index = HashIndex::new(Arc::clone(&self.bpm))?;
                table.set_index(col, index);
            }
        }

        let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
        let metadata = Arc::new(TableMetadata {
            oid,
            name: name.to_string(),
            schema,
            first_page_id: table.first_page_id(),
            table,
        });

        self.tables.lock().unwrap().push(Arc::clone(&metadata));
        self.persist()?;

        debug!(
            "created table {} (oid {}, first page {})",
            name,
            oid,
            metadata.first_page_id()
        );
        Ok(metadata)
    }

    pub fn get_table_by_oid(&self, oid: OID) -> Result<Arc<TableMetadata>, DbError> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.oid == oid)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(format!("oid {}", oid)))
    }

    pub fn get_table_by_name(&self, name: &str) -> Result<Arc<TableMetadata>, DbError> {
        self.tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_count(&self) -> usize {
        self.tables.lock().unwrap().len()
    }

    /// Serialize the registry into page 0 and push it to disk.
    fn persist(&self) -> DbResult {
        let tables = self.tables.lock().unwrap();

        let mut writer = ByteWriter::new();
        writer.write(&(tables.len() as u32));
        for metadata in tables.iter() {
            writer.write(&metadata.oid);
            writer.write(&metadata.first_page_id);
            writer.write(&metadata.name.to_string());
            writer.write(&(metadata.schema.len() as u32));
            for column in metadata.schema.columns() {
                writer.write(&column.name().to_string());
                writer.write(&(column.type_id() as u32));
                writer.write(&(column.has_index() as u8));
            }
        }

        if writer.size() > PAGE_SIZE {
            return Err(DbError::internal("catalog no longer fits on page 0"));
        }
        let bytes = writer.into_padded_bytes(PAGE_SIZE);

        let frame = self.bpm.fetch_page(CATALOG_PAGE_ID)?;
        frame.wl().data.copy_from_slice(&bytes);
        self.bpm.unpin_page(CATALOG_PAGE_ID, true)?;
        self.bpm.flush_page(CATALOG_PAGE_ID)?;
        Ok(())
    }

    fn rebuild_indexes(
        bpm: &Arc<BufferPoolManager>,
        metadata: &Arc<TableMetadata>,
    ) -> DbResult {
        let indexed_cols: Vec<usize> = metadata
            .schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.has_index())
            .map(|(i, _)| i)
            .collect();
        if indexed_cols.is_empty() {
            return Ok(());
        }

        for &col in &indexed_cols {
            let index = HashIndex::new(Arc::clone(bpm))?;
            metadata.table.set_index(col, index);
        }

        let mut rows = 0usize;
        for (rid, tuple) in metadata.table.iterator() {
            for &col in &indexed_cols {
                if let Some(index) = metadata.table.index(col) {
                    index.insert_entry(tuple.cell(col), rid)?;
                }
            }
            rows += 1;
        }

        debug!(
            "rebuilt {} index(es) on {} from {} rows",
            indexed_cols.len(),
            metadata.name,
            rows
        );
        Ok(())
    }
}
