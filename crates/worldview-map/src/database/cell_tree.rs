use super::{decode_record, encode_record};
use crate::{ChunkPos, DataTileRecord, DbError};

use sled::Tree;

pub fn open_cell_tree(map_name: &str, db: &sled::Db) -> sled::Result<Tree> {
    db.open_tree(format!("{}-cells", map_name))
}

/// Persisted [`DataTileRecord`]s, one per chunk.
#[derive(Clone)]
pub struct CellTree {
    tree: Tree,
}

impl CellTree {
    pub fn open(db: &sled::Db, map_name: &str) -> Result<Self, DbError> {
        Ok(Self {
            tree: open_cell_tree(map_name, db)?,
        })
    }

    pub fn read(&self, pos: ChunkPos) -> Result<Option<DataTileRecord>, DbError> {
        match self.tree.get(pos.into_sled_key())? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces whatever was stored for `pos`. A single sled insert is atomic, so readers never see a partial record.
    pub fn write(&self, pos: ChunkPos, record: &DataTileRecord) -> Result<(), DbError> {
        let bytes = encode_record(record)?;
        self.tree.insert(pos.into_sled_key(), bytes)?;
        Ok(())
    }

    pub fn remove(&self, pos: ChunkPos) -> Result<(), DbError> {
        self.tree.remove(pos.into_sled_key())?;
        Ok(())
    }

    pub fn contains(&self, pos: ChunkPos) -> Result<bool, DbError> {
        Ok(self.tree.contains_key(pos.into_sled_key())?)
    }

    /// Every stored position, in key order.
    pub fn positions(&self) -> impl Iterator<Item = Result<ChunkPos, DbError>> {
        self.tree.iter().keys().map(|key| {
            let key = key?;
            ChunkPos::from_sled_key(&key).ok_or_else(|| DbError::Corrupt(format!("bad cell key {:?}", key)))
        })
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn flush(&self) -> Result<(), DbError> {
        self.tree.flush()?;
        Ok(())
    }

    /// Overwrites the stored bytes for `pos` without encoding. Only used to simulate damaged records.
    #[cfg(test)]
    pub(crate) fn write_raw(&self, pos: ChunkPos, bytes: &[u8]) {
        self.tree.insert(pos.into_sled_key(), bytes).unwrap();
    }
}
