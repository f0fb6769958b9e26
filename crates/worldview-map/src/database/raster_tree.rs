use super::{decode_record, encode_record};
use crate::DbError;

use rkyv::{Archive, Deserialize, Serialize};
use sled::Tree;

pub fn open_raster_tree(map_name: &str, db: &sled::Db) -> sled::Result<Tree> {
    db.open_tree(format!("{}-rasters", map_name))
}

/// Identifies one stored raster.
///
/// Layers that do not refine with level of detail store under `stride == 0`, so a lookup at any stride finds them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RasterKey {
    pub kind: u8,
    pub tile_x: i32,
    pub tile_z: i32,
    pub size: u32,
    pub stride: u32,
}

impl RasterKey {
    pub const BYTES: usize = 17;

    pub fn into_sled_key(&self) -> [u8; Self::BYTES] {
        let mut bytes = [0; Self::BYTES];
        bytes[0] = self.kind;
        bytes[1..5].copy_from_slice(&((self.tile_x as u32) ^ 0x8000_0000).to_be_bytes());
        bytes[5..9].copy_from_slice(&((self.tile_z as u32) ^ 0x8000_0000).to_be_bytes());
        bytes[9..13].copy_from_slice(&self.size.to_be_bytes());
        bytes[13..17].copy_from_slice(&self.stride.to_be_bytes());
        bytes
    }
}

/// A feature marker at a world position.
#[derive(Archive, Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[archive(check_bytes)]
pub struct MarkerRecord {
    pub x: i32,
    pub z: i32,
    pub feature: u32,
}

/// A rasterized layer as stored on disk.
#[derive(Archive, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[archive(check_bytes)]
pub struct RasterRecord {
    pub kind: u8,
    pub complete: bool,
    pub sample_resolution: u32,
    pub size: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8 pixels, `width * height` of them.
    pub pixels: Vec<u32>,
    pub markers: Vec<MarkerRecord>,
}

impl RasterRecord {
    pub fn has_consistent_shape(&self) -> bool {
        self.pixels.len() == self.width as usize * self.height as usize
    }
}

/// The on-disk cache of finished layer rasters.
#[derive(Clone)]
pub struct DiskTileStore {
    tree: Tree,
}

impl DiskTileStore {
    pub fn open(db: &sled::Db, map_name: &str) -> Result<Self, DbError> {
        Ok(Self {
            tree: open_raster_tree(map_name, db)?,
        })
    }

    pub fn read(&self, key: RasterKey) -> Result<Option<RasterRecord>, DbError> {
        let bytes = match self.tree.get(key.into_sled_key())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let record: RasterRecord = decode_record(&bytes)?;
        if !record.has_consistent_shape() {
            return Err(DbError::Corrupt(format!(
                "raster {:?} has {} pixels for a {}x{} image",
                key,
                record.pixels.len(),
                record.width,
                record.height
            )));
        }
        Ok(Some(record))
    }

    pub fn write(&self, key: RasterKey, record: &RasterRecord) -> Result<(), DbError> {
        let bytes = encode_record(record)?;
        self.tree.insert(key.into_sled_key(), bytes)?;
        Ok(())
    }

    pub fn remove(&self, key: RasterKey) -> Result<(), DbError> {
        self.tree.remove(key.into_sled_key())?;
        Ok(())
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
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
