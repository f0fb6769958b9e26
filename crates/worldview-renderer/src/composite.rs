use crate::{LayerKind, Raster, ScreenLayer, TextureId, TileLayer};

use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;
use worldview_map::WorldUnits;

#[derive(Debug, Error, PartialEq)]
pub enum CompositeError {
    #[error("a composite needs at least one delegate")]
    Empty,
    #[error("row {row} has {found} delegates, expected {expected}")]
    NotSquare {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("delegate [{row}][{col}] has {property} {found}, expected {expected}")]
    Mismatch {
        row: usize,
        col: usize,
        property: &'static str,
        expected: String,
        found: String,
    },
}

/// Many small layers merged into one big layer, so the display holds one texture instead of N x N.
#[derive(Debug)]
pub struct CompositeLayer {
    layer: Arc<TileLayer>,
    grid_size: usize,
}

impl CompositeLayer {
    /// Merges an N x N grid of structurally identical layers. Delegate `[row][col]` lands at pixel `(col * w, row * h)`.
    ///
    /// The delegates are consumed. Their textures are returned so the owning thread can release them; their layers are
    /// dropped here unless another tile still shares them.
    pub fn merge(delegates: Vec<Vec<ScreenLayer>>) -> Result<(Self, Vec<TextureId>), CompositeError> {
        let n = delegates.len();
        let first = delegates.first().and_then(|row| row.first()).ok_or(CompositeError::Empty)?;
        let kind = first.kind();
        let (w, h) = first.layer().raster().dimensions();

        // Validate everything before touching any pixels.
        for (row, delegate_row) in delegates.iter().enumerate() {
            if delegate_row.len() != n {
                return Err(CompositeError::NotSquare {
                    row,
                    expected: n,
                    found: delegate_row.len(),
                });
            }
            for (col, delegate) in delegate_row.iter().enumerate() {
                let found_dims = delegate.layer().raster().dimensions();
                if found_dims != (w, h) {
                    return Err(CompositeError::Mismatch {
                        row,
                        col,
                        property: "dimensions",
                        expected: format!("{}x{}", w, h),
                        found: format!("{}x{}", found_dims.0, found_dims.1),
                    });
                }
                if delegate.kind() != kind {
                    return Err(CompositeError::Mismatch {
                        row,
                        col,
                        property: "kind",
                        expected: format!("{:?}", kind),
                        found: format!("{:?}", delegate.kind()),
                    });
                }
            }
        }

        let mut raster = Raster::new(w * n as u32, h * n as u32);
        let mut footprint = None;
        let mut markers = Vec::new();
        let mut complete = true;
        let mut sample_resolution = 0;
        let mut released = Vec::new();
        let mut closed = 0;

        for (row, delegate_row) in delegates.into_iter().enumerate() {
            for (col, delegate) in delegate_row.into_iter().enumerate() {
                let (layer, texture) = delegate.into_parts();
                raster.blit(layer.raster(), col as u32 * w, row as u32 * h);

                let WorldUnits(bounds) = layer.footprint();
                footprint = Some(footprint.map_or(bounds, |f: worldview_core::geometry::Rect| f.union(&bounds)));
                markers.extend_from_slice(layer.markers());
                complete &= layer.is_complete();
                sample_resolution = sample_resolution.max(layer.sample_resolution());

                released.extend(texture);
                if Arc::try_unwrap(layer).is_ok() {
                    closed += 1;
                }
            }
        }

        log::debug!(
            "Merged {}x{} {:?} layers, closed {} and left {} shared",
            n,
            n,
            kind,
            closed,
            n * n - closed
        );

        let footprint = WorldUnits(footprint.ok_or(CompositeError::Empty)?);
        let layer = TileLayer::from_parts(kind, raster, footprint, sample_resolution, complete, markers);
        Ok((
            Self {
                layer: Arc::new(layer),
                grid_size: n,
            },
            released,
        ))
    }

    pub fn layer(&self) -> &Arc<TileLayer> {
        &self.layer
    }

    pub fn kind(&self) -> LayerKind {
        self.layer.kind()
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn into_screen_layer(self) -> ScreenLayer {
        ScreenLayer::new(self.layer)
    }
}

/// Regroups a flat row-major list into rows of `n`.
pub fn into_grid<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    if n == 0 {
        return Vec::new();
    }
    items
        .into_iter()
        .chunks(n)
        .into_iter()
        .map(|c| c.collect())
        .collect()
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use worldview_core::geometry::Rect;
    use worldview_core::glam::IVec2;

    fn delegate(row: usize, col: usize, edge: u32, kind: LayerKind) -> ScreenLayer {
        let tag = (row * 2 + col) as u32;
        let pixels = (0..edge * edge).map(|i| tag << 24 | i).collect();
        let raster = Raster::from_pixels(edge, edge, pixels).unwrap();
        let footprint = WorldUnits(Rect::square(IVec2::new(col as i32 * 256, row as i32 * 256), 256));
        let mut screen = ScreenLayer::new(Arc::new(TileLayer::from_parts(
            kind,
            raster,
            footprint,
            4,
            true,
            Vec::new(),
        )));
        screen.set_texture(TextureId(tag as u64));
        screen
    }

    fn grid(edge_of: impl Fn(usize, usize) -> u32) -> Vec<Vec<ScreenLayer>> {
        (0..2)
            .map(|row| {
                (0..2)
                    .map(|col| delegate(row, col, edge_of(row, col), LayerKind::Elevation))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn merge_places_delegates_by_row_and_column() {
        let delegates = grid(|_, _| 64);
        let expected = delegates[1][1].layer().raster().clone();

        let (composite, released) = CompositeLayer::merge(delegates).unwrap();
        let raster = composite.layer().raster();
        assert_eq!(raster.dimensions(), (128, 128));
        for j in 0..64 {
            for i in 0..64 {
                assert_eq!(raster.get(64 + i, 64 + j), expected.get(i, j));
            }
        }
        assert_eq!(raster.get(64, 0) >> 24, 1);
        assert_eq!(raster.get(0, 64) >> 24, 2);

        let WorldUnits(bounds) = composite.layer().footprint();
        assert_eq!(bounds, Rect::square(IVec2::ZERO, 512));
        assert_eq!(released.len(), 4);
        assert_eq!(composite.grid_size(), 2);
    }

    #[test]
    fn mismatched_dimensions_name_the_cell() {
        let delegates = grid(|row, col| if (row, col) == (1, 0) { 32 } else { 64 });
        let err = CompositeLayer::merge(delegates).unwrap_err();
        assert_eq!(
            err,
            CompositeError::Mismatch {
                row: 1,
                col: 0,
                property: "dimensions",
                expected: "64x64".to_owned(),
                found: "32x32".to_owned(),
            }
        );
    }

    #[test]
    fn mismatched_kind_is_rejected() {
        let mut delegates = grid(|_, _| 16);
        delegates[0][1] = delegate(0, 1, 16, LayerKind::Classification);
        let err = CompositeLayer::merge(delegates).unwrap_err();
        assert!(matches!(
            err,
            CompositeError::Mismatch {
                row: 0,
                col: 1,
                property: "kind",
                ..
            }
        ));
    }

    #[test]
    fn shared_layers_survive_merge() {
        let mut delegates = grid(|_, _| 8);
        let shared = delegates[0][0].layer().clone();
        delegates[1][0] = delegate(1, 0, 8, LayerKind::Elevation);
        let (composite, _) = CompositeLayer::merge(delegates).unwrap();
        assert_eq!(Arc::strong_count(&shared), 1);
        assert_eq!(composite.layer().raster().get(0, 0), shared.raster().get(0, 0));
    }

    #[test]
    fn ragged_grid_is_rejected() {
        let mut delegates = grid(|_, _| 8);
        delegates[1].pop();
        assert_eq!(
            CompositeLayer::merge(delegates).unwrap_err(),
            CompositeError::NotSquare {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert_eq!(CompositeLayer::merge(Vec::new()).unwrap_err(), CompositeError::Empty);
    }

    #[test]
    fn flat_list_regroups_into_rows() {
        let rows = into_grid((0..6).collect(), 3);
        assert_eq!(rows, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }
}
