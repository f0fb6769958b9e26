/// Packs an RGBA8 color so that its in-memory bytes are `[r, g, b, a]` on little-endian targets.
#[inline]
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | (g as u32) << 8 | (b as u32) << 16 | (a as u32) << 24
}

pub const TRANSPARENT: u32 = 0;

/// A CPU-side pixel grid, row-major, one packed [`rgba`] value per pixel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Raster {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; width as usize * height as usize],
        }
    }

    /// Returns `None` if `pixels` does not hold exactly `width * height` values.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then(|| Self {
            width,
            height,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        x as usize + y as usize * self.width as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: u32) {
        let i = self.index(x, y);
        self.pixels[i] = color;
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u32] {
        let start = self.index(0, y);
        &mut self.pixels[start..start + self.width as usize]
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    /// The pixels as RGBA8 bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Copies all of `src` into `self` with its minimum corner at `(x, y)`. `src` must fit.
    pub fn blit(&mut self, src: &Raster, x: u32, y: u32) {
        assert!(x + src.width <= self.width && y + src.height <= self.height);
        let w = src.width as usize;
        for row in 0..src.height {
            let dst_start = self.index(x, y + row);
            let src_start = row as usize * w;
            self.pixels[dst_start..dst_start + w].copy_from_slice(&src.pixels[src_start..src_start + w]);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytes_are_rgba_order() {
        let mut r = Raster::new(1, 1);
        r.set(0, 0, rgba(1, 2, 3, 4));
        if cfg!(target_endian = "little") {
            assert_eq!(r.as_bytes(), &[1, 2, 3, 4]);
        }
    }

    #[test]
    fn blit_places_rows() {
        let mut dst = Raster::new(4, 4);
        let src = Raster::from_pixels(2, 2, vec![1, 2, 3, 4]).unwrap();
        dst.blit(&src, 2, 1);
        assert_eq!(dst.get(2, 1), 1);
        assert_eq!(dst.get(3, 1), 2);
        assert_eq!(dst.get(2, 2), 3);
        assert_eq!(dst.get(3, 2), 4);
        assert_eq!(dst.get(1, 1), TRANSPARENT);
        assert!(Raster::from_pixels(3, 3, vec![0; 8]).is_none());
    }
}
