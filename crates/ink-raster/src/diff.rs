//! Raster Diff
//!
//! Reversible record of a paint operation, stored as the byte-wise XOR of
//! the destination's pixels before and after the operation. Applying the
//! mask toggles the destination between the two states.

use std::borrow::Cow;
use std::sync::{Arc, Weak};

use ink_render::Rect;
use tiny_skia::Pixmap;

use crate::buffer::BYTES_PER_PIXEL;
use crate::{RasterError, RasterSurface};

/// Zero runs shorter than this stay inline in a compressed literal
const MIN_ZERO_RUN: usize = 16;

/// Segment header: zero-run length + literal length
const HEADER_LEN: usize = 16;

#[derive(Debug, Clone)]
enum MaskData {
    Raw(Vec<u8>),
    Compressed { data: Vec<u8>, len: usize },
}

/// XOR diff over a destination surface
#[derive(Debug, Clone)]
pub struct RasterDiff {
    area: Rect,
    mask: MaskData,
    destination: Weak<RasterSurface>,
}

impl RasterDiff {
    /// Capture the change painting `source` onto `destination` would make
    ///
    /// The region is `source.area()`; the destination is left untouched.
    pub fn new(source: &RasterSurface, destination: &Arc<RasterSurface>) -> Result<Self, RasterError> {
        let area = source.area();
        let mut diff = Self {
            area,
            mask: MaskData::Raw(Vec::new()),
            destination: Arc::downgrade(destination),
        };
        if area.is_empty() {
            return Ok(diff);
        }

        let before = read_region(destination, area)?;
        let mut after = before.clone();
        source.render_into(&mut after, area.origin());

        let mask = before
            .data()
            .iter()
            .zip(after.data())
            .map(|(a, b)| a ^ b)
            .collect();
        diff.mask = MaskData::Raw(mask);
        tracing::debug!("Captured raster diff over {:?}", area);
        Ok(diff)
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    /// Destination surface, if still alive
    pub fn destination(&self) -> Option<Arc<RasterSurface>> {
        self.destination.upgrade()
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// XOR the mask into the destination; a destroyed destination is a no-op
    pub fn apply(&self) -> Result<(), RasterError> {
        let Some(destination) = self.destination.upgrade() else {
            tracing::debug!("Raster diff destination expired, skipping apply");
            return Ok(());
        };
        if self.area.is_empty() {
            return Ok(());
        }

        let mask = self.mask_bytes();
        let row_len = self.area.width as usize * BYTES_PER_PIXEL;
        assert_eq!(
            mask.len(),
            row_len * self.area.height as usize,
            "diff mask does not match its area"
        );

        let mut writer = destination.bit_writer(self.area)?;
        for (index, mask_row) in mask.chunks_exact(row_len).enumerate() {
            if mask_row.iter().all(|&b| b == 0) {
                continue;
            }
            if let Some(row) = writer.row_mut(index) {
                for (byte, m) in row.iter_mut().zip(mask_row) {
                    *byte ^= m;
                }
            }
        }
        Ok(())
    }

    fn mask_bytes(&self) -> Cow<'_, [u8]> {
        match &self.mask {
            MaskData::Raw(bytes) => Cow::Borrowed(bytes),
            MaskData::Compressed { data, len } => Cow::Owned(decode(data, *len)),
        }
    }

    /// Encode the mask with zero-run elision
    pub fn compress(&mut self) {
        if let MaskData::Raw(bytes) = &self.mask {
            let len = bytes.len();
            let data = encode(bytes);
            tracing::trace!("Compressed diff mask {} -> {} bytes", len, data.len());
            self.mask = MaskData::Compressed { data, len };
        }
    }

    pub fn uncompress(&mut self) {
        if let MaskData::Compressed { data, len } = &self.mask {
            self.mask = MaskData::Raw(decode(data, *len));
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.mask, MaskData::Compressed { .. })
    }

    /// Bytes held by the mask in its current representation
    pub fn memory_size(&self) -> usize {
        match &self.mask {
            MaskData::Raw(bytes) => bytes.len(),
            MaskData::Compressed { data, .. } => data.len(),
        }
    }
}

/// Raw destination bytes over `area`; unallocated parts read as zero
fn read_region(surface: &RasterSurface, area: Rect) -> Result<Pixmap, RasterError> {
    let failed = RasterError::AllocationFailed {
        width: area.width,
        height: area.height,
    };
    let mut pixmap = Pixmap::new(area.width as u32, area.height as u32).ok_or(failed)?;

    let reader = surface.bit_reader(area)?;
    let readable = reader.area();
    if readable.is_empty() {
        return Ok(pixmap);
    }
    let stride = area.width as usize * BYTES_PER_PIXEL;
    let dx = (readable.x - area.x) as usize * BYTES_PER_PIXEL;
    let data = pixmap.data_mut();
    for (index, row) in reader.rows().enumerate() {
        let y = (readable.y - area.y) as usize + index;
        let start = y * stride + dx;
        data[start..start + row.len()].copy_from_slice(row);
    }
    Ok(pixmap)
}

fn encode(mask: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < mask.len() {
        let zeros_start = i;
        while i < mask.len() && mask[i] == 0 {
            i += 1;
        }
        let zeros = i - zeros_start;

        let literal_start = i;
        while i < mask.len() {
            if mask[i] != 0 {
                i += 1;
                continue;
            }
            let run = mask[i..].iter().take_while(|&&b| b == 0).count();
            if run >= MIN_ZERO_RUN || i + run == mask.len() {
                break;
            }
            i += run;
        }

        out.extend_from_slice(&(zeros as u64).to_le_bytes());
        out.extend_from_slice(&((i - literal_start) as u64).to_le_bytes());
        out.extend_from_slice(&mask[literal_start..i]);
    }
    out
}

fn decode(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut pos = 0;
    while let (Some(zeros), Some(literal)) = (read_u64(data, pos), read_u64(data, pos + 8)) {
        pos += HEADER_LEN;
        out.resize(out.len() + zeros as usize, 0);
        let end = (pos + literal as usize).min(data.len());
        out.extend_from_slice(&data[pos..end]);
        pos = end;
    }
    out.resize(len, 0);
    out
}

fn read_u64(data: &[u8], pos: usize) -> Option<u64> {
    let bytes = data.get(pos..pos + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}
