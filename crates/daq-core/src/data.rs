/// Represents a single image frame.
///
/// Designed to be flexible for FFI (C-compatible memory layout) and efficient storage.
///
/// # Storage
/// Data is stored as a raw byte vector (`Vec<u8>`).
/// - 8-bit images: 1 byte per pixel.
/// - 12/16-bit images: 2 bytes per pixel, Little Endian.
///
/// Use `as_u16_slice()` to access 16-bit data safely.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Bits per pixel (e.g., 8, 12, 16)
    pub bit_depth: u32,

    /// Raw pixel data
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a new frame from 16-bit pixel data.
    ///
    /// Copies the data into a byte vector.
    pub fn from_u16(width: u32, height: u32, pixels: &[u16]) -> Self {
        // Convert u16 pixels to u8 bytes (Little Endian)
        let mut data = Vec::with_capacity(pixels.len() * 2);
        for pixel in pixels {
            data.extend_from_slice(&pixel.to_le_bytes());
        }

        Self {
            width,
            height,
            bit_depth: 16,
            data,
        }
    }

    /// Create a new frame from 8-bit pixel data.
    pub fn from_u8(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            data,
        }
    }

    /// Create a frame from raw byte data with explicit bit depth.
    ///
    /// The caller must ensure the buffer length matches the expected size for the bit depth.
    pub fn from_bytes(width: u32, height: u32, bit_depth: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bit_depth,
            data,
        }
    }

    /// Get pixel value at (x, y) as u32 (handling bit depth conversion).
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }

        let idx = (y * self.width + x) as usize;

        match self.bit_depth {
            8 => self.data.get(idx).map(|&v| v as u32),
            12 | 16 => {
                let start = idx * 2;
                if start + 1 < self.data.len() {
                    let bytes = [self.data[start], self.data[start + 1]];
                    Some(u16::from_le_bytes(bytes) as u32)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Access data as u16 slice (if applicable).
    ///
    /// Returns None if bit_depth is 8, data length is odd, or the buffer is
    /// not u16 aligned.
    pub fn as_u16_slice(&self) -> Option<&[u16]> {
        if self.bit_depth <= 8 {
            return None;
        }
        if self.data.len() % 2 != 0 {
            return None;
        }

        // SAFETY: Casting [u8] to [u16] is valid if alignment is respected.
        // Vec<u8> is not guaranteed to be u16 aligned, so we rely on `align_to`
        // and reject the slice if the allocator handed us an odd address.
        #[allow(unsafe_code)]
        let (prefix, mid, suffix) = unsafe { self.data.align_to::<u16>() };

        if !prefix.is_empty() || !suffix.is_empty() {
            return None;
        }

        Some(mid)
    }

    /// Calculate mean pixel value.
    pub fn mean(&self) -> f64 {
        match self.bit_depth {
            8 => {
                if self.data.is_empty() {
                    return 0.0;
                }
                let sum: u64 = self.data.iter().map(|&v| v as u64).sum();
                sum as f64 / self.data.len() as f64
            }
            12 | 16 => {
                let slice = self.as_u16_slice().unwrap_or(&[]);
                if slice.is_empty() {
                    return 0.0;
                }
                let sum: u64 = slice.iter().map(|&v| v as u64).sum();
                sum as f64 / slice.len() as f64
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u16_round_trips_pixels() {
        let pixels: Vec<u16> = vec![0, 1, 256, 4095, u16::MAX];
        let frame = Frame::from_u16(5, 1, &pixels);

        assert_eq!(frame.bit_depth, 16);
        assert_eq!(frame.data.len(), pixels.len() * 2);
        assert_eq!(frame.as_u16_slice(), Some(pixels.as_slice()));
    }

    #[test]
    fn test_get_handles_bounds_and_depths() {
        let frame8 = Frame::from_u8(2, 2, vec![10, 20, 30, 40]);
        assert_eq!(frame8.get(0, 0), Some(10));
        assert_eq!(frame8.get(1, 1), Some(40));
        assert_eq!(frame8.get(2, 0), None);

        let frame16 = Frame::from_u16(2, 1, &[500, 4000]);
        assert_eq!(frame16.get(1, 0), Some(4000));
        assert_eq!(frame16.get(0, 1), None);
    }

    #[test]
    fn test_as_u16_slice_rejects_8bit_and_odd_lengths() {
        let frame8 = Frame::from_u8(2, 1, vec![1, 2]);
        assert!(frame8.as_u16_slice().is_none());

        let odd = Frame::from_bytes(1, 1, 16, vec![1, 2, 3]);
        assert!(odd.as_u16_slice().is_none());
    }

    #[test]
    fn test_mean() {
        let frame8 = Frame::from_u8(4, 1, vec![0, 10, 20, 30]);
        assert!((frame8.mean() - 15.0).abs() < f64::EPSILON);

        let frame16 = Frame::from_u16(2, 1, &[100, 300]);
        assert!((frame16.mean() - 200.0).abs() < f64::EPSILON);

        let empty = Frame::from_u8(0, 0, vec![]);
        assert_eq!(empty.mean(), 0.0);
    }
}
