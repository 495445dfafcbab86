use bytes::Bytes;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle naming one trained classifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeTarget {
    #[default]
    Cpu,
    Gpu,
}

impl ComputeTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeTarget::Cpu => "cpu",
            ComputeTarget::Gpu => "gpu",
        }
    }
}

/// Capture orientation of a frame, using the EXIF numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

impl Orientation {
    pub fn from_exif(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Up),
            2 => Some(Self::UpMirrored),
            3 => Some(Self::Down),
            4 => Some(Self::DownMirrored),
            5 => Some(Self::LeftMirrored),
            6 => Some(Self::Right),
            7 => Some(Self::RightMirrored),
            8 => Some(Self::Left),
            _ => None,
        }
    }

    /// Turns an image captured with this orientation upright.
    pub fn apply(&self, img: DynamicImage) -> DynamicImage {
        match self {
            Orientation::Up => img,
            Orientation::UpMirrored => img.fliph(),
            Orientation::Down => img.rotate180(),
            Orientation::DownMirrored => img.flipv(),
            Orientation::LeftMirrored => img.rotate90().fliph(),
            Orientation::Right => img.rotate90(),
            Orientation::RightMirrored => img.rotate270().fliph(),
            Orientation::Left => img.rotate270(),
        }
    }
}

/// Packed RGB8 pixels. Clones share the underlying buffer.
#[derive(Debug, Clone)]
pub struct Image {
    width: u32,
    height: u32,
    data: Bytes,
}

impl Image {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        if width == 0 || height == 0 || data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_dynamic(&self) -> Option<DynamicImage> {
        RgbImage::from_raw(self.width, self.height, self.data.to_vec()).map(DynamicImage::ImageRgb8)
    }
}

/// One ranked entry reported by an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};

    #[test]
    fn test_image_rejects_wrong_length() {
        assert!(Image::new(2, 2, vec![0u8; 11]).is_none());
        assert!(Image::new(0, 2, Vec::<u8>::new()).is_none());
        assert!(Image::new(2, 2, vec![0u8; 12]).is_some());
    }

    #[test]
    fn test_orientation_from_exif() {
        assert_eq!(Orientation::from_exif(1), Some(Orientation::Up));
        assert_eq!(Orientation::from_exif(6), Some(Orientation::Right));
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn test_orientation_apply_swaps_dimensions() {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        let img = DynamicImage::ImageRgb8(img);

        let right = Orientation::Right.apply(img.clone());
        assert_eq!(right.dimensions(), (2, 4));
        // top-left pixel moves to the top-right corner after a clockwise turn
        assert_eq!(right.to_rgb8().get_pixel(1, 0), &Rgb([255, 0, 0]));

        let down = Orientation::Down.apply(img);
        assert_eq!(down.dimensions(), (4, 2));
        assert_eq!(down.to_rgb8().get_pixel(3, 1), &Rgb([255, 0, 0]));
    }
}
