//! Resident bitmaps and the asynchronous arrival of new residents.
//!
//! Decoding never runs on the frame loop. A [`ResidentRequest`] is decoded on
//! whatever thread the caller picks and the result travels back to the world as
//! an [`Arrival`] through its inbox, which the world drains once per frame.

use crate::model::{Action, ImageId, Resident};
use hamlet_protocol::Point;
use image::GenericImageView;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Pending,
    Ready { width: u32, height: u32 },
    Failed,
}

impl ImageStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ImageStatus::Ready { .. })
    }
}

/// Decode raw bytes far enough to know whether the bitmap is drawable.
pub fn decode(bytes: &[u8]) -> ImageStatus {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            ImageStatus::Ready { width, height }
        }
        Err(e) => {
            tracing::warn!(error = %e, len = bytes.len(), "resident image failed to decode");
            ImageStatus::Failed
        }
    }
}

/// Decode status per image id. Ids are content addresses, so a status stays
/// valid across save/load.
#[derive(Debug, Default)]
pub struct ImageBank {
    statuses: HashMap<ImageId, ImageStatus>,
}

impl ImageBank {
    pub fn status(&self, id: &ImageId) -> ImageStatus {
        self.statuses
            .get(id)
            .copied()
            .unwrap_or(ImageStatus::Pending)
    }

    pub fn is_ready(&self, id: &ImageId) -> bool {
        self.status(id).is_ready()
    }

    pub fn set(&mut self, id: ImageId, status: ImageStatus) {
        self.statuses.insert(id, status);
    }

    pub fn is_known(&self, id: &ImageId) -> bool {
        self.statuses.contains_key(id)
    }
}

/// Completion message for an asynchronous load.
#[derive(Debug, Clone)]
pub enum Arrival {
    Resident {
        resident: Resident,
        status: ImageStatus,
    },
    Image {
        id: ImageId,
        status: ImageStatus,
    },
}

/// A resident waiting for its bitmap to decode.
#[derive(Debug, Clone)]
pub struct ResidentRequest {
    name: String,
    position: Point,
    image: ImageId,
    bytes: Vec<u8>,
}

impl ResidentRequest {
    pub(crate) fn new(name: String, position: Point, bytes: Vec<u8>) -> Self {
        Self {
            name,
            position,
            image: ImageId::of(&bytes),
            bytes,
        }
    }

    pub fn image_id(&self) -> &ImageId {
        &self.image
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode the bitmap and build the arrival. The resident is produced even
    /// when decoding fails; it just never gets drawn.
    pub fn decode(self) -> Arrival {
        let status = decode(&self.bytes);
        Arrival::Resident {
            resident: Resident {
                name: self.name,
                x: self.position.x,
                y: self.position.y,
                image: self.image,
                target_house: None,
                action: Action::Wander,
            },
            status,
        }
    }
}

/// Decode previously stored bytes for an image that lost its status, e.g.
/// after a load. Missing bytes count as a failed decode.
pub fn resolve(id: ImageId, bytes: Option<&[u8]>) -> Arrival {
    let status = match bytes {
        Some(b) => decode(b),
        None => {
            tracing::warn!(image = %id, "no stored bytes for resident image");
            ImageStatus::Failed
        }
    };
    Arrival::Image { id, status }
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(2, 3));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageOutputFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_dimensions() {
        assert_eq!(
            decode(&tiny_png()),
            ImageStatus::Ready {
                width: 2,
                height: 3
            }
        );
    }

    #[test]
    fn garbage_bytes_fail_without_panicking() {
        assert_eq!(decode(b"not an image"), ImageStatus::Failed);
    }

    #[test]
    fn request_decodes_into_wandering_resident_even_on_failure() {
        let req = ResidentRequest::new("Ann".into(), Point::new(4.0, 5.0), b"junk".to_vec());
        let id = req.image_id().clone();
        match req.decode() {
            Arrival::Resident { resident, status } => {
                assert_eq!(status, ImageStatus::Failed);
                assert_eq!(resident.image, id);
                assert_eq!(resident.action, Action::Wander);
                assert_eq!((resident.x, resident.y), (4.0, 5.0));
            }
            other => panic!("unexpected arrival {other:?}"),
        }
    }

    #[test]
    fn unknown_ids_are_pending() {
        let bank = ImageBank::default();
        assert_eq!(bank.status(&ImageId::from("nope")), ImageStatus::Pending);
        assert!(!bank.is_known(&ImageId::from("nope")));
    }
}
