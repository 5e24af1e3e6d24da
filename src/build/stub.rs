//! Stub Resolver: placeholder image info without touching any infrastructure.

use crate::build::info::ImageInfo;
use crate::constants::{STUB_REPO_ADDRESS, STUB_TAG};
use crate::images::ImageDescriptor;

/// Placeholder info for every image, in order.
#[must_use]
pub fn stub_image_infos(images: &[ImageDescriptor]) -> Vec<ImageInfo> {
    images
        .iter()
        .map(|image| ImageInfo {
            name: image.name.clone(),
            repository: STUB_REPO_ADDRESS.to_string(),
            tag: STUB_TAG.to_string(),
            digest: None,
        })
        .collect()
}
