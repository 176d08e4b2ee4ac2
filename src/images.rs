//! Attraction images: presence flags in the dataset, bytes in object storage.

use base64::{Engine, engine::general_purpose::STANDARD};
use futures::future::join_all;
use log::debug;
use rusqlite::types::ValueRef;
use serde::{Serialize, Serializer};
use strum::Display;

use crate::{
    attractions::{Attraction, AttractionId, AttractionSummary},
    storage::SharedObjectStore,
};

/// Image column of an attraction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ImageSlot {
    Image1,
    Image2,
    Image3,
}

/// Object key of an attraction image: `{country}-{id}-{slot}.png`.
#[must_use]
pub fn image_key(country: &str, id: &AttractionId, slot: ImageSlot) -> String {
    format!("{country}-{id}-{slot}.png")
}

/// Image field of a record, before and after resolution.
///
/// Serializes as the base64 payload when resolved and as `null` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Image {
    #[default]
    Absent,
    /// Flagged in the dataset, not fetched yet.
    Present,
    Resolved(String),
}

impl Image {
    /// Read a presence flag. NULL, numeric zero and empty text are absent;
    /// anything else, including any blob, is present.
    #[must_use]
    pub fn from_flag(flag: ValueRef<'_>) -> Self {
        let present = match flag {
            ValueRef::Null => false,
            ValueRef::Integer(value) => value != 0,
            ValueRef::Real(value) => value != 0.0,
            ValueRef::Text(text) => !text.is_empty(),
            ValueRef::Blob(_) => true,
        };
        if present { Image::Present } else { Image::Absent }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self, Image::Present)
    }

    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        match self {
            Image::Resolved(payload) => Some(payload),
            Image::Absent | Image::Present => None,
        }
    }
}

impl Serialize for Image {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.payload() {
            Some(payload) => serializer.serialize_some(payload),
            None => serializer.serialize_none(),
        }
    }
}

/// Fetches image objects and encodes them as base64 text.
#[derive(Clone)]
pub struct ImageResolver {
    store: SharedObjectStore,
}

impl ImageResolver {
    #[must_use]
    pub fn new(store: SharedObjectStore) -> Self {
        Self { store }
    }

    /// Fetch one image and base64-encode it. A missing object and a failed
    /// fetch both give `None`.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        let bytes = self.store.fetch(key).await?;
        debug!("Encoding image {key} ({} bytes)", bytes.len());
        Some(STANDARD.encode(bytes))
    }

    /// Replace the `image1` flag of every listed row with its payload.
    pub async fn resolve_summaries(&self, country: &str, rows: &mut [AttractionSummary]) {
        let fetches = rows
            .iter_mut()
            .map(|row| self.fill(country, row.id.as_ref(), ImageSlot::Image1, &mut row.image1));
        join_all(fetches).await;
    }

    /// Replace all three image flags of a record with their payloads.
    pub async fn resolve_attraction(&self, country: &str, attraction: &mut Attraction) {
        let id = attraction.id.clone();
        let slots = [
            (ImageSlot::Image1, &mut attraction.image1),
            (ImageSlot::Image2, &mut attraction.image2),
            (ImageSlot::Image3, &mut attraction.image3),
        ];
        join_all(
            slots
                .into_iter()
                .map(|(slot, image)| self.fill(country, id.as_ref(), slot, image)),
        )
        .await;
    }

    /// Rows without an id have no image key, so their flags resolve to absent.
    async fn fill(
        &self,
        country: &str,
        id: Option<&AttractionId>,
        slot: ImageSlot,
        image: &mut Image,
    ) {
        if !image.is_present() {
            return;
        }
        let Some(id) = id else {
            *image = Image::Absent;
            return;
        };
        *image = match self.resolve(&image_key(country, id, slot)).await {
            Some(payload) => Image::Resolved(payload),
            None => Image::Absent,
        };
    }
}
