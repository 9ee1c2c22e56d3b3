//! Scan request identity: content hashing, modality, validated images

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of the raw uploaded payload, hex-encoded.
///
/// This is the idempotency key: byte-identical uploads hash identically and
/// map to at most one persisted [`super::AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared imaging modality. A closed set: unknown declarations are an
/// intake validation failure, not a free-form passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    #[default]
    ChestXray,
    Mri,
    Retinal,
}

impl Modality {
    /// Parse a declared modality string. Accepts common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "chest-x-ray" | "chest-xray" | "cxr" => Some(Modality::ChestXray),
            "mri" => Some(Modality::Mri),
            "retinal" | "retina" => Some(Modality::Retinal),
            _ => None,
        }
    }

    /// Human-readable name used in report technique sections.
    pub fn display_name(&self) -> &'static str {
        match self {
            Modality::ChestXray => "chest X-ray",
            Modality::Mri => "MRI",
            Modality::Retinal => "retinal image",
        }
    }
}

/// An accepted scan upload. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub scan_id: Uuid,
    pub content_hash: ContentHash,
    /// Opaque requester token from the bearer credential. Interpreted by an
    /// external auth collaborator, carried here only for the audit trail.
    pub requester: String,
    pub modality: Modality,
    pub image_bytes: Vec<u8>,
}

impl ScanRequest {
    pub fn new(image_bytes: Vec<u8>, requester: String, modality: Modality) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            content_hash: ContentHash::of_bytes(&image_bytes),
            requester,
            modality,
            image_bytes,
        }
    }
}

/// Recognized image encodings for intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// Output of the intake validator: the original bytes plus the metadata the
/// validator actually checked. No pixel data is decoded or retained here.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub bytes: Vec<u8>,
    pub encoding: ImageEncoding,
    pub width: u32,
    pub height: u32,
    pub modality: Modality,
}
