//! File preview classification

use data_encoding::BASE64;
use serde::Serialize;

use crate::config::FileSettings;

/// Which size cap a preview ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Image,
    Pdf,
}

/// Result of previewing a remote file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preview {
    /// Base64 image data
    Image { mime: String, data: String, size: u64 },
    /// Base64 PDF data
    Pdf { data: String, size: u64 },
    Text {
        content: String,
        /// The file is larger than the text cap and only its head is shown
        truncated: bool,
        size: u64,
    },
    Binary { size: u64 },
    /// Image or PDF over its cap. These are never truncated.
    TooLarge {
        #[serde(rename = "type")]
        kind: PreviewKind,
        size: u64,
        limit: u64,
    },
}

/// MIME type for a recognized image extension
pub fn image_mime(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime)
}

/// How a file will be previewed, decided from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreviewPlan {
    Image(&'static str),
    Pdf,
    Text,
}

impl PreviewPlan {
    pub(crate) fn for_extension(ext: Option<&str>) -> Self {
        match ext {
            Some("pdf") => PreviewPlan::Pdf,
            Some(ext) => image_mime(ext)
                .map(PreviewPlan::Image)
                .unwrap_or(PreviewPlan::Text),
            None => PreviewPlan::Text,
        }
    }

    /// Number of bytes to read for this plan
    pub(crate) fn read_limit(&self, limits: &FileSettings) -> u64 {
        match self {
            PreviewPlan::Image(_) => limits.image_preview_max_bytes,
            PreviewPlan::Pdf => limits.pdf_preview_max_bytes,
            PreviewPlan::Text => limits.text_preview_max_bytes,
        }
    }

    /// Images and PDFs over their cap are refused before anything is read
    pub(crate) fn refuse_oversized(&self, size: u64, limits: &FileSettings) -> Option<Preview> {
        let kind = match self {
            PreviewPlan::Image(_) => PreviewKind::Image,
            PreviewPlan::Pdf => PreviewKind::Pdf,
            PreviewPlan::Text => return None,
        };
        let limit = self.read_limit(limits);
        (size > limit).then_some(Preview::TooLarge { kind, size, limit })
    }

    /// Build the preview from the bytes read and the on-disk size
    pub(crate) fn build(&self, raw: Vec<u8>, size: u64, limits: &FileSettings) -> Preview {
        match self {
            PreviewPlan::Image(mime) => Preview::Image {
                mime: mime.to_string(),
                data: BASE64.encode(&raw),
                size,
            },
            PreviewPlan::Pdf => Preview::Pdf {
                data: BASE64.encode(&raw),
                size,
            },
            PreviewPlan::Text => {
                let sniff = raw.len().min(limits.binary_sniff_bytes);
                if raw[..sniff].contains(&0) {
                    return Preview::Binary { size };
                }

                Preview::Text {
                    content: String::from_utf8_lossy(&raw).into_owned(),
                    truncated: size > limits.text_preview_max_bytes,
                    size,
                }
            }
        }
    }
}
