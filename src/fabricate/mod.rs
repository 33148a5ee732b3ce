//! Artifact fabrication
//!
//! Produces synthetic payloads for every [`ArtifactKind`]: a structurally
//! valid PDF padded to a target size for document kinds, and a seeded 1x1
//! PNG for the profile photo.

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

pub mod staging;

pub use staging::{StagedArtifact, StagingArea, StagingError};

/// Fixed artifact categories, serialized with the API's wire names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Primary document (CV)
    Cv,
    CoverLetter,
    IdDocument,
    Certificate,
    Reference,
    Portfolio,
    /// Uploaded through the photo endpoint, never listed as a document
    ProfilePhoto,
}

impl ArtifactKind {
    /// Every kind accepted by the documents endpoint, in upload order
    pub const DOCUMENTS: [ArtifactKind; 6] = [
        ArtifactKind::Cv,
        ArtifactKind::CoverLetter,
        ArtifactKind::IdDocument,
        ArtifactKind::Certificate,
        ArtifactKind::Reference,
        ArtifactKind::Portfolio,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Cv => "cv",
            ArtifactKind::CoverLetter => "cover_letter",
            ArtifactKind::IdDocument => "id_document",
            ArtifactKind::Certificate => "certificate",
            ArtifactKind::Reference => "reference",
            ArtifactKind::Portfolio => "portfolio",
            ArtifactKind::ProfilePhoto => "profile_photo",
        }
    }

    pub fn is_document(&self) -> bool {
        !matches!(self, ArtifactKind::ProfilePhoto)
    }

    pub fn content_type(&self) -> &'static str {
        if self.is_document() {
            "application/pdf"
        } else {
            "image/png"
        }
    }

    pub fn extension(&self) -> &'static str {
        if self.is_document() {
            "pdf"
        } else {
            "png"
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire name is not part of the enumeration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown artifact kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ArtifactKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKind::DOCUMENTS
            .into_iter()
            .chain(std::iter::once(ArtifactKind::ProfilePhoto))
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Fabricate a payload of `kind`.
///
/// Documents are padded to exactly `target_size` bytes unless the target is
/// below [`pdf_structural_floor`], in which case the bare structure is
/// returned. Images ignore `target_size`; `seed` picks the pixel color.
pub fn fabricate(kind: ArtifactKind, target_size: usize, seed: u64) -> Bytes {
    if kind.is_document() {
        fabricate_pdf(target_size)
    } else {
        fabricate_png(seed)
    }
}

// ============================================================================
// PDF
// ============================================================================

const PDF_HEADER: &[u8] = b"%PDF-1.4\n";
const PDF_CONTENT_STREAM: &str = "BT\n/F1 12 Tf\n100 700 Td\n(Test Document) Tj\nET";

fn pdf_objects() -> Vec<String> {
    vec![
        "<<\n/Type /Catalog\n/Pages 2 0 R\n>>".to_string(),
        "<<\n/Type /Pages\n/Kids [3 0 R]\n/Count 1\n>>".to_string(),
        "<<\n/Type /Page\n/Parent 2 0 R\n/MediaBox [0 0 612 792]\n/Resources <<\n/Font <<\n/F1 4 0 R\n>>\n>>\n/Contents 5 0 R\n>>".to_string(),
        "<<\n/Type /Font\n/Subtype /Type1\n/BaseFont /Helvetica\n>>".to_string(),
        format!(
            "<<\n/Length {}\n>>\nstream\n{}\nendstream",
            PDF_CONTENT_STREAM.len(),
            PDF_CONTENT_STREAM
        ),
    ]
}

/// Header and objects, plus the byte offset of each object
fn pdf_body() -> (Vec<u8>, Vec<usize>) {
    let mut body = PDF_HEADER.to_vec();
    let mut offsets = Vec::new();
    for (index, object) in pdf_objects().iter().enumerate() {
        offsets.push(body.len());
        body.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, object).as_bytes());
    }
    (body, offsets)
}

fn pdf_trailer(offsets: &[usize], xref_offset: usize) -> Vec<u8> {
    let size = offsets.len() + 1;
    let mut trailer = format!("xref\n0 {size}\n0000000000 65535 f \n");
    for offset in offsets {
        trailer.push_str(&format!("{offset:010} 00000 n \n"));
    }
    trailer.push_str(&format!(
        "trailer\n<<\n/Size {size}\n/Root 1 0 R\n>>\nstartxref\n{xref_offset}\n%%EOF\n"
    ));
    trailer.into_bytes()
}

/// Smallest PDF the fabricator can emit
pub fn pdf_structural_floor() -> usize {
    let (body, offsets) = pdf_body();
    body.len() + pdf_trailer(&offsets, body.len()).len()
}

/// Fabricate a one-page PDF of exactly `target_size` bytes.
///
/// Filler is a comment line between the last object and the xref table, so
/// the cross-reference offsets stay correct.
pub fn fabricate_pdf(target_size: usize) -> Bytes {
    let (body, offsets) = pdf_body();
    let floor = body.len() + pdf_trailer(&offsets, body.len()).len();
    if target_size <= floor {
        let mut out = body;
        let xref_offset = out.len();
        out.extend(pdf_trailer(&offsets, xref_offset));
        return Bytes::from(out);
    }

    // A longer xref offset adds digits to `startxref`.
    let mut padding = target_size - floor;
    while padding > 0
        && body.len() + padding + pdf_trailer(&offsets, body.len() + padding).len() > target_size
    {
        padding -= 1;
    }

    let mut out = Vec::with_capacity(target_size);
    out.extend_from_slice(&body);
    match padding {
        0 => {}
        1 => out.push(b'\n'),
        n => {
            out.push(b'%');
            out.resize(out.len() + n - 2, b'0');
            out.push(b'\n');
        }
    }
    let xref_offset = out.len();
    out.extend(pdf_trailer(&offsets, xref_offset));
    // Offset digit growth can skip a length; trailing EOLs make it up.
    out.resize(target_size, b'\n');
    Bytes::from(out)
}

// ============================================================================
// PNG
// ============================================================================

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Pixel color for `seed`. Distinct for seeds that differ modulo 2^24; seed 0 is red.
pub fn seed_color(seed: u64) -> [u8; 3] {
    let mixed = ((seed & 0xFF_FFFF) as u32).wrapping_mul(0x9E_3779) & 0xFF_FFFF;
    let rgb = mixed ^ 0xFF_0000;
    [(rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8]
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    let mut crc = flate2::Crc::new();
    crc.update(chunk_type);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

/// Fabricate a 1x1 8-bit RGB PNG whose pixel color depends on `seed`
pub fn fabricate_png(seed: u64) -> Bytes {
    let [r, g, b] = seed_color(seed);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    // bit depth, color type (RGB), compression, filter, interlace
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);

    // One scanline: filter byte then the pixel
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let idat = encoder
        .write_all(&[0, r, g, b])
        .and_then(|_| encoder.finish())
        .expect("zlib encoding into a Vec does not fail");

    let mut out = PNG_SIGNATURE.to_vec();
    write_chunk(&mut out, b"IHDR", &ihdr);
    write_chunk(&mut out, b"IDAT", &idat);
    write_chunk(&mut out, b"IEND", &[]);
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn test_kind_wire_names_round_trip() {
        for kind in ArtifactKind::DOCUMENTS {
            assert_eq!(kind.as_str().parse::<ArtifactKind>(), Ok(kind));
            assert!(kind.is_document());
        }
        assert_eq!(
            "profile_photo".parse::<ArtifactKind>(),
            Ok(ArtifactKind::ProfilePhoto)
        );
        assert!("resume".parse::<ArtifactKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ArtifactKind::CoverLetter).unwrap(),
            "\"cover_letter\""
        );
    }

    #[test]
    fn test_pdf_hits_target_size_exactly() {
        for target in [2 * 1024, 150 * 1024, 200 * 1024, 400 * 1024] {
            let pdf = fabricate_pdf(target);
            assert_eq!(pdf.len(), target);
            assert!(pdf.starts_with(b"%PDF-1.4\n"));
            assert!(find(&pdf, b"%%EOF").is_some());
        }
    }

    #[test]
    fn test_pdf_exact_size_across_offset_digit_boundaries() {
        let floor = pdf_structural_floor();
        for target in (floor..floor + 64).chain(9_990..10_010).chain(99_990..100_010) {
            assert_eq!(fabricate_pdf(target).len(), target, "target {target}");
        }
    }

    #[test]
    fn test_pdf_below_floor_emits_bare_structure() {
        let pdf = fabricate_pdf(10);
        assert_eq!(pdf.len(), pdf_structural_floor());
        assert!(pdf.starts_with(b"%PDF-1.4\n"));
    }

    #[test]
    fn test_pdf_startxref_points_at_xref_table() {
        let pdf = fabricate_pdf(50 * 1024);
        let text = String::from_utf8_lossy(&pdf);
        let tail = text.rsplit("startxref\n").next().unwrap();
        let offset: usize = tail.lines().next().unwrap().parse().unwrap();
        assert!(pdf[offset..].starts_with(b"xref\n"));
    }

    #[test]
    fn test_png_structure() {
        let png = fabricate_png(0);
        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        assert!(png.ends_with(&[0xAE, 0x42, 0x60, 0x82]), "IEND CRC");

        let idat_at = find(&png, b"IDAT").unwrap();
        let len = u32::from_be_bytes(png[idat_at - 4..idat_at].try_into().unwrap()) as usize;
        let mut raw = Vec::new();
        ZlibDecoder::new(&png[idat_at + 4..idat_at + 4 + len])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, vec![0, 255, 0, 0]);
    }

    #[test]
    fn test_png_seed_changes_content() {
        let a = fabricate_png(0);
        let b = fabricate_png(1);
        assert_ne!(a, b);
        assert_eq!(a, fabricate_png(0));

        let colors: std::collections::HashSet<_> = (0..256).map(seed_color).collect();
        assert_eq!(colors.len(), 256);
    }

    #[test]
    fn test_fabricate_dispatches_on_kind() {
        assert!(fabricate(ArtifactKind::Portfolio, 4096, 0).starts_with(b"%PDF"));
        assert!(fabricate(ArtifactKind::ProfilePhoto, 4096, 3).starts_with(&PNG_SIGNATURE));
    }
}
