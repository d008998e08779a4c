//! `image`: recognised encoding, structural integrity and matching dimensions.
//!
//! Images are parsed structurally, never compared pixel by pixel.

use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use transmigrate_core::domain::CategoryResult;
use transmigrate_core::rules::{Category, CategoryParams, CategoryRule, ImageParams};

use super::{CategoryHandler, EvaluationContext};
use crate::observation::Probe;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Gif => "GIF",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}

fn inspect_png(bytes: &[u8]) -> Result<ImageInfo, String> {
    let mut pos = PNG_SIGNATURE.len();
    let mut size = None;
    loop {
        if pos + 8 > bytes.len() {
            return Err("PNG ends without an IEND chunk".to_string());
        }
        let length = be_u32(&bytes[pos..]) as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let data_end = pos + 8 + length;
        if data_end + 4 > bytes.len() {
            return Err(format!(
                "PNG chunk `{}` is truncated",
                String::from_utf8_lossy(kind)
            ));
        }
        let stored = be_u32(&bytes[data_end..]);
        if crc32fast::hash(&bytes[pos + 4..data_end]) != stored {
            return Err(format!(
                "PNG chunk `{}` has a bad CRC",
                String::from_utf8_lossy(kind)
            ));
        }

        match kind {
            b"IHDR" if size.is_none() && length >= 8 => {
                let data = &bytes[pos + 8..data_end];
                size = Some((be_u32(data), be_u32(&data[4..])));
            }
            _ if size.is_none() => return Err("PNG does not start with IHDR".to_string()),
            b"IEND" => break,
            _ => {}
        }
        pos = data_end + 4;
    }

    match size {
        Some((width, height)) if width > 0 && height > 0 => Ok(ImageInfo {
            format: ImageFormat::Png,
            width,
            height,
        }),
        _ => Err("PNG has zero dimensions".to_string()),
    }
}

fn inspect_jpeg(bytes: &[u8]) -> Result<ImageInfo, String> {
    if !bytes.ends_with(&[0xFF, 0xD9]) {
        return Err("JPEG is missing its EOI marker".to_string());
    }
    let mut pos = 2;
    loop {
        if pos + 4 > bytes.len() {
            return Err("JPEG ends before a frame header".to_string());
        }
        if bytes[pos] != 0xFF {
            return Err(format!("corrupt JPEG marker at offset {}", pos));
        }
        let marker = bytes[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => return Err("JPEG has no frame header before its scan".to_string()),
            _ => {}
        }

        let seg_len = be_u16(&bytes[pos + 2..]) as usize;
        if seg_len < 2 {
            return Err(format!("corrupt JPEG segment length at offset {}", pos));
        }
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            if pos + 9 > bytes.len() {
                return Err("JPEG frame header is truncated".to_string());
            }
            let height = be_u16(&bytes[pos + 5..]) as u32;
            let width = be_u16(&bytes[pos + 7..]) as u32;
            if width == 0 || height == 0 {
                return Err("JPEG has zero dimensions".to_string());
            }
            return Ok(ImageInfo {
                format: ImageFormat::Jpeg,
                width,
                height,
            });
        }
        pos += 2 + seg_len;
    }
}

fn inspect_gif(bytes: &[u8]) -> Result<ImageInfo, String> {
    if bytes.len() < 14 {
        return Err("GIF is truncated".to_string());
    }
    if bytes.last() != Some(&0x3B) {
        return Err("GIF is missing its trailer".to_string());
    }
    let width = u16::from_le_bytes([bytes[6], bytes[7]]) as u32;
    let height = u16::from_le_bytes([bytes[8], bytes[9]]) as u32;
    if width == 0 || height == 0 {
        return Err("GIF has zero dimensions".to_string());
    }
    Ok(ImageInfo {
        format: ImageFormat::Gif,
        width,
        height,
    })
}

/// Identify and integrity-check an encoded image.
pub fn inspect(bytes: &[u8]) -> Result<ImageInfo, String> {
    match sniff(bytes) {
        Some(ImageFormat::Png) => inspect_png(bytes),
        Some(ImageFormat::Jpeg) => inspect_jpeg(bytes),
        Some(ImageFormat::Gif) => inspect_gif(bytes),
        None => Err("not a PNG, JPEG or GIF image".to_string()),
    }
}

/// Image bytes from a raw image or the first `data:image/...;base64,` URI in markup.
pub fn extract_image(bytes: &[u8]) -> Result<Vec<u8>, String> {
    if sniff(bytes).is_some() {
        return Ok(bytes.to_vec());
    }

    static DATA_URI: OnceLock<Regex> = OnceLock::new();
    let re = DATA_URI.get_or_init(|| {
        Regex::new(r"data:image/(?:png|jpeg|jpg|gif);base64,([A-Za-z0-9+/=\s]+)")
            .expect("data uri regex")
    });
    let text = String::from_utf8_lossy(bytes);
    let caps = re
        .captures(&text)
        .ok_or_else(|| "no image or data:image URI found".to_string())?;
    let encoded: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| format!("data:image URI is not valid base64: {}", e))
}

fn params(rule: &CategoryRule) -> ImageParams {
    match &rule.params {
        CategoryParams::Image(p) => p.clone(),
        _ => ImageParams::default(),
    }
}

pub struct ImageHandler;

impl CategoryHandler for ImageHandler {
    fn category(&self) -> Category {
        Category::Image
    }

    fn probes(&self, rule: &CategoryRule) -> Vec<Probe> {
        params(rule).sources.iter().filter_map(Probe::for_source).collect()
    }

    fn evaluate(&self, rule: &CategoryRule, ctx: &EvaluationContext<'_>) -> CategoryResult {
        let params = params(rule);
        let probes = self.probes(rule);
        if probes.is_empty() {
            return CategoryResult::execution_error(Category::Image, "no image sources to compare");
        }

        let mut failures = Vec::new();
        let mut summaries = Vec::new();
        for probe in &probes {
            let (original, candidate) = match ctx.observations.pair(probe) {
                Ok(pair) => pair,
                Err(reason) => return CategoryResult::execution_error(Category::Image, reason),
            };

            let original = extract_image(original.artifact_bytes()).and_then(|b| inspect(&b));
            let original = match original {
                Ok(info) => info,
                Err(e) => {
                    return CategoryResult::execution_error(
                        Category::Image,
                        format!(
                            "{}: original program produced no usable image: {}",
                            probe.label(),
                            e
                        ),
                    )
                }
            };
            let candidate = extract_image(candidate.artifact_bytes()).and_then(|b| inspect(&b));
            let candidate = match candidate {
                Ok(info) => info,
                Err(e) => {
                    failures.push(format!("{}: {}", probe.label(), e));
                    continue;
                }
            };

            let (width, height) = params
                .expected_size
                .unwrap_or((original.width, original.height));
            if (candidate.width, candidate.height) != (width, height) {
                failures.push(format!(
                    "{}: candidate image is {}x{}, expected {}x{}",
                    probe.label(),
                    candidate.width,
                    candidate.height,
                    width,
                    height
                ));
            } else {
                summaries.push(format!("{} {}x{}", candidate.format, width, height));
            }
        }

        if failures.is_empty() {
            CategoryResult::pass(Category::Image, summaries.join(", "))
        } else {
            CategoryResult::fail(Category::Image, failures.join("; "))
        }
    }
}
