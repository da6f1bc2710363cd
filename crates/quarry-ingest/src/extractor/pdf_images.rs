use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::types::{ImageArtifact, ImageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Rgb,
    Gray,
    Cmyk,
}

/// Pull every image XObject out of the document, numbering them across pages.
///
/// Returns the artifacts plus `(page, reason)` for images whose stream bytes could
/// not be read.
pub(super) fn extract_images(doc: &Document) -> (Vec<ImageArtifact>, Vec<(u32, String)>) {
    let mut images = Vec::new();
    let mut skipped = Vec::new();
    let mut ordinal = 0;

    for (page, page_id) in doc.get_pages() {
        for stream in page_image_streams(doc, page_id) {
            let bytes = match stream_bytes(stream) {
                Ok(bytes) => bytes,
                Err(reason) => {
                    tracing::warn!(page, %reason, "unreadable image stream");
                    skipped.push((page, reason));
                    continue;
                }
            };
            ordinal += 1;
            let (kind, bytes) = decode(doc, stream, bytes);
            images.push(ImageArtifact {
                page,
                ordinal,
                kind,
                bytes,
            });
        }
    }

    (images, skipped)
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    doc.dereference(obj).ok().map(|(_, resolved)| resolved)
}

fn page_image_streams(doc: &Document, page_id: ObjectId) -> Vec<&Stream> {
    let Ok((own, inherited)) = doc.get_page_resources(page_id) else {
        return Vec::new();
    };
    let inherited: Vec<&Dictionary> = inherited
        .iter()
        .filter_map(|id| doc.get_dictionary(*id).ok())
        .collect();

    let mut streams = Vec::new();
    for resources in own.into_iter().chain(inherited) {
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
        else {
            continue;
        };
        for (_, entry) in xobjects.iter() {
            if let Some(stream) = resolve(doc, entry).and_then(|o| o.as_stream().ok())
                && is_image(stream)
            {
                streams.push(stream);
            }
        }
    }
    streams
}

fn is_image(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|name| name == b"Image")
}

fn filter_names(dict: &Dictionary) -> Vec<&[u8]> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_name().ok()).collect(),
        _ => Vec::new(),
    }
}

fn is_jpeg(stream: &Stream) -> bool {
    filter_names(&stream.dict).last() == Some(&b"DCTDecode".as_slice())
}

/// Undo stream filters, leaving a trailing `DCTDecode` layer encoded.
fn stream_bytes(stream: &Stream) -> Result<Vec<u8>, String> {
    let mut data = stream.content.clone();
    for filter in filter_names(&stream.dict) {
        data = match filter {
            b"DCTDecode" => return Ok(data),
            b"FlateDecode" => inflate(&data)?,
            other => {
                return Err(format!(
                    "unsupported image filter {}",
                    String::from_utf8_lossy(other)
                ));
            }
        };
    }
    Ok(data)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| format!("decompression failed: {e}"))?;
    Ok(out)
}

fn decode(doc: &Document, stream: &Stream, bytes: Vec<u8>) -> (ImageKind, Vec<u8>) {
    if is_jpeg(stream) {
        return (ImageKind::Jpeg, bytes);
    }

    let dimension = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .and_then(|v| u32::try_from(v).ok())
    };
    let space = color_space(doc, &stream.dict);
    if let (Some(width), Some(height)) = (dimension(b"Width"), dimension(b"Height"))
        && let Some(png) = raw_to_png(&bytes, width, height, space)
    {
        return (ImageKind::Png, png);
    }

    if let Some(png) = image::load_from_memory(&bytes)
        .ok()
        .and_then(|img| encode_png(&img))
    {
        return (ImageKind::Png, png);
    }

    tracing::debug!(bytes = bytes.len(), "image kept as raw dump");
    (ImageKind::Raw, bytes)
}

/// Missing or unrecognized color spaces are treated as RGB.
fn color_space(doc: &Document, dict: &Dictionary) -> ColorSpace {
    let Some(obj) = dict.get(b"ColorSpace").ok().and_then(|o| resolve(doc, o)) else {
        return ColorSpace::Rgb;
    };
    let name = match obj {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(items) => items
            .first()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_name().ok()),
        _ => None,
    };
    match name {
        Some(b"DeviceGray") => ColorSpace::Gray,
        Some(b"DeviceCMYK") => ColorSpace::Cmyk,
        _ => ColorSpace::Rgb,
    }
}

fn raw_to_png(bytes: &[u8], width: u32, height: u32, space: ColorSpace) -> Option<Vec<u8>> {
    let image = match space {
        ColorSpace::Gray => {
            GrayImage::from_raw(width, height, bytes.to_vec()).map(DynamicImage::ImageLuma8)
        }
        ColorSpace::Cmyk => {
            RgbImage::from_raw(width, height, cmyk_to_rgb(bytes)).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Rgb => {
            RgbImage::from_raw(width, height, bytes.to_vec()).map(DynamicImage::ImageRgb8)
        }
    }?;
    encode_png(&image)
}

fn encode_png(image: &DynamicImage) -> Option<Vec<u8>> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .ok()?;
    Some(png)
}

#[allow(clippy::many_single_char_names)]
fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((cmyk.len() / 4) * 3);
    for px in cmyk.chunks_exact(4) {
        let c = f32::from(px[0]) / 255.0;
        let m = f32::from(px[1]) / 255.0;
        let y = f32::from(px[2]) / 255.0;
        let k = f32::from(px[3]) / 255.0;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        rgb.extend([
            (255.0 * (1.0 - c) * (1.0 - k)) as u8,
            (255.0 * (1.0 - m) * (1.0 - k)) as u8,
            (255.0 * (1.0 - y) * (1.0 - k)) as u8,
        ]);
    }
    rgb
}
