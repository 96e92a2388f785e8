//! Multi-page TIFF writer.
//!
//! Frames are written in order as a chain of image directories (IFDs). Each
//! directory carries the same `XResolution`/`YResolution` in inches, so every
//! page prints at the DPI it was rasterised at.
//!
//! Lossless schemes go through `tiff`'s `ImageEncoder`. JPEG is not among the
//! encoder's built-in compressors, so those pages are encoded with `image`'s
//! baseline JPEG encoder and placed as a single strip in a hand-written
//! directory (compression 7, YCbCr, no chroma subsampling).
//!
//! ## Why write to a temporary file?
//!
//! A merge that fails halfway would otherwise leave a truncated but readable
//! TIFF whose first pages look fine. Encoding into a sibling temp file and
//! renaming on success means `output` is either the complete result or
//! untouched.

use crate::config::{Compression, MergeConfig};
use crate::error::OfficeConvError;
use crate::pipeline::render::RasterFrame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tiff::encoder::{
    colortype, Compression as TiffCompression, DeflateLevel, Rational, TiffEncoder,
};
use tiff::tags::{
    CompressionMethod, PhotometricInterpretation, PlanarConfiguration, ResolutionUnit, Tag,
};
use tiff::TiffError;
use tracing::debug;

/// Write `frames` as one multi-page TIFF at `output`, replacing any existing
/// file only once the whole document has been encoded.
///
/// # Errors
/// [`OfficeConvError::Validation`] for an unsupported scheme,
/// [`OfficeConvError::ImageWrite`] for encoding or persisting failures.
pub fn write_multipage(
    frames: &[RasterFrame],
    output: &Path,
    config: &MergeConfig,
) -> Result<(), OfficeConvError> {
    let write_error = |detail: String| OfficeConvError::ImageWrite {
        path: output.to_path_buf(),
        detail,
    };

    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staging =
        NamedTempFile::new_in(parent).map_err(|e| OfficeConvError::filesystem(parent, e))?;

    {
        let mut writer = BufWriter::new(staging.as_file_mut());
        encode(frames, &mut writer, config).map_err(|e| write_error(e.to_string()))?;
        writer.flush().map_err(|e| write_error(e.to_string()))?;
    }

    staging
        .persist(output)
        .map_err(|e| write_error(e.error.to_string()))?;

    debug!(
        "Wrote {} page(s) to {} ({}, {} DPI)",
        frames.len(),
        output.display(),
        config.compression,
        config.dpi
    );
    Ok(())
}

fn encode<W: Write + Seek>(
    frames: &[RasterFrame],
    writer: W,
    config: &MergeConfig,
) -> Result<(), OfficeConvError> {
    let resolution = Rational {
        n: config.dpi,
        d: 1,
    };

    let lossless = match config.compression {
        Compression::None => TiffCompression::Uncompressed,
        Compression::Lzw => TiffCompression::Lzw,
        Compression::Deflate => TiffCompression::Deflate(DeflateLevel::Balanced),
        Compression::PackBits => TiffCompression::Packbits,
        Compression::Jpeg => {
            let quality = config
                .effective_quality()
                .unwrap_or(crate::config::DEFAULT_JPEG_QUALITY);
            return encode_jpeg(frames, writer, resolution, quality);
        }
        Compression::Fax => {
            return Err(OfficeConvError::Validation(
                "ccittfax4 compression requires bilevel images; merged pages are RGB".into(),
            ))
        }
    };

    let mut tiff = TiffEncoder::new(writer)
        .map_err(tiff_error)?
        .with_compression(lossless);
    for frame in frames {
        let (w, h) = frame.dimensions();
        let mut page = tiff
            .new_image::<colortype::RGB8>(w, h)
            .map_err(tiff_error)?;
        page.resolution(ResolutionUnit::Inch, resolution.clone());
        page.write_data(frame.image.as_raw()).map_err(tiff_error)?;
    }
    Ok(())
}

fn encode_jpeg<W: Write + Seek>(
    frames: &[RasterFrame],
    writer: W,
    resolution: Rational,
    quality: u8,
) -> Result<(), OfficeConvError> {
    let mut tiff = TiffEncoder::new(writer).map_err(tiff_error)?;

    for frame in frames {
        let (w, h) = frame.dimensions();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(frame.image.as_raw(), w, h, ExtendedColorType::Rgb8)
            .map_err(|e| OfficeConvError::Internal(format!("JPEG encoding failed: {e}")))?;

        let mut dir = tiff.image_directory().map_err(tiff_error)?;
        let strip_offset = dir.write_data(jpeg.as_slice()).map_err(tiff_error)?;
        let strip_len = u32::try_from(jpeg.len())
            .map_err(|_| OfficeConvError::Internal("JPEG strip exceeds 4 GiB".into()))?;
        let strip_offset = u32::try_from(strip_offset)
            .map_err(|_| OfficeConvError::Internal("TIFF exceeds 4 GiB".into()))?;

        dir.write_tag(Tag::ImageWidth, w).map_err(tiff_error)?;
        dir.write_tag(Tag::ImageLength, h).map_err(tiff_error)?;
        dir.write_tag(Tag::BitsPerSample, &[8u16, 8, 8][..])
            .map_err(tiff_error)?;
        dir.write_tag(Tag::Compression, CompressionMethod::ModernJPEG)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::PhotometricInterpretation, PhotometricInterpretation::YCbCr)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::StripOffsets, strip_offset)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::SamplesPerPixel, 3u16).map_err(tiff_error)?;
        dir.write_tag(Tag::RowsPerStrip, h).map_err(tiff_error)?;
        dir.write_tag(Tag::StripByteCounts, strip_len)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::XResolution, resolution.clone())
            .map_err(tiff_error)?;
        dir.write_tag(Tag::YResolution, resolution.clone())
            .map_err(tiff_error)?;
        dir.write_tag(Tag::PlanarConfiguration, PlanarConfiguration::Chunky)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::ResolutionUnit, ResolutionUnit::Inch)
            .map_err(tiff_error)?;
        dir.write_tag(Tag::ChromaSubsampling, &[1u16, 1][..])
            .map_err(tiff_error)?;
        dir.finish().map_err(tiff_error)?;
    }
    Ok(())
}

fn tiff_error(e: TiffError) -> OfficeConvError {
    OfficeConvError::Internal(format!("TIFF encoding failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::fs::File;
    use std::io::BufReader;
    use tiff::decoder::{Decoder, DecodingResult};

    fn frame(w: u32, h: u32, shade: u8) -> RasterFrame {
        RasterFrame {
            source: format!("frame-{shade}.png").into(),
            page: None,
            image: RgbImage::from_pixel(w, h, Rgb([shade, 255 - shade, 40])),
        }
    }

    fn config(compression: Compression) -> MergeConfig {
        MergeConfig {
            compression,
            ..MergeConfig::default()
        }
    }

    fn count_pages(path: &Path) -> usize {
        let mut decoder = Decoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
        let mut pages = 1;
        while decoder.more_images() {
            decoder.next_image().unwrap();
            pages += 1;
        }
        pages
    }

    #[test]
    fn uncompressed_round_trip_keeps_dimensions_and_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let frames = vec![frame(30, 20, 10), frame(12, 40, 200)];
        let cfg = MergeConfig {
            dpi: 300,
            ..config(Compression::None)
        };
        write_multipage(&frames, &out, &cfg).unwrap();

        let mut decoder = Decoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (30, 20));
        match decoder.read_image().unwrap() {
            DecodingResult::U8(data) => assert_eq!(&data[..3], &[10, 245, 40]),
            _ => panic!("expected 8-bit samples"),
        }
        let x_res = decoder.get_tag_u32_vec(Tag::XResolution).unwrap();
        assert_eq!(x_res, vec![300, 1]);

        assert!(decoder.more_images());
        decoder.next_image().unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (12, 40));
        assert!(!decoder.more_images());
    }

    #[test]
    fn lossless_schemes_keep_every_page() {
        for compression in [Compression::Lzw, Compression::Deflate, Compression::PackBits] {
            let dir = tempfile::tempdir().unwrap();
            let out = dir.path().join("out.tif");
            let frames = vec![frame(8, 8, 1), frame(8, 8, 2), frame(8, 8, 3)];
            write_multipage(&frames, &out, &config(compression)).unwrap();
            assert_eq!(count_pages(&out), 3, "{compression}");
        }
    }

    #[test]
    fn jpeg_writes_one_directory_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let frames = vec![frame(16, 16, 50), frame(24, 8, 90)];
        let cfg = MergeConfig {
            jpeg_quality: Some(60),
            ..config(Compression::Jpeg)
        };
        write_multipage(&frames, &out, &cfg).unwrap();
        assert!(out.metadata().unwrap().len() > 0);
        assert_eq!(count_pages(&out), 2);
    }

    fn textured(w: u32, h: u32) -> RasterFrame {
        RasterFrame {
            source: "textured.png".into(),
            page: None,
            image: RgbImage::from_fn(w, h, |x, y| {
                let v = ((x * 37 + y * 91) ^ (x * y)) as u8;
                Rgb([v, v.wrapping_mul(3), 255 - v])
            }),
        }
    }

    fn jpeg_strip_len(quality: u8, dir: &Path) -> u32 {
        let out = dir.join(format!("q{quality}.tif"));
        let cfg = MergeConfig {
            jpeg_quality: Some(quality),
            ..config(Compression::Jpeg)
        };
        write_multipage(&[textured(64, 64)], &out, &cfg).unwrap();
        let mut decoder = Decoder::new(BufReader::new(File::open(&out).unwrap())).unwrap();
        decoder.get_tag_u32(Tag::StripByteCounts).unwrap()
    }

    #[test]
    fn jpeg_quality_changes_strip_size() {
        let dir = tempfile::tempdir().unwrap();
        let low = jpeg_strip_len(10, dir.path());
        let high = jpeg_strip_len(95, dir.path());
        assert!(low < high, "q10 = {low} bytes, q95 = {high} bytes");
    }

    #[test]
    fn jpeg_pages_decode_close_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let source = RgbImage::from_pixel(16, 16, Rgb([200, 30, 30]));
        let frames = vec![RasterFrame {
            source: "red.png".into(),
            page: None,
            image: source,
        }];
        let cfg = MergeConfig {
            jpeg_quality: Some(95),
            ..config(Compression::Jpeg)
        };
        write_multipage(&frames, &out, &cfg).unwrap();

        let decoded = crate::pipeline::render::decode_image(&out).unwrap();
        assert_eq!(decoded.dimensions(), (16, 16));
        for px in decoded.image.pixels() {
            let [r, g, b] = px.0;
            assert!(
                r.abs_diff(200) <= 8 && g.abs_diff(30) <= 8 && b.abs_diff(30) <= 8,
                "decoded pixel {:?} too far from (200, 30, 30)",
                px.0
            );
        }
    }

    #[test]
    fn fax_is_rejected_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.tif");
        let err = write_multipage(&[frame(4, 4, 0)], &out, &config(Compression::Fax)).unwrap_err();
        assert!(matches!(err, OfficeConvError::Validation(_)));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_parent_dir_is_an_error() {
        let err = write_multipage(
            &[frame(4, 4, 0)],
            Path::new("/no/such/dir/out.tif"),
            &config(Compression::None),
        )
        .unwrap_err();
        assert!(matches!(err, OfficeConvError::Filesystem { .. }));
    }
}
