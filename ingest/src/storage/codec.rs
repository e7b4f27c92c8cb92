//! Compression codecs applied to flushed partition files, per `spec.md`
//! §4.10. Each codec wraps a plain [`std::io::Write`] sink.

use std::io::{self, Write};

use ingest_types::Compression;

/// A boxed writer applying `compression` on top of an underlying sink.
///
/// Callers must call [`finish`] to flush and release any codec-internal
/// buffering before the underlying file is closed.
pub enum CompressedWriter<W: Write> {
    /// No compression; bytes pass through unchanged.
    None(W),
    /// Deflate via `flate2`.
    Gzip(flate2::write::GzEncoder<W>),
    /// `zstd`, default compression level.
    Zstd(zstd::stream::write::Encoder<'static, W>),
    /// Frame-based `lz4`.
    Lz4(lz4::Encoder<W>),
    /// `snap`'s framed format.
    Snappy(snap::write::FrameEncoder<W>),
    /// Brotli at the library's default quality.
    Brotli(brotli::CompressorWriter<W>),
}

impl<W: Write> CompressedWriter<W> {
    /// Wrap `inner` with `compression`.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the codec fails to initialize (lz4 only;
    /// the others are infallible at construction time).
    pub fn new(inner: W, compression: Compression) -> io::Result<Self> {
        Ok(match compression {
            Compression::None => Self::None(inner),
            Compression::Gzip => Self::Gzip(flate2::write::GzEncoder::new(inner, flate2::Compression::default())),
            Compression::Zstd => Self::Zstd(zstd::stream::write::Encoder::new(inner, 0)?),
            Compression::Lz4 => Self::Lz4(lz4::EncoderBuilder::new().build(inner)?),
            Compression::Snappy => Self::Snappy(snap::write::FrameEncoder::new(inner)),
            Compression::Brotli => Self::Brotli(brotli::CompressorWriter::new(inner, 4096, 9, 22)),
        })
    }

    /// Flush and finalize the codec, returning the underlying writer.
    ///
    /// # Errors
    /// Returns an [`io::Error`] if the final flush fails.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::None(w) => Ok(w),
            Self::Gzip(enc) => enc.finish(),
            Self::Zstd(enc) => enc.finish(),
            Self::Lz4(enc) => {
                let (w, result) = enc.finish();
                result.map(|()| w)
            }
            Self::Snappy(enc) => enc.into_inner().map_err(|e| e.into_error()),
            Self::Brotli(mut enc) => {
                enc.flush()?;
                Ok(enc.into_inner())
            }
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Zstd(w) => w.write(buf),
            Self::Lz4(w) => w.write(buf),
            Self::Snappy(w) => w.write(buf),
            Self::Brotli(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Zstd(w) => w.flush(),
            Self::Lz4(w) => w.flush(),
            Self::Snappy(w) => w.flush(),
            Self::Brotli(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_passes_bytes_through_unchanged() {
        let mut buf = Vec::new();
        {
            let mut w = CompressedWriter::new(&mut buf, Compression::None).unwrap();
            w.write_all(b"hello").unwrap();
            w.finish().unwrap();
        }
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn gzip_round_trips_through_flate2_decoder() {
        let mut buf = Vec::new();
        {
            let mut w = CompressedWriter::new(&mut buf, Compression::Gzip).unwrap();
            w.write_all(b"hello market data").unwrap();
            w.finish().unwrap();
        }
        let mut decoder = flate2::read::GzDecoder::new(buf.as_slice());
        let mut out = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut out).unwrap();
        assert_eq!(out, "hello market data");
    }
}
