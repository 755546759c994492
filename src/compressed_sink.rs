use std::fmt;
use std::io::{self, Write};

use flate2::write::GzEncoder;
use log::info;
use once_cell::sync::OnceCell;
use serde::Serialize;

pub const COMPRESSION_LEVEL: u32 = 3;

/// Compressed container wrapping the rewritten dump.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// zstd when the backend is available, gzip otherwise
    #[default]
    Auto,
    Zstd,
    Gzip,
}

impl Compression {
    pub fn from_name(name: &str) -> Option<Compression> {
        match name {
            "auto" => Some(Compression::Auto),
            "zstd" => Some(Compression::Zstd),
            "gzip" | "gz" => Some(Compression::Gzip),
            _ => None,
        }
    }

    /// Settles `Auto` on a concrete container.
    pub fn resolve(self) -> Compression {
        match self {
            Compression::Auto if zstd_available() => Compression::Zstd,
            Compression::Auto => Compression::Gzip,
            other => other,
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self.resolve() {
            Compression::Zstd => "zstd",
            _ => "gz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Auto => "auto",
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
        };
        f.write_str(name)
    }
}

static ZSTD_BACKEND: OnceCell<bool> = OnceCell::new();

/// Probes the zstd backend once per process.
pub fn zstd_available() -> bool {
    *ZSTD_BACKEND.get_or_init(|| {
        let available = probe_zstd();
        info!("zstd backend available: {available}");
        available
    })
}

#[cfg(feature = "zstd")]
fn probe_zstd() -> bool {
    match zstd::stream::raw::Encoder::new(COMPRESSION_LEVEL as i32) {
        Ok(_) => true,
        Err(e) => {
            info!("unable to init zstd: {e}");
            false
        }
    }
}

#[cfg(not(feature = "zstd"))]
fn probe_zstd() -> bool {
    false
}

/// Streaming compressor in front of the output file.
pub enum CompressedSink<W: Write> {
    #[cfg(feature = "zstd")]
    Zstd(ZstdSink<W>),
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressedSink<W> {
    pub fn new(inner: W, compression: Compression) -> io::Result<Self> {
        match compression.resolve() {
            #[cfg(feature = "zstd")]
            Compression::Zstd => Ok(CompressedSink::Zstd(ZstdSink::new(
                inner,
                COMPRESSION_LEVEL as i32,
            )?)),
            #[cfg(not(feature = "zstd"))]
            Compression::Zstd => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "zstd support is not compiled in",
            )),
            _ => Ok(CompressedSink::Gzip(GzEncoder::new(
                inner,
                flate2::Compression::new(COMPRESSION_LEVEL),
            ))),
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            #[cfg(feature = "zstd")]
            CompressedSink::Zstd(_) => Compression::Zstd,
            CompressedSink::Gzip(_) => Compression::Gzip,
        }
    }

    /// Emits the terminal block and hands back the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            #[cfg(feature = "zstd")]
            CompressedSink::Zstd(sink) => sink.finish(),
            CompressedSink::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for CompressedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(feature = "zstd")]
            CompressedSink::Zstd(sink) => sink.write(buf),
            CompressedSink::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            #[cfg(feature = "zstd")]
            CompressedSink::Zstd(sink) => sink.write_all(buf),
            CompressedSink::Gzip(encoder) => encoder.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(feature = "zstd")]
            CompressedSink::Zstd(sink) => sink.flush(),
            CompressedSink::Gzip(encoder) => encoder.flush(),
        }
    }
}

#[cfg(feature = "zstd")]
pub use zstd_sink::ZstdSink;

#[cfg(feature = "zstd")]
mod zstd_sink {
    use std::io::{self, Write};

    use zstd::stream::raw::{Encoder, InBuffer, Operation, OutBuffer};

    // writes shorter than this are accumulated before reaching the compressor
    const SMALL_WRITE_THRESHOLD: usize = 32;
    const IN_BUFFER_SIZE: usize = 128 * 1024;
    const OUT_BUFFER_SIZE: usize = 128 * 1024 + 512;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    enum EndOp {
        Continue,
        Flush,
        End,
    }

    /// Outcome of one compressor invocation.
    #[derive(Debug, Default)]
    struct CompressStep {
        consumed: usize,
        produced: usize,
        more: bool,
    }

    /// zstd streaming compressor with a small-write accumulator.
    pub struct ZstdSink<W: Write> {
        inner: W,
        encoder: Encoder<'static>,
        in_buf: Vec<u8>,
        out_buf: Box<[u8]>,
    }

    impl<W: Write> ZstdSink<W> {
        pub fn new(inner: W, level: i32) -> io::Result<Self> {
            Ok(ZstdSink {
                inner,
                encoder: Encoder::new(level)?,
                in_buf: Vec::with_capacity(IN_BUFFER_SIZE),
                out_buf: vec![0; OUT_BUFFER_SIZE].into_boxed_slice(),
            })
        }

        pub fn finish(mut self) -> io::Result<W> {
            self.flush_buffer(EndOp::End)?;
            self.inner.flush()?;
            Ok(self.inner)
        }

        fn flush_buffer(&mut self, op: EndOp) -> io::Result<()> {
            let pending = std::mem::take(&mut self.in_buf);
            let res = self.compress(&pending, op);
            self.in_buf = pending;
            self.in_buf.clear();
            res
        }

        fn compress(&mut self, mut input: &[u8], op: EndOp) -> io::Result<()> {
            loop {
                let step = self.step(input, op)?;
                input = &input[step.consumed..];
                if step.produced > 0 {
                    self.inner.write_all(&self.out_buf[..step.produced])?;
                }
                if !input.is_empty() || (op != EndOp::Continue && step.more) {
                    continue;
                }
                return Ok(());
            }
        }

        fn step(&mut self, input: &[u8], op: EndOp) -> io::Result<CompressStep> {
            let mut src = InBuffer::around(input);
            let mut dst = OutBuffer::around(&mut self.out_buf[..]);
            self.encoder.run(&mut src, &mut dst)?;
            let consumed = src.pos();
            let more = if consumed < input.len() {
                true
            } else {
                match op {
                    EndOp::Continue => false,
                    EndOp::Flush => self.encoder.flush(&mut dst)? > 0,
                    EndOp::End => self.encoder.finish(&mut dst, true)? > 0,
                }
            };
            Ok(CompressStep {
                consumed,
                produced: dst.pos(),
                more,
            })
        }
    }

    impl<W: Write> Write for ZstdSink<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() >= SMALL_WRITE_THRESHOLD {
                self.flush_buffer(EndOp::Continue)?;
                self.compress(buf, EndOp::Continue)?;
            } else {
                if self.in_buf.len() + buf.len() > IN_BUFFER_SIZE {
                    self.flush_buffer(EndOp::Continue)?;
                }
                self.in_buf.extend_from_slice(buf);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flush_buffer(EndOp::Flush)?;
            self.inner.flush()
        }
    }
}
