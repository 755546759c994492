use std::collections::BTreeMap;
use std::io::{self, Read, Seek, Write};

use indicatif::ProgressBar;
use log::debug;

use crate::errors::{FormatError, HprofStripError};
use crate::keep_set::{KeepSet, LayoutError};
use crate::parser::gc_record::{FieldType, GcRecord, IdSize};
use crate::parser::record::{RecordHeader, TAG_STRING, tag_name};
use crate::parser::record_cursor::HprofCursor;

static ZEROS: [u8; 4096] = [0; 4096];

/// Counts bytes going through a writer.
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Default)]
pub struct RewriteStats {
    pub records: u64,
    pub sub_records: u64,
    pub zeroed_bytes: u64,
    pub bytes_by_tag: BTreeMap<&'static str, u64>,
}

/// Final pass re-emitting every record with the same framing, zeroing the
/// content of everything outside the keep set.
pub struct Rewriter<'k, W: Write> {
    keep: &'k KeepSet,
    id_size: IdSize,
    out: CountingWriter<W>,
    layout: Vec<FieldType>,
    stats: RewriteStats,
}

impl<'k, W: Write> Rewriter<'k, W> {
    pub fn new(keep: &'k KeepSet, id_size: IdSize, out: W) -> Self {
        Rewriter {
            keep,
            id_size,
            out: CountingWriter::new(out),
            layout: Vec::new(),
            stats: RewriteStats::default(),
        }
    }

    pub fn run<R: Read + Seek>(
        mut self,
        cursor: &mut HprofCursor<R>,
        pb: &ProgressBar,
    ) -> Result<(W, RewriteStats), HprofStripError> {
        cursor.rewind();
        self.out.write_all(cursor.header_bytes())?;
        while let Some(header) = cursor.next_record()? {
            pb.set_position(cursor.position());
            debug!(
                "rewriting record tag:{} length:{} @ {}",
                header.tag,
                header.length,
                cursor.position()
            );
            self.stats.records += 1;
            *self.stats.bytes_by_tag.entry(tag_name(header.tag)).or_insert(0) +=
                u64::from(header.length);
            self.out.write_all(&header.to_bytes())?;
            match header.tag {
                TAG_STRING => self.rewrite_string(cursor, &header)?,
                _ if header.is_heap_dump() => self.rewrite_heap_dump(cursor, &header, pb)?,
                _ => cursor.copy_to(&mut self.out, u64::from(header.length))?,
            }
            self.check_frame(cursor)?;
        }
        self.out.flush()?;
        Ok((self.out.into_inner(), self.stats))
    }

    fn rewrite_string<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        header: &RecordHeader,
    ) -> Result<(), HprofStripError> {
        let id = cursor.read_string_id(header)?;
        self.out.write_all(&self.id_size.encode(id))?;
        let text_len = u64::from(header.length - self.id_size.bytes());
        if self.keep.contains(id) {
            cursor.copy_to(&mut self.out, text_len)
        } else {
            self.zero(cursor, text_len)
        }
    }

    fn rewrite_heap_dump<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        header: &RecordHeader,
        pb: &ProgressBar,
    ) -> Result<(), HprofStripError> {
        let section_end = cursor.section_end(header);
        while let Some(record) = cursor.next_gc_record(section_end)? {
            self.stats.sub_records += 1;
            if self.stats.sub_records % 65_536 == 0 {
                pb.set_position(cursor.position());
            }
            self.out.write_all(cursor.head())?;
            let payload_len = record.payload_len(self.id_size);
            match record {
                GcRecord::InstanceDump {
                    object_id,
                    class_object_id,
                    data_size,
                    ..
                } => {
                    if self.keep.contains(object_id) {
                        cursor.copy_to(&mut self.out, payload_len)?;
                    } else {
                        self.scrub_instance(cursor, object_id, class_object_id, data_size)?;
                    }
                }
                GcRecord::PrimitiveArrayDump { object_id, .. } => {
                    if self.keep.contains(object_id) {
                        cursor.copy_to(&mut self.out, payload_len)?;
                    } else {
                        self.zero(cursor, payload_len)?;
                    }
                }
                // object identifiers are never scrubbed
                _ => cursor.copy_to(&mut self.out, payload_len)?,
            }
            self.check_frame(cursor)?;
        }
        Ok(())
    }

    /// Keeps the object references of an instance and zeroes its primitive fields.
    fn scrub_instance<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        object_id: u64,
        class_object_id: u64,
        data_size: u32,
    ) -> Result<(), HprofStripError> {
        let offset = cursor.position();
        let mut layout = std::mem::take(&mut self.layout);
        match self.keep.instance_layout(class_object_id, &mut layout) {
            Ok(()) => (),
            Err(LayoutError::Unresolved { class_object_id }) => {
                return Err(FormatError::UnresolvedClassLayout {
                    object_id,
                    class_object_id,
                    offset,
                }
                .into());
            }
            Err(LayoutError::Cyclic { class_object_id }) => {
                return Err(FormatError::CyclicClassHierarchy { class_object_id }.into());
            }
        }
        let computed: u64 = layout
            .iter()
            .map(|t| u64::from(t.size(self.id_size)))
            .sum();
        if computed > u64::from(data_size) {
            return Err(FormatError::InstanceLayoutMismatch {
                object_id,
                declared: data_size,
                computed,
                offset,
            }
            .into());
        }
        for field_type in &layout {
            let size = u64::from(field_type.size(self.id_size));
            if field_type.is_object() {
                cursor.copy_to(&mut self.out, size)?;
            } else {
                self.zero(cursor, size)?;
            }
        }
        self.zero(cursor, u64::from(data_size) - computed)?;
        self.layout = layout;
        Ok(())
    }

    /// Consumes `n` input bytes and emits as many zeroes.
    fn zero<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        n: u64,
    ) -> Result<(), HprofStripError> {
        cursor.skip(n)?;
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len() as u64) as usize;
            self.out.write_all(&ZEROS[..chunk])?;
            remaining -= chunk as u64;
        }
        self.stats.zeroed_bytes += n;
        Ok(())
    }

    fn check_frame<R: Read + Seek>(&self, cursor: &HprofCursor<R>) -> Result<(), HprofStripError> {
        let emitted = self.out.count();
        let consumed = cursor.position();
        if emitted != consumed {
            return Err(FormatError::OutOfFrame { emitted, consumed }.into());
        }
        Ok(())
    }
}
