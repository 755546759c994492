use std::io::{Read, Seek, Write};

use nom::IResult;

use crate::errors::{FormatError, HprofStripError};
use crate::paged_reader::PagedReader;
use crate::parser::file_header_parser::{FILE_HEADER_LENGTH, FileHeader, read_file_header};
use crate::parser::gc_record::*;
use crate::parser::primitive_parsers::{parse_id, parse_u16};
use crate::parser::record::{RECORD_HEADER_LENGTH, Record, RecordHeader};
use crate::parser::record_parser::*;

/// Decodes the record framing of a dump on top of a [`PagedReader`].
///
/// The cursor decodes headers and fixed heads only; payloads are left in the
/// stream so each pass decides whether to skip, copy or zero them. The raw bytes
/// of the last decoded head stay available through [`HprofCursor::head`].
pub struct HprofCursor<R> {
    reader: PagedReader<R>,
    header: FileHeader,
    header_bytes: [u8; FILE_HEADER_LENGTH],
    id_size: IdSize,
    head: Vec<u8>,
}

impl<R: Read + Seek> HprofCursor<R> {
    pub fn new(mut reader: PagedReader<R>) -> Result<Self, HprofStripError> {
        reader.seek(0);
        let mut header_bytes = [0; FILE_HEADER_LENGTH];
        reader.read_exact(&mut header_bytes)?;
        let header = read_file_header(&header_bytes)?;
        let id_size = header.id_size()?;
        Ok(HprofCursor {
            reader,
            header,
            header_bytes,
            id_size,
            head: Vec::with_capacity(64),
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn length(&self) -> u64 {
        self.reader.length()
    }

    /// Positions the cursor on the first record.
    pub fn rewind(&mut self) {
        self.reader.seek(FILE_HEADER_LENGTH as u64);
    }

    /// Raw bytes of the last decoded sub-record head, tag included.
    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn next_record(&mut self) -> Result<Option<RecordHeader>, HprofStripError> {
        if self.reader.remaining() == 0 {
            return Ok(None);
        }
        let offset = self.position();
        let mut bytes = [0; RECORD_HEADER_LENGTH];
        self.reader.read_exact(&mut bytes)?;
        let header = Self::decode_head(offset, "record header", &bytes, parse_record_header)?;
        let available = self.reader.remaining();
        if u64::from(header.length) > available {
            return Err(HprofStripError::TruncatedInput {
                offset: self.position(),
                needed: u64::from(header.length) - available,
            });
        }
        Ok(Some(header))
    }

    /// Reads a string record identifier, leaving the string bytes in the stream.
    pub fn read_string_id(&mut self, header: &RecordHeader) -> Result<u64, HprofStripError> {
        self.expect_length(header, self.id_size.bytes())?;
        self.read_id()
    }

    /// Decodes the fixed part of a load-class, stack-frame or start-thread record
    /// and skips whatever trails it.
    pub fn read_record(&mut self, header: &RecordHeader) -> Result<Record, HprofStripError> {
        use crate::parser::record::{TAG_LOAD_CLASS, TAG_STACK_FRAME, TAG_START_THREAD};
        let id_size = self.id_size;
        let (expected, what) = match header.tag {
            TAG_LOAD_CLASS => (load_class_len(id_size), "load class"),
            TAG_STACK_FRAME => (stack_frame_len(id_size), "stack frame"),
            TAG_START_THREAD => (start_thread_len(id_size), "start thread"),
            _ => {
                return Err(FormatError::Malformed {
                    what: "record without identifiers",
                    offset: self.position(),
                }
                .into());
            }
        };
        self.expect_length(header, expected)?;
        let offset = self.position();
        self.head.clear();
        self.reader.read_into(&mut self.head, expected as usize)?;
        let record = match header.tag {
            TAG_LOAD_CLASS => Self::decode_head(offset, what, &self.head, parse_load_class(id_size)),
            TAG_STACK_FRAME => {
                Self::decode_head(offset, what, &self.head, parse_stack_frame(id_size))
            }
            _ => Self::decode_head(offset, what, &self.head, parse_start_thread(id_size)),
        }?;
        self.reader.skip(u64::from(header.length - expected))?;
        Ok(record)
    }

    pub fn skip_body(&mut self, header: &RecordHeader) -> Result<(), HprofStripError> {
        self.reader.skip(u64::from(header.length))
    }

    /// End offset of a record body starting at the current position.
    pub fn section_end(&self, header: &RecordHeader) -> u64 {
        self.position() + u64::from(header.length)
    }

    /// Decodes the next sub-record head of a heap dump section, `None` once the
    /// section is exhausted.
    pub fn next_gc_record(
        &mut self,
        section_end: u64,
    ) -> Result<Option<GcRecord>, HprofStripError> {
        let offset = self.position();
        if offset == section_end {
            return Ok(None);
        }
        if offset > section_end {
            return Err(FormatError::SectionOverrun {
                section_end,
                offset,
            }
            .into());
        }
        self.head.clear();
        self.reader.read_into(&mut self.head, 1)?;
        let tag = self.head[0];
        let record = if tag == TAG_GC_CLASS_DUMP {
            self.read_class_dump()?
        } else {
            let len = gc_record_head_len(tag, self.id_size)
                .ok_or(FormatError::UnknownSubRecordTag { tag, offset })?;
            self.reader.read_into(&mut self.head, len as usize)?;
            let (mut record, raw_type) = Self::decode_head(
                offset,
                "heap dump sub-record",
                &self.head[1..],
                parse_gc_record_head(tag, self.id_size),
            )?;
            if let (
                GcRecord::PrimitiveArrayDump { element_type, .. },
                Some(value),
            ) = (&mut record, raw_type)
            {
                *element_type = Self::primitive_type(value, offset)?;
            }
            record
        };
        let payload_end = self.position() + record.payload_len(self.id_size);
        if payload_end > section_end {
            return Err(FormatError::SectionOverrun {
                section_end,
                offset,
            }
            .into());
        }
        Ok(Some(record))
    }

    fn read_class_dump(&mut self) -> Result<GcRecord, HprofStripError> {
        let id_size = self.id_size;
        let offset = self.position();
        let prefix_len = class_dump_prefix_len(id_size) as usize;
        self.reader.read_into(&mut self.head, prefix_len)?;
        let prefix = Self::decode_head(
            offset,
            "class dump",
            &self.head[1..],
            parse_class_dump_prefix(id_size),
        )?;
        if prefix.constant_pool_size != 0 {
            return Err(FormatError::NonEmptyConstantPool {
                class_object_id: prefix.class_object_id,
                size: prefix.constant_pool_size,
                offset,
            }
            .into());
        }

        let static_fields_number = self.read_head_u16()?;
        let mut static_fields = Vec::with_capacity(static_fields_number as usize);
        for _ in 0..static_fields_number {
            let field = self.read_field_entry()?;
            let value_len = field.field_type.size(id_size);
            self.reader.read_into(&mut self.head, value_len as usize)?;
            static_fields.push(field);
        }

        let instance_field_number = self.read_head_u16()?;
        let mut instance_fields = Vec::with_capacity(instance_field_number as usize);
        for _ in 0..instance_field_number {
            instance_fields.push(self.read_field_entry()?);
        }

        Ok(GcRecord::ClassDump(Box::new(ClassDumpFields {
            class_object_id: prefix.class_object_id,
            super_class_object_id: prefix.super_class_object_id,
            class_loader_object_id: prefix.class_loader_object_id,
            instance_size: prefix.instance_size,
            static_fields,
            instance_fields,
        })))
    }

    fn read_head_u16(&mut self) -> Result<u16, HprofStripError> {
        let offset = self.position();
        let start = self.head.len();
        self.reader.read_into(&mut self.head, 2)?;
        Self::decode_head(offset, "field count", &self.head[start..], parse_u16)
    }

    fn read_field_entry(&mut self) -> Result<FieldInfo, HprofStripError> {
        let offset = self.position();
        let start = self.head.len();
        let len = self.id_size.bytes() as usize + 1;
        self.reader.read_into(&mut self.head, len)?;
        let (name_id, raw_type) = Self::decode_head(
            offset,
            "field entry",
            &self.head[start..],
            parse_field_entry(self.id_size),
        )?;
        let field_type = FieldType::from_value(raw_type).ok_or(FormatError::UnknownFieldType {
            value: raw_type,
            offset: offset + len as u64 - 1,
        })?;
        Ok(FieldInfo {
            name_id,
            field_type,
        })
    }

    fn primitive_type(value: i8, offset: u64) -> Result<FieldType, HprofStripError> {
        match FieldType::from_value(value) {
            Some(field_type) if !field_type.is_object() => Ok(field_type),
            _ => Err(FormatError::UnknownFieldType { value, offset }.into()),
        }
    }

    pub fn read_id(&mut self) -> Result<u64, HprofStripError> {
        let offset = self.position();
        let mut bytes = [0; 8];
        let bytes = &mut bytes[..self.id_size.bytes() as usize];
        self.reader.read_exact(bytes)?;
        Self::decode_head(offset, "identifier", bytes, parse_id(self.id_size))
    }

    pub fn skip(&mut self, n: u64) -> Result<(), HprofStripError> {
        self.reader.skip(n)
    }

    pub fn copy_to<W: Write + ?Sized>(
        &mut self,
        sink: &mut W,
        n: u64,
    ) -> Result<(), HprofStripError> {
        self.reader.copy_to(sink, n)
    }

    fn expect_length(&self, header: &RecordHeader, expected: u32) -> Result<(), HprofStripError> {
        if header.length < expected {
            return Err(FormatError::RecordTooShort {
                tag: header.tag,
                length: header.length,
                expected,
                offset: self.position(),
            }
            .into());
        }
        Ok(())
    }

    fn decode_head<'a, O>(
        offset: u64,
        what: &'static str,
        bytes: &'a [u8],
        parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], O>,
    ) -> Result<O, HprofStripError> {
        parser(bytes)
            .map(|(_, o)| o)
            .map_err(|_| FormatError::Malformed { what, offset }.into())
    }
}
