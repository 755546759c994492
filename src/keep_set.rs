use std::collections::hash_map::Entry;
use std::io::{Read, Seek};

use ahash::AHashMap;
use indicatif::ProgressBar;
use log::{debug, info};
use serde::Serialize;

use crate::errors::{FormatError, HprofStripError};
use crate::parser::gc_record::{ClassDumpFields, FieldType, GcRecord, IdSize};
use crate::parser::record::{
    Record, RecordHeader, TAG_LOAD_CLASS, TAG_STACK_FRAME, TAG_START_THREAD, TAG_STRING,
};
use crate::parser::record_cursor::HprofCursor;

const CLASS_NAME_DEPTH: u8 = 2;
const STACK_FRAME_STRING_DEPTH: u8 = 1;
const THREAD_NAME_DEPTH: u8 = 1;
const CLASS_LOADER_DEPTH: u8 = 3;
const FIELD_NAME_DEPTH: u8 = 2;

// instances up to `5 + id size` bytes are wrappers (e.g. a String around its array)
const SMALL_INSTANCE_BASE_SIZE: u32 = 5;

#[derive(Debug, PartialEq, Eq)]
pub struct ClassMetadata {
    pub super_class_object_id: u64,
    pub field_types: Box<[FieldType]>,
}

impl ClassMetadata {
    fn from_class_dump(class_dump: &ClassDumpFields) -> Self {
        ClassMetadata {
            super_class_object_id: class_dump.super_class_object_id,
            field_types: class_dump
                .instance_fields
                .iter()
                .map(|f| f.field_type)
                .collect(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Kept {
    Marker,
    Class(ClassMetadata),
}

/// Identifier whose class chain cannot be laid out yet.
#[derive(Debug, PartialEq, Eq)]
pub enum LayoutError {
    Unresolved { class_object_id: u64 },
    Cyclic { class_object_id: u64 },
}

/// Identifiers whose content survives stripping, plus the layout of every class.
#[derive(Debug, Default)]
pub struct KeepSet {
    entries: AHashMap<u64, Kept>,
    classes: usize,
}

impl KeepSet {
    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn class(&self, class_object_id: u64) -> Option<&ClassMetadata> {
        match self.entries.get(&class_object_id) {
            Some(Kept::Class(meta)) => Some(meta),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes
    }

    /// Fills `layout` with the instance field types of a class followed by those
    /// of its ancestors, matching the order of an instance dump's bytes.
    pub fn instance_layout(
        &self,
        class_object_id: u64,
        layout: &mut Vec<FieldType>,
    ) -> Result<(), LayoutError> {
        layout.clear();
        let mut current = class_object_id;
        let mut hops = 0;
        while current != 0 {
            if hops > self.classes {
                return Err(LayoutError::Cyclic { class_object_id });
            }
            let meta = self.class(current).ok_or(LayoutError::Unresolved {
                class_object_id: current,
            })?;
            layout.extend_from_slice(&meta.field_types);
            current = meta.super_class_object_id;
            hops += 1;
        }
        Ok(())
    }

    fn mark(&mut self, id: u64) {
        self.entries.entry(id).or_insert(Kept::Marker);
    }

    fn insert_class(&mut self, class_dump: &ClassDumpFields) {
        let id = class_dump.class_object_id;
        if matches!(self.entries.get(&id), Some(Kept::Class(_))) {
            return;
        }
        self.classes += 1;
        self.entries
            .insert(id, Kept::Class(ClassMetadata::from_class_dump(class_dump)));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub pass: u32,
    pub kept: usize,
    pub pending: usize,
    pub added: bool,
}

/// Computes the keep set through repeated scans until no new keep request shows up.
pub struct KeepSetBuilder {
    id_size: IdSize,
    pass: u32,
    keep: KeepSet,
    // identifier -> remaining hops
    pending: AHashMap<u64, u8>,
    added: bool,
    layout: Vec<FieldType>,
    stats: Vec<PassStats>,
}

impl KeepSetBuilder {
    pub fn new(id_size: IdSize) -> Self {
        KeepSetBuilder {
            id_size,
            pass: 0,
            keep: KeepSet::default(),
            pending: AHashMap::new(),
            added: false,
            layout: Vec::new(),
            stats: Vec::new(),
        }
    }

    pub fn build<R: Read + Seek>(
        mut self,
        cursor: &mut HprofCursor<R>,
        pb: &ProgressBar,
    ) -> Result<(KeepSet, Vec<PassStats>), HprofStripError> {
        loop {
            self.added = false;
            pb.set_position(0);
            pb.set_message(format!("pass {}", self.pass));
            self.run_pass(cursor, pb)?;
            let stats = PassStats {
                pass: self.pass,
                kept: self.keep.len(),
                pending: self.pending.len(),
                added: self.added,
            };
            info!(
                "keep pass {} done: {} kept, {} pending, added: {}",
                stats.pass, stats.kept, stats.pending, stats.added
            );
            self.stats.push(stats);
            self.pass += 1;
            if self.pending.is_empty() || !self.added {
                break;
            }
        }
        if !self.pending.is_empty() {
            debug!("{} keep requests never resolved", self.pending.len());
        }
        Ok((self.keep, self.stats))
    }

    fn run_pass<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        pb: &ProgressBar,
    ) -> Result<(), HprofStripError> {
        cursor.rewind();
        while let Some(header) = cursor.next_record()? {
            pb.set_position(cursor.position());
            match header.tag {
                TAG_STRING => {
                    let id = cursor.read_string_id(&header)?;
                    if self.pending.remove(&id).is_some() {
                        self.keep.mark(id);
                    }
                    cursor.skip(u64::from(header.length - self.id_size.bytes()))?;
                }
                TAG_LOAD_CLASS | TAG_STACK_FRAME | TAG_START_THREAD if self.pass == 0 => {
                    let record = cursor.read_record(&header)?;
                    self.request_record_strings(&record);
                }
                _ if header.is_heap_dump() => self.scan_heap_dump(cursor, &header, pb)?,
                _ => cursor.skip_body(&header)?,
            }
        }
        Ok(())
    }

    fn request_record_strings(&mut self, record: &Record) {
        match *record {
            Record::LoadClass { class_name_id, .. } => self.request(class_name_id, CLASS_NAME_DEPTH),
            Record::StackFrame {
                method_name_id,
                method_signature_id,
                source_file_name_id,
                ..
            } => {
                self.request(method_name_id, STACK_FRAME_STRING_DEPTH);
                self.request(method_signature_id, STACK_FRAME_STRING_DEPTH);
                self.request(source_file_name_id, STACK_FRAME_STRING_DEPTH);
            }
            Record::StartThread {
                thread_name_id,
                thread_group_name_id,
                thread_group_parent_name_id,
                ..
            } => {
                self.request(thread_name_id, THREAD_NAME_DEPTH);
                self.request(thread_group_name_id, THREAD_NAME_DEPTH);
                self.request(thread_group_parent_name_id, THREAD_NAME_DEPTH);
            }
        }
    }

    fn scan_heap_dump<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        header: &RecordHeader,
        pb: &ProgressBar,
    ) -> Result<(), HprofStripError> {
        let section_end = cursor.section_end(header);
        let mut sub_records: u64 = 0;
        while let Some(record) = cursor.next_gc_record(section_end)? {
            sub_records += 1;
            if sub_records % 65_536 == 0 {
                pb.set_position(cursor.position());
            }
            let depth = if record.is_root() {
                None
            } else {
                let id = record.object_id();
                let depth = self.pending.remove(&id);
                if depth.is_some() {
                    self.keep.mark(id);
                }
                depth
            };
            match record {
                GcRecord::ClassDump(class_dump) => {
                    self.keep.insert_class(&class_dump);
                    self.request(class_dump.class_loader_object_id, CLASS_LOADER_DEPTH);
                    for field in class_dump
                        .static_fields
                        .iter()
                        .chain(class_dump.instance_fields.iter())
                    {
                        self.request(field.name_id, FIELD_NAME_DEPTH);
                    }
                }
                GcRecord::InstanceDump {
                    object_id,
                    class_object_id,
                    data_size,
                    ..
                } => match depth {
                    Some(depth) => {
                        self.walk_instance(cursor, object_id, class_object_id, data_size, depth)?;
                    }
                    None => cursor.skip(u64::from(data_size))?,
                },
                GcRecord::ObjectArrayDump {
                    number_of_elements, ..
                } => match depth {
                    Some(depth) => {
                        for _ in 0..number_of_elements {
                            let element = cursor.read_id()?;
                            self.request(element, depth - 1);
                        }
                    }
                    None => cursor.skip(record.payload_len(self.id_size))?,
                },
                GcRecord::PrimitiveArrayDump { .. } => {
                    cursor.skip(record.payload_len(self.id_size))?;
                }
                _ => (),
            }
        }
        Ok(())
    }

    fn walk_instance<R: Read + Seek>(
        &mut self,
        cursor: &mut HprofCursor<R>,
        object_id: u64,
        class_object_id: u64,
        data_size: u32,
        depth: u8,
    ) -> Result<(), HprofStripError> {
        let offset = cursor.position();
        let mut layout = std::mem::take(&mut self.layout);
        match self.keep.instance_layout(class_object_id, &mut layout) {
            Ok(()) => (),
            Err(LayoutError::Unresolved { .. }) => {
                // an ancestor shows up later in the file, retry on the next pass
                self.pending.insert(object_id, depth);
                self.layout = layout;
                return cursor.skip(u64::from(data_size));
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
        let hop = if data_size > SMALL_INSTANCE_BASE_SIZE + self.id_size.bytes() {
            1
        } else {
            0
        };
        for field_type in &layout {
            if field_type.is_object() {
                let referent = cursor.read_id()?;
                self.request(referent, depth - hop);
            } else {
                cursor.skip(u64::from(field_type.size(self.id_size)))?;
            }
        }
        cursor.skip(u64::from(data_size) - computed)?;
        self.layout = layout;
        Ok(())
    }

    fn request(&mut self, id: u64, depth: u8) {
        if depth == 0 || id == 0 || self.keep.contains(id) {
            return;
        }
        match self.pending.entry(id) {
            Entry::Vacant(e) => {
                e.insert(depth);
                self.added = true;
            }
            Entry::Occupied(mut e) => {
                if *e.get() < depth {
                    e.insert(depth);
                    self.added = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paged_reader::PagedReader;
    use crate::test_utils::*;
    use std::io::Cursor;

    fn build(builder: &HprofBuilder) -> (KeepSet, Vec<PassStats>) {
        let reader = PagedReader::new(Cursor::new(builder.bytes().to_vec())).unwrap();
        let mut cursor = HprofCursor::new(reader).unwrap();
        KeepSetBuilder::new(cursor.id_size())
            .build(&mut cursor, &ProgressBar::hidden())
            .unwrap()
    }

    #[test]
    fn strings_survive_only_when_requested() {
        let b = HprofBuilder::new(IdSize::Eight)
            .string(100, "java/lang/Object")
            .string(200, "secret")
            .load_class(1, 10, 100);
        let class = b.class_dump(10, 0, 0, &[], &[]);
        let b = b.heap_dump_segment(&[class]).heap_dump_end();
        let (keep, stats) = build(&b);
        assert!(keep.contains(100));
        assert!(!keep.contains(200));
        assert!(keep.contains(10));
        assert_eq!(keep.class_count(), 1);
        // the class name is requested after its string went by
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn frames_and_threads_keep_their_strings() {
        let b = HprofBuilder::new(IdSize::Four)
            .string(1, "run")
            .string(2, "()V")
            .string(3, "Main.java")
            .string(4, "main")
            .string(5, "system")
            .string(6, "password")
            .stack_frame(40, 1, 2, 3)
            .start_thread(41, 4, 5, 0);
        let (keep, _) = build(&b);
        for id in 1..=5 {
            assert!(keep.contains(id), "string {id} should be kept");
        }
        assert!(!keep.contains(6));
        // the null group parent is never requested
        assert!(!keep.contains(0));
    }

    #[test]
    fn superclass_declared_after_subclass_needs_another_pass() {
        let b = HprofBuilder::new(IdSize::Eight)
            .string(301, "value")
            .string(302, "hash");
        let class_b = b.class_dump(11, 12, 0, &[], &[(301, FieldType::Object)]);
        let class_l = b.class_dump(13, 0, 50, &[], &[]);
        let x = b.instance_dump(50, 11, &fields(IdSize::Eight, 60, 7));
        let class_a = b.class_dump(12, 0, 0, &[], &[(302, FieldType::Int)]);
        let array = b.byte_array_dump(60, b"hunter2");
        let b = b.heap_dump_segment(&[class_b, class_l, x, class_a, array]);
        let (keep, stats) = build(&b);
        assert!(stats.len() >= 2);
        assert!(keep.contains(50));
        assert!(keep.contains(60));
        assert!(keep.contains(301) && keep.contains(302));

        let mut layout = Vec::new();
        keep.instance_layout(11, &mut layout).unwrap();
        assert_eq!(layout, vec![FieldType::Object, FieldType::Int]);
        assert_eq!(keep.class(11).unwrap().super_class_object_id, 12);
        assert!(keep.class(12).is_some());
    }

    #[test]
    fn keep_set_grows_monotonically() {
        let b = HprofBuilder::new(IdSize::Eight).string(301, "value");
        let class_b = b.class_dump(11, 12, 0, &[], &[(301, FieldType::Object)]);
        let class_l = b.class_dump(13, 0, 50, &[], &[]);
        let x = b.instance_dump(50, 11, &b.id(60));
        let class_a = b.class_dump(12, 0, 0, &[], &[]);
        let array = b.byte_array_dump(60, b"abc");
        let b = b.heap_dump_segment(&[class_b, class_l, x, class_a, array]);
        let (keep, stats) = build(&b);
        for pair in stats.windows(2) {
            assert!(pair[0].kept <= pair[1].kept);
            assert!(pair[0].added);
        }
        let last = stats.last().unwrap();
        assert!(last.pending == 0 || !last.added);
        assert_eq!(last.kept, keep.len());
    }

    #[test]
    fn dangling_reference_terminates() {
        let b = HprofBuilder::new(IdSize::Eight).load_class(1, 10, 999);
        let (keep, stats) = build(&b);
        assert!(!keep.contains(999));
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].pending, 1);
        assert!(!stats[1].added);
    }

    #[test]
    fn large_instances_consume_a_hop() {
        let b = HprofBuilder::new(IdSize::Eight);
        let class_d = b.class_dump(
            15,
            0,
            0,
            &[],
            &[
                (305, FieldType::Object),
                (306, FieldType::Long),
                (307, FieldType::Long),
            ],
        );
        let class_e = b.class_dump(16, 0, 52, &[], &[]);
        let payload = |referent: u64| {
            let mut data = b.id(referent);
            data.extend_from_slice(&[1; 16]);
            data
        };
        let z = b.instance_dump(52, 15, &payload(53));
        let w = b.instance_dump(53, 15, &payload(54));
        let v = b.instance_dump(54, 15, &payload(63));
        let array = b.byte_array_dump(63, b"too far");
        let b = b.heap_dump_segment(&[class_d, class_e, z, w, v, array]);
        let (keep, stats) = build(&b);
        assert!(keep.contains(52) && keep.contains(53) && keep.contains(54));
        assert!(!keep.contains(63));
        // field names stay pending without being re-added
        assert_eq!(stats.len(), 2);
    }

    #[test]
    fn object_arrays_propagate_to_elements() {
        let b = HprofBuilder::new(IdSize::Eight);
        let class_d = b.class_dump(15, 0, 0, &[], &[(305, FieldType::ArrayObject)]);
        let class_e = b.class_dump(16, 0, 52, &[], &[]);
        // 8 bytes, a wrapper forwarding its depth
        let z = b.instance_dump(52, 15, &b.id(70));
        let array = b.object_array_dump(70, 15, &[71, 0, 72]);
        let first = b.int_array_dump(71, &[1, 2]);
        let second = b.int_array_dump(72, &[3]);
        let unrelated = b.int_array_dump(73, &[4]);
        let b = b.heap_dump_segment(&[class_d, class_e, z, array, first, second, unrelated]);
        let (keep, _) = build(&b);
        assert!(keep.contains(70));
        assert!(keep.contains(71) && keep.contains(72));
        assert!(!keep.contains(73));
    }

    #[test]
    fn roots_do_not_consume_requests() {
        let b = HprofBuilder::new(IdSize::Eight);
        let class_d = b.class_dump(15, 0, 0, &[], &[(305, FieldType::Object)]);
        let class_e = b.class_dump(16, 0, 52, &[], &[]);
        let root = b.root_java_frame(52);
        let z = b.instance_dump(52, 15, &b.id(74));
        let array = b.int_array_dump(74, &[42]);
        let b = b.heap_dump_segment(&[class_d, class_e, root, z, array]);
        let (keep, _) = build(&b);
        assert!(keep.contains(52));
        assert!(keep.contains(74));
    }

    #[test]
    fn cyclic_hierarchy_is_detected() {
        let b = HprofBuilder::new(IdSize::Eight);
        let class_a = b.class_dump(12, 11, 0, &[], &[]);
        let class_b = b.class_dump(11, 12, 0, &[], &[]);
        let b = b.heap_dump_segment(&[class_a, class_b]);
        let (keep, _) = build(&b);
        let mut layout = Vec::new();
        assert!(matches!(
            keep.instance_layout(11, &mut layout),
            Err(LayoutError::Cyclic { .. })
        ));
    }
}
