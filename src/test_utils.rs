//! In-memory hprof writer for tests.

use std::io::Write;

use tempfile::NamedTempFile;

use crate::parser::gc_record::*;
use crate::parser::record::*;

pub struct HprofBuilder {
    id_size: IdSize,
    bytes: Vec<u8>,
}

pub enum StaticValue {
    Object(u64),
    Int(i32),
}

impl HprofBuilder {
    pub fn new(id_size: IdSize) -> Self {
        let mut bytes = b"JAVA PROFILE 1.0.2\0".to_vec();
        bytes.extend_from_slice(&id_size.bytes().to_be_bytes());
        bytes.extend_from_slice(&1_608_192_273_831u64.to_be_bytes());
        HprofBuilder { id_size, bytes }
    }

    pub fn id(&self, id: u64) -> Vec<u8> {
        self.id_size.encode(id)
    }

    pub fn record(mut self, tag: u8, body: &[u8]) -> Self {
        self.bytes.push(tag);
        self.bytes.extend_from_slice(&0u32.to_be_bytes());
        self.bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    pub fn string(self, id: u64, text: &str) -> Self {
        let mut body = self.id(id);
        body.extend_from_slice(text.as_bytes());
        self.record(TAG_STRING, &body)
    }

    pub fn load_class(self, serial: u32, class_object_id: u64, class_name_id: u64) -> Self {
        let mut body = serial.to_be_bytes().to_vec();
        body.extend(self.id(class_object_id));
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend(self.id(class_name_id));
        self.record(TAG_LOAD_CLASS, &body)
    }

    pub fn stack_frame(self, frame_id: u64, method: u64, signature: u64, source: u64) -> Self {
        let mut body = self.id(frame_id);
        body.extend(self.id(method));
        body.extend(self.id(signature));
        body.extend(self.id(source));
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&42u32.to_be_bytes());
        self.record(TAG_STACK_FRAME, &body)
    }

    pub fn start_thread(self, thread_object_id: u64, name: u64, group: u64, parent: u64) -> Self {
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend(self.id(thread_object_id));
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend(self.id(name));
        body.extend(self.id(group));
        body.extend(self.id(parent));
        self.record(TAG_START_THREAD, &body)
    }

    pub fn heap_dump_segment(self, sub_records: &[Vec<u8>]) -> Self {
        let body = sub_records.concat();
        self.record(TAG_HEAP_DUMP_SEGMENT, &body)
    }

    pub fn heap_dump_end(self) -> Self {
        self.record(TAG_HEAP_DUMP_END, &[])
    }

    /// One sub-record of every gc root kind, all pointing at `object_id`.
    pub fn gc_roots(&self, object_id: u64) -> Vec<Vec<u8>> {
        // (tag, extra identifiers, trailing u32 values)
        let layouts: [(u8, usize, usize); 9] = [
            (TAG_GC_ROOT_UNKNOWN, 0, 0),
            (TAG_GC_ROOT_JNI_GLOBAL, 1, 0),
            (TAG_GC_ROOT_JNI_LOCAL, 0, 2),
            (TAG_GC_ROOT_JAVA_FRAME, 0, 2),
            (TAG_GC_ROOT_NATIVE_STACK, 0, 1),
            (TAG_GC_ROOT_STICKY_CLASS, 0, 0),
            (TAG_GC_ROOT_THREAD_BLOCK, 0, 1),
            (TAG_GC_ROOT_MONITOR_USED, 0, 0),
            (TAG_GC_ROOT_THREAD_OBJ, 0, 2),
        ];
        layouts
            .iter()
            .map(|&(tag, ids, values)| {
                let mut sub = vec![tag];
                sub.extend(self.id(object_id));
                for n in 0..ids {
                    sub.extend(self.id(0xAB00 + n as u64));
                }
                for n in 0..values {
                    sub.extend_from_slice(&(0x0101_0101u32 * (n as u32 + 1)).to_be_bytes());
                }
                sub
            })
            .collect()
    }

    pub fn root_java_frame(&self, object_id: u64) -> Vec<u8> {
        let mut sub = vec![TAG_GC_ROOT_JAVA_FRAME];
        sub.extend(self.id(object_id));
        sub.extend_from_slice(&1u32.to_be_bytes());
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub
    }

    pub fn class_dump(
        &self,
        class_object_id: u64,
        super_class_object_id: u64,
        class_loader_object_id: u64,
        statics: &[(u64, StaticValue)],
        instance_fields: &[(u64, FieldType)],
    ) -> Vec<u8> {
        let mut sub = vec![TAG_GC_CLASS_DUMP];
        sub.extend(self.id(class_object_id));
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub.extend(self.id(super_class_object_id));
        sub.extend(self.id(class_loader_object_id));
        for _ in 0..4 {
            sub.extend(self.id(0));
        }
        let instance_size: u32 = instance_fields
            .iter()
            .map(|(_, t)| t.size(self.id_size))
            .sum();
        sub.extend_from_slice(&instance_size.to_be_bytes());
        sub.extend_from_slice(&0u16.to_be_bytes());
        sub.extend_from_slice(&(statics.len() as u16).to_be_bytes());
        for (name_id, value) in statics {
            sub.extend(self.id(*name_id));
            match value {
                StaticValue::Object(id) => {
                    sub.push(FieldType::Object as u8);
                    sub.extend(self.id(*id));
                }
                StaticValue::Int(v) => {
                    sub.push(FieldType::Int as u8);
                    sub.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
        sub.extend_from_slice(&(instance_fields.len() as u16).to_be_bytes());
        for (name_id, field_type) in instance_fields {
            sub.extend(self.id(*name_id));
            sub.push(*field_type as u8);
        }
        sub
    }

    pub fn instance_dump(&self, object_id: u64, class_object_id: u64, data: &[u8]) -> Vec<u8> {
        let mut sub = vec![TAG_GC_INSTANCE_DUMP];
        sub.extend(self.id(object_id));
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub.extend(self.id(class_object_id));
        sub.extend_from_slice(&(data.len() as u32).to_be_bytes());
        sub.extend_from_slice(data);
        sub
    }

    pub fn object_array_dump(&self, object_id: u64, class_object_id: u64, elements: &[u64]) -> Vec<u8> {
        let mut sub = vec![TAG_GC_OBJ_ARRAY_DUMP];
        sub.extend(self.id(object_id));
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        sub.extend(self.id(class_object_id));
        for element in elements {
            sub.extend(self.id(*element));
        }
        sub
    }

    pub fn int_array_dump(&self, object_id: u64, values: &[i32]) -> Vec<u8> {
        let mut sub = vec![TAG_GC_PRIM_ARRAY_DUMP];
        sub.extend(self.id(object_id));
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub.extend_from_slice(&(values.len() as u32).to_be_bytes());
        sub.push(FieldType::Int as u8);
        for v in values {
            sub.extend_from_slice(&v.to_be_bytes());
        }
        sub
    }

    pub fn byte_array_dump(&self, object_id: u64, values: &[u8]) -> Vec<u8> {
        let mut sub = vec![TAG_GC_PRIM_ARRAY_DUMP];
        sub.extend(self.id(object_id));
        sub.extend_from_slice(&0u32.to_be_bytes());
        sub.extend_from_slice(&(values.len() as u32).to_be_bytes());
        sub.push(FieldType::Byte as u8);
        sub.extend_from_slice(values);
        sub
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.bytes).unwrap();
        file.flush().unwrap();
        file
    }
}

/// Object field bytes followed by an int, as laid out for a two field class.
pub fn fields(id_size: IdSize, object: u64, int: i32) -> Vec<u8> {
    let mut data = id_size.encode(object);
    data.extend_from_slice(&int.to_be_bytes());
    data
}

/// Splits a rewritten dump into `(tag, length, body)` records.
pub fn records(bytes: &[u8]) -> Vec<(u8, u32, &[u8])> {
    let mut records = vec![];
    let mut rest = &bytes[31..];
    while !rest.is_empty() {
        let tag = rest[0];
        let length = u32::from_be_bytes([rest[5], rest[6], rest[7], rest[8]]);
        let body = &rest[9..9 + length as usize];
        records.push((tag, length, body));
        rest = &rest[9 + length as usize..];
    }
    records
}
