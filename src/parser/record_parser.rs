use crate::parser::gc_record::GcRecord::*;
use crate::parser::gc_record::*;
use crate::parser::primitive_parsers::*;
use crate::parser::record::Record::*;
use crate::parser::record::{Record, RecordHeader};
use nom::IResult;
use nom::Parser;
use nom::combinator::map;

pub fn parse_record_header(i: &[u8]) -> IResult<&[u8], RecordHeader> {
    map((parse_u8, parse_u32, parse_u32), |(tag, timestamp, length)| {
        RecordHeader {
            tag,
            timestamp,
            length,
        }
    })
    .parse(i)
}

pub fn load_class_len(id_size: IdSize) -> u32 {
    4 + id_size.bytes() + 4 + id_size.bytes()
}

pub fn parse_load_class(id_size: IdSize) -> impl Fn(&[u8]) -> IResult<&[u8], Record> {
    move |i| {
        map(
            (parse_u32, parse_id(id_size), parse_u32, parse_id(id_size)),
            |(serial_number, class_object_id, stack_trace_serial_number, class_name_id)| {
                LoadClass {
                    serial_number,
                    class_object_id,
                    stack_trace_serial_number,
                    class_name_id,
                }
            },
        )
        .parse(i)
    }
}

pub fn stack_frame_len(id_size: IdSize) -> u32 {
    4 * id_size.bytes() + 4 + 4
}

pub fn parse_stack_frame(id_size: IdSize) -> impl Fn(&[u8]) -> IResult<&[u8], Record> {
    move |i| {
        map(
            (
                parse_id(id_size),
                parse_id(id_size),
                parse_id(id_size),
                parse_id(id_size),
                parse_u32,
                parse_u32,
            ),
            |(
                stack_frame_id,
                method_name_id,
                method_signature_id,
                source_file_name_id,
                class_serial_number,
                line_number,
            )| StackFrame {
                stack_frame_id,
                method_name_id,
                method_signature_id,
                source_file_name_id,
                class_serial_number,
                line_number,
            },
        )
        .parse(i)
    }
}

pub fn start_thread_len(id_size: IdSize) -> u32 {
    4 + id_size.bytes() + 4 + 3 * id_size.bytes()
}

pub fn parse_start_thread(id_size: IdSize) -> impl Fn(&[u8]) -> IResult<&[u8], Record> {
    move |i| {
        map(
            (
                parse_u32,
                parse_id(id_size),
                parse_u32,
                parse_id(id_size),
                parse_id(id_size),
                parse_id(id_size),
            ),
            |(
                thread_serial_number,
                thread_object_id,
                stack_trace_serial_number,
                thread_name_id,
                thread_group_name_id,
                thread_group_parent_name_id,
            )| StartThread {
                thread_serial_number,
                thread_object_id,
                stack_trace_serial_number,
                thread_name_id,
                thread_group_name_id,
                thread_group_parent_name_id,
            },
        )
        .parse(i)
    }
}

/// Length of the fixed head following the sub-record tag, `None` for class dumps
/// whose layout depends on counts read mid-record and for unknown tags.
pub fn gc_record_head_len(tag: u8, id_size: IdSize) -> Option<u32> {
    let id = id_size.bytes();
    match tag {
        TAG_GC_ROOT_UNKNOWN | TAG_GC_ROOT_STICKY_CLASS | TAG_GC_ROOT_MONITOR_USED => Some(id),
        TAG_GC_ROOT_JNI_GLOBAL => Some(id + id),
        TAG_GC_ROOT_JNI_LOCAL | TAG_GC_ROOT_JAVA_FRAME | TAG_GC_ROOT_THREAD_OBJ => {
            Some(id + 4 + 4)
        }
        TAG_GC_ROOT_NATIVE_STACK | TAG_GC_ROOT_THREAD_BLOCK => Some(id + 4),
        TAG_GC_INSTANCE_DUMP => Some(id + 4 + id + 4),
        TAG_GC_OBJ_ARRAY_DUMP => Some(id + 4 + 4 + id),
        TAG_GC_PRIM_ARRAY_DUMP => Some(id + 4 + 4 + 1),
        _ => None,
    }
}

/// Decodes the fixed head of every sub-record but class dumps.
///
/// Primitive array element types are returned raw and validated by the caller.
pub fn parse_gc_record_head(
    tag: u8,
    id_size: IdSize,
) -> impl Fn(&[u8]) -> IResult<&[u8], (GcRecord, Option<i8>)> {
    move |i| {
        let id = parse_id(id_size);
        match tag {
            TAG_GC_ROOT_UNKNOWN => map(id, |object_id| (RootUnknown { object_id }, None)).parse(i),
            TAG_GC_ROOT_THREAD_OBJ => map(
                (id, parse_u32, parse_u32),
                |(thread_object_id, thread_sequence_number, stack_sequence_number)| {
                    let record = RootThreadObject {
                        thread_object_id,
                        thread_sequence_number,
                        stack_sequence_number,
                    };
                    (record, None)
                },
            )
            .parse(i),
            TAG_GC_ROOT_JNI_GLOBAL => map((id, parse_id(id_size)), |(object_id, jni_global_ref_id)| {
                let record = RootJniGlobal {
                    object_id,
                    jni_global_ref_id,
                };
                (record, None)
            })
            .parse(i),
            TAG_GC_ROOT_JNI_LOCAL => map(
                (id, parse_u32, parse_u32),
                |(object_id, thread_serial_number, frame_number_in_stack_trace)| {
                    let record = RootJniLocal {
                        object_id,
                        thread_serial_number,
                        frame_number_in_stack_trace,
                    };
                    (record, None)
                },
            )
            .parse(i),
            TAG_GC_ROOT_JAVA_FRAME => map(
                (id, parse_u32, parse_u32),
                |(object_id, thread_serial_number, frame_number_in_stack_trace)| {
                    let record = RootJavaFrame {
                        object_id,
                        thread_serial_number,
                        frame_number_in_stack_trace,
                    };
                    (record, None)
                },
            )
            .parse(i),
            TAG_GC_ROOT_NATIVE_STACK => map((id, parse_u32), |(object_id, thread_serial_number)| {
                let record = RootNativeStack {
                    object_id,
                    thread_serial_number,
                };
                (record, None)
            })
            .parse(i),
            TAG_GC_ROOT_STICKY_CLASS => {
                map(id, |object_id| (RootStickyClass { object_id }, None)).parse(i)
            }
            TAG_GC_ROOT_THREAD_BLOCK => map((id, parse_u32), |(object_id, thread_serial_number)| {
                let record = RootThreadBlock {
                    object_id,
                    thread_serial_number,
                };
                (record, None)
            })
            .parse(i),
            TAG_GC_ROOT_MONITOR_USED => {
                map(id, |object_id| (RootMonitorUsed { object_id }, None)).parse(i)
            }
            TAG_GC_INSTANCE_DUMP => map(
                (id, parse_u32, parse_id(id_size), parse_u32),
                |(object_id, stack_trace_serial_number, class_object_id, data_size)| {
                    let record = InstanceDump {
                        object_id,
                        stack_trace_serial_number,
                        class_object_id,
                        data_size,
                    };
                    (record, None)
                },
            )
            .parse(i),
            TAG_GC_OBJ_ARRAY_DUMP => map(
                (id, parse_u32, parse_u32, parse_id(id_size)),
                |(object_id, stack_trace_serial_number, number_of_elements, array_class_id)| {
                    let record = ObjectArrayDump {
                        object_id,
                        stack_trace_serial_number,
                        number_of_elements,
                        array_class_id,
                    };
                    (record, None)
                },
            )
            .parse(i),
            TAG_GC_PRIM_ARRAY_DUMP => map(
                (id, parse_u32, parse_u32, parse_i8),
                |(object_id, stack_trace_serial_number, number_of_elements, element_type)| {
                    // placeholder type, replaced once the raw code is validated
                    let record = PrimitiveArrayDump {
                        object_id,
                        stack_trace_serial_number,
                        number_of_elements,
                        element_type: FieldType::Byte,
                    };
                    (record, Some(element_type))
                },
            )
            .parse(i),
            _ => Err(nom::Err::Failure(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Tag,
            ))),
        }
    }
}

/// Fixed prefix of a class dump, up to and including the constant pool size.
pub fn class_dump_prefix_len(id_size: IdSize) -> u32 {
    7 * id_size.bytes() + 4 + 4 + 2
}

pub struct ClassDumpPrefix {
    pub class_object_id: u64,
    pub super_class_object_id: u64,
    pub class_loader_object_id: u64,
    pub instance_size: u32,
    pub constant_pool_size: u16,
}

pub fn parse_class_dump_prefix(
    id_size: IdSize,
) -> impl Fn(&[u8]) -> IResult<&[u8], ClassDumpPrefix> {
    move |i| {
        let id = parse_id(id_size);
        map(
            (
                (&id, parse_u32, &id, &id),
                (&id, &id, &id, &id),
                parse_u32,
                parse_u16,
            ),
            |(
                (class_object_id, _stack_trace_serial_number, super_class_object_id, class_loader_object_id),
                (_signers_object_id, _protection_domain_object_id, _reserved_1, _reserved_2),
                instance_size,
                constant_pool_size,
            )| ClassDumpPrefix {
                class_object_id,
                super_class_object_id,
                class_loader_object_id,
                instance_size,
                constant_pool_size,
            },
        )
        .parse(i)
    }
}

/// Name and raw type code of a static or instance field entry.
pub fn parse_field_entry(id_size: IdSize) -> impl Fn(&[u8]) -> IResult<&[u8], (u64, i8)> {
    move |i| (parse_id(id_size), parse_i8).parse(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_load_class_32_bits() {
        let bytes = [0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 4];
        let (rest, record) = parse_load_class(IdSize::Four)(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            record,
            LoadClass {
                serial_number: 1,
                class_object_id: 2,
                stack_trace_serial_number: 3,
                class_name_id: 4,
            }
        );
        assert_eq!(load_class_len(IdSize::Four) as usize, bytes.len());
    }

    #[test]
    fn parse_instance_dump_head() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&42u64.to_be_bytes());
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&99u64.to_be_bytes());
        bytes.extend_from_slice(&16u32.to_be_bytes());
        assert_eq!(
            gc_record_head_len(TAG_GC_INSTANCE_DUMP, IdSize::Eight),
            Some(bytes.len() as u32)
        );
        let (rest, (record, raw_type)) =
            parse_gc_record_head(TAG_GC_INSTANCE_DUMP, IdSize::Eight)(&bytes).unwrap();
        assert!(rest.is_empty());
        assert!(raw_type.is_none());
        assert_eq!(
            record,
            InstanceDump {
                object_id: 42,
                stack_trace_serial_number: 7,
                class_object_id: 99,
                data_size: 16,
            }
        );
    }

    #[test]
    fn unknown_gc_tag_has_no_head() {
        assert_eq!(gc_record_head_len(0x89, IdSize::Eight), None);
        assert_eq!(gc_record_head_len(TAG_GC_CLASS_DUMP, IdSize::Eight), None);
        assert!(parse_gc_record_head(0x89, IdSize::Eight)(&[0; 16]).is_err());
    }

    #[test]
    fn parse_class_dump_prefix_fields() {
        let mut bytes = vec![];
        bytes.extend_from_slice(&1u32.to_be_bytes()); // class
        bytes.extend_from_slice(&0u32.to_be_bytes()); // stack trace serial
        bytes.extend_from_slice(&2u32.to_be_bytes()); // super
        bytes.extend_from_slice(&3u32.to_be_bytes()); // loader
        bytes.extend_from_slice(&[0; 16]); // signers, protection domain, reserved
        bytes.extend_from_slice(&24u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        assert_eq!(class_dump_prefix_len(IdSize::Four) as usize, bytes.len());
        let (rest, prefix) = parse_class_dump_prefix(IdSize::Four)(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(prefix.class_object_id, 1);
        assert_eq!(prefix.super_class_object_id, 2);
        assert_eq!(prefix.class_loader_object_id, 3);
        assert_eq!(prefix.instance_size, 24);
        assert_eq!(prefix.constant_pool_size, 0);
    }
}
