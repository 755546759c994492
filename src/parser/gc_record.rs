use serde::Serialize;

pub const TAG_GC_ROOT_UNKNOWN: u8 = 0xFF;
pub const TAG_GC_ROOT_JNI_GLOBAL: u8 = 0x01;
pub const TAG_GC_ROOT_JNI_LOCAL: u8 = 0x02;
pub const TAG_GC_ROOT_JAVA_FRAME: u8 = 0x03;
pub const TAG_GC_ROOT_NATIVE_STACK: u8 = 0x04;
pub const TAG_GC_ROOT_STICKY_CLASS: u8 = 0x05;
pub const TAG_GC_ROOT_THREAD_BLOCK: u8 = 0x06;
pub const TAG_GC_ROOT_MONITOR_USED: u8 = 0x07;
pub const TAG_GC_ROOT_THREAD_OBJ: u8 = 0x08;
pub const TAG_GC_CLASS_DUMP: u8 = 0x20;
pub const TAG_GC_INSTANCE_DUMP: u8 = 0x21;
pub const TAG_GC_OBJ_ARRAY_DUMP: u8 = 0x22;
pub const TAG_GC_PRIM_ARRAY_DUMP: u8 = 0x23;

/// Width of every object, class, string and frame identifier in a dump.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum IdSize {
    Four,
    Eight,
}

impl IdSize {
    pub fn from_value(v: u32) -> Option<IdSize> {
        match v {
            4 => Some(IdSize::Four),
            8 => Some(IdSize::Eight),
            _ => None,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            IdSize::Four => 4,
            IdSize::Eight => 8,
        }
    }

    pub fn encode(self, id: u64) -> Vec<u8> {
        match self {
            IdSize::Four => (id as u32).to_be_bytes().to_vec(),
            IdSize::Eight => id.to_be_bytes().to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FieldType {
    ArrayObject = 1,
    Object = 2,
    Bool = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
}

impl FieldType {
    pub fn from_value(v: i8) -> Option<FieldType> {
        match v {
            1 => Some(FieldType::ArrayObject),
            2 => Some(FieldType::Object),
            4 => Some(FieldType::Bool),
            5 => Some(FieldType::Char),
            6 => Some(FieldType::Float),
            7 => Some(FieldType::Double),
            8 => Some(FieldType::Byte),
            9 => Some(FieldType::Short),
            10 => Some(FieldType::Int),
            11 => Some(FieldType::Long),
            _ => None,
        }
    }

    pub fn is_object(self) -> bool {
        matches!(self, FieldType::Object | FieldType::ArrayObject)
    }

    pub fn size(self, id_size: IdSize) -> u32 {
        match self {
            FieldType::ArrayObject | FieldType::Object => id_size.bytes(),
            FieldType::Bool | FieldType::Byte => 1,
            FieldType::Char | FieldType::Short => 2,
            FieldType::Float | FieldType::Int => 4,
            FieldType::Double | FieldType::Long => 8,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name_id: u64,
    pub field_type: FieldType,
}

/// Only the parts of a class dump the stripper acts upon; static values are skipped.
#[derive(Debug, PartialEq, Eq)]
pub struct ClassDumpFields {
    pub class_object_id: u64,
    pub super_class_object_id: u64,
    pub class_loader_object_id: u64,
    pub instance_size: u32,
    pub static_fields: Vec<FieldInfo>,
    pub instance_fields: Vec<FieldInfo>,
}

/// Fixed head of a heap dump sub-record. Variable payloads (instance bytes and
/// array elements) stay in the stream for the caller to consume.
#[derive(Debug, PartialEq, Eq)]
pub enum GcRecord {
    RootUnknown {
        object_id: u64,
    },
    RootThreadObject {
        thread_object_id: u64,
        thread_sequence_number: u32,
        stack_sequence_number: u32,
    },
    RootJniGlobal {
        object_id: u64,
        jni_global_ref_id: u64,
    },
    RootJniLocal {
        object_id: u64,
        thread_serial_number: u32,
        frame_number_in_stack_trace: u32,
    },
    RootJavaFrame {
        object_id: u64,
        thread_serial_number: u32,
        frame_number_in_stack_trace: u32,
    },
    RootNativeStack {
        object_id: u64,
        thread_serial_number: u32,
    },
    RootStickyClass {
        object_id: u64,
    },
    RootThreadBlock {
        object_id: u64,
        thread_serial_number: u32,
    },
    RootMonitorUsed {
        object_id: u64,
    },
    InstanceDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        class_object_id: u64,
        data_size: u32,
    },
    ObjectArrayDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        number_of_elements: u32,
        array_class_id: u64,
    },
    PrimitiveArrayDump {
        object_id: u64,
        stack_trace_serial_number: u32,
        number_of_elements: u32,
        element_type: FieldType,
    },
    ClassDump(Box<ClassDumpFields>),
}

impl GcRecord {
    pub fn object_id(&self) -> u64 {
        match self {
            GcRecord::RootUnknown { object_id }
            | GcRecord::RootJniGlobal { object_id, .. }
            | GcRecord::RootJniLocal { object_id, .. }
            | GcRecord::RootJavaFrame { object_id, .. }
            | GcRecord::RootNativeStack { object_id, .. }
            | GcRecord::RootStickyClass { object_id }
            | GcRecord::RootThreadBlock { object_id, .. }
            | GcRecord::RootMonitorUsed { object_id }
            | GcRecord::InstanceDump { object_id, .. }
            | GcRecord::ObjectArrayDump { object_id, .. }
            | GcRecord::PrimitiveArrayDump { object_id, .. } => *object_id,
            GcRecord::RootThreadObject {
                thread_object_id, ..
            } => *thread_object_id,
            GcRecord::ClassDump(class_dump) => class_dump.class_object_id,
        }
    }

    /// Roots only mark objects, they carry no object content.
    pub fn is_root(&self) -> bool {
        !matches!(
            self,
            GcRecord::InstanceDump { .. }
                | GcRecord::ObjectArrayDump { .. }
                | GcRecord::PrimitiveArrayDump { .. }
                | GcRecord::ClassDump(_)
        )
    }

    /// Bytes following the fixed head.
    pub fn payload_len(&self, id_size: IdSize) -> u64 {
        match self {
            GcRecord::InstanceDump { data_size, .. } => u64::from(*data_size),
            GcRecord::ObjectArrayDump {
                number_of_elements,
                ..
            } => u64::from(*number_of_elements) * u64::from(id_size.bytes()),
            GcRecord::PrimitiveArrayDump {
                number_of_elements,
                element_type,
                ..
            } => u64::from(*number_of_elements) * u64::from(element_type.size(id_size)),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_sizes_follow_id_size() {
        assert_eq!(FieldType::Object.size(IdSize::Four), 4);
        assert_eq!(FieldType::ArrayObject.size(IdSize::Eight), 8);
        assert_eq!(FieldType::Long.size(IdSize::Four), 8);
        assert_eq!(FieldType::Char.size(IdSize::Eight), 2);
        assert!(FieldType::from_value(3).is_none());
        assert!(FieldType::from_value(12).is_none());
    }

    #[test]
    fn primitive_array_payload() {
        let record = GcRecord::PrimitiveArrayDump {
            object_id: 1,
            stack_trace_serial_number: 0,
            number_of_elements: 100,
            element_type: FieldType::Int,
        };
        assert_eq!(record.payload_len(IdSize::Eight), 400);
        assert!(!record.is_root());
    }
}
