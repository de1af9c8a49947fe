use std::collections::HashSet;

use bitflags::bitflags;

use crate::{content::ContentId, Result, StreamError};

bitflags! {
    /// `classDescFlags` bits, Object Serialization Stream Protocol §6.4.2.
    /// Unrecognized bits are retained as read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DescFlags: u8 {
        const WRITE_METHOD = 0x01;
        const SERIALIZABLE = 0x02;
        const EXTERNALIZABLE = 0x04;
        const BLOCK_DATA = 0x08;
        const ENUM = 0x10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDescType {
    Normal,
    Proxy,
}

/// The serialized prototype of a class: name, fields, flags, annotations
/// and inheritance, as written to the stream. Proxy descriptors carry only
/// interfaces and annotations; their field list is empty by protocol.
#[derive(Debug)]
pub struct ClassDesc {
    pub class_type: ClassDescType,
    /// Name as written, slashes intact. Proxy descriptors get a synthetic
    /// placeholder.
    pub name: String,
    pub serial_version_uid: i64,
    pub desc_flags: DescFlags,
    /// Fields in the order serialized by the stream writer.
    pub fields: Vec<Field>,
    pub interfaces: Option<Vec<String>>,
    /// Contents written by `annotateClass`/`annotateProxyClass` overrides,
    /// between the field table and the superclass descriptor.
    pub annotations: Vec<Option<ContentId>>,
    pub superclass: Option<ContentId>,
    /// Constant names seen while reading enum contents of this class.
    pub enum_constants: HashSet<String>,
    /// Filled by the member-class reconnection pass.
    pub inner_classes: Vec<ContentId>,
    pub is_inner_class: bool,
    pub is_local_inner_class: bool,
    pub is_static_member_class: bool,
}

impl ClassDesc {
    pub(crate) fn new(class_type: ClassDescType) -> Self {
        Self {
            class_type,
            name: String::new(),
            serial_version_uid: 0,
            desc_flags: DescFlags::empty(),
            fields: Vec::new(),
            interfaces: None,
            annotations: Vec::new(),
            superclass: None,
            enum_constants: HashSet::new(),
            inner_classes: Vec::new(),
            is_inner_class: false,
            is_local_inner_class: false,
            is_static_member_class: false,
        }
    }

    pub fn is_array_class(&self) -> bool {
        self.name.len() > 1 && self.name.starts_with('[')
    }

    pub(crate) fn validate(&self) -> Result<()> {
        // If neither SC_SERIALIZABLE nor SC_EXTERNALIZABLE is set, the
        // field count is always zero (protocol §4.3).
        if !self
            .desc_flags
            .intersects(DescFlags::SERIALIZABLE | DescFlags::EXTERNALIZABLE)
            && !self.fields.is_empty()
        {
            return Err(StreamError::Validity(
                "non-serializable, non-externalizable class has fields".into(),
            ));
        }
        if self
            .desc_flags
            .contains(DescFlags::SERIALIZABLE | DescFlags::EXTERNALIZABLE)
        {
            return Err(StreamError::Validity(
                "both Serializable and Externalizable are set".into(),
            ));
        }
        if self.desc_flags.contains(DescFlags::ENUM) {
            if !self.fields.is_empty() || self.interfaces.is_some() {
                return Err(StreamError::Validity(
                    "enums must not implement interfaces or have non-constant fields".into(),
                ));
            }
        } else if !self.enum_constants.is_empty() {
            return Err(StreamError::Validity(
                "non-enum class has enum constants".into(),
            ));
        }
        Ok(())
    }
}

/// A field declared by a class descriptor. Fields have no handle; they
/// exist only inside their descriptor.
#[derive(Debug)]
pub struct Field {
    pub ty: FieldType,
    pub name: String,
    /// For `[` and `L` fields, the string content holding the JVM field
    /// descriptor (`Lpkg/Cls;`, `[[I`).
    pub class_name: Option<ContentId>,
    /// Set by the member-class reconnection pass on `this$N` references.
    pub is_inner_class_reference: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn from_type_code(code: u8) -> Result<Self> {
        match code {
            b'B' => Ok(FieldType::Byte),
            b'C' => Ok(FieldType::Char),
            b'D' => Ok(FieldType::Double),
            b'F' => Ok(FieldType::Float),
            b'I' => Ok(FieldType::Int),
            b'J' => Ok(FieldType::Long),
            b'S' => Ok(FieldType::Short),
            b'Z' => Ok(FieldType::Boolean),
            b'[' => Ok(FieldType::Array),
            b'L' => Ok(FieldType::Object),
            _ => Err(StreamError::InvalidFieldType(code)),
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(self, FieldType::Array | FieldType::Object)
    }

    /// Java-language name, for primitive types only.
    pub fn java_type(self) -> Option<&'static str> {
        match self {
            FieldType::Byte => Some("byte"),
            FieldType::Char => Some("char"),
            FieldType::Double => Some("double"),
            FieldType::Float => Some("float"),
            FieldType::Int => Some("int"),
            FieldType::Long => Some("long"),
            FieldType::Short => Some("short"),
            FieldType::Boolean => Some("boolean"),
            FieldType::Array | FieldType::Object => None,
        }
    }
}

/// Decodes a class name in field-descriptor format (`Lfoo/bar/Baz;`),
/// optionally converting slashes to dots.
pub fn decode_class_name(descriptor: &str, convert_slashes: bool) -> Result<String> {
    if !descriptor.starts_with('L') || !descriptor.ends_with(';') || descriptor.len() < 3 {
        return Err(StreamError::Validity(format!(
            "invalid name (not in field-descriptor format): {descriptor}"
        )));
    }
    let name = &descriptor[1..descriptor.len() - 1];
    if convert_slashes {
        Ok(name.replace('/', "."))
    } else {
        Ok(name.to_owned())
    }
}

/// Java-language rendition of a field or array type descriptor, e.g.
/// `[[I` -> `int[][]` and `Ljava/lang/String;` -> `java.lang.String`.
pub fn resolve_java_type(
    ty: FieldType,
    class_name: Option<&str>,
    convert_slashes: bool,
) -> Result<String> {
    match ty {
        FieldType::Array => {
            let descriptor = class_name.ok_or_else(|| {
                StreamError::Validity("array type is missing its descriptor".into())
            })?;
            let mut brackets = String::new();
            for (i, ch) in descriptor.char_indices() {
                match ch {
                    '[' => brackets.push_str("[]"),
                    'L' => {
                        let name = decode_class_name(&descriptor[i..], convert_slashes)?;
                        return Ok(name + &brackets);
                    }
                    _ => {
                        if !ch.is_ascii() || ch == '\0' {
                            return Err(StreamError::Validity(format!(
                                "invalid array field type descriptor character: {descriptor}"
                            )));
                        }
                        let element = FieldType::from_type_code(ch as u8)?;
                        if i != descriptor.len() - 1 {
                            return Err(StreamError::Validity(format!(
                                "array field type descriptor is too long: {descriptor}"
                            )));
                        }
                        let name = element.java_type().ok_or_else(|| {
                            StreamError::Validity(format!(
                                "invalid array field type descriptor character: {descriptor}"
                            ))
                        })?;
                        return Ok(name.to_owned() + &brackets);
                    }
                }
            }
            Err(StreamError::Validity(format!(
                "array field type descriptor is too short: {descriptor}"
            )))
        }
        FieldType::Object => {
            let descriptor = class_name.ok_or_else(|| {
                StreamError::Validity("object type is missing its descriptor".into())
            })?;
            decode_class_name(descriptor, convert_slashes)
        }
        primitive => primitive
            .java_type()
            .map(str::to_owned)
            .ok_or_else(|| StreamError::Validity("field type has no Java name".into())),
    }
}

/// Object-typed fields must carry a `L<name>;` descriptor whose first
/// semicolon is its last character.
pub(crate) fn validate_object_field_descriptor(descriptor: &str) -> Result<()> {
    if !descriptor.starts_with('L') {
        return Err(StreamError::Validity(format!(
            "invalid object field type descriptor: {descriptor}"
        )));
    }
    if descriptor.find(';') != Some(descriptor.len() - 1) {
        return Err(StreamError::Validity(format!(
            "invalid object field type descriptor (must end with semicolon): {descriptor}"
        )));
    }
    Ok(())
}
