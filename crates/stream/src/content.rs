use crate::{
    class_desc::{resolve_java_type, ClassDesc, ClassDescType, Field, FieldType},
    handles::Handle,
    Result,
};

/// Index of a node in the decode arena. References between contents are
/// stored as ids and resolved through the arena's owner, so cyclic object
/// graphs need no back-pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId(pub(crate) usize);

/// One element read from the stream.
///
/// Each element generally corresponds to an invocation of an
/// `ObjectOutputStream` write method. The handle is the wire handle the
/// writer assigned; block data carries none. `is_exception` is set only on
/// objects the stream explicitly marked as thrown during serialization.
#[derive(Debug)]
pub struct Content {
    pub handle: Option<Handle>,
    pub is_exception: bool,
    pub kind: ContentKind,
}

#[derive(Debug)]
pub enum ContentKind {
    /// A decoded string object.
    String(String),
    /// A class literal (an instance of `Class` written to the stream); the
    /// descriptor may legally be null.
    Class(Option<ContentId>),
    ClassDesc(ClassDesc),
    Array(ArrayData),
    Enum(EnumData),
    Instance(InstanceData),
    /// Opaque bytes written by `writeObject`/`annotateClass` overrides.
    BlockData(Vec<u8>),
    /// A serialization failure embedded in the stream: the exception object
    /// plus the raw bytes of the interrupted record that preceded it.
    ExceptionState(ExceptionStateData),
}

#[derive(Debug)]
pub struct ArrayData {
    pub class_desc: ContentId,
    pub element_type: FieldType,
    pub values: Vec<FieldValue>,
}

#[derive(Debug)]
pub struct EnumData {
    pub class_desc: ContentId,
    /// The string content holding the constant's name.
    pub value: ContentId,
}

#[derive(Debug)]
pub struct InstanceData {
    pub class_desc: ContentId,
    /// Field values per class descriptor, in hierarchy order.
    pub field_data: Vec<(ContentId, Vec<FieldValue>)>,
    /// Object annotations per class descriptor, for classes with a
    /// `writeObject` override or externalizable block data.
    pub annotations: Vec<(ContentId, Vec<Option<ContentId>>)>,
}

#[derive(Debug)]
pub struct ExceptionStateData {
    pub exception: ContentId,
    /// Bytes delivered since the enclosing top-level record began. Usually
    /// starts at the record's tag byte, but the reader may have consumed
    /// more; the buffer is not guaranteed to be cleanly parseable.
    pub stream_data: Vec<u8>,
}

/// A single field value; primitives are stored directly, references as
/// arena ids (null references as `Object(None)`).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Byte(i8),
    Char(u16),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(Option<ContentId>),
}

impl Content {
    pub fn class_desc(&self) -> Option<&ClassDesc> {
        match &self.kind {
            ContentKind::ClassDesc(cd) => Some(cd),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match &self.kind {
            ContentKind::ClassDesc(cd) => cd.validate(),
            _ => Ok(()),
        }
    }
}

/// Class descriptors in the order the stream writes instance data:
/// ancestors first, the descriptor itself last. A proxy superclass does not
/// contribute itself or its ancestors. A descriptor never legally repeats
/// in its own chain; the walk stops if a crafted stream ties one back in.
pub(crate) fn hierarchy(contents: &[Content], id: ContentId) -> Vec<ContentId> {
    let mut chain = vec![id];
    let mut current = id;
    loop {
        let ContentKind::ClassDesc(cd) = &contents[current.0].kind else {
            break;
        };
        let Some(superclass) = cd.superclass else {
            break;
        };
        let is_proxy = matches!(
            &contents[superclass.0].kind,
            ContentKind::ClassDesc(scd) if scd.class_type == ClassDescType::Proxy
        );
        if is_proxy || chain.contains(&superclass) {
            break;
        }
        chain.push(superclass);
        current = superclass;
    }
    chain.reverse();
    chain
}

/// Java-language type of a field, with slashes converted to dots.
pub(crate) fn field_java_type(contents: &[Content], field: &Field) -> Result<String> {
    let class_name = field.class_name.and_then(|id| match &contents[id.0].kind {
        ContentKind::String(s) => Some(s.as_str()),
        _ => None,
    });
    resolve_java_type(field.ty, class_name, true)
}
