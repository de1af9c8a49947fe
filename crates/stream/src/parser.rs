use std::io::{self, BufReader, Read};

use byteorder::{BigEndian, ReadBytesExt};
use log::{trace, warn};

use crate::{
    analyzer,
    class_desc::{
        validate_object_field_descriptor, ClassDesc, ClassDescType, DescFlags, Field, FieldType,
    },
    content::{
        hierarchy, ArrayData, Content, ContentId, ContentKind, EnumData, ExceptionStateData,
        FieldValue, InstanceData,
    },
    handles::HandleTable,
    mutf8,
    source::RecordingReader,
    stream::{DecodedStream, Options},
    Result, StreamError,
};

type Endian = BigEndian;

const STREAM_MAGIC: u16 = 0xACED;
const STREAM_VERSION: u16 = 0x0005;

const TC_NULL: u8 = 0x70;
const TC_REFERENCE: u8 = 0x71;
const TC_CLASSDESC: u8 = 0x72;
const TC_OBJECT: u8 = 0x73;
const TC_STRING: u8 = 0x74;
const TC_ARRAY: u8 = 0x75;
const TC_CLASS: u8 = 0x76;
const TC_BLOCKDATA: u8 = 0x77;
const TC_ENDBLOCKDATA: u8 = 0x78;
const TC_RESET: u8 = 0x79;
const TC_BLOCKDATALONG: u8 = 0x7A;
const TC_EXCEPTION: u8 = 0x7B;
const TC_LONGSTRING: u8 = 0x7C;
const TC_PROXYCLASSDESC: u8 = 0x7D;
const TC_ENUM: u8 = 0x7E;

/// The grammar decoder.
///
/// `run` consumes an entire `ObjectOutputStream` output, building the
/// content arena, the top-level element list and the handle tables. After a
/// decode error, everything built so far stays observable through the
/// accessors for diagnostics; `into_stream` finalizes either way.
pub struct Parser<R> {
    r: RecordingReader<BufReader<R>>,
    contents: Vec<Content>,
    top_level: Vec<Option<ContentId>>,
    table: HandleTable,
    options: Options,
}

impl<R: Read> Parser<R> {
    pub fn new(r: R, options: Options) -> Self {
        Self {
            r: RecordingReader::new(BufReader::new(r)),
            contents: Vec::new(),
            top_level: Vec::new(),
            table: HandleTable::new(),
            options,
        }
    }

    /// Reads the stream header and then every top-level record until EOF.
    ///
    /// Recording restarts before each top-level tag; when the record turns
    /// out to be an exception embedded by the writer, the recorded prefix
    /// is attached to the emitted exception-state element.
    pub fn run(&mut self) -> Result<()> {
        let magic = self.read_u16()?;
        if magic != STREAM_MAGIC {
            return Err(StreamError::InvalidMagic(magic));
        }
        let version = self.read_u16()?;
        if version != STREAM_VERSION {
            return Err(StreamError::InvalidVersion(version));
        }
        loop {
            self.r.start_recording();
            let tc = match self.read_u8() {
                Ok(tc) => tc,
                Err(StreamError::IOError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            if tc == TC_RESET {
                self.table.reset();
                continue;
            }
            let content = match self.read_content(tc, true) {
                Ok(content) => content,
                Err(StreamError::ExceptionRead(id)) => Some(id),
                Err(e) => return Err(e),
            };
            let content = match content {
                Some(id) if self.contents[id.0].is_exception => {
                    Some(self.wrap_exception_state(id))
                }
                other => other,
            };
            self.top_level.push(content);
        }
        self.validate()?;
        if self.options.connect_member_classes {
            let epoch: Vec<ContentId> = self.table.current().values().copied().collect();
            analyzer::connect_member_classes(&mut self.contents, &epoch)?;
            self.validate()?;
        }
        self.table.archive_remaining();
        Ok(())
    }

    pub fn into_stream(self) -> DecodedStream {
        DecodedStream::new(self.contents, self.top_level, self.table.into_epochs())
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn top_level(&self) -> &[Option<ContentId>] {
        &self.top_level
    }

    pub fn table(&self) -> &HandleTable {
        &self.table
    }

    /// Dispatches on a content tag. `block_data` distinguishes the grammar
    /// rules "content" (annotations, top level) and "object" (field values),
    /// which forbid block data.
    fn read_content(&mut self, tc: u8, block_data: bool) -> Result<Option<ContentId>> {
        match tc {
            TC_OBJECT => self.read_new_object().map(Some),
            TC_CLASS => self.read_new_class().map(Some),
            TC_ARRAY => self.read_new_array().map(Some),
            TC_STRING | TC_LONGSTRING => self.read_new_string(tc).map(Some),
            TC_ENUM => self.read_new_enum().map(Some),
            TC_CLASSDESC | TC_PROXYCLASSDESC => self.handle_class_desc(tc, true),
            TC_REFERENCE => self.read_prev_object().map(Some),
            TC_NULL => Ok(None),
            TC_EXCEPTION => self.read_exception().map(Some),
            TC_BLOCKDATA | TC_BLOCKDATALONG if block_data => self.read_block_data(tc).map(Some),
            TC_BLOCKDATA | TC_BLOCKDATALONG => Err(StreamError::UnexpectedBlockData(tc)),
            _ => Err(StreamError::UnknownTag(tc)),
        }
    }

    /// Reads a nullable class descriptor: new, proxy, null or reference.
    fn read_class_desc(&mut self) -> Result<Option<ContentId>> {
        let tc = self.read_u8()?;
        self.handle_class_desc(tc, false)
    }

    fn handle_class_desc(&mut self, tc: u8, must_be_new: bool) -> Result<Option<ContentId>> {
        match tc {
            TC_CLASSDESC => self.read_new_class_desc().map(Some),
            TC_PROXYCLASSDESC => self.read_new_proxy_class_desc().map(Some),
            TC_NULL => {
                if must_be_new {
                    return Err(StreamError::Validity(
                        "expected a new class description, got null".into(),
                    ));
                }
                trace!("read null class desc");
                Ok(None)
            }
            TC_REFERENCE => {
                if must_be_new {
                    return Err(StreamError::Validity(
                        "expected a new class description, got a reference".into(),
                    ));
                }
                let id = self.read_prev_object()?;
                match self.contents[id.0].kind {
                    ContentKind::ClassDesc(_) => Ok(Some(id)),
                    _ => Err(StreamError::Validity(
                        "referenced object is not a class description".into(),
                    )),
                }
            }
            _ => Err(StreamError::Validity(format!(
                "expected a valid class description starter, got 0x{tc:02X}"
            ))),
        }
    }

    fn read_new_class_desc(&mut self) -> Result<ContentId> {
        let name = self.read_utf()?;
        let serial_version_uid = self.read_i64()?;
        let handle = self.table.alloc();
        trace!("reading new class desc: handle 0x{handle:x} name {name}");

        // Bound before the field table, annotations and superclass are
        // read, so references written by annotateClass hooks resolve.
        let mut cd = ClassDesc::new(ClassDescType::Normal);
        cd.name = name;
        cd.serial_version_uid = serial_version_uid;
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::ClassDesc(cd),
        });
        self.table.bind(handle, id)?;

        let desc_flags = DescFlags::from_bits_retain(self.read_u8()?);
        let field_count = self.read_i16()?;
        if field_count < 0 {
            return Err(StreamError::InvalidLength(field_count as i64));
        }
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(self.read_field()?);
        }
        let annotations = self.read_class_annotation()?;
        let superclass = self.read_class_desc()?;

        let cd = self.class_desc_mut(id);
        cd.desc_flags = desc_flags;
        cd.fields = fields;
        cd.annotations = annotations;
        cd.superclass = superclass;
        Ok(id)
    }

    fn read_new_proxy_class_desc(&mut self) -> Result<ContentId> {
        let handle = self.table.alloc();
        trace!("reading new proxy class desc: handle 0x{handle:x}");
        let mut cd = ClassDesc::new(ClassDescType::Proxy);
        cd.name = "(proxy class; no name)".to_owned();
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::ClassDesc(cd),
        });
        self.table.bind(handle, id)?;

        let interface_count = self.read_i32()?;
        if interface_count < 0 {
            return Err(StreamError::InvalidLength(interface_count as i64));
        }
        let mut interfaces = Vec::new();
        for _ in 0..interface_count {
            interfaces.push(self.read_utf()?);
        }
        let annotations = self.read_class_annotation()?;
        let superclass = self.read_class_desc()?;

        let cd = self.class_desc_mut(id);
        cd.interfaces = Some(interfaces);
        cd.annotations = annotations;
        cd.superclass = superclass;
        Ok(id)
    }

    fn read_field(&mut self) -> Result<Field> {
        let type_code = self.read_u8()?;
        let ty = FieldType::from_type_code(type_code)?;
        let name = self.read_utf()?;
        let class_name = if ty.is_primitive() {
            None
        } else {
            let tc = self.read_u8()?;
            let string_id = self.read_new_string(tc)?;
            if ty == FieldType::Object {
                validate_object_field_descriptor(self.string_value(string_id)?)?;
            }
            Some(string_id)
        };
        Ok(Field {
            ty,
            name,
            class_name,
            is_inner_class_reference: false,
        })
    }

    /// Contents up to the matching TC_ENDBLOCKDATA. Resets are honored and
    /// skipped.
    fn read_class_annotation(&mut self) -> Result<Vec<Option<ContentId>>> {
        let mut list = Vec::new();
        loop {
            let tc = self.read_u8()?;
            if tc == TC_ENDBLOCKDATA {
                return Ok(list);
            }
            if tc == TC_RESET {
                self.table.reset();
                continue;
            }
            let content = self.read_content(tc, true)?;
            if let Some(id) = content {
                if self.contents[id.0].is_exception {
                    return Err(StreamError::ExceptionRead(id));
                }
            }
            list.push(content);
        }
    }

    fn read_new_object(&mut self) -> Result<ContentId> {
        let class_desc = self
            .read_class_desc()?
            .ok_or_else(|| StreamError::Validity("instance is missing its class descriptor".into()))?;
        let handle = self.table.alloc();
        trace!("reading new object: handle 0x{handle:x}");
        // Bound before its field data so the instance may reference itself.
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::Instance(InstanceData {
                class_desc,
                field_data: Vec::new(),
                annotations: Vec::new(),
            }),
        });
        self.table.bind(handle, id)?;
        self.read_class_data(id, class_desc)?;
        trace!("done reading object for handle 0x{handle:x}");
        Ok(id)
    }

    fn read_class_data(&mut self, instance: ContentId, class_desc: ContentId) -> Result<()> {
        let mut field_data = Vec::new();
        let mut annotations = Vec::new();
        for cd_id in hierarchy(&self.contents, class_desc) {
            let ContentKind::ClassDesc(cd) = &self.contents[cd_id.0].kind else {
                continue;
            };
            let flags = cd.desc_flags;
            let field_types: Vec<FieldType> = cd.fields.iter().map(|f| f.ty).collect();
            if flags.contains(DescFlags::SERIALIZABLE) {
                if flags.contains(DescFlags::EXTERNALIZABLE) {
                    return Err(StreamError::Validity(
                        "SC_SERIALIZABLE and SC_EXTERNALIZABLE are both set".into(),
                    ));
                }
                let mut values = Vec::with_capacity(field_types.len());
                for ty in field_types {
                    values.push(self.read_field_value(ty)?);
                }
                field_data.push((cd_id, values));
                if flags.contains(DescFlags::WRITE_METHOD) {
                    if flags.contains(DescFlags::ENUM) {
                        return Err(StreamError::Validity(
                            "SC_ENUM and SC_WRITE_METHOD are both set".into(),
                        ));
                    }
                    annotations.push((cd_id, self.read_class_annotation()?));
                }
            } else if flags.contains(DescFlags::EXTERNALIZABLE) {
                if !flags.contains(DescFlags::BLOCK_DATA) {
                    return Err(StreamError::Validity(
                        "cannot interpret externalizable data without block-data marker".into(),
                    ));
                }
                annotations.push((cd_id, self.read_class_annotation()?));
            }
        }
        let ContentKind::Instance(data) = &mut self.contents[instance.0].kind else {
            unreachable!("content created as an instance");
        };
        data.field_data = field_data;
        data.annotations = annotations;
        Ok(())
    }

    fn read_field_value(&mut self, ty: FieldType) -> Result<FieldValue> {
        match ty {
            FieldType::Byte => Ok(FieldValue::Byte(self.read_i8()?)),
            FieldType::Char => Ok(FieldValue::Char(self.read_u16()?)),
            FieldType::Double => Ok(FieldValue::Double(self.read_f64()?)),
            FieldType::Float => Ok(FieldValue::Float(self.read_f32()?)),
            FieldType::Int => Ok(FieldValue::Int(self.read_i32()?)),
            FieldType::Long => Ok(FieldValue::Long(self.read_i64()?)),
            FieldType::Short => Ok(FieldValue::Short(self.read_i16()?)),
            FieldType::Boolean => Ok(FieldValue::Boolean(self.read_u8()? != 0)),
            FieldType::Object | FieldType::Array => {
                let tc = self.read_u8()?;
                let content = self.read_content(tc, false)?;
                if let Some(id) = content {
                    if self.contents[id.0].is_exception {
                        return Err(StreamError::ExceptionRead(id));
                    }
                }
                Ok(FieldValue::Object(content))
            }
        }
    }

    fn read_new_array(&mut self) -> Result<ContentId> {
        let class_desc = self
            .read_class_desc()?
            .ok_or_else(|| StreamError::Validity("array is missing its class descriptor".into()))?;
        let handle = self.table.alloc();
        trace!("reading new array: handle 0x{handle:x}");
        let name = self.class_desc_ref(class_desc).name.clone();
        if name.len() < 2 {
            return Err(StreamError::Validity(format!(
                "invalid name in array class descriptor: {name}"
            )));
        }
        let element_type = FieldType::from_type_code(name.as_bytes()[1])?;
        // Bound before its values so the array may reference itself.
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::Array(ArrayData {
                class_desc,
                element_type,
                values: Vec::new(),
            }),
        });
        self.table.bind(handle, id)?;

        let size = self.read_i32()?;
        if size < 0 {
            return Err(StreamError::InvalidLength(size as i64));
        }
        let mut values = Vec::new();
        for _ in 0..size {
            values.push(self.read_field_value(element_type)?);
        }
        let ContentKind::Array(data) = &mut self.contents[id.0].kind else {
            unreachable!("content created as an array");
        };
        data.values = values;
        Ok(id)
    }

    fn read_new_class(&mut self) -> Result<ContentId> {
        let class_desc = self.read_class_desc()?;
        let handle = self.table.alloc();
        trace!("reading new class literal: handle 0x{handle:x}");
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::Class(class_desc),
        });
        self.table.bind(handle, id)?;
        Ok(id)
    }

    fn read_new_enum(&mut self) -> Result<ContentId> {
        let class_desc = self
            .read_class_desc()?
            .ok_or_else(|| StreamError::Validity("enum class descriptor can't be null".into()))?;
        let handle = self.table.alloc();
        trace!("reading new enum: handle 0x{handle:x}");
        let tc = self.read_u8()?;
        let value = self.read_new_string(tc)?;
        let constant = self.string_value(value)?.to_owned();
        self.class_desc_mut(class_desc).enum_constants.insert(constant);
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::Enum(EnumData { class_desc, value }),
        });
        self.table.bind(handle, id)?;
        Ok(id)
    }

    /// Reads a string-producing token: TC_STRING, TC_LONGSTRING or a
    /// reference to a previously read string.
    fn read_new_string(&mut self, tc: u8) -> Result<ContentId> {
        if tc == TC_REFERENCE {
            let id = self.read_prev_object()?;
            return match self.contents[id.0].kind {
                ContentKind::String(_) => Ok(id),
                _ => Err(StreamError::Validity(
                    "got a reference for a string, but the referenced value is something else"
                        .into(),
                )),
            };
        }
        let handle = self.table.alloc();
        let len = match tc {
            TC_STRING => self.read_u16()? as usize,
            TC_LONGSTRING => {
                let len = self.read_i64()?;
                if len < 0 || len > i32::MAX as i64 {
                    return Err(StreamError::InvalidLength(len));
                }
                if len < 65536 {
                    warn!("small string length encoded as TC_LONGSTRING: {len}");
                }
                len as usize
            }
            TC_NULL => {
                return Err(StreamError::Validity(
                    "stream signaled TC_NULL when a string was expected".into(),
                ))
            }
            _ => {
                return Err(StreamError::Validity(format!(
                    "invalid type code for string: 0x{tc:02X}"
                )))
            }
        };
        let mut data = vec![0u8; len];
        self.r.read_exact(&mut data)?;
        let value = mutf8::decode(&data)?;
        trace!("reading new string: handle 0x{handle:x} bufsz {len}");
        let id = self.push(Content {
            handle: Some(handle),
            is_exception: false,
            kind: ContentKind::String(value),
        });
        self.table.bind(handle, id)?;
        Ok(id)
    }

    fn read_block_data(&mut self, tc: u8) -> Result<ContentId> {
        let size = match tc {
            TC_BLOCKDATA => self.read_u8()? as usize,
            TC_BLOCKDATALONG => {
                let size = self.read_i32()?;
                if size < 0 {
                    return Err(StreamError::InvalidLength(size as i64));
                }
                size as usize
            }
            _ => {
                return Err(StreamError::Validity(format!(
                    "invalid type code for block data: 0x{tc:02X}"
                )))
            }
        };
        let mut buf = vec![0u8; size];
        self.r.read_exact(&mut buf)?;
        trace!("read block data of size {size}");
        Ok(self.push(Content {
            handle: None,
            is_exception: false,
            kind: ContentKind::BlockData(buf),
        }))
    }

    fn read_prev_object(&mut self) -> Result<ContentId> {
        let handle = self.read_u32()?;
        let id = self.table.resolve(handle)?;
        trace!("prev object: handle 0x{handle:x}");
        Ok(id)
    }

    /// The exception subprotocol: reset, read the thrown object, reset
    /// again. The object must be a non-null instance; it is only flagged
    /// here, and wrapping with the recorded byte prefix happens at the
    /// top-level record boundary.
    fn read_exception(&mut self) -> Result<ContentId> {
        self.table.reset();
        let tc = self.read_u8()?;
        if tc == TC_RESET {
            return Err(StreamError::Validity(
                "TC_RESET while reading an exception object".into(),
            ));
        }
        let id = self.read_content(tc, false)?.ok_or_else(|| {
            StreamError::Validity(
                "stream signaled for an exception, but the exception object was null".into(),
            )
        })?;
        if !matches!(self.contents[id.0].kind, ContentKind::Instance(_)) {
            return Err(StreamError::Validity(
                "stream signaled for an exception, but the content is not an object".into(),
            ));
        }
        if self.contents[id.0].is_exception {
            return Err(StreamError::ExceptionRead(id));
        }
        self.contents[id.0].is_exception = true;
        self.table.reset();
        Ok(id)
    }

    fn wrap_exception_state(&mut self, exception: ContentId) -> ContentId {
        let stream_data = self.r.snapshot();
        let handle = self.contents[exception.0].handle;
        self.push(Content {
            handle,
            is_exception: false,
            kind: ContentKind::ExceptionState(ExceptionStateData {
                exception,
                stream_data,
            }),
        })
    }

    fn validate(&self) -> Result<()> {
        for id in self.table.current().values() {
            self.contents[id.0].validate()?;
        }
        Ok(())
    }

    fn push(&mut self, content: Content) -> ContentId {
        let id = ContentId(self.contents.len());
        self.contents.push(content);
        id
    }

    fn class_desc_ref(&self, id: ContentId) -> &ClassDesc {
        match &self.contents[id.0].kind {
            ContentKind::ClassDesc(cd) => cd,
            _ => unreachable!("content bound as a class descriptor"),
        }
    }

    fn class_desc_mut(&mut self, id: ContentId) -> &mut ClassDesc {
        match &mut self.contents[id.0].kind {
            ContentKind::ClassDesc(cd) => cd,
            _ => unreachable!("content bound as a class descriptor"),
        }
    }

    fn string_value(&self, id: ContentId) -> Result<&str> {
        match &self.contents[id.0].kind {
            ContentKind::String(s) => Ok(s),
            _ => Err(StreamError::Validity("expected a string content".into())),
        }
    }

    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let mut data = vec![0u8; len];
        self.r.read_exact(&mut data)?;
        mutf8::decode(&data)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.r.read_u8()?)
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.r.read_i8()?)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(self.r.read_u16::<Endian>()?)
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(self.r.read_i16::<Endian>()?)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(self.r.read_u32::<Endian>()?)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.r.read_i32::<Endian>()?)
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(self.r.read_i64::<Endian>()?)
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(self.r.read_f32::<Endian>()?)
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(self.r.read_f64::<Endian>()?)
    }
}
