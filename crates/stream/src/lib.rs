// https://docs.oracle.com/javase/8/docs/platform/serialization/spec/protocol.html

mod analyzer;
mod class_desc;
mod content;
mod error;
mod handles;
pub mod mutf8;
mod parser;
mod source;
mod stream;

pub use class_desc::{
    decode_class_name, resolve_java_type, ClassDesc, ClassDescType, DescFlags, Field, FieldType,
};
pub use content::{
    ArrayData, Content, ContentId, ContentKind, EnumData, ExceptionStateData, FieldValue,
    InstanceData,
};
pub use error::StreamError;
pub use handles::{Handle, HandleTable, BASE_WIRE_HANDLE};
pub use parser::Parser;
pub use source::RecordingReader;
pub use stream::{DecodedStream, Options};

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
