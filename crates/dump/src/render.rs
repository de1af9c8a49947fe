//! Textual renderings of a decoded stream: per-element one-liners, Java-like
//! class declarations, instance dumps and block data extraction.

use std::fs::File;
use std::io::{self, Write};

use joss_stream::{
    resolve_java_type, ClassDesc, ClassDescType, ContentId, ContentKind, DecodedStream, DescFlags,
    FieldType, FieldValue, Handle, Result,
};
use regex::Regex;

const INDENT: &str = "    ";
const CODE_WIDTH: usize = 90;

const KEYWORDS: &[&str] = &[
    "abstract", "continue", "for", "new", "switch", "assert", "default", "if", "package",
    "synchronized", "boolean", "do", "goto", "private", "this", "break", "double", "implements",
    "protected", "throw", "byte", "else", "import", "public", "throws", "case", "enum",
    "instanceof", "return", "transient", "catch", "extends", "int", "short", "try", "char",
    "final", "interface", "static", "void", "class", "finally", "long", "strictfp", "volatile",
    "const", "float", "native", "super", "while",
];

pub fn dump_content(stream: &DecodedStream) {
    println!("//// BEGIN stream content output");
    for element in stream.top_level() {
        println!("{}", describe(stream, *element));
    }
    println!("//// END stream content output");
    println!();
}

pub fn dump_classes(
    stream: &DecodedStream,
    show_arrays: bool,
    filter: Option<&Regex>,
    fix_names: bool,
) -> Result<()> {
    println!(
        "//// BEGIN class declarations{}{}",
        if show_arrays { "" } else { " (excluding array classes)" },
        filter
            .map(|f| format!(" (exclusion filter {})", f.as_str()))
            .unwrap_or_default()
    );
    let Some(epoch) = stream.epochs().last() else {
        println!("//// END class declarations");
        println!();
        return Ok(());
    };
    for id in epoch.values() {
        let Some(cd) = stream.content(*id).class_desc() else {
            continue;
        };
        if !show_arrays && cd.is_array_class() {
            continue;
        }
        // Member classes are displayed inside their enclosing classes.
        if cd.is_static_member_class || cd.is_inner_class {
            continue;
        }
        if filter.map(|f| f.is_match(&cd.name)).unwrap_or(false) {
            continue;
        }
        let mut out = String::new();
        write_class_decl(stream, 0, *id, fix_names, &mut out)?;
        println!("{out}");
    }
    println!("//// END class declarations");
    println!();
    Ok(())
}

pub fn dump_instances(stream: &DecodedStream) {
    println!("//// BEGIN instance dump");
    let Some(epoch) = stream.epochs().last() else {
        println!("//// END instance dump");
        println!();
        return;
    };
    for id in epoch.values() {
        if matches!(stream.content(*id).kind, ContentKind::Instance(_)) {
            println!("{}", instance_dump(stream, *id));
        }
    }
    println!("//// END instance dump");
    println!();
}

/// Writes every top-level block data payload to `filename`, plus a
/// manifest listing the individual block sizes.
pub fn extract_block_data(stream: &DecodedStream, filename: &str) -> io::Result<()> {
    let (base, ext) = match filename.rfind('.') {
        Some(i) => (&filename[..i], &filename[i..]),
        None => (filename, ""),
    };
    let mut payload = File::create(filename)?;
    let mut manifest = File::create(format!("{base}.manifest{ext}"))?;
    writeln!(
        manifest,
        "# Each line in this file that doesn't begin with a '#' contains the size of"
    )?;
    writeln!(
        manifest,
        "# an individual blockdata block written to the stream."
    )?;
    for element in stream.top_level() {
        let Some(id) = element else { continue };
        if let ContentKind::BlockData(buf) = &stream.content(*id).kind {
            writeln!(manifest, "{}", buf.len())?;
            payload.write_all(buf)?;
        }
    }
    Ok(())
}

/// One-line description of a content element, in the style of the
/// content listing.
pub fn describe(stream: &DecodedStream, element: Option<ContentId>) -> String {
    let Some(id) = element else {
        return "null".to_owned();
    };
    let content = stream.content(id);
    match &content.kind {
        ContentKind::String(s) => format!("[String {}: \"{}\"]", hex(content.handle), s),
        ContentKind::ClassDesc(cd) => format!(
            "[cd {}: name {} uid {}]",
            hex(content.handle),
            cd.name,
            cd.serial_version_uid
        ),
        ContentKind::Class(cd) => {
            format!("[class {}: {}]", hex(content.handle), describe(stream, *cd))
        }
        ContentKind::Enum(data) => format!(
            "[enum {}: {}]",
            hex(content.handle),
            string_or(stream, data.value)
        ),
        ContentKind::Array(data) => {
            let values: Vec<String> = data
                .values
                .iter()
                .map(|v| value_line(stream, v, content.handle))
                .collect();
            format!(
                "[array {} classdesc {}: sz {} {{{}}}]",
                hex(content.handle),
                describe(stream, Some(data.class_desc)),
                data.values.len(),
                values.join(", ")
            )
        }
        ContentKind::Instance(data) => {
            let cd = stream.content(data.class_desc);
            let name = cd.class_desc().map(|cd| cd.name.as_str()).unwrap_or("?");
            format!("{} _h{} = r_{};", name, hex(content.handle), hex(cd.handle))
        }
        ContentKind::BlockData(buf) => format!("[blockdata: {} bytes]", buf.len()),
        ContentKind::ExceptionState(state) => {
            let mut out = format!(
                "[exceptionstate object {}  buflen {}",
                describe(stream, Some(state.exception)),
                state.stream_data.len()
            );
            for (i, b) in state.stream_data.iter().enumerate() {
                if i % 16 == 0 {
                    out.push_str(&format!("\n{i:7x}: "));
                }
                out.push_str(&format!(" {b:02x}"));
            }
            if !state.stream_data.is_empty() {
                out.push('\n');
            }
            out.push(']');
            out
        }
    }
}

fn write_class_decl(
    stream: &DecodedStream,
    level: usize,
    id: ContentId,
    fix_names: bool,
    out: &mut String,
) -> Result<()> {
    let Some(cd) = stream.content(id).class_desc() else {
        return Ok(());
    };
    let class_name = if fix_names {
        fix_class_name(&cd.name)
    } else {
        cd.name.clone()
    };
    if !cd.annotations.is_empty() {
        out.push_str(&format!("{}// annotations: \n", indent(level)));
        for annotation in &cd.annotations {
            out.push_str(&format!(
                "{}// {}{}\n",
                indent(level),
                INDENT,
                describe(stream, *annotation)
            ));
        }
    }
    match cd.class_type {
        ClassDescType::Normal => {
            if cd.desc_flags.contains(DescFlags::ENUM) {
                write_enum_decl(level, &class_name, cd, out);
                return Ok(());
            }
            out.push_str(&indent(level));
            if cd.is_static_member_class {
                out.push_str("static ");
            }
            let display_name = if cd.name.starts_with('[') {
                resolve_java_type(FieldType::Array, Some(&cd.name), false)?
            } else {
                class_name
            };
            out.push_str(&format!("class {display_name}"));
            if let Some(superclass) = cd.superclass {
                if let Some(super_cd) = stream.content(superclass).class_desc() {
                    out.push_str(&format!(" extends {}", super_cd.name));
                }
            }
            out.push_str(" implements ");
            if cd.desc_flags.contains(DescFlags::EXTERNALIZABLE) {
                out.push_str("java.io.Externalizable");
            } else {
                out.push_str("java.io.Serializable");
            }
            if let Some(interfaces) = &cd.interfaces {
                for interface in interfaces {
                    out.push_str(&format!(", {interface}"));
                }
            }
            out.push_str(" {\n");
            for field in &cd.fields {
                if field.is_inner_class_reference {
                    continue;
                }
                let mut java_type = stream.field_java_type(field)?;
                if fix_names {
                    java_type = fix_java_type(&java_type);
                }
                out.push_str(&format!(
                    "{}{} {};\n",
                    indent(level + 1),
                    java_type,
                    field.name
                ));
            }
            for inner in &cd.inner_classes {
                write_class_decl(stream, level + 1, *inner, fix_names, out)?;
            }
            out.push_str(&format!("{}}}\n", indent(level)));
        }
        ClassDescType::Proxy => {
            out.push_str(&format!(
                "{}// proxy class {}",
                indent(level),
                hex(stream.content(id).handle)
            ));
            if let Some(superclass) = cd.superclass {
                if let Some(super_cd) = stream.content(superclass).class_desc() {
                    out.push_str(&format!(" extends {}", super_cd.name));
                }
            }
            out.push_str(" implements \n");
            if let Some(interfaces) = &cd.interfaces {
                for interface in interfaces {
                    out.push_str(&format!("{}//    {}, \n", indent(level), interface));
                }
            }
            if cd.desc_flags.contains(DescFlags::EXTERNALIZABLE) {
                out.push_str(&format!("{}//    java.io.Externalizable\n", indent(level)));
            } else {
                out.push_str(&format!("{}//    java.io.Serializable\n", indent(level)));
            }
        }
    }
    Ok(())
}

fn write_enum_decl(level: usize, class_name: &str, cd: &ClassDesc, out: &mut String) {
    out.push_str(&format!("{}enum {} {{", indent(level), class_name));
    let mut constants: Vec<&String> = cd.enum_constants.iter().collect();
    constants.sort();
    let mut width = indent(level + 1).len();
    let mut should_indent = true;
    for constant in constants {
        if should_indent {
            out.push('\n');
            out.push_str(&indent(level + 1));
            should_indent = false;
        }
        width += constant.len();
        out.push_str(&format!("{constant}, "));
        if width >= CODE_WIDTH {
            width = indent(level + 1).len();
            should_indent = true;
        }
    }
    out.push('\n');
    out.push_str(&format!("{}}}\n", indent(level)));
}

fn instance_dump(stream: &DecodedStream, id: ContentId) -> String {
    let content = stream.content(id);
    let ContentKind::Instance(data) = &content.kind else {
        return String::new();
    };
    let cd_content = stream.content(data.class_desc);
    let class_name = cd_content
        .class_desc()
        .map(|cd| cd.name.as_str())
        .unwrap_or("?");
    let mut out = format!(
        "[instance {}: {}/{}",
        hex(content.handle),
        hex(cd_content.handle),
        class_name
    );
    if !data.annotations.is_empty() {
        out.push_str("\n  object annotations:\n");
        for (cd_id, annotations) in &data.annotations {
            if let Some(cd) = stream.content(*cd_id).class_desc() {
                out.push_str(&format!("    {}\n", cd.name));
            }
            for annotation in annotations {
                out.push_str(&format!("        {}\n", describe(stream, *annotation)));
            }
        }
    }
    if !data.field_data.is_empty() {
        out.push_str("\n  field data:\n");
        for (cd_id, values) in &data.field_data {
            let Some(cd) = stream.content(*cd_id).class_desc() else {
                continue;
            };
            out.push_str(&format!(
                "    {}/{}:\n",
                hex(stream.content(*cd_id).handle),
                cd.name
            ));
            for (field, value) in cd.fields.iter().zip(values) {
                out.push_str(&format!(
                    "        {}: {}\n",
                    field.name,
                    value_line(stream, value, content.handle)
                ));
            }
        }
    }
    out.push(']');
    out
}

/// Renders a field value; references to the containing object print as
/// `this`, other references as `r<handle>`.
fn value_line(stream: &DecodedStream, value: &FieldValue, container: Option<Handle>) -> String {
    match value {
        FieldValue::Byte(v) => v.to_string(),
        FieldValue::Char(v) => char::from_u32(*v as u32)
            .map(|ch| format!("'{ch}'"))
            .unwrap_or_else(|| format!("\\u{v:04x}")),
        FieldValue::Double(v) => v.to_string(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::Int(v) => v.to_string(),
        FieldValue::Long(v) => v.to_string(),
        FieldValue::Short(v) => v.to_string(),
        FieldValue::Boolean(v) => v.to_string(),
        FieldValue::Object(None) => "null".to_owned(),
        FieldValue::Object(Some(id)) => {
            let handle = stream.content(*id).handle;
            if handle.is_some() && handle == container {
                "this".to_owned()
            } else {
                format!("r{}: {}", hex(handle), describe(stream, Some(*id)))
            }
        }
    }
}

fn string_or<'a>(stream: &'a DecodedStream, id: ContentId) -> &'a str {
    match &stream.content(id).kind {
        ContentKind::String(s) => s,
        _ => "?",
    }
}

fn hex(handle: Option<Handle>) -> String {
    match handle {
        Some(h) => format!("0x{h:x}"),
        None => "(no handle)".to_owned(),
    }
}

fn indent(level: usize) -> String {
    INDENT.repeat(level)
}

/// Applies identifier fixing to the base of a possibly-array Java type.
fn fix_java_type(java_type: &str) -> String {
    match java_type.find('[') {
        Some(i) => format!("{}{}", fix_class_name(java_type[..i].trim_end()), &java_type[i..]),
        None => fix_class_name(java_type),
    }
}

/// Transforms a name into a legal, non-keyword Java identifier. Modified
/// results are prefixed with `$__`.
fn fix_class_name(name: &str) -> String {
    if name.is_empty() {
        return "$__zerolen".to_owned();
    }
    if KEYWORDS.contains(&name) {
        return format!("$__{name}");
    }
    let mut fixed = String::new();
    let mut modified = false;
    for (i, ch) in name.chars().enumerate() {
        if i == 0 && !is_identifier_start(ch) {
            modified = true;
            fixed.push(if is_identifier_part(ch) { ch } else { 'x' });
        } else if i > 0 && !is_identifier_part(ch) {
            modified = true;
            fixed.push('x');
        } else {
            fixed.push(ch);
        }
    }
    if modified {
        format!("$__{fixed}")
    } else {
        name.to_owned()
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}
