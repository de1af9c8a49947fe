//! Member-class reconnection, following the JDK 1.1 Inner Classes
//! Specification naming conventions:
//!
//! - a class `O$I` holding an object reference named `this$N` whose type is
//!   an existing class `O` is an inner class of `O` named `I`;
//! - any remaining class matching `O$I` whose outer `O` exists is a static
//!   member class of `O`.
//!
//! Connected classes are renamed to their inner name and every field
//! reference to the old name is repointed. Serializing a static member
//! class does not require its enclosing class, so a missing outer is
//! tolerated there; the descriptor simply keeps its name. Descriptors that
//! are already connected are skipped, so re-running the pass is a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::{
    class_desc::{ClassDesc, ClassDescType, FieldType},
    content::{field_java_type, Content, ContentId, ContentKind},
    Result, StreamError,
};

fn enclosing_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^this\$(\d+)$").unwrap())
}

fn member_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^((?:[^$]+\$)*[^$]+)\$([^$]+)$").unwrap())
}

pub(crate) fn connect_member_classes(contents: &mut [Content], epoch: &[ContentId]) -> Result<()> {
    let mut classes: HashMap<String, ContentId> = HashMap::new();
    let mut class_ids: Vec<ContentId> = Vec::new();
    for &id in epoch {
        if let ContentKind::ClassDesc(cd) = &contents[id.0].kind {
            classes.insert(cd.name.clone(), id);
            class_ids.push(id);
        }
    }
    let mut class_names: HashSet<String> = classes.keys().cloned().collect();
    let mut new_names: Vec<(ContentId, String)> = Vec::new();

    // Inner classes, identified by their this$N enclosing reference.
    for &cd_id in &class_ids {
        let (class_type, name, field_count, is_inner) = {
            let cd = class_desc(contents, cd_id);
            (cd.class_type, cd.name.clone(), cd.fields.len(), cd.is_inner_class)
        };
        if class_type == ClassDescType::Proxy || is_inner {
            continue;
        }
        for i in 0..field_count {
            let (is_candidate, field_name) = {
                let field = &class_desc(contents, cd_id).fields[i];
                (
                    field.ty == FieldType::Object
                        && !field.is_inner_class_reference
                        && enclosing_field_regex().is_match(&field.name),
                    field.name.clone(),
                )
            };
            if !is_candidate {
                continue;
            }
            let Some(caps) = member_class_regex().captures(&name) else {
                return Err(StreamError::Validity(format!(
                    "inner class enclosing-class reference field exists, but the class name \
                     doesn't match the expected pattern: class {name} field {field_name}"
                )));
            };
            let outer = caps[1].to_owned();
            let inner = caps[2].to_owned();
            let Some(&outer_id) = classes.get(&outer) else {
                return Err(StreamError::Validity(format!(
                    "couldn't connect inner classes: outer class not found for field name {field_name}"
                )));
            };
            let field_type_name = {
                let field = &class_desc(contents, cd_id).fields[i];
                field_java_type(contents, field)?
            };
            let outer_name = class_desc(contents, outer_id).name.clone();
            if outer_name != field_type_name {
                return Err(StreamError::Validity(format!(
                    "outer class field type doesn't match the field type name: \
                     {field_type_name} outer class name {outer_name}"
                )));
            }
            class_desc_mut(contents, outer_id).inner_classes.push(cd_id);
            let cd = class_desc_mut(contents, cd_id);
            cd.is_inner_class = true;
            cd.is_local_inner_class = false;
            cd.fields[i].is_inner_class_reference = true;
            new_names.push((cd_id, inner));
            break;
        }
    }

    // Static member classes: the remaining O$I names with a known outer.
    for &cd_id in &class_ids {
        let (class_type, name, is_inner, is_static) = {
            let cd = class_desc(contents, cd_id);
            (cd.class_type, cd.name.clone(), cd.is_inner_class, cd.is_static_member_class)
        };
        if class_type == ClassDescType::Proxy || is_inner || is_static {
            continue;
        }
        let Some(caps) = member_class_regex().captures(&name) else {
            continue;
        };
        let inner = caps[2].to_owned();
        let Some(&outer_id) = classes.get(&caps[1]) else {
            continue;
        };
        class_desc_mut(contents, outer_id).inner_classes.push(cd_id);
        class_desc_mut(contents, cd_id).is_static_member_class = true;
        new_names.push((cd_id, inner));
    }

    // Commit the staged renames and repoint field references.
    for (target_id, new_name) in new_names {
        let old_name = class_desc(contents, target_id).name.clone();
        if class_names.contains(&new_name) {
            return Err(StreamError::Validity(format!(
                "can't rename class from {old_name} to {new_name} -- class already exists"
            )));
        }
        let descriptor = format!("L{};", new_name.replace('.', "/"));
        for &cd_id in &class_ids {
            if class_desc(contents, cd_id).class_type == ClassDescType::Proxy {
                continue;
            }
            for i in 0..class_desc(contents, cd_id).fields.len() {
                let (ty, string_id) = {
                    let field = &class_desc(contents, cd_id).fields[i];
                    (field.ty, field.class_name)
                };
                if ty != FieldType::Object {
                    continue;
                }
                let Some(string_id) = string_id else { continue };
                let java_type = {
                    let field = &class_desc(contents, cd_id).fields[i];
                    field_java_type(contents, field)?
                };
                if java_type != old_name {
                    continue;
                }
                if let ContentKind::String(s) = &mut contents[string_id.0].kind {
                    *s = descriptor.clone();
                }
            }
        }
        class_names.remove(&old_name);
        class_names.insert(new_name.clone());
        class_desc_mut(contents, target_id).name = new_name;
    }
    Ok(())
}

fn class_desc(contents: &[Content], id: ContentId) -> &ClassDesc {
    match &contents[id.0].kind {
        ContentKind::ClassDesc(cd) => cd,
        _ => unreachable!("analyzer visits only class descriptors"),
    }
}

fn class_desc_mut(contents: &mut [Content], id: ContentId) -> &mut ClassDesc {
    match &mut contents[id.0].kind {
        ContentKind::ClassDesc(cd) => cd,
        _ => unreachable!("analyzer visits only class descriptors"),
    }
}
