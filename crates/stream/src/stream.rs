use std::collections::HashMap;
use std::io::Read;

use crate::{
    analyzer,
    class_desc::Field,
    content::{field_java_type, Content, ContentId, ContentKind, FieldValue},
    handles::Handle,
    parser::Parser,
    Result,
};

#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Run the member-class reconnection pass after parsing.
    pub connect_member_classes: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            connect_member_classes: true,
        }
    }
}

/// A fully decoded object stream: the content arena, the ordered top-level
/// elements (which may be null), and the handle tables of every epoch.
#[derive(Debug)]
pub struct DecodedStream {
    contents: Vec<Content>,
    top_level: Vec<Option<ContentId>>,
    epochs: Vec<HashMap<Handle, ContentId>>,
}

impl DecodedStream {
    pub fn parse(r: impl Read, options: Options) -> Result<Self> {
        let mut parser = Parser::new(r, options);
        parser.run()?;
        Ok(parser.into_stream())
    }

    pub(crate) fn new(
        contents: Vec<Content>,
        top_level: Vec<Option<ContentId>>,
        epochs: Vec<HashMap<Handle, ContentId>>,
    ) -> Self {
        Self {
            contents,
            top_level,
            epochs,
        }
    }

    /// Top-level elements in stream order. Entries may be null: writing a
    /// null reference to the stream is perfectly legitimate.
    pub fn top_level(&self) -> &[Option<ContentId>] {
        &self.top_level
    }

    /// Handle tables of every epoch, oldest first. Although only one table
    /// is active at a time, a stream may have several: each TC_RESET closes
    /// the current one.
    pub fn epochs(&self) -> &[HashMap<Handle, ContentId>] {
        &self.epochs
    }

    pub fn content(&self, id: ContentId) -> &Content {
        &self.contents[id.0]
    }

    /// Every handle-bearing content, across all epochs.
    pub fn handled_contents(&self) -> impl Iterator<Item = ContentId> + '_ {
        self.epochs.iter().flat_map(|epoch| epoch.values().copied())
    }

    /// Runs (or re-runs) the member-class reconnection pass over the final
    /// epoch, then re-validates the affected descriptors. Running it a
    /// second time is a no-op.
    pub fn connect_member_classes(&mut self) -> Result<()> {
        let Some(epoch) = self.epochs.last() else {
            return Ok(());
        };
        let ids: Vec<ContentId> = epoch.values().copied().collect();
        analyzer::connect_member_classes(&mut self.contents, &ids)?;
        for &id in &ids {
            self.contents[id.0].validate()?;
        }
        Ok(())
    }

    /// Finds the class descriptor with the given name among the decoded
    /// instances' field data.
    pub fn class_desc_by_name(&self, name: &str) -> Option<ContentId> {
        for id in self.handled_contents() {
            let ContentKind::Instance(data) = &self.content(id).kind else {
                continue;
            };
            for &(cd_id, _) in &data.field_data {
                if let ContentKind::ClassDesc(cd) = &self.content(cd_id).kind {
                    if cd.name == name {
                        return Some(cd_id);
                    }
                }
            }
        }
        None
    }

    /// Finds the instance held by the named field of some instance whose
    /// field data is keyed by the given class descriptor.
    pub fn field_instance(&self, name: &str, class_desc: ContentId) -> Option<ContentId> {
        for id in self.handled_contents() {
            let ContentKind::Instance(data) = &self.content(id).kind else {
                continue;
            };
            for (cd_id, values) in &data.field_data {
                if *cd_id != class_desc {
                    continue;
                }
                let ContentKind::ClassDesc(cd) = &self.content(*cd_id).kind else {
                    continue;
                };
                let Some(index) = cd.fields.iter().position(|f| f.name == name) else {
                    continue;
                };
                if let Some(FieldValue::Object(Some(value_id))) = values.get(index) {
                    if matches!(self.content(*value_id).kind, ContentKind::Instance(_)) {
                        return Some(*value_id);
                    }
                }
            }
        }
        None
    }

    /// Looks up a field value on the given instance, by field name on the
    /// instance's own class.
    pub fn field_value(&self, name: &str, instance: ContentId) -> Option<&FieldValue> {
        let ContentKind::Instance(data) = &self.content(instance).kind else {
            return None;
        };
        let ContentKind::ClassDesc(cd) = &self.content(data.class_desc).kind else {
            return None;
        };
        let index = cd.fields.iter().position(|f| f.name == name)?;
        let (_, values) = data
            .field_data
            .iter()
            .find(|(cd_id, _)| *cd_id == data.class_desc)?;
        values.get(index)
    }

    /// Chained lookup: the named value inside `field_name` of `class_name`.
    pub fn value_of(&self, class_name: &str, field_name: &str, value_name: &str) -> Option<&FieldValue> {
        let class_desc = self.class_desc_by_name(class_name)?;
        let instance = self.field_instance(field_name, class_desc)?;
        self.field_value(value_name, instance)
    }

    /// Java-language type of a field, with slashes converted to dots.
    pub fn field_java_type(&self, field: &Field) -> Result<String> {
        field_java_type(&self.contents, field)
    }
}
