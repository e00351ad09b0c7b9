//! Reference tokens inserted into the editor.

use crate::category::CategoryDescriptor;

/// Whether a reference points at a top-level entity or a child of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrillLevel {
    Top,
    SubItem,
}

/// Everything needed to format one reference.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceTarget<'a> {
    pub category: &'a CategoryDescriptor,
    pub level: DrillLevel,
    pub entity_id: &'a str,
    pub name: &'a str,
    /// Id of the containing entity, for sub-items.
    pub parent_id: Option<&'a str>,
}

impl<'a> ReferenceTarget<'a> {
    pub fn top(category: &'a CategoryDescriptor, entity_id: &'a str, name: &'a str) -> Self {
        Self {
            category,
            level: DrillLevel::Top,
            entity_id,
            name,
            parent_id: None,
        }
    }

    pub fn sub_item(
        category: &'a CategoryDescriptor,
        parent_id: &'a str,
        entity_id: &'a str,
        name: &'a str,
    ) -> Self {
        Self {
            category,
            level: DrillLevel::SubItem,
            entity_id,
            name,
            parent_id: Some(parent_id),
        }
    }
}

/// Turns a selection into the text inserted at the caret.
pub trait ReferenceFormatter: Send + Sync {
    fn format(&self, target: &ReferenceTarget<'_>) -> String;
}

/// Formats `@UUID[<id>]{<name>}` links.
///
/// Sub-items are addressed through their parent as
/// `@UUID[<parent>.<child kind>.<id>]`. The `{<name>}` label is omitted when
/// `add_name` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidReferenceFormatter {
    pub add_name: bool,
}

impl Default for UuidReferenceFormatter {
    fn default() -> Self {
        Self { add_name: true }
    }
}

impl UuidReferenceFormatter {
    pub fn new(add_name: bool) -> Self {
        Self { add_name }
    }

    fn address(target: &ReferenceTarget<'_>) -> String {
        match (target.level, target.parent_id) {
            (DrillLevel::SubItem, Some(parent)) => match &target.category.child_kind {
                Some(kind) => format!("{}.{}.{}", parent, kind, target.entity_id),
                None => format!("{}.{}", parent, target.entity_id),
            },
            _ => target.entity_id.to_string(),
        }
    }
}

impl ReferenceFormatter for UuidReferenceFormatter {
    fn format(&self, target: &ReferenceTarget<'_>) -> String {
        let address = Self::address(target);
        if self.add_name && !target.name.is_empty() {
            format!("@UUID[{}]{{{}}}", address, target.name)
        } else {
            format!("@UUID[{}]", address)
        }
    }
}
