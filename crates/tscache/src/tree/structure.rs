//! Structure definitions and instance-key matching.
//!
//! A definition is a sorted list of attribute names. An instance key such as
//! `host=a,region=eu` belongs to the definition `host,region` (or
//! `region,host`) because its attribute names, ignoring values and order,
//! are exactly the definition's.

/// Sorts a comma-separated attribute list into canonical form.
///
/// Total and idempotent: `canonicalize(canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(raw: &str) -> String {
    sorted_attributes(raw.split(',')).join(",")
}

fn sorted_attributes<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = names.map(str::to_string).collect();
    names.sort();
    names
}

/// Extracts the attribute names of an instance key, sorted.
///
/// Returns `None` if any pair lacks an `=` or has an empty attribute name.
pub fn instance_attributes(instance_key: &str) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for pair in instance_key.split(',') {
        let (name, _value) = pair.split_once('=')?;
        if name.is_empty() {
            return None;
        }
        names.push(name);
    }
    Some(sorted_attributes(names.into_iter()))
}

/// Named, immutable attribute shape of a structure.
///
/// Two definitions are equal when both the name and the canonical attribute
/// list are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructureDefinition {
    name: String,
    attributes: Vec<String>,
}

impl StructureDefinition {
    /// Creates a definition from a raw comma-separated attribute list.
    pub fn new(name: impl Into<String>, raw_definition: &str) -> Self {
        Self {
            name: name.into(),
            attributes: sorted_attributes(raw_definition.split(',')),
        }
    }

    /// Returns the structure name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sorted attribute names.
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Returns the canonical comma-joined attribute list.
    pub fn canonical(&self) -> String {
        self.attributes.join(",")
    }

    /// Returns true if `instance_key` has exactly this definition's attributes.
    pub fn matches(&self, instance_key: &str) -> bool {
        instance_attributes(instance_key).is_some_and(|names| names == self.attributes)
    }

    /// Renames the structure. The attribute shape never changes.
    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}
