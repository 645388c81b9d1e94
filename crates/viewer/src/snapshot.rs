//! Snapshot loading from KDL and JSON files.
//!
//! ```kdl
//! person "P1" name="Nguyễn Văn An" gender="male" birth=1900 death=1970 living=#false patrilineal=#true {
//!     family "F1"
//!     parent-family "F0"
//! }
//! family "F1" father="P1" mother="P2" {
//!     child "P3"
//! }
//! ```

use giapha_layout::{Family, Gender, GraphSnapshot, Person};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid KDL: {0}")]
    Kdl(#[from] kdl::KdlError),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{0}` node without a handle")]
    MissingHandle(String),
    #[error("Unknown node: {0}")]
    UnknownNode(String),
    #[error("Invalid `{field}` on {handle}")]
    InvalidField { handle: String, field: String },
}

/// Load a snapshot, picking the format from the file extension. Anything
/// that is not `.json` is read as KDL.
pub fn load_snapshot(path: &Path) -> Result<GraphSnapshot, SnapshotError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => parse_kdl_snapshot(&content),
    }
}

pub fn parse_kdl_snapshot(content: &str) -> Result<GraphSnapshot, SnapshotError> {
    let doc = KdlDocument::parse(content)?;
    let mut snapshot = GraphSnapshot::default();

    for node in doc.nodes() {
        match node.name().value() {
            "person" => snapshot.people.push(parse_person(node)?),
            "family" => snapshot.families.push(parse_family(node)?),
            other => return Err(SnapshotError::UnknownNode(other.to_string())),
        }
    }
    Ok(snapshot)
}

/// First positional argument.
fn handle_of(node: &KdlNode) -> Result<String, SnapshotError> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(str::to_string)
        .ok_or_else(|| SnapshotError::MissingHandle(node.name().value().to_string()))
}

fn prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .map(|e| e.value())
}

fn invalid(handle: &str, field: &str) -> SnapshotError {
    SnapshotError::InvalidField {
        handle: handle.to_string(),
        field: field.to_string(),
    }
}

fn string_prop(node: &KdlNode, handle: &str, key: &str) -> Result<Option<String>, SnapshotError> {
    prop(node, key)
        .map(|v| v.as_string().map(str::to_string).ok_or_else(|| invalid(handle, key)))
        .transpose()
}

fn year_prop(node: &KdlNode, handle: &str, key: &str) -> Result<Option<i32>, SnapshotError> {
    prop(node, key)
        .map(|v| {
            v.as_integer()
                .and_then(|y| i32::try_from(y).ok())
                .ok_or_else(|| invalid(handle, key))
        })
        .transpose()
}

fn bool_prop(node: &KdlNode, handle: &str, key: &str) -> Result<Option<bool>, SnapshotError> {
    prop(node, key)
        .map(|v| v.as_bool().ok_or_else(|| invalid(handle, key)))
        .transpose()
}

/// Positional handles of the child nodes called `name`.
fn child_handles(node: &KdlNode, name: &str) -> Result<Vec<String>, SnapshotError> {
    let Some(children) = node.children() else {
        return Ok(Vec::new());
    };
    children
        .nodes()
        .iter()
        .filter(|c| c.name().value() == name)
        .map(handle_of)
        .collect()
}

fn parse_person(node: &KdlNode) -> Result<Person, SnapshotError> {
    let handle = handle_of(node)?;
    let name = string_prop(node, &handle, "name")?.unwrap_or_else(|| handle.clone());
    let gender = match string_prop(node, &handle, "gender")?.as_deref() {
        Some("male") => Gender::Male,
        Some("female") => Gender::Female,
        Some("unknown") | None => Gender::Unknown,
        Some(_) => return Err(invalid(&handle, "gender")),
    };

    let mut person = Person::new(handle.clone(), name)
        .gender(gender)
        .patrilineal(bool_prop(node, &handle, "patrilineal")?.unwrap_or(false))
        .living(bool_prop(node, &handle, "living")?.unwrap_or(false))
        .years(
            year_prop(node, &handle, "birth")?,
            year_prop(node, &handle, "death")?,
        )
        .in_families(child_handles(node, "family")?)
        .child_of(child_handles(node, "parent-family")?);
    person.generation = year_prop(node, &handle, "generation")?.unwrap_or(0);
    person.profile_ref = string_prop(node, &handle, "profile")?;
    Ok(person)
}

fn parse_family(node: &KdlNode) -> Result<Family, SnapshotError> {
    let handle = handle_of(node)?;
    let mut family = Family::new(handle.clone()).with_children(child_handles(node, "child")?);
    family.father_handle = string_prop(node, &handle, "father")?;
    family.mother_handle = string_prop(node, &handle, "mother")?;
    Ok(family)
}
