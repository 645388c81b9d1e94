//! Person and family records plus a borrowed lookup index over a snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

/// A node in the pedigree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub handle: String,
    pub display_name: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_year: Option<i32>,
    #[serde(default)]
    pub is_living: bool,
    /// Generation as stored upstream. The engine recomputes its own.
    #[serde(default)]
    pub generation: i32,
    #[serde(default)]
    pub is_patrilineal: bool,
    /// Families in which this person is a parent.
    #[serde(default)]
    pub families: Vec<String>,
    /// Families in which this person is a child.
    #[serde(default)]
    pub parent_families: Vec<String>,
    /// Opaque key the renderer resolves to the full profile record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_ref: Option<String>,
}

impl Person {
    pub fn new(handle: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            display_name: display_name.into(),
            gender: Gender::Unknown,
            birth_year: None,
            death_year: None,
            is_living: false,
            generation: 0,
            is_patrilineal: false,
            families: Vec::new(),
            parent_families: Vec::new(),
            profile_ref: None,
        }
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn patrilineal(mut self, is_patrilineal: bool) -> Self {
        self.is_patrilineal = is_patrilineal;
        self
    }

    pub fn living(mut self, is_living: bool) -> Self {
        self.is_living = is_living;
        self
    }

    pub fn years(mut self, birth: Option<i32>, death: Option<i32>) -> Self {
        self.birth_year = birth;
        self.death_year = death;
        self
    }

    pub fn in_families<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.families = families.into_iter().map(Into::into).collect();
        self
    }

    pub fn child_of<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parent_families = families.into_iter().map(Into::into).collect();
        self
    }
}

/// A union producing zero or more children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_handle: Option<String>,
    /// Ordered; the order is the sibling display order.
    #[serde(default)]
    pub children: Vec<String>,
}

impl Family {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            father_handle: None,
            mother_handle: None,
            children: Vec::new(),
        }
    }

    pub fn father(mut self, handle: impl Into<String>) -> Self {
        self.father_handle = Some(handle.into());
        self
    }

    pub fn mother(mut self, handle: impl Into<String>) -> Self {
        self.mother_handle = Some(handle.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Father then mother, whichever are recorded.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.father_handle
            .as_deref()
            .into_iter()
            .chain(self.mother_handle.as_deref())
    }

    pub fn has_parent(&self, handle: &str) -> bool {
        self.parents().any(|p| p == handle)
    }
}

/// The `{people, families}` graph handed to the engine by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub families: Vec<Family>,
}

impl GraphSnapshot {
    pub fn new(people: Vec<Person>, families: Vec<Family>) -> Self {
        Self { people, families }
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn index(&self) -> GraphIndex<'_> {
        GraphIndex::new(self)
    }

    pub fn person(&self, handle: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.handle == handle)
    }

    pub fn family(&self, handle: &str) -> Option<&Family> {
        self.families.iter().find(|f| f.handle == handle)
    }
}

/// Hash lookups over a snapshot. Every accessor skips dangling handles.
#[derive(Debug)]
pub struct GraphIndex<'a> {
    snapshot: &'a GraphSnapshot,
    people: HashMap<&'a str, &'a Person>,
    families: HashMap<&'a str, &'a Family>,
    children: HashSet<&'a str>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(snapshot: &'a GraphSnapshot) -> Self {
        let mut people = HashMap::with_capacity(snapshot.people.len());
        for person in &snapshot.people {
            people.entry(person.handle.as_str()).or_insert(person);
        }
        let mut families = HashMap::with_capacity(snapshot.families.len());
        let mut children = HashSet::new();
        for family in &snapshot.families {
            families.entry(family.handle.as_str()).or_insert(family);
            children.extend(family.children.iter().map(String::as_str));
        }
        Self {
            snapshot,
            people,
            families,
            children,
        }
    }

    pub fn snapshot(&self) -> &'a GraphSnapshot {
        self.snapshot
    }

    pub fn person(&self, handle: &str) -> Option<&'a Person> {
        self.people.get(handle).copied()
    }

    pub fn family(&self, handle: &str) -> Option<&'a Family> {
        self.families.get(handle).copied()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.people.contains_key(handle)
    }

    /// True when some family lists `handle` among its children.
    pub fn is_child(&self, handle: &str) -> bool {
        self.children.contains(handle)
    }

    /// Families `person` parents, in declaration order.
    pub fn families_of(&self, person: &'a Person) -> impl Iterator<Item = &'a Family> + '_ {
        person.families.iter().filter_map(|f| self.family(f))
    }

    /// Families `person` is a child of, in declaration order.
    pub fn parent_families_of(&self, person: &'a Person) -> impl Iterator<Item = &'a Family> + '_ {
        person.parent_families.iter().filter_map(|f| self.family(f))
    }

    /// Parents of `family` that resolve to a person record.
    pub fn parents_of(&self, family: &'a Family) -> impl Iterator<Item = &'a Person> + '_ {
        family.parents().filter_map(|h| self.person(h))
    }

    /// Children of `family` that resolve to a person record, in sibling order.
    pub fn children_of(&self, family: &'a Family) -> impl Iterator<Item = &'a Person> + '_ {
        family.children.iter().filter_map(|h| self.person(h))
    }

    /// True when `handle` parents at least one family with a resolvable child.
    pub fn has_children(&self, handle: &str) -> bool {
        self.person(handle).is_some_and(|p| {
            self.families_of(p)
                .any(|f| f.children.iter().any(|c| self.contains(c)))
        })
    }
}
