//! In-memory credential tree.
//!
//! The tree is a forest of groups under an implicit root. Parents own their
//! children by value; there are no back references. Navigation upwards is
//! done by identifier or by path, never by pointer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keytree_common::{EntryId, GroupId};

/// Well-known field keys.
pub const TITLE: &str = "Title";
pub const USERNAME: &str = "UserName";
pub const PASSWORD: &str = "Password";
pub const URL: &str = "URL";
pub const NOTES: &str = "Notes";

/// Keys surfaced as first-class attributes rather than custom fields.
pub const WELL_KNOWN_FIELDS: [&str; 5] = [TITLE, USERNAME, PASSWORD, URL, NOTES];

/// Whether `key` is one of the well-known field keys.
pub fn is_well_known(key: &str) -> bool {
    WELL_KNOWN_FIELDS.contains(&key)
}

/// A named value on an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: String,
    /// Value must be held in the container's protected form.
    #[serde(default)]
    pub protected: bool,
}

impl Field {
    /// Create an unprotected field.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            protected: false,
        }
    }

    /// Create a protected field.
    pub fn protected(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            protected: true,
            ..Self::new(key, value)
        }
    }
}

/// A named binary blob on an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A single credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    id: EntryId,
    fields: Vec<Field>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Entry {
    /// Create an entry whose only field is its title.
    pub fn new(title: impl Into<String>) -> Self {
        let mut entry = Self::untitled();
        entry.fields.push(Field::new(TITLE, title));
        entry
    }

    /// Create an entry with no fields at all.
    pub fn untitled() -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::generate(),
            fields: Vec::new(),
            attachments: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Title field value, empty when the entry has none.
    pub fn title(&self) -> &str {
        self.content(TITLE)
    }

    /// Value of `key`, reading an absent field as the empty string.
    pub fn content(&self, key: &str) -> &str {
        self.field(key).map(|f| f.value.as_str()).unwrap_or("")
    }

    /// Field with the given key.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Attachment with the given name.
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<Field> {
        &mut self.fields
    }

    pub(crate) fn attachments_mut(&mut self) -> &mut Vec<Attachment> {
        &mut self.attachments
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}

/// A named folder of entries and sub-groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    name: String,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    entries: Vec<Entry>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl Group {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::generate(),
            name: name.into(),
            groups: Vec::new(),
            entries: Vec::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Append a sub-group.
    ///
    /// Sibling names are not checked: containers written by other tools may
    /// already hold same-named siblings, and lookups pick the first one.
    pub fn add_group(&mut self, group: Group) -> GroupId {
        let id = group.id;
        self.groups.push(group);
        self.touch();
        id
    }

    /// Append an entry. Titles are not checked, see [`Group::add_group`].
    pub fn add_entry(&mut self, entry: Entry) -> EntryId {
        let id = entry.id;
        self.entries.push(entry);
        self.touch();
        id
    }

    /// First direct child group named `name`.
    pub fn child(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Direct entry with the given id.
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Mutable direct entry with the given id.
    pub fn entry_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub(crate) fn groups_mut(&mut self) -> &mut Vec<Group> {
        &mut self.groups
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<Entry> {
        &mut self.entries
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    fn count_entries(&self) -> usize {
        self.entries.len() + self.groups.iter().map(Group::count_entries).sum::<usize>()
    }
}

/// The whole credential tree held by a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    groups: Vec<Group>,
}

impl Tree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level groups (the implicit root's children).
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Append a top-level group.
    pub fn add_group(&mut self, group: Group) -> GroupId {
        let id = group.id;
        self.groups.push(group);
        id
    }

    /// First top-level group named `name`.
    pub fn child(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub(crate) fn groups_mut(&mut self) -> &mut Vec<Group> {
        &mut self.groups
    }

    /// Count every entry in the tree.
    pub fn count_entries(&self) -> usize {
        self.groups.iter().map(Group::count_entries).sum()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
