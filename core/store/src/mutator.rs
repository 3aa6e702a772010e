//! In-place tree mutations.
//!
//! Every function here assumes the caller holds exclusive access to the tree
//! (the controller's lock) and performs no I/O.

use tracing::debug;

use keytree_common::{EntryId, Error, GroupId, Result};

use crate::resolver::{find_group_by_id_mut, find_group_mut, EntryPath};
use crate::settings::{self, SshAgentSettings, PRIVATE_KEY_ATTACHMENT, SETTINGS_ATTACHMENT};
use crate::tree::{Attachment, Entry, Field, Group, Tree};

fn child_or_create<'g>(groups: &'g mut Vec<Group>, name: &str) -> &'g mut Group {
    let index = match groups.iter().position(|g| g.name() == name) {
        Some(index) => index,
        None => {
            debug!(group = name, "Creating missing group");
            groups.push(Group::new(name));
            groups.len() - 1
        }
    };
    &mut groups[index]
}

/// Create an entry at `path`, creating any missing group along the way.
///
/// The new entry holds a single "Title" field set to the last segment.
///
/// # Errors
/// - `InvalidPath` for paths with fewer than two segments
/// - `DuplicateEntry` if the target group already holds that title
pub fn create_entry<'t>(tree: &'t mut Tree, path: &str) -> Result<&'t mut Entry> {
    let path = EntryPath::parse(path)?;

    let mut segments = path.groups().iter();
    let first = segments
        .next()
        .ok_or_else(|| Error::invalid_path(path.to_string(), "no group segment"))?;
    let mut group = child_or_create(tree.groups_mut(), first);
    for segment in segments {
        group = child_or_create(group.groups_mut(), segment);
    }

    if group.entries().iter().any(|e| e.title() == path.title()) {
        return Err(Error::DuplicateEntry {
            title: path.title().to_string(),
            path: path.to_string(),
        });
    }

    let index = group.entries().len();
    group.add_entry(Entry::new(path.title()));
    debug!(path = %path, "Entry created");
    Ok(&mut group.entries_mut()[index])
}

/// Append a new entry titled `title` to the group with `group_id`.
///
/// Addressing by identifier does not go through titles, so no duplicate
/// check is made here.
pub fn create_entry_in<'t>(
    tree: &'t mut Tree,
    group_id: GroupId,
    title: &str,
) -> Result<&'t mut Entry> {
    let group = find_group_by_id_mut(tree, group_id).ok_or_else(|| Error::GroupNotFound {
        segment: group_id.to_hex(),
        path: group_id.to_hex(),
    })?;

    let index = group.entries().len();
    group.add_entry(Entry::new(title));
    Ok(&mut group.entries_mut()[index])
}

/// Set or remove a field.
///
/// An existing field keeps its protection flag and only has its value
/// replaced; a new field gets `protected`. `None` removes the field.
pub fn set_field(entry: &mut Entry, key: &str, value: Option<&str>, protected: bool) {
    let fields = entry.fields_mut();
    let position = fields.iter().position(|f| f.key == key);

    match (position, value) {
        (Some(index), Some(value)) => fields[index].value = value.to_string(),
        (Some(index), None) => {
            fields.remove(index);
        }
        (None, Some(value)) => fields.push(Field {
            key: key.to_string(),
            value: value.to_string(),
            protected,
        }),
        (None, None) => return,
    }

    entry.touch();
}

/// Set an attachment's content, creating it if missing.
pub fn set_attachment(entry: &mut Entry, name: &str, content: Vec<u8>) {
    let attachments = entry.attachments_mut();
    match attachments.iter_mut().find(|a| a.name == name) {
        Some(existing) => existing.content = content,
        None => attachments.push(Attachment::new(name, content)),
    }
    entry.touch();
}

/// Remove an attachment, returning it if it existed.
pub fn remove_attachment(entry: &mut Entry, name: &str) -> Option<Attachment> {
    let attachments = entry.attachments_mut();
    let index = attachments.iter().position(|a| a.name == name)?;
    let removed = attachments.remove(index);
    entry.touch();
    Some(removed)
}

/// An SSH key held on an entry for an SSH agent to pick up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SshKey {
    /// OpenSSH private key text. `None` when the settings reference an
    /// attachment that is not there.
    pub private_key: Option<String>,
    pub settings: SshAgentSettings,
}

/// Store `key` on the entry as a private key attachment plus the agent
/// settings document pointing at it.
///
/// The key is always stored under [`PRIVATE_KEY_ATTACHMENT`], whatever
/// attachment name `key.settings` carries.
pub fn set_ssh_key(entry: &mut Entry, key: &SshKey) -> Result<()> {
    let settings = SshAgentSettings {
        private_key_attachment: PRIVATE_KEY_ATTACHMENT.to_string(),
        ..key.settings.clone()
    };
    let document = settings::encode(&settings)?;

    set_attachment(entry, SETTINGS_ATTACHMENT, document);
    match &key.private_key {
        Some(private_key) => {
            set_attachment(entry, PRIVATE_KEY_ATTACHMENT, private_key.as_bytes().to_vec())
        }
        None => {
            remove_attachment(entry, PRIVATE_KEY_ATTACHMENT);
        }
    }
    Ok(())
}

/// Remove the SSH key attachments from the entry.
pub fn clear_ssh_key(entry: &mut Entry) {
    remove_attachment(entry, SETTINGS_ATTACHMENT);
    remove_attachment(entry, PRIVATE_KEY_ATTACHMENT);
}

/// Read the SSH key stored on the entry.
///
/// An unreadable settings attachment counts as no key at all.
pub fn ssh_key(entry: &Entry) -> Option<SshKey> {
    let document = entry.attachment(SETTINGS_ATTACHMENT)?;
    let settings = settings::decode(&document.content)?;
    let private_key = entry
        .attachment(&settings.private_key_attachment)
        .map(|a| String::from_utf8_lossy(&a.content).into_owned());

    Some(SshKey {
        private_key,
        settings,
    })
}

/// Delete the entry at `path`.
///
/// A missing group chain means the entry is already gone: `Ok(None)`.
/// Order of the remaining entries is not preserved.
///
/// # Errors
/// - `InvalidPath` for paths with fewer than two segments
/// - `EntryNotFound` if the group exists but holds no such title
pub fn delete_entry(tree: &mut Tree, path: &str) -> Result<Option<Entry>> {
    let path = EntryPath::parse(path)?;

    let group = match find_group_mut(tree, &path) {
        Ok(group) => group,
        Err(Error::GroupNotFound { segment, .. }) => {
            debug!(path = %path, segment = %segment, "Group chain absent, nothing to delete");
            return Ok(None);
        }
        Err(other) => return Err(other),
    };

    let index = group
        .entries()
        .iter()
        .position(|e| e.title() == path.title())
        .ok_or_else(|| path.entry_not_found())?;

    let removed = group.entries_mut().swap_remove(index);
    group.touch();
    debug!(path = %path, entry_id = %removed.id(), "Entry deleted");
    Ok(Some(removed))
}

/// Delete an entry by identifiers.
///
/// # Errors
/// - `GroupNotFound` / `EntryNotFound` if either id is unknown
pub fn delete_entry_by_id(tree: &mut Tree, group_id: GroupId, entry_id: EntryId) -> Result<Entry> {
    let group = find_group_by_id_mut(tree, group_id).ok_or_else(|| Error::GroupNotFound {
        segment: group_id.to_hex(),
        path: format!("{}/{}", group_id, entry_id),
    })?;

    let index = group
        .entries()
        .iter()
        .position(|e| e.id() == entry_id)
        .ok_or_else(|| Error::EntryNotFound {
            title: entry_id.to_hex(),
            path: format!("{}/{}", group_id, entry_id),
        })?;

    let removed = group.entries_mut().swap_remove(index);
    group.touch();
    Ok(removed)
}
