//! Path and identifier resolution over a [`Tree`].
//!
//! Paths look like `Root/child1/child2/secret`: every segment but the last
//! names a group, starting from the top-level groups; the last names an entry
//! by title. Lookups take the first sibling whose name matches. Same-named
//! siblings are not an error, the later ones are simply unreachable by path
//! (they stay reachable by identifier).

use std::fmt;

use keytree_common::{EntryId, Error, GroupId, Result};

use crate::tree::{Entry, Group, Tree};

/// A parsed entry path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPath {
    groups: Vec<String>,
    title: String,
}

impl EntryPath {
    /// Parse a slash-delimited path.
    ///
    /// A single leading `/` is ignored. At least one group segment and the
    /// entry title must remain.
    ///
    /// # Errors
    /// - `InvalidPath` if fewer than two segments remain
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.first() == Some(&"") {
            segments.remove(0);
        }
        if segments.len() < 2 {
            return Err(Error::invalid_path(
                path,
                "an entry path needs at least one group and a title",
            ));
        }

        let title = segments.pop().unwrap_or_default().to_string();
        Ok(Self {
            groups: segments.into_iter().map(String::from).collect(),
            title,
        })
    }

    /// Group segments, outermost first.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Entry title (last segment).
    pub fn title(&self) -> &str {
        &self.title
    }

    pub(crate) fn group_not_found(&self, segment: &str) -> Error {
        Error::GroupNotFound {
            segment: segment.to_string(),
            path: self.to_string(),
        }
    }

    pub(crate) fn entry_not_found(&self) -> Error {
        Error::EntryNotFound {
            title: self.title.clone(),
            path: self.to_string(),
        }
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.groups.join("/"), self.title)
    }
}

/// Disambiguates entries sharing a title: the entry's value for `key` must
/// equal `value` exactly. An absent field reads as the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub key: String,
    pub value: String,
}

impl Matcher {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        entry.content(&self.key) == self.value
    }
}

/// An entry together with the group that directly holds it.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'t> {
    pub group: &'t Group,
    pub entry: &'t Entry,
}

/// Resolve the group chain of `path`.
pub fn find_group<'t>(tree: &'t Tree, path: &EntryPath) -> Result<&'t Group> {
    let mut segments = path.groups().iter();
    let first = segments
        .next()
        .ok_or_else(|| Error::invalid_path(path.to_string(), "no group segment"))?;
    let mut group = tree.child(first).ok_or_else(|| path.group_not_found(first))?;

    for segment in segments {
        group = group
            .child(segment)
            .ok_or_else(|| path.group_not_found(segment))?;
    }

    Ok(group)
}

/// Mutable variant of [`find_group`].
pub fn find_group_mut<'t>(tree: &'t mut Tree, path: &EntryPath) -> Result<&'t mut Group> {
    let mut segments = path.groups().iter();
    let first = segments
        .next()
        .ok_or_else(|| Error::invalid_path(path.to_string(), "no group segment"))?;
    let mut group = tree
        .groups_mut()
        .iter_mut()
        .find(|g| g.name() == first.as_str())
        .ok_or_else(|| path.group_not_found(first))?;

    for segment in segments {
        group = group
            .groups_mut()
            .iter_mut()
            .find(|g| g.name() == segment.as_str())
            .ok_or_else(|| path.group_not_found(segment))?;
    }

    Ok(group)
}

fn entry_position(group: &Group, title: &str, matchers: &[Matcher]) -> Option<usize> {
    group
        .entries()
        .iter()
        .position(|e| e.title() == title && matchers.iter().all(|m| m.matches(e)))
}

/// Resolve `path` to an entry, filtering same-titled candidates with
/// `matchers`. The first qualifying entry in document order wins.
///
/// # Errors
/// - `InvalidPath` for paths with fewer than two segments
/// - `GroupNotFound` at the first missing group segment
/// - `EntryNotFound` if no entry qualifies
pub fn resolve<'t>(tree: &'t Tree, path: &str, matchers: &[Matcher]) -> Result<Resolved<'t>> {
    let path = EntryPath::parse(path)?;
    let group = find_group(tree, &path)?;
    let index =
        entry_position(group, path.title(), matchers).ok_or_else(|| path.entry_not_found())?;

    Ok(Resolved {
        group,
        entry: &group.entries()[index],
    })
}

/// Mutable variant of [`resolve`], returning the holding group's id.
pub fn resolve_mut<'t>(
    tree: &'t mut Tree,
    path: &str,
    matchers: &[Matcher],
) -> Result<(GroupId, &'t mut Entry)> {
    let path = EntryPath::parse(path)?;
    let group = find_group_mut(tree, &path)?;
    let index =
        entry_position(group, path.title(), matchers).ok_or_else(|| path.entry_not_found())?;

    Ok((group.id(), &mut group.entries_mut()[index]))
}

/// Depth-first search of the whole tree for a group id.
pub fn find_group_by_id(tree: &Tree, id: GroupId) -> Option<&Group> {
    tree.groups().iter().find_map(|g| find_group_in(g, id))
}

/// Depth-first search of the subtree rooted at `root` (inclusive).
pub fn find_group_in(root: &Group, id: GroupId) -> Option<&Group> {
    if root.id() == id {
        return Some(root);
    }
    root.groups().iter().find_map(|g| find_group_in(g, id))
}

/// Mutable variant of [`find_group_by_id`].
pub fn find_group_by_id_mut(tree: &mut Tree, id: GroupId) -> Option<&mut Group> {
    tree.groups_mut()
        .iter_mut()
        .find_map(|g| find_group_in_mut(g, id))
}

fn find_group_in_mut(root: &mut Group, id: GroupId) -> Option<&mut Group> {
    if root.id() == id {
        return Some(root);
    }
    root.groups_mut()
        .iter_mut()
        .find_map(|g| find_group_in_mut(g, id))
}

fn missing_group(group_id: GroupId, entry_id: EntryId) -> Error {
    Error::GroupNotFound {
        segment: group_id.to_hex(),
        path: format!("{}/{}", group_id, entry_id),
    }
}

fn missing_entry(group_id: GroupId, entry_id: EntryId) -> Error {
    Error::EntryNotFound {
        title: entry_id.to_hex(),
        path: format!("{}/{}", group_id, entry_id),
    }
}

/// Resolve an entry by identifiers. Stable across renames.
///
/// # Errors
/// - `GroupNotFound` if no group has `group_id`
/// - `EntryNotFound` if the group does not directly hold `entry_id`
pub fn resolve_by_id(tree: &Tree, group_id: GroupId, entry_id: EntryId) -> Result<Resolved<'_>> {
    let group = find_group_by_id(tree, group_id).ok_or_else(|| missing_group(group_id, entry_id))?;
    let entry = group
        .entry(entry_id)
        .ok_or_else(|| missing_entry(group_id, entry_id))?;

    Ok(Resolved { group, entry })
}

/// Mutable variant of [`resolve_by_id`].
pub fn resolve_by_id_mut(tree: &mut Tree, group_id: GroupId, entry_id: EntryId) -> Result<&mut Entry> {
    find_group_by_id_mut(tree, group_id)
        .ok_or_else(|| missing_group(group_id, entry_id))?
        .entry_mut(entry_id)
        .ok_or_else(|| missing_entry(group_id, entry_id))
}
