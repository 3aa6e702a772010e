//! SSH agent settings attachment.
//!
//! Agents such as KeeAgent look for a `KeeAgent.settings` attachment holding
//! a small XML document that says which attachment carries the private key
//! and how the key should be loaded. The document is stored as UTF-16LE with
//! a byte order mark and declares `encoding="UTF-16"`.
//!
//! Example document:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-16"?>
//! <EntrySettings>
//!   <AllowUseOfSshKey>true</AllowUseOfSshKey>
//!   <AddAtDatabaseOpen>true</AddAtDatabaseOpen>
//!   <RemoveAtDatabaseClose>true</RemoveAtDatabaseClose>
//!   <UseConfirmConstraintWhenAdding>false</UseConfirmConstraintWhenAdding>
//!   <UseLifetimeConstraintWhenAdding>false</UseLifetimeConstraintWhenAdding>
//!   <LifetimeConstraintDuration>1800</LifetimeConstraintDuration>
//!   <Location>
//!     <SelectedType>attachment</SelectedType>
//!     <AttachmentName>id_rsa</AttachmentName>
//!     <SaveAttachmentToTempFile>false</SaveAttachmentToTempFile>
//!     <FileName/>
//!   </Location>
//! </EntrySettings>
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use keytree_common::{Error, Result};

/// Attachment name of the settings document.
pub const SETTINGS_ATTACHMENT: &str = "KeeAgent.settings";

/// Attachment name the private key is stored under.
pub const PRIVATE_KEY_ATTACHMENT: &str = "id_rsa";

const DECLARED_UTF16: &str = r#"encoding="UTF-16""#;
const DECLARED_UTF8: &str = r#"encoding="UTF-8""#;
const BOM: [u8; 2] = [0xFF, 0xFE];

/// How an SSH agent should handle the key stored on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshAgentSettings {
    /// Name of the attachment holding the private key.
    pub private_key_attachment: String,
    pub add_at_database_open: bool,
    pub remove_at_database_close: bool,
    pub use_confirm_constraint: bool,
    pub use_lifetime_constraint: bool,
    /// Seconds after which the agent drops the key, when the lifetime
    /// constraint is on.
    pub lifetime_seconds: u32,
}

impl Default for SshAgentSettings {
    fn default() -> Self {
        Self {
            private_key_attachment: PRIVATE_KEY_ATTACHMENT.to_string(),
            add_at_database_open: false,
            remove_at_database_close: true,
            use_confirm_constraint: false,
            use_lifetime_constraint: false,
            lifetime_seconds: 600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "EntrySettings", rename_all = "PascalCase")]
struct EntrySettingsDocument {
    #[serde(default = "enabled")]
    allow_use_of_ssh_key: bool,
    add_at_database_open: bool,
    remove_at_database_close: bool,
    use_confirm_constraint_when_adding: bool,
    use_lifetime_constraint_when_adding: bool,
    lifetime_constraint_duration: u32,
    location: LocationDocument,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LocationDocument {
    selected_type: String,
    attachment_name: String,
    #[serde(default)]
    save_attachment_to_temp_file: bool,
    #[serde(default)]
    file_name: String,
}

fn enabled() -> bool {
    true
}

impl From<&SshAgentSettings> for EntrySettingsDocument {
    fn from(settings: &SshAgentSettings) -> Self {
        Self {
            allow_use_of_ssh_key: true,
            add_at_database_open: settings.add_at_database_open,
            remove_at_database_close: settings.remove_at_database_close,
            use_confirm_constraint_when_adding: settings.use_confirm_constraint,
            use_lifetime_constraint_when_adding: settings.use_lifetime_constraint,
            lifetime_constraint_duration: settings.lifetime_seconds,
            location: LocationDocument {
                selected_type: "attachment".to_string(),
                attachment_name: settings.private_key_attachment.clone(),
                save_attachment_to_temp_file: false,
                file_name: String::new(),
            },
        }
    }
}

impl From<EntrySettingsDocument> for SshAgentSettings {
    fn from(document: EntrySettingsDocument) -> Self {
        Self {
            private_key_attachment: document.location.attachment_name,
            add_at_database_open: document.add_at_database_open,
            remove_at_database_close: document.remove_at_database_close,
            use_confirm_constraint: document.use_confirm_constraint_when_adding,
            use_lifetime_constraint: document.use_lifetime_constraint_when_adding,
            lifetime_seconds: document.lifetime_constraint_duration,
        }
    }
}

/// Render settings as attachment content (UTF-16LE with BOM).
///
/// # Errors
/// - `Encode` if the document cannot be serialized
pub fn encode(settings: &SshAgentSettings) -> Result<Vec<u8>> {
    let document = EntrySettingsDocument::from(settings);

    let mut xml = format!("<?xml version=\"1.0\" {}?>\n", DECLARED_UTF16);
    let mut serializer = quick_xml::se::Serializer::new(&mut xml);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| Error::Encode(format!("SSH agent settings: {}", e)))?;

    let mut bytes = Vec::with_capacity(BOM.len() + xml.len() * 2);
    bytes.extend_from_slice(&BOM);
    for unit in xml.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(bytes)
}

fn utf16le_to_string(bytes: &[u8]) -> Option<String> {
    let body = bytes.strip_prefix(&BOM).unwrap_or(bytes);
    if body.len() % 2 != 0 {
        return None;
    }

    let units = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
}

/// Parse attachment content back into settings.
///
/// Returns `None` for anything that is not a well-formed settings document;
/// other tools may leave attachments under the same name.
pub fn decode(bytes: &[u8]) -> Option<SshAgentSettings> {
    let Some(text) = utf16le_to_string(bytes) else {
        warn!(len = bytes.len(), "SSH agent settings are not valid UTF-16LE");
        return None;
    };

    // The text is now UTF-8; the declaration must agree before parsing.
    let text = text.replace(DECLARED_UTF16, DECLARED_UTF8);

    match quick_xml::de::from_str::<EntrySettingsDocument>(&text) {
        Ok(document) => Some(document.into()),
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable SSH agent settings");
            None
        }
    }
}
