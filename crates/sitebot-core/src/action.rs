//! Structured content actions.
//!
//! An `Action` is what the interpreter produces from an operator's message and
//! what the dispatcher applies to the store. The wire form is a JSON object
//! discriminated by its `action` field, e.g.
//! `{"action": "update_stat", "label": "Volunteers", "value": 120}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;
use crate::error::{Result, SiteError};

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    UpdateSection {
        section: String,
        content: Value,
    },
    UpdateSectionField {
        section: String,
        field: String,
        value: Value,
    },
    AddTeamMember {
        name: String,
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    UpdateTeamMember {
        name: String,
        updates: Fields,
    },
    RemoveTeamMember {
        name: String,
    },
    AddGalleryImage {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    RemoveGalleryImage {
        caption: String,
    },
    AddProgram {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tags: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_alt: Option<String>,
    },
    UpdateProgram {
        title: String,
        updates: Fields,
    },
    RemoveProgram {
        title: String,
    },
    AddEvent {
        event: Fields,
    },
    UpdateEvent {
        slug: String,
        updates: Fields,
    },
    UpdateStat {
        label: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
    },
    AddInitiative {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    RemoveInitiative {
        title: String,
    },
    Undo,
    GetStatus,
}

/// Every tag the dispatcher understands.
pub const KNOWN_TAGS: [&str; 17] = [
    "update_section",
    "update_section_field",
    "add_team_member",
    "update_team_member",
    "remove_team_member",
    "add_gallery_image",
    "remove_gallery_image",
    "add_program",
    "update_program",
    "remove_program",
    "add_event",
    "update_event",
    "update_stat",
    "add_initiative",
    "remove_initiative",
    "undo",
    "get_status",
];

impl Action {
    /// Parse an untyped action object.
    ///
    /// An unrecognised tag yields `UnknownAction` naming it; a recognised tag
    /// with the wrong shape yields `InvalidAction`.
    pub fn from_value(value: Value) -> Result<Action> {
        let tag = match value.get("action") {
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => return Err(SiteError::UnknownAction(other.to_string())),
            None => {
                return Err(SiteError::InvalidAction {
                    action: String::new(),
                    reason: "missing 'action' field".into(),
                })
            }
        };
        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Err(SiteError::UnknownAction(tag));
        }
        serde_json::from_value(value).map_err(|e| SiteError::InvalidAction {
            action: tag,
            reason: e.to_string(),
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Action::UpdateSection { .. } => "update_section",
            Action::UpdateSectionField { .. } => "update_section_field",
            Action::AddTeamMember { .. } => "add_team_member",
            Action::UpdateTeamMember { .. } => "update_team_member",
            Action::RemoveTeamMember { .. } => "remove_team_member",
            Action::AddGalleryImage { .. } => "add_gallery_image",
            Action::RemoveGalleryImage { .. } => "remove_gallery_image",
            Action::AddProgram { .. } => "add_program",
            Action::UpdateProgram { .. } => "update_program",
            Action::RemoveProgram { .. } => "remove_program",
            Action::AddEvent { .. } => "add_event",
            Action::UpdateEvent { .. } => "update_event",
            Action::UpdateStat { .. } => "update_stat",
            Action::AddInitiative { .. } => "add_initiative",
            Action::RemoveInitiative { .. } => "remove_initiative",
            Action::Undo => "undo",
            Action::GetStatus => "get_status",
        }
    }

    /// True for every action that may change stored content.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::GetStatus)
    }

    /// The content collection snapshotted after this action succeeds.
    ///
    /// `undo` and `get_status` have no fixed collection and are not mirrored.
    pub fn mirrored_collection(&self) -> Option<Collection> {
        match self {
            Action::UpdateSection { .. } | Action::UpdateSectionField { .. } => {
                Some(Collection::SiteContent)
            }
            Action::AddTeamMember { .. }
            | Action::UpdateTeamMember { .. }
            | Action::RemoveTeamMember { .. } => Some(Collection::TeamMembers),
            Action::AddGalleryImage { .. } | Action::RemoveGalleryImage { .. } => {
                Some(Collection::GalleryImages)
            }
            Action::AddProgram { .. }
            | Action::UpdateProgram { .. }
            | Action::RemoveProgram { .. } => Some(Collection::Programs),
            Action::AddEvent { .. } | Action::UpdateEvent { .. } => Some(Collection::Events),
            Action::UpdateStat { .. } => Some(Collection::Stats),
            Action::AddInitiative { .. } | Action::RemoveInitiative { .. } => {
                Some(Collection::Initiatives)
            }
            Action::Undo | Action::GetStatus => None,
        }
    }

    /// Distinguishing fields in commit-message priority order:
    /// section, field, name, title, slug, label.
    pub fn label_fields(&self) -> Vec<&str> {
        match self {
            Action::UpdateSection { section, .. } => vec![section.as_str()],
            Action::UpdateSectionField { section, field, .. } => {
                vec![section.as_str(), field.as_str()]
            }
            Action::AddTeamMember { name, .. }
            | Action::UpdateTeamMember { name, .. }
            | Action::RemoveTeamMember { name } => vec![name.as_str()],
            Action::AddProgram { title, .. }
            | Action::UpdateProgram { title, .. }
            | Action::RemoveProgram { title }
            | Action::AddInitiative { title, .. }
            | Action::RemoveInitiative { title } => vec![title.as_str()],
            // The stored slug is derived from the title at insert time, so a
            // slug in the payload is never part of the message.
            Action::AddEvent { event } => event
                .get("title")
                .and_then(Value::as_str)
                .into_iter()
                .collect(),
            Action::UpdateEvent { slug, .. } => vec![slug.as_str()],
            Action::UpdateStat { label, .. } => vec![label.as_str()],
            Action::AddGalleryImage { .. }
            | Action::RemoveGalleryImage { .. }
            | Action::Undo
            | Action::GetStatus => Vec::new(),
        }
    }

    /// Commit message for the snapshot mirrored after this action.
    pub fn commit_message(&self) -> String {
        let fields = self.label_fields();
        if fields.is_empty() {
            format!("sitebot: {}", self.tag())
        } else {
            format!("sitebot: {} {}", self.tag(), fields.join(" / "))
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
