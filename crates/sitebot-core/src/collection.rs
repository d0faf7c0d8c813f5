//! The named tables the engine reads and writes.
//!
//! Content collections are what the public site renders; the two bookkeeping
//! tables (`content_history`, `pending_actions`) belong to the engine itself.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    SiteContent,
    TeamMembers,
    GalleryImages,
    Programs,
    Events,
    Stats,
    Initiatives,
    ContentHistory,
    PendingActions,
}

impl Collection {
    /// Collections reported by the status action, in display order.
    pub const STATUS: [Collection; 7] = [
        Collection::SiteContent,
        Collection::TeamMembers,
        Collection::GalleryImages,
        Collection::Programs,
        Collection::Events,
        Collection::Stats,
        Collection::Initiatives,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Collection::SiteContent => "site_content",
            Collection::TeamMembers => "team_members",
            Collection::GalleryImages => "gallery_images",
            Collection::Programs => "programs",
            Collection::Events => "events",
            Collection::Stats => "stats",
            Collection::Initiatives => "initiatives",
            Collection::ContentHistory => "content_history",
            Collection::PendingActions => "pending_actions",
        }
    }

    /// Collections whose rows carry a `sort_order` assigned on insert.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Collection::TeamMembers
                | Collection::GalleryImages
                | Collection::Programs
                | Collection::Events
                | Collection::Initiatives
        )
    }

    /// Repository path of the full-collection snapshot document.
    ///
    /// Only content collections are mirrored.
    pub fn snapshot_path(self) -> Option<String> {
        match self {
            Collection::ContentHistory | Collection::PendingActions => None,
            other => Some(format!("content/{}.json", other.table())),
        }
    }

    pub fn from_table(table: &str) -> Option<Collection> {
        Collection::STATUS
            .into_iter()
            .chain([Collection::ContentHistory, Collection::PendingActions])
            .find(|c| c.table() == table)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_tables_are_not_mirrored() {
        assert_eq!(Collection::ContentHistory.snapshot_path(), None);
        assert_eq!(Collection::PendingActions.snapshot_path(), None);
        assert_eq!(
            Collection::Events.snapshot_path().as_deref(),
            Some("content/events.json")
        );
    }

    #[test]
    fn stats_and_site_content_are_unordered() {
        assert!(!Collection::Stats.is_ordered());
        assert!(!Collection::SiteContent.is_ordered());
        assert!(Collection::TeamMembers.is_ordered());
    }

    #[test]
    fn from_table_finds_every_collection() {
        for c in Collection::STATUS {
            assert_eq!(Collection::from_table(c.table()), Some(c));
        }
        assert_eq!(
            Collection::from_table("pending_actions"),
            Some(Collection::PendingActions)
        );
        assert_eq!(Collection::from_table("nope"), None);
    }
}
