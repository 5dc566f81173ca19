//! Per-client synchronization engine and presence tracker.
//!
//! [`EditorSession`] is the single owned state object for one editing
//! session: the document, the field locks of *other* participants, and
//! the online roster. All mutation funnels through [`EditorSession::apply_local`]
//! and [`EditorSession::apply_remote`] — transport callbacks never touch
//! state directly.
//!
//! Conflict policy is last-writer-wins per field: the most recently
//! received remote update overwrites local content with no timestamp
//! comparison and no merge. Events are never acknowledged or retried;
//! a lost message only means eventual divergence, never an error.

use std::collections::{BTreeSet, HashMap};

use crate::document::{Category, SwotDocument};
use crate::protocol::{user_color, ChangeEvent, EditStatus};

/// Address of a field: category plus position within its sequence.
///
/// Position-keyed, not identity-keyed — inserting or deleting an item
/// shifts indices and can leave an in-flight lock pointing at a
/// different field. Known structural weakness, kept for wire
/// compatibility with the existing front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub category: Category,
    pub index: usize,
}

impl FieldKey {
    pub fn new(category: Category, index: usize) -> Self {
        Self { category, index }
    }
}

/// The participant currently occupying a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    pub username: String,
    pub color: String,
}

/// Outcome of [`EditorSession::apply_remote`], so callers and tests can
/// observe whether an event changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Local state was mutated.
    Applied,
    /// Echo, no-op, or out-of-range — state untouched.
    Ignored,
}

/// One client's view of a collaborative editing session.
pub struct EditorSession {
    username: String,
    document: SwotDocument,
    /// Field locks of other participants. At most one per key; a later
    /// "start" from a different participant silently replaces the
    /// earlier one. Never contains an entry for the local user.
    locks: HashMap<FieldKey, Editor>,
    /// Usernames currently announced online, local user excluded.
    online: BTreeSet<String>,
}

impl EditorSession {
    /// Open a session over an existing or freshly templated document.
    pub fn new(username: impl Into<String>, document: SwotDocument) -> Self {
        Self {
            username: username.into(),
            document,
            locks: HashMap::new(),
            online: BTreeSet::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn document(&self) -> &SwotDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut SwotDocument {
        &mut self.document
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Apply a local edit immediately and unconditionally, then hand the
    /// event back for the transport channel to send.
    pub fn apply_local(&mut self, event: ChangeEvent) -> ChangeEvent {
        match &event {
            ChangeEvent::UpdateTitle { title, .. } => {
                self.document.title = title.clone();
            }
            ChangeEvent::UpdateItem { category, index, content, .. } => {
                if !self.document.set_content(*category, *index, content) {
                    log::debug!("local edit at {category}[{index}] out of range, ignored");
                }
            }
            // Presence is handled by start_editing/stop_editing; other
            // kinds carry no local document state.
            _ => {}
        }
        event
    }

    /// Edit the title; returns the event to send.
    pub fn edit_title(&mut self, title: impl Into<String>) -> ChangeEvent {
        self.apply_local(ChangeEvent::UpdateTitle {
            title: title.into(),
            username: self.username.clone(),
        })
    }

    /// Edit an item's content; returns the event to send.
    pub fn edit_item(
        &mut self,
        category: Category,
        index: usize,
        content: impl Into<String>,
    ) -> ChangeEvent {
        self.apply_local(ChangeEvent::UpdateItem {
            category,
            index,
            content: content.into(),
            username: self.username.clone(),
        })
    }

    // ── Presence tracker facade ──────────────────────────────────

    /// Announce that the local user focused a field.
    ///
    /// No local lock entry is created for the acting participant — the
    /// "who is editing" indicator only ever shows other users.
    pub fn start_editing(&self, category: Category, index: usize) -> ChangeEvent {
        ChangeEvent::EditingField {
            category,
            index,
            username: self.username.clone(),
            status: EditStatus::Start,
            color: Some(user_color(&self.username).to_string()),
        }
    }

    /// Announce that the local user left a field.
    pub fn stop_editing(&self, category: Category, index: usize) -> ChangeEvent {
        ChangeEvent::EditingField {
            category,
            index,
            username: self.username.clone(),
            status: EditStatus::Stop,
            color: None,
        }
    }

    // ── Remote events ────────────────────────────────────────────

    /// Apply one received event.
    ///
    /// Events stamped with the local username are discarded (echo
    /// suppression) before anything else. Item updates whose index is
    /// out of range for the current local sequence are dropped.
    pub fn apply_remote(&mut self, event: &ChangeEvent) -> Applied {
        if event.username() == self.username {
            return Applied::Ignored;
        }

        match event {
            ChangeEvent::UpdateTitle { title, .. } => {
                if *title != self.document.title {
                    self.document.title = title.clone();
                    Applied::Applied
                } else {
                    Applied::Ignored
                }
            }

            ChangeEvent::UpdateItem { category, index, content, .. } => {
                match self.document.content_at(*category, *index) {
                    Some(current) if current == content => Applied::Ignored,
                    Some(_) => {
                        self.document.set_content(*category, *index, content);
                        Applied::Applied
                    }
                    None => {
                        log::debug!(
                            "dropping update for {category}[{index}]: index out of range"
                        );
                        Applied::Ignored
                    }
                }
            }

            ChangeEvent::EditingField { category, index, username, status, color } => {
                let key = FieldKey::new(*category, *index);
                match status {
                    EditStatus::Start => {
                        let color = color
                            .clone()
                            .unwrap_or_else(|| user_color(username).to_string());
                        let editor = Editor { username: username.clone(), color };
                        if self.locks.get(&key) == Some(&editor) {
                            Applied::Ignored
                        } else {
                            self.locks.insert(key, editor);
                            Applied::Applied
                        }
                    }
                    EditStatus::Stop => {
                        if self.locks.remove(&key).is_some() {
                            Applied::Applied
                        } else {
                            // Stop for a field nobody held.
                            Applied::Ignored
                        }
                    }
                }
            }

            ChangeEvent::Online { username } => {
                if self.online.insert(username.clone()) {
                    log::info!("{username} is online");
                    Applied::Applied
                } else {
                    Applied::Ignored
                }
            }

            ChangeEvent::Offline { username } => {
                if self.online.remove(username) {
                    log::info!("{username} went offline");
                    Applied::Applied
                } else {
                    Applied::Ignored
                }
            }
        }
    }

    // ── Read accessors ───────────────────────────────────────────

    /// Who holds the lock on a field, if anyone.
    pub fn lock_on(&self, category: Category, index: usize) -> Option<&Editor> {
        self.locks.get(&FieldKey::new(category, index))
    }

    pub fn locks(&self) -> &HashMap<FieldKey, Editor> {
        &self.locks
    }

    /// Other participants currently announced online.
    pub fn online_users(&self) -> impl Iterator<Item = &str> {
        self.online.iter().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SwotDocument;

    fn session(name: &str) -> EditorSession {
        EditorSession::new(name, SwotDocument::template(1))
    }

    #[test]
    fn test_echo_suppression_leaves_state_unchanged() {
        let mut s = session("alice");
        s.edit_item(Category::Strength, 0, "mine");

        let echo = ChangeEvent::UpdateItem {
            category: Category::Strength,
            index: 0,
            content: "overwritten".into(),
            username: "alice".into(),
        };
        assert_eq!(s.apply_remote(&echo), Applied::Ignored);
        assert_eq!(s.document().content_at(Category::Strength, 0), Some("mine"));

        // Presence echoes never create a self lock either.
        let presence_echo = ChangeEvent::EditingField {
            category: Category::Strength,
            index: 0,
            username: "alice".into(),
            status: EditStatus::Start,
            color: None,
        };
        assert_eq!(s.apply_remote(&presence_echo), Applied::Ignored);
        assert!(s.locks().is_empty());
    }

    #[test]
    fn test_item_update_last_writer_wins() {
        let mut s = session("carol");
        let a = ChangeEvent::UpdateItem {
            category: Category::Weakness,
            index: 0,
            content: "first".into(),
            username: "alice".into(),
        };
        let b = ChangeEvent::UpdateItem {
            category: Category::Weakness,
            index: 0,
            content: "second".into(),
            username: "bob".into(),
        };
        assert_eq!(s.apply_remote(&a), Applied::Applied);
        assert_eq!(s.apply_remote(&b), Applied::Applied);
        assert_eq!(s.document().content_at(Category::Weakness, 0), Some("second"));
    }

    #[test]
    fn test_title_overwrites_only_when_different() {
        let mut s = session("carol");
        let update = ChangeEvent::UpdateTitle { title: "Q3".into(), username: "alice".into() };
        assert_eq!(s.apply_remote(&update), Applied::Applied);
        assert_eq!(s.document().title, "Q3");
        // Identical title is a no-op.
        assert_eq!(s.apply_remote(&update), Applied::Ignored);
    }

    #[test]
    fn test_out_of_range_item_update_dropped() {
        let mut s = session("carol");
        let update = ChangeEvent::UpdateItem {
            category: Category::Threat,
            index: 7,
            content: "ghost".into(),
            username: "alice".into(),
        };
        assert_eq!(s.apply_remote(&update), Applied::Ignored);
        assert_eq!(s.document().items(Category::Threat).len(), 1);
    }

    #[test]
    fn test_presence_exclusivity_later_start_wins() {
        let mut s = session("carol");
        let start = |who: &str| ChangeEvent::EditingField {
            category: Category::Opportunity,
            index: 0,
            username: who.into(),
            status: EditStatus::Start,
            color: None,
        };
        s.apply_remote(&start("alice"));
        s.apply_remote(&start("bob"));

        assert_eq!(s.locks().len(), 1);
        let editor = s.lock_on(Category::Opportunity, 0).unwrap();
        assert_eq!(editor.username, "bob");
        assert_eq!(editor.color, user_color("bob"));
    }

    #[test]
    fn test_presence_stop_removes_lock() {
        let mut s = session("carol");
        s.apply_remote(&ChangeEvent::EditingField {
            category: Category::Strength,
            index: 0,
            username: "alice".into(),
            status: EditStatus::Start,
            color: Some("#33C3FF".into()),
        });
        assert_eq!(s.lock_on(Category::Strength, 0).unwrap().color, "#33C3FF");

        s.apply_remote(&ChangeEvent::EditingField {
            category: Category::Strength,
            index: 0,
            username: "alice".into(),
            status: EditStatus::Stop,
            color: None,
        });
        assert!(s.lock_on(Category::Strength, 0).is_none());
    }

    #[test]
    fn test_start_editing_creates_no_self_lock() {
        let s = session("alice");
        let event = s.start_editing(Category::Weakness, 0);
        match &event {
            ChangeEvent::EditingField { username, status, color, .. } => {
                assert_eq!(username, "alice");
                assert_eq!(*status, EditStatus::Start);
                assert_eq!(color.as_deref(), Some(user_color("alice")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(s.locks().is_empty());

        let stop = s.stop_editing(Category::Weakness, 0);
        assert!(matches!(stop, ChangeEvent::EditingField { status: EditStatus::Stop, .. }));
    }

    #[test]
    fn test_local_edit_applies_immediately() {
        let mut s = session("alice");
        let event = s.edit_title("Market entry");
        assert_eq!(s.document().title, "Market entry");
        assert_eq!(event.username(), "alice");

        s.edit_item(Category::Opportunity, 0, "new market");
        assert_eq!(s.document().content_at(Category::Opportunity, 0), Some("new market"));
    }

    #[test]
    fn test_online_offline_roster() {
        let mut s = session("carol");
        s.apply_remote(&ChangeEvent::Online { username: "alice".into() });
        s.apply_remote(&ChangeEvent::Online { username: "bob".into() });
        assert_eq!(s.online_users().collect::<Vec<_>>(), vec!["alice", "bob"]);

        s.apply_remote(&ChangeEvent::Offline { username: "alice".into() });
        assert_eq!(s.online_users().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[test]
    fn test_no_op_presence_events_report_ignored() {
        let mut s = session("carol");

        // Stop for a field nobody holds changes nothing.
        let stray_stop = ChangeEvent::EditingField {
            category: Category::Threat,
            index: 0,
            username: "alice".into(),
            status: EditStatus::Stop,
            color: None,
        };
        assert_eq!(s.apply_remote(&stray_stop), Applied::Ignored);

        // A repeated identical start leaves the lock as it was.
        let start = ChangeEvent::EditingField {
            category: Category::Threat,
            index: 0,
            username: "alice".into(),
            status: EditStatus::Start,
            color: None,
        };
        assert_eq!(s.apply_remote(&start), Applied::Applied);
        assert_eq!(s.apply_remote(&start), Applied::Ignored);

        // Duplicate announcements don't re-mutate the roster.
        let online = ChangeEvent::Online { username: "alice".into() };
        assert_eq!(s.apply_remote(&online), Applied::Applied);
        assert_eq!(s.apply_remote(&online), Applied::Ignored);

        let offline = ChangeEvent::Offline { username: "alice".into() };
        assert_eq!(s.apply_remote(&offline), Applied::Applied);
        assert_eq!(s.apply_remote(&offline), Applied::Ignored);
    }

    #[test]
    fn test_lock_survives_structural_edit_unmoved() {
        // Position-keyed locks are not re-keyed when items shift.
        let mut s = session("carol");
        s.apply_remote(&ChangeEvent::EditingField {
            category: Category::Strength,
            index: 1,
            username: "alice".into(),
            status: EditStatus::Start,
            color: None,
        });
        s.document_mut().add_item(Category::Strength);
        s.document_mut().remove_item(Category::Strength, 0);
        // The lock still points at index 1 even though items shifted.
        assert!(s.lock_on(Category::Strength, 1).is_some());
    }
}
