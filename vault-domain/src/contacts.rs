//! Per-user `ContactList` (§3): cross-contacts materialize implicitly
//! whenever an album is shared between two users.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::delete::DeleteEvent;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Contact {
    pub user_id: i64,
    pub email: String,
    pub public_key: [u8; 32],
    pub date_modified: i64,
}

/// Stored at `home/{userID}/contacts`. `contacts` is keyed by the other
/// user's id; `in` tracks which users list *this* user back, so a removal
/// can be mirrored on both sides without a second lookup.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ContactList {
    pub contacts: BTreeMap<i64, Contact>,
    #[serde(rename = "in")]
    pub listed_by: BTreeSet<i64>,
    pub deletes: Vec<DeleteEvent>,
}

impl ContactList {
    pub fn upsert(&mut self, contact: Contact) {
        self.contacts.insert(contact.user_id, contact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_existing_entry() {
        let mut list = ContactList::default();
        list.upsert(Contact {
            user_id: 2,
            email: "a@example.com".into(),
            public_key: [1; 32],
            date_modified: 10,
        });
        list.upsert(Contact {
            user_id: 2,
            email: "a@example.com".into(),
            public_key: [1; 32],
            date_modified: 20,
        });
        assert_eq!(list.contacts.len(), 1);
        assert_eq!(list.contacts[&2].date_modified, 20);
    }
}
