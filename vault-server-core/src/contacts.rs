//! Cross-contact materialization (§4.8: "sharing an album with someone adds
//! them as a mutual contact") and the lone standalone lookup endpoint,
//! `getContact`.

use vault_domain::{paths, Contact, ContactList, User};
use wire::{GetContactParams, GetContactParts};

use crate::encoding;
use crate::error::{Error, Result};
use crate::ServerCore;

fn load_user(core: &ServerCore, user_id: i64) -> Result<User> {
    let (user, _) = core.storage.read_data_file::<User>(&paths::user(user_id))?;
    if user.user_id != user_id {
        return Err(Error::UserNotFound);
    }
    Ok(user)
}

/// Adds `a` and `b` to each other's contact list, keyed by each other's
/// `userID`. Called by [`crate::share::share_album`] rather than exposed on
/// the wire directly (§4.8 never lists a standalone "add contact" endpoint).
pub fn materialize_mutual_contact(core: &ServerCore, a: i64, b: i64) -> Result<()> {
    if a == b {
        return Ok(());
    }
    let user_a = load_user(core, a)?;
    let user_b = load_user(core, b)?;
    let now = core.clock.now_millis();

    let names = vec![paths::contacts(a), paths::contacts(b)];
    let mut txn = core.storage.open_many_for_update::<ContactList>(&names)?;

    if let Some(list) = txn.values.get_mut(&paths::contacts(a)) {
        list.upsert(Contact {
            user_id: b,
            email: user_b.email.clone(),
            public_key: user_b.public_key,
            date_modified: now,
        });
        list.listed_by.insert(b);
    }
    if let Some(list) = txn.values.get_mut(&paths::contacts(b)) {
        list.upsert(Contact {
            user_id: a,
            email: user_a.email.clone(),
            public_key: user_a.public_key,
            date_modified: now,
        });
        list.listed_by.insert(a);
    }

    let next = txn.values.clone();
    txn.into_commit().commit(&next)?;
    Ok(())
}

pub fn get_contact(core: &ServerCore, req: &GetContactParams) -> Result<GetContactParts<'static>> {
    let (directory, _) = core.storage.read_data_file::<vault_domain::UserDirectory>(paths::DIRECTORY)?;
    let entry = directory.find(&req.email).ok_or(Error::UserNotFound)?;
    let user = load_user(core, entry.user_id)?;

    Ok(GetContactParts {
        contact: wire::ContactEntry {
            user_id: user.user_id,
            email: user.email.into(),
            public_key: encoding::encode(&user.public_key).into(),
            date_modified: core.clock.now_millis(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vault_blobstore::BlobStore;
    use vault_crypto::MasterKey;
    use vault_domain::UserDirectory;
    use vault_storage::Storage;

    fn core(dir: &TempDir) -> ServerCore {
        let storage = Storage::open(dir.path().join("meta"), MasterKey::generate()).unwrap();
        let blobs = BlobStore::open(dir.path().join("blobs"), storage.clone()).unwrap();
        ServerCore::with_system_clock(storage, blobs, 5000)
    }

    fn seed_user(core: &ServerCore, id: i64, email: &str) {
        core.storage
            .save_data_file(
                None,
                &paths::user(id),
                &User {
                    user_id: id,
                    email: email.to_string(),
                    public_key: [id as u8; 32],
                    ..Default::default()
                },
            )
            .unwrap();
        core.storage.create_empty_file::<ContactList>(&paths::contacts(id)).unwrap();
    }

    #[test]
    fn materialize_adds_each_user_to_the_other() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        seed_user(&core, 1, "a@example.com");
        seed_user(&core, 2, "b@example.com");

        materialize_mutual_contact(&core, 1, 2).unwrap();

        let (list_a, _) = core.storage.read_data_file::<ContactList>(&paths::contacts(1)).unwrap();
        let (list_b, _) = core.storage.read_data_file::<ContactList>(&paths::contacts(2)).unwrap();
        assert!(list_a.contacts.contains_key(&2));
        assert!(list_b.contacts.contains_key(&1));
    }

    #[test]
    fn get_contact_resolves_by_email() {
        let dir = TempDir::new().unwrap();
        let core = core(&dir);
        core.storage.create_empty_file::<UserDirectory>(paths::DIRECTORY).unwrap();
        seed_user(&core, 5, "carol@example.com");

        let mut directory = UserDirectory::default();
        directory.insert(vault_domain::DirectoryEntry {
            user_id: 5,
            email: "carol@example.com".to_string(),
        });
        core.storage.save_data_file(None, paths::DIRECTORY, &directory).unwrap();

        let parts = get_contact(
            &core,
            &GetContactParams {
                email: "carol@example.com".into(),
            },
        )
        .unwrap();
        assert_eq!(parts.contact.user_id, 5);
    }
}
