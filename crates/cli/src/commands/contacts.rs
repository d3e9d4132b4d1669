//! `switchboard contacts`: manage the whitelist file.

use switchboard_security::normalize_contact;

use super::Setup;
use crate::ContactsAction;

pub fn run(action: ContactsAction) -> anyhow::Result<()> {
    let setup = Setup::load()?;
    let whitelist = setup.whitelist();

    match action {
        ContactsAction::Add { id } => {
            if whitelist.add(&id)? {
                println!("Added {}", normalize_contact(&id));
            } else {
                println!("{} is already whitelisted", normalize_contact(&id));
            }
        }
        ContactsAction::Remove { id } => {
            if whitelist.remove(&id)? {
                println!("Removed {}", normalize_contact(&id));
            } else {
                println!("{} was not whitelisted", normalize_contact(&id));
            }
        }
        ContactsAction::List => {
            let contacts = whitelist.list_all();
            if contacts.is_empty() {
                println!("No contacts whitelisted ({})", whitelist.path().display());
            }
            for contact in contacts {
                println!("{contact}");
            }
        }
    }
    Ok(())
}
