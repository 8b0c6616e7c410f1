use std::sync::OnceLock;

use plaza_crypto::PasswordService;

use crate::models::NewUser;
use crate::{Database, Storage};

pub(crate) fn storage() -> Storage {
    Storage::new(Database::open_in_memory().unwrap())
}

fn passwords() -> &'static PasswordService {
    static SERVICE: OnceLock<PasswordService> = OnceLock::new();
    SERVICE.get_or_init(|| PasswordService::with_cost(1024, 1).unwrap())
}

/// An ordinary-role user named `name` with email `name@example.com`.
pub(crate) fn new_user(name: &str) -> NewUser {
    NewUser {
        username: name.to_string(),
        email: format!("{}@example.com", name),
        password: passwords().set_password("password").unwrap(),
        role_id: 1,
    }
}
