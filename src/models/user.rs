use uuid::Uuid;

/// A registered account.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub uuid: Uuid,
    /// The user's login, unique across the system.
    pub login: String,
    /// The Argon2 PHC string of the user's password.
    pub password_hash: String,
}
