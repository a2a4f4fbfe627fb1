use crate::store::JsonStore;
use crate::user_models::{normalize_email, Token, User, UserId};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Users must have an email address.")]
    MissingEmail,

    #[error("user with this email already exists.")]
    DuplicateEmail,

    #[error("User not found.")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type UserResult<T> = Result<T, UserError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTable {
    users: Vec<User>,
    tokens: Vec<Token>,
    last_id: UserId,
}

impl UserTable {
    fn by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.email.to_lowercase() == email.to_lowercase())
    }

    fn by_id_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }
}

/// Fields a profile update may change. `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

pub struct UserStorage {
    store: JsonStore<UserTable>,
    bcrypt_cost: u32,
}

impl UserStorage {
    pub fn open(path: &Path, bcrypt_cost: u32) -> anyhow::Result<Self> {
        Ok(Self {
            store: JsonStore::open(path)?,
            bcrypt_cost,
        })
    }

    pub fn in_memory(bcrypt_cost: u32) -> Self {
        Self {
            store: JsonStore::in_memory(),
            bcrypt_cost,
        }
    }

    /// Hashes on the blocking pool.
    async fn hash(&self, password: &str) -> anyhow::Result<String> {
        let password = password.to_owned();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .context("Password hashing task failed")?
            .context("Failed to hash password")
    }

    async fn verify(user: &User, password: &str) -> anyhow::Result<bool> {
        let user = user.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || user.check_password(&password))
            .await
            .context("Password check task failed")?
            .context("Failed to verify password")
    }

    pub async fn create_user(&self, email: &str, password: &str, name: &str) -> UserResult<User> {
        self.insert(email, password, name, false).await
    }

    pub async fn create_superuser(&self, email: &str, password: &str) -> UserResult<User> {
        self.insert(email, password, "", true).await
    }

    async fn insert(&self, email: &str, password: &str, name: &str, admin: bool) -> UserResult<User> {
        if email.trim().is_empty() {
            return Err(UserError::MissingEmail);
        }

        let email = normalize_email(email);
        let password_hash = self.hash(password).await?;

        let mut tx = self.store.begin().await;
        if tx.by_email(&email).is_some() {
            return Err(UserError::DuplicateEmail);
        }

        tx.last_id += 1;
        let mut user = User::new(tx.last_id, email, name.trim().to_string(), password_hash);
        user.is_staff = admin;
        user.is_superuser = admin;

        tx.users.push(user.clone());
        tx.commit()?;

        info!(user_id = user.id, superuser = admin, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Option<User> {
        let table = self.store.read().await;
        table.users.iter().find(|u| u.id == id).cloned()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Option<User> {
        let table = self.store.read().await;
        table.by_email(&normalize_email(email)).cloned()
    }

    /// Returns the user only when the password matches and the account is
    /// active.
    pub async fn authenticate(&self, email: &str, password: &str) -> UserResult<Option<User>> {
        let Some(user) = self.get_user_by_email(email).await else {
            debug!("Authentication failed: unknown email");
            return Ok(None);
        };

        if !Self::verify(&user, password).await? {
            debug!(user_id = user.id, "Authentication failed: wrong password");
            return Ok(None);
        }
        if !user.is_active {
            debug!(user_id = user.id, "Authentication failed: inactive account");
            return Ok(None);
        }

        Ok(Some(user))
    }

    /// Returns the user's existing token, minting one on first use.
    /// `None` means the credentials did not authenticate.
    pub async fn issue_token(&self, email: &str, password: &str) -> UserResult<Option<Token>> {
        let Some(user) = self.authenticate(email, password).await? else {
            return Ok(None);
        };

        let mut tx = self.store.begin().await;
        if let Some(token) = tx.tokens.iter().find(|t| t.user_id == user.id) {
            return Ok(Some(token.clone()));
        }

        let token = Token::new(user.id);
        tx.tokens.push(token.clone());
        tx.commit()?;

        info!(user_id = user.id, "Issued token");
        Ok(Some(token))
    }

    /// Resolves a token key to its owner, whether or not the owner is active.
    pub async fn user_for_token(&self, key: &str) -> Option<User> {
        let table = self.store.read().await;
        let token = table.tokens.iter().find(|t| t.key == key)?;
        table.users.iter().find(|u| u.id == token.user_id).cloned()
    }

    pub async fn update_user(&self, id: UserId, changes: UserChanges) -> UserResult<User> {
        let password_hash = match changes.password.as_deref() {
            Some(password) => Some(self.hash(password).await?),
            None => None,
        };
        let email = changes.email.as_deref().map(normalize_email);

        let mut tx = self.store.begin().await;
        if let Some(email) = &email {
            if tx.by_email(email).is_some_and(|other| other.id != id) {
                return Err(UserError::DuplicateEmail);
            }
        }

        let user = tx.by_id_mut(id).ok_or(UserError::NotFound)?;
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name.trim().to_string();
        }
        if let Some(hash) = password_hash {
            user.password_hash = hash;
        }

        let user = user.clone();
        tx.commit()?;

        info!(user_id = id, "Updated profile");
        Ok(user)
    }

    pub async fn set_active(&self, id: UserId, active: bool) -> UserResult<()> {
        let mut tx = self.store.begin().await;
        tx.by_id_mut(id).ok_or(UserError::NotFound)?.is_active = active;
        tx.commit()?;
        Ok(())
    }
}
