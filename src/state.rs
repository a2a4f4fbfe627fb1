//! Application state.

use std::sync::Arc;

use crate::config::Config;
use crate::media::MediaStore;
use crate::storage::RecipeStorage;
use crate::user_storage::UserStorage;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: UserStorage,
    pub recipes: RecipeStorage,
}

impl AppState {
    /// Opens the JSON stores below `config.data_dir`.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let users = UserStorage::open(&config.users_path(), config.bcrypt_cost)?;
        let recipes = RecipeStorage::open(&config.recipes_path(), media_store(&config))?;
        Ok(Self {
            config,
            users,
            recipes,
        })
    }

    /// State that never touches `data_dir`. Uploaded images still go to the
    /// media root.
    pub fn in_memory(config: Config) -> Self {
        Self {
            users: UserStorage::in_memory(config.bcrypt_cost),
            recipes: RecipeStorage::in_memory(media_store(&config)),
            config,
        }
    }
}

fn media_store(config: &Config) -> MediaStore {
    MediaStore::new(config.media_root.clone(), config.media_url.clone())
}

pub type SharedState = Arc<AppState>;
