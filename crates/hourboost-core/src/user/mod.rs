//! Users and the steam accounts attached to them.

mod model;
mod repository;

pub use model::{SteamAccount, User};
pub use repository::UsersRepository;
