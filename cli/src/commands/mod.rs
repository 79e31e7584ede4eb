mod helpers;
mod init;
mod recipe;
mod search;
mod user;

pub(crate) use init::cmd_init;
pub(crate) use recipe::{cmd_create, cmd_delete, cmd_show, cmd_update};
pub(crate) use search::cmd_search;
pub(crate) use user::{cmd_user_login, cmd_user_register};
