//! CLI command implementations

mod config;
mod files;
mod hosts;
mod shell;

pub use config::{config_init, config_show, load_app_config};
pub use files::{files_chmod, files_get, files_ls, files_mkdir, files_mv, files_put, files_rm};
pub use hosts::{hosts_add, hosts_list, hosts_remove, NewHost};
pub use shell::{key_to_bytes, shell_command};
