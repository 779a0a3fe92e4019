pub mod catalog;
pub mod config;
mod create;
pub mod datastore;
mod db;
mod delete;
pub mod introspect;
pub mod migration;
mod read;
pub mod script;
pub mod store;
mod time_series;
mod update;
pub mod validate;

pub use tabula_core::*;
pub use catalog::build_catalog;
pub use config::{DatabaseConfig, MigrationConfig, OpenOptions, TabulaConfig, ValidationMode};
pub use datastore::{default_sqlite_path, load_or_init_config, open_database};
pub use introspect::{introspect, RawSchema};
pub use migration::{
    apply_migrations, create_backup, migrate, Direction, Migration, Migrations, Migrator,
};
pub use script::{reconstruction_script, replay, ScriptStep};
pub use store::Database;
pub use validate::{enforce, validate_schema};
