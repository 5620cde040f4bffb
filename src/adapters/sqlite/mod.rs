//! SQLite adapters: connection pool, migrations, repositories.

pub mod connection;
pub mod migrations;
pub mod session_repository;
pub mod task_repository;

pub use connection::{
    create_migrated_test_pool, create_pool, create_test_pool, verify_connection, ConnectionError,
    PoolConfig,
};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use session_repository::SqliteSessionRepository;
pub use task_repository::SqliteTaskRepository;
