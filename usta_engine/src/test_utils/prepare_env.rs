use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::run_migrations;

/// Gives a test a freshly migrated database at `url`, replacing whatever was there. Reads `.env.test` and turns on
/// logging first so `RUST_LOG` works in tests too.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        debug!("🚀️ Removing stale test database {url}");
        Sqlite::drop_database(url).await.expect("Could not drop the stale test database");
    }
    Sqlite::create_database(url).await.expect("Could not create the test database");
    run_migrations(url).await.expect("Migrations failed on the test database");
    info!("🚀️ Test database ready at {url}");
}

/// A database URL in the system temp dir that no other test will pick.
pub fn random_db_path() -> String {
    let file = std::env::temp_dir().join(format!("usta_test_{:016x}.db", rand::random::<u64>()));
    format!("sqlite://{}", file.display())
}
