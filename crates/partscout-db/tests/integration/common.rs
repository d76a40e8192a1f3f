use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// Catalog schema, executed one statement at a time.
const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS models (
        model_number VARCHAR(100) PRIMARY KEY,
        name TEXT NOT NULL,
        brand VARCHAR(100),
        appliance_type VARCHAR(50) NOT NULL,
        source_url TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_models_appliance_type ON models(appliance_type)"#,
    r#"CREATE TABLE IF NOT EXISTS parts (
        part_number VARCHAR(50) PRIMARY KEY,
        manufacturer_part_number VARCHAR(100),
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        price DOUBLE PRECISION,
        manufacturer VARCHAR(100),
        appliance_type VARCHAR(50) NOT NULL,
        source_url TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_parts_appliance_type ON parts(appliance_type)"#,
    r#"CREATE TABLE IF NOT EXISTS model_parts (
        model_number VARCHAR(100) NOT NULL REFERENCES models(model_number),
        part_number VARCHAR(50) NOT NULL REFERENCES parts(part_number),
        PRIMARY KEY (model_number, part_number)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_model_parts_part ON model_parts(part_number)"#,
];

/// Spins up a PostgreSQL container and returns a connected pool.
///
/// Keep the returned `ContainerAsync` alive for the whole test; dropping it
/// stops PostgreSQL.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "partscout_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/partscout_test");

    // The port can open before postgres accepts logins.
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}
