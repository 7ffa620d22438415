//! Basic example of the Vessel resolution engine.

use std::sync::Arc;

use vessel::prelude::*;

// === Capability types ===

struct Log;

impl Log {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

struct Database {
    url: String,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        format!("results of `{sql}` from {}", self.url)
    }
}

struct UserRepository {
    db: Arc<Database>,
    log: Arc<Log>,
}

impl UserRepository {
    fn find_user(&self, id: u64) -> String {
        self.log.log(&format!("looking up user {id}"));
        self.db.query(&format!("SELECT * FROM users WHERE id = {id}"))
    }
}

// === Declarations ===

dependency!(Log = || Ok(Log));

dependency!(singleton Database requires [url: "database_url"] = || {
    let url = provide_named("database_url")?;
    let url = url.downcast::<String>().map_err(|_| "database_url must be a String")?;
    Ok(Database { url: (*url).clone() })
});

dependency!(UserRepository requires [db: Database, log: Log] = || {
    Ok(UserRepository {
        db: resolve::<Database>()?,
        log: resolve::<Log>()?,
    })
});

fn main() -> Result<()> {
    // Initialize tracing (logging)
    tracing_subscriber::fmt()
        .with_env_filter("vessel=debug")
        .init();

    // One context per environment
    let local = Context::builder()
        .register::<Log>()
        .register::<Database>()
        .register::<UserRepository>()
        .named("database_url", String::from("sqlite:///tmp/demo.db"))
        .build()?;

    let production = Context::builder()
        .register::<Log>()
        .register::<Database>()
        .register::<UserRepository>()
        .named("database_url", String::from("postgres://db.internal/app"))
        .build()?;

    // VESSEL_ENV picks the context; unset falls back to local
    let context = match_environment(
        "VESSEL_ENV",
        Some("local"),
        [("local", &local), ("production", &production)],
    )?;

    let _guard = context.enter();

    let repo = resolve::<UserRepository>()?;
    println!("{}", repo.find_user(42));

    // the Database singleton is shared by everyone in the scope
    let db_a = resolve::<Database>()?;
    let db_b = resolve::<Database>()?;
    assert!(Arc::ptr_eq(&db_a, &db_b));

    Ok(())
}
