//! Demonstrates using ValueStore as a service locator shared by components.
//!
//! Each service is published under a typed key. Components only need the key,
//! not the component that registered the service.
//!
//! Run with: cargo run --example service_locator

use sovran_attrmap::{Key, StoreError, ValueStore};
use std::sync::{Arc, Mutex};

fn main() -> Result<(), StoreError> {
    let services = ValueStore::new();

    services.set(
        &keys::database(),
        Arc::new(DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "myapp".to_string(),
        }),
    )?;
    services.set(
        &keys::app(),
        Arc::new(AppConfig {
            name: "MyApp".to_string(),
            debug: true,
        }),
    )?;

    // Created lazily and exactly once, whoever asks first
    let logger = services.get_or_insert_with(&keys::logger(), || Arc::new(Logger::new("app")))?;
    logger.log("services registered");

    let users = UserService::new(services.clone());
    let orders = OrderService::new(services.clone())?;

    users.create_user("alice")?;
    users.create_user("bob")?;
    orders.create_order("alice", "Widget")?;

    // Replacing a service is visible to everyone holding the store
    services.set(
        &keys::app(),
        Arc::new(AppConfig {
            name: "MyApp".to_string(),
            debug: false,
        }),
    )?;
    orders.create_order("bob", "Gadget")?;

    println!("\nLog history:");
    for line in logger.history() {
        println!("  {}", line);
    }
    Ok(())
}

// Named keys compare by identifier, so every call yields the same key
mod keys {
    use super::*;

    pub fn database() -> Key<Arc<DatabaseConfig>> {
        Key::named("database")
    }

    pub fn app() -> Key<Arc<AppConfig>> {
        Key::named("app")
    }

    pub fn logger() -> Key<Arc<Logger>> {
        Key::named("logger")
    }
}

#[derive(Debug)]
struct DatabaseConfig {
    host: String,
    port: u16,
    database: String,
}

#[derive(Debug)]
struct AppConfig {
    name: String,
    debug: bool,
}

#[derive(Debug)]
struct Logger {
    prefix: String,
    lines: Mutex<Vec<String>>,
}

impl Logger {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            lines: Mutex::new(Vec::new()),
        }
    }

    fn log(&self, message: &str) {
        let line = format!("[{}] {}", self.prefix, message);
        println!("{}", line);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    fn history(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

struct UserService {
    services: ValueStore,
}

impl UserService {
    fn new(services: ValueStore) -> Self {
        Self { services }
    }

    fn create_user(&self, name: &str) -> Result<(), StoreError> {
        let db = self.services.get_required(&keys::database())?;
        let logger = self.services.get_required(&keys::logger())?;
        logger.log(&format!(
            "creating user '{}' in {}:{}/{}",
            name, db.host, db.port, db.database
        ));
        Ok(())
    }
}

struct OrderService {
    services: ValueStore,
    placed: Key<u32>,
}

impl OrderService {
    fn new(services: ValueStore) -> Result<Self, StoreError> {
        let placed = Key::named("orders.placed");
        services.get_or_insert(&placed, 0)?;
        Ok(Self { services, placed })
    }

    fn create_order(&self, user: &str, item: &str) -> Result<(), StoreError> {
        let app = self.services.get_required(&keys::app())?;
        let logger = self.services.get_required(&keys::logger())?;
        let count = self
            .services
            .update_and_get(&self.placed, |n| n.map(|n| n + 1))?
            .unwrap_or_default();

        if app.debug {
            logger.log(&format!("[{}] order #{} debug trace", app.name, count));
        }
        logger.log(&format!("order #{}: '{}' for {}", count, item, user));
        Ok(())
    }
}
