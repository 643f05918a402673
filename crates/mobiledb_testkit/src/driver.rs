//! A minimal document driver.
//!
//! Speaks the reference engine's JSON command protocol through
//! [`Client::invoke`]. It stands in for the external driver an application
//! would hand its client to.

use mobiledb_core::{Client, MobileError};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Driver failures.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The client could not carry the request.
    #[error(transparent)]
    Mobile(#[from] MobileError),

    /// The engine rejected the command.
    #[error("command failed ({code}): {message}")]
    Command {
        /// Server error code.
        code: i64,
        /// Server message.
        message: String,
    },

    /// The reply was not valid JSON.
    #[error("malformed reply: {0}")]
    Reply(#[from] serde_json::Error),
}

/// Entry point over one client.
#[derive(Debug, Clone, Copy)]
pub struct Driver<'c> {
    client: &'c Client,
}

impl<'c> Driver<'c> {
    /// Wraps a client.
    pub fn new(client: &'c Client) -> Self {
        Self { client }
    }

    /// Returns a handle to a database.
    pub fn database(&self, name: &str) -> Database<'c> {
        Database {
            client: self.client,
            name: name.to_owned(),
        }
    }

    /// Round-trips a `ping` command.
    pub fn ping(&self) -> DriverResult<()> {
        run_command(self.client, &json!({ "ping": 1 })).map(|_| ())
    }
}

/// A named database.
#[derive(Debug, Clone)]
pub struct Database<'c> {
    client: &'c Client,
    name: String,
}

impl<'c> Database<'c> {
    /// Returns a handle to a collection.
    pub fn collection(&self, name: &str) -> Collection<'c> {
        Collection {
            client: self.client,
            db: self.name.clone(),
            name: name.to_owned(),
        }
    }
}

/// A named collection.
#[derive(Debug, Clone)]
pub struct Collection<'c> {
    client: &'c Client,
    db: String,
    name: String,
}

impl Collection<'_> {
    /// Inserts one document and returns its `_id`.
    pub fn insert_one(&self, document: Value) -> DriverResult<Value> {
        let reply = run_command(
            self.client,
            &json!({ "insert": self.name, "$db": self.db, "documents": [document] }),
        )?;
        Ok(reply["insertedIds"][0].clone())
    }

    /// Returns every document whose top-level fields equal `filter`'s.
    pub fn find(&self, filter: Value) -> DriverResult<Vec<Value>> {
        let mut reply = run_command(
            self.client,
            &json!({ "find": self.name, "$db": self.db, "filter": filter }),
        )?;
        match reply["cursor"]["firstBatch"].take() {
            Value::Array(documents) => Ok(documents),
            _ => Ok(Vec::new()),
        }
    }

    /// Deletes every matching document and returns how many were removed.
    pub fn delete_many(&self, filter: Value) -> DriverResult<u64> {
        let reply = run_command(
            self.client,
            &json!({ "delete": self.name, "$db": self.db, "filter": filter }),
        )?;
        Ok(reply["n"].as_u64().unwrap_or(0))
    }

    /// Number of documents in the collection.
    pub fn count(&self) -> DriverResult<u64> {
        let reply = run_command(self.client, &json!({ "count": self.name, "$db": self.db }))?;
        Ok(reply["n"].as_u64().unwrap_or(0))
    }

    /// Drops the collection.
    pub fn drop_collection(&self) -> DriverResult<()> {
        run_command(self.client, &json!({ "drop": self.name, "$db": self.db })).map(|_| ())
    }
}

fn run_command(client: &Client, command: &Value) -> DriverResult<Value> {
    let reply = client.invoke(command.to_string().as_bytes())?;
    let mut reply: Value = serde_json::from_slice(&reply)?;
    if reply["ok"].as_i64() == Some(1) {
        return Ok(reply);
    }
    Err(DriverError::Command {
        code: reply["code"].as_i64().unwrap_or(-1),
        message: match reply["errmsg"].take() {
            Value::String(message) => message,
            other => other.to_string(),
        },
    })
}
