//! The e-commerce SQLite database every generated query is executed against.

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, Transaction};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sqlbench_types::Row;

pub const CREATE_CUSTOMERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT UNIQUE NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_customers_name ON Customers(name);";

pub const CREATE_ORDERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id INTEGER REFERENCES Customers(id),
    shipping_status TEXT CHECK (shipping_status IN ('pending', 'shipped', 'delivered')) NOT NULL,
    FOREIGN KEY(customer_id) REFERENCES Customers(id)
);";

pub const CREATE_PRODUCTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    price REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_products_name ON Products(name);";

pub const CREATE_ORDER_PRODUCTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Order_Products (
    order_id INTEGER REFERENCES Orders(id),
    product_id INTEGER REFERENCES Products(id),
    quantity INTEGER NOT NULL,
    PRIMARY KEY(order_id, product_id)
);";

/// DDL in creation order. Also embedded verbatim in the generation prompt.
pub const SCHEMA: [&str; 4] = [
    CREATE_CUSTOMERS_TABLE,
    CREATE_ORDERS_TABLE,
    CREATE_PRODUCTS_TABLE,
    CREATE_ORDER_PRODUCTS_TABLE,
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("no SQL statement was generated")]
    EmptyStatement,
    #[error("only one SQL statement may be run; found more after the first ';'")]
    MultipleStatements,
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Query-only handle on the benchmark database.
#[derive(Debug, Clone)]
pub struct EcommerceDb {
    conn: Arc<Mutex<Connection>>,
}

impl EcommerceDb {
    /// Open the database at `path`, creating and seeding it first if the file does not exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("Failed to open database {:?}", path))?;

        if existed {
            tracing::info!(path = %path.display(), "opened existing database");
        } else {
            tracing::info!(path = %path.display(), "creating and seeding database");
            init(&conn)?;
        }

        Self::query_only(conn)
    }

    /// Open an existing database file without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("Failed to open database {:?} read-only", path))?;
        Self::query_only(conn)
    }

    /// Fresh seeded database held in memory.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init(&conn)?;
        Self::query_only(conn)
    }

    fn query_only(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "query_only", true)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run one statement and collect every row, keyed by column name.
    ///
    /// `sql` must hold exactly one statement. A trailing `;`, whitespace and comments are allowed.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let statement = single_statement(sql)?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                map.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            out.push(map);
        }
        Ok(out)
    }
}

/// The text before the first `;` that is outside quotes and comments.
fn single_statement(sql: &str) -> Result<&str, StoreError> {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut end = None;
    while i < bytes.len() {
        match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => i = skip_past(bytes, i + 1, &[q]),
            b'[' => i = skip_past(bytes, i + 1, b"]"),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_past(bytes, i + 2, b"\n"),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_past(bytes, i + 2, b"*/"),
            b';' => {
                end = Some(i);
                break;
            }
            _ => i += 1,
        }
    }

    let (head, tail) = match end {
        Some(e) => (&sql[..e], &sql[e + 1..]),
        None => (sql, ""),
    };
    if is_blank(head) {
        return Err(StoreError::EmptyStatement);
    }
    if !is_blank(tail) {
        return Err(StoreError::MultipleStatements);
    }
    Ok(head)
}

/// Index just after the next `needle` at or after `from`, or the end of input.
fn skip_past(bytes: &[u8], from: usize, needle: &[u8]) -> usize {
    bytes[from.min(bytes.len())..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p + needle.len())
        .unwrap_or(bytes.len())
}

/// Nothing but whitespace and comments.
fn is_blank(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, r)| r).unwrap_or("").trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, r)| r).unwrap_or("").trim_start();
        } else {
            return rest.is_empty();
        }
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        // Integral reals are written without a fractional part, so 100.0 reads as 100.
        // Recorded results written as 100.0 still compare equal: the comparator folds them the same way.
        ValueRef::Real(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(f as i64),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Create the schema and insert the sample data in one transaction.
fn init(conn: &Connection) -> Result<()> {
    for ddl in SCHEMA {
        conn.execute_batch(ddl).context("Failed to create schema")?;
    }

    let tx = conn.unchecked_transaction()?;
    insert_sample_data(&tx)?;
    tx.commit()?;
    Ok(())
}

const SHIPPED_ORDER: usize = 2;

fn insert_sample_data(tx: &Transaction<'_>) -> Result<()> {
    for n in 1..=10 {
        tx.execute(
            "INSERT INTO Customers (name, email) VALUES (?1, ?2)",
            params![format!("Customer {n}"), format!("customer{n}@example.com")],
        )?;
    }

    for n in 1..=10 {
        let price = if n == 10 { 10000.0 } else { n as f64 * 100.0 };
        tx.execute(
            "INSERT INTO Products (name, price) VALUES (?1, ?2)",
            params![format!("Product {n}"), price],
        )?;
    }

    // Order n: Customer n buys Products 1..=n, quantity equal to the product number.
    for n in 1..=9usize {
        let status = match n {
            1 => "pending",
            SHIPPED_ORDER => "shipped",
            _ => "delivered",
        };
        let products: Vec<(String, i64)> = (1..=n)
            .map(|p| (format!("Product {p}"), p as i64))
            .collect();
        create_order(tx, &format!("Customer {n}"), &products, status)?;
    }

    Ok(())
}

fn create_order(
    tx: &Transaction<'_>,
    customer: &str,
    products: &[(String, i64)],
    shipping_status: &str,
) -> Result<()> {
    let customer_id: i64 = tx
        .query_row("SELECT id FROM Customers WHERE name = ?1", [customer], |r| r.get(0))
        .with_context(|| format!("Failed to get customer ID for {customer}"))?;

    tx.execute(
        "INSERT INTO Orders (customer_id, shipping_status) VALUES (?1, ?2)",
        params![customer_id, shipping_status],
    )?;
    let order_id = tx.last_insert_rowid();

    for (name, quantity) in products {
        let product_id: i64 = tx
            .query_row("SELECT id FROM Products WHERE name = ?1", [name], |r| r.get(0))
            .with_context(|| format!("Failed to get product ID for {name}"))?;
        tx.execute(
            "INSERT INTO Order_Products (order_id, product_id, quantity) VALUES (?1, ?2, ?3)",
            params![order_id, product_id, quantity],
        )?;
    }

    Ok(())
}
