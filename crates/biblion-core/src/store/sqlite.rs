//! SQLite-backed durable store.

use super::traits::Store;
use crate::config::{cents_to_dollars, dollars_to_cents, StoreConfig};
use crate::error::{LibraryError, Result};
use crate::models::{Book, Member, MemberRole, Transaction, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// SQLite store implementation.
///
/// Thread-safe via an internal mutex on the connection. WAL mode and a
/// bounded busy timeout keep store calls from blocking indefinitely.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LibraryError::Io {
                message: format!("Failed to create store directory {}", parent.display()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| LibraryError::Persistence {
            message: format!("Failed to open database {}: {}", db_path.display(), e),
            source: Some(e),
        })?;

        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout={};
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
            StoreConfig::BUSY_TIMEOUT.as_millis()
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                isbn TEXT,
                genre TEXT,
                total_copies INTEGER NOT NULL,
                available_copies INTEGER NOT NULL DEFAULT 0,
                borrowed_copies INTEGER NOT NULL DEFAULT 0,
                description TEXT,
                publication_year INTEGER,
                publisher TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                full_name TEXT NOT NULL,
                email TEXT,
                role TEXT NOT NULL,
                book_capacity INTEGER NOT NULL DEFAULT 5,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                book_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                borrow_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                return_date TEXT,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                fine_amount REAL NOT NULL DEFAULT 0.0,
                notes TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (book_id) REFERENCES books(id),
                FOREIGN KEY (member_id) REFERENCES members(id)
            );

            -- Usernames are unique among active accounts only; soft
            -- deletion frees the name for re-registration
            CREATE UNIQUE INDEX IF NOT EXISTS idx_members_username_active
                ON members(username) WHERE is_active = 1;

            -- Indexes backing the authoritative loan-count queries
            CREATE INDEX IF NOT EXISTS idx_tx_member_status
                ON transactions(member_id, status);
            CREATE INDEX IF NOT EXISTS idx_tx_book_status
                ON transactions(book_id, status);",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LibraryError::Persistence {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_book(row: &Row) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            isbn: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            genre: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            total_copies: row.get::<_, i64>(5)?.max(0) as u32,
            // column 6 (available_copies) is a derived convenience value;
            // the in-memory Book always recomputes it from (total, borrowed)
            borrowed_copies: row.get::<_, i64>(7)?.max(0) as u32,
            description: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            publication_year: row.get::<_, Option<i64>>(9)?.unwrap_or(0) as i32,
            publisher: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            is_active: row.get::<_, i64>(11)? != 0,
            created_at: parse_ts(12, row.get(12)?)?,
        })
    }

    fn row_to_member(row: &Row) -> rusqlite::Result<Member> {
        let role_str: String = row.get(5)?;
        let role = MemberRole::parse(&role_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                Type::Text,
                format!("unknown role: {role_str}").into(),
            )
        })?;
        Ok(Member {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            full_name: row.get(3)?,
            email: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            role,
            book_capacity: row.get::<_, i64>(6)?.max(0) as u32,
            is_active: row.get::<_, i64>(7)? != 0,
            created_at: parse_ts(8, row.get(8)?)?,
        })
    }

    fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
        let kind_str: String = row.get(6)?;
        let kind = TransactionType::parse(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                Type::Text,
                format!("unknown transaction type: {kind_str}").into(),
            )
        })?;
        let status_str: String = row.get(7)?;
        let status = TransactionStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                Type::Text,
                format!("unknown transaction status: {status_str}").into(),
            )
        })?;
        let return_date = row
            .get::<_, Option<String>>(5)?
            .map(|s| parse_ts(5, s))
            .transpose()?;
        Ok(Transaction {
            id: row.get(0)?,
            book_id: row.get(1)?,
            member_id: row.get(2)?,
            borrow_date: parse_ts(3, row.get(3)?)?,
            due_date: parse_ts(4, row.get(4)?)?,
            return_date,
            kind,
            status,
            fine_cents: dollars_to_cents(row.get::<_, f64>(8)?),
            notes: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            is_active: row.get::<_, i64>(10)? != 0,
            created_at: parse_ts(11, row.get(11)?)?,
            updated_at: parse_ts(12, row.get(12)?)?,
        })
    }

    fn insert_book_inner(conn: &Connection, book: &Book) -> Result<()> {
        conn.execute(
            "INSERT INTO books (id, title, author, isbn, genre, total_copies,
                                available_copies, borrowed_copies, description,
                                publication_year, publisher, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.genre,
                book.total_copies,
                book.available_copies(),
                book.borrowed_copies,
                book.description,
                book.publication_year,
                book.publisher,
                book.is_active as i64,
                book.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_book_inner(conn: &Connection, book: &Book) -> Result<()> {
        let rows = conn.execute(
            "UPDATE books SET
                title = ?2, author = ?3, isbn = ?4, genre = ?5,
                total_copies = ?6, available_copies = ?7, borrowed_copies = ?8,
                description = ?9, publication_year = ?10, publisher = ?11,
                is_active = ?12
             WHERE id = ?1",
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.genre,
                book.total_copies,
                book.available_copies(),
                book.borrowed_copies,
                book.description,
                book.publication_year,
                book.publisher,
                book.is_active as i64,
            ],
        )?;
        if rows == 0 {
            return Err(LibraryError::BookNotFound {
                book_id: book.id.clone(),
            });
        }
        Ok(())
    }

    fn insert_transaction_inner(conn: &Connection, t: &Transaction) -> Result<()> {
        conn.execute(
            "INSERT INTO transactions (id, book_id, member_id, borrow_date, due_date,
                                       return_date, type, status, fine_amount, notes,
                                       is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                t.id,
                t.book_id,
                t.member_id,
                t.borrow_date.to_rfc3339(),
                t.due_date.to_rfc3339(),
                t.return_date.map(|d| d.to_rfc3339()),
                t.kind.as_str(),
                t.status.as_str(),
                cents_to_dollars(t.fine_cents),
                t.notes,
                t.is_active as i64,
                t.created_at.to_rfc3339(),
                t.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_transaction_inner(conn: &Connection, t: &Transaction) -> Result<()> {
        let rows = conn.execute(
            "UPDATE transactions SET
                book_id = ?2, member_id = ?3, borrow_date = ?4, due_date = ?5,
                return_date = ?6, type = ?7, status = ?8, fine_amount = ?9,
                notes = ?10, is_active = ?11, updated_at = ?12
             WHERE id = ?1",
            params![
                t.id,
                t.book_id,
                t.member_id,
                t.borrow_date.to_rfc3339(),
                t.due_date.to_rfc3339(),
                t.return_date.map(|d| d.to_rfc3339()),
                t.kind.as_str(),
                t.status.as_str(),
                cents_to_dollars(t.fine_cents),
                t.notes,
                t.is_active as i64,
                t.updated_at.to_rfc3339(),
            ],
        )?;
        if rows == 0 {
            return Err(LibraryError::TransactionNotFound {
                transaction_id: t.id.clone(),
            });
        }
        Ok(())
    }

    fn max_seq(&self, table: &str) -> Result<u64> {
        let conn = self.conn()?;
        // Ids are a one-letter prefix followed by a numeric suffix; compare
        // numerically so B1000 sorts after B999.
        let max: i64 = conn.query_row(
            &format!("SELECT COALESCE(MAX(CAST(SUBSTR(id, 2) AS INTEGER)), 0) FROM {table}"),
            [],
            |row| row.get(0),
        )?;
        Ok(max.max(0) as u64)
    }
}

const BOOK_COLUMNS: &str = "id, title, author, isbn, genre, total_copies, available_copies, \
                            borrowed_copies, description, publication_year, publisher, \
                            is_active, created_at";
const MEMBER_COLUMNS: &str =
    "id, username, password, full_name, email, role, book_capacity, is_active, created_at";
const TX_COLUMNS: &str = "id, book_id, member_id, borrow_date, due_date, return_date, type, \
                          status, fine_amount, notes, is_active, created_at, updated_at";

impl Store for SqliteStore {
    fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn()?;
        let book = conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
                params![id],
                Self::row_to_book,
            )
            .optional()?;
        Ok(book)
    }

    fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE is_active = 1 ORDER BY id"
        ))?;
        let books = stmt
            .query_map([], Self::row_to_book)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(books)
    }

    fn insert_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_book_inner(&conn, book)?;
        debug!(book_id = %book.id, "inserted book");
        Ok(())
    }

    fn update_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn()?;
        Self::update_book_inner(&conn, book)?;
        debug!(book_id = %book.id, "updated book");
        Ok(())
    }

    fn soft_delete_book(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn.execute("UPDATE books SET is_active = 0 WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(LibraryError::BookNotFound {
                book_id: id.to_string(),
            });
        }
        debug!(book_id = %id, "soft-deleted book");
        Ok(())
    }

    fn get_member(&self, id: &str) -> Result<Option<Member>> {
        let conn = self.conn()?;
        let member = conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                params![id],
                Self::row_to_member,
            )
            .optional()?;
        Ok(member)
    }

    fn get_member_by_username(&self, username: &str) -> Result<Option<Member>> {
        let conn = self.conn()?;
        let member = conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE username = ?1 AND is_active = 1"),
                params![username],
                Self::row_to_member,
            )
            .optional()?;
        Ok(member)
    }

    fn list_members(&self) -> Result<Vec<Member>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE is_active = 1 ORDER BY id"
        ))?;
        let members = stmt
            .query_map([], Self::row_to_member)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    fn insert_member(&self, member: &Member) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO members (id, username, password, full_name, email, role,
                                  book_capacity, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                member.id,
                member.username,
                member.password,
                member.full_name,
                member.email,
                member.role.as_str(),
                member.book_capacity,
                member.is_active as i64,
                member.created_at.to_rfc3339(),
            ],
        )?;
        debug!(member_id = %member.id, "inserted member");
        Ok(())
    }

    fn update_member(&self, member: &Member) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE members SET
                username = ?2, password = ?3, full_name = ?4, email = ?5,
                role = ?6, book_capacity = ?7, is_active = ?8
             WHERE id = ?1",
            params![
                member.id,
                member.username,
                member.password,
                member.full_name,
                member.email,
                member.role.as_str(),
                member.book_capacity,
                member.is_active as i64,
            ],
        )?;
        if rows == 0 {
            return Err(LibraryError::MemberNotFound {
                member_id: member.id.clone(),
            });
        }
        debug!(member_id = %member.id, "updated member");
        Ok(())
    }

    fn soft_delete_member(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE members SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        if rows == 0 {
            return Err(LibraryError::MemberNotFound {
                member_id: id.to_string(),
            });
        }
        debug!(member_id = %id, "soft-deleted member");
        Ok(())
    }

    fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"),
                params![id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    fn list_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLUMNS} FROM transactions ORDER BY borrow_date DESC, id DESC"
        ))?;
        let txs = stmt
            .query_map([], Self::row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(txs)
    }

    fn insert_transaction(&self, transaction: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_transaction_inner(&conn, transaction)?;
        debug!(transaction_id = %transaction.id, "inserted transaction");
        Ok(())
    }

    fn update_transaction(&self, transaction: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        Self::update_transaction_inner(&conn, transaction)?;
        debug!(transaction_id = %transaction.id, "updated transaction");
        Ok(())
    }

    fn record_borrow(&self, transaction: &Transaction, book: &Book) -> Result<()> {
        let mut conn = self.conn()?;
        let sql_tx = conn.transaction()?;
        Self::insert_transaction_inner(&sql_tx, transaction)?;
        Self::update_book_inner(&sql_tx, book)?;
        sql_tx.commit()?;
        debug!(
            transaction_id = %transaction.id,
            book_id = %book.id,
            "recorded borrow"
        );
        Ok(())
    }

    fn record_loan_close(&self, transaction: &Transaction, book: &Book) -> Result<()> {
        let mut conn = self.conn()?;
        let sql_tx = conn.transaction()?;
        Self::update_transaction_inner(&sql_tx, transaction)?;
        Self::update_book_inner(&sql_tx, book)?;
        sql_tx.commit()?;
        debug!(
            transaction_id = %transaction.id,
            book_id = %book.id,
            status = transaction.status.as_str(),
            "recorded loan close"
        );
        Ok(())
    }

    fn count_active_loans_for_member(&self, member_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE member_id = ?1 AND status = 'ACTIVE'",
            params![member_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn count_active_loans_for_book(&self, book_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE book_id = ?1 AND status = 'ACTIVE'",
            params![book_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn max_book_seq(&self) -> Result<u64> {
        self.max_seq("books")
    }

    fn max_member_seq(&self) -> Result<u64> {
        self.max_seq("members")
    }

    fn max_transaction_seq(&self) -> Result<u64> {
        self.max_seq("transactions")
    }
}

fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
