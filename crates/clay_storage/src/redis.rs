//! Redis backend spoken to over RESP2.

use crate::backend::{HashFields, KeyValueBackend};
use crate::error::{StorageError, StorageResult};
use crate::resp::{read_reply, write_command, Reply};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connection settings for [`RedisBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Logical database selected after connecting.
    pub database: u32,
    /// Password sent with `AUTH`, if any.
    pub password: Option<String>,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Read and write timeout for each request. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl RedisConfig {
    /// Creates a configuration for `host:port` with default settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the logical database.
    #[must_use]
    pub fn with_database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-request I/O timeout.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// An open RESP connection.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(config: &RedisConfig) -> StorageResult<Self> {
        let address = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                StorageError::Backend(format!("could not resolve {}", config.address()))
            })?;

        let stream = TcpStream::connect_timeout(&address, config.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.io_timeout)?;
        stream.set_write_timeout(config.io_timeout)?;

        let read_stream = stream.try_clone()?;
        let mut connection = Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        };

        if let Some(password) = &config.password {
            connection.request(&["AUTH", password.as_str()])?.into_ok()?;
        }
        if config.database != 0 {
            let database = config.database.to_string();
            connection.request(&["SELECT", database.as_str()])?.into_ok()?;
        }

        tracing::debug!(address = %config.address(), database = config.database, "connected to redis");
        Ok(connection)
    }

    fn request<A: AsRef<[u8]>>(&mut self, args: &[A]) -> StorageResult<Reply> {
        write_command(&mut self.writer, args)?;
        read_reply(&mut self.reader)
    }
}

/// A backend that stores everything in a Redis server.
///
/// The backend keeps one connection, opened lazily and guarded by a mutex,
/// so a single handle can be shared by many threads. Requests are
/// serialized over that connection. If a request fails with an I/O or
/// protocol error the connection is dropped and the next request
/// reconnects.
///
/// # Example
///
/// ```rust,no_run
/// use clay_storage::{KeyValueBackend, RedisBackend, RedisConfig};
///
/// let backend = RedisBackend::connect(RedisConfig::new("127.0.0.1", 6379).with_database(2))?;
/// backend.ping()?;
/// let id = backend.increment("clay:User:count")?;
/// # Ok::<(), clay_storage::StorageError>(())
/// ```
pub struct RedisBackend {
    config: RedisConfig,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("address", &self.config.address())
            .field("database", &self.config.database)
            .field("connected", &self.connection.try_lock().map(|c| c.is_some()))
            .finish()
    }
}

impl RedisBackend {
    /// Creates a backend and opens its connection immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the
    /// `AUTH`/`SELECT` handshake.
    pub fn connect(config: RedisConfig) -> StorageResult<Self> {
        let connection = Connection::open(&config)?;
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Creates a backend that connects on first use.
    #[must_use]
    pub fn lazy(config: RedisConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Checks that the server answers.
    pub fn ping(&self) -> StorageResult<()> {
        match self.request(&["PING"])? {
            Reply::Status(status) if status == "PONG" => Ok(()),
            other => Err(StorageError::protocol(format!(
                "unexpected PING reply: {other:?}"
            ))),
        }
    }

    /// Removes every key of the selected database.
    pub fn flush_database(&self) -> StorageResult<()> {
        self.request(&["FLUSHDB"])?.into_ok()
    }

    /// Sends one command and waits for its reply.
    ///
    /// Error replies are returned as [`Reply::Error`]; callers decide how to
    /// interpret them.
    pub fn request<A: AsRef<[u8]>>(&self, args: &[A]) -> StorageResult<Reply> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(Connection::open(&self.config)?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(StorageError::Closed);
        };

        match connection.request(args) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::warn!(error = %err, "dropping redis connection");
                *guard = None;
                Err(err)
            }
        }
    }

    /// Sends a command about `key` and maps type errors to storage errors.
    fn keyed(&self, key: &str, args: &[&str]) -> StorageResult<Reply> {
        match self.request(args)? {
            Reply::Error(message) => Err(classify_error(key, message)),
            reply => Ok(reply),
        }
    }
}

fn classify_error(key: &str, message: String) -> StorageError {
    if message.starts_with("WRONGTYPE") {
        StorageError::wrong_type(key)
    } else if message.contains("not an integer") {
        StorageError::NotAnInteger {
            key: key.to_string(),
        }
    } else {
        StorageError::Backend(message)
    }
}

fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

impl KeyValueBackend for RedisBackend {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.keyed(key, &["GET", key])?.into_string()
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.keyed(key, &["SET", key, value])?.into_ok()
    }

    fn set_if_absent(&self, key: &str, value: &str) -> StorageResult<bool> {
        match self.keyed(key, &["SET", key, value, "NX"])? {
            Reply::Status(status) if status == "OK" => Ok(true),
            Reply::Bulk(None) => Ok(false),
            other => Err(StorageError::protocol(format!(
                "unexpected SET NX reply: {other:?}"
            ))),
        }
    }

    fn delete(&self, keys: &[String]) -> StorageResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&str> = Vec::with_capacity(keys.len() + 1);
        args.push("DEL");
        args.extend(keys.iter().map(String::as_str));
        self.keyed(&keys[0], &args)?.into_integer().map(count)
    }

    fn increment(&self, key: &str) -> StorageResult<i64> {
        self.keyed(key, &["INCR", key])?.into_integer()
    }

    fn hash_set_fields(&self, key: &str, fields: &[(String, String)]) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut args: Vec<&str> = Vec::with_capacity(fields.len() * 2 + 2);
        args.push("HSET");
        args.push(key);
        for (field, value) in fields {
            args.push(field);
            args.push(value);
        }
        self.keyed(key, &args)?.into_integer()?;
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> StorageResult<HashFields> {
        let flat = self.keyed(key, &["HGETALL", key])?.into_strings()?;
        if flat.len() % 2 != 0 {
            return Err(StorageError::protocol("HGETALL returned an odd number of items"));
        }
        let mut fields = HashFields::new();
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            fields.insert(field, value);
        }
        Ok(fields)
    }

    fn hash_get_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        self.keyed(key, &["HGET", key, field])?.into_string()
    }

    fn hash_delete_fields(&self, key: &str, fields: &[String]) -> StorageResult<usize> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&str> = Vec::with_capacity(fields.len() + 2);
        args.push("HDEL");
        args.push(key);
        args.extend(fields.iter().map(String::as_str));
        self.keyed(key, &args)?.into_integer().map(count)
    }

    fn sorted_set_add(&self, key: &str, score: i64, member: &str) -> StorageResult<bool> {
        let score = score.to_string();
        Ok(self.keyed(key, &["ZADD", key, score.as_str(), member])?.into_integer()? == 1)
    }

    fn sorted_set_range(&self, key: &str, start: i64, stop: i64) -> StorageResult<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        self.keyed(key, &["ZRANGE", key, start.as_str(), stop.as_str()])?.into_strings()
    }

    fn sorted_set_remove(&self, key: &str, member: &str) -> StorageResult<bool> {
        Ok(self.keyed(key, &["ZREM", key, member])?.into_integer()? == 1)
    }

    fn keys_matching(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let mut keys = self.keyed(pattern, &["KEYS", pattern])?.into_strings()?;
        keys.sort();
        Ok(keys)
    }
}
