use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum DbUrlError {
    Invalid { raw: String },
    Io(std::io::Error),
}

impl fmt::Display for DbUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbUrlError::Invalid { raw } => write!(f, "invalid --db value: {raw}"),
            DbUrlError::Io(err) => write!(f, "cannot prepare database file: {err}"),
        }
    }
}

impl std::error::Error for DbUrlError {}

impl From<std::io::Error> for DbUrlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Turn a bare path or `sqlite:` path into an absolute `sqlite://` URL.
///
/// In-memory and already-absolute `sqlite://` URLs pass through unchanged.
pub fn normalize_sqlite_url(raw: &str) -> Result<String, DbUrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DbUrlError::Invalid { raw: raw.into() });
    }
    if is_memory(trimmed) {
        return Ok(trimmed.to_owned());
    }

    let rest = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let (path_str, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    if path_str.is_empty() {
        return Err(DbUrlError::Invalid { raw: raw.into() });
    }

    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    Ok(match query {
        Some(query) => format!("sqlite://{}?{query}", absolute.display()),
        None => format!("sqlite://{}", absolute.display()),
    })
}

/// Create the database file (and parent directories) if it does not exist yet.
pub fn prepare_sqlite_file(db_url: &str) -> Result<(), DbUrlError> {
    if is_memory(db_url) {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| DbUrlError::Invalid {
            raw: db_url.to_owned(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(DbUrlError::Invalid {
            raw: db_url.to_owned(),
        });
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

fn is_memory(url: &str) -> bool {
    url == "sqlite::memory:" || url.contains("mode=memory")
}
