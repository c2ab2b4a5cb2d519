//! Opening a book from a logbook root directory.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use logbook::config::{LogbookConfig, StoreKind};
use logbook::context::Context;
use logbook::dsref::DsRef;
use logbook::identity::{Author, KeyProvider, Keyring};
use logbook::model::types::{DatasetName, Username};
use logbook::{Book, BookOptions};
use logbook_cas::{ContentStore, FsStore, MemStore};
use tracing::{debug, warn};

/// A book opened from `<root>/config.toml` and the identity's key file.
pub struct Session {
    pub book: Book,
    pub keys: Arc<Keyring>,
    pub ctx: Context,
}

impl Session {
    pub fn open(root: &Path, ctx: Context) -> Result<Self> {
        let config = LogbookConfig::load_from_root(root)?;
        let author = load_author(root, &config)?;
        let store = open_store(root, &config)?;
        let keys = Arc::new(Keyring::new(author));
        let options = BookOptions {
            cache_path: config.cache_path(root),
        };
        let book = Book::open_with(
            &ctx,
            store,
            Arc::clone(&keys) as Arc<dyn KeyProvider>,
            options,
        )
        .with_context(|| format!("opening logbook at {}", root.display()))?;
        Ok(Self { book, keys, ctx })
    }

    pub fn author(&self) -> &Author {
        self.book.author()
    }

    /// Parse a dataset argument: `username/name[@path]`, or a bare `name`
    /// owned by the local identity.
    pub fn dataset_arg(&self, arg: &str) -> Result<DsRef> {
        parse_dataset(self.book.username(), arg)
    }
}

pub fn parse_dataset(local: &Username, arg: &str) -> Result<DsRef> {
    if arg.contains('/') {
        return arg
            .parse::<DsRef>()
            .with_context(|| format!("invalid dataset reference '{arg}'"));
    }
    let name = DatasetName::new(arg).with_context(|| format!("invalid dataset name '{arg}'"))?;
    Ok(DsRef::new(local.clone(), name))
}

fn load_author(root: &Path, config: &LogbookConfig) -> Result<Author> {
    let username = config
        .identity
        .username
        .clone()
        .ok_or_else(|| anyhow!("no identity configured; run `logbook keygen <username>` first"))?;
    let key_file = config.key_file(root);
    let secret = fs::read_to_string(&key_file)
        .with_context(|| format!("reading key file {}", key_file.display()))?;
    Author::from_hex(username, &secret)
        .with_context(|| format!("decoding key file {}", key_file.display()))
}

fn open_store(root: &Path, config: &LogbookConfig) -> Result<Arc<dyn ContentStore>> {
    match config.store.kind {
        StoreKind::Fs => {
            let path = config.store_path(root);
            debug!(path = %path.display(), "opening filesystem store");
            let store = FsStore::open(&path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => {
            warn!("using an in-memory store; nothing will be kept after this command");
            Ok(Arc::new(MemStore::new()))
        }
    }
}

/// Generate a key for `username`, write it to the configured key file, and
/// record the username in `config.toml`. Returns the new author and the key
/// file path.
pub fn keygen(root: &Path, username: Username, force: bool) -> Result<(Author, PathBuf)> {
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let mut config = LogbookConfig::load_from_root(root)?;
    let key_file = config.key_file(root);
    if key_file.exists() && !force {
        bail!(
            "key file {} already exists (use --force to replace it)",
            key_file.display()
        );
    }

    let author = Author::generate(username.clone());
    write_secret(&key_file, &format!("{}\n", author.secret_hex()))
        .with_context(|| format!("writing key file {}", key_file.display()))?;

    config.identity.username = Some(username);
    let config_path = root.join(logbook::config::CONFIG_FILE);
    fs::write(&config_path, config.to_toml()?)
        .with_context(|| format!("writing {}", config_path.display()))?;
    Ok((author, key_file))
}

/// Write `contents` to `path`, readable and writable by the owner only.
fn write_secret(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        // A replaced key keeps the old file's mode unless reset.
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(contents.as_bytes())
    }
    #[cfg(not(unix))]
    {
        options.open(path)?.write_all(contents.as_bytes())
    }
}
