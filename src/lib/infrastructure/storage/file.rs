//! Recipient list kept in a plain text file

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use clap::Parser;
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::recipients::{errors::StoreError, RecipientAddress, RecipientSet, RecipientStore};

/// Recipient file configuration
#[derive(Clone, Debug, PartialEq, Eq, Parser)]
pub struct RecipientFileConfig {
    /// Path of the recipient list
    #[clap(
        long = "recipients-file",
        env = "RECIPIENTS_FILE",
        default_value = "storage/recipients.txt"
    )]
    pub path: PathBuf,
}

/// Stores the recipient list one address per line.
///
/// Blank lines and lines starting with `#` are ignored. Lines that are not
/// valid addresses are skipped with a warning. A missing file is an empty list.
/// Saving keeps the previous file as `<name>.bak` and replaces the list by
/// renaming a fully written temporary file into place.
#[derive(Clone, Debug)]
pub struct FileRecipientStore {
    path: PathBuf,
}

impl FileRecipientStore {
    /// Create a store backed by `path`. The file is not touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store from its configuration
    pub fn from_config(config: &RecipientFileConfig) -> Self {
        Self::new(config.path.clone())
    }

    /// The file backing the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "recipients".into());
        name.push(extension);

        self.path.with_file_name(name)
    }

    /// Path of the backup written before each save
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bak")
    }
}

fn parse_lines(path: &Path, contents: &str) -> RecipientSet {
    let mut recipients = RecipientSet::new();

    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match RecipientAddress::parse(line) {
            Ok(address) => {
                recipients.insert(address);
            }
            Err(err) => warn!(
                "Skipping invalid recipient on line {} of {}: {} ({})",
                number + 1,
                path.display(),
                line,
                err
            ),
        }
    }

    recipients
}

#[async_trait]
impl RecipientStore for FileRecipientStore {
    async fn load(&self) -> Result<RecipientSet, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist yet", self.path.display());
                return Ok(RecipientSet::new());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };

        Ok(parse_lines(&self.path, &contents))
    }

    async fn save(&self, recipients: &RecipientSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| StoreError::io(parent, err))?;
        }

        match fs::copy(&self.path, self.backup_path()).await {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(self.backup_path(), err)),
        }

        let temp_path = self.sibling(".tmp");

        fs::write(&temp_path, recipients.to_string())
            .await
            .map_err(|err| StoreError::io(&temp_path, err))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|err| StoreError::io(&self.path, err))?;

        debug!(
            "Saved {} recipients to {}",
            recipients.len(),
            self.path.display()
        );

        Ok(())
    }
}
