use super::CounterStore;
use crate::Result;
use std::path::PathBuf;
use tokio::fs;

const FILE_PREFIX: &str = ".spreadbot_";

/// One plain-text file per key
///
/// Scalar slots hold a single value; set slots hold one token per line.
/// Single-writer: two processes sharing a directory will race.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    dir: PathBuf,
}

impl FileCounterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", FILE_PREFIX, key))
    }

    /// Write via a sibling temp file and rename so readers never see a torn value
    async fn replace(&self, key: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path(key);
        let tmp = self.dir.join(format!("{}{}.tmp", FILE_PREFIX, key));
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

impl CounterStore for FileCounterStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)).await {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.replace(key, value).await
    }

    async fn members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .read(key)
            .await?
            .map(|contents| {
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append(&self, key: &str, token: &str) -> Result<()> {
        let mut tokens = self.members(key).await?;
        if tokens.iter().any(|t| t == token) {
            return Ok(());
        }
        tokens.push(token.to_string());
        self.replace(key, &tokens.join("\n")).await
    }

    async fn remove(&self, key: &str, token: &str) -> Result<()> {
        let tokens: Vec<String> = self
            .members(key)
            .await?
            .into_iter()
            .filter(|t| t != token)
            .collect();
        self.replace(key, &tokens.join("\n")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("spreadbot-test-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_missing_key_reads_none() {
        let store = FileCounterStore::new(scratch_dir());
        assert_eq!(store.read("nothing").await.unwrap(), None);
        assert!(store.members("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_value_survives_new_instance() {
        let dir = scratch_dir();
        FileCounterStore::new(&dir)
            .write("total_profit_usd", "12.5")
            .await
            .unwrap();

        let reopened = FileCounterStore::new(&dir);
        assert_eq!(
            reopened.read("total_profit_usd").await.unwrap(),
            Some("12.5".to_string())
        );

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_set_membership_is_exact() {
        let dir = scratch_dir();
        let store = FileCounterStore::new(&dir);

        store.append("actively_trading", "ETH").await.unwrap();
        store.append("actively_trading", "ETHW").await.unwrap();
        store.append("actively_trading", "ETH").await.unwrap();
        assert_eq!(
            store.members("actively_trading").await.unwrap(),
            vec!["ETH".to_string(), "ETHW".to_string()]
        );

        store.remove("actively_trading", "ETH").await.unwrap();
        assert_eq!(
            store.members("actively_trading").await.unwrap(),
            vec!["ETHW".to_string()]
        );

        let _ = std::fs::remove_dir_all(dir);
    }
}
