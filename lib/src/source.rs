use crate::Result;
use std::{convert::Infallible, fmt, path::PathBuf, str::FromStr, time::Duration};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a play log comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(String),
    /// An uploaded CSV held in memory.
    Bytes(Vec<u8>),
}

impl Source {
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            Source::Path(path) => Ok(std::fs::read(path)?),
            Source::Url(url) => {
                let client = reqwest::blocking::Client::builder()
                    .timeout(HTTP_TIMEOUT)
                    .build()?;
                let body = client.get(url).send()?.error_for_status()?.bytes()?;
                Ok(body.to_vec())
            }
            Source::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl FromStr for Source {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            Ok(Source::Url(s.to_string()))
        } else {
            Ok(Source::Path(PathBuf::from(s)))
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Url(url) => f.write_str(url),
            Source::Bytes(bytes) => write!(f, "<upload, {} bytes>", bytes.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_and_paths() {
        let url: Source = "https://storage.example.com/wmradiodata.csv".parse().unwrap();
        assert!(matches!(url, Source::Url(_)));
        let path: Source = "data/wmradiodata.csv".parse().unwrap();
        assert_eq!(path, Source::Path(PathBuf::from("data/wmradiodata.csv")));
    }

    #[test]
    fn bytes_read_back() {
        let source = Source::from(b"timestamp,artist,song\n".to_vec());
        assert_eq!(source.read().unwrap(), b"timestamp,artist,song\n");
        assert_eq!(source.to_string(), "<upload, 22 bytes>");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let source = Source::Path(PathBuf::from("/definitely/not/here.csv"));
        assert!(matches!(source.read(), Err(crate::Error::Io(_))));
    }
}
