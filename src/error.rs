use thiserror::Error;

/// Fatal configuration problems, all detected before any request is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read store catalog {path}: {source}")]
    CatalogIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse store catalog: {0}")]
    CatalogParse(#[from] serde_yaml::Error),

    #[error("store \"{store}\" is invalid: {reason}")]
    InvalidStore { store: String, reason: String },

    #[error("store name \"{0}\" appears more than once in the catalog")]
    DuplicateStore(String),

    #[error("category \"{0}\" has no stores")]
    EmptyCategory(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// A CSS selector in a fallback chain that cannot be compiled.
#[derive(Debug, Error)]
#[error("invalid CSS selector \"{selector}\": {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why a product container could not be turned into a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionMiss {
    #[error("no title matched")]
    Title,

    #[error("no current price matched")]
    CurrentPrice,

    #[error("no absolute product URL matched")]
    Url,
}
