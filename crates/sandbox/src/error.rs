#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("write script {path}: {source}")]
    WriteScript {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("output capture failed: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
