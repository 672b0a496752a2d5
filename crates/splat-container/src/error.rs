use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("cannot connect to the container runtime: {0}")]
    ConnectionFailed(String),

    #[error("no credentials available for registry '{registry}'")]
    Auth { registry: String },

    #[error("failed to pull image '{image}': {message}")]
    Pull { image: String, message: String },

    #[error("runtime rejected container spec for '{identity}': {message}")]
    Create { identity: String, message: String },

    #[error("container '{identity}' was created but failed to start: {message}")]
    Start { identity: String, message: String },

    #[error("runtime API error: {0}")]
    Api(String),
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        let message = err.to_string();
        if message.contains("Connection refused") || message.contains("No such file or directory")
        {
            ContainerError::ConnectionFailed(message)
        } else {
            ContainerError::Api(message)
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
