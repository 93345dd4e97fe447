use std::fmt;

#[derive(Debug)]
pub enum LaurelError {
    Template(String),
    Render(String),
    EmptyName,
    InvalidPlacement(String),
    Archive(String),
    NothingToDo,
    Io(std::io::Error),
}

impl fmt::Display for LaurelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaurelError::Template(message) => {
                write!(f, "template unavailable: {}", message)
            }
            LaurelError::Render(message) => write!(f, "render failed: {}", message),
            LaurelError::EmptyName => write!(f, "empty or whitespace-only name"),
            LaurelError::InvalidPlacement(message) => {
                write!(f, "invalid placement: {}", message)
            }
            LaurelError::Archive(message) => write!(f, "archive error: {}", message),
            LaurelError::NothingToDo => write!(f, "nothing to do: no names supplied"),
            LaurelError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for LaurelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaurelError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LaurelError {
    fn from(value: std::io::Error) -> Self {
        LaurelError::Io(value)
    }
}
