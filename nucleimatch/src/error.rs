use thiserror::Error;

/// Errors produced by detection and registration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("insufficient points: need at least {required}, found {found}")]
    InsufficientPoints { required: usize, found: usize },

    #[error(
        "insufficient samples for RANSAC: need {required}, moving has {moving}, fixed has {fixed}"
    )]
    InsufficientSamples {
        required: usize,
        moving: usize,
        fixed: usize,
    },

    #[error("length mismatch for {what}: {left} vs {right}")]
    LengthMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },

    #[error("degenerate fit: {0}")]
    DegenerateFit(&'static str),

    #[error("operation cancelled")]
    Cancelled,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_counts() {
        let err = Error::InsufficientPoints {
            required: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "insufficient points: need at least 2, found 1"
        );

        let err = Error::InsufficientSamples {
            required: 4,
            moving: 3,
            fixed: 10,
        };
        assert!(err.to_string().contains("moving has 3"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
