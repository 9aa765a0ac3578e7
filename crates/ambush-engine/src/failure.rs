use thiserror::Error;

/// Why a remote call produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFailure {
    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
}

impl CallFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Shape(_) => "shape",
            Self::Encode(_) => "encode",
        }
    }

    pub(crate) fn transport(err: &reqwest::Error) -> Self {
        Self::Transport(error_chain_text(err, 512))
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = cause {
        let text = current.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        cause = current.source();
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

#[cfg(test)]
mod tests {
    use super::{truncate_text, CallFailure};

    #[test]
    fn truncate_text_appends_ellipsis_past_limit() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn failure_kinds_and_messages() {
        let failure = CallFailure::Status {
            status: 503,
            body: "loading".to_string(),
        };
        assert_eq!(failure.kind(), "status");
        assert_eq!(failure.to_string(), "endpoint returned status 503: loading");
        assert_eq!(CallFailure::Shape("x".to_string()).kind(), "shape");
    }
}
