pub mod config;
pub mod logger;

pub use config::Config;

use validator::ValidationErrors;

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(m) => m.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect::<Vec<_>>();
    messages.sort();
    messages.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "reason is required"))]
        reason: String,
        #[validate(range(min = 1))]
        session_id: i64,
    }

    #[test]
    fn test_format_validation_errors_joins_messages() {
        let probe = Probe {
            reason: String::new(),
            session_id: 0,
        };
        let errors = probe.validate().unwrap_err();
        let formatted = format_validation_errors(&errors);

        assert_eq!(formatted, "reason is required; session_id is invalid");
    }

    #[test]
    fn test_format_validation_errors_empty_when_valid() {
        let probe = Probe {
            reason: "late bus".into(),
            session_id: 3,
        };
        assert!(probe.validate().is_ok());
        assert_eq!(format_validation_errors(&ValidationErrors::new()), "");
    }
}
