use serde::{Deserialize, Serialize};

/// What to do when a query hits an error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorAction {
    Raise,
    Warn,
    Ignore,
}

/// Reaction to the error conditions of one coordinate.
///
/// * `missing`: the query does not specify the coordinate.
/// * `scalar`: the database holds a single value along the coordinate.
/// * `bounds`: the queried value lies outside the tabulated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorHandlingPolicy {
    #[serde(default = "raise")]
    pub missing: ErrorAction,
    #[serde(default = "raise")]
    pub scalar: ErrorAction,
    #[serde(default = "raise")]
    pub bounds: ErrorAction,
}

fn raise() -> ErrorAction {
    ErrorAction::Raise
}

impl ErrorHandlingPolicy {
    pub fn new(missing: ErrorAction, scalar: ErrorAction, bounds: ErrorAction) -> Self {
        Self {
            missing,
            scalar,
            bounds,
        }
    }

    pub fn ignore_all() -> Self {
        Self::new(ErrorAction::Ignore, ErrorAction::Ignore, ErrorAction::Ignore)
    }
}

impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self::new(ErrorAction::Raise, ErrorAction::Raise, ErrorAction::Raise)
    }
}

/// Error handling of absorption database queries, per thermophysical
/// coordinate: absorber mole fraction `x`, pressure `p`, temperature `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorHandlingConfiguration {
    #[serde(default = "default_x")]
    pub x: ErrorHandlingPolicy,
    #[serde(default = "default_p")]
    pub p: ErrorHandlingPolicy,
    #[serde(default = "default_t")]
    pub t: ErrorHandlingPolicy,
}

fn default_x() -> ErrorHandlingPolicy {
    ErrorHandlingPolicy::ignore_all()
}

fn default_p() -> ErrorHandlingPolicy {
    ErrorHandlingPolicy {
        bounds: ErrorAction::Ignore,
        ..Default::default()
    }
}

fn default_t() -> ErrorHandlingPolicy {
    ErrorHandlingPolicy::default()
}

impl Default for ErrorHandlingConfiguration {
    fn default() -> Self {
        Self {
            x: default_x(),
            p: default_p(),
            t: default_t(),
        }
    }
}

impl ErrorHandlingConfiguration {
    /// Configuration which never raises.
    pub fn permissive() -> Self {
        Self {
            x: ErrorHandlingPolicy::ignore_all(),
            p: ErrorHandlingPolicy::ignore_all(),
            t: ErrorHandlingPolicy::ignore_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let c = ErrorHandlingConfiguration::default();
        assert_eq!(c.x.bounds, ErrorAction::Ignore);
        assert_eq!(c.p.bounds, ErrorAction::Ignore);
        assert_eq!(c.t.bounds, ErrorAction::Raise);
    }

    #[test]
    fn partial_configuration() {
        let c: ErrorHandlingConfiguration =
            serde_json::from_value(json!({"t": {"bounds": "warn"}})).unwrap();
        assert_eq!(c.t.bounds, ErrorAction::Warn);
        assert_eq!(c.t.missing, ErrorAction::Raise);
        assert_eq!(c.x, ErrorHandlingPolicy::ignore_all());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let r: Result<ErrorHandlingConfiguration, _> =
            serde_json::from_value(json!({"p": {"bounds": "explode"}}));
        assert!(r.is_err());
    }
}
