//! Field normalizers.
//!
//! Pure functions mapping LSF's display tokens to numbers or canonical
//! labels. Status tables are kept per command because `bhosts`, `bqueues`,
//! `lsload` and `bjobs` each use their own vocabulary.

use thiserror::Error;

/// Sentinel for "no limit" or an unknown magnitude.
pub const NO_LIMIT: f64 = -1.0;

/// The token LSF prints for an unset limit or an unavailable value.
pub const PLACEHOLDER: &str = "-";

/// Errors produced when a field cannot be normalized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// The token is not a number.
    #[error("invalid number: '{0}'")]
    InvalidNumber(String),

    /// The size suffix is not one of K, M, G, T, P, E.
    #[error("unrecognized unit '{unit}' in '{token}'")]
    UnknownUnit { token: String, unit: String },

    /// The value lies outside its permitted range.
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

/// Parse a count or limit, mapping `-` to [`NO_LIMIT`].
pub fn parse_limit(token: &str) -> Result<f64, NormalizeError> {
    let token = token.trim();
    if token == PLACEHOLDER {
        return Ok(NO_LIMIT);
    }
    parse_number(token)
}

fn parse_number(token: &str) -> Result<f64, NormalizeError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| NormalizeError::InvalidNumber(token.to_string()))
}

/// Convert `magnitude` expressed in `unit` to kibibytes.
///
/// An empty unit means the value is already in kibibytes, which is how LSF
/// prints sizes when `LSF_UNIT_FOR_LIMITS` is left at its default.
pub fn size_to_kib(magnitude: f64, unit: &str) -> Result<f64, NormalizeError> {
    let power = match unit.to_ascii_uppercase().as_str() {
        "" | "K" => 0,
        "M" => 1,
        "G" => 2,
        "T" => 3,
        "P" => 4,
        "E" => 5,
        _ => {
            return Err(NormalizeError::UnknownUnit {
                token: format!("{magnitude}{unit}"),
                unit: unit.to_string(),
            });
        }
    };
    Ok(magnitude * 1024f64.powi(power))
}

/// Parse a unit-suffixed size such as `62.7G` into kibibytes.
///
/// `-` maps to [`NO_LIMIT`].
pub fn parse_size_kib(token: &str) -> Result<f64, NormalizeError> {
    let token = token.trim();
    if token == PLACEHOLDER {
        return Ok(NO_LIMIT);
    }

    let split = token
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(token.len());
    let (magnitude, unit) = token.split_at(split);
    let magnitude = parse_number(magnitude).map_err(|_| NormalizeError::InvalidNumber(token.to_string()))?;

    size_to_kib(magnitude, unit).map_err(|e| match e {
        NormalizeError::UnknownUnit { unit, .. } => NormalizeError::UnknownUnit {
            token: token.to_string(),
            unit,
        },
        other => other,
    })
}

/// Parse a percentage such as `37%` into `37.0`.
///
/// `-` maps to [`NO_LIMIT`]; anything outside `[0, 100]` is rejected.
pub fn parse_percent(token: &str) -> Result<f64, NormalizeError> {
    let token = token.trim();
    if token == PLACEHOLDER {
        return Ok(NO_LIMIT);
    }

    let value = parse_number(token.strip_suffix('%').unwrap_or(token).trim_end())?;
    if !(0.0..=100.0).contains(&value) {
        return Err(NormalizeError::OutOfRange {
            value,
            min: 0.0,
            max: 100.0,
        });
    }
    Ok(value)
}

/// Remove the `*` lsload prints in front of a value beyond its threshold.
pub fn strip_threshold_marker(token: &str) -> &str {
    token.trim_start_matches('*')
}

/// Remove the parentheses around an `lshosts` resource list.
pub fn strip_parens(token: &str) -> String {
    token.replace(['(', ')'], "")
}

/// Host status as reported by `bhosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Unknown,
    Ok,
    Unavail,
    Unreach,
    Closed,
    ClosedCuExcl,
}

impl HostStatus {
    /// Case-insensitive lookup; unrecognized words map to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "ok" => Self::Ok,
            "unavail" => Self::Unavail,
            "unreach" => Self::Unreach,
            "closed" | "closed_full" | "closed_adm" | "closed_busy" | "closed_lock"
            | "closed_wind" | "closed_lim" | "closed_excl" => Self::Closed,
            "closed_cu_excl" => Self::ClosedCuExcl,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Ok => 1.0,
            Self::Unavail => 2.0,
            Self::Unreach => 3.0,
            Self::Closed => 4.0,
            Self::ClosedCuExcl => 5.0,
        }
    }
}

/// Queue status as reported by `bqueues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Unknown,
    OpenActive,
    OpenInactive,
    ClosedActive,
    ClosedInactive,
}

impl QueueStatus {
    /// Case-insensitive lookup; unrecognized words map to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "open:active" => Self::OpenActive,
            "open:inact" | "open:inact_win" => Self::OpenInactive,
            "closed:active" => Self::ClosedActive,
            "closed:inact" | "closed:inact_win" => Self::ClosedInactive,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::OpenActive => 1.0,
            Self::OpenInactive => 2.0,
            Self::ClosedActive => 3.0,
            Self::ClosedInactive => 4.0,
        }
    }
}

/// Load-information status as reported by `lsload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Unknown,
    Ok,
    /// `-ok`: LIM is up but RES is down.
    ResDown,
    Busy,
    LockW,
    LockU,
    Unavail,
}

impl LoadStatus {
    /// Case-insensitive lookup; unrecognized words map to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "ok" => Self::Ok,
            "-ok" => Self::ResDown,
            "busy" => Self::Busy,
            "lockw" => Self::LockW,
            "locku" => Self::LockU,
            "unavail" => Self::Unavail,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Ok => 1.0,
            Self::ResDown => 2.0,
            Self::Busy => 3.0,
            Self::LockW => 4.0,
            Self::LockU => 5.0,
            Self::Unavail => 6.0,
        }
    }
}

/// Job state as reported by `bjobs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Unknown,
    Pend,
    Run,
    PSusp,
    USusp,
    SSusp,
    Done,
    Exit,
    Wait,
    Zombi,
}

impl JobStatus {
    /// Case-insensitive lookup; `UNKWN` and unrecognized words map to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "pend" => Self::Pend,
            "run" => Self::Run,
            "psusp" => Self::PSusp,
            "ususp" => Self::USusp,
            "ssusp" => Self::SSusp,
            "done" => Self::Done,
            "exit" => Self::Exit,
            "wait" => Self::Wait,
            "zombi" => Self::Zombi,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Self::Unknown => 0.0,
            Self::Pend => 1.0,
            Self::Run => 2.0,
            Self::PSusp => 3.0,
            Self::USusp => 4.0,
            Self::SSusp => 5.0,
            Self::Done => 6.0,
            Self::Exit => 7.0,
            Self::Wait => 8.0,
            Self::Zombi => 9.0,
        }
    }

    /// Upper-case LSF spelling, used as a label value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKWN",
            Self::Pend => "PEND",
            Self::Run => "RUN",
            Self::PSusp => "PSUSP",
            Self::USusp => "USUSP",
            Self::SSusp => "SSUSP",
            Self::Done => "DONE",
            Self::Exit => "EXIT",
            Self::Wait => "WAIT",
            Self::Zombi => "ZOMBI",
        }
    }
}

/// Role of a host in the cluster, from the `lshosts` `server` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    Server,
    Client,
    Dynamic,
    Unknown,
}

impl ServerType {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "yes" => Self::Server,
            "no" => Self::Client,
            "dyn" => Self::Dynamic,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "servers",
            Self::Client => "client",
            Self::Dynamic => "dynamic",
            Self::Unknown => "unknown",
        }
    }
}
