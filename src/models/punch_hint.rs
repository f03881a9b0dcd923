use serde::Serialize;

/// Direction reported by the device for a punch, when it reports one at all.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PunchHint {
    In,
    Out,
    #[default]
    Unknown,
}

impl PunchHint {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PunchHint::In => "in",
            PunchHint::Out => "out",
            PunchHint::Unknown => "unknown",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(PunchHint::In),
            "out" => Some(PunchHint::Out),
            "unknown" => Some(PunchHint::Unknown),
            _ => None,
        }
    }

    /// ISAPI `attendanceStatus` strings.
    pub fn from_attendance_status(s: &str) -> Self {
        match s {
            "checkIn" | "breakIn" | "overtimeIn" => PunchHint::In,
            "checkOut" | "breakOut" | "overtimeOut" => PunchHint::Out,
            _ => PunchHint::Unknown,
        }
    }

    /// ZKTeco punch codes: 0 check-in, 1 check-out, 2 break-out,
    /// 3 break-in, 4 overtime-in, 5 overtime-out.
    pub fn from_zk_punch(code: i64) -> Self {
        match code {
            0 | 3 | 4 => PunchHint::In,
            1 | 2 | 5 => PunchHint::Out,
            _ => PunchHint::Unknown,
        }
    }

    /// Generic `punch_type` values used by HikCentral exports.
    pub fn from_punch_type(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "in" | "0" | "checkin" => PunchHint::In,
            "out" | "1" | "checkout" => PunchHint::Out,
            _ => PunchHint::Unknown,
        }
    }
}

/// How the person authenticated at the terminal.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    Card,
    Face,
    Fingerprint,
    #[default]
    Other,
}

impl VerifyMode {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            VerifyMode::Card => "card",
            VerifyMode::Face => "face",
            VerifyMode::Fingerprint => "fingerprint",
            VerifyMode::Other => "other",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "card" => VerifyMode::Card,
            "face" => VerifyMode::Face,
            "fingerprint" => VerifyMode::Fingerprint,
            _ => VerifyMode::Other,
        }
    }

    /// ISAPI minor event codes (major 5, access control).
    pub fn from_isapi_minor(minor: i64) -> Self {
        match minor {
            75..=78 => VerifyMode::Face,
            1 | 38 => VerifyMode::Card,
            _ => VerifyMode::Other,
        }
    }

    /// ZKTeco verify type carried in the attendance `status` byte.
    pub fn from_zk_status(status: i64) -> Self {
        match status {
            1 => VerifyMode::Fingerprint,
            4 => VerifyMode::Card,
            15 => VerifyMode::Face,
            _ => VerifyMode::Other,
        }
    }
}
