//! Constants used throughout the CLI.

/// A crisis support contact shown to the user.
pub struct CrisisResource {
    /// Stable identifier recorded in the crisis access log
    pub id: &'static str,
    pub name: &'static str,
    pub contact: &'static str,
}

pub const CRISIS_RESOURCES: &[CrisisResource] = &[
    CrisisResource {
        id: "suicide_prevention_lifeline",
        name: "National Suicide Prevention Lifeline",
        contact: "1-800-273-8255",
    },
    CrisisResource {
        id: "crisis_text_line",
        name: "Crisis Text Line",
        contact: "Text HOME to 741741",
    },
    CrisisResource {
        id: "emergency_services",
        name: "Emergency Services",
        contact: "911",
    },
    CrisisResource {
        id: "samhsa_helpline",
        name: "SAMHSA National Helpline",
        contact: "1-800-662-HELP (4357)",
    },
    CrisisResource {
        id: "disaster_distress_helpline",
        name: "Disaster Distress Helpline",
        contact: "1-800-985-5990",
    },
];

/// Exit codes for the CLI.
///
/// These follow common Unix conventions:
/// - 0: Success
/// - 1: General error (I/O, SQLite)
/// - 2: Misuse of shell command (reserved by clap)
/// - 3+: Application-specific errors
pub mod exit_codes {
    use aroha_core::StoreError;

    use crate::commands::check::IntegrityFailed;

    pub const GENERAL: u8 = 1;

    /// Unknown session or record.
    pub const NOT_FOUND: u8 = 3;

    /// Invalid user input, arguments or configuration.
    pub const INVALID_INPUT: u8 = 4;

    /// Key derivation failed or records did not authenticate.
    pub const AUTH_FAILED: u8 = 5;

    /// Integrity check failed or a record is malformed.
    pub const INTEGRITY_FAILED: u8 = 6;

    pub fn for_error(err: &anyhow::Error) -> u8 {
        if err.downcast_ref::<IntegrityFailed>().is_some() {
            return INTEGRITY_FAILED;
        }
        match err.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound(_)) => NOT_FOUND,
            Some(StoreError::InvalidInput(_)) | Some(StoreError::Config(_)) => INVALID_INPUT,
            Some(StoreError::KeyDerivation(_)) | Some(StoreError::Decryption { .. }) => {
                AUTH_FAILED
            }
            Some(StoreError::MalformedRecord { .. }) => INTEGRITY_FAILED,
            Some(StoreError::StoreIo(_)) | None => GENERAL,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crisis_resource_ids_are_unique() {
        let mut ids: Vec<&str> = CRISIS_RESOURCES.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CRISIS_RESOURCES.len());
    }
}
