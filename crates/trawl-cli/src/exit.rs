//! Process exit codes.

use std::process::ExitCode;
use trawl_backend::ErrorKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitStatus {
    #[default]
    Success,
    Bug,
    Usage,
    /// Also banned accounts and expired passwords
    IncorrectPassword,
    Unavailable,
    ActionNeeded,
    /// Pending interaction in non-interactive mode
    InteractionNeeded,
    Configuration,
    NotFound,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Bug => 1,
            Self::Usage => 2,
            Self::IncorrectPassword => 3,
            Self::Unavailable => 4,
            Self::ActionNeeded => 5,
            Self::InteractionNeeded => 6,
            Self::Configuration => 7,
            Self::NotFound => 8,
        }
    }

    fn severity(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Bug => 1,
            Self::NotFound => 2,
            Self::Unavailable => 3,
            Self::Configuration => 4,
            Self::InteractionNeeded => 5,
            Self::ActionNeeded => 6,
            Self::IncorrectPassword => 7,
            Self::Usage => 8,
        }
    }

    /// The more severe of the two.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl From<ErrorKind> for ExitStatus {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::IncorrectPassword | ErrorKind::UserBanned | ErrorKind::PasswordExpired => {
                Self::IncorrectPassword
            }
            ErrorKind::Unavailable | ErrorKind::ScrapingBlocked => Self::Unavailable,
            ErrorKind::ActionNeeded => Self::ActionNeeded,
            ErrorKind::InteractionNeeded => Self::InteractionNeeded,
            ErrorKind::Configuration => Self::Configuration,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::NotSupported | ErrorKind::Bug => Self::Bug,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(ExitStatus::from(ErrorKind::UserBanned).code(), 3);
        assert_eq!(ExitStatus::from(ErrorKind::ScrapingBlocked).code(), 4);
        assert_eq!(ExitStatus::from(ErrorKind::ActionNeeded).code(), 5);
        assert_eq!(ExitStatus::from(ErrorKind::InteractionNeeded).code(), 6);
        assert_eq!(ExitStatus::from(ErrorKind::Configuration).code(), 7);
        assert_eq!(ExitStatus::from(ErrorKind::NotFound).code(), 8);
        assert_eq!(ExitStatus::from(ErrorKind::NotSupported).code(), 1);
    }

    #[test]
    fn test_most_severe_wins() {
        let order = [
            ExitStatus::IncorrectPassword,
            ExitStatus::ActionNeeded,
            ExitStatus::InteractionNeeded,
            ExitStatus::Configuration,
            ExitStatus::Unavailable,
            ExitStatus::NotFound,
            ExitStatus::Bug,
            ExitStatus::Success,
        ];
        for (i, stronger) in order.iter().enumerate() {
            for weaker in &order[i..] {
                assert_eq!(stronger.worst(*weaker), *stronger);
                assert_eq!(weaker.worst(*stronger), *stronger);
            }
        }
    }
}
